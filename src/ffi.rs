//! FFI layer for mobile host shells
//!
//! Provides C-compatible functions that can be called from Swift or Kotlin.
//! Uses opaque pointers and C strings for cross-language compatibility.
//! Results are JSON strings owned by the caller and released with `w3w_free_string`.

// FFI functions necessarily work with raw pointers - this is expected behavior
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use crate::api::{ApiRequest, What3WordsV3};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::options::AutosuggestOptions;
use crate::types::Coordinates;
use crate::voice::VoiceSession;

/// Environment variable holding the log filter for `w3w_init_logging`
pub const ENV_LOG: &str = "W3W_LOG";

/// Opaque handle to the what3words client
pub struct W3wHandle {
    client: What3WordsV3,
    voice: Mutex<Option<VoiceSession>>,
    last_error: Mutex<Option<String>>,
}

/// Result callback type for voice results.
///
/// `result` is only valid for the duration of the call.
pub type ResultCallback = extern "C" fn(success: bool, result: *const c_char, context: *mut c_void);

/// Microphone volume callback, `level` in `[0, 1]`
pub type VolumeCallback = extern "C" fn(level: f32, context: *mut c_void);

/// Host callback plus its opaque context
#[derive(Clone, Copy)]
struct HostResult {
    callback: ResultCallback,
    context: *mut c_void,
}

// the host owns the context and guarantees it outlives the voice session
unsafe impl Send for HostResult {}
unsafe impl Sync for HostResult {}

impl HostResult {
    fn deliver(&self, success: bool, payload: &str) {
        match CString::new(payload) {
            Ok(cstr) => (self.callback)(success, cstr.as_ptr(), self.context),
            Err(_) => (self.callback)(false, ptr::null(), self.context),
        }
    }
}

#[derive(Clone, Copy)]
struct HostLevel {
    callback: VolumeCallback,
    context: *mut c_void,
}

unsafe impl Send for HostLevel {}
unsafe impl Sync for HostLevel {}

fn set_last_error(handle: &W3wHandle, message: impl Into<String>) {
    *handle.last_error.lock() = Some(message.into());
}

fn clear_last_error(handle: &W3wHandle) {
    *handle.last_error.lock() = None;
}

fn handle_ref<'a>(handle: *mut W3wHandle) -> Option<&'a W3wHandle> {
    if handle.is_null() {
        None
    } else {
        Some(unsafe { &*handle })
    }
}

/// Read an optional C string; `Err` on invalid UTF-8
fn optional_str(value: *const c_char) -> Result<Option<String>, Error> {
    if value.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(value) }
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|e| Error::Validation(format!("Invalid UTF-8 in argument: {e}")))
}

fn required_str(value: *const c_char, name: &str) -> Result<String, Error> {
    optional_str(value)?.ok_or_else(|| Error::Validation(format!("{name} must not be null")))
}

fn parse_options(json: *const c_char) -> Result<AutosuggestOptions, Error> {
    match optional_str(json)? {
        Some(json) if !json.trim().is_empty() => {
            let options: AutosuggestOptions = serde_json::from_str(&json)
                .map_err(|e| Error::Validation(format!("invalid autosuggest options: {e}")))?;
            options.validate()?;
            Ok(options)
        }
        _ => Ok(AutosuggestOptions::default()),
    }
}

fn into_c_string(text: String) -> *mut c_char {
    match CString::new(text) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize an outcome, recording the error on failure
fn respond<T: Serialize>(handle: &W3wHandle, result: Result<T, Error>) -> *mut c_char {
    let json = result.and_then(|value| serde_json::to_string(&value).map_err(Error::from));
    match json {
        Ok(json) => {
            clear_last_error(handle);
            into_c_string(json)
        }
        Err(e) => {
            error!("what3words call failed: {}", e);
            set_last_error(handle, e.to_string());
            ptr::null_mut()
        }
    }
}

fn error_json(err: &Error) -> String {
    serde_json::to_string(&err.to_api_error())
        .unwrap_or_else(|_| r#"{"code":"UnknownError","message":""}"#.to_string())
}

// ============ Lifecycle ============

/// Install a `tracing` subscriber filtered by `W3W_LOG` (default `info`).
/// Returns false when a subscriber was already installed.
#[unsafe(no_mangle)]
pub extern "C" fn w3w_init_logging() -> bool {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

fn create_handle(config: Result<ClientConfig, Error>) -> *mut W3wHandle {
    let client = match config.and_then(What3WordsV3::with_config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize what3words client: {}", e);
            return ptr::null_mut();
        }
    };

    debug!("what3words client initialized");

    Box::into_raw(Box::new(W3wHandle {
        client,
        voice: Mutex::new(None),
        last_error: Mutex::new(None),
    }))
}

/// Initialize the client.
/// `api_key` may be null to read `W3W_API_KEY` from the environment.
/// Returns an opaque handle that must be passed to all other functions, or null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn w3w_init(api_key: *const c_char) -> *mut W3wHandle {
    create_handle(optional_str(api_key).and_then(ClientConfig::from_env))
}

/// Initialize the client from a JSON `ClientConfig`
#[unsafe(no_mangle)]
pub extern "C" fn w3w_init_with_config(config_json: *const c_char) -> *mut W3wHandle {
    let config = required_str(config_json, "config").and_then(|json| {
        let config: ClientConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    });
    create_handle(config)
}

/// Destroy the client, stopping any voice session
#[unsafe(no_mangle)]
pub extern "C" fn w3w_destroy(handle: *mut W3wHandle) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
        debug!("what3words client destroyed");
    }
}

// ============ REST ============

/// Convert coordinates to a three word address.
/// `language` may be null. Returns a JSON location (caller must free with w3w_free_string).
#[unsafe(no_mangle)]
pub extern "C" fn w3w_convert_to_3wa(
    handle: *mut W3wHandle,
    lat: f64,
    lng: f64,
    language: *const c_char,
) -> *mut c_char {
    let Some(handle) = handle_ref(handle) else {
        return ptr::null_mut();
    };

    let result = Coordinates::new(lat, lng).and_then(|coordinates| {
        let mut request = handle.client.convert_to_3wa(coordinates);
        if let Some(language) = optional_str(language)? {
            request = request.language(language);
        }
        request.execute()
    });
    respond(handle, result)
}

/// Convert a three word address to coordinates.
/// Returns a JSON location (caller must free with w3w_free_string).
#[unsafe(no_mangle)]
pub extern "C" fn w3w_convert_to_coordinates(
    handle: *mut W3wHandle,
    words: *const c_char,
) -> *mut c_char {
    let Some(handle) = handle_ref(handle) else {
        return ptr::null_mut();
    };

    let result = required_str(words, "words")
        .and_then(|words| handle.client.convert_to_coordinates(words).execute());
    respond(handle, result)
}

/// Autosuggest for a partial address.
/// `options_json` is a JSON `AutosuggestOptions` and may be null.
/// Returns a JSON array of suggestions (caller must free with w3w_free_string).
#[unsafe(no_mangle)]
pub extern "C" fn w3w_autosuggest(
    handle: *mut W3wHandle,
    input: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    let Some(handle) = handle_ref(handle) else {
        return ptr::null_mut();
    };

    let result = required_str(input, "input").and_then(|input| {
        let options = parse_options(options_json)?;
        handle.client.autosuggest(input).options(&options).execute()
    });
    respond(handle, result)
}

// ============ Voice ============

/// Configure the voice session: spoken language, JSON options (nullable) and
/// whether suggestions should carry coordinates.
/// Fails while a session is listening.
#[unsafe(no_mangle)]
pub extern "C" fn w3w_voice_configure(
    handle: *mut W3wHandle,
    language: *const c_char,
    options_json: *const c_char,
    with_coordinates: bool,
) -> bool {
    let Some(handle) = handle_ref(handle) else {
        return false;
    };

    let mut voice = handle.voice.lock();
    if voice.as_ref().is_some_and(VoiceSession::is_listening) {
        set_last_error(handle, "Cannot reconfigure voice while listening");
        return false;
    }

    let session = required_str(language, "language").and_then(|language| {
        let options = parse_options(options_json)?;
        handle
            .client
            .autosuggest_voice(language)?
            .options(&options)
            .with_coordinates(with_coordinates)
            .build()
    });

    match session {
        Ok(session) => {
            *voice = Some(session);
            clear_last_error(handle);
            true
        }
        Err(e) => {
            let message = format!("Failed to configure voice: {e}");
            error!("{message}");
            set_last_error(handle, message);
            false
        }
    }
}

/// Receive microphone volume updates while listening. Pass null to clear.
#[unsafe(no_mangle)]
pub extern "C" fn w3w_voice_set_level_callback(
    handle: *mut W3wHandle,
    callback: Option<VolumeCallback>,
    context: *mut c_void,
) -> bool {
    let Some(handle) = handle_ref(handle) else {
        return false;
    };
    let voice = handle.voice.lock();
    let Some(session) = voice.as_ref() else {
        set_last_error(handle, "Voice not configured");
        return false;
    };

    match callback {
        Some(callback) => {
            let host = HostLevel { callback, context };
            session.on_listening(move |level| {
                let host = host;
                (host.callback)(level, host.context)
            });
        }
        None => session.on_listening(|_| {}),
    }
    true
}

/// Start listening. The callback fires once with either a JSON array of
/// suggestions (`success = true`) or a JSON error `{code, message}`.
/// Starting while already listening does nothing.
#[unsafe(no_mangle)]
pub extern "C" fn w3w_voice_start(
    handle: *mut W3wHandle,
    callback: ResultCallback,
    context: *mut c_void,
) -> bool {
    let Some(handle) = handle_ref(handle) else {
        return false;
    };
    let voice = handle.voice.lock();
    let Some(session) = voice.as_ref() else {
        set_last_error(handle, "Voice not configured");
        return false;
    };

    if !session.is_listening() {
        let host = HostResult { callback, context };
        session.on_suggestions(move |suggestions| {
            let host = host;
            match serde_json::to_string(&suggestions) {
                Ok(json) => host.deliver(true, &json),
                Err(e) => host.deliver(false, &error_json(&Error::from(e))),
            }
        });
        session.on_error(move |err| {
            let host = host;
            host.deliver(false, &error_json(&err));
        });
    }

    match session.start_listening() {
        Ok(()) => {
            clear_last_error(handle);
            true
        }
        Err(e) => {
            let message = format!("Failed to start voice: {e}");
            error!("{message}");
            set_last_error(handle, message);
            false
        }
    }
}

/// Stop listening; no callback fires for the abandoned session
#[unsafe(no_mangle)]
pub extern "C" fn w3w_voice_stop(handle: *mut W3wHandle) {
    let Some(handle) = handle_ref(handle) else {
        return;
    };
    if let Some(session) = handle.voice.lock().as_ref() {
        session.stop_listening();
    }
}

/// Check if the voice session is listening
#[unsafe(no_mangle)]
pub extern "C" fn w3w_voice_is_listening(handle: *mut W3wHandle) -> bool {
    handle_ref(handle)
        .map(|handle| {
            handle
                .voice
                .lock()
                .as_ref()
                .is_some_and(VoiceSession::is_listening)
        })
        .unwrap_or(false)
}

// ============ Utilities ============

/// Get the last error message (caller must free with w3w_free_string)
#[unsafe(no_mangle)]
pub extern "C" fn w3w_get_last_error(handle: *mut W3wHandle) -> *mut c_char {
    let Some(handle) = handle_ref(handle) else {
        return ptr::null_mut();
    };
    let message = handle.last_error.lock().clone();
    match message {
        Some(text) => into_c_string(text),
        None => ptr::null_mut(),
    }
}

/// Free a string returned by w3w functions
#[unsafe(no_mangle)]
pub extern "C" fn w3w_free_string(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            drop(CString::from_raw(s));
        }
    }
}
