//! Voice autosuggest session
//!
//! A [`VoiceSession`] moves between idle and listening. Each call to
//! [`VoiceSession::start_listening`] opens one transport connection; the microphone
//! starts once the service reports it is ready. The first terminal event stops the
//! microphone, closes the connection and is delivered exactly once, either to the
//! registered callbacks or to a pending [`VoiceSession::listen`] future.
//!
//! Every listen gets a generation number. Results carrying an older generation than
//! the active one are dropped, so a stopped session can never reach the handlers of
//! the next one.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transport::{VoiceEvent, VoiceParams, VoiceTransport};
use crate::AudioData;
use crate::audio::{AudioInput, LevelCallback};
use crate::error::{Error, Result};
use crate::options::{AutosuggestOptions, AutosuggestOptionsBuilder};
use crate::runtime;
use crate::types::{BoundingBox, Circle, Coordinates, Countries, Polygon, Suggestion};

pub type SuggestionsCallback = Arc<dyn Fn(Vec<Suggestion>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(Error) + Send + Sync>;

/// A callback invocation handed to a [`Dispatcher`]
pub type Task = Box<dyn FnOnce() + Send>;
type Waiter = oneshot::Sender<Result<Vec<Suggestion>>>;

/// Decides where session callbacks run
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, task: Task);
}

/// Runs callbacks on whichever thread produced the event
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, task: Task) {
        task()
    }
}

#[derive(Default, Clone)]
struct Handlers {
    on_suggestions: Option<SuggestionsCallback>,
    on_error: Option<ErrorCallback>,
    on_listening: Option<LevelCallback>,
}

/// Fluent configuration for a [`VoiceSession`]
pub struct VoiceBuilder {
    transport: Arc<dyn VoiceTransport>,
    microphone: Arc<dyn AudioInput>,
    language: String,
    options: AutosuggestOptionsBuilder,
    with_coordinates: bool,
    dispatcher: Arc<dyn Dispatcher>,
    runtime: Option<Handle>,
    handlers: Handlers,
}

impl VoiceBuilder {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        microphone: Arc<dyn AudioInput>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            microphone,
            language: language.into(),
            options: AutosuggestOptions::builder(),
            with_coordinates: false,
            dispatcher: Arc::new(InlineDispatcher),
            runtime: None,
            handlers: Handlers::default(),
        }
    }

    /// Start from a prepared set of options
    pub fn options(mut self, options: &AutosuggestOptions) -> Self {
        self.options = options.to_builder();
        self
    }

    pub fn focus(mut self, focus: Coordinates) -> Self {
        self.options = self.options.focus(focus);
        self
    }

    pub fn n_results(mut self, n: u32) -> Self {
        self.options = self.options.n_results(n);
        self
    }

    pub fn n_focus_results(mut self, n: u32) -> Self {
        self.options = self.options.n_focus_results(n);
        self
    }

    pub fn clip_to_circle(mut self, circle: Circle) -> Self {
        self.options = self.options.clip_to_circle(circle);
        self
    }

    pub fn clip_to_bounding_box(mut self, bbox: BoundingBox) -> Self {
        self.options = self.options.clip_to_bounding_box(bbox);
        self
    }

    pub fn clip_to_polygon(mut self, polygon: Polygon) -> Self {
        self.options = self.options.clip_to_polygon(polygon);
        self
    }

    pub fn clip_to_country(mut self, codes: Countries) -> Self {
        self.options = self.options.clip_to_country(codes);
        self
    }

    /// Use the endpoint whose suggestions carry coordinates
    pub fn with_coordinates(mut self, with_coordinates: bool) -> Self {
        self.with_coordinates = with_coordinates;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Runtime that drives the connection; defaults to the caller's or the shared one
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn on_suggestions(mut self, callback: impl Fn(Vec<Suggestion>) + Send + Sync + 'static) -> Self {
        self.handlers.on_suggestions = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(Error) + Send + Sync + 'static) -> Self {
        self.handlers.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_listening(mut self, callback: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.handlers.on_listening = Some(Arc::new(callback));
        self
    }

    /// Validate the options and create an idle session
    pub fn build(self) -> Result<VoiceSession> {
        let options = self.options.build()?;
        let id = Uuid::new_v4();
        debug!("Voice session {} created for language {}", id, self.language);

        Ok(VoiceSession {
            inner: Arc::new(SessionInner {
                id,
                transport: self.transport,
                microphone: self.microphone,
                dispatcher: self.dispatcher,
                runtime: self.runtime,
                state: Mutex::new(SessionState {
                    language: self.language,
                    options,
                    with_coordinates: self.with_coordinates,
                    generation: 0,
                    active: None,
                }),
                capture: Mutex::new(None),
                handlers: Arc::new(Mutex::new(self.handlers)),
            }),
        })
    }
}

struct ActiveListen {
    generation: u64,
    shutdown: oneshot::Sender<()>,
    waiter: Option<Waiter>,
}

struct SessionState {
    language: String,
    options: AutosuggestOptions,
    with_coordinates: bool,
    generation: u64,
    active: Option<ActiveListen>,
}

enum Outcome {
    Suggestions(Vec<Suggestion>),
    Failed(Error),
}

struct SessionInner {
    id: Uuid,
    transport: Arc<dyn VoiceTransport>,
    microphone: Arc<dyn AudioInput>,
    dispatcher: Arc<dyn Dispatcher>,
    runtime: Option<Handle>,
    state: Mutex<SessionState>,
    /// Generation whose capture is running; taken before `state`, never after
    capture: Mutex<Option<u64>>,
    handlers: Arc<Mutex<Handlers>>,
}

/// One voice autosuggest lifecycle at a time over one microphone and one transport
pub struct VoiceSession {
    inner: Arc<SessionInner>,
}

impl VoiceSession {
    /// Identifier used in log lines
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Open a connection and start listening. No-op if already listening.
    ///
    /// Only fails when no async runtime is available; everything after that is
    /// reported through the error callback.
    pub fn start_listening(&self) -> Result<()> {
        self.inner.begin(None).map(|_| ())
    }

    /// Stop the microphone and drop the connection. No callback fires.
    pub fn stop_listening(&self) {
        self.inner.stop();
    }

    pub fn is_listening(&self) -> bool {
        self.inner.state.lock().active.is_some()
    }

    /// Listen once and resolve with the outcome instead of firing callbacks
    pub async fn listen(&self) -> Result<Vec<Suggestion>> {
        let (tx, rx) = oneshot::channel();
        if !self.inner.begin(Some(tx))? {
            return Err(Error::InvalidState("voice session is already listening".to_string()));
        }
        rx.await.unwrap_or_else(|_| {
            Err(Error::InvalidState(
                "voice session stopped before a result".to_string(),
            ))
        })
    }

    /// Current options
    pub fn options(&self) -> AutosuggestOptions {
        self.inner.state.lock().options.clone()
    }

    /// Replace the options; only allowed while idle
    pub fn set_options(&self, options: AutosuggestOptions) -> Result<()> {
        options.validate()?;
        let mut state = self.inner.state.lock();
        if state.active.is_some() {
            return Err(Error::InvalidState(
                "options cannot change while listening".to_string(),
            ));
        }
        state.options = options;
        Ok(())
    }

    pub fn set_language(&self, language: impl Into<String>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.active.is_some() {
            return Err(Error::InvalidState(
                "language cannot change while listening".to_string(),
            ));
        }
        state.language = language.into();
        Ok(())
    }

    pub fn on_suggestions(&self, callback: impl Fn(Vec<Suggestion>) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_suggestions = Some(Arc::new(callback));
    }

    pub fn on_error(&self, callback: impl Fn(Error) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_error = Some(Arc::new(callback));
    }

    /// Microphone volume in `[0, 1]`, roughly every 100 ms while capturing
    pub fn on_listening(&self, callback: impl Fn(f32) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_listening = Some(Arc::new(callback));
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl SessionInner {
    /// Returns false when a listen was already in progress
    fn begin(self: &Arc<Self>, waiter: Option<Waiter>) -> Result<bool> {
        let handle = match &self.runtime {
            Some(handle) => handle.clone(),
            None => runtime::handle()?,
        };

        let mut state = self.state.lock();
        if state.active.is_some() {
            debug!("Voice session {} already listening", self.id);
            return Ok(false);
        }

        state.generation += 1;
        let generation = state.generation;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        state.active = Some(ActiveListen {
            generation,
            shutdown: shutdown_tx,
            waiter,
        });

        let mut params = VoiceParams::new(
            state.language.clone(),
            state.options.clone(),
            self.microphone.sample_rate(),
        )
        .with_coordinates(state.with_coordinates);
        params.encoding = self.microphone.encoding();
        drop(state);

        info!(
            "Voice session {} listening (generation {}, transport {})",
            self.id,
            generation,
            self.transport.name()
        );
        handle.spawn(run_listen(Arc::clone(self), generation, params, shutdown_rx));
        Ok(true)
    }

    fn stop(&self) {
        let Some(active) = self.state.lock().active.take() else {
            return;
        };
        let _ = active.shutdown.send(());
        self.release_microphone(active.generation);
        info!(
            "Voice session {} stopped (generation {})",
            self.id, active.generation
        );
    }

    /// Start capture for `generation` if it is still the active listen.
    ///
    /// Blocks until the device is open, so callers on a runtime go through
    /// `spawn_blocking`.
    fn start_microphone(
        &self,
        generation: u64,
        frames: tokio::sync::mpsc::UnboundedSender<AudioData>,
    ) -> Result<()> {
        let mut capture = self.capture.lock();
        if !is_current(&self.state.lock(), generation) {
            return Ok(());
        }
        self.microphone.start(frames, Some(self.level_callback()))?;
        *capture = Some(generation);
        drop(capture);

        // stopped while the device was opening
        if !is_current(&self.state.lock(), generation) {
            self.release_microphone(generation);
        }
        Ok(())
    }

    /// Stop the microphone if `generation` owns it. Never called with `state` held.
    fn release_microphone(&self, generation: u64) {
        let mut capture = self.capture.lock();
        if *capture == Some(generation) {
            self.microphone.stop();
            *capture = None;
        }
    }

    fn level_callback(&self) -> LevelCallback {
        let handlers = Arc::clone(&self.handlers);
        let dispatcher = Arc::clone(&self.dispatcher);
        Arc::new(move |level: f32| {
            let on_listening = handlers.lock().on_listening.clone();
            if let Some(on_listening) = on_listening {
                dispatcher.dispatch(Box::new(move || on_listening(level)));
            }
        })
    }

    /// Deliver the terminal outcome of `generation`, unless it has been superseded
    fn finish(&self, generation: u64, outcome: Outcome) {
        let waiter = {
            let mut state = self.state.lock();
            if !is_current(&state, generation) {
                debug!(
                    "Voice session {} dropping result of stale generation {}",
                    self.id, generation
                );
                return;
            }
            state.active.take().and_then(|active| active.waiter)
        };
        self.release_microphone(generation);

        if let Some(waiter) = waiter {
            let result = match outcome {
                Outcome::Suggestions(suggestions) => Ok(suggestions),
                Outcome::Failed(err) => Err(err),
            };
            let _ = waiter.send(result);
            return;
        }

        let handlers = self.handlers.lock().clone();
        match outcome {
            Outcome::Suggestions(suggestions) => {
                info!(
                    "Voice session {} got {} suggestions",
                    self.id,
                    suggestions.len()
                );
                if let Some(on_suggestions) = handlers.on_suggestions {
                    self.dispatcher
                        .dispatch(Box::new(move || on_suggestions(suggestions)));
                }
            }
            Outcome::Failed(err) => {
                warn!("Voice session {} failed: {}", self.id, err);
                if let Some(on_error) = handlers.on_error {
                    self.dispatcher.dispatch(Box::new(move || on_error(err)));
                }
            }
        }
    }
}

fn is_current(state: &SessionState, generation: u64) -> bool {
    matches!(&state.active, Some(active) if active.generation == generation)
}

async fn run_listen(
    inner: Arc<SessionInner>,
    generation: u64,
    params: VoiceParams,
    mut shutdown: oneshot::Receiver<()>,
) {
    let opened = tokio::select! {
        _ = &mut shutdown => return,
        opened = inner.transport.open(&params) => opened,
    };

    let mut channel = match opened {
        Ok(channel) => channel,
        Err(err) => {
            inner.finish(generation, Outcome::Failed(err));
            return;
        }
    };

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                channel.close();
                return;
            }

            event = channel.next_event() => {
                let outcome = match event {
                    Some(VoiceEvent::RecognitionStarted) => {
                        debug!("Voice session {} recognition started", inner.id);
                        let starter = Arc::clone(&inner);
                        let frames = channel.audio_sender();
                        let started = tokio::task::spawn_blocking(move || {
                            starter.start_microphone(generation, frames)
                        })
                        .await
                        .unwrap_or_else(|e| Err(Error::Audio(format!("microphone start panicked: {e}"))));
                        match started {
                            Ok(()) => continue,
                            Err(err) => Outcome::Failed(err),
                        }
                    }
                    Some(VoiceEvent::Suggestions(suggestions)) => Outcome::Suggestions(suggestions),
                    Some(VoiceEvent::Failed(err)) => Outcome::Failed(err),
                    None => Outcome::Failed(Error::Transport(
                        "voice connection dropped without a result".to_string(),
                    )),
                };

                channel.close();
                inner.finish(generation, outcome);
                return;
            }
        }
    }
}
