//! what3words - three word address client with voice autosuggest
//!
//! REST conversion and autosuggest against the what3words v3 API, plus a voice
//! session that streams microphone audio to the voice API and returns suggestions.
//! A C ABI is exported for mobile host shells.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod ffi;
pub mod helper;
pub mod options;
pub mod runtime;
pub mod text;
pub mod types;
pub mod voice;

pub use error::{ApiError, Error, ErrorCode, Result};
pub use types::*;

// Export FFI functions at crate root for C header generation
pub use ffi::*;

/// Re-export the main client components for convenience
pub use api::{ApiRequest, SourceApi, What3WordsV3};
pub use audio::{AudioEncoding, AudioInput, Microphone};
pub use config::{AppIdentity, ClientConfig};
pub use helper::{AutosuggestHelper, AutosuggestOutcome};
pub use options::{AutosuggestOptions, AutosuggestOptionsBuilder, ClipFilter, InputType};
pub use text::{did_you_mean_3wa, is_possible_3wa, search_possible_3wa};
pub use voice::{VoiceBuilder, VoiceSession, VoiceTransport, WebSocketVoiceTransport};
