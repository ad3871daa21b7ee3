//! Voice autosuggest: stream microphone audio, get three word addresses back
mod session;
mod transport;
mod websocket;

pub use session::{
    Dispatcher, ErrorCallback, InlineDispatcher, SuggestionsCallback, Task, VoiceBuilder, VoiceSession,
};
pub use transport::{VoiceChannel, VoiceEvent, VoiceParams, VoiceTransport};
pub use websocket::{
    VOICE_LANGUAGES, WebSocketVoiceTransport, supports_voice_language, voice_language,
};
