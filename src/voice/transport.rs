//! Voice transport trait and types

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::AudioData;
use crate::audio::AudioEncoding;
use crate::error::{Error, Result};
use crate::options::AutosuggestOptions;
use crate::types::Suggestion;

/// Everything needed to open one voice connection
#[derive(Debug, Clone)]
pub struct VoiceParams {
    /// Spoken language, e.g. "en" or "zh_tw"
    pub language: String,
    pub options: AutosuggestOptions,
    /// Ask for suggestions with coordinates
    pub with_coordinates: bool,
    pub sample_rate: u32,
    pub encoding: AudioEncoding,
}

impl VoiceParams {
    pub fn new(language: impl Into<String>, options: AutosuggestOptions, sample_rate: u32) -> Self {
        Self {
            language: language.into(),
            options,
            with_coordinates: false,
            sample_rate,
            encoding: AudioEncoding::PcmS16Le,
        }
    }

    pub fn with_coordinates(mut self, with_coordinates: bool) -> Self {
        self.with_coordinates = with_coordinates;
        self
    }
}

/// What the remote side reports
#[derive(Debug)]
pub enum VoiceEvent {
    /// Ready for audio
    RecognitionStarted,
    /// Terminal: the recognized addresses
    Suggestions(Vec<Suggestion>),
    /// Terminal: the connection or the service failed
    Failed(Error),
}

impl VoiceEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::RecognitionStarted)
    }
}

/// Duplex handle on an open connection.
///
/// Closing (or dropping) it tears the connection down without waiting for the peer.
pub struct VoiceChannel {
    audio: mpsc::UnboundedSender<AudioData>,
    events: mpsc::UnboundedReceiver<VoiceEvent>,
    close: Option<oneshot::Sender<()>>,
}

impl VoiceChannel {
    pub fn new(
        audio: mpsc::UnboundedSender<AudioData>,
        events: mpsc::UnboundedReceiver<VoiceEvent>,
        close: oneshot::Sender<()>,
    ) -> Self {
        Self {
            audio,
            events,
            close: Some(close),
        }
    }

    /// Sender for captured audio frames
    pub fn audio_sender(&self) -> mpsc::UnboundedSender<AudioData> {
        self.audio.clone()
    }

    /// Next event, `None` once the connection is gone
    pub async fn next_event(&mut self) -> Option<VoiceEvent> {
        self.events.recv().await
    }

    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

impl Drop for VoiceChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Trait for voice autosuggest transports
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Get the transport name
    fn name(&self) -> &'static str;

    /// Open a connection and announce the audio format
    async fn open(&self, params: &VoiceParams) -> Result<VoiceChannel>;
}
