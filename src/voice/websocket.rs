//! what3words voice API over a WebSocket
//!
//! Autosuggest parameters travel in the URL query string, the audio format in a
//! `StartRecognition` message. After that the client streams raw PCM as binary
//! frames until the service answers with suggestions or an error.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use super::transport::{VoiceChannel, VoiceEvent, VoiceParams, VoiceTransport};
use crate::AudioData;
use crate::config::{ClientConfig, DEFAULT_VOICE_ENDPOINT, base_url};
use crate::error::{ApiError, Error, ErrorCode, Result};
use crate::types::Suggestion;

const PATH_AUTOSUGGEST: &str = "autosuggest";
const PATH_AUTOSUGGEST_WITH_COORDINATES: &str = "autosuggest-with-coordinates";

/// Limit on the handshake plus the `StartRecognition` send
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Languages the voice service recognizes, keyed by their voice code
pub const VOICE_LANGUAGES: [&str; 8] = ["ar", "cmn", "de", "en", "es", "hi", "ja", "ko"];

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map a what3words language or locale to the code the voice service expects.
///
/// Chinese variants become `cmn`, regional locales (`en_gb`, `es-MX`) reduce to
/// their language.
pub fn voice_language(language: &str) -> String {
    let base = language
        .split(['_', '-'])
        .next()
        .unwrap_or(language)
        .to_ascii_lowercase();
    if base == "zh" { "cmn".to_string() } else { base }
}

pub fn supports_voice_language(language: &str) -> bool {
    VOICE_LANGUAGES.contains(&voice_language(language).as_str())
}

/// Voice transport backed by tokio-tungstenite
pub struct WebSocketVoiceTransport {
    api_key: String,
    base_url: Url,
    connect_timeout: Duration,
}

impl WebSocketVoiceTransport {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(api_key, DEFAULT_VOICE_ENDPOINT)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: &str) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url(endpoint)?,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Uses the config's timeout for connecting when one is set
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = Self::with_endpoint(config.api_key.clone(), &config.voice_endpoint)?;
        Ok(match config.timeout() {
            Some(limit) => transport.with_connect_timeout(limit),
            None => transport,
        })
    }

    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }

    /// Full socket URL for a session, key included
    pub fn socket_url(&self, params: &VoiceParams) -> Result<Url> {
        let path = if params.with_coordinates {
            PATH_AUTOSUGGEST_WITH_COORDINATES
        } else {
            PATH_AUTOSUGGEST
        };
        let mut url = self.base_url.join(path)?;

        {
            let options = &params.options;
            let mut query = url.query_pairs_mut();
            query.append_pair("voice-language", &voice_language(&params.language));
            query.append_pair("n-results", &options.n_results.to_string());
            if let Some(focus) = &options.focus {
                query.append_pair("focus", &focus.to_api_string());
                if let Some(n_focus) = options.n_focus_results {
                    query.append_pair("n-focus-results", &n_focus.to_string());
                }
            }
            if let Some(clip) = &options.clip {
                let (name, value) = clip.query_pair();
                query.append_pair(name, &value);
            }
            query.append_pair("key", &self.api_key);
        }

        Ok(url)
    }
}

#[async_trait]
impl VoiceTransport for WebSocketVoiceTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn open(&self, params: &VoiceParams) -> Result<VoiceChannel> {
        let url = self.socket_url(params)?;
        debug!("Connecting to voice API: {}", url.path());

        let start = start_recognition(params.sample_rate, params.encoding.as_str());
        let connect = async {
            let (mut socket, _) = connect_async(url.as_str()).await.map_err(|e| {
                error!("Failed to connect to voice API: {}", e);
                Error::Transport(format!("Connection failed: {e}"))
            })?;
            socket.send(Message::Text(start.into())).await?;
            Ok::<_, Error>(socket)
        };
        let socket = timeout(self.connect_timeout, connect).await.map_err(|_| {
            error!(
                "Voice API did not answer within {} ms",
                self.connect_timeout.as_millis()
            );
            Error::Transport(format!(
                "Connection timed out after {} ms",
                self.connect_timeout.as_millis()
            ))
        })??;
        info!("Voice connection open, {} Hz", params.sample_rate);

        let (audio_tx, audio_rx) = mpsc::unbounded_channel::<AudioData>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<VoiceEvent>();
        let (close_tx, close_rx) = oneshot::channel::<()>();

        tokio::spawn(run_connection(socket, audio_rx, events_tx, close_rx));

        Ok(VoiceChannel::new(audio_tx, events_rx, close_tx))
    }
}

fn start_recognition(sample_rate: u32, encoding: &str) -> String {
    json!({
        "message": "StartRecognition",
        "audio_format": {
            "type": "raw",
            "encoding": encoding,
            "sample_rate": sample_rate,
        }
    })
    .to_string()
}

async fn run_connection(
    socket: Socket,
    mut audio_rx: mpsc::UnboundedReceiver<AudioData>,
    events_tx: mpsc::UnboundedSender<VoiceEvent>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                debug!("Voice connection closed by client");
                let _ = ws_sink.send(close_message("Aborted by user")).await;
                break;
            }

            Some(frame) = audio_rx.recv() => {
                if let Err(e) = ws_sink.send(Message::Binary(frame.into())).await {
                    error!("Failed to send audio frame: {}", e);
                    let _ = events_tx.send(VoiceEvent::Failed(e.into()));
                    break;
                }
            }

            message = ws_stream.next() => {
                let event = match message {
                    Some(Ok(Message::Text(text))) => parse_message(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        let event = close_event(frame.as_ref());
                        let _ = events_tx.send(event);
                        break;
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        warn!("Voice connection error: {}", e);
                        let _ = events_tx.send(VoiceEvent::Failed(e.into()));
                        break;
                    }
                    None => {
                        let _ = events_tx.send(VoiceEvent::Failed(Error::Transport(
                            "connection ended before a result".to_string(),
                        )));
                        break;
                    }
                };

                if let Some(event) = event {
                    let terminal = event.is_terminal();
                    let _ = events_tx.send(event);
                    if terminal {
                        let _ = ws_sink.send(close_message("")).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("Voice connection task finished");
}

fn close_message(reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: reason.to_string().into(),
    }))
}

#[derive(Deserialize)]
struct Envelope {
    message: String,
}

#[derive(Deserialize)]
struct SuggestionsPayload {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}

#[derive(Deserialize)]
struct StreamingErrorPayload {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct W3WErrorPayload {
    error: ApiError,
}

/// Decode one text frame. `None` for message types that need no action.
pub(crate) fn parse_message(text: &str) -> Option<VoiceEvent> {
    match decode_message(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Unreadable voice message: {}", e);
            Some(VoiceEvent::Failed(Error::Api(ApiError::new(
                ErrorCode::UnknownError,
                e.to_string(),
            ))))
        }
    }
}

fn decode_message(text: &str) -> std::result::Result<Option<VoiceEvent>, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;

    let event = match envelope.message.as_str() {
        "RecognitionStarted" => VoiceEvent::RecognitionStarted,
        "Suggestions" => {
            let payload: SuggestionsPayload = serde_json::from_str(text)?;
            debug!("Voice API returned {} suggestions", payload.suggestions.len());
            VoiceEvent::Suggestions(payload.suggestions)
        }
        "Error" => {
            let payload: StreamingErrorPayload = serde_json::from_str(text)?;
            let raw_code = match &payload.code {
                Some(serde_json::Value::String(code)) => Some(code.clone()),
                Some(other) => Some(other.to_string()),
                None => None,
            };
            let code = raw_code
                .as_deref()
                .map(ErrorCode::from_code)
                .filter(|code| *code != ErrorCode::UnknownError)
                .unwrap_or(ErrorCode::StreamingError);
            let mut message = format!(
                "{} - {}",
                payload.kind.unwrap_or_default(),
                payload.reason.unwrap_or_default()
            );
            // codes outside the catalogue survive in the message
            if let Some(raw) = raw_code.filter(|_| code == ErrorCode::StreamingError) {
                message = format!("{message} (code {raw})");
            }
            VoiceEvent::Failed(Error::Api(ApiError::new(code, message)))
        }
        "W3WError" => {
            let payload: W3WErrorPayload = serde_json::from_str(text)?;
            VoiceEvent::Failed(Error::Api(payload.error))
        }
        other => {
            debug!("Ignoring voice message {:?}", other);
            return Ok(None);
        }
    };

    Ok(Some(event))
}

/// Terminal event for a close frame that arrived before any result
fn close_event(frame: Option<&CloseFrame>) -> VoiceEvent {
    match frame {
        Some(frame) if frame.code != CloseCode::Normal && !frame.reason.is_empty() => {
            let reason = frame.reason.as_str();
            let err = serde_json::from_str::<ApiError>(reason)
                .unwrap_or_else(|_| ApiError::new(ErrorCode::UnknownError, reason));
            VoiceEvent::Failed(Error::Api(err))
        }
        Some(frame) => VoiceEvent::Failed(Error::Transport(format!(
            "connection closed ({}) before a result",
            u16::from(frame.code)
        ))),
        None => VoiceEvent::Failed(Error::Transport(
            "connection closed before a result".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AutosuggestOptions;
    use crate::types::{Coordinates, Countries};

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_voice_language_mapping() {
        assert_eq!(voice_language("zh"), "cmn");
        assert_eq!(voice_language("zh_tw"), "cmn");
        assert_eq!(voice_language("en_GB"), "en");
        assert_eq!(voice_language("es-MX"), "es");
        assert_eq!(voice_language("cmn"), "cmn");
        assert!(supports_voice_language("ko"));
        assert!(!supports_voice_language("fr"));
    }

    #[test]
    fn test_socket_url_order_and_values() {
        let transport = WebSocketVoiceTransport::new("secret").unwrap();
        let options = AutosuggestOptions::builder()
            .n_results(5)
            .focus(Coordinates::new(51.5, -0.1).unwrap())
            .n_focus_results(2)
            .clip_to_country(Countries::new(["gb", "be"]).unwrap())
            .build()
            .unwrap();
        let params = VoiceParams::new("zh", options, 16000);

        let url = transport.socket_url(&params).unwrap();
        assert_eq!(url.path(), "/v1/autosuggest");
        assert_eq!(
            query(&url),
            vec![
                ("voice-language".to_string(), "cmn".to_string()),
                ("n-results".to_string(), "5".to_string()),
                ("focus".to_string(), "51.5,-0.1".to_string()),
                ("n-focus-results".to_string(), "2".to_string()),
                ("clip-to-country".to_string(), "GB,BE".to_string()),
                ("key".to_string(), "secret".to_string()),
            ]
        );

        let with_coords = params.with_coordinates(true);
        let url = transport.socket_url(&with_coords).unwrap();
        assert_eq!(url.path(), "/v1/autosuggest-with-coordinates");
    }

    #[test]
    fn test_start_recognition_message() {
        let value: serde_json::Value =
            serde_json::from_str(&start_recognition(44100, "pcm_s16le")).unwrap();
        assert_eq!(value["message"], "StartRecognition");
        assert_eq!(value["audio_format"]["type"], "raw");
        assert_eq!(value["audio_format"]["encoding"], "pcm_s16le");
        assert_eq!(value["audio_format"]["sample_rate"], 44100);
    }

    #[test]
    fn test_parse_suggestions() {
        let text = r#"{"message":"Suggestions","suggestions":[{"words":"filled.count.soap","country":"GB","nearestPlace":"Bayswater, London","rank":1,"language":"en"}]}"#;
        match parse_message(text) {
            Some(VoiceEvent::Suggestions(list)) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].words, "filled.count.soap");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_streaming_error() {
        let text = r#"{"message":"Error","type":"protocol_error","reason":"bad audio"}"#;
        match parse_message(text) {
            Some(VoiceEvent::Failed(Error::Api(err))) => {
                assert_eq!(err.code, ErrorCode::StreamingError);
                assert_eq!(err.message, "protocol_error - bad audio");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_streaming_error_keeps_numeric_code() {
        let text = r#"{"message":"Error","code":4005,"type":"quota_exceeded","reason":"too many sessions"}"#;
        match parse_message(text) {
            Some(VoiceEvent::Failed(Error::Api(err))) => {
                assert_eq!(err.code, ErrorCode::StreamingError);
                assert_eq!(err.message, "quota_exceeded - too many sessions (code 4005)");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let text = r#"{"message":"Error","code":"InvalidKey","type":"auth","reason":"bad key"}"#;
        match parse_message(text) {
            Some(VoiceEvent::Failed(Error::Api(err))) => {
                assert_eq!(err.code, ErrorCode::InvalidKey);
                assert_eq!(err.message, "auth - bad key");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_connect_timeout_from_config() {
        let config = ClientConfig::new("key").with_timeout(Duration::from_millis(1500));
        let transport = WebSocketVoiceTransport::from_config(&config).unwrap();
        assert_eq!(transport.connect_timeout, Duration::from_millis(1500));

        let transport = WebSocketVoiceTransport::new("key").unwrap();
        assert_eq!(transport.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_parse_w3w_error() {
        let text = r#"{"message":"W3WError","error":{"code":"BadClipToCountry","message":"invalid country"}}"#;
        match parse_message(text) {
            Some(VoiceEvent::Failed(Error::Api(err))) => {
                assert_eq!(err.code, ErrorCode::BadClipToCountry);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_garbage_and_unknown() {
        assert!(matches!(
            parse_message("not json"),
            Some(VoiceEvent::Failed(Error::Api(ApiError {
                code: ErrorCode::UnknownError,
                ..
            })))
        ));
        assert!(parse_message(r#"{"message":"AudioAdded","seq_no":3}"#).is_none());
        assert!(matches!(
            parse_message(r#"{"message":"RecognitionStarted"}"#),
            Some(VoiceEvent::RecognitionStarted)
        ));
    }

    #[test]
    fn test_close_reason_handling() {
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: r#"{"code":"InvalidKey","message":"bad key"}"#.into(),
        };
        match close_event(Some(&frame)) {
            VoiceEvent::Failed(Error::Api(err)) => assert_eq!(err.code, ErrorCode::InvalidKey),
            other => panic!("unexpected event: {other:?}"),
        }

        let frame = CloseFrame {
            code: CloseCode::Error,
            reason: "overloaded".into(),
        };
        match close_event(Some(&frame)) {
            VoiceEvent::Failed(Error::Api(err)) => {
                assert_eq!(err.code, ErrorCode::UnknownError);
                assert_eq!(err.message, "overloaded");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(matches!(
            close_event(None),
            VoiceEvent::Failed(Error::Transport(_))
        ));
    }
}
