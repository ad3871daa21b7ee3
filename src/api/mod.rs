//! what3words REST API (v3)
//!
//! [`What3WordsV3`] owns the HTTP client and hands out one request builder per
//! endpoint. Every builder implements [`ApiRequest`]: `send().await` from async code,
//! `execute()` from synchronous code. A request maps to exactly one HTTP call, with no
//! caching and no retries.

mod requests;
mod response;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::{debug, error};
use url::Url;

use crate::audio::Microphone;
use crate::config::{ClientConfig, base_url};
use crate::error::{ApiError, Error, ErrorCode, Result};
use crate::runtime;
use crate::types::{BoundingBox, Coordinates};
use crate::voice::{VoiceBuilder, WebSocketVoiceTransport};

pub use requests::{
    AutosuggestRequest, AutosuggestSelectionRequest, AvailableLanguagesRequest,
    ConvertTo3waRequest, ConvertToCoordinatesRequest, GridSectionRequest, SourceApi,
};

pub const HEADER_API_KEY: &str = "X-Api-Key";
pub const HEADER_WRAPPER: &str = "X-W3W-Wrapper";
pub const HEADER_APP_PACKAGE: &str = "X-Android-Package";
pub const HEADER_APP_CERT: &str = "X-Android-Cert";

/// A single-shot API call
#[async_trait]
pub trait ApiRequest: Sized + Send {
    type Output: Send;

    /// Perform the HTTP round trip
    async fn send(self) -> Result<Self::Output>;

    /// Block the calling thread until the round trip completes.
    ///
    /// Must not be called from inside an async runtime; use [`ApiRequest::send`] there.
    fn execute(self) -> Result<Self::Output> {
        runtime::block_on(self.send())?
    }
}

/// Client for the what3words v3 API
#[derive(Clone)]
pub struct What3WordsV3 {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: Client,
    config: ClientConfig,
    endpoint: Url,
}

impl What3WordsV3 {
    /// Create a client with the default endpoints
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::new(api_key))
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder().default_headers(default_headers(&config)?);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        let endpoint = base_url(&config.endpoint)?;

        debug!("what3words client created for {}", endpoint);

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                endpoint,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Convert coordinates to a three word address
    pub fn convert_to_3wa(&self, coordinates: Coordinates) -> ConvertTo3waRequest {
        ConvertTo3waRequest::new(self.clone(), coordinates)
    }

    /// Convert a three word address to coordinates
    pub fn convert_to_coordinates(&self, words: impl Into<String>) -> ConvertToCoordinatesRequest {
        ConvertToCoordinatesRequest::new(self.clone(), words.into())
    }

    /// Suggest three word addresses for a partial input
    pub fn autosuggest(&self, input: impl Into<String>) -> AutosuggestRequest {
        AutosuggestRequest::new(self.clone(), input.into(), false)
    }

    /// Like [`Self::autosuggest`] but every suggestion carries coordinates
    pub fn autosuggest_with_coordinates(&self, input: impl Into<String>) -> AutosuggestRequest {
        AutosuggestRequest::new(self.clone(), input.into(), true)
    }

    /// Grid lines inside a bounding box
    pub fn grid_section(&self, bounding_box: BoundingBox) -> GridSectionRequest {
        GridSectionRequest::new(self.clone(), bounding_box)
    }

    /// Report which suggestion the user picked for `raw_input`
    pub fn autosuggestion_selection(
        &self,
        raw_input: impl Into<String>,
        selection: impl Into<String>,
        rank: u32,
        source: SourceApi,
    ) -> AutosuggestSelectionRequest {
        AutosuggestSelectionRequest::new(
            self.clone(),
            raw_input.into(),
            selection.into(),
            rank,
            source,
        )
    }

    pub fn available_languages(&self) -> AvailableLanguagesRequest {
        AvailableLanguagesRequest::new(self.clone())
    }

    /// Voice autosuggest over the configured voice endpoint and the default microphone
    pub fn autosuggest_voice(&self, language: impl Into<String>) -> Result<VoiceBuilder> {
        let transport = WebSocketVoiceTransport::from_config(&self.inner.config)?;
        Ok(VoiceBuilder::new(
            Arc::new(transport),
            Arc::new(Microphone::new()),
            language,
        ))
    }

    /// GET `path` with the given query and decode either the payload or the error body
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<T> {
        let (status, body) = self.fetch(path, query).await?;
        decode_response(status, &body)
    }

    /// GET `path` for its side effect; an empty success body is fine
    pub(crate) async fn get_empty(
        &self,
        path: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<()> {
        let (status, body) = self.fetch(path, query).await?;
        if status.is_success() && body.trim().is_empty() {
            return Ok(());
        }
        decode_response::<IgnoredAny>(status, &body).map(|_| ())
    }

    async fn fetch(
        &self,
        path: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<(reqwest::StatusCode, String)> {
        let mut url = self.inner.endpoint.join(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &query {
                pairs.append_pair(key, value);
            }
        }

        debug!("Sending request to what3words: {}", path);

        let response = self.inner.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

fn decode_response<T: DeserializeOwned>(status: reqwest::StatusCode, body: &str) -> Result<T> {
    #[derive(serde::Deserialize)]
    struct ErrorEnvelope {
        error: Option<ApiError>,
    }

    if let Ok(ErrorEnvelope { error: Some(err) }) = serde_json::from_str::<ErrorEnvelope>(body) {
        error!("what3words API error: {} ({})", err, status);
        return Err(Error::Api(err));
    }

    if !status.is_success() {
        error!("what3words API error: {} - {}", status, body);
        let code = if status.is_server_error() {
            ErrorCode::InternalServerError
        } else {
            ErrorCode::UnknownError
        };
        return Err(Error::Api(ApiError::new(
            code,
            format!("HTTP {}: {}", status.as_u16(), body),
        )));
    }

    Ok(serde_json::from_str(body)?)
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(HEADER_API_KEY, header_value(&config.api_key)?);
    headers.insert(HEADER_WRAPPER, header_value(&wrapper_agent())?);

    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid header name {name:?}: {e}")))?;
        headers.insert(name, header_value(value)?);
    }

    if let Some(identity) = &config.app_identity {
        headers.insert(HEADER_APP_PACKAGE, header_value(&identity.package_name)?);
        if let Some(signature) = &identity.signature {
            headers.insert(HEADER_APP_CERT, header_value(signature)?);
        }
    }

    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Config(format!("Invalid header value: {e}")))
}

/// Identifies this library to the service
pub fn wrapper_agent() -> String {
    format!(
        "what3words-Rust/{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppIdentity;

    #[test]
    fn test_default_headers() {
        let config = ClientConfig::new("secret")
            .with_header("X-Correlation-Id", "abc")
            .with_app_identity(AppIdentity {
                package_name: "com.example.app".to_string(),
                signature: Some("AB:CD".to_string()),
            });
        let headers = default_headers(&config).unwrap();

        assert_eq!(headers.get(HEADER_API_KEY).unwrap(), "secret");
        assert_eq!(headers.get("X-Correlation-Id").unwrap(), "abc");
        assert_eq!(headers.get(HEADER_APP_PACKAGE).unwrap(), "com.example.app");
        assert_eq!(headers.get(HEADER_APP_CERT).unwrap(), "AB:CD");
        assert!(
            headers
                .get(HEADER_WRAPPER)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("what3words-Rust/")
        );
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let config = ClientConfig::new("secret").with_header("bad header", "x");
        assert!(matches!(default_headers(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_decode_error_envelope() {
        let body = r#"{"error":{"code":"BadWords","message":"words must be a valid 3 word address"}}"#;
        let result: Result<serde_json::Value> = decode_response(reqwest::StatusCode::BAD_REQUEST, body);
        match result {
            Err(Error::Api(err)) => assert_eq!(err.code, ErrorCode::BadWords),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_decode_non_json_failure() {
        let result: Result<serde_json::Value> =
            decode_response(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        match result {
            Err(Error::Api(err)) => {
                assert_eq!(err.code, ErrorCode::InternalServerError);
                assert!(err.message.contains("502"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
