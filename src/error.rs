//! Error types for the what3words client

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in the what3words client
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// The audio device could not be opened (usually a missing permission)
    #[error("Microphone permission error: {0}")]
    Permission(String),

    /// Connection failure, unexpected close or timeout on the voice stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// Structured error returned by the what3words service
    #[error("API error: {0}")]
    Api(ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Operation not allowed in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The service error payload, if this is an API error
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Collapse any error into the code + message shape hosts receive
    pub fn to_api_error(&self) -> ApiError {
        match self {
            Self::Api(err) => err.clone(),
            Self::Network(_) | Self::Transport(_) => {
                ApiError::new(ErrorCode::NetworkError, self.to_string())
            }
            Self::Validation(_) | Self::Config(_) | Self::InvalidState(_) => {
                ApiError::new(ErrorCode::SdkError, self.to_string())
            }
            _ => ApiError::new(ErrorCode::UnknownError, self.to_string()),
        }
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Error codes the what3words APIs report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadCoordinates,
    BadLanguage,
    BadWords,
    BadInput,
    BadNResults,
    BadNFocusResults,
    BadFocus,
    BadClipToCircle,
    BadClipToBoundingBox,
    BadClipToCountry,
    BadClipToPolygon,
    BadInputType,
    BadBoundingBox,
    BadBoundingBoxTooBig,
    InternalServerError,
    InvalidKey,
    SuspendedKey,
    QuotaExceeded,
    InvalidApiVersion,
    InvalidReferrer,
    InvalidIpAddress,
    InvalidAppCredentials,
    NetworkError,
    SdkError,
    StreamingError,
    UnknownError,
}

impl ErrorCode {
    /// Map a wire code to a known variant; anything unrecognised is `UnknownError`
    pub fn from_code(code: &str) -> Self {
        match code {
            "BadCoordinates" => Self::BadCoordinates,
            "BadLanguage" => Self::BadLanguage,
            "BadWords" => Self::BadWords,
            "BadInput" => Self::BadInput,
            "BadNResults" => Self::BadNResults,
            "BadNFocusResults" => Self::BadNFocusResults,
            "BadFocus" => Self::BadFocus,
            "BadClipToCircle" => Self::BadClipToCircle,
            "BadClipToBoundingBox" => Self::BadClipToBoundingBox,
            "BadClipToCountry" => Self::BadClipToCountry,
            "BadClipToPolygon" => Self::BadClipToPolygon,
            "BadInputType" => Self::BadInputType,
            "BadBoundingBox" => Self::BadBoundingBox,
            "BadBoundingBoxTooBig" => Self::BadBoundingBoxTooBig,
            "InternalServerError" => Self::InternalServerError,
            "InvalidKey" => Self::InvalidKey,
            "SuspendedKey" => Self::SuspendedKey,
            "QuotaExceeded" => Self::QuotaExceeded,
            "InvalidApiVersion" => Self::InvalidApiVersion,
            "InvalidReferrer" => Self::InvalidReferrer,
            "InvalidIpAddress" => Self::InvalidIpAddress,
            "InvalidAppCredentials" => Self::InvalidAppCredentials,
            "NetworkError" => Self::NetworkError,
            "SdkError" => Self::SdkError,
            "StreamingError" => Self::StreamingError,
            _ => Self::UnknownError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadCoordinates => "BadCoordinates",
            Self::BadLanguage => "BadLanguage",
            Self::BadWords => "BadWords",
            Self::BadInput => "BadInput",
            Self::BadNResults => "BadNResults",
            Self::BadNFocusResults => "BadNFocusResults",
            Self::BadFocus => "BadFocus",
            Self::BadClipToCircle => "BadClipToCircle",
            Self::BadClipToBoundingBox => "BadClipToBoundingBox",
            Self::BadClipToCountry => "BadClipToCountry",
            Self::BadClipToPolygon => "BadClipToPolygon",
            Self::BadInputType => "BadInputType",
            Self::BadBoundingBox => "BadBoundingBox",
            Self::BadBoundingBoxTooBig => "BadBoundingBoxTooBig",
            Self::InternalServerError => "InternalServerError",
            Self::InvalidKey => "InvalidKey",
            Self::SuspendedKey => "SuspendedKey",
            Self::QuotaExceeded => "QuotaExceeded",
            Self::InvalidApiVersion => "InvalidApiVersion",
            Self::InvalidReferrer => "InvalidReferrer",
            Self::InvalidIpAddress => "InvalidIpAddress",
            Self::InvalidAppCredentials => "InvalidAppCredentials",
            Self::NetworkError => "NetworkError",
            Self::SdkError => "SdkError",
            Self::StreamingError => "StreamingError",
            Self::UnknownError => "UnknownError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from_code(&code))
    }
}

/// Error payload returned by the service: a code and a human readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip_through_json() {
        let err: ApiError =
            serde_json::from_str(r#"{"code":"BadWords","message":"invalid words"}"#).unwrap();
        assert_eq!(err.code, ErrorCode::BadWords);
        assert_eq!(err.message, "invalid words");

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains(r#""code":"BadWords""#));
    }

    #[test]
    fn test_unknown_code_falls_back() {
        assert_eq!(ErrorCode::from_code("SomethingNew"), ErrorCode::UnknownError);
        assert_eq!(ErrorCode::from_code(""), ErrorCode::UnknownError);
    }

    #[test]
    fn test_to_api_error_categories() {
        let err = Error::Transport("socket closed".to_string());
        assert_eq!(err.to_api_error().code, ErrorCode::NetworkError);

        let err = Error::Validation("bad polygon".to_string());
        assert_eq!(err.to_api_error().code, ErrorCode::SdkError);

        let err = Error::Api(ApiError::new(ErrorCode::InvalidKey, "nope"));
        assert_eq!(err.api_error().map(|e| e.code), Some(ErrorCode::InvalidKey));
    }
}
