//! Client configuration

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default REST endpoint (v3)
pub const DEFAULT_ENDPOINT: &str = "https://api.what3words.com/v3/";

/// Default voice endpoint
pub const DEFAULT_VOICE_ENDPOINT: &str = "wss://voiceapi.what3words.com/v1/";

pub const ENV_API_KEY: &str = "W3W_API_KEY";
pub const ENV_ENDPOINT: &str = "W3W_ENDPOINT";
pub const ENV_VOICE_ENDPOINT: &str = "W3W_VOICE_ENDPOINT";

/// Opaque credential the host platform derives for its app (package name plus
/// signing certificate digest). Forwarded as headers, never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub package_name: String,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Configuration for [`crate::api::What3WordsV3`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_key: String,
    pub endpoint: String,
    pub voice_endpoint: String,
    /// Extra headers sent with every REST request
    pub headers: BTreeMap<String, String>,
    pub app_identity: Option<AppIdentity>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            voice_endpoint: DEFAULT_VOICE_ENDPOINT.to_string(),
            headers: BTreeMap::new(),
            app_identity: None,
            timeout_ms: None,
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Build from the environment; an explicit key takes precedence over `W3W_API_KEY`
    pub fn from_env(api_key: Option<String>) -> Result<Self> {
        let key = api_key
            .or_else(|| std::env::var(ENV_API_KEY).ok())
            .ok_or_else(|| Error::Config(format!("API key not set ({ENV_API_KEY})")))?;

        let mut config = Self::new(key);
        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            debug!("Using REST endpoint from environment: {}", endpoint);
            config.endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var(ENV_VOICE_ENDPOINT) {
            debug!("Using voice endpoint from environment: {}", endpoint);
            config.voice_endpoint = endpoint;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_voice_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.voice_endpoint = endpoint.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_app_identity(mut self, identity: AppIdentity) -> Self {
        self.app_identity = Some(identity);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("API key must not be empty".to_string()));
        }
        url::Url::parse(&self.endpoint)?;
        url::Url::parse(&self.voice_endpoint)?;
        Ok(())
    }
}

/// Make sure a base URL ends with a slash so relative joins keep its path
pub(crate) fn base_url(raw: &str) -> Result<url::Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Ok(url::Url::parse(&with_slash)?)
}
