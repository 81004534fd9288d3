//! Client configuration and environment loading.

use log::debug;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::http::RetryPolicy;
use crate::runtime::Runtime;

/// Environment variable holding the API base address.
pub const API_URL_VAR: &str = "API_URL";

/// Environment variable selecting the deployment mode.
pub const APP_ENV_VAR: &str = "APP_ENV";

/// Environment variable holding an initial bearer token.
pub const API_TOKEN_VAR: &str = "API_TOKEN";

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
pub const HEALTH_PATH: &str = "/health";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub const DEFAULT_USER_AGENT: &str = concat!("apiclient/", env!("APICLIENT_VERSION"));

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {name}")]
    MissingVar { name: &'static str },

    #[error("Invalid {var} value '{value}': expected development, production or test")]
    InvalidMode { var: &'static str, value: String },

    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Deployment mode. Verbose request logging is on only in development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Development,
    Production,
    Test,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            "test" => Ok(Mode::Test),
            _ => Err(ConfigError::InvalidMode {
                var: APP_ENV_VAR,
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Production => write!(f, "production"),
            Mode::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub default_headers: HeaderMap,
    pub timeout: Duration,
    pub upload_timeout: Duration,
    pub retry: RetryPolicy,
    pub verbose: bool,
    pub user_agent: String,
}

impl ClientConfig {
    /// Configuration for `base_url` with JSON default headers and
    /// development-mode logging.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.into(),
            default_headers,
            timeout: DEFAULT_TIMEOUT,
            upload_timeout: UPLOAD_TIMEOUT,
            retry: RetryPolicy::default(),
            verbose: Mode::default() == Mode::Development,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Loads the base address and mode from the environment.
    ///
    /// In production the base address is required; elsewhere it falls back
    /// to [`DEFAULT_BASE_URL`].
    pub fn from_env<R: Runtime>(runtime: &R) -> Result<Self, ConfigError> {
        Self::from_env_with(runtime, None)
    }

    /// Like [`from_env`](Self::from_env), with `base_url` taking precedence
    /// over `API_URL` when given.
    pub fn from_env_with<R: Runtime>(
        runtime: &R,
        base_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mode = match runtime.env_var(APP_ENV_VAR) {
            Ok(value) => value.parse::<Mode>()?,
            Err(_) => Mode::default(),
        };

        let base_url = match base_url.or_else(|| runtime.env_var(API_URL_VAR).ok()) {
            Some(url) if !url.trim().is_empty() => url,
            _ if mode == Mode::Production => {
                return Err(ConfigError::MissingVar { name: API_URL_VAR });
            }
            _ => DEFAULT_BASE_URL.to_string(),
        };
        debug!("Using base URL {} in {} mode", base_url, mode);

        let config = Self::new(base_url).mode(mode);
        config.validate()?;
        Ok(config)
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.verbose = mode == Mode::Development;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Checks that the base address is an absolute http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
