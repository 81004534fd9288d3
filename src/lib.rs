pub mod commands;
pub mod config;
pub mod http;
pub mod runtime;

pub use config::{ClientConfig, ConfigError, Mode};
pub use http::{ApiClient, ApiClientError, QueryParams, RequestOptions, create_api_client};
