//! CLI commands over [`ApiClient`](crate::http::ApiClient).

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::http::{ApiClientError, QueryParams};

pub mod config;
mod health;
mod request;
mod upload;

pub use health::health;
pub use request::{Mutation, delete, get, send};
pub use upload::upload;

/// Converts a client error into a message carrying its code and status.
pub(crate) fn describe(error: ApiClientError) -> anyhow::Error {
    anyhow!("{} ({}, status {})", error.message, error.code, error.status)
}

/// Parses `key=value` arguments into query parameters.
pub(crate) fn parse_query(pairs: &[String]) -> Result<QueryParams> {
    let mut params = QueryParams::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid query parameter '{}', expected key=value", pair))?;
        if key.is_empty() {
            anyhow::bail!("Invalid query parameter '{}': empty key", pair);
        }
        params.insert(key, value);
    }
    Ok(params)
}

pub(crate) fn print_json(value: &Value) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
