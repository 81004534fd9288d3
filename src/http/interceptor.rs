//! Ordered request and response transformers.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::fmt;
use std::sync::Arc;

/// An outgoing request as seen by request interceptors.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

/// A received response, fully buffered, as seen by response interceptors.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

type Stage<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Pure `T -> T` functions applied in registration order.
pub struct InterceptorChain<T> {
    stages: Vec<Stage<T>>,
}

impl<T> InterceptorChain<T> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn push<F>(&mut self, stage: F)
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.stages.push(Arc::new(stage));
    }

    pub fn apply(&self, value: T) -> T {
        self.stages.iter().fold(value, |acc, stage| stage(acc))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<T> Default for InterceptorChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for InterceptorChain<T> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<T> fmt::Debug for InterceptorChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}
