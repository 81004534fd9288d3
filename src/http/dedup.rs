//! Registry of in-flight GET requests, scoped to one client instance.

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::ApiClientError;

pub(crate) type SharedResponse = Shared<BoxFuture<'static, Result<Value, ApiClientError>>>;

/// At most one in-flight request per key. Every caller joining a key awaits
/// the same shared future and observes the same result.
#[derive(Default)]
pub(crate) struct PendingRequests {
    entries: Arc<Mutex<HashMap<String, SharedResponse>>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the in-flight request for `key`, or starts `request` as its
    /// own task and registers it.
    ///
    /// The task removes its key when it settles, whether or not anyone is
    /// still waiting on it.
    pub(crate) fn join<F>(&self, key: String, request: F) -> SharedResponse
    where
        F: Future<Output = Result<Value, ApiClientError>> + Send + 'static,
    {
        let mut entries = lock(&self.entries);
        if let Some(existing) = entries.get(&key) {
            debug!("Joining in-flight request {}", key);
            return existing.clone();
        }

        let registry = Arc::clone(&self.entries);
        let cleanup_key = key.clone();
        let task = tokio::spawn(async move {
            let result = request.await;
            lock(&registry).remove(&cleanup_key);
            result
        });

        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(ApiClientError::unknown(format!(
                    "Request task failed: {}",
                    e
                )))
            })
        }
        .boxed()
        .shared();

        entries.insert(key, shared.clone());
        shared
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }
}

fn lock(
    entries: &Mutex<HashMap<String, SharedResponse>>,
) -> MutexGuard<'_, HashMap<String, SharedResponse>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
