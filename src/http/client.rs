//! HTTP API client with auth injection, GET deduplication and a single retry
//! for server errors.

use bytes::Bytes;
use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::dedup::PendingRequests;
use super::error::ApiClientError;
use super::interceptor::{InterceptorChain, RequestParts, ResponseParts};
use super::request::{QueryParams, RequestOptions, dedup_key, request_id};
use super::upload::{ProgressCallback, ProgressTracker, UploadFile};
use crate::config::{
    ClientConfig, ConfigError, HEALTH_PATH, HEALTH_TIMEOUT, REQUEST_ID_HEADER,
};
use crate::runtime::{RealRuntime, Runtime};

/// Uniform request surface over one base address.
///
/// Cloning is cheap and clones share the token and the in-flight registry.
/// Separately constructed clients share nothing.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url())
            .finish_non_exhaustive()
    }
}

struct Inner {
    http: Client,
    config: ClientConfig,
    auth_token: RwLock<Option<String>>,
    pending: PendingRequests,
    request_interceptors: InterceptorChain<RequestParts>,
    response_interceptors: InterceptorChain<ResponseParts>,
}

enum Payload {
    Empty,
    Json(Bytes),
    Multipart(UploadFile, Option<Arc<ProgressTracker>>),
}

/// One logical request. Re-dispatched as-is when retried.
struct Call {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    payload: Payload,
    options: RequestOptions,
}

pub struct ApiClientBuilder {
    config: ClientConfig,
    http: Option<Client>,
    request_interceptors: InterceptorChain<RequestParts>,
    response_interceptors: InterceptorChain<ResponseParts>,
}

impl ApiClientBuilder {
    /// Uses `client` instead of building one from the configuration.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Adds a request transformer; transformers run in registration order
    /// after default headers, auth and the request id are in place.
    pub fn request_interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(RequestParts) -> RequestParts + Send + Sync + 'static,
    {
        self.request_interceptors.push(interceptor);
        self
    }

    /// Adds a response transformer; transformers run in registration order
    /// before the status is classified.
    pub fn response_interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(ResponseParts) -> ResponseParts + Send + Sync + 'static,
    {
        self.response_interceptors.push(interceptor);
        self
    }

    pub fn build(self) -> Result<ApiClient, ConfigError> {
        self.config.validate()?;
        let http = match self.http {
            Some(client) => client,
            None => Client::builder()
                .user_agent(self.config.user_agent.clone())
                .build()?,
        };

        Ok(ApiClient {
            inner: Arc::new(Inner {
                http,
                config: self.config,
                auth_token: RwLock::new(None),
                pending: PendingRequests::new(),
                request_interceptors: self.request_interceptors,
                response_interceptors: self.response_interceptors,
            }),
        })
    }
}

/// Creates an independent client configured from the process environment.
///
/// `base_url` takes precedence over `API_URL`; `APP_ENV` applies either way.
pub fn create_api_client(base_url: Option<&str>) -> Result<ApiClient, ConfigError> {
    create_api_client_with(&RealRuntime, base_url)
}

/// Like [`create_api_client`], reading the environment through `runtime`.
pub fn create_api_client_with<R: Runtime>(
    runtime: &R,
    base_url: Option<&str>,
) -> Result<ApiClient, ConfigError> {
    ApiClient::new(ClientConfig::from_env_with(
        runtime,
        base_url.map(str::to_string),
    )?)
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            http: None,
            request_interceptors: InterceptorChain::new(),
            response_interceptors: InterceptorChain::new(),
        }
    }

    /// Builds a client from `API_URL` and `APP_ENV`.
    pub fn from_env<R: Runtime>(runtime: &R) -> Result<Self, ConfigError> {
        Self::new(ClientConfig::from_env(runtime)?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn base_url(&self) -> &str {
        &self.inner.config.base_url
    }

    // === Authentication ===

    /// Sets the bearer token sent with every subsequent request. Requests
    /// already in flight are unaffected.
    pub fn set_auth_token(&self, token: impl Into<String>) {
        let token = token.into();
        debug!("Setting auth token: {}", mask_token(&token));
        *self
            .inner
            .auth_token
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(token);
    }

    /// Clears the stored token only if it is still `sent`, so a token set
    /// while the rejected request was in flight survives.
    fn expire_auth_token(&self, sent: &str) -> bool {
        let mut token = self
            .inner
            .auth_token
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if token.as_deref() != Some(sent) {
            return false;
        }
        *token = None;
        true
    }

    pub fn clear_auth_token(&self) {
        debug!("Clearing auth token");
        *self
            .inner
            .auth_token
            .write()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn auth_token(&self) -> Option<String> {
        self.inner
            .auth_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // === HTTP Methods ===

    /// GET with deduplication: a call whose method, path and params match a
    /// request still in flight awaits that request instead of sending a new
    /// one.
    ///
    /// Cancellation tokens are ignored here, since the in-flight request may
    /// be shared with other callers.
    ///
    /// The key covers only method, path and params. A joining call inherits
    /// the options of the request it joins, including its timeout and
    /// `skip_auth`, so [`health_check`](Self::health_check) may wait on an
    /// authenticated `GET /health` with the default timeout.
    #[tracing::instrument(skip(self, params, options))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&QueryParams>,
        mut options: RequestOptions,
    ) -> Result<T, ApiClientError> {
        if options.cancel.take().is_some() {
            debug!("Ignoring cancellation token for deduplicated GET {}", path);
        }

        let key = dedup_key(&Method::GET, path, params);
        let call = Call {
            method: Method::GET,
            path: path.to_string(),
            query: params.map(QueryParams::to_pairs).unwrap_or_default(),
            payload: Payload::Empty,
            options,
        };

        let client = self.clone();
        let shared = self.inner.pending.join(key, async move {
            let response = client.execute(call).await?;
            decode::<Value>(&response)
        });

        let value = shared.await?;
        serde_json::from_value(value)
            .map_err(|e| ApiClientError::unknown(format!("Failed to parse JSON response: {}", e)))
    }

    #[tracing::instrument(skip(self, body, options))]
    pub async fn post<T, B>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::POST, path, body, options).await
    }

    #[tracing::instrument(skip(self, body, options))]
    pub async fn put<T, B>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::PUT, path, body, options).await
    }

    #[tracing::instrument(skip(self, body, options))]
    pub async fn patch<T, B>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::PATCH, path, body, options).await
    }

    #[tracing::instrument(skip(self, options))]
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiClientError> {
        let call = Call {
            method: Method::DELETE,
            path: path.to_string(),
            query: Vec::new(),
            payload: Payload::Empty,
            options,
        };
        let response = self.execute_cancellable(call).await?;
        decode(&response)
    }

    /// Multipart POST of `file` under the `file` field.
    ///
    /// `on_progress` receives `floor(sent * 100 / total)` as the body is
    /// handed to the transport, never decreasing and ending at 100. The
    /// default timeout is the longer upload timeout.
    #[tracing::instrument(skip(self, file, on_progress, options), fields(file = %file.file_name))]
    pub async fn upload_file<T: DeserializeOwned>(
        &self,
        path: &str,
        file: UploadFile,
        on_progress: Option<ProgressCallback>,
        options: RequestOptions,
    ) -> Result<T, ApiClientError> {
        let tracker = on_progress.map(|callback| Arc::new(ProgressTracker::new(file.len(), callback)));
        let call = Call {
            method: Method::POST,
            path: path.to_string(),
            query: Vec::new(),
            payload: Payload::Multipart(file, tracker),
            options,
        };
        let response = self.execute_cancellable(call).await?;
        decode(&response)
    }

    /// Returns true only if `GET /health` succeeds within the health timeout.
    /// Never fails.
    #[tracing::instrument(skip(self))]
    pub async fn health_check(&self) -> bool {
        let options = RequestOptions::new().skip_auth().timeout(HEALTH_TIMEOUT);
        match self.get::<Value>(HEALTH_PATH, None, options).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Health check failed: {} ({})", e, e.code);
                false
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    // === Pipeline ===

    async fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let payload = match body {
            Some(body) => Payload::Json(Bytes::from(serde_json::to_vec(body).map_err(|e| {
                ApiClientError::unknown(format!("Failed to serialize request body: {}", e))
            })?)),
            None => Payload::Empty,
        };
        let call = Call {
            method,
            path: path.to_string(),
            query: Vec::new(),
            payload,
            options,
        };
        let response = self.execute_cancellable(call).await?;
        decode(&response)
    }

    async fn execute_cancellable(&self, call: Call) -> Result<ResponseParts, ApiClientError> {
        let Some(token) = call.options.cancel.clone() else {
            return self.execute(call).await;
        };

        let method = call.method.clone();
        let path = call.path.clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("{} {} cancelled by caller", method, path);
                Err(ApiClientError::cancelled())
            }
            result = self.execute(call) => result,
        }
    }

    /// Dispatches `call`, re-issuing it once after the backoff when the
    /// response is a server error.
    async fn execute(&self, call: Call) -> Result<ResponseParts, ApiClientError> {
        let mut retry = self.inner.config.retry.attempt();

        loop {
            let (response, sent_token) = self.dispatch(&call).await?;
            if response.status.is_success() {
                return Ok(response);
            }

            if response.status == StatusCode::UNAUTHORIZED
                && let Some(sent) = sent_token.as_deref()
            {
                if self.expire_auth_token(sent) {
                    warn!(
                        "{} {} returned 401, cleared auth token",
                        call.method, call.path
                    );
                } else {
                    debug!(
                        "{} {} returned 401 for a replaced token, keeping the current one",
                        call.method, call.path
                    );
                }
            }

            if retry.should_retry(response.status) {
                warn!(
                    "{} {}: server error {}, retrying in {}ms...",
                    call.method,
                    call.path,
                    response.status.as_u16(),
                    retry.delay().as_millis()
                );
                tokio::time::sleep(retry.delay()).await;
                continue;
            }

            if retry.retried() {
                debug!("{} {}: retry already used", call.method, call.path);
            }
            return Err(ApiClientError::from_response(&response));
        }
    }

    /// Sends a single attempt and buffers the response. Also returns the
    /// token that was stored when the request went out.
    async fn dispatch(
        &self,
        call: &Call,
    ) -> Result<(ResponseParts, Option<String>), ApiClientError> {
        let config = &self.inner.config;
        let timeout = call.options.timeout.unwrap_or(match call.payload {
            Payload::Multipart(..) => config.upload_timeout,
            _ => config.timeout,
        });

        let token = self.auth_token();
        let RequestParts {
            method,
            path,
            query,
            headers,
        } = self.prepare(call, token.as_deref());

        if config.verbose {
            debug!("[API] → {} {} {:?}", method, path, query);
        }

        let mut builder = self
            .inner
            .http
            .request(method.clone(), self.url(&path))
            .headers(headers)
            .timeout(timeout);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        builder = match &call.payload {
            Payload::Empty => builder,
            Payload::Json(bytes) => builder.body(bytes.clone()),
            Payload::Multipart(file, tracker) => {
                let form = file.to_form(tracker.clone()).map_err(|e| {
                    ApiClientError::unknown(format!("Failed to build upload form: {}", e))
                })?;
                builder.multipart(form)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(&e, timeout, &method, &path))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e, timeout, &method, &path))?;

        let response = self
            .inner
            .response_interceptors
            .apply(ResponseParts {
                status,
                headers,
                body,
            });
        if config.verbose {
            debug!("[API] ← {} {} {}", response.status.as_u16(), method, path);
        }
        Ok((response, token))
    }

    /// Merges headers, injects auth and the request id, then runs the
    /// request interceptors.
    fn prepare(&self, call: &Call, token: Option<&str>) -> RequestParts {
        let mut headers = self.inner.config.default_headers.clone();
        for (name, value) in &call.options.headers {
            headers.insert(name.clone(), value.clone());
        }
        if matches!(call.payload, Payload::Multipart(..)) {
            headers.remove(CONTENT_TYPE);
        }

        if !call.options.skip_auth
            && let Some(token) = token
        {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("Auth token is not a valid header value, sending without it"),
            }
        }

        if let Ok(value) = HeaderValue::from_str(&request_id()) {
            headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }

        self.inner.request_interceptors.apply(RequestParts {
            method: call.method.clone(),
            path: call.path.clone(),
            query: call.query.clone(),
            headers,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.inner.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn transport_error(
        &self,
        error: &reqwest::Error,
        timeout: Duration,
        method: &Method,
        path: &str,
    ) -> ApiClientError {
        if self.inner.config.verbose {
            debug!("[API] ← Error Network {} {}: {}", method, path, error);
        }
        ApiClientError::from_transport(error, timeout)
    }
}

/// Decodes a 2xx body; an empty body decodes as JSON `null`.
fn decode<T: DeserializeOwned>(response: &ResponseParts) -> Result<T, ApiClientError> {
    let result = if response.body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_slice(&response.body)
    };
    result.map_err(|e| ApiClientError::unknown(format!("Failed to parse JSON response: {}", e)))
}

/// Shows only the ends of a token, e.g. `eyJhbGci*********4f2a`.
fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*********".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
