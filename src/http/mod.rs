//! API client module: request pipeline, retry, deduplication and uploads.

mod client;
mod dedup;
mod error;
mod interceptor;
mod request;
mod retry;
mod types;
mod upload;

pub use client::{ApiClient, ApiClientBuilder, create_api_client, create_api_client_with};
pub use error::{ApiClientError, CANCELLED, NETWORK_ERROR, UNKNOWN_ERROR};
pub use interceptor::{InterceptorChain, RequestParts, ResponseParts};
pub use request::{QueryParams, RequestOptions, dedup_key, request_id};
pub use retry::{MAX_RETRIES, RETRY_DELAY_MS, RETRYABLE_STATUS_THRESHOLD, RetryPolicy};
pub use types::{ApiResponse, PaginatedResponse, Pagination};
pub use upload::{ProgressCallback, ProgressTracker, UPLOAD_CHUNK_SIZE, UploadFile, percent};
