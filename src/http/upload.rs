//! Multipart file upload with progress reporting.

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Chunk size used when streaming an upload body.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Form field the file is sent under.
pub const UPLOAD_FIELD: &str = "file";

/// Receives upload progress as an integer percentage in `0..=100`.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// A file held in memory, ready to be sent as multipart form data.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Builds a fresh form for one attempt. Streams are single-use, so a
    /// retried upload needs a new form.
    pub(crate) fn to_form(
        &self,
        tracker: Option<Arc<ProgressTracker>>,
    ) -> Result<Form, reqwest::Error> {
        let body = match tracker {
            Some(tracker) => {
                tracker.restart();
                reqwest::Body::wrap_stream(progress_stream(self.bytes.clone(), tracker))
            }
            None => reqwest::Body::from(self.bytes.clone()),
        };

        let mut part = Part::stream_with_length(body, self.len()).file_name(self.file_name.clone());
        if let Some(content_type) = &self.content_type {
            part = part.mime_str(content_type)?;
        }
        Ok(Form::new().part(UPLOAD_FIELD, part))
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    loaded: u64,
    reported: Option<u8>,
}

/// Converts transmitted byte counts into percentages and reports each
/// strictly greater value exactly once.
pub struct ProgressTracker {
    total: u64,
    state: Mutex<ProgressState>,
    callback: ProgressCallback,
}

impl ProgressTracker {
    pub fn new(total: u64, callback: ProgressCallback) -> Self {
        Self {
            total,
            state: Mutex::new(ProgressState::default()),
            callback,
        }
    }

    /// Records `bytes` more as sent.
    pub fn advance(&self, bytes: u64) {
        let value = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.loaded = state.loaded.saturating_add(bytes);
            let value = percent(state.loaded, self.total);
            if state.reported.is_some_and(|reported| value <= reported) {
                return;
            }
            state.reported = Some(value);
            value
        };
        (self.callback)(value);
    }

    /// Resets the byte count for a new attempt. Already reported values are
    /// kept so the reported sequence never goes backwards.
    pub fn restart(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.loaded = 0;
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total", &self.total)
            .finish()
    }
}

/// `floor(loaded * 100 / total)`, capped at 100. An empty upload is complete.
pub fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let value = (loaded as u128 * 100) / total as u128;
    value.min(100) as u8
}

fn progress_stream(
    bytes: Bytes,
    tracker: Arc<ProgressTracker>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    if bytes.is_empty() {
        tracker.advance(0);
    }
    let len = bytes.len();
    let chunks: Vec<Bytes> = (0..len)
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(len)))
        .collect();

    stream::iter(chunks).map(move |chunk| {
        tracker.advance(chunk.len() as u64);
        Ok(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_tracker(total: u64) -> (ProgressTracker, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tracker = ProgressTracker::new(
            total,
            Arc::new(move |p: u8| sink.lock().unwrap().push(p)),
        );
        (tracker, seen)
    }

    #[test]
    fn test_percent_floors() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(5, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_tracker_reports_quarter_steps() {
        let (tracker, seen) = recording_tracker(400);
        tracker.advance(100);
        tracker.advance(100);
        tracker.advance(200);
        assert_eq!(*seen.lock().unwrap(), vec![25, 50, 100]);
    }

    #[test]
    fn test_tracker_never_goes_backwards_on_restart() {
        let (tracker, seen) = recording_tracker(100);
        tracker.advance(60);
        tracker.restart();
        tracker.advance(30);
        tracker.advance(70);
        assert_eq!(*seen.lock().unwrap(), vec![60, 100]);
    }

    #[test]
    fn test_tracker_skips_repeated_values() {
        let (tracker, seen) = recording_tracker(1000);
        tracker.advance(1);
        tracker.advance(1);
        tracker.advance(998);
        assert_eq!(*seen.lock().unwrap(), vec![0, 100]);
    }

    #[tokio::test]
    async fn test_progress_stream_chunks_and_reports() {
        let total = UPLOAD_CHUNK_SIZE * 4;
        let (tracker, seen) = recording_tracker(total as u64);
        let stream = progress_stream(Bytes::from(vec![7u8; total]), Arc::new(tracker));

        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() == UPLOAD_CHUNK_SIZE));
        assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn test_progress_stream_empty_file() {
        let (tracker, seen) = recording_tracker(0);
        let stream = progress_stream(Bytes::new(), Arc::new(tracker));
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        assert!(chunks.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }

    #[test]
    fn test_upload_file_builder() {
        let file = UploadFile::new("report.csv", "a,b\n1,2\n").with_content_type("text/csv");
        assert_eq!(file.file_name, "report.csv");
        assert_eq!(file.content_type.as_deref(), Some("text/csv"));
        assert_eq!(file.len(), 8);
        assert!(!file.is_empty());
    }
}
