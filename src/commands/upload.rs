use anyhow::{Context, Result};
use log::info;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use super::config::Config;
use super::{describe, print_json};
use crate::http::{ProgressCallback, RequestOptions, UploadFile};
use crate::runtime::Runtime;

/// Uploads `file` to `path`, printing progress to stderr.
#[tracing::instrument(skip(config))]
pub async fn upload<R: Runtime>(config: &Config<R>, path: &str, file: &Path) -> Result<()> {
    if !config.runtime.exists(file) {
        anyhow::bail!("File {:?} does not exist", file);
    }
    let bytes = config.runtime.read(file)?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name {:?}", file))?
        .to_string();
    info!("Uploading {} ({} bytes) to {}...", file_name, bytes.len(), path);

    let on_progress: ProgressCallback = Arc::new(|percent: u8| {
        eprint!("\rUploading... {:>3}%", percent);
        let _ = std::io::stderr().flush();
        if percent == 100 {
            eprintln!();
        }
    });

    let value: Value = config
        .client
        .upload_file(
            path,
            UploadFile::new(file_name, bytes),
            Some(on_progress),
            RequestOptions::default(),
        )
        .await
        .map_err(describe)?;

    info!("Upload complete.");
    print_json(&value)
}
