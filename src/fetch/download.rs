// src/fetch/download.rs

use crate::error::IngestError;
use crate::fetch::urls;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

const REPORT_EVERY: u64 = 64 * 1024 * 1024;

/// A source file ready for decoding: either a local path used in place or a
/// download held in a temporary file that is removed on drop.
#[derive(Debug)]
pub enum Staged {
    Local(PathBuf),
    Downloaded(NamedTempFile),
}

impl Staged {
    pub fn path(&self) -> &Path {
        match self {
            Staged::Local(path) => path,
            Staged::Downloaded(tmp) => tmp.path(),
        }
    }
}

fn unreachable_source<E>(location: &str, err: E) -> IngestError
where
    E: std::error::Error + Send + Sync + 'static,
{
    IngestError::Connectivity {
        target: location.to_string(),
        source: Box::new(err),
    }
}

/// Make `location` available on local disk.
///
/// Remote bodies are streamed chunk by chunk into a temp file, so memory use
/// does not grow with the size of the source.
#[instrument(level = "info", skip(client))]
pub async fn stage(client: &Client, location: &str) -> Result<Staged, IngestError> {
    if !urls::is_remote(location) {
        let path = PathBuf::from(location);
        if !path.is_file() {
            return Err(unreachable_source(
                location,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ));
        }
        debug!(path = %path.display(), "using local source");
        return Ok(Staged::Local(path));
    }

    let response = client
        .get(location)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| unreachable_source(location, e))?;

    let tmp = NamedTempFile::new().map_err(|e| unreachable_source(location, e))?;
    let handle = tmp.reopen().map_err(|e| unreachable_source(location, e))?;
    let mut file = tokio::fs::File::from_std(handle);

    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;
    let mut next_report = REPORT_EVERY;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| unreachable_source(location, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| unreachable_source(location, e))?;
        downloaded += chunk.len() as u64;
        if downloaded >= next_report {
            debug!(mib = downloaded / (1024 * 1024), "downloading");
            next_report += REPORT_EVERY;
        }
    }
    file.flush()
        .await
        .map_err(|e| unreachable_source(location, e))?;

    info!(bytes = downloaded, "download complete");
    Ok(Staged::Downloaded(tmp))
}
