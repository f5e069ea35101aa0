//! Remote media retrieval for `/process-link`.
//!
//! Direct audio-file URLs are streamed down with reqwest; anything else
//! (video pages, share links) is handed to an external `yt-dlp` binary that
//! extracts the audio track to WAV. Both paths land the result in the upload
//! directory and enforce the configured size cap.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::validation::{sanitize_filename, ALLOWED_EXTENSIONS};

/// Download the audio behind `link` into the upload directory. Returns the
/// stored path and the stored filename.
pub async fn fetch_remote(
    link: &str,
    config: &ServerConfig,
) -> Result<(PathBuf, String), ApiError> {
    let timeout = config.download_timeout();
    tokio::time::timeout(timeout, fetch_remote_inner(link, config))
        .await
        .map_err(|_| {
            ApiError::DownloadError(format!(
                "Download timed out after {} seconds",
                timeout.as_secs()
            ))
        })?
}

async fn fetch_remote_inner(
    link: &str,
    config: &ServerConfig,
) -> Result<(PathBuf, String), ApiError> {
    if is_direct_audio_url(link) {
        download_direct(link, config).await
    } else {
        extract_with_ytdlp(link, config).await
    }
}

/// True when the URL path ends in an extension we can decode directly.
fn is_direct_audio_url(link: &str) -> bool {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    match path.rsplit('.').next() {
        Some(ext) => ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Last path segment of the link, sanitized for storage.
fn filename_from_link(link: &str) -> String {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("download");
    sanitize_filename(segment)
}

async fn download_direct(
    link: &str,
    config: &ServerConfig,
) -> Result<(PathBuf, String), ApiError> {
    info!("Downloading audio from {}", link);

    let response = reqwest::get(link)
        .await
        .map_err(|e| ApiError::DownloadError(format!("Request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(ApiError::DownloadError(format!(
            "Remote server returned {}",
            response.status()
        )));
    }

    let stored_name = format!("{}_{}", Uuid::new_v4(), filename_from_link(link));
    let dest = config.upload_dir.join(&stored_name);

    let mut file = tokio::fs::File::create(&dest)
        .await
        .map_err(|e| ApiError::InternalError(format!("Failed to create {}: {e}", dest.display())))?;

    let mut response = response;
    let mut written: usize = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ApiError::DownloadError(format!("Transfer failed: {e}")))?
    {
        written += chunk.len();
        if written > config.max_upload_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(ApiError::InvalidInput(format!(
                "Remote file too large (max {} bytes)",
                config.max_upload_bytes
            )));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::InternalError(format!("Write failed: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::InternalError(format!("Write failed: {e}")))?;

    debug!("Downloaded {} bytes to {}", written, dest.display());
    Ok((dest, stored_name))
}

async fn extract_with_ytdlp(
    link: &str,
    config: &ServerConfig,
) -> Result<(PathBuf, String), ApiError> {
    info!("Extracting audio from {} via {}", link, config.ytdlp_bin);

    let id = Uuid::new_v4();
    let template = config.upload_dir.join(format!("{id}.%(ext)s"));

    let output = Command::new(&config.ytdlp_bin)
        .arg("-x")
        .arg("--audio-format")
        .arg("wav")
        .arg("--no-playlist")
        .arg("-o")
        .arg(&template)
        .arg(link)
        .output()
        .await
        .map_err(|e| {
            ApiError::DownloadError(format!(
                "Failed to run '{}': {e}. Is it installed and on PATH?",
                config.ytdlp_bin
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ApiError::DownloadError(format!(
            "{} failed: {}",
            config.ytdlp_bin,
            stderr.trim()
        )));
    }

    let stored_name = format!("{id}.wav");
    let dest = config.upload_dir.join(&stored_name);
    let metadata = tokio::fs::metadata(&dest).await.map_err(|_| {
        ApiError::DownloadError(format!(
            "{} reported success but produced no output",
            config.ytdlp_bin
        ))
    })?;

    if metadata.len() as usize > config.max_upload_bytes {
        let _ = tokio::fs::remove_file(&dest).await;
        return Err(ApiError::InvalidInput(format!(
            "Extracted audio too large (max {} bytes)",
            config.max_upload_bytes
        )));
    }

    debug!("Extracted {} bytes to {}", metadata.len(), dest.display());
    Ok((dest, stored_name))
}
