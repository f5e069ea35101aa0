use std::path::Path;

use crate::error::ApiError;

/// Upload extensions we accept
pub const ALLOWED_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aiff"];

/// Maximum length for a submitted link
const MAX_LINK_LENGTH: usize = 2048;

/// Validate the extension of an uploaded filename
pub fn validate_extension(filename: &str) -> Result<(), ApiError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ApiError::InvalidInput(format!(
            "Unsupported file extension for '{}'. Allowed: {}",
            filename,
            ALLOWED_EXTENSIONS.join(", ")
        ))),
    }
}

/// Validate the size of an uploaded payload against the configured cap
pub fn validate_file_size(size: usize, max_bytes: usize) -> Result<(), ApiError> {
    if size == 0 {
        return Err(ApiError::InvalidInput("Uploaded file is empty".to_string()));
    }
    if size > max_bytes {
        return Err(ApiError::InvalidInput(format!(
            "File too large ({} bytes, max {} bytes)",
            size, max_bytes
        )));
    }
    Ok(())
}

/// Validate a remote link before attempting a download
pub fn validate_link(link: &str) -> Result<(), ApiError> {
    if link.trim().is_empty() {
        return Err(ApiError::InvalidInput("Link cannot be empty".to_string()));
    }
    if link.len() > MAX_LINK_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Link too long (max {} characters)",
            MAX_LINK_LENGTH
        )));
    }
    if !link.starts_with("http://") && !link.starts_with("https://") {
        return Err(ApiError::InvalidInput(
            "Link must be an http(s) URL".to_string(),
        ));
    }
    Ok(())
}

/// Reduce a client-supplied filename to a safe flat name. Path separators and
/// anything outside [A-Za-z0-9._-] become underscores; leading dots are
/// stripped so the result can never be a dotfile or a traversal.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
