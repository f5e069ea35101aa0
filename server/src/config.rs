// Configuration constants for the server

use std::path::PathBuf;
use std::time::Duration;

use hits_core::EstimatorKind;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
    pub upload_dir: PathBuf,
    pub plot_dir: PathBuf,
    pub estimator: EstimatorKind,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub ytdlp_bin: String,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_upload_bytes: 50 * 1024 * 1024,
            upload_dir: PathBuf::from("uploaded_audios"),
            plot_dir: PathBuf::from("plots"),
            estimator: EstimatorKind::Onset,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            download_timeout_secs: 120,
            ytdlp_bin: "yt-dlp".to_string(),
            cors_allowed_origins: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_upload_bytes);

        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);

        let plot_dir = std::env::var("PLOT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.plot_dir);

        let estimator = std::env::var("HIT_ESTIMATOR")
            .map(|v| EstimatorKind::parse(&v))
            .unwrap_or(defaults.estimator);

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let download_timeout_secs = std::env::var("DOWNLOAD_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.download_timeout_secs);

        let ytdlp_bin = std::env::var("YTDLP_BIN").unwrap_or(defaults.ytdlp_bin);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| origins.split(',').map(|s| s.trim().to_string()).collect());

        Self {
            port,
            max_upload_bytes,
            upload_dir,
            plot_dir,
            estimator,
            rate_limit_per_minute,
            request_timeout_secs,
            download_timeout_secs,
            ytdlp_bin,
            cors_allowed_origins,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}
