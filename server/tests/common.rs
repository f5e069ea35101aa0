//! Common utilities for integration tests

use std::io::Cursor;
use std::path::Path;

use axum::Router;
use server::config::ServerConfig;
use server::{build_router, AppState};

pub const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

/// Config pointing all storage at a per-test temp directory.
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        upload_dir: dir.join("uploaded_audios"),
        plot_dir: dir.join("plots"),
        rate_limit_per_minute: 10_000,
        ..ServerConfig::default()
    }
}

/// Build the real router on top of a test config.
pub fn create_test_app(config: &ServerConfig) -> Router {
    std::fs::create_dir_all(&config.upload_dir).unwrap();
    std::fs::create_dir_all(&config.plot_dir).unwrap();
    build_router(AppState::new(config.clone()))
}

/// 16-bit mono WAV bytes: impulses every 0.5s starting at 0.25s.
pub fn click_wav_bytes(duration_secs: f32) -> Vec<u8> {
    const SAMPLE_RATE: u32 = 22_050;

    let len = (duration_secs * SAMPLE_RATE as f32) as usize;
    let mut samples = vec![0.0f32; len];
    let mut t = 0.25f32;
    while t < duration_secs {
        let idx = (t * SAMPLE_RATE as f32) as usize;
        if idx < len {
            samples[idx] = 0.9;
        }
        t += 0.5;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in &samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Hand-built multipart/form-data body with a single file field.
pub fn multipart_body(field_name: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
