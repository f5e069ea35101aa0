//! Onset detection via spectral flux.
//!
//! The detector computes an STFT over the clip, takes the half-wave
//! rectified frame-to-frame increase in magnitude (spectral flux), and picks
//! local maxima that rise above an adaptive threshold. Each surviving peak
//! is one hit.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Hit;

/// Tuning parameters for the spectral-flux detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// STFT window size in samples
    pub frame_size: usize,
    /// Hop between consecutive frames in samples
    pub hop_size: usize,
    /// Half-width, in frames, of the sliding window used for the adaptive
    /// threshold
    pub threshold_window: usize,
    /// Multiplier on the windowed standard deviation
    pub threshold_k: f32,
    /// Normalized flux below this floor is never an onset
    pub flux_floor: f32,
    /// Minimum gap between two onsets, in milliseconds
    pub min_gap_ms: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 512,
            threshold_window: 10,
            threshold_k: 1.5,
            flux_floor: 0.05,
            min_gap_ms: 30.0,
        }
    }
}

/// Detect onsets in a mono clip. Returns one [`Hit`] per detected onset,
/// ordered by time.
pub fn detect_onsets(samples: &[f32], sample_rate: u32, config: &OnsetConfig) -> Vec<Hit> {
    if sample_rate == 0 || samples.len() < config.frame_size {
        return Vec::new();
    }

    let spectra = magnitude_spectra(samples, config.frame_size, config.hop_size);
    if spectra.len() < 2 {
        return Vec::new();
    }

    // Half-wave rectified spectral flux per frame
    let mut flux = vec![0.0f32; spectra.len()];
    for t in 1..spectra.len() {
        let mut sum = 0.0;
        for (cur, prev) in spectra[t].iter().zip(&spectra[t - 1]) {
            let d = cur - prev;
            if d > 0.0 {
                sum += d;
            }
        }
        flux[t] = sum;
    }

    let peak = flux.iter().cloned().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        // Silent clip, nothing to pick
        return Vec::new();
    }
    for v in &mut flux {
        *v /= peak;
    }

    let min_gap_secs = config.min_gap_ms / 1000.0;
    let frame_secs = config.hop_size as f32 / sample_rate as f32;

    let mut hits = Vec::new();
    let mut last_onset_secs = f32::NEG_INFINITY;

    for t in 1..flux.len() - 1 {
        let value = flux[t];
        if value < config.flux_floor {
            continue;
        }
        // Local maximum
        if value < flux[t - 1] || value <= flux[t + 1] {
            continue;
        }
        if value <= adaptive_threshold(&flux, t, config.threshold_window, config.threshold_k) {
            continue;
        }

        let time_secs = t as f32 * frame_secs;
        if time_secs - last_onset_secs < min_gap_secs {
            continue;
        }
        last_onset_secs = time_secs;
        hits.push(Hit {
            time_secs,
            strength: value,
        });
    }

    debug!(
        "Spectral flux: {} frames, {} onsets",
        flux.len(),
        hits.len()
    );

    hits
}

/// Mean + k·σ of the flux in a window centered on `t`.
fn adaptive_threshold(flux: &[f32], t: usize, half_width: usize, k: f32) -> f32 {
    let lo = t.saturating_sub(half_width);
    let hi = (t + half_width + 1).min(flux.len());
    let window = &flux[lo..hi];

    let n = window.len() as f32;
    let mean = window.iter().sum::<f32>() / n;
    let variance = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;

    mean + k * variance.sqrt()
}

/// Windowed STFT magnitudes, positive-frequency bins only.
fn magnitude_spectra(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<Vec<f32>> {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(frame_size);
    let window = hann_window(frame_size);

    let num_frames = (samples.len() - frame_size) / hop_size + 1;
    let num_bins = frame_size / 2 + 1;
    let mut spectra = Vec::with_capacity(num_frames);

    let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); frame_size];
    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_size;
        for (i, &w) in window.iter().enumerate() {
            buffer[i] = Complex::new(samples[start + i] * w, 0.0);
        }

        fft.process(&mut buffer);

        spectra.push(buffer[..num_bins].iter().map(|c| c.norm()).collect());
    }

    spectra
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / (size - 1) as f32;
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}
