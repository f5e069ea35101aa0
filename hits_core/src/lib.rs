//! Drum-hit estimation core.
//!
//! Decodes audio files to mono samples, estimates the number of drum hits in
//! a clip, and renders a crude scatter plot of the detected hits. Two
//! estimation methods sit behind the [`HitEstimator`] trait: a naive
//! duration-based heuristic and spectral-flux onset detection.

pub mod decode;
pub mod onset;
pub mod plot;

use serde::{Deserialize, Serialize};

pub use decode::decode_file;
pub use onset::OnsetConfig;

/// Decoded mono audio.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Clip length in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// A single detected hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    /// Position in the clip, seconds from the start
    pub time_secs: f32,
    /// Normalized onset strength, 0.0..=1.0
    pub strength: f32,
}

/// Result of running a [`HitEstimator`] over a clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitEstimate {
    /// Estimated number of drum hits
    pub count: usize,
    /// Per-hit detail; empty for estimators that only produce a count
    pub hits: Vec<Hit>,
}

/// Hit estimation strategy.
pub trait HitEstimator: Send + Sync {
    fn estimate(&self, clip: &AudioClip) -> anyhow::Result<HitEstimate>;

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// Which estimator a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    Duration,
    Onset,
}

impl EstimatorKind {
    /// Parse from a configuration string. Unknown values fall back to
    /// [`EstimatorKind::Onset`].
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "duration" => EstimatorKind::Duration,
            _ => EstimatorKind::Onset,
        }
    }

    /// Build the estimator for this kind.
    pub fn build(self) -> Box<dyn HitEstimator> {
        match self {
            EstimatorKind::Duration => Box::new(DurationEstimator),
            EstimatorKind::Onset => Box::new(SpectralFluxEstimator::default()),
        }
    }
}

/// Naive duration-based heuristic: assumes a nominal hit rate and scales by
/// clip length. Produces no per-hit detail.
pub struct DurationEstimator;

impl DurationEstimator {
    /// Nominal hit rate, two hits per second (120 BPM).
    pub const HITS_PER_SECOND: f32 = 2.0;
}

impl HitEstimator for DurationEstimator {
    fn estimate(&self, clip: &AudioClip) -> anyhow::Result<HitEstimate> {
        let count = (clip.duration_secs() * Self::HITS_PER_SECOND).round() as usize;
        Ok(HitEstimate {
            count,
            hits: Vec::new(),
        })
    }

    fn name(&self) -> &'static str {
        "duration"
    }
}

/// Onset-detection estimator backed by [`onset::detect_onsets`].
#[derive(Default)]
pub struct SpectralFluxEstimator {
    config: OnsetConfig,
}

impl SpectralFluxEstimator {
    pub fn new(config: OnsetConfig) -> Self {
        Self { config }
    }
}

impl HitEstimator for SpectralFluxEstimator {
    fn estimate(&self, clip: &AudioClip) -> anyhow::Result<HitEstimate> {
        let hits = onset::detect_onsets(&clip.samples, clip.sample_rate, &self.config);
        Ok(HitEstimate {
            count: hits.len(),
            hits,
        })
    }

    fn name(&self) -> &'static str {
        "spectral-flux"
    }
}
