//! Audio decoding via symphonia.
//!
//! Decodes an on-disk file to mono f32 samples at the clip's native sample
//! rate. Multi-channel input is downmixed by channel averaging.

use std::path::Path;

use anyhow::Context;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::AudioClip;

/// Maximum file size accepted for decoding (500 MB).
const MAX_DECODE_BYTES: u64 = 500 * 1024 * 1024;

/// Decode an audio file into an [`AudioClip`].
pub fn decode_file<P: AsRef<Path>>(path: P) -> anyhow::Result<AudioClip> {
    let path = path.as_ref();

    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    if metadata.len() > MAX_DECODE_BYTES {
        anyhow::bail!(
            "File too large to decode ({} bytes, limit {})",
            metadata.len(),
            MAX_DECODE_BYTES
        );
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Extension is only a probe hint; the content decides the format.
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Unrecognized audio format: {}", path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .with_context(|| format!("No audio track in {}", path.display()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params.sample_rate.unwrap_or(44_100);
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

    debug!(
        "Decoding {} @ {}Hz, {} channel(s)",
        path.display(),
        sample_rate,
        channels
    );

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .with_context(|| format!("No decoder for {}", path.display()))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(e))
                    .with_context(|| format!("Failed to read packet from {}", path.display()));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Skip corrupted frames, keep whatever decodes
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => {
                return Err(anyhow::anyhow!(e))
                    .with_context(|| format!("Decode error in {}", path.display()));
            }
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend(to_mono(sample_buf.samples(), channels));
    }

    debug!(
        "Decoded {} samples ({:.2}s)",
        samples.len(),
        samples.len() as f64 / sample_rate as f64
    );

    Ok(AudioClip::new(samples, sample_rate))
}

/// Average interleaved multi-channel samples into mono.
fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
