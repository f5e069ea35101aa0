//! Scatter-plot rendering for detected hits.
//!
//! Draws time on the x axis and normalized onset strength on the y axis as
//! filled dots on a light background. The output is deliberately crude: no
//! labels, no ticks, just axes and points.

use std::path::Path;

use anyhow::Context;
use base64::Engine;
use image::{ImageBuffer, Rgb};

use crate::HitEstimate;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 400;
const MARGIN: u32 = 40;
const DOT_RADIUS: i32 = 3;

const BACKGROUND: Rgb<u8> = Rgb([245, 245, 245]);
const AXIS: Rgb<u8> = Rgb([120, 120, 120]);
const DOT: Rgb<u8> = Rgb([30, 60, 160]);

/// Render the scatter plot for an estimate and write it as PNG to `path`.
pub fn render_scatter<P: AsRef<Path>>(
    estimate: &HitEstimate,
    duration_secs: f32,
    path: P,
) -> anyhow::Result<()> {
    let png = encode_scatter_png(estimate, duration_secs)?;
    std::fs::write(path.as_ref(), png)
        .with_context(|| format!("Failed to write plot to {}", path.as_ref().display()))
}

/// Render the scatter plot and return it as base64-encoded PNG.
pub fn render_scatter_base64(estimate: &HitEstimate, duration_secs: f32) -> anyhow::Result<String> {
    let png = encode_scatter_png(estimate, duration_secs)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(png))
}

fn encode_scatter_png(estimate: &HitEstimate, duration_secs: f32) -> anyhow::Result<Vec<u8>> {
    let mut img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    // Axes: left edge and baseline
    for y in MARGIN..=HEIGHT - MARGIN {
        img.put_pixel(MARGIN, y, AXIS);
    }
    for x in MARGIN..=WIDTH - MARGIN {
        img.put_pixel(x, HEIGHT - MARGIN, AXIS);
    }

    let span_x = (WIDTH - 2 * MARGIN) as f32;
    let span_y = (HEIGHT - 2 * MARGIN) as f32;
    let duration = if duration_secs > 0.0 { duration_secs } else { 1.0 };

    for hit in &estimate.hits {
        let fx = (hit.time_secs / duration).clamp(0.0, 1.0);
        let fy = hit.strength.clamp(0.0, 1.0);
        let cx = MARGIN as i32 + (fx * span_x) as i32;
        let cy = (HEIGHT - MARGIN) as i32 - (fy * span_y) as i32;
        draw_dot(&mut img, cx, cy);
    }

    let mut png_bytes: Vec<u8> = Vec::new();
    {
        use image::ImageEncoder;
        let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
        encoder
            .write_image(img.as_raw(), WIDTH, HEIGHT, image::ColorType::Rgb8)
            .context("PNG encode failed")?;
    }

    Ok(png_bytes)
}

fn draw_dot(img: &mut ImageBuffer<Rgb<u8>, Vec<u8>>, cx: i32, cy: i32) {
    for dy in -DOT_RADIUS..=DOT_RADIUS {
        for dx in -DOT_RADIUS..=DOT_RADIUS {
            if dx * dx + dy * dy > DOT_RADIUS * DOT_RADIUS {
                continue;
            }
            let x = cx + dx;
            let y = cy + dy;
            if x >= 0 && (x as u32) < WIDTH && y >= 0 && (y as u32) < HEIGHT {
                img.put_pixel(x as u32, y as u32, DOT);
            }
        }
    }
}
