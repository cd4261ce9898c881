// THEORY:
// The `ColorSampler` reduces the pixels of one rectangle to a single representative
// RGB triple. A light source seen through a camera is surrounded by black background,
// sensor blow-out and gray housing, and all of those would drag a naive average away
// from the light's actual color.
//
// The sampler keeps two running populations over the same stride-decimated walk:
// 1.  **Unfiltered**: every visited pixel.
// 2.  **Filtered**: only pixels that are not black (all channels ≤ black threshold),
//     not white (all channels ≥ white threshold) and carry at least the minimum
//     max−min channel spread.
//
// The filtered average is reported whenever at least one pixel survived. A region
// that is entirely black, white or gray still yields a sample through the unfiltered
// average. Only a walk that visits nothing at all fails with `NoUsablePixels`.

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::core_modules::color_space::hex_string;
use crate::core_modules::frame::PixelBuffer;
use crate::core_modules::geometry::PixelRect;
use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{ProbeError, Result};

/// Which population the reported average came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    Filtered,
    Unfiltered,
}

/// The reduced color of one sampling rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RgbSample {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// `#rrggbb`, lowercase.
    pub hex: String,
    /// Per-channel population standard deviation of the reported population.
    pub std_dev: [f64; 3],
    /// Pixels averaged into the reported color.
    pub pixel_count: u64,
    pub source: SampleSource,
    /// Geometric center of the sampled rectangle, in buffer coordinates.
    pub centroid: (f64, f64),
    pub rect: PixelRect,
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    count: u64,
    sum: [u64; 3],
    sum_sq: [u64; 3],
}

impl Accumulator {
    fn add(&mut self, pixel: &Pixel) {
        self.count += 1;
        for (channel, value) in [pixel.red, pixel.green, pixel.blue].into_iter().enumerate() {
            let value = value as u64;
            self.sum[channel] += value;
            self.sum_sq[channel] += value * value;
        }
    }

    fn mean(&self, channel: usize) -> f64 {
        self.sum[channel] as f64 / self.count as f64
    }

    fn rounded_mean(&self, channel: usize) -> u8 {
        self.mean(channel).round().clamp(0.0, 255.0) as u8
    }

    fn std_dev(&self, channel: usize) -> f64 {
        let mean = self.mean(channel);
        let variance = self.sum_sq[channel] as f64 / self.count as f64 - mean * mean;
        variance.max(0.0).sqrt()
    }
}

pub struct ColorSampler;

impl ColorSampler {
    /// True when a pixel is background (black or white) or too gray to carry color.
    pub fn is_excluded(pixel: &Pixel, settings: &Settings) -> bool {
        pixel.is_white(settings.white_threshold())
            || pixel.is_black(settings.black_threshold())
            || pixel.chroma() < settings.min_saturation()
    }

    pub fn sample(buffer: &PixelBuffer, rect: &PixelRect, settings: &Settings) -> Result<RgbSample> {
        let rect = if rect.area() == 0 { *rect } else { rect.clamp_to(&buffer.bounds()) };
        let stride = settings.sample_stride().max(1) as usize;

        let mut unfiltered = Accumulator::default();
        let mut filtered = Accumulator::default();

        for y in (rect.y..rect.bottom()).step_by(stride) {
            for x in (rect.x..rect.right()).step_by(stride) {
                let pixel = buffer.pixel(x, y);
                unfiltered.add(&pixel);
                if !Self::is_excluded(&pixel, settings) {
                    filtered.add(&pixel);
                }
            }
        }

        let (population, source) = if filtered.count > 0 {
            (filtered, SampleSource::Filtered)
        } else if unfiltered.count > 0 {
            (unfiltered, SampleSource::Unfiltered)
        } else {
            return Err(ProbeError::NoUsablePixels {
                width: rect.width,
                height: rect.height,
            });
        };

        let (r, g, b) = (
            population.rounded_mean(0),
            population.rounded_mean(1),
            population.rounded_mean(2),
        );
        Ok(RgbSample {
            r,
            g,
            b,
            hex: hex_string(r, g, b),
            std_dev: [population.std_dev(0), population.std_dev(1), population.std_dev(2)],
            pixel_count: population.count,
            source,
            centroid: rect.center(),
            rect,
        })
    }
}
