// THEORY:
// A `ColorSample` is the single egress record of a successful tick. It is assembled
// from the sampler's reduced RGB triple and enriched with every derived descriptor
// (HSV, HSL, color temperature) so that downstream consumers never recompute color
// math. The record is immutable once handed out. The only in-place enrichment is the
// optional classification, attached by the pipeline before the sample leaves it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core_modules::classifier::{FEATURE_DIMENSIONS, KnnClassifier};
use crate::core_modules::color_space::{ColorTemperature, Hsl, Hsv, rgb_to_color_temperature, rgb_to_hsl, rgb_to_hsv};
use crate::core_modules::geometry::PixelRect;
use crate::core_modules::sampler::{RgbSample, SampleSource};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub class_name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSample {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub hex: String,
    pub hsv: Hsv,
    pub hsl: Hsl,
    pub color_temp: ColorTemperature,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub centroid: (f64, f64),
    pub rect: PixelRect,
    pub pixel_count: u64,
    pub source: SampleSource,
    pub std_dev: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

impl ColorSample {
    pub fn from_rgb_sample(sample: RgbSample, timestamp_ms: u64) -> Self {
        let (r, g, b) = (sample.r, sample.g, sample.b);
        Self {
            r,
            g,
            b,
            hex: sample.hex,
            hsv: rgb_to_hsv(r, g, b),
            hsl: rgb_to_hsl(r, g, b),
            color_temp: rgb_to_color_temperature(r, g, b),
            timestamp_ms,
            centroid: sample.centroid,
            rect: sample.rect,
            pixel_count: sample.pixel_count,
            source: sample.source,
            std_dev: sample.std_dev,
            classification: None,
        }
    }

    /// `[R, G, B, H, S, V, K]`, the classifier's feature layout.
    pub fn features(&self) -> [f64; FEATURE_DIMENSIONS] {
        [
            self.r as f64,
            self.g as f64,
            self.b as f64,
            self.hsv.h,
            self.hsv.s,
            self.hsv.v,
            self.color_temp.feature_value(),
        ]
    }

    /// Attaches the classifier's label to this sample.
    pub fn classify_with(&mut self, classifier: &KnnClassifier) -> Result<()> {
        let prediction = classifier.predict(&self.features())?;
        self.classification = Some(Classification {
            class_name: prediction.class_name,
            confidence: prediction.confidence,
        });
        Ok(())
    }
}

pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
