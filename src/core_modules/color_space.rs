// THEORY:
// The `color_space` module holds the pure, stateless color-science functions that
// enrich a sampled RGB triple with the descriptors operators and the classifier use:
//
// - HSV and HSL: cylindrical re-arrangements of sRGB built on the same max/min/Δ
//   decomposition. Hue is an angle in [0, 360); saturation, value and lightness are
//   percentages in [0, 100], one decimal of precision.
// - Correlated Color Temperature (CCT): a single Kelvin figure for how warm or cool a
//   light looks, estimated with McCamy's cubic from CIE 1931 chromaticity.
//
// Nothing here ever returns NaN. Pure black has no light to measure and yields the
// `NoLightSource` sentinel; a zero chromaticity denominator yields `Invalid`. Every
// numeric result is clamped into the documented range.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProbeError, Result};

const HUE_SECTOR_DEGREES: f64 = 60.0;
const MIN_KELVIN: f64 = 1000.0;
const MAX_KELVIN: f64 = 25000.0;

// sRGB (D65) linear RGB → CIE XYZ.
const SRGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

// McCamy (1992) epicenter and cubic coefficients.
const MCCAMY_XE: f64 = 0.3320;
const MCCAMY_YE: f64 = 0.1858;
const MCCAMY_COEFFICIENTS: [f64; 4] = [449.0, 3525.0, 6823.3, 5520.33];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsv {
    /// Hue in degrees, [0, 360).
    pub h: f64,
    /// Saturation, [0, 100].
    pub s: f64,
    /// Value, [0, 100].
    pub v: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

/// Coarse warmth bucket of a color temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemperatureCategory {
    Warm,
    Neutral,
    Daylight,
    Cool,
}

/// Upper bound (exclusive) → description and category. Values at or above the last
/// bound fall into the trailing bucket.
const TEMPERATURE_BUCKETS: [(f64, &str, TemperatureCategory); 8] = [
    (2000.0, "candle light", TemperatureCategory::Warm),
    (3000.0, "tungsten warm light", TemperatureCategory::Warm),
    (3500.0, "warm white", TemperatureCategory::Warm),
    (4500.0, "neutral white", TemperatureCategory::Neutral),
    (5500.0, "natural light", TemperatureCategory::Neutral),
    (6500.0, "daylight", TemperatureCategory::Daylight),
    (8000.0, "cool white", TemperatureCategory::Cool),
    (10000.0, "overcast cool light", TemperatureCategory::Cool),
];
const COOLEST_BUCKET: (&str, TemperatureCategory) = ("blue sky", TemperatureCategory::Cool);

/// Result of a color temperature estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColorTemperature {
    Kelvin {
        /// Clamped to [1000, 25000].
        kelvin: f64,
        description: String,
        category: TemperatureCategory,
    },
    /// Input was pure black.
    NoLightSource,
    /// The chromaticity math hit a zero denominator.
    Invalid,
}

impl ColorTemperature {
    pub fn from_kelvin(kelvin: f64) -> Self {
        let kelvin = kelvin.clamp(MIN_KELVIN, MAX_KELVIN);
        let (description, category) = describe_kelvin(kelvin);
        ColorTemperature::Kelvin {
            kelvin,
            description: description.to_string(),
            category,
        }
    }

    pub fn kelvin(&self) -> Option<f64> {
        match self {
            ColorTemperature::Kelvin { kelvin, .. } => Some(*kelvin),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<TemperatureCategory> {
        match self {
            ColorTemperature::Kelvin { category, .. } => Some(*category),
            _ => None,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ColorTemperature::Kelvin { description, .. } => description,
            ColorTemperature::NoLightSource => "no light source",
            ColorTemperature::Invalid => "invalid",
        }
    }

    /// The value used as the Kelvin classifier feature; sentinels map to 0.
    pub fn feature_value(&self) -> f64 {
        self.kelvin().unwrap_or(0.0)
    }
}

/// Buckets a Kelvin value into its description and category.
pub fn describe_kelvin(kelvin: f64) -> (&'static str, TemperatureCategory) {
    TEMPERATURE_BUCKETS
        .iter()
        .find(|(upper, _, _)| kelvin < *upper)
        .map(|(_, description, category)| (*description, *category))
        .unwrap_or(COOLEST_BUCKET)
}

/// max, min and Δ over normalized channels, plus the hue they imply.
struct Decomposition {
    max: f64,
    min: f64,
    delta: f64,
    hue: f64,
}

fn decompose(r: u8, g: u8, b: u8) -> Decomposition {
    let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= 0.0 {
        0.0
    } else if max == r {
        HUE_SECTOR_DEGREES * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        HUE_SECTOR_DEGREES * ((b - r) / delta + 2.0)
    } else {
        HUE_SECTOR_DEGREES * ((r - g) / delta + 4.0)
    };

    Decomposition {
        max,
        min,
        delta,
        hue,
    }
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percent(value: f64) -> f64 {
    one_decimal(value * 100.0).clamp(0.0, 100.0)
}

/// Rounds a hue to one decimal and wraps it into [0, 360).
fn wrap_hue(hue: f64) -> f64 {
    let rounded = one_decimal(hue.rem_euclid(360.0));
    if rounded >= 360.0 { rounded - 360.0 } else { rounded }
}

pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let d = decompose(r, g, b);
    let saturation = if d.max <= 0.0 { 0.0 } else { d.delta / d.max };
    Hsv {
        h: wrap_hue(d.hue),
        s: percent(saturation),
        v: percent(d.max),
    }
}

pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> Hsl {
    let d = decompose(r, g, b);
    let lightness = (d.max + d.min) / 2.0;
    let saturation = if d.delta <= 0.0 {
        0.0
    } else {
        d.delta / (1.0 - (2.0 * lightness - 1.0).abs())
    };
    Hsl {
        h: wrap_hue(d.hue),
        s: percent(saturation),
        l: percent(lightness),
    }
}

/// Inverse sRGB transfer function on a normalized channel.
pub fn srgb_to_linear(channel: f64) -> f64 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}

/// CIE 1931 (x, y) chromaticity, or `None` when X+Y+Z is zero.
pub fn chromaticity_xy(r: u8, g: u8, b: u8) -> Option<(f64, f64)> {
    let linear = [r, g, b].map(|c| srgb_to_linear(c as f64 / 255.0));
    let [x, y, z] = SRGB_TO_XYZ.map(|row| row[0] * linear[0] + row[1] * linear[1] + row[2] * linear[2]);
    let sum = x + y + z;
    if sum == 0.0 {
        return None;
    }
    Some((x / sum, y / sum))
}

/// McCamy's cubic on CIE 1931 chromaticity. Fails when `y` sits on the epicenter's
/// y coordinate or the cubic overflows.
pub fn mccamy_cct(x: f64, y: f64) -> Result<f64> {
    let denominator = MCCAMY_YE - y;
    if denominator == 0.0 {
        return Err(ProbeError::NumericDegenerate {
            quantity: "McCamy denominator (0.1858 - y)".to_string(),
        });
    }
    let n = (x - MCCAMY_XE) / denominator;
    let [a, b, c, d] = MCCAMY_COEFFICIENTS;
    let cct = a * n.powi(3) + b * n.powi(2) + c * n + d;
    if !cct.is_finite() {
        return Err(ProbeError::NumericDegenerate {
            quantity: format!("CCT at n = {}", n),
        });
    }
    Ok(cct)
}

/// Correlated color temperature of an sRGB color, clamped and bucketed.
pub fn rgb_to_color_temperature(r: u8, g: u8, b: u8) -> ColorTemperature {
    if (r, g, b) == (0, 0, 0) {
        return ColorTemperature::NoLightSource;
    }
    let Some((x, y)) = chromaticity_xy(r, g, b) else {
        debug!(r, g, b, "zero XYZ sum, color temperature invalid");
        return ColorTemperature::Invalid;
    };
    match mccamy_cct(x, y) {
        Ok(cct) => ColorTemperature::from_kelvin(cct),
        Err(err) => {
            debug!(r, g, b, error = %err, "color temperature invalid");
            ColorTemperature::Invalid
        }
    }
}

/// `#rrggbb`, lowercase.
pub fn hex_string(r: u8, g: u8, b: u8) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}
