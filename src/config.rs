// THEORY:
// The `config` module turns the loose "bag of knobs" an operator edits into a strongly
// typed `Settings` value that is valid by construction. Every tunable is clamped into
// its domain exactly once, when the `Settings` is built. The per-tick code can then
// read any field without re-validating it.
//
// Two types cooperate:
// - `RawSettings` is the serde-facing shape. Every field is optional and untyped enough
//   (plain numbers) to hold whatever a settings file or UI hands us, including values
//   that are out of range.
// - `Settings` is the clamped, read-only view consumed by the pipeline. Missing fields
//   coalesce to defaults, out-of-range fields are pulled to the nearest bound, and
//   non-finite floats fall back to the default.
//
// A `SettingsHandle` shares one `Settings` between the external settings collaborator
// (writer) and the tick loop (reader). The loop takes a copy once per tick, so a
// settings change never lands halfway through a pass.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::Result;

const DEFAULT_BLACK_THRESHOLD: u8 = 30;
const DEFAULT_WHITE_THRESHOLD: u8 = 225;
const DEFAULT_MIN_SATURATION: u8 = 15;
const DEFAULT_MARGIN_PERCENT: f64 = 10.0;
const MAX_MARGIN_PERCENT: f64 = 49.0;
const DEFAULT_MIN_MARGIN_PX: u32 = 2;
const DEFAULT_SAMPLE_STRIDE: u32 = 2;
const MAX_SAMPLE_STRIDE: u32 = 64;
const DEFAULT_SENSITIVITY: f64 = 0.1;
const DEFAULT_TICK_INTERVAL_MS: u64 = 500;
const DEFAULT_FROZEN_POLL_MS: u64 = 250;
const DEFAULT_K: usize = 3;

/// Unvalidated settings as they arrive from a file or the settings UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub black_threshold: Option<i64>,
    pub white_threshold: Option<i64>,
    pub min_saturation: Option<i64>,
    pub margin_percent: Option<f64>,
    pub min_margin_px: Option<i64>,
    pub sample_stride: Option<i64>,
    pub sensitivity: Option<f64>,
    pub tick_interval_ms: Option<i64>,
    pub frozen_poll_interval_ms: Option<i64>,
    pub k: Option<i64>,
}

/// Clamped, process-wide tunables read by every stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    black_threshold: u8,
    white_threshold: u8,
    min_saturation: u8,
    margin_percent: f64,
    min_margin_px: u32,
    sample_stride: u32,
    sensitivity: f64,
    tick_interval: Duration,
    frozen_poll_interval: Duration,
    k: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            black_threshold: DEFAULT_BLACK_THRESHOLD,
            white_threshold: DEFAULT_WHITE_THRESHOLD,
            min_saturation: DEFAULT_MIN_SATURATION,
            margin_percent: DEFAULT_MARGIN_PERCENT,
            min_margin_px: DEFAULT_MIN_MARGIN_PX,
            sample_stride: DEFAULT_SAMPLE_STRIDE,
            sensitivity: DEFAULT_SENSITIVITY,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            frozen_poll_interval: Duration::from_millis(DEFAULT_FROZEN_POLL_MS),
            k: DEFAULT_K,
        }
    }
}

impl Settings {
    /// Builds settings from raw input, clamping every field into its domain.
    pub fn from_raw(raw: &RawSettings) -> Self {
        Self {
            black_threshold: clamp_byte(raw.black_threshold, DEFAULT_BLACK_THRESHOLD),
            white_threshold: clamp_byte(raw.white_threshold, DEFAULT_WHITE_THRESHOLD),
            min_saturation: clamp_byte(raw.min_saturation, DEFAULT_MIN_SATURATION),
            margin_percent: clamp_float(
                raw.margin_percent,
                0.0,
                MAX_MARGIN_PERCENT,
                DEFAULT_MARGIN_PERCENT,
            ),
            min_margin_px: raw
                .min_margin_px
                .map(|v| v.clamp(0, u32::MAX as i64) as u32)
                .unwrap_or(DEFAULT_MIN_MARGIN_PX),
            sample_stride: raw
                .sample_stride
                .map(|v| v.clamp(1, MAX_SAMPLE_STRIDE as i64) as u32)
                .unwrap_or(DEFAULT_SAMPLE_STRIDE),
            sensitivity: clamp_float(raw.sensitivity, 0.0, 1.0, DEFAULT_SENSITIVITY),
            tick_interval: clamp_millis(raw.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS),
            frozen_poll_interval: clamp_millis(raw.frozen_poll_interval_ms, DEFAULT_FROZEN_POLL_MS),
            k: raw
                .k
                .map(|v| v.max(1) as usize)
                .unwrap_or(DEFAULT_K),
        }
    }

    /// Loads and clamps settings from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let raw: RawSettings = serde_json::from_str(&content)?;
        Ok(Self::from_raw(&raw))
    }

    /// Saves the clamped settings as JSON.
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_raw())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// The fully populated raw form of these settings.
    pub fn to_raw(&self) -> RawSettings {
        RawSettings {
            black_threshold: Some(self.black_threshold as i64),
            white_threshold: Some(self.white_threshold as i64),
            min_saturation: Some(self.min_saturation as i64),
            margin_percent: Some(self.margin_percent),
            min_margin_px: Some(self.min_margin_px as i64),
            sample_stride: Some(self.sample_stride as i64),
            sensitivity: Some(self.sensitivity),
            tick_interval_ms: Some(self.tick_interval.as_millis() as i64),
            frozen_poll_interval_ms: Some(self.frozen_poll_interval.as_millis() as i64),
            k: Some(self.k as i64),
        }
    }

    /// Pixels with every channel at or below this are treated as black background.
    pub fn black_threshold(&self) -> u8 {
        self.black_threshold
    }

    /// Pixels with every channel at or above this are treated as blown-out white.
    pub fn white_threshold(&self) -> u8 {
        self.white_threshold
    }

    /// Minimum max−min channel spread for a pixel to count as colored.
    pub fn min_saturation(&self) -> u8 {
        self.min_saturation
    }

    pub fn margin_percent(&self) -> f64 {
        self.margin_percent
    }

    pub fn min_margin_px(&self) -> u32 {
        self.min_margin_px
    }

    pub fn sample_stride(&self) -> u32 {
        self.sample_stride
    }

    /// Fraction of sampled pixels that must change before a tick is processed.
    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn frozen_poll_interval(&self) -> Duration {
        self.frozen_poll_interval
    }

    /// Neighbors consulted by the classifier.
    pub fn k(&self) -> usize {
        self.k
    }
}

impl From<RawSettings> for Settings {
    fn from(raw: RawSettings) -> Self {
        Self::from_raw(&raw)
    }
}

fn clamp_byte(value: Option<i64>, default: u8) -> u8 {
    value.map(|v| v.clamp(0, 255) as u8).unwrap_or(default)
}

fn clamp_float(value: Option<f64>, min: f64, max: f64, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(min, max),
        _ => default,
    }
}

fn clamp_millis(value: Option<i64>, default: u64) -> Duration {
    Duration::from_millis(value.map(|v| v.max(1) as u64).unwrap_or(default))
}

/// Shared, replaceable settings. Writers swap the whole value; readers copy it.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// A copy of the current settings, taken once per tick.
    pub fn snapshot(&self) -> Settings {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn replace(&self, settings: Settings) {
        match self.inner.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }
}
