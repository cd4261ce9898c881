// THEORY:
// The `pipeline` module is the top-level API of the probe. It owns every piece of
// state that crosses tick boundaries and runs one complete, synchronous pass per tick:
//
//   Frame Change Gate → ROI Resolver → Color Sampler → Color Space Converter → Classifier
//
// Data flows strictly downstream. The pipeline is the only place where the components
// meet, so none of them knows about the others.
//
// Key architectural principles:
// 1.  **Snapshot at tick start**: settings and the live ROI are copied once when a tick
//     begins. An input handler that moves the ROI in the middle of a tick affects the
//     next tick, never the sample being computed.
// 2.  **Geometry forces a refresh**: a move or resize of the ROI, a new display layout,
//     or any change of the resolved buffer rectangle sets the gate's force flag. The
//     operator sees the new region's color immediately even on a static scene.
// 3.  **Recover locally**: a region without usable pixels yields `TickReport::NoSample`
//     and leaves the last good sample in place. Nothing per-tick ever escapes as an error.
// 4.  **Optional enrichment**: the classifier is consulted only when it holds a model;
//     an untrained classifier simply produces unlabeled samples.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{debug, warn};

use crate::config::{Settings, SettingsHandle};
use crate::core_modules::change_gate::{FrameChangeGate, GateDecision, GateReason, GateScope};
use crate::core_modules::classifier::{ClassifierHandle, KnnClassifier};
use crate::core_modules::color_sample::unix_millis;
use crate::core_modules::frame::PixelBuffer;
use crate::core_modules::geometry::{Layout, LiveRoi, PixelRect, RoiResolver};
use crate::core_modules::sampler::ColorSampler;
use crate::error::ProbeError;

pub use crate::core_modules::color_sample::{Classification, ColorSample};

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// The pipeline is frozen; nothing was evaluated.
    Frozen,
    /// The gate declined the frame.
    Skipped(GateDecision),
    /// The gate passed but the region held no usable pixels.
    NoSample,
    Sampled(ColorSample),
}

impl TickReport {
    pub fn sample(&self) -> Option<&ColorSample> {
        match self {
            TickReport::Sampled(sample) => Some(sample),
            _ => None,
        }
    }
}

/// The per-session probe state, driven one tick at a time.
pub struct ProbePipeline {
    settings: SettingsHandle,
    gate: FrameChangeGate,
    roi: LiveRoi,
    classifier: ClassifierHandle,
    last_sample: Option<ColorSample>,
    /// Layout and resolved rect of the previous evaluated tick.
    last_layout: Option<Layout>,
    last_rect: Option<PixelRect>,
}

impl ProbePipeline {
    pub fn new(settings: SettingsHandle, classifier: ClassifierHandle) -> Self {
        Self {
            settings,
            gate: FrameChangeGate::new(),
            roi: LiveRoi::new(),
            classifier,
            last_sample: None,
            last_layout: None,
            last_rect: None,
        }
    }

    /// A pipeline with its own settings and an untrained classifier using `settings.k()`.
    pub fn with_settings(settings: Settings) -> Self {
        let classifier = Arc::new(KnnClassifier::new(settings.k()));
        Self::new(SettingsHandle::new(settings), classifier)
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn classifier(&self) -> &ClassifierHandle {
        &self.classifier
    }

    pub fn roi(&self) -> &LiveRoi {
        &self.roi
    }

    /// Mutable access for input handlers. Any edit forces the next evaluation through.
    pub fn roi_mut(&mut self) -> &mut LiveRoi {
        &mut self.roi
    }

    pub fn freeze(&mut self) {
        self.gate.freeze();
    }

    pub fn unfreeze(&mut self) {
        self.gate.unfreeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.gate.is_frozen()
    }

    /// Forces the next evaluated tick to sample regardless of scene change.
    pub fn force_refresh(&mut self) {
        self.gate.force();
    }

    /// The most recent successful sample. Survives ticks that produce nothing.
    pub fn last_sample(&self) -> Option<&ColorSample> {
        self.last_sample.as_ref()
    }

    pub fn tick(&mut self, buffer: &PixelBuffer, layout: &Layout, now: Instant) -> TickReport {
        if self.gate.is_frozen() {
            return TickReport::Frozen;
        }

        let settings = self.settings.snapshot();
        if self.last_layout.is_some_and(|last| last != *layout) {
            self.roi.mark_layout_changed();
        }
        self.last_layout = Some(*layout);

        let requested = self.roi.snapshot();
        let resolved = RoiResolver::resolve(requested.as_ref(), layout, buffer.width(), buffer.height(), &settings);
        let rect_moved = self.last_rect.is_some_and(|last| last != resolved.rect);
        self.last_rect = Some(resolved.rect);
        if self.roi.take_geometry_change() || rect_moved {
            debug!(rect = ?resolved.rect, used_default = resolved.used_default, "ROI geometry changed");
            self.gate.force();
        }

        let scope = match requested {
            Some(_) => GateScope::Roi(resolved.rect),
            None => GateScope::WholeFrame,
        };

        let decision = self.gate.should_process(buffer, scope, &settings, now);
        match decision {
            GateDecision::Skip(GateReason::Frozen) => return TickReport::Frozen,
            GateDecision::Skip(_) => return TickReport::Skipped(decision),
            GateDecision::Process(_) => {}
        }

        let rgb = match ColorSampler::sample(buffer, &resolved.rect, &settings) {
            Ok(rgb) => rgb,
            Err(err) => {
                if err.is_recoverable() {
                    debug!(rect = ?resolved.rect, error = %err, "tick produced no sample");
                } else {
                    warn!(rect = ?resolved.rect, error = %err, "sampling failed");
                }
                return TickReport::NoSample;
            }
        };

        let mut sample = ColorSample::from_rgb_sample(rgb, unix_millis(SystemTime::now()));
        if self.classifier.is_trained() {
            match sample.classify_with(&self.classifier) {
                Ok(()) => {}
                // Disposed between the check and the prediction.
                Err(ProbeError::State { .. }) => {}
                Err(err) => warn!(error = %err, "classification failed, emitting unlabeled sample"),
            }
        }

        debug!(
            hex = %sample.hex,
            pixels = sample.pixel_count,
            used_default_roi = resolved.used_default,
            "tick sampled"
        );
        self.last_sample = Some(sample.clone());
        TickReport::Sampled(sample)
    }
}
