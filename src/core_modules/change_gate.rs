// THEORY:
// The `FrameChangeGate` is the gatekeeper of the tick loop. Sampling, conversion and
// classification are only worth running when the scene actually changed, so the gate
// compares each new frame with the one before it and lets the tick through only when
// enough of the watched area moved.
//
// Decision order, per evaluation:
// 1.  **Frozen**: the operator paused analysis. The gate is not evaluated at all and
//     the baseline stays as it was.
// 2.  **Throttle**: a minimum wall-clock interval must have passed since the last tick
//     that was actually processed. A throttled tick is not an evaluation either.
// 3.  **Evaluation**: the new frame replaces the stored baseline (always, pass or fail),
//     and then the first matching rule wins:
//     - a pending force (the ROI just moved, resized or was re-resolved) → process;
//     - no comparable baseline (first frame, or the frame size changed) → process;
//     - change ratio above the sensitivity → process; otherwise skip.
//
// The change ratio looks at every 10th pixel of the scope in row-major order. A sampled
// pixel counts as changed when |ΔR|+|ΔG|+|ΔB| against the same coordinate of the
// baseline exceeds 30.
//
// Because the baseline is refreshed on every evaluation, drift is always measured
// against the immediately preceding frame. Slow sub-threshold drift never accumulates.

use std::time::Instant;

use tracing::debug;

use crate::config::Settings;
use crate::core_modules::frame::PixelBuffer;
use crate::core_modules::geometry::PixelRect;

const PIXEL_SAMPLE_STEP: usize = 10;
const PIXEL_CHANGE_THRESHOLD: u16 = 30;

/// Which part of the frame the gate watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateScope {
    /// No ROI exists yet.
    WholeFrame,
    /// Restricted to the resolved ROI rectangle.
    Roi(PixelRect),
}

/// Why the gate decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateReason {
    FirstFrame,
    Forced,
    Changed { ratio: f64 },
    Unchanged { ratio: f64 },
    Throttled,
    Frozen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Process(GateReason),
    Skip(GateReason),
}

impl GateDecision {
    pub fn should_process(&self) -> bool {
        matches!(self, GateDecision::Process(_))
    }

    pub fn reason(&self) -> GateReason {
        match self {
            GateDecision::Process(reason) | GateDecision::Skip(reason) => *reason,
        }
    }
}

/// Stateful frame-to-frame change detector.
#[derive(Debug, Default)]
pub struct FrameChangeGate {
    /// The frame seen at the last evaluation.
    baseline: Option<PixelBuffer>,
    /// When the gate last let a tick through.
    last_processed: Option<Instant>,
    /// Set by geometry changes; consumed by the next evaluation.
    force_pending: bool,
    frozen: bool,
}

impl FrameChangeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the next evaluation through, bypassing the ratio test.
    pub fn force(&mut self) {
        self.force_pending = true;
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn should_process(
        &mut self,
        buffer: &PixelBuffer,
        scope: GateScope,
        settings: &Settings,
        now: Instant,
    ) -> GateDecision {
        if self.frozen {
            return GateDecision::Skip(GateReason::Frozen);
        }

        if let Some(last) = self.last_processed {
            if now.saturating_duration_since(last) < settings.tick_interval() {
                return GateDecision::Skip(GateReason::Throttled);
            }
        }

        let previous = self.baseline.replace(buffer.clone());

        let decision = if std::mem::take(&mut self.force_pending) {
            GateDecision::Process(GateReason::Forced)
        } else {
            match previous {
                Some(previous) if previous.same_dimensions(buffer) => {
                    let rect = match scope {
                        GateScope::WholeFrame => buffer.bounds(),
                        GateScope::Roi(rect) => rect.clamp_to(&buffer.bounds()),
                    };
                    let ratio = change_ratio(&previous, buffer, &rect);
                    if ratio > settings.sensitivity() {
                        GateDecision::Process(GateReason::Changed { ratio })
                    } else {
                        GateDecision::Skip(GateReason::Unchanged { ratio })
                    }
                }
                _ => GateDecision::Process(GateReason::FirstFrame),
            }
        };

        if decision.should_process() {
            self.last_processed = Some(now);
        }
        debug!(?scope, ?decision, "frame change gate evaluated");
        decision
    }
}

/// Fraction of sampled pixels in `rect` whose channel-sum distance exceeds the threshold.
/// Both frames must share dimensions and `rect` must lie inside them.
pub fn change_ratio(previous: &PixelBuffer, current: &PixelBuffer, rect: &PixelRect) -> f64 {
    let pixel_count = rect.area() as usize;
    if pixel_count == 0 {
        return 0.0;
    }
    let width = rect.width as usize;

    let mut sampled = 0usize;
    let mut changed = 0usize;
    for index in (0..pixel_count).step_by(PIXEL_SAMPLE_STEP) {
        let x = rect.x + (index % width) as u32;
        let y = rect.y + (index / width) as u32;
        let distance = current.pixel(x, y).channel_distance(&previous.pixel(x, y));
        sampled += 1;
        if distance > PIXEL_CHANGE_THRESHOLD {
            changed += 1;
        }
    }
    changed as f64 / sampled as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::config::RawSettings;
    use crate::core_modules::frame::PixelFormat;
    use crate::core_modules::pixel::pixel::Pixel;

    const WIDTH: u32 = 100;
    const HEIGHT: u32 = 10;

    fn settings(sensitivity: f64) -> Settings {
        Settings::from_raw(&RawSettings {
            sensitivity: Some(sensitivity),
            tick_interval_ms: Some(500),
            ..Default::default()
        })
    }

    fn frame_with(changed: impl Fn(usize) -> bool) -> PixelBuffer {
        let mut data = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
        for index in 0..(WIDTH * HEIGHT) as usize {
            let value = if changed(index) { 200 } else { 100 };
            data.extend_from_slice(&[value, value, value]);
        }
        PixelBuffer::new(WIDTH, HEIGHT, PixelFormat::Rgb8, data).unwrap()
    }

    /// Marks the first `percent` of every ten consecutive sampled pixels as changed.
    fn sampled_fraction(percent: usize) -> impl Fn(usize) -> bool {
        move |index| index % PIXEL_SAMPLE_STEP == 0 && (index / PIXEL_SAMPLE_STEP) % 10 < percent / 10
    }

    #[test]
    fn first_tick_always_processes() {
        let mut gate = FrameChangeGate::new();
        let decision = gate.should_process(&frame_with(|_| false), GateScope::WholeFrame, &settings(0.1), Instant::now());
        assert_eq!(decision, GateDecision::Process(GateReason::FirstFrame));
        assert!(gate.has_baseline());
    }

    #[test]
    fn identical_frames_are_skipped() {
        let mut gate = FrameChangeGate::new();
        let settings = settings(0.1);
        let start = Instant::now();
        let frame = frame_with(|_| false);

        assert!(gate.should_process(&frame, GateScope::WholeFrame, &settings, start).should_process());
        let second = gate.should_process(&frame, GateScope::WholeFrame, &settings, start + Duration::from_secs(1));
        assert_eq!(second, GateDecision::Skip(GateReason::Unchanged { ratio: 0.0 }));
    }

    #[test]
    fn ratio_is_compared_against_sensitivity() {
        let settings = settings(0.5);
        let start = Instant::now();
        let later = start + Duration::from_secs(1);

        let mut gate = FrameChangeGate::new();
        gate.should_process(&frame_with(|_| false), GateScope::WholeFrame, &settings, start);
        let busy = gate.should_process(&frame_with(sampled_fraction(60)), GateScope::WholeFrame, &settings, later);
        assert!(busy.should_process());
        match busy.reason() {
            GateReason::Changed { ratio } => assert!((ratio - 0.6).abs() < 1e-9),
            other => panic!("unexpected reason {other:?}"),
        }

        let mut gate = FrameChangeGate::new();
        gate.should_process(&frame_with(|_| false), GateScope::WholeFrame, &settings, start);
        let quiet = gate.should_process(&frame_with(sampled_fraction(20)), GateScope::WholeFrame, &settings, later);
        assert!(!quiet.should_process());
    }

    #[test]
    fn small_per_pixel_differences_do_not_count() {
        let base = PixelBuffer::filled(20, 20, Pixel::rgb(100, 100, 100)).unwrap();
        let nudged = PixelBuffer::filled(20, 20, Pixel::rgb(110, 110, 110)).unwrap();
        let shifted = PixelBuffer::filled(20, 20, Pixel::rgb(111, 110, 110)).unwrap();
        assert_eq!(change_ratio(&base, &nudged, &base.bounds()), 0.0);
        assert_eq!(change_ratio(&base, &shifted, &base.bounds()), 1.0);
    }

    #[test]
    fn throttle_is_checked_before_change_and_keeps_baseline() {
        let mut gate = FrameChangeGate::new();
        let settings = settings(0.1);
        let start = Instant::now();
        let quiet = frame_with(|_| false);
        let busy = frame_with(|_| true);

        gate.should_process(&quiet, GateScope::WholeFrame, &settings, start);
        let early = gate.should_process(&busy, GateScope::WholeFrame, &settings, start + Duration::from_millis(100));
        assert_eq!(early, GateDecision::Skip(GateReason::Throttled));

        // The throttled frame never became the baseline, so the change is still seen.
        let later = gate.should_process(&busy, GateScope::WholeFrame, &settings, start + Duration::from_millis(600));
        assert!(later.should_process());
    }

    #[test]
    fn baseline_refreshes_even_when_skipping() {
        let mut gate = FrameChangeGate::new();
        let settings = settings(0.5);
        let start = Instant::now();

        gate.should_process(&frame_with(|_| false), GateScope::WholeFrame, &settings, start);
        // 20% drift: skipped, yet it becomes the new baseline.
        let drift = frame_with(sampled_fraction(20));
        let step = Duration::from_secs(1);
        assert!(!gate.should_process(&drift, GateScope::WholeFrame, &settings, start + step).should_process());
        // Same frame again measures zero against the refreshed baseline.
        let again = gate.should_process(&drift, GateScope::WholeFrame, &settings, start + step * 2);
        assert_eq!(again, GateDecision::Skip(GateReason::Unchanged { ratio: 0.0 }));
    }

    #[test]
    fn force_bypasses_ratio_once() {
        let mut gate = FrameChangeGate::new();
        let settings = settings(0.1);
        let start = Instant::now();
        let frame = frame_with(|_| false);

        gate.should_process(&frame, GateScope::WholeFrame, &settings, start);
        gate.force();
        let forced = gate.should_process(&frame, GateScope::WholeFrame, &settings, start + Duration::from_secs(1));
        assert_eq!(forced, GateDecision::Process(GateReason::Forced));
        let next = gate.should_process(&frame, GateScope::WholeFrame, &settings, start + Duration::from_secs(2));
        assert!(!next.should_process());
    }

    #[test]
    fn frozen_gate_is_not_evaluated() {
        let mut gate = FrameChangeGate::new();
        gate.freeze();
        let decision = gate.should_process(&frame_with(|_| false), GateScope::WholeFrame, &settings(0.1), Instant::now());
        assert_eq!(decision, GateDecision::Skip(GateReason::Frozen));
        assert!(!gate.has_baseline());

        gate.unfreeze();
        assert!(!gate.is_frozen());
    }

    #[test]
    fn roi_scope_ignores_changes_outside_it() {
        let mut gate = FrameChangeGate::new();
        let settings = settings(0.1);
        let start = Instant::now();
        let roi = GateScope::Roi(PixelRect::new(0, 0, 10, 10));

        gate.should_process(&frame_with(|_| false), roi, &settings, start);
        // Only columns at x >= 50 change.
        let right_half = frame_with(|index| index % WIDTH as usize >= 50);
        let decision = gate.should_process(&right_half, roi, &settings, start + Duration::from_secs(1));
        assert!(!decision.should_process());
    }

    #[test]
    fn resized_frame_counts_as_first() {
        let mut gate = FrameChangeGate::new();
        let settings = settings(0.1);
        let start = Instant::now();
        gate.should_process(&frame_with(|_| false), GateScope::WholeFrame, &settings, start);
        let other = PixelBuffer::filled(5, 5, Pixel::rgb(100, 100, 100)).unwrap();
        let decision = gate.should_process(&other, GateScope::WholeFrame, &settings, start + Duration::from_secs(1));
        assert_eq!(decision, GateDecision::Process(GateReason::FirstFrame));
    }
}
