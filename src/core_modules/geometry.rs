// THEORY:
// The `geometry` module owns the mapping between the two coordinate spaces the engine
// lives in:
//
// - **Display space**: the on-screen container the operator drags the ROI around in.
//   The camera image is shown "contained" inside it, so it is letterboxed or
//   pillarboxed whenever the aspect ratios differ.
// - **Buffer space**: integer pixel coordinates of the captured frame, which is what
//   the sampler and the change gate actually read.
//
// `RoiResolver::resolve` is the bridge. It never fails: a missing or stale ROI is
// replaced by a centered default, an over-eroded ROI keeps its original extent, and
// the final rectangle is always at least 1x1 and fully inside the frame.
//
// `LiveRoi` is the mutable descriptor user-input handlers edit between ticks. Every
// geometry edit raises a one-shot "geometry changed" flag that the pipeline forwards
// to the change gate as a force, and the pipeline reads the ROI through `snapshot()`
// exactly once per tick.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Settings;
use crate::error::ProbeError;

const MIN_ERODED_SIDE_PX: i64 = 8;
const DEFAULT_ROI_DIVISOR: f64 = 4.0;
const CONTAINMENT_EPSILON: f64 = 1e-6;

/// A width/height pair in display (CSS-like, fractional) units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_positive(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }
}

/// A region in display space, as placed by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Roi {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// True when `other` lies entirely inside this region.
    pub fn contains(&self, other: &Roi) -> bool {
        other.width > 0.0
            && other.height > 0.0
            && other.x >= self.x - CONTAINMENT_EPSILON
            && other.y >= self.y - CONTAINMENT_EPSILON
            && other.right() <= self.right() + CONTAINMENT_EPSILON
            && other.bottom() <= self.bottom() + CONTAINMENT_EPSILON
    }
}

/// An integer rectangle in buffer space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Geometric center, in fractional buffer coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    pub fn contains_rect(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Intersects with `bounds`, never returning less than 1x1 inside them.
    pub fn clamp_to(&self, bounds: &PixelRect) -> PixelRect {
        SignedRect::from(*self).clamp_to(bounds)
    }
}

/// Working rectangle that may hang off the frame before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SignedRect {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
}

impl SignedRect {
    fn shorter_side(&self) -> i64 {
        self.width.min(self.height)
    }

    fn eroded(&self, margin: i64) -> SignedRect {
        SignedRect {
            x: self.x + margin,
            y: self.y + margin,
            width: self.width - 2 * margin,
            height: self.height - 2 * margin,
        }
    }

    fn clamp_to(&self, bounds: &PixelRect) -> PixelRect {
        let min_x = bounds.x as i64;
        let min_y = bounds.y as i64;
        let max_x = bounds.right() as i64;
        let max_y = bounds.bottom() as i64;

        let left = self.x.clamp(min_x, max_x - 1);
        let top = self.y.clamp(min_y, max_y - 1);
        let right = (self.x + self.width).clamp(left + 1, max_x);
        let bottom = (self.y + self.height).clamp(top + 1, max_y);

        PixelRect::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
    }
}

impl From<PixelRect> for SignedRect {
    fn from(rect: PixelRect) -> Self {
        Self {
            x: rect.x as i64,
            y: rect.y as i64,
            width: rect.width as i64,
            height: rect.height as i64,
        }
    }
}

/// Where the camera image sits on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    /// Intrinsic size of the displayed source; only its aspect ratio matters.
    pub display: Size,
    /// The on-screen box the source is contained in, and in which ROIs are expressed.
    pub container: Size,
}

impl Layout {
    pub fn new(display: Size, container: Size) -> Self {
        Self { display, container }
    }

    /// A layout where the frame is shown 1:1 with no letterboxing.
    pub fn native(width: u32, height: u32) -> Self {
        let size = Size::new(width as f64, height as f64);
        Self::new(size, size)
    }

    pub fn display_rect(&self) -> Roi {
        contain_fit(self.display, self.container)
    }
}

/// The rectangle an image of `intrinsic` aspect occupies when contained in `container`.
pub fn contain_fit(intrinsic: Size, container: Size) -> Roi {
    if !intrinsic.is_positive() || !container.is_positive() {
        return Roi::new(0.0, 0.0, container.width.max(0.0), container.height.max(0.0));
    }
    let intrinsic_aspect = intrinsic.width / intrinsic.height;
    let container_aspect = container.width / container.height;

    if intrinsic_aspect > container_aspect {
        // Wider than the box: full width, bars above and below.
        let height = container.width / intrinsic_aspect;
        Roi::new(0.0, (container.height - height) / 2.0, container.width, height)
    } else {
        // Taller (or equal): full height, bars left and right.
        let width = container.height * intrinsic_aspect;
        Roi::new((container.width - width) / 2.0, 0.0, width, container.height)
    }
}

/// The centered square used whenever no valid ROI is available.
pub fn default_buffer_roi(buffer_width: u32, buffer_height: u32) -> PixelRect {
    let side = ((buffer_width.min(buffer_height) as f64 / DEFAULT_ROI_DIVISOR).floor() as u32).max(1);
    PixelRect::new(
        (buffer_width - side.min(buffer_width)) / 2,
        (buffer_height - side.min(buffer_height)) / 2,
        side,
        side,
    )
}

/// Outcome of a resolve, with the decisions that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRoi {
    pub rect: PixelRect,
    /// The requested ROI was missing or stale and the default square was used.
    pub used_default: bool,
    /// Erosion would have degenerated the region and was skipped.
    pub erosion_skipped: bool,
}

pub struct RoiResolver;

impl RoiResolver {
    /// Maps a display-space ROI into a non-degenerate, in-bounds buffer rectangle.
    pub fn resolve(
        requested: Option<&Roi>,
        layout: &Layout,
        buffer_width: u32,
        buffer_height: u32,
        settings: &Settings,
    ) -> ResolvedRoi {
        let bounds = PixelRect::new(0, 0, buffer_width.max(1), buffer_height.max(1));
        let display_rect = layout.display_rect();

        let (rect, used_default) = match requested {
            Some(roi) if display_rect.width > 0.0 && display_rect.height > 0.0 && display_rect.contains(roi) => {
                (Self::rescale(roi, &display_rect, bounds.width, bounds.height), false)
            }
            _ => {
                debug!(
                    requested = ?requested,
                    display_rect = ?display_rect,
                    "ROI missing or outside display rect, using default"
                );
                (SignedRect::from(default_buffer_roi(bounds.width, bounds.height)), true)
            }
        };

        let (rect, erosion_skipped) = Self::erode(rect, settings);

        ResolvedRoi {
            rect: rect.clamp_to(&bounds),
            used_default,
            erosion_skipped,
        }
    }

    fn rescale(roi: &Roi, display_rect: &Roi, buffer_width: u32, buffer_height: u32) -> SignedRect {
        let scale_x = buffer_width as f64 / display_rect.width;
        let scale_y = buffer_height as f64 / display_rect.height;

        let left = ((roi.x - display_rect.x) * scale_x).round() as i64;
        let top = ((roi.y - display_rect.y) * scale_y).round() as i64;
        let right = ((roi.right() - display_rect.x) * scale_x).round() as i64;
        let bottom = ((roi.bottom() - display_rect.y) * scale_y).round() as i64;

        SignedRect {
            x: left,
            y: top,
            width: (right - left).max(1),
            height: (bottom - top).max(1),
        }
    }

    fn erode(rect: SignedRect, settings: &Settings) -> (SignedRect, bool) {
        let proportional = (rect.shorter_side() as f64 * settings.margin_percent() / 100.0).floor() as i64;
        let margin = proportional.max(settings.min_margin_px() as i64);
        let eroded = rect.eroded(margin);

        if eroded.shorter_side() < MIN_ERODED_SIDE_PX {
            let degenerate = ProbeError::GeometryDegenerate {
                width: eroded.width.max(0) as u32,
                height: eroded.height.max(0) as u32,
            };
            debug!(margin, error = %degenerate, "skipping ROI erosion");
            (rect, true)
        } else {
            (eroded, false)
        }
    }
}

/// The operator-controlled ROI, edited by input handlers between ticks.
#[derive(Debug, Clone, Default)]
pub struct LiveRoi {
    roi: Option<Roi>,
    geometry_changed: bool,
}

impl LiveRoi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the ROI on first interaction: a centered square a quarter of the shorter
    /// display side. Does nothing if the ROI already exists.
    pub fn ensure_created(&mut self, layout: &Layout) -> Roi {
        if let Some(roi) = self.roi {
            return roi;
        }
        let display_rect = layout.display_rect();
        let side = (display_rect.width.min(display_rect.height) / DEFAULT_ROI_DIVISOR).max(1.0);
        let roi = Roi::new(
            display_rect.x + (display_rect.width - side) / 2.0,
            display_rect.y + (display_rect.height - side) / 2.0,
            side,
            side,
        );
        self.set(roi);
        roi
    }

    pub fn set(&mut self, roi: Roi) {
        self.roi = Some(Roi {
            width: roi.width.max(1.0),
            height: roi.height.max(1.0),
            ..roi
        });
        self.geometry_changed = true;
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        if let Some(roi) = self.roi {
            self.set(Roi { x, y, ..roi });
        }
    }

    pub fn move_by(&mut self, dx: f64, dy: f64) {
        if let Some(roi) = self.roi {
            self.set(Roi {
                x: roi.x + dx,
                y: roi.y + dy,
                ..roi
            });
        }
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        if let Some(roi) = self.roi {
            self.set(Roi {
                width,
                height,
                ..roi
            });
        }
    }

    /// A display-mode change (fullscreen, window resize) invalidates the last resolve.
    pub fn mark_layout_changed(&mut self) {
        self.geometry_changed = true;
    }

    /// Returns and clears the pending geometry-change flag.
    pub fn take_geometry_change(&mut self) -> bool {
        std::mem::take(&mut self.geometry_changed)
    }

    /// An owned copy of the ROI for one tick.
    pub fn snapshot(&self) -> Option<Roi> {
        self.roi
    }
}
