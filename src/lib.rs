// THEORY:
// This file is the main entry point for the `prism_vision` library crate.
// It defines the public API exposed to the surrounding application: the camera
// capture loop, the settings UI, history and export collaborators.
//
// The primary export is `ProbePipeline`, which turns one camera frame per tick into
// at most one `ColorSample`, and the `Scheduler` that drives it on a tokio task.
// The color math, geometry and classifier live in `core_modules`; the most useful
// types are re-exported here so callers rarely need to reach inside.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod scheduler;

pub use config::{RawSettings, Settings, SettingsHandle};
pub use core_modules::classifier::{ClassifierHandle, KnnClassifier, Prediction, TrainingDataPoint};
pub use core_modules::frame::{PixelBuffer, PixelFormat};
pub use core_modules::geometry::{Layout, PixelRect, Roi, Size};
pub use core_modules::training_table::TrainingTable;
pub use error::{ProbeError, Result};
pub use pipeline::{ColorSample, ProbePipeline, TickReport};
pub use scheduler::{CancelFlag, FrameSource, Scheduler, SchedulerStats};
