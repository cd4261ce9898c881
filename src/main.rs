// This file is an example of how to use the `prism_vision` library: it probes a
// still image as if it were a camera feed and prints every sample as JSON.
//
// Usage: prism_vision <image> [training.csv]
//
// Environment:
//   PRISM_SETTINGS  path to a JSON settings file (defaults otherwise)
//   PRISM_RUN_MS    how long to run the tick loop, in milliseconds (default 1500)
//   RUST_LOG        tracing filter, e.g. `prism_vision=debug`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use prism_vision::scheduler::share;
use prism_vision::{
    FrameSource, KnnClassifier, PixelBuffer, ProbePipeline, Scheduler, Settings, SettingsHandle, TrainingTable,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_RUN_MS: u64 = 1500;

/// Serves the same frame on every tick.
struct StillImage {
    frame: PixelBuffer,
}

impl FrameSource for StillImage {
    fn latest_frame(&mut self) -> Option<PixelBuffer> {
        Some(self.frame.clone())
    }
}

fn load_settings() -> anyhow::Result<Settings> {
    match std::env::var_os("PRISM_SETTINGS") {
        Some(path) => {
            let path = PathBuf::from(path);
            Settings::from_json_file(&path).with_context(|| format!("loading settings from {}", path.display()))
        }
        None => Ok(Settings::default()),
    }
}

fn train(classifier: &KnnClassifier, path: &Path) -> anyhow::Result<()> {
    let table = TrainingTable::from_path(path).with_context(|| format!("reading training table {}", path.display()))?;
    if !table.skipped.is_empty() {
        warn!(skipped = table.skipped.len(), "some training rows were skipped");
    }
    let points = table.into_points();
    classifier.train(&points)?;
    let evaluation = classifier.evaluate(&points)?;
    info!(
        correct = evaluation.correct,
        total = evaluation.total,
        accuracy = evaluation.accuracy,
        "training accuracy"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args_os().skip(1);
    let Some(image_path) = args.next().map(PathBuf::from) else {
        bail!("usage: prism_vision <image> [training.csv]");
    };
    let training_path = args.next().map(PathBuf::from);

    let settings = load_settings()?;
    let frame = PixelBuffer::open(&image_path).with_context(|| format!("opening {}", image_path.display()))?;
    info!(width = frame.width(), height = frame.height(), "frame loaded");

    let classifier = Arc::new(KnnClassifier::new(settings.k()));
    if let Some(path) = training_path {
        train(&classifier, &path)?;
    }

    let pipeline = share(ProbePipeline::new(SettingsHandle::new(settings), classifier));
    let scheduler = Scheduler::new(pipeline);
    let cancel = scheduler.cancel_flag();
    let (tx, mut rx) = mpsc::channel(8);
    let handle = scheduler.spawn(StillImage { frame }, tx);

    let run_ms = std::env::var("PRISM_RUN_MS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_RUN_MS);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(run_ms)).await;
        cancel.cancel();
    });

    while let Some(sample) = rx.recv().await {
        println!("{}", serde_json::to_string(&sample)?);
    }

    let stats = handle.await.context("scheduler task failed")?;
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}
