// THEORY:
// The `scheduler` drives a `ProbePipeline` from a tokio task. It replaces a
// self-re-arming callback with an explicit loop that owns its own cadence and stops
// on an explicit cancellation flag.
//
// Key architectural principles:
// 1.  **One tick at a time**: each iteration pulls the most recent frame from the
//     `FrameSource`, runs one synchronous pipeline pass and only then waits for the
//     next deadline. Two ticks never overlap.
// 2.  **Drop, never queue**: the interval uses `MissedTickBehavior::Delay`. A tick that
//     overruns pushes the next one back instead of bursting to catch up, and the
//     source is asked for its latest frame, so stale frames are simply never seen.
// 3.  **Reduced cadence while frozen**: a frozen pipeline is not ticked. The loop
//     sleeps for `frozen_poll_interval` and re-checks, staying responsive to unfreeze
//     and cancellation without burning a full tick's work.
// 4.  **Cooperative cancellation**: `CancelFlag` is checked at every wait point and
//     wakes the loop immediately through a `Notify`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::core_modules::frame::PixelBuffer;
use crate::core_modules::geometry::Layout;
use crate::pipeline::{ColorSample, ProbePipeline, TickReport};

/// The capture collaborator. Returns the most recent frame, if any is available.
pub trait FrameSource: Send {
    fn latest_frame(&mut self) -> Option<PixelBuffer>;

    /// Current on-screen layout. `None` means the frame is shown 1:1.
    fn layout(&self) -> Option<Layout> {
        None
    }
}

/// A pipeline shared between the scheduler and input handlers.
pub type SharedPipeline = Arc<Mutex<ProbePipeline>>;

pub fn share(pipeline: ProbePipeline) -> SharedPipeline {
    Arc::new(Mutex::new(pipeline))
}

fn lock(pipeline: &SharedPipeline) -> MutexGuard<'_, ProbePipeline> {
    match pipeline.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Pipeline passes actually run.
    pub ticks: u64,
    pub samples: u64,
    pub skipped: u64,
    pub no_sample: u64,
    pub frozen_polls: u64,
    /// Deadlines at which the source had no frame.
    pub missing_frames: u64,
}

pub struct Scheduler {
    pipeline: SharedPipeline,
    cancel: CancelFlag,
}

impl Scheduler {
    pub fn new(pipeline: SharedPipeline) -> Self {
        Self {
            pipeline,
            cancel: CancelFlag::new(),
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Runs the loop on its own task.
    pub fn spawn<S>(self, source: S, sink: mpsc::Sender<ColorSample>) -> JoinHandle<SchedulerStats>
    where
        S: FrameSource + 'static,
    {
        tokio::spawn(async move { self.run(source, sink).await })
    }

    /// Ticks until cancelled or until the sink is closed.
    pub async fn run<S: FrameSource>(&self, mut source: S, sink: mpsc::Sender<ColorSample>) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        let mut period = lock(&self.pipeline).settings().snapshot().tick_interval();
        let mut interval = new_interval(period);
        info!(?period, "scheduler started");

        while !self.cancel.is_cancelled() {
            let (frozen, settings) = {
                let pipeline = lock(&self.pipeline);
                (pipeline.is_frozen(), pipeline.settings().snapshot())
            };

            if frozen {
                stats.frozen_polls += 1;
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = time::sleep(settings.frozen_poll_interval()) => continue,
                }
            }

            if settings.tick_interval() != period {
                period = settings.tick_interval();
                interval = new_interval(period);
                debug!(?period, "tick interval changed");
            }

            let deadline = tokio::select! {
                _ = self.cancel.cancelled() => break,
                deadline = interval.tick() => deadline.into_std(),
            };

            let Some(frame) = source.latest_frame() else {
                stats.missing_frames += 1;
                continue;
            };
            let layout = source
                .layout()
                .unwrap_or_else(|| Layout::native(frame.width(), frame.height()));

            let report = lock(&self.pipeline).tick(&frame, &layout, deadline);
            stats.ticks += 1;
            match report {
                TickReport::Sampled(sample) => {
                    stats.samples += 1;
                    if sink.send(sample).await.is_err() {
                        debug!("sample sink closed");
                        break;
                    }
                }
                TickReport::Skipped(_) => stats.skipped += 1,
                TickReport::NoSample => stats.no_sample += 1,
                TickReport::Frozen => stats.frozen_polls += 1,
            }
        }

        info!(ticks = stats.ticks, samples = stats.samples, "scheduler stopped");
        stats
    }
}

fn new_interval(period: Duration) -> Interval {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RawSettings, Settings};
    use crate::core_modules::pixel::pixel::Pixel;

    /// Alternates between two colors so every evaluated tick sees a change.
    struct Flicker {
        frames: [PixelBuffer; 2],
        next: usize,
    }

    impl Flicker {
        fn new() -> Self {
            Self {
                frames: [
                    PixelBuffer::filled(32, 32, Pixel::rgb(220, 60, 30)).unwrap(),
                    PixelBuffer::filled(32, 32, Pixel::rgb(30, 60, 220)).unwrap(),
                ],
                next: 0,
            }
        }
    }

    impl FrameSource for Flicker {
        fn latest_frame(&mut self) -> Option<PixelBuffer> {
            self.next += 1;
            Some(self.frames[self.next % 2].clone())
        }
    }

    struct NoCamera;

    impl FrameSource for NoCamera {
        fn latest_frame(&mut self) -> Option<PixelBuffer> {
            None
        }
    }

    fn fast_pipeline() -> SharedPipeline {
        share(ProbePipeline::with_settings(Settings::from_raw(&RawSettings {
            tick_interval_ms: Some(5),
            frozen_poll_interval_ms: Some(2),
            ..Default::default()
        })))
    }

    #[tokio::test]
    async fn emits_samples_until_cancelled() {
        let scheduler = Scheduler::new(fast_pipeline());
        let cancel = scheduler.cancel_flag();
        let (tx, mut rx) = mpsc::channel(16);
        let handle = scheduler.spawn(Flicker::new(), tx);

        for _ in 0..3 {
            let sample = rx.recv().await.unwrap();
            assert!(sample.hex == "#dc3c1e" || sample.hex == "#1e3cdc");
        }
        cancel.cancel();
        let stats = handle.await.unwrap();
        assert!(stats.samples >= 3);
        assert!(stats.ticks >= stats.samples);
    }

    #[tokio::test]
    async fn stops_when_sink_is_dropped() {
        let scheduler = Scheduler::new(fast_pipeline());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let stats = scheduler.run(Flicker::new(), tx).await;
        assert_eq!(stats.samples, 1);
    }

    #[tokio::test]
    async fn frozen_pipeline_only_polls() {
        let pipeline = fast_pipeline();
        lock(&pipeline).freeze();
        let scheduler = Scheduler::new(Arc::clone(&pipeline));
        let cancel = scheduler.cancel_flag();
        let (tx, _rx) = mpsc::channel(4);
        let handle = scheduler.spawn(Flicker::new(), tx);

        time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.ticks, 0);
        assert!(stats.frozen_polls > 0);
    }

    #[tokio::test]
    async fn missing_frames_are_counted_not_fatal() {
        let scheduler = Scheduler::new(fast_pipeline());
        let cancel = scheduler.cancel_flag();
        let (tx, _rx) = mpsc::channel(4);
        let handle = scheduler.spawn(NoCamera, tx);

        time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.ticks, 0);
        assert!(stats.missing_frames > 0);
    }

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let flag = CancelFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };
        flag.cancel();
        waiter.await.unwrap();
        assert!(flag.is_cancelled());
    }
}
