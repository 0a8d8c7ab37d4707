//! Capture session: one worker thread, at most one frame in flight.
//!
//! Frames are handed to the worker through a single-slot channel guarded by a
//! `busy` flag. `submit` never blocks: while a frame is being processed any
//! new frame is dropped, not queued.
//!
//! A panic in the pipeline or the sink costs only the frame that caused it:
//! `busy` is released on every exit path and the worker keeps serving frames.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::frame::Frame;
use crate::pipeline::{FrameProcessor, PipelineOutcome};

/// Outcome sink, called on the worker thread once per processed frame.
pub type OutcomeSink = Box<dyn FnMut(PipelineOutcome) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Handed to the idle worker.
    Accepted,
    /// A frame was already in flight; this one was discarded.
    Dropped,
    /// The worker has stopped.
    Closed,
}

/// Session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionStats {
    pub accepted: u64,
    pub dropped: u64,
    pub completed: u64,
    /// Frames whose processing or sink call panicked.
    pub panicked: u64,
    /// Highest number of frames observed inside the pipeline at once.
    pub max_in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    busy: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    accepted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            max_in_flight: self.max_in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Owns the processing worker for one camera session.
pub struct CaptureSession {
    tx: Option<SyncSender<Frame>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl CaptureSession {
    /// Spawn the worker. `sink` receives every outcome on the worker thread.
    pub fn start<F>(processor: FrameProcessor, sink: F) -> std::io::Result<Self>
    where
        F: FnMut(PipelineOutcome) + Send + 'static,
    {
        let (tx, rx) = sync_channel::<Frame>(1);
        let counters = Arc::new(Counters::default());
        let worker = std::thread::Builder::new()
            .name("rdtscan-worker".to_string())
            .spawn({
                let counters = Arc::clone(&counters);
                let sink: OutcomeSink = Box::new(sink);
                move || worker_loop(processor, rx, sink, counters)
            })?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            counters,
        })
    }

    /// Offer a frame to the worker without blocking.
    pub fn submit(&self, frame: Frame) -> SubmitStatus {
        let Some(tx) = self.tx.as_ref() else {
            return SubmitStatus::Closed;
        };
        if self.worker.as_ref().map_or(true, |w| w.is_finished()) {
            tracing::warn!("frame submitted after the worker stopped");
            return SubmitStatus::Closed;
        }
        if self
            .counters
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(ts = ?frame.timestamp, "frame dropped: pipeline busy");
            return SubmitStatus::Dropped;
        }
        match tx.try_send(frame) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                SubmitStatus::Accepted
            }
            Err(TrySendError::Full(_)) => {
                // The slot is only refilled after the worker releases `busy`.
                self.counters.busy.store(false, Ordering::Release);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                SubmitStatus::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.busy.store(false, Ordering::Release);
                tracing::warn!("frame submitted after the worker stopped");
                SubmitStatus::Closed
            }
        }
    }

    /// `true` while a frame is in flight.
    pub fn is_busy(&self) -> bool {
        self.counters.busy.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Stop accepting frames, let the in-flight frame finish, and join the worker.
    pub fn shutdown(mut self) -> SessionStats {
        self.stop();
        self.counters.snapshot()
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("capture worker panicked");
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Marks one frame as in flight; releases `busy` when dropped, including
/// during unwinding.
struct InFlight<'a> {
    counters: &'a Counters,
}

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::AcqRel);
        Self { counters }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.counters.busy.store(false, Ordering::Release);
    }
}

fn worker_loop(
    mut processor: FrameProcessor,
    rx: Receiver<Frame>,
    mut sink: OutcomeSink,
    counters: Arc<Counters>,
) {
    tracing::debug!("capture worker started");
    for frame in rx {
        let _in_flight = InFlight::enter(&counters);
        let ts = frame.timestamp;
        let result = catch_unwind(AssertUnwindSafe(|| {
            let outcome = processor.process(&frame);
            drop(frame);
            sink(outcome);
        }));
        match result {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(ts = ?ts, "frame processing panicked; frame discarded");
            }
        }
    }
    tracing::debug!("capture worker stopped");
}
