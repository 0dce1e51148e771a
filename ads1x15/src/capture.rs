//! Interrupt-driven buffered capture.
//!
//! Phase 1 ([`DataReadyTrigger::notify`]) runs in the data-ready signal path: it stamps the time
//! and hands off to the worker thread without blocking or taking the serialization lock. While a
//! handoff is pending further edges are counted as missed, like a one-shot interrupt line.
//!
//! Phase 2 runs on the worker. The first cycle after enable (and the first after any failure or
//! configuration change) goes through full reconciliation; once a sample succeeds the worker reads
//! the conversion register directly until something goes wrong again.
//!
//! ```text
//!  Disabled -> AwaitingFirstSample -> SteadyState
//!                 ^                        |
//!                 +-- failed read / config change
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Utc;
use embedded_hal::delay::DelayNs;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::device::Inner;
use crate::registers::{RegisterDevice, CONV_REG};

/// One captured sample and the time its data-ready edge was seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanSample {
    /// Conversion register contents, not shifted.
    pub raw: i16,
    /// Nanoseconds since the UNIX epoch.
    pub timestamp: i64,
}

impl ScanSample {
    /// Size of one scan record: sample, padding to 8 bytes, timestamp.
    pub const SCAN_BYTES: usize = 16;

    pub fn to_scan_bytes(&self) -> [u8; Self::SCAN_BYTES] {
        let mut scan = [0u8; Self::SCAN_BYTES];
        scan[..2].copy_from_slice(&self.raw.to_ne_bytes());
        scan[8..].copy_from_slice(&self.timestamp.to_ne_bytes());
        scan
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink is full")]
    Full,
    #[error("sink is closed")]
    Closed,
}

/// Receiver of captured samples, in emission order.
pub trait SampleSink: Send {
    fn push(&mut self, sample: ScanSample) -> Result<(), SinkError>;
}

impl SampleSink for mpsc::Sender<ScanSample> {
    fn push(&mut self, sample: ScanSample) -> Result<(), SinkError> {
        self.try_send(sample).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

impl SampleSink for mpsc::UnboundedSender<ScanSample> {
    fn push(&mut self, sample: ScanSample) -> Result<(), SinkError> {
        self.send(sample).map_err(|_| SinkError::Closed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapturePhase {
    Disabled,
    /// Next cycle reconciles the configuration.
    AwaitingFirstSample,
    /// Next cycle reads the conversion register directly.
    SteadyState,
}

#[derive(Debug, Default)]
pub(crate) struct CaptureCounters {
    cycles: AtomicU64,
    fast_reads: AtomicU64,
    full_reads: AtomicU64,
    failures: AtomicU64,
    discarded: AtomicU64,
    missed_edges: AtomicU64,
    sink_errors: AtomicU64,
}

impl CaptureCounters {
    pub(crate) fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            fast_reads: self.fast_reads.load(Ordering::Relaxed),
            full_reads: self.full_reads.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            missed_edges: self.missed_edges.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Capture statistics since the device was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Phase 2 runs, including discarded ones.
    pub cycles: u64,
    pub fast_reads: u64,
    pub full_reads: u64,
    /// Cycles whose read failed.
    pub failures: u64,
    /// Cycles that ran after buffering was disabled.
    pub discarded: u64,
    /// Edges that arrived while a Phase 2 was still pending.
    pub missed_edges: u64,
    pub sink_errors: u64,
}

enum Wake {
    DataReady(i64),
    Stop,
}

/// Current wall-clock time in nanoseconds.
pub fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Phase 1 of the capture pipeline. Cheap to clone; call from the data-ready signal path.
#[derive(Clone)]
pub struct DataReadyTrigger {
    tx: mpsc::UnboundedSender<Wake>,
    pending: Arc<AtomicBool>,
    counters: Arc<CaptureCounters>,
}

impl DataReadyTrigger {
    /// A data-ready edge was observed now.
    pub fn notify(&self) {
        self.notify_at(now_ns());
    }

    /// A data-ready edge was observed at `timestamp` (ns).
    pub fn notify_at(&self, timestamp: i64) {
        if self.pending.swap(true, Ordering::AcqRel) {
            bump(&self.counters.missed_edges);
            return;
        }
        if self.tx.send(Wake::DataReady(timestamp)).is_err() {
            // capture already stopped
            self.pending.store(false, Ordering::Release);
        }
    }
}

/// The Phase 2 thread of a running capture session.
pub(crate) struct CaptureWorker {
    trigger: DataReadyTrigger,
    handle: JoinHandle<()>,
}

impl CaptureWorker {
    pub(crate) fn spawn<R, D>(
        inner: Arc<Inner<R, D>>,
        channel: usize,
        mut sink: Box<dyn SampleSink>,
    ) -> std::io::Result<Self>
    where
        R: RegisterDevice + Send + 'static,
        D: DelayNs + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicBool::new(false));
        let trigger = DataReadyTrigger { tx, pending: pending.clone(), counters: inner.counters.clone() };

        let handle = thread::Builder::new()
            .name("ads1x15-capture".into())
            .spawn(move || {
                while let Some(wake) = rx.blocking_recv() {
                    match wake {
                        Wake::DataReady(timestamp) => {
                            let sample = inner.capture_cycle(channel, timestamp);
                            // bus work is done, the next edge may start another cycle
                            pending.store(false, Ordering::Release);
                            if let Some(sample) = sample {
                                inner.emit(sink.as_mut(), sample);
                            }
                        }
                        Wake::Stop => break,
                    }
                }
            })?;
        Ok(Self { trigger, handle })
    }

    pub(crate) fn trigger(&self) -> DataReadyTrigger {
        self.trigger.clone()
    }

    /// Finish the cycle in flight and join the thread.
    pub(crate) fn stop(self) {
        if self.trigger.tx.send(Wake::Stop).is_err() {
            debug!("capture worker already exited");
        }
        if self.handle.join().is_err() {
            error!("capture worker panicked");
        }
    }
}

impl<R, D> Inner<R, D>
where
    R: RegisterDevice,
    D: DelayNs,
{
    /// Phase 2: read one sample for `channel`, stamped with the edge time.
    pub(crate) fn capture_cycle(&self, channel: usize, timestamp: i64) -> Option<ScanSample> {
        bump(&self.counters.cycles);

        if !self.buffer_enabled.load(Ordering::Acquire) {
            debug!("buffer not enabled");
            self.state.lock().use_buffer = false;
            bump(&self.counters.discarded);
            return None;
        }

        let mut state = self.state.lock();
        let result = if state.use_buffer {
            bump(&self.counters.fast_reads);
            trace!("fast conversion");
            self.regs.read(CONV_REG).map_err(crate::error::Error::Bus)
        } else {
            bump(&self.counters.full_reads);
            debug!(channel, "config conversion");
            state.acquire(&self.regs, &self.validity, channel)
        };
        match result {
            Ok(raw) => {
                state.use_buffer = true;
                Some(ScanSample { raw: raw as i16, timestamp })
            }
            Err(e) => {
                debug!("capture cycle failed: {e}");
                state.use_buffer = false;
                bump(&self.counters.failures);
                None
            }
        }
    }

    pub(crate) fn emit(&self, sink: &mut dyn SampleSink, sample: ScanSample) {
        if let Err(e) = sink.push(sample) {
            warn!("dropped sample: {e}");
            bump(&self.counters.sink_errors);
        }
    }
}
