//! This module contains all the capture logic

// The capture loop owns the device for the whole session. Every iteration
// reads one chunk worth of samples, persists it, prunes the chunk set and
// then sleeps off whatever is left of the chunk period. There is no catch-up:
// a slow chunk just means the next one starts late. Cancellation is only
// looked at between iterations so a chunk pair is never left half written.

use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info};

use crate::{
    chunk::ChunkMeta,
    complex::encode_complex64,
    device::{DeviceConfig, SampleSource, MAX_SAMPLES_PER_READ},
    error::{Result, RewindError},
    retention,
    store::ChunkStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    /// Configuring the device
    Initializing,
    Running,
    /// Stop observed, finishing the current iteration
    Stopping,
    /// Device released. Terminal.
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureConfig {
    pub device: DeviceConfig,
    /// Nominal length of every chunk
    pub chunk_duration_s: f64,
    /// How much history to keep on disk
    pub retention_s: f64,
}

impl CaptureConfig {
    pub fn new(device: DeviceConfig, chunk_duration_s: f64, retention_s: f64) -> Result<Self> {
        if !(chunk_duration_s.is_finite() && chunk_duration_s > 0.0) {
            return Err(RewindError::InvalidArgument(format!(
                "chunk duration must be positive, got {chunk_duration_s}"
            )));
        }
        if !(retention_s.is_finite() && retention_s > 0.0) {
            return Err(RewindError::InvalidArgument(format!(
                "buffer length must be positive, got {retention_s}"
            )));
        }
        let samples = device.samp_rate_hz as f64 * chunk_duration_s;
        if samples < 1.0 {
            return Err(RewindError::InvalidArgument(
                "chunk duration is shorter than one sample".to_owned(),
            ));
        }
        if samples > MAX_SAMPLES_PER_READ as f64 {
            return Err(RewindError::InvalidArgument(format!(
                "chunk of {chunk_duration_s}s holds more than {MAX_SAMPLES_PER_READ} samples"
            )));
        }
        Ok(Self {
            device,
            chunk_duration_s,
            retention_s,
        })
    }

    pub fn samples_per_chunk(&self) -> usize {
        (self.device.samp_rate_hz as f64 * self.chunk_duration_s) as usize
    }
}

/// Cooperative stop signal, consumed by the capture loop
#[derive(Debug)]
pub struct Shutdown {
    rx: Receiver<()>,
    requested: bool,
}

/// Requests a stop. Cheap to clone, safe to call from a signal handler thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        // A full channel means a stop is already pending
        let _ = self.tx.try_send(());
    }
}

impl Shutdown {
    pub fn new() -> (Self, StopHandle) {
        let (tx, rx) = bounded(1);
        (
            Self {
                rx,
                requested: false,
            },
            StopHandle { tx },
        )
    }

    pub fn is_requested(&mut self) -> bool {
        if !self.requested && matches!(self.rx.try_recv(), Ok(())) {
            self.requested = true;
        }
        self.requested
    }

    /// Sleep for `timeout`, waking early if a stop arrives.
    /// Returns whether a stop has been requested.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if self.requested {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(()) => self.requested = true,
            Err(RecvTimeoutError::Timeout) => {}
            // Nobody left to ask us to stop
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(timeout),
        }
        self.requested
    }
}

/// Releases the device exactly once, on every exit path
struct DeviceGuard<D: SampleSource> {
    device: D,
    released: bool,
}

impl<D: SampleSource> DeviceGuard<D> {
    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.device.release()
    }
}

impl<D: SampleSource> Drop for DeviceGuard<D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("failed to release capture device: {e}");
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReport {
    pub chunks_written: u64,
    pub chunks_pruned: u64,
}

/// A capture session: one device, one chunk set
pub struct CaptureLoop<D: SampleSource, S: ChunkStore> {
    config: CaptureConfig,
    device: DeviceGuard<D>,
    store: S,
    state: CaptureState,
}

impl<D: SampleSource, S: ChunkStore> CaptureLoop<D, S> {
    /// Configure the device. Failure here ends the session before any chunk
    /// is written, and the device is still released.
    pub fn start(config: CaptureConfig, device: D, store: S) -> Result<Self> {
        let mut device = DeviceGuard {
            device,
            released: false,
        };
        debug!(state = ?CaptureState::Initializing, "configuring device");
        device.device.configure(&config.device)?;
        info!(
            "Starting capture @ {:.3} MHz, {:.2} MS/s, chunk={}s, buffer={}s",
            config.device.center_freq_hz as f64 / 1e6,
            config.device.samp_rate_hz as f64 / 1e6,
            config.chunk_duration_s,
            config.retention_s
        );
        Ok(Self {
            config,
            device,
            store,
            state: CaptureState::Running,
        })
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Capture until `shutdown` fires or something fails, then release the
    /// device. The session can't be run again afterwards.
    pub fn run(&mut self, shutdown: &mut Shutdown) -> Result<CaptureReport> {
        if self.state == CaptureState::Closed {
            return Err(RewindError::InvalidArgument(
                "capture session already closed".to_owned(),
            ));
        }
        let mut report = CaptureReport::default();
        let result = self.run_chunks(shutdown, &mut report);
        if let Err(e) = &result {
            error!("capture failed: {e}");
        }
        let released = self.device.release();
        self.state = CaptureState::Closed;
        info!(
            written = report.chunks_written,
            pruned = report.chunks_pruned,
            "capture closed"
        );
        result?;
        released?;
        Ok(report)
    }

    fn run_chunks(&mut self, shutdown: &mut Shutdown, report: &mut CaptureReport) -> Result<()> {
        let samples_per_chunk = self.config.samples_per_chunk();
        let period = Duration::from_secs_f64(self.config.chunk_duration_s);
        while !shutdown.is_requested() {
            let t0 = Utc::now();
            let started = Instant::now();
            // Blocks for roughly one chunk period
            let samples = self.device.device.read_samples(samples_per_chunk)?;

            let meta = ChunkMeta::new(
                t0,
                self.config.device.center_freq_hz,
                self.config.device.samp_rate_hz,
                self.config.chunk_duration_s,
            );
            let id = self.store.write(&meta, &encode_complex64(&samples))?;
            report.chunks_written += 1;
            debug!(%id, samples = samples.len(), "chunk written");

            let pruned = retention::enforce(&mut self.store, self.config.retention_s)?;
            report.chunks_pruned += pruned.removed.len() as u64;

            if let Some(left) = period.checked_sub(started.elapsed()) {
                shutdown.wait(left);
            }
        }
        self.state = CaptureState::Stopping;
        info!(state = ?self.state, "stop requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        complex::Complex32,
        device::Gain,
        store::MemoryStore,
    };
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Default)]
    struct Counters {
        configured: AtomicUsize,
        reads: AtomicUsize,
        released: AtomicUsize,
    }

    struct FakeDevice {
        counters: Arc<Counters>,
        fail_configure: bool,
        fail_read: Option<usize>,
        stop_after: Option<(usize, StopHandle)>,
    }

    impl FakeDevice {
        fn new(counters: &Arc<Counters>) -> Self {
            Self {
                counters: Arc::clone(counters),
                fail_configure: false,
                fail_read: None,
                stop_after: None,
            }
        }
    }

    impl SampleSource for FakeDevice {
        fn configure(&mut self, _config: &DeviceConfig) -> Result<()> {
            self.counters.configured.fetch_add(1, Ordering::SeqCst);
            if self.fail_configure {
                return Err(RewindError::DeviceConfig("tuner refused".into()));
            }
            Ok(())
        }

        fn read_samples(&mut self, n: usize) -> Result<Vec<Complex32>> {
            let read = self.counters.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_read == Some(read) {
                return Err(RewindError::DeviceRead("usb hiccup".into()));
            }
            if let Some((after, handle)) = &self.stop_after {
                if read == *after {
                    handle.stop();
                }
            }
            Ok(vec![Complex32::new(read as f32, 0.0); n])
        }

        fn release(&mut self) -> Result<()> {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(retention_s: f64) -> CaptureConfig {
        let device = DeviceConfig::new(100e6, 200.0, Gain::Auto).unwrap();
        CaptureConfig::new(device, 0.02, retention_s).unwrap()
    }

    #[test]
    fn test_stop_finishes_current_chunk() {
        let counters = Arc::new(Counters::default());
        let (mut shutdown, handle) = Shutdown::new();
        let mut device = FakeDevice::new(&counters);
        device.stop_after = Some((3, handle));

        let mut session = CaptureLoop::start(config(10.0), device, MemoryStore::new()).unwrap();
        assert_eq!(session.state(), CaptureState::Running);
        let report = session.run(&mut shutdown).unwrap();

        assert_eq!(report.chunks_written, 3);
        assert_eq!(session.store().len(), 3);
        assert_eq!(session.state(), CaptureState::Closed);
        assert_eq!(counters.reads.load(Ordering::SeqCst), 3);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);

        drop(session);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chunks_carry_nominal_metadata() {
        let counters = Arc::new(Counters::default());
        let (mut shutdown, handle) = Shutdown::new();
        let mut device = FakeDevice::new(&counters);
        device.stop_after = Some((2, handle));

        let mut session = CaptureLoop::start(config(10.0), device, MemoryStore::new()).unwrap();
        session.run(&mut shutdown).unwrap();

        let chunks = session.store().chunks().unwrap();
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert_eq!(chunk.meta.duration_s, 0.02);
            assert_eq!(chunk.meta.center_freq_hz, 100_000_000);
            assert_eq!(chunk.meta.samp_rate_hz, 200);
            // 200 Hz * 0.02 s = 4 samples of 8 bytes
            assert_eq!(session.store().data_len(chunk.id).unwrap(), 32);
        }
        assert!(chunks[0].meta.start() < chunks[1].meta.start());
    }

    #[test]
    fn test_prunes_after_every_chunk() {
        let counters = Arc::new(Counters::default());
        let (mut shutdown, handle) = Shutdown::new();
        let mut device = FakeDevice::new(&counters);
        device.stop_after = Some((8, handle));

        // Three chunks of 0.02 s cover 0.05 s
        let mut session = CaptureLoop::start(config(0.05), device, MemoryStore::new()).unwrap();
        let report = session.run(&mut shutdown).unwrap();
        assert_eq!(report.chunks_written, 8);
        assert_eq!(report.chunks_pruned, 5);
        assert_eq!(session.store().len(), 3);
    }

    #[test]
    fn test_configure_failure_is_fatal() {
        let counters = Arc::new(Counters::default());
        let mut device = FakeDevice::new(&counters);
        device.fail_configure = true;

        let err = CaptureLoop::start(config(10.0), device, MemoryStore::new())
            .err()
            .unwrap();
        assert!(matches!(err, RewindError::DeviceConfig(_)));
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_failure_ends_session_and_releases() {
        let counters = Arc::new(Counters::default());
        let (mut shutdown, _handle) = Shutdown::new();
        let mut device = FakeDevice::new(&counters);
        device.fail_read = Some(2);

        let mut session = CaptureLoop::start(config(10.0), device, MemoryStore::new()).unwrap();
        let err = session.run(&mut shutdown).unwrap_err();
        assert!(matches!(err, RewindError::DeviceRead(_)));
        assert_eq!(session.store().len(), 1);
        assert_eq!(session.state(), CaptureState::Closed);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
        assert!(session.run(&mut shutdown).is_err());
    }

    #[test]
    fn test_stop_before_first_read() {
        let counters = Arc::new(Counters::default());
        let (mut shutdown, handle) = Shutdown::new();
        handle.stop();
        handle.stop();

        let device = FakeDevice::new(&counters);
        let mut session = CaptureLoop::start(config(10.0), device, MemoryStore::new()).unwrap();
        let report = session.run(&mut shutdown).unwrap();
        assert_eq!(report.chunks_written, 0);
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_wakes_on_stop() {
        let (mut shutdown, handle) = Shutdown::new();
        assert!(!shutdown.wait(Duration::from_millis(1)));
        std::thread::spawn(move || handle.stop());
        let started = Instant::now();
        assert!(shutdown.wait(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_config_rejects_degenerate_chunks() {
        let device = DeviceConfig::new(100e6, 200.0, Gain::Auto).unwrap();
        assert!(CaptureConfig::new(device, 0.0, 10.0).is_err());
        assert!(CaptureConfig::new(device, 0.001, 10.0).is_err());
        assert!(CaptureConfig::new(device, 1.0, -1.0).is_err());
        assert!(CaptureConfig::new(device, 1e12, 10.0).is_err());
        assert!(CaptureConfig::new(device, 1e300, 10.0).is_err());
        assert_eq!(CaptureConfig::new(device, 1.5, 10.0).unwrap().samples_per_chunk(), 300);
    }
}
