//! Capture device capability.
//!
//! The capture loop only needs three things from a radio: configure it, read
//! a block of samples (blocking), and release it. [`RtlSdrDevice`] drives a
//! real RTL2832U dongle through the `rtl_sdr` tool, [`SimulatedDevice`]
//! synthesizes a tone in software.

use std::{
    f32::consts::TAU,
    io::{self, Read},
    path::PathBuf,
    process::{Child, ChildStdout, Command, Stdio},
    str::FromStr,
    time::Duration,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::{
    complex::{unpack_cu8, Complex32},
    error::{Result, RewindError},
};

/// Largest single read a source will serve, 2 GiB of `complex64`
pub const MAX_SAMPLES_PER_READ: usize = 1 << 28;

fn check_read_len(n: usize) -> Result<()> {
    if n > MAX_SAMPLES_PER_READ {
        return Err(RewindError::DeviceRead(format!(
            "too many samples requested: {n} > {MAX_SAMPLES_PER_READ}"
        )));
    }
    Ok(())
}

/// Tuner gain
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gain {
    Auto,
    /// Gain in dB
    Manual(f64),
}

impl Gain {
    /// `auto` or a number of dB. Anything unparsable falls back to automatic
    /// gain instead of failing.
    pub fn parse_lenient(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("auto") {
            return Self::Auto;
        }
        match raw.parse::<f64>() {
            Ok(db) if db.is_finite() => Self::Manual(db),
            _ => {
                warn!(gain = raw, "unparsable gain, using auto");
                Self::Auto
            }
        }
    }
}

/// Parameters a device is configured with before the first read
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceConfig {
    pub center_freq_hz: u64,
    pub samp_rate_hz: u64,
    pub gain: Gain,
}

impl DeviceConfig {
    pub fn new(center_freq_hz: f64, samp_rate_hz: f64, gain: Gain) -> Result<Self> {
        if !(center_freq_hz.is_finite() && center_freq_hz > 0.0) {
            return Err(RewindError::InvalidArgument(format!(
                "center frequency must be positive, got {center_freq_hz}"
            )));
        }
        if !(samp_rate_hz.is_finite() && samp_rate_hz >= 1.0) {
            return Err(RewindError::InvalidArgument(format!(
                "sample rate must be positive, got {samp_rate_hz}"
            )));
        }
        Ok(Self {
            center_freq_hz: center_freq_hz as u64,
            samp_rate_hz: samp_rate_hz as u64,
            gain,
        })
    }
}

pub trait SampleSource {
    /// Apply capture parameters. Must be called before the first read.
    fn configure(&mut self, config: &DeviceConfig) -> Result<()>;

    /// Block until exactly `n` samples are available and return them
    fn read_samples(&mut self, n: usize) -> Result<Vec<Complex32>>;

    /// Give the hardware back. Called once at the end of a session.
    fn release(&mut self) -> Result<()>;
}

impl<D: SampleSource + ?Sized> SampleSource for Box<D> {
    fn configure(&mut self, config: &DeviceConfig) -> Result<()> {
        (**self).configure(config)
    }

    fn read_samples(&mut self, n: usize) -> Result<Vec<Complex32>> {
        (**self).read_samples(n)
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }
}

/// Supported device kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Driver {
    RtlSdr,
    Simulated,
}

impl FromStr for Driver {
    type Err = RewindError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rtlsdr" => Ok(Self::RtlSdr),
            "sim" => Ok(Self::Simulated),
            other => Err(RewindError::UnsupportedDriver(other.to_owned())),
        }
    }
}

impl Driver {
    /// Construct an unconfigured device of this kind
    pub fn open(self) -> Box<dyn SampleSource + Send> {
        match self {
            Self::RtlSdr => Box::new(RtlSdrDevice::new()),
            Self::Simulated => Box::new(SimulatedDevice::new()),
        }
    }
}

/// An RTL2832U dongle, read through the `rtl_sdr` command line tool writing
/// unsigned 8-bit IQ to stdout
#[derive(Debug)]
pub struct RtlSdrDevice {
    program: PathBuf,
    device_index: u32,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    raw: Vec<u8>,
}

impl Default for RtlSdrDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RtlSdrDevice {
    pub fn new() -> Self {
        Self::with_program("rtl_sdr", 0)
    }

    pub fn with_program(program: impl Into<PathBuf>, device_index: u32) -> Self {
        Self {
            program: program.into(),
            device_index,
            child: None,
            stdout: None,
            raw: Vec::new(),
        }
    }

    fn command(&self, config: &DeviceConfig) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-d")
            .arg(self.device_index.to_string())
            .arg("-f")
            .arg(config.center_freq_hz.to_string())
            .arg("-s")
            .arg(config.samp_rate_hz.to_string());
        // rtl_sdr picks automatic gain when -g is absent
        if let Gain::Manual(db) = config.gain {
            cmd.arg("-g").arg(db.to_string());
        }
        cmd.arg("-").stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());
        cmd
    }
}

impl SampleSource for RtlSdrDevice {
    fn configure(&mut self, config: &DeviceConfig) -> Result<()> {
        let mut child = self.command(config).spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RewindError::DeviceUnavailable(format!(
                "{} not found, install rtl-sdr",
                self.program.display()
            )),
            _ => RewindError::DeviceConfig(e.to_string()),
        })?;
        self.stdout = child.stdout.take();
        self.child = Some(child);
        info!(
            program = %self.program.display(),
            index = self.device_index,
            "rtl_sdr started"
        );
        Ok(())
    }

    fn read_samples(&mut self, n: usize) -> Result<Vec<Complex32>> {
        check_read_len(n)?;
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| RewindError::DeviceRead("device not configured".to_owned()))?;
        self.raw.resize(2 * n, 0);
        stdout
            .read_exact(&mut self.raw)
            .map_err(|e| RewindError::DeviceRead(e.to_string()))?;
        let mut samples = Vec::with_capacity(n);
        unpack_cu8(&self.raw, &mut samples);
        Ok(samples)
    }

    fn release(&mut self) -> Result<()> {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            // Already exited is fine
            if let Err(e) = child.kill() {
                debug!("rtl_sdr kill: {e}");
            }
            child.wait()?;
            info!("rtl_sdr stopped");
        }
        Ok(())
    }
}

/// Software source producing a complex tone plus uniform noise.
///
/// With `realtime` set, reads take as long as the real device would.
#[derive(Debug)]
pub struct SimulatedDevice {
    pub tone_offset_hz: f32,
    pub noise: f32,
    pub realtime: bool,
    samp_rate_hz: Option<u64>,
    phase: f32,
    rng: StdRng,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            tone_offset_hz: 10_000.0,
            noise: 0.05,
            realtime: true,
            samp_rate_hz: None,
            phase: 0.0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic noise, no pacing
    pub fn seeded(seed: u64) -> Self {
        Self {
            realtime: false,
            rng: StdRng::seed_from_u64(seed),
            ..Self::new()
        }
    }
}

impl SampleSource for SimulatedDevice {
    fn configure(&mut self, config: &DeviceConfig) -> Result<()> {
        self.samp_rate_hz = Some(config.samp_rate_hz);
        debug!(?config, "simulated device configured");
        Ok(())
    }

    fn read_samples(&mut self, n: usize) -> Result<Vec<Complex32>> {
        check_read_len(n)?;
        let rate = self
            .samp_rate_hz
            .ok_or_else(|| RewindError::DeviceRead("device not configured".to_owned()))?;
        if self.realtime {
            std::thread::sleep(Duration::from_secs_f64(n as f64 / rate as f64));
        }
        let step = TAU * self.tone_offset_hz / rate as f32;
        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            let re = self.phase.cos() + self.noise * (self.rng.gen::<f32>() * 2.0 - 1.0);
            let im = self.phase.sin() + self.noise * (self.rng.gen::<f32>() * 2.0 - 1.0);
            samples.push(Complex32::new(re, im));
            self.phase = (self.phase + step) % TAU;
        }
        Ok(samples)
    }

    fn release(&mut self) -> Result<()> {
        self.samp_rate_hz = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_lenient() {
        assert_eq!(Gain::parse_lenient("auto"), Gain::Auto);
        assert_eq!(Gain::parse_lenient("AUTO"), Gain::Auto);
        assert_eq!(Gain::parse_lenient("29.7"), Gain::Manual(29.7));
        assert_eq!(Gain::parse_lenient("loud"), Gain::Auto);
        assert_eq!(Gain::parse_lenient("NaN"), Gain::Auto);
    }

    #[test]
    fn test_driver_selection() {
        assert_eq!("rtlsdr".parse::<Driver>().unwrap(), Driver::RtlSdr);
        assert_eq!("sim".parse::<Driver>().unwrap(), Driver::Simulated);
        let err = "hackrf".parse::<Driver>().unwrap_err();
        assert!(matches!(err, RewindError::UnsupportedDriver(ref d) if d == "hackrf"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(DeviceConfig::new(100e6, 2.4e6, Gain::Auto).is_ok());
        assert!(DeviceConfig::new(0.0, 2.4e6, Gain::Auto).is_err());
        assert!(DeviceConfig::new(100e6, f64::NAN, Gain::Auto).is_err());
    }

    #[test]
    fn test_rtl_sdr_command_line() {
        let dev = RtlSdrDevice::with_program("rtl_sdr", 1);
        let config = DeviceConfig::new(433.92e6, 2.4e6, Gain::Manual(20.0)).unwrap();
        let cmd = dev.command(&config);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["-d", "1", "-f", "433920000", "-s", "2400000", "-g", "20", "-"]);

        let auto = DeviceConfig::new(433.92e6, 2.4e6, Gain::Auto).unwrap();
        assert!(!dev.command(&auto).get_args().any(|a| a == "-g"));
    }

    #[test]
    fn test_missing_rtl_sdr_is_unavailable() {
        let mut dev = RtlSdrDevice::with_program("/nonexistent/rtl_sdr", 0);
        let config = DeviceConfig::new(100e6, 2.4e6, Gain::Auto).unwrap();
        let err = dev.configure(&config).unwrap_err();
        assert!(matches!(err, RewindError::DeviceUnavailable(_)));
        dev.release().unwrap();
    }

    #[test]
    fn test_oversized_read_rejected() {
        let mut dev = RtlSdrDevice::new();
        let err = dev.read_samples(usize::MAX).unwrap_err();
        assert!(matches!(&err, RewindError::DeviceRead(msg) if msg.contains("too many")));

        let mut sim = SimulatedDevice::seeded(1);
        sim.configure(&DeviceConfig::new(100e6, 48_000.0, Gain::Auto).unwrap())
            .unwrap();
        assert!(sim.read_samples(MAX_SAMPLES_PER_READ + 1).is_err());
    }

    #[test]
    fn test_simulated_reads_exact_count() {
        let mut dev = SimulatedDevice::seeded(7);
        assert!(dev.read_samples(4).is_err());
        dev.configure(&DeviceConfig::new(100e6, 48_000.0, Gain::Auto).unwrap())
            .unwrap();
        let samples = dev.read_samples(1000).unwrap();
        assert_eq!(samples.len(), 1000);
        assert!(samples.iter().all(|s| s.re.abs() <= 1.1 && s.im.abs() <= 1.1));
        dev.release().unwrap();
    }
}
