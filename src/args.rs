//! Argument parsing for running from the command line

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Rolling IQ capture with after-the-fact extraction", long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start rolling capture
    Capture {
        /// Center frequency in Hz
        #[clap(long)]
        freq: f64,
        /// Sample rate in Hz
        #[clap(long, default_value_t = sdr_rewind::DEFAULT_SAMP_RATE)]
        samp_rate: f64,
        /// Tuner gain in dB, or "auto"
        #[clap(long, default_value = "auto")]
        gain: String,
        /// Capture device kind (rtlsdr, sim)
        #[clap(long, default_value = "rtlsdr")]
        driver: String,
        /// Seconds of history to keep on disk
        #[clap(long, default_value_t = sdr_rewind::DEFAULT_BUFFER_S)]
        buffer: f64,
        /// Seconds per chunk
        #[clap(long, default_value_t = sdr_rewind::DEFAULT_CHUNK_S)]
        chunk: f64,
        /// Chunk directory
        #[clap(long, default_value = "captures")]
        outdir: PathBuf,
    },
    /// Extract a time slice relative to now
    Extract {
        /// Chunk directory
        #[clap(long, default_value = "captures")]
        outdir: PathBuf,
        /// Start of the slice in seconds relative to now (negative is the past)
        #[clap(long, allow_hyphen_values = true)]
        start: f64,
        /// Length of the slice in seconds
        #[clap(long)]
        duration: f64,
        /// Where to write the slice, the descriptor goes next to it
        #[clap(long)]
        outfile: PathBuf,
    },
    /// Replay a stored slice (prints guidance only)
    Replay {
        #[clap(long)]
        infile: PathBuf,
        #[clap(long, default_value = "hackrf")]
        driver: String,
    },
    /// Summarize the buffered history
    Status {
        /// Chunk directory
        #[clap(long, default_value = "captures")]
        outdir: PathBuf,
    },
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
