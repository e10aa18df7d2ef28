use args::{Args, Command};
use clap::Parser;
use sdr_rewind::{
    extract::{extract, ExtractRequest},
    monitoring::BufferStatus,
    replay, CaptureConfig, CaptureLoop, DeviceConfig, DirectoryStore, Driver, Gain, Result,
    Shutdown,
};
use tracing::{error, info};

mod args;

fn run(command: Command) -> Result<()> {
    match command {
        Command::Capture {
            freq,
            samp_rate,
            gain,
            driver,
            buffer,
            chunk,
            outdir,
        } => {
            // Everything that can be rejected is checked before the device is touched
            let driver: Driver = driver.parse()?;
            let device_config = DeviceConfig::new(freq, samp_rate, Gain::parse_lenient(&gain))?;
            let config = CaptureConfig::new(device_config, chunk, buffer)?;
            let store = DirectoryStore::open(&outdir)?;

            let (mut shutdown, stop) = Shutdown::new();
            ctrlc::set_handler(move || stop.stop())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

            let mut session = CaptureLoop::start(config, driver.open(), store)?;
            let report = session.run(&mut shutdown)?;
            info!(
                written = report.chunks_written,
                pruned = report.chunks_pruned,
                "Capture stopped"
            );
        }
        Command::Extract {
            outdir,
            start,
            duration,
            outfile,
        } => {
            let store = DirectoryStore::open(&outdir)?;
            let request = ExtractRequest::new(start, duration)?;
            let report = extract(&store, &request, &outfile)?;
            println!("Wrote slice -> {}", report.output.display());
        }
        Command::Replay { infile, driver } => {
            println!("{}", replay::advice(&infile, &driver));
        }
        Command::Status { outdir } => {
            let store = DirectoryStore::open(&outdir)?;
            let status = BufferStatus::scan(&store)?;
            println!("{status}");
            if let Some(reach) = status.reach_s(chrono::Utc::now()) {
                println!("Rewind reach: {reach:.1}s");
            }
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args::convert_filter(args.verbose.log_level_filter()))
        .init();

    if let Err(e) = run(args.command) {
        error!("{e}");
        std::process::exit(e.exit_code());
    }
}
