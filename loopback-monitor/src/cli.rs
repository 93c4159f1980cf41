//! Command-line interface for loopback-monitor
//!
//! Handles argument parsing and logging configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

/// Loopback monitor - plays the microphone through the speaker and plots its waveform
#[derive(Parser, Debug)]
#[command(name = "loopback-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = all deps
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// List audio devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Input device name (default: system default)
    #[arg(long)]
    pub input: Option<String>,

    /// Output device name (default: system default)
    #[arg(long)]
    pub output_device: Option<String>,

    /// Start recording immediately instead of waiting for Enter
    #[arg(long)]
    pub autostart: bool,

    /// Quit after this many seconds
    #[arg(long)]
    pub seconds: Option<u64>,

    /// Plot width in pixels (one column per snapshot)
    #[arg(long, default_value_t = 320)]
    pub width: u32,

    /// Plot height in pixels
    #[arg(long, default_value_t = 100)]
    pub height: u32,

    /// Minimum milliseconds between plotted snapshots
    #[arg(long, default_value_t = 5000)]
    pub interval_ms: u64,

    /// Write the last frame here as PPM, with a .report.json sidecar
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.seconds.map(Duration::from_secs)
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    builder.filter_module("loopback_monitor", args.log_level());
    builder.filter_module("loopback_core", args.log_level());
    builder.filter_module("loopback_cpal", args.log_level());

    // Audio host internals only at -vvvv
    if args.verbose >= 4 {
        builder.filter_module("cpal", args.log_level());
    }

    builder.format_timestamp_millis().init();
}
