//! loopback-monitor - live microphone-to-speaker loopback with a scrolling waveform plot
//!
//! Press Enter to start or stop, `q` to quit.

mod cli;
mod console;

use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use loopback_core::storage::frame::write_ppm;
use loopback_core::storage::report::write_report;
use loopback_core::{
    LoopbackConfig, LoopbackSession, PixelBuffer, RendererConfig, SamplerConfig, SessionReport,
    SnapshotSink, WaveformRenderer,
};
use loopback_cpal::{CpalCapture, CpalPlayback, DeviceEnumerator};

use console::{Command, ConsoleDelegate};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let args = cli::Args::parse();
    cli::init_logging(&args);

    if args.list_devices {
        return list_devices();
    }

    info!("Starting loopback monitor");
    run(&args)
}

fn list_devices() -> Result<()> {
    let enumerator = DeviceEnumerator::new();
    for (label, devices) in [
        ("Input", enumerator.list_input_devices()?),
        ("Output", enumerator.list_output_devices()?),
    ] {
        println!("{} devices:", label);
        for device in devices {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("  {}{}", device.name, marker);
        }
    }
    Ok(())
}

fn run(args: &cli::Args) -> Result<()> {
    let capture = match &args.input {
        Some(name) => CpalCapture::with_device(name.clone()),
        None => CpalCapture::default_device(),
    };
    let playback = match &args.output_device {
        Some(name) => CpalPlayback::with_device(name.clone()),
        None => CpalPlayback::default_device(),
    };
    let tap = playback.tap();

    let renderer = Arc::new(
        WaveformRenderer::new(RendererConfig::default()).context("invalid renderer config")?,
    );
    renderer.on_size_changed(args.width, args.height);

    let config = LoopbackConfig {
        sampler: SamplerConfig {
            min_interval: args.min_interval(),
            ..SamplerConfig::default()
        },
        ..LoopbackConfig::default()
    };
    let sink: Arc<dyn SnapshotSink> = Arc::clone(&renderer) as Arc<dyn SnapshotSink>;
    let mut session = LoopbackSession::new(capture, playback, tap, sink, config)
        .context("failed to create loopback session")?;
    session.set_delegate(Arc::new(ConsoleDelegate));

    let (tx, rx) = mpsc::channel();
    console::spawn_stdin_reader(tx).context("failed to spawn stdin reader")?;

    if args.autostart {
        session.start().context("failed to start loopback")?;
    } else {
        println!("press Enter to start/stop, q to quit");
    }

    let deadline = args.run_for().map(|d| Instant::now() + d);
    let mut frame = PixelBuffer::new(args.width, args.height);
    let mut last_report: Option<SessionReport> = None;
    let mut stdin_open = true;

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("run time elapsed");
            break;
        }

        let command = if stdin_open {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    stdin_open = false;
                    None
                }
            }
        } else if deadline.is_some() {
            thread::sleep(POLL_INTERVAL);
            None
        } else {
            break;
        };

        match command {
            Some(Command::Quit) => break,
            Some(Command::Toggle) => match session.toggle() {
                Ok(Some(report)) => last_report = Some(report),
                Ok(None) => {}
                Err(e) => log::error!("toggle failed: {}", e),
            },
            None => {}
        }

        if renderer.take_redraw_request() {
            let (width, height) = renderer.dimensions();
            frame.resize(width, height);
            renderer.redraw(&mut frame);
        }
    }

    if !session.state().is_idle() {
        last_report = Some(session.stop().context("failed to stop loopback")?);
    }
    renderer.redraw(&mut frame);

    if let Some(path) = &args.output {
        export(&frame, last_report.as_ref(), path)?;
    }
    info!("{} snapshots plotted", renderer.received());
    Ok(())
}

fn export(frame: &PixelBuffer, report: Option<&SessionReport>, path: &Path) -> Result<()> {
    write_ppm(frame, path).with_context(|| format!("failed to write {}", path.display()))?;
    println!("frame written to {}", path.display());
    if let Some(report) = report {
        let report_path = write_report(report, path).context("failed to write session report")?;
        println!("report written to {}", report_path.display());
    }
    Ok(())
}
