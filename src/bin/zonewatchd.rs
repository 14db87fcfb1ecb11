//! zonewatchd - zone-aware surveillance engine
//!
//! Runs one monitor against one video source until end of stream, Ctrl-C,
//! or a `q` line on stdin:
//! - `intrusion`: restricted-zone breach capture, alarm and log
//! - `crowd`: zone occupancy, heatmap, capacity alerts and count log

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use zonewatch::detect::open_detector;
use zonewatch::ingest::open_source;
use zonewatch::{build_effects, build_monitor, EngineConfig, FrameCycle, Mode, StopReason, StopSignal};

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "zonewatchd", author, version, about = "Zone-aware surveillance engine")]
struct Args {
    /// Config file (.toml, otherwise JSON).
    #[arg(long, global = true, env = "ZONEWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long, global = true)]
    max_frames: Option<u64>,
    /// Never sound the alarm.
    #[arg(long, global = true)]
    no_alarm: bool,
    /// Do not watch stdin for a `q` line.
    #[arg(long, global = true)]
    no_stdin_quit: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Watch the restricted zone for breaches
    Intrusion,
    /// Count people per zone, accumulate the heatmap, alert on overload
    Crowd,
}

impl From<Command> for Mode {
    fn from(command: Command) -> Self {
        match command {
            Command::Intrusion => Mode::Intrusion,
            Command::Crowd => Mode::Crowd,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mode = Mode::from(args.command);

    let cfg = EngineConfig::load(args.config.as_deref())?;
    let alarm_enabled = cfg.alarm_enabled && !args.no_alarm;

    log::info!("zonewatchd {} starting in {} mode", env!("CARGO_PKG_VERSION"), mode.as_str());
    log::info!("source: {} ({}x{})", cfg.source.url, cfg.source.width, cfg.source.height);
    match mode {
        Mode::Intrusion => {
            log::info!(
                "restricted zone: {} ({} vertices)",
                cfg.intrusion.zone.name(),
                cfg.intrusion.zone.polygon().vertices().len()
            );
            log::info!(
                "capture every {:?} to {}, log {}",
                cfg.intrusion.settings.capture_interval,
                cfg.intrusion.settings.capture_dir.display(),
                cfg.intrusion.log_path.display()
            );
        }
        Mode::Crowd => {
            let names: Vec<&str> = cfg.crowd.zones.iter().map(|z| z.name()).collect();
            log::info!(
                "zones: {} | capacity {}",
                names.join(", "),
                cfg.crowd.settings.max_capacity
            );
            log::info!(
                "snapshots every {:?} to {}, counts every {:?} to {}, alerts to {}",
                cfg.crowd.settings.snapshot_interval,
                cfg.crowd.settings.snapshot_dir.display(),
                cfg.crowd.settings.count_log_interval,
                cfg.crowd.count_log_path.display(),
                cfg.crowd.event_log_path.display()
            );
        }
    }
    log::info!("alarm {}", if alarm_enabled { "enabled" } else { "disabled" });

    let monitor = build_monitor(&cfg, mode)?;
    let detector = open_detector(
        &cfg.detector.backend,
        cfg.detector.model_path.as_deref(),
        cfg.detector.input_size,
        cfg.detector.settings,
    )?;
    let source = open_source(&cfg.source)?;

    let stop = StopSignal::new();
    let ctrlc_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        ctrlc_stop.trigger();
    })
    .context("install Ctrl-C handler")?;
    if !args.no_stdin_quit {
        spawn_stdin_quit(stop.clone());
        log::info!("type q + Enter (or Ctrl-C) to stop");
    }

    let mut cycle = FrameCycle::new(source, detector, monitor, build_effects(alarm_enabled))?
        .with_stop_signal(stop)
        .with_target_class(cfg.detector.target_class)
        .with_max_frames(args.max_frames)
        .with_health_interval(HEALTH_INTERVAL);

    let summary = cycle.run(|outcome| {
        if !outcome.failures.is_empty() {
            log::warn!(
                "frame {}: {} side effect(s) failed: {:?}",
                outcome.frame_index,
                outcome.failures.len(),
                outcome.failure_codes()
            );
        }
    });
    log::info!(
        "stopped after {} frames ({:?}): {} actions, {} failures, {} detector failures",
        summary.frames,
        summary.reason,
        summary.actions,
        summary.failures,
        summary.detector_failures
    );

    match summary.reason {
        StopReason::SourceFailed(reason) => Err(anyhow!(
            "video source {} failed: {}",
            cfg.source.url,
            reason
        )),
        _ => Ok(()),
    }
}

/// Trigger `stop` when a line reading `q` arrives on stdin.
fn spawn_stdin_quit(stop: StopSignal) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().eq_ignore_ascii_case("q") {
                log::info!("quit requested");
                stop.trigger();
                break;
            }
        }
    });
}
