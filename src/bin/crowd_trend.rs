//! crowd_trend - print the crowd count history as a bar chart

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use zonewatch::event_log::{read_count_log, CountRecord};

const BAR_WIDTH: usize = 50;

#[derive(Parser, Debug)]
#[command(name = "crowd_trend", author, version, about = "Crowd count trend from the count log")]
struct Args {
    /// Crowd count CSV written by `zonewatchd crowd`.
    #[arg(long, default_value = "person_detection/crowd_log.csv")]
    log: PathBuf,
    /// Only show the most recent N rows.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    last: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.log.exists() {
        println!("No crowd log found at {}. Run `zonewatchd crowd` first.", args.log.display());
        return Ok(());
    }
    let mut records = read_count_log(&args.log)?;
    if records.is_empty() {
        println!("{} has no entries yet.", args.log.display());
        return Ok(());
    }
    if let Some(last) = args.last {
        let last = usize::try_from(last).unwrap_or(usize::MAX);
        let skip = records.len().saturating_sub(last);
        records.drain(..skip);
    }
    for line in render(&records) {
        println!("{}", line);
    }
    Ok(())
}

fn render(records: &[CountRecord]) -> Vec<String> {
    if records.is_empty() {
        return vec!["rows=0".to_string()];
    }
    let max = records.iter().map(|r| r.people_count).max().unwrap_or(0);
    let min = records.iter().map(|r| r.people_count).min().unwrap_or(0);
    let total: u64 = records.iter().map(|r| u64::from(r.people_count)).sum();

    let mut lines: Vec<String> = records
        .iter()
        .map(|r| {
            let len = if max == 0 {
                0
            } else {
                (r.people_count as usize * BAR_WIDTH).div_ceil(max as usize)
            };
            format!("{} {} {:>5} {}", r.date, r.time, r.people_count, "#".repeat(len))
        })
        .collect();
    lines.push(format!(
        "rows={} min={} max={} mean={:.1}",
        records.len(),
        min,
        max,
        total as f64 / records.len() as f64
    ));
    lines
}
