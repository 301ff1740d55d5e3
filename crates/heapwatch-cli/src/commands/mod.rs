pub mod demo;
pub mod replay;

use std::sync::Arc;
use std::time::Duration;

use heapwatch_core::{HeapDataSource, HeapSample, MemoryTracker, TrackerConfig};
use tokio_util::sync::CancellationToken;

/// How samples are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Options shared by every command that drives a tracker.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub duration: Option<Duration>,
    pub initial_delay: Duration,
    pub interval: Duration,
    pub format: OutputFormat,
}

impl WatchOptions {
    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig::default()
            .with_initial_delay(self.initial_delay)
            .with_poll_interval(self.interval)
    }
}

/// Run a tracker against `source` until the duration elapses or Ctrl+C,
/// printing every sample as it is recorded.
pub fn watch(source: Arc<dyn HeapDataSource>, opts: &WatchOptions) {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    };

    let interrupted = CancellationToken::new();
    let on_ctrlc = interrupted.clone();
    if let Err(e) = ctrlc::set_handler(move || on_ctrlc.cancel()) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }

    rt.block_on(async {
        let tracker = MemoryTracker::with_config(source, opts.tracker_config());
        let mut changes = tracker.on_change();
        if let Err(e) = tracker.start() {
            eprintln!("Error starting tracker: {e}");
            std::process::exit(1);
        }

        if opts.format == OutputFormat::Table {
            print_header();
        }

        let deadline = opts.duration.map(|d| tokio::time::Instant::now() + d);
        let mut printed = 0usize;
        loop {
            tokio::select! {
                () = interrupted.cancelled() => break,
                () = sleep_until(deadline) => break,
                changed = changes.changed() => {
                    if !changed {
                        break;
                    }
                    // Print everything not yet shown.
                    let samples = tracker.all();
                    for sample in samples.iter().skip(printed) {
                        print_sample(sample, opts.format);
                    }
                    printed = samples.len();
                }
            }
        }

        tracker.stop();
        print_summary(&tracker, opts.format);
    });
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn print_header() {
    println!(
        "{:>14}  {:>11}  {:>11}  {:>11}  {:>11}  {}",
        "timestamp", "rss", "used", "capacity", "external", "src"
    );
}

fn print_sample(sample: &HeapSample, format: OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}", format_row(sample)),
        OutputFormat::Json => match serde_json::to_string(sample) {
            Ok(line) => println!("{line}"),
            Err(e) => log::warn!("could not serialize sample: {e}"),
        },
    }
}

fn format_row(sample: &HeapSample) -> String {
    format!(
        "{:>14}  {:>11}  {:>11}  {:>11}  {:>11}  {}",
        sample.timestamp,
        format_bytes(sample.process_rss),
        format_bytes(sample.used),
        format_bytes(sample.capacity),
        format_bytes(sample.external),
        if sample.is_gc { "gc" } else { "poll" }
    )
}

fn print_summary(tracker: &MemoryTracker, format: OutputFormat) {
    let stats = tracker.stats();
    match format {
        OutputFormat::Table => {
            println!();
            println!("Tracker {}", tracker.id());
            println!("  Samples:         {}", stats.samples);
            println!("  Polls:           {}", stats.polls);
            println!("  Poll failures:   {}", stats.poll_failures);
            println!("  GC events:       {}", stats.gc_events);
            println!("  Skipped records: {}", stats.malformed_records);
            println!("  Heap max:        {}", format_bytes(tracker.heap_max()));
        }
        OutputFormat::Json => match serde_json::to_string(&stats) {
            Ok(line) => eprintln!("{line}"),
            Err(e) => log::warn!("could not serialize stats: {e}"),
        },
    }
}

/// Format a byte count with binary units, e.g. `12.50MiB`.
pub fn format_bytes(bytes: i64) -> String {
    let sign = if bytes < 0 { "-" } else { "" };
    let mut v = bytes.unsigned_abs() as f64;
    let units = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut idx = 0usize;
    while v >= 1024.0 && idx < units.len() - 1 {
        v /= 1024.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{sign}{v:.0}B")
    } else {
        format!("{sign}{v:.2}{}", units[idx])
    }
}

/// Parse a duration string like "5m", "30s", "1h", "100ms".
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        // Assume seconds
        (s, 1000)
    };

    let value: u64 = numeric
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {s}"))?;
    value
        .checked_mul(multiplier)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration too large: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("7"), Ok(Duration::from_secs(7)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 / 2), "1.50MiB");
    }

    #[test]
    fn test_format_row_marks_gc() {
        let sample = HeapSample {
            timestamp: 1,
            process_rss: 0,
            capacity: 0,
            used: 0,
            external: 0,
            is_gc: true,
        };
        assert!(format_row(&sample).ends_with("gc"));
    }
}
