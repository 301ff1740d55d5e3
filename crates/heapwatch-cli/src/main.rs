//! CLI for heapwatch: sample a process heap and watch it change.

mod commands;

use std::time::Duration;

use clap::{Parser, Subcommand};

use commands::{OutputFormat, WatchOptions, parse_duration};

#[derive(Parser)]
#[command(name = "heapwatch")]
#[command(about = "heapwatch: heap telemetry sampler for garbage-collected runtimes")]
#[command(version = heapwatch_core::VERSION)]
struct Cli {
    /// Log tracker internals (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a simulated multi-isolate process with periodic GC events
    Demo {
        /// Number of simulated isolates
        #[arg(long, default_value = "2")]
        isolates: usize,

        /// Mean time between simulated GC events (e.g. 750ms, 2s)
        #[arg(long, default_value = "750ms", value_parser = parse_duration)]
        gc_every: Duration,

        /// Seed for the simulation (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        watch: WatchArgs,
    },

    /// Replay a recorded trace of poll snapshots and GC events
    Replay {
        /// Path to the trace JSON file
        trace: String,

        #[command(flatten)]
        watch: WatchArgs,
    },
}

#[derive(clap::Args)]
struct WatchArgs {
    /// Stop after this long (e.g. 10s, 2m); runs until Ctrl+C if omitted
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Delay before the first poll
    #[arg(long, default_value = "500ms", value_parser = parse_duration)]
    initial_delay: Duration,

    /// Delay between polls
    #[arg(long, default_value = "200ms", value_parser = parse_duration)]
    interval: Duration,

    /// Print one JSON object per sample instead of a table
    #[arg(long)]
    json: bool,
}

impl WatchArgs {
    fn into_options(self) -> WatchOptions {
        WatchOptions {
            duration: self.duration,
            initial_delay: self.initial_delay,
            interval: self.interval,
            format: if self.json {
                OutputFormat::Json
            } else {
                OutputFormat::Table
            },
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Demo {
            isolates,
            gc_every,
            seed,
            watch,
        } => commands::demo::run(isolates, gc_every, seed, watch.into_options()),
        Commands::Replay { trace, watch } => commands::replay::run(&trace, watch.into_options()),
    }
}
