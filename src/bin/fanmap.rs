//! fanmap CLI: drive the engines over a synthetic workload.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fanmap::config::Config;
use fanmap::telemetry::init_telemetry;
use fanmap::{Errors, Options, execute, map, thunk};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "fanmap", about = "Bounded fan-out/fan-in over a synthetic workload")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Map 1..=count through the bounded ordered engine
    Map {
        #[command(flatten)]
        workload: Workload,
        /// Maximum calls in flight (defaults to FANMAP_CONCURRENCY or CPU count)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Stop after this many results (0 = unbounded)
        #[arg(long)]
        limit: Option<usize>,
        /// Keep zero-valued slots for failed items
        #[arg(long)]
        keep_zero: bool,
        /// Jitter lower bound, in units
        #[arg(long, requires_all = ["jitter_max", "jitter_unit_ms"])]
        jitter_min: Option<u64>,
        /// Jitter upper bound, in units
        #[arg(long, requires = "jitter_unit_ms")]
        jitter_max: Option<u64>,
        /// Jitter unit in milliseconds
        #[arg(long, requires = "jitter_max")]
        jitter_unit_ms: Option<u64>,
    },
    /// Run count operations through the unbounded execute engine
    Execute {
        #[command(flatten)]
        workload: Workload,
    },
}

#[derive(Args, Clone, Copy)]
struct Workload {
    /// Number of items
    #[arg(long, default_value_t = 10)]
    count: u64,
    /// Per-item delay in milliseconds
    #[arg(long, default_value_t = 50)]
    delay_ms: u64,
    /// Fail every Nth item (0 = never)
    #[arg(long, default_value_t = 0)]
    fail_every: u64,
    /// Cancel the token after this many milliseconds (0 = never)
    #[arg(long, default_value_t = 0)]
    timeout_ms: u64,
}

impl Workload {
    /// Square `n` after the configured delay, failing on every Nth item or as
    /// soon as the token fires.
    async fn run(self, token: CancellationToken, n: u64) -> anyhow::Result<u64> {
        tokio::select! {
            _ = token.cancelled() => anyhow::bail!("cancelled while processing {n}"),
            _ = tokio::time::sleep(Duration::from_millis(self.delay_ms)) => {}
        }
        if self.fail_every > 0 && n % self.fail_every == 0 {
            anyhow::bail!("item {n} is a multiple of {}", self.fail_every);
        }
        Ok(n * n)
    }

    fn token(self) -> CancellationToken {
        let token = CancellationToken::new();
        if self.timeout_ms > 0 {
            let canceller = token.clone();
            let after = Duration::from_millis(self.timeout_ms);
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                canceller.cancel();
            });
        }
        token
    }
}

#[derive(Serialize)]
struct Report {
    results: Vec<u64>,
    errors: Vec<String>,
    elapsed_ms: u128,
}

impl Report {
    fn new(results: Vec<u64>, errors: Errors, started: std::time::Instant) -> Self {
        Self {
            results,
            errors: errors.iter().map(ToString::to_string).collect(),
            elapsed_ms: started.elapsed().as_millis(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _guard = init_telemetry(config.telemetry())?;

    let report = match cli.command {
        Command::Map {
            workload,
            concurrency,
            limit,
            keep_zero,
            jitter_min,
            jitter_max,
            jitter_unit_ms,
        } => {
            let mut opts = config.options.clone();
            if let Some(n) = concurrency {
                opts = opts.concurrency(n);
            }
            if let Some(n) = limit {
                opts = opts.limit(n);
            }
            if keep_zero {
                opts = opts.remove_zero_values(false);
            }
            if let (Some(max), Some(unit_ms)) = (jitter_max, jitter_unit_ms) {
                opts = opts.jitter(jitter_min.unwrap_or(0), max, Duration::from_millis(unit_ms));
            }
            cmd_map(workload, opts).await
        }
        Command::Execute { workload } => cmd_execute(workload).await,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_map(workload: Workload, opts: Options) -> Report {
    info!(count = workload.count, concurrency = opts.concurrency, "mapping");
    let token = workload.token();
    let started = std::time::Instant::now();
    let items: Vec<u64> = (1..=workload.count).collect();

    let (results, errors) = map(&token, items, move |t, n| workload.run(t, n), opts).await;
    Report::new(results, errors, started)
}

async fn cmd_execute(workload: Workload) -> Report {
    info!(count = workload.count, "executing");
    let token = workload.token();
    let started = std::time::Instant::now();
    let fns = (1..=workload.count)
        .map(|n| thunk(move |t| workload.run(t, n)))
        .collect();

    let (results, errors) = execute(&token, fns).await;
    Report::new(results, errors, started)
}
