use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use litharvest::{
    fetch::{scopus::ScopusClient, View},
    harvest::{self, pacing::PacingPolicy, HarvestConfig},
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Default search expression from the Trichoptera literature pipeline.
const DEFAULT_QUERY: &str =
    r#"TITLE-ABS-KEY("Trichoptera" OR "caddisfly" OR "caddisflies" OR "caddis fly" OR "caddis flies")"#;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Per-year Scopus literature harvester: one CSV artifact per publication year"
)]
struct Args {
    /// First publication year to fetch (inclusive).
    #[arg(long, default_value_t = 2010)]
    start_year: i32,
    /// Last publication year to fetch (inclusive).
    #[arg(long, default_value_t = 2025)]
    end_year: i32,
    /// API view: "standard" (basic metadata) or "complete" (with abstracts).
    #[arg(long, default_value = "standard")]
    view: String,
    /// Directory receiving the per-year CSV files.
    #[arg(long, default_value = "data/raw/scopus_api")]
    out_dir: PathBuf,
    /// Output files are named `<prefix>_<year>.csv`.
    #[arg(long, default_value = "scopus_api")]
    prefix: String,
    /// Seconds to wait between consecutive year fetches.
    #[arg(long, default_value_t = 1.0)]
    pacing_secs: f64,
    /// Double the pacing delay after a failed year instead of keeping it fixed.
    #[arg(long)]
    backoff: bool,
    /// Skip years whose output file already exists instead of refetching.
    #[arg(long)]
    skip_existing: bool,
    /// Scopus search expression; a PUBYEAR clause is appended per year.
    #[arg(long, default_value = DEFAULT_QUERY)]
    query: String,
    /// Cap on records fetched per year (testing aid).
    #[arg(long)]
    max_results: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // credentials may live in .env; absence is fine
    let _ = dotenvy::dotenv();

    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();
    let view: View = args.view.parse()?;

    let api_key = env::var("SCOPUS_API_KEY")
        .context("SCOPUS_API_KEY not set; add it to .env or the environment")?;
    let inst_token = env::var("SCOPUS_INST_TOKEN").ok();

    let pacing_delay = Duration::from_secs_f64(args.pacing_secs);
    let pacing = if args.backoff {
        PacingPolicy::backoff(pacing_delay, pacing_delay.saturating_mul(60))
    } else {
        PacingPolicy::fixed(pacing_delay)
    };

    let config = HarvestConfig {
        start_year: args.start_year,
        end_year: args.end_year,
        view,
        out_dir: args.out_dir,
        prefix: args.prefix,
        pacing,
        skip_existing: args.skip_existing,
    };

    let mut client = ScopusClient::new(api_key, inst_token, args.query);
    if let Some(max) = args.max_results {
        client = client.with_max_results(max);
    }

    info!(
        start = config.start_year,
        end = config.end_year,
        view = %view,
        out_dir = %config.out_dir.display(),
        "starting harvest"
    );
    let summary = harvest::run(&config, &client).await?;

    // Per-year failures are part of a completed run; only setup errors
    // above make the process exit nonzero.
    let failed = summary.failed_years();
    if failed.is_empty() {
        info!(
            fetched = summary.fetched(),
            skipped = summary.skipped(),
            "run complete"
        );
    } else {
        warn!(
            fetched = summary.fetched(),
            skipped = summary.skipped(),
            failed = ?failed,
            "run complete with failures"
        );
    }
    Ok(())
}
