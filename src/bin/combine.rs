use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use csv::{Reader, StringRecord, Writer};
use tracing::{info, warn};

/// Merge the per-year CSV exports of a completed harvest run into one
/// dataset, deduplicating by DOI first and by normalized title for
/// records without a DOI.
#[derive(Parser)]
#[command(author, version, about = "Merge per-year Scopus exports into one dataset")]
struct Args {
    /// Directory holding the per-year files.
    #[arg(long, default_value = "data/raw/scopus_api")]
    input: PathBuf,
    /// Year files are named `<prefix>_<year>.csv`.
    #[arg(long, default_value = "scopus_api")]
    prefix: String,
    #[arg(long, default_value_t = 2010)]
    start_year: i32,
    #[arg(long, default_value_t = 2025)]
    end_year: i32,
    #[arg(long, default_value = "data/processed/scopus_combined.csv")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut header: Option<StringRecord> = None;
    let mut rows: Vec<StringRecord> = Vec::new();
    let mut files_loaded = 0usize;

    for year in args.start_year..=args.end_year {
        let path = args.input.join(format!("{}_{}.csv", args.prefix, year));
        if !path.exists() {
            warn!(year, path = %path.display(), "year file missing; skipping");
            continue;
        }
        let mut reader = Reader::from_path(&path)
            .with_context(|| format!("opening `{}`", path.display()))?;
        let file_header = reader.headers()?.clone();
        match &header {
            None => header = Some(file_header),
            Some(h) if *h != file_header => {
                anyhow::bail!("header mismatch in `{}`", path.display())
            }
            _ => {}
        }

        let mut count = 0usize;
        for record in reader.records() {
            rows.push(record.with_context(|| format!("reading `{}`", path.display()))?);
            count += 1;
        }
        info!(year, records = count, "loaded year file");
        files_loaded += 1;
    }

    let header = header.context("no year files found; nothing to combine")?;
    let before = rows.len();
    let doi_idx = header.iter().position(|c| c == "DOI");
    let title_idx = header.iter().position(|c| c == "Title");

    let mut seen_dois: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut kept: Vec<StringRecord> = Vec::with_capacity(rows.len());

    for row in rows {
        let doi = doi_idx.and_then(|i| row.get(i)).unwrap_or("").trim();
        let title = title_idx
            .and_then(|i| row.get(i))
            .unwrap_or("")
            .trim()
            .to_lowercase();

        if !doi.is_empty() {
            if !seen_dois.insert(doi.to_string()) {
                continue;
            }
        } else if !title.is_empty() && seen_titles.contains(&title) {
            // DOI-less record whose title matches one already kept
            continue;
        }
        if !title.is_empty() {
            seen_titles.insert(title);
        }
        kept.push(row);
    }
    info!(
        files = files_loaded,
        before,
        after = kept.len(),
        removed = before - kept.len(),
        "deduplicated"
    );

    if let Some(parent) = args.output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create `{}`", parent.display()))?;
    }
    let mut writer = Writer::from_path(&args.output)
        .with_context(|| format!("cannot create `{}`", args.output.display()))?;
    writer.write_record(&header)?;
    for row in &kept {
        writer.write_record(row)?;
    }
    writer.flush()?;

    info!(records = kept.len(), output = %args.output.display(), "combined dataset written");
    Ok(())
}
