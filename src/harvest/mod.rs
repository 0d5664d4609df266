use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::fetch::{FetchClient, View};

pub mod pacing;

use pacing::PacingPolicy;

/// Configuration for one harvest run. The year range is a closed
/// interval traversed ascending; the output path for a year is a pure
/// function of the year, `out_dir` and `prefix`, so re-running the same
/// configuration overwrites rather than duplicates.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub start_year: i32,
    pub end_year: i32,
    pub view: View,
    pub out_dir: PathBuf,
    pub prefix: String,
    pub pacing: PacingPolicy,
    /// Opt-in: leave a year alone when its output file already exists.
    /// Off by default, so a re-run refetches everything.
    pub skip_existing: bool,
}

impl HarvestConfig {
    /// Output artifact path for `year`: `<out_dir>/<prefix>_<year>.csv`.
    pub fn output_path(&self, year: i32) -> PathBuf {
        self.out_dir.join(format!("{}_{}.csv", self.prefix, year))
    }

    fn validate(&self) -> Result<()> {
        for year in [self.start_year, self.end_year] {
            if !(1000..=9999).contains(&year) {
                anyhow::bail!("year {} out of range (expected a 4-digit year)", year);
            }
        }
        fs::create_dir_all(&self.out_dir).with_context(|| {
            format!("cannot create output directory `{}`", self.out_dir.display())
        })?;
        Ok(())
    }
}

/// How a single year's unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearStatus {
    Fetched,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct YearOutcome {
    pub year: i32,
    pub path: PathBuf,
    pub status: YearStatus,
}

/// Aggregate outcome of a run. Per-year failures never abort the loop,
/// so the summary is the only place they surface programmatically.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<YearOutcome>,
}

impl RunSummary {
    pub fn fetched(&self) -> usize {
        self.count(YearStatus::Fetched)
    }

    pub fn skipped(&self) -> usize {
        self.count(YearStatus::Skipped)
    }

    pub fn failed_years(&self) -> Vec<i32> {
        self.outcomes
            .iter()
            .filter(|o| o.status == YearStatus::Failed)
            .map(|o| o.year)
            .collect()
    }

    fn count(&self, status: YearStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Execute one harvest unit per year in `[start_year, end_year]`,
/// strictly ascending, pacing between consecutive fetches. A failed
/// year is logged and recorded, never fatal; only invalid configuration
/// (bad year bounds, uncreatable output directory) aborts before the
/// first unit. An empty range (`start > end`) completes immediately
/// with zero units.
pub async fn run<C: FetchClient>(config: &HarvestConfig, client: &C) -> Result<RunSummary> {
    config.validate()?;

    let mut pacing = config.pacing.clone();
    let mut summary = RunSummary::default();

    for year in config.start_year..=config.end_year {
        let path = config.output_path(year);

        if config.skip_existing && path.exists() {
            info!(year, path = %path.display(), "output exists; skipping");
            summary.outcomes.push(YearOutcome {
                year,
                path,
                status: YearStatus::Skipped,
            });
            continue;
        }

        info!(year, path = %path.display(), "fetching year");
        let status = match client.fetch_year(year, config.view, &path).await {
            Ok(()) => YearStatus::Fetched,
            Err(e) => {
                error!(year, error = %e, "year failed; continuing with next");
                YearStatus::Failed
            }
        };
        let failed = status == YearStatus::Failed;
        summary.outcomes.push(YearOutcome { year, path, status });

        // No trailing sleep after the final unit.
        if year < config.end_year {
            let delay = pacing.next_delay(failed);
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }

    let failed = summary.failed_years();
    if failed.is_empty() {
        info!(
            years = summary.outcomes.len(),
            fetched = summary.fetched(),
            skipped = summary.skipped(),
            "all years processed"
        );
    } else {
        warn!(
            years = summary.outcomes.len(),
            fetched = summary.fetched(),
            failed = ?failed,
            "all years processed; some failed"
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchClient, View};
    use anyhow::anyhow;
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::Instant;

    struct MockClient {
        calls: Mutex<Vec<(i32, Instant)>>,
        fail_years: HashSet<i32>,
    }

    impl MockClient {
        fn new() -> Self {
            Self::failing(&[])
        }

        fn failing(years: &[i32]) -> Self {
            MockClient {
                calls: Mutex::new(Vec::new()),
                fail_years: years.iter().copied().collect(),
            }
        }

        fn years_called(&self) -> Vec<i32> {
            self.calls.lock().unwrap().iter().map(|(y, _)| *y).collect()
        }

        fn call_instants(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    impl FetchClient for MockClient {
        async fn fetch_year(&self, year: i32, _view: View, out_path: &Path) -> Result<()> {
            self.calls.lock().unwrap().push((year, Instant::now()));
            if self.fail_years.contains(&year) {
                return Err(anyhow!("simulated fetch failure"));
            }
            fs::write(out_path, "Cites,Authors,Title\n")?;
            Ok(())
        }
    }

    fn config(dir: &Path, start: i32, end: i32) -> HarvestConfig {
        HarvestConfig {
            start_year: start,
            end_year: end,
            view: View::Standard,
            out_dir: dir.to_path_buf(),
            prefix: "scopus_api".into(),
            pacing: PacingPolicy::fixed(Duration::from_secs(1)),
            skip_existing: false,
        }
    }

    #[test]
    fn output_path_is_stable_per_year() {
        let cfg = config(Path::new("data/raw"), 2010, 2025);
        let path = cfg.output_path(2014);
        assert_eq!(path, Path::new("data/raw").join("scopus_api_2014.csv"));
        assert_eq!(cfg.output_path(2014), path);
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_every_year_in_ascending_order() {
        let tmp = tempdir().unwrap();
        let client = MockClient::new();

        let summary = run(&config(tmp.path(), 2010, 2012), &client).await.unwrap();

        assert_eq!(client.years_called(), vec![2010, 2011, 2012]);
        assert_eq!(summary.fetched(), 3);
        assert!(summary.failed_years().is_empty());
        for year in 2010..=2012 {
            assert!(tmp.path().join(format!("scopus_api_{year}.csv")).exists());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_range_completes_with_zero_units() {
        let tmp = tempdir().unwrap();
        let client = MockClient::new();

        let summary = run(&config(tmp.path(), 2025, 2010), &client).await.unwrap();

        assert!(client.years_called().is_empty());
        assert!(summary.outcomes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_year_does_not_abort_the_run() {
        let tmp = tempdir().unwrap();
        let client = MockClient::failing(&[2011]);

        let summary = run(&config(tmp.path(), 2010, 2012), &client).await.unwrap();

        assert_eq!(client.years_called(), vec![2010, 2011, 2012]);
        assert_eq!(summary.failed_years(), vec![2011]);
        assert!(tmp.path().join("scopus_api_2010.csv").exists());
        assert!(!tmp.path().join("scopus_api_2011.csv").exists());
        assert!(tmp.path().join("scopus_api_2012.csv").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_delay_elapses_between_invocations() {
        let tmp = tempdir().unwrap();
        let client = MockClient::new();

        run(&config(tmp.path(), 2010, 2012), &client).await.unwrap();

        let instants = client.call_instants();
        assert_eq!(instants.len(), 3);
        for pair in instants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_year_has_no_trailing_delay() {
        let tmp = tempdir().unwrap();
        let client = MockClient::new();
        let before = Instant::now();

        let summary = run(&config(tmp.path(), 2020, 2020), &client).await.unwrap();

        assert_eq!(client.years_called(), vec![2020]);
        assert_eq!(summary.fetched(), 1);
        assert_eq!(Instant::now() - before, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_existing_leaves_present_artifacts_alone() {
        let tmp = tempdir().unwrap();
        let client = MockClient::new();
        fs::write(tmp.path().join("scopus_api_2011.csv"), "existing\n").unwrap();

        let mut cfg = config(tmp.path(), 2010, 2012);
        cfg.skip_existing = true;
        let summary = run(&cfg, &client).await.unwrap();

        assert_eq!(client.years_called(), vec![2010, 2012]);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(
            fs::read_to_string(tmp.path().join("scopus_api_2011.csv")).unwrap(),
            "existing\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unusable_output_directory_is_fatal_before_any_fetch() {
        let tmp = tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();
        let client = MockClient::new();

        let err = run(&config(&blocker, 2010, 2012), &client).await;

        assert!(err.is_err());
        assert!(client.years_called().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_year_is_rejected() {
        let tmp = tempdir().unwrap();
        let client = MockClient::new();

        let err = run(&config(tmp.path(), 10, 2012), &client).await;

        assert!(err.is_err());
        assert!(client.years_called().is_empty());
    }
}
