use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::record::{self, PaperRecord};
use super::{FetchClient, View};

const BASE_URL: &str = "https://api.elsevier.com/content/search/scopus";

/// Most Scopus subscription tiers cap the page size at 25.
const PAGE_SIZE: usize = 25;

/// Politeness delay between result pages within one year's query.
const PAGE_DELAY: Duration = Duration::from_millis(500);

/// Wait applied after an HTTP 429 before retrying the same page.
const THROTTLE_WAIT: Duration = Duration::from_secs(60);
const MAX_THROTTLE_RETRIES: u32 = 3;

/// Fetch client for the Elsevier Scopus Search API. One `fetch_year`
/// call runs the configured search expression restricted to that
/// publication year, walks every result page and writes the records as
/// a single CSV artifact.
pub struct ScopusClient {
    client: Client,
    api_key: String,
    inst_token: Option<String>,
    query: String,
    max_results: Option<usize>,
}

impl ScopusClient {
    pub fn new(api_key: String, inst_token: Option<String>, query: String) -> Self {
        ScopusClient {
            client: Client::new(),
            api_key,
            inst_token,
            query,
            max_results: None,
        }
    }

    /// Cap the number of records fetched per year (testing aid).
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    fn year_query(&self, year: i32) -> String {
        format!("{} AND (PUBYEAR = {})", self.query, year)
    }

    async fn fetch_page(
        &self,
        query: &str,
        view: View,
        cursor: Option<&str>,
        start: usize,
    ) -> Result<Value> {
        let mut throttled = 0;
        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("query", query.to_string()),
                ("count", PAGE_SIZE.to_string()),
                ("view", view.as_str().to_string()),
                ("httpAccept", "application/json".to_string()),
                ("sort", "pubdate".to_string()),
            ];
            match cursor {
                Some(c) => params.push(("cursor", c.to_string())),
                None => params.push(("start", start.to_string())),
            }
            if let Some(token) = &self.inst_token {
                params.push(("insttoken", token.clone()));
            }

            let resp = self
                .client
                .get(BASE_URL)
                .header("X-ELS-APIKey", &self.api_key)
                .header("Accept", "application/json")
                .query(&params)
                .send()
                .await
                .context("GET scopus search failed")?;

            match resp.status() {
                StatusCode::TOO_MANY_REQUESTS if throttled < MAX_THROTTLE_RETRIES => {
                    throttled += 1;
                    warn!(
                        attempt = throttled,
                        wait_secs = THROTTLE_WAIT.as_secs(),
                        "rate limit exceeded; waiting before retry"
                    );
                    sleep(THROTTLE_WAIT).await;
                    continue;
                }
                StatusCode::UNAUTHORIZED => {
                    bail!("authentication rejected (401): check SCOPUS_API_KEY / SCOPUS_INST_TOKEN")
                }
                status if !status.is_success() => {
                    let body = resp.text().await.unwrap_or_default();
                    bail!(
                        "scopus search returned {}: {}",
                        status,
                        body.chars().take(500).collect::<String>()
                    );
                }
                _ => {}
            }

            return resp
                .json::<Value>()
                .await
                .context("decoding scopus search response");
        }
    }
}

impl FetchClient for ScopusClient {
    async fn fetch_year(&self, year: i32, view: View, out_path: &Path) -> Result<()> {
        let query = self.year_query(year);
        debug!(year, %query, "running year query");

        let queried_at = Local::now();
        let mut records: Vec<PaperRecord> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut start = 0usize;
        let mut total: Option<usize> = None;
        let mut page = 0usize;

        loop {
            let data = self
                .fetch_page(&query, view, cursor.as_deref(), start)
                .await?;
            let results = &data["search-results"];

            if total.is_none() {
                let found = results["opensearch:totalResults"]
                    .as_str()
                    .or_else(|| results["@totalResults"].as_str())
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0);
                total = Some(found);
                info!(year, total = found, "total results reported");
            }

            let entries = match results["entry"].as_array() {
                Some(entries) if !entries.is_empty() => entries,
                _ => break,
            };
            let page_len = entries.len();
            for entry in entries {
                records.push(PaperRecord::from_entry(entry, queried_at));
            }
            page += 1;
            debug!(year, page, fetched = page_len, so_far = records.len(), "page fetched");

            if let Some(max) = self.max_results {
                if records.len() >= max {
                    records.truncate(max);
                    break;
                }
            }

            // Cursor pagination when the API offers it; otherwise step
            // the start offset until a short page arrives. The reported
            // total can be 0 on some tiers, so it only bounds stepping
            // when positive.
            match results["cursor"]["@next"].as_str() {
                Some(next) => cursor = Some(next.to_string()),
                None => {
                    if page_len < PAGE_SIZE {
                        break;
                    }
                    start += PAGE_SIZE;
                    cursor = None;
                    if let Some(t) = total {
                        if t > 0 && start >= t {
                            break;
                        }
                    }
                }
            }

            sleep(PAGE_DELAY).await;
        }

        info!(year, records = records.len(), path = %out_path.display(), "writing artifact");
        record::write_csv(&records, out_path)
            .with_context(|| format!("writing records for year {}", year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_query_appends_pubyear_clause() {
        let client = ScopusClient::new(
            "key".into(),
            None,
            r#"TITLE-ABS-KEY("Trichoptera")"#.into(),
        );
        assert_eq!(
            client.year_query(2014),
            r#"TITLE-ABS-KEY("Trichoptera") AND (PUBYEAR = 2014)"#
        );
    }
}
