use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local};
use serde::Serialize;
use serde_json::Value;

/// One bibliographic record in the flat export schema shared by every
/// downstream consumer of the harvest. Column names and order are part
/// of the durable contract.
#[derive(Debug, Clone, Serialize)]
pub struct PaperRecord {
    #[serde(rename = "Cites")]
    pub cites: u64,
    #[serde(rename = "Authors")]
    pub authors: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year")]
    pub year: Option<i32>,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Publisher")]
    pub publisher: String,
    #[serde(rename = "ArticleURL")]
    pub article_url: String,
    #[serde(rename = "CitesURL")]
    pub cites_url: String,
    /// Not available from the Scopus API; kept for schema compatibility.
    #[serde(rename = "GSRank")]
    pub gs_rank: String,
    #[serde(rename = "QueryDate")]
    pub query_date: String,
    #[serde(rename = "Type")]
    pub doc_type: String,
    #[serde(rename = "DOI")]
    pub doi: String,
    #[serde(rename = "ISSN")]
    pub issn: String,
    #[serde(rename = "CitationURL")]
    pub citation_url: String,
    #[serde(rename = "Volume")]
    pub volume: String,
    #[serde(rename = "Issue")]
    pub issue: String,
    #[serde(rename = "StartPage")]
    pub start_page: String,
    #[serde(rename = "EndPage")]
    pub end_page: String,
    /// Not available from the Scopus API; kept for schema compatibility.
    #[serde(rename = "ECC")]
    pub ecc: String,
    #[serde(rename = "CitesPerYear")]
    pub cites_per_year: f64,
    #[serde(rename = "CitesPerAuthor")]
    pub cites_per_author: f64,
    #[serde(rename = "AuthorCount")]
    pub author_count: usize,
    #[serde(rename = "Age")]
    pub age: Option<i32>,
    #[serde(rename = "Abstract")]
    pub abstract_text: String,
    #[serde(rename = "FullTextURL")]
    pub full_text_url: String,
    #[serde(rename = "RelatedURL")]
    pub related_url: String,
    #[serde(rename = "ScopusID")]
    pub scopus_id: String,
    #[serde(rename = "EID")]
    pub eid: String,
}

impl PaperRecord {
    /// Map one Scopus search entry into the export schema. Missing or
    /// malformed fields degrade to empty values rather than failing the
    /// whole page.
    pub fn from_entry(entry: &Value, queried_at: DateTime<Local>) -> Self {
        let now_year = queried_at.year();

        let scopus_id = text(entry, "dc:identifier")
            .strip_prefix("SCOPUS_ID:")
            .map(str::to_string)
            .unwrap_or_else(|| text(entry, "dc:identifier"));

        let author_names = parse_creators(entry.get("dc:creator"));
        let authors = author_names.join(", ");

        let year = text(entry, "prism:coverDate")
            .split('-')
            .next()
            .and_then(|y| y.parse::<i32>().ok());

        let cites = entry
            .get("citedby-count")
            .map(count_value)
            .unwrap_or_default();

        // The standard view leaves `subtypeDescription` populated and
        // `subtype` as a two-letter code; prefer the readable one.
        let doc_type = [text(entry, "subtypeDescription"), text(entry, "subtype")]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| "Article".to_string());

        let (article_url, cites_url) = parse_links(entry.get("link"));

        let citation_url = if scopus_id.is_empty() {
            String::new()
        } else {
            format!(
                "https://api.elsevier.com/content/abstract/scopus_id/{}",
                scopus_id
            )
        };

        let cites_per_year = match year {
            Some(y) if y < now_year => round2(cites as f64 / (now_year - y) as f64),
            _ => cites as f64,
        };
        let cites_per_author = if author_names.is_empty() {
            cites as f64
        } else {
            round2(cites as f64 / author_names.len() as f64)
        };

        PaperRecord {
            cites,
            authors,
            title: text(entry, "dc:title"),
            year,
            source: text(entry, "prism:publicationName"),
            publisher: text(entry, "prism:publisher"),
            article_url,
            cites_url,
            gs_rank: String::new(),
            query_date: queried_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            doc_type,
            doi: text(entry, "prism:doi"),
            issn: text(entry, "prism:issn"),
            citation_url,
            volume: text(entry, "prism:volume"),
            issue: text(entry, "prism:issueIdentifier"),
            start_page: text(entry, "prism:startingPage"),
            end_page: text(entry, "prism:endingPage"),
            ecc: String::new(),
            cites_per_year,
            cites_per_author,
            author_count: author_names.len(),
            age: year.map(|y| now_year - y),
            abstract_text: text(entry, "dc:description"),
            full_text_url: String::new(),
            related_url: String::new(),
            scopus_id,
            eid: text(entry, "eid"),
        }
    }
}

/// Column order of the export schema.
pub const CSV_HEADER: [&str; 28] = [
    "Cites",
    "Authors",
    "Title",
    "Year",
    "Source",
    "Publisher",
    "ArticleURL",
    "CitesURL",
    "GSRank",
    "QueryDate",
    "Type",
    "DOI",
    "ISSN",
    "CitationURL",
    "Volume",
    "Issue",
    "StartPage",
    "EndPage",
    "ECC",
    "CitesPerYear",
    "CitesPerAuthor",
    "AuthorCount",
    "Age",
    "Abstract",
    "FullTextURL",
    "RelatedURL",
    "ScopusID",
    "EID",
];

/// Write a year's records as one CSV artifact, creating parent
/// directories as needed. An existing file is overwritten; a year with
/// zero results still gets a header-only file so downstream tooling
/// sees one artifact per year.
pub fn write_csv(records: &[PaperRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create output directory `{}`", parent.display()))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("cannot create `{}`", path.display()))?;
    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing `{}`", path.display()))?;
    Ok(())
}

fn text(entry: &Value, key: &str) -> String {
    entry
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn count_value(v: &Value) -> u64 {
    match v {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// `dc:creator` is a single string in the standard view (possibly
/// semicolon-separated) and an array of author objects in the complete
/// view.
fn parse_creators(creator: Option<&Value>) -> Vec<String> {
    match creator {
        Some(Value::String(s)) => s
            .split(';')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(authors)) => authors
            .iter()
            .filter_map(|author| match author {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => {
                    let given = text(author, "given-name");
                    let surname = text(author, "surname");
                    match (given.is_empty(), surname.is_empty()) {
                        (false, false) => Some(format!("{} {}", given, surname)),
                        (true, false) => Some(surname),
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// The `link` array carries several related URLs keyed by `@ref`; pick
/// the article page and the cited-by page.
fn parse_links(link: Option<&Value>) -> (String, String) {
    let links: Vec<&Value> = match link {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    };
    let mut article_url = String::new();
    let mut cites_url = String::new();
    for l in links {
        match l.get("@ref").and_then(Value::as_str) {
            Some("scopus") => article_url = text(l, "@href"),
            Some("scopus-citedby") => cites_url = text(l, "@href"),
            _ => {}
        }
    }
    (article_url, cites_url)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
