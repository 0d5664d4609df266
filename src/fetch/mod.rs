use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;

pub mod record;
pub mod scopus;

/// Detail level requested from the search API. `Standard` returns basic
/// metadata only (first author, no abstract); `Complete` includes
/// abstracts but requires premium API access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Standard,
    Complete,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Standard => "standard",
            View::Complete => "complete",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(View::Standard),
            "complete" => Ok(View::Complete),
            other => anyhow::bail!("unknown view `{}` (expected standard or complete)", other),
        }
    }
}

/// One year's fetch-and-persist operation. Implementations own all API
/// communication, pagination and serialization; on success a complete
/// artifact exists at `out_path`, on failure the filesystem state for
/// that year is unspecified. Callers only observe the returned result.
pub trait FetchClient {
    fn fetch_year(
        &self,
        year: i32,
        view: View,
        out_path: &Path,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_round_trips_through_str() {
        assert_eq!("standard".parse::<View>().unwrap(), View::Standard);
        assert_eq!("complete".parse::<View>().unwrap(), View::Complete);
        assert_eq!(View::Standard.as_str(), "standard");
        assert!("full".parse::<View>().is_err());
    }
}
