//! Dialing-code directory.
//!
//! Country metadata comes from the REST Countries API and is cached for a
//! configurable TTL. Any upstream failure falls back to a small static
//! table, which is served but never cached, so the next request retries.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Upper bound on one upstream refresh. Callers queue behind the refresh,
/// so a hung upstream must not hold them longer than this.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One entry of the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code (e.g., `US`).
    pub code: String,
    pub name: String,
    /// Calling code (e.g., `+1`).
    pub dial_code: String,
    pub emoji: String,
    /// Flag image URL.
    pub flag: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CountryError {
    #[error("country source request failed: {0}")]
    Transport(String),
    #[error("country source returned {0}")]
    Status(u16),
    #[error("country source returned no usable entries")]
    Empty,
    #[error("country source timed out after {0:?}")]
    Timeout(Duration),
}

/// Upstream list of countries.
#[async_trait::async_trait]
pub trait CountrySource: Send + Sync + std::fmt::Debug {
    async fn fetch(&self) -> Result<Vec<Country>, CountryError>;
}

/// REST Countries v3.1 (`/all?fields=name,cca2,idd,flags`).
#[derive(Debug, Clone)]
pub struct RestCountries {
    http: reqwest::Client,
    url: String,
}

impl RestCountries {
    pub fn new(url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(name: "countries.client.default", error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            http,
            url: url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCountry {
    cca2: String,
    name: RawName,
    #[serde(default)]
    idd: RawIdd,
    #[serde(default)]
    flags: RawFlags,
}

#[derive(Debug, Deserialize)]
struct RawName {
    common: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawIdd {
    #[serde(default)]
    root: String,
    #[serde(default)]
    suffixes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFlags {
    #[serde(default)]
    png: String,
}

#[async_trait::async_trait]
impl CountrySource for RestCountries {
    async fn fetch(&self) -> Result<Vec<Country>, CountryError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CountryError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CountryError::Status(resp.status().as_u16()));
        }
        let raw: Vec<RawCountry> = resp
            .json()
            .await
            .map_err(|e| CountryError::Transport(e.to_string()))?;
        Ok(transform(raw))
    }
}

/// Map upstream entries, drop those without a calling code and sort by
/// name.
fn transform(raw: Vec<RawCountry>) -> Vec<Country> {
    let mut countries: Vec<Country> = raw
        .into_iter()
        .map(|c| {
            let suffix = c.idd.suffixes.first().map(String::as_str).unwrap_or_default();
            Country {
                dial_code: format!("{}{suffix}", c.idd.root),
                emoji: flag_emoji(&c.cca2),
                code: c.cca2,
                name: c.name.common,
                flag: c.flags.png,
            }
        })
        .filter(|c| !c.dial_code.is_empty())
        .collect();
    countries.sort_by_cached_key(|c| c.name.to_lowercase());
    countries
}

/// Regional-indicator flag for an alpha-2 code.
pub fn flag_emoji(code: &str) -> String {
    code.chars()
        .filter(char::is_ascii_alphabetic)
        .filter_map(|c| char::from_u32(0x1F1A5 + u32::from(c.to_ascii_uppercase())))
        .collect()
}

fn entry(code: &str, name: &str, dial_code: &str) -> Country {
    Country {
        code: code.to_string(),
        name: name.to_string(),
        dial_code: dial_code.to_string(),
        emoji: flag_emoji(code),
        flag: format!("https://flagcdn.com/w40/{}.png", code.to_lowercase()),
    }
}

/// United States.
pub fn default_country() -> Country {
    entry("US", "United States", "+1")
}

/// Served when the upstream source is unavailable.
pub fn fallback_countries() -> Vec<Country> {
    vec![
        default_country(),
        entry("GB", "United Kingdom", "+44"),
        entry("CA", "Canada", "+1"),
        entry("AU", "Australia", "+61"),
        entry("IN", "India", "+91"),
    ]
}

/// Cached view over a [`CountrySource`].
#[derive(Debug)]
pub struct CountryDirectory {
    source: Arc<dyn CountrySource>,
    ttl: Duration,
    cache: RwLock<Option<(Instant, Arc<Vec<Country>>)>>,
}

impl CountryDirectory {
    pub fn new(source: Arc<dyn CountrySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// All countries, from cache while fresh.
    pub async fn list(&self) -> Arc<Vec<Country>> {
        if let Some((fetched, countries)) = self.cache.read().await.as_ref() {
            if fetched.elapsed() < self.ttl {
                return Arc::clone(countries);
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited.
        if let Some((fetched, countries)) = cache.as_ref() {
            if fetched.elapsed() < self.ttl {
                return Arc::clone(countries);
            }
        }

        let fetched = tokio::time::timeout(FETCH_TIMEOUT, self.source.fetch())
            .await
            .unwrap_or(Err(CountryError::Timeout(FETCH_TIMEOUT)));
        match fetched {
            Ok(countries) if !countries.is_empty() => {
                tracing::info!(name: "countries.fetched", count = countries.len(), "Country list refreshed");
                let countries = Arc::new(countries);
                *cache = Some((Instant::now(), Arc::clone(&countries)));
                countries
            }
            Ok(_) => {
                tracing::warn!(name: "countries.fallback", error = %CountryError::Empty, "Using static country list");
                Arc::new(fallback_countries())
            }
            Err(e) => {
                tracing::warn!(name: "countries.fallback", error = %e, "Using static country list");
                Arc::new(fallback_countries())
            }
        }
    }

    /// Case-insensitive lookup by alpha-2 code.
    pub async fn by_code(&self, code: &str) -> Option<Country> {
        self.list()
            .await
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .cloned()
    }

    /// First country using `dial_code`.
    pub async fn by_dial_code(&self, dial_code: &str) -> Option<Country> {
        self.list()
            .await
            .iter()
            .find(|c| c.dial_code == dial_code)
            .cloned()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeSource;
    use super::*;

    /// Never answers.
    #[derive(Debug)]
    struct HangingSource;

    #[async_trait::async_trait]
    impl CountrySource for HangingSource {
        async fn fetch(&self) -> Result<Vec<Country>, CountryError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_source_falls_back_after_timeout() {
        let dir = CountryDirectory::new(Arc::new(HangingSource), Duration::from_secs(60));
        let started = Instant::now();

        let (first, second) = tokio::join!(dir.list(), dir.list());
        assert_eq!(first.as_ref(), &fallback_countries());
        assert_eq!(second.as_ref(), &fallback_countries());
        // Each queued refresh gives up on its own.
        assert!(started.elapsed() <= FETCH_TIMEOUT * 2);
    }

    fn raw(json: serde_json::Value) -> Vec<RawCountry> {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_transform() {
        let countries = transform(raw(serde_json::json!([
            { "cca2": "gb", "name": { "common": "United Kingdom" },
              "idd": { "root": "+4", "suffixes": ["4"] }, "flags": { "png": "gb.png" } },
            { "cca2": "AQ", "name": { "common": "Antarctica" }, "idd": {}, "flags": { "png": "aq.png" } },
            { "cca2": "DE", "name": { "common": "Germany" },
              "idd": { "root": "+4", "suffixes": ["9"] }, "flags": { "png": "de.png" } }
        ])));

        let names: Vec<&str> = countries.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Germany", "United Kingdom"]);
        assert_eq!(countries[1].dial_code, "+44");
        assert_eq!(countries[1].emoji, "\u{1F1EC}\u{1F1E7}");
    }

    #[test]
    fn test_fallback_table() {
        let fallback = fallback_countries();
        let codes: Vec<&str> = fallback.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["US", "GB", "CA", "AU", "IN"]);
        assert_eq!(default_country().emoji, "\u{1F1FA}\u{1F1F8}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_honours_ttl() {
        let source = Arc::new(FakeSource::serving(vec![default_country()]));
        let dir = CountryDirectory::new(Arc::clone(&source) as Arc<dyn CountrySource>, Duration::from_secs(60));

        dir.list().await;
        dir.list().await;
        assert_eq!(source.fetches(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        dir.list().await;
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_failure_falls_back_without_caching() {
        let source = Arc::new(FakeSource::failing());
        let dir = CountryDirectory::new(Arc::clone(&source) as Arc<dyn CountrySource>, Duration::from_secs(60));

        assert_eq!(dir.list().await.len(), 5);
        assert_eq!(dir.list().await.len(), 5);
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_lookups() {
        let dir = CountryDirectory::new(Arc::new(FakeSource::failing()), Duration::from_secs(60));
        assert_eq!(dir.by_code("gb").await.unwrap().name, "United Kingdom");
        assert_eq!(dir.by_dial_code("+1").await.unwrap().code, "US");
        assert!(dir.by_code("zz").await.is_none());
    }
}
