//! Google Trends lookup
//!
//! [`TrendLookup`] asks a [`TrendSource`] for the interest-over-time
//! series and related queries of a search term and summarizes them. The
//! result is a tagged [`TrendOutcome`]; its `Display` form is the single
//! string handed to agent tools.

use crate::config::TrendConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search";

const NO_DATA_MESSAGE: &str = "No good Trend Result was found";

/// One point of an interest-over-time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Period label as reported by the source, e.g. `Jan 1 – 7, 2024`.
    pub date: String,
    pub value: f64,
}

/// Raw data returned by a [`TrendSource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendData {
    pub query: String,
    pub points: Vec<TrendPoint>,
    pub rising: Vec<String>,
    pub top: Vec<String>,
}

/// Provides trend data for a search term.
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn fetch(&self, term: &str) -> Result<TrendData>;
}

/// Summary statistics of a trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub query: String,
    pub date_from: String,
    pub date_to: String,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    /// `(last - first) / first * 100`, or `last - first` when the first
    /// value is zero.
    pub percent_change: f64,
    pub values: Vec<f64>,
    pub rising: Vec<String>,
    pub top: Vec<String>,
}

impl TrendReport {
    /// Summarize `data`; `None` when the series is empty.
    #[must_use]
    pub fn from_data(data: TrendData) -> Option<Self> {
        let first = data.points.first()?;
        let last = data.points.last()?;
        let values: Vec<f64> = data.points.iter().map(|p| p.value).collect();

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        #[allow(clippy::cast_precision_loss)]
        let average = values.iter().sum::<f64>() / values.len() as f64;
        let percent_change = if first.value.abs() < f64::EPSILON {
            last.value - first.value
        } else {
            (last.value - first.value) / first.value * 100.0
        };

        Some(Self {
            query: data.query,
            date_from: first.date.clone(),
            date_to: last.date.clone(),
            min,
            max,
            average,
            percent_change,
            values,
            rising: data.rising,
            top: data.top,
        })
    }
}

impl fmt::Display for TrendReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self
            .values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        writeln!(f, "Query: {}", self.query)?;
        writeln!(f, "Date From: {}", self.date_from)?;
        writeln!(f, "Date To: {}", self.date_to)?;
        writeln!(f, "Min Value: {}", self.min)?;
        writeln!(f, "Max Value: {}", self.max)?;
        writeln!(f, "Average Value: {:.2}", self.average)?;
        writeln!(f, "Percent Change: {:.2}%", self.percent_change)?;
        writeln!(f, "Trend values: {values}")?;
        writeln!(f, "Rising Related Queries: {}", self.rising.join(", "))?;
        write!(f, "Top Related Queries: {}", self.top.join(", "))
    }
}

/// Result of a trend lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TrendOutcome {
    Found(TrendReport),
    NoData,
    /// The lookup itself failed; carries the reason.
    Failed(String),
}

impl fmt::Display for TrendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(report) => fmt::Display::fmt(report, f),
            Self::NoData => f.write_str(NO_DATA_MESSAGE),
            Self::Failed(reason) => write!(f, "Error performing search: {reason}"),
        }
    }
}

/// Looks up search-term trends without ever failing.
pub struct TrendLookup<S> {
    source: S,
}

impl TrendLookup<SerpApiTrends> {
    /// Lookup backed by SerpAPI, keyed from `SERPAPI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the key is not set.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(SerpApiTrends::new(TrendConfig::from_env()?)))
    }
}

impl<S: TrendSource> TrendLookup<S> {
    #[must_use]
    pub const fn new(source: S) -> Self {
        Self { source }
    }

    pub async fn lookup(&self, term: &str) -> TrendOutcome {
        let term = term.trim();
        match self.source.fetch(term).await {
            Ok(data) => match TrendReport::from_data(data) {
                Some(report) => {
                    info!(term, points = report.values.len(), "Trend data found");
                    TrendOutcome::Found(report)
                }
                None => {
                    debug!(term, "Trend source returned no data");
                    TrendOutcome::NoData
                }
            },
            Err(e) => {
                warn!(term, "Trend lookup failed: {}", e);
                TrendOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Google Trends through the SerpAPI `google_trends` engine.
#[derive(Debug, Clone)]
pub struct SerpApiTrends {
    config: TrendConfig,
    endpoint: String,
    timeout: Duration,
}

impl SerpApiTrends {
    #[must_use]
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            endpoint: SERPAPI_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn query(
        &self,
        client: &reqwest::Client,
        term: &str,
        data_type: &str,
    ) -> Result<SerpResponse> {
        debug!("Querying Google Trends {} for {:?}", data_type, term);
        let response: SerpResponse = client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google_trends"),
                ("q", term),
                ("data_type", data_type),
                ("api_key", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(redact)?
            .json()
            .await
            .map_err(redact)?;
        Ok(response)
    }
}

/// The request URL carries the API key, so it never reaches an error message.
fn redact(err: reqwest::Error) -> Error {
    Error::Http(err.without_url())
}

#[async_trait]
impl TrendSource for SerpApiTrends {
    async fn fetch(&self, term: &str) -> Result<TrendData> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let series = self.query(&client, term, "TIMESERIES").await?;
        let points = series.into_points()?;

        let mut data = TrendData {
            query: term.to_string(),
            points,
            ..TrendData::default()
        };
        if data.points.is_empty() {
            return Ok(data);
        }

        match self
            .query(&client, term, "RELATED_QUERIES")
            .await
            .and_then(SerpResponse::into_related)
        {
            Ok((rising, top)) => {
                data.rising = rising;
                data.top = top;
            }
            Err(e) => warn!("Related queries unavailable for {:?}: {}", term, e),
        }
        Ok(data)
    }
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    error: Option<String>,
    interest_over_time: Option<InterestOverTime>,
    related_queries: Option<RelatedQueries>,
}

#[derive(Debug, Deserialize)]
struct InterestOverTime {
    #[serde(default)]
    timeline_data: Vec<TimelineEntry>,
}

#[derive(Debug, Deserialize)]
struct TimelineEntry {
    date: String,
    #[serde(default)]
    values: Vec<TimelineValue>,
}

#[derive(Debug, Deserialize)]
struct TimelineValue {
    #[serde(default)]
    extracted_value: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RelatedQueries {
    #[serde(default)]
    rising: Vec<RelatedQuery>,
    #[serde(default)]
    top: Vec<RelatedQuery>,
}

#[derive(Debug, Deserialize)]
struct RelatedQuery {
    query: String,
}

impl SerpResponse {
    /// An empty result set is reported as an error payload by SerpAPI.
    fn check(&self) -> Result<()> {
        match &self.error {
            Some(message) if message.contains("hasn't returned any results") => Ok(()),
            Some(message) => Err(Error::Trend(message.clone())),
            None => Ok(()),
        }
    }

    fn into_points(self) -> Result<Vec<TrendPoint>> {
        self.check()?;
        Ok(self
            .interest_over_time
            .map(|iot| iot.timeline_data)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| TrendPoint {
                value: entry.values.first().map_or(0.0, |v| v.extracted_value),
                date: entry.date,
            })
            .collect())
    }

    fn into_related(self) -> Result<(Vec<String>, Vec<String>)> {
        self.check()?;
        let related = self.related_queries.unwrap_or_default();
        let names = |queries: Vec<RelatedQuery>| queries.into_iter().map(|q| q.query).collect();
        Ok((names(related.rising), names(related.top)))
    }
}
