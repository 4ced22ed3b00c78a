//! Website traffic estimation
//!
//! Renders a domain's analytics page, reads the monthly visit count and
//! buckets it into a [`TrafficTier`]. Estimation never fails: a page that
//! cannot be read yields the `-1` sentinel and the `Unparseable` tier.

use crate::config::env_secs;
use crate::error::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Element holding the monthly visit count on the analytics page.
pub const TOTAL_VISITS_SELECTOR: &str = r#"[data-testid="total-visits-value"]"#;

pub const DEFAULT_BASE_URL: &str = "https://www.similarweb.com/website/";

/// Value of `estimated_visits` when no figure could be read.
pub const UNPARSEABLE: f64 = -1.0;

const NOT_FOUND_PREFIX: &str = "Not found or blocked";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/124.0 Safari/537.36";

static TRAFFIC_FIGURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\d.,]+)([KMB]?)").expect("static regex"));
static TEST_ID_SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\[data-testid="([^"]+)"\]$"#).expect("static regex"));
static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex"));

/// Qualitative traffic bucket, ordered from least to most traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficTier {
    Unparseable,
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl TrafficTier {
    /// Bucket a monthly visit estimate. Negative and NaN map to
    /// [`TrafficTier::Unparseable`].
    #[must_use]
    pub fn from_estimate(visits: f64) -> Self {
        if visits >= 1e8 {
            Self::VeryHigh
        } else if visits >= 1e7 {
            Self::High
        } else if visits >= 1e6 {
            Self::Medium
        } else if visits >= 1e5 {
            Self::Low
        } else if visits >= 0.0 {
            Self::VeryLow
        } else {
            Self::Unparseable
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::VeryHigh => "very high traffic (>= 100M/month)",
            Self::High => "high traffic (10M ~ 100M/month)",
            Self::Medium => "medium traffic (1M ~ 10M/month)",
            Self::Low => "low traffic (100K ~ 1M/month)",
            Self::VeryLow => "very low traffic (< 100K/month)",
            Self::Unparseable => "unparseable",
        }
    }
}

/// Traffic figure for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficEstimate {
    pub domain: String,
    /// Text as scraped, or the failure reason.
    pub raw_traffic: String,
    pub estimated_visits: f64,
    pub tier: TrafficTier,
}

impl TrafficEstimate {
    /// Parse a scraped figure.
    #[must_use]
    pub fn from_text(domain: &str, raw: &str) -> Self {
        let estimated_visits = parse_traffic(raw);
        Self {
            domain: domain.to_string(),
            raw_traffic: raw.to_string(),
            estimated_visits,
            tier: TrafficTier::from_estimate(estimated_visits),
        }
    }

    fn not_found(domain: &str, reason: &Error) -> Self {
        Self {
            domain: domain.to_string(),
            raw_traffic: format!("{NOT_FOUND_PREFIX} ({reason})"),
            estimated_visits: UNPARSEABLE,
            tier: TrafficTier::Unparseable,
        }
    }

    /// True when the page could not be read at all, as opposed to read
    /// but unparseable.
    #[must_use]
    pub fn scrape_failed(&self) -> bool {
        self.raw_traffic.starts_with(NOT_FOUND_PREFIX)
    }

    /// One-line verdict for reports.
    #[must_use]
    pub fn conclusion(&self) -> &'static str {
        if self.scrape_failed() {
            "undetermined (scrape failed)"
        } else {
            self.tier.label()
        }
    }
}

/// Parse figures such as `1.2M`, `350k` or `2,345`.
///
/// Leading and trailing whitespace is ignored, the suffix is
/// case-insensitive and thousands separators are allowed. Returns
/// [`UNPARSEABLE`] when no figure can be read.
#[must_use]
pub fn parse_traffic(text: &str) -> f64 {
    let text = text.trim().to_uppercase();
    let Some(caps) = TRAFFIC_FIGURE.captures(&text) else {
        return UNPARSEABLE;
    };

    let Ok(number) = caps[1].replace(',', "").parse::<f64>() else {
        return UNPARSEABLE;
    };

    let scale = match &caps[2] {
        "K" => 1e3,
        "M" => 1e6,
        "B" => 1e9,
        _ => 1.0,
    };
    number * scale
}

/// Starts isolated page-rendering sessions.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    type Page: RenderedPage;

    /// A fresh session; nothing is shared with earlier launches.
    async fn launch(&self) -> Result<Self::Page>;
}

/// One open page.
#[async_trait]
pub trait RenderedPage: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Visible text of the first element matching `selector`, if it has
    /// rendered yet.
    async fn text_of(&mut self, selector: &str) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// How long to wait for the visit count to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl Readiness {
    /// Defaults with the timeout taken from `TRAFFIC_READY_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the variable is not a number.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Ok(Self {
            timeout: env_secs("TRAFFIC_READY_TIMEOUT_SECS", defaults.timeout)?,
            ..defaults
        })
    }
}

/// Poll `selector` until it has non-empty text, backing off
/// exponentially, or fail once `readiness.timeout` has elapsed.
async fn wait_for_text<P: RenderedPage>(
    page: &mut P,
    selector: &str,
    readiness: Readiness,
) -> Result<String> {
    let deadline = Instant::now() + readiness.timeout;
    let mut backoff = readiness.initial_backoff;

    loop {
        if let Some(text) = page.text_of(selector).await? {
            let text = text.trim();
            if !text.is_empty() {
                return Ok(text.to_string());
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout {
                operation: "waiting for traffic figure",
                after: readiness.timeout,
            });
        }

        debug!("{} not rendered yet, retrying in {:?}", selector, backoff);
        tokio::time::sleep(backoff.min(deadline - now)).await;
        backoff = (backoff * 2).min(readiness.max_backoff);
    }
}

/// Scrapes traffic figures through a [`PageRenderer`].
pub struct TrafficEstimator<R> {
    renderer: R,
    readiness: Readiness,
    base_url: String,
}

impl TrafficEstimator<HttpRenderer> {
    /// Estimator over plain HTTP with readiness settings from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on a malformed readiness timeout.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(HttpRenderer::default()).with_readiness(Readiness::from_env()?))
    }
}

impl<R: PageRenderer> TrafficEstimator<R> {
    #[must_use]
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            readiness: Readiness::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub const fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Serve pages from another host, e.g. a local fixture server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn page_url(&self, domain: &str) -> String {
        format!("{}{}/", self.base_url, domain)
    }

    /// Estimate monthly visits for `domain`.
    ///
    /// The rendering session is closed on every path once launched.
    pub async fn estimate(&self, domain: &str) -> TrafficEstimate {
        let domain = domain.trim();

        let mut page = match self.renderer.launch().await {
            Ok(page) => page,
            Err(e) => {
                warn!(domain, "Could not start rendering session: {}", e);
                return TrafficEstimate::not_found(domain, &e);
            }
        };

        let scraped = self.scrape(&mut page, domain).await;

        if let Err(e) = page.close().await {
            warn!("Error closing rendering session: {}", e);
        }

        match scraped {
            Ok(text) => {
                let estimate = TrafficEstimate::from_text(domain, &text);
                info!(
                    domain,
                    raw = %estimate.raw_traffic,
                    visits = estimate.estimated_visits,
                    "Traffic estimated"
                );
                estimate
            }
            Err(e) => {
                warn!(domain, "Traffic figure not found: {}", e);
                TrafficEstimate::not_found(domain, &e)
            }
        }
    }

    async fn scrape(&self, page: &mut R::Page, domain: &str) -> Result<String> {
        page.navigate(&self.page_url(domain)).await?;
        wait_for_text(page, TOTAL_VISITS_SELECTOR, self.readiness).await
    }
}

/// Static-HTML fallback for [`PageRenderer`].
///
/// Fetches each page once and reads elements from the server-side
/// markup; no JavaScript runs, so figures rendered client-side never
/// appear. Only `[data-testid="..."]` selectors are supported. Every
/// launch builds its own HTTP client.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    pub request_timeout: Duration,
}

impl Default for HttpRenderer {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
        }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    type Page = HttpPage;

    async fn launch(&self) -> Result<HttpPage> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(HttpPage {
            client,
            html: None,
        })
    }
}

pub struct HttpPage {
    client: reqwest::Client,
    html: Option<String>,
}

#[async_trait]
impl RenderedPage for HttpPage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!("Fetching {}", url);
        self.html = None;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(Error::Scrape(format!("blocked by provider (HTTP {status})")));
        }
        self.html = Some(response.error_for_status()?.text().await?);
        Ok(())
    }

    /// Reads the markup fetched by the last `navigate`.
    async fn text_of(&mut self, selector: &str) -> Result<Option<String>> {
        let test_id = TEST_ID_SELECTOR
            .captures(selector)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| Error::Scrape(format!("Unsupported selector: {selector}")))?;

        let html = self
            .html
            .as_deref()
            .ok_or_else(|| Error::Scrape("No page loaded".into()))?;
        Ok(text_by_test_id(html, &test_id))
    }

    async fn close(&mut self) -> Result<()> {
        self.html = None;
        Ok(())
    }
}

/// Text content of the first element carrying `data-testid="<test_id>"`.
fn text_by_test_id(html: &str, test_id: &str) -> Option<String> {
    let pattern = format!(
        r#"(?s)data-testid\s*=\s*["']{}["'][^>]*>(.*?)</"#,
        regex::escape(test_id)
    );
    let element = Regex::new(&pattern).ok()?;
    let inner = element.captures(html)?.get(1)?.as_str();
    let text = MARKUP.replace_all(inner, "");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
