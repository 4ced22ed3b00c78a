//! Agent-facing tools
//!
//! The orchestration engine calls tools with one string argument and
//! expects one string back. These wrappers adapt the traffic estimator
//! and the trend lookup to that shape.

use crate::traffic::{PageRenderer, TrafficEstimate, TrafficEstimator};
use crate::trend::{TrendLookup, TrendSource};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

/// A callable tool exposed to the agent engine.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// What the single argument means.
    fn argument_description(&self) -> &'static str;

    async fn run(&self, argument: &str) -> String;

    /// Name, description and argument schema as the engine registers them.
    fn describe(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "args_schema": {
                "type": "object",
                "properties": {
                    "argument": {
                        "type": "string",
                        "description": self.argument_description(),
                    }
                },
                "required": ["argument"],
            }
        })
    }
}

#[derive(Debug, Serialize)]
struct TrafficReport<'a> {
    domain: &'a str,
    raw_traffic: &'a str,
    estimated_visits: f64,
    conclusion: &'a str,
}

impl<'a> From<&'a TrafficEstimate> for TrafficReport<'a> {
    fn from(estimate: &'a TrafficEstimate) -> Self {
        Self {
            domain: &estimate.domain,
            raw_traffic: &estimate.raw_traffic,
            estimated_visits: estimate.estimated_visits,
            conclusion: estimate.conclusion(),
        }
    }
}

/// Monthly visit estimate for a domain, as JSON.
pub struct WebsiteTrafficTool<R> {
    estimator: TrafficEstimator<R>,
}

impl<R: PageRenderer> WebsiteTrafficTool<R> {
    #[must_use]
    pub const fn new(estimator: TrafficEstimator<R>) -> Self {
        Self { estimator }
    }
}

#[async_trait]
impl<R: PageRenderer> AgentTool for WebsiteTrafficTool<R> {
    fn name(&self) -> &'static str {
        "WebsiteTrafficTool"
    }

    fn description(&self) -> &'static str {
        "Get the website traffic data for a given domain using SimilarWeb."
    }

    fn argument_description(&self) -> &'static str {
        "Target website domain, like 'google.com'"
    }

    async fn run(&self, argument: &str) -> String {
        let estimate = self.estimator.estimate(argument).await;
        serde_json::to_string_pretty(&TrafficReport::from(&estimate))
            .unwrap_or_else(|e| format!("Error encoding traffic estimate: {e}"))
    }
}

/// Google Trends summary for a search term.
pub struct GoogleTrendTool<S> {
    lookup: TrendLookup<S>,
}

impl<S: TrendSource> GoogleTrendTool<S> {
    #[must_use]
    pub const fn new(lookup: TrendLookup<S>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl<S: TrendSource> AgentTool for GoogleTrendTool<S> {
    fn name(&self) -> &'static str {
        "GoogleTrendTool"
    }

    fn description(&self) -> &'static str {
        "Get the latest Google Trends data for a given query."
    }

    fn argument_description(&self) -> &'static str {
        "The search term to get Google Trends data for."
    }

    async fn run(&self, argument: &str) -> String {
        self.lookup.lookup(argument).await.to_string()
    }
}
