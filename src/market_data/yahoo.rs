// =============================================================================
// Yahoo Finance chart client
// =============================================================================
//
// GET {base_url}/v8/finance/chart/{ticker}?range={period}&interval={interval}
//
// The chart payload is column-oriented:
//
//   chart.result[0].timestamp              -> [epoch seconds]
//   chart.result[0].indicators.quote[0]    -> { open: [..], high: [..], ... }
//
// which maps directly onto a `RawTable` with the timestamps as index.  Gaps
// arrive as JSON nulls and are left for the normalizer to absorb.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::market_data::{HistoryProvider, RawTable};
use crate::runtime_config::ProviderConfig;

const QUOTE_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// HTTP client for the Yahoo Finance chart endpoint.
#[derive(Clone)]
pub struct YahooProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooProvider {
    pub fn new(cfg: &ProviderConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        // The chart endpoint rejects requests without a browser-like agent.
        default_headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = cfg.base_url.trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "YahooProvider initialised");

        Ok(Self { base_url, client })
    }

    /// GET /v8/finance/chart/{ticker}.
    #[instrument(skip(self), name = "yahoo::get_chart")]
    async fn get_chart(&self, ticker: &str, period: &str, interval: &str) -> Result<RawTable> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);

        let resp = self
            .client
            .get(&url)
            .query(&[("range", period), ("interval", interval)])
            .send()
            .await
            .context("GET /v8/finance/chart request failed")?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .context("failed to parse chart response")?;

        if !status.is_success() {
            anyhow::bail!("chart endpoint returned {}: {}", status, body["chart"]["error"]);
        }

        let table = parse_chart(&body)?;
        debug!(ticker, rows = table.row_count(), "chart fetched");
        Ok(table)
    }
}

#[async_trait]
impl HistoryProvider for YahooProvider {
    async fn fetch_history(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> Option<RawTable> {
        match self.get_chart(ticker, period, interval).await {
            Ok(table) if !table.is_empty() => Some(table),
            Ok(_) => {
                warn!(ticker, period, interval, "provider returned no bars");
                None
            }
            Err(e) => {
                warn!(ticker, period, interval, error = %e, "history fetch failed");
                None
            }
        }
    }
}

/// Map a chart payload into a `RawTable`.
pub fn parse_chart(body: &Value) -> Result<RawTable> {
    let result = body["chart"]["result"]
        .get(0)
        .context("chart response missing 'result'")?;

    let timestamps = result["timestamp"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let quote = &result["indicators"]["quote"][0];
    let mut table = RawTable::new(Some(timestamps));
    for field in QUOTE_FIELDS {
        if let Some(values) = quote[field].as_array() {
            table = table.with_column(field, values.clone());
        } else if field != "volume" {
            anyhow::bail!("chart quote missing '{field}'");
        }
    }
    Ok(table)
}
