//! Yahoo Finance close-price provider.
//!
//! Uses the v8 chart API. Transient failures (network, 429, 5xx) are retried
//! with a fixed delay; anything else fails immediately.

use super::provider::{ClosePoint, Interval, MarketDataProvider, ProviderError};
use super::retry::RetryPolicy;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
}

impl YahooProvider {
    pub fn new(retry: RetryPolicy) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client: {e}")))?;
        Ok(Self { client, retry })
    }

    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate, interval: Interval) -> String {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let end_ts = end.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval={}",
            interval.as_str()
        )
    }

    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<ClosePoint>, ProviderError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => ProviderError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))?;
        let timestamps = data.timestamp.unwrap_or_default();
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseFormatChanged("no quote data".into()))?;

        let points: Vec<ClosePoint> = timestamps
            .iter()
            .zip(quote.close)
            .filter_map(|(&ts, close)| {
                close.filter(|c| c.is_finite()).map(|close| ClosePoint {
                    timestamp_ms: ts * 1000,
                    close,
                })
            })
            .collect();

        if points.is_empty() {
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(points)
    }

    fn fetch_once(&self, symbol: &str, url: &str) -> Result<Vec<ClosePoint>, ProviderError> {
        let resp = self.client.get(url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ProviderError::NetworkUnreachable(e.to_string())
            } else {
                ProviderError::Unavailable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            ProviderError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;
        Self::parse_response(symbol, chart)
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<ClosePoint>, ProviderError> {
        let url = Self::chart_url(symbol, start, end, interval);
        self.retry
            .run(symbol, || self.fetch_once(symbol, &url), ProviderError::is_transient)
            .map_err(|(e, _)| e)
    }
}
