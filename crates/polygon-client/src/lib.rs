use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use forecast_core::{Bar, BarInterval, BarSeries, ForecastError, HistoryPeriod, MarketDataSource};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";

/// Minute bars are looked up over this many calendar days so a weekend or
/// holiday still leaves a session to take the latest bar from.
const LATEST_BAR_LOOKBACK_DAYS: i64 = 4;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).saturating_duration_since(now) + Duration::from_millis(50),
                None => Duration::from_millis(50),
            };
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Polygon.io aggregates client; the production `MarketDataSource`.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // Default 500 req/min for Starter plan. Free tier users should set POLYGON_RATE_LIMIT=5.
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);
        Self::with_rate_limit(api_key, rate_limit)
    }

    pub fn with_rate_limit(api_key: String, requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(requests_per_minute, Duration::from_secs(60)),
        }
    }

    /// Point the client at another host (a proxy or a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ForecastError> {
        let request = builder.build().map_err(|e| ForecastError::DataUnavailable(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| ForecastError::DataUnavailable("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| ForecastError::DataUnavailable(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!("Polygon 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(ForecastError::DataUnavailable("Rate limited by Polygon after 3 retries".to_string()))
    }

    /// Get aggregates (bars) for a symbol, oldest first.
    pub async fn get_aggregates(
        &self,
        symbol: &str,
        multiplier: u32,
        timespan: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ForecastError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            symbol,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(ForecastError::DataUnavailable(format!(
                "{}: HTTP {}: {}",
                symbol,
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let agg_response: AggregateResponse = response
            .json()
            .await
            .map_err(|e| ForecastError::DataUnavailable(format!("{}: {}", symbol, e)))?;

        Ok(agg_response.into_bars())
    }
}

#[async_trait]
impl MarketDataSource for PolygonClient {
    async fn get_history(
        &self,
        symbol: &str,
        period: HistoryPeriod,
        interval: BarInterval,
    ) -> Result<BarSeries, ForecastError> {
        let (multiplier, timespan) = aggregate_span(interval);
        let to = Utc::now();
        let from = to - ChronoDuration::days(period.to_days());

        let bars = self.get_aggregates(symbol, multiplier, timespan, from, to).await?;
        if bars.is_empty() {
            return Err(ForecastError::DataUnavailable(format!("no bars returned for {}", symbol)));
        }
        tracing::debug!(symbol, bars = bars.len(), timespan, "Fetched history");
        BarSeries::from_unsorted(bars).map_err(|e| ForecastError::DataUnavailable(format!("{}: {}", symbol, e)))
    }

    async fn get_latest_bar(&self, symbol: &str) -> Result<Bar, ForecastError> {
        let to = Utc::now();
        let from = to - ChronoDuration::days(LATEST_BAR_LOOKBACK_DAYS);
        let bars = self.get_aggregates(symbol, 1, "minute", from, to).await?;
        bars.into_iter()
            .max_by_key(|b| b.timestamp)
            .ok_or_else(|| ForecastError::DataUnavailable(format!("no recent bars for {}", symbol)))
    }
}

/// Polygon `(multiplier, timespan)` for a bar interval.
pub fn aggregate_span(interval: BarInterval) -> (u32, &'static str) {
    match interval {
        BarInterval::Minute1 => (1, "minute"),
        BarInterval::Minute5 => (5, "minute"),
        BarInterval::Minute15 => (15, "minute"),
        BarInterval::Minute30 => (30, "minute"),
        BarInterval::Hour1 => (1, "hour"),
        BarInterval::Day1 => (1, "day"),
    }
}

// Polygon API response types

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp, ms since epoch
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    v: f64, // volume
}

impl AggregateResponse {
    /// Rows with an unrepresentable timestamp are dropped.
    fn into_bars(self) -> Vec<Bar> {
        self.results
            .into_iter()
            .filter_map(|r| {
                let timestamp = DateTime::from_timestamp_millis(r.t)?.naive_utc();
                Some(Bar {
                    timestamp,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v.max(0.0).round() as u64,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_aggregate_response_to_bars() {
        let body = r#"{
            "ticker": "AAPL",
            "status": "OK",
            "results": [
                {"t": 1704171600000, "o": 187.15, "h": 188.44, "l": 183.89, "c": 185.64, "v": 82488674.0, "vw": 185.9},
                {"t": 1704258000000, "o": 184.22, "h": 185.88, "l": 183.43, "c": 184.25, "v": 58414460.6}
            ]
        }"#;
        let response: AggregateResponse = serde_json::from_str(body).unwrap();
        let bars = response.into_bars();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[0].close, 185.64);
        assert_eq!(bars[1].volume, 58_414_461);
    }

    #[test]
    fn test_missing_results_is_empty() {
        let response: AggregateResponse = serde_json::from_str(r#"{"status": "OK", "resultsCount": 0}"#).unwrap();
        assert!(response.into_bars().is_empty());
    }

    #[test]
    fn test_aggregate_span() {
        assert_eq!(aggregate_span(BarInterval::Day1), (1, "day"));
        assert_eq!(aggregate_span(BarInterval::Minute15), (15, "minute"));
        assert_eq!(aggregate_span(BarInterval::Hour1), (1, "hour"));
    }

    #[test]
    fn test_base_url_override() {
        let client = PolygonClient::with_rate_limit("key".to_string(), 5).with_base_url("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_rate_limiter_admits_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_millis(500), limiter.acquire())
                .await
                .expect("slot available");
        }
        assert!(tokio::time::timeout(Duration::from_millis(100), limiter.acquire())
            .await
            .is_err());
    }
}
