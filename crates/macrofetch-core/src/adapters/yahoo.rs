use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::fetcher::SeriesFuture;
use crate::http_client::{HttpClient, HttpRequest};
use crate::{DateRange, FetchError, Fetcher, ObservationDate, RawSeries, SeriesPoint, SourceId};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Daily closes from the Yahoo chart endpoint; `value` is the close and the other OHLCV
/// fields become extra columns.
pub struct YahooFetcher {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl YahooFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, symbol: &str, range: DateRange) -> String {
        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(symbol),
            range.start.unix_timestamp(),
            range.end.unix_timestamp() + 86_400,
        )
    }
}

impl Fetcher for YahooFetcher {
    fn fetch_single_series<'a>(&'a self, symbol: &'a str, range: DateRange) -> SeriesFuture<'a> {
        Box::pin(async move {
            let request = HttpRequest::get(self.endpoint(symbol, range))
                .with_header("accept", "application/json")
                .with_timeout(self.timeout);
            let body = super::get_body(self.http_client.as_ref(), request, "yahoo chart").await?;
            parse_chart(symbol, range, &body)
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

fn parse_chart(symbol: &str, range: DateRange, body: &str) -> Result<RawSeries, FetchError> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|error| FetchError::parse(format!("yahoo chart for {symbol}: {error}")))?;

    if let Some(error) = response.chart.error {
        let message = format!("yahoo chart for {symbol}: {} {}", error.code, error.description);
        return Err(if error.code.eq_ignore_ascii_case("not found") {
            FetchError::not_found(message)
        } else {
            FetchError::upstream(message)
        });
    }

    let Some(result) = response.chart.result.and_then(|results| results.into_iter().next())
    else {
        return Ok(RawSeries::empty(symbol, SourceId::Yahoo));
    };
    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut points = Vec::with_capacity(timestamps.len());
    for (index, seconds) in timestamps.into_iter().enumerate() {
        let Some(close) = quote.close.get(index).copied().flatten() else {
            continue;
        };
        if !close.is_finite() {
            continue;
        }
        let date = ObservationDate::from_unix_timestamp(seconds)
            .map_err(|error| FetchError::parse(format!("yahoo chart for {symbol}: {error}")))?;
        if !range.contains(date) {
            continue;
        }

        let mut point = SeriesPoint::new(date, close);
        for (name, column) in [("open", &quote.open), ("high", &quote.high), ("low", &quote.low)] {
            if let Some(value) = column.get(index).copied().flatten() {
                point = point.with_extra(name, value);
            }
        }
        if let Some(volume) = quote.volume.get(index).copied().flatten() {
            point = point.with_extra("volume", volume);
        }
        points.push(point);
    }

    Ok(RawSeries::new(symbol, SourceId::Yahoo, points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::testing::CannedHttpClient;
    use crate::{FetchErrorKind, FieldValue};

    fn january() -> DateRange {
        DateRange::new(
            ObservationDate::parse("2024-01-01").expect("start"),
            ObservationDate::parse("2024-01-31").expect("end"),
        )
        .expect("range")
    }

    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1704153600, 1704240000, 1704326400],
                "indicators": {"quote": [{
                    "open": [185.0, 184.2, null],
                    "high": [186.1, 185.9, null],
                    "low": [183.9, 183.4, null],
                    "close": [185.6, 184.3, null],
                    "volume": [82488700, 58414500, null]
                }]}
            }],
            "error": null
        }
    }"#;

    #[tokio::test]
    async fn parses_closes_and_keeps_ohlcv_as_extras() {
        let client = Arc::new(CannedHttpClient::responding(200, CHART));
        let fetcher = YahooFetcher::new(client.clone()).with_base_url("https://chart.test");

        let series = fetcher
            .fetch_single_series("AAPL", january())
            .await
            .expect("series");

        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].date.to_string(), "2024-01-02");
        assert_eq!(series.points[0].value, 185.6);
        assert_eq!(
            series.points[0].extras.last(),
            Some(&(String::from("volume"), FieldValue::Int(82_488_700)))
        );
        assert!(client
            .last_url()
            .starts_with("https://chart.test/v8/finance/chart/AAPL?period1=1704067200"));
    }

    #[tokio::test]
    async fn chart_without_result_is_empty_not_an_error() {
        let client = Arc::new(CannedHttpClient::responding(
            200,
            r#"{"chart": {"result": [], "error": null}}"#,
        ));
        let series = YahooFetcher::new(client)
            .fetch_single_series("ZZZZ", january())
            .await
            .expect("empty series");

        assert!(series.is_empty());
    }

    #[tokio::test]
    async fn not_found_error_is_not_retryable() {
        let client = Arc::new(CannedHttpClient::responding(
            404,
            r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#,
        ));
        let error = YahooFetcher::new(client)
            .fetch_single_series("GONE", january())
            .await
            .expect_err("must fail");

        assert_eq!(error.kind(), FetchErrorKind::NotFound);
        assert!(!error.retryable());
    }

    #[tokio::test]
    async fn transport_failures_are_retryable() {
        let client = Arc::new(CannedHttpClient::failing("connection reset"));
        let error = YahooFetcher::new(client)
            .fetch_single_series("AAPL", january())
            .await
            .expect_err("must fail");

        assert_eq!(error.kind(), FetchErrorKind::Transport);
        assert!(error.retryable());
    }
}
