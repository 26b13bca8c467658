use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::fetcher::SeriesFuture;
use crate::http_client::{HttpClient, HttpRequest};
use crate::{DateRange, FetchError, Fetcher, ObservationDate, RawSeries, SeriesPoint, SourceId};

const DEFAULT_BASE_URL: &str = "https://api.eia.gov";

/// EIA v2 series lookups by legacy series id.
///
/// Periods arrive as `YYYY`, `YYYY-MM`, `YYYY-MM-DD` or `YYYY-Qn`; each is pinned to the
/// first day of its period before range filtering.
pub struct EiaFetcher {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl EiaFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
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

    fn endpoint(&self, series_id: &str) -> String {
        format!(
            "{}/v2/seriesid/{}?api_key={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(series_id),
            urlencoding::encode(&self.api_key),
        )
    }
}

impl Fetcher for EiaFetcher {
    fn fetch_single_series<'a>(&'a self, symbol: &'a str, range: DateRange) -> SeriesFuture<'a> {
        Box::pin(async move {
            let request = HttpRequest::get(self.endpoint(symbol)).with_timeout(self.timeout);
            let body = super::get_body(self.http_client.as_ref(), request, "eia series").await?;
            parse_series(symbol, range, &body)
        })
    }
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    response: Option<SeriesPayload>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SeriesPayload {
    #[serde(default)]
    data: Vec<EiaRow>,
}

#[derive(Debug, Deserialize)]
struct EiaRow {
    period: String,
    #[serde(default)]
    value: Value,
}

fn parse_series(series_id: &str, range: DateRange, body: &str) -> Result<RawSeries, FetchError> {
    let response: SeriesResponse = serde_json::from_str(body)
        .map_err(|error| FetchError::parse(format!("eia {series_id}: {error}")))?;

    if let Some(error) = response.error {
        return Err(FetchError::invalid_request(format!("eia {series_id}: {error}")));
    }

    let rows = response.response.map(|payload| payload.data).unwrap_or_default();
    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(value) = numeric_value(&row.value) else {
            continue;
        };
        let date = parse_period(&row.period).ok_or_else(|| {
            FetchError::parse(format!("eia {series_id}: unrecognised period {}", row.period))
        })?;
        if range.contains(date) {
            points.push(SeriesPoint::new(date, value));
        }
    }
    points.sort_by_key(|point| point.date);

    Ok(RawSeries::new(series_id, SourceId::Eia, points))
}

fn numeric_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn parse_period(period: &str) -> Option<ObservationDate> {
    let period = period.trim();
    let mut parts = period.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let (month, day) = match (parts.next(), parts.next()) {
        (None, _) => (1, 1),
        (Some(quarter), None) if quarter.starts_with(['Q', 'q']) => {
            let number: u8 = quarter[1..].parse().ok()?;
            if !(1..=4).contains(&number) {
                return None;
            }
            ((number - 1) * 3 + 1, 1)
        }
        (Some(month), None) => (month.parse().ok()?, 1),
        (Some(month), Some(day)) => (month.parse().ok()?, day.parse().ok()?),
    };
    if parts.next().is_some() {
        return None;
    }
    ObservationDate::from_ymd(year, month, day).ok()
}
