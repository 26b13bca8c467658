use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::fetcher::SeriesFuture;
use crate::http_client::{HttpClient, HttpRequest};
use crate::{DateRange, FetchError, Fetcher, ObservationDate, RawSeries, SeriesPoint, SourceId};

const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org";

/// FRED series observations. FRED reports missing values as `"."`; those are skipped.
pub struct FredFetcher {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl FredFetcher {
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

    fn endpoint(&self, series_id: &str, range: DateRange) -> String {
        format!(
            "{}/fred/series/observations?series_id={}&api_key={}&file_type=json&observation_start={}&observation_end={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(series_id),
            urlencoding::encode(&self.api_key),
            range.start,
            range.end,
        )
    }
}

impl Fetcher for FredFetcher {
    fn fetch_single_series<'a>(&'a self, symbol: &'a str, range: DateRange) -> SeriesFuture<'a> {
        Box::pin(async move {
            let request =
                HttpRequest::get(self.endpoint(symbol, range)).with_timeout(self.timeout);
            let body =
                super::get_body(self.http_client.as_ref(), request, "fred observations").await?;
            parse_observations(symbol, range, &body)
        })
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

#[derive(Debug, Deserialize)]
struct FredObservation {
    date: String,
    value: String,
}

fn parse_observations(
    series_id: &str,
    range: DateRange,
    body: &str,
) -> Result<RawSeries, FetchError> {
    let response: ObservationsResponse = serde_json::from_str(body)
        .map_err(|error| FetchError::parse(format!("fred {series_id}: {error}")))?;

    let mut points = Vec::with_capacity(response.observations.len());
    let mut skipped = 0_usize;
    for observation in response.observations {
        let value = match observation.value.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            _ => {
                skipped += 1;
                continue;
            }
        };
        let date = ObservationDate::parse(&observation.date)
            .map_err(|error| FetchError::parse(format!("fred {series_id}: {error}")))?;
        if range.contains(date) {
            points.push(SeriesPoint::new(date, value));
        }
    }

    if skipped > 0 {
        debug!(series_id, skipped, "fred observations without a value skipped");
    }

    Ok(RawSeries::new(series_id, SourceId::Fred, points))
}
