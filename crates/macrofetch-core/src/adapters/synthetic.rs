use time::Duration;

use crate::fetcher::SeriesFuture;
use crate::{DateRange, FetchError, Fetcher, ObservationDate, RawSeries, SeriesPoint, SourceId};

/// Longest history the synthetic fetcher produces, counted back from the range end.
const HISTORY_DAYS: i64 = 182;
const STEP_DAYS: i64 = 7;

/// Deterministic offline data for any source.
///
/// Weekly points are derived from a hash of the symbol, so repeated runs produce identical
/// datasets. Symbols starting with `EMPTY` return no rows and symbols starting with `FAIL`
/// always fail with a retryable transport error.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticFetcher {
    source: SourceId,
}

impl SyntheticFetcher {
    pub const fn new(source: SourceId) -> Self {
        Self { source }
    }
}

impl Fetcher for SyntheticFetcher {
    fn fetch_single_series<'a>(&'a self, symbol: &'a str, range: DateRange) -> SeriesFuture<'a> {
        Box::pin(async move {
            let upper = symbol.to_ascii_uppercase();
            if upper.starts_with("FAIL") {
                return Err(FetchError::transport(format!(
                    "synthetic {} refused {symbol}",
                    self.source
                )));
            }
            if upper.starts_with("EMPTY") {
                return Ok(RawSeries::empty(symbol, self.source));
            }
            Ok(RawSeries::new(symbol, self.source, self.points(symbol, range)))
        })
    }
}

impl SyntheticFetcher {
    fn points(&self, symbol: &str, range: DateRange) -> Vec<SeriesPoint> {
        let seed = symbol_seed(symbol);
        let base = 20.0 + (seed % 480) as f64;
        let end = range.end.into_inner();
        let start = end
            .checked_sub(Duration::days(HISTORY_DAYS))
            .map_or(range.start.into_inner(), |floor| floor.max(range.start.into_inner()));

        let mut points = Vec::new();
        let mut cursor = start;
        let mut step = 0_u64;
        while cursor <= end {
            let wave = ((seed.wrapping_add(step) % 17) as f64 - 8.0) * 0.35;
            let value = round2(base + step as f64 * 0.4 + wave);
            let mut point = SeriesPoint::new(ObservationDate::from_date(cursor), value);

            if self.source == SourceId::Yahoo {
                point = point
                    .with_extra("open", round2(value - 0.5))
                    .with_extra("high", round2(value + 1.25))
                    .with_extra("low", round2(value - 1.5))
                    .with_extra("volume", synthetic_volume(seed, step));
            }
            points.push(point);

            let Some(next) = cursor.checked_add(Duration::days(STEP_DAYS)) else {
                break;
            };
            cursor = next;
            step += 1;
        }
        points
    }
}

fn symbol_seed(symbol: &str) -> u64 {
    symbol
        .bytes()
        .fold(0_u64, |acc, byte| acc.wrapping_mul(33).wrapping_add(byte as u64))
}

fn synthetic_volume(seed: u64, step: u64) -> i64 {
    1_000_000 + (seed.wrapping_add(step * 7_919) % 250_000) as i64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
