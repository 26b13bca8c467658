//! Concrete [`Fetcher`](crate::Fetcher) implementations.
//!
//! Live adapters exist for the JSON APIs (Yahoo chart, FRED, EIA). Every source can be
//! served by [`SyntheticFetcher`] for offline runs.

mod eia;
mod fred;
mod synthetic;
mod yahoo;

pub use eia::EiaFetcher;
pub use fred::FredFetcher;
pub use synthetic::SyntheticFetcher;
pub use yahoo::YahooFetcher;

use crate::http_client::{HttpClient, HttpRequest};
use crate::FetchError;

/// Executes a GET and returns the body of a 2xx response.
async fn get_body(
    http_client: &dyn HttpClient,
    request: HttpRequest,
    context: &str,
) -> Result<String, FetchError> {
    let response = http_client
        .execute(request)
        .await
        .map_err(|error| FetchError::transport(format!("{context}: {}", error.message())))?;

    if !response.is_success() {
        return Err(FetchError::from_status(response.status, context));
    }

    Ok(response.body)
}
