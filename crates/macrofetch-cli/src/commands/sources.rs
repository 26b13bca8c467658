use std::process::ExitCode;

use macrofetch_core::{
    CollectorConfig, FetcherRegistry, FetcherRegistryBuilder, IdentifierKind, ObservationDate,
    SourceId,
};
use serde::Serialize;

use crate::cli::SourcesArgs;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct SourceListing {
    source: SourceId,
    description: &'static str,
    identifier: IdentifierKind,
    registered: bool,
    max_requests: u32,
    window_secs: u64,
    default_start: ObservationDate,
}

pub fn run(args: &SourcesArgs, config: &CollectorConfig, pretty: bool) -> Result<ExitCode, CliError> {
    let mut builder = FetcherRegistryBuilder::from_config(config);
    if args.mock {
        builder = builder.with_mock_mode();
    }
    output::render(&listings(config, &builder.build()), pretty)?;
    Ok(ExitCode::SUCCESS)
}

fn listings(config: &CollectorConfig, registry: &FetcherRegistry) -> Vec<SourceListing> {
    let limiter = config.rate_limiter_set();
    SourceId::ALL
        .into_iter()
        .map(|source| {
            let limit = limiter.limit_for(source);
            SourceListing {
                source,
                description: source.description(),
                identifier: source.identifier_kind(),
                registered: registry.contains(source),
                max_requests: limit.max_requests,
                window_secs: limit.window.as_secs(),
                default_start: config.default_start(source),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listings_cover_every_source_with_configured_limits() {
        let config = CollectorConfig::default();
        let registry = FetcherRegistryBuilder::new().with_mock_mode().build();

        let listings = listings(&config, &registry);

        assert_eq!(listings.len(), SourceId::ALL.len());
        let fred = listings
            .iter()
            .find(|listing| listing.source == SourceId::Fred)
            .expect("fred");
        assert!(fred.registered);
        assert_eq!(fred.max_requests, 120);
        assert_eq!(fred.window_secs, 60);
        assert_eq!(fred.default_start.to_string(), "1900-01-01");
    }

    #[test]
    fn unregistered_sources_are_flagged() {
        let config = CollectorConfig::default();
        let registry = FetcherRegistryBuilder::custom().build();

        assert!(listings(&config, &registry)
            .iter()
            .all(|listing| !listing.registered));
    }
}
