use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] macrofetch_core::ValidationError),

    #[error(transparent)]
    Config(#[from] macrofetch_core::ConfigError),

    #[error(transparent)]
    Core(#[from] macrofetch_core::CoreError),

    #[error(transparent)]
    Warehouse(#[from] macrofetch_warehouse::WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Config(_) => 2,
            Self::Core(error) if error.is_configuration() => 2,
            Self::Core(_) => 4,
            Self::Warehouse(macrofetch_warehouse::WarehouseError::CatalogMissing { .. })
            | Self::Warehouse(macrofetch_warehouse::WarehouseError::InvalidCatalog { .. }) => 2,
            Self::Warehouse(_) => 4,
            Self::Serialization(_) => 5,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use macrofetch_core::{CoreError, SourceId, ValidationError};
    use macrofetch_warehouse::WarehouseError;

    use super::*;

    #[test]
    fn configuration_problems_exit_with_two() {
        let unknown = CliError::from(CoreError::from(ValidationError::InvalidSource {
            value: String::from("bloomberg"),
        }));
        let unregistered = CliError::from(CoreError::UnregisteredSource {
            source_id: SourceId::Occ,
        });
        let missing = CliError::from(WarehouseError::CatalogMissing {
            path: PathBuf::from("missing.csv"),
        });

        assert_eq!(unknown.exit_code(), 2);
        assert_eq!(unregistered.exit_code(), 2);
        assert_eq!(missing.exit_code(), 2);
    }

    #[test]
    fn persistence_failures_are_not_configuration_errors() {
        let error = CliError::from(CoreError::Persistence {
            target: String::from("combined dataset"),
            source: "disk full".into(),
        });

        assert_eq!(error.exit_code(), 4);
    }
}
