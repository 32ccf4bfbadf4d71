use serde::Deserialize;

use crate::shared::{PgConnectionConfig, SourceRetryConfig, ValidationError};

/// Configuration for one table-backed source.
///
/// Does not implement `Serialize` because the nested connection
/// configuration carries a secret.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgSourceConfig {
    /// Connection parameters for the source database.
    pub connection: PgConnectionConfig,
    /// Schema containing the source table.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// The source table name.
    pub table: String,
    /// When set, each (re)open is bounded to this many rows and the cursor
    /// reopens transparently at page exhaustion. When unset, a server-side
    /// cursor streams the result instead; pagination trades initial latency
    /// for predictable memory on backends without streaming support.
    #[serde(default)]
    pub page_size: Option<u64>,
    /// Batch size for server-side cursor fetches.
    ///
    /// Default: 1000
    #[serde(default = "default_fetch_size")]
    pub fetch_size: u32,
    /// Retry behavior for transient connection faults.
    #[serde(default)]
    pub retry: SourceRetryConfig,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_fetch_size() -> u32 {
    1000
}

impl PgSourceConfig {
    /// Validates source settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.is_empty() {
            return Err(ValidationError::EmptyTableName);
        }
        if self.page_size == Some(0) {
            return Err(ValidationError::PageSizeZero);
        }
        if self.fetch_size == 0 {
            return Err(ValidationError::FetchSizeZero);
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PgSourceConfig {
        PgSourceConfig {
            connection: PgConnectionConfig::default(),
            schema: default_schema(),
            table: "invoices".to_string(),
            page_size: None,
            fetch_size: default_fetch_size(),
            retry: SourceRetryConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_empty_table_rejected() {
        let mut config = config();
        config.table.clear();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::EmptyTableName)
        ));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = config();
        config.page_size = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::PageSizeZero)
        ));
    }
}
