use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// CSV dialect and prefix handling for file-backed sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CsvFormatConfig {
    /// Field delimiter. Default: `,`
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Quote character. Default: `"`
    #[serde(default = "default_quote")]
    pub quote: char,
    /// Whether the first row of each file is a header to skip.
    #[serde(default)]
    pub has_header: bool,
    /// Additional rows to skip after the header, e.g. comment banners.
    #[serde(default)]
    pub skip_rows: u64,
}

fn default_delimiter() -> char {
    ','
}

fn default_quote() -> char {
    '"'
}

impl CsvFormatConfig {
    /// Validates the dialect.
    ///
    /// The underlying CSV machinery works on single bytes, so the delimiter
    /// and quote must be ASCII.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.delimiter.is_ascii() || !self.quote.is_ascii() {
            return Err(ValidationError::NonAsciiCsvDialect);
        }
        Ok(())
    }
}

impl Default for CsvFormatConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            quote: default_quote(),
            has_header: false,
            skip_rows: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CsvFormatConfig::default();
        assert_eq!(config.delimiter, ',');
        assert_eq!(config.quote, '"');
        assert!(!config.has_header);
        assert_eq!(config.skip_rows, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_ascii_dialect_rejected() {
        let config = CsvFormatConfig {
            delimiter: '→',
            ..CsvFormatConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::NonAsciiCsvDialect)
        ));
    }
}
