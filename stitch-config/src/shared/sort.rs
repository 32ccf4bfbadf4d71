use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings for the external merge sort.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SortFileConfig {
    /// Maximum rows held in memory per chunk.
    ///
    /// Default: 100000
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
    /// Directory for spilled chunk files. Defaults to the output file's
    /// directory when unset.
    #[serde(default)]
    pub tmp_dir: Option<PathBuf>,
    /// Whether to write the input's header row to the output once.
    ///
    /// Default: true
    #[serde(default = "default_write_header")]
    pub write_header: bool,
}

fn default_chunk_rows() -> usize {
    100_000
}

fn default_write_header() -> bool {
    true
}

impl SortFileConfig {
    /// Validates sort settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.chunk_rows == 0 {
            return Err(ValidationError::ChunkRowsZero);
        }
        Ok(())
    }
}

impl Default for SortFileConfig {
    fn default() -> Self {
        Self {
            chunk_rows: default_chunk_rows(),
            tmp_dir: None,
            write_header: default_write_header(),
        }
    }
}
