//! Connection configuration.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Highest number of bound parameters a single generated statement may use.
///
/// Matches SQLite's historical `SQLITE_MAX_VARIABLE_NUMBER`.
pub const DEFAULT_MAX_PARAMS: usize = 999;

const ENV_MAX_PARAMS: &str = "TABULA_MAX_PARAMS";
const ENV_WAL: &str = "TABULA_WAL";

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    Memory,
}

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// File path or in-memory
    pub location: DbLocation,
    /// Parameter budget per statement; batches are chunked to stay under it
    pub max_params: usize,
    /// Enable WAL journaling (file databases only)
    pub wal: bool,
}

impl DbConfig {
    /// Create SQLite file configuration.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            location: DbLocation::File(path.as_ref().to_path_buf()),
            max_params: DEFAULT_MAX_PARAMS,
            wal: true,
        }
    }

    /// Create in-memory SQLite configuration (for testing).
    pub fn sqlite_memory() -> Self {
        Self {
            location: DbLocation::Memory,
            max_params: DEFAULT_MAX_PARAMS,
            wal: false,
        }
    }

    /// Set the per-statement parameter budget.
    pub fn with_max_params(mut self, max: usize) -> Self {
        self.max_params = max.max(1);
        self
    }

    /// Enable or disable WAL journaling.
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    /// Overlay `TABULA_MAX_PARAMS` and `TABULA_WAL` from the environment.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env(self) -> Self {
        self.with_overrides(
            std::env::var(ENV_MAX_PARAMS).ok().as_deref(),
            std::env::var(ENV_WAL).ok().as_deref(),
        )
    }

    fn with_overrides(mut self, max_params: Option<&str>, wal: Option<&str>) -> Self {
        if let Some(raw) = max_params {
            match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => self.max_params = value,
                _ => warn!(value = raw, "Ignoring invalid {}", ENV_MAX_PARAMS),
            }
        }
        if let Some(raw) = wal {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.wal = true,
                "0" | "false" | "off" | "no" => self.wal = false,
                _ => warn!(value = raw, "Ignoring invalid {}", ENV_WAL),
            }
        }
        self
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::sqlite_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_defaults() {
        let config = DbConfig::sqlite("/tmp/x.db");
        assert_eq!(config.location, DbLocation::File(PathBuf::from("/tmp/x.db")));
        assert_eq!(config.max_params, DEFAULT_MAX_PARAMS);
        assert!(config.wal);

        let memory = DbConfig::sqlite_memory();
        assert_eq!(memory.location, DbLocation::Memory);
        assert!(!memory.wal);
    }

    #[test]
    fn test_with_max_params_floors_at_one() {
        assert_eq!(DbConfig::sqlite_memory().with_max_params(0).max_params, 1);
        assert_eq!(DbConfig::sqlite_memory().with_max_params(50).max_params, 50);
    }

    #[test]
    fn test_overrides() {
        let config = DbConfig::sqlite_memory().with_overrides(Some("120"), Some("on"));
        assert_eq!(config.max_params, 120);
        assert!(config.wal);

        let config = DbConfig::sqlite("a.db").with_overrides(Some("zero"), Some("off"));
        assert_eq!(config.max_params, DEFAULT_MAX_PARAMS);
        assert!(!config.wal);

        let config = DbConfig::sqlite_memory().with_overrides(Some("0"), Some("maybe"));
        assert_eq!(config.max_params, DEFAULT_MAX_PARAMS);
        assert!(!config.wal);
    }
}
