use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sdb_region::RegionConfig;

use crate::error::{DbError, DbResult};

/// Configuration for opening a [`Database`](crate::Database).
///
/// Loaded from TOML:
///
/// ```toml
/// path = "/var/lib/node/state.sdb"
///
/// [region]
/// initial_size = 33554432
/// max_size = 1073741824
/// read_only = false
///
/// [region.grow]
/// auto_grow = true
/// min_increment = 8388608
/// scale_percent = 25
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Region file. `None` keeps the whole database in memory.
    pub path: Option<PathBuf>,
    pub region: RegionConfig,
}

impl DatabaseConfig {
    /// A pure in-memory database with default sizing.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A file-backed database with default sizing.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            region: RegionConfig::default(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> DbResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| DbError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn from_file(path: &Path) -> DbResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> DbResult<()> {
        self.region
            .validate()
            .map_err(|e| DbError::Config(e.to_string()))?;
        if self.region.read_only && self.path.is_none() {
            return Err(DbError::Config(
                "a read-only database needs a region file".into(),
            ));
        }
        Ok(())
    }
}
