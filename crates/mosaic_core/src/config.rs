//! # Pool Configuration
//!
//! Pool parameters, loaded once at startup either in code or from TOML:
//!
//! ```toml
//! capacity = 4096
//! granule = 8
//! compaction = "on-demand"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};
use crate::memory::ARENA_ALIGN;

/// When the allocation engine may relocate live extents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompactionMode {
    /// Compact inside `allocate` when free space exists but no single
    /// free extent is large enough.
    #[default]
    OnDemand,
    /// Never move live data; fragmented requests fail with out-of-memory.
    Disabled,
}

/// Configuration for a [`PoolAllocator`](crate::PoolAllocator).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PoolConfig {
    /// Arena size in bytes.
    pub capacity: usize,
    /// Allocation granularity; every request is rounded up to a multiple.
    #[serde(default = "default_granule")]
    pub granule: usize,
    /// Compaction policy.
    #[serde(default)]
    pub compaction: CompactionMode,
}

const fn default_granule() -> usize {
    1
}

impl PoolConfig {
    /// Byte-exact pool of `capacity` bytes with on-demand compaction.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            granule: default_granule(),
            compaction: CompactionMode::OnDemand,
        }
    }

    /// Sets the allocation granularity.
    ///
    /// With `granule == ARENA_ALIGN` every handle resolves to an 8-byte
    /// aligned address.
    #[must_use]
    pub const fn with_granule(mut self, granule: usize) -> Self {
        self.granule = granule;
        self
    }

    /// Sets the compaction policy.
    #[must_use]
    pub const fn with_compaction(mut self, compaction: CompactionMode) -> Self {
        self.compaction = compaction;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the granule is not a power of
    /// two, exceeds the arena base alignment, or does not divide the capacity.
    pub fn validate(&self) -> PoolResult<()> {
        if !self.granule.is_power_of_two() {
            return Err(PoolError::InvalidConfig(format!(
                "granule must be a power of two, got {}",
                self.granule
            )));
        }
        if self.granule > ARENA_ALIGN {
            return Err(PoolError::InvalidConfig(format!(
                "granule {} exceeds arena alignment {ARENA_ALIGN}",
                self.granule
            )));
        }
        if self.capacity % self.granule != 0 {
            return Err(PoolError::InvalidConfig(format!(
                "capacity {} is not a multiple of granule {}",
                self.capacity, self.granule
            )));
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> PoolResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| PoolError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PoolResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            PoolError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_bad_granule_rejected() {
        assert!(PoolConfig::new(64).with_granule(3).validate().is_err());
        assert!(PoolConfig::new(64).with_granule(0).validate().is_err());
        assert!(PoolConfig::new(64).with_granule(16).validate().is_err());
        assert!(PoolConfig::new(64).with_granule(8).validate().is_ok());
    }

    #[test]
    fn test_config_capacity_must_fill_whole_granules() {
        assert!(matches!(
            PoolConfig::new(20).with_granule(8).validate(),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(PoolConfig::new(105).with_granule(8).validate().is_err());
        assert!(PoolConfig::new(24).with_granule(8).validate().is_ok());
        assert!(PoolConfig::new(0).with_granule(8).validate().is_ok());
        assert!(PoolConfig::new(105).validate().is_ok());
    }

    #[test]
    fn test_config_from_toml_file() {
        let path = std::env::temp_dir().join(format!("mosaic_pool_{}.toml", std::process::id()));
        std::fs::write(&path, "capacity = 4096\ngranule = 8\ncompaction = \"on-demand\"\n")
            .unwrap();

        let loaded = PoolConfig::from_toml_file(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.unwrap(), PoolConfig::new(4096).with_granule(8));
    }

    #[test]
    fn test_config_from_toml() {
        let config = PoolConfig::from_toml_str(
            r#"
            capacity = 104
            granule = 8
            compaction = "disabled"
            "#,
        )
        .unwrap();
        assert_eq!(
            config,
            PoolConfig::new(104)
                .with_granule(8)
                .with_compaction(CompactionMode::Disabled)
        );
    }

    #[test]
    fn test_config_toml_defaults() {
        let config = PoolConfig::from_toml_str("capacity = 24").unwrap();
        assert_eq!(config, PoolConfig::new(24));
    }

    #[test]
    fn test_config_toml_errors() {
        assert!(matches!(
            PoolConfig::from_toml_str("capacity = \"lots\""),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(PoolConfig::from_toml_str("capacity = 8\ngranule = 6").is_err());
        assert!(PoolConfig::from_toml_str("capacity = 8\nbogus = 1").is_err());
        assert!(PoolConfig::from_toml_file("/nonexistent/pool.toml").is_err());
    }
}
