//! # Pool Configuration
//!
//! Capacity tuning for pools, loadable from TOML:
//!
//! ```toml
//! initial_capacity = 1024
//! expansion_rate = 256
//! insert_capacity = 64
//! ```
//!
//! Missing keys fall back to [`PoolConfig::default`].

use crate::error::{EcsError, EcsResult};
use serde::{Deserialize, Serialize};

/// Default growth quantum of pool storage, in elements.
pub const DEFAULT_EXPANSION_RATE: usize = 128;

/// Capacity tuning applied to a pool at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Minimum primary storage capacity once storage is first allocated.
    pub initial_capacity: usize,
    /// Capacity growth quantum; new capacities are rounded up to a multiple.
    pub expansion_rate: usize,
    /// Reserved insert-queue capacity (type-erased pools only).
    pub insert_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            expansion_rate: DEFAULT_EXPANSION_RATE,
            insert_capacity: 0,
        }
    }
}

impl PoolConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] on malformed TOML, unknown keys or
    /// a failed [`PoolConfig::validate`].
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| EcsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> EcsResult<String> {
        toml::to_string(self).map_err(|e| EcsError::InvalidConfig(e.to_string()))
    }

    /// Checks the configuration for values no pool can work with.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the expansion rate is zero.
    pub fn validate(&self) -> EcsResult<()> {
        check_expansion_rate(self.expansion_rate)
    }
}

/// Rejects an expansion rate of zero, for configs and live pools alike.
pub(crate) fn check_expansion_rate(rate: usize) -> EcsResult<()> {
    if rate == 0 {
        return Err(EcsError::InvalidConfig(
            "expansion_rate must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_capacity, 0);
        assert_eq!(config.expansion_rate, 128);
        assert_eq!(config.insert_capacity, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PoolConfig::from_toml_str("initial_capacity = 1024").unwrap();
        assert_eq!(config.initial_capacity, 1024);
        assert_eq!(config.expansion_rate, DEFAULT_EXPANSION_RATE);
    }

    #[test]
    fn test_zero_rate_rejected() {
        let err = PoolConfig::from_toml_str("expansion_rate = 0").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(PoolConfig::from_toml_str("growth = 4").is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PoolConfig {
            initial_capacity: 64,
            expansion_rate: 32,
            insert_capacity: 16,
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(PoolConfig::from_toml_str(&text).unwrap(), config);
    }
}
