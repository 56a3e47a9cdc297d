use serde::{Deserialize, Serialize};

use crate::error::{RegionError, RegionResult};
use crate::header::HEADER_SIZE;

const MIB: u64 = 1024 * 1024;

/// How the region grows when an allocation does not fit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowPolicy {
    /// Grow automatically instead of failing with `RegionFull`.
    pub auto_grow: bool,
    /// Smallest growth step in bytes.
    pub min_increment: u64,
    /// Growth step as a percentage of the current size.
    pub scale_percent: u32,
}

impl Default for GrowPolicy {
    fn default() -> Self {
        Self {
            auto_grow: true,
            min_increment: 8 * MIB,
            scale_percent: 25,
        }
    }
}

impl GrowPolicy {
    /// A policy that never grows: a full region is a hard error.
    pub fn fixed() -> Self {
        Self {
            auto_grow: false,
            ..Self::default()
        }
    }

    /// Growth step for a region of `current` bytes that is `shortfall`
    /// bytes short, before capping at the maximum size.
    pub fn increment(&self, current: u64, shortfall: u64) -> u64 {
        let scaled = current.saturating_mul(u64::from(self.scale_percent)) / 100;
        shortfall.max(self.min_increment).max(scaled)
    }
}

/// Sizing and access mode of a backing region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Size of a freshly created region, in bytes.
    pub initial_size: u64,
    /// Hard upper bound on the region size, in bytes.
    pub max_size: u64,
    /// Map the region read-only. All writes fail with `ReadOnly`.
    pub read_only: bool,
    /// Growth behaviour.
    pub grow: GrowPolicy,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            initial_size: 32 * MIB,
            max_size: 1024 * MIB,
            read_only: false,
            grow: GrowPolicy::default(),
        }
    }
}

impl RegionConfig {
    /// A writable configuration with explicit sizes and the default growth policy.
    pub fn with_sizes(initial_size: u64, max_size: u64) -> Self {
        Self {
            initial_size,
            max_size,
            ..Self::default()
        }
    }

    /// Reject configurations the region cannot honour.
    pub fn validate(&self) -> RegionResult<()> {
        let minimum = HEADER_SIZE * 2;
        if self.initial_size < minimum {
            return Err(RegionError::Config(format!(
                "initial_size {} is below the minimum of {minimum} bytes",
                self.initial_size
            )));
        }
        if self.initial_size > self.max_size {
            return Err(RegionError::Config(format!(
                "initial_size {} exceeds max_size {}",
                self.initial_size, self.max_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RegionConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.grow.auto_grow);
        assert!(!config.read_only);
    }

    #[test]
    fn initial_larger_than_max_rejected() {
        let config = RegionConfig::with_sizes(4 * MIB, 2 * MIB);
        assert!(matches!(config.validate(), Err(RegionError::Config(_))));
    }

    #[test]
    fn tiny_region_rejected() {
        let config = RegionConfig::with_sizes(HEADER_SIZE, MIB);
        assert!(matches!(config.validate(), Err(RegionError::Config(_))));
    }

    #[test]
    fn increment_takes_largest_candidate() {
        let policy = GrowPolicy {
            auto_grow: true,
            min_increment: 100,
            scale_percent: 50,
        };
        assert_eq!(policy.increment(1000, 10), 500);
        assert_eq!(policy.increment(100, 10), 100);
        assert_eq!(policy.increment(100, 700), 700);
    }
}
