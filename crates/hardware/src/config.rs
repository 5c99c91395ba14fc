//! Configuration for a simulation run.
//!
//! [`Config`] mirrors the command-line option table at the CLI boundary
//! field-for-field. It also derives [`serde::Deserialize`] so the same
//! shape can be loaded from a JSON fixture for regression tests, with the
//! CLI flags as the primary authoring surface. Geometry is validated by
//! [`Config::validate`] before any cache is constructed; a malformed
//! configuration is a [`ConfigError`], not a panic — it originates outside
//! this crate, unlike the internal invariants the simulation core asserts.

use serde::Deserialize;

use crate::error::ConfigError;

/// Default configuration constants, named the way the external CLI's
/// option table (block-size, L1/L2/L3 geometry, quantum size) presents
/// them.
mod defaults {
    /// Bytes per cache block, shared by every level.
    pub const BLOCK_SIZE: u64 = 64;
    /// Simulated core count.
    pub const CORES: u32 = 8;
    /// L1 size in bytes (32 KiB).
    pub const L1_SIZE: u64 = 32 * 1024;
    /// L1 associativity.
    pub const L1_WAYS: u64 = 8;
    /// L2 size in bytes (256 KiB).
    pub const L2_SIZE: u64 = 256 * 1024;
    /// L2 associativity.
    pub const L2_WAYS: u64 = 8;
    /// L3 size in bytes (8 MiB).
    pub const L3_SIZE: u64 = 8 * 1024 * 1024;
    /// L3 associativity.
    pub const L3_WAYS: u64 = 16;
    /// Target instructions per quantum.
    pub const QUANTUM_SIZE: u64 = 1000;
    /// Default stats-file name.
    pub const STATS_FILE: &str = "cachesim-stats.py";
}

/// One cache level's geometry: size, associativity, and the (shared)
/// block size it was validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CacheGeometry {
    /// Total cache size in bytes.
    pub size_bytes: u64,
    /// Associativity (ways per set).
    pub ways: u64,
}

impl CacheGeometry {
    /// Number of sets implied by this geometry and a block size.
    #[must_use]
    pub fn num_sets(&self, block_size: u64) -> usize {
        ((self.size_bytes / block_size) / self.ways) as usize
    }

    fn validate(self, level: &'static str, block_size: u64) -> Result<(), ConfigError> {
        if !self.size_bytes.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: level,
                value: self.size_bytes,
            });
        }
        if !self.ways.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: level,
                value: self.ways,
            });
        }
        if self.size_bytes % (block_size * self.ways) != 0 {
            return Err(ConfigError::GeometryMismatch {
                level,
                size_bytes: self.size_bytes,
                block_size,
                ways: self.ways,
            });
        }
        Ok(())
    }
}

/// The execution policy governing when a core's quantum ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionPolicy {
    /// Baseline mode: quanta end only on work budget or store-buffer
    /// overflow; synchronization never forces a boundary.
    NonDet,
    /// Every synchronization sink ends the sinking core's quantum.
    DetTso,
    /// A sink ends the sinking core's quantum only if the matching source
    /// landed in the same quantum round.
    DetHb,
}

/// Free-form tags copied verbatim into every stats record; never
/// interpreted by the simulation core.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tags {
    /// Coherence/determinism scheme label.
    pub scheme: String,
    /// Workload label.
    pub workload: String,
    /// Input label.
    pub input: String,
    /// Application thread count, recorded as a tag only.
    pub threads: u32,
}

/// A fully-specified, not-yet-validated simulation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Simulated core count.
    #[serde(default = "Config::default_cores")]
    pub cores: u32,
    /// Bytes per cache block, shared by every level.
    #[serde(default = "Config::default_block_size")]
    pub block_size: u64,
    /// L1 geometry. Always present.
    #[serde(default = "Config::default_l1")]
    pub l1: CacheGeometry,
    /// Optional private L2 geometry.
    #[serde(default)]
    pub l2: Option<CacheGeometry>,
    /// Optional shared L3 geometry.
    #[serde(default)]
    pub l3: Option<CacheGeometry>,
    /// Execution policy.
    pub policy: ExecutionPolicy,
    /// Target instructions per quantum.
    #[serde(default = "Config::default_quantum_size")]
    pub quantum_size: u64,
    /// Enable deterministic-time-based work accounting instead of pure
    /// instruction counting.
    #[serde(default)]
    pub smart_quantum_building: bool,
    /// Memory accesses with `stack_ref = true` skip the store buffer (but
    /// still access the cache) when this is set.
    #[serde(default)]
    pub ignore_stack: bool,
    /// Output stats-file path.
    #[serde(default = "Config::default_stats_file")]
    pub stats_file: String,
    /// Free-form tags copied into every stats record.
    #[serde(default)]
    pub tags: Tags,
}

impl Config {
    fn default_cores() -> u32 {
        defaults::CORES
    }

    fn default_block_size() -> u64 {
        defaults::BLOCK_SIZE
    }

    fn default_l1() -> CacheGeometry {
        CacheGeometry {
            size_bytes: defaults::L1_SIZE,
            ways: defaults::L1_WAYS,
        }
    }

    fn default_quantum_size() -> u64 {
        defaults::QUANTUM_SIZE
    }

    fn default_stats_file() -> String {
        defaults::STATS_FILE.to_string()
    }

    /// Returns the canonical default L2 geometry, for callers constructing
    /// a [`Config`] programmatically with `use_l2` set.
    #[must_use]
    pub fn default_l2_geometry() -> CacheGeometry {
        CacheGeometry {
            size_bytes: defaults::L2_SIZE,
            ways: defaults::L2_WAYS,
        }
    }

    /// Returns the canonical default L3 geometry, for callers constructing
    /// a [`Config`] programmatically with `use_l3` set.
    #[must_use]
    pub fn default_l3_geometry() -> CacheGeometry {
        CacheGeometry {
            size_bytes: defaults::L3_SIZE,
            ways: defaults::L3_WAYS,
        }
    }

    /// Validates cache geometry and core count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `block_size` is not a power of two, any
    /// cache level's geometry is invalid, or `cores` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cores == 0 {
            return Err(ConfigError::ZeroCores);
        }
        if !self.block_size.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "block_size",
                value: self.block_size,
            });
        }
        self.l1.validate("l1", self.block_size)?;
        if let Some(l2) = self.l2 {
            l2.validate("l2", self.block_size)?;
        }
        if let Some(l3) = self.l3 {
            l3.validate("l3", self.block_size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            cores: 4,
            block_size: 64,
            l1: CacheGeometry { size_bytes: 32 * 1024, ways: 8 },
            l2: None,
            l3: None,
            policy: ExecutionPolicy::NonDet,
            quantum_size: 1000,
            smart_quantum_building: false,
            ignore_stack: false,
            stats_file: "out.py".to_string(),
            tags: Tags::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_cores_is_rejected() {
        let mut cfg = base_config();
        cfg.cores = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroCores));
    }

    #[test]
    fn non_power_of_two_block_size_is_rejected() {
        let mut cfg = base_config();
        cfg.block_size = 48;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NotPowerOfTwo { field: "block_size", value: 48 })
        );
    }

    #[test]
    fn geometry_not_multiple_of_block_times_ways_is_rejected() {
        let mut cfg = base_config();
        cfg.l1 = CacheGeometry { size_bytes: 100, ways: 8 };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::GeometryMismatch { level: "l1", .. })
        ));
    }

    #[test]
    fn num_sets_computed_from_geometry() {
        let geo = CacheGeometry { size_bytes: 16, ways: 2 };
        assert_eq!(geo.num_sets(4), 2);
    }
}
