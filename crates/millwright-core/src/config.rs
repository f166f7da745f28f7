use serde::{Deserialize, Serialize};

/// Errors reported by [`SimConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_region_size must be positive")]
    ZeroMaxRegion,
    #[error("min_region_size {min} exceeds max_region_size {max}")]
    RegionBounds { min: usize, max: usize },
    #[error("{0} must be positive")]
    ZeroField(&'static str),
}

/// Tunables of the optimized world. Every field has a default, so partial
/// config files are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Worker threads; 0 uses the available parallelism.
    pub worker_count: usize,
    /// Components above this many entities are split.
    pub max_region_size: usize,
    /// Components below this many entities are merged.
    pub min_region_size: usize,
    /// Bytes of belt an inserter scans when picking.
    pub inserter_pick_range: u32,
    /// Assemblers want an input while it holds fewer than this many cycles.
    pub assembler_input_multiple: u32,
    /// Assemblers stop when an output holds this many cycles.
    pub assembler_output_multiple: u32,
    /// Items a miner buffers without an output belt.
    pub miner_buffer: u32,
    /// When off, the power phases are skipped and every machine runs at
    /// full power.
    pub power_enabled: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            max_region_size: 4096,
            min_region_size: 64,
            inserter_pick_range: 10,
            assembler_input_multiple: 4,
            assembler_output_multiple: 9,
            miner_buffer: 50,
            power_enabled: true,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_region_size == 0 {
            return Err(ConfigError::ZeroMaxRegion);
        }
        if self.min_region_size > self.max_region_size {
            return Err(ConfigError::RegionBounds {
                min: self.min_region_size,
                max: self.max_region_size,
            });
        }
        let positive = [
            ("inserter_pick_range", self.inserter_pick_range),
            ("assembler_input_multiple", self.assembler_input_multiple),
            ("assembler_output_multiple", self.assembler_output_multiple),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::ZeroField(name));
            }
        }
        Ok(())
    }

    /// Resolved worker thread count.
    pub fn worker_threads(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }
}
