//! # Cluster Configuration
//!
//! Loaded once at startup from TOML, or built in code for tests.
//!
//! ```toml
//! world_size = 3
//! dynamic_load_balancer = true
//! tiles_preallocated = 8
//! render_threads = 4
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use meridian_shared::DEFAULT_MAX_BATCH_BYTES;

use crate::error::{ClusterError, ClusterResult};

/// Settings shared by every rank of a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Total ranks: one master plus the workers.
    pub world_size: usize,
    /// Select the dynamic tile load balancer instead of the static one.
    pub dynamic_load_balancer: bool,
    /// Tiles the dynamic balancer hands out up front.
    pub tiles_preallocated: i32,
    /// Threads available to deferred render tasks, per rank.
    pub render_threads: usize,
    /// Outgoing batch size at which the master flushes to the workers.
    pub max_batch_bytes: usize,
    /// Whether a worker exits the OS process when finalized.
    ///
    /// Ranks sharing one process (the local fabric) must leave this off.
    pub exit_on_finalize: bool,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            world_size: 3,
            dynamic_load_balancer: false,
            tiles_preallocated: 4,
            render_threads: 2,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            exit_on_finalize: true,
            log_filter: String::from("info"),
        }
    }
}

impl ClusterConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// `Config` on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> ClusterResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ClusterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Config` if it is invalid.
    pub fn load(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// `Config` naming the first offending field.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.world_size < 2 {
            return Err(ClusterError::Config(format!(
                "world_size must be at least 2 (one master, one worker), got {}",
                self.world_size
            )));
        }
        if self.render_threads == 0 {
            return Err(ClusterError::Config("render_threads must be at least 1".into()));
        }
        if self.max_batch_bytes == 0 {
            return Err(ClusterError::Config("max_batch_bytes must be at least 1".into()));
        }
        if self.tiles_preallocated < 0 {
            return Err(ClusterError::Config(format!(
                "tiles_preallocated must not be negative, got {}",
                self.tiles_preallocated
            )));
        }
        Ok(())
    }

    /// Sets the world size.
    #[must_use]
    pub const fn with_world_size(mut self, world_size: usize) -> Self {
        self.world_size = world_size;
        self
    }

    /// Selects the dynamic load balancer.
    #[must_use]
    pub const fn with_dynamic_load_balancer(mut self, tiles_preallocated: i32) -> Self {
        self.dynamic_load_balancer = true;
        self.tiles_preallocated = tiles_preallocated;
        self
    }

    /// Sets the render thread count.
    #[must_use]
    pub const fn with_render_threads(mut self, render_threads: usize) -> Self {
        self.render_threads = render_threads;
        self
    }

    /// Sets the batch flush threshold.
    #[must_use]
    pub const fn with_max_batch_bytes(mut self, max_batch_bytes: usize) -> Self {
        self.max_batch_bytes = max_batch_bytes;
        self
    }

    /// Controls whether finalize exits the process.
    #[must_use]
    pub const fn with_exit_on_finalize(mut self, exit_on_finalize: bool) -> Self {
        self.exit_on_finalize = exit_on_finalize;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClusterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.world_size, 3);
        assert_eq!(config.max_batch_bytes, 64 * 1024);
        assert!(config.exit_on_finalize);
    }

    #[test]
    fn test_partial_toml() {
        let config = ClusterConfig::from_toml_str(
            "world_size = 5\ndynamic_load_balancer = true\ntiles_preallocated = 16\n",
        )
        .unwrap();
        assert_eq!(config.world_size, 5);
        assert!(config.dynamic_load_balancer);
        assert_eq!(config.tiles_preallocated, 16);
        assert_eq!(config.render_threads, 2);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ClusterConfig::from_toml_str("world_size = 1"),
            Err(ClusterError::Config(_))
        ));
        assert!(matches!(
            ClusterConfig::from_toml_str("render_threads = \"many\""),
            Err(ClusterError::Config(_))
        ));
        assert!(ClusterConfig::default().with_render_threads(0).validate().is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ClusterConfig::default().with_world_size(4).with_exit_on_finalize(false);
        let text = toml::to_string(&config).unwrap();
        assert_eq!(ClusterConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ClusterConfig::load("/nonexistent/meridian.toml"),
            Err(ClusterError::Io(_))
        ));
    }
}
