//! Engine and cluster configuration
//!
//! Configurations deserialize from YAML; every field has a default, so a
//! file only needs the settings it changes:
//!
//! ```yaml
//! cluster:
//!   machines: 4
//!   partitioner: modulo
//! engine:
//!   scheduler: priority
//!   consistency: full
//!   max_iterations: 50
//! ```

use crate::consistency::ConsistencyModel;
use crate::graph::PartitionerKind;
use crate::scheduler::SchedulerKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Engine settings, shared by both engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Active-set queue discipline
    pub scheduler: SchedulerKind,
    /// Mutual exclusion for the asynchronous engine
    pub consistency: ConsistencyModel,
    /// Round limit for the synchronous engine
    pub max_iterations: Option<usize>,
    /// Wall-clock limit, in milliseconds
    pub timeout_ms: Option<u64>,
    /// Concurrent activations per machine (asynchronous engine)
    pub workers: usize,
    /// Record activation spans
    pub trace_activations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::Fifo,
            consistency: ConsistencyModel::Edge,
            max_iterations: None,
            timeout_ms: None,
            workers: 4,
            trace_activations: false,
        }
    }
}

impl EngineConfig {
    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyModel) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_trace(mut self, trace_activations: bool) -> Self {
        self.trace_activations = trace_activations;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.max_iterations == Some(0) {
            return Err(ConfigError::Invalid("max_iterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Size and placement of the simulated cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub machines: usize,
    pub partitioner: PartitionerKind,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            machines: 2,
            partitioner: PartitionerKind::Hash,
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub cluster: ClusterConfig,
    pub engine: EngineConfig,
}

impl GasConfig {
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: GasConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.cluster.machines == 0 {
            return Err(ConfigError::Invalid("cluster needs at least one machine".to_string()));
        }
        self.engine.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GasConfig::default();
        assert_eq!(config.cluster.machines, 2);
        assert_eq!(config.engine.consistency, ConsistencyModel::Edge);
        assert_eq!(config.engine.timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let config = GasConfig::from_yaml_str(
            "cluster:\n  machines: 4\n  partitioner: modulo\nengine:\n  scheduler: priority\n  consistency: full\n  timeout_ms: 250\n",
        )
        .unwrap();
        assert_eq!(config.cluster.machines, 4);
        assert_eq!(config.cluster.partitioner, PartitionerKind::Modulo);
        assert_eq!(config.engine.scheduler, SchedulerKind::Priority);
        assert_eq!(config.engine.consistency, ConsistencyModel::Full);
        assert_eq!(config.engine.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.engine.workers, 4);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            GasConfig::from_yaml_str("cluster:\n  machines: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GasConfig::from_yaml_str("engine:\n  workers: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GasConfig::from_yaml_str("engine:\n  consistency: sometimes\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let config = GasConfig {
            cluster: ClusterConfig {
                machines: 3,
                partitioner: PartitionerKind::Hash,
            },
            engine: EngineConfig::default().with_max_iterations(10).with_trace(true),
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_yaml().unwrap().as_bytes()).unwrap();
        let loaded = GasConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
