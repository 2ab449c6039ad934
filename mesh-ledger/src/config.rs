//! Configuration for the node core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Node name used in logs
    pub node_name: String,

    /// Optional balance snapshot (JSON) loaded at first start
    pub snapshot_file: Option<PathBuf>,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Confirmation pipeline configuration
    pub pipeline: PipelineConfig,

    /// DAG cluster configuration
    pub cluster: ClusterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/meshnode"),
            node_name: "meshnode".to_string(),
            snapshot_file: None,
            rocksdb: RocksDBConfig::default(),
            pipeline: PipelineConfig::default(),
            cluster: ClusterConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 256,      // 256 MB
            max_write_buffer_number: 4,
            target_file_size_mb: 256,       // 256 MB
            max_background_jobs: 4,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: true,
        }
    }
}

/// Confirmation pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Signal mailbox capacity (bounded for backpressure)
    pub queue_capacity: usize,

    /// Warn when this many index signals are parked waiting for a gap
    pub waiting_warn_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            waiting_warn_threshold: 100,
        }
    }
}

/// DAG cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Delay between trust-chain scans (milliseconds)
    pub scan_period_ms: u64,

    /// Delay before the first trust-chain scan (milliseconds)
    pub scan_initial_delay_ms: u64,

    /// Cumulative trust required for trust-chain confirmation
    pub trust_chain_threshold: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            scan_period_ms: 3000,          // 3s between scans
            scan_initial_delay_ms: 1000,
            trust_chain_threshold: 300.0,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("MESHNODE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(node_name) = std::env::var("MESHNODE_NODE_NAME") {
            config.node_name = node_name;
        }

        if let Ok(snapshot_file) = std::env::var("MESHNODE_SNAPSHOT_FILE") {
            config.snapshot_file = Some(PathBuf::from(snapshot_file));
        }

        Ok(config)
    }
}
