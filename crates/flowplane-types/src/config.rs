//! Control plane configuration types.
//!
//! `ControlPlaneConfig` represents the `config.toml` in the data directory.
//! Every field has a default so an empty or partial file is valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub phase_retry: PhaseRetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub locks: LockConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    /// A structural edit by a different user within this window is rejected.
    #[serde(default = "default_edit_lock_window_secs")]
    pub edit_lock_window_secs: u64,

    /// Base URL of the trigger engine.
    #[serde(default = "default_engine_url")]
    pub engine_url: String,
}

fn default_edit_lock_window_secs() -> u64 {
    60
}

fn default_engine_url() -> String {
    "http://127.0.0.1:3100".to_string()
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            phase_retry: PhaseRetryConfig::default(),
            cache: CacheConfig::default(),
            locks: LockConfig::default(),
            polling: PollingConfig::default(),
            edit_lock_window_secs: default_edit_lock_window_secs(),
            engine_url: default_engine_url(),
        }
    }
}

/// Job queue delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Total attempts per job before compensation runs.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base_ms: u64,
    pub workers: usize,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_base_ms: 2_000,
            workers: 2,
            poll_interval_ms: 500,
        }
    }
}

/// Retry of a single saga phase inside one job attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for PhaseRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Identifier of this deployment, stamped into execution snapshots.
    pub platform_id: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 24 * 60 * 60,
            platform_id: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    /// Page size of the cursor-seeding first poll.
    pub first_poll_limit: usize,
    /// Maximum items returned by a test poll.
    pub test_sample_limit: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            first_poll_limit: 5,
            test_sample_limit: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.queue.max_attempts, 4);
        assert_eq!(config.queue.backoff_base_ms, 2_000);
        assert_eq!(config.cache.ttl_secs, 2_592_000);
        assert_eq!(config.locks.timeout_ms, 10_000);
        assert_eq!(config.polling.first_poll_limit, 5);
        assert_eq!(config.edit_lock_window_secs, 60);
    }

    #[test]
    fn test_deserialize_empty() {
        let config: ControlPlaneConfig = toml::from_str("").unwrap();
        assert_eq!(config, ControlPlaneConfig::default());
    }

    #[test]
    fn test_deserialize_partial_section() {
        let toml_str = r#"
engine_url = "http://engine:8080"

[queue]
workers = 8

[cache]
platform_id = "eu-1"
"#;
        let config: ControlPlaneConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine_url, "http://engine:8080");
        assert_eq!(config.queue.workers, 8);
        assert_eq!(config.queue.max_attempts, 4);
        assert_eq!(config.cache.platform_id, "eu-1");
        assert_eq!(config.cache.ttl_secs, 2_592_000);
    }
}
