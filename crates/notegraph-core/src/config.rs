use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Cross-reference engine tunables.
///
/// Unknown keys are rejected at deserialization time; every recognized key
/// has an explicit default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct XrefConfig {
    /// Minimum similarity score for a `similar` edge.
    pub threshold: f64,
    /// Cap on suggested edges per document.
    pub max_suggestions: usize,
}

impl Default for XrefConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            max_suggestions: 5,
        }
    }
}

/// Organization sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyncConfig {
    /// Root directory containing target repositories.
    pub org_root: PathBuf,
    /// Proceed over conflicting target files without confirmation.
    pub auto_commit: bool,
    /// Push after each successful commit.
    pub push_on_sync: bool,
    pub branch: String,
    /// Template supporting `{timestamp}` and `{fileCount}` placeholders.
    pub commit_template: String,
    pub push_attempts: u32,
    pub push_base_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            org_root: PathBuf::from("."),
            auto_commit: false,
            push_on_sync: false,
            branch: "main".to_string(),
            commit_template: "notes: sync {fileCount} files at {timestamp}".to_string(),
            push_attempts: 3,
            push_base_delay_ms: 500,
        }
    }
}

/// A single remote AI service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-request deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl ServiceConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            enabled: true,
            request_timeout_ms: default_request_timeout_ms(),
            options: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Configuration for the AI service client manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServicesConfig {
    /// Named service endpoints. The manager expects `semantic_query` and
    /// `knowledge_link` entries; extra services are probed but unused.
    pub services: BTreeMap<String, ServiceConfig>,
    /// Health probe deadline in milliseconds.
    pub health_timeout_ms: u64,
    /// How long a probe result stays fresh.
    pub health_cache_ttl_ms: u64,
    /// Consecutive failures before the circuit breaker trips.
    pub breaker_threshold: u32,
    /// Rolling window for consecutive-failure accounting.
    pub breaker_window_ms: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Upper bound on concurrently outstanding outbound calls.
    pub max_fan_out: usize,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            "semantic_query".to_string(),
            ServiceConfig::new("localhost", 8010),
        );
        services.insert(
            "knowledge_link".to_string(),
            ServiceConfig::new("localhost", 8011),
        );

        Self {
            services,
            health_timeout_ms: 5_000,
            health_cache_ttl_ms: 15_000,
            breaker_threshold: 3,
            breaker_window_ms: 60_000,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            max_fan_out: 4,
        }
    }
}

/// Pipeline executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    /// Worker pool bound for batch runs.
    pub max_parallel: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_parallel: 4 }
    }
}

/// Top-level configuration consumed from the external loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NotegraphConfig {
    pub pipeline: PipelineConfig,
    pub xref: XrefConfig,
    pub sync: SyncConfig,
    pub services: ServicesConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NotegraphConfig::default();

        assert!((config.xref.threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.xref.max_suggestions, 5);
        assert_eq!(config.services.breaker_threshold, 3);
        assert!(!config.sync.auto_commit);
        assert!(config.services.services.contains_key("semantic_query"));
        assert!(config.services.services.contains_key("knowledge_link"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<XrefConfig, _> =
            serde_json::from_str(r#"{"threshold": 0.8, "treshold": 0.9}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"auto_commit": true}"#).unwrap();

        assert!(config.auto_commit);
        assert_eq!(config.branch, "main");
        assert_eq!(config.push_attempts, 3);
    }

    #[test]
    fn test_service_base_url() {
        let service = ServiceConfig::new("notes.internal", 9000);
        assert_eq!(service.base_url(), "http://notes.internal:9000");
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = NotegraphConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: NotegraphConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.services.services.len(), config.services.services.len());
        assert_eq!(parsed.sync.branch, config.sync.branch);
    }
}
