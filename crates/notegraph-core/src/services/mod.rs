pub mod breaker;
pub mod client;
pub mod manager;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ServiceConfig;

pub use breaker::CircuitBreaker;
pub use client::ServiceClient;
pub use manager::ServiceClientManager;

/// Name of the service answering natural-language queries.
pub const SEMANTIC_QUERY: &str = "semantic_query";
/// Name of the service suggesting links between documents.
pub const KNOWLEDGE_LINK: &str = "knowledge_link";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Service {0} is not configured")]
    UnknownService(String),
    #[error("Service {0} is disabled")]
    Disabled(String),
    #[error("Circuit open for service {0}")]
    CircuitOpen(String),
    #[error("Deadline exceeded calling {0}")]
    DeadlineExceeded(String),
    #[error("Server error from {service}: status {status}")]
    ServerError { service: String, status: u16 },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid response from {service}: {detail}")]
    InvalidResponse { service: String, detail: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Failures that count toward retry and circuit-breaker accounting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeadlineExceeded(_) | Self::ServerError { .. } | Self::Http(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Unknown,
    Healthy,
    Degraded,
    Down,
}

/// Result of one health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub service: String,
    pub state: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    #[must_use]
    pub fn new(service: impl Into<String>, state: HealthState) -> Self {
        Self {
            service: service.into(),
            state,
            latency_ms: None,
            note: None,
            checked_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Runtime view of one configured remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub enabled: bool,
    pub health: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    pub config: ServiceConfig,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: ServiceConfig) -> Self {
        Self {
            name: name.into(),
            host: config.host.clone(),
            port: config.port,
            enabled: config.enabled,
            health: HealthState::Unknown,
            last_checked: None,
            config,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
    pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDocument {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub score: f64,
}

/// Answer from the semantic-query service.
///
/// `degraded` responses are non-authoritative: the service was unreachable
/// and the document list is empty. Callers must never treat them as fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub documents: Vec<RankedDocument>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl QueryResponse {
    #[must_use]
    pub fn degraded(note: impl Into<String>) -> Self {
        Self {
            answer: None,
            documents: Vec::new(),
            degraded: true,
            note: Some(note.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub document_id: Uuid,
    pub content: String,
}

/// Where a suggested link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOrigin {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedLink {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub kind: String,
    pub score: f64,
    pub origin: LinkOrigin,
}

/// Insights plus suggested links, merged from the knowledge-linking
/// service and the local cross-reference graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub insights: serde_json::Value,
    pub links: Vec<SuggestedLink>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_query_response_shape() {
        let response = QueryResponse::degraded("semantic_query unreachable");

        assert!(response.degraded);
        assert!(response.documents.is_empty());
        assert!(response.answer.is_none());
        assert!(response.note.unwrap().contains("unreachable"));
    }

    #[test]
    fn test_error_retryability() {
        assert!(ServiceError::DeadlineExceeded("q".into()).is_retryable());
        assert!(ServiceError::ServerError {
            service: "q".into(),
            status: 503
        }
        .is_retryable());
        assert!(!ServiceError::Disabled("q".into()).is_retryable());
        assert!(!ServiceError::CircuitOpen("q".into()).is_retryable());
    }

    #[test]
    fn test_descriptor_from_config() {
        let config = ServiceConfig::new("localhost", 8010);
        let descriptor = ServiceDescriptor::from_config("semantic_query", config);

        assert_eq!(descriptor.health, HealthState::Unknown);
        assert!(descriptor.enabled);
        assert!(descriptor.last_checked.is_none());
    }

    #[test]
    fn test_envelope_serialization() {
        let request = QueryRequest {
            text: "What is recursion?".into(),
            filters: BTreeMap::from([("course".to_string(), "CS101".to_string())]),
            top_k: 5,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["text"], "What is recursion?");
        assert_eq!(json["filters"]["course"], "CS101");
        assert_eq!(json["top_k"], 5);
    }
}
