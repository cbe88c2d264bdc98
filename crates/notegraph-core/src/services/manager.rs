use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Deserialize;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::ServicesConfig;
use crate::xref::CrossReferenceEdge;
use crate::{Error, Result};

use super::breaker::CircuitBreaker;
use super::client::ServiceClient;
use super::{
    AnalyzeRequest, AnalyzeResponse, HealthReport, HealthState, LinkOrigin, QueryRequest,
    QueryResponse, RankedDocument, ServiceDescriptor, ServiceError, SuggestedLink,
    KNOWLEDGE_LINK, SEMANTIC_QUERY,
};

const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Deserialize)]
struct QueryWire {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    documents: Vec<RankedDocument>,
}

#[derive(Debug, Deserialize)]
struct RemoteLink {
    target_id: Uuid,
    kind: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct AnalyzeWire {
    #[serde(default)]
    insights: serde_json::Value,
    #[serde(default)]
    links: Vec<RemoteLink>,
}

struct ServiceEntry {
    client: ServiceClient,
    descriptor: Mutex<ServiceDescriptor>,
    breaker: Mutex<CircuitBreaker>,
    cached_health: Mutex<Option<(Instant, HealthReport)>>,
}

/// Dispatches queries and analysis requests to the remote AI services,
/// with health tracking, bounded retries, and circuit breaking.
///
/// Query and analyze never fail outright: exhausted retries produce a
/// response flagged `degraded` so callers can distinguish partial results
/// from authoritative ones.
pub struct ServiceClientManager {
    config: ServicesConfig,
    services: BTreeMap<String, ServiceEntry>,
    fan_out: Arc<Semaphore>,
}

impl ServiceClientManager {
    pub fn new(config: ServicesConfig) -> Result<Self> {
        let mut services = BTreeMap::new();

        for (name, service_config) in &config.services {
            let client = ServiceClient::new(name, service_config)
                .map_err(|e| Error::Configuration(format!("service {name}: {e}")))?;

            services.insert(
                name.clone(),
                ServiceEntry {
                    client,
                    descriptor: Mutex::new(ServiceDescriptor::from_config(
                        name,
                        service_config.clone(),
                    )),
                    breaker: Mutex::new(CircuitBreaker::new(
                        config.breaker_threshold,
                        Duration::from_millis(config.breaker_window_ms),
                    )),
                    cached_health: Mutex::new(None),
                },
            );
        }

        Ok(Self {
            fan_out: Arc::new(Semaphore::new(config.max_fan_out.max(1))),
            config,
            services,
        })
    }

    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn descriptor(&self, name: &str) -> Result<ServiceDescriptor> {
        let entry = self
            .services
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("service not configured: {name}")))?;
        Ok(entry.descriptor.lock().expect("descriptor lock").clone())
    }

    /// Probe one service's health, with a short-TTL cache so repeated calls
    /// do not turn into probe storms.
    ///
    /// A responsive probe (healthy or degraded) closes the service's
    /// circuit breaker.
    pub async fn health(&self, name: &str) -> Result<HealthReport> {
        let entry = self
            .services
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("service not configured: {name}")))?;

        if !entry.descriptor.lock().expect("descriptor lock").enabled {
            return Ok(HealthReport::new(name, HealthState::Down).with_note("service disabled"));
        }

        let ttl = Duration::from_millis(self.config.health_cache_ttl_ms);
        {
            let cached = entry.cached_health.lock().expect("health cache lock");
            if let Some((at, report)) = cached.as_ref() {
                if at.elapsed() < ttl {
                    return Ok(report.clone());
                }
            }
        }

        let _permit = self.fan_out.clone().acquire_owned().await;
        let report = entry
            .client
            .probe_health(Duration::from_millis(self.config.health_timeout_ms))
            .await;

        {
            let mut breaker = entry.breaker.lock().expect("breaker lock");
            match report.state {
                HealthState::Healthy | HealthState::Degraded => breaker.record_success(),
                HealthState::Down | HealthState::Unknown => breaker.record_failure(),
            }
        }
        {
            let mut descriptor = entry.descriptor.lock().expect("descriptor lock");
            descriptor.health = report.state;
            descriptor.last_checked = Some(report.checked_at);
        }
        *entry.cached_health.lock().expect("health cache lock") =
            Some((Instant::now(), report.clone()));

        Ok(report)
    }

    /// Probe every configured service concurrently.
    ///
    /// Always returns exactly one report per configured service, however
    /// many are unreachable or disabled.
    pub async fn health_detailed(&self) -> Vec<HealthReport> {
        let names = self.service_names();
        let probes = names.iter().map(|name| self.health(name));
        let results = futures::future::join_all(probes).await;

        names
            .iter()
            .zip(results)
            .map(|(name, result)| {
                result.unwrap_or_else(|e| {
                    HealthReport::new(name.clone(), HealthState::Unknown).with_note(e.to_string())
                })
            })
            .collect()
    }

    /// Ask the semantic-query service a natural-language question.
    ///
    /// Degrades rather than fails: timeouts, connection errors, and server
    /// errors are retried with exponential backoff, and an exhausted or
    /// short-circuited call yields a `degraded` response.
    pub async fn query(&self, text: &str, filters: BTreeMap<String, String>) -> QueryResponse {
        let request = QueryRequest {
            text: text.to_string(),
            filters,
            top_k: DEFAULT_TOP_K,
        };

        match self
            .call_with_retry::<_, QueryWire>(SEMANTIC_QUERY, "query", &request)
            .await
        {
            Ok(wire) => {
                let mut documents = wire.documents;
                documents.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.id.cmp(&b.id))
                });
                QueryResponse {
                    answer: wire.answer,
                    documents,
                    degraded: false,
                    note: None,
                }
            }
            Err(e) => {
                tracing::warn!("Query degraded: {e}");
                QueryResponse::degraded(format!("semantic query unavailable: {e}"))
            }
        }
    }

    /// Analyze a document via the knowledge-linking service and merge its
    /// suggested links with the local cross-reference edges.
    ///
    /// On service unavailability this silently falls back to local-only
    /// relations, marked `degraded`.
    pub async fn analyze(
        &self,
        document_id: Uuid,
        content: &str,
        local_edges: &[CrossReferenceEdge],
    ) -> AnalyzeResponse {
        let local_links: Vec<SuggestedLink> = local_edges
            .iter()
            .map(|edge| SuggestedLink {
                source_id: edge.source_id,
                target_id: edge.target_id,
                kind: edge.kind.as_str().to_string(),
                score: edge.score,
                origin: LinkOrigin::Local,
            })
            .collect();

        let request = AnalyzeRequest {
            document_id,
            content: content.to_string(),
        };

        match self
            .call_with_retry::<_, AnalyzeWire>(KNOWLEDGE_LINK, "analyze", &request)
            .await
        {
            Ok(wire) => {
                let mut links = local_links;
                links.extend(wire.links.into_iter().map(|link| SuggestedLink {
                    source_id: document_id,
                    target_id: link.target_id,
                    kind: link.kind,
                    score: link.score,
                    origin: LinkOrigin::Remote,
                }));
                AnalyzeResponse {
                    insights: wire.insights,
                    links,
                    degraded: false,
                    note: None,
                }
            }
            Err(e) => {
                tracing::warn!("Analyze falling back to local relations: {e}");
                AnalyzeResponse {
                    insights: serde_json::Value::Null,
                    links: local_links,
                    degraded: true,
                    note: Some(format!("knowledge link unavailable: {e}")),
                }
            }
        }
    }

    async fn call_with_retry<B, R>(&self, service: &str, path: &str, body: &B) -> Result<R>
    where
        B: serde::Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let entry = self
            .services
            .get(service)
            .ok_or_else(|| Error::ServiceUnavailable(format!("{service} not configured")))?;

        if !entry.descriptor.lock().expect("descriptor lock").enabled {
            return Err(Error::ServiceUnavailable(format!("{service} disabled")));
        }
        if entry.breaker.lock().expect("breaker lock").is_open() {
            return Err(Error::ServiceUnavailable(format!(
                "circuit open for {service}"
            )));
        }

        let attempts = self.config.retry_attempts.max(1);
        let mut last_error: Option<ServiceError> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                self.backoff(attempt).await;
            }

            let _permit = self.fan_out.clone().acquire_owned().await;
            match entry.client.post_json::<B, R>(path, body).await {
                Ok(response) => {
                    entry.breaker.lock().expect("breaker lock").record_success();
                    return Ok(response);
                }
                Err(e) if e.is_retryable() => {
                    let open = {
                        let mut breaker = entry.breaker.lock().expect("breaker lock");
                        breaker.record_failure();
                        breaker.is_open()
                    };
                    tracing::warn!("Call to {service}/{path} failed (attempt {attempt}): {e}");
                    last_error = Some(e);
                    if open {
                        break;
                    }
                }
                Err(e) => {
                    return Err(Error::ServiceUnavailable(format!("{service}: {e}")));
                }
            }
        }

        let detail = last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string());
        Err(Error::ServiceUnavailable(format!("{service}: {detail}")))
    }

    /// Exponential backoff with a little jitter to avoid thundering herds.
    async fn backoff(&self, attempt: u32) {
        let base = self.config.retry_base_delay_ms.max(1);
        let exp = base.saturating_mul(1 << attempt.min(6));
        let jitter = rand::rng().random_range(0..=base / 2 + 1);
        tokio::time::sleep(Duration::from_millis(exp + jitter)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::xref::EdgeKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// HTTP server answering every connection with the same canned body.
    async fn canned_server(body: &'static str) -> ServiceConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 8192];
                    let _ = stream.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        ServiceConfig::new("127.0.0.1", port)
    }

    fn unreachable_service() -> ServiceConfig {
        // Nothing listens on port 1.
        ServiceConfig::new("127.0.0.1", 1)
    }

    fn fast_config(services: BTreeMap<String, ServiceConfig>) -> ServicesConfig {
        ServicesConfig {
            services,
            retry_attempts: 1,
            retry_base_delay_ms: 1,
            health_cache_ttl_ms: 10_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_query_preserves_descending_score_order() {
        let service = canned_server(
            r#"{"answer":"Recursion is self-reference.","documents":[{"id":"d2","score":0.81},{"id":"d1","score":0.92}]}"#,
        )
        .await;

        let config = fast_config(BTreeMap::from([(SEMANTIC_QUERY.to_string(), service)]));
        let manager = ServiceClientManager::new(config).unwrap();

        let filters = BTreeMap::from([("course".to_string(), "CS101".to_string())]);
        let response = manager.query("What is recursion?", filters).await;

        assert!(!response.degraded);
        assert_eq!(response.answer.as_deref(), Some("Recursion is self-reference."));
        let ids: Vec<&str> = response.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert!(response.documents[0].score > response.documents[1].score);
    }

    #[tokio::test]
    async fn test_query_degrades_when_unreachable() {
        let config = fast_config(BTreeMap::from([(
            SEMANTIC_QUERY.to_string(),
            unreachable_service(),
        )]));
        let manager = ServiceClientManager::new(config).unwrap();

        let response = manager.query("anything", BTreeMap::new()).await;

        assert!(response.degraded);
        assert!(response.documents.is_empty());
        assert!(response.note.is_some());
    }

    #[tokio::test]
    async fn test_circuit_breaker_short_circuits_fourth_call() {
        let mut config = fast_config(BTreeMap::from([(
            SEMANTIC_QUERY.to_string(),
            unreachable_service(),
        )]));
        config.breaker_threshold = 3;
        let manager = ServiceClientManager::new(config).unwrap();

        for _ in 0..3 {
            let response = manager.query("q", BTreeMap::new()).await;
            assert!(response.degraded);
        }

        let start = Instant::now();
        let response = manager.query("q", BTreeMap::new()).await;
        let elapsed = start.elapsed();

        assert!(response.degraded);
        assert!(response.note.unwrap().contains("circuit open"));
        assert!(elapsed < Duration::from_millis(200), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_health_probe_closes_breaker() {
        let reachable = canned_server(r#"{"status":"ok"}"#).await;
        let mut config = fast_config(BTreeMap::from([(
            SEMANTIC_QUERY.to_string(),
            reachable.clone(),
        )]));
        config.breaker_threshold = 1;
        let manager = ServiceClientManager::new(config).unwrap();

        // Trip the breaker by hand, then verify a probe resets it.
        {
            let entry = manager.services.get(SEMANTIC_QUERY).unwrap();
            entry.breaker.lock().unwrap().record_failure();
            assert!(entry.breaker.lock().unwrap().is_open());
        }

        let report = manager.health(SEMANTIC_QUERY).await.unwrap();
        assert_eq!(report.state, HealthState::Healthy);

        let entry = manager.services.get(SEMANTIC_QUERY).unwrap();
        assert!(!entry.breaker.lock().unwrap().is_open());
    }

    #[tokio::test]
    async fn test_health_detailed_returns_entry_per_service() {
        let mut services = BTreeMap::from([
            (SEMANTIC_QUERY.to_string(), unreachable_service()),
            (KNOWLEDGE_LINK.to_string(), unreachable_service()),
        ]);
        let mut disabled = unreachable_service();
        disabled.enabled = false;
        services.insert("transcription".to_string(), disabled);

        let manager = ServiceClientManager::new(fast_config(services)).unwrap();
        let reports = manager.health_detailed().await;

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.state == HealthState::Down));
        let disabled_report = reports.iter().find(|r| r.service == "transcription").unwrap();
        assert_eq!(disabled_report.note.as_deref(), Some("service disabled"));
    }

    #[tokio::test]
    async fn test_health_is_cached_within_ttl() {
        let service = canned_server(r#"{"status":"ok"}"#).await;
        let config = fast_config(BTreeMap::from([(SEMANTIC_QUERY.to_string(), service)]));
        let manager = ServiceClientManager::new(config).unwrap();

        let first = manager.health(SEMANTIC_QUERY).await.unwrap();
        let second = manager.health(SEMANTIC_QUERY).await.unwrap();

        assert_eq!(first.checked_at, second.checked_at);
    }

    #[tokio::test]
    async fn test_analyze_merges_remote_and_local_links() {
        let doc_id = Uuid::now_v7();
        let peer = Uuid::now_v7();
        let remote_target = Uuid::now_v7();

        let body: &'static str = Box::leak(
            format!(
                r#"{{"insights":{{"summary":"ok"}},"links":[{{"target_id":"{remote_target}","kind":"prerequisite","score":0.88}}]}}"#
            )
            .into_boxed_str(),
        );
        let service = canned_server(body).await;
        let config = fast_config(BTreeMap::from([(KNOWLEDGE_LINK.to_string(), service)]));
        let manager = ServiceClientManager::new(config).unwrap();

        let local = vec![CrossReferenceEdge::new(doc_id, peer, 0.8, EdgeKind::Similar).unwrap()];
        let response = manager.analyze(doc_id, "content", &local).await;

        assert!(!response.degraded);
        assert_eq!(response.links.len(), 2);
        assert!(response
            .links
            .iter()
            .any(|l| l.origin == LinkOrigin::Local && l.target_id == peer));
        assert!(response
            .links
            .iter()
            .any(|l| l.origin == LinkOrigin::Remote && l.target_id == remote_target));
    }

    #[tokio::test]
    async fn test_analyze_falls_back_to_local_only() {
        let doc_id = Uuid::now_v7();
        let peer = Uuid::now_v7();

        let config = fast_config(BTreeMap::from([(
            KNOWLEDGE_LINK.to_string(),
            unreachable_service(),
        )]));
        let manager = ServiceClientManager::new(config).unwrap();

        let local = vec![CrossReferenceEdge::new(doc_id, peer, 0.8, EdgeKind::Similar).unwrap()];
        let response = manager.analyze(doc_id, "content", &local).await;

        assert!(response.degraded);
        assert_eq!(response.links.len(), 1);
        assert_eq!(response.links[0].origin, LinkOrigin::Local);
    }
}
