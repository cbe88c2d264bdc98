use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ServiceConfig;

use super::{HealthReport, HealthState, ServiceError, ServiceResult};

/// Wire shape of a health probe response.
#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
    #[serde(default)]
    #[allow(dead_code)]
    latency: Option<f64>,
}

/// HTTP client for one remote AI service.
///
/// Every call runs under its own deadline so one slow service cannot hold
/// up concurrent calls to others; overruns surface as `DeadlineExceeded`
/// and count as failures for breaker accounting.
pub struct ServiceClient {
    name: String,
    base_url: String,
    request_timeout: Duration,
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(name: impl Into<String>, config: &ServiceConfig) -> ServiceResult<Self> {
        let name = name.into();
        let base_url = config.base_url();
        url::Url::parse(&base_url).map_err(|e| ServiceError::InvalidResponse {
            service: name.clone(),
            detail: format!("invalid base url {base_url}: {e}"),
        })?;

        let request_timeout = Duration::from_millis(config.request_timeout_ms);
        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            name,
            base_url,
            request_timeout,
            http,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Probe `GET /health` under `deadline` and classify the result.
    ///
    /// Never returns an error: unreachable or misbehaving services classify
    /// as `Down`.
    pub async fn probe_health(&self, deadline: Duration) -> HealthReport {
        let start = Instant::now();
        let url = format!("{}/health", self.base_url);

        let outcome = tokio::time::timeout(deadline, self.http.get(&url).send()).await;
        let elapsed = start.elapsed().as_millis() as u64;

        let response = match outcome {
            Err(_) => {
                return HealthReport::new(&self.name, HealthState::Down)
                    .with_note("health probe timed out");
            }
            Ok(Err(e)) => {
                return HealthReport::new(&self.name, HealthState::Down)
                    .with_note(format!("health probe failed: {e}"));
            }
            Ok(Ok(response)) => response,
        };

        if !response.status().is_success() {
            return HealthReport::new(&self.name, HealthState::Down)
                .with_latency(elapsed)
                .with_note(format!("health endpoint returned {}", response.status()));
        }

        let state = match response.json::<HealthBody>().await {
            Ok(body) if body.status == "ok" || body.status == "healthy" => HealthState::Healthy,
            Ok(_) => HealthState::Degraded,
            // Reachable but not speaking the contract.
            Err(_) => HealthState::Degraded,
        };

        HealthReport::new(&self.name, state).with_latency(elapsed)
    }

    /// POST a JSON body and decode a JSON response, under this client's
    /// deadline.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> ServiceResult<R>
    where
        B: serde::Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let outcome = tokio::time::timeout(
            self.request_timeout,
            self.http.post(&url).json(body).send(),
        )
        .await;

        let response = match outcome {
            Err(_) => return Err(ServiceError::DeadlineExceeded(self.name.clone())),
            Ok(result) => result?,
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(ServiceError::ServerError {
                service: self.name.clone(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ServiceError::InvalidResponse {
                service: self.name.clone(),
                detail: format!("unexpected status {status}"),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ServiceError::InvalidResponse {
                service: self.name.clone(),
                detail: e.to_string(),
            })
    }
}
