use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::health_store::Target;

/// Outcome of a single provider check.
///
/// Infallible by signature: transport failures, bad payloads, and provider-
/// reported problems all arrive as `ok = false` with a reason, so the
/// scheduler classifies every outcome uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCheckOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RawCheckOutcome {
    pub fn healthy() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// Capability to check one target's health, injected per provider.
#[async_trait]
pub trait HealthCheckPort: Send + Sync {
    async fn check(&self, target: &Target) -> RawCheckOutcome;
}

/// Body returned by provider health endpoints.
#[derive(Debug, Deserialize)]
struct ServiceHealthBody {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Reference HTTP adapter: GET `{base}/{service}/health` on the provider's
/// configured base URL.
pub struct HttpHealthCheck {
    client: Client,
    provider_urls: HashMap<String, String>,
}

impl HttpHealthCheck {
    pub fn new(
        timeout: Duration,
        provider_urls: HashMap<String, String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            provider_urls,
        })
    }

    fn url_for(&self, target: &Target) -> Option<String> {
        self.provider_urls.get(&target.provider).map(|base| {
            format!("{}/{}/health", base.trim_end_matches('/'), target.service)
        })
    }
}

#[async_trait]
impl HealthCheckPort for HttpHealthCheck {
    async fn check(&self, target: &Target) -> RawCheckOutcome {
        let Some(url) = self.url_for(target) else {
            return RawCheckOutcome::failed(format!(
                "no health endpoint configured for provider {}",
                target.provider
            ));
        };

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return RawCheckOutcome::failed(e.to_string()),
        };

        if !response.status().is_success() {
            return RawCheckOutcome::failed(format!(
                "health endpoint returned {}",
                response.status()
            ));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return RawCheckOutcome::failed(e.to_string()),
        };
        match serde_json::from_str::<ServiceHealthBody>(&body) {
            Ok(health) if health.ok => RawCheckOutcome::healthy(),
            Ok(health) => RawCheckOutcome::failed(
                health
                    .error
                    .unwrap_or_else(|| "provider reported unhealthy".to_string()),
            ),
            Err(e) => RawCheckOutcome::failed(format!("invalid health payload: {e}")),
        }
    }
}

/// Scripted check port for tests: outcomes are consumed per target in
/// order, then the default outcome repeats.
pub struct MockHealthCheck {
    scripts: Mutex<HashMap<Target, VecDeque<RawCheckOutcome>>>,
    default_outcome: RawCheckOutcome,
    calls: Mutex<HashMap<Target, usize>>,
}

impl MockHealthCheck {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_outcome: RawCheckOutcome::healthy(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default(mut self, outcome: RawCheckOutcome) -> Self {
        self.default_outcome = outcome;
        self
    }

    pub fn with_outcomes(
        self,
        target: &Target,
        outcomes: impl IntoIterator<Item = RawCheckOutcome>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(target.clone())
            .or_default()
            .extend(outcomes);
        self
    }

    /// How many times `check` has been invoked for a target.
    pub fn check_count(&self, target: &Target) -> usize {
        self.calls.lock().unwrap().get(target).copied().unwrap_or(0)
    }
}

impl Default for MockHealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthCheckPort for MockHealthCheck {
    async fn check(&self, target: &Target) -> RawCheckOutcome {
        *self.calls.lock().unwrap().entry(target.clone()).or_insert(0) += 1;
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .get_mut(target)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.default_outcome.clone())
    }
}
