//! Upstream gateway: one shared connection pool, per-destination concurrency gates.
//!
//! Every outbound provider call goes through [`UpstreamGateway::call`]. The gateway
//! bounds concurrency and applies timeouts; it never retries and never caches.
//! Callers decide what to do with failures.

use crate::error::{Error, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Connect timeout for every outbound request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default overall timeout when the request does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Concurrency slots for the valuation provider.
pub const VALUATION_SLOTS: usize = 8;

/// Concurrency slots for everything else.
pub const GENERAL_SLOTS: usize = 16;

/// Named admission gate a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// CoinGecko catalogue and per-coin detail.
    Valuation,
    /// Exchange REST, FX providers, scraping.
    General,
}

impl Destination {
    pub fn as_str(self) -> &'static str {
        match self {
            Destination::Valuation => "valuation",
            Destination::General => "general",
        }
    }
}

/// Outbound GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Overall budget; `None` uses the client default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam. The gateway owns one of these for its whole lifetime.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport. The pooled client is built on first use.
pub struct ReqwestHttpClient {
    client: OnceLock<reqwest::Client>,
    default_timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self {
            client: OnceLock::new(),
            default_timeout,
        }
    }

    fn client(&self, url: &str) -> Result<&reqwest::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(self.default_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| Error::Transport {
                url: url.to_string(),
                message: e.to_string(),
                timeout: false,
            })?;
        Ok(self.client.get_or_init(|| built))
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let transport = |e: reqwest::Error| Error::Transport {
            url: request.url.clone(),
            message: e.to_string(),
            timeout: e.is_timeout(),
        };

        let mut builder = self.client(&request.url)?.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;

        Ok(HttpResponse { status, body })
    }
}

/// Shared outbound gateway.
pub struct UpstreamGateway {
    http: Arc<dyn HttpClient>,
    gates: HashMap<Destination, Arc<Semaphore>>,
}

impl UpstreamGateway {
    /// Gateway over reqwest with the default gate sizes.
    pub fn new() -> Self {
        Self::with_client(Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_client(http: Arc<dyn HttpClient>) -> Self {
        Self::with_limits(http, VALUATION_SLOTS, GENERAL_SLOTS)
    }

    pub fn with_limits(http: Arc<dyn HttpClient>, valuation: usize, general: usize) -> Self {
        let mut gates = HashMap::new();
        gates.insert(Destination::Valuation, Arc::new(Semaphore::new(valuation)));
        gates.insert(Destination::General, Arc::new(Semaphore::new(general)));
        Self { http, gates }
    }

    /// Free slots at `destination` right now.
    pub fn available(&self, destination: Destination) -> usize {
        self.gates
            .get(&destination)
            .map(|g| g.available_permits())
            .unwrap_or(0)
    }

    /// Issue one request through the gate for `destination`.
    /// Non-2xx responses are returned as-is.
    pub async fn call(&self, destination: Destination, request: HttpRequest) -> Result<HttpResponse> {
        let gate = self
            .gates
            .get(&destination)
            .ok_or_else(|| Error::UpstreamData(format!("no gate for {:?}", destination)))?;

        let _permit = gate.acquire().await.map_err(|_| Error::Transport {
            url: request.url.clone(),
            message: "gate closed".to_string(),
            timeout: false,
        })?;

        counter!("upstream_requests_total", "destination" => destination.as_str()).increment(1);
        debug!("GET {} ({})", request.url, destination.as_str());

        match self.http.execute(&request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                counter!("upstream_errors_total", "destination" => destination.as_str(), "kind" => e.kind()).increment(1);
                Err(e)
            }
        }
    }

    /// `call`, then require 2xx and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        destination: Destination,
        request: HttpRequest,
    ) -> Result<T> {
        let url = request.url.clone();
        let response = self.call(destination, request).await?;
        if !response.is_success() {
            counter!("upstream_errors_total", "destination" => destination.as_str(), "kind" => "status").increment(1);
            return Err(Error::UpstreamStatus {
                url,
                status: response.status,
            });
        }
        Ok(serde_json::from_str(&response.body)?)
    }

    /// `call`, then require 2xx and return the raw body.
    pub async fn get_text(&self, destination: Destination, request: HttpRequest) -> Result<String> {
        let url = request.url.clone();
        let response = self.call(destination, request).await?;
        if !response.is_success() {
            return Err(Error::UpstreamStatus {
                url,
                status: response.status,
            });
        }
        Ok(response.body)
    }
}

impl Default for UpstreamGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Canned transport for tests and offline runs.
///
/// Routes are matched by URL prefix, longest prefix first. Unrouted URLs fail
/// with a transport error. Every request is recorded.
#[derive(Default)]
pub struct StaticHttpClient {
    routes: Mutex<Vec<(String, std::result::Result<HttpResponse, String>)>>,
    requests: Mutex<Vec<String>>,
}

impl StaticHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to URLs starting with `prefix`.
    pub fn route(self, prefix: impl Into<String>, response: HttpResponse) -> Self {
        self.set_route(prefix, Ok(response));
        self
    }

    /// Fail URLs starting with `prefix` with a transport error.
    pub fn fail(self, prefix: impl Into<String>, message: impl Into<String>) -> Self {
        self.set_route(prefix, Err(message.into()));
        self
    }

    /// Replace or add a route after construction.
    pub fn set_route(
        &self,
        prefix: impl Into<String>,
        response: std::result::Result<HttpResponse, String>,
    ) {
        let prefix = prefix.into();
        let mut routes = self.routes.lock().unwrap_or_else(|p| p.into_inner());
        routes.retain(|(p, _)| *p != prefix);
        routes.push((prefix, response));
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Number of recorded requests whose URL starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.requests().iter().filter(|u| u.starts_with(prefix)).count()
    }
}

#[async_trait]
impl HttpClient for StaticHttpClient {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.url.clone());

        let routes = self.routes.lock().unwrap_or_else(|p| p.into_inner());
        let hit = routes
            .iter()
            .find(|(prefix, _)| request.url.starts_with(prefix.as_str()));

        match hit {
            Some((_, Ok(response))) => Ok(response.clone()),
            Some((_, Err(message))) => Err(Error::Transport {
                url: request.url.clone(),
                message: message.clone(),
                timeout: false,
            }),
            None => Err(Error::Transport {
                url: request.url.clone(),
                message: "no route".to_string(),
                timeout: false,
            }),
        }
    }
}
