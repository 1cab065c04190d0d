//! Resilient HTTP client: retry + circuit breaker + middleware chain
//! wrapped around `reqwest`, pinned to rustls/webpki roots the way the
//! teacher's transport factory does.

pub mod middleware;

pub use middleware::Middleware;

use crate::error::{CoreError, CoreResult};
use crate::request::{Body, Method, Request, Response};
use crate::resilience::{CircuitBreaker, RetryConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Builds the pinned-TLS transport: rustls with the `ring` provider and
/// Mozilla's root store via `webpki-roots`, mirroring the teacher's
/// `http.rs` client factory so every HTTP call in this crate shares one
/// hardened TLS configuration instead of relying on whatever the
/// platform's native store happens to contain.
pub fn build_transport(timeout: Duration) -> CoreResult<reqwest::Client> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .build()
        .map_err(|e| CoreError::Internal(format!("failed to build http transport: {e}")))
}

pub struct ResilientClient {
    transport: reqwest::Client,
    base_url: Option<String>,
    default_headers: BTreeMap<String, String>,
    request_middleware: Vec<Arc<dyn Middleware>>,
    retry_policy: RetryConfig,
    breaker: Option<Arc<CircuitBreaker>>,
}

pub struct ResilientClientBuilder {
    transport: Option<reqwest::Client>,
    base_url: Option<String>,
    default_headers: BTreeMap<String, String>,
    request_middleware: Vec<Arc<dyn Middleware>>,
    retry_policy: RetryConfig,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl Default for ResilientClientBuilder {
    fn default() -> Self {
        Self {
            transport: None,
            base_url: None,
            default_headers: BTreeMap::new(),
            request_middleware: Vec::new(),
            retry_policy: RetryConfig::default(),
            breaker: None,
        }
    }
}

impl ResilientClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: reqwest::Client) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn default_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    pub fn middleware(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.request_middleware.push(mw);
        self
    }

    pub fn retry_policy(mut self, policy: RetryConfig) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn build(self) -> CoreResult<ResilientClient> {
        let transport = match self.transport {
            Some(t) => t,
            None => build_transport(Duration::from_secs(30))?,
        };
        Ok(ResilientClient {
            transport,
            base_url: self.base_url,
            default_headers: self.default_headers,
            request_middleware: self.request_middleware,
            retry_policy: self.retry_policy,
            breaker: self.breaker,
        })
    }
}

impl ResilientClient {
    pub fn builder() -> ResilientClientBuilder {
        ResilientClientBuilder::new()
    }

    fn full_url(&self, url: &str) -> String {
        if url.contains("://") {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), url),
            None => url.to_string(),
        }
    }

    fn merge_headers(&self, request: &mut Request) {
        for (k, v) in &self.default_headers {
            if !request.has_header(k) {
                request.set_header(k.clone(), v.clone());
            }
        }
        if matches!(request.body, Body::Json(_)) && !request.has_header("Content-Type") {
            request.set_header("Content-Type", "application/json");
        }
    }

    async fn dispatch_once(&self, request: &Request) -> CoreResult<Response> {
        let mut builder = self
            .transport
            .request(request.method.to_reqwest(), &request.url);

        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        if !request.query_params.is_empty() {
            builder = builder.query(
                &request
                    .query_params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect::<Vec<_>>(),
            );
        }
        builder = match &request.body {
            Body::Json(value) => builder.json(value),
            Body::Raw { content_type, bytes } => builder.header("Content-Type", content_type).body(bytes.clone()),
            Body::Empty => builder,
        };

        let resp = builder.send().await.map_err(CoreError::from)?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = resp.bytes().await.map_err(CoreError::from)?.to_vec();
        Ok(Response { status, headers, body })
    }

    /// Executes `request` per the spec §4.5 algorithm: breaker admission
    /// check, bounded retries with backoff, request middleware in
    /// declared order, response middleware in reverse.
    pub async fn do_request(&self, mut request: Request, cancel: &CancellationToken) -> CoreResult<Response> {
        if let Some(breaker) = &self.breaker {
            if !breaker.allow() {
                return Err(CoreError::CircuitOpen {
                    name: "client".to_string(),
                });
            }
        }

        request.url = self.full_url(&request.url);
        self.merge_headers(&mut request);

        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut last_err: Option<CoreError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.retry_policy.delay(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(CoreError::Timeout),
                }
            }
            if cancel.is_cancelled() {
                return Err(CoreError::Timeout);
            }

            let mut req = request.clone();
            for mw in &self.request_middleware {
                req = mw.process_request(req)?;
            }

            let dispatch = tokio::select! {
                r = self.dispatch_once(&req) => r,
                _ = cancel.cancelled() => Err(CoreError::Timeout),
            };

            match dispatch {
                Ok(mut resp) => {
                    for mw in self.request_middleware.iter().rev() {
                        resp = mw.process_response(resp)?;
                    }
                    if resp.is_success() {
                        if let Some(breaker) = &self.breaker {
                            breaker.record_success();
                        }
                        return Ok(resp);
                    }
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }
                    let retryable = self.retry_policy.is_retryable(
                        &CoreError::Http {
                            status: resp.status,
                            body: resp.text(),
                        },
                        Some(&resp),
                    );
                    last_err = Some(CoreError::Http {
                        status: resp.status,
                        body: resp.text(),
                    });
                    if !retryable || attempt + 1 >= max_attempts {
                        return Err(last_err.unwrap());
                    }
                }
                Err(e) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }
                    let retryable = self.retry_policy.is_retryable(&e, None);
                    last_err = Some(e);
                    if !retryable || attempt + 1 >= max_attempts {
                        return Err(last_err.unwrap());
                    }
                }
            }
        }

        Err(last_err.unwrap_or(CoreError::Internal("retry loop exhausted without a result".into())))
    }

    pub async fn get(&self, url: impl Into<String>, cancel: &CancellationToken) -> CoreResult<Response> {
        self.do_request(Request::new(Method::Get, url), cancel).await
    }

    pub async fn post(
        &self,
        url: impl Into<String>,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> CoreResult<Response> {
        self.do_request(Request::new(Method::Post, url).with_json_body(body), cancel).await
    }

    pub async fn put(
        &self,
        url: impl Into<String>,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> CoreResult<Response> {
        self.do_request(Request::new(Method::Put, url).with_json_body(body), cancel).await
    }

    pub async fn patch(
        &self,
        url: impl Into<String>,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> CoreResult<Response> {
        self.do_request(Request::new(Method::Patch, url).with_json_body(body), cancel).await
    }

    pub async fn delete(&self, url: impl Into<String>, cancel: &CancellationToken) -> CoreResult<Response> {
        self.do_request(Request::new(Method::Delete, url), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter_factor: 0.0,
            should_retry: None,
        }
    }

    #[tokio::test]
    async fn retries_on_503_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = ResilientClient::builder()
            .base_url(server.uri())
            .retry_policy(fast_retry())
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        let resp = client.get("/thing", &cancel).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text(), "ok");
    }

    #[tokio::test]
    async fn permanent_4xx_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nope"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = ResilientClient::builder()
            .base_url(server.uri())
            .retry_policy(fast_retry())
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        let err = client.get("/nope", &cancel).await.unwrap_err();
        assert!(matches!(err, CoreError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn circuit_open_short_circuits_without_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let breaker = Arc::new(CircuitBreaker::new(crate::resilience::CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            timeout: Duration::from_secs(60),
            half_open_max_allowed: 1,
            sliding_window: None,
        }));
        breaker.record_failure();

        let client = ResilientClient::builder()
            .base_url(server.uri())
            .breaker(breaker)
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        let err = client.get("/anything", &cancel).await.unwrap_err();
        assert!(matches!(err, CoreError::CircuitOpen { .. }));
    }
}
