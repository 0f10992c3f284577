//! Transport executor.
//!
//! Wraps an abstract [`PortalHttpClient`] with the policies every portal call
//! needs: browser and ajax headers, the shared rate limiter, a per-call
//! timeout, and transport-level retries for idempotent requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{
    ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER, SET_COOKIE,
    USER_AGENT,
};
use http::Method;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

use super::timing::{BackoffPolicy, RateLimiter};
use super::types::Session;
use crate::modules::events::{
    EventDispatcher, PortalEvent, RequestEvent, ResponseEvent, TransportRetryEvent,
};

/// Field name of the portal's action discriminator.
pub const ACTION_FIELD: &str = "action_code";

const DEFAULT_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Contract that abstracts the underlying HTTP transport.
///
/// Implementations must not keep a cookie jar of their own: session cookies
/// travel explicitly on each request so that a challenge can only ever be
/// answered under the session that fetched it.
#[async_trait]
pub trait PortalHttpClient: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError>;
}

/// Where the action discriminator travels. Differs per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPlacement {
    QueryString,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionCode {
    pub code: &'static str,
    pub placement: ActionPlacement,
}

/// Caller-side description of one portal call.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub form: Vec<(String, String)>,
    pub action: Option<ActionCode>,
}

impl RequestSpec {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            form: Vec::new(),
            action: None,
        }
    }

    pub fn post(url: Url, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: HeaderMap::new(),
            form,
            action: None,
        }
    }

    pub fn with_action(mut self, code: &'static str, placement: ActionPlacement) -> Self {
        self.action = Some(ActionCode { code, placement });
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_referer(self, referer: &Url) -> Result<Self, TransportError> {
        let value = HeaderValue::from_str(referer.as_str())
            .map_err(|_| TransportError::InvalidRequest("referer".into()))?;
        Ok(self.with_header(REFERER, value))
    }

    pub fn with_session(self, session: &Session) -> Result<Self, TransportError> {
        let value = HeaderValue::from_str(&session.cookie_header())
            .map_err(|_| TransportError::InvalidRequest("cookie".into()))?;
        Ok(self.with_header(COOKIE, value))
    }

    /// Transport retries are only safe for requests without side effects.
    pub fn is_idempotent(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    fn prepare(&self, defaults: &HeaderMap) -> PreparedRequest {
        let mut url = self.url.clone();
        let mut form = self.form.clone();
        if let Some(action) = self.action {
            match action.placement {
                ActionPlacement::QueryString => {
                    url.query_pairs_mut().append_pair(ACTION_FIELD, action.code);
                }
                ActionPlacement::Body => {
                    form.insert(0, (ACTION_FIELD.to_string(), action.code.to_string()));
                }
            }
        }

        let mut headers = defaults.clone();
        for (name, value) in self.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        PreparedRequest {
            method: self.method.clone(),
            url,
            headers,
            form,
        }
    }
}

/// Fully resolved request handed to the transport.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub form: Vec<(String, String)>,
}

/// Raw response as received from the portal.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl RawResponse {
    /// `(name, value)` pairs of every `Set-Cookie` header.
    pub fn set_cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect()
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect(_) | TransportError::Timeout(_) | TransportError::Body(_) => {
                true
            }
            TransportError::Status { status, .. } => *status >= 500,
            TransportError::InvalidRequest(_) => false,
        }
    }
}

/// Transport policy knobs, usually derived from [`crate::PortalConfig`].
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: BackoffPolicy,
    pub retry_post: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            attempts: 3,
            backoff: BackoffPolicy::default(),
            retry_post: false,
        }
    }
}

/// Executes portal requests under the shared transport policies.
pub struct TransportExecutor {
    client: Arc<dyn PortalHttpClient>,
    limiter: Arc<RateLimiter>,
    default_headers: HeaderMap,
    settings: TransportSettings,
    events: Arc<EventDispatcher>,
}

impl TransportExecutor {
    pub fn new(
        client: Arc<dyn PortalHttpClient>,
        limiter: Arc<RateLimiter>,
        settings: TransportSettings,
        events: Arc<EventDispatcher>,
    ) -> Result<Self, TransportError> {
        let default_headers = default_headers(&settings.user_agent)?;
        Ok(Self {
            client,
            limiter,
            default_headers,
            settings,
            events,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Perform the call, retrying transport failures when the request allows it.
    ///
    /// A received response with a success status is returned as-is whatever
    /// its body says; interpreting it is the parser's job.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse, TransportError> {
        let prepared = spec.prepare(&self.default_headers);
        let max_tries = if spec.is_idempotent() || self.settings.retry_post {
            self.settings.attempts.max(1)
        } else {
            1
        };

        let mut try_no = 0u32;
        loop {
            try_no += 1;
            self.limiter.acquire().await;

            self.events.dispatch(PortalEvent::Request(RequestEvent {
                method: prepared.method.clone(),
                url: prepared.url.clone(),
                timestamp: chrono::Utc::now(),
            }));

            let started = Instant::now();
            let result = match tokio::time::timeout(
                self.settings.timeout,
                self.client.send(&prepared),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(self.settings.timeout)),
            };

            let result = result.and_then(|response| {
                self.events.dispatch(PortalEvent::Response(ResponseEvent {
                    method: prepared.method.clone(),
                    url: response.url.clone(),
                    status: response.status,
                    latency: started.elapsed(),
                    timestamp: chrono::Utc::now(),
                }));
                if response.status >= 400 {
                    Err(TransportError::Status {
                        status: response.status,
                        url: response.url.to_string(),
                    })
                } else {
                    Ok(response)
                }
            });

            match result {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && try_no < max_tries => {
                    let wait = self.settings.backoff.delay_for(try_no);
                    self.events
                        .dispatch(PortalEvent::TransportRetry(TransportRetryEvent {
                            method: prepared.method.clone(),
                            url: prepared.url.clone(),
                            try_no,
                            max_tries,
                            error: err.to_string(),
                            wait,
                        }));
                    if !wait.is_zero() {
                        sleep(wait).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn default_headers(user_agent: &str) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|_| TransportError::InvalidRequest("user-agent".into()))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
    );
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubClient {
        responses: Mutex<Vec<Result<RawResponse, TransportError>>>,
        seen: Mutex<Vec<PreparedRequest>>,
    }

    impl StubClient {
        fn new(responses: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PortalHttpClient for StubClient {
        async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .expect("no more stub responses")
        }
    }

    fn ok(status: u16, body: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
            url: Url::parse("https://portal.test/hcservices/main.php").unwrap(),
        })
    }

    fn executor(client: Arc<StubClient>, attempts: u32) -> TransportExecutor {
        let settings = TransportSettings {
            attempts,
            backoff: BackoffPolicy::Fixed { delay_secs: 0.0 },
            ..TransportSettings::default()
        };
        TransportExecutor::new(
            client,
            Arc::new(RateLimiter::new(Duration::ZERO)),
            settings,
            Arc::new(EventDispatcher::new()),
        )
        .unwrap()
    }

    fn url(path: &str) -> Url {
        Url::parse("https://portal.test/hcservices/").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn get_is_retried_after_connection_failure() {
        let client = Arc::new(StubClient::new(vec![
            Err(TransportError::Connect("reset".into())),
            ok(200, "ok"),
        ]));
        let exec = executor(client.clone(), 3);

        let response = exec.execute(&RequestSpec::get(url("main.php"))).await.unwrap();
        assert_eq!(response.text_lossy(), "ok");
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let client = Arc::new(StubClient::new(vec![
            ok(503, ""),
            ok(502, ""),
            ok(500, ""),
        ]));
        let exec = executor(client.clone(), 3);

        let err = exec.execute(&RequestSpec::get(url("main.php"))).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 500, .. }));
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn post_is_not_retried_by_default() {
        let client = Arc::new(StubClient::new(vec![Err(TransportError::Connect(
            "refused".into(),
        ))]));
        let exec = executor(client.clone(), 3);

        let spec = RequestSpec::post(url("cases_qry/index_qry.php"), vec![]);
        assert!(exec.execute(&spec).await.is_err());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let client = Arc::new(StubClient::new(vec![ok(404, "missing")]));
        let exec = executor(client.clone(), 3);

        let err = exec.execute(&RequestSpec::get(url("gone.php"))).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn action_placement_and_header_overrides() {
        let client = Arc::new(StubClient::new(vec![ok(200, ""), ok(200, "")]));
        let exec = executor(client.clone(), 1);

        let query = RequestSpec::post(
            url("cases_qry/index_qry.php"),
            vec![("state_code".into(), "26".into())],
        )
        .with_action("showRecords", ActionPlacement::QueryString)
        .with_header(USER_AGENT, HeaderValue::from_static("custom-agent"));
        exec.execute(&query).await.unwrap();

        let body = RequestSpec::post(url("cases_qry/index_qry.php"), vec![])
            .with_action("fillHCBench", ActionPlacement::Body);
        exec.execute(&body).await.unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].url.query(), Some("action_code=showRecords"));
        assert!(!seen[0].form.iter().any(|(k, _)| k == ACTION_FIELD));
        assert_eq!(seen[0].headers.get(USER_AGENT).unwrap(), "custom-agent");
        assert_eq!(
            seen[0].headers.get("x-requested-with").unwrap(),
            "XMLHttpRequest"
        );

        assert_eq!(seen[1].url.query(), None);
        assert_eq!(
            seen[1].form[0],
            (ACTION_FIELD.to_string(), "fillHCBench".to_string())
        );
    }

    #[test]
    fn set_cookie_pairs_are_extracted() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("HCSERVICES_SESSID=abc123; path=/; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("lb=\"n1\""));
        let response = RawResponse {
            status: 200,
            headers,
            body: Bytes::new(),
            url: url("main.php"),
        };
        assert_eq!(
            response.set_cookies(),
            vec![
                ("HCSERVICES_SESSID".to_string(), "abc123".to_string()),
                ("lb".to_string(), "n1".to_string()),
            ]
        );
    }
}
