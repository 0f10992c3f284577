//! Event system for the protocol engine.
//!
//! Provides hooks for logging and custom reactions around transport calls,
//! session lifecycle, and the attempt loop.

use chrono::{DateTime, Utc};
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::challenges::core::OutcomeTag;

/// Outbound request, emitted after the rate limiter granted it.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub method: Method,
    pub url: Url,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub method: Method,
    pub url: Url,
    pub status: u16,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TransportRetryEvent {
    pub method: Method,
    pub url: Url,
    pub try_no: u32,
    pub max_tries: u32,
    pub error: String,
    pub wait: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub attempt: usize,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AttemptEvent {
    pub attempt: usize,
    pub max_attempts: usize,
    pub session_id: Option<String>,
    pub outcome: OutcomeTag,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum PortalEvent {
    Request(RequestEvent),
    Response(ResponseEvent),
    TransportRetry(TransportRetryEvent),
    SessionOpened(SessionEvent),
    ChallengeFetched(SessionEvent),
    AttemptFinished(AttemptEvent),
    Exhausted(AttemptEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &PortalEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Dispatcher with the [`LoggingHandler`] already registered.
    pub fn with_logging() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: PortalEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &PortalEvent) {
        match event {
            PortalEvent::Request(req) => {
                log::debug!("-> {} {}", req.method, req.url);
            }
            PortalEvent::Response(resp) => {
                log::debug!(
                    "<- {} {} -> {} ({:.2}s)",
                    resp.method,
                    resp.url,
                    resp.status,
                    resp.latency.as_secs_f64()
                );
            }
            PortalEvent::TransportRetry(retry) => {
                log::warn!(
                    "retry {}/{} for {} {}: {}. waiting {:.1}s",
                    retry.try_no,
                    retry.max_tries,
                    retry.method,
                    retry.url,
                    retry.error,
                    retry.wait.as_secs_f64()
                );
            }
            PortalEvent::SessionOpened(session) => {
                log::info!("attempt {} opened session {}", session.attempt, session.session_id);
            }
            PortalEvent::ChallengeFetched(session) => {
                log::debug!("attempt {} fetched challenge for {}", session.attempt, session.session_id);
            }
            PortalEvent::AttemptFinished(attempt) => {
                if attempt.outcome.is_retryable() {
                    log::warn!(
                        "attempt {}/{} failed: {}",
                        attempt.attempt,
                        attempt.max_attempts,
                        attempt.outcome
                    );
                } else {
                    log::info!(
                        "attempt {}/{} finished: {}",
                        attempt.attempt,
                        attempt.max_attempts,
                        attempt.outcome
                    );
                }
            }
            PortalEvent::Exhausted(attempt) => {
                log::warn!(
                    "giving up after {} attempts, last outcome: {}",
                    attempt.attempt,
                    attempt.outcome
                );
            }
        }
    }
}
