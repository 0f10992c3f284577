//! Session handshake and challenge acquisition.
//!
//! Every attempt opens its own session: the portal binds the challenge image
//! to the session cookie issued by `main.php`, so a challenge can only be
//! answered under the session that fetched it.

use std::sync::Arc;

use thiserror::Error;

use crate::challenges::core::{Challenge, RequestSpec, Session, TransportError, TransportExecutor};
use crate::modules::events::{EventDispatcher, PortalEvent, SessionEvent};
use crate::portal::PortalEndpoints;

/// Cookie name the portal issues its session under.
pub const DEFAULT_SESSION_COOKIE: &str = "HCSERVICES_SESSID";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("handshake response carried no session cookie (expected {0})")]
    MissingCookie(String),
}

impl SessionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Transport(err) => err.is_retryable(),
            SessionError::MissingCookie(_) => true,
        }
    }
}

/// Opens fresh portal sessions.
pub struct SessionManager {
    executor: Arc<TransportExecutor>,
    endpoints: PortalEndpoints,
    cookie_name: String,
    events: Arc<EventDispatcher>,
}

impl SessionManager {
    pub fn new(
        executor: Arc<TransportExecutor>,
        endpoints: PortalEndpoints,
        cookie_name: impl Into<String>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            executor,
            endpoints,
            cookie_name: cookie_name.into(),
            events,
        }
    }

    /// Load the landing page and capture the session cookie it sets.
    ///
    /// Falls back to the first cookie whose name mentions `sess` when the
    /// configured name is absent. No cookie state survives between calls.
    pub async fn open(&self, attempt: usize) -> Result<Session, SessionError> {
        let spec = RequestSpec::get(self.endpoints.main_page())
            .with_referer(self.endpoints.base())?;
        let response = self.executor.execute(&spec).await?;
        let cookies = response.set_cookies();

        let (name, id) = cookies
            .iter()
            .find(|(name, value)| *name == self.cookie_name && !value.is_empty())
            .or_else(|| {
                cookies.iter().find(|(name, value)| {
                    name.to_ascii_lowercase().contains("sess") && !value.is_empty()
                })
            })
            .cloned()
            .ok_or_else(|| SessionError::MissingCookie(self.cookie_name.clone()))?;

        let session = Session::new(name, id).with_cookies(cookies);
        self.events.dispatch(PortalEvent::SessionOpened(SessionEvent {
            attempt,
            session_id: session.id.clone(),
            timestamp: chrono::Utc::now(),
        }));
        Ok(session)
    }
}

/// Fetches challenge images under an existing session.
pub struct ChallengeAcquirer {
    executor: Arc<TransportExecutor>,
    endpoints: PortalEndpoints,
    events: Arc<EventDispatcher>,
}

impl ChallengeAcquirer {
    pub fn new(
        executor: Arc<TransportExecutor>,
        endpoints: PortalEndpoints,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            executor,
            endpoints,
            events,
        }
    }

    pub async fn fetch(&self, session: &Session, attempt: usize) -> Result<Challenge, TransportError> {
        let spec = RequestSpec::get(self.endpoints.captcha_image())
            .with_referer(&self.endpoints.main_page())?
            .with_session(session)?;
        let response = self.executor.execute(&spec).await?;
        if response.body.is_empty() {
            return Err(TransportError::Body("empty challenge image".into()));
        }

        self.events.dispatch(PortalEvent::ChallengeFetched(SessionEvent {
            attempt,
            session_id: session.id.clone(),
            timestamp: chrono::Utc::now(),
        }));
        Ok(Challenge {
            session_id: session.id.clone(),
            image: response.body,
        })
    }
}
