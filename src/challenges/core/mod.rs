//! Core utilities shared by the session, parser, and orchestration layers.

pub mod executor;
pub mod reqwest_client;
pub mod timing;
pub mod types;

pub use executor::{
    ACTION_FIELD, ActionCode, ActionPlacement, PortalHttpClient, PreparedRequest, RawResponse,
    RequestSpec, TransportError, TransportExecutor, TransportSettings,
};
pub use reqwest_client::ReqwestPortalClient;
pub use timing::{BackoffPolicy, RateLimiter};
pub use types::{
    Attempt, CauseListKind, Challenge, Court, ExpectedShape, JudgmentScope, Outcome, OutcomeTag,
    ParsedResult, QueryKind, QueryRequest, SearchMode, Session, StatusFilter,
};
