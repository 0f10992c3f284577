//! Cross-cutting services module
//!
//! Observability hooks shared by the transport and orchestration layers.

pub mod events;

pub use events::{
    AttemptEvent, EventDispatcher, EventHandler, LoggingHandler, PortalEvent, RequestEvent,
    ResponseEvent, SessionEvent, TransportRetryEvent,
};
