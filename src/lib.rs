//! # courtscraper-rs
//!
//! Async client for the Indian High Courts case-status portal
//! (`hcservices.ecourts.gov.in`) and the eCourts judgment search
//! (`judgments.ecourts.gov.in`).
//!
//! Every search on the portal is gated by an image captcha that is pinned to
//! a short-lived session. The crate drives the whole protocol: it opens a
//! session, fetches the captcha, hands it to a pluggable solver, submits the
//! query and classifies the response, retrying with a fresh session when the
//! answer is rejected.
//!
//! ## Features
//!
//! - Case status by case number or party name
//! - Court orders and daily cause lists
//! - Bench and case-type listings
//! - Full-text judgment search with PDF download
//! - Interactive ([`ManualSolver`]) and OCR-backed ([`CommandSolver`]) captcha solving
//! - One throttled request stream per client, shared by concurrent calls
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use courtscraper_rs::{CommandSolver, Court, CourtScraper};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scraper = CourtScraper::builder()
//!         .with_solver(Arc::new(CommandSolver::tesseract()))
//!         .build()?;
//!     let delhi = Court::new("Delhi High Court", "26");
//!     for case in scraper.case_status(&delhi, "134", "1234", "2024").await? {
//!         println!("{} {} vs {}", case.case_number, case.petitioner, case.respondent);
//!     }
//!     Ok(())
//! }
//! ```

mod courtscraper;

pub mod challenges;
pub mod config;
pub mod external_deps;
pub mod modules;
pub mod portal;

pub use crate::courtscraper::{
	CourtScraper,
	CourtScraperBuilder,
	CourtScraperError,
	CourtScraperResult,
};

pub use crate::challenges::core::{
	ActionPlacement,
	Attempt,
	BackoffPolicy,
	CauseListKind,
	Challenge,
	Court,
	ExpectedShape,
	JudgmentScope,
	Outcome,
	OutcomeTag,
	ParsedResult,
	PortalHttpClient,
	PreparedRequest,
	QueryKind,
	QueryRequest,
	RateLimiter,
	RawResponse,
	ReqwestPortalClient,
	RequestSpec,
	SearchMode,
	Session,
	StatusFilter,
	TransportError,
	TransportExecutor,
	TransportSettings,
};

pub use crate::challenges::parser::{
	ParseError,
	ResponseParser,
	decode_listing,
	encode_listing,
	strip_bom,
};

pub use crate::challenges::pipeline::{
	AcquisitionBudget,
	OrchestratorError,
	QueryReport,
	RetryOrchestrator,
	RetryPolicy,
};

pub use crate::challenges::session::{
	ChallengeAcquirer,
	SessionError,
	SessionManager,
};

pub use crate::config::{ConfigError, PortalConfig};

pub use crate::external_deps::captcha::{
	CaptchaSolver,
	CommandSolver,
	ManualSolver,
	SolveCallback,
	SolverError,
};

pub use crate::modules::{
	AttemptEvent,
	EventDispatcher,
	EventHandler,
	LoggingHandler,
	PortalEvent,
	RequestEvent,
	ResponseEvent,
	SessionEvent,
	TransportRetryEvent,
};

pub use crate::portal::{
	BenchType,
	CaseInfo,
	CaseOrder,
	CauseListPdf,
	JudgmentPage,
	JudgmentResult,
	PortalEndpoints,
	Site,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
