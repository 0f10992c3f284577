//! High level portal client.
//!
//! Wires the transport executor, session manager, captcha solver, response
//! parser and retry orchestrator together behind one type exposing the
//! portal's search operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use thiserror::Error;

use crate::challenges::core::{
	CauseListKind, Court, ExpectedShape, JudgmentScope, Outcome, OutcomeTag, ParsedResult,
	PortalHttpClient, QueryKind, QueryRequest, RateLimiter, ReqwestPortalClient, RequestSpec,
	SearchMode, Session, StatusFilter, TransportError, TransportExecutor, TransportSettings,
};
use crate::challenges::parser::{ParseError, resolve_order_link};
use crate::challenges::pipeline::{OrchestratorError, QueryReport, RetryOrchestrator};
use crate::challenges::session::SessionError;
use crate::config::{ConfigError, PortalConfig};
use crate::external_deps::captcha::{CaptchaSolver, ManualSolver};
use crate::modules::events::{EventDispatcher, EventHandler, LoggingHandler};
use crate::portal::endpoints;
use crate::portal::judgments::JUDGMENTS_SESSION_COOKIE;
use crate::portal::{
	CaseInfo, CaseOrder, CauseListPdf, JudgmentPage, JudgmentResult, PortalEndpoints,
};

/// Result alias used by the client facade.
pub type CourtScraperResult<T> = Result<T, CourtScraperError>;

/// Error surfaced by [`CourtScraper`] operations.
#[derive(Debug, Error)]
pub enum CourtScraperError {
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error("transport error: {0}")]
	Transport(#[from] TransportError),
	#[error("session error: {0}")]
	Session(#[from] SessionError),
	#[error(transparent)]
	Query(#[from] OrchestratorError),
	#[error("response could not be parsed: {0}")]
	Parse(#[from] ParseError),
	#[error("portal rejected the request: {0}")]
	Rejected(OutcomeTag),
	#[error("portal answered with {0} records where {1} were expected")]
	UnexpectedResult(&'static str, &'static str),
	#[error("judgment {0:?} has no pdf link")]
	NoPdfLink(String),
}

impl CourtScraperError {
	/// True when retrying the same call unchanged cannot help.
	pub fn is_parameter_error(&self) -> bool {
		matches!(
			self,
			CourtScraperError::Query(OrchestratorError::Parameter { .. })
				| CourtScraperError::Rejected(OutcomeTag::ParameterError(_))
		)
	}
}

/// Fluent builder for [`CourtScraper`].
pub struct CourtScraperBuilder {
	config: PortalConfig,
	solver: Option<Arc<dyn CaptchaSolver>>,
	http_client: Option<Arc<dyn PortalHttpClient>>,
	handlers: Vec<Arc<dyn EventHandler>>,
	logging: bool,
}

impl CourtScraperBuilder {
	pub fn new() -> Self {
		Self {
			config: PortalConfig::default(),
			solver: None,
			http_client: None,
			handlers: Vec::new(),
			logging: true,
		}
	}

	pub fn with_config(mut self, config: PortalConfig) -> Self {
		self.config = config;
		self
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.config.base_url = base_url.into();
		self
	}

	pub fn with_judgments_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.config.judgments_base_url = base_url.into();
		self
	}

	pub fn with_request_delay(mut self, seconds: f64) -> Self {
		self.config.request_delay = seconds;
		self
	}

	pub fn with_max_attempts(mut self, attempts: usize) -> Self {
		self.config.max_attempts = attempts;
		self
	}

	/// Captcha strategy; defaults to [`ManualSolver`].
	pub fn with_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
		self.solver = Some(solver);
		self
	}

	/// Replace the reqwest transport, e.g. with a recording double.
	pub fn with_http_client(mut self, client: Arc<dyn PortalHttpClient>) -> Self {
		self.http_client = Some(client);
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	/// Skip the built-in [`LoggingHandler`].
	pub fn without_logging(mut self) -> Self {
		self.logging = false;
		self
	}

	pub fn build(self) -> CourtScraperResult<CourtScraper> {
		self.config.validate()?;
		let endpoints = PortalEndpoints::new(&self.config.base_url)?;
		let judgment_endpoints = PortalEndpoints::judgments(&self.config.judgments_base_url)?;

		let client: Arc<dyn PortalHttpClient> = match self.http_client {
			Some(client) => client,
			None => Arc::new(ReqwestPortalClient::new(
				self.config.timeout_duration(),
				self.config.accept_invalid_certs,
			)?),
		};

		let mut events = EventDispatcher::new();
		if self.logging {
			events.register_handler(Arc::new(LoggingHandler));
		}
		for handler in self.handlers {
			events.register_handler(handler);
		}
		let events = Arc::new(events);

		let limiter = Arc::new(RateLimiter::from_secs_f64(self.config.request_delay));
		let executor = Arc::new(TransportExecutor::new(
			client,
			limiter,
			TransportSettings::from(&self.config),
			events.clone(),
		)?);

		let solver = self
			.solver
			.unwrap_or_else(|| Arc::new(ManualSolver::new()));
		let judgments = RetryOrchestrator::new(
			executor.clone(),
			solver.clone(),
			judgment_endpoints,
			JUDGMENTS_SESSION_COOKIE,
			self.config.retry_policy(),
			events.clone(),
		);
		let orchestrator = RetryOrchestrator::new(
			executor,
			solver,
			endpoints,
			&self.config.session_cookie,
			self.config.retry_policy(),
			events,
		);

		Ok(CourtScraper {
			config: self.config,
			orchestrator,
			judgments,
		})
	}
}

impl Default for CourtScraperBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Client for the High Court case-status portal and the judgment search portal.
///
/// One instance shares a single rate limiter across every operation on both
/// portals, so concurrent calls still form one throttled request stream.
pub struct CourtScraper {
	config: PortalConfig,
	orchestrator: RetryOrchestrator,
	judgments: RetryOrchestrator,
}

impl CourtScraper {
	/// Default configuration with the interactive solver.
	pub fn new() -> CourtScraperResult<Self> {
		CourtScraperBuilder::new().build()
	}

	pub fn builder() -> CourtScraperBuilder {
		CourtScraperBuilder::new()
	}

	pub fn config(&self) -> &PortalConfig {
		&self.config
	}

	pub fn endpoints(&self) -> &PortalEndpoints {
		self.orchestrator.endpoints()
	}

	/// Run a raw challenge-gated query and keep the attempt history.
	pub async fn query(&self, request: &QueryRequest) -> CourtScraperResult<QueryReport> {
		Ok(self.orchestrator.run(request).await?)
	}

	/// Case status by case type, number and registration year.
	pub async fn case_status(
		&self,
		court: &Court,
		case_type: &str,
		case_number: &str,
		year: &str,
	) -> CourtScraperResult<Vec<CaseInfo>> {
		let request = QueryRequest::new(
			court.clone(),
			QueryKind::CaseNumber {
				case_type: case_type.to_string(),
				case_number: case_number.to_string(),
				year: year.to_string(),
			},
		);
		self.cases(&request).await
	}

	/// Case status by party name. The year is mandatory on the portal.
	pub async fn case_status_by_party(
		&self,
		court: &Court,
		party_name: &str,
		year: &str,
		status: StatusFilter,
	) -> CourtScraperResult<Vec<CaseInfo>> {
		let request = QueryRequest::new(
			court.clone(),
			QueryKind::PartyName {
				party_name: party_name.to_string(),
				year: year.to_string(),
				status,
			},
		);
		self.cases(&request).await
	}

	pub async fn court_orders(
		&self,
		court: &Court,
		case_type: &str,
		case_number: &str,
		year: &str,
	) -> CourtScraperResult<Vec<CaseOrder>> {
		let request = QueryRequest::new(
			court.clone(),
			QueryKind::Orders {
				case_type: case_type.to_string(),
				case_number: case_number.to_string(),
				year: year.to_string(),
			},
		);
		match self.query(&request).await?.result {
			ParsedResult::Orders(orders) => Ok(orders),
			other => Err(unexpected(&other, "order")),
		}
	}

	/// Cause-list PDFs per bench for `date` (today when `None`).
	pub async fn cause_list(
		&self,
		court: &Court,
		kind: CauseListKind,
		date: Option<NaiveDate>,
	) -> CourtScraperResult<Vec<CauseListPdf>> {
		let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
		let request = QueryRequest::new(court.clone(), QueryKind::CauseList { kind, date });
		match self.query(&request).await?.result {
			ParsedResult::CauseList(entries) => Ok(entries),
			other => Err(unexpected(&other, "cause list")),
		}
	}

	/// Bench code → bench name for the court's state.
	pub async fn list_benches(&self, court: &Court) -> CourtScraperResult<BTreeMap<String, String>> {
		let state_code = court.state_code.clone();
		self.listing(move |endpoints, session| {
			endpoints::bench_listing(endpoints, &state_code, session)
		})
		.await
	}

	/// Case type code → name for the court's bench.
	pub async fn list_case_types(
		&self,
		court: &Court,
	) -> CourtScraperResult<BTreeMap<String, String>> {
		let (state_code, bench_code) = (court.state_code.clone(), court.bench_code.clone());
		self.listing(move |endpoints, session| {
			endpoints::case_type_listing(endpoints, &state_code, &bench_code, session)
		})
		.await
	}

	/// Fetch an order PDF. Relative and site-absolute links resolve under the
	/// portal base path, the same way order tables are read.
	pub async fn download_order_pdf(&self, pdf_url: &str) -> CourtScraperResult<Bytes> {
		let url = url::Url::parse(&resolve_order_link(self.endpoints().base(), pdf_url.trim()))?;
		let spec = RequestSpec::get(url).with_referer(&self.endpoints().main_page())?;
		let response = self.orchestrator.executor().execute(&spec).await?;
		Ok(response.body)
	}

	/// Full-text judgment search. Returns the first page of hits.
	pub async fn search_judgments(
		&self,
		text: &str,
		mode: SearchMode,
		scope: JudgmentScope,
	) -> CourtScraperResult<JudgmentPage> {
		let request = QueryRequest::new(
			Court::new(scope.label(), ""),
			QueryKind::Judgments {
				text: text.to_string(),
				mode,
				scope,
			},
		);
		match self.judgments.run(&request).await?.result {
			ParsedResult::Judgments(page) => Ok(page),
			other => Err(unexpected(&other, "judgment")),
		}
	}

	/// Fetch the PDF behind a judgment search hit.
	pub async fn download_judgment_pdf(
		&self,
		judgment: &JudgmentResult,
	) -> CourtScraperResult<Bytes> {
		let link = judgment.pdf_url.trim();
		if link.is_empty() {
			return Err(CourtScraperError::NoPdfLink(judgment.title.clone()));
		}
		let endpoints = self.judgments.endpoints();
		let spec = RequestSpec::get(endpoints.base().join(link)?)
			.with_referer(&endpoints.main_page())?;
		let response = self.judgments.executor().execute(&spec).await?;
		Ok(response.body)
	}

	async fn cases(&self, request: &QueryRequest) -> CourtScraperResult<Vec<CaseInfo>> {
		match self.query(request).await?.result {
			ParsedResult::Cases { mut records, .. } => {
				for record in &mut records {
					record.court_name = request.court.name.clone();
				}
				Ok(records)
			}
			other => Err(unexpected(&other, "case")),
		}
	}

	/// One session, one submission; listings are not challenge-gated.
	async fn listing<F>(&self, build: F) -> CourtScraperResult<BTreeMap<String, String>>
	where
		F: FnOnce(&PortalEndpoints, &Session) -> Result<RequestSpec, TransportError>,
	{
		let session = self.orchestrator.sessions().open(1).await?;
		let spec = build(self.endpoints(), &session)?;
		let response = self.orchestrator.executor().execute(&spec).await?;

		match self
			.orchestrator
			.parser()
			.parse(&response.body, ExpectedShape::Delimited)
		{
			Outcome::Success(ParsedResult::Listing(entries)) => Ok(entries),
			Outcome::Success(other) => Err(unexpected(&other, "listing")),
			Outcome::ParseFailure(err) => Err(err.into()),
			Outcome::TransportFailure(err) => Err(err.into()),
			other => Err(CourtScraperError::Rejected(other.tag())),
		}
	}
}

fn unexpected(result: &ParsedResult, expected: &'static str) -> CourtScraperError {
	let actual = match result {
		ParsedResult::Cases { .. } => "case",
		ParsedResult::Orders(_) => "order",
		ParsedResult::CauseList(_) => "cause list",
		ParsedResult::Listing(_) => "listing",
		ParsedResult::ChallengeAccepted { .. } => "challenge check",
		ParsedResult::Judgments(_) => "judgment",
	};
	CourtScraperError::UnexpectedResult(actual, expected)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_config_is_rejected_at_build() {
		let err = CourtScraper::builder()
			.with_max_attempts(0)
			.build()
			.err()
			.expect("zero attempts must not build");
		assert!(matches!(err, CourtScraperError::Config(_)));
	}

	#[test]
	fn builder_applies_overrides() {
		let scraper = CourtScraper::builder()
			.with_base_url("http://127.0.0.1:1/hcservices")
			.with_request_delay(0.0)
			.with_max_attempts(5)
			.without_logging()
			.build()
			.unwrap();
		assert_eq!(scraper.config().max_attempts, 5);
		assert_eq!(
			scraper.endpoints().main_page().as_str(),
			"http://127.0.0.1:1/hcservices/main.php"
		);
	}

	#[tokio::test]
	async fn judgment_without_link_is_not_downloaded() {
		let scraper = CourtScraper::builder()
			.with_judgments_base_url("http://127.0.0.1:1/pdfsearch")
			.without_logging()
			.build()
			.unwrap();
		let judgment = JudgmentResult {
			title: "A vs B".into(),
			..JudgmentResult::default()
		};
		let err = scraper.download_judgment_pdf(&judgment).await.unwrap_err();
		assert!(matches!(err, CourtScraperError::NoPdfLink(ref title) if title == "A vs B"));
	}
}
