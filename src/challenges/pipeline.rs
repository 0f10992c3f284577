//! Retry orchestration.
//!
//! Drives one logical query through `Init → SessionReady → ChallengeReady →
//! Submitted` until it succeeds, hits a parameter error, or runs out of
//! attempts. Every attempt opens a fresh session; a session is never reused
//! after its challenge was submitted.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::challenges::core::{
    Attempt, ExpectedShape, Outcome, OutcomeTag, ParsedResult, QueryRequest, RequestSpec, Session,
    TransportError, TransportExecutor,
};
use crate::challenges::parser::ResponseParser;
use crate::challenges::session::{ChallengeAcquirer, SessionError, SessionManager};
use crate::external_deps::captcha::{CaptchaSolver, SolverError, non_empty};
use crate::modules::events::{AttemptEvent, EventDispatcher, PortalEvent};
use crate::portal::PortalEndpoints;
use crate::portal::{endpoints, judgments};

/// Budget that handshake and challenge-fetch failures draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcquisitionBudget {
    /// Acquisition failures consume regular attempts.
    #[default]
    Shared,
    /// Acquisition failures are counted apart; the query gives up once
    /// `max_failures` of them accumulated.
    Separate { max_failures: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub acquisition_budget: AcquisitionBudget,
    /// Surface non-retryable handshake failures immediately instead of retrying.
    pub fatal_session_errors: bool,
    /// Surface solver failures immediately instead of retrying.
    pub fatal_solver_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            acquisition_budget: AcquisitionBudget::Shared,
            fatal_session_errors: false,
            fatal_solver_errors: false,
        }
    }
}

/// Successful query: the records plus how many attempts it took.
#[derive(Debug, Clone)]
pub struct QueryReport {
    pub result: ParsedResult,
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("portal rejected the query parameters: {detail}")]
    Parameter {
        detail: String,
        /// Blank mandatory fields, when they can be told from the request.
        fields: Vec<&'static str>,
        attempts: Vec<Attempt>,
    },
    #[error("gave up after {} attempts", .attempts.len())]
    Exhausted { attempts: Vec<Attempt> },
    #[error("session could not be established: {0}")]
    Session(#[source] SessionError),
    #[error("captcha solver failed: {0}")]
    Solver(#[source] SolverError),
}

impl OrchestratorError {
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            OrchestratorError::Parameter { attempts, .. }
            | OrchestratorError::Exhausted { attempts } => attempts,
            OrchestratorError::Session(_) | OrchestratorError::Solver(_) => &[],
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, OrchestratorError::Exhausted { .. })
    }
}

/// Furthest state an attempt reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    SessionReady,
    ChallengeReady,
    Submitted,
}

impl Phase {
    fn is_acquisition(self) -> bool {
        matches!(self, Phase::Init | Phase::SessionReady)
    }
}

enum Step {
    Done(ParsedResult),
    Parameter(String),
    Retry(OutcomeTag),
    Fatal {
        tag: OutcomeTag,
        error: OrchestratorError,
    },
}

struct AttemptRun {
    phase: Phase,
    session_id: Option<String>,
    answer: Option<String>,
    step: Step,
}

impl AttemptRun {
    fn tag(&self) -> OutcomeTag {
        match &self.step {
            Step::Done(_) => OutcomeTag::Success,
            Step::Parameter(detail) => OutcomeTag::ParameterError(detail.clone()),
            Step::Retry(tag) | Step::Fatal { tag, .. } => tag.clone(),
        }
    }
}

/// Runs challenge-gated queries to completion.
pub struct RetryOrchestrator {
    sessions: SessionManager,
    acquirer: ChallengeAcquirer,
    solver: Arc<dyn CaptchaSolver>,
    executor: Arc<TransportExecutor>,
    parser: ResponseParser,
    endpoints: PortalEndpoints,
    policy: RetryPolicy,
    events: Arc<EventDispatcher>,
}

impl RetryOrchestrator {
    pub fn new(
        executor: Arc<TransportExecutor>,
        solver: Arc<dyn CaptchaSolver>,
        endpoints: PortalEndpoints,
        session_cookie: &str,
        policy: RetryPolicy,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            sessions: SessionManager::new(
                executor.clone(),
                endpoints.clone(),
                session_cookie,
                events.clone(),
            ),
            acquirer: ChallengeAcquirer::new(executor.clone(), endpoints.clone(), events.clone()),
            solver,
            parser: ResponseParser::new(endpoints.clone()),
            executor,
            endpoints,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn parser(&self) -> &ResponseParser {
        &self.parser
    }

    pub fn executor(&self) -> &Arc<TransportExecutor> {
        &self.executor
    }

    pub fn endpoints(&self) -> &PortalEndpoints {
        &self.endpoints
    }

    /// Run `request` until it yields records or a terminal error.
    ///
    /// Attempts run strictly one after another. Dropping the future cancels
    /// at the next network call or solver prompt.
    pub async fn run(&self, request: &QueryRequest) -> Result<QueryReport, OrchestratorError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let today = chrono::Local::now().date_naive();
        let mut history: Vec<Attempt> = Vec::new();
        let mut counted = 0usize;
        let mut acquisition_failures = 0usize;

        loop {
            let ordinal = history.len() + 1;
            let run = self.attempt(request, ordinal, today).await;
            let outcome = run.tag();

            self.events.dispatch(PortalEvent::AttemptFinished(AttemptEvent {
                attempt: ordinal,
                max_attempts,
                session_id: run.session_id.clone(),
                outcome: outcome.clone(),
                timestamp: chrono::Utc::now(),
            }));
            history.push(Attempt {
                ordinal,
                session_id: run.session_id.clone(),
                answer: run.answer.clone(),
                outcome: outcome.clone(),
            });

            match run.step {
                Step::Done(result) => {
                    return Ok(QueryReport {
                        result,
                        attempts: history,
                    });
                }
                Step::Parameter(detail) => {
                    return Err(OrchestratorError::Parameter {
                        detail,
                        fields: request.missing_fields(),
                        attempts: history,
                    });
                }
                Step::Fatal { error, .. } => return Err(error),
                Step::Retry(_) => {}
            }

            let exhausted = match self.policy.acquisition_budget {
                AcquisitionBudget::Separate { max_failures } if run.phase.is_acquisition() => {
                    acquisition_failures += 1;
                    acquisition_failures >= max_failures
                }
                _ => {
                    counted += 1;
                    counted >= max_attempts
                }
            };

            if exhausted {
                self.events.dispatch(PortalEvent::Exhausted(AttemptEvent {
                    attempt: ordinal,
                    max_attempts,
                    session_id: run.session_id,
                    outcome,
                    timestamp: chrono::Utc::now(),
                }));
                return Err(OrchestratorError::Exhausted { attempts: history });
            }
        }
    }

    async fn attempt(&self, request: &QueryRequest, ordinal: usize, today: NaiveDate) -> AttemptRun {
        let mut run = AttemptRun {
            phase: Phase::Init,
            session_id: None,
            answer: None,
            step: Step::Retry(OutcomeTag::SessionFailure(String::new())),
        };

        let session = match self.sessions.open(ordinal).await {
            Ok(session) => session,
            Err(err) => {
                let tag = OutcomeTag::SessionFailure(err.to_string());
                run.step = if self.policy.fatal_session_errors && !err.is_retryable() {
                    Step::Fatal {
                        tag,
                        error: OrchestratorError::Session(err),
                    }
                } else {
                    Step::Retry(tag)
                };
                return run;
            }
        };
        run.session_id = Some(session.id.clone());
        run.phase = Phase::SessionReady;

        let challenge = match self.acquirer.fetch(&session, ordinal).await {
            Ok(challenge) => challenge,
            Err(err) => {
                run.step = Step::Retry(OutcomeTag::TransportFailure(err.to_string()));
                return run;
            }
        };
        run.phase = Phase::ChallengeReady;

        let answer = match self
            .solver
            .solve(&challenge.image)
            .await
            .and_then(|answer| non_empty(&answer))
        {
            Ok(answer) => answer,
            Err(err) => {
                let tag = OutcomeTag::SolverFailure(err.to_string());
                run.step = if self.policy.fatal_solver_errors {
                    Step::Fatal {
                        tag,
                        error: OrchestratorError::Solver(err),
                    }
                } else {
                    Step::Retry(tag)
                };
                return run;
            }
        };
        run.answer = Some(answer.clone());

        run.step = self.submit(request, &answer, &session, today).await;
        run.phase = Phase::Submitted;
        run
    }

    async fn submit(
        &self,
        request: &QueryRequest,
        answer: &str,
        session: &Session,
        today: NaiveDate,
    ) -> Step {
        let spec = endpoints::submission(&self.endpoints, request, answer, session, today);
        let outcome = match self.send(spec, request.expected_shape()).await {
            // An accepted check only authorises the results request.
            Outcome::Success(ParsedResult::ChallengeAccepted { token }) => {
                let spec = judgments::follow_up(&self.endpoints, request, answer, &token, session);
                self.send(spec, ExpectedShape::JudgmentTable).await
            }
            other => other,
        };

        match outcome {
            Outcome::Success(result) => Step::Done(result),
            Outcome::ParameterError(detail) => Step::Parameter(detail),
            other => Step::Retry(other.tag()),
        }
    }

    async fn send(
        &self,
        spec: Result<RequestSpec, TransportError>,
        shape: ExpectedShape,
    ) -> Outcome {
        let spec = match spec {
            Ok(spec) => spec,
            Err(err) => return Outcome::TransportFailure(err),
        };
        match self.executor.execute(&spec).await {
            Ok(response) => self.parser.parse(&response.body, shape),
            Err(err) => Outcome::TransportFailure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::{
        BackoffPolicy, Court, PortalHttpClient, PreparedRequest, QueryKind, RateLimiter,
        RawResponse, StatusFilter, TransportError, TransportSettings,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const RECORDS: &str =
        r#"{"con":["[{\"cino\":\"DLHC01\",\"pet_name\":\"A\"}]"],"totRecords":"1","Error":""}"#;
    const REJECTED: &str = r#"{"con":"Invalid Captcha"}"#;
    const PARAMETER: &str = r#"{"Error":"ERROR_VAL"}"#;

    /// Portal double: hands out a new session per handshake and answers
    /// submissions from a script, repeating the last entry once it runs out.
    struct ScriptedPortal {
        handshakes: AtomicUsize,
        handshake_failures: AtomicUsize,
        handshake_status: u16,
        submissions: Mutex<VecDeque<Result<&'static str, TransportError>>>,
        fallback: &'static str,
        seen: Mutex<Vec<PreparedRequest>>,
    }

    impl ScriptedPortal {
        fn new(script: Vec<Result<&'static str, TransportError>>, fallback: &'static str) -> Self {
            Self {
                handshakes: AtomicUsize::new(0),
                handshake_failures: AtomicUsize::new(0),
                handshake_status: 200,
                submissions: Mutex::new(script.into()),
                fallback,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing_handshakes(self, count: usize) -> Self {
            self.handshake_failures.store(count, Ordering::SeqCst);
            self
        }

        fn handshake_status(mut self, status: u16) -> Self {
            self.handshake_status = status;
            self
        }

        fn handshakes(&self) -> usize {
            self.handshakes.load(Ordering::SeqCst)
        }

        fn submissions_seen(&self) -> Vec<PreparedRequest> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|req| req.url.path().ends_with("index_qry.php"))
                .cloned()
                .collect()
        }

        fn response(request: &PreparedRequest, headers: HeaderMap, body: &str) -> RawResponse {
            RawResponse {
                status: 200,
                headers,
                body: Bytes::from(body.to_string()),
                url: request.url.clone(),
            }
        }
    }

    #[async_trait]
    impl PortalHttpClient for ScriptedPortal {
        async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            let path = request.url.path();

            let landing = path.ends_with("main.php")
                || (path.ends_with("/pdfsearch/") && request.url.query().is_none());
            if landing {
                let pending = self.handshake_failures.load(Ordering::SeqCst);
                if pending > 0 {
                    self.handshake_failures.store(pending - 1, Ordering::SeqCst);
                    return Err(TransportError::Connect("handshake refused".into()));
                }
                if self.handshake_status != 200 {
                    let mut response = Self::response(request, HeaderMap::new(), "gone");
                    response.status = self.handshake_status;
                    return Ok(response);
                }
                let n = self.handshakes.fetch_add(1, Ordering::SeqCst) + 1;
                let mut headers = HeaderMap::new();
                headers.insert(
                    SET_COOKIE,
                    HeaderValue::from_str(&format!("HCSERVICES_SESSID=sess-{n}; path=/")).unwrap(),
                );
                return Ok(Self::response(request, headers, ""));
            }

            if path.ends_with("securimage_show.php") {
                return Ok(Self::response(request, HeaderMap::new(), "image"));
            }

            let next = self.submissions.lock().unwrap().pop_front();
            match next {
                Some(Ok(body)) => Ok(Self::response(request, HeaderMap::new(), body)),
                Some(Err(err)) => Err(err),
                None => Ok(Self::response(request, HeaderMap::new(), self.fallback)),
            }
        }
    }

    struct ScriptedSolver {
        answers: Mutex<VecDeque<Result<String, SolverError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSolver {
        fn fixed() -> Self {
            Self::new(Vec::new())
        }

        fn new(answers: Vec<Result<String, SolverError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CaptchaSolver for ScriptedSolver {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn solve(&self, image: &[u8]) -> Result<String, SolverError> {
            assert_eq!(image, b"image");
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let next = self.answers.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(format!("ans{n}")))
        }
    }

    /// Never answers, like a human who walked away from the prompt.
    struct StalledSolver;

    #[async_trait]
    impl CaptchaSolver for StalledSolver {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn solve(&self, _image: &[u8]) -> Result<String, SolverError> {
            std::future::pending().await
        }
    }

    fn orchestrator(
        portal: Arc<ScriptedPortal>,
        solver: Arc<dyn CaptchaSolver>,
        policy: RetryPolicy,
    ) -> RetryOrchestrator {
        orchestrator_at(portal, solver, policy, PortalEndpoints::default())
    }

    fn orchestrator_at(
        portal: Arc<ScriptedPortal>,
        solver: Arc<dyn CaptchaSolver>,
        policy: RetryPolicy,
        endpoints: PortalEndpoints,
    ) -> RetryOrchestrator {
        let settings = TransportSettings {
            attempts: 1,
            backoff: BackoffPolicy::Fixed { delay_secs: 0.0 },
            ..TransportSettings::default()
        };
        let events = Arc::new(EventDispatcher::new());
        let executor = TransportExecutor::new(
            portal,
            Arc::new(RateLimiter::new(Duration::ZERO)),
            settings,
            events.clone(),
        )
        .unwrap();
        RetryOrchestrator::new(
            Arc::new(executor),
            solver,
            endpoints,
            "HCSERVICES_SESSID",
            policy,
            events,
        )
    }

    fn policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        }
    }

    fn case_query() -> QueryRequest {
        QueryRequest::new(
            Court::new("Delhi High Court", "26"),
            QueryKind::CaseNumber {
                case_type: "134".into(),
                case_number: "1".into(),
                year: "2024".into(),
            },
        )
    }

    #[tokio::test]
    async fn parameter_error_ends_after_one_attempt() {
        let portal = Arc::new(ScriptedPortal::new(vec![], PARAMETER));
        let orchestrator = orchestrator(portal.clone(), Arc::new(ScriptedSolver::fixed()), policy(5));
        let request = QueryRequest::new(
            Court::new("Delhi High Court", "26"),
            QueryKind::PartyName {
                party_name: "Sharma".into(),
                year: "".into(),
                status: StatusFilter::Both,
            },
        );

        let err = orchestrator.run(&request).await.unwrap_err();
        match &err {
            OrchestratorError::Parameter {
                detail,
                fields,
                attempts,
            } => {
                assert_eq!(detail, "ERROR_VAL");
                assert_eq!(fields, &vec!["rgyear"]);
                assert_eq!(attempts.len(), 1);
            }
            other => panic!("expected parameter error, got {other:?}"),
        }
        assert!(!err.is_exhausted());
        assert_eq!(portal.submissions_seen().len(), 1);
    }

    #[tokio::test]
    async fn rejected_challenges_exhaust_with_fresh_sessions() {
        let portal = Arc::new(ScriptedPortal::new(vec![], REJECTED));
        let orchestrator = orchestrator(portal.clone(), Arc::new(ScriptedSolver::fixed()), policy(4));

        let err = orchestrator.run(&case_query()).await.unwrap_err();
        assert!(err.is_exhausted());

        let attempts = err.attempts();
        assert_eq!(attempts.len(), 4);
        let mut ids: Vec<_> = attempts.iter().filter_map(|a| a.session_id.clone()).collect();
        ids.dedup();
        assert_eq!(ids, vec!["sess-1", "sess-2", "sess-3", "sess-4"]);
        assert!(attempts.iter().all(|a| a.outcome == OutcomeTag::ChallengeRejected));

        // Each submission carries the cookie of the session that fetched its challenge.
        let submissions = portal.submissions_seen();
        assert_eq!(submissions.len(), 4);
        for (n, submission) in submissions.iter().enumerate() {
            let cookie = submission.headers.get(COOKIE).unwrap().to_str().unwrap();
            assert_eq!(cookie, format!("HCSERVICES_SESSID=sess-{}", n + 1));
            let answer = submission
                .form
                .iter()
                .find(|(k, _)| k == "captcha")
                .map(|(_, v)| v.clone());
            assert_eq!(answer, Some(format!("ans{}", n + 1)));
        }
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_after_transport_failures() {
        let portal = Arc::new(ScriptedPortal::new(
            vec![
                Err(TransportError::Connect("reset".into())),
                Err(TransportError::Timeout(Duration::from_secs(30))),
                Ok(RECORDS),
            ],
            REJECTED,
        ));
        let orchestrator = orchestrator(portal, Arc::new(ScriptedSolver::fixed()), policy(3));

        let report = orchestrator.run(&case_query()).await.unwrap();
        assert_eq!(report.attempts.len(), 3);
        assert!(matches!(
            report.attempts[0].outcome,
            OutcomeTag::TransportFailure(_)
        ));
        assert_eq!(report.attempts[2].outcome, OutcomeTag::Success);
        match report.result {
            ParsedResult::Cases { records, total } => {
                assert_eq!(total, 1);
                assert_eq!(records[0].cnr_number, "DLHC01");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_response_is_retried() {
        let portal = Arc::new(ScriptedPortal::new(vec![Ok("<html>busy</html>")], RECORDS));
        let orchestrator = orchestrator(portal, Arc::new(ScriptedSolver::fixed()), policy(2));

        let report = orchestrator.run(&case_query()).await.unwrap();
        assert!(matches!(
            report.attempts[0].outcome,
            OutcomeTag::ParseFailure(_)
        ));
        assert_eq!(report.attempts.len(), 2);
    }

    #[tokio::test]
    async fn solver_failures_and_blank_answers_are_retried() {
        let portal = Arc::new(ScriptedPortal::new(vec![], RECORDS));
        let solver = Arc::new(ScriptedSolver::new(vec![
            Err(SolverError::Unavailable("ocr offline".into())),
            Ok("   ".into()),
        ]));
        let orchestrator = orchestrator(portal.clone(), solver, policy(3));

        let report = orchestrator.run(&case_query()).await.unwrap();
        assert_eq!(report.attempts.len(), 3);
        assert!(matches!(
            report.attempts[0].outcome,
            OutcomeTag::SolverFailure(_)
        ));
        assert!(matches!(
            report.attempts[1].outcome,
            OutcomeTag::SolverFailure(_)
        ));
        assert_eq!(report.attempts[1].answer, None);
        assert_eq!(report.attempts[2].answer.as_deref(), Some("ans3"));
        assert_eq!(portal.submissions_seen().len(), 1);
    }

    #[tokio::test]
    async fn fatal_solver_errors_surface_immediately() {
        let portal = Arc::new(ScriptedPortal::new(vec![], RECORDS));
        let solver = Arc::new(ScriptedSolver::new(vec![Err(SolverError::Unavailable(
            "no model".into(),
        ))]));
        let orchestrator = orchestrator(
            portal,
            solver,
            RetryPolicy {
                fatal_solver_errors: true,
                ..policy(3)
            },
        );

        let err = orchestrator.run(&case_query()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Solver(SolverError::Unavailable(_))));
    }

    #[tokio::test]
    async fn handshake_failures_share_the_attempt_budget_by_default() {
        let portal = Arc::new(ScriptedPortal::new(vec![], RECORDS).failing_handshakes(2));
        let orchestrator = orchestrator(portal, Arc::new(ScriptedSolver::fixed()), policy(2));

        let err = orchestrator.run(&case_query()).await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts().len(), 2);
        assert!(err.attempts().iter().all(|a| a.session_id.is_none()));
    }

    #[tokio::test]
    async fn separate_budget_keeps_attempts_for_submissions() {
        let portal = Arc::new(ScriptedPortal::new(vec![], RECORDS).failing_handshakes(2));
        let orchestrator = orchestrator(
            portal,
            Arc::new(ScriptedSolver::fixed()),
            RetryPolicy {
                acquisition_budget: AcquisitionBudget::Separate { max_failures: 3 },
                ..policy(1)
            },
        );

        let report = orchestrator.run(&case_query()).await.unwrap();
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.attempts[2].session_id.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn separate_budget_gives_up_after_max_failures() {
        let portal = Arc::new(ScriptedPortal::new(vec![], RECORDS).failing_handshakes(10));
        let orchestrator = orchestrator(
            portal,
            Arc::new(ScriptedSolver::fixed()),
            RetryPolicy {
                acquisition_budget: AcquisitionBudget::Separate { max_failures: 2 },
                ..policy(5)
            },
        );

        let err = orchestrator.run(&case_query()).await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts().len(), 2);
    }

    #[tokio::test]
    async fn retryable_handshake_failure_is_retried_even_when_session_errors_are_fatal() {
        let portal = Arc::new(ScriptedPortal::new(vec![], RECORDS).failing_handshakes(1));
        let orchestrator = orchestrator(
            portal.clone(),
            Arc::new(ScriptedSolver::fixed()),
            RetryPolicy {
                fatal_session_errors: true,
                ..policy(3)
            },
        );

        let report = orchestrator.run(&case_query()).await.unwrap();
        assert_eq!(report.attempts.len(), 2);
        assert!(matches!(
            report.attempts[0].outcome,
            OutcomeTag::SessionFailure(_)
        ));
        assert_eq!(report.attempts[1].session_id.as_deref(), Some("sess-1"));
        assert_eq!(portal.handshakes(), 1);
    }

    #[tokio::test]
    async fn non_retryable_handshake_failure_is_fatal_when_configured() {
        let portal = Arc::new(ScriptedPortal::new(vec![], RECORDS).handshake_status(404));
        let orchestrator = orchestrator(
            portal.clone(),
            Arc::new(ScriptedSolver::fixed()),
            RetryPolicy {
                fatal_session_errors: true,
                ..policy(3)
            },
        );

        let err = orchestrator.run(&case_query()).await.unwrap_err();
        match err {
            OrchestratorError::Session(SessionError::Transport(TransportError::Status {
                status,
                ..
            })) => assert_eq!(status, 404),
            other => panic!("expected fatal session error, got {other:?}"),
        }
        assert!(portal.submissions_seen().is_empty());
    }

    #[tokio::test]
    async fn dropping_the_query_abandons_a_pending_solve() {
        let portal = Arc::new(ScriptedPortal::new(vec![], RECORDS));
        let orchestrator = orchestrator(portal.clone(), Arc::new(StalledSolver), policy(3));

        let outcome =
            tokio::time::timeout(Duration::from_millis(50), orchestrator.run(&case_query())).await;
        assert!(outcome.is_err());
        assert_eq!(portal.handshakes(), 1);
        assert!(portal.submissions_seen().is_empty());
    }

    #[tokio::test]
    async fn judgment_search_fetches_results_after_accepted_check() {
        const ACCEPTED: &str = r#"{"captcha_status":"Y","app_token":"tok-2","errormsg":""}"#;
        const REFUSED: &str = r#"{"captcha_status":"N","errormsg":"Invalid Captcha"}"#;
        const RESULTS: &str = r#"<table id="resultTable"><tr><th>h</th></tr>
            <tr><td>1</td><td><strong>A vs B</strong> WP 1/2024</td><td>Delhi High Court</td>
            <td>Hon'ble X</td><td>01-02-2024</td><td><a href="a.pdf">PDF</a></td><td></td></tr></table>"#;

        let portal = Arc::new(ScriptedPortal::new(
            vec![Ok(REFUSED), Ok(ACCEPTED), Ok(RESULTS)],
            REFUSED,
        ));
        let orchestrator = orchestrator_at(
            portal.clone(),
            Arc::new(ScriptedSolver::fixed()),
            policy(3),
            PortalEndpoints::judgments("http://portal.test/pdfsearch/").unwrap(),
        );
        let request = QueryRequest::new(
            Court::new("High Courts", ""),
            QueryKind::Judgments {
                text: "bail".into(),
                mode: crate::challenges::core::SearchMode::Phrase,
                scope: crate::challenges::core::JudgmentScope::HighCourts,
            },
        );

        let report = orchestrator.run(&request).await.unwrap();
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].outcome, OutcomeTag::ChallengeRejected);
        assert_eq!(report.attempts[1].session_id.as_deref(), Some("sess-2"));
        match report.result {
            ParsedResult::Judgments(page) => {
                assert_eq!(page.items.len(), 1);
                assert_eq!(page.items[0].title, "A vs B");
                assert_eq!(page.items[0].pdf_url, "http://portal.test/pdfsearch/a.pdf");
            }
            other => panic!("unexpected result {other:?}"),
        }

        // The results request reuses the accepted answer, token and session.
        let seen = portal.seen.lock().unwrap().clone();
        let results = seen.last().unwrap();
        let query: Vec<(String, String)> = results.url.query_pairs().into_owned().collect();
        assert!(query.contains(&("p".into(), "pdf_search/home".into())));
        assert!(query.contains(&("app_token".into(), "tok-2".into())));
        assert!(query.contains(&("captcha".into(), "ans2".into())));
        assert_eq!(results.headers.get(COOKIE).unwrap(), "HCSERVICES_SESSID=sess-2");
    }
}
