//! Core data structures shared by the session, parser, and orchestration layers.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::portal::models::{CaseInfo, CaseOrder, CauseListPdf, JudgmentPage};

/// Short-lived portal session established by the handshake request.
///
/// A session backs exactly one challenge and is dropped once the attempt that
/// opened it concludes.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub cookie_name: String,
    pub cookies: Vec<(String, String)>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(cookie_name: impl Into<String>, id: impl Into<String>) -> Self {
        let cookie_name = cookie_name.into();
        let id = id.into();
        Self {
            cookies: vec![(cookie_name.clone(), id.clone())],
            id,
            cookie_name,
            created_at: Utc::now(),
        }
    }

    pub fn with_cookies(mut self, cookies: Vec<(String, String)>) -> Self {
        for (name, value) in cookies {
            if name != self.cookie_name {
                self.cookies.push((name, value));
            }
        }
        self
    }

    /// `Cookie` header value carrying every cookie issued during the handshake.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Challenge image bound to the session that fetched it.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub session_id: String,
    pub image: bytes::Bytes,
}

/// Court descriptor supplied by the external registry. Passed through to
/// request construction untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Court {
    pub name: String,
    pub state_code: String,
    pub bench_code: String,
    pub complex_code: String,
}

impl Court {
    pub fn new(name: impl Into<String>, state_code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state_code: state_code.into(),
            bench_code: "1".into(),
            complex_code: "1".into(),
        }
    }

    /// Select a bench; the complex code follows the bench unless set explicitly.
    pub fn with_bench(mut self, bench_code: impl Into<String>) -> Self {
        self.bench_code = bench_code.into();
        self.complex_code = self.bench_code.clone();
        self
    }

    pub fn with_complex(mut self, complex_code: impl Into<String>) -> Self {
        self.complex_code = complex_code.into();
        self
    }
}

/// Disposal filter for party-name searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    Pending,
    Disposed,
    #[default]
    Both,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::Pending => "Pending",
            StatusFilter::Disposed => "Disposed",
            StatusFilter::Both => "Both",
        }
    }
}

/// Civil or criminal cause list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseListKind {
    Civil,
    Criminal,
}

impl CauseListKind {
    pub fn flag(&self) -> &'static str {
        match self {
            CauseListKind::Civil => "civ_t",
            CauseListKind::Criminal => "cri_t",
        }
    }
}

/// How the judgment search matches its keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Exact phrase.
    #[default]
    Phrase,
    /// Any of the words.
    Any,
    /// All of the words.
    All,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Phrase => "PHRASE",
            SearchMode::Any => "ANY",
            SearchMode::All => "ALL",
        }
    }
}

/// Collection the judgment search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JudgmentScope {
    #[default]
    HighCourts,
    SupremeCourtReports,
}

impl JudgmentScope {
    /// `fcourt_type` value on the search form.
    pub fn code(&self) -> &'static str {
        match self {
            JudgmentScope::HighCourts => "2",
            JudgmentScope::SupremeCourtReports => "3",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JudgmentScope::HighCourts => "High Courts",
            JudgmentScope::SupremeCourtReports => "Supreme Court Reports",
        }
    }
}

/// Search mode and identifiers of a challenge-gated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    CaseNumber {
        case_type: String,
        case_number: String,
        year: String,
    },
    PartyName {
        party_name: String,
        year: String,
        status: StatusFilter,
    },
    Orders {
        case_type: String,
        case_number: String,
        year: String,
    },
    CauseList {
        kind: CauseListKind,
        date: NaiveDate,
    },
    /// Full-text search on the judgment portal. The answer is validated by a
    /// separate check call before results are requested.
    Judgments {
        text: String,
        mode: SearchMode,
        scope: JudgmentScope,
    },
}

impl QueryKind {
    /// True for queries served by the judgment search portal.
    pub fn is_judgment_search(&self) -> bool {
        matches!(self, QueryKind::Judgments { .. })
    }
}

/// Caller parameters for one logical operation. Immutable for the lifetime of
/// the retry loop; every attempt submits the same request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub court: Court,
    pub kind: QueryKind,
}

impl QueryRequest {
    pub fn new(court: Court, kind: QueryKind) -> Self {
        Self { court, kind }
    }

    /// Shape the portal answers this query with.
    pub fn expected_shape(&self) -> ExpectedShape {
        match self.kind {
            QueryKind::CaseNumber { .. } | QueryKind::PartyName { .. } => {
                ExpectedShape::CaseEnvelope
            }
            QueryKind::Orders { .. } => ExpectedShape::OrdersTable,
            QueryKind::CauseList { .. } => ExpectedShape::CauseListTable,
            QueryKind::Judgments { .. } => ExpectedShape::ChallengeCheck,
        }
    }

    /// Mandatory portal fields left blank by the caller. Used to give a
    /// parameter error some context, since the portal only answers `ERROR_VAL`.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match &self.kind {
            QueryKind::CaseNumber {
                case_type,
                case_number,
                year,
            }
            | QueryKind::Orders {
                case_type,
                case_number,
                year,
            } => {
                if case_type.trim().is_empty() {
                    missing.push("case_type");
                }
                if case_number.trim().is_empty() {
                    missing.push("case_no");
                }
                if year.trim().is_empty() {
                    missing.push("rgyear");
                }
            }
            QueryKind::PartyName {
                party_name, year, ..
            } => {
                if party_name.trim().is_empty() {
                    missing.push("petres_name");
                }
                if year.trim().is_empty() {
                    missing.push("rgyear");
                }
            }
            QueryKind::CauseList { .. } => {}
            QueryKind::Judgments { text, .. } => {
                if text.trim().is_empty() {
                    missing.push("search_text");
                }
                return missing;
            }
        }
        if self.court.state_code.trim().is_empty() {
            missing.push("state_code");
        }
        missing
    }
}

/// Outer structure the calling endpoint expects. Never auto-detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    /// `{"con": ["[...]"], "totRecords": "N", "Error": ""}` carrying case records.
    CaseEnvelope,
    /// `code~name#code~name#` listing.
    Delimited,
    /// HTML table of orders.
    OrdersTable,
    /// HTML table of cause-list PDF links.
    CauseListTable,
    /// `{"captcha_status": "Y", "app_token": "..."}` answer to a judgment
    /// search challenge check.
    ChallengeCheck,
    /// HTML table of judgment search results.
    JudgmentTable,
}

/// Decoded record set produced from a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResult {
    Cases { records: Vec<CaseInfo>, total: usize },
    Orders(Vec<CaseOrder>),
    CauseList(Vec<CauseListPdf>),
    Listing(std::collections::BTreeMap<String, String>),
    /// Challenge answer accepted; `token` authorises the results request.
    ChallengeAccepted { token: String },
    Judgments(JudgmentPage),
}

impl ParsedResult {
    pub fn len(&self) -> usize {
        match self {
            ParsedResult::Cases { records, .. } => records.len(),
            ParsedResult::Orders(orders) => orders.len(),
            ParsedResult::CauseList(entries) => entries.len(),
            ParsedResult::Listing(map) => map.len(),
            ParsedResult::ChallengeAccepted { .. } => 0,
            ParsedResult::Judgments(page) => page.items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classification of a single submission response.
#[derive(Debug)]
pub enum Outcome {
    Success(ParsedResult),
    ParameterError(String),
    ChallengeRejected,
    TransportFailure(super::executor::TransportError),
    ParseFailure(crate::challenges::parser::ParseError),
}

impl Outcome {
    pub fn tag(&self) -> OutcomeTag {
        match self {
            Outcome::Success(_) => OutcomeTag::Success,
            Outcome::ParameterError(detail) => OutcomeTag::ParameterError(detail.clone()),
            Outcome::ChallengeRejected => OutcomeTag::ChallengeRejected,
            Outcome::TransportFailure(err) => OutcomeTag::TransportFailure(err.to_string()),
            Outcome::ParseFailure(err) => OutcomeTag::ParseFailure(err.to_string()),
        }
    }
}

/// Payload-free record of how an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeTag {
    Success,
    ParameterError(String),
    ChallengeRejected,
    TransportFailure(String),
    ParseFailure(String),
    SessionFailure(String),
    SolverFailure(String),
}

impl OutcomeTag {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, OutcomeTag::Success | OutcomeTag::ParameterError(_))
    }
}

impl fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeTag::Success => write!(f, "success"),
            OutcomeTag::ParameterError(detail) => write!(f, "parameter error ({detail})"),
            OutcomeTag::ChallengeRejected => write!(f, "challenge rejected"),
            OutcomeTag::TransportFailure(cause) => write!(f, "transport failure: {cause}"),
            OutcomeTag::ParseFailure(cause) => write!(f, "parse failure: {cause}"),
            OutcomeTag::SessionFailure(cause) => write!(f, "session failure: {cause}"),
            OutcomeTag::SolverFailure(cause) => write!(f, "solver failure: {cause}"),
        }
    }
}

/// One pass through the session → challenge → submit pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub ordinal: usize,
    pub session_id: Option<String>,
    pub answer: Option<String>,
    pub outcome: OutcomeTag,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_joins_all_cookies() {
        let session = Session::new("HCSERVICES_SESSID", "abc").with_cookies(vec![
            ("HCSERVICES_SESSID".into(), "abc".into()),
            ("lb".into(), "node2".into()),
        ]);
        assert_eq!(session.cookie_header(), "HCSERVICES_SESSID=abc; lb=node2");
    }

    #[test]
    fn party_search_without_year_reports_rgyear() {
        let request = QueryRequest::new(
            Court::new("Delhi High Court", "26"),
            QueryKind::PartyName {
                party_name: "Sharma".into(),
                year: " ".into(),
                status: StatusFilter::Both,
            },
        );
        assert_eq!(request.missing_fields(), vec!["rgyear"]);
        assert_eq!(request.expected_shape(), ExpectedShape::CaseEnvelope);
    }

    #[test]
    fn judgment_search_only_needs_text() {
        let request = QueryRequest::new(
            Court::new(JudgmentScope::HighCourts.label(), ""),
            QueryKind::Judgments {
                text: "  ".into(),
                mode: SearchMode::Any,
                scope: JudgmentScope::HighCourts,
            },
        );
        assert_eq!(request.missing_fields(), vec!["search_text"]);
        assert_eq!(request.expected_shape(), ExpectedShape::ChallengeCheck);
        assert!(request.kind.is_judgment_search());
        assert_eq!(JudgmentScope::SupremeCourtReports.code(), "3");
        assert_eq!(SearchMode::default().as_str(), "PHRASE");
    }

    #[test]
    fn bench_selection_moves_complex_code() {
        let court = Court::new("Bombay High Court", "1").with_bench("2");
        assert_eq!(court.complex_code, "2");
        let court = court.with_complex("7");
        assert_eq!(court.bench_code, "2");
        assert_eq!(court.complex_code, "7");
    }
}
