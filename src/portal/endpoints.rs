//! URL layout and form construction for the HC services portal.
//!
//! The portal answers AJAX POSTs on `cases_qry/index_qry.php`, discriminated
//! by `action_code`. Whether that code rides in the query string or the body
//! depends on the action, so every builder here states it explicitly.

use chrono::NaiveDate;
use url::Url;

use super::judgments;
use crate::challenges::core::{
    ActionPlacement, QueryKind, QueryRequest, RequestSpec, Session, TransportError,
};

pub const DEFAULT_BASE_URL: &str = "https://hcservices.ecourts.gov.in/hcservices/";

const MAIN_PAGE: &str = "main.php";
const CAPTCHA_IMAGE: &str = "securimage/securimage_show.php";
const INDEX_QRY: &str = "cases_qry/index_qry.php";
const CASE_QRY_DIR: &str = "cases_qry/";

pub const SHOW_RECORDS: &str = "showRecords";
pub const SHOW_CAUSE_LIST: &str = "showCauseList";
pub const FILL_BENCH: &str = "fillHCBench";
pub const FILL_CASE_TYPE: &str = "fillCaseType";

const DATE_FORMAT: &str = "%d-%m-%Y";

/// Portal a set of endpoints addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    HcServices,
    JudgmentSearch,
}

/// Resolved portal resources under a base URL.
#[derive(Debug, Clone)]
pub struct PortalEndpoints {
    base: Url,
    site: Site,
}

impl PortalEndpoints {
    pub fn new(base: &str) -> Result<Self, url::ParseError> {
        Self::for_site(base, Site::HcServices)
    }

    /// Endpoints of the judgment search portal under `base`.
    pub fn judgments(base: &str) -> Result<Self, url::ParseError> {
        Self::for_site(base, Site::JudgmentSearch)
    }

    fn for_site(base: &str, site: Site) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base, site })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn site(&self) -> Site {
        self.site
    }

    fn join(&self, path: &str) -> Url {
        // Static relative paths always join onto a valid base.
        self.base.join(path).unwrap_or_else(|_| self.base.clone())
    }

    pub fn main_page(&self) -> Url {
        match self.site {
            Site::HcServices => self.join(MAIN_PAGE),
            Site::JudgmentSearch => self.base.clone(),
        }
    }

    pub fn captcha_image(&self) -> Url {
        match self.site {
            Site::HcServices => self.join(CAPTCHA_IMAGE),
            Site::JudgmentSearch => self.join(judgments::CAPTCHA_IMAGE),
        }
    }

    /// Base URL routed to a judgment portal page via its `p` parameter.
    pub fn judgment_page(&self, page: &str) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("p", page);
        url
    }

    pub fn index_qry(&self) -> Url {
        self.join(INDEX_QRY)
    }

    /// Directory relative cause-list links resolve against.
    pub fn case_qry_dir(&self) -> Url {
        self.join(CASE_QRY_DIR)
    }
}

impl Default for PortalEndpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL).expect("invalid default portal url")
    }
}

fn field(name: &str, value: impl Into<String>) -> (String, String) {
    (name.to_string(), value.into())
}

/// Submission for a challenge-gated query, carrying the solver's answer.
pub fn submission(
    endpoints: &PortalEndpoints,
    request: &QueryRequest,
    answer: &str,
    session: &Session,
    today: NaiveDate,
) -> Result<RequestSpec, TransportError> {
    let judgment_site = endpoints.site() == Site::JudgmentSearch;
    if request.kind.is_judgment_search() != judgment_site {
        return Err(TransportError::InvalidRequest(format!(
            "query cannot be sent to the {:?} portal",
            endpoints.site()
        )));
    }

    let court = &request.court;
    let (form, action, placement) = match &request.kind {
        QueryKind::Judgments { text, mode, .. } => {
            return judgments::check_challenge(endpoints, text, *mode, answer, session);
        }
        QueryKind::CaseNumber {
            case_type,
            case_number,
            year,
        } => (
            vec![
                field("court_code", &court.bench_code),
                field("state_code", &court.state_code),
                field("court_complex_code", &court.complex_code),
                field("caseStatusSearchType", "CScaseNumber"),
                field("captcha", answer),
                field("case_type", case_type),
                field("case_no", case_number),
                field("rgyear", year),
                field("caseNoType", "new"),
                field("displayOldCaseNo", "NO"),
            ],
            SHOW_RECORDS,
            ActionPlacement::QueryString,
        ),
        QueryKind::PartyName {
            party_name,
            year,
            status,
        } => (
            vec![
                field("court_code", &court.bench_code),
                field("state_code", &court.state_code),
                field("court_complex_code", &court.complex_code),
                field("caseStatusSearchType", "CSpartyName"),
                field("captcha", answer),
                field("f", status.as_str()),
                field("petres_name", party_name),
                field("rgyear", year),
            ],
            SHOW_RECORDS,
            ActionPlacement::QueryString,
        ),
        QueryKind::Orders {
            case_type,
            case_number,
            year,
        } => (
            vec![
                field("court_code", &court.bench_code),
                field("state_code", &court.state_code),
                field("court_complex_code", &court.complex_code),
                field("caseStatusSearchType", "COCaseNumber"),
                field("captcha", answer),
                field("case_type", case_type),
                field("case_no", case_number),
                field("rgyear", year),
                field("caseNoType", "new"),
                field("displayOldCaseNo", "NO"),
            ],
            SHOW_RECORDS,
            ActionPlacement::QueryString,
        ),
        QueryKind::CauseList { kind, date } => {
            let selprevdays = if *date < today { "1" } else { "0" };
            (
                vec![
                    field("flag", kind.flag()),
                    field("selprevdays", selprevdays),
                    field("captcha", answer),
                    field("state_code", &court.state_code),
                    field("court_code", &court.bench_code),
                    field("caseStatusSearchType", "CLcauselist"),
                    field("appFlag", ""),
                    field("causelist_date", date.format(DATE_FORMAT).to_string()),
                ],
                SHOW_CAUSE_LIST,
                ActionPlacement::Body,
            )
        }
    };

    RequestSpec::post(endpoints.index_qry(), form)
        .with_action(action, placement)
        .with_referer(&endpoints.main_page())?
        .with_session(session)
}

/// Bench listing for a state; action travels in the body.
pub fn bench_listing(
    endpoints: &PortalEndpoints,
    state_code: &str,
    session: &Session,
) -> Result<RequestSpec, TransportError> {
    RequestSpec::post(
        endpoints.index_qry(),
        vec![field("state_code", state_code), field("appFlag", "web")],
    )
    .with_action(FILL_BENCH, ActionPlacement::Body)
    .with_referer(&endpoints.main_page())?
    .with_session(session)
}

/// Case-type listing for a bench; action travels in the query string.
pub fn case_type_listing(
    endpoints: &PortalEndpoints,
    state_code: &str,
    bench_code: &str,
    session: &Session,
) -> Result<RequestSpec, TransportError> {
    RequestSpec::post(
        endpoints.index_qry(),
        vec![field("court_code", bench_code), field("state_code", state_code)],
    )
    .with_action(FILL_CASE_TYPE, ActionPlacement::QueryString)
    .with_referer(&endpoints.main_page())?
    .with_session(session)
}
