//! Judgment search portal requests.
//!
//! A search is gated twice: the answer is first posted to `checkCaptcha`,
//! which returns an `app_token`, and only then is the results page fetched
//! under the same session with both the answer and the token.

use http::header::{HeaderName, HeaderValue};

use super::endpoints::{PortalEndpoints, Site};
use crate::challenges::core::{
    JudgmentScope, QueryKind, QueryRequest, RequestSpec, SearchMode, Session, TransportError,
};

pub const DEFAULT_JUDGMENTS_BASE_URL: &str = "https://judgments.ecourts.gov.in/pdfsearch/";

/// Cookie name the judgment portal issues its session under.
pub const JUDGMENTS_SESSION_COOKIE: &str = "PHPSESSID";

pub(super) const CAPTCHA_IMAGE: &str = "vendor/securimage/securimage_show.php";

const CHECK_CAPTCHA: &str = "pdf_search/checkCaptcha";
const SEARCH_HOME: &str = "pdf_search/home";

fn field(name: &str, value: impl Into<String>) -> (String, String) {
    (name.to_string(), value.into())
}

/// Post the solver's answer for validation.
pub fn check_challenge(
    endpoints: &PortalEndpoints,
    text: &str,
    mode: SearchMode,
    answer: &str,
    session: &Session,
) -> Result<RequestSpec, TransportError> {
    RequestSpec::post(
        endpoints.judgment_page(CHECK_CAPTCHA),
        vec![
            field("captcha", answer),
            field("search_text", text),
            field("search_opt", mode.as_str()),
            field("escr_flag", ""),
            field("proximity", ""),
            field("sel_lang", ""),
            field("ajax_req", "true"),
            field("app_token", ""),
        ],
    )
    .with_header(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    )
    .with_referer(&endpoints.main_page())?
    .with_session(session)
}

/// Results page for a search whose answer was accepted with `token`.
pub fn search_results(
    endpoints: &PortalEndpoints,
    text: &str,
    mode: SearchMode,
    scope: JudgmentScope,
    answer: &str,
    token: &str,
    session: &Session,
) -> Result<RequestSpec, TransportError> {
    let mut url = endpoints.judgment_page(SEARCH_HOME);
    url.query_pairs_mut()
        .append_pair("text", text)
        .append_pair("captcha", answer)
        .append_pair("search_opt", mode.as_str())
        .append_pair("fcourt_type", scope.code())
        .append_pair("escr_flag", "")
        .append_pair("proximity", "")
        .append_pair("sel_lang", "")
        .append_pair("app_token", token);

    RequestSpec::get(url)
        .with_referer(&endpoints.main_page())?
        .with_session(session)
}

/// Request that follows an accepted challenge check. Only judgment searches
/// have one.
pub fn follow_up(
    endpoints: &PortalEndpoints,
    request: &QueryRequest,
    answer: &str,
    token: &str,
    session: &Session,
) -> Result<RequestSpec, TransportError> {
    match &request.kind {
        QueryKind::Judgments { text, mode, scope } if endpoints.site() == Site::JudgmentSearch => {
            search_results(endpoints, text, *mode, *scope, answer, token, session)
        }
        _ => Err(TransportError::InvalidRequest(
            "accepted challenge check outside a judgment search".into(),
        )),
    }
}
