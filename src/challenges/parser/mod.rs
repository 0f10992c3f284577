//! Response parser.
//!
//! Turns raw response bytes into a typed [`Outcome`]. The steps run in a fixed
//! order because each one is a distinct failure point:
//!
//! 1. strip leading byte-order marks,
//! 2. decode the outer envelope for the shape the endpoint promises,
//! 3. inspect envelope sentinels (parameter error before challenge rejection),
//! 4. decode the nested payload into records.
//!
//! Envelope-level sentinels become semantic outcomes; anything structurally
//! wrong becomes [`Outcome::ParseFailure`].

mod envelope;
mod listing;
mod tables;

pub use listing::{decode_listing, encode_listing};
pub(crate) use tables::resolve_order_link;

use thiserror::Error;

use crate::challenges::core::{ExpectedShape, Outcome, ParsedResult};
use crate::portal::PortalEndpoints;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Sentinel the portal puts in `Error` for missing or invalid parameters.
pub const PARAMETER_ERROR_SENTINEL: &str = "ERROR_VAL";

/// Structural decode failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("envelope is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
    #[error("nested payload could not be decoded: {0}")]
    InnerPayload(String),
    #[error("listing entry cannot be encoded: {0}")]
    Unencodable(String),
}

/// Remove leading whitespace and byte-order marks. Absence of a mark is fine.
pub fn strip_bom(raw: &[u8]) -> &[u8] {
    let mut body = raw.trim_ascii_start();
    while let Some(rest) = body.strip_prefix(BOM) {
        body = rest.trim_ascii_start();
    }
    body
}

/// Classifies portal responses.
#[derive(Debug, Clone, Default)]
pub struct ResponseParser {
    endpoints: PortalEndpoints,
}

impl ResponseParser {
    /// Relative links in HTML payloads are resolved against `endpoints`.
    pub fn new(endpoints: PortalEndpoints) -> Self {
        Self { endpoints }
    }

    pub fn parse(&self, raw: &[u8], shape: ExpectedShape) -> Outcome {
        let body = strip_bom(raw);
        let text = String::from_utf8_lossy(body);

        match shape {
            ExpectedShape::CaseEnvelope => return envelope::decode_cases(&text),
            ExpectedShape::ChallengeCheck => return envelope::decode_challenge_check(&text),
            _ => {}
        }

        // Non-JSON endpoints still report errors through the JSON envelope.
        if let Some(outcome) = envelope::error_envelope(&text, shape) {
            return outcome;
        }

        match shape {
            ExpectedShape::Delimited => match listing::decode_strict(&text) {
                Ok(entries) => Outcome::Success(ParsedResult::Listing(entries)),
                Err(err) => Outcome::ParseFailure(err),
            },
            ExpectedShape::OrdersTable => match tables::parse_orders(&text, self.endpoints.base()) {
                Ok(orders) => Outcome::Success(ParsedResult::Orders(orders)),
                Err(err) => Outcome::ParseFailure(err),
            },
            ExpectedShape::CauseListTable => {
                match tables::parse_cause_list(&text, &self.endpoints.case_qry_dir()) {
                    Ok(entries) => Outcome::Success(ParsedResult::CauseList(entries)),
                    Err(err) => Outcome::ParseFailure(err),
                }
            }
            ExpectedShape::JudgmentTable => {
                match tables::parse_judgments(&text, self.endpoints.base()) {
                    Ok(page) => Outcome::Success(ParsedResult::Judgments(page)),
                    Err(err) => Outcome::ParseFailure(err),
                }
            }
            ExpectedShape::CaseEnvelope => envelope::decode_cases(&text),
            ExpectedShape::ChallengeCheck => envelope::decode_challenge_check(&text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str =
        r#"{"con":["[{\"cino\":\"DLHC01\",\"pet_name\":\"A\"}]"],"totRecords":"1","Error":""}"#;

    fn parser() -> ResponseParser {
        ResponseParser::default()
    }

    fn cases(outcome: Outcome) -> Vec<crate::portal::CaseInfo> {
        match outcome {
            Outcome::Success(ParsedResult::Cases { records, .. }) => records,
            other => panic!("expected cases, got {other:?}"),
        }
    }

    #[test]
    fn scenario_envelope_yields_one_record() {
        let records = cases(parser().parse(SCENARIO.as_bytes(), ExpectedShape::CaseEnvelope));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cnr_number, "DLHC01");
        assert_eq!(records[0].petitioner, "A");
    }

    #[test]
    fn bom_prefix_does_not_change_records() {
        let mut prefixed = BOM.to_vec();
        prefixed.extend_from_slice(b"  ");
        prefixed.extend_from_slice(BOM);
        prefixed.extend_from_slice(SCENARIO.as_bytes());

        let plain = cases(parser().parse(SCENARIO.as_bytes(), ExpectedShape::CaseEnvelope));
        let stripped = cases(parser().parse(&prefixed, ExpectedShape::CaseEnvelope));
        assert_eq!(plain, stripped);
        assert_eq!(strip_bom(strip_bom(&prefixed)), strip_bom(&prefixed));
    }

    #[test]
    fn parameter_sentinel_is_not_a_challenge_rejection() {
        let outcome = parser().parse(br#"{"Error":"ERROR_VAL"}"#, ExpectedShape::CaseEnvelope);
        assert!(matches!(outcome, Outcome::ParameterError(ref s) if s == PARAMETER_ERROR_SENTINEL));
    }

    #[test]
    fn invalid_captcha_shape_is_rejected() {
        let outcome = parser().parse(br#"{"con":"Invalid Captcha"}"#, ExpectedShape::CaseEnvelope);
        assert!(matches!(outcome, Outcome::ChallengeRejected));

        let with_bom = parser().parse(
            b"\xEF\xBB\xBF{\"con\":\"Invalid Captcha\",\"Error\":\"\"}",
            ExpectedShape::CaseEnvelope,
        );
        assert!(matches!(with_bom, Outcome::ChallengeRejected));
    }

    #[test]
    fn html_endpoints_still_detect_sentinels() {
        let rejected = parser().parse(br#"{"con":"Invalid Captcha"}"#, ExpectedShape::CauseListTable);
        assert!(matches!(rejected, Outcome::ChallengeRejected));

        let param = parser().parse(br#"{"Error":"ERROR_VAL"}"#, ExpectedShape::OrdersTable);
        assert!(matches!(param, Outcome::ParameterError(_)));

        let mismatch = parser().parse(br#"{"con":[]}"#, ExpectedShape::OrdersTable);
        assert!(matches!(mismatch, Outcome::ParseFailure(ParseError::UnexpectedShape(_))));
    }

    #[test]
    fn maintenance_page_on_html_endpoint_is_a_parse_failure() {
        let outcome = parser().parse(
            b"<html><body><h1>Service Unavailable</h1></body></html>",
            ExpectedShape::OrdersTable,
        );
        assert!(matches!(outcome, Outcome::ParseFailure(ParseError::UnexpectedShape(_))));

        let empty = parser().parse(b"", ExpectedShape::CauseListTable);
        assert!(matches!(empty, Outcome::Success(ParsedResult::CauseList(ref e)) if e.is_empty()));
    }

    #[test]
    fn judgment_shapes_dispatch() {
        let parser = ResponseParser::new(
            PortalEndpoints::judgments(crate::portal::DEFAULT_JUDGMENTS_BASE_URL).unwrap(),
        );
        let check = parser.parse(
            b"\xEF\xBB\xBF{\"captcha_status\":\"Y\",\"app_token\":\"t1\"}",
            ExpectedShape::ChallengeCheck,
        );
        assert!(matches!(check, Outcome::Success(ParsedResult::ChallengeAccepted { .. })));

        let rejected = parser.parse(br#"{"con":"Invalid Captcha"}"#, ExpectedShape::JudgmentTable);
        assert!(matches!(rejected, Outcome::ChallengeRejected));

        let table = parser.parse(
            br#"<table id="resultTable"><tr><th>h</th></tr></table>"#,
            ExpectedShape::JudgmentTable,
        );
        assert!(matches!(table, Outcome::Success(ParsedResult::Judgments(ref p)) if p.items.is_empty()));
    }

    #[test]
    fn delimited_listing_parses() {
        let outcome = parser().parse(
            "\u{feff}0~Select Bench#1~Principal Bench at Delhi#".as_bytes(),
            ExpectedShape::Delimited,
        );
        match outcome {
            Outcome::Success(ParsedResult::Listing(map)) => {
                assert_eq!(map.len(), 1);
                assert_eq!(map["1"], "Principal Bench at Delhi");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
