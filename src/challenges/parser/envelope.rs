//! JSON envelope decoding for `showRecords` responses.
//!
//! Shape on success: `{"con": ["[{...}, ...]"], "totRecords": "N", "Error": ""}`.
//! The first element of `con` is itself a JSON-encoded string.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::ParseError;
use crate::challenges::core::{ExpectedShape, Outcome, ParsedResult};
use crate::portal::CaseInfo;

/// Envelope-level sentinels, parameter error first.
fn sentinel(envelope: &Map<String, Value>) -> Option<Outcome> {
    if let Some(Value::String(error)) = envelope.get("Error") {
        let error = error.trim();
        if !error.is_empty() {
            return Some(Outcome::ParameterError(error.to_string()));
        }
    }

    // On a wrong answer `con` turns from an array into a message string.
    if let Some(Value::String(con)) = envelope.get("con")
        && con.to_ascii_lowercase().contains("captcha")
    {
        return Some(Outcome::ChallengeRejected);
    }

    None
}

/// Error envelope on an endpoint that normally answers HTML or delimited text.
pub(super) fn error_envelope(text: &str, shape: ExpectedShape) -> Option<Outcome> {
    if !text.starts_with('{') {
        return None;
    }
    let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    Some(sentinel(&envelope).unwrap_or_else(|| {
        Outcome::ParseFailure(ParseError::UnexpectedShape(format!(
            "json envelope where {shape:?} was expected"
        )))
    }))
}

/// Judgment portal answer to a challenge check:
/// `{"captcha_status": "Y", "app_token": "...", "errormsg": ""}`.
pub(super) fn decode_challenge_check(body: &str) -> Outcome {
    let envelope = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(envelope)) => envelope,
        Ok(other) => {
            return Outcome::ParseFailure(ParseError::UnexpectedShape(format!(
                "challenge check is {}",
                kind(&other)
            )));
        }
        Err(err) => return Outcome::ParseFailure(ParseError::InvalidJson(err.to_string())),
    };

    if let Some(outcome) = sentinel(&envelope) {
        return outcome;
    }

    match envelope.get("captcha_status") {
        Some(Value::String(status)) if status.trim().eq_ignore_ascii_case("y") => {
            Outcome::Success(ParsedResult::ChallengeAccepted {
                token: text(&envelope, "app_token"),
            })
        }
        Some(Value::String(_)) => {
            log::debug!(
                "challenge check refused: {}",
                text(&envelope, "errormsg")
            );
            Outcome::ChallengeRejected
        }
        _ => Outcome::ParseFailure(ParseError::UnexpectedShape(
            "challenge check without captcha_status".into(),
        )),
    }
}

pub(super) fn decode_cases(text: &str) -> Outcome {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(err) => match serde_json::from_str::<Value>(&sanitize_controls(text)) {
            Ok(value) => value,
            Err(_) => return Outcome::ParseFailure(ParseError::InvalidJson(err.to_string())),
        },
    };
    let Value::Object(envelope) = value else {
        return Outcome::ParseFailure(ParseError::UnexpectedShape(
            "envelope is not an object".into(),
        ));
    };

    if let Some(outcome) = sentinel(&envelope) {
        return outcome;
    }

    let raw_records = match envelope.get("con") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => match items.first() {
            None => Vec::new(),
            Some(Value::String(inner)) => match decode_inner(inner) {
                Ok(records) => records,
                Err(err) => return Outcome::ParseFailure(err),
            },
            Some(Value::Object(record)) => vec![record.clone()],
            Some(other) => {
                return Outcome::ParseFailure(ParseError::UnexpectedShape(format!(
                    "con[0] is {}",
                    kind(other)
                )));
            }
        },
        Some(other) => {
            return Outcome::ParseFailure(ParseError::UnexpectedShape(format!(
                "con is {}",
                kind(other)
            )));
        }
    };

    let records: Vec<CaseInfo> = raw_records.iter().map(case_from_record).collect();
    let total = lenient_count(envelope.get("totRecords")).unwrap_or(records.len());
    log::debug!("parsed {}/{} case records", records.len(), total);

    Outcome::Success(ParsedResult::Cases { records, total })
}

/// Decode the string-encoded record array, tolerating raw control characters.
fn decode_inner(inner: &str) -> Result<Vec<Map<String, Value>>, ParseError> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value = match serde_json::from_str::<Value>(inner) {
        Ok(value) => value,
        Err(_) => serde_json::from_str::<Value>(&sanitize_controls(inner))
            .map_err(|err| ParseError::InnerPayload(err.to_string()))?,
    };

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(ParseError::InnerPayload(format!(
                    "record is {}",
                    kind(&other)
                ))),
            })
            .collect(),
        Value::Object(record) => Ok(vec![record]),
        other => Err(ParseError::InnerPayload(format!(
            "payload is {}",
            kind(&other)
        ))),
    }
}

fn sanitize_controls(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '\n' | '\r' | '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn text(record: &Map<String, Value>, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(value)) => value.trim().to_string(),
        Some(Value::Number(value)) => value.to_string(),
        Some(Value::Bool(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn lenient_count(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(super) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn case_from_record(record: &Map<String, Value>) -> CaseInfo {
    let number = text(record, "case_no2");
    let year = text(record, "case_year");
    let case_number = if !number.is_empty() && !year.is_empty() {
        format!("{number}/{year}")
    } else {
        String::new()
    };

    let mut status = text(record, "status_name");
    if status.is_empty() {
        status = text(record, "status");
    }

    CaseInfo {
        case_number,
        case_type: text(record, "case_type"),
        cnr_number: text(record, "cino"),
        filing_number: text(record, "case_no"),
        registration_date: parse_date(&text(record, "reg_date")),
        petitioner: text(record, "pet_name"),
        respondent: text(record, "res_name"),
        status,
        order_url_path: text(record, "orderurlpath"),
        court_name: String::new(),
    }
}
