//! `code~name#code~name#` listings returned by the bench and case-type lookups.

use std::collections::BTreeMap;

use html_escape::{decode_html_entities, encode_text};

use super::ParseError;

const ENTRY_SEPARATOR: char = '#';
const FIELD_SEPARATOR: char = '~';

fn clean(raw: &str) -> &str {
    raw.trim().trim_start_matches('\u{feff}').trim()
}

/// Decode a listing; trailing separators and empty segments are skipped, as
/// are the `0`/"Select ..." placeholders.
pub fn decode_listing(raw: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for segment in raw.split(ENTRY_SEPARATOR) {
        let Some((code, name)) = clean(segment).split_once(FIELD_SEPARATOR) else {
            continue;
        };
        let code = clean(code);
        let name = decode_html_entities(clean(name)).trim().to_string();
        if code.is_empty() || code == "0" || name.is_empty() {
            continue;
        }
        if name.to_ascii_lowercase().contains("select") {
            continue;
        }
        entries.insert(code.to_string(), name);
    }
    entries
}

/// Like [`decode_listing`], but a non-empty body without a single
/// `code~name` segment is a structural failure.
pub(super) fn decode_strict(raw: &str) -> Result<BTreeMap<String, String>, ParseError> {
    let body = clean(raw);
    if !body.is_empty() && !body.contains(FIELD_SEPARATOR) {
        let preview: String = body.chars().take(60).collect();
        return Err(ParseError::UnexpectedShape(format!(
            "expected code~name listing, got {preview:?}"
        )));
    }
    Ok(decode_listing(body))
}

/// Encode entries so that [`decode_listing`] restores them exactly.
///
/// Entries the format cannot carry are refused: separators inside a code,
/// `#` inside a name, untrimmed or empty values, and anything the decoder
/// treats as a placeholder. `&`, `<` and `>` in names are entity-escaped.
pub fn encode_listing(entries: &BTreeMap<String, String>) -> Result<String, ParseError> {
    let mut encoded = String::new();
    for (code, name) in entries {
        check_encodable(code, name)?;
        encoded.push_str(code);
        encoded.push(FIELD_SEPARATOR);
        encoded.push_str(&encode_text(name));
        encoded.push(ENTRY_SEPARATOR);
    }
    Ok(encoded)
}

fn check_encodable(code: &str, name: &str) -> Result<(), ParseError> {
    let refuse = |reason: &str| {
        Err(ParseError::Unencodable(format!(
            "{code:?} => {name:?}: {reason}"
        )))
    };

    if code.contains([ENTRY_SEPARATOR, FIELD_SEPARATOR]) {
        return refuse("code contains a separator");
    }
    if name.contains(ENTRY_SEPARATOR) {
        return refuse("name contains the entry separator");
    }
    if code.is_empty() || name.is_empty() {
        return refuse("empty code or name");
    }
    if clean(code) != code || clean(name) != name {
        return refuse("surrounding whitespace");
    }
    if code == "0" || name.to_ascii_lowercase().contains("select") {
        return refuse("reads as a placeholder");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_placeholders_and_empty_segments() {
        let raw = "\u{feff}0~Select Case Type##134~W.P.(C)(CIVIL WRITS)-134# 27 ~ CRL.A. &amp; ORS #5~#";
        let entries = decode_listing(raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["134"], "W.P.(C)(CIVIL WRITS)-134");
        assert_eq!(entries["27"], "CRL.A. & ORS");
    }

    #[test]
    fn name_may_contain_the_field_separator() {
        let entries = decode_listing("9~A~B#");
        assert_eq!(entries["9"], "A~B");
    }

    #[test]
    fn encode_then_decode_restores_mapping() {
        let original: BTreeMap<String, String> = [
            ("1", "Principal Bench at Delhi"),
            ("134", "W.P.(C)(CIVIL WRITS)-134"),
            ("5", "R&amp;D Cell"),
            ("6", "R&D <Cell>"),
            ("9", "A~B"),
        ]
        .into_iter()
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect();

        let encoded = encode_listing(&original).unwrap();
        assert!(encoded.ends_with('#'));
        assert_eq!(decode_listing(&encoded), original);
    }

    #[test]
    fn entries_the_format_cannot_carry_are_refused() {
        for (code, name) in [
            ("6", "A#B"),
            ("7", "Select Committee"),
            ("8", " padded "),
            ("0", "Principal Bench"),
            ("1~2", "Bench"),
            ("3", ""),
            (" 4", "Bench"),
        ] {
            let entries = BTreeMap::from([(code.to_string(), name.to_string())]);
            assert!(
                matches!(encode_listing(&entries), Err(ParseError::Unencodable(_))),
                "{code:?} => {name:?}"
            );
        }
    }

    #[test]
    fn non_listing_body_is_rejected() {
        assert!(decode_strict("<html>error</html>").is_err());
        assert!(decode_strict("").unwrap().is_empty());
        assert!(decode_strict("0~Select#").unwrap().is_empty());
    }
}
