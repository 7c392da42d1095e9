//! Date ranges pulled out of free-text queries, and range membership.
//!
//! Ranges come from a language model reply, which is untrusted: it is checked against a
//! strict shape and anything off falls back to an unconstrained range.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive calendar bounds. Both `None` means unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DateRange {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
        }
    }

    pub fn since(start: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: None,
        }
    }

    /// A range only filters when it has a start date.
    pub fn is_constrained(&self) -> bool {
        self.start_date.is_some()
    }
}

/// `date` is a `YYYY-MM-DD` string. No start date never matches; a malformed date is
/// never in range.
pub fn is_date_in_range(date: &str, range: &DateRange) -> bool {
    let Some(start) = range.start_date else {
        return false;
    };
    let Ok(date) = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT) else {
        return false;
    };
    match range.end_date {
        Some(end) => start <= date && date <= end,
        None => date >= start,
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDateRange {
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

/// Parses a model reply that should contain `{"start_date": .., "end_date": ..}`.
/// Surrounding prose is tolerated; any schema or date error yields the unconstrained range.
pub fn parse_date_response(reply: &str) -> DateRange {
    let Some(json) = extract_json_object(reply) else {
        return DateRange::unconstrained();
    };
    let raw: RawDateRange = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(error = %e, "date reply does not match schema");
            return DateRange::unconstrained();
        }
    };
    let (Ok(start_date), Ok(end_date)) = (parse_opt(raw.start_date), parse_opt(raw.end_date)) else {
        tracing::debug!("date reply has malformed dates");
        return DateRange::unconstrained();
    };
    if let (Some(s), Some(e)) = (start_date, end_date) {
        if e < s {
            return DateRange::unconstrained();
        }
    }
    DateRange {
        start_date,
        end_date,
    }
}

/// Null, missing and empty are all "absent".
fn parse_opt(value: Option<String>) -> Result<Option<NaiveDate>, chrono::ParseError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT).map(Some),
    }
}

/// The span from the first `{` to the last `}`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn no_start_never_matches() {
        assert!(!is_date_in_range("2024-01-05", &DateRange::unconstrained()));
        let only_end = DateRange {
            start_date: None,
            end_date: Some(d("2030-01-01")),
        };
        assert!(!is_date_in_range("2024-01-05", &only_end));
    }

    #[test]
    fn start_only_is_open_ended() {
        let r = DateRange::since(d("2024-01-08"));
        assert!(!is_date_in_range("2024-01-07", &r));
        assert!(is_date_in_range("2024-01-08", &r));
        assert!(is_date_in_range("2031-12-31", &r));
    }

    #[test]
    fn both_bounds_inclusive() {
        let r = DateRange::between(d("2024-01-08"), d("2024-01-12"));
        assert!(!is_date_in_range("2024-01-07", &r));
        assert!(is_date_in_range("2024-01-08", &r));
        assert!(is_date_in_range("2024-01-10", &r));
        assert!(is_date_in_range("2024-01-12", &r));
        assert!(!is_date_in_range("2024-01-13", &r));
    }

    #[test]
    fn malformed_record_date_is_not_in_range() {
        let r = DateRange::since(d("2000-01-01"));
        assert!(!is_date_in_range("", &r));
        assert!(!is_date_in_range("05/01/2024", &r));
        assert!(!is_date_in_range("2024-13-40", &r));
    }

    #[test]
    fn parses_json_inside_prose() {
        let reply = "Sure! Here you go:\n{\"start_date\": \"2024-01-08\", \"end_date\": \"2024-01-12\"}\nHope that helps.";
        assert_eq!(
            parse_date_response(reply),
            DateRange::between(d("2024-01-08"), d("2024-01-12"))
        );
    }

    #[test]
    fn null_end_is_open_ended() {
        let reply = r#"{"start_date": "2024-02-01", "end_date": null}"#;
        assert_eq!(parse_date_response(reply), DateRange::since(d("2024-02-01")));
    }

    #[test]
    fn bad_payloads_are_unconstrained() {
        for reply in [
            "no json here",
            "{not json}",
            r#"{"start_date": "last week"}"#,
            r#"{"start_date": 20240101}"#,
            r#"{"start_date": "2024-01-01", "extra": 1}"#,
            r#"{"start_date": "2024-01-12", "end_date": "2024-01-01"}"#,
            r#"{"start_date": "2024-01-01", "end_date": "soon"}"#,
        ] {
            assert_eq!(parse_date_response(reply), DateRange::unconstrained(), "{reply}");
        }
    }
}
