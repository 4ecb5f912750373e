//! Response classifiers.
//!
//! Each classifier is a pure function of one transport outcome and the request that produced
//! it. It never fails: transport errors, gateway faults and unparseable bodies all become an
//! `OperationOutcome` on the typed response.

pub mod dq;
pub mod dr;
mod mtom;
pub mod xcpd;

pub use dq::process_dq_response;
pub use dr::process_dr_response;
pub use xcpd::{classify_ack, process_xcpd_response, AckClassification};

use crate::constants::{STATUS_PARTIAL_SUCCESS, STATUS_SUCCESS};
use crate::models::{Issue, IssueSeverity, OperationOutcome};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use ihe_xml::{Document, Element};

pub(crate) const ISSUE_HTTP_ERROR: &str = "http-error";
pub(crate) const ISSUE_SCHEMA_ERROR: &str = "schema-error";
pub(crate) const ISSUE_NOT_FOUND: &str = "not-found";
pub(crate) const ISSUE_NO_DOCUMENTS: &str = "no-documents-found";
pub(crate) const ISSUE_PROCESSING: &str = "processing";

pub(crate) fn http_error_outcome(id: &str, error: &str) -> OperationOutcome {
    OperationOutcome::single(id, Issue::new(IssueSeverity::Error, ISSUE_HTTP_ERROR, error))
}

pub(crate) fn schema_error_outcome(id: &str, text: impl Into<String>) -> OperationOutcome {
    OperationOutcome::single(id, Issue::new(IssueSeverity::Error, ISSUE_SCHEMA_ERROR, text))
}

pub(crate) fn no_documents_outcome(id: &str) -> OperationOutcome {
    OperationOutcome::single(
        id,
        Issue::new(IssueSeverity::Information, ISSUE_NO_DOCUMENTS, "No documents found"),
    )
}

/// Parse a SOAP response and hand its `Body` child with the given local name to `read`.
pub(crate) fn with_soap_body<T>(
    xml: &str,
    local: &str,
    read: impl FnOnce(&Element) -> T,
) -> Result<T, String> {
    let document = Document::parse(xml).map_err(|e| e.to_string())?;
    let body = document
        .root()
        .descend(&["Body", local])
        .ok_or_else(|| format!("response has no {local} in its SOAP body"))?;
    Ok(read(body))
}

/// Entries read from a response, or the reason there are none.
pub(crate) enum Classified<T> {
    Entries(Vec<T>),
    Outcome(OperationOutcome),
}

impl<T> Classified<T> {
    pub(crate) fn into_parts(self) -> (Option<Vec<T>>, Option<OperationOutcome>) {
        match self {
            Classified::Entries(entries) => (Some(entries), None),
            Classified::Outcome(outcome) => (None, Some(outcome)),
        }
    }
}

/// Final `:`-separated segment of an ebXML status URN.
pub(crate) fn status_suffix(status: &str) -> &str {
    status.rsplit(':').next().unwrap_or(status)
}

pub(crate) fn is_success_status(status: Option<&str>) -> bool {
    matches!(
        status.map(status_suffix),
        Some(STATUS_SUCCESS | STATUS_PARTIAL_SUCCESS)
    )
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// One issue per `RegistryError`.
pub(crate) fn registry_error_outcome(id: &str, error_list: &Element) -> OperationOutcome {
    let issues = error_list
        .children_named("RegistryError")
        .map(|error| {
            let severity = match error.attr("severity").map(status_suffix) {
                Some("Warning") => IssueSeverity::Warning,
                _ => IssueSeverity::Error,
            };
            let code = error.attr("errorCode").unwrap_or(ISSUE_PROCESSING);
            let text = error
                .attr("codeContext")
                .map(str::to_owned)
                .or_else(|| error.trimmed_text())
                .unwrap_or_else(|| code.to_owned());
            Issue::new(severity, code, text)
        })
        .collect();
    OperationOutcome::new(id, issues)
}

/// Parse an HL7 v2/v3 `DTM`: `YYYY[MM[DD[HH[MM[SS[.S+]]]]]][+/-ZZZZ]`.
///
/// Values without an offset are taken as UTC.
pub(crate) fn parse_hl7_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let (stamp, offset) = match value.find(['+', '-']) {
        Some(at) => (&value[..at], Some(&value[at..])),
        None => (value, None),
    };
    let (digits, fraction) = match stamp.split_once('.') {
        Some((digits, fraction)) => (digits, Some(fraction)),
        None => (stamp, None),
    };
    if digits.len() < 4 || digits.len() % 2 != 0 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let field = |range: std::ops::Range<usize>, default: u32| -> Option<u32> {
        match digits.get(range) {
            Some(part) => part.parse().ok(),
            None => Some(default),
        }
    };
    let year: i32 = digits.get(0..4)?.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(4..6, 1)?, field(6..8, 1)?)?;

    let nanos = match fraction {
        Some(f) if !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()) => {
            let padded: String = f.chars().chain(std::iter::repeat('0')).take(9).collect();
            padded.parse().ok()?
        }
        Some(_) => return None,
        None => 0,
    };
    let time = NaiveTime::from_hms_nano_opt(field(8..10, 0)?, field(10..12, 0)?, field(12..14, 0)?, nanos)?;
    let naive = NaiveDateTime::new(date, time);

    match offset {
        None => Some(Utc.from_utc_datetime(&naive)),
        Some(offset) => {
            let sign = if offset.starts_with('-') { -1 } else { 1 };
            let digits = &offset[1..];
            if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let hours: i32 = digits[..2].parse().ok()?;
            let minutes: i32 = digits[2..].parse().ok()?;
            let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn parses_hl7_datetimes_of_varying_precision() {
        assert_eq!(parse_hl7_datetime("20240327214304"), Some(utc("2024-03-27T21:43:04Z")));
        assert_eq!(parse_hl7_datetime("20240327"), Some(utc("2024-03-27T00:00:00Z")));
        assert_eq!(parse_hl7_datetime("2024"), Some(utc("2024-01-01T00:00:00Z")));
        assert_eq!(
            parse_hl7_datetime("20240327214304.878"),
            Some(utc("2024-03-27T21:43:04.878Z"))
        );
        assert_eq!(
            parse_hl7_datetime("20240327164304-0500"),
            Some(utc("2024-03-27T21:43:04Z"))
        );
    }

    #[test]
    fn rejects_malformed_hl7_datetimes() {
        assert_eq!(parse_hl7_datetime(""), None);
        assert_eq!(parse_hl7_datetime("2024-03-27"), None);
        assert_eq!(parse_hl7_datetime("20241327"), None);
        assert_eq!(parse_hl7_datetime("202403271"), None);
    }

    #[test]
    fn status_suffix_takes_last_segment() {
        assert_eq!(
            status_suffix("urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:PartialSuccess"),
            "PartialSuccess"
        );
        assert_eq!(status_suffix("Success"), "Success");
        assert!(is_success_status(Some(
            "urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:Success"
        )));
        assert!(!is_success_status(Some(
            "urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:Failure"
        )));
        assert!(!is_success_status(None));
    }

    #[test]
    fn soap_body_child_is_required() {
        let xml = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
            <s:Body><Answer value="42"/></s:Body>
        </s:Envelope>"#;
        let value = with_soap_body(xml, "Answer", |answer| answer.attr("value").map(str::to_owned));
        assert_eq!(value, Ok(Some("42".to_string())));
        assert!(with_soap_body(xml, "Question", |_| ()).is_err());
        assert!(with_soap_body("not xml", "Answer", |_| ()).is_err());
    }

    #[test]
    fn registry_errors_become_issues() {
        let xml = r#"<RegistryErrorList>
            <RegistryError errorCode="XDSRegistryError" codeContext="Registry unavailable"
                severity="urn:oasis:names:tc:ebxml-regrep:ErrorSeverityType:Error"/>
            <RegistryError errorCode="XDSUnknownPatientId"
                severity="urn:oasis:names:tc:ebxml-regrep:ErrorSeverityType:Warning">patient unknown</RegistryError>
        </RegistryErrorList>"#;
        let doc = Document::parse(xml).unwrap();
        let outcome = registry_error_outcome("req-1", doc.root());
        assert_eq!(outcome.issue.len(), 2);
        assert_eq!(outcome.issue[0].code, "XDSRegistryError");
        assert_eq!(outcome.issue[0].details.text, "Registry unavailable");
        assert_eq!(outcome.issue[1].severity, IssueSeverity::Warning);
        assert_eq!(outcome.issue[1].details.text, "patient unknown");
    }
}
