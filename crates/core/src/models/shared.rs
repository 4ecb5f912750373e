use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDetails {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub code: String,
    pub details: IssueDetails,
}

impl Issue {
    pub fn new(severity: IssueSeverity, code: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            details: IssueDetails { text: text.into() },
        }
    }
}

/// Structured report of why a request did not succeed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    pub id: String,
    pub issue: Vec<Issue>,
}

impl OperationOutcome {
    pub fn new(id: impl Into<String>, issue: Vec<Issue>) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            id: id.into(),
            issue,
        }
    }

    pub fn single(id: impl Into<String>, issue: Issue) -> Self {
        Self::new(id, vec![issue])
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    /// `(code, system)` when both are present and non-blank.
    pub(crate) fn code_and_system(&self) -> Option<(&str, &str)> {
        let code = self.code.as_deref().filter(|c| !c.trim().is_empty())?;
        let system = self.system.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((code, system))
    }
}

/// A patient's identifier at a remote gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalGatewayPatient {
    pub id: String,
    pub system: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
}
