//! Declarative scenarios: a scripted backend response and the UI outcome it implies

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::intercept::ScriptedReply;
use crate::labels::{LabelSet, STYLE_EXTRACT_FAILURE, STYLE_EXTRACT_SUCCESS};

/// One isolated test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// What the mocked backend answers
    pub response: ScriptedResponse,

    /// Assert the intercepted request's shape and the side-channel flag
    #[serde(default)]
    pub verify_request: bool,

    /// Budget for the outcome notification to appear
    #[serde(default = "default_outcome_timeout")]
    pub timeout_ms: u64,
}

fn default_outcome_timeout() -> u64 {
    5000
}

fn default_success_status() -> u16 {
    200
}

fn default_failure_status() -> u16 {
    503
}

fn default_error_code() -> String {
    "AI_SERVICE_ERROR".to_string()
}

/// Scripted response of the image-analysis endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedResponse {
    Success {
        #[serde(default = "default_success_status")]
        status: u16,
        style_description: String,
    },
    Failure {
        #[serde(default = "default_failure_status")]
        status: u16,
        #[serde(default = "default_error_code")]
        code: String,
        message: String,
    },
}

/// JSON envelope returned by `/api/extract-style`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractStyleEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StyleData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleData {
    pub style_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ScriptedResponse {
    pub fn success(style_description: impl Into<String>) -> Self {
        Self::Success {
            status: default_success_status(),
            style_description: style_description.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            status: default_failure_status(),
            code: default_error_code(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Success { status, .. } | Self::Failure { status, .. } => *status,
        }
    }

    pub fn body(&self) -> ExtractStyleEnvelope {
        match self {
            Self::Success { style_description, .. } => ExtractStyleEnvelope {
                success: true,
                data: Some(StyleData {
                    style_description: style_description.clone(),
                }),
                error: None,
            },
            Self::Failure { code, message, .. } => ExtractStyleEnvelope {
                success: false,
                data: None,
                error: Some(ApiError {
                    code: code.clone(),
                    message: message.clone(),
                }),
            },
        }
    }

    pub fn reply(&self) -> E2eResult<ScriptedReply> {
        ScriptedReply::json(self.status(), &self.body())
    }

    pub fn expected_outcome(&self) -> OutcomeKind {
        match self {
            Self::Success { .. } => OutcomeKind::Success,
            Self::Failure { .. } => OutcomeKind::Failure,
        }
    }
}

/// Which notification the UI must converge to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
}

impl OutcomeKind {
    pub fn labels(&self) -> &'static LabelSet {
        match self {
            OutcomeKind::Success => &STYLE_EXTRACT_SUCCESS,
            OutcomeKind::Failure => &STYLE_EXTRACT_FAILURE,
        }
    }

    pub fn opposite(&self) -> OutcomeKind {
        match self {
            OutcomeKind::Success => OutcomeKind::Failure,
            OutcomeKind::Failure => OutcomeKind::Success,
        }
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>, response: ScriptedResponse) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            response,
            verify_request: false,
            timeout_ms: default_outcome_timeout(),
        }
    }

    pub fn with_request_verification(mut self) -> Self {
        self.verify_request = true;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn expected_outcome(&self) -> OutcomeKind {
        self.response.expected_outcome()
    }

    /// The three mock scenarios shipped with the harness.
    pub fn builtin() -> Vec<Self> {
        vec![
            Scenario::new(
                "extract-style-success-toast",
                ScriptedResponse::success("Modern minimalist blue gradient"),
            )
            .with_tags(&["mock", "success"]),
            Scenario::new(
                "extract-style-error-toast",
                ScriptedResponse::failure("caption_provider error"),
            )
            .with_tags(&["mock", "failure"]),
            Scenario::new("extract-style-multipart-post", ScriptedResponse::success("ok"))
                .with_request_verification()
                .with_tags(&["mock", "contract"]),
        ]
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::InvalidScenario("scenario name is empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(E2eError::InvalidScenario(format!(
                "{}: timeout_ms must be positive",
                self.name
            )));
        }
        match &self.response {
            ScriptedResponse::Success { status, .. } if !(200..300).contains(status) => {
                Err(E2eError::InvalidScenario(format!(
                    "{}: success response needs a 2xx status, got {}",
                    self.name, status
                )))
            }
            ScriptedResponse::Failure { status, .. } if *status < 400 => {
                Err(E2eError::InvalidScenario(format!(
                    "{}: failure response needs a status >= 400, got {}",
                    self.name, status
                )))
            }
            _ => Ok(()),
        }
    }

    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load all scenarios from a directory
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_body_wire_shape() {
        let body = ScriptedResponse::success("Modern minimalist blue gradient").body();
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "success": true,
                "data": { "style_description": "Modern minimalist blue gradient" }
            })
        );
    }

    #[test]
    fn test_failure_body_wire_shape() {
        let response = ScriptedResponse::failure("caption_provider error");
        assert_eq!(response.status(), 503);
        assert_eq!(
            serde_json::to_value(response.body()).unwrap(),
            serde_json::json!({
                "success": false,
                "error": { "code": "AI_SERVICE_ERROR", "message": "caption_provider error" }
            })
        );
    }

    #[test]
    fn test_reply_is_json() {
        let reply = ScriptedResponse::success("ok").reply().unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.content_type, "application/json");
        let parsed: ExtractStyleEnvelope = serde_json::from_str(&reply.body).unwrap();
        assert!(parsed.success);
    }

    #[test]
    fn test_builtin_scenarios() {
        let scenarios = Scenario::builtin();
        assert_eq!(scenarios.len(), 3);
        assert_eq!(scenarios[0].expected_outcome(), OutcomeKind::Success);
        assert_eq!(scenarios[1].expected_outcome(), OutcomeKind::Failure);
        assert!(scenarios[2].verify_request);
        assert!(scenarios.iter().all(|s| s.timeout_ms == 5000));
        assert!(scenarios.iter().all(|s| s.validate().is_ok()));
    }

    #[test]
    fn test_parse_failure_scenario_with_defaults() {
        let yaml = r#"
name: extract-style-error
description: Backend reports an AI failure
tags:
  - mock
response:
  kind: failure
  message: caption_provider error
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.response.status(), 503);
        assert_eq!(scenario.timeout_ms, 5000);
        assert!(!scenario.verify_request);
        assert_eq!(scenario.expected_outcome(), OutcomeKind::Failure);
    }

    #[test]
    fn test_rejects_success_with_error_status() {
        let yaml = r#"
name: bad
response:
  kind: success
  status: 500
  style_description: nope
"#;
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, E2eError::InvalidScenario(_)));
    }

    #[test]
    fn test_filter_by_tag() {
        let scenarios = Scenario::builtin();
        let contract = Scenario::filter_by_tag(&scenarios, "contract");
        assert_eq!(contract.len(), 1);
        assert_eq!(contract[0].name, "extract-style-multipart-post");
        assert_eq!(Scenario::filter_by_tag(&scenarios, "mock").len(), 3);
    }

    #[test]
    fn test_outcome_labels() {
        assert!(OutcomeKind::Success.labels().matches("风格提取成功"));
        assert!(OutcomeKind::Failure.labels().matches("Style extraction failed"));
        assert_eq!(OutcomeKind::Success.opposite(), OutcomeKind::Failure);
    }
}
