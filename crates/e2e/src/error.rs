//! Error types for E2E testing

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Driver did not answer '{op}' within {waited_ms} ms")]
    DriverUnresponsive { op: String, waited_ms: u64 },

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Locator timeout: {locator} not ready after {timeout_ms} ms")]
    LocatorTimeout { locator: String, timeout_ms: u64 },

    #[error("Ambiguous match: {count} elements qualify for {locator}")]
    AmbiguousMatch { locator: String, count: usize },

    #[error("Assertion failed: {what}: expected {expected}, observed {observed}")]
    AssertionMismatch {
        what: String,
        expected: String,
        observed: String,
    },

    #[error("No request matched '{pattern}' within {waited_ms} ms")]
    InterceptionMiss { pattern: String, waited_ms: u64 },

    #[error("No interception rule armed before the trigger action")]
    InterceptorNotArmed,

    #[error("An interception rule for '{0}' is already armed in this context")]
    DuplicateRoute(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl E2eError {
    /// Shorthand for an [`E2eError::AssertionMismatch`].
    pub fn mismatch(
        what: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        Self::AssertionMismatch {
            what: what.into(),
            expected: expected.into(),
            observed: observed.into(),
        }
    }

    /// Classify this error for the scenario report.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::LocatorTimeout { .. } => FailureKind::LocatorTimeout,
            Self::AmbiguousMatch { .. } => FailureKind::AmbiguousMatch,
            Self::AssertionMismatch { .. } => FailureKind::AssertionMismatch,
            Self::InterceptionMiss { .. } => FailureKind::InterceptionMiss,
            _ => FailureKind::Harness,
        }
    }
}

/// Coarse failure class reported per scenario.
///
/// A locator timeout points at UI-structure drift, an assertion mismatch at
/// a behavioral regression, and an interception miss at the trigger never
/// reaching the backend. `Harness` covers everything about the harness's own
/// plumbing (sidecar, server, scenario files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LocatorTimeout,
    AmbiguousMatch,
    AssertionMismatch,
    InterceptionMiss,
    Harness,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::LocatorTimeout => "locator-timeout",
            FailureKind::AmbiguousMatch => "ambiguous-match",
            FailureKind::AssertionMismatch => "assertion-mismatch",
            FailureKind::InterceptionMiss => "interception-miss",
            FailureKind::Harness => "harness",
        };
        f.write_str(s)
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_kinds_are_distinct() {
        let timeout = E2eError::LocatorTimeout {
            locator: "text(extract-from-image)".into(),
            timeout_ms: 5000,
        };
        let mismatch = E2eError::mismatch("request method", "POST", "GET");
        let miss = E2eError::InterceptionMiss {
            pattern: "**/api/extract-style".into(),
            waited_ms: 5000,
        };

        assert_eq!(timeout.kind(), FailureKind::LocatorTimeout);
        assert_eq!(mismatch.kind(), FailureKind::AssertionMismatch);
        assert_eq!(miss.kind(), FailureKind::InterceptionMiss);
        assert_eq!(E2eError::InterceptorNotArmed.kind(), FailureKind::Harness);
    }

    #[test]
    fn test_mismatch_message_names_both_sides() {
        let err = E2eError::mismatch("request method", "POST", "GET");
        let message = err.to_string();
        assert!(message.contains("request method"));
        assert!(message.contains("expected POST"));
        assert!(message.contains("observed GET"));
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::InterceptionMiss).unwrap();
        assert_eq!(json, "\"interception_miss\"");
        assert_eq!(FailureKind::LocatorTimeout.to_string(), "locator-timeout");
    }
}
