//! Line-delimited JSON protocol spoken with the Playwright sidecar
//!
//! Every line the harness writes is a [`Request`]; every line the sidecar
//! writes is a [`DriverEvent`]. Ordinary commands are answered with `done` or
//! `failed` carrying the request id. `fulfill` and `abort` settle an
//! intercepted route and are never answered.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::E2eError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "chromium" => Some(Browser::Chromium),
            "firefox" => Some(Browser::Firefox),
            "webkit" => Some(Browser::Webkit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Attached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Attached => "attached",
        }
    }
}

/// How the sidecar finds an element. Resolution is strict: more than one
/// match is reported as ambiguous rather than picking the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Target {
    /// Element whose text matches `pattern` (JS `RegExp` source)
    Text { label: String, pattern: String },
    Css { selector: String },
    /// The element immediately following `anchor`, which must also match
    /// `selector`
    Adjacent {
        anchor: Box<Target>,
        selector: String,
    },
}

impl Target {
    pub fn describe(&self) -> String {
        match self {
            Target::Text { label, pattern } => format!("text({label}: /{pattern}/)"),
            Target::Css { selector } => format!("css({selector})"),
            Target::Adjacent { anchor, selector } => {
                format!("{selector} after {}", anchor.describe())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub name: String,
    pub mime_type: String,
    /// Base64-encoded file content
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Launch {
        browser: Browser,
        headless: bool,
        viewport: Viewport,
    },
    /// Replace the current browser context with a fresh one
    NewContext { init_scripts: Vec<String> },
    Route { rule_id: u64, pattern: String },
    Goto { url: String, timeout_ms: u64 },
    Click {
        target: Target,
        scroll_into_view: bool,
        timeout_ms: u64,
    },
    /// Wait for a unique element; answers `{ "text": ... }`
    WaitFor {
        target: Target,
        state: WaitState,
        timeout_ms: u64,
    },
    SetInputFiles {
        target: Target,
        file: FilePayload,
        timeout_ms: u64,
    },
    /// Immediate match count; answers `{ "count": n }`
    Count { target: Target },
    Screenshot { path: String, full_page: bool },
    Ping,
    CloseContext,
    Shutdown,
    Fulfill {
        route_id: u64,
        status: u16,
        content_type: String,
        body: String,
    },
    Abort { route_id: u64 },
}

impl Command {
    /// Whether the sidecar answers this command.
    pub fn expects_reply(&self) -> bool {
        !matches!(
            self,
            Command::Fulfill { .. } | Command::Abort { .. } | Command::Shutdown
        )
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            Command::Click { target, .. }
            | Command::WaitFor { target, .. }
            | Command::SetInputFiles { target, .. }
            | Command::Count { target } => Some(target),
            _ => None,
        }
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            Command::Goto { timeout_ms, .. }
            | Command::Click { timeout_ms, .. }
            | Command::WaitFor { timeout_ms, .. }
            | Command::SetInputFiles { timeout_ms, .. } => Some(*timeout_ms),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Command::Launch { browser, .. } => format!("launch:{}", browser.as_str()),
            Command::NewContext { .. } => "new_context".to_string(),
            Command::Route { pattern, .. } => format!("route:{pattern}"),
            Command::Goto { url, .. } => format!("goto:{url}"),
            Command::Click { target, .. } => format!("click:{}", target.describe()),
            Command::WaitFor { target, state, .. } => {
                format!("wait_{}:{}", state.as_str(), target.describe())
            }
            Command::SetInputFiles { target, .. } => {
                format!("set_input_files:{}", target.describe())
            }
            Command::Count { target } => format!("count:{}", target.describe()),
            Command::Screenshot { path, .. } => format!("screenshot:{path}"),
            Command::Ping => "ping".to_string(),
            Command::CloseContext => "close_context".to_string(),
            Command::Shutdown => "shutdown".to_string(),
            Command::Fulfill { route_id, status, .. } => format!("fulfill:{route_id}:{status}"),
            Command::Abort { route_id } => format!("abort:{route_id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DriverEvent {
    Ready {
        #[serde(default)]
        version: Option<String>,
    },
    Done {
        id: u64,
        #[serde(default)]
        value: serde_json::Value,
    },
    Failed { id: u64, error: DriverFailure },
    /// A request matched an armed route and is held until settled
    Route {
        route_id: u64,
        rule_id: u64,
        method: String,
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        post_data_len: Option<usize>,
    },
    Log { level: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    Timeout,
    Ambiguous,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverFailure {
    pub kind: FailureCode,
    pub message: String,
    #[serde(default)]
    pub count: Option<usize>,
}

impl DriverFailure {
    /// Map a sidecar failure for `command` onto the error taxonomy.
    pub fn into_error(self, command: &Command) -> E2eError {
        let locator = command.target().map(Target::describe);
        let timeout_ms = command.timeout_ms().unwrap_or_default();

        match (self.kind, locator) {
            (FailureCode::Timeout, Some(locator)) => E2eError::LocatorTimeout { locator, timeout_ms },
            (FailureCode::Timeout, None) => {
                E2eError::Timeout(format!("{}: {}", command.describe(), self.message))
            }
            (FailureCode::Ambiguous, locator) => E2eError::AmbiguousMatch {
                locator: locator.unwrap_or_else(|| command.describe()),
                count: self.count.unwrap_or(2),
            },
            (FailureCode::Error, _) => {
                E2eError::Playwright(format!("{}: {}", command.describe(), self.message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_button() -> Target {
        Target::Text {
            label: "extract-from-image".into(),
            pattern: "从图片提取风格|Extract from image".into(),
        }
    }

    #[test]
    fn test_request_wire_format() {
        let request = Request {
            id: 7,
            command: Command::WaitFor {
                target: extract_button(),
                state: WaitState::Visible,
                timeout_ms: 5000,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["command"]["op"], "wait_for");
        assert_eq!(json["command"]["state"], "visible");
        assert_eq!(json["command"]["target"]["by"], "text");
    }

    #[test]
    fn test_parse_route_event() {
        let line = r#"{"event":"route","route_id":1,"rule_id":3,"method":"POST","url":"http://localhost:3000/api/extract-style","headers":{"content-type":"multipart/form-data; boundary=x"},"post_data_len":240}"#;
        match serde_json::from_str::<DriverEvent>(line).unwrap() {
            DriverEvent::Route { rule_id, method, headers, post_data_len, .. } => {
                assert_eq!(rule_id, 3);
                assert_eq!(method, "POST");
                assert!(headers["content-type"].starts_with("multipart/form-data"));
                assert_eq!(post_data_len, Some(240));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_done_without_value() {
        let event: DriverEvent = serde_json::from_str(r#"{"event":"done","id":2,"value":null}"#).unwrap();
        assert!(matches!(event, DriverEvent::Done { id: 2, value: serde_json::Value::Null }));
    }

    #[test]
    fn test_timeout_on_locator_maps_to_locator_timeout() {
        let command = Command::WaitFor {
            target: extract_button(),
            state: WaitState::Visible,
            timeout_ms: 5000,
        };
        let failure = DriverFailure {
            kind: FailureCode::Timeout,
            message: "not visible after 5000ms".into(),
            count: None,
        };
        match failure.into_error(&command) {
            E2eError::LocatorTimeout { locator, timeout_ms } => {
                assert!(locator.contains("extract-from-image"));
                assert_eq!(timeout_ms, 5000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ambiguous_maps_with_count() {
        let command = Command::Count {
            target: Target::Css { selector: "input[type=\"file\"]".into() },
        };
        let failure = DriverFailure {
            kind: FailureCode::Ambiguous,
            message: "3 elements match".into(),
            count: Some(3),
        };
        assert!(matches!(
            failure.into_error(&command),
            E2eError::AmbiguousMatch { count: 3, .. }
        ));
    }

    #[test]
    fn test_route_replies_are_unacknowledged() {
        assert!(!Command::Abort { route_id: 1 }.expects_reply());
        assert!(Command::Ping.expects_reply());
    }
}
