//! Network interception: route rules, scripted replies and request contracts

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightHandle;

/// Playwright-style URL glob, e.g. `**/api/extract-style`.
///
/// `**` spans path separators, `*` does not, `?` is one character and
/// `{a,b}` is an alternation. The whole URL must match.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    glob: String,
    regex: Regex,
}

impl RoutePattern {
    pub fn new(glob: &str) -> E2eResult<Self> {
        if glob.trim().is_empty() {
            return Err(E2eError::InvalidScenario("route pattern is empty".into()));
        }
        let regex = Regex::new(&glob_to_regex(glob))
            .map_err(|e| E2eError::InvalidScenario(format!("route pattern '{glob}': {e}")))?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    let mut in_group = false;

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push('.'),
            '{' => {
                in_group = true;
                out.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }

    out.push('$');
    out
}

/// The one outbound call captured by a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: String,
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub post_data_len: Option<usize>,
}

impl InterceptedRequest {
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        headers: HashMap<String, String>,
        post_data_len: Option<usize>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            post_data_len,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// What an armed rule answers instead of the real backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl ScriptedReply {
    pub fn json<T: Serialize>(status: u16, body: &T) -> E2eResult<Self> {
        Ok(Self {
            status,
            content_type: "application/json".to_string(),
            body: serde_json::to_string(body)?,
        })
    }
}

/// Produces the reply for an intercepted request.
///
/// Runs synchronously inside the harness's event loop. An `Err` aborts the
/// held request and fails the scenario at once.
pub trait Responder: Send {
    fn respond(&mut self, request: &InterceptedRequest) -> E2eResult<ScriptedReply>;
}

impl<F> Responder for F
where
    F: FnMut(&InterceptedRequest) -> E2eResult<ScriptedReply> + Send,
{
    fn respond(&mut self, request: &InterceptedRequest) -> E2eResult<ScriptedReply> {
        self(request)
    }
}

/// Always answers with the same reply.
#[derive(Debug, Clone)]
pub struct ScriptedResponder {
    reply: ScriptedReply,
}

impl ScriptedResponder {
    pub fn new(reply: ScriptedReply) -> Self {
        Self { reply }
    }
}

impl Responder for ScriptedResponder {
    fn respond(&mut self, _request: &InterceptedRequest) -> E2eResult<ScriptedReply> {
        Ok(self.reply.clone())
    }
}

/// Expected shape of the outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContract {
    pub method: String,
    pub content_type_token: String,
}

impl RequestContract {
    /// `POST` with a `multipart/form-data` body.
    pub fn extract_style() -> Self {
        Self {
            method: "POST".to_string(),
            content_type_token: "multipart/form-data".to_string(),
        }
    }

    pub fn check(&self, request: &InterceptedRequest) -> E2eResult<()> {
        if request.method != self.method {
            return Err(E2eError::mismatch(
                "request method",
                &self.method,
                &request.method,
            ));
        }

        let content_type = request.content_type().unwrap_or_default();
        if !content_type
            .to_ascii_lowercase()
            .contains(&self.content_type_token)
        {
            return Err(E2eError::mismatch(
                "request content-type",
                format!("*{}*", self.content_type_token),
                if content_type.is_empty() { "<none>" } else { content_type },
            ));
        }

        Ok(())
    }
}

/// Boolean written by a responder and read by later assertions.
///
/// Written at most once, from inside the event loop, before the outcome
/// notification it leads to can be observed.
#[derive(Debug, Clone, Default)]
pub struct SideChannel(Arc<AtomicBool>);

impl SideChannel {
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Checks a [`RequestContract`], raises the flag, then delegates.
pub struct ContractResponder<R> {
    contract: RequestContract,
    flag: SideChannel,
    inner: R,
}

impl<R: Responder> ContractResponder<R> {
    pub fn new(contract: RequestContract, flag: SideChannel, inner: R) -> Self {
        Self {
            contract,
            flag,
            inner,
        }
    }
}

impl<R: Responder> Responder for ContractResponder<R> {
    fn respond(&mut self, request: &InterceptedRequest) -> E2eResult<ScriptedReply> {
        self.contract.check(request)?;
        self.flag.set();
        self.inner.respond(request)
    }
}

/// Handle to an armed rule within the current context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub(crate) u64);

pub(crate) struct InterceptionRule {
    pub(crate) id: RuleId,
    pub(crate) pattern: RoutePattern,
    pub(crate) responder: Box<dyn Responder>,
    pub(crate) log: Vec<InterceptedRequest>,
}

/// Arm an interception rule on the current context.
///
/// Must happen before navigation or any trigger action: a rule installed
/// after the request fires never sees it.
pub async fn arm<R>(page: &mut PlaywrightHandle, pattern: &str, responder: R) -> E2eResult<RuleId>
where
    R: Responder + 'static,
{
    let pattern = RoutePattern::new(pattern)?;
    debug!(pattern = %pattern, "arming interception rule");
    page.add_route(pattern, Box::new(responder)).await
}
