//! Playwright browser automation
//!
//! The browser is driven by a small Node.js sidecar (`sidecar.js`) that
//! speaks the line protocol in [`crate::protocol`]. Intercepted requests are
//! answered from Rust: while a command is in flight, route events are handed
//! to the armed responder inline and settled before the next line is read.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command as TokioCommand};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::fixture::Fixture;
use crate::intercept::{InterceptedRequest, InterceptionRule, Responder, RoutePattern, RuleId};
use crate::protocol::{
    Browser, Command, DriverEvent, FilePayload, Request, Target, Viewport, WaitState,
};

const SIDECAR_JS: &str = include_str!("sidecar.js");

type DriverReader = Lines<BufReader<Box<dyn AsyncRead + Unpin + Send>>>;
type DriverWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Playwright browser handle
pub struct PlaywrightHandle {
    config: PlaywrightConfig,
    reader: DriverReader,
    writer: DriverWriter,

    /// Sidecar process, absent when driving a custom transport
    child: Option<Child>,

    /// Keeps the written sidecar script alive
    _workdir: Option<tempfile::TempDir>,

    next_id: u64,
    next_rule: u64,

    /// Rules armed on the current context
    rules: Vec<InterceptionRule>,

    /// First responder error since the last command
    responder_failure: Option<E2eError>,
}

impl PlaywrightHandle {
    /// Spawn the sidecar and launch the browser
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(&config.project_dir)?;
        std::fs::create_dir_all(&config.screenshot_dir)?;

        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("sidecar.js");
        std::fs::write(&script_path, SIDECAR_JS)?;

        debug!("Starting Playwright sidecar: {}", script_path.display());

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .current_dir(&config.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Playwright(format!(
                    "Failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("sidecar stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("sidecar stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "playwright", "{}", line);
                }
            });
        }

        let mut handle = Self::new(config, Box::new(stdout), Box::new(stdin));
        handle.child = Some(child);
        handle._workdir = Some(workdir);
        handle.start().await?;
        Ok(handle)
    }

    /// Drive a sidecar reachable through an arbitrary reader/writer pair.
    pub async fn with_transport<R, W>(config: PlaywrightConfig, reader: R, writer: W) -> E2eResult<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut handle = Self::new(config, Box::new(reader), Box::new(writer));
        handle.start().await?;
        Ok(handle)
    }

    fn new(
        config: PlaywrightConfig,
        reader: Box<dyn AsyncRead + Unpin + Send>,
        writer: DriverWriter,
    ) -> Self {
        Self {
            config,
            reader: BufReader::new(reader).lines(),
            writer,
            child: None,
            _workdir: None,
            next_id: 0,
            next_rule: 0,
            rules: Vec::new(),
            responder_failure: None,
        }
    }

    async fn start(&mut self) -> E2eResult<()> {
        let command = Command::Launch {
            browser: self.config.browser,
            headless: self.config.headless,
            viewport: Viewport {
                width: self.config.viewport_width,
                height: self.config.viewport_height,
            },
        };
        self.call(command).await?;
        info!("Browser launched ({})", self.config.browser.as_str());
        Ok(())
    }

    /// Check if Playwright is installed
    fn check_playwright_installed(project_dir: &Path) -> E2eResult<()> {
        let output = std::process::Command::new("npx")
            .args(["playwright", "--version"])
            .current_dir(project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// Replace the browser context with a fresh one seeded by `fixture`.
    ///
    /// Drops every rule and interception log of the previous context.
    pub async fn open_context(&mut self, fixture: &Fixture) -> E2eResult<()> {
        self.rules.clear();
        self.responder_failure = None;
        let init_scripts = fixture.init_script()?.into_iter().collect();
        self.call(Command::NewContext { init_scripts }).await?;
        Ok(())
    }

    pub async fn close_context(&mut self) -> E2eResult<()> {
        self.call(Command::CloseContext).await?;
        self.rules.clear();
        Ok(())
    }

    pub(crate) async fn add_route(
        &mut self,
        pattern: RoutePattern,
        responder: Box<dyn Responder>,
    ) -> E2eResult<RuleId> {
        if self.rules.iter().any(|r| r.pattern.as_str() == pattern.as_str()) {
            return Err(E2eError::DuplicateRoute(pattern.to_string()));
        }

        self.next_rule += 1;
        let id = RuleId(self.next_rule);
        self.call(Command::Route {
            rule_id: id.0,
            pattern: pattern.as_str().to_string(),
        })
        .await?;

        self.rules.push(InterceptionRule {
            id,
            pattern,
            responder,
            log: Vec::new(),
        });
        Ok(id)
    }

    pub fn has_routes(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Requests captured by `rule` so far.
    pub fn interceptions(&self, rule: RuleId) -> &[InterceptedRequest] {
        self.rules
            .iter()
            .find(|r| r.id == rule)
            .map(|r| r.log.as_slice())
            .unwrap_or(&[])
    }

    pub fn route_pattern(&self, rule: RuleId) -> Option<&RoutePattern> {
        self.rules.iter().find(|r| r.id == rule).map(|r| &r.pattern)
    }

    pub async fn goto(&mut self, url: &str) -> E2eResult<()> {
        let timeout_ms = self.config.navigation_timeout.as_millis() as u64;
        self.call(Command::Goto {
            url: url.to_string(),
            timeout_ms,
        })
        .await?;
        Ok(())
    }

    pub async fn click(&mut self, target: Target, scroll_into_view: bool, timeout: Duration) -> E2eResult<()> {
        self.call(Command::Click {
            target,
            scroll_into_view,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await?;
        Ok(())
    }

    /// Wait for a unique element and return its rendered text.
    pub async fn wait_for(&mut self, target: Target, state: WaitState, timeout: Duration) -> E2eResult<String> {
        let value = self
            .call(Command::WaitFor {
                target,
                state,
                timeout_ms: timeout.as_millis() as u64,
            })
            .await?;
        Ok(value
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string())
    }

    pub async fn set_input_files(&mut self, target: Target, file: FilePayload, timeout: Duration) -> E2eResult<()> {
        self.call(Command::SetInputFiles {
            target,
            file,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await?;
        Ok(())
    }

    /// Current number of matches, without waiting.
    pub async fn count(&mut self, target: Target) -> E2eResult<usize> {
        let value = self.call(Command::Count { target }).await?;
        value
            .get("count")
            .and_then(|c| c.as_u64())
            .map(|c| c as usize)
            .ok_or_else(|| E2eError::Playwright(format!("count reply without a count: {value}")))
    }

    pub async fn screenshot(&mut self, name: &str, full_page: bool) -> E2eResult<PathBuf> {
        let path = self.config.screenshot_dir.join(format!("{}.png", name));
        self.call(Command::Screenshot {
            path: path.to_string_lossy().to_string(),
            full_page,
        })
        .await?;
        Ok(path)
    }

    /// Round-trip with the sidecar.
    ///
    /// Every event the sidecar emitted before the reply, including held
    /// routes, has been dispatched when this returns.
    pub async fn ping(&mut self) -> E2eResult<()> {
        self.call(Command::Ping).await?;
        Ok(())
    }

    /// Close the browser and wait for the sidecar to exit
    pub async fn shutdown(mut self) -> E2eResult<()> {
        self.send(Command::Shutdown).await?;
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(status) => debug!("Sidecar exited: {:?}", status?),
                Err(_) => {
                    warn!("Sidecar did not exit, killing it");
                    child.kill().await?;
                }
            }
        }
        Ok(())
    }

    async fn send(&mut self, command: Command) -> E2eResult<u64> {
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&Request { id, command })?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(id)
    }

    /// Send one command and pump events until its reply arrives.
    async fn call(&mut self, command: Command) -> E2eResult<serde_json::Value> {
        let budget = command
            .timeout_ms()
            .map(Duration::from_millis)
            .unwrap_or(self.config.navigation_timeout)
            + self.config.response_grace;
        let deadline = Instant::now() + budget;

        debug!("→ {}", command.describe());
        let id = self.send(command.clone()).await?;

        loop {
            let line = match tokio::time::timeout_at(deadline, self.reader.next_line()).await {
                Ok(line) => line?,
                Err(_) => {
                    return Err(E2eError::DriverUnresponsive {
                        op: command.describe(),
                        waited_ms: budget.as_millis() as u64,
                    })
                }
            };

            let Some(line) = line else {
                return Err(E2eError::Playwright(format!(
                    "sidecar exited while waiting for {}",
                    command.describe()
                )));
            };

            let event = match serde_json::from_str::<DriverEvent>(&line) {
                Ok(event) => event,
                Err(e) => {
                    debug!("Skipping non-protocol sidecar output ({}): {}", e, line);
                    continue;
                }
            };

            match event {
                DriverEvent::Done { id: reply, value } if reply == id => return Ok(value),
                DriverEvent::Failed { id: reply, error } if reply == id => {
                    return Err(error.into_error(&command));
                }
                DriverEvent::Route {
                    route_id,
                    rule_id,
                    method,
                    url,
                    headers,
                    post_data_len,
                } => {
                    let request = InterceptedRequest::new(method, url, headers, post_data_len);
                    self.dispatch_route(route_id, RuleId(rule_id), request).await?;
                    if let Some(err) = self.responder_failure.take() {
                        return Err(err);
                    }
                }
                DriverEvent::Log { level, message } => match level.as_str() {
                    "warn" | "error" => warn!(target: "playwright", "{}", message),
                    _ => debug!(target: "playwright", "{}", message),
                },
                DriverEvent::Ready { version } => {
                    info!("Playwright sidecar ready (playwright {})", version.as_deref().unwrap_or("unknown"));
                }
                stale => debug!("Ignoring stale driver event: {:?}", stale),
            }
        }
    }

    async fn dispatch_route(&mut self, route_id: u64, rule: RuleId, request: InterceptedRequest) -> E2eResult<()> {
        let Some(entry) = self.rules.iter_mut().find(|r| r.id == rule) else {
            warn!("Route event for unknown rule {:?}, aborting {}", rule, request.url);
            self.send(Command::Abort { route_id }).await?;
            return Ok(());
        };

        if !entry.pattern.matches(&request.url) {
            warn!("{} intercepted by '{}' but does not match it locally", request.url, entry.pattern);
        }

        info!("Intercepted {} {}", request.method, request.url);
        let reply = entry.responder.respond(&request);
        entry.log.push(request);

        match reply {
            Ok(reply) => {
                debug!("Fulfilling route {} with status {}", route_id, reply.status);
                self.send(Command::Fulfill {
                    route_id,
                    status: reply.status,
                    content_type: reply.content_type,
                    body: reply.body,
                })
                .await?;
            }
            Err(err) => {
                warn!("Responder rejected route {}: {}", route_id, err);
                self.send(Command::Abort { route_id }).await?;
                self.responder_failure.get_or_insert(err);
            }
        }

        Ok(())
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,

    /// Node.js executable running the sidecar
    pub node_binary: PathBuf,

    /// Directory from which `playwright` is resolved (has it in node_modules)
    pub project_dir: PathBuf,

    pub navigation_timeout: Duration,

    /// Slack on top of a command's own timeout before the sidecar is
    /// declared unresponsive
    pub response_grace: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            viewport_width: 1280,
            viewport_height: 720,
            browser: Browser::Chromium,
            headless: true,
            node_binary: PathBuf::from("node"),
            project_dir: PathBuf::from("."),
            navigation_timeout: Duration::from_secs(30),
            response_grace: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playwright_config_default() {
        let config = PlaywrightConfig::default();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.browser, Browser::Chromium);
        assert!(config.headless);
        assert!(config.response_grace < config.navigation_timeout);
    }

    #[test]
    fn test_sidecar_handles_every_command() {
        for op in [
            "launch",
            "new_context",
            "route",
            "goto",
            "click",
            "wait_for",
            "set_input_files",
            "count",
            "screenshot",
            "ping",
            "close_context",
            "shutdown",
            "fulfill",
            "abort",
        ] {
            assert!(
                SIDECAR_JS.contains(&format!("'{op}'")),
                "sidecar does not handle '{op}'"
            );
        }
    }

    #[test]
    fn test_sidecar_locator_steps_share_one_deadline() {
        // Only `goto` gets the raw budget; locator ops spend what is left.
        assert_eq!(SIDECAR_JS.matches("timeout: cmd.timeout_ms").count(), 1);
        assert!(SIDECAR_JS.matches("remaining(deadline)").count() >= 4);
    }

    #[test]
    fn test_sidecar_reports_matched_text_content() {
        assert!(SIDECAR_JS.contains("textContent("));
        assert!(!SIDECAR_JS.contains("innerText"));
        assert!(!SIDECAR_JS.contains(".catch(() => '')"));
    }
}
