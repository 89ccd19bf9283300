//! Application under test - optionally spawning it, always health checking it

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to the app's dev server, spawned or pre-existing
pub struct ServerHandle {
    child: Option<Child>,
    pub base_url: String,
}

impl ServerHandle {
    /// Spawn the app (if a command is configured) and wait until it answers
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let child = match &config.command {
            Some(command) => {
                info!("Spawning app server: {}", command);

                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command);
                if let Some(dir) = &config.working_dir {
                    cmd.current_dir(dir);
                }
                for (key, value) in &config.env {
                    cmd.env(key, value);
                }

                // Own process group so the whole tree can be signalled
                cmd.process_group(0)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());

                let child = cmd.spawn().map_err(|e| {
                    E2eError::ServerStartup(format!("Failed to spawn '{}': {}", command, e))
                })?;
                Some(child)
            }
            None => None,
        };

        let handle = ServerHandle { child, base_url };

        // Wait for server to be healthy
        handle
            .wait_for_healthy(&config.health_path, config.startup_timeout)
            .await?;

        info!("Server is healthy at {}", handle.base_url);
        Ok(handle)
    }

    /// Wait for the server to respond to health checks
    async fn wait_for_healthy(&self, health_path: &str, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}{}", self.base_url, health_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server at {} ...", health_url);
                    }
                    // Connection refused is expected while server is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server if this handle spawned it
    pub fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        info!("Stopping server (pid: {})", child.id());

        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(child.id() as i32);
        if killpg(pgid, Signal::SIGTERM).is_ok() {
            // Give it a moment to shut down gracefully
            std::thread::sleep(Duration::from_millis(500));
        }

        // Force kill if still running
        let _ = killpg(pgid, Signal::SIGKILL);
        let _ = child.kill();
        let _ = child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for reaching (and optionally spawning) the app
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Shell command starting the app, e.g. `npm run dev`; `None` means the
    /// app is already running at `base_url`
    pub command: Option<String>,

    pub working_dir: Option<PathBuf>,

    /// Extra environment for the spawned command
    pub env: Vec<(String, String)>,

    pub base_url: String,

    /// Path polled until it answers with a 2xx
    pub health_path: String,

    /// Timeout for server startup
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: None,
            working_dir: None,
            env: Vec::new(),
            base_url: "http://localhost:3000".to_string(),
            health_path: "/".to_string(),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert!(config.command.is_none());
        assert_eq!(config.health_path, "/");
        assert_eq!(config.base_url, "http://localhost:3000");
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_health_check() {
        let config = ServerConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            startup_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let err = ServerHandle::spawn(config).await.err().unwrap();
        assert!(matches!(err, E2eError::ServerHealthCheck(n) if n >= 1));
    }
}
