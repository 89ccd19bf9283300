//! E2E test harness entry point
//!
//! This file is the test binary that runs the extract-style scenarios against
//! a live app. It is opt-in because it needs Node.js, Playwright and a
//! reachable app:
//!
//!   EXTRACT_STYLE_E2E=1 BASE_URL=http://localhost:3000 \
//!     cargo test --package extract-style-e2e --test e2e -- --project-dir frontend

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use extract_style_e2e::playwright::PlaywrightConfig;
use extract_style_e2e::protocol::Browser;
use extract_style_e2e::runner::RunnerConfig;
use extract_style_e2e::server::ServerConfig;
use extract_style_e2e::{E2eError, E2eResult, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "extract-style-e2e")]
#[command(about = "Network-mocked E2E runner for the extract-style workflow")]
struct Args {
    /// URL of the app under test
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:3000")]
    base_url: String,

    /// Directory of YAML scenarios (built-in scenarios when omitted)
    #[arg(short, long)]
    scenarios: Option<PathBuf>,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    name: Option<String>,

    /// Shell command that starts the app (e.g. "npm run dev")
    #[arg(long)]
    server_cmd: Option<String>,

    /// Directory holding node_modules/playwright; also the server's cwd
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Glob of the intercepted endpoint
    #[arg(long, default_value = "**/api/extract-style")]
    endpoint: String,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Viewport width
    #[arg(long, default_value = "1280")]
    viewport_width: u32,

    /// Viewport height
    #[arg(long, default_value = "720")]
    viewport_height: u32,

    /// Per-element wait budget in milliseconds
    #[arg(long, default_value = "5000")]
    locator_timeout_ms: u64,

    /// Also assert the non-expected notification is absent
    #[arg(long)]
    strict_exclusivity: bool,

    /// Run every scenario this many times, each in a fresh context
    #[arg(long, default_value = "1")]
    repeat: usize,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,
}

fn main() {
    if std::env::var("EXTRACT_STYLE_E2E").as_deref() != Ok("1") {
        eprintln!("skipping extract-style e2e run (set EXTRACT_STYLE_E2E=1 to enable)");
        return;
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    // Run async main
    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let result = rt.block_on(async_main(args));

    match result {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let browser = Browser::parse(&args.browser)
        .ok_or_else(|| E2eError::InvalidScenario(format!("unknown browser '{}'", args.browser)))?;

    let config = RunnerConfig {
        server: ServerConfig {
            command: args.server_cmd,
            working_dir: Some(args.project_dir.clone()),
            base_url: args.base_url.clone(),
            ..Default::default()
        },
        playwright: PlaywrightConfig {
            base_url: args.base_url,
            screenshot_dir: args.output.join("screenshots"),
            viewport_width: args.viewport_width,
            viewport_height: args.viewport_height,
            browser,
            headless: !args.headed,
            project_dir: args.project_dir,
            ..Default::default()
        },
        scenarios_dir: args.scenarios,
        output_dir: args.output,
        endpoint: args.endpoint,
        locator_timeout: Duration::from_millis(args.locator_timeout_ms),
        strict_exclusivity: args.strict_exclusivity,
        repeat: args.repeat,
        ..Default::default()
    };

    let mut runner = TestRunner::with_config(config);

    // Start (or probe) the app, then the browser
    runner.start_server().await?;
    runner.start_browser().await?;

    let results = if let Some(name) = args.name {
        runner.run_named(&name).await?
    } else if let Some(tag) = args.tag {
        runner.run_tagged(&tag).await?
    } else {
        runner.run_all().await?
    };

    runner.write_results(&results)?;
    runner.shutdown().await?;

    Ok(results.failed == 0 && results.inconsistent().is_empty())
}
