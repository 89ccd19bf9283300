//! Extract-style E2E Harness
//!
//! This crate verifies the "extract style from image" workflow of the
//! content-creation web app in a real browser, with the image-analysis
//! backend replaced by scripted responses:
//! - Seeds client-side state so the onboarding modal stays closed
//! - Intercepts `/api/extract-style` and answers from Rust
//! - Drives toggle → extract button → hidden file input → upload
//! - Asserts the success/failure notification and the request contract
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── start_server() -> ServerHandle                       │
//! │    ├── start_browser() -> PlaywrightHandle ⇄ sidecar.js     │
//! │    └── run_scenario(scenario) -> TestResult                 │
//! │          ├── open_context(Fixture)        bootstrap         │
//! │          ├── arm(pattern, Responder)      interceptor       │
//! │          ├── WorkflowDriver::trigger      driver            │
//! │          └── OutcomeAssertor              assertions        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML or built-in)                                │
//! │    ├── name, description, tags                              │
//! │    ├── response: success { style_description }              │
//! │    │           | failure { status, code, message }          │
//! │    ├── verify_request                                       │
//! │    └── timeout_ms                                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod fixture;
pub mod intercept;
pub mod labels;
pub mod outcome;
pub mod playwright;
pub mod protocol;
pub mod runner;
pub mod scenario;
pub mod server;
pub mod upload;
pub mod workflow;

pub use error::{E2eError, E2eResult, FailureKind};
pub use runner::TestRunner;
pub use scenario::{OutcomeKind, Scenario, ScriptedResponse};
