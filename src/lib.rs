//! Cross-browser visual regression harness.
//!
//! Drives Playwright engines across a matrix of viewport/device scenarios
//! against a static page, captures rasters, compares them against stored
//! baselines with tolerance for minor dimension drift, and reduces the run
//! into a deterministic exit code for CI gating.
//!
//! # Module Overview
//!
//! - [`scenario`] - Scenario registry: viewport/device matrix resolution
//! - [`browser`] - Engine resolution, capability table and helper driving
//! - [`capture`] - The per-(browser, scenario) capture loop
//! - [`baseline`] - On-disk store of accepted reference rasters
//! - [`diff`] - Dimension-tolerant perceptual pixel comparison
//! - [`report`] - Run summary, CI digest and browsable report
//! - [`policy`] - Exit-code policy
//! - [`config`] - The one validated configuration object
//!
//! # Example
//!
//! ```no_run
//! use vrt_lib::{resolve_browsers, resolve_scenarios, run_matrix};
//! use vrt_lib::{exit_code_for_run, HarnessConfig, ScenarioOptions};
//!
//! # async fn example() -> vrt_lib::Result<()> {
//! let config = HarnessConfig::default();
//! config.validate()?;
//! let browsers = resolve_browsers(&["chromium".to_string()])?;
//! let scenarios = resolve_scenarios(&ScenarioOptions::default());
//!
//! let outcome = run_matrix(&config, &browsers, &scenarios, None).await?;
//! let code = exit_code_for_run(&outcome.records, &outcome.tally, &config);
//! # Ok(())
//! # }
//! ```

pub mod baseline;
pub mod browser;
pub mod capture;
pub mod config;
pub mod diff;
pub mod error;
pub mod policy;
pub mod report;
pub mod scenario;

pub use baseline::{BaselineStore, RunTally};
pub use browser::{
    probe_node, probe_playwright, resolve_browsers, BrowserTarget, Engine, EngineCaps, Progress,
};
pub use capture::{
    run_matrix, shot_name, CaptureOutcome, CaptureRecord, ShotStatus, MOCK_CAPTURE_ENV,
    READY_SELECTOR,
};
pub use config::{FullPageMode, HarnessConfig};
pub use diff::{compare, compare_rasters, DiffOutcome, DEFAULT_THRESHOLD};
pub use error::{Result, VrtError};
pub use policy::exit_code_for_run;
pub use report::{
    build_digest, build_summary, write_json_pretty, write_report, CiDigest, RunSummary,
};
pub use scenario::{
    resolve_scenarios, DeviceProfile, Scenario, ScenarioOptions, Viewport, ViewportParseError,
};
