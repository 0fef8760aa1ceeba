use crate::diff::DEFAULT_THRESHOLD;
use crate::{Result, VrtError};
use std::path::PathBuf;
use std::time::Duration;

/// Full-page capture policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullPageMode {
    /// Viewport-bounded, unless an existing baseline for the key is taller
    /// than the scenario viewport.
    #[default]
    Auto,
    Always,
    Never,
}

/// Everything the run needs, resolved and validated once at startup and
/// passed by reference into every component. No component reads environment
/// variables or flags on its own.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Entry document; turned into a `file://` URL at capture time.
    pub index: PathBuf,
    pub baseline_dir: PathBuf,
    pub output_dir: PathBuf,
    pub update_baselines: bool,
    pub ci: bool,
    pub full_page: FullPageMode,
    pub threshold: f32,
    pub shot_timeout_ms: u64,
    pub nav_timeout: Duration,
    pub idle_timeout: Duration,
    pub block_fonts: bool,
    pub force_viewport: bool,
    pub fail_on_dimension_mismatch: bool,
    pub quick: bool,
    pub settle_ms: u64,
    pub strict_errors: bool,
    pub disable_device_scale: bool,
    pub node_command: String,
    /// When set, captures are copied from this directory instead of driving
    /// real engines. Hermetic-test hook, resolved from the environment once
    /// at startup.
    pub mock_capture_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            index: PathBuf::from("index.html"),
            baseline_dir: PathBuf::from("tests/visual/baselines"),
            output_dir: PathBuf::from("tests/visual/output"),
            update_baselines: false,
            ci: false,
            full_page: FullPageMode::Auto,
            threshold: DEFAULT_THRESHOLD,
            shot_timeout_ms: 15_000,
            nav_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10),
            block_fonts: false,
            force_viewport: false,
            fail_on_dimension_mismatch: false,
            quick: false,
            settle_ms: 350,
            strict_errors: false,
            disable_device_scale: false,
            node_command: "node".to_string(),
            mock_capture_dir: None,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(VrtError::config(format!(
                "threshold must be a finite number >= 0, got {}",
                self.threshold
            )));
        }
        if self.shot_timeout_ms == 0 {
            return Err(VrtError::config("shot timeout must be positive"));
        }
        if self.node_command.trim().is_empty() {
            return Err(VrtError::config("node command must not be empty"));
        }
        Ok(())
    }
}
