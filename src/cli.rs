use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use vrt_lib::FullPageMode;

#[derive(Parser)]
#[command(name = "vrt")]
#[command(
    version,
    about = "Cross-browser visual regression harness for static pages",
    long_about = "Cross-browser visual regression harness\n\n\
        Drives chromium, firefox and webkit across a viewport/device matrix \
        against a local static page, compares captures against stored \
        baselines, and exits with a CI-friendly code:\n\
        0 = clean, 1 = visual differences (or gated errors), 2 = new \
        baselines were created while running under --ci."
)]
pub struct Cli {
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "chromium,firefox,webkit",
        env = "BROWSERS",
        help = "Engines to drive; chrome aliases map to chromium with the chrome channel"
    )]
    pub browsers: Vec<String>,

    #[arg(long, help = "Re-record every baseline from this run's captures")]
    pub update: bool,

    #[arg(
        long,
        help = "CI gating: newly created baselines fail the run with exit code 2"
    )]
    pub ci: bool,

    #[arg(
        long,
        value_enum,
        default_value = "auto",
        help = "Full-page capture mode; auto keeps already-tall baselines full-page"
    )]
    pub full_page: FullPageArg,

    #[arg(
        long,
        default_value = "0.15",
        allow_negative_numbers = true,
        help = "Per-pixel mismatch tolerance (0 = exact match)"
    )]
    pub threshold: f32,

    #[arg(
        long,
        default_value = "15000",
        value_name = "MS",
        help = "Screenshot timeout per shot"
    )]
    pub shot_timeout: u64,

    #[arg(
        long,
        default_value = "30",
        value_name = "SECS",
        help = "Navigation timeout for the entry document"
    )]
    pub nav_timeout: u64,

    #[arg(
        long,
        default_value = "10",
        value_name = "SECS",
        help = "Best-effort network-idle timeout"
    )]
    pub idle_timeout: u64,

    #[arg(long, help = "Abort web-font requests for deterministic text rendering")]
    pub block_fonts: bool,

    #[arg(long, help = "Use the bare scenario viewport, ignoring device profiles")]
    pub force_viewport: bool,

    #[arg(
        long,
        help = "Fail the run when baseline and capture dimensions drift"
    )]
    pub fail_on_dimension_mismatch: bool,

    #[arg(
        long,
        help = "Reuse one page per browser, resizing the viewport in place"
    )]
    pub quick: bool,

    #[arg(
        long,
        default_value = "350",
        value_name = "MS",
        help = "Settle delay between quick-mode resizes"
    )]
    pub settle_ms: u64,

    #[arg(long, help = "Treat capture errors as failures")]
    pub strict_errors: bool,

    #[arg(long, help = "Disable device-pixel-ratio emulation everywhere")]
    pub no_device_scale: bool,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Only run the named scenarios, in the given order"
    )]
    pub scenarios: Option<Vec<String>>,

    #[arg(
        long = "viewport",
        value_name = "WIDTHxHEIGHT@NAME",
        help = "Extra ad-hoc scenario; repeatable"
    )]
    pub viewports: Vec<String>,

    #[arg(long, help = "Include the extended scenario presets")]
    pub extended_scenarios: bool,

    #[arg(
        long,
        default_value = "index.html",
        value_name = "PATH",
        help = "Entry document, served via a file:// URL"
    )]
    pub index: PathBuf,

    #[arg(long, default_value = "tests/visual/baselines", value_name = "PATH")]
    pub baseline_dir: PathBuf,

    #[arg(long, default_value = "tests/visual/output", value_name = "PATH")]
    pub output_dir: PathBuf,

    #[arg(
        long,
        default_value = "node",
        help = "Node command used to spawn the Playwright helper"
    )]
    pub node: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum FullPageArg {
    #[default]
    Auto,
    Always,
    Never,
}

impl From<FullPageArg> for FullPageMode {
    fn from(arg: FullPageArg) -> Self {
        match arg {
            FullPageArg::Auto => FullPageMode::Auto,
            FullPageArg::Always => FullPageMode::Always,
            FullPageArg::Never => FullPageMode::Never,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
