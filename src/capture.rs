use crate::baseline::{BaselineStore, RunTally};
use crate::browser::{
    log_progress, run_capture_plan, BrowserTarget, CapturePlan, ContextOptions, PlannedShot,
    Progress,
};
use crate::config::{FullPageMode, HarnessConfig};
use crate::scenario::Scenario;
use crate::{diff, Result, VrtError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Marker the page under test exposes once its layout is stable.
pub const READY_SELECTOR: &str = ".hero-section h1";

/// Environment hook for hermetic runs; see `HarnessConfig::mock_capture_dir`.
pub const MOCK_CAPTURE_ENV: &str = "VRT_MOCK_CAPTURE_DIR";

/// Terminal state of one attempted (browser, scenario) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShotStatus {
    BaselineCreated,
    BaselineUpdated,
    Ok,
    OkDimensionCrop,
    Diff,
    DiffDimensionCrop,
    Error,
    LaunchError,
    ContextError,
}

impl ShotStatus {
    pub fn is_diff(self) -> bool {
        matches!(self, ShotStatus::Diff | ShotStatus::DiffDimensionCrop)
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            ShotStatus::Error | ShotStatus::LaunchError | ShotStatus::ContextError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShotStatus::BaselineCreated => "baseline-created",
            ShotStatus::BaselineUpdated => "baseline-updated",
            ShotStatus::Ok => "ok",
            ShotStatus::OkDimensionCrop => "ok-dimension-crop",
            ShotStatus::Diff => "diff",
            ShotStatus::DiffDimensionCrop => "diff-dimension-crop",
            ShotStatus::Error => "error",
            ShotStatus::LaunchError => "launch-error",
            ShotStatus::ContextError => "context-error",
        }
    }
}

/// One row of the run: append-only, immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub browser: String,
    pub scenario: String,
    pub shot: String,
    pub status: ShotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatches: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_mismatch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_size: Option<crate::scenario::Viewport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_size: Option<crate::scenario::Viewport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptureRecord {
    fn bare(target: &BrowserTarget, scenario: &Scenario, status: ShotStatus) -> Self {
        Self {
            browser: target.name.clone(),
            scenario: scenario.name.clone(),
            shot: shot_name(&target.name, &scenario.name),
            status,
            file: None,
            mismatches: None,
            dimension_mismatch: None,
            baseline_size: None,
            current_size: None,
            diff_artifact: None,
            error: None,
        }
    }

    pub fn has_dimension_mismatch(&self) -> bool {
        self.dimension_mismatch.unwrap_or(false)
    }
}

pub fn shot_name(browser: &str, scenario: &str) -> String {
    format!("{browser}_{scenario}.png")
}

#[derive(Debug)]
pub struct CaptureOutcome {
    pub records: Vec<CaptureRecord>,
    pub tally: RunTally,
}

enum ShotCapture {
    Captured(PathBuf),
    LaunchError(String),
    ContextError(String),
    CaptureError(String),
}

/// Drives every resolved browser through every scenario. Engines run
/// sequentially; a failure inside one engine's loop is contained there and
/// the remaining engines still execute.
pub async fn run_matrix(
    config: &HarnessConfig,
    browsers: &[BrowserTarget],
    scenarios: &[Scenario],
    progress: Progress,
) -> Result<CaptureOutcome> {
    fs::create_dir_all(&config.output_dir)?;
    let store = BaselineStore::new(config.baseline_dir.clone());

    let entry_url = if config.mock_capture_dir.is_some() {
        String::new()
    } else {
        crate::browser::probe_node(&config.node_command).await?;
        crate::browser::probe_playwright(&config.node_command).await?;
        entry_url(config)?
    };

    let mut records = Vec::with_capacity(browsers.len() * scenarios.len());
    let mut tally = RunTally::default();

    for target in browsers {
        log_progress(
            &progress,
            &format!(
                "Capturing {} scenario(s) on {}…",
                scenarios.len(),
                target.name
            ),
        );
        let captures = capture_browser(config, target, scenarios, &store, &entry_url).await;
        for (scenario, capture) in scenarios.iter().zip(captures) {
            let record = settle_shot(config, &store, &mut tally, target, scenario, capture).await;
            log_progress(
                &progress,
                &format!("  {} -> {}", record.shot, record.status.as_str()),
            );
            records.push(record);
        }
    }

    Ok(CaptureOutcome { records, tally })
}

fn entry_url(config: &HarnessConfig) -> Result<String> {
    let absolute = fs::canonicalize(&config.index).map_err(|err| {
        VrtError::config(format!(
            "entry document {} not found: {err}",
            config.index.display()
        ))
    })?;
    let url = Url::from_file_path(&absolute).map_err(|_| {
        VrtError::config(format!(
            "cannot express {} as a file:// URL",
            absolute.display()
        ))
    })?;
    Ok(url.into())
}

/// Captures all scenarios for one browser, yielding one outcome per
/// scenario in order. Never returns `Err`: engine-level failures are mapped
/// onto per-shot outcomes so sibling browsers keep running.
async fn capture_browser(
    config: &HarnessConfig,
    target: &BrowserTarget,
    scenarios: &[Scenario],
    store: &BaselineStore,
    entry_url: &str,
) -> Vec<ShotCapture> {
    if let Some(mock_dir) = &config.mock_capture_dir {
        return scenarios
            .iter()
            .map(|scenario| {
                let shot = shot_name(&target.name, &scenario.name);
                let source = mock_dir.join(&shot);
                let out = config.output_dir.join(&shot);
                if !source.is_file() {
                    return ShotCapture::ContextError(format!(
                        "mock capture {} not found",
                        source.display()
                    ));
                }
                match fs::copy(&source, &out) {
                    Ok(_) => ShotCapture::Captured(out),
                    Err(err) => ShotCapture::CaptureError(format!(
                        "failed to stage mock capture: {err}"
                    )),
                }
            })
            .collect();
    }

    let plan = build_plan(config, target, scenarios, store, entry_url);
    let timeout = helper_timeout(config, scenarios.len());

    match run_capture_plan(&config.node_command, &plan, timeout).await {
        Ok(report) if report.status == "launch-error" => {
            let message = report
                .message
                .unwrap_or_else(|| "engine failed to start".to_string());
            eprintln!("Warning: could not launch {}: {message}", target.name);
            scenarios
                .iter()
                .map(|_| ShotCapture::LaunchError(message.clone()))
                .collect()
        }
        Ok(report) => scenarios
            .iter()
            .map(|scenario| {
                let shot = shot_name(&target.name, &scenario.name);
                match report.shots.iter().find(|s| s.name == shot) {
                    Some(outcome) => match outcome.status.as_str() {
                        "captured" => ShotCapture::Captured(config.output_dir.join(&shot)),
                        "context-error" => ShotCapture::ContextError(message_of(outcome)),
                        _ => ShotCapture::CaptureError(message_of(outcome)),
                    },
                    None => ShotCapture::CaptureError("no capture reported".to_string()),
                }
            })
            .collect(),
        Err(err) => {
            let message = err.to_string();
            eprintln!("Warning: {} capture run failed: {message}", target.name);
            scenarios
                .iter()
                .map(|_| ShotCapture::CaptureError(message.clone()))
                .collect()
        }
    }
}

fn message_of(shot: &crate::browser::ShotReport) -> String {
    shot.message
        .clone()
        .unwrap_or_else(|| "no details reported".to_string())
}

fn build_plan(
    config: &HarnessConfig,
    target: &BrowserTarget,
    scenarios: &[Scenario],
    store: &BaselineStore,
    entry_url: &str,
) -> CapturePlan {
    let caps = target.engine.caps();
    let shots = scenarios
        .iter()
        .map(|scenario| {
            let shot = shot_name(&target.name, &scenario.name);
            PlannedShot {
                out_path: config.output_dir.join(&shot).to_string_lossy().into_owned(),
                full_page: full_page_for(&shot, scenario, store, config.full_page),
                context: context_options(scenario, &caps, config),
                name: shot,
            }
        })
        .collect();

    CapturePlan {
        engine: target.engine.as_str().to_string(),
        channel: if caps.channels {
            target.channel.clone()
        } else {
            None
        },
        url: entry_url.to_string(),
        ready_selector: READY_SELECTOR.to_string(),
        nav_timeout_ms: config.nav_timeout.as_millis() as u64,
        idle_timeout_ms: config.idle_timeout.as_millis() as u64,
        shot_timeout_ms: config.shot_timeout_ms,
        block_fonts: config.block_fonts,
        quick: config.quick,
        settle_ms: config.settle_ms,
        shots,
    }
}

/// Upper bound for one helper process covering a whole scenario loop.
fn helper_timeout(config: &HarnessConfig, shots: usize) -> Duration {
    let per_shot = config.shot_timeout_ms
        + config.settle_ms
        + config.nav_timeout.as_millis() as u64
        + config.idle_timeout.as_millis() as u64;
    Duration::from_millis(per_shot * shots.max(1) as u64 + 15_000)
}

/// Context options for one scenario, filtered through the engine capability
/// table. Device-pixel-ratio and touch emulation are dropped for mobile
/// scenarios and under the global overrides, keeping raster dimensions
/// deterministic.
fn context_options(
    scenario: &Scenario,
    caps: &crate::browser::EngineCaps,
    config: &HarnessConfig,
) -> ContextOptions {
    let mut options = ContextOptions {
        viewport: scenario.viewport,
        user_agent: None,
        device_scale_factor: None,
        is_mobile: None,
        has_touch: None,
    };
    if config.force_viewport {
        return options;
    }
    if let Some(device) = &scenario.device {
        options.user_agent = Some(device.user_agent.clone());
        let suppress = device.is_mobile || config.disable_device_scale;
        if !suppress {
            options.device_scale_factor = Some(device.device_scale_factor);
            if caps.mobile_emulation {
                options.is_mobile = Some(device.is_mobile);
                options.has_touch = Some(device.has_touch);
            }
        }
    }
    options
}

/// Full-page only when forced, or, in auto mode, when the accepted
/// baseline for this key is already taller than the viewport. New baselines
/// default to viewport-sized, so the auto decision can differ between a
/// baseline's first run and later ones; `always`/`never` sidestep that.
fn full_page_for(
    shot: &str,
    scenario: &Scenario,
    store: &BaselineStore,
    mode: FullPageMode,
) -> bool {
    match mode {
        FullPageMode::Always => true,
        FullPageMode::Never => false,
        FullPageMode::Auto => store
            .dimensions(shot)
            .map(|size| size.height > scenario.viewport.height)
            .unwrap_or(false),
    }
}

/// Turns one capture outcome into its record: accept as baseline, diff
/// against the stored one, or carry the failure through untouched.
async fn settle_shot(
    config: &HarnessConfig,
    store: &BaselineStore,
    tally: &mut RunTally,
    target: &BrowserTarget,
    scenario: &Scenario,
    capture: ShotCapture,
) -> CaptureRecord {
    let mut record = CaptureRecord::bare(target, scenario, ShotStatus::Error);
    match capture {
        ShotCapture::LaunchError(message) => {
            record.status = ShotStatus::LaunchError;
            record.error = Some(message);
        }
        ShotCapture::ContextError(message) => {
            record.status = ShotStatus::ContextError;
            record.error = Some(message);
        }
        ShotCapture::CaptureError(message) => {
            record.status = ShotStatus::Error;
            record.error = Some(message);
        }
        ShotCapture::Captured(path) => {
            record.file = Some(path.clone());
            if config.update_baselines || !store.contains(&record.shot) {
                match store.accept(&record.shot, &path) {
                    Ok(()) => {
                        record.status = if config.update_baselines {
                            ShotStatus::BaselineUpdated
                        } else {
                            tally.created_baselines += 1;
                            ShotStatus::BaselineCreated
                        };
                    }
                    Err(err) => {
                        record.status = ShotStatus::Error;
                        record.error = Some(format!("failed to persist baseline: {err}"));
                    }
                }
            } else {
                let diff_path = config
                    .output_dir
                    .join(record.shot.replace(".png", ".diff.png"));
                match diff::compare(
                    &store.path_for(&record.shot),
                    &path,
                    &diff_path,
                    config.threshold,
                )
                .await
                {
                    Ok(outcome) => {
                        record.status = match (outcome.mismatches > 0, outcome.dimension_mismatch)
                        {
                            (false, false) => ShotStatus::Ok,
                            (false, true) => ShotStatus::OkDimensionCrop,
                            (true, false) => ShotStatus::Diff,
                            (true, true) => ShotStatus::DiffDimensionCrop,
                        };
                        record.mismatches = Some(outcome.mismatches);
                        record.dimension_mismatch = outcome.dimension_mismatch.then_some(true);
                        record.baseline_size = Some(outcome.baseline_size);
                        record.current_size = Some(outcome.current_size);
                        record.diff_artifact = outcome.diff_artifact;
                    }
                    Err(err) => {
                        record.status = ShotStatus::Error;
                        record.error = Some(err.to_string());
                    }
                }
            }
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Engine;
    use crate::scenario::{default_scenarios, DeviceProfile, Viewport};
    use image::RgbaImage;

    fn mobile_scenario() -> Scenario {
        default_scenarios()
            .into_iter()
            .find(|s| s.name == "mobile-portrait")
            .unwrap()
    }

    fn desktop_scenario() -> Scenario {
        default_scenarios()
            .into_iter()
            .find(|s| s.name == "desktop")
            .unwrap()
    }

    fn desktop_device_scenario() -> Scenario {
        Scenario {
            name: "kiosk".to_string(),
            viewport: Viewport {
                width: 1080,
                height: 1920,
            },
            device: Some(DeviceProfile {
                user_agent: "kiosk-agent".to_string(),
                device_scale_factor: 2.0,
                is_mobile: false,
                has_touch: true,
            }),
        }
    }

    #[test]
    fn shot_names_embed_browser_and_scenario() {
        assert_eq!(shot_name("chromium", "desktop"), "chromium_desktop.png");
    }

    #[test]
    fn mobile_scenarios_suppress_scale_and_touch() {
        let config = HarnessConfig::default();
        let options = context_options(&mobile_scenario(), &Engine::Chromium.caps(), &config);
        assert!(options.user_agent.is_some());
        assert!(options.device_scale_factor.is_none());
        assert!(options.is_mobile.is_none());
        assert!(options.has_touch.is_none());
    }

    #[test]
    fn non_mobile_device_profiles_keep_emulation() {
        let config = HarnessConfig::default();
        let options =
            context_options(&desktop_device_scenario(), &Engine::Chromium.caps(), &config);
        assert_eq!(options.device_scale_factor, Some(2.0));
        assert_eq!(options.is_mobile, Some(false));
        assert_eq!(options.has_touch, Some(true));
    }

    #[test]
    fn disable_device_scale_suppresses_globally() {
        let config = HarnessConfig {
            disable_device_scale: true,
            ..HarnessConfig::default()
        };
        let options =
            context_options(&desktop_device_scenario(), &Engine::Chromium.caps(), &config);
        assert!(options.device_scale_factor.is_none());
        assert!(options.is_mobile.is_none());
        assert_eq!(options.user_agent.as_deref(), Some("kiosk-agent"));
    }

    #[test]
    fn firefox_never_receives_mobile_flags() {
        let config = HarnessConfig::default();
        let options =
            context_options(&desktop_device_scenario(), &Engine::Firefox.caps(), &config);
        assert_eq!(options.device_scale_factor, Some(2.0));
        assert!(options.is_mobile.is_none());
        assert!(options.has_touch.is_none());
    }

    #[test]
    fn force_viewport_strips_the_device_profile() {
        let config = HarnessConfig {
            force_viewport: true,
            ..HarnessConfig::default()
        };
        let options = context_options(&mobile_scenario(), &Engine::Chromium.caps(), &config);
        assert!(options.user_agent.is_none());
        assert_eq!(options.viewport.width, 360);
    }

    #[test]
    fn full_page_auto_follows_the_stored_baseline_height() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(tmp.path());
        let scenario = desktop_scenario();
        let shot = shot_name("chromium", &scenario.name);

        // no baseline yet: viewport-bounded
        assert!(!full_page_for(&shot, &scenario, &store, FullPageMode::Auto));

        // tall accepted baseline flips auto mode to full-page
        let tall = tmp.path().join("tall.png");
        RgbaImage::from_pixel(1440, 2400, image::Rgba([0, 0, 0, 255]))
            .save(&tall)
            .unwrap();
        store.accept(&shot, &tall).unwrap();
        assert!(full_page_for(&shot, &scenario, &store, FullPageMode::Auto));

        assert!(full_page_for(&shot, &scenario, &store, FullPageMode::Always));
        assert!(!full_page_for(&shot, &scenario, &store, FullPageMode::Never));
    }

    #[test]
    fn plan_omits_channel_for_engines_without_channel_support() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(tmp.path());
        let config = HarnessConfig::default();
        let scenarios = vec![desktop_scenario()];
        let target = BrowserTarget {
            name: "webkit".to_string(),
            engine: Engine::Webkit,
            channel: Some("chrome".to_string()),
        };
        let plan = build_plan(&config, &target, &scenarios, &store, "file:///tmp/index.html");
        assert!(plan.channel.is_none());
        assert_eq!(plan.shots.len(), 1);
        assert_eq!(plan.shots[0].name, "webkit_desktop.png");
        assert_eq!(plan.ready_selector, READY_SELECTOR);
    }

    #[tokio::test]
    async fn mock_capture_runs_the_full_pipeline() {
        let tmp = tempfile::tempdir().unwrap();
        let mock_dir = tmp.path().join("mock");
        fs::create_dir_all(&mock_dir).unwrap();
        let config = HarnessConfig {
            baseline_dir: tmp.path().join("baselines"),
            output_dir: tmp.path().join("output"),
            mock_capture_dir: Some(mock_dir.clone()),
            ..HarnessConfig::default()
        };
        let browsers = crate::browser::resolve_browsers(&["chromium".to_string()]).unwrap();
        let scenarios = vec![desktop_scenario()];

        RgbaImage::from_pixel(40, 30, image::Rgba([9, 9, 9, 255]))
            .save(mock_dir.join("chromium_desktop.png"))
            .unwrap();

        // first run records a fresh baseline
        let outcome = run_matrix(&config, &browsers, &scenarios, None)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].status, ShotStatus::BaselineCreated);
        assert_eq!(outcome.tally.created_baselines, 1);

        // unchanged second run matches
        let outcome = run_matrix(&config, &browsers, &scenarios, None)
            .await
            .unwrap();
        assert_eq!(outcome.records[0].status, ShotStatus::Ok);
        assert_eq!(outcome.records[0].mismatches, Some(0));
        assert_eq!(outcome.tally.created_baselines, 0);

        // altered page content diffs with an artifact
        RgbaImage::from_pixel(40, 30, image::Rgba([240, 240, 240, 255]))
            .save(mock_dir.join("chromium_desktop.png"))
            .unwrap();
        let outcome = run_matrix(&config, &browsers, &scenarios, None)
            .await
            .unwrap();
        let record = &outcome.records[0];
        assert_eq!(record.status, ShotStatus::Diff);
        assert!(record.mismatches.unwrap() > 0);
        assert!(record.diff_artifact.as_ref().unwrap().is_file());
    }

    #[tokio::test]
    async fn missing_mock_capture_is_a_context_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mock_dir = tmp.path().join("mock");
        fs::create_dir_all(&mock_dir).unwrap();
        let config = HarnessConfig {
            baseline_dir: tmp.path().join("baselines"),
            output_dir: tmp.path().join("output"),
            mock_capture_dir: Some(mock_dir),
            ..HarnessConfig::default()
        };
        let browsers = crate::browser::resolve_browsers(&["firefox".to_string()]).unwrap();
        let scenarios = vec![desktop_scenario()];

        let outcome = run_matrix(&config, &browsers, &scenarios, None)
            .await
            .unwrap();
        assert_eq!(outcome.records[0].status, ShotStatus::ContextError);
        assert!(outcome.records[0].error.is_some());
    }

    #[tokio::test]
    async fn update_mode_rerecords_existing_baselines() {
        let tmp = tempfile::tempdir().unwrap();
        let mock_dir = tmp.path().join("mock");
        fs::create_dir_all(&mock_dir).unwrap();
        let mut config = HarnessConfig {
            baseline_dir: tmp.path().join("baselines"),
            output_dir: tmp.path().join("output"),
            mock_capture_dir: Some(mock_dir.clone()),
            ..HarnessConfig::default()
        };
        let browsers = crate::browser::resolve_browsers(&["chromium".to_string()]).unwrap();
        let scenarios = vec![desktop_scenario()];

        RgbaImage::from_pixel(20, 20, image::Rgba([1, 1, 1, 255]))
            .save(mock_dir.join("chromium_desktop.png"))
            .unwrap();
        run_matrix(&config, &browsers, &scenarios, None)
            .await
            .unwrap();

        RgbaImage::from_pixel(20, 20, image::Rgba([200, 1, 1, 255]))
            .save(mock_dir.join("chromium_desktop.png"))
            .unwrap();
        config.update_baselines = true;
        let outcome = run_matrix(&config, &browsers, &scenarios, None)
            .await
            .unwrap();
        assert_eq!(outcome.records[0].status, ShotStatus::BaselineUpdated);
        // update mode does not count toward the created-baseline gate
        assert_eq!(outcome.tally.created_baselines, 0);
    }

    #[tokio::test]
    async fn dimension_drift_is_cropped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mock_dir = tmp.path().join("mock");
        fs::create_dir_all(&mock_dir).unwrap();
        let config = HarnessConfig {
            baseline_dir: tmp.path().join("baselines"),
            output_dir: tmp.path().join("output"),
            mock_capture_dir: Some(mock_dir.clone()),
            ..HarnessConfig::default()
        };
        let browsers = crate::browser::resolve_browsers(&["chromium".to_string()]).unwrap();
        let scenarios = vec![desktop_scenario()];

        RgbaImage::from_pixel(50, 40, image::Rgba([7, 7, 7, 255]))
            .save(mock_dir.join("chromium_desktop.png"))
            .unwrap();
        run_matrix(&config, &browsers, &scenarios, None)
            .await
            .unwrap();

        // five pixels wider, same content inside the intersection
        RgbaImage::from_pixel(55, 40, image::Rgba([7, 7, 7, 255]))
            .save(mock_dir.join("chromium_desktop.png"))
            .unwrap();
        let outcome = run_matrix(&config, &browsers, &scenarios, None)
            .await
            .unwrap();
        let record = &outcome.records[0];
        assert_eq!(record.status, ShotStatus::OkDimensionCrop);
        assert_eq!(record.mismatches, Some(0));
        assert!(record.has_dimension_mismatch());
        assert_eq!(record.baseline_size.unwrap().width, 50);
        assert_eq!(record.current_size.unwrap().width, 55);
    }
}
