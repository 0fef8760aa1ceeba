use crate::scenario::Viewport;
use crate::{Result, VrtError};
use serde::{Deserialize, Serialize};
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

/// Embedded Playwright helper. Receives a capture plan as JSON on stdin and
/// reports per-shot outcomes as a single JSON object on stdout. The browser
/// instance is closed in a `finally` on every path, including mid-plan
/// failures, so a crashed scenario never leaks an engine process.
const CAPTURE_SCRIPT: &str = r#"
const FONT_GLOB = '**/*.{woff,woff2,ttf,otf}';
const FREEZE_CSS = '* { animation: none !important; transition: none !important; caret-color: transparent !important; }';

function failure(err) {
  return err && err.message ? err.message : String(err);
}

async function preparePage(page, plan) {
  if (plan.blockFonts) {
    await page.route(FONT_GLOB, route => route.abort());
  }
  await page.goto(plan.url, { timeout: plan.navTimeoutMs });
  await page.waitForSelector(plan.readySelector, { timeout: plan.navTimeoutMs });
  try {
    await page.waitForLoadState('networkidle', { timeout: plan.idleTimeoutMs });
  } catch (err) {
    // best effort; a chatty page must not fail the shot
  }
  await page.addStyleTag({ content: FREEZE_CSS });
}

async function run(plan) {
  const { chromium, firefox, webkit } = require('playwright');
  const engines = { chromium, firefox, webkit };
  const shots = [];
  if (plan.shots.length === 0) {
    console.log(JSON.stringify({ status: 'ok', shots }));
    return;
  }
  let browser;
  try {
    const options = { headless: true };
    if (plan.channel) options.channel = plan.channel;
    browser = await engines[plan.engine].launch(options);
  } catch (err) {
    console.log(JSON.stringify({ status: 'launch-error', message: failure(err), shots }));
    return;
  }
  try {
    if (plan.quick) {
      let context;
      let page;
      try {
        context = await browser.newContext(plan.shots[0].context);
        page = await context.newPage();
        await preparePage(page, plan);
      } catch (err) {
        const message = failure(err);
        for (const shot of plan.shots) {
          shots.push({ name: shot.name, status: 'context-error', message });
        }
        return;
      }
      for (const shot of plan.shots) {
        try {
          await page.setViewportSize(shot.context.viewport);
          await page.waitForTimeout(plan.settleMs);
          await page.screenshot({ path: shot.outPath, fullPage: shot.fullPage, timeout: plan.shotTimeoutMs });
          shots.push({ name: shot.name, status: 'captured' });
        } catch (err) {
          shots.push({ name: shot.name, status: 'capture-error', message: failure(err) });
        }
      }
      await context.close();
    } else {
      for (const shot of plan.shots) {
        let context;
        try {
          context = await browser.newContext(shot.context);
        } catch (err) {
          shots.push({ name: shot.name, status: 'context-error', message: failure(err) });
          continue;
        }
        try {
          const page = await context.newPage();
          await preparePage(page, plan);
          await page.screenshot({ path: shot.outPath, fullPage: shot.fullPage, timeout: plan.shotTimeoutMs });
          shots.push({ name: shot.name, status: 'captured' });
        } catch (err) {
          shots.push({ name: shot.name, status: 'capture-error', message: failure(err) });
        } finally {
          await context.close();
        }
      }
    }
  } finally {
    await browser.close();
    console.log(JSON.stringify({ status: 'ok', shots }));
  }
}

let input = '';
process.stdin.setEncoding('utf8');
process.stdin.on('data', chunk => { input += chunk; });
process.stdin.on('end', () => {
  run(JSON.parse(input)).catch(err => {
    console.error(failure(err));
    process.exitCode = 1;
  });
});
"#;

const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

/// Progress callback threaded through the capture loop; `None` keeps the
/// run silent.
pub type Progress = Option<Arc<dyn Fn(&str) + Send + Sync>>;

pub fn log_progress(progress: &Progress, message: &str) {
    if let Some(cb) = progress {
        cb(message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Chromium,
    Firefox,
    Webkit,
}

impl Engine {
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Chromium => "chromium",
            Engine::Firefox => "firefox",
            Engine::Webkit => "webkit",
        }
    }

    pub fn caps(self) -> EngineCaps {
        ENGINE_CAPS
            .iter()
            .find(|(engine, _)| *engine == self)
            .map(|(_, caps)| *caps)
            .unwrap_or(EngineCaps {
                mobile_emulation: false,
                channels: false,
            })
    }
}

/// What each engine can actually emulate. Adding an engine is a table row,
/// not a new branch in the capture path.
#[derive(Debug, Clone, Copy)]
pub struct EngineCaps {
    /// Firefox rejects `isMobile`/`hasTouch` context options.
    pub mobile_emulation: bool,
    /// Only Chromium accepts a release-channel selector.
    pub channels: bool,
}

const ENGINE_CAPS: [(Engine, EngineCaps); 3] = [
    (
        Engine::Chromium,
        EngineCaps {
            mobile_emulation: true,
            channels: true,
        },
    ),
    (
        Engine::Firefox,
        EngineCaps {
            mobile_emulation: false,
            channels: false,
        },
    ),
    (
        Engine::Webkit,
        EngineCaps {
            mobile_emulation: true,
            channels: false,
        },
    ),
];

/// A launchable engine, de-duplicated by canonical name.
#[derive(Debug, Clone)]
pub struct BrowserTarget {
    pub name: String,
    pub engine: Engine,
    pub channel: Option<String>,
}

impl BrowserTarget {
    fn canonical(engine: Engine, channel: Option<&str>) -> Self {
        Self {
            name: engine.as_str().to_string(),
            engine,
            channel: channel.map(str::to_string),
        }
    }
}

/// Resolves requested engine names to launchable targets. Case-insensitive;
/// the chrome alias family collapses onto the chromium target with the
/// `chrome` channel. Unrecognized entries are warned about, never fatal on
/// their own; only an empty result is an error.
pub fn resolve_browsers(requested: &[String]) -> Result<Vec<BrowserTarget>> {
    let mut targets: Vec<BrowserTarget> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();

    for raw in requested {
        let name = raw.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        let target = match name.as_str() {
            "chromium" => Some(BrowserTarget::canonical(Engine::Chromium, None)),
            "firefox" => Some(BrowserTarget::canonical(Engine::Firefox, None)),
            "webkit" => Some(BrowserTarget::canonical(Engine::Webkit, None)),
            "chrome" | "google-chrome" | "chrome-stable" => {
                Some(BrowserTarget::canonical(Engine::Chromium, Some("chrome")))
            }
            _ => None,
        };
        match target {
            Some(target) => {
                if !targets.iter().any(|t| t.name == target.name) {
                    targets.push(target);
                }
            }
            None => unknown.push(raw.clone()),
        }
    }

    if !unknown.is_empty() {
        eprintln!(
            "Warning: unrecognized browsers skipped: {}",
            unknown.join(", ")
        );
    }
    if targets.is_empty() {
        return Err(VrtError::config(
            "no recognized browsers requested; use chromium, firefox or webkit",
        ));
    }
    Ok(targets)
}

/// Per-browser capture plan handed to the Playwright helper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePlan {
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub url: String,
    pub ready_selector: String,
    pub nav_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub shot_timeout_ms: u64,
    pub block_fonts: bool,
    pub quick: bool,
    pub settle_ms: u64,
    pub shots: Vec<PlannedShot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedShot {
    pub name: String,
    pub out_path: String,
    pub full_page: bool,
    pub context: ContextOptions,
}

/// Browsing-context options, shaped to spread directly into Playwright's
/// `browser.newContext`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOptions {
    pub viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_scale_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_mobile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_touch: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct EngineReport {
    pub status: String,
    pub message: Option<String>,
    #[serde(default)]
    pub shots: Vec<ShotReport>,
}

#[derive(Debug, Deserialize)]
pub struct ShotReport {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
}

/// Runs one capture plan in a fresh helper process and returns its report.
/// The process is bounded by `process_timeout` and killed on expiry.
pub async fn run_capture_plan(
    node_command: &str,
    plan: &CapturePlan,
    process_timeout: Duration,
) -> Result<EngineReport> {
    let payload = serde_json::to_vec(plan)?;

    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(CAPTURE_SCRIPT)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|err| map_spawn_error(err, node_command))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&payload).await.map_err(VrtError::Io)?;
        // dropping stdin signals end-of-plan to the helper
    }

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_pipe {
            let _ = out.read_to_end(&mut buf).await;
        }
        buf
    });

    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_pipe {
            let _ = err.read_to_end(&mut buf).await;
        }
        buf
    });

    let status = match timeout(process_timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => return Err(VrtError::Io(err)),
        Err(_) => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            return Err(VrtError::browser(format!(
                "{} helper timed out after {:?}",
                plan.engine, process_timeout
            )));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(map_helper_error(status.to_string(), &stderr));
    }

    let stdout = String::from_utf8_lossy(&stdout);
    serde_json::from_str::<EngineReport>(&stdout).map_err(|err| {
        VrtError::browser(format!(
            "unexpected helper output ({}): {}",
            err,
            stdout.trim()
        ))
    })
}

fn map_spawn_error(err: io::Error, command: &str) -> VrtError {
    if err.kind() == io::ErrorKind::NotFound {
        VrtError::config(format!(
            "Unable to spawn the Playwright helper; '{}' was not found on PATH",
            command
        ))
    } else {
        VrtError::Io(err)
    }
}

fn map_helper_error(status_text: impl Into<String>, stderr: &str) -> VrtError {
    if stderr
        .to_ascii_lowercase()
        .contains("cannot find module 'playwright'")
    {
        return VrtError::config(
            "Playwright npm package is missing; install with `npm install playwright` \
             and `npx playwright install`.",
        );
    }

    VrtError::browser(format!(
        "helper exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

/// Fails fast when the Node binary is missing, before any engine is spawned.
pub async fn probe_node(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            VrtError::config(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(VrtError::config(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

pub async fn probe_playwright(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            VrtError::config(format!(
                "Timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(map_helper_error(format!("{:?}", output.status), &stderr));
    }

    Ok(())
}
