use crate::baseline::RunTally;
use crate::capture::{CaptureRecord, ShotStatus};
use crate::config::HarnessConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};

/// Full structured projection of one run. Regenerated every run; never
/// authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub updated: bool,
    pub threshold: f32,
    pub shot_timeout_ms: u64,
    pub created_baselines: u32,
    pub results: Vec<CaptureRecord>,
}

pub fn build_summary(
    config: &HarnessConfig,
    records: &[CaptureRecord],
    tally: &RunTally,
) -> RunSummary {
    RunSummary {
        updated: config.update_baselines,
        threshold: config.threshold,
        shot_timeout_ms: config.shot_timeout_ms,
        created_baselines: tally.created_baselines,
        results: records.to_vec(),
    }
}

/// Condensed per-status projection for CI consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiDigest {
    pub counts: BTreeMap<String, usize>,
    pub diff_shots: Vec<String>,
    pub error_shots: Vec<String>,
    pub dimension_mismatch_shots: Vec<String>,
}

pub fn build_digest(records: &[CaptureRecord]) -> CiDigest {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut diff_shots = Vec::new();
    let mut error_shots = Vec::new();
    let mut dimension_mismatch_shots = Vec::new();

    for record in records {
        *counts.entry(record.status.as_str().to_string()).or_insert(0) += 1;
        if record.status.is_diff() {
            diff_shots.push(record.shot.clone());
        }
        if record.status.is_error() {
            error_shots.push(record.shot.clone());
        }
        if record.has_dimension_mismatch() {
            dimension_mismatch_shots.push(record.shot.clone());
        }
    }

    CiDigest {
        counts,
        diff_shots,
        error_shots,
        dimension_mismatch_shots,
    }
}

impl CiDigest {
    /// One stderr line, e.g. `12 shot(s): ok 9, diff 2, error 1`.
    pub fn one_liner(&self, total: usize) -> String {
        let buckets: Vec<String> = self
            .counts
            .iter()
            .map(|(status, count)| format!("{status} {count}"))
            .collect();
        format!("{total} shot(s): {}", buckets.join(", "))
    }
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// Renders the browsable report: one status-coded card per record pairing
/// baseline, current and diff images. Image links are relative to the
/// output directory, where the report lives.
pub fn render_report(records: &[CaptureRecord], config: &HarnessConfig) -> String {
    let mut html = String::new();
    html.push_str(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Visual regression report</title>\n<style>\n\
         body { font-family: system-ui, sans-serif; margin: 2rem; background: #fafafa; }\n\
         .card { border: 1px solid #ddd; border-radius: 6px; padding: 1rem; margin-bottom: 1.5rem; background: #fff; }\n\
         .badge { display: inline-block; padding: 0.15rem 0.6rem; border-radius: 1rem; color: #fff; font-size: 0.85rem; }\n\
         .badge.ok, .badge.baseline-created, .badge.baseline-updated { background: #2e7d32; }\n\
         .badge.ok-dimension-crop { background: #f9a825; }\n\
         .badge.diff, .badge.diff-dimension-crop { background: #c62828; }\n\
         .badge.error, .badge.launch-error, .badge.context-error { background: #6a1b9a; }\n\
         figure { display: inline-block; margin: 0.5rem 1rem 0 0; vertical-align: top; }\n\
         figcaption { font-size: 0.8rem; color: #555; }\n\
         img { max-width: 320px; border: 1px solid #ccc; }\n\
         .detail { color: #555; font-size: 0.9rem; }\n\
         </style>\n</head>\n<body>\n<h1>Visual regression report</h1>\n",
    );

    for record in records {
        let _ = writeln!(
            html,
            "<div class=\"card\">\n<h2>{} <span class=\"badge {}\">{}</span></h2>",
            escape(&record.shot),
            record.status.as_str(),
            record.status.as_str()
        );

        if let Some(mismatches) = record.mismatches {
            let _ = writeln!(
                html,
                "<p class=\"detail\">{mismatches} mismatching pixel(s)</p>"
            );
        }
        if record.has_dimension_mismatch() {
            if let (Some(base), Some(cur)) = (record.baseline_size, record.current_size) {
                let _ = writeln!(
                    html,
                    "<p class=\"detail\">dimension drift: baseline {base}, current {cur}; compared over the intersection</p>"
                );
            }
        }
        if let Some(error) = &record.error {
            let _ = writeln!(html, "<p class=\"detail\">{}</p>", escape(error));
        }

        let baseline_path = config.baseline_dir.join(&record.shot);
        if baseline_path.is_file() {
            let href = relative_to(&config.output_dir, &baseline_path);
            let _ = writeln!(
                html,
                "<figure><img src=\"{}\" alt=\"baseline\"><figcaption>baseline</figcaption></figure>",
                escape(&href.to_string_lossy())
            );
        }
        if record.file.is_some() {
            let _ = writeln!(
                html,
                "<figure><img src=\"{}\" alt=\"current\"><figcaption>current</figcaption></figure>",
                escape(&record.shot)
            );
        }
        if record.diff_artifact.is_some() {
            let _ = writeln!(
                html,
                "<figure><img src=\"{}\" alt=\"diff\"><figcaption>diff</figcaption></figure>",
                escape(&record.shot.replace(".png", ".diff.png"))
            );
        }
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

pub fn write_report(path: &Path, records: &[CaptureRecord], config: &HarnessConfig) -> Result<()> {
    std::fs::write(path, render_report(records, config))?;
    Ok(())
}

/// Best-effort relative path from `from_dir` to `target`; falls back to the
/// target as given when the two share no prefix to walk.
fn relative_to(from_dir: &Path, target: &Path) -> PathBuf {
    let from: Vec<Component> = from_dir.components().collect();
    let to: Vec<Component> = target.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 && from.first().map(|c| matches!(c, Component::RootDir)) != Some(true) {
        return target.to_path_buf();
    }

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component.as_os_str());
    }
    out
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
