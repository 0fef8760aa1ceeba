use crate::baseline::RunTally;
use crate::capture::CaptureRecord;
use crate::config::HarnessConfig;

/// Maps the aggregate run state to a process exit code. Deterministic
/// precedence, first match wins:
///
/// 1. CI mode with newly created baselines exits 2: missing baselines must
///    be generated and committed, never silently accepted by CI.
/// 2. Strict-error mode with any error-class record exits 1.
/// 3. Any diff-class record exits 1.
/// 4. Dimension-mismatch hard-fail with any drifted record exits 1.
/// 5. Otherwise 0, warning when unflagged dimension drift remains.
pub fn exit_code_for_run(
    records: &[CaptureRecord],
    tally: &RunTally,
    config: &HarnessConfig,
) -> u8 {
    if config.ci && tally.created_baselines > 0 {
        eprintln!(
            "[CI] {} new baseline(s) were created during this run. Generate them locally \
             (re-run with --update) and commit {} before CI can pass.",
            tally.created_baselines,
            config.baseline_dir.display()
        );
        return 2;
    }

    if config.strict_errors {
        let errors: Vec<&str> = records
            .iter()
            .filter(|r| r.status.is_error())
            .map(|r| r.shot.as_str())
            .collect();
        if !errors.is_empty() {
            eprintln!("Capture errors (strict mode): {}", errors.join(", "));
            return 1;
        }
    }

    let diffs: Vec<&str> = records
        .iter()
        .filter(|r| r.status.is_diff())
        .map(|r| r.shot.as_str())
        .collect();
    if !diffs.is_empty() {
        eprintln!("Visual differences detected: {}", diffs.join(", "));
        return 1;
    }

    let drifted = records
        .iter()
        .filter(|r| r.has_dimension_mismatch())
        .count();
    if drifted > 0 {
        if config.fail_on_dimension_mismatch {
            eprintln!("{drifted} shot(s) drifted in dimensions (hard-fail enabled)");
            return 1;
        }
        eprintln!(
            "Warning: {drifted} shot(s) compared over a cropped intersection due to dimension drift"
        );
    }

    0
}
