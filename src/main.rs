mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use vrt_lib::{
    build_digest, build_summary, exit_code_for_run, resolve_browsers, resolve_scenarios,
    run_matrix, write_json_pretty, write_report, HarnessConfig, Progress, ScenarioOptions,
    MOCK_CAPTURE_ENV,
};

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();

    let config = resolve_config(&args);
    if let Err(err) = config.validate() {
        eprintln!("Error: {err}");
        return ExitCode::from(1);
    }

    let scenarios = resolve_scenarios(&ScenarioOptions {
        extended: args.extended_scenarios,
        extra: args.viewports.clone(),
        filter: args.scenarios.clone(),
    });

    let browsers = match resolve_browsers(&args.browsers) {
        Ok(targets) => targets,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(1);
        }
    };

    let progress: Progress = if args.verbose {
        Some(Arc::new(|msg: &str| eprintln!("{msg}")))
    } else {
        None
    };

    let outcome = match run_matrix(&config, &browsers, &scenarios, progress).await {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(1);
        }
    };

    let summary = build_summary(&config, &outcome.records, &outcome.tally);
    let digest = build_digest(&outcome.records);
    let write_result = write_json_pretty(&config.output_dir.join("summary.json"), &summary)
        .and_then(|_| write_json_pretty(&config.output_dir.join("ci-digest.json"), &digest))
        .and_then(|_| {
            write_report(
                &config.output_dir.join("report.html"),
                &outcome.records,
                &config,
            )
        });
    if let Err(err) = write_result {
        eprintln!("Error: failed to write run outputs: {err}");
        return ExitCode::from(1);
    }

    eprintln!("{}", digest.one_liner(outcome.records.len()));
    ExitCode::from(exit_code_for_run(
        &outcome.records,
        &outcome.tally,
        &config,
    ))
}

/// Consolidates flags and the environment into the one configuration object
/// the rest of the run reads. `CI=true` and `UPDATE_BASELINE=1` keep working
/// as they did for the npm-era callers of this harness.
fn resolve_config(args: &cli::Cli) -> HarnessConfig {
    let env_truthy = |name: &str, value: &str| {
        std::env::var(name).map(|v| v == value).unwrap_or(false)
    };

    HarnessConfig {
        index: args.index.clone(),
        baseline_dir: args.baseline_dir.clone(),
        output_dir: args.output_dir.clone(),
        update_baselines: args.update || env_truthy("UPDATE_BASELINE", "1"),
        ci: args.ci || env_truthy("CI", "true"),
        full_page: args.full_page.into(),
        threshold: args.threshold,
        shot_timeout_ms: args.shot_timeout,
        nav_timeout: Duration::from_secs(args.nav_timeout),
        idle_timeout: Duration::from_secs(args.idle_timeout),
        block_fonts: args.block_fonts,
        force_viewport: args.force_viewport,
        fail_on_dimension_mismatch: args.fail_on_dimension_mismatch,
        quick: args.quick,
        settle_ms: args.settle_ms,
        strict_errors: args.strict_errors,
        disable_device_scale: args.no_device_scale,
        node_command: args.node.clone(),
        mock_capture_dir: std::env::var_os(MOCK_CAPTURE_ENV).map(PathBuf::from),
    }
}
