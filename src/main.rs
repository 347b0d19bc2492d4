use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::time::Instant;

use sweep_common::SweepConfig;
use sweep_engine::export::{write_agent_csv, write_model_csv, write_summary};
use sweep_engine::report::{build_summary, ReportSpec};
use sweep_engine::{merge_outcome, run_sweep, ProxyModelFactory, SimulationFactory, SweepOutcome, SweepSpec, WrapInterval};

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Sweep Engine...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "sweep.toml".to_string());
    let config = SweepConfig::load(&config_path)?;
    debug!("Sweep configuration: {:#?}", config);

    let spec = SweepSpec::from_config(&config)?;
    let interval = WrapInterval::new(config.output.angle_lo, config.output.angle_hi)?;
    info!("Execution: {}.", spec.execution);
    info!(
        "Planned {} runs of {} steps (recording every {} steps).",
        spec.run_count(),
        spec.steps,
        spec.step_interval
    );

    // --- Run the Sweep ---
    let start_time = Instant::now();
    let outcome = run_configured_sweep(&spec, &ProxyModelFactory)?;
    let total_duration = start_time.elapsed();
    info!(
        "Sweep finished in {:.3} seconds ({} of {} runs completed).",
        total_duration.as_secs_f64(),
        outcome.runs.len(),
        outcome.planned_runs
    );
    for failure in &outcome.failures {
        warn!("Run {} (swept {:?}) excluded: {}", failure.run_id, failure.swept, failure.error);
    }

    // --- Merge and Aggregate ---
    let tables = merge_outcome(&outcome)?;
    let summary = build_summary(&tables, &outcome, &ReportSpec::proxy_model(interval))?;
    if !summary.is_complete() {
        warn!("Summary is incomplete: {} runs failed.", summary.failed_runs.len());
    }

    // --- Save Recorded Data ---
    let base = &config.output.base_filename;
    if config.output.save_tables {
        write_model_csv(&tables.model, format!("{base}_model.csv"))?;
        write_agent_csv(&tables.agent, format!("{base}_agents.csv"))?;
    } else {
        info!("Skipping saving tables as per config (save_tables is false).");
    }

    if config.output.save_summary {
        write_summary(&summary, base, config.output.format.as_deref())?;
    } else {
        info!("Skipping saving summary as per config (save_summary is false).");
    }

    info!("Sweep Complete.");
    Ok(())
}

/// Runs the sweep, keeping the underlying error as the cause of the abort.
fn run_configured_sweep<F: SimulationFactory>(spec: &SweepSpec, factory: &F) -> Result<SweepOutcome> {
    run_sweep(spec, factory)
        .inspect_err(|e| error!("Sweep failed ({:?}): {}", e.kind(), e))
        .context("Sweep aborted")
}
