//! RiskForge: proxy high-risk labelling via RFM segmentation
//!
//! This is the main entrypoint that loads transactions, runs the labelling
//! pipeline and writes the customer and transaction tables.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use riskforge::{data, load_transactions, run_pipeline, viz, Args, PipelineOutput};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.pipeline_config().context("invalid pipeline parameters")?;
    let start_time = Instant::now();

    info!(input = %args.input.display(), "loading transactions");
    let table = load_transactions(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;

    let output = run_pipeline(&table.records, &config)?;
    report(&output);

    ensure_parent(&args.rfm_output)?;
    data::write_customer_table(&output.customers, &args.rfm_output)?;

    ensure_parent(&args.output)?;
    data::write_labeled_transactions(&table.frame, &output.transactions, &args.output)?;

    if let Some(plot_path) = &args.plot {
        ensure_parent(plot_path)?;
        viz::generate_visualization_report(&output.model, output.high_risk_cluster, plot_path)?;
    }

    info!(
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        rfm_output = %args.rfm_output.display(),
        output = %args.output.display(),
        "target variable engineering completed"
    );
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Log cluster statistics for the run
fn report(output: &PipelineOutput) {
    let total = output.customers.len();
    info!(snapshot = %output.snapshot, customers = total, "cluster statistics");

    for summary in &output.summary {
        info!(
            cluster = summary.cluster,
            size = summary.size,
            share_pct = summary.size as f64 / total as f64 * 100.0,
            mean_recency = summary.mean_recency,
            mean_frequency = summary.mean_frequency,
            mean_monetary = summary.mean_monetary,
            high_risk = summary.cluster == output.high_risk_cluster,
            "segment"
        );
    }
    for cluster in output.model.empty_clusters() {
        warn!(cluster, "cluster received no customers");
    }

    info!(
        inertia = output.model.inertia,
        silhouette = output.model.silhouette_sample(100),
        "clustering quality"
    );
    for warning in &output.warnings {
        warn!("{warning}");
    }
}
