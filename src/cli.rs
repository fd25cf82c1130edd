//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;

use crate::config::{
    PipelineConfig, DEFAULT_CLUSTERS, DEFAULT_MAX_ITERS, DEFAULT_SEED, DEFAULT_TOLERANCE,
};
use crate::data::parse_timestamp;

/// Derive a proxy high-risk label from RFM customer segmentation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input transactions CSV
    #[arg(short, long, default_value = "data/raw/transactions.csv")]
    pub input: PathBuf,

    /// Output path for the per-customer RFM / label table
    #[arg(long, default_value = "data/processed/rfm_labels.csv")]
    pub rfm_output: PathBuf,

    /// Output path for the transactions with `is_high_risk` appended
    #[arg(short, long, default_value = "data/processed/transactions_with_target.csv")]
    pub output: PathBuf,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value_t = DEFAULT_CLUSTERS)]
    pub clusters: usize,

    /// Seed for centroid initialisation
    #[arg(short, long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Snapshot date for recency (defaults to one day after the latest transaction)
    /// Example: --snapshot 2025-12-05
    #[arg(long)]
    pub snapshot: Option<String>,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value_t = DEFAULT_MAX_ITERS)]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,

    /// Optional PNG path for the segment scatter plot
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the snapshot argument, if any
    pub fn parse_snapshot(&self) -> crate::Result<Option<DateTime<Utc>>> {
        match self.snapshot.as_deref() {
            Some(raw) => parse_timestamp(raw)
                .map(Some)
                .ok_or_else(|| crate::RiskError::schema(format!("invalid snapshot date `{raw}`"))),
            None => Ok(None),
        }
    }

    pub fn pipeline_config(&self) -> crate::Result<PipelineConfig> {
        let config = PipelineConfig {
            n_clusters: self.clusters,
            seed: self.seed,
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            snapshot: self.parse_snapshot()?,
        };
        config.validate()?;
        Ok(config)
    }
}
