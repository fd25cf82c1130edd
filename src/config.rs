//! Run parameters for the labelling pipeline

use chrono::{DateTime, Utc};

use crate::error::{Result, RiskError};

pub const DEFAULT_CLUSTERS: usize = 3;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_MAX_ITERS: usize = 300;
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Parameters shared by the segmenter and the pipeline driver
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Number of behavioural segments
    pub n_clusters: usize,
    /// Seed for centroid initialisation
    pub seed: u64,
    /// Upper bound on K-Means iterations
    pub max_iters: usize,
    /// Inertia change below which K-Means stops
    pub tolerance: f64,
    /// Reference date for recency; `None` means one day after the latest transaction
    pub snapshot: Option<DateTime<Utc>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            seed: DEFAULT_SEED,
            max_iters: DEFAULT_MAX_ITERS,
            tolerance: DEFAULT_TOLERANCE,
            snapshot: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_snapshot(mut self, snapshot: DateTime<Utc>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Reject parameter combinations that cannot drive a clustering run.
    /// The k-versus-customers check happens in the segmenter once the data is known.
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters < 2 {
            return Err(RiskError::clustering(format!(
                "number of clusters must be at least 2, got {}",
                self.n_clusters
            )));
        }
        if self.max_iters == 0 {
            return Err(RiskError::clustering("max_iters must be positive"));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(RiskError::clustering(format!(
                "tolerance must be a positive finite number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}
