//! Error types shared by every pipeline stage

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("empty dataset: no transactions to aggregate")]
    EmptyDataset,

    #[error("clustering error: {0}")]
    Clustering(String),

    #[error("validation error at row {row}: {message}")]
    Validation { row: usize, message: String },

    #[error("validation error: {0}")]
    Schema(String),

    #[error("k-means fit failed: {0}")]
    KMeans(#[from] linfa_clustering::KMeansError),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plot error: {0}")]
    Plot(String),
}

impl RiskError {
    pub fn clustering(msg: impl Into<String>) -> Self {
        Self::Clustering(msg.into())
    }

    pub fn validation(row: usize, msg: impl Into<String>) -> Self {
        Self::Validation {
            row,
            message: msg.into(),
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// True for the malformed-input family (row or column level).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Schema(_))
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;
