//! RiskForge: proxy credit-risk labels from customer behaviour
//!
//! Transactions are summarised into Recency/Frequency/Monetary metrics per
//! customer, customers are segmented with K-Means, the least engaged segment
//! is labelled high risk, and the label is merged back onto the transactions.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod labeler;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod rfm;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::{load_transactions, validate_transactions, TransactionRecord, TransactionTable};
pub use error::{Result, RiskError};
pub use labeler::{assign_high_risk, ClusterSummary, CustomerRisk, RiskAssessment};
pub use merge::{merge_target, LabeledTransaction, MergeOutcome, MergeWarning};
pub use model::{segment_customers, ClusteredCustomer, SegmentModel, StandardScaler};
pub use pipeline::{run_pipeline, PipelineOutput};
pub use rfm::{calculate_rfm, RfmRecord};
