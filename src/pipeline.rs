//! RFM -> segmentation -> risk selection -> label merge, composed end to end

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::{validate_transactions, TransactionRecord};
use crate::error::{Result, RiskError};
use crate::labeler::{assign_high_risk, ClusterSummary, CustomerRisk};
use crate::merge::{merge_target, LabeledTransaction, MergeWarning};
use crate::model::{segment_customers, SegmentModel};
use crate::rfm::{calculate_rfm, default_snapshot};

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub snapshot: DateTime<Utc>,
    /// CustomerId, recency, frequency, monetary, cluster, is_high_risk
    pub customers: Vec<CustomerRisk>,
    /// Transactions in input order with the label attached
    pub transactions: Vec<LabeledTransaction>,
    pub summary: Vec<ClusterSummary>,
    pub high_risk_cluster: usize,
    pub warnings: Vec<MergeWarning>,
    pub model: SegmentModel,
}

/// Run the full labelling pipeline over an in-memory transaction table
pub fn run_pipeline(
    transactions: &[TransactionRecord],
    config: &PipelineConfig,
) -> Result<PipelineOutput> {
    config.validate()?;
    validate_transactions(transactions)?;

    let snapshot = match config.snapshot {
        Some(ts) => ts,
        None => default_snapshot(transactions).ok_or(RiskError::EmptyDataset)?,
    };

    let rfm = calculate_rfm(transactions, Some(snapshot))?;
    let (clustered, model) = segment_customers(&rfm, config)?;
    let assessment = assign_high_risk(&clustered)?;
    let merged = merge_target(transactions, &assessment.labels());

    info!(
        customers = assessment.customers.len(),
        high_risk_customers = assessment.high_risk_count(),
        high_risk_cluster = assessment.high_risk_cluster,
        warnings = merged.warnings.len(),
        "pipeline complete"
    );

    Ok(PipelineOutput {
        snapshot,
        customers: assessment.customers,
        transactions: merged.rows,
        summary: assessment.summary,
        high_risk_cluster: assessment.high_risk_cluster,
        warnings: merged.warnings,
        model,
    })
}
