//! High-risk segment selection and per-customer proxy labels

use std::cmp::Ordering;
use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::info;

use crate::error::{Result, RiskError};
use crate::model::ClusteredCustomer;

/// Mean behaviour of one non-empty cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
}

/// Final per-customer row: RFM, segment and proxy label
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRisk {
    pub customer_id: String,
    pub recency: i64,
    pub frequency: usize,
    pub monetary: f64,
    pub cluster: usize,
    pub is_high_risk: bool,
}

/// Output of the labeller, including the audit trail of the selection
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub customers: Vec<CustomerRisk>,
    /// Non-empty clusters ordered by cluster id
    pub summary: Vec<ClusterSummary>,
    pub high_risk_cluster: usize,
}

impl RiskAssessment {
    /// CustomerId -> is_high_risk relation
    pub fn labels(&self) -> BTreeMap<String, bool> {
        self.customers
            .iter()
            .map(|c| (c.customer_id.clone(), c.is_high_risk))
            .collect()
    }

    pub fn high_risk_count(&self) -> usize {
        self.customers.iter().filter(|c| c.is_high_risk).count()
    }
}

/// Per-cluster means over the clusters that actually have members
pub fn summarize_clusters(customers: &[ClusteredCustomer]) -> Result<Vec<ClusterSummary>> {
    let cluster: Vec<i64> = customers.iter().map(|c| c.cluster as i64).collect();
    let recency: Vec<i64> = customers.iter().map(|c| c.rfm.recency).collect();
    let frequency: Vec<i64> = customers.iter().map(|c| c.rfm.frequency as i64).collect();
    let monetary: Vec<f64> = customers.iter().map(|c| c.rfm.monetary).collect();

    let summary_df = polars::df!(
        "cluster" => cluster,
        "recency" => recency,
        "frequency" => frequency,
        "monetary" => monetary
    )?
    .lazy()
    .group_by([col("cluster")])
    .agg([
        col("recency").count().cast(DataType::Int64).alias("size"),
        col("recency").cast(DataType::Float64).mean().alias("mean_recency"),
        col("frequency").cast(DataType::Float64).mean().alias("mean_frequency"),
        col("monetary").mean().alias("mean_monetary"),
    ])
    .sort(["cluster"], SortMultipleOptions::default())
    .collect()?;

    let clusters = summary_df.column("cluster")?.i64()?;
    let sizes = summary_df.column("size")?.i64()?;
    let recency = summary_df.column("mean_recency")?.f64()?;
    let frequency = summary_df.column("mean_frequency")?.f64()?;
    let monetary = summary_df.column("mean_monetary")?.f64()?;

    clusters
        .into_iter()
        .zip(sizes.into_iter())
        .zip(recency.into_iter())
        .zip(frequency.into_iter())
        .zip(monetary.into_iter())
        .enumerate()
        .map(|(row, ((((cluster, size), recency), frequency), monetary))| {
            match (cluster, size, recency, frequency, monetary) {
                (Some(cluster), Some(size), Some(recency), Some(frequency), Some(monetary)) => {
                    Ok(ClusterSummary {
                        cluster: cluster as usize,
                        size: size as usize,
                        mean_recency: recency,
                        mean_frequency: frequency,
                        mean_monetary: monetary,
                    })
                }
                _ => Err(RiskError::validation(row, "incomplete cluster aggregate")),
            }
        })
        .collect()
}

/// Least engaged first: lowest mean frequency, then lowest mean monetary,
/// then lowest cluster id. Recency does not participate.
fn engagement_order(a: &ClusterSummary, b: &ClusterSummary) -> Ordering {
    a.mean_frequency
        .total_cmp(&b.mean_frequency)
        .then_with(|| a.mean_monetary.total_cmp(&b.mean_monetary))
        .then_with(|| a.cluster.cmp(&b.cluster))
}

/// Pick the single high-risk cluster from a summary
pub fn select_high_risk_cluster(summary: &[ClusterSummary]) -> Result<&ClusterSummary> {
    summary
        .iter()
        .min_by(|a, b| engagement_order(a, b))
        .ok_or_else(|| {
            RiskError::clustering("no populated clusters to select a high-risk segment from")
        })
}

/// Label every customer of the least-engaged cluster as high risk
pub fn assign_high_risk(customers: &[ClusteredCustomer]) -> Result<RiskAssessment> {
    if customers.is_empty() {
        return Err(RiskError::EmptyDataset);
    }

    let summary = summarize_clusters(customers)?;
    let selected = select_high_risk_cluster(&summary)?;
    let high_risk_cluster = selected.cluster;

    info!(
        cluster = high_risk_cluster,
        size = selected.size,
        mean_recency = selected.mean_recency,
        mean_frequency = selected.mean_frequency,
        mean_monetary = selected.mean_monetary,
        "high-risk cluster identified"
    );

    let customers = customers
        .iter()
        .map(|c| CustomerRisk {
            customer_id: c.rfm.customer_id.clone(),
            recency: c.rfm.recency,
            frequency: c.rfm.frequency,
            monetary: c.rfm.monetary,
            cluster: c.cluster,
            is_high_risk: c.cluster == high_risk_cluster,
        })
        .collect();

    Ok(RiskAssessment {
        customers,
        summary,
        high_risk_cluster,
    })
}
