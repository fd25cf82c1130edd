//! Recency / Frequency / Monetary aggregation per customer using Polars

use chrono::{DateTime, Duration, Utc};
use polars::prelude::*;
use tracing::{info, warn};

use crate::data::{
    validate_transactions, TransactionRecord, COL_AMOUNT, COL_CUSTOMER_ID, COL_TRANSACTION_ID,
};
use crate::error::{Result, RiskError};

const MILLIS_PER_DAY: i64 = 86_400_000;
const COL_START_MS: &str = "start_ms";
const COL_ELAPSED_MS: &str = "elapsed_ms";

/// Behavioural summary of one customer
#[derive(Debug, Clone, PartialEq)]
pub struct RfmRecord {
    pub customer_id: String,
    /// Whole days between the snapshot and the customer's last transaction
    pub recency: i64,
    /// Number of transactions
    pub frequency: usize,
    /// Sum of amounts; negative when refunds dominate
    pub monetary: f64,
}

impl RfmRecord {
    pub fn features(&self) -> [f64; 3] {
        [self.recency as f64, self.frequency as f64, self.monetary]
    }
}

/// Default snapshot: one day after the latest transaction in the whole table
pub fn default_snapshot(transactions: &[TransactionRecord]) -> Option<DateTime<Utc>> {
    transactions
        .iter()
        .map(|tx| tx.start_time)
        .max()
        .map(|latest| latest + Duration::days(1))
}

/// Transactions as a frame with timestamps in epoch milliseconds
fn transaction_frame(transactions: &[TransactionRecord]) -> Result<DataFrame> {
    let ids: Vec<&str> = transactions.iter().map(|tx| tx.transaction_id.as_str()).collect();
    let customers: Vec<&str> = transactions.iter().map(|tx| tx.customer_id.as_str()).collect();
    let amounts: Vec<f64> = transactions.iter().map(|tx| tx.amount).collect();
    let start_ms: Vec<i64> = transactions
        .iter()
        .map(|tx| tx.start_time.timestamp_millis())
        .collect();

    Ok(polars::df!(
        COL_TRANSACTION_ID => ids,
        COL_CUSTOMER_ID => customers,
        COL_AMOUNT => amounts,
        COL_START_MS => start_ms
    )?)
}

/// Reduce a transaction table to one RFM record per distinct customer
///
/// # Arguments
/// * `transactions` - Non-empty transaction table
/// * `snapshot` - Reference date for recency; defaults to [`default_snapshot`]
///
/// # Returns
/// * RFM records ordered by CustomerId
pub fn calculate_rfm(
    transactions: &[TransactionRecord],
    snapshot: Option<DateTime<Utc>>,
) -> Result<Vec<RfmRecord>> {
    if transactions.is_empty() {
        return Err(RiskError::EmptyDataset);
    }
    validate_transactions(transactions)?;

    let snapshot = match snapshot {
        Some(ts) => ts,
        None => default_snapshot(transactions).ok_or(RiskError::EmptyDataset)?,
    };
    let snapshot_ms = snapshot.timestamp_millis();

    let rfm_df = transaction_frame(transactions)?
        .lazy()
        .group_by([col(COL_CUSTOMER_ID)])
        .agg([
            // Recency: time since last purchase
            col(COL_START_MS).max().alias(COL_START_MS),
            // Frequency: number of transactions
            col(COL_TRANSACTION_ID).count().cast(DataType::Int64).alias("frequency"),
            // Monetary: total amount, refunds included
            col(COL_AMOUNT).sum().alias("monetary"),
        ])
        .with_columns([(lit(snapshot_ms) - col(COL_START_MS)).alias(COL_ELAPSED_MS)])
        .sort([COL_CUSTOMER_ID], SortMultipleOptions::default())
        .collect()?;

    let rfm = rfm_records(&rfm_df)?;

    let future = rfm.iter().filter(|r| r.recency < 0).count();
    if future > 0 {
        warn!(
            customers = future,
            %snapshot,
            "snapshot precedes last transaction; negative recency"
        );
    }

    info!(
        transactions = transactions.len(),
        customers = rfm.len(),
        %snapshot,
        "RFM metrics calculated"
    );
    Ok(rfm)
}

/// Convert the aggregated frame into records; recency is the floor of the
/// elapsed milliseconds in days
fn rfm_records(rfm_df: &DataFrame) -> Result<Vec<RfmRecord>> {
    let ids = rfm_df.column(COL_CUSTOMER_ID)?.str()?;
    let elapsed = rfm_df.column(COL_ELAPSED_MS)?.i64()?;
    let frequency = rfm_df.column("frequency")?.i64()?;
    let monetary = rfm_df.column("monetary")?.f64()?;

    ids.into_iter()
        .zip(elapsed.into_iter())
        .zip(frequency.into_iter())
        .zip(monetary.into_iter())
        .enumerate()
        .map(|(row, (((id, elapsed), frequency), monetary))| {
            match (id, elapsed, frequency, monetary) {
                (Some(id), Some(elapsed), Some(frequency), Some(monetary)) => Ok(RfmRecord {
                    customer_id: id.to_string(),
                    recency: elapsed.div_euclid(MILLIS_PER_DAY),
                    frequency: frequency as usize,
                    monetary,
                }),
                _ => Err(RiskError::validation(row, "incomplete RFM aggregate")),
            }
        })
        .collect()
}
