//! Transaction ingestion and CSV output using Polars

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{Result, RiskError};
use crate::labeler::CustomerRisk;
use crate::merge::LabeledTransaction;

pub const COL_TRANSACTION_ID: &str = "TransactionId";
pub const COL_CUSTOMER_ID: &str = "CustomerId";
pub const COL_AMOUNT: &str = "Amount";
pub const COL_START_TIME: &str = "TransactionStartTime";
pub const COL_IS_HIGH_RISK: &str = "is_high_risk";

/// One row of the transaction table
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub start_time: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        transaction_id: impl Into<String>,
        customer_id: impl Into<String>,
        amount: f64,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            customer_id: customer_id.into(),
            amount,
            start_time,
        }
    }
}

/// Transaction table as loaded from disk: the untouched frame (every
/// original column) plus the typed view the pipeline consumes
#[derive(Debug, Clone)]
pub struct TransactionTable {
    pub frame: DataFrame,
    pub records: Vec<TransactionRecord>,
}

/// Parse a timestamp in RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`
/// or `YYYY-MM-DD` form. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Check the row-level invariants of a transaction table before any aggregation
pub fn validate_transactions(transactions: &[TransactionRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(transactions.len());

    for (row, tx) in transactions.iter().enumerate() {
        if tx.customer_id.trim().is_empty() {
            return Err(RiskError::validation(row, "empty CustomerId"));
        }
        if !tx.amount.is_finite() {
            return Err(RiskError::validation(
                row,
                format!("non-numeric Amount {} for {}", tx.amount, tx.transaction_id),
            ));
        }
        if !seen.insert(tx.transaction_id.as_str()) {
            return Err(RiskError::validation(
                row,
                format!("duplicate TransactionId {}", tx.transaction_id),
            ));
        }
    }

    Ok(())
}

/// Load a transaction CSV and convert it into typed records
///
/// # Arguments
/// * `file_path` - Path to a CSV with at least TransactionId, CustomerId,
///   Amount and TransactionStartTime columns
///
/// # Returns
/// * `TransactionTable` holding the original frame and the parsed records
pub fn load_transactions(file_path: impl AsRef<Path>) -> Result<TransactionTable> {
    let path = file_path.as_ref();
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    info!(path = %path.display(), rows = frame.height(), "loaded transaction file");

    let records = transactions_from_frame(&frame)?;
    validate_transactions(&records)?;

    Ok(TransactionTable { frame, records })
}

/// Convert a frame into typed records, failing on the first malformed row
pub fn transactions_from_frame(frame: &DataFrame) -> Result<Vec<TransactionRecord>> {
    let ids = string_column(frame, COL_TRANSACTION_ID)?;
    let customers = string_column(frame, COL_CUSTOMER_ID)?;
    let times = string_column(frame, COL_START_TIME)?;

    let amounts = required_column(frame, COL_AMOUNT)?.cast(&DataType::Float64)?;
    let amounts = amounts.f64()?;

    let mut records = Vec::with_capacity(frame.height());
    for (row, (((id, customer), amount), time)) in ids
        .str()?
        .into_iter()
        .zip(customers.str()?.into_iter())
        .zip(amounts.into_iter())
        .zip(times.str()?.into_iter())
        .enumerate()
    {
        let id = id.ok_or_else(|| RiskError::validation(row, "missing TransactionId"))?;
        let customer = customer.ok_or_else(|| RiskError::validation(row, "missing CustomerId"))?;
        let amount = amount
            .ok_or_else(|| RiskError::validation(row, "Amount is missing or non-numeric"))?;
        let raw_time =
            time.ok_or_else(|| RiskError::validation(row, "missing TransactionStartTime"))?;
        let start_time = parse_timestamp(raw_time).ok_or_else(|| {
            RiskError::validation(row, format!("unparseable TransactionStartTime `{raw_time}`"))
        })?;

        records.push(TransactionRecord::new(id, customer, amount, start_time));
    }

    debug!(records = records.len(), "parsed transaction records");
    Ok(records)
}

fn required_column<'a>(frame: &'a DataFrame, name: &str) -> Result<&'a Series> {
    frame
        .column(name)
        .map_err(|_| RiskError::schema(format!("missing required column `{name}`")))
}

fn string_column(frame: &DataFrame, name: &str) -> Result<Series> {
    Ok(required_column(frame, name)?.cast(&DataType::String)?)
}

/// Build the per-customer output table
/// (CustomerId, recency, frequency, monetary, cluster, is_high_risk)
pub fn customer_frame(customers: &[CustomerRisk]) -> Result<DataFrame> {
    let ids: Vec<&str> = customers.iter().map(|c| c.customer_id.as_str()).collect();
    let recency: Vec<i64> = customers.iter().map(|c| c.recency).collect();
    let frequency: Vec<i64> = customers.iter().map(|c| c.frequency as i64).collect();
    let monetary: Vec<f64> = customers.iter().map(|c| c.monetary).collect();
    let cluster: Vec<i64> = customers.iter().map(|c| c.cluster as i64).collect();
    let is_high_risk: Vec<i32> = customers.iter().map(|c| c.is_high_risk as i32).collect();

    Ok(polars::df!(
        COL_CUSTOMER_ID => ids,
        "recency" => recency,
        "frequency" => frequency,
        "monetary" => monetary,
        "cluster" => cluster,
        COL_IS_HIGH_RISK => is_high_risk
    )?)
}

/// Append `is_high_risk` to the original frame; missing labels become nulls
///
/// A frame that already carries an `is_high_risk` column is rejected rather
/// than having its values replaced.
pub fn labeled_frame(frame: &DataFrame, rows: &[LabeledTransaction]) -> Result<DataFrame> {
    if frame.get_column_names().contains(&COL_IS_HIGH_RISK) {
        return Err(RiskError::schema(format!(
            "input already has an '{COL_IS_HIGH_RISK}' column"
        )));
    }
    if frame.height() != rows.len() {
        return Err(RiskError::schema(format!(
            "frame has {} rows but {} labeled transactions were supplied",
            frame.height(),
            rows.len()
        )));
    }

    let labels: Vec<Option<i32>> = rows
        .iter()
        .map(|row| row.is_high_risk.map(i32::from))
        .collect();

    let mut out = frame.clone();
    out.with_column(Series::new(COL_IS_HIGH_RISK, labels))?;
    Ok(out)
}

/// Write the per-customer RFM/label table to CSV
pub fn write_customer_table(
    customers: &[CustomerRisk],
    output_path: impl AsRef<Path>,
) -> Result<()> {
    let mut frame = customer_frame(customers)?;
    write_csv(&mut frame, output_path.as_ref())
}

/// Write the transaction table with `is_high_risk` appended to CSV
pub fn write_labeled_transactions(
    frame: &DataFrame,
    rows: &[LabeledTransaction],
    output_path: impl AsRef<Path>,
) -> Result<()> {
    let mut out = labeled_frame(frame, rows)?;
    write_csv(&mut out, output_path.as_ref())
}

fn write_csv(frame: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(frame)?;
    info!(path = %path.display(), rows = frame.height(), "wrote CSV");
    Ok(())
}
