//! Left join of customer labels onto the transaction table

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{info, warn};

use crate::data::TransactionRecord;

/// A transaction with its customer's proxy label; `None` when the customer was never labelled
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTransaction {
    pub transaction: TransactionRecord,
    pub is_high_risk: Option<bool>,
}

/// Non-fatal: a customer appears in the transactions but has no label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeWarning {
    pub customer_id: String,
    /// Number of transaction rows left unlabelled for this customer
    pub rows: usize,
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "customer {} has no risk label ({} transaction rows left missing)",
            self.customer_id, self.rows
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeOutcome {
    /// Same length and order as the input transactions
    pub rows: Vec<LabeledTransaction>,
    /// One entry per unlabelled customer, ordered by CustomerId
    pub warnings: Vec<MergeWarning>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Attach `is_high_risk` to every transaction without adding or dropping rows
pub fn merge_target(
    transactions: &[TransactionRecord],
    labels: &BTreeMap<String, bool>,
) -> MergeOutcome {
    let mut missing: BTreeMap<&str, usize> = BTreeMap::new();

    let rows: Vec<LabeledTransaction> = transactions
        .iter()
        .map(|tx| {
            let is_high_risk = labels.get(&tx.customer_id).copied();
            if is_high_risk.is_none() {
                *missing.entry(tx.customer_id.as_str()).or_insert(0) += 1;
            }
            LabeledTransaction {
                transaction: tx.clone(),
                is_high_risk,
            }
        })
        .collect();

    let warnings: Vec<MergeWarning> = missing
        .into_iter()
        .map(|(customer_id, rows)| MergeWarning {
            customer_id: customer_id.to_string(),
            rows,
        })
        .collect();

    for warning in &warnings {
        warn!(
            customer = %warning.customer_id,
            rows = warning.rows,
            "customer missing from risk labels"
        );
    }

    let labeled_customers: BTreeSet<&str> = transactions
        .iter()
        .filter(|tx| labels.contains_key(&tx.customer_id))
        .map(|tx| tx.customer_id.as_str())
        .collect();
    info!(
        rows = rows.len(),
        labeled_customers = labeled_customers.len(),
        unlabeled_customers = warnings.len(),
        "target variable merged with transactions"
    );

    MergeOutcome { rows, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn transactions() -> Vec<TransactionRecord> {
        let ts = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        vec![
            TransactionRecord::new("1", "101", 100.0, ts),
            TransactionRecord::new("2", "101", 200.0, ts),
            TransactionRecord::new("3", "102", 150.0, ts),
            TransactionRecord::new("4", "103", 300.0, ts),
            TransactionRecord::new("5", "103", 400.0, ts),
        ]
    }

    fn labels(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
        pairs.iter().map(|(id, flag)| (id.to_string(), *flag)).collect()
    }

    #[test]
    fn test_merge_preserves_rows_and_order() {
        let txs = transactions();
        let outcome = merge_target(&txs, &labels(&[("101", false), ("102", true), ("103", false)]));

        assert_eq!(outcome.rows.len(), txs.len());
        assert!(outcome.is_clean());
        for (row, tx) in outcome.rows.iter().zip(&txs) {
            assert_eq!(&row.transaction, tx);
        }
        let flags: Vec<Option<bool>> = outcome.rows.iter().map(|r| r.is_high_risk).collect();
        assert_eq!(
            flags,
            vec![Some(false), Some(false), Some(true), Some(false), Some(false)]
        );
    }

    #[test]
    fn test_missing_label_is_warning_not_error() {
        let txs = transactions();
        let outcome = merge_target(&txs, &labels(&[("101", true), ("102", false)]));

        assert_eq!(outcome.rows.len(), 5);
        assert_eq!(outcome.rows[3].is_high_risk, None);
        assert_eq!(outcome.rows[4].is_high_risk, None);
        assert_eq!(
            outcome.warnings,
            vec![MergeWarning {
                customer_id: "103".to_string(),
                rows: 2
            }]
        );
        assert!(outcome.warnings[0].to_string().contains("103"));
    }

    #[test]
    fn test_extra_labels_do_not_add_rows() {
        let txs = transactions();
        let outcome = merge_target(
            &txs,
            &labels(&[("101", false), ("102", true), ("103", false), ("999", true)]),
        );
        assert_eq!(outcome.rows.len(), 5);
        assert!(outcome.is_clean());
    }
}
