//! Integration tests for RiskForge

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;

use riskforge::data::{write_customer_table, write_labeled_transactions};
use riskforge::{
    assign_high_risk, calculate_rfm, load_transactions, merge_target, run_pipeline,
    segment_customers, PipelineConfig, RiskError,
};
use tempfile::{tempdir, NamedTempFile};

/// Create a test CSV file with sample data
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "TransactionId,BatchId,AccountId,CustomerId,Amount,Value,ProductCategory,{}",
        "TransactionStartTime"
    )
    .unwrap();

    // Customer 101 - two purchases
    writeln!(file, "1,B1,A1,101,100,100,airtime,2025-12-01T00:00:00Z").unwrap();
    writeln!(file, "2,B2,A1,101,200,200,airtime,2025-12-02T00:00:00Z").unwrap();

    // Customer 102 - single purchase
    writeln!(file, "3,B3,A2,102,150,150,financial_services,2025-12-01T00:00:00Z").unwrap();

    // Customer 103 - recent, higher spend
    writeln!(file, "4,B4,A3,103,300,300,utility_bill,2025-12-03T00:00:00Z").unwrap();
    writeln!(file, "5,B5,A3,103,400,400,utility_bill,2025-12-04T00:00:00Z").unwrap();

    file
}

/// A larger population with two clearly separated behaviours
fn create_population_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "TransactionId,CustomerId,Amount,TransactionStartTime").unwrap();

    let mut tx = 0;
    // engaged customers: many transactions, large amounts, recent
    for customer in 0..5 {
        for day in 1..=20 {
            tx += 1;
            let amount = 500 + customer * 10;
            writeln!(file, "T{tx},E{customer},{amount},2025-11-{day:02} 10:00:00").unwrap();
        }
    }
    // dormant customers: one small transaction long ago
    for customer in 0..5 {
        tx += 1;
        let (amount, day) = (5 + customer, customer + 1);
        writeln!(file, "T{tx},D{customer},{amount},2025-06-0{day} 09:30:00").unwrap();
    }
    file
}

fn snapshot_config(k: usize) -> PipelineConfig {
    let snapshot = riskforge::data::parse_timestamp("2025-12-05").unwrap();
    PipelineConfig::default().with_clusters(k).with_snapshot(snapshot)
}

#[test]
fn test_rfm_scenario() {
    let test_file = create_test_csv();
    let table = load_transactions(test_file.path()).unwrap();

    let rfm = calculate_rfm(&table.records, snapshot_config(2).snapshot).unwrap();
    let rows: Vec<(&str, i64, usize, f64)> = rfm
        .iter()
        .map(|r| (r.customer_id.as_str(), r.recency, r.frequency, r.monetary))
        .collect();

    assert_eq!(
        rows,
        vec![("101", 3, 2, 300.0), ("102", 4, 1, 150.0), ("103", 1, 2, 700.0)]
    );
}

#[test]
fn test_component_chain() {
    let test_file = create_test_csv();
    let table = load_transactions(test_file.path()).unwrap();
    let config = snapshot_config(2);

    let rfm = calculate_rfm(&table.records, config.snapshot).unwrap();
    let (clustered, model) = segment_customers(&rfm, &config).unwrap();

    // every customer assigned, both clusters used
    assert_eq!(clustered.len(), 3);
    let ids: BTreeSet<usize> = clustered.iter().map(|c| c.cluster).collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(model.cluster_sizes().iter().sum::<usize>(), 3);

    let assessment = assign_high_risk(&clustered).unwrap();
    assert_eq!(assessment.customers.len(), 3);
    for customer in &assessment.customers {
        assert_eq!(customer.is_high_risk, customer.cluster == assessment.high_risk_cluster);
    }

    let merged = merge_target(&table.records, &assessment.labels());
    assert_eq!(merged.rows.len(), table.records.len());
    assert!(merged.is_clean());
}

#[test]
fn test_dormant_customers_are_high_risk() {
    let test_file = create_population_csv();
    let table = load_transactions(test_file.path()).unwrap();

    let output = run_pipeline(&table.records, &snapshot_config(2)).unwrap();
    assert_eq!(output.customers.len(), 10);

    for customer in &output.customers {
        let dormant = customer.customer_id.starts_with('D');
        assert_eq!(customer.is_high_risk, dormant, "customer {}", customer.customer_id);
    }
    assert_eq!(output.transactions.len(), 105);
}

#[test]
fn test_end_to_end_outputs() {
    let test_file = create_population_csv();
    let table = load_transactions(test_file.path()).unwrap();
    let output = run_pipeline(&table.records, &snapshot_config(3)).unwrap();

    let dir = tempdir().unwrap();
    let rfm_path = dir.path().join("rfm_labels.csv");
    let merged_path = dir.path().join("transactions_with_target.csv");

    write_customer_table(&output.customers, &rfm_path).unwrap();
    write_labeled_transactions(&table.frame, &output.transactions, &merged_path).unwrap();

    let rfm_csv = fs::read_to_string(&rfm_path).unwrap();
    let mut lines = rfm_csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "CustomerId,recency,frequency,monetary,cluster,is_high_risk"
    );
    assert_eq!(lines.count(), 10);

    let merged_csv = fs::read_to_string(&merged_path).unwrap();
    let mut lines = merged_csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "TransactionId,CustomerId,Amount,TransactionStartTime,is_high_risk"
    );
    assert_eq!(lines.count(), 105);
}

#[test]
fn test_pipeline_idempotent_bytes() {
    let test_file = create_population_csv();
    let table = load_transactions(test_file.path()).unwrap();
    let dir = tempdir().unwrap();

    let mut contents = Vec::new();
    for run in 0..2 {
        let output = run_pipeline(&table.records, &snapshot_config(3)).unwrap();
        let path = dir.path().join(format!("run{run}.csv"));
        write_labeled_transactions(&table.frame, &output.transactions, &path).unwrap();
        contents.push(fs::read(&path).unwrap());
    }

    assert_eq!(contents[0], contents[1]);
}

#[test]
fn test_missing_label_surfaces_warning() {
    let test_file = create_test_csv();
    let table = load_transactions(test_file.path()).unwrap();
    let config = snapshot_config(2);

    // label only the first two customers
    let rfm = calculate_rfm(&table.records[..3], config.snapshot).unwrap();
    let (clustered, _) = segment_customers(&rfm, &config).unwrap();
    let assessment = assign_high_risk(&clustered).unwrap();

    let merged = merge_target(&table.records, &assessment.labels());
    assert_eq!(merged.rows.len(), 5);
    assert_eq!(merged.warnings.len(), 1);
    assert_eq!(merged.warnings[0].customer_id, "103");
    assert!(merged.rows[3..].iter().all(|row| row.is_high_risk.is_none()));

    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.csv");
    write_labeled_transactions(&table.frame, &merged.rows, &path).unwrap();
    let csv = fs::read_to_string(&path).unwrap();
    // nulls are written as empty fields
    assert!(csv.lines().last().unwrap().ends_with(','));
}

#[test]
fn test_error_handling() {
    let test_file = create_test_csv();
    let table = load_transactions(test_file.path()).unwrap();

    // more clusters than customers
    let result = run_pipeline(&table.records, &snapshot_config(4));
    assert!(matches!(result, Err(RiskError::Clustering(_))));

    // fewer than two clusters
    let result = run_pipeline(&table.records, &snapshot_config(1));
    assert!(matches!(result, Err(RiskError::Clustering(_))));

    // no rows
    let result = run_pipeline(&[], &snapshot_config(2));
    assert!(matches!(result, Err(RiskError::EmptyDataset)));
}
