//! Standardisation and K-Means segmentation of RFM features

use std::collections::BTreeSet;

use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{Result, RiskError};
use crate::rfm::RfmRecord;

pub const N_FEATURES: usize = 3;

/// Column-wise z-score scaler (population standard deviation)
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Per-column divisor; zero-variance columns use 1.0 so they scale to 0
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>) -> Self {
        let n = features.nrows().max(1) as f64;
        let mean = features.sum_axis(Axis(0)) / n;
        let variance = features
            .rows()
            .into_iter()
            .fold(Array1::zeros(features.ncols()), |acc: Array1<f64>, row| {
                let centered = &row - &mean;
                acc + &centered * &centered
            })
            / n;
        let scale = variance.mapv(|v| {
            let std = v.sqrt();
            if std > 0.0 && std.is_finite() {
                std
            } else {
                1.0
            }
        });

        Self { mean, scale }
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        (features - &self.mean) / &self.scale
    }

    pub fn transform_row(&self, row: &[f64; N_FEATURES]) -> Array1<f64> {
        (ArrayView1::from(&row[..]).to_owned() - &self.mean) / &self.scale
    }
}

/// An RFM record with its segment assignment
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredCustomer {
    pub rfm: RfmRecord,
    pub cluster: usize,
}

/// Fitted segmentation state
#[derive(Debug, Clone)]
pub struct SegmentModel {
    pub n_clusters: usize,
    pub seed: u64,
    pub scaler: StandardScaler,
    /// Cluster centroids in standardised space, one row per cluster id
    pub centroids: Array2<f64>,
    /// Standardised training features, aligned with `labels`
    pub features: Array2<f64>,
    pub labels: Array1<usize>,
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl SegmentModel {
    /// Assign a raw (recency, frequency, monetary) vector to its nearest centroid
    pub fn assign(&self, rfm: &[f64; N_FEATURES]) -> usize {
        let scaled = self.scaler.transform_row(rfm);
        nearest_centroid(&scaled.view(), &self.centroids)
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Cluster ids that received no customers
    pub fn empty_clusters(&self) -> Vec<usize> {
        self.cluster_sizes()
            .iter()
            .enumerate()
            .filter(|(_, &size)| size == 0)
            .map(|(id, _)| id)
            .collect()
    }

    /// Mean silhouette coefficient over the first `sample_size` customers
    pub fn silhouette_sample(&self, sample_size: usize) -> f64 {
        let n_samples = self.features.nrows().min(sample_size);
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = self.features.row(i);
            let own = self.labels[i];

            let mut same = (0.0, 0usize);
            let mut other = vec![(0.0, 0usize); self.n_clusters];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }
                let distance = euclidean_distance(&point, &self.features.row(j));
                let label = self.labels[j];
                if label == own {
                    same.0 += distance;
                    same.1 += 1;
                } else if label < self.n_clusters {
                    other[label].0 += distance;
                    other[label].1 += 1;
                }
            }

            // singletons score 0
            if same.1 == 0 {
                continue;
            }
            let a_i = same.0 / same.1 as f64;
            let b_i = other
                .iter()
                .filter(|(_, count)| *count > 0)
                .map(|(sum, count)| sum / *count as f64)
                .fold(f64::INFINITY, f64::min);

            if b_i.is_finite() && a_i.max(b_i) > 0.0 {
                silhouette_sum += (b_i - a_i) / a_i.max(b_i);
            }
        }

        silhouette_sum / n_samples as f64
    }
}

/// Partition customers into `n_clusters` behavioural segments
///
/// # Arguments
/// * `rfm` - One record per customer
/// * `config` - Cluster count, seed and K-Means stopping criteria
///
/// # Returns
/// * Clustered customers in input order, plus the fitted model
pub fn segment_customers(
    rfm: &[RfmRecord],
    config: &PipelineConfig,
) -> Result<(Vec<ClusteredCustomer>, SegmentModel)> {
    config.validate()?;
    let n_clusters = config.n_clusters;

    let distinct: BTreeSet<&str> = rfm.iter().map(|r| r.customer_id.as_str()).collect();
    if distinct.len() != rfm.len() {
        return Err(RiskError::clustering("RFM table contains duplicate CustomerIds"));
    }
    if n_clusters > distinct.len() {
        return Err(RiskError::clustering(format!(
            "number of clusters ({}) exceeds number of customers ({})",
            n_clusters,
            distinct.len()
        )));
    }

    let raw = rfm_matrix(rfm)?;
    let scaler = StandardScaler::fit(&raw);
    let features = scaler.transform(&raw);
    debug!(mean = ?scaler.mean, scale = ?scaler.scale, "RFM features scaled");

    let dataset = DatasetBase::from(features.clone());
    let rng = StdRng::seed_from_u64(config.seed);
    let kmeans = KMeans::params_with(n_clusters, rng, L2Dist)
        .max_n_iterations(config.max_iters as u64)
        .tolerance(config.tolerance)
        .fit(&dataset)?;

    let centroids = kmeans.centroids().clone();
    let labels: Array1<usize> = features
        .rows()
        .into_iter()
        .map(|row| nearest_centroid(&row, &centroids))
        .collect();
    let inertia = compute_inertia(&features, &labels, &centroids);

    let clustered: Vec<ClusteredCustomer> = rfm
        .iter()
        .zip(labels.iter())
        .map(|(record, &cluster)| ClusteredCustomer {
            rfm: record.clone(),
            cluster,
        })
        .collect();

    let model = SegmentModel {
        n_clusters,
        seed: config.seed,
        scaler,
        centroids,
        features,
        labels,
        inertia,
    };

    info!(
        clusters = n_clusters,
        seed = config.seed,
        customers = clustered.len(),
        inertia = model.inertia,
        sizes = ?model.cluster_sizes(),
        "K-Means clustering completed"
    );
    Ok((clustered, model))
}

/// Feature matrix in RFM column order; K-Means cannot place a non-finite point
fn rfm_matrix(rfm: &[RfmRecord]) -> Result<Array2<f64>> {
    if let Some(row) = rfm
        .iter()
        .position(|r| r.features().iter().any(|v| !v.is_finite()))
    {
        return Err(RiskError::validation(
            row,
            format!("non-finite RFM features for customer {}", rfm[row].customer_id),
        ));
    }

    let raw: Vec<f64> = rfm.iter().flat_map(|r| r.features()).collect();
    Array2::from_shape_vec((rfm.len(), N_FEATURES), raw)
        .map_err(|e| RiskError::clustering(format!("cannot shape RFM matrix: {e}")))
}

/// Index of the closest centroid; ties go to the lowest id
fn nearest_centroid(point: &ArrayView1<f64>, centroids: &Array2<f64>) -> usize {
    let mut min_distance = f64::INFINITY;
    let mut closest = 0;

    for (idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = euclidean_distance(point, &centroid);
        if distance < min_distance {
            min_distance = distance;
            closest = idx;
        }
    }

    closest
}

fn compute_inertia(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    centroids: &Array2<f64>,
) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter())
        .filter(|(_, &cluster)| cluster < centroids.nrows())
        .map(|(point, &cluster)| euclidean_distance(&point, &centroids.row(cluster)).powi(2))
        .sum()
}

fn euclidean_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
