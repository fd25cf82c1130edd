//! Segment plots using Plotters
//!
//! Rendering is text-free so it works without system fonts: axes carry no
//! labels and the high-risk segment is marked with a ring instead of a legend.

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::info;

use crate::error::{Result, RiskError};
use crate::model::SegmentModel;

/// Color palette for different clusters
const CLUSTER_COLORS: [RGBColor; 5] = [RED, BLUE, GREEN, YELLOW, MAGENTA];

const PADDING: f64 = 0.5;

fn cluster_color(cluster: usize) -> RGBColor {
    CLUSTER_COLORS.get(cluster).copied().unwrap_or(BLACK)
}

fn plot_err<E: std::fmt::Display>(err: E) -> RiskError {
    RiskError::Plot(err.to_string())
}

/// Padded (frequency, monetary) ranges of the standardised features and centroids
pub fn plot_bounds(model: &SegmentModel) -> ((f64, f64), (f64, f64)) {
    let points = model
        .features
        .outer_iter()
        .chain(model.centroids.outer_iter())
        .map(|row| (row[1], row[2]));

    let (mut f_min, mut f_max, mut m_min, mut m_max) =
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for (f, m) in points {
        f_min = f_min.min(f);
        f_max = f_max.max(f);
        m_min = m_min.min(m);
        m_max = m_max.max(m);
    }
    if !f_min.is_finite() {
        return ((-1.0, 1.0), (-1.0, 1.0));
    }

    ((f_min - PADDING, f_max + PADDING), (m_min - PADDING, m_max + PADDING))
}

/// Scatter of standardised frequency vs monetary, coloured by segment
pub fn draw_segment_scatter(
    model: &SegmentModel,
    high_risk_cluster: usize,
    output_path: &Path,
) -> Result<()> {
    let ((f_min, f_max), (m_min, m_max)) = plot_bounds(model);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(f_min..f_max, m_min..m_max)
        .map_err(plot_err)?;

    // zero lines stand in for the mean customer
    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(0.0, m_min), (0.0, m_max)],
            BLACK.mix(0.2).stroke_width(1),
        )))
        .map_err(plot_err)?;
    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(f_min, 0.0), (f_max, 0.0)],
            BLACK.mix(0.2).stroke_width(1),
        )))
        .map_err(plot_err)?;

    chart
        .draw_series(
            model
                .features
                .outer_iter()
                .zip(model.labels.iter())
                .map(|(row, &cluster)| {
                    Circle::new((row[1], row[2]), 4, cluster_color(cluster).filled())
                }),
        )
        .map_err(plot_err)?;

    chart
        .draw_series(
            model
                .features
                .outer_iter()
                .zip(model.labels.iter())
                .filter(|(_, &cluster)| cluster == high_risk_cluster)
                .map(|(row, _)| Circle::new((row[1], row[2]), 7, BLACK.stroke_width(1))),
        )
        .map_err(plot_err)?;

    // centroids as squares
    for (cluster, centroid) in model.centroids.outer_iter().enumerate() {
        let (f, m) = (centroid[1], centroid[2]);
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(f - 0.1, m - 0.1), (f + 0.1, m + 0.1)],
                cluster_color(cluster).filled(),
            )))
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    info!(path = %output_path.display(), "segment scatter saved");

    Ok(())
}

/// Bar chart of cluster sizes; the high-risk bar is outlined
pub fn draw_cluster_size_chart(
    model: &SegmentModel,
    high_risk_cluster: usize,
    output_path: &Path,
) -> Result<()> {
    let cluster_sizes = model.cluster_sizes();
    let max_size = cluster_sizes.iter().copied().max().unwrap_or(1).max(1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(-0.5f64..(model.n_clusters as f64 - 0.5), 0f64..(max_size * 1.1))
        .map_err(plot_err)?;

    for (cluster, &size) in cluster_sizes.iter().enumerate() {
        let x = cluster as f64;
        let bar = [(x - 0.4, 0.0), (x + 0.4, size as f64)];
        chart
            .draw_series(std::iter::once(Rectangle::new(bar, cluster_color(cluster).filled())))
            .map_err(plot_err)?;
        if cluster == high_risk_cluster {
            chart
                .draw_series(std::iter::once(Rectangle::new(bar, BLACK.stroke_width(3))))
                .map_err(plot_err)?;
        }
    }

    root.present().map_err(plot_err)?;
    info!(path = %output_path.display(), "cluster size chart saved");

    Ok(())
}

/// Sibling path for the size chart: `plot.png` -> `plot_sizes.png`
pub fn size_chart_path(base_output_path: &Path) -> PathBuf {
    let stem = base_output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segments".to_string());
    base_output_path.with_file_name(format!("{stem}_sizes.png"))
}

/// Write both plots and return their paths
pub fn generate_visualization_report(
    model: &SegmentModel,
    high_risk_cluster: usize,
    base_output_path: &Path,
) -> Result<(PathBuf, PathBuf)> {
    draw_segment_scatter(model, high_risk_cluster, base_output_path)?;

    let sizes_path = size_chart_path(base_output_path);
    draw_cluster_size_chart(model, high_risk_cluster, &sizes_path)?;

    Ok((base_output_path.to_path_buf(), sizes_path))
}
