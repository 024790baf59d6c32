//! Statistical Core Module
//!
//! Pure numeric routines behind the analysis tools: isolation-forest
//! anomaly scoring, additive Holt-Winters smoothing, ordinary least squares
//! trends, Pearson correlation and seeded k-means. Everything operates on
//! plain f64 slices; frame extraction lives in `tabular`.

use crate::error::{LodestarError, Result};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

const ISO_TREE_COUNT: usize = 100;
const ISO_SAMPLE_SIZE: usize = 256;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const KMEANS_MAX_ITER: usize = 300;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Pearson correlation coefficient. None when lengths differ, fewer than
/// two pairs, or either side is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mx;
        let dy = b - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    let denom = (vx * vy).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some(cov / denom)
}

/// Closed-form OLS line over the ordinal index 0..n.
#[derive(Debug, Clone, Copy)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    pub fn predict(&self, t: f64) -> f64 {
        self.intercept + self.slope * t
    }
}

pub fn fit_linear_trend(values: &[f64]) -> Option<LinearTrend> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean_x = (n as f64 - 1.0) / 2.0;
    let mean_y = mean(values);
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some(LinearTrend {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

// ---------------------------------------------------------------------------
// Holt-Winters (additive trend, additive seasonality)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HoltWinters {
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
    season_length: usize,
    phase: usize,
}

impl HoltWinters {
    /// Fit by grid search over the smoothing triple, minimizing one-step
    /// in-sample squared error. Requires two full seasonal cycles.
    pub fn fit(series: &[f64], season_length: usize) -> Result<Self> {
        if season_length < 2 {
            return Err(LodestarError::Stats(
                "season length must be at least 2".to_string(),
            ));
        }
        if series.len() < 2 * season_length {
            return Err(LodestarError::Stats(format!(
                "need at least {} points for a {}-period seasonal model; have {}",
                2 * season_length,
                season_length,
                series.len()
            )));
        }
        let grid = [0.1, 0.3, 0.5, 0.7, 0.9];
        let mut best: Option<(f64, HoltWinters)> = None;
        for &alpha in &grid {
            for &beta in &grid {
                for &gamma in &grid {
                    if let Some((sse, model)) =
                        Self::evaluate(series, season_length, alpha, beta, gamma)
                    {
                        if best.as_ref().map_or(true, |(b, _)| sse < *b) {
                            best = Some((sse, model));
                        }
                    }
                }
            }
        }
        best.map(|(_, model)| model).ok_or_else(|| {
            LodestarError::Stats("smoothing parameter search found no stable fit".to_string())
        })
    }

    fn evaluate(
        series: &[f64],
        m: usize,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> Option<(f64, HoltWinters)> {
        let n = series.len();
        let first_cycle = mean(&series[..m]);
        let second_cycle = mean(&series[m..2 * m]);
        let mut level = first_cycle;
        let mut trend = (second_cycle - first_cycle) / m as f64;
        let mut seasonals: Vec<f64> = series[..m].iter().map(|y| y - first_cycle).collect();

        let mut sse = 0.0;
        for t in m..n {
            let s_idx = t % m;
            let predicted = level + trend + seasonals[s_idx];
            let err = series[t] - predicted;
            sse += err * err;

            let prev_level = level;
            level = alpha * (series[t] - seasonals[s_idx]) + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
            seasonals[s_idx] = gamma * (series[t] - level) + (1.0 - gamma) * seasonals[s_idx];
        }

        if !sse.is_finite() || !level.is_finite() || !trend.is_finite() {
            return None;
        }
        Some((
            sse,
            HoltWinters {
                level,
                trend,
                seasonals,
                season_length: m,
                phase: n % m,
            },
        ))
    }

    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        (0..horizon)
            .map(|i| {
                self.level
                    + self.trend * (i as f64 + 1.0)
                    + self.seasonals[(self.phase + i) % self.season_length]
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Isolation forest over 1-D values
// ---------------------------------------------------------------------------

enum IsoNode {
    Leaf {
        size: usize,
    },
    Split {
        at: f64,
        below: Box<IsoNode>,
        above: Box<IsoNode>,
    },
}

fn avg_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn build_iso_tree(values: &[f64], depth: usize, max_depth: usize, rng: &mut StdRng) -> IsoNode {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if depth >= max_depth || values.len() <= 1 || (max - min) < f64::EPSILON {
        return IsoNode::Leaf {
            size: values.len(),
        };
    }
    let at = rng.gen_range(min..max);
    let below: Vec<f64> = values.iter().cloned().filter(|v| *v < at).collect();
    let above: Vec<f64> = values.iter().cloned().filter(|v| *v >= at).collect();
    IsoNode::Split {
        at,
        below: Box::new(build_iso_tree(&below, depth + 1, max_depth, rng)),
        above: Box::new(build_iso_tree(&above, depth + 1, max_depth, rng)),
    }
}

fn iso_path_length(node: &IsoNode, value: f64, depth: usize) -> f64 {
    match node {
        IsoNode::Leaf { size } => depth as f64 + avg_path_length(*size),
        IsoNode::Split { at, below, above } => {
            if value < *at {
                iso_path_length(below, value, depth + 1)
            } else {
                iso_path_length(above, value, depth + 1)
            }
        }
    }
}

/// Standard isolation-forest anomaly scores in (0, 1); higher is more
/// anomalous, 0.5 is the indifference point. Deterministic for a seed.
pub fn isolation_scores(values: &[f64], seed: u64) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0.5];
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let sample_size = ISO_SAMPLE_SIZE.min(n);
    let max_depth = (sample_size as f64).log2().ceil() as usize;
    let normalizer = avg_path_length(sample_size);

    let mut trees = Vec::with_capacity(ISO_TREE_COUNT);
    for _ in 0..ISO_TREE_COUNT {
        let sample: Vec<f64> = if sample_size == n {
            values.to_vec()
        } else {
            index::sample(&mut rng, n, sample_size)
                .iter()
                .map(|i| values[i])
                .collect()
        };
        trees.push(build_iso_tree(&sample, 0, max_depth, &mut rng));
    }

    values
        .iter()
        .map(|&v| {
            let avg: f64 = trees
                .iter()
                .map(|tree| iso_path_length(tree, v, 0))
                .sum::<f64>()
                / ISO_TREE_COUNT as f64;
            2f64.powf(-avg / normalizer)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Feature scaling and k-means
// ---------------------------------------------------------------------------

/// log(1 + x) each cell. Errors on negative input, where the transform is
/// undefined.
pub fn log1p_rows(rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut scaled = Vec::with_capacity(row.len());
        for &v in row {
            if v < 0.0 {
                return Err(LodestarError::Stats(
                    "features contain negative values; log scaling is undefined".to_string(),
                ));
            }
            scaled.push(v.ln_1p());
        }
        out.push(scaled);
    }
    Ok(out)
}

/// Column-wise z-standardization. Constant columns scale to zero.
pub fn zscale_rows(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    if rows.is_empty() {
        return Vec::new();
    }
    let dims = rows[0].len();
    let mut out = vec![vec![0.0; dims]; rows.len()];
    for d in 0..dims {
        let column: Vec<f64> = rows.iter().map(|r| r[d]).collect();
        let mu = mean(&column);
        let sigma = std_dev(&column, mu);
        let scale = if sigma == 0.0 { 1.0 } else { sigma };
        for (i, value) in column.iter().enumerate() {
            out[i][d] = (value - mu) / scale;
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

fn nearest_centroid(row: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (j, centroid) in centroids.iter().enumerate() {
        let d = sq_dist(row, centroid);
        if d < best_dist {
            best_dist = d;
            best = j;
        }
    }
    best
}

fn kmeanspp_init(rows: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![rows[rng.gen_range(0..rows.len())].clone()];
    while centroids.len() < k {
        let weights: Vec<f64> = rows
            .iter()
            .map(|row| {
                centroids
                    .iter()
                    .map(|c| sq_dist(row, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // all remaining mass sits on existing centroids
            centroids.push(rows[rng.gen_range(0..rows.len())].clone());
            continue;
        }
        let mut target = rng.gen_range(0.0..total);
        let mut chosen = rows.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if target < *w {
                chosen = i;
                break;
            }
            target -= w;
        }
        centroids.push(rows[chosen].clone());
    }
    centroids
}

fn lloyd_once(rows: &[Vec<f64>], k: usize, rng: &mut StdRng) -> KMeansFit {
    let n = rows.len();
    let dims = rows[0].len();
    let mut centroids = kmeanspp_init(rows, k, rng);
    let mut labels = vec![0usize; n];

    for _ in 0..KMEANS_MAX_ITER {
        let mut changed = false;
        for (i, row) in rows.iter().enumerate() {
            let j = nearest_centroid(row, &centroids);
            if labels[i] != j {
                labels[i] = j;
                changed = true;
            }
        }

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (i, row) in rows.iter().enumerate() {
            counts[labels[i]] += 1;
            for d in 0..dims {
                sums[labels[i]][d] += row[d];
            }
        }
        for j in 0..k {
            if counts[j] == 0 {
                // re-seed an empty cluster from the worst-fit point
                let far = (0..n)
                    .max_by(|&a, &b| {
                        sq_dist(&rows[a], &centroids[labels[a]])
                            .partial_cmp(&sq_dist(&rows[b], &centroids[labels[b]]))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0);
                centroids[j] = rows[far].clone();
                changed = true;
            } else {
                for d in 0..dims {
                    centroids[j][d] = sums[j][d] / counts[j] as f64;
                }
            }
        }

        if !changed {
            break;
        }
    }

    let inertia = rows
        .iter()
        .enumerate()
        .map(|(i, row)| sq_dist(row, &centroids[labels[i]]))
        .sum();
    KMeansFit {
        labels,
        centroids,
        inertia,
    }
}

/// Seeded k-means with k-means++ initialization, best of `n_init` restarts.
pub fn kmeans(rows: &[Vec<f64>], k: usize, n_init: usize, seed: u64) -> Result<KMeansFit> {
    if k == 0 {
        return Err(LodestarError::Stats(
            "cluster count must be positive".to_string(),
        ));
    }
    if rows.len() < k {
        return Err(LodestarError::Stats(format!(
            "{} rows cannot support {} clusters",
            rows.len(),
            k
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<KMeansFit> = None;
    for _ in 0..n_init.max(1) {
        let fit = lloyd_once(rows, k, &mut rng);
        if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }
    best.ok_or_else(|| LodestarError::Stats("k-means produced no fit".to_string()))
}
