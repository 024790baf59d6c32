//! Segmentation Engine Module
//!
//! Clusters entities in a query result. The language model proposes a
//! strategy (classic RFM over transactions, or generic numeric features);
//! feature engineering and k-means run deterministically under a fixed
//! seed so the same data always lands in the same segments.

use crate::error::{LodestarError, Result};
use crate::interpreter;
use crate::llm::LlmGateway;
use crate::prompts;
use crate::stats;
use crate::tabular;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const KMEANS_SEED: u64 = 42;
const KMEANS_RESTARTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyType {
    #[serde(rename = "RFM", alias = "rfm")]
    Rfm,
    #[serde(alias = "generic")]
    Generic,
}

/// Per-request clustering recipe inferred from a data sample. Never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationStrategy {
    pub strategy_type: StrategyType,
    #[serde(default)]
    pub id_col: Option<String>,
    #[serde(default)]
    pub date_col: Option<String>,
    #[serde(default)]
    pub amount_col: Option<String>,
    #[serde(default)]
    pub feature_cols: Vec<String>,
}

#[derive(Debug)]
pub struct Segmentation {
    /// One row per entity: id, raw feature values, assigned `Cluster`.
    pub labeled: DataFrame,
    /// Per-cluster feature means and counts, sorted by count descending,
    /// rendered as a markdown table for LLM consumption.
    pub summary_markdown: String,
}

pub struct Segmentor {
    llm: Arc<dyn LlmGateway>,
}

impl Segmentor {
    pub fn new(llm: Arc<dyn LlmGateway>) -> Self {
        Self { llm }
    }

    /// One-shot strategy inference from a small sample. Any failure (call,
    /// parse, shape) returns None and the caller skips segmentation.
    pub async fn suggest_strategy(&self, sample_markdown: &str) -> Option<SegmentationStrategy> {
        let prompt = prompts::build_segmentation_strategy_prompt(sample_markdown);
        let raw = match self.llm.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("segmentation strategy call failed: {}", e);
                return None;
            }
        };
        let parsed = interpreter::clean_and_parse(&raw)
            .and_then(|v| serde_json::from_value::<SegmentationStrategy>(v).map_err(LodestarError::from));
        match parsed {
            Ok(strategy) => Some(strategy),
            Err(e) => {
                warn!("segmentation strategy response unusable: {}", e);
                None
            }
        }
    }

    /// Build features per the strategy, log-scale, standardize and cluster.
    pub fn execute(
        &self,
        df: &DataFrame,
        strategy: &SegmentationStrategy,
        n_clusters: usize,
    ) -> Result<Segmentation> {
        let features = match strategy.strategy_type {
            StrategyType::Rfm => rfm_features(df, strategy)?,
            StrategyType::Generic => generic_features(df, strategy)?,
        };
        if features.rows.len() < n_clusters {
            return Err(LodestarError::Segmentation(format!(
                "Not enough data points ({}) for {} clusters.",
                features.rows.len(),
                n_clusters
            )));
        }

        let transformed = stats::log1p_rows(&features.rows)
            .map_err(|e| LodestarError::Segmentation(e.to_string()))?;
        let scaled = stats::zscale_rows(&transformed);
        let fit = stats::kmeans(&scaled, n_clusters, KMEANS_RESTARTS, KMEANS_SEED)
            .map_err(|e| LodestarError::Segmentation(e.to_string()))?;
        info!(
            "segmented {} entities into {} clusters (inertia {:.2})",
            features.rows.len(),
            n_clusters,
            fit.inertia
        );

        let labeled = build_labeled_frame(&features, &fit.labels)?;
        let summary_markdown = cluster_summary(&features, &fit.labels, n_clusters);
        Ok(Segmentation {
            labeled,
            summary_markdown,
        })
    }
}

struct FeatureSet {
    entity_col: String,
    entities: Vec<String>,
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

/// Recency/Frequency/Monetary per entity. Snapshot is the day after the
/// latest transaction; entities with non-positive spend or negative
/// recency are dropped.
fn rfm_features(df: &DataFrame, strategy: &SegmentationStrategy) -> Result<FeatureSet> {
    let id_col = required(strategy.id_col.as_deref(), "id_col")?;
    let date_col = required(strategy.date_col.as_deref(), "date_col")?;
    let amount_col = required(strategy.amount_col.as_deref(), "amount_col")?;

    let ids = tabular::string_values(named_column(df, id_col)?);
    let dates = tabular::date_values(named_column(df, date_col)?)?;
    let amounts = tabular::numeric_values(named_column(df, amount_col)?)?;

    let mut valid: Vec<(String, NaiveDate, f64)> = Vec::new();
    for ((id, date), amount) in ids.into_iter().zip(dates).zip(amounts) {
        if let (Some(id), Some(date), Some(amount)) = (id, date, amount) {
            if amount.is_finite() {
                valid.push((id, date, amount));
            }
        }
    }
    if valid.is_empty() {
        return Err(LodestarError::Segmentation(
            "no usable rows after dropping invalid dates and amounts".to_string(),
        ));
    }

    let max_date = valid.iter().map(|(_, d, _)| *d).max().unwrap_or_default();
    let snapshot = max_date + chrono::Duration::days(1);

    // BTreeMap keeps entity order stable, which keeps clustering stable
    let mut accum: BTreeMap<String, (NaiveDate, u32, f64)> = BTreeMap::new();
    for (id, date, amount) in valid {
        let entry = accum.entry(id).or_insert((date, 0, 0.0));
        if date > entry.0 {
            entry.0 = date;
        }
        entry.1 += 1;
        entry.2 += amount;
    }

    let mut entities = Vec::new();
    let mut rows = Vec::new();
    for (id, (last, frequency, monetary)) in accum {
        let recency = (snapshot - last).num_days() as f64;
        if monetary <= 0.0 || recency < 0.0 {
            continue;
        }
        entities.push(id);
        rows.push(vec![recency, frequency as f64, monetary]);
    }

    Ok(FeatureSet {
        entity_col: id_col.to_string(),
        entities,
        feature_names: vec![
            "Recency".to_string(),
            "Frequency".to_string(),
            "Monetary".to_string(),
        ],
        rows,
    })
}

/// Arbitrary numeric features. When an id column exists, rows aggregate to
/// per-entity means; otherwise each row is its own entity.
fn generic_features(df: &DataFrame, strategy: &SegmentationStrategy) -> Result<FeatureSet> {
    let available: Vec<String> = strategy
        .feature_cols
        .iter()
        .filter(|c| df.column(c).is_ok())
        .cloned()
        .collect();
    if available.is_empty() {
        return Err(LodestarError::Segmentation(
            "none of the requested feature columns exist in the result".to_string(),
        ));
    }

    let mut matrix: Vec<Vec<Option<f64>>> = Vec::new();
    for col_name in &available {
        matrix.push(tabular::numeric_values(named_column(df, col_name)?)?);
    }

    let id_col = strategy
        .id_col
        .as_deref()
        .filter(|c| df.column(c).is_ok());

    match id_col {
        Some(id_name) => {
            let ids = tabular::string_values(named_column(df, id_name)?);
            let mut sums: BTreeMap<String, (Vec<f64>, usize)> = BTreeMap::new();
            for (row_idx, id) in ids.into_iter().enumerate() {
                let id = match id {
                    Some(id) => id,
                    None => continue,
                };
                let mut row = Vec::with_capacity(available.len());
                let mut complete = true;
                for col in &matrix {
                    match col[row_idx] {
                        Some(v) if v.is_finite() => row.push(v),
                        _ => {
                            complete = false;
                            break;
                        }
                    }
                }
                if !complete {
                    continue;
                }
                let entry = sums.entry(id).or_insert((vec![0.0; available.len()], 0));
                for (d, v) in entry.0.iter_mut().zip(&row) {
                    *d += v;
                }
                entry.1 += 1;
            }

            let mut entities = Vec::new();
            let mut rows = Vec::new();
            for (id, (totals, count)) in sums {
                entities.push(id);
                rows.push(totals.iter().map(|t| t / count as f64).collect());
            }
            Ok(FeatureSet {
                entity_col: id_name.to_string(),
                entities,
                feature_names: available,
                rows,
            })
        }
        None => {
            let mut entities = Vec::new();
            let mut rows = Vec::new();
            for row_idx in 0..df.height() {
                let mut row = Vec::with_capacity(available.len());
                let mut complete = true;
                for col in &matrix {
                    match col[row_idx] {
                        Some(v) if v.is_finite() => row.push(v),
                        _ => {
                            complete = false;
                            break;
                        }
                    }
                }
                if complete {
                    entities.push(row_idx.to_string());
                    rows.push(row);
                }
            }
            Ok(FeatureSet {
                entity_col: "row".to_string(),
                entities,
                feature_names: available,
                rows,
            })
        }
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        LodestarError::Segmentation(format!("RFM strategy requires {}", field))
    })
}

fn named_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map_err(|_| LodestarError::Segmentation(format!("column '{}' not found in result", name)))
}

fn build_labeled_frame(features: &FeatureSet, labels: &[usize]) -> Result<DataFrame> {
    let mut columns = vec![Series::new(
        &features.entity_col,
        features.entities.clone(),
    )];
    for (j, name) in features.feature_names.iter().enumerate() {
        let values: Vec<f64> = features.rows.iter().map(|r| r[j]).collect();
        columns.push(Series::new(name, values));
    }
    let cluster: Vec<u32> = labels.iter().map(|l| *l as u32).collect();
    columns.push(Series::new("Cluster", cluster));
    Ok(DataFrame::new(columns)?)
}

fn cluster_summary(features: &FeatureSet, labels: &[usize], n_clusters: usize) -> String {
    let dims = features.feature_names.len();
    let mut sums = vec![vec![0.0; dims]; n_clusters];
    let mut counts = vec![0usize; n_clusters];
    for (row, &label) in features.rows.iter().zip(labels) {
        counts[label] += 1;
        for d in 0..dims {
            sums[label][d] += row[d];
        }
    }

    let mut order: Vec<usize> = (0..n_clusters).collect();
    order.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));

    let mut out = String::new();
    out.push_str(&format!(
        "| Cluster | {} | Count |\n",
        features.feature_names.join(" | ")
    ));
    out.push_str(&format!(
        "| --- | {} | --- |\n",
        features
            .feature_names
            .iter()
            .map(|_| "---")
            .collect::<Vec<_>>()
            .join(" | ")
    ));
    for cluster in order {
        if counts[cluster] == 0 {
            continue;
        }
        let means: Vec<String> = sums[cluster]
            .iter()
            .map(|s| format!("{:.2}", s / counts[cluster] as f64))
            .collect();
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            cluster,
            means.join(" | "),
            counts[cluster]
        ));
    }
    out
}
