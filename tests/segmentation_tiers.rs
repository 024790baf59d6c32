mod common;

use common::ScriptedLlm;
use lodestar::segmentor::{SegmentationStrategy, Segmentor, StrategyType};
use polars::prelude::*;
use std::collections::HashMap;

/// 50 customers in three visually separable spend tiers. Recency and
/// frequency are held constant so the clustering signal is the spend alone.
fn tiered_transactions() -> Result<DataFrame, Box<dyn std::error::Error>> {
    let mut customers = Vec::new();
    let mut dates = Vec::new();
    let mut amounts = Vec::new();

    for i in 0..20usize {
        customers.push(format!("low_{:02}", i));
        amounts.push(80.0 + i as f64);
    }
    for i in 0..20usize {
        customers.push(format!("mid_{:02}", i));
        amounts.push(900.0 + 10.0 * i as f64);
    }
    for i in 0..10usize {
        customers.push(format!("high_{:02}", i));
        amounts.push(9000.0 + 100.0 * i as f64);
    }
    for _ in 0..customers.len() {
        dates.push("2024-06-01");
    }

    Ok(df![
        "customer" => customers,
        "order_date" => dates,
        "amount" => amounts
    ]?)
}

fn rfm_strategy() -> SegmentationStrategy {
    SegmentationStrategy {
        strategy_type: StrategyType::Rfm,
        id_col: Some("customer".to_string()),
        date_col: Some("order_date".to_string()),
        amount_col: Some("amount".to_string()),
        feature_cols: Vec::new(),
    }
}

fn cluster_stats(labeled: &DataFrame) -> Result<HashMap<u32, (f64, usize)>, Box<dyn std::error::Error>> {
    let clusters = labeled.column("Cluster")?.u32()?;
    let monetary = labeled.column("Monetary")?.f64()?;
    let mut stats: HashMap<u32, (f64, usize)> = HashMap::new();
    for (cluster, amount) in clusters.into_iter().zip(monetary.into_iter()) {
        let (cluster, amount) = (cluster.unwrap(), amount.unwrap());
        let entry = stats.entry(cluster).or_insert((0.0, 0));
        entry.0 += amount;
        entry.1 += 1;
    }
    Ok(stats)
}

#[test]
fn three_spend_tiers_cluster_into_three_ordered_segments() -> Result<(), Box<dyn std::error::Error>> {
    let segmentor = Segmentor::new(ScriptedLlm::new(&[]));
    let segmentation = segmentor.execute(&tiered_transactions()?, &rfm_strategy(), 3)?;

    // every customer spent something, so nobody is dropped
    assert_eq!(segmentation.labeled.height(), 50);

    let stats = cluster_stats(&segmentation.labeled)?;
    assert_eq!(stats.len(), 3, "expected exactly 3 populated clusters");
    let total: usize = stats.values().map(|(_, count)| *count).sum();
    assert_eq!(total, 50);

    // mean spend per cluster is strictly ordered across the tiers
    let mut means: Vec<f64> = stats
        .values()
        .map(|(sum, count)| sum / *count as f64)
        .collect();
    means.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!(means[0] < means[1] && means[1] < means[2], "means: {:?}", means);

    // the top tier is the 10 big spenders, recovered intact
    let (_, &(top_sum, top_count)) = stats
        .iter()
        .max_by(|a, b| {
            (a.1 .0 / a.1 .1 as f64)
                .partial_cmp(&(b.1 .0 / b.1 .1 as f64))
                .unwrap()
        })
        .unwrap();
    assert_eq!(top_count, 10);
    assert!(top_sum / top_count as f64 > 8000.0);

    // summary table carries one row per cluster, largest first
    let lines: Vec<&str> = segmentation.summary_markdown.lines().collect();
    assert_eq!(lines.len(), 5, "summary: {}", segmentation.summary_markdown);
    assert!(lines[0].starts_with("| Cluster |"));
    assert!(lines[2].ends_with("| 20 |"));
    assert!(lines[4].ends_with("| 10 |"));
    Ok(())
}

#[test]
fn repeat_runs_assign_identical_clusters() -> Result<(), Box<dyn std::error::Error>> {
    let segmentor = Segmentor::new(ScriptedLlm::new(&[]));
    let df = tiered_transactions()?;

    let first = segmentor.execute(&df, &rfm_strategy(), 3)?;
    let second = segmentor.execute(&df, &rfm_strategy(), 3)?;

    let labels_first: Vec<Option<u32>> = first
        .labeled
        .column("Cluster")?
        .u32()?
        .into_iter()
        .collect();
    let labels_second: Vec<Option<u32>> = second
        .labeled
        .column("Cluster")?
        .u32()?
        .into_iter()
        .collect();
    assert_eq!(labels_first, labels_second);
    assert_eq!(first.summary_markdown, second.summary_markdown);
    Ok(())
}
