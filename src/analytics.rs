//! Analysis Tools Module
//!
//! The deterministic tools the planner routes investigation steps into.
//! Each returns a descriptive string, success or not: data problems and
//! model failures come back as text the synthesis phase can reason about,
//! never as panics or bubbled errors.

use crate::dashboard::format_grouped;
use crate::error::Result;
use crate::forecaster::monthly_buckets;
use crate::stats;
use crate::tabular;
use itertools::Itertools;
use polars::prelude::*;

const ANOMALY_SEED: u64 = 42;
const CORRELATION_CUTOFF: f64 = 0.75;

/// Isolation-forest scan of one numeric column. Reports the count of
/// flagged rows and the top 3 by value, labeled by the frame's first
/// column.
pub fn detect_anomalies(df: &DataFrame, value_col: &str, contamination: f64) -> String {
    match anomaly_summary(df, value_col, contamination) {
        Ok(text) => text,
        Err(e) => format!("Anomaly detection failed: {}", e),
    }
}

fn anomaly_summary(df: &DataFrame, value_col: &str, contamination: f64) -> Result<String> {
    if df.height() == 0 || df.column(value_col).is_err() {
        return Ok("No data for anomaly detection.".to_string());
    }
    let values = tabular::numeric_values(df.column(value_col)?)?;
    let observed: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(idx, v)| v.map(|v| (idx, v)))
        .filter(|(_, v)| v.is_finite())
        .collect();
    if observed.len() < 10 {
        return Ok("Not enough data points for reliable anomaly detection.".to_string());
    }

    let sample: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();
    let scores = stats::isolation_scores(&sample, ANOMALY_SEED);

    let mut ranked: Vec<usize> = (0..sample.len()).collect();
    ranked.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
    let quota = ((contamination * sample.len() as f64).ceil() as usize).max(1);
    let flagged: Vec<usize> = ranked
        .into_iter()
        .take(quota)
        .filter(|&pos| scores[pos] > 0.5)
        .collect();
    if flagged.is_empty() {
        return Ok("No significant statistical anomalies detected.".to_string());
    }

    let mut by_value = flagged.clone();
    by_value.sort_by(|&a, &b| sample[b].partial_cmp(&sample[a]).unwrap_or(std::cmp::Ordering::Equal));

    // first column of the result doubles as the row label
    let label_series = df.get_columns().first();
    let lines: Vec<String> = by_value
        .iter()
        .take(3)
        .map(|&pos| {
            let row_idx = observed[pos].0;
            let label = label_series
                .map(|s| tabular::fmt_cell(s, row_idx))
                .unwrap_or_default();
            format!("- {}: {}", label, format_grouped(sample[pos], 2))
        })
        .collect();

    Ok(format!(
        "Found {} anomalies. Top outliers:\n{}",
        flagged.len(),
        lines.join("\n")
    ))
}

/// Seasonal projection of a dated metric, aggregated to monthly sums.
/// Reports direction and percentage change from the last observed month to
/// the end of the horizon.
pub fn generate_forecast(df: &DataFrame, date_col: &str, value_col: &str, periods: usize) -> String {
    match forecast_summary(df, date_col, value_col, periods) {
        Ok(text) => text,
        Err(e) => format!("Forecasting failed: {}", e),
    }
}

fn forecast_summary(
    df: &DataFrame,
    date_col: &str,
    value_col: &str,
    periods: usize,
) -> Result<String> {
    if df.height() == 0 || df.column(date_col).is_err() || df.column(value_col).is_err() {
        return Ok("No data for forecasting.".to_string());
    }
    if periods == 0 {
        return Ok("Forecast horizon must be at least one period.".to_string());
    }
    let dates = tabular::date_values(df.column(date_col)?)?;
    let values = tabular::numeric_values(df.column(value_col)?)?;
    let mut observed: Vec<(chrono::NaiveDate, f64)> = dates
        .into_iter()
        .zip(values)
        .filter_map(|(d, v)| match (d, v) {
            (Some(d), Some(v)) if v.is_finite() => Some((d, v)),
            _ => None,
        })
        .collect();
    if observed.len() < 12 {
        return Ok("Data too short for seasonal forecasting (need 12+ points).".to_string());
    }
    observed.sort_by_key(|(d, _)| *d);

    let monthly = monthly_buckets(&observed);
    let series: Vec<f64> = monthly.iter().map(|(_, v)| *v).collect();
    let model = stats::HoltWinters::fit(&series, 12)?;
    let forecast = model.forecast(periods);

    let start = *series.last().unwrap_or(&0.0);
    let end = *forecast.last().unwrap_or(&0.0);
    if start.abs() < f64::EPSILON {
        return Ok(format!(
            "Forecast ({} months): expected value {} (last observed month was zero, so no growth rate applies).",
            periods,
            format_grouped(end, 0)
        ));
    }
    let pct = (end - start) / start * 100.0;
    let direction = if pct >= 0.0 { "Growth" } else { "Decline" };
    Ok(format!(
        "Forecast ({} months): projected {} of {:.1}%. Expected value: {}.",
        periods,
        direction,
        pct.abs(),
        format_grouped(end, 0)
    ))
}

/// Pairwise Pearson scan across all numeric columns, keeping |r| > 0.75.
pub fn check_correlations(df: &DataFrame) -> String {
    match correlation_summary(df) {
        Ok(text) => text,
        Err(e) => format!("Correlation check failed: {}", e),
    }
}

fn correlation_summary(df: &DataFrame) -> Result<String> {
    let numeric_cols: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|s| s.dtype().is_numeric())
        .map(|s| s.name().to_string())
        .collect();
    if numeric_cols.len() < 2 {
        return Ok("Not enough numeric columns for correlation.".to_string());
    }

    let mut found: Vec<(String, String, f64)> = Vec::new();
    for (a, b) in numeric_cols.iter().tuple_combinations() {
        let xa = tabular::numeric_values(df.column(a)?)?;
        let xb = tabular::numeric_values(df.column(b)?)?;
        let (lhs, rhs): (Vec<f64>, Vec<f64>) = xa
            .into_iter()
            .zip(xb)
            .filter_map(|(va, vb)| match (va, vb) {
                (Some(va), Some(vb)) => Some((va, vb)),
                _ => None,
            })
            .unzip();
        if let Some(r) = stats::pearson(&lhs, &rhs) {
            if r.abs() > CORRELATION_CUTOFF {
                found.push((a.clone(), b.clone(), r));
            }
        }
    }

    if found.is_empty() {
        return Ok("No strong correlations (>0.75) detected.".to_string());
    }
    found.sort_by(|a, b| b.2.abs().partial_cmp(&a.2.abs()).unwrap_or(std::cmp::Ordering::Equal));
    let lines: Vec<String> = found
        .iter()
        .take(5)
        .map(|(a, b, r)| {
            let sign = if *r >= 0.0 { "Positive" } else { "Negative" };
            format!("- Strong {} correlation ({:.2}) between '{}' and '{}'", sign, r, a, b)
        })
        .collect();
    Ok(format!("Key correlations:\n{}", lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_scan_needs_ten_points() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let df = df![
            "day" => ["d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9"],
            "sales" => [10.0, 11.0, 9.0, 10.5, 10.2, 9.8, 11.1, 10.0, 9.9],
        ]?;
        assert_eq!(
            detect_anomalies(&df, "sales", 0.05),
            "Not enough data points for reliable anomaly detection."
        );
        Ok(())
    }

    #[test]
    fn anomaly_scan_surfaces_injected_outlier() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut labels: Vec<String> = (1..=20).map(|i| format!("store_{}", i)).collect();
        let mut sales: Vec<f64> = (1..=20).map(|i| 95.0 + (i % 7) as f64).collect();
        labels.push("spike".to_string());
        sales.push(1000.0);
        let df = df!["store" => labels, "sales" => sales]?;

        let report = detect_anomalies(&df, "sales", 0.05);
        assert!(report.starts_with("Found"), "got: {}", report);
        assert!(report.contains("Top outliers:"));
        assert!(report.contains("spike"), "got: {}", report);
        Ok(())
    }

    #[test]
    fn anomaly_scan_handles_missing_column() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let df = df!["a" => [1.0, 2.0]]?;
        assert_eq!(detect_anomalies(&df, "b", 0.05), "No data for anomaly detection.");
        Ok(())
    }

    #[test]
    fn short_series_gets_descriptive_forecast_message() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let df = df![
            "date" => ["2024-01-01", "2024-02-01", "2024-03-01"],
            "sales" => [10.0, 12.0, 14.0],
        ]?;
        assert_eq!(
            generate_forecast(&df, "date", "sales", 6),
            "Data too short for seasonal forecasting (need 12+ points)."
        );
        Ok(())
    }

    #[test]
    fn forecast_reports_growth_on_rising_series() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut dates = Vec::new();
        let mut sales = Vec::new();
        for t in 0..36usize {
            let year = 2021 + (t / 12) as i32;
            let month = (t % 12) + 1;
            dates.push(format!("{:04}-{:02}-15", year, month));
            sales.push(100.0 + 10.0 * t as f64 + 3.0 * ((t % 12) as f64 - 5.5));
        }
        let df = df!["date" => dates, "sales" => sales]?;

        let report = generate_forecast(&df, "date", "sales", 6);
        assert!(report.starts_with("Forecast (6 months)"), "got: {}", report);
        assert!(report.contains("Growth"), "got: {}", report);
        Ok(())
    }

    #[test]
    fn forecast_with_too_few_months_degrades_to_text() -> std::result::Result<(), Box<dyn std::error::Error>> {
        // 15 rows but only 15 calendar months: enough observations, too few
        // for a 12-period seasonal fit
        let mut dates = Vec::new();
        for t in 0..15usize {
            let year = 2023 + (t / 12) as i32;
            let month = (t % 12) + 1;
            dates.push(format!("{:04}-{:02}-01", year, month));
        }
        let sales: Vec<f64> = (0..15).map(|t| 50.0 + t as f64).collect();
        let df = df!["date" => dates, "sales" => sales]?;

        let report = generate_forecast(&df, "date", "sales", 6);
        assert!(report.starts_with("Forecasting failed:"), "got: {}", report);
        Ok(())
    }

    #[test]
    fn correlations_find_the_linear_pair() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let x: Vec<f64> = (0..20).map(|v| v as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 3.0).collect();
        let noise: Vec<f64> = (0..20).map(|v| if v % 2 == 0 { v as f64 } else { -(v as f64) }).collect();
        let df = df!["x" => x, "y" => y, "noise" => noise]?;

        let report = check_correlations(&df);
        assert!(report.starts_with("Key correlations:"), "got: {}", report);
        assert!(report.contains("'x' and 'y'"), "got: {}", report);
        assert!(report.contains("Positive"), "got: {}", report);
        Ok(())
    }

    #[test]
    fn uncorrelated_columns_report_nothing() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let x: Vec<f64> = (0..20).map(|v| v as f64).collect();
        let w: Vec<f64> = (0..20)
            .map(|v| if v % 2 == 0 { v as f64 } else { -(v as f64) })
            .collect();
        let df = df!["x" => x, "w" => w]?;
        assert_eq!(check_correlations(&df), "No strong correlations (>0.75) detected.");
        Ok(())
    }

    #[test]
    fn single_numeric_column_is_not_enough() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let df = df!["x" => [1.0, 2.0, 3.0], "label" => ["a", "b", "c"]]?;
        assert_eq!(check_correlations(&df), "Not enough numeric columns for correlation.");
        Ok(())
    }
}
