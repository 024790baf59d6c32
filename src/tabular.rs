//! Tabular Helpers Module
//!
//! Conversions between Polars frames and the plain values the rest of the
//! pipeline works with: f64/date/string vectors for the statistical tools,
//! markdown previews and numeric profiles for LLM prompts, scalar cells for
//! KPI evaluation.

use crate::error::{LodestarError, Result};
use chrono::NaiveDate;
use polars::prelude::*;

/// Date formats accepted when a date column arrives as raw strings.
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%Y%m%d",
];

/// Sanitize a table or column name: lowercase, punctuation stripped,
/// whitespace collapsed to underscores.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect();
    cleaned
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn epoch_day(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1).map(|epoch| epoch + chrono::Duration::days(days as i64))
}

fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d);
        }
    }
    None
}

/// Extract a column as f64 values, null where missing or unparseable.
pub fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>> {
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

/// Extract a column as calendar dates, null where missing or unparseable.
/// Accepts date, datetime and string columns.
pub fn date_values(series: &Series) -> Result<Vec<Option<NaiveDate>>> {
    match series.dtype() {
        DataType::Date => {
            let days = series.cast(&DataType::Int32)?;
            Ok(days
                .i32()?
                .into_iter()
                .map(|d| d.and_then(epoch_day))
                .collect())
        }
        DataType::Datetime(_, _) => {
            let dates = series.cast(&DataType::Date)?.cast(&DataType::Int32)?;
            Ok(dates
                .i32()?
                .into_iter()
                .map(|d| d.and_then(epoch_day))
                .collect())
        }
        DataType::String => Ok(series
            .str()?
            .into_iter()
            .map(|s| s.and_then(parse_date_str))
            .collect()),
        other => Err(LodestarError::Parse(format!(
            "column '{}' has type {} and cannot be read as dates",
            series.name(),
            other
        ))),
    }
}

/// Extract a column as display strings, null where the cell is null.
pub fn string_values(series: &Series) -> Vec<Option<String>> {
    let null_mask = series.is_null();
    (0..series.len())
        .map(|idx| {
            if null_mask.get(idx).unwrap_or(false) {
                None
            } else {
                Some(fmt_cell(series, idx))
            }
        })
        .collect()
}

/// Render one cell for previews and labels. Nulls render empty.
pub fn fmt_cell(series: &Series, idx: usize) -> String {
    let null_mask = series.is_null();
    if null_mask.get(idx).unwrap_or(false) {
        return String::new();
    }
    match series.dtype() {
        DataType::String => series
            .str()
            .ok()
            .and_then(|ca| ca.get(idx))
            .unwrap_or("")
            .to_string(),
        DataType::Date => date_values(series)
            .ok()
            .and_then(|dates| dates.get(idx).cloned().flatten())
            .map(|d| d.to_string())
            .unwrap_or_default(),
        _ => match series.get(idx) {
            Ok(AnyValue::Null) => String::new(),
            Ok(AnyValue::Boolean(b)) => b.to_string(),
            Ok(any_val) => {
                if let Ok(val) = any_val.try_extract::<f64>() {
                    fmt_float(val)
                } else {
                    any_val.to_string()
                }
            }
            Err(_) => String::new(),
        },
    }
}

fn fmt_float(val: f64) -> String {
    if (val - val.round()).abs() < 1e-9 && val.abs() < 1e15 {
        format!("{:.0}", val)
    } else {
        format!("{}", val)
    }
}

/// Render the first `max_rows` rows of a frame as a GitHub-style markdown
/// table for prompt context.
pub fn head_markdown(df: &DataFrame, max_rows: usize) -> String {
    if df.height() == 0 || df.width() == 0 {
        return "(no rows)".to_string();
    }
    let limited = df.head(Some(max_rows));
    let columns: Vec<String> = limited
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut out = String::new();
    out.push_str(&format!("| {} |\n", columns.join(" | ")));
    out.push_str(&format!(
        "| {} |\n",
        columns.iter().map(|_| "---").collect::<Vec<_>>().join(" | ")
    ));
    for row_idx in 0..limited.height() {
        let cells: Vec<String> = limited
            .get_columns()
            .iter()
            .map(|series| fmt_cell(series, row_idx))
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

/// One-line-per-column numeric summary (count, mean, min, max) used in the
/// dashboard audit. Non-numeric columns are skipped.
pub fn numeric_profile(df: &DataFrame) -> String {
    let mut lines = Vec::new();
    for col_name in df.get_column_names() {
        let series = match df.column(col_name) {
            Ok(s) => s,
            Err(_) => continue,
        };
        if !series.dtype().is_numeric() {
            continue;
        }
        let count = series.len() - series.null_count();
        let mean = series.mean().unwrap_or(f64::NAN);
        if let (Ok(Some(min)), Ok(Some(max))) = (series.min::<f64>(), series.max::<f64>()) {
            lines.push(format!(
                "- {}: count={}, mean={:.2}, min={}, max={}",
                col_name,
                count,
                mean,
                fmt_float(min),
                fmt_float(max)
            ));
        }
    }
    if lines.is_empty() {
        "- no numeric columns".to_string()
    } else {
        lines.join("\n")
    }
}

/// First cell of a result frame as f64, for single-value KPI queries.
pub fn scalar_f64(df: &DataFrame) -> Option<f64> {
    let series = df.get_columns().first()?;
    if df.height() == 0 || series.dtype() == &DataType::Date {
        return None;
    }
    series.get(0).ok().and_then(|av| av.try_extract::<f64>().ok())
}

/// First cell of a result frame as display text.
pub fn scalar_text(df: &DataFrame) -> Option<String> {
    let series = df.get_columns().first()?;
    if df.height() == 0 {
        return None;
    }
    Some(fmt_cell(series, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_strips_punctuation_and_spaces() {
        assert_eq!(sanitize_name("  Order Total ($)"), "order_total");
        assert_eq!(sanitize_name("Revenue"), "revenue");
        assert_eq!(sanitize_name("first__name"), "first__name");
    }

    #[test]
    fn parse_date_str_accepts_common_formats() {
        assert_eq!(
            parse_date_str("2024-03-05"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(
            parse_date_str("03/05/2024"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(parse_date_str("not a date"), None);
    }

    #[test]
    fn head_markdown_renders_header_and_rows() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let df = df![
            "region" => ["north", "south"],
            "revenue" => [1200.0, 340.5],
        ]?;
        let md = head_markdown(&df, 5);
        assert!(md.starts_with("| region | revenue |"));
        assert!(md.contains("| north | 1200 |"));
        assert!(md.contains("| south | 340.5 |"));
        Ok(())
    }

    #[test]
    fn scalar_extraction_reads_first_cell() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let df = df!["total" => [42.5]]?;
        assert_eq!(scalar_f64(&df), Some(42.5));
        assert_eq!(scalar_text(&df).as_deref(), Some("42.5"));
        Ok(())
    }

    #[test]
    fn date_values_reads_string_column() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let df = df!["d" => ["2024-01-31", "junk", "2024/02/01"]]?;
        let dates = date_values(df.column("d")?)?;
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(dates[1], None);
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2024, 2, 1));
        Ok(())
    }
}
