//! Dashboard Model Module
//!
//! The dashboard configuration exchanged with the language model, persisted
//! in workspaces and consumed by the rendering layer: a title, KPI cards and
//! chart specs, every visual backed by its own SQL. Field tolerance matters
//! here because configs routinely arrive from LLM output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DashboardConfig {
    #[serde(alias = "dashboard_title", default)]
    pub title: String,
    #[serde(default)]
    pub kpi_cards: Vec<KpiSpec>,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
}

impl DashboardConfig {
    pub fn is_empty(&self) -> bool {
        self.kpi_cards.is_empty() && self.charts.is_empty()
    }

    /// Compact content listing used for workspace signatures.
    pub fn content_outline(&self) -> String {
        let kpis: Vec<&str> = self.kpi_cards.iter().map(|k| k.label.as_str()).collect();
        let charts: Vec<&str> = self.charts.iter().map(|c| c.title.as_str()).collect();
        format!("KPIs: {}. Charts: {}.", kpis.join(", "), charts.join(", "))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiSpec {
    pub id: String,
    pub label: String,
    pub sql_query: String,
    #[serde(default)]
    pub format: KpiFormat,
}

/// Display style for a KPI value. Unknown styles fall back to plain numbers
/// rather than failing the whole config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum KpiFormat {
    Currency,
    Percent,
    #[default]
    Number,
}

impl From<String> for KpiFormat {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "currency" => KpiFormat::Currency,
            "percent" | "percentage" => KpiFormat::Percent,
            _ => KpiFormat::Number,
        }
    }
}

impl KpiFormat {
    pub fn format_value(&self, value: f64) -> String {
        match self {
            KpiFormat::Currency => format!("${}", format_grouped(value, 2)),
            KpiFormat::Percent => format!("{:.1}%", value),
            KpiFormat::Number => {
                if value.fract().abs() < 1e-9 {
                    format_grouped(value, 0)
                } else {
                    format_grouped(value, 2)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSpec {
    pub id: String,
    #[serde(rename = "type", alias = "chart_type", default)]
    pub kind: ChartKind,
    pub title: String,
    pub sql_query: String,
    #[serde(default)]
    pub x_column: String,
    #[serde(default)]
    pub y_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Pie,
    Scatter,
    Area,
}

impl From<String> for ChartKind {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "line" => ChartKind::Line,
            "pie" | "donut" => ChartKind::Pie,
            "scatter" => ChartKind::Scatter,
            "area" => ChartKind::Area,
            _ => ChartKind::Bar,
        }
    }
}

/// Thousands-grouped decimal rendering, e.g. 1234567.8 at 2 decimals is
/// "1,234,567.80".
pub(crate) fn format_grouped(value: f64, decimals: usize) -> String {
    let negative = value < 0.0;
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (formatted, None),
    };

    let mut grouped = String::new();
    let digits: Vec<char> = int_part.chars().collect();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(&frac);
    }
    out
}
