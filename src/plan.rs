//! Investigation Plan Module
//!
//! The planning phase asks the language model for one probe per line in the
//! form `SQL | TOOL_NAME`. Model output is messy: fenced, annotated,
//! inconsistently labeled. Parsing is therefore forgiving; a line missing
//! the separator is dropped, and tool names match case-insensitively by
//! substring.

use crate::interpreter::strip_code_fences;
use tracing::debug;

/// Statistical tool requested for a plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Anomaly,
    Forecast,
    Segmentation,
    Correlation,
    None,
}

impl ToolKind {
    pub fn from_label(label: &str) -> ToolKind {
        let upper = label.trim().to_uppercase();
        if upper.contains("SEGMENT") {
            ToolKind::Segmentation
        } else if upper.contains("ANOMALY") {
            ToolKind::Anomaly
        } else if upper.contains("FORECAST") {
            ToolKind::Forecast
        } else if upper.contains("CORRELAT") {
            ToolKind::Correlation
        } else {
            ToolKind::None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Anomaly => "ANOMALY",
            ToolKind::Forecast => "FORECAST",
            ToolKind::Segmentation => "SEGMENTATION",
            ToolKind::Correlation => "CORRELATION",
            ToolKind::None => "NONE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub sql: String,
    pub tool: ToolKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvestigationPlan {
    pub steps: Vec<PlanStep>,
}

/// Strip fences, outer whitespace and trailing semicolons from a SQL
/// fragment.
pub fn clean_sql(raw: &str) -> String {
    strip_code_fences(raw)
        .trim()
        .trim_end_matches(';')
        .trim()
        .to_string()
}

impl InvestigationPlan {
    /// Parse raw plan text line by line. Fences are stripped from the whole
    /// reply first, so a plan wrapped in one code block still splits into
    /// steps. Lines without a `|` separator or with an empty SQL side are
    /// skipped.
    pub fn parse(raw: &str) -> Self {
        let unfenced = strip_code_fences(raw);
        let mut steps = Vec::new();
        for line in unfenced.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !line.contains('|') {
                debug!("skipping plan line without separator: {}", line);
                continue;
            }
            let parts: Vec<&str> = line.split('|').collect();
            let sql = clean_sql(parts[0]);
            if sql.is_empty() {
                debug!("skipping plan line with empty SQL: {}", line);
                continue;
            }
            let tool = ToolKind::from_label(parts.get(1).copied().unwrap_or(""));
            steps.push(PlanStep { sql, tool });
        }
        InvestigationPlan { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
