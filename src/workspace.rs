//! Workspace Module
//!
//! File-backed persistence for dashboards. The store is a single flat JSON
//! object keyed by record id; every save reads, modifies and rewrites the
//! whole file. There is no concurrency control: when two sessions save at
//! once, the last writer wins.

use crate::dashboard::DashboardConfig;
use crate::error::{LodestarError, Result};
use crate::llm::LlmGateway;
use crate::prompts;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_WORKSPACE_FILE: &str = "lodestar_workspace.json";

const NO_SUMMARY: &str = "No AI summary available.";

/// Saved analytical intent: what the user said they were doing plus a
/// one-sentence model-written summary. Replayed into later investigations
/// to keep them on topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSignature {
    pub intent: String,
    pub automated_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub description: String,
    pub context_signature: ContextSignature,
    pub config: DashboardConfig,
}

pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Record ids are derived from the user-given name, so saving under the
    /// same name overwrites the earlier record.
    pub fn record_id(name: &str) -> String {
        name.trim().to_lowercase().replace(' ', "_")
    }

    /// Save a dashboard under a user-given name. When a gateway is supplied
    /// the record gets a model-written context signature; any failure there
    /// degrades to a placeholder summary, never a failed save.
    pub async fn save(
        &self,
        name: &str,
        description: &str,
        config: &DashboardConfig,
        llm: Option<&dyn LlmGateway>,
    ) -> Result<WorkspaceRecord> {
        let automated_summary = match llm {
            Some(gateway) => summarize_config(gateway, config, description)
                .await
                .unwrap_or_else(|| NO_SUMMARY.to_string()),
            None => NO_SUMMARY.to_string(),
        };

        let record = WorkspaceRecord {
            id: Self::record_id(name),
            name: name.to_string(),
            created_at: Local::now().format("%Y-%m-%d %H:%M").to_string(),
            description: description.to_string(),
            context_signature: ContextSignature {
                intent: description.to_string(),
                automated_summary,
            },
            config: config.clone(),
        };

        let mut records = self.read_all()?;
        records.insert(record.id.clone(), record.clone());
        self.write_all(&records)?;
        Ok(record)
    }

    pub fn list(&self) -> Result<Vec<WorkspaceRecord>> {
        Ok(self.read_all()?.into_values().collect())
    }

    pub fn load(&self, id: &str) -> Result<Option<WorkspaceRecord>> {
        Ok(self.read_all()?.remove(id))
    }

    /// Returns whether the record existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self.read_all()?;
        let existed = records.remove(id).is_some();
        if existed {
            self.write_all(&records)?;
        }
        Ok(existed)
    }

    fn read_all(&self) -> Result<BTreeMap<String, WorkspaceRecord>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            LodestarError::Workspace(format!("failed to read workspace file: {}", e))
        })?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| LodestarError::Workspace(format!("workspace file is corrupted: {}", e)))
    }

    fn write_all(&self, records: &BTreeMap<String, WorkspaceRecord>) -> Result<()> {
        let encoded = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, encoded).map_err(|e| {
            LodestarError::Workspace(format!("failed to write workspace file: {}", e))
        })
    }
}

async fn summarize_config(
    llm: &dyn LlmGateway,
    config: &DashboardConfig,
    description: &str,
) -> Option<String> {
    let chart_titles: Vec<String> = config.charts.iter().map(|c| c.title.clone()).collect();
    let kpi_labels: Vec<String> = config.kpi_cards.iter().map(|k| k.label.clone()).collect();
    let prompt = prompts::build_context_signature_prompt(&chart_titles, &kpi_labels, description);
    match llm.generate(&prompt).await {
        Ok(summary) => {
            let summary = summary.trim().to_string();
            if summary.is_empty() {
                None
            } else {
                Some(summary)
            }
        }
        Err(e) => {
            warn!("context signature generation failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DashboardConfig {
        serde_json::from_str(
            r#"{
                "dashboard_title": "Sales Pulse",
                "kpi_cards": [
                    {"id": "kpi_1", "label": "Total Revenue", "sql_query": "SELECT SUM(amount) FROM orders", "format": "currency"}
                ],
                "charts": [
                    {"id": "chart_1", "type": "line", "title": "Revenue by Month", "sql_query": "SELECT month, SUM(amount) FROM orders GROUP BY month", "x_column": "month", "y_column": "amount"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn temp_workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("workspace.json"));
        (dir, ws)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let (_dir, ws) = temp_workspace();
        let record = ws
            .save("Q3 Review", "tracking the Q3 revenue dip", &sample_config(), None)
            .await
            .unwrap();
        assert_eq!(record.id, "q3_review");
        assert_eq!(record.context_signature.automated_summary, NO_SUMMARY);

        let loaded = ws.load("q3_review").unwrap().unwrap();
        assert_eq!(loaded.name, "Q3 Review");
        assert_eq!(loaded.config.title, "Sales Pulse");
        assert_eq!(loaded.context_signature.intent, "tracking the Q3 revenue dip");
    }

    #[tokio::test]
    async fn same_name_overwrites_prior_record() {
        let (_dir, ws) = temp_workspace();
        ws.save("Board Deck", "first pass", &sample_config(), None)
            .await
            .unwrap();
        ws.save("Board Deck", "second pass", &sample_config(), None)
            .await
            .unwrap();

        let records = ws.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "second pass");
    }

    #[tokio::test]
    async fn delete_reports_whether_the_record_existed() {
        let (_dir, ws) = temp_workspace();
        ws.save("Churn Watch", "", &sample_config(), None)
            .await
            .unwrap();
        assert!(ws.delete("churn_watch").unwrap());
        assert!(!ws.delete("churn_watch").unwrap());
        assert!(ws.list().unwrap().is_empty());
    }

    #[test]
    fn missing_file_lists_as_empty() {
        let (_dir, ws) = temp_workspace();
        assert!(ws.list().unwrap().is_empty());
        assert!(ws.load("anything").unwrap().is_none());
    }

    #[test]
    fn ids_lowercase_and_underscore() {
        assert_eq!(Workspace::record_id("  Regional Sales Deep Dive "), "regional_sales_deep_dive");
    }
}
