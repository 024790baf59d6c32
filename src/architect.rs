//! Dashboard Architect Module
//!
//! Turns a schema description and a user intent into a full dashboard
//! configuration with embedded SQL, and proposes dashboard ideas for a
//! freshly loaded dataset.

use crate::dashboard::DashboardConfig;
use crate::error::{LodestarError, Result};
use crate::interpreter;
use crate::llm::LlmGateway;
use crate::prompts;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Architect {
    llm: Arc<dyn LlmGateway>,
}

impl Architect {
    pub fn new(llm: Arc<dyn LlmGateway>) -> Self {
        Self { llm }
    }

    /// Design a dashboard for the loaded data. A dashboard is a required
    /// final output, so model or parse failures propagate to the caller
    /// instead of degrading.
    pub async fn generate_dashboard(
        &self,
        schema: &str,
        user_intent: &str,
    ) -> Result<DashboardConfig> {
        let prompt = prompts::build_dashboard_layout_prompt(schema, user_intent);
        let raw = self.llm.generate(&prompt).await?;
        let value = interpreter::clean_and_parse(&raw)?;
        let config: DashboardConfig = serde_json::from_value(value).map_err(|e| {
            LodestarError::Parse(format!("dashboard layout is not a valid config: {}", e))
        })?;
        info!(
            "generated dashboard '{}' ({} KPIs, {} charts)",
            config.title,
            config.kpi_cards.len(),
            config.charts.len()
        );
        Ok(config)
    }

    /// Propose dashboard ideas from the schema alone. Suggestions are
    /// decorative, so every failure degrades to a usable default list.
    pub async fn suggest_intents(&self, schema: &str) -> Vec<String> {
        let prompt = prompts::build_intent_suggestions_prompt(schema);
        let raw = match self.llm.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => return vec![format!("Error generating suggestions: {}", e)],
        };

        // The reply is a bare JSON array, so the object-span extractor does
        // not apply here.
        let cleaned = interpreter::strip_code_fences(&raw);
        match serde_json::from_str::<Value>(&cleaned) {
            Ok(Value::Array(items)) => {
                let ideas: Vec<String> = items
                    .into_iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect();
                if ideas.is_empty() {
                    fallback_intents()
                } else {
                    ideas
                }
            }
            _ => {
                warn!("intent suggestions were not a JSON list, using defaults");
                fallback_intents()
            }
        }
    }
}

fn fallback_intents() -> Vec<String> {
    vec![
        "Overview of Key Metrics".to_string(),
        "Trends Over Time".to_string(),
        "Category Breakdown".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted(Mutex<VecDeque<String>>);

    impl Scripted {
        fn new<const N: usize>(replies: [&str; N]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                replies.iter().map(|r| r.to_string()).collect(),
            )))
        }
    }

    #[async_trait::async_trait]
    impl LlmGateway for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LodestarError::Llm("script exhausted".to_string()))
        }
    }

    #[tokio::test]
    async fn generates_a_dashboard_from_a_fenced_reply() {
        let reply = r#"```json
{
  "dashboard_title": "Revenue Watch",
  "kpi_cards": [{"id": "kpi_1", "label": "Total Revenue", "sql_query": "SELECT SUM(amount) FROM orders", "format": "currency"}],
  "charts": [{"id": "chart_1", "type": "line", "title": "Monthly Revenue", "sql_query": "SELECT month, SUM(amount) AS total FROM orders GROUP BY month", "x_column": "month", "y_column": "total"}]
}
```"#;
        let architect = Architect::new(Scripted::new([reply]));
        let config = architect.generate_dashboard("TABLE: orders", "revenue").await.unwrap();
        assert_eq!(config.title, "Revenue Watch");
        assert_eq!(config.kpi_cards.len(), 1);
        assert_eq!(config.charts.len(), 1);
    }

    #[tokio::test]
    async fn prose_reply_is_a_terminal_error() {
        let architect = Architect::new(Scripted::new(["I cannot design that dashboard."]));
        assert!(architect.generate_dashboard("TABLE: t", "x").await.is_err());
    }

    #[tokio::test]
    async fn suggestions_parse_a_json_list() {
        let architect = Architect::new(Scripted::new([
            r#"["Churn Analysis", "Pareto Distribution", "Seasonal Trends"]"#,
        ]));
        let ideas = architect.suggest_intents("TABLE: t").await;
        assert_eq!(ideas.len(), 3);
        assert_eq!(ideas[0], "Churn Analysis");
    }

    #[tokio::test]
    async fn prose_suggestions_fall_back_to_defaults() {
        let architect = Architect::new(Scripted::new(["Here are some ideas: churn, trends."]));
        let ideas = architect.suggest_intents("TABLE: t").await;
        assert_eq!(ideas, fallback_intents());
    }
}
