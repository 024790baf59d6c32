//! Conversational Copilot Module
//!
//! Handles one chat command per call in three phases. Investigate asks the
//! model whether the command is a dashboard edit, a summary refresh, or a
//! factual question (answered by emitting SQL). Execute runs any emitted
//! SQL with a bounded preview. Respond asks for the strict-JSON reply
//! envelope and parses it through the interpreter. Nothing here is fatal:
//! every failure path lands in a fallback text envelope.

use crate::dashboard::DashboardConfig;
use crate::interpreter::AgentEnvelope;
use crate::llm::LlmGateway;
use crate::plan;
use crate::prompts;
use crate::sql_engine::QueryGateway;
use crate::tabular;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rows of fetched data replayed into the respond prompt. Bounds prompt
/// size, not correctness.
const PREVIEW_ROWS: usize = 10;

pub struct Copilot {
    llm: Arc<dyn LlmGateway>,
    gateway: Arc<dyn QueryGateway>,
}

impl Copilot {
    pub fn new(llm: Arc<dyn LlmGateway>, gateway: Arc<dyn QueryGateway>) -> Self {
        Self { llm, gateway }
    }

    /// Answer one user command against the current dashboard.
    /// `focused_context` narrows the conversation to one component when the
    /// user has selected a chart or KPI.
    pub async fn process_query(
        &self,
        user_query: &str,
        current_config: &DashboardConfig,
        focused_context: Option<&str>,
    ) -> AgentEnvelope {
        let schema = self.gateway.schema().to_string();

        let intent = match self
            .llm
            .generate(&prompts::build_copilot_investigate_prompt(user_query, &schema))
            .await
        {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!("copilot investigate call failed: {}", e);
                return AgentEnvelope::fallback(format!("The assistant is unavailable: {}", e));
            }
        };
        debug!("copilot intent: {}", intent);

        let data_context = self.execute_intent(&intent);

        let config_json =
            serde_json::to_string(current_config).unwrap_or_else(|_| "{}".to_string());
        let respond_prompt = prompts::build_copilot_respond_prompt(
            user_query,
            &config_json,
            &schema,
            focused_context,
            &data_context,
        );
        let raw = match self.llm.generate(&respond_prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("copilot respond call failed: {}", e);
                return AgentEnvelope::fallback(format!("The assistant is unavailable: {}", e));
            }
        };

        match AgentEnvelope::parse(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("copilot reply did not parse: {}", e);
                AgentEnvelope::fallback(format!(
                    "I analyzed the data but encountered an error parsing the response. Raw output: {}",
                    e
                ))
            }
        }
    }

    /// Phase two. Keyword intents fetch nothing; anything else is treated
    /// as SQL. A failing query becomes inline context for the respond
    /// phase, never an error.
    fn execute_intent(&self, intent: &str) -> String {
        let upper = intent.to_uppercase();
        if upper.contains("UPDATE_DASHBOARD") {
            return "The user wants a dashboard update. No data was fetched.".to_string();
        }
        if upper.contains("SUMMARIZE") {
            return "The user wants an executive summary of the current dashboard. No data was fetched.".to_string();
        }

        let sql = plan::clean_sql(intent);
        if sql.is_empty() {
            return "No query was required.".to_string();
        }
        match self.gateway.run_query(&sql) {
            Ok(df) => format!(
                "[Query]: {}\n{}",
                sql,
                tabular::head_markdown(&df, PREVIEW_ROWS)
            ),
            Err(e) => format!("Query failed: {}", e),
        }
    }
}
