//! Investigation Planner Module
//!
//! The autonomous research pipeline, four phases per run:
//!
//! 1. Recall: re-run every KPI and chart on the current dashboard to set a
//!    baseline context (failing queries are skipped, not fatal).
//! 2. Hypothesis: ask the language model for a plan, one `SQL | TOOL` step
//!    per line, biased by the user objective and any saved workspace
//!    context.
//! 3. Reasoning: execute each step and route non-empty results to the named
//!    statistical tool, folding everything into a textual dossier. Step
//!    failures are logged and the fold continues.
//! 4. Layout: one synthesis call turns the dossier into a report. This is
//!    the only call whose failure is terminal, because without it there is
//!    no output to show.

use crate::analytics;
use crate::dashboard::DashboardConfig;
use crate::error::Result;
use crate::interpreter;
use crate::llm::LlmGateway;
use crate::plan::{InvestigationPlan, ToolKind};
use crate::prompts;
use crate::segmentor::Segmentor;
use crate::sql_engine::QueryGateway;
use crate::tabular;
use crate::workspace::ContextSignature;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rows of each query result replayed into prompts.
const SAMPLE_ROWS: usize = 5;
/// Anomaly quota for planner-routed detection.
const CONTAMINATION: f64 = 0.05;
/// Horizon for planner-routed forecasts, in buckets.
const FORECAST_PERIODS: usize = 6;
/// Cluster count for planner-routed segmentation.
const SEGMENTATION_CLUSTERS: usize = 4;

pub struct Planner {
    llm: Arc<dyn LlmGateway>,
    gateway: Arc<dyn QueryGateway>,
    segmentor: Segmentor,
}

/// Everything a run produced: the synthesized report plus the raw dossier
/// and error log for audit.
pub struct PlannerOutcome {
    pub report: String,
    pub dossier: String,
    pub errors: Vec<String>,
    pub steps_run: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmGateway>, gateway: Arc<dyn QueryGateway>) -> Self {
        let segmentor = Segmentor::new(llm.clone());
        Self {
            llm,
            gateway,
            segmentor,
        }
    }

    /// Run the full pipeline against the live dashboard.
    pub async fn generate_report(
        &self,
        dashboard_config: &DashboardConfig,
        user_objective: Option<&str>,
        context_signature: Option<&ContextSignature>,
    ) -> Result<PlannerOutcome> {
        let run_id = Uuid::new_v4();
        let objective = user_objective.unwrap_or("General Performance Audit");
        info!("investigation {} started: {}", run_id, objective);

        let audit = self.recall_phase(dashboard_config);

        let plan = self.hypothesis_phase(objective, context_signature).await;
        info!("investigation {} planned {} steps", run_id, plan.steps.len());

        let mut errors = Vec::new();
        let deep_dive = self.reasoning_phase(&plan, &mut errors).await;

        let dossier = format!("{}\n{}", audit, deep_dive);
        let report = self.layout_phase(objective, &dossier).await?;
        info!(
            "investigation {} finished ({} steps, {} errors)",
            run_id,
            plan.steps.len(),
            errors.len()
        );

        Ok(PlannerOutcome {
            report,
            dossier,
            errors,
            steps_run: plan.steps.len(),
        })
    }

    /// Phase 1: capture the dashboard's current numbers as baseline context.
    /// Best effort throughout; a failing visual is simply absent.
    fn recall_phase(&self, config: &DashboardConfig) -> String {
        let mut log = String::from("### 1. DASHBOARD AUDIT (Baseline Data)\n");

        if !config.kpi_cards.is_empty() {
            log.push_str("\n[METRICS]\n");
            for kpi in &config.kpi_cards {
                match self.gateway.run_query(&kpi.sql_query) {
                    Ok(df) => {
                        let value = tabular::scalar_f64(&df)
                            .map(|v| kpi.format.format_value(v))
                            .or_else(|| tabular::scalar_text(&df))
                            .unwrap_or_else(|| "N/A".to_string());
                        log.push_str(&format!("- {}: {}\n", kpi.label, value));
                    }
                    Err(e) => debug!("KPI audit skipped '{}': {}", kpi.label, e),
                }
            }
        }

        if !config.charts.is_empty() {
            log.push_str("\n[TRENDS]\n");
            for chart in &config.charts {
                match self.gateway.run_query(&chart.sql_query) {
                    Ok(df) if df.height() > 0 => {
                        log.push_str(&format!(
                            "\nCHART: {}\nStats:\n{}\nSample:\n{}\n",
                            chart.title,
                            tabular::numeric_profile(&df),
                            tabular::head_markdown(&df, SAMPLE_ROWS)
                        ));
                    }
                    Ok(_) => debug!("chart audit skipped '{}': empty result", chart.title),
                    Err(e) => debug!("chart audit skipped '{}': {}", chart.title, e),
                }
            }
        }

        log
    }

    /// Phase 2: ask for the plan. A failed call degrades to an empty plan
    /// so the run still produces a (thin) report from the audit alone.
    async fn hypothesis_phase(
        &self,
        objective: &str,
        context_signature: Option<&ContextSignature>,
    ) -> InvestigationPlan {
        let schema = self.gateway.schema().to_string();
        let prompt = prompts::build_plan_prompt(objective, context_signature, &schema);
        match self.llm.generate(&prompt).await {
            Ok(raw) => InvestigationPlan::parse(&raw),
            Err(e) => {
                warn!("hypothesis phase failed, continuing with empty plan: {}", e);
                InvestigationPlan::default()
            }
        }
    }

    /// Phase 3: fold over plan steps, accumulating the dossier and the
    /// error log separately. No step aborts the loop.
    async fn reasoning_phase(&self, plan: &InvestigationPlan, errors: &mut Vec<String>) -> String {
        let mut log = String::from("\n### 2. DEEP DIVE INVESTIGATION\n");

        for step in &plan.steps {
            let df = match self.gateway.run_query(&step.sql) {
                Ok(df) => df,
                Err(e) => {
                    warn!("plan step failed: {}", e);
                    log.push_str(&format!("[Error executing plan step]: {}\n", e));
                    errors.push(e.to_string());
                    continue;
                }
            };
            if df.height() == 0 {
                debug!("plan step returned no rows, skipping: {}", step.sql);
                continue;
            }

            log.push_str(&format!(
                "\n[Query]: {}\nData Snapshot:\n{}\n",
                step.sql,
                tabular::head_markdown(&df, SAMPLE_ROWS)
            ));

            let insight = self.route_tool(step.tool, &df).await;
            if !insight.is_empty() {
                log.push_str(&format!("TOOL RESULT ({}):\n{}\n", step.tool.name(), insight));
            }
        }

        log
    }

    /// Tool routing over a non-empty result. Anomaly and forecast need at
    /// least two columns: position 0 is the label or date, position 1 the
    /// metric. A result too narrow for its tool yields no insight rather
    /// than an error.
    async fn route_tool(&self, tool: ToolKind, df: &polars::prelude::DataFrame) -> String {
        let columns = df.get_column_names();
        match tool {
            ToolKind::Segmentation => {
                let sample = tabular::head_markdown(df, SAMPLE_ROWS);
                match self.segmentor.suggest_strategy(&sample).await {
                    Some(strategy) => {
                        let body = match self.segmentor.execute(df, &strategy, SEGMENTATION_CLUSTERS)
                        {
                            Ok(segmentation) => segmentation.summary_markdown,
                            Err(e) => e.to_string(),
                        };
                        format!("SEGMENTATION ANALYSIS:\n{}", body)
                    }
                    None => "Segmentation failed to determine strategy.".to_string(),
                }
            }
            ToolKind::Anomaly if columns.len() >= 2 => {
                analytics::detect_anomalies(df, columns[1], CONTAMINATION)
            }
            ToolKind::Forecast if columns.len() >= 2 => {
                analytics::generate_forecast(df, columns[0], columns[1], FORECAST_PERIODS)
            }
            ToolKind::Correlation => analytics::check_correlations(df),
            _ => String::new(),
        }
    }

    /// Phase 4: synthesize. The only terminal failure in the pipeline.
    async fn layout_phase(&self, objective: &str, dossier: &str) -> Result<String> {
        let prompt = prompts::build_report_prompt(objective, dossier);
        let raw = self.llm.generate(&prompt).await?;
        Ok(interpreter::strip_code_fences(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::DashboardConfig;
    use crate::error::{LodestarError, Result};
    use crate::sql_engine::DataEngine;
    use polars::prelude::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted(Mutex<VecDeque<String>>);

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

    fn engine() -> Arc<DataEngine> {
        let engine = DataEngine::new();
        engine
            .register_frame(
                "sales",
                df![
                    "region" => ["east", "west", "north", "south"],
                    "revenue" => [100.0, 80.0, 20.0, 55.0]
                ]
                .unwrap(),
            )
            .unwrap();
        Arc::new(engine)
    }

    fn planner_with(replies: &[&str]) -> Planner {
        let llm = Arc::new(Scripted(Mutex::new(
            replies.iter().map(|r| r.to_string()).collect(),
        )));
        Planner::new(llm, engine())
    }

    fn dashboard() -> DashboardConfig {
        serde_json::from_str(
            r#"{
                "dashboard_title": "Sales",
                "kpi_cards": [{"id": "k1", "label": "Total Revenue", "sql_query": "SELECT SUM(revenue) FROM sales", "format": "currency"}],
                "charts": [{"id": "c1", "type": "bar", "title": "Revenue by Region", "sql_query": "SELECT region, revenue FROM sales", "x_column": "region", "y_column": "revenue"}]
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn full_run_produces_report_and_dossier() {
        let planner = planner_with(&[
            // hypothesis: one data fetch, one correlation probe
            "SELECT region, revenue FROM sales | NONE\nSELECT region, revenue FROM sales | CORRELATION",
            // layout
            "```html\n<h1>Findings</h1>\n```",
        ]);
        let outcome = planner
            .generate_report(&dashboard(), Some("where is revenue soft?"), None)
            .await
            .unwrap();

        assert_eq!(outcome.report, "<h1>Findings</h1>");
        assert_eq!(outcome.steps_run, 2);
        assert!(outcome.errors.is_empty());
        assert!(outcome.dossier.contains("### 1. DASHBOARD AUDIT"));
        assert!(outcome.dossier.contains("- Total Revenue: $255.00"));
        assert!(outcome.dossier.contains("CHART: Revenue by Region"));
        assert!(outcome.dossier.contains("### 2. DEEP DIVE INVESTIGATION"));
        assert!(outcome.dossier.contains("[Query]: SELECT region, revenue FROM sales"));
    }

    #[tokio::test]
    async fn failing_step_is_logged_and_the_run_continues() {
        let planner = planner_with(&[
            "SELECT nope FROM missing | NONE\nSELECT region, revenue FROM sales | NONE",
            "<p>done</p>",
        ]);
        let outcome = planner
            .generate_report(&DashboardConfig::default(), None, None)
            .await
            .unwrap();

        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.dossier.contains("[Error executing plan step]"));
        assert!(outcome.dossier.contains("Data Snapshot"));
        assert_eq!(outcome.report, "<p>done</p>");
    }

    #[tokio::test]
    async fn failed_hypothesis_degrades_to_audit_only_report() {
        // Scripted gateway returns an error for the plan call, then the
        // layout call gets the next reply. One reply only: plan fails first.
        struct PlanFails(Mutex<usize>);
        #[async_trait::async_trait]
        impl LlmGateway for PlanFails {
            async fn generate(&self, _prompt: &str) -> Result<String> {
                let mut calls = self.0.lock().unwrap();
                *calls += 1;
                if *calls == 1 {
                    Err(LodestarError::Llm("model offline".to_string()))
                } else {
                    Ok("<p>audit only</p>".to_string())
                }
            }
        }
        let planner = Planner::new(Arc::new(PlanFails(Mutex::new(0))), engine());
        let outcome = planner
            .generate_report(&DashboardConfig::default(), None, None)
            .await
            .unwrap();
        assert_eq!(outcome.steps_run, 0);
        assert_eq!(outcome.report, "<p>audit only</p>");
    }

    #[tokio::test]
    async fn failed_synthesis_is_terminal() {
        let planner = planner_with(&["SELECT region, revenue FROM sales | NONE"]);
        let result = planner
            .generate_report(&DashboardConfig::default(), None, None)
            .await;
        assert!(result.is_err());
    }
}
