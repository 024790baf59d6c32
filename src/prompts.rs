//! Prompt Builders - All LLM prompt text lives here
//!
//! Every prompt the system sends is assembled by a function in this module,
//! so the contract between the agents and the model (output formats, tool
//! vocabularies, JSON shapes) can be reviewed in one place.

use crate::workspace::ContextSignature;

/// Prompt for designing a dashboard layout with embedded SQL.
pub fn build_dashboard_layout_prompt(schema: &str, user_intent: &str) -> String {
    format!(
        r#"You are a Principal Data Architect and SQL expert.
Design a dashboard for the data below and write an optimized SQL query for every visual.

DATABASE SCHEMA:
{}

USER INTENT:
{}

OUTPUT FORMAT (Strict JSON):
{{
    "dashboard_title": "string",
    "kpi_cards": [
        {{
            "id": "kpi_1",
            "label": "Total Revenue",
            "sql_query": "SELECT SUM(sales) FROM sales_data",
            "format": "currency"
        }}
    ],
    "charts": [
        {{
            "id": "chart_1",
            "type": "bar",
            "title": "Sales by Region",
            "sql_query": "SELECT region, SUM(sales) AS total_sales FROM sales_data GROUP BY region ORDER BY total_sales DESC LIMIT 20",
            "x_column": "region",
            "y_column": "total_sales",
            "description": "Top performing regions."
        }}
    ]
}}

RULES:
1. "sql_query" MUST be valid, executable SQL against the tables named in the schema.
2. "type" is one of "bar", "line", "pie". "format" is one of "currency", "percent", "number".
3. Always GROUP BY when using SUM/AVG/COUNT in charts, and add LIMIT 100 to chart queries.
4. KPI queries must return exactly ONE row and ONE column (a single value).
5. Return ONLY the JSON object. No markdown, no commentary."#,
        schema, user_intent
    )
}

/// Prompt for suggesting dashboard ideas from a schema alone.
pub fn build_intent_suggestions_prompt(schema: &str) -> String {
    format!(
        r#"You are a Senior Business Analyst.
Analyze the database schema and generate 7 distinct, high-value dashboard ideas.

DATABASE SCHEMA:
{}

RULES:
1. Focus on business value (e.g. "Customer Churn Analysis", "Inventory Turnover", "Seasonal Sales Trends").
2. Avoid generic titles like "Data Overview". Prefer specific insights like "Cohort Analysis" or "Pareto Distribution".
3. Return ONLY a JSON list of strings. No markdown.

Example Output:
["Sales Performance by Region", "Customer Acquisition Cost Analysis", "Quarterly Revenue Trends"]"#,
        schema
    )
}

/// Prompt for the copilot's first phase: decide whether the command needs a
/// dashboard edit, a summary refresh, or data fetched via SQL.
pub fn build_copilot_investigate_prompt(user_query: &str, schema: &str) -> String {
    format!(
        r#"You are the intent router for an analytics copilot.

DATABASE SCHEMA:
{}

USER COMMAND: "{}"

DECIDE:
1. If the user wants to change the dashboard itself (add, remove or modify charts or KPIs, retitle, change formats), reply with exactly: UPDATE_DASHBOARD
2. If the user wants a narrative readout of what is already on screen, reply with exactly: SUMMARIZE
3. Otherwise reply with ONLY the SQL query needed to answer the question factually. No markdown, no explanation."#,
        schema, user_query
    )
}

/// Prompt for the copilot's final phase: the strict-JSON reply envelope.
pub fn build_copilot_respond_prompt(
    user_query: &str,
    config_json: &str,
    schema: &str,
    focused_context: Option<&str>,
    data_context: &str,
) -> String {
    let context_line = match focused_context {
        Some(target) if !target.trim().is_empty() && !target.contains("Global") => format!(
            "FOCUS AREA: The user is explicitly pointing at this component: '{}'.",
            target
        ),
        _ => "Global Dashboard (the user is asking about the entire dataset or layout).".to_string(),
    };

    format!(
        r#"You are the SQL Co-Pilot for an analytics workbench.

DATABASE SCHEMA:
{}

CURRENT DASHBOARD JSON:
{}

CONTEXT: {}

DATA CONTEXT (fetched for this command):
{}

USER COMMAND: "{}"

INSTRUCTIONS:
1. Decide if this is a Dashboard Update (visual/SQL change), an Executive Summary refresh, or a Text Answer (analysis).
2. IF Update: return "response_type": "update_dashboard" and the FULL updated dashboard JSON in "content".
3. IF Summary: return "response_type": "update_executive_summary" and the summary markup as a string in "content".
4. IF Answer: return "response_type": "text_answer" and the analytical text in "content".
5. ALWAYS provide 2 short, clickable "suggestions" for next steps.

OUTPUT FORMAT (Strict JSON):
{{
    "response_type": "update_dashboard" | "text_answer" | "update_executive_summary",
    "content": "string or json_object",
    "suggestions": ["Action 1", "Action 2"]
}}"#,
        schema, config_json, context_line, data_context, user_query
    )
}

/// Prompt for the planner's hypothesis phase: one `SQL | TOOL` step per line.
pub fn build_plan_prompt(
    user_objective: &str,
    saved_context: Option<&ContextSignature>,
    schema: &str,
) -> String {
    let saved_context_block = saved_context
        .map(|sig| {
            format!(
                r#"
SAVED WORKSPACE CONTEXT:
- Original user intent: "{}"
- Automated summary: "{}"
Use this context to guide the investigation. If the original intent was about churn, keep the analysis focused on churn.
"#,
                sig.intent, sig.automated_summary
            )
        })
        .unwrap_or_default();

    format!(
        r#"You are a Chief Analytics Officer planning a data investigation.

USER OBJECTIVE: "{}"
{}
DATABASE SCHEMA:
{}

TASK: Plan the investigation.
For each logical step, write the specific SQL query and select the analytical tool to apply.

AVAILABLE TOOLS:
- [ANOMALY]: Detect outliers in time series or ranked lists. Use for identifying risks.
- [FORECAST]: Predict future trends. Use for forward-looking questions.
- [SEGMENTATION]: Cluster entities (customers, products) to find groups. Use for "who?" questions.
- [CORRELATION]: Find relationships between metrics. Use for "why?" questions.
- [NONE]: Just fetch data for display.

OUTPUT FORMAT (one step per line, nothing else):
SQL_QUERY | TOOL_NAME"#,
        user_objective, saved_context_block, schema
    )
}

/// Prompt for the planner's layout phase: synthesize the dossier into a
/// board-ready HTML report.
pub fn build_report_prompt(user_objective: &str, dossier: &str) -> String {
    format!(
        r#"You are an elite strategy consultant preparing a board-ready report.

MISSION: Generate an executive HTML report.

USER OBJECTIVE: {}

INTELLIGENCE DOSSIER (includes tool analysis):
{}

DESIGN SYSTEM (CSS):
- Background: #0e1117. Text: #E0E0E0. Font: 'Inter', sans-serif.
- Cards: background rgba(255, 255, 255, 0.05); border 1px solid rgba(255, 255, 255, 0.1); border-radius 8px; padding 20px; margin-bottom 20px.
- Accents: #00E5FF for positives, #FF4B4B for risks.

REPORT STRUCTURE:
1. Title header: report name, objective, date.
2. Executive summary: synthesize the tool results (specific anomalies, forecasts, correlations). Start with the answer.
3. Deep dive analysis grouped by topic. You CANNOT generate images: visualize numbers with CSS progress bars, colored badges and HTML tables.
4. If a SEGMENTATION ANALYSIS is present, add a dedicated card with the cluster table and invent a two-word business persona for each cluster (e.g. 'Cluster 0' -> 'High-Value Loyalists').
5. Risk and opportunity radar: report anomalies as risks and forecasts as opportunities.

Output ONLY the raw HTML. Do not use markdown blocks."#,
        user_objective, dossier
    )
}

/// Prompt for inferring a segmentation strategy from a data sample.
pub fn build_segmentation_strategy_prompt(sample_markdown: &str) -> String {
    format!(
        r#"You are a Data Science Architect. Analyze this data sample to determine the best entity segmentation strategy.

DATA SAMPLE:
{}

TASK:
1. Identify the entity id column (customer id, product id, user id, ...).
2. Identify the best numerical features for clustering.
   - If transaction data (date, amount) is present, suggest "RFM" (Recency, Frequency, Monetary).
   - If behavioral data (duration, clicks, logins) is present, suggest "Generic" and list the columns.
   - If product data (price, stock) is present, suggest "Generic".

OUTPUT JSON ONLY (no markdown):
{{
    "strategy_type": "RFM" or "Generic",
    "id_col": "column_name_for_id",
    "date_col": "column_name_for_date (only if RFM)",
    "amount_col": "column_name_for_amount (only if RFM)",
    "feature_cols": ["col1", "col2"] (only if Generic)
}}"#,
        sample_markdown
    )
}

/// Prompt for the one-sentence context signature stored with a saved
/// workspace.
pub fn build_context_signature_prompt(
    chart_titles: &[String],
    kpi_labels: &[String],
    description: &str,
) -> String {
    format!(
        r#"Generate a context signature for this dashboard configuration.

Charts: {:?}
KPIs: {:?}
User description: "{}"

Task: summarize the ANALYTICAL INTENT in one sentence (e.g. "Investigating Q3 regional sales dip."). Reply with the sentence only."#,
        chart_titles, kpi_labels, description
    )
}
