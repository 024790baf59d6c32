mod common;

use common::ScriptedLlm;
use lodestar::copilot::Copilot;
use lodestar::dashboard::DashboardConfig;
use lodestar::interpreter::AgentAction;
use lodestar::sql_engine::DataEngine;
use polars::prelude::*;
use std::sync::Arc;

fn orders_engine() -> Result<Arc<DataEngine>, Box<dyn std::error::Error>> {
    let engine = DataEngine::new();
    engine.register_frame(
        "orders",
        df![
            "region" => ["east", "west", "north"],
            "amount" => [120.0, 45.0, 80.0]
        ]?,
    )?;
    Ok(Arc::new(engine))
}

#[tokio::test]
async fn factual_question_carries_a_data_preview_into_the_reply() -> Result<(), Box<dyn std::error::Error>> {
    let llm = ScriptedLlm::new(&[
        // investigate phase emits SQL
        "```sql\nSELECT region, SUM(amount) AS total FROM orders GROUP BY region;\n```",
        // respond phase answers
        r#"{"response_type": "text_answer", "content": "East leads at 120.", "suggestions": ["Split by month", "Check west margins"]}"#,
    ]);
    let copilot = Copilot::new(llm.clone(), orders_engine()?);

    let envelope = copilot
        .process_query("which region sells the most?", &DashboardConfig::default(), None)
        .await;

    assert_eq!(
        envelope.action,
        AgentAction::TextAnswer("East leads at 120.".to_string())
    );
    assert_eq!(envelope.suggestions, vec!["Split by month", "Check west margins"]);

    // fences and the trailing semicolon are stripped before execution, and
    // the respond prompt sees the fetched rows
    let prompts = llm.prompts_seen();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("[Query]: SELECT region, SUM(amount) AS total FROM orders GROUP BY region"));
    assert!(prompts[1].contains("| region | total |"), "prompt: {}", prompts[1]);
    assert!(prompts[1].contains("DATA CONTEXT"));
    Ok(())
}

#[tokio::test]
async fn dashboard_edit_skips_the_query_and_returns_a_config() -> Result<(), Box<dyn std::error::Error>> {
    let llm = ScriptedLlm::new(&[
        "UPDATE_DASHBOARD",
        r#"{"response_type": "update_dashboard", "content": {"dashboard_title": "Orders (lean)", "kpi_cards": [], "charts": []}, "suggestions": ["Add a trend chart", "Save this layout"]}"#,
    ]);
    let copilot = Copilot::new(llm.clone(), orders_engine()?);

    let envelope = copilot
        .process_query("remove everything but the title", &DashboardConfig::default(), Some("Orders Overview"))
        .await;

    match envelope.action {
        AgentAction::UpdateDashboard(config) => assert_eq!(config.title, "Orders (lean)"),
        other => panic!("expected an update, got {:?}", other),
    }

    let prompts = llm.prompts_seen();
    assert!(prompts[1].contains("The user wants a dashboard update. No data was fetched."));
    assert!(prompts[1].contains("FOCUS AREA"));
    assert!(prompts[1].contains("Orders Overview"));
    Ok(())
}

#[tokio::test]
async fn failed_sql_is_reported_inline_not_fatally() -> Result<(), Box<dyn std::error::Error>> {
    let llm = ScriptedLlm::new(&[
        "SELECT sum(amount) FROM not_a_table",
        r#"{"response_type": "text_answer", "content": "I could not find that table.", "suggestions": []}"#,
    ]);
    let copilot = Copilot::new(llm.clone(), orders_engine()?);

    let envelope = copilot
        .process_query("total for the archive table?", &DashboardConfig::default(), None)
        .await;

    assert_eq!(
        envelope.action,
        AgentAction::TextAnswer("I could not find that table.".to_string())
    );
    let prompts = llm.prompts_seen();
    assert!(prompts[1].contains("Query failed:"), "prompt: {}", prompts[1]);
    Ok(())
}

#[tokio::test]
async fn unparsable_reply_degrades_to_a_fallback_answer() -> Result<(), Box<dyn std::error::Error>> {
    let llm = ScriptedLlm::new(&["SUMMARIZE", "Sure! Sales look healthy overall."]);
    let copilot = Copilot::new(llm.clone(), orders_engine()?);

    let envelope = copilot
        .process_query("summarize the dashboard", &DashboardConfig::default(), None)
        .await;

    match envelope.action {
        AgentAction::TextAnswer(text) => {
            assert!(text.contains("error parsing the response"), "text: {}", text)
        }
        other => panic!("expected fallback text, got {:?}", other),
    }
    assert!(!envelope.suggestions.is_empty());
    Ok(())
}
