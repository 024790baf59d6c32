//! Response Interpreter Module
//!
//! LLM replies arrive as markdown-fenced, prose-wrapped, loosely-typed JSON.
//! This module normalizes that text into a typed action envelope: fences are
//! stripped, the outermost JSON object is extracted, and the declared
//! response type is validated against its payload before anything downstream
//! trusts it.

use crate::dashboard::DashboardConfig;
use crate::error::{LodestarError, Result};
use serde_json::Value;

/// Remove markdown code fences (with or without language tags) anywhere in
/// the text, leaving the fenced content in place.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "")
        .replace("```sql", "")
        .replace("```html", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Extract the span from the first '{' to the last '}'. Tolerates leading
/// and trailing prose around the object.
pub fn extract_json_object(raw: &str) -> Result<String> {
    let start = raw
        .find('{')
        .ok_or_else(|| LodestarError::Parse("no JSON object found in response".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| LodestarError::Parse("unterminated JSON object in response".to_string()))?;
    if end < start {
        return Err(LodestarError::Parse(
            "malformed JSON object in response".to_string(),
        ));
    }
    Ok(raw[start..=end].to_string())
}

/// Fence-strip, span-extract and parse a raw LLM reply into JSON.
pub fn clean_and_parse(raw: &str) -> Result<Value> {
    let cleaned = strip_code_fences(raw);
    let span = extract_json_object(&cleaned)?;
    let value: Value = serde_json::from_str(&span)?;
    Ok(value)
}

/// What the conversational agent decided to do.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    UpdateDashboard(DashboardConfig),
    TextAnswer(String),
    UpdateExecutiveSummary(String),
}

/// A validated agent reply: the action plus follow-up suggestions.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEnvelope {
    pub action: AgentAction,
    pub suggestions: Vec<String>,
}

impl AgentEnvelope {
    /// Parse the strict reply format
    /// `{"response_type": ..., "content": ..., "suggestions": [...]}`.
    ///
    /// The declared type is validated against its payload: an
    /// `update_dashboard` whose content is not a parsable dashboard config
    /// is an error, as is a summary whose content is not text. Unrecognized
    /// types degrade to a text answer.
    pub fn parse(raw: &str) -> Result<Self> {
        let value = clean_and_parse(raw)?;
        let response_type = value
            .get("response_type")
            .and_then(|v| v.as_str())
            .unwrap_or("text_answer")
            .to_lowercase();
        let suggestions = parse_suggestions(&value);
        let content = value.get("content").cloned().unwrap_or(Value::Null);

        let action = match response_type.as_str() {
            "update_dashboard" => {
                let config: DashboardConfig = serde_json::from_value(content).map_err(|e| {
                    LodestarError::Parse(format!("update_dashboard content is not a valid dashboard config: {}", e))
                })?;
                AgentAction::UpdateDashboard(config)
            }
            "update_executive_summary" => {
                let text = content.as_str().ok_or_else(|| {
                    LodestarError::Parse(
                        "update_executive_summary content must be text".to_string(),
                    )
                })?;
                AgentAction::UpdateExecutiveSummary(text.to_string())
            }
            _ => AgentAction::TextAnswer(content_as_text(&content)),
        };

        Ok(AgentEnvelope {
            action,
            suggestions,
        })
    }

    /// Safe envelope for callers recovering from a parse failure. The raw
    /// error never reaches the conversation unexplained.
    pub fn fallback(context: impl Into<String>) -> Self {
        AgentEnvelope {
            action: AgentAction::TextAnswer(context.into()),
            suggestions: vec![
                "Try rephrasing your question".to_string(),
                "Ask for a specific metric".to_string(),
            ],
        }
    }
}

fn parse_suggestions(value: &Value) -> Vec<String> {
    value
        .get("suggestions")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn content_as_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
