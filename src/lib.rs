pub mod analytics;
pub mod architect;
pub mod config;
pub mod copilot;
pub mod dashboard;
pub mod error;
pub mod forecaster;
pub mod interpreter;
pub mod llm;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod segmentor;
pub mod sql_engine;
pub mod stats;
pub mod tabular;
pub mod workspace;
