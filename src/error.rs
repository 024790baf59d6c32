use thiserror::Error;

#[derive(Error, Debug)]
pub enum LodestarError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Statistics error: {0}")]
    Stats(String),

    #[error("Segmentation error: {0}")]
    Segmentation(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

pub type Result<T> = std::result::Result<T, LodestarError>;
