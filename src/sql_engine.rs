//! Query Engine Module
//!
//! `QueryGateway` is the seam between the agentic pipeline and whatever
//! holds the data: the planner, copilot and audit only ever see "SQL in,
//! frame out". `DataEngine` is the in-process implementation over the
//! Polars SQL context, with file ingestion and schema tracking.

use crate::error::{LodestarError, Result};
use crate::tabular;
use polars::prelude::*;
use polars::sql::SQLContext;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Execute SQL against the session's tables and describe what is loaded.
pub trait QueryGateway: Send + Sync {
    fn run_query(&self, sql: &str) -> Result<DataFrame>;
    fn schema(&self) -> SchemaDescription;
}

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Tables in ingestion order, renderable as prompt text.
#[derive(Debug, Clone, Default)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tables.is_empty() {
            return write!(f, "No data loaded.");
        }
        let mut blocks = Vec::new();
        for table in &self.tables {
            let mut lines = vec![format!("TABLE: {}", table.name), "COLUMNS:".to_string()];
            for col in &table.columns {
                lines.push(format!("- {} ({})", col.name, col.dtype));
            }
            blocks.push(lines.join("\n"));
        }
        write!(f, "{}", blocks.join("\n\n"))
    }
}

/// In-process SQL engine over Polars frames. One per analysis session; the
/// context sits behind a mutex so a shared reference can serve the whole
/// pipeline.
pub struct DataEngine {
    ctx: Mutex<SQLContext>,
    tables: Mutex<Vec<TableSchema>>,
}

impl DataEngine {
    pub fn new() -> Self {
        Self {
            ctx: Mutex::new(SQLContext::new()),
            tables: Mutex::new(Vec::new()),
        }
    }

    /// Load a CSV/JSON/Parquet file as a table named after the sanitized
    /// file stem. Returns the table name.
    pub fn ingest_path(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("source_data");
        let mut name = tabular::sanitize_name(stem);
        if name.is_empty() {
            name = "source_data".to_string();
        }
        let df = Self::read_file(path)?;
        self.register_frame(&name, df)?;
        Ok(name)
    }

    fn read_file(path: &Path) -> Result<DataFrame> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "csv" => LazyCsvReader::new(path)
                .with_try_parse_dates(true)
                .with_infer_schema_length(Some(1000))
                .finish()
                .map_err(|e| LodestarError::Query(format!("Failed to read CSV: {}", e)))?
                .collect()
                .map_err(|e| LodestarError::Query(format!("Failed to load CSV: {}", e))),
            "json" => {
                let file = std::fs::File::open(path)?;
                JsonReader::new(file)
                    .finish()
                    .map_err(|e| LodestarError::Query(format!("Failed to read JSON: {}", e)))
            }
            "parquet" => LazyFrame::scan_parquet(path, ScanArgsParquet::default())
                .map_err(|e| LodestarError::Query(format!("Failed to scan Parquet: {}", e)))?
                .collect()
                .map_err(|e| LodestarError::Query(format!("Failed to load Parquet: {}", e))),
            other => Err(LodestarError::Query(format!(
                "unsupported file type '{}': expected csv, json or parquet",
                other
            ))),
        }
    }

    /// Register an in-memory frame under a table name, sanitizing column
    /// names. Re-registering a name replaces the table.
    pub fn register_frame(&self, name: &str, mut df: DataFrame) -> Result<()> {
        let sanitized: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|c| {
                let cleaned = tabular::sanitize_name(c);
                if cleaned.is_empty() {
                    c.to_string()
                } else {
                    cleaned
                }
            })
            .collect();
        df.set_column_names(&sanitized)?;

        let columns: Vec<ColumnSchema> = df
            .get_column_names()
            .iter()
            .zip(df.dtypes().iter())
            .map(|(col_name, dtype)| ColumnSchema {
                name: col_name.to_string(),
                dtype: dtype.to_string(),
            })
            .collect();

        info!("registering table '{}' ({} rows)", name, df.height());
        {
            let mut tables = self
                .tables
                .lock()
                .map_err(|_| LodestarError::Query("schema registry lock poisoned".to_string()))?;
            tables.retain(|t| t.name != name);
            tables.push(TableSchema {
                name: name.to_string(),
                columns,
            });
        }
        self.ctx
            .lock()
            .map_err(|_| LodestarError::Query("query context lock poisoned".to_string()))?
            .register(name, df.lazy());
        Ok(())
    }
}

impl QueryGateway for DataEngine {
    fn run_query(&self, sql: &str) -> Result<DataFrame> {
        debug!("executing SQL: {}", sql);
        let lazy = {
            let mut ctx = self
                .ctx
                .lock()
                .map_err(|_| LodestarError::Query("query context lock poisoned".to_string()))?;
            ctx.execute(sql)
                .map_err(|e| LodestarError::Query(format!("SQL execution failed: {}", e)))?
        };
        lazy.collect()
            .map_err(|e| LodestarError::Query(format!("SQL execution failed: {}", e)))
    }

    fn schema(&self) -> SchemaDescription {
        SchemaDescription {
            tables: self.tables.lock().map(|t| t.clone()).unwrap_or_default(),
        }
    }
}
