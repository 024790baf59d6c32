use anyhow::Result;
use clap::{Parser, Subcommand};
use lodestar::architect::Architect;
use lodestar::config::LlmConfig;
use lodestar::copilot::Copilot;
use lodestar::dashboard::DashboardConfig;
use lodestar::interpreter::AgentAction;
use lodestar::llm::LlmGateway;
use lodestar::planner::Planner;
use lodestar::sql_engine::{DataEngine, QueryGateway};
use lodestar::workspace::{Workspace, DEFAULT_WORKSPACE_FILE};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "lodestar")]
#[command(about = "Agentic analytics: LLM-designed dashboards and autonomous data investigations")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Data file to load (CSV, JSON or Parquet); repeat for multiple tables
    #[arg(short, long, global = true)]
    data: Vec<PathBuf>,

    /// LLM provider: openai or gemini (or set LODESTAR_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model name override (or set LODESTAR_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// API key (or set OPENAI_API_KEY / GEMINI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Path of the workspace store
    #[arg(long, global = true, default_value = DEFAULT_WORKSPACE_FILE)]
    workspace_file: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Design a dashboard for the loaded data
    Dashboard {
        /// What the dashboard should focus on
        #[arg(default_value = "General Overview")]
        intent: String,

        /// Save the result under this workspace name
        #[arg(long)]
        save_as: Option<String>,
    },
    /// Run the autonomous investigation and print the report
    Investigate {
        /// Research objective
        objective: Option<String>,

        /// Start from a saved workspace id
        #[arg(long)]
        from_workspace: Option<String>,
    },
    /// Ask the copilot one question about the data
    Ask {
        question: String,

        /// Focus the conversation on one chart or KPI title
        #[arg(long)]
        focus: Option<String>,

        /// Answer in the context of a saved workspace id
        #[arg(long)]
        from_workspace: Option<String>,
    },
    /// Suggest dashboard ideas for the loaded data
    Suggest,
    /// Manage saved dashboards
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },
}

#[derive(Subcommand)]
enum WorkspaceAction {
    /// List saved dashboards
    List,
    /// Print one saved dashboard
    Show { id: String },
    /// Delete a saved dashboard
    Delete { id: String },
}

struct Session {
    engine: Arc<DataEngine>,
    llm: Arc<dyn LlmGateway>,
    schema: String,
}

fn build_session(
    data: &[PathBuf],
    provider: Option<&str>,
    model: Option<&str>,
    api_key: Option<&str>,
) -> Result<Session> {
    let engine = Arc::new(DataEngine::new());
    for path in data {
        let table = engine.ingest_path(path)?;
        info!("loaded {} as table '{}'", path.display(), table);
    }
    if engine.schema().tables.is_empty() {
        anyhow::bail!("no data loaded; pass --data <file> at least once");
    }

    let llm = LlmConfig::resolve(provider, model, api_key)?.build_gateway();
    let schema = engine.schema().to_string();
    Ok(Session {
        engine,
        llm,
        schema,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let Args {
        command,
        data,
        provider,
        model,
        api_key,
        workspace_file,
    } = Args::parse();
    let workspace = Workspace::new(&workspace_file);

    match command {
        Command::Workspace { action } => handle_workspace(&workspace, &action)?,

        Command::Dashboard { intent, save_as } => {
            let session = build_session(
                &data,
                provider.as_deref(),
                model.as_deref(),
                api_key.as_deref(),
            )?;
            let architect = Architect::new(session.llm.clone());
            let config = architect.generate_dashboard(&session.schema, &intent).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);

            if let Some(name) = save_as {
                let record = workspace
                    .save(&name, &intent, &config, Some(session.llm.as_ref()))
                    .await?;
                println!("\nSaved as workspace '{}'.", record.id);
            }
        }

        Command::Suggest => {
            let session = build_session(
                &data,
                provider.as_deref(),
                model.as_deref(),
                api_key.as_deref(),
            )?;
            let architect = Architect::new(session.llm.clone());
            for (i, idea) in architect.suggest_intents(&session.schema).await.iter().enumerate() {
                println!("{}. {}", i + 1, idea);
            }
        }

        Command::Investigate {
            objective,
            from_workspace,
        } => {
            let session = build_session(
                &data,
                provider.as_deref(),
                model.as_deref(),
                api_key.as_deref(),
            )?;
            let (config, signature) = match from_workspace {
                Some(id) => match workspace.load(&id)? {
                    Some(record) => (record.config, Some(record.context_signature)),
                    None => anyhow::bail!("workspace '{}' not found", id),
                },
                None => (DashboardConfig::default(), None),
            };

            let planner = Planner::new(session.llm.clone(), session.engine.clone());
            let outcome = planner
                .generate_report(&config, objective.as_deref(), signature.as_ref())
                .await?;
            println!("{}", outcome.report);
            if !outcome.errors.is_empty() {
                info!(
                    "{} plan steps failed during the investigation",
                    outcome.errors.len()
                );
            }
        }

        Command::Ask {
            question,
            focus,
            from_workspace,
        } => {
            let session = build_session(
                &data,
                provider.as_deref(),
                model.as_deref(),
                api_key.as_deref(),
            )?;
            let config = match from_workspace {
                Some(id) => match workspace.load(&id)? {
                    Some(record) => record.config,
                    None => anyhow::bail!("workspace '{}' not found", id),
                },
                None => DashboardConfig::default(),
            };

            let copilot = Copilot::new(session.llm.clone(), session.engine.clone());
            let envelope = copilot.process_query(&question, &config, focus.as_deref()).await;
            match envelope.action {
                AgentAction::TextAnswer(text) => println!("{}", text),
                AgentAction::UpdateDashboard(updated) => {
                    println!("Updated dashboard:");
                    println!("{}", serde_json::to_string_pretty(&updated)?);
                }
                AgentAction::UpdateExecutiveSummary(summary) => println!("{}", summary),
            }
            if !envelope.suggestions.is_empty() {
                println!("\nNext: {}", envelope.suggestions.join(" | "));
            }
        }
    }

    Ok(())
}

fn handle_workspace(workspace: &Workspace, action: &WorkspaceAction) -> Result<()> {
    match action {
        WorkspaceAction::List => {
            let records = workspace.list()?;
            if records.is_empty() {
                println!("No saved dashboards.");
            }
            for record in records {
                println!(
                    "{} | {} | {} | {}",
                    record.id, record.name, record.created_at, record.description
                );
            }
        }
        WorkspaceAction::Show { id } => match workspace.load(id)? {
            Some(record) => {
                println!("{} ({})", record.name, record.created_at);
                println!("Intent: {}", record.context_signature.intent);
                println!("Summary: {}", record.context_signature.automated_summary);
                println!("{}", record.config.content_outline());
                println!("{}", serde_json::to_string_pretty(&record.config)?);
            }
            None => println!("Workspace '{}' not found.", id),
        },
        WorkspaceAction::Delete { id } => {
            if workspace.delete(id)? {
                println!("Deleted workspace '{}'.", id);
            } else {
                println!("Workspace '{}' not found.", id);
            }
        }
    }
    Ok(())
}
