use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use coursepath_core::{
    Engine, EngineConfig, HashingEmbedder, InMemoryCatalog, Request, ResponseEvent,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "coursepath", about = "Conversational degree planning assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ask the assistant a question, build a plan, or reschedule a stored plan
    Ask(AskArgs),
}

#[derive(Debug, Args)]
pub struct AskArgs {
    /// Catalog file: a JSON array of course records
    #[arg(short, long)]
    pub catalog: PathBuf,

    /// Conversation id; reuse it to reschedule a plan built earlier
    #[arg(short, long)]
    pub session: String,

    /// Directory holding config.yaml, sessions and logs
    #[arg(short, long, default_value = ".coursepath")]
    pub data_dir: PathBuf,

    /// The student's college
    #[arg(long, default_value = "")]
    pub college: String,

    /// The student's department
    #[arg(long, default_value = "")]
    pub department: String,

    /// Required core course numbers
    #[arg(long = "core", num_args = 1..)]
    pub core: Vec<String>,

    /// Total credits the plan must reach
    #[arg(long, default_value_t = 32)]
    pub max_credits: u32,

    /// Minimum credits per semester
    #[arg(long, default_value_t = 4)]
    pub min_per_sem: u32,

    /// Maximum credits per semester
    #[arg(long, default_value_t = 12)]
    pub max_per_sem: u32,

    /// Number of alternative plans to build
    #[arg(long, default_value_t = 2)]
    pub plans: usize,

    /// Model to use (overrides config.yaml)
    #[arg(short, long)]
    pub model: Option<String>,

    /// The student's message
    pub query: String,
}

impl Cli {
    /// Data directory and session id used to place the log file.
    pub fn log_context(&self) -> (PathBuf, Option<String>) {
        match &self.command {
            Commands::Ask(args) => (args.data_dir.clone(), Some(args.session.clone())),
        }
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Ask(args) => ask(args).await,
        }
    }
}

fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let catalog = InMemoryCatalog::from_json_file(path, Arc::new(HashingEmbedder::default()))
        .with_context(|| format!("failed to load catalog {}", path.display()))?;
    info!(courses = catalog.len(), "catalog loaded");
    Ok(catalog)
}

impl AskArgs {
    fn engine_config(&self) -> EngineConfig {
        match &self.model {
            Some(model) => EngineConfig::builder()
                .data_dir(self.data_dir.clone())
                .model(model.clone())
                .build(),
            None => EngineConfig::builder()
                .data_dir(self.data_dir.clone())
                .build(),
        }
    }

    fn request(&self) -> Request {
        Request::builder()
            .session_id(self.session.clone())
            .query(self.query.clone())
            .college(self.college.clone())
            .department(self.department.clone())
            .core_course_numbers(self.core.clone())
            .max_credits(self.max_credits)
            .min_creds_per_sem(self.min_per_sem)
            .max_creds_per_sem(self.max_per_sem)
            .max_number_of_plans(self.plans)
            .build()
    }
}

/// Stream progress labels to stderr and print the response as JSON.
async fn ask(args: AskArgs) -> Result<()> {
    let catalog = load_catalog(&args.catalog)?;
    let engine = Engine::new(args.engine_config(), Arc::new(catalog))?;

    let mut stream = engine.respond(args.request()).await?;
    while let Some(event) = stream.next().await {
        match event {
            ResponseEvent::Completed(response) => {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }
            ResponseEvent::Error(e) => return Err(e.into()),
            other => {
                if let Some(label) = other.label() {
                    eprintln!("{label}...");
                }
            }
        }
    }
    bail!("request ended without a response")
}
