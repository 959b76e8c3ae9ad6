use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;

use rolerag::commands::{
    RunOptions, RunStatus, add_role, add_user, grant, list_users, register_document, run, setup,
    show_audit,
};
use rolerag::config::{Config, get_config_dir, run_interactive_config, show_config};
use rolerag::{RagError, Result};

#[derive(Parser)]
#[command(name = "rolerag")]
#[command(about = "Role-aware question answering over a private document corpus")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, the metadata database and the index
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Ollama connection, or show the effective configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Create the metadata database with the default roles
    Setup,
    /// Create a user; the password is prompted for
    AddUser {
        username: String,
        /// Role name, e.g. admin, researcher or student
        #[arg(long)]
        role: String,
    },
    /// List users with their role and logged access count
    Users,
    /// Create a role with no permitted categories
    AddRole { name: String },
    /// Register a corpus file under an access category
    RegisterDocument {
        file: String,
        #[arg(long)]
        category: String,
    },
    /// Allow a role to see a document category
    Grant {
        #[arg(long)]
        role: String,
        #[arg(long)]
        category: String,
        /// Remove the permission instead
        #[arg(long)]
        revoke: bool,
    },
    /// Answer a batch of queries on behalf of an authenticated user
    Run {
        /// Directory of .txt and .pdf documents
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// JSON array of {"query_id", "question"} records
        #[arg(long)]
        queries: Option<PathBuf>,
        /// Where the answer records are written
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, env = "ROLERAG_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Skip failed queries instead of aborting the batch
        #[arg(long)]
        continue_on_error: bool,
        /// Discard any persisted index and embed the corpus again
        #[arg(long)]
        rebuild_index: bool,
    },
    /// Show recent entries of the access log
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

async fn execute(command: Commands, config_dir: PathBuf) -> Result<()> {
    if let Commands::Config { show: false } = command {
        return Ok(run_interactive_config(&config_dir)?);
    }

    let config = Config::load(&config_dir)?;

    match command {
        Commands::Config { .. } => show_config(&config)?,
        Commands::Setup => setup(&config).await?,
        Commands::AddUser { username, role } => add_user(&config, &username, &role, None).await?,
        Commands::Users => list_users(&config).await?,
        Commands::AddRole { name } => add_role(&config, &name).await?,
        Commands::RegisterDocument { file, category } => {
            register_document(&config, &file, &category).await?;
        }
        Commands::Grant {
            role,
            category,
            revoke,
        } => grant(&config, &role, &category, revoke).await?,
        Commands::Run {
            corpus,
            queries,
            output,
            username,
            password,
            continue_on_error,
            rebuild_index,
        } => {
            let options = RunOptions {
                corpus,
                queries,
                output,
                username,
                password,
                continue_on_error,
                rebuild_index,
            };
            match run(&config, options).await? {
                RunStatus::Completed { .. } => {}
                RunStatus::AuthenticationFailed => println!("Authentication failed."),
                RunStatus::NoDocuments => println!("No valid documents found."),
            }
        }
        Commands::Audit { limit } => show_audit(&config, limit).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir.map_or_else(get_config_dir, Ok) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{}", style(format!("Unexpected error: {}", e)).red());
            return ExitCode::FAILURE;
        }
    };

    match execute(cli.command, config_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RagError::NotFound(message)) => {
            eprintln!("{}", style(format!("Error: {}", message)).red());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", style(format!("Unexpected error: {}", e)).red());
            ExitCode::FAILURE
        }
    }
}
