use console::style;
use dialoguer::{Input, Password};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::auth::CredentialStore;
use crate::config::Config;
use crate::database::Database;
use crate::database::lancedb::IndexStore;
use crate::generation::AnswerGenerator;
use crate::index::build_or_load;
use crate::ollama::OllamaClient;
use crate::pipeline::{FailurePolicy, Pipeline, ingest, load_queries, write_results};
use crate::{RagError, Result};

/// Overrides for a batch run; anything unset falls back to the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub corpus: Option<PathBuf>,
    pub queries: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub continue_on_error: bool,
    pub rebuild_index: bool,
}

/// How a batch run ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed { answered: usize, skipped: usize },
    AuthenticationFailed,
    NoDocuments,
}

async fn open_database(config: &Config) -> Result<Database> {
    std::fs::create_dir_all(config.get_base_dir())?;
    let database = Database::new(config.database_path())
        .await
        .map_err(|e| RagError::Database(format!("{:#}", e)))?;
    Ok(database)
}

/// Create or migrate the metadata database and list the roles it holds
#[inline]
pub async fn setup(config: &Config) -> Result<()> {
    let database = open_database(config).await?;
    println!(
        "{}",
        style(format!(
            "✓ Database ready at {}",
            config.database_path().display()
        ))
        .green()
    );

    let roles = database.list_roles().await?;
    println!();
    println!("{}", style("Roles:").bold().yellow());
    for role in roles {
        let permissions = database.role_permissions(role.id).await?;
        println!(
            "  {} (ID: {}): {}",
            style(&role.name).cyan(),
            role.id,
            if permissions.is_empty() {
                "no categories".to_string()
            } else {
                permissions
                    .iter()
                    .map(|permission| permission.document_category.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        );
    }

    Ok(())
}

#[inline]
pub async fn add_user(
    config: &Config,
    username: &str,
    role: &str,
    password: Option<String>,
) -> Result<()> {
    let database = open_database(config).await?;

    let password = match password {
        Some(password) => password,
        None => Password::new()
            .with_prompt(format!("Password for {}", username))
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()
            .map_err(|e| RagError::Other(e.into()))?,
    };

    let user = database.create_user(username, &password, role).await?;
    println!(
        "{}",
        style(format!(
            "✓ Created user {} (ID: {}) with role {}",
            user.username, user.id, role
        ))
        .green()
    );
    Ok(())
}

#[inline]
pub async fn add_role(config: &Config, name: &str) -> Result<()> {
    let database = open_database(config).await?;
    let role = database.create_role(name).await?;
    println!(
        "{}",
        style(format!(
            "✓ Created role {} (ID: {}); grant it categories with `grant`",
            role.name, role.id
        ))
        .green()
    );
    Ok(())
}

#[inline]
pub async fn list_users(config: &Config) -> Result<()> {
    let database = open_database(config).await?;
    let users = database.user_summaries().await?;

    if users.is_empty() {
        println!("No users yet. Create one with `add-user`.");
        return Ok(());
    }

    println!("{}", style(format!("Users ({}):", users.len())).bold());
    for user in users {
        println!(
            "  {} {:<12} {} accesses",
            style(format!("{:<16}", user.username)).cyan(),
            user.role_name.unwrap_or_else(|| "(no role)".to_string()),
            user.access_count
        );
    }
    Ok(())
}

#[inline]
pub async fn register_document(config: &Config, file: &str, category: &str) -> Result<()> {
    let database = open_database(config).await?;
    let document = database.register_document(file, category).await?;
    println!(
        "{}",
        style(format!(
            "✓ Registered {} (ID: {}) as {}",
            document.file_path, document.id, document.category
        ))
        .green()
    );
    Ok(())
}

#[inline]
pub async fn grant(config: &Config, role: &str, category: &str, revoke: bool) -> Result<()> {
    let database = open_database(config).await?;

    if revoke {
        if database.revoke_permission(role, category).await? {
            println!("Revoked {} from {}", style(category).cyan(), role);
        } else {
            println!("Role {} did not have {}", role, style(category).cyan());
        }
    } else if database.grant_permission(role, category).await? {
        println!("Granted {} to {}", style(category).cyan(), role);
    } else {
        println!("Role {} already has {}", role, style(category).cyan());
    }
    Ok(())
}

#[inline]
pub async fn show_audit(config: &Config, limit: i64) -> Result<()> {
    let database = open_database(config).await?;
    let logs = database.recent_access_logs(limit).await?;

    if logs.is_empty() {
        println!("No access has been logged yet.");
        return Ok(());
    }

    println!(
        "{}",
        style(format!("Recent access ({} entries):", logs.len())).bold()
    );
    for log in logs {
        println!(
            "  {}  {:<8} {:<16} {}",
            log.access_time.format("%Y-%m-%d %H:%M:%S"),
            log.access_status,
            log.username.unwrap_or_else(|| format!("user {}", log.user_id)),
            log.file_path
                .unwrap_or_else(|| "(unregistered document)".to_string())
        );
    }
    Ok(())
}

fn prompt_credentials(options: &RunOptions) -> Result<(String, String)> {
    let username = match &options.username {
        Some(username) => username.clone(),
        None => Input::<String>::new()
            .with_prompt("Username")
            .interact_text()
            .map_err(|e| RagError::Other(e.into()))?,
    };
    let password = match &options.password {
        Some(password) => password.clone(),
        None => Password::new()
            .with_prompt("Password")
            .interact()
            .map_err(|e| RagError::Other(e.into()))?,
    };
    Ok((username, password))
}

/// Authenticate, ingest the corpus, answer every query and save the results.
///
/// Nothing is written to the output file unless the whole batch succeeds.
pub async fn run(config: &Config, options: RunOptions) -> Result<RunStatus> {
    let corpus_dir = options.corpus.clone().unwrap_or_else(|| config.corpus_dir());
    let queries_file = options
        .queries
        .clone()
        .unwrap_or_else(|| config.queries_file());
    let output_file = options
        .output
        .clone()
        .unwrap_or_else(|| config.output_file());
    let failure_policy = if options.continue_on_error {
        FailurePolicy::SkipQuery
    } else {
        config.batch.failure_policy
    };

    let database = open_database(config).await?;

    let (username, password) = prompt_credentials(&options)?;
    let Some(user) = database.authenticate(&username, &password).await? else {
        warn!("Authentication failed for {}", username);
        return Ok(RunStatus::AuthenticationFailed);
    };
    info!("Authenticated {} (role {})", username, user.role_id);

    let chunks = ingest(&corpus_dir, &database, &config.chunking).await?;
    if chunks.is_empty() {
        return Ok(RunStatus::NoDocuments);
    }

    let queries = load_queries(&queries_file)?;

    let client = OllamaClient::new(&config.ollama)?;
    if options.rebuild_index {
        IndexStore::open(&config.index_path()).await?.clear().await?;
    }
    let index = build_or_load(chunks, &config.index_path(), &client, &config.index).await?;

    let pipeline = Pipeline::new(
        &index,
        &client,
        AnswerGenerator::new(&client, config.generation.retry_policy()),
        &database,
        &database,
        config.retrieval.clone(),
    )
    .with_failure_policy(failure_policy);

    let outcome = pipeline.run_batch(user, &queries).await?;
    write_results(&output_file, &outcome.records)?;

    for skipped in &outcome.skipped {
        println!(
            "{}",
            style(format!(
                "⚠ Skipped query {}: {}",
                skipped.query_id, skipped.error
            ))
            .yellow()
        );
    }
    println!("Results saved to {}", output_file.display());

    Ok(RunStatus::Completed {
        answered: outcome.records.len(),
        skipped: outcome.skipped.len(),
    })
}
