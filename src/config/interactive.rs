use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::Path;

use super::{Config, OllamaConfig};
use crate::ollama::OllamaClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    println!("{}", style("🔧 RoleRAG Configuration Setup").bold().cyan());
    println!();

    let mut config = load_existing_config(config_dir)?;

    println!("{}", style("Ollama Configuration").bold().yellow());
    println!("Configure the local Ollama instance used for embeddings and answers.");
    println!();

    configure_ollama(&mut config.ollama)?;

    println!();
    println!("{}", style("Testing configuration...").yellow());

    match OllamaClient::new(&config.ollama).and_then(|client| client.health_check()) {
        Ok(()) => println!("{}", style("✓ Ollama connection successful!").green()),
        Err(e) => {
            println!("{}", style(format!("⚠ Warning: {}", e)).yellow());
            println!("You can continue, but make sure Ollama is running before a batch run.");
        }
    }

    println!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        println!("{}", style("✓ Configuration saved successfully!").green());
        println!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        println!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", style("📋 Current Configuration").bold().cyan());
    println!();

    println!("{}", style("Ollama Settings:").bold().yellow());
    println!("  Host: {}", style(&config.ollama.host).cyan());
    println!("  Port: {}", style(config.ollama.port).cyan());
    println!(
        "  Embedding Model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    println!(
        "  Generation Model: {}",
        style(&config.ollama.generation_model).cyan()
    );
    println!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    match config.ollama.ollama_url() {
        Ok(url) => println!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => println!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    println!();
    println!("{}", style("Retrieval:").bold().yellow());
    println!(
        "  Chunk Size / Overlap: {} / {}",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );
    println!("  Top K: {}", style(config.retrieval.top_k).cyan());
    println!(
        "  Max Retries: {} (backoff unit {}ms)",
        style(config.generation.max_retries).cyan(),
        style(config.generation.backoff_unit_ms).cyan()
    );
    println!(
        "  Verify Index Fingerprint: {}",
        style(config.index.verify_fingerprint).cyan()
    );

    println!();
    println!("{}", style("Paths:").bold().yellow());
    println!("  Corpus: {}", style(config.corpus_dir().display()).cyan());
    println!("  Queries: {}", style(config.queries_file().display()).cyan());
    println!("  Output: {}", style(config.output_file().display()).cyan());
    println!("  Index: {}", style(config.index_path().display()).cyan());

    println!();
    println!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    if config_dir.join("config.toml").exists() {
        let config = Config::load(config_dir)?;
        println!("{}", style("Found existing configuration.").green());
        Ok(config)
    } else {
        println!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        Ok(Config::with_base_dir(config_dir))
    }
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    ollama.host = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), String> {
            let candidate = OllamaConfig {
                host: input.clone(),
                ..OllamaConfig::default()
            };
            candidate.validate().map_err(|e| e.to_string())
        })
        .interact_text()?;

    ollama.port = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.embedding_model = prompt_model("Embedding model", &ollama.embedding_model)?;
    ollama.generation_model = prompt_model("Generation model", &ollama.generation_model)?;

    ollama.batch_size = Input::new()
        .with_prompt("Batch size for embedding requests")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.validate()?;
    Ok(())
}

fn prompt_model(prompt: &str, current: &str) -> Result<String> {
    Ok(Input::new()
        .with_prompt(prompt)
        .default(current.to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?)
}
