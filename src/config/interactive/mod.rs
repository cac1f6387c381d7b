
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{Config, EmbeddingConfig, GenerationConfig, RetrievalConfig, ServerConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Events RAG Configuration Setup").bold().cyan());
    eprintln!();

    let config_dir = Config::config_dir().context("Failed to resolve configuration directory")?;
    let mut config = load_existing_config(&config_dir)?;

    eprintln!("{}", style("Embedding Service").bold().yellow());
    eprintln!("Passages and questions are embedded through the Voyage AI API.");
    eprintln!();
    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Generation Service").bold().yellow());
    eprintln!("Answers are written by the Anthropic Messages API.");
    eprintln!();
    configure_generation(&mut config.generation)?;

    eprintln!();
    eprintln!("{}", style("Retrieval & Server").bold().yellow());
    configure_retrieval(&mut config.retrieval)?;
    configure_server(&mut config.server)?;

    eprintln!();
    report_api_keys(&config);

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!("  URL: {}", style(&config.embedding.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());

    eprintln!("{}", style("Generation:").bold().yellow());
    eprintln!("  URL: {}", style(&config.generation.base_url).cyan());
    eprintln!("  Model: {}", style(&config.generation.model).cyan());
    eprintln!("  Max Tokens: {}", style(config.generation.max_tokens).cyan());
    eprintln!(
        "  Temperature: {}",
        style(config.generation.temperature).cyan()
    );

    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!("  Window: {}", style(config.chunking.window_size).cyan());
    eprintln!("  Overlap: {}", style(config.chunking.overlap).cyan());

    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Upcoming Only: {}",
        style(config.retrieval.upcoming_only).cyan()
    );

    eprintln!("{}", style("Sessions:").bold().yellow());
    eprintln!("  TTL: {}s", style(config.sessions.ttl_seconds).cyan());
    eprintln!(
        "  History Turns: {}",
        style(config.sessions.max_history_turns).cyan()
    );

    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!("  Address: {}", style(config.server.bind_address()).cyan());

    eprintln!();
    report_api_keys(&config);

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn report_api_keys(config: &Config) {
    for (label, variable, present) in [
        (
            "Embedding API key",
            &config.embedding.api_key_env,
            config.embedding.api_key().is_ok(),
        ),
        (
            "Generation API key",
            &config.generation.api_key_env,
            config.generation.api_key().is_ok(),
        ),
    ] {
        if present {
            eprintln!("  {label}: {} ({variable})", style("set").green());
        } else {
            eprintln!("  {label}: {} ({variable})", style("missing").red());
        }
    }
}

fn load_existing_config(config_dir: &std::path::Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding requests")
        .default(embedding.batch_size)
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

    embedding.set_model(model)?;
    embedding.set_dimension(dimension)?;
    embedding.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_generation(generation: &mut GenerationConfig) -> Result<()> {
    let model: String = Input::new()
        .with_prompt("Generation model")
        .default(generation.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let temperature: f32 = Input::new()
        .with_prompt("Sampling temperature")
        .default(generation.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 1.0")
            }
        })
        .interact_text()?;

    generation.set_model(model)?;
    generation.set_temperature(temperature)?;

    Ok(())
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    let top_k: usize = Input::new()
        .with_prompt("Passages retrieved per question")
        .default(retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=50).contains(input) {
                Ok(())
            } else {
                Err("Top-k must be between 1 and 50")
            }
        })
        .interact_text()?;

    let upcoming_only = Confirm::new()
        .with_prompt("Only retrieve events that are not over yet?")
        .default(retrieval.upcoming_only)
        .interact()?;

    retrieval.set_top_k(top_k)?;
    retrieval.upcoming_only = upcoming_only;

    Ok(())
}

fn configure_server(server: &mut ServerConfig) -> Result<()> {
    let port: u16 = Input::new()
        .with_prompt("HTTP port")
        .default(server.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    server.set_port(port)?;

    Ok(())
}
