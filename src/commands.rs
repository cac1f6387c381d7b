use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::catalog::{CatalogFetcher, load_catalog};
use crate::config::Config;
use crate::conversation::{Answer, Orchestrator, OrchestratorOptions, SessionStore};
use crate::embeddings::{Embedder, VoyageClient};
use crate::generation::AnthropicClient;
use crate::index::{SharedIndex, storage};
use crate::indexer::Indexer;
use crate::retriever::Retriever;
use crate::server::{self, AppState};

/// Download the event catalog to the home directory
#[inline]
pub async fn fetch_catalog(limit: Option<usize>) -> Result<()> {
    let mut config = Config::load_default().context("Failed to load configuration")?;
    if let Some(limit) = limit {
        config.catalog.limit = limit;
        config
            .catalog
            .validate()
            .context("Invalid catalog limit")?;
    }

    let fetcher = CatalogFetcher::new(&config.catalog).context("Failed to set up catalog client")?;
    let path = config.catalog_path();
    std::fs::create_dir_all(config.get_base_dir()).with_context(|| {
        format!(
            "Failed to create home directory: {}",
            config.get_base_dir().display()
        )
    })?;

    info!("Fetching catalog for {}", config.catalog.city);
    let target = path.clone();
    let catalog = tokio::task::spawn_blocking(move || fetcher.fetch_to(&target))
        .await
        .context("Catalog download task failed")?
        .context("Failed to fetch the event catalog")?;

    eprintln!(
        "{} Fetched {} events into {}",
        style("✓").green(),
        style(catalog.results.len()).cyan(),
        style(path.display()).cyan()
    );
    Ok(())
}

/// Rebuild the persisted index from the catalog file
#[inline]
pub async fn reindex() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let embedder: Arc<dyn Embedder> =
        Arc::new(VoyageClient::from_config(&config).context("Failed to set up embedding client")?);

    let (_, stats) = Indexer::from_config(embedder, &config)
        .rebuild(&config.catalog_path(), &config.index_path())
        .await
        .context("Failed to rebuild the index")?;

    eprintln!("{}", style("✓ Index rebuilt").green());
    eprintln!("  Events: {}", style(stats.events_seen).cyan());
    eprintln!("  Indexed: {}", style(stats.events_indexed).cyan());
    eprintln!("  Without text: {}", style(stats.events_skipped).cyan());
    eprintln!("  Passages: {}", style(stats.passages).cyan());
    eprintln!("  Duration: {:?}", stats.duration);
    Ok(())
}

/// Load the index and wire the answering pipeline from configuration
async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let index_dir = config.index_path();
    let dimension = config.embedding.dimension as usize;
    let index = tokio::task::spawn_blocking(move || storage::load(&index_dir, dimension))
        .await
        .context("Index loading task failed")?
        .context("Failed to load the index, run `events-rag reindex` first")?;
    info!("Loaded index with {} vectors", index.len());

    let embedder: Arc<dyn Embedder> =
        Arc::new(VoyageClient::from_config(config).context("Failed to set up embedding client")?);
    let generator = Arc::new(
        AnthropicClient::from_config(config).context("Failed to set up generation client")?,
    );
    let sessions = Arc::new(SessionStore::new(config.sessions.ttl()));

    Ok(Orchestrator::new(
        Retriever::new(embedder, SharedIndex::new(index)),
        generator,
        sessions,
        OrchestratorOptions::from_config(config),
    ))
}

/// Serve the HTTP API until Ctrl+C or SIGTERM
#[inline]
pub async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load_default().context("Failed to load configuration")?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.server.validate().context("Invalid server address")?;

    let orchestrator = build_orchestrator(&config).await?;
    let state = AppState::new(
        orchestrator,
        config.index_path(),
        config.embedding.dimension as usize,
    );

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    server::serve(listener, state, server::shutdown_signal())
        .await
        .context("Server failed")?;
    Ok(())
}

/// Answer one question from the terminal
#[inline]
pub async fn ask(question: &str, session: Option<&str>) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let orchestrator = build_orchestrator(&config).await?;

    let answer = orchestrator.ask(session, question).await?;
    print_answer(&answer);
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer);

    if answer.sources.is_empty() {
        return;
    }
    println!();
    println!("{}", style("Sources:").bold());
    for source in &answer.sources {
        println!("  {} {}", style(&source.event_id).cyan(), source.excerpt);
    }
}

/// Report what is on disk and whether the service can start
#[inline]
pub fn show_status() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📊 Events RAG Status").bold().cyan());
    eprintln!();
    eprintln!("Home: {}", style(config.get_base_dir().display()).cyan());

    eprintln!();
    eprintln!("{}", style("Catalog:").bold().yellow());
    let catalog_path = config.catalog_path();
    if catalog_path.exists() {
        match load_catalog(&catalog_path) {
            Ok(catalog) => {
                eprintln!("  ✅ {} events", style(catalog.results.len()).cyan());
                eprintln!("  City: {}", style(&config.catalog.city).cyan());
            }
            Err(e) => eprintln!("  ❌ Unreadable: {}", e),
        }
    } else {
        eprintln!("  📭 Not fetched yet");
    }

    eprintln!();
    eprintln!("{}", style("Index:").bold().yellow());
    let index_path = config.index_path();
    if storage::exists(&index_path) {
        match storage::read_manifest(&index_path) {
            Ok(manifest) => {
                eprintln!("  ✅ {} vectors", style(manifest.count).cyan());
                eprintln!("  Dimension: {}", style(manifest.dimension).cyan());
                eprintln!("  Model: {}", style(&manifest.embedding_model).cyan());
                eprintln!(
                    "  Built: {}",
                    style(manifest.built_at.format("%Y-%m-%d %H:%M UTC")).cyan()
                );
                if manifest.dimension != config.embedding.dimension as usize {
                    eprintln!(
                        "  ⚠️  Configured dimension is {}, reindex before serving",
                        config.embedding.dimension
                    );
                }
            }
            Err(e) => eprintln!("  ❌ {}", e),
        }
    } else {
        eprintln!("  📭 Not built yet");
    }

    eprintln!();
    eprintln!("{}", style("API keys:").bold().yellow());
    for (name, present) in [
        (
            config.embedding.api_key_env.as_str(),
            config.embedding.api_key().is_ok(),
        ),
        (
            config.generation.api_key_env.as_str(),
            config.generation.api_key().is_ok(),
        ),
    ] {
        let mark = if present { "✅" } else { "❌" };
        eprintln!("  {} {}", mark, name);
    }

    eprintln!();
    eprintln!("{}", style("💡 Next Steps:").bold());
    eprintln!("   • Use 'events-rag fetch' to download the event catalog");
    eprintln!("   • Use 'events-rag reindex' to embed it");
    eprintln!("   • Use 'events-rag serve' to start the HTTP API");

    Ok(())
}
