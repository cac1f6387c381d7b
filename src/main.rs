use anyhow::Result;
use clap::{Parser, Subcommand};
use events_rag::commands::{ask, fetch_catalog, reindex, serve, show_status};
use events_rag::config::{run_interactive_config, show_config};

#[derive(Debug, Parser)]
#[command(name = "events-rag")]
#[command(about = "Question answering over cultural events, served over HTTP")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Configure the embedding and generation services
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Download the event catalog
    Fetch {
        /// Maximum number of events to download
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Rebuild the vector index from the downloaded catalog
    Reindex,
    /// Start the HTTP API
    Serve {
        /// Address to bind, overrides the configured host
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overrides the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ask a single question from the terminal
    Ask {
        question: String,
        /// Conversation identifier
        #[arg(long)]
        session: Option<String>,
    },
    /// Show what has been fetched and indexed
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Fetch { limit } => {
            fetch_catalog(limit).await?;
        }
        Commands::Reindex => {
            reindex().await?;
        }
        Commands::Serve { host, port } => {
            serve(host, port).await?;
        }
        Commands::Ask { question, session } => {
            ask(&question, session.as_deref()).await?;
        }
        Commands::Status => {
            show_status()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn serve_command_defaults() {
        let cli = Cli::try_parse_from(["events-rag", "serve"]).expect("should parse");
        assert!(matches!(
            cli.command,
            Commands::Serve {
                host: None,
                port: None
            }
        ));
    }

    #[test]
    fn serve_command_overrides() {
        let cli = Cli::try_parse_from([
            "events-rag",
            "serve",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
        ])
        .expect("should parse");

        if let Commands::Serve { host, port } = cli.command {
            assert_eq!(host.as_deref(), Some("0.0.0.0"));
            assert_eq!(port, Some(9000));
        } else {
            panic!("expected serve command");
        }
    }

    #[test]
    fn ask_command_with_session() {
        let cli = Cli::try_parse_from([
            "events-rag",
            "ask",
            "Quels concerts de jazz ce week-end ?",
            "--session",
            "abc",
        ])
        .expect("should parse");

        if let Commands::Ask { question, session } = cli.command {
            assert_eq!(question, "Quels concerts de jazz ce week-end ?");
            assert_eq!(session.as_deref(), Some("abc"));
        } else {
            panic!("expected ask command");
        }
    }

    #[test]
    fn ask_requires_a_question() {
        let error = Cli::try_parse_from(["events-rag", "ask"]).expect_err("should fail");
        assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn fetch_limit_must_be_a_number() {
        let cli = Cli::try_parse_from(["events-rag", "fetch", "--limit", "50"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Fetch { limit: Some(50) }));

        let error = Cli::try_parse_from(["events-rag", "fetch", "--limit", "beaucoup"])
            .expect_err("should fail");
        assert_eq!(error.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["events-rag", "config", "--show"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn invalid_command() {
        let error = Cli::try_parse_from(["events-rag", "crawl"]).expect_err("should fail");
        assert_eq!(error.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn help_message() {
        let error = Cli::try_parse_from(["events-rag", "--help"]).expect_err("should fail");
        assert_eq!(error.kind(), ErrorKind::DisplayHelp);
    }
}
