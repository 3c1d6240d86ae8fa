use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use codeflow_assistant::{
    assistant::Assistant,
    config::Config,
    generation::ChatCompletionClient,
    storage::SqliteStorage,
};

/// Conversational code-quality assistant (stdio REPL)
#[derive(Debug, Parser)]
#[command(name = "codeflow-assistant", version, about)]
struct Cli {
    /// Thread id for this conversation
    #[arg(long, default_value = "default")]
    thread_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Codeflow assistant starting..."
    );

    // Initialize the optional checkpoint store
    let storage = match &config.database {
        Some(db_config) => match SqliteStorage::new(db_config).await {
            Ok(s) => {
                info!(path = %db_config.path.display(), "Checkpoint database initialized");
                Some(s)
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize checkpoint database");
                return Err(e.into());
            }
        },
        None => None,
    };

    // Initialize the generation client
    let client = match ChatCompletionClient::new(&config.generation, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.generation.base_url, model = %config.generation.model, "Generation client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize generation client");
            return Err(e.into());
        }
    };

    let assistant = Assistant::new(&config, Arc::new(client), storage);

    info!(thread_id = %cli.thread_id, "Ready, reading from stdin...");

    repl(&assistant, &cli.thread_id).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Line-oriented front end over the three engine operations.
async fn repl(assistant: &Assistant, thread_id: &str) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for message in assistant.history(thread_id).await {
                    stdout
                        .write_all(format!("[{}] {}\n", message.role, message.content).as_bytes())
                        .await?;
                }
            }
            "/clear" => {
                assistant.clear_history(thread_id).await;
                stdout.write_all(b"History cleared.\n").await?;
            }
            input => {
                let outcome = assistant.run(thread_id, input).await;
                stdout
                    .write_all(format!("{}\n", outcome.output).as_bytes())
                    .await?;
            }
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        codeflow_assistant::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        codeflow_assistant::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
