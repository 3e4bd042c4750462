use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

mod aggregator;
mod error;
mod exchange;
mod export;
mod models;
mod request;
mod server;
mod session;
mod settings;
mod trim;

use models::OllamaClient;
use settings::{GlobalConfigDefaults, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};

#[derive(Debug, Parser)]
#[command(name = "llama_chat")]
#[command(about = "Browser chat client for a local Ollama server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the chat page and its API
    Start {
        #[arg(long, default_value = "127.0.0.1:7171")]
        listen: String,
        /// Inference server URL; defaults to $OLLAMA_HOST or http://127.0.0.1:11434
        #[arg(long)]
        ollama_url: Option<String>,
        #[arg(long, default_value = DEFAULT_MODEL)]
        default_model: String,
        #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
        system_prompt: String,
    },
    /// Print the models the inference server offers
    Models {
        #[arg(long)]
        ollama_url: Option<String>,
        #[arg(long, default_value = DEFAULT_MODEL)]
        default_model: String,
    },
}

fn backend(ollama_url: Option<String>) -> anyhow::Result<OllamaClient> {
    match ollama_url {
        Some(url) => OllamaClient::new(&url),
        None => OllamaClient::from_env(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { listen, ollama_url, default_model, system_prompt } => {
            let addr: SocketAddr = listen.parse()?;
            let client = backend(ollama_url)?;
            tracing::info!(ollama = %client.base_url, "using inference server");
            let defaults = GlobalConfigDefaults {
                default_model,
                system_prompt,
                ..GlobalConfigDefaults::default()
            };
            let state = server::AppState::new(Arc::new(client), defaults);
            server::serve(addr, state).await?;
        }
        Commands::Models { ollama_url, default_model } => {
            let client = backend(ollama_url)?;
            for model in models::list_models(&client, &default_model).await {
                println!("{model}");
            }
        }
    }
    Ok(())
}
