//! newsroll CLI - LLM-backed classification of newsletter items
//!
//! A command-line front end for sorting items into categories or topic
//! groups and inspecting past runs.

mod handlers;
mod state;

use clap::{Parser, Subcommand};
use handlers::{classify, logs, schema};
use state::AppState;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "newsroll", version, about = "Classify newsletter items with an LLM")]
struct Cli {
    /// Configuration file (defaults to ~/.newsroll/newsroll.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify work items read from a JSON file
    Classify(classify::ClassifyArgs),
    /// Print the JSON schema of the classification response
    Schema,
    /// List recent classification runs
    Logs(logs::LogsArgs),
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    match cli.command {
        Commands::Schema => schema::schema(),
        Commands::Classify(args) => {
            let state = AppState::new(cli.config.as_deref()).await?;
            classify::classify(&state, args).await
        }
        Commands::Logs(args) => {
            let state = AppState::new(cli.config.as_deref()).await?;
            logs::logs(&state, args).await
        }
    }
}
