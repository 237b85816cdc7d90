//! Inquest CLI - run a clarified, multi-agent research session

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use inquest_core::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "inquest")]
#[command(about = "Research a topic and write a cited report", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a topic
    Run {
        /// Topic to research; asked for interactively when omitted
        #[arg(short, long)]
        topic: Option<String>,

        /// Configuration file (defaults to inquest.toml / INQUEST_CONFIG_PATH)
        #[arg(short, long, env = "INQUEST_CONFIG_PATH")]
        config: Option<PathBuf>,

        /// Print the report to stdout as well
        #[arg(long)]
        print: bool,
    },
    /// Print the effective configuration with secrets redacted
    Config {
        #[arg(short, long, env = "INQUEST_CONFIG_PATH")]
        config: Option<PathBuf>,
    },
    /// Version information
    Version,
}

/// Reads clarification answers from stdin
struct StdinPrompt {
    lines: Mutex<tokio::io::Lines<BufReader<Stdin>>>,
}

impl StdinPrompt {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{} ", prompt);
        std::io::stdout().flush().ok()?;
        let line = self.lines.lock().await.next_line().await.ok()??;
        let line = line.trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

#[async_trait]
impl UserPrompt for StdinPrompt {
    async fn ask(&self, question: &str) -> Option<String> {
        println!("\n{}", question);
        self.read_line(">").await
    }
}

fn load_config(path: Option<PathBuf>) -> Result<InquestConfig> {
    let config = match path {
        Some(path) => InquestConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => InquestConfig::load()?,
    };
    Ok(config)
}

async fn run(topic: Option<String>, config: Option<PathBuf>, print: bool) -> Result<()> {
    let config = Arc::new(load_config(config)?);
    let prompt = StdinPrompt::new();

    let topic = match topic {
        Some(topic) => topic,
        None => prompt
            .read_line("What would you like to research?")
            .await
            .context("no research topic given")?,
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; finishing in-flight calls");
                cancel.cancel();
            }
        }
    });

    let session = ResearchSession::builder(config)
        .cancellation(cancel)
        .build()?;

    let outcome = match session.run(&topic, &prompt).await {
        Ok(outcome) => outcome,
        Err(InquestError::RunFailed { reason, partial }) => {
            if let Some(report) = partial {
                let published = session.publish(&report).await;
                if let Some(uri) = published.local_uri {
                    eprintln!("Partial report written to {}", uri);
                }
            }
            anyhow::bail!("research failed: {}", reason);
        }
        Err(e) => return Err(e.into()),
    };

    if print {
        println!("\n{}", outcome.report.content);
    }
    for warning in outcome.warnings() {
        eprintln!("warning: {}", warning);
    }
    for line in outcome.report.metadata.completeness.annotations() {
        eprintln!("note: {}", line);
    }
    if let Some(ref uri) = outcome.publish.local_uri {
        println!("Report written to {}", uri);
    }
    if let Some(ref uri) = outcome.publish.remote_uri {
        println!("Report uploaded to {}", uri);
    }
    if !outcome.publish.is_stored() {
        // Every store failed; the report must not be lost
        println!("\n{}", outcome.report.content);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            topic,
            config,
            print,
        } => run(topic, config, print).await?,
        Commands::Config { config } => {
            let config = load_config(config)?;
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
        Commands::Version => {
            println!("inquest {}", env!("CARGO_PKG_VERSION"));
            println!("inquest-core {}", inquest_core::VERSION);
        }
    }

    Ok(())
}
