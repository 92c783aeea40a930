//! # Codebase Companion CLI (`companion`)
//!
//! Point it at a Git repository, then ask questions about the code.
//!
//! ## Usage
//!
//! ```bash
//! companion --config ./config/companion.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `companion analyze <url>` | Clone and index a repository, replacing the current one |
//! | `companion chat "<question>"` | Answer a question from the current index |
//! | `companion status` | Show whether an index is ready and what it holds |
//! | `companion serve` | Start the HTTP server |
//! | `companion completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! companion analyze https://github.com/tokio-rs/mini-redis.git
//! companion chat "How are frames parsed?"
//! companion serve --config ./config/companion.toml
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` for per-batch detail.

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use codebase_companion::config::{self, Config};
use codebase_companion::pipeline::Companion;
use codebase_companion::server;
use codebase_companion::status::render_status;

/// Codebase Companion: chat with a Git repository.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(name = "companion", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/companion.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone a repository and build its vector index.
    ///
    /// Discards the previously analyzed repository first.
    Analyze {
        /// Git URL to clone.
        url: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ask a question about the analyzed repository.
    Chat {
        question: String,

        /// Print the answer and sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show readiness and index metadata.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve {
        /// Override the bind address from the config file.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "companion", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Analyze { url, json } => {
            let companion = companion(&cfg).await?;
            let report = companion
                .analyze(&url)
                .await
                .with_context(|| format!("Failed to analyze {url}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.message);
                println!("  Repository:  {}", report.repository_url);
                println!("  Documents:   {}", report.documents);
                println!("  Chunks:      {}", report.chunks);
                if !report.skipped.is_empty() {
                    println!("  Skipped:     {}", report.skipped.len());
                    for s in &report.skipped {
                        println!("    {} ({})", s.path.display(), s.reason);
                    }
                }
            }
        }
        Commands::Chat { question, json } => {
            let companion = companion(&cfg).await?;
            let answer = companion.chat(&question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.text.trim_end());
                if !answer.cited_sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for s in &answer.cited_sources {
                        println!(
                            "  {:.3}  {} (chars {}..{})",
                            s.score,
                            s.source_path,
                            s.offset,
                            s.offset + s.length
                        );
                    }
                }
            }
        }
        Commands::Status { json } => {
            let companion = companion(&cfg).await?;
            let status = companion.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print!("{}", render_status(&status));
            }
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn companion(cfg: &Config) -> anyhow::Result<Companion> {
    Companion::from_config(cfg)
        .await
        .context("Failed to initialize companion")
}
