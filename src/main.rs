use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use svarflyt_agent::{AgentRegistry, Collaborators, PipelineRequest, RunEvent, STRUCTURED_ANSWER};
use svarflyt_core::config::AppConfig;
use svarflyt_core::event::ProgressEvent;
use svarflyt_gateway::{AppState, GatewayServer};
use svarflyt_retrieval::HttpQueryEngine;

#[derive(Parser)]
#[command(name = "svarflyt", version, about = "Multi-step answer pipelines over a retrieval backend")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "svarflyt.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve,
    /// Answer a single question and exit
    Ask {
        /// Agent (pipeline) to run
        #[arg(long, default_value = STRUCTURED_ANSWER)]
        agent: String,
        /// Similarity cutoff (defaults to the configured one)
        #[arg(long)]
        cutoff: Option<f64>,
        /// The question; read from stdin when empty
        #[arg(trailing_var_arg = true)]
        query: Vec<String>,
    },
    /// List available agents
    Agents,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("svarflyt=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that need no config
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "svarflyt", &mut io::stdout());
            return Ok(());
        }
        Commands::Agents => {
            for name in AgentRegistry::with_defaults()?.names() {
                println!("{}", name);
            }
            return Ok(());
        }
        _ => {}
    }

    if !cli.config.exists() {
        anyhow::bail!(
            "Config file not found: {} (see svarflyt.toml.example)",
            cli.config.display()
        );
    }
    let config = AppConfig::load(&cli.config)?;

    let llm: Arc<dyn svarflyt_core::traits::LlmClient> =
        Arc::from(svarflyt_llm::create_client(&config.model)?);
    let query_engine = Arc::new(HttpQueryEngine::new(&config.retrieval));
    let collaborators = Arc::new(Collaborators::new(llm, config.model.clone(), query_engine));
    let registry = Arc::new(AgentRegistry::with_defaults()?);

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Ask {
            agent,
            cutoff,
            query,
        } => {
            let mut text = query.join(" ");
            if text.trim().is_empty() {
                text = io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            let mut request = PipelineRequest::new(text, &config.pipeline);
            if let Some(cutoff) = cutoff {
                request.similarity_cutoff = cutoff;
            }
            ask(&registry, collaborators, &agent, &request).await?;
        }
        Commands::Serve => {
            let gateway_config = config.gateway.clone().unwrap_or_default();
            info!(bind = %gateway_config.bind, "Starting gateway");
            let state = Arc::new(AppState::new(
                collaborators,
                registry,
                config.pipeline.clone(),
            ));
            let server = GatewayServer::new(
                gateway_config,
                state,
                Duration::from_secs(config.retrieval.health_interval_secs.max(1)),
            );
            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Completions { .. } | Commands::Agents => {}
    }

    Ok(())
}

/// Run one pipeline, progress to stderr and the answer to stdout.
async fn ask(
    registry: &AgentRegistry,
    collaborators: Arc<Collaborators>,
    agent: &str,
    request: &PipelineRequest,
) -> anyhow::Result<()> {
    let pipeline = registry.get(agent)?;
    let mut events = pipeline.stream(request, collaborators);

    while let Some(event) = events.next().await {
        match event {
            RunEvent::Progress(ProgressEvent::Action(action)) => {
                eprintln!("\x1b[2m» {}\x1b[0m", action);
            }
            RunEvent::Progress(ProgressEvent::FinalAnswer(answer)) => {
                println!("{}", answer);
                io::stdout().flush()?;
            }
            RunEvent::Completed(_) => break,
            RunEvent::Failed(e) => return Err(e.into()),
        }
    }
    Ok(())
}
