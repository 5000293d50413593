use anyhow::Result;
use baton::agent::ChatAgent;
use baton::config::Config;
use baton::llm::{create_provider, OllamaProvider};
use baton::review::ReviewPipeline;
use baton::tools::ToolCatalog;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), env!("BATON_VERSION_SUFFIX"));

#[derive(Parser)]
#[command(name = "baton")]
#[command(author, version = VERSION, about = "Baton - LLM agent loop with tool calling and answer review", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a one-shot question through the agent and review pipeline
    Ask {
        /// The question to answer
        question: String,

        /// LLM provider to use (claude, openai, ollama)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use (e.g. claude-sonnet-4-20250514, gpt-4o, llama3.2)
        #[arg(short, long)]
        model: Option<String>,

        /// Skip the review-improve cycle and answer in one pass
        #[arg(long)]
        no_review: bool,

        /// Overall time budget in seconds
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Print run metadata as JSON after the answer
        #[arg(long)]
        metadata: bool,
    },

    /// List the bundled tools
    Tools,

    /// Show the resolved configuration and backend readiness
    Config {
        /// Probe configured backends for reachability
        #[arg(long)]
        check: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "baton=debug" } else { "baton=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Ask {
            question,
            provider,
            model,
            no_review,
            deadline_secs,
            metadata,
        } => {
            run_ask(
                &question,
                provider.as_deref(),
                model.as_deref(),
                no_review,
                deadline_secs,
                metadata,
            )
            .await?;
        }
        Commands::Tools => {
            run_tools();
        }
        Commands::Config { check } => {
            run_config(check).await?;
        }
    }

    Ok(())
}

async fn run_ask(
    question: &str,
    provider: Option<&str>,
    model: Option<&str>,
    no_review: bool,
    deadline_secs: Option<u64>,
    metadata: bool,
) -> Result<()> {
    let config = Config::load()?;
    let backend = config.backend_config(provider, model);
    let provider = create_provider(&backend)?;
    tracing::info!(provider = provider.name(), model = provider.model(), "backend selected");

    let catalog = Arc::new(ToolCatalog::with_builtins());
    let deadline = deadline_secs.map(|secs| Instant::now() + Duration::from_secs(secs));

    if no_review || !config.review.enabled {
        let mut agent = ChatAgent::new(provider, catalog)
            .with_max_iterations(config.agent.max_iterations)
            .with_tool_timeout(config.tool_timeout());
        if let Some(deadline) = deadline {
            agent = agent.with_deadline(deadline);
        }

        let outcome = agent.run(question, &[]).await;
        println!("{}", outcome.answer);
        if metadata {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    } else {
        let mut pipeline = ReviewPipeline::new(provider, catalog)
            .with_max_review_loops(config.review.max_loops)
            .with_max_iterations(config.agent.max_iterations)
            .with_tool_timeout(config.tool_timeout());
        if let Some(deadline) = deadline {
            pipeline = pipeline.with_deadline(deadline);
        }

        let outcome = pipeline.process(question, &[]).await;
        println!("{}", outcome.answer);
        if metadata {
            println!("{}", serde_json::to_string_pretty(&outcome.metadata)?);
        }
    }

    Ok(())
}

fn run_tools() {
    let catalog = ToolCatalog::with_builtins();
    for tool in catalog.all() {
        println!("{} [{}]", tool.name(), tool.category());
        println!("  {}", tool.description());
    }
}

async fn run_config(check: bool) -> Result<()> {
    let path = Config::config_path()?;
    let config = Config::load()?;

    println!("config file: {}", path.display());
    println!("{}", toml::to_string_pretty(&config)?);

    if check {
        let anthropic_key = std::env::var("ANTHROPIC_API_KEY").is_ok();
        let openai_key = std::env::var("OPENAI_API_KEY").is_ok();
        println!(
            "anthropic: API key {}",
            if anthropic_key { "set" } else { "missing" }
        );
        println!(
            "openai: API key {}",
            if openai_key { "set" } else { "missing" }
        );

        let ollama = OllamaProvider::new().with_base_url(&config.llm.ollama.base_url);
        let reachable = ollama.is_available().await;
        println!(
            "ollama: {} {}",
            config.llm.ollama.base_url,
            if reachable { "reachable" } else { "unreachable" }
        );
    }

    Ok(())
}
