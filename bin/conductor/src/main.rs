mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Adaptive task routing with execution feedback", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and the capability catalog
    Onboard {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show configuration and store status
    Status,

    /// Route a request and print the decision without starting a run
    Route {
        /// Request text
        request: String,

        /// Where the work applies (repo, service, module)
        #[arg(short, long)]
        scope: Option<String>,

        /// Explicit capability id, bypassing scoring
        #[arg(short, long)]
        capability: Option<String>,

        /// Task type override for trace lookups
        #[arg(short, long)]
        task_type: Option<String>,
    },

    /// Route a request and drive the run through the approval gate
    Run {
        /// Request text
        request: String,

        /// Where the work applies
        #[arg(short, long)]
        scope: Option<String>,

        /// Explicit capability id, bypassing scoring
        #[arg(short, long)]
        capability: Option<String>,
    },

    /// Attach a reward in [0, 1] to a recorded span
    Reward {
        /// Span id
        span_id: String,

        /// Reward value
        value: f64,

        /// Optional JSON metadata
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Inspect the capability catalog
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },

    /// Inspect and curate the knowledge store
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommands,
    },

    /// Inspect the execution trace
    Trace {
        #[command(subcommand)]
        command: TraceCommands,
    },
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// List all registered capabilities
    List,
}

#[derive(Subcommand)]
enum KnowledgeCommands {
    /// Read a topic with live trace enrichment
    Read {
        /// Topic (task type)
        topic: String,
    },
    /// List pending write proposals
    Proposals,
    /// Confirm a pending proposal
    Confirm {
        /// Proposal id
        proposal_id: String,
    },
    /// Reject a pending proposal
    Reject {
        /// Proposal id
        proposal_id: String,
    },
}

#[derive(Subcommand)]
enum TraceCommands {
    /// Show recent spans for a task type
    Recent {
        /// Task type
        task_type: String,
        /// Max spans to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show success/failure rates for a task type
    Stats {
        /// Task type
        task_type: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Onboard { force } => {
            commands::onboard::run(force).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Route {
            request,
            scope,
            capability,
            task_type,
        } => {
            commands::route::run(&request, scope, capability, task_type).await?;
        }
        Commands::Run {
            request,
            scope,
            capability,
        } => {
            commands::run_cmd::run(&request, scope, capability).await?;
        }
        Commands::Reward {
            span_id,
            value,
            metadata,
        } => {
            commands::reward::run(&span_id, value, metadata).await?;
        }
        Commands::Registry { command } => match command {
            RegistryCommands::List => {
                commands::registry_cmd::list().await?;
            }
        },
        Commands::Knowledge { command } => match command {
            KnowledgeCommands::Read { topic } => {
                commands::knowledge_cmd::read(&topic).await?;
            }
            KnowledgeCommands::Proposals => {
                commands::knowledge_cmd::proposals().await?;
            }
            KnowledgeCommands::Confirm { proposal_id } => {
                commands::knowledge_cmd::confirm(&proposal_id).await?;
            }
            KnowledgeCommands::Reject { proposal_id } => {
                commands::knowledge_cmd::reject(&proposal_id).await?;
            }
        },
        Commands::Trace { command } => match command {
            TraceCommands::Recent { task_type, limit } => {
                commands::trace_cmd::recent(&task_type, limit).await?;
            }
            TraceCommands::Stats { task_type } => {
                commands::trace_cmd::stats(&task_type).await?;
            }
        },
    }

    Ok(())
}
