//! CLI binary for running and inspecting Acumen AgentQL queries.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use acumen_agents::DataHub;
use acumen_pipeline::{default_registry, QueryEngine};
use acumen_types::{AggregatedResult, QueryStatus};

#[derive(Parser)]
#[command(name = "acumen", version, about = "AgentQL query runner for SME credit intelligence")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an AgentQL query from a .aql file
    Run {
        /// Path to the query file
        query: PathBuf,

        /// Root directory for the file-backed data sources (default: ./data)
        #[arg(short, long)]
        data_root: Option<PathBuf>,

        /// Tenant the query runs for
        #[arg(short, long, default_value = "default")]
        tenant: String,

        /// Print the raw aggregated result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse and compile a query without executing it
    Validate {
        /// Path to the query file
        query: PathBuf,
    },

    /// List the registered stage agents and their field contracts
    Agents,

    /// Start the HTTP API server
    Serve {
        /// Listen address (overrides ACUMEN_ADDR)
        #[arg(short, long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; --verbose only raises the fallback filter.
    let fallback = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            query,
            data_root,
            tenant,
            json,
        } => {
            cmd_run(&query, data_root.as_deref(), &tenant, json).await?;
        }
        Commands::Validate { query } => {
            cmd_validate(&query)?;
        }
        Commands::Agents => {
            cmd_agents();
        }
        Commands::Serve { addr } => {
            cmd_serve(addr.as_deref()).await?;
        }
    }

    Ok(())
}

fn engine_over(data_root: Option<&Path>) -> QueryEngine {
    let root = data_root.unwrap_or_else(|| Path::new("./data"));
    QueryEngine::new(default_registry(DataHub::file_backed(root)))
}

async fn cmd_run(
    query_path: &Path,
    data_root: Option<&Path>,
    tenant: &str,
    json: bool,
) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(query_path)?;
    tracing::debug!(path = %query_path.display(), bytes = source.len(), "loaded query");
    let engine = engine_over(data_root);

    let result = engine.execute(&source, tenant).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if result.status == QueryStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_result(result: &AggregatedResult) {
    println!("\nQuery {}", status_text(result.status));

    if let Some(score) = result.score {
        match result.confidence {
            Some(confidence) => println!("Score: {score:.1} (confidence {confidence:.2})"),
            None => println!("Score: {score:.1}"),
        }
    }

    if result.risk_factors.is_empty() {
        println!("Risk factors: none");
    } else {
        println!("Risk factors:");
        for factor in &result.risk_factors {
            println!("  - {} [{:?}]: {}", factor.kind, factor.severity, factor.message);
        }
    }

    if let Some(explanation) = &result.explanation {
        println!("\n{explanation}");
    }

    if !result.recommendations.is_empty() {
        println!("\nRecommendations:");
        for rec in &result.recommendations {
            println!("  - {rec}");
        }
    }

    if result.validation.ok {
        println!("\nValidation: passed");
    } else {
        println!("\nValidation: FAILED ({})", result.validation.notes);
    }

    if !result.fields.is_empty() {
        println!("\nProjected fields:");
        for (name, value) in &result.fields {
            println!("  {name}: {value}");
        }
    }
}

fn status_text(status: QueryStatus) -> &'static str {
    match status {
        QueryStatus::Complete => "completed",
        QueryStatus::Partial => "completed partially",
        QueryStatus::Failed => "failed",
    }
}

fn cmd_validate(query_path: &Path) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(query_path)?;
    // Validation needs agent contracts, not data, so an empty hub suffices.
    let engine = QueryEngine::new(default_registry(DataHub::empty()));

    match engine.plan(&source) {
        Ok(plan) => {
            println!("Query is valid");
            println!("Stages:");
            for (i, stage) in plan.stages.iter().enumerate() {
                println!(
                    "  {}. {} (consumes: {}; produces: {})",
                    i + 1,
                    stage.name,
                    join_or_none(&stage.inputs),
                    join_or_none(&stage.outputs),
                );
            }
            Ok(())
        }
        Err(e) => {
            println!("Invalid query: {e}");
            std::process::exit(1);
        }
    }
}

fn join_or_none(fields: &[String]) -> String {
    if fields.is_empty() {
        "none".to_string()
    } else {
        fields.join(", ")
    }
}

fn cmd_agents() {
    let engine = QueryEngine::new(default_registry(DataHub::empty()));
    let registry = engine.registry();

    for name in registry.names() {
        let Some(agent) = registry.get(&name) else {
            continue;
        };
        println!("{name}");
        println!("  consumes: {}", contract_text(agent.input_contract()));
        println!("  produces: {}", contract_text(agent.output_contract()));
    }
}

fn contract_text(fields: &[&str]) -> String {
    if fields.is_empty() {
        "none".to_string()
    } else {
        fields.join(", ")
    }
}

async fn cmd_serve(addr: Option<&str>) -> anyhow::Result<()> {
    let mut settings = acumen_server::Settings::from_env()?;
    if let Some(addr) = addr {
        settings.addr = addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address '{addr}': {e}"))?;
    }
    acumen_server::serve(settings).await?;
    Ok(())
}
