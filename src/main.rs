//! Bond Field - CLI
//!
//! Loads a YAML field fixture and runs traversal, propagation and ledger
//! queries against it.

use anyhow::Result;
use bondfield::clock::SystemClock;
use bondfield::fixture::FieldFixture;
use bondfield::nodes::NodeId;
use bondfield::propagation::PropagationKind;
use bondfield::{Config, FieldService, Quantity};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bondfield")]
#[command(about = "Bond graph, propagation and ledger inspector")]
struct Cli {
    /// Configuration file (defaults to ./bondfield.yaml)
    #[arg(short, long, env = "BONDFIELD_CONFIG")]
    config: Option<PathBuf>,

    /// Field fixture to load
    #[arg(short, long, env = "BONDFIELD_FIXTURE")]
    fixture: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a distribution without recording it
    Preview {
        #[arg(short, long)]
        origin: String,

        /// Input quantity, e.g. 100 or 12.5
        #[arg(short, long)]
        quantity: Quantity,

        /// join or flow
        #[arg(short, long, default_value = "flow")]
        kind: PropagationKind,
    },

    /// Execute a distribution and verify the ledger afterwards
    Execute {
        #[arg(short, long)]
        origin: String,

        #[arg(short, long)]
        quantity: Quantity,

        #[arg(short, long, default_value = "flow")]
        kind: PropagationKind,
    },

    /// Shortest path between two nodes
    Path {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },

    /// Nodes and bonds within a hop radius
    Reach {
        #[arg(short, long)]
        origin: String,

        #[arg(long, default_value = "6")]
        hops: u32,
    },

    /// Statistics for a node
    Stats {
        #[arg(short, long)]
        node: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bondfield=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;
    let fixture = FieldFixture::load(&cli.fixture)?;
    let service = fixture.build(config, Arc::new(SystemClock)).await?;

    match cli.command {
        Commands::Preview {
            origin,
            quantity,
            kind,
        } => {
            let dist = service
                .preview_propagation(&NodeId::new(origin), quantity, kind)
                .await?;
            print_json(&dist)
        }
        Commands::Execute {
            origin,
            quantity,
            kind,
        } => run_execute(&service, NodeId::new(origin), quantity, kind).await,
        Commands::Path { from, to } => {
            let path = service
                .shortest_path(&NodeId::new(from), &NodeId::new(to))
                .await?;
            print_json(&path)
        }
        Commands::Reach { origin, hops } => {
            let reach = service.reachable_from(&NodeId::new(origin), hops).await?;
            print_json(&reach)
        }
        Commands::Stats { node } => {
            let stats = service.node_stats(&NodeId::new(node)).await?;
            print_json(&stats)
        }
    }
}

async fn run_execute(
    service: &FieldService,
    origin: NodeId,
    quantity: Quantity,
    kind: PropagationKind,
) -> Result<()> {
    let executed = service.execute_propagation(&origin, quantity, kind).await?;
    let report = service.ensure_balanced().await?;

    tracing::info!(
        "Executed {} events under {}; ledger balanced (in {}, out {})",
        executed.event_ids.len(),
        executed.reference,
        report.totals.total_in,
        report.total_out
    );

    #[derive(Serialize)]
    struct Output<'a> {
        executed: &'a bondfield::propagation::ExecutedPropagation,
        conservation: &'a bondfield::ledger::ConservationReport,
        pools: std::collections::BTreeMap<String, Quantity>,
    }

    print_json(&Output {
        executed: &executed,
        conservation: &report,
        pools: service.ledger().pool_balances().await?,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
