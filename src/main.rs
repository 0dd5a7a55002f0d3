use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ivr_cartographer::config::ExplorerConfig;
use ivr_cartographer::explorer::ConversationExplorer;
use ivr_cartographer::graph::ConversationGraph;
use ivr_cartographer::llm::{AnthropicClient, AnthropicConfig};
use ivr_cartographer::models::GraphSnapshot;
use ivr_cartographer::progress::ProgressTracker;
use ivr_cartographer::providers::mock::{MockLlmClient, MockTranscriber, MockVoiceApiClient, ScriptedIvr};
use ivr_cartographer::providers::LlmClient;
use ivr_cartographer::server::{self, AppState};
use ivr_cartographer::webhook::WebhookCorrelator;
use ivr_cartographer::worker::ConversationWorker;

#[derive(Parser)]
#[command(name = "ivr-cartographer")]
#[command(author, version, about = "Discovers and maps an IVR agent's conversation graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place calls and explore the agent's conversation graph until quiescence
    Explore {
        /// Phone number to dial (overrides EXPLORER_TARGET_PHONE_NUMBER)
        #[arg(long)]
        phone_number: Option<String>,

        /// Caller persona/scenario description
        #[arg(long)]
        scenario: Option<String>,

        /// Number of concurrent workers
        #[arg(long)]
        worker_count: Option<usize>,

        /// Maximum total calls before stopping
        #[arg(long)]
        max_calls: Option<usize>,

        /// Address the webhook/graph HTTP server binds to
        #[arg(long)]
        bind_addr: Option<String>,

        /// Run entirely against deterministic mocks; no network calls
        #[arg(long)]
        dry_run: bool,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print a coverage summary for a previously saved `GET /graph` snapshot
    Inspect {
        /// Path to a JSON file with the shape returned by GET /graph
        #[arg(short, long)]
        from: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Explore {
            phone_number,
            scenario,
            worker_count,
            max_calls,
            bind_addr,
            dry_run,
            verbose,
        } => {
            setup_logging(verbose);
            run_explore(phone_number, scenario, worker_count, max_calls, bind_addr, dry_run).await
        }
        Commands::Inspect { from } => {
            setup_logging(false);
            inspect_snapshot(from)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn run_explore(
    phone_number: Option<String>,
    scenario: Option<String>,
    worker_count: Option<usize>,
    max_calls: Option<usize>,
    bind_addr: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let mut config = ExplorerConfig::from_env().context("failed to load configuration")?;
    if let Some(phone_number) = phone_number {
        config.target_phone_number = Some(phone_number);
    }
    if let Some(scenario) = scenario {
        config.scenario_description = scenario;
    }
    if let Some(worker_count) = worker_count {
        config.worker_count = worker_count;
    }
    if let Some(max_calls) = max_calls {
        config.max_calls = max_calls;
    }
    if let Some(bind_addr) = bind_addr {
        config.bind_addr = bind_addr;
    }

    info!(
        worker_count = config.worker_count,
        max_calls = config.max_calls,
        dry_run,
        "starting exploration"
    );

    let graph = ConversationGraph::new(config.similarity_threshold);
    let progress = Arc::new(ProgressTracker::new(config.plateau_window));
    let correlator = WebhookCorrelator::new(Duration::from_secs(60));

    let voice = Arc::new(MockVoiceApiClient::new(correlator.clone()));
    let transcriber = Arc::new(MockTranscriber::new(ScriptedIvr::default_scenario()));
    let llm: Arc<dyn LlmClient> = if dry_run {
        Arc::new(MockLlmClient::new())
    } else {
        let llm_config = AnthropicConfig::from_env().context("failed to load LLM credentials")?;
        Arc::new(AnthropicClient::new(llm_config))
    };

    let worker = Arc::new(ConversationWorker::new(
        graph.clone(),
        voice,
        transcriber,
        llm,
        correlator.clone(),
        progress.clone(),
        config.clone(),
    ));

    let state = AppState {
        graph: graph.clone(),
        correlator,
        progress: progress.clone(),
    };
    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "webhook/graph API listening");

    let server_task = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("HTTP server failed");
    });

    let explorer = ConversationExplorer::new(worker, graph, progress, config);
    let summary = explorer.run().await;

    server_task.abort();

    info!(
        calls_attempted = summary.stats.calls_attempted,
        calls_succeeded = summary.stats.calls_succeeded,
        nodes_added = summary.stats.nodes_added,
        edges_added = summary.stats.edges_added,
        quiescence_reason = ?summary.stats.quiescence_reason,
        quiesced_at = ?summary.stats.quiesced_at,
        "exploration complete"
    );

    Ok(())
}

fn inspect_snapshot(from: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&from).with_context(|| format!("failed to read {from:?}"))?;
    let snapshot: GraphSnapshot = serde_json::from_str(&raw).context("failed to parse graph snapshot")?;

    println!("Conversation Graph Summary");
    println!("==========================");
    println!("Nodes: {}", snapshot.nodes.len());
    println!("Edges: {}", snapshot.edges.len());

    let terminals = snapshot.nodes.iter().filter(|n| n.is_terminal).count();
    println!("Terminal nodes: {}", terminals);

    let max_depth = snapshot.nodes.iter().map(|n| n.depth_min).max().unwrap_or(0);
    println!("Max depth observed: {}", max_depth);

    let total_visits: u32 = snapshot.nodes.iter().map(|n| n.visit_count).sum();
    println!("Total node visits: {}", total_visits);

    let total_dropped: u32 = snapshot.nodes.iter().map(|n| n.dropped_errors).sum();
    println!("Dropped error tasks: {}", total_dropped);

    Ok(())
}
