use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colony_core::{
    Colony, ColonyConfig, ConfigLoader, JsonlKnowledgeStore, KnowledgeStore, ProgressEvent,
    TelemetryOptions, init_telemetry,
};
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "colony",
    version,
    about = "Autonomous research colony: seed, explore, critique, verify, synthesize"
)]
struct Cli {
    /// Path to a colony.toml (defaults to $COLONY_CONFIG, then ./colony.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the knowledge log location.
    #[arg(long, global = true)]
    knowledge: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a goal and print progress as it happens.
    Run(RunArgs),
    /// Show knowledge-store entries relevant to a topic.
    Recall(RecallArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Research goal.
    #[arg(long)]
    goal: String,

    /// Emit progress events and the report as JSON lines.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct RecallArgs {
    /// Topic to match against prior threads.
    #[arg(long)]
    topic: String,

    /// Emit entries as JSON lines.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::load(cli.config.clone())?;
    if let Some(path) = cli.knowledge.clone() {
        config.knowledge.path = path;
    }

    init_telemetry(TelemetryOptions::from(&config.logging))?;

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(&config, args).await,
            Command::Recall(args) => recall_command(&config, args).await,
        }
    })
}

async fn run_command(config: &ColonyConfig, args: RunArgs) -> Result<()> {
    let colony = Arc::new(Colony::from_config(config)?);
    info!(goal = %args.goal, "Starting research run");

    let (mut events, handle) = colony.stream(args.goal);
    while let Some(event) = events.recv().await {
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }
        match &event {
            ProgressEvent::Completed { report } => {
                println!("{event}");
                println!();
                println!("{}", report.render_markdown());
            }
            _ => println!("{event}"),
        }
    }

    let report = handle.await.context("research run panicked")??;
    if report.is_partial() {
        info!(failures = report.failures.len(), "Run finished with failed threads");
    }
    Ok(())
}

async fn recall_command(config: &ColonyConfig, args: RecallArgs) -> Result<()> {
    let store = JsonlKnowledgeStore::new(&config.knowledge.path);
    let entries = store.query(&args.topic).await?;

    if args.json {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No prior knowledge for \"{}\" in {}", args.topic, store.path().display());
        return Ok(());
    }
    for (idx, entry) in entries.iter().enumerate() {
        let confidence = entry
            .confidence
            .map_or_else(|| "unknown".to_string(), |score| score.to_string());
        println!(
            "{}. {} (run {}, depth {}, confidence {})",
            idx + 1,
            entry.thread,
            entry.run_id,
            entry.depth,
            confidence
        );
        println!("   {}", entry.finding_summary);
        let verified = entry.citations.iter().filter(|c| c.verified).count();
        if !entry.citations.is_empty() {
            println!("   citations: {verified}/{} verified", entry.citations.len());
        }
    }
    Ok(())
}
