use std::collections::BTreeSet;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use helmsman::capability::{CapabilityRegistry, EchoSpecialist};
use helmsman::cli::{Cli, Commands};
use helmsman::config::{HelmsmanConfig, KnowledgeBackendKind};
use helmsman::error::Result;
use helmsman::knowledge::{KnowledgeHypergraph, SqliteBackend};
use helmsman::mission::{MissionPlan, MissionStore};
use helmsman::orchestrator::Orchestrator;
use helmsman::policy::PolicyOptimizer;
use helmsman::recovery::LogRemediator;
use helmsman::scheduler::MissionScheduler;
use helmsman::server::{serve, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("helmsman=debug")
    } else {
        EnvFilter::new("helmsman=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    tokio::fs::create_dir_all(&cli.data_dir).await?;
    let config = HelmsmanConfig::load(&cli.data_dir).await?;

    let store = Arc::new(MissionStore::new(&cli.data_dir));
    store.init().await?;

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or(config.server.bind);
            serve(AppState { store }, &bind).await
        }
        Commands::Run { plan, max_parallel } => {
            cmd_run(&config, &cli.data_dir, store, &plan, max_parallel).await
        }
        Commands::Status { mission_id } => cmd_status(store, &mission_id).await,
        Commands::List { status } => {
            let missions = match status {
                Some(filter) => store.list_by_status(filter.into()).await?,
                None => store.list().await?,
            };
            for mission in missions {
                println!("{}  {:<10}  {}", mission.id, mission.status, mission.title);
            }
            Ok(())
        }
    }
}

async fn cmd_run(
    config: &HelmsmanConfig,
    data_dir: &Path,
    store: Arc<MissionStore>,
    plan_path: &Path,
    max_parallel: Option<usize>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(plan_path).await?;
    let plan: MissionPlan = serde_yaml_bw::from_str(&content)?;

    let graph = Arc::new(open_hypergraph(config, data_dir)?);
    let policy = Arc::new(PolicyOptimizer::new(
        Arc::clone(&graph),
        Arc::new(LogRemediator),
        config.policy.clone(),
    ));

    let orchestrator = build_orchestrator(config, &plan);
    let scheduler = MissionScheduler::new(
        orchestrator,
        Arc::clone(&store),
        max_parallel.unwrap_or(config.scheduler.max_parallel),
    )
    .with_policy(policy);

    let id = store.next_id();
    let mut mission = plan.into_mission(&id);
    let result = scheduler.execute(&mut mission).await?;

    println!(
        "{}: {} ({} succeeded, {} failed, {} skipped)",
        result.mission_id, result.status, result.succeeded, result.failed, result.skipped
    );
    if result.storage_errors > 0 {
        eprintln!(
            "warning: {} persistence failures during execution",
            result.storage_errors
        );
    }
    Ok(())
}

async fn cmd_status(store: Arc<MissionStore>, mission_id: &str) -> Result<()> {
    let mission = store.load(mission_id).await?;

    println!("{}  {}  {}", mission.id, mission.status, mission.title);
    for node in mission.dag.nodes.values() {
        println!("  {:<20} {}", node.step_id, node.state);
    }
    if !mission.history.is_empty() {
        println!("history:");
        for t in &mission.history {
            match &t.reason {
                Some(reason) => {
                    println!("  {} {} -> {} ({})", t.step_id, t.from, t.to, reason)
                }
                None => println!("  {} {} -> {}", t.step_id, t.from, t.to),
            }
        }
    }
    Ok(())
}

fn open_hypergraph(config: &HelmsmanConfig, data_dir: &Path) -> Result<KnowledgeHypergraph> {
    match config.knowledge.backend {
        KnowledgeBackendKind::Memory => Ok(KnowledgeHypergraph::in_memory()),
        KnowledgeBackendKind::Sqlite => {
            let path = config
                .knowledge
                .sqlite_path
                .clone()
                .unwrap_or_else(|| data_dir.join("knowledge.db"));
            Ok(KnowledgeHypergraph::new(Box::new(SqliteBackend::open(
                &path,
            )?)))
        }
    }
}

/// Build the root scope for a plan: one demo specialist per distinct
/// capability, plus a child scope for every team scope the plan names.
fn build_orchestrator(config: &HelmsmanConfig, plan: &MissionPlan) -> Arc<Orchestrator> {
    let registry = CapabilityRegistry::new();
    let mut capabilities: BTreeSet<&str> = BTreeSet::new();
    let mut scopes: BTreeSet<&str> = BTreeSet::new();

    for node in plan.dag.nodes.values() {
        capabilities.insert(node.capability.as_str());
        if node.team_scope != "root" {
            scopes.insert(node.team_scope.as_str());
        }
    }
    for capability in &capabilities {
        registry.register(Arc::new(EchoSpecialist::new(*capability)));
    }

    let root = Arc::new(Orchestrator::new(
        "root",
        registry,
        config.dispatch.clone(),
    ));
    let all: Vec<String> = capabilities.iter().map(|c| c.to_string()).collect();
    for scope in scopes {
        root.spawn_child(scope, &all);
    }
    root
}
