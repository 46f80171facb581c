//! Pathwise CLI - learner progression over milestone graphs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use pathwise_core::{Difficulty, Graph, GraphId, InstanceId, LearnerInstance, Lifecycle, MilestoneStatus};
use pathwise_engine::{
    parse_generated_graph, AdvanceRequest, BasicProgressionService, Customization, GenerateRequest,
    GeneratorError, GraphGenerator, ListQuery, ProgressError, ProgressionService, ServiceConfig,
};
use pathwise_progress::{topological_order, validate, TransitionValidator};
use pathwise_storage::{JsonStorage, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pathwise")]
#[command(about = "Learner progression over milestone graphs", long_about = None)]
struct Cli {
    /// Storage directory
    #[arg(long, global = true, default_value = ".pathwise")]
    storage: PathBuf,

    /// SQLite database URL, overrides --storage (needs the `sqlite` feature)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Do not update last-accessed time on reads
    #[arg(long, global = true)]
    no_touch: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a graph file without storing it
    Validate {
        /// Graph JSON file
        file: PathBuf,
    },
    /// Store a graph file
    Import {
        /// Graph JSON file
        file: PathBuf,
    },
    /// List stored graphs
    Graphs,
    /// Attach a learner to a stored graph
    Attach {
        /// Learner ID
        learner: String,
        /// Graph ID
        graph: GraphId,
    },
    /// Build a graph from a recorded provider response and attach to it
    Generate {
        /// Learner ID
        learner: String,
        /// Learning goal
        goal: String,
        /// File holding the provider response
        #[arg(long)]
        response: PathBuf,
        /// Current level
        #[arg(long, default_value = "intermediate")]
        level: Difficulty,
        /// Hours per week
        #[arg(long, default_value = "10")]
        hours_per_week: u32,
        /// Target weeks
        #[arg(long, default_value = "12")]
        weeks: u32,
    },
    /// Move a milestone to a new status
    Advance {
        /// Instance ID
        instance: InstanceId,
        /// Milestone ID
        milestone: String,
        /// Target status (in_progress, completed, unlocked)
        status: MilestoneStatus,
        /// Hours spent
        #[arg(long)]
        hours: Option<f64>,
        /// Note
        #[arg(long)]
        note: Option<String>,
    },
    /// Show an instance
    Show {
        /// Instance ID
        instance: InstanceId,
        /// Print the raw JSON snapshot
        #[arg(long)]
        json: bool,
    },
    /// List a learner's instances
    List {
        /// Learner ID
        learner: String,
        /// Filter by lifecycle
        #[arg(long)]
        status: Option<Lifecycle>,
        /// Page number
        #[arg(long)]
        page: Option<usize>,
        /// Page size
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show learner statistics
    Stats {
        /// Learner ID
        learner: String,
    },
    /// Estimate remaining effort
    Estimate {
        /// Instance ID
        instance: InstanceId,
        /// Weekly pace in hours
        #[arg(long)]
        hours_per_week: Option<f64>,
    },
    /// Mark a milestone as skipped
    Skip {
        /// Instance ID
        instance: InstanceId,
        /// Milestone ID
        milestone: String,
    },
    /// Delete an instance
    Delete {
        /// Instance ID
        instance: InstanceId,
    },
}

/// Replays a provider response saved to disk.
struct ReplayGenerator {
    path: Option<PathBuf>,
}

#[async_trait]
impl GraphGenerator for ReplayGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<Graph, GeneratorError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| GeneratorError::Provider("no response file given".to_string()))?;
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GeneratorError::Provider(format!("{}: {e}", path.display())))?;
        parse_generated_graph(&text, request, "replay", None)
    }
}

fn init_logging() {
    // stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let outcome = open_and_run(cli).await;
    if let Err(err) = &outcome {
        if let Some(progress) = err.downcast_ref::<ProgressError>() {
            debug!("{progress}");
            eprintln!("error: {}", progress.user_message());
            std::process::exit(1);
        }
    }
    outcome
}

async fn open_and_run(cli: Cli) -> Result<()> {
    if let Some(url) = cli.database.clone() {
        return open_sqlite(cli, &url).await;
    }

    let storage = JsonStorage::new(&cli.storage)
        .await
        .with_context(|| format!("opening storage at {}", cli.storage.display()))?;
    run(cli, Arc::new(storage)).await
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(cli: Cli, url: &str) -> Result<()> {
    let storage = pathwise_storage::SqliteStorage::new(url)
        .await
        .with_context(|| format!("opening database {url}"))?;
    run(cli, Arc::new(storage)).await
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_cli: Cli, _url: &str) -> Result<()> {
    anyhow::bail!("--database needs a build with the `sqlite` feature")
}

async fn run<S: Storage + 'static>(cli: Cli, storage: Arc<S>) -> Result<()> {
    let response = match &cli.command {
        Commands::Generate { response, .. } => Some(response.clone()),
        _ => None,
    };
    let service = BasicProgressionService::new(
        storage.clone(),
        Arc::new(ReplayGenerator { path: response }),
    )
    .with_config(ServiceConfig {
        touch_on_read: !cli.no_touch,
        ..Default::default()
    });

    match cli.command {
        Commands::Validate { file } => {
            let graph = read_graph_file(&file).await?;
            validate(&graph)?;
            println!("OK: {} ({} milestones)", graph.meta.title, graph.len());
            for milestone in topological_order(&graph)? {
                println!("  {} - {}", milestone.id, milestone.title);
            }
        }
        Commands::Import { file } => {
            let graph = read_graph_file(&file).await?;
            validate(&graph)?;
            storage.save_graph(&graph).await?;
            println!("Imported graph: {} - {}", graph.id, graph.meta.title);
        }
        Commands::Graphs => {
            let graphs = storage.list_graphs().await?;
            println!("Graphs ({})", graphs.len());
            for graph in graphs {
                println!(
                    "  {} | {} | {} milestones - {}",
                    graph.id,
                    graph.meta.difficulty.as_str(),
                    graph.len(),
                    graph.meta.title,
                );
            }
        }
        Commands::Attach { learner, graph } => {
            let instance = service.attach(learner.as_str().into(), graph).await?;
            println!("Attached: {}", instance.id);
            print_instance(&instance);
        }
        Commands::Generate { learner, goal, level, hours_per_week, weeks, .. } => {
            let request = GenerateRequest {
                current_level: level,
                hours_per_week,
                target_weeks: weeks,
                ..GenerateRequest::new(goal)
            };
            let instance = service.generate_instance(learner.as_str().into(), request).await?;
            println!("Generated graph {} and attached: {}", instance.graph_id, instance.id);
            print_instance(&instance);
        }
        Commands::Advance { instance, milestone, status, hours, note } => {
            let request = AdvanceRequest {
                hours,
                note,
                ..AdvanceRequest::new(milestone, status)
            };
            let instance = service.advance(instance, request).await?;
            print_instance(&instance);
        }
        Commands::Show { instance, json } => {
            let instance = service.get_instance(instance).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&instance)?);
            } else {
                print_instance(&instance);
            }
        }
        Commands::List { learner, status, page, limit } => {
            let query = ListQuery {
                lifecycle: status.map(|s| vec![s]),
                page,
                limit,
            };
            let page = service.list_instances(&learner.as_str().into(), query).await?;
            println!("Instances ({}), page {}/{}", page.total, page.page, page.total_pages.max(1));
            for instance in page.items {
                println!(
                    "  {} | {} | {:>3}% | {}",
                    instance.id,
                    instance.lifecycle,
                    instance.progress.percentage,
                    instance.graph_id,
                );
            }
        }
        Commands::Stats { learner } => {
            let stats = service.learner_stats(&learner.as_str().into()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Estimate { instance, hours_per_week } => {
            let estimate = service.estimate(instance, hours_per_week).await?;
            println!(
                "Remaining: {} milestones, {:.1} hours",
                estimate.remaining_milestones, estimate.remaining_hours
            );
            if let Some(at) = estimate.projected_completion {
                println!("Projected completion: {}", at.format("%Y-%m-%d"));
            }
        }
        Commands::Skip { instance, milestone } => {
            let instance = service
                .customize(instance, Customization::SkipMilestone(milestone.into()))
                .await?;
            println!(
                "Skipped milestones: {}",
                instance
                    .customizations
                    .skipped_milestones
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Commands::Delete { instance } => {
            service.delete_instance(instance).await?;
            println!("Deleted instance: {instance}");
        }
    }

    Ok(())
}

/// Read either a stored graph document or a provider-style one.
async fn read_graph_file(path: &Path) -> Result<Graph> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    if let Ok(graph) = serde_json::from_str::<Graph>(&text) {
        return Ok(graph);
    }
    let mut graph = parse_generated_graph(&text, &GenerateRequest::new(""), "import", None)?;
    graph.meta.generation = None;
    Ok(graph)
}

fn print_instance(instance: &LearnerInstance) {
    let progress = &instance.progress;
    println!("Instance: {}", instance.id);
    println!("  Learner: {}", instance.learner_id);
    println!("  Graph: {}", instance.graph_id);
    println!("  Lifecycle: {}", instance.lifecycle);
    println!(
        "  Progress: {}/{} ({}%), {:.1} hours",
        progress.completed, progress.total, progress.percentage, progress.hours_spent
    );
    if let Some(current) = &progress.current_milestone {
        println!("  Current: {current}");
    }
    for (id, state) in &instance.node_states {
        let next = TransitionValidator::allowed_targets(state.status);
        if next.is_empty() {
            println!("    {} {}", format_status(state.status), id);
        } else {
            let next: Vec<_> = next.iter().map(|s| s.as_str()).collect();
            println!("    {} {} (next: {})", format_status(state.status), id, next.join(", "));
        }
    }
}

fn format_status(status: MilestoneStatus) -> &'static str {
    match status {
        MilestoneStatus::Locked => "[LOCKED]     ",
        MilestoneStatus::Unlocked => "[UNLOCKED]   ",
        MilestoneStatus::InProgress => "[IN PROGRESS]",
        MilestoneStatus::Completed => "[COMPLETED]  ",
    }
}
