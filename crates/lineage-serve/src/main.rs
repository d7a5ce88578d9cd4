//! CLI entry point for lineage reconstruction.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use lineage_core::config::{load_section, DEFAULT_CONFIG_PREFIX};
use lineage_serve::{LineageService, ServeConfig};
use lineage_tracker::{EntityExtractor, TrackerConfig};
use lineage_workflow::WorkflowConfig;

/// Tools listed in the `extract` summary.
const TOP_TOOLS: usize = 10;

#[derive(Parser)]
#[command(name = "lineage")]
#[command(about = "Reconstruct agent lineage from captured inference logs")]
struct Cli {
    /// Config file prefix (default: lineage).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PREFIX)]
    config: String,

    /// Override the log directory from config.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract entities and agent lineage from one JSONL log file.
    Extract {
        file: PathBuf,

        /// Output JSON file (default: entities_extracted.json next to the input).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the enriched log list.
    Logs,
    /// Print the workflow graph.
    Workflow {
        /// Also compute depth and branching factor.
        #[arg(long)]
        traversal: bool,
    },
    /// Print the most recent entities export in the log directory.
    Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Extract { file, output } => {
            let tracker_config: TrackerConfig = load_section(&cli.config, "tracker")?;
            run_extract(tracker_config, file, output.as_deref())?;
        }
        Command::Logs => {
            let service = build_service(&cli)?;
            let logs = service.logs().await?;
            tracing::info!(entries = logs.value.len(), tier = logs.tier.as_str(), "Served logs");
            print_json(&serde_json::json!({ "logs": logs.value.as_ref() }))?;
        }
        Command::Workflow { traversal } => {
            let service = build_service(&cli)?;
            let payload = service.workflow().await?;
            let graph = &payload.value.workflow_graph;
            tracing::info!(
                nodes = graph.nodes.len(),
                edges = graph.edges.len(),
                tier = payload.tier.as_str(),
                "Served workflow graph"
            );
            if *traversal {
                print_json(&serde_json::json!({
                    "workflow_graph": graph,
                    "traversal_metrics": graph.traversal_metrics(),
                }))?;
            } else {
                print_json(graph)?;
            }
        }
        Command::Export => {
            let service = build_service(&cli)?;
            print_json(&service.latest_export().await?)?;
        }
    }

    Ok(())
}

fn build_service(cli: &Cli) -> anyhow::Result<LineageService> {
    let mut serve_config: ServeConfig = load_section(&cli.config, "serve")?;
    if let Some(dir) = &cli.log_dir {
        serve_config.log_dir = dir.clone();
    }
    let workflow_config: WorkflowConfig = load_section(&cli.config, "workflow")?;
    Ok(LineageService::new(&serve_config, workflow_config))
}

fn run_extract(config: TrackerConfig, file: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("entities_extracted.json"),
    };

    let mut extractor = EntityExtractor::new(config);
    extractor.extract_from_file(file)?;
    let document = extractor.export();
    document.write_json(&output)?;

    let summary = &document.metadata.summary;
    let top_tools: Vec<_> = summary
        .top_tools(TOP_TOOLS)
        .into_iter()
        .map(|(name, count)| serde_json::json!({ "name": name, "count": count }))
        .collect();
    print_json(&serde_json::json!({
        "output": output.display().to_string(),
        "summary": summary,
        "top_tools": top_tools,
    }))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
