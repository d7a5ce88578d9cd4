//! The query surface over a log directory: enriched logs, the workflow
//! graph, and the latest entities export.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lineage_workflow::{EnrichedLog, LogEnricher, WorkflowConfig, WorkflowGraph, WorkflowGraphBuilder};

use crate::cache::DiskCache;
use crate::config::ServeConfig;
use crate::coordinator::{BuildCoordinator, Fetched};
use crate::error::Result;
use crate::source::LogSource;

/// Enriched logs together with the graph built from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPayload {
    pub logs: Vec<EnrichedLog>,
    pub workflow_graph: WorkflowGraph,
}

pub struct LineageService {
    source: Arc<LogSource>,
    workflow_config: Arc<WorkflowConfig>,
    logs: BuildCoordinator<Vec<EnrichedLog>>,
    workflow: BuildCoordinator<WorkflowPayload>,
}

impl LineageService {
    pub fn new(config: &ServeConfig, workflow_config: WorkflowConfig) -> Self {
        let timeout = config.build_timeout();
        Self {
            source: Arc::new(LogSource::new(&config.log_dir)),
            workflow_config: Arc::new(workflow_config),
            logs: BuildCoordinator::new("logs", timeout),
            workflow: BuildCoordinator::with_disk(
                "workflow",
                timeout,
                Some(DiskCache::new(config.cache_path())),
            ),
        }
    }

    pub fn source(&self) -> &LogSource {
        &self.source
    }

    /// Every log entry with classification fields, in arrival order.
    pub async fn logs(&self) -> Result<Fetched<Vec<EnrichedLog>>> {
        let key = self.source.latest_mtime()?;
        let source = Arc::clone(&self.source);
        let config = Arc::clone(&self.workflow_config);

        self.logs
            .get_or_build(key, move || {
                let report = source.read_all()?;
                Ok(LogEnricher::new(&config).enrich_all(report.entries))
            })
            .await
    }

    /// Enriched logs plus the workflow graph. Expensive on a miss.
    pub async fn workflow(&self) -> Result<Fetched<WorkflowPayload>> {
        let key = self.source.latest_mtime()?;
        let source = Arc::clone(&self.source);
        let config = Arc::clone(&self.workflow_config);

        self.workflow
            .get_or_build(key, move || {
                let report = source.read_all()?;
                let logs = LogEnricher::new(&config).enrich_all(report.entries);
                let workflow_graph = WorkflowGraphBuilder::new(config.as_ref().clone()).build(&logs);
                Ok(WorkflowPayload {
                    logs,
                    workflow_graph,
                })
            })
            .await
    }

    /// The most recent `entities_*.json` export, parsed.
    pub async fn latest_export(&self) -> Result<Value> {
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || source.load_latest_export())
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?
    }
}
