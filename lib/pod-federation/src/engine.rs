use crate::aggregate::{aggregate, AggregatedReportEntry};
use crate::client::{HttpSparqlClient, SparqlClient};
use crate::config::FederationConfig;
use crate::dispatch::Dispatcher;
use crate::error::FederationError;
use crate::outcome::{ExecutionOutcome, FailureKind};
use crate::registry::EndpointRegistry;
use crate::report::{RunReport, RunStatus};
use crate::source::{QueryRecord, QuerySource};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// Executes all queries of a [QuerySource] against the pods of an [EndpointRegistry].
///
/// Every query runs in its own task. Within a query, the endpoints are queried concurrently by
/// the [Dispatcher], which also bounds the number of requests in flight.
pub struct FederationEngine {
    registry: Arc<EndpointRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl FederationEngine {
    /// Creates a new [FederationEngine].
    pub fn new(registry: EndpointRegistry, dispatcher: Dispatcher) -> Self {
        Self {
            registry: Arc::new(registry),
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Creates an engine that uses `client` for the requests.
    pub fn with_client(
        config: &FederationConfig,
        client: Arc<dyn SparqlClient>,
    ) -> Result<Self, FederationError> {
        config.validate()?;
        let registry = EndpointRegistry::from_config(config)?;
        Ok(Self::new(registry, Dispatcher::new(client, config)))
    }

    /// Creates an engine that talks to the endpoints via HTTP.
    pub fn from_config(config: &FederationConfig) -> Result<Self, FederationError> {
        Self::with_client(config, Arc::new(HttpSparqlClient::try_new()?))
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Executes every query of `source`.
    ///
    /// If `cancel` is triggered, in-flight queries are aborted and the report only contains the
    /// queries that completed before. The status of such a report is [RunStatus::Interrupted].
    pub async fn run(&self, source: &QuerySource, cancel: CancellationToken) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, source = %source.path().display(), "Starting run");

        let mut tasks = JoinSet::new();
        for query in source.records() {
            let registry = Arc::clone(&self.registry);
            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.spawn(async move { execute_query(&registry, &dispatcher, query).await });
        }
        let total = tasks.len();

        let mut entries = Vec::with_capacity(total);
        let status = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    break RunStatus::Interrupted;
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => collect_entry(&mut entries, joined),
                    None => break RunStatus::Completed,
                },
            }
        };

        // Keeps the queries that completed while the remaining tasks were aborted.
        while let Some(joined) = tasks.join_next().await {
            if joined.as_ref().is_err_and(|e| e.is_cancelled()) {
                continue;
            }
            collect_entry(&mut entries, joined);
        }

        info!(
            %run_id,
            completed = entries.len(),
            total,
            status = status.label(),
            "Run finished"
        );
        RunReport::new(run_id, started_at, status, entries)
    }
}

fn collect_entry(
    entries: &mut Vec<AggregatedReportEntry>,
    joined: Result<AggregatedReportEntry, tokio::task::JoinError>,
) {
    match joined {
        Ok(entry) => {
            info!(
                query = entry.query_index(),
                status = %entry.overall_status(),
                "Query completed"
            );
            entries.push(entry);
        }
        Err(e) => error!(error = %e, "Query task failed"),
    }
}

/// Resolves the endpoints of `query`, dispatches it, and aggregates the outcomes.
async fn execute_query(
    registry: &EndpointRegistry,
    dispatcher: &Dispatcher,
    query: QueryRecord,
) -> AggregatedReportEntry {
    match registry.resolve(query.target_pod()) {
        Ok(endpoints) => {
            let outcomes = dispatcher.execute(&query, endpoints).await;
            aggregate(&query, outcomes)
        }
        Err(unknown) => {
            let outcome = ExecutionOutcome::failure(
                FailureKind::UnknownPod,
                unknown.to_string(),
                Duration::ZERO,
            );
            aggregate(&query, vec![(unknown.0, outcome)])
        }
    }
}
