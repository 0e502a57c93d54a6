use crate::client::{AttemptError, SparqlClient, SparqlResponse};
use crate::config::{FederationConfig, RetryPolicy};
use crate::outcome::{ExecutionOutcome, FailureKind};
use crate::registry::{EndpointDescriptor, PodId};
use crate::source::{QueryForm, QueryRecord};
use futures::future::join_all;
use oxrdf::{Term, Variable};
use sparesults::QuerySolution;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

/// The variables of the solutions a graph is turned into.
const GRAPH_VARIABLES: [&str; 3] = ["subject", "predicate", "object"];

/// Executes queries against endpoints and turns every result into an [ExecutionOutcome].
///
/// The dispatcher never fails. Transport errors are retried according to the [RetryPolicy],
/// and everything that still goes wrong is recorded as an [ExecutionOutcome::Failure].
pub struct Dispatcher {
    /// Performs the individual requests.
    client: Arc<dyn SparqlClient>,
    /// The deadline for all attempts against a single endpoint.
    timeout: Duration,
    /// The retry policy for transient failures.
    retry: RetryPolicy,
    /// Bounds the number of endpoint executions that run at the same time.
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    /// Creates a new [Dispatcher] with the limits of `config`.
    pub fn new(client: Arc<dyn SparqlClient>, config: &FederationConfig) -> Self {
        Self {
            client,
            timeout: config.timeout,
            retry: config.retry,
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
        }
    }

    /// Executes `query` against every endpoint in `endpoints` concurrently.
    ///
    /// The returned outcomes are in the order of `endpoints`, one per endpoint.
    pub async fn execute(
        &self,
        query: &QueryRecord,
        endpoints: &[EndpointDescriptor],
    ) -> Vec<(PodId, ExecutionOutcome)> {
        let Some(form) = query.form() else {
            warn!(
                query = query.index(),
                "Query has no SELECT, ASK, CONSTRUCT or DESCRIBE form, not dispatching"
            );
            return endpoints
                .iter()
                .map(|endpoint| {
                    let outcome = ExecutionOutcome::failure(
                        FailureKind::MalformedQuery,
                        "The text is not a SPARQL query",
                        Duration::ZERO,
                    );
                    (endpoint.pod_id.clone(), outcome)
                })
                .collect();
        };
        debug!(
            query = query.index(),
            %form,
            endpoints = endpoints.len(),
            "Dispatching query"
        );

        join_all(endpoints.iter().map(|endpoint| async move {
            let outcome = self.execute_on_endpoint(query, form, endpoint).await;
            (endpoint.pod_id.clone(), outcome)
        }))
        .await
    }

    /// Executes `query` against a single endpoint, including retries.
    async fn execute_on_endpoint(
        &self,
        query: &QueryRecord,
        form: QueryForm,
        endpoint: &EndpointDescriptor,
    ) -> ExecutionOutcome {
        // The semaphore is never closed.
        let Ok(_permit) = self.permits.acquire().await else {
            return ExecutionOutcome::failure(
                FailureKind::ConnectionError,
                "The dispatcher has been shut down",
                Duration::ZERO,
            );
        };

        let start = Instant::now();
        let result = timeout(self.timeout, self.attempt_with_retries(query, form, endpoint)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(response)) => outcome_for_response(response, elapsed),
            Ok(Err(error)) => {
                let kind = match &error {
                    AttemptError::Transport(_) => FailureKind::ConnectionError,
                    AttemptError::Status { status, .. } => FailureKind::HttpError(*status),
                    AttemptError::MalformedResponse(_) => FailureKind::MalformedResponse,
                };
                ExecutionOutcome::failure(kind, error.to_string(), elapsed)
            }
            Err(_) => ExecutionOutcome::failure(
                FailureKind::Timeout,
                format!("No response within {} ms", self.timeout.as_millis()),
                elapsed,
            ),
        }
    }

    async fn attempt_with_retries(
        &self,
        query: &QueryRecord,
        form: QueryForm,
        endpoint: &EndpointDescriptor,
    ) -> Result<SparqlResponse, AttemptError> {
        let mut retry = 0;
        loop {
            debug!(
                query = query.index(),
                pod = %endpoint.pod_id,
                attempt = retry + 1,
                "Sending query"
            );
            match self.client.query(endpoint, query.text(), form).await {
                Err(error) if error.is_transient() && retry < self.retry.max_retries => {
                    let delay = self.retry.backoff(retry);
                    warn!(
                        query = query.index(),
                        pod = %endpoint.pod_id,
                        delay_ms = delay.as_millis(),
                        %error,
                        "Request failed, retrying"
                    );
                    sleep(delay).await;
                    retry += 1;
                }
                result => return result,
            }
        }
    }
}

fn outcome_for_response(response: SparqlResponse, elapsed: Duration) -> ExecutionOutcome {
    match response {
        SparqlResponse::Solutions(rows) if rows.is_empty() => ExecutionOutcome::Empty { elapsed },
        SparqlResponse::Solutions(rows) => ExecutionOutcome::Success { rows, elapsed },
        // A positive ASK is reported as a single solution without bindings.
        SparqlResponse::Boolean(true) => ExecutionOutcome::Success {
            rows: vec![QuerySolution::from((
                Vec::<Variable>::new(),
                Vec::<Option<Term>>::new(),
            ))],
            elapsed,
        },
        SparqlResponse::Boolean(false) => ExecutionOutcome::Empty { elapsed },
        SparqlResponse::Triples(triples) if triples.is_empty() => {
            ExecutionOutcome::Empty { elapsed }
        }
        // Every triple of a graph is reported as one row.
        SparqlResponse::Triples(triples) => {
            let variables: Arc<[Variable]> = GRAPH_VARIABLES
                .into_iter()
                .map(Variable::new_unchecked)
                .collect();
            let rows = triples
                .into_iter()
                .map(|triple| {
                    let values = vec![
                        Some(Term::from(triple.subject)),
                        Some(Term::from(triple.predicate)),
                        Some(triple.object),
                    ];
                    QuerySolution::from((Arc::clone(&variables), values))
                })
                .collect();
            ExecutionOutcome::Success { rows, elapsed }
        }
    }
}
