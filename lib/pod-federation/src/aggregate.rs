use crate::outcome::ExecutionOutcome;
use crate::registry::PodId;
use crate::source::QueryRecord;
use sparesults::QuerySolution;
use std::fmt::{Display, Formatter};

/// The status of a query across all endpoints it was dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverallStatus {
    /// At least one endpoint returned solutions.
    Success,
    /// Every endpoint executed the query, but none returned solutions.
    Empty,
    /// No endpoint returned solutions, and some of them failed.
    PartialFailure,
    /// Every endpoint failed.
    Failure,
}

impl OverallStatus {
    /// Derives the status from the outcomes of a query.
    pub fn derive(outcomes: &[(PodId, ExecutionOutcome)]) -> Self {
        if outcomes.iter().any(|(_, o)| o.is_success()) {
            Self::Success
        } else if outcomes.iter().all(|(_, o)| o.is_failure()) {
            // Also covers the degenerate case without outcomes: nothing succeeded.
            Self::Failure
        } else if outcomes.iter().all(|(_, o)| o.is_empty_result()) {
            Self::Empty
        } else {
            Self::PartialFailure
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Empty => "EMPTY",
            Self::PartialFailure => "PARTIAL_FAILURE",
            Self::Failure => "FAILURE",
        }
    }
}

impl Display for OverallStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The outcomes of a single query across all endpoints it was dispatched to.
///
/// Solutions are kept per pod. They are never merged, as solutions from different pods describe
/// different subjects even if they share a query.
#[derive(Debug)]
pub struct AggregatedReportEntry {
    query_index: usize,
    query_text: String,
    /// The outcomes in registry order.
    outcomes: Vec<(PodId, ExecutionOutcome)>,
    overall_status: OverallStatus,
}

impl AggregatedReportEntry {
    pub fn query_index(&self) -> usize {
        self.query_index
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn outcomes(&self) -> &[(PodId, ExecutionOutcome)] {
        &self.outcomes
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }

    /// Returns the outcome of `pod`, if the query was dispatched to it.
    pub fn outcome_for(&self, pod: &PodId) -> Option<&ExecutionOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == pod)
            .map(|(_, outcome)| outcome)
    }

    /// Returns the solutions returned by `pod`.
    pub fn rows_for(&self, pod: &PodId) -> &[QuerySolution] {
        self.outcome_for(pod)
            .map(ExecutionOutcome::rows)
            .unwrap_or_default()
    }
}

/// Folds the outcomes of `query` into an [AggregatedReportEntry].
///
/// The order of `outcomes` is preserved.
pub fn aggregate(
    query: &QueryRecord,
    outcomes: Vec<(PodId, ExecutionOutcome)>,
) -> AggregatedReportEntry {
    AggregatedReportEntry {
        query_index: query.index(),
        query_text: query.text().to_owned(),
        overall_status: OverallStatus::derive(&outcomes),
        outcomes,
    }
}
