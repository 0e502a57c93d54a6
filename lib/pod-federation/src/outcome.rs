use sparesults::QuerySolution;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Classifies why executing a query against an endpoint failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The endpoint did not answer within the deadline.
    Timeout,
    /// The endpoint could not be reached, even after retrying.
    ConnectionError,
    /// The endpoint answered with an HTTP status >= 400.
    HttpError(u16),
    /// The query text is not a SPARQL query and has not been sent.
    MalformedQuery,
    /// The response body is not a SPARQL results document.
    MalformedResponse,
    /// The query is bound to a pod that is not configured.
    UnknownPod,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => f.write_str("Timeout"),
            FailureKind::ConnectionError => f.write_str("ConnectionError"),
            FailureKind::HttpError(status) => write!(f, "HttpError({status})"),
            FailureKind::MalformedQuery => f.write_str("MalformedQuery"),
            FailureKind::MalformedResponse => f.write_str("MalformedResponse"),
            FailureKind::UnknownPod => f.write_str("UnknownPod"),
        }
    }
}

/// The result of executing one query against one endpoint.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The query returned at least one solution.
    Success {
        rows: Vec<QuerySolution>,
        elapsed: Duration,
    },
    /// The query was executed correctly but has no solutions.
    Empty { elapsed: Duration },
    /// The query could not be executed.
    Failure {
        kind: FailureKind,
        message: String,
        elapsed: Duration,
    },
}

impl ExecutionOutcome {
    /// Creates a [ExecutionOutcome::Failure].
    pub fn failure(kind: FailureKind, message: impl Into<String>, elapsed: Duration) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
            elapsed,
        }
    }

    /// The time spent on this endpoint, including retries.
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Success { elapsed, .. }
            | Self::Empty { elapsed }
            | Self::Failure { elapsed, .. } => *elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_empty_result(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failure { kind, .. } => Some(*kind),
            Self::Success { .. } | Self::Empty { .. } => None,
        }
    }

    /// The solutions of a successful execution, or an empty slice otherwise.
    pub fn rows(&self) -> &[QuerySolution] {
        match self {
            Self::Success { rows, .. } => rows,
            Self::Empty { .. } | Self::Failure { .. } => &[],
        }
    }

    /// The label used in the report: `SUCCESS`, `EMPTY` or `FAILURE:<kind>`.
    pub fn status_label(&self) -> String {
        match self {
            Self::Success { .. } => "SUCCESS".to_owned(),
            Self::Empty { .. } => "EMPTY".to_owned(),
            Self::Failure { kind, .. } => format!("FAILURE:{kind}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        let elapsed = Duration::from_millis(5);
        assert_eq!(
            ExecutionOutcome::Empty { elapsed }.status_label(),
            "EMPTY"
        );
        assert_eq!(
            ExecutionOutcome::failure(FailureKind::HttpError(404), "Not Found", elapsed)
                .status_label(),
            "FAILURE:HttpError(404)"
        );
        assert_eq!(
            ExecutionOutcome::failure(FailureKind::Timeout, "", elapsed).status_label(),
            "FAILURE:Timeout"
        );
    }

    #[test]
    fn failure_accessors() {
        let outcome = ExecutionOutcome::failure(
            FailureKind::ConnectionError,
            "connection refused",
            Duration::from_millis(1500),
        );
        assert!(outcome.is_failure());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::ConnectionError));
        assert_eq!(outcome.elapsed(), Duration::from_millis(1500));
        assert!(outcome.rows().is_empty());
    }
}
