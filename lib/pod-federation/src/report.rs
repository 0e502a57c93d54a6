use crate::aggregate::{AggregatedReportEntry, OverallStatus};
use crate::error::WriteError;
use crate::outcome::ExecutionOutcome;
use crate::source::RECORD_SEPARATOR;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::{Display, Formatter, Write as _};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use uuid::Uuid;

/// Indicates whether a run executed all queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// Every query of the source has an entry in the report.
    Completed,
    /// The run was cancelled. The report only contains the queries that completed before.
    Interrupted,
}

impl RunStatus {
    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::Interrupted => "INTERRUPTED",
        }
    }
}

/// The report of a single run.
#[derive(Debug)]
pub struct RunReport {
    /// Identifies the run within an appended report file.
    run_id: Uuid,
    /// When the run has been started.
    started_at: DateTime<Utc>,
    status: RunStatus,
    /// The entries, ordered by query index.
    entries: Vec<AggregatedReportEntry>,
}

impl RunReport {
    /// Creates a new [RunReport]. The entries are ordered by their query index, regardless of
    /// the order in which the queries completed.
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        status: RunStatus,
        mut entries: Vec<AggregatedReportEntry>,
    ) -> Self {
        entries.sort_by_key(AggregatedReportEntry::query_index);
        Self {
            run_id,
            started_at,
            status,
            entries,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn entries(&self) -> &[AggregatedReportEntry] {
        &self.entries
    }

    /// Counts the entries per [OverallStatus].
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            success: 0,
            empty: 0,
            partial_failure: 0,
            failure: 0,
            status: self.status,
        };
        for entry in &self.entries {
            match entry.overall_status() {
                OverallStatus::Success => summary.success += 1,
                OverallStatus::Empty => summary.empty += 1,
                OverallStatus::PartialFailure => summary.partial_failure += 1,
                OverallStatus::Failure => summary.failure += 1,
            }
        }
        summary
    }

    /// Renders the report in the textual report format.
    ///
    /// The report starts with a header block, followed by one block per entry. Every block is
    /// terminated by a [RECORD_SEPARATOR] line, such that the report can be split with
    /// [split_records](crate::source::split_records).
    pub fn render(&self) -> String {
        let mut output = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_to(&mut output);
        output
    }

    fn write_to(&self, output: &mut String) -> std::fmt::Result {
        writeln!(
            output,
            "# run {}: status={} started={} entries={}",
            self.run_id,
            self.status.label(),
            self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.entries.len()
        )?;
        writeln!(output, "{RECORD_SEPARATOR}")?;

        for entry in &self.entries {
            write_entry(output, entry)?;
            writeln!(output, "{RECORD_SEPARATOR}")?;
        }
        Ok(())
    }
}

fn write_entry(output: &mut String, entry: &AggregatedReportEntry) -> std::fmt::Result {
    writeln!(
        output,
        "# query {}: {}",
        entry.query_index(),
        entry.overall_status()
    )?;
    writeln!(output, "{}", entry.query_text())?;
    for (pod, outcome) in entry.outcomes() {
        write!(output, "# pod {pod}: {}", outcome.status_label())?;
        match outcome {
            ExecutionOutcome::Success { rows, .. } => write!(output, " rows={}", rows.len())?,
            ExecutionOutcome::Empty { .. } => write!(output, " rows=0")?,
            ExecutionOutcome::Failure { .. } => {}
        }
        write!(output, " elapsed_ms={}", outcome.elapsed().as_millis())?;
        if let ExecutionOutcome::Failure { message, .. } = outcome {
            write!(output, " error={}", single_line(message))?;
        }
        writeln!(output)?;
    }
    Ok(())
}

/// Keeps every pod on a single line of the report.
fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Appends `report` to the file at `destination`.
///
/// The file is created if it does not exist. Existing content is never truncated.
pub fn append(report: &RunReport, destination: &Path) -> Result<(), WriteError> {
    let to_write_error = |source| WriteError {
        path: destination.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(destination)
        .map_err(to_write_error)?;
    file.write_all(report.render().as_bytes())
        .map_err(to_write_error)?;
    file.flush().map_err(to_write_error)
}

/// The number of entries per [OverallStatus] of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub success: usize,
    pub empty: usize,
    pub partial_failure: usize,
    pub failure: usize,
    pub status: RunStatus,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.success + self.empty + self.partial_failure + self.failure
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Success: {}, Empty: {}, PartialFailure: {}, Failure: {}",
            self.success, self.empty, self.partial_failure, self.failure
        )?;
        if self.status == RunStatus::Interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::outcome::FailureKind;
    use crate::registry::PodId;
    use crate::source::{split_records, QueryRecord};
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use chrono::TimeZone;
    use insta::assert_snapshot;
    use oxrdf::{Literal, Term, Variable};
    use sparesults::QuerySolution;
    use std::fs;
    use std::time::Duration;

    fn rows(count: usize) -> Vec<QuerySolution> {
        (0..count)
            .map(|i| {
                QuerySolution::from((
                    vec![Variable::new_unchecked("name")],
                    vec![Some(Term::from(Literal::new_simple_literal(i.to_string())))],
                ))
            })
            .collect()
    }

    fn entry(index: usize, outcomes: Vec<(&str, ExecutionOutcome)>) -> AggregatedReportEntry {
        let query = QueryRecord::new(
            index,
            format!("SELECT ?name WHERE {{ ?c <http://schema.org/name> ?name }} # {index}"),
        );
        aggregate(
            &query,
            outcomes
                .into_iter()
                .map(|(pod, outcome)| (PodId::new(pod), outcome))
                .collect(),
        )
    }

    fn report(status: RunStatus, entries: Vec<AggregatedReportEntry>) -> RunReport {
        RunReport::new(
            Uuid::nil(),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            status,
            entries,
        )
    }

    fn sample_report() -> RunReport {
        report(
            RunStatus::Completed,
            vec![
                entry(
                    1,
                    vec![(
                        "solid_pod_0",
                        ExecutionOutcome::Empty {
                            elapsed: Duration::from_millis(8),
                        },
                    )],
                ),
                entry(
                    0,
                    vec![
                        (
                            "solid_pod_0",
                            ExecutionOutcome::Success {
                                rows: rows(3),
                                elapsed: Duration::from_millis(120),
                            },
                        ),
                        (
                            "solid_pod_1",
                            ExecutionOutcome::failure(
                                FailureKind::Timeout,
                                "No response\nwithin 30000 ms",
                                Duration::from_secs(30),
                            ),
                        ),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn render_report() {
        assert_snapshot!(sample_report().render(), @r"
        # run 00000000-0000-0000-0000-000000000000: status=COMPLETED started=2025-06-01T12:00:00Z entries=2
        ---
        # query 0: SUCCESS
        SELECT ?name WHERE { ?c <http://schema.org/name> ?name } # 0
        # pod solid_pod_0: SUCCESS rows=3 elapsed_ms=120
        # pod solid_pod_1: FAILURE:Timeout elapsed_ms=30000 error=No response within 30000 ms
        ---
        # query 1: EMPTY
        SELECT ?name WHERE { ?c <http://schema.org/name> ?name } # 1
        # pod solid_pod_0: EMPTY rows=0 elapsed_ms=8
        ---
        ");
    }

    #[test]
    fn render_interrupted_report() {
        let report = report(
            RunStatus::Interrupted,
            vec![
                entry(
                    3,
                    vec![(
                        "solid_pod_2",
                        ExecutionOutcome::Success {
                            rows: rows(1),
                            elapsed: Duration::from_millis(40),
                        },
                    )],
                ),
                entry(
                    0,
                    vec![(
                        "solid_pod_7",
                        ExecutionOutcome::failure(
                            FailureKind::UnknownPod,
                            "The pod 'solid_pod_7' is not configured",
                            Duration::ZERO,
                        ),
                    )],
                ),
            ],
        );

        assert_snapshot!(report.render(), @r"
        # run 00000000-0000-0000-0000-000000000000: status=INTERRUPTED started=2025-06-01T12:00:00Z entries=2
        ---
        # query 0: FAILURE
        SELECT ?name WHERE { ?c <http://schema.org/name> ?name } # 0
        # pod solid_pod_7: FAILURE:UnknownPod elapsed_ms=0 error=The pod 'solid_pod_7' is not configured
        ---
        # query 3: SUCCESS
        SELECT ?name WHERE { ?c <http://schema.org/name> ?name } # 3
        # pod solid_pod_2: SUCCESS rows=1 elapsed_ms=40
        ---
        ");
        assert_eq!(
            report.summary().to_string(),
            "Success: 1, Empty: 0, PartialFailure: 0, Failure: 1 (interrupted)"
        );
    }

    #[test]
    fn rendered_report_can_be_split_again() {
        let rendered = sample_report().render();
        let blocks = split_records(&rendered).collect::<Vec<_>>();

        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].starts_with("# run "));
        assert!(blocks[1].starts_with("# query 0: SUCCESS"));
        assert!(blocks[2].starts_with("# query 1: EMPTY"));
    }

    #[test]
    fn summary_counts() {
        let report = report(
            RunStatus::Interrupted,
            vec![
                entry(
                    0,
                    vec![(
                        "a",
                        ExecutionOutcome::failure(FailureKind::HttpError(400), "", Duration::ZERO),
                    )],
                ),
                entry(
                    1,
                    vec![
                        (
                            "a",
                            ExecutionOutcome::Empty {
                                elapsed: Duration::ZERO,
                            },
                        ),
                        (
                            "b",
                            ExecutionOutcome::failure(
                                FailureKind::ConnectionError,
                                "",
                                Duration::ZERO,
                            ),
                        ),
                    ],
                ),
            ],
        );

        let summary = report.summary();
        assert_eq!(summary.failure, 1);
        assert_eq!(summary.partial_failure, 1);
        assert_eq!(summary.total(), 2);
        assert_eq!(
            summary.to_string(),
            "Success: 0, Empty: 0, PartialFailure: 1, Failure: 1 (interrupted)"
        );
    }

    #[test]
    fn append_never_truncates() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("report.txt");
        file.write_str("previous content\n").unwrap();

        let report = sample_report();
        append(&report, file.path()).unwrap();
        append(&report, file.path()).unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("previous content\n"));
        assert_eq!(content.matches("# run ").count(), 2);
        assert_eq!(content.matches("# query 0: SUCCESS").count(), 2);
    }

    #[test]
    fn append_reports_write_errors() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("missing").join("report.txt");

        let error = append(&sample_report(), &destination).unwrap_err();
        assert_eq!(error.path, destination);
    }
}
