use crate::error::FederationError;
use crate::registry::PodId;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// The line that separates two records in a queries file or a report.
pub const RECORD_SEPARATOR: &str = "---";

/// A single query read from the queries file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    /// The position of the query among the non-empty records of the file.
    index: usize,
    /// The trimmed query text.
    text: String,
    /// The pod this query is bound to, if the query carries a `# pod: <id>` hint.
    target_pod: Option<PodId>,
}

impl QueryRecord {
    /// Creates a new [QueryRecord] and extracts the pod hint from `text`.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let target_pod = parse_pod_hint(&text);
        Self {
            index,
            text,
            target_pod,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn target_pod(&self) -> Option<&PodId> {
        self.target_pod.as_ref()
    }

    /// Returns the form of the query, or `None` if the text does not look like a SPARQL query.
    ///
    /// Only the prologue is inspected. The remainder of the query is passed to the endpoint as
    /// is.
    pub fn form(&self) -> Option<QueryForm> {
        detect_query_form(&self.text)
    }
}

/// The four SPARQL query forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryForm {
    Select,
    Ask,
    Construct,
    Describe,
}

impl QueryForm {
    /// Returns whether the query is answered with an RDF graph instead of query results.
    pub fn returns_graph(self) -> bool {
        matches!(self, QueryForm::Construct | QueryForm::Describe)
    }
}

impl Display for QueryForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QueryForm::Select => "SELECT",
            QueryForm::Ask => "ASK",
            QueryForm::Construct => "CONSTRUCT",
            QueryForm::Describe => "DESCRIBE",
        };
        f.write_str(name)
    }
}

/// A loaded queries file.
///
/// The file is read once. [Self::records] can be called repeatedly and always starts at the
/// beginning of the file.
#[derive(Debug, Clone)]
pub struct QuerySource {
    path: PathBuf,
    content: String,
}

impl QuerySource {
    /// Reads the queries file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FederationError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|source| FederationError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            content,
        })
    }

    /// Creates a source from an in-memory string. `origin` is only used for diagnostics.
    pub fn from_text(origin: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: origin.into(),
            content: content.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the non-empty records of the source in file order.
    ///
    /// Whitespace-only records are skipped with a warning and do not consume an index.
    pub fn records(&self) -> impl Iterator<Item = QueryRecord> + '_ {
        split_records(&self.content)
            .enumerate()
            .filter(|(position, record)| {
                if record.is_empty() {
                    warn!(
                        source = %self.path.display(),
                        position,
                        "Skipping empty query record"
                    );
                }
                !record.is_empty()
            })
            .enumerate()
            .map(|(index, (_, text))| QueryRecord::new(index, text))
    }
}

/// Splits `text` at every line that consists of [RECORD_SEPARATOR] and returns the trimmed
/// records.
///
/// Empty records between two separators are returned as empty strings. A trailing separator
/// does not produce an additional record.
pub fn split_records(text: &str) -> SplitRecords<'_> {
    SplitRecords {
        remaining: Some(text),
    }
}

/// Iterator returned by [split_records].
#[derive(Debug, Clone)]
pub struct SplitRecords<'a> {
    remaining: Option<&'a str>,
}

impl<'a> Iterator for SplitRecords<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.remaining?;
        let mut offset = 0;
        for line in rest.split_inclusive('\n') {
            if line.trim() == RECORD_SEPARATOR {
                self.remaining = Some(&rest[offset + line.len()..]);
                return Some(rest[..offset].trim());
            }
            offset += line.len();
        }

        self.remaining = None;
        let record = rest.trim();
        (!record.is_empty()).then_some(record)
    }
}

/// Extracts the pod from a `# pod: <id>` comment line.
fn parse_pod_hint(text: &str) -> Option<PodId> {
    text.lines().find_map(|line| {
        let comment = line.trim().strip_prefix('#')?;
        let (key, value) = comment.split_once(':')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case("pod") && !value.is_empty())
            .then(|| PodId::new(value))
    })
}

/// Finds the query form keyword after the `PREFIX` / `BASE` declarations.
fn detect_query_form(text: &str) -> Option<QueryForm> {
    let mut tokens = text
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(str::split_whitespace);

    while let Some(token) = tokens.next() {
        let keyword = token.to_ascii_uppercase();
        if keyword.starts_with("PREFIX") || keyword.starts_with("BASE") {
            // The declaration ends with the IRI, which may be glued to the preceding token.
            if !token.ends_with('>') {
                tokens.by_ref().find(|t| t.ends_with('>'))?;
            }
            continue;
        }

        return [
            ("SELECT", QueryForm::Select),
            ("ASK", QueryForm::Ask),
            ("CONSTRUCT", QueryForm::Construct),
            ("DESCRIBE", QueryForm::Describe),
        ]
        .into_iter()
        .find(|(name, _)| keyword.starts_with(name))
        .map(|(_, form)| form);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::NamedTempFile;

    #[test]
    fn split_on_separator_lines() {
        let text = "SELECT ?a WHERE {}\n---\nSELECT ?b WHERE {}\n---\n";
        let records = split_records(text).collect::<Vec<_>>();
        assert_eq!(records, ["SELECT ?a WHERE {}", "SELECT ?b WHERE {}"]);
    }

    #[test]
    fn split_without_trailing_separator() {
        let text = "SELECT ?a WHERE {}\n\n---\n\n  SELECT ?b WHERE {}  ";
        let records = split_records(text).collect::<Vec<_>>();
        assert_eq!(records, ["SELECT ?a WHERE {}", "SELECT ?b WHERE {}"]);
    }

    #[test]
    fn split_handles_crlf_and_inline_dashes() {
        let text = "SELECT ?a WHERE { ?a ?b \"---\" }\r\n---\r\nASK {}\r\n";
        let records = split_records(text).collect::<Vec<_>>();
        assert_eq!(records, ["SELECT ?a WHERE { ?a ?b \"---\" }", "ASK {}"]);
    }

    #[test]
    fn split_keeps_inner_empty_records() {
        let records = split_records("ASK {}\n---\n   \n---\nASK {}\n").collect::<Vec<_>>();
        assert_eq!(records, ["ASK {}", "", "ASK {}"]);
    }

    #[test]
    fn empty_text_has_no_records() {
        assert_eq!(split_records("").count(), 0);
        assert_eq!(split_records("  \n").count(), 0);
    }

    #[test]
    fn records_skip_empty_and_are_indexed_densely() {
        let source =
            QuerySource::from_text("mem", "ASK {}\n---\n\n---\nSELECT * WHERE {}\n---\n");
        let records = source.records().collect::<Vec<_>>();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].index(), 0);
        assert_eq!(records[0].text(), "ASK {}");
        assert_eq!(records[1].index(), 1);
        assert_eq!(records[1].text(), "SELECT * WHERE {}");
    }

    #[test]
    fn records_are_restartable() {
        let source = QuerySource::from_text("mem", "ASK {}\n---\nASK { ?s ?p ?o }\n");
        assert_eq!(
            source.records().collect::<Vec<_>>(),
            source.records().collect::<Vec<_>>()
        );
    }

    #[test]
    fn open_missing_file() {
        let result = QuerySource::open("/this/file/does/not/exist.txt");
        assert!(matches!(
            result,
            Err(FederationError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn open_existing_file() {
        let file = NamedTempFile::new("queries.txt").unwrap();
        file.write_str("SELECT ?x WHERE { ?x a <http://solid-pod-0/ontology#Product> }\n---\n")
            .unwrap();

        let source = QuerySource::open(file.path()).unwrap();
        assert_eq!(source.records().count(), 1);
    }

    #[test]
    fn pod_hint_is_parsed() {
        let record = QueryRecord::new(0, "# Pod: solid_pod_2\nSELECT * WHERE { ?s ?p ?o }");
        assert_eq!(record.target_pod(), Some(&PodId::new("solid_pod_2")));

        let record = QueryRecord::new(0, "# some comment: not a pod\nSELECT * WHERE {}");
        assert_eq!(record.target_pod(), None);
    }

    #[test]
    fn query_form_after_prologue() {
        let record = QueryRecord::new(
            0,
            "# pod: solid_pod_0\n\
             BASE <http://solid-pod-0/>\n\
             PREFIX con: <http://solid-pod-0/ontology#>\n\
             PREFIX rdf:<http://www.w3.org/1999/02/22-rdf-syntax-ns#>\n\
             select ?p WHERE { ?p rdf:type con:Product }",
        );
        assert_eq!(record.form(), Some(QueryForm::Select));
        assert_eq!(
            QueryRecord::new(0, "CONSTRUCT WHERE { ?s ?p ?o }").form(),
            Some(QueryForm::Construct)
        );
        assert_eq!(QueryRecord::new(0, "ASK{}").form(), Some(QueryForm::Ask));
    }

    #[test]
    fn graph_forms() {
        let forms = [
            QueryForm::Select,
            QueryForm::Ask,
            QueryForm::Construct,
            QueryForm::Describe,
        ];
        assert_eq!(
            forms.map(|form| (form.to_string(), form.returns_graph())),
            [
                ("SELECT".to_owned(), false),
                ("ASK".to_owned(), false),
                ("CONSTRUCT".to_owned(), true),
                ("DESCRIBE".to_owned(), true),
            ]
        );
    }

    #[test]
    fn query_form_rejects_non_queries() {
        assert_eq!(QueryRecord::new(0, "INSERT DATA { <a> <b> <c> }").form(), None);
        assert_eq!(QueryRecord::new(0, "Here is your query:").form(), None);
        assert_eq!(QueryRecord::new(0, "PREFIX ex: <http://ex.org/>").form(), None);
    }
}
