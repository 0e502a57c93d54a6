use crate::error::FederationError;
use crate::registry::EndpointDescriptor;
use crate::source::QueryForm;
use async_trait::async_trait;
use oxrdf::Triple;
use oxrdfio::{RdfFormat, RdfParser};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use sparesults::{
    QueryResultsFormat, QueryResultsParser, QuerySolution, ReaderQueryResultsParserOutput,
};

/// The media type of a SPARQL query sent in the body of a POST request.
const SPARQL_QUERY_MEDIA_TYPE: &str = "application/sparql-query";
/// The result formats that can be parsed, in order of preference.
const ACCEPTED_RESULTS: &str = "application/sparql-results+json, \
                                application/sparql-results+xml;q=0.9, \
                                text/tab-separated-values;q=0.8";
/// The graph formats that can be parsed, in order of preference.
const ACCEPTED_GRAPHS: &str = "application/n-triples, \
                               text/turtle;q=0.9, \
                               application/rdf+xml;q=0.8";
/// The number of body bytes that are kept in error messages.
const MAX_ERROR_BODY_LEN: usize = 256;

/// A parsed response of a SPARQL endpoint.
#[derive(Debug)]
pub enum SparqlResponse {
    /// Solutions of a `SELECT` query.
    Solutions(Vec<QuerySolution>),
    /// Result of an `ASK` query.
    Boolean(bool),
    /// The graph returned by a `CONSTRUCT` or `DESCRIBE` query.
    Triples(Vec<Triple>),
}

/// The serialization of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// A SPARQL query results document.
    Results(QueryResultsFormat),
    /// An RDF graph.
    Graph(RdfFormat),
}

impl ResponseFormat {
    /// The format assumed if the endpoint does not send a `Content-Type`.
    fn default_for(form: QueryForm) -> Self {
        if form.returns_graph() {
            Self::Graph(RdfFormat::Turtle)
        } else {
            Self::Results(QueryResultsFormat::Json)
        }
    }
}

/// An error raised by a single request.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// The request could not be delivered or the response could not be received.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The endpoint answered with an error status.
    #[error("HTTP status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The beginning of the response body.
        body: String,
    },
    /// The response is not a SPARQL results document.
    #[error("Malformed SPARQL results: {0}")]
    MalformedResponse(String),
}

impl AttemptError {
    /// Returns whether repeating the request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AttemptError::Transport(_))
    }
}

/// Sends a query to a SPARQL endpoint.
///
/// Implementations perform exactly one attempt. Retries and deadlines are handled by the
/// [Dispatcher](crate::Dispatcher).
#[async_trait]
pub trait SparqlClient: Send + Sync {
    /// Executes `query` against `endpoint`. `form` decides which response formats are
    /// requested.
    async fn query(
        &self,
        endpoint: &EndpointDescriptor,
        query: &str,
        form: QueryForm,
    ) -> Result<SparqlResponse, AttemptError>;
}

/// A [SparqlClient] that implements the SPARQL 1.1 Protocol via HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpSparqlClient {
    client: reqwest::Client,
}

impl HttpSparqlClient {
    /// Creates a new [HttpSparqlClient].
    pub fn try_new() -> Result<Self, FederationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pod-federation/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SparqlClient for HttpSparqlClient {
    async fn query(
        &self,
        endpoint: &EndpointDescriptor,
        query: &str,
        form: QueryForm,
    ) -> Result<SparqlResponse, AttemptError> {
        let accept = if form.returns_graph() {
            ACCEPTED_GRAPHS
        } else {
            ACCEPTED_RESULTS
        };
        let response = self
            .client
            .post(endpoint.url.clone())
            .header(CONTENT_TYPE, SPARQL_QUERY_MEDIA_TYPE)
            .header(ACCEPT, accept)
            .body(query.to_owned())
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            // The body is only used for diagnostics.
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body: truncate(body.trim(), MAX_ERROR_BODY_LEN).to_owned(),
            });
        }

        let format = match response.headers().get(CONTENT_TYPE) {
            None => ResponseFormat::default_for(form),
            Some(value) => {
                let media_type = value.to_str().unwrap_or_default();
                response_format_for_media_type(media_type).ok_or_else(|| {
                    AttemptError::MalformedResponse(format!(
                        "Unsupported content type '{media_type}'"
                    ))
                })?
            }
        };
        let body = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;
        match format {
            ResponseFormat::Results(format) => parse_results(&body, format),
            ResponseFormat::Graph(format) => parse_graph(&body, format, endpoint),
        }
    }
}

/// Maps a `Content-Type` header value to a parsable [ResponseFormat].
///
/// CSV results are not supported as they cannot be parsed back into RDF terms.
fn response_format_for_media_type(media_type: &str) -> Option<ResponseFormat> {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    match QueryResultsFormat::from_media_type(essence) {
        Some(QueryResultsFormat::Csv) => None,
        Some(format) => Some(ResponseFormat::Results(format)),
        None => RdfFormat::from_media_type(essence).map(ResponseFormat::Graph),
    }
}

/// Parses an RDF graph. Relative IRIs are resolved against the URL of `endpoint`.
pub fn parse_graph(
    body: &[u8],
    format: RdfFormat,
    endpoint: &EndpointDescriptor,
) -> Result<SparqlResponse, AttemptError> {
    RdfParser::from_format(format)
        .with_base_iri(endpoint.url.as_str())
        .map_err(|e| AttemptError::MalformedResponse(e.to_string()))?
        .for_reader(body)
        .map(|quad| quad.map(Triple::from))
        .collect::<Result<Vec<_>, _>>()
        .map(SparqlResponse::Triples)
        .map_err(|e| AttemptError::MalformedResponse(e.to_string()))
}

/// Parses a SPARQL results document.
pub fn parse_results(
    body: &[u8],
    format: QueryResultsFormat,
) -> Result<SparqlResponse, AttemptError> {
    let parser = QueryResultsParser::from_format(format)
        .for_reader(body)
        .map_err(|e| AttemptError::MalformedResponse(e.to_string()))?;
    match parser {
        ReaderQueryResultsParserOutput::Solutions(solutions) => solutions
            .collect::<Result<Vec<_>, _>>()
            .map(SparqlResponse::Solutions)
            .map_err(|e| AttemptError::MalformedResponse(e.to_string())),
        ReaderQueryResultsParserOutput::Boolean(value) => Ok(SparqlResponse::Boolean(value)),
    }
}

fn truncate(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
