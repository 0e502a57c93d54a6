use clap::{Parser, Subcommand, ValueHint};
use pod_federation::config::{
    DEFAULT_BACKOFF_BASE, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT,
};
use pod_federation::EndpointDescriptor;
use std::path::PathBuf;
use url::Url;

#[derive(Parser)]
#[command(about, version, name = "pod-federation")]
/// Executes generated SPARQL queries against a federation of Solid pods
///
/// Every option can also be set via the environment or a `.env` file in the working directory.
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute every query of the queries file and append the outcomes to the report file
    Testrun {
        #[command(flatten)]
        endpoints: EndpointArgs,
        /// File with the generated queries, separated by lines that only contain `---`
        #[arg(long, env = "QUERIES_FILE", default_value = "generated_queries.txt", value_hint = ValueHint::FilePath)]
        queries_file: PathBuf,
        /// File the report is appended to
        #[arg(long, env = "REPORT_FILE", default_value = "query_report.txt", value_hint = ValueHint::FilePath)]
        report_file: PathBuf,
        /// Deadline in seconds for executing a query against a single pod, retries included
        #[arg(long, env = "QUERY_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
        timeout_secs: u64,
        /// How often a request is repeated after a connection error
        #[arg(long, env = "QUERY_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
        max_retries: u32,
        /// Delay in milliseconds before the first retry. Doubles for every further retry.
        #[arg(long, env = "QUERY_BACKOFF_MS", default_value_t = default_backoff_ms())]
        backoff_ms: u64,
        /// Maximum number of requests that are in flight at the same time
        #[arg(long, env = "MAX_IN_FLIGHT", default_value_t = DEFAULT_MAX_IN_FLIGHT)]
        max_in_flight: usize,
    },
    /// List the configured pods in the order in which they are queried
    Pods {
        #[command(flatten)]
        endpoints: EndpointArgs,
    },
}

#[derive(clap::Args)]
pub struct EndpointArgs {
    /// SPARQL endpoint that is registered as the pod `default`
    #[arg(long, env = "SPARQL_ENDPOINT", value_hint = ValueHint::Url)]
    pub endpoint: Option<Url>,
    /// Pod endpoints of the form `id=url` or `id=url|label`
    ///
    /// Multiple pods are separated by commas.
    #[arg(long = "pod", env = "SPARQL_PODS", value_delimiter = ',')]
    pub pods: Vec<EndpointDescriptor>,
}

fn default_backoff_ms() -> u64 {
    u64::try_from(DEFAULT_BACKOFF_BASE.as_millis()).unwrap_or(u64::MAX)
}
