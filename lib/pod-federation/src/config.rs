use crate::error::FederationError;
use crate::registry::EndpointDescriptor;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// The deadline for executing a query against a single endpoint (including retries).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// How often a request is repeated after a transient failure.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// The delay before the first retry. Doubles for every further retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
/// The maximum number of endpoint executions that run at the same time.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Exponential backoff for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The number of additional attempts after the first one.
    pub max_retries: u32,
    /// The delay before the first retry.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Returns the delay before the retry with the (zero-based) number `retry`.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(2_u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

/// Holds the configuration of a federated run.
///
/// The configuration is constructed once at startup and passed by reference to the components
/// that need it.
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// The endpoint that is registered under [PodId::DEFAULT](crate::PodId::DEFAULT).
    pub default_endpoint: Option<Url>,
    /// Named pod endpoints, in registry order.
    pub pods: Vec<EndpointDescriptor>,
    /// The file that contains the generated queries.
    pub queries_file: PathBuf,
    /// The file the run report is appended to.
    pub report_file: PathBuf,
    /// The deadline for a single endpoint.
    pub timeout: Duration,
    /// The retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Bounds the number of concurrent endpoint executions.
    pub max_in_flight: usize,
}

impl FederationConfig {
    /// Creates a configuration with default limits and no endpoints.
    pub fn new(queries_file: impl Into<PathBuf>, report_file: impl Into<PathBuf>) -> Self {
        Self {
            default_endpoint: None,
            pods: Vec::new(),
            queries_file: queries_file.into(),
            report_file: report_file.into(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Checks the configuration for errors that would make every run fail.
    pub fn validate(&self) -> Result<(), FederationError> {
        if self.default_endpoint.is_none() && self.pods.is_empty() {
            return Err(FederationError::Config(
                "No SPARQL endpoint configured. Set SPARQL_ENDPOINT or SPARQL_PODS".to_owned(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(FederationError::Config(
                "The query timeout must be greater than zero".to_owned(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(FederationError::Config(
                "At least one request must be allowed in flight".to_owned(),
            ));
        }
        Ok(())
    }
}
