#![doc = include_str!("../README.md")]

pub mod aggregate;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod outcome;
pub mod registry;
pub mod report;
pub mod source;

pub use aggregate::{aggregate, AggregatedReportEntry, OverallStatus};
pub use client::{HttpSparqlClient, SparqlClient, SparqlResponse};
pub use config::{FederationConfig, RetryPolicy};
pub use dispatch::Dispatcher;
pub use engine::FederationEngine;
pub use error::{FederationError, UnknownPod, WriteError};
pub use outcome::{ExecutionOutcome, FailureKind};
pub use registry::{EndpointDescriptor, EndpointRegistry, PodId};
pub use report::{RunReport, RunStatus, RunSummary};
pub use source::{QueryForm, QueryRecord, QuerySource};
