use crate::config::FederationConfig;
use crate::error::{FederationError, UnknownPod};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::slice;
use std::str::FromStr;
use url::Url;

/// Identifies a pod within the federation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodId(String);

impl PodId {
    /// The id of the endpoint that is configured as the default endpoint.
    pub const DEFAULT: &'static str = "default";

    /// Creates a new [PodId].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id of the default endpoint.
    pub fn default_endpoint() -> Self {
        Self::new(Self::DEFAULT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PodId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A SPARQL endpoint of a single pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// The id of the pod. Unique within an [EndpointRegistry].
    pub pod_id: PodId,
    /// The URL of the SPARQL query endpoint.
    pub url: Url,
    /// An optional human-readable name of the pod (e.g., the company that operates it).
    pub label: Option<String>,
}

impl EndpointDescriptor {
    /// Creates a new [EndpointDescriptor] without a label.
    pub fn new(pod_id: PodId, url: Url) -> Self {
        Self {
            pod_id,
            url,
            label: None,
        }
    }

    /// Attaches a human-readable label to the descriptor.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Parses descriptors of the form `id=url` or `id=url|label`.
impl FromStr for EndpointDescriptor {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pod_id, rest) = s.split_once('=').ok_or_else(|| {
            FederationError::Config(format!(
                "Pod endpoint '{s}' must have the form 'id=url' or 'id=url|label'"
            ))
        })?;
        let pod_id = pod_id.trim();
        if pod_id.is_empty() {
            return Err(FederationError::Config(format!(
                "Pod endpoint '{s}' has an empty id"
            )));
        }

        let (url, label) = match rest.split_once('|') {
            Some((url, label)) => (url, Some(label.trim())),
            None => (rest, None),
        };
        let url = Url::parse(url.trim()).map_err(|e| {
            FederationError::Config(format!("Pod '{pod_id}' has an invalid URL: {e}"))
        })?;

        let descriptor = Self::new(PodId::new(pod_id), url);
        Ok(match label {
            Some(label) if !label.is_empty() => descriptor.with_label(label),
            _ => descriptor,
        })
    }
}

/// The static set of endpoints that queries can be dispatched to.
///
/// The registry is immutable after construction. Iteration order is the order in which the
/// endpoints were configured and is used as the order of the outcomes in the report.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointRegistry {
    /// Creates a new [EndpointRegistry].
    ///
    /// Fails if no endpoint is given or if two endpoints share a pod id.
    pub fn try_new(endpoints: Vec<EndpointDescriptor>) -> Result<Self, FederationError> {
        if endpoints.is_empty() {
            return Err(FederationError::Config(
                "At least one SPARQL endpoint must be configured".to_owned(),
            ));
        }

        let mut seen = HashSet::new();
        for endpoint in &endpoints {
            if !seen.insert(&endpoint.pod_id) {
                return Err(FederationError::Config(format!(
                    "The pod '{}' is configured more than once",
                    endpoint.pod_id
                )));
            }
        }

        Ok(Self { endpoints })
    }

    /// Creates the registry from the default endpoint (if any) followed by the named pods.
    pub fn from_config(config: &FederationConfig) -> Result<Self, FederationError> {
        let default = config
            .default_endpoint
            .as_ref()
            .map(|url| EndpointDescriptor::new(PodId::default_endpoint(), url.clone()));
        Self::try_new(default.into_iter().chain(config.pods.iter().cloned()).collect())
    }

    /// Resolves the endpoints a query should be dispatched to.
    ///
    /// Without a pod, the query is federated across every endpoint. With a pod, exactly the
    /// endpoint of that pod is returned.
    pub fn resolve(&self, pod: Option<&PodId>) -> Result<&[EndpointDescriptor], UnknownPod> {
        match pod {
            None => Ok(&self.endpoints),
            Some(pod) => self
                .endpoints
                .iter()
                .find(|endpoint| &endpoint.pod_id == pod)
                .map(slice::from_ref)
                .ok_or_else(|| UnknownPod(pod.clone())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always `false`, as a registry cannot be constructed without endpoints.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> EndpointDescriptor {
        EndpointDescriptor::new(
            PodId::new(id),
            Url::parse(&format!("http://localhost:3030/{id}/sparql")).unwrap(),
        )
    }

    #[test]
    fn parse_descriptor_with_label() {
        let descriptor: EndpointDescriptor =
            "solid_pod_1=http://localhost:3030/solid-pod-1/sparql|Lindner"
                .parse()
                .unwrap();
        assert_eq!(descriptor.pod_id.as_str(), "solid_pod_1");
        assert_eq!(
            descriptor.url.as_str(),
            "http://localhost:3030/solid-pod-1/sparql"
        );
        assert_eq!(descriptor.label.as_deref(), Some("Lindner"));
    }

    #[test]
    fn parse_descriptor_without_label() {
        let descriptor: EndpointDescriptor =
            " solid_pod_0 = http://localhost:3030/solid-pod-0/sparql "
                .parse()
                .unwrap();
        assert_eq!(descriptor.pod_id.as_str(), "solid_pod_0");
        assert_eq!(descriptor.label, None);
    }

    #[test]
    fn parse_descriptor_rejects_malformed_entries() {
        assert!(matches!(
            "http://localhost:3030/sparql".parse::<EndpointDescriptor>(),
            Err(FederationError::Config(_))
        ));
        assert!(matches!(
            "=http://localhost:3030/sparql".parse::<EndpointDescriptor>(),
            Err(FederationError::Config(_))
        ));
        assert!(matches!(
            "pod=not a url".parse::<EndpointDescriptor>(),
            Err(FederationError::Config(_))
        ));
    }

    #[test]
    fn registry_rejects_duplicates() {
        let result = EndpointRegistry::try_new(vec![descriptor("a"), descriptor("a")]);
        assert!(matches!(result, Err(FederationError::Config(_))));
    }

    #[test]
    fn registry_rejects_empty_set() {
        let result = EndpointRegistry::try_new(Vec::new());
        assert!(matches!(result, Err(FederationError::Config(_))));
    }

    #[test]
    fn resolve_unbound_returns_all_in_order() {
        let registry = EndpointRegistry::try_new(vec![
            descriptor("b"),
            descriptor("a"),
            descriptor("c"),
        ])
        .unwrap();

        let ids = registry
            .resolve(None)
            .unwrap()
            .iter()
            .map(|e| e.pod_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn resolve_bound_returns_single_endpoint() {
        let registry =
            EndpointRegistry::try_new(vec![descriptor("a"), descriptor("b")]).unwrap();

        let resolved = registry.resolve(Some(&PodId::new("b"))).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].pod_id.as_str(), "b");
    }

    #[test]
    fn resolve_unknown_pod() {
        let registry = EndpointRegistry::try_new(vec![descriptor("a")]).unwrap();

        let error = registry.resolve(Some(&PodId::new("z"))).unwrap_err();
        assert_eq!(error, UnknownPod(PodId::new("z")));
    }

    #[test]
    fn from_config_puts_default_endpoint_first() {
        let mut config = FederationConfig::new("queries.txt", "report.txt");
        config.default_endpoint = Some(Url::parse("http://localhost:3030/sparql").unwrap());
        config.pods = vec![descriptor("solid_pod_0")];

        let registry = EndpointRegistry::from_config(&config).unwrap();
        let ids = registry.iter().map(|e| e.pod_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, [PodId::DEFAULT, "solid_pod_0"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
