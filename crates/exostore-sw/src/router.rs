//! Request routing.
//!
//! Classification is an ordered list of named predicate rules, evaluated in
//! priority order with first match winning. It is total and deterministic:
//! every request yields either pass-through or exactly one routing class, and
//! it performs no I/O.

use crate::config::SwConfig;
use crate::fetch::FetchRequest;

/// The caching strategy assigned to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingClass {
    /// Full-document load: network with cache/offline fallback.
    Navigation,
    /// Dynamic content: live response preferred, cache as fallback.
    NetworkFirst,
    /// Static asset: cache hit short-circuits the network.
    CacheFirst,
    /// Anything else. Same behavior as network-first; kept distinct to make
    /// the intent of a route visible.
    Default,
}

impl std::fmt::Display for RoutingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingClass::Navigation => write!(f, "navigation"),
            RoutingClass::NetworkFirst => write!(f, "network-first"),
            RoutingClass::CacheFirst => write!(f, "cache-first"),
            RoutingClass::Default => write!(f, "default"),
        }
    }
}

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Not intercepted; the host platform does its default networking.
    Passthrough,
    /// Handled by the given strategy.
    Handle(RoutingClass),
}

/// One named classification rule. Returns `None` when it does not apply.
pub struct RouteRule {
    name: &'static str,
    predicate: Box<dyn Fn(&FetchRequest) -> Option<RouteDecision> + Send + Sync>,
}

impl RouteRule {
    /// Create a rule.
    pub fn new(
        name: &'static str,
        predicate: impl Fn(&FetchRequest) -> Option<RouteDecision> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            predicate: Box::new(predicate),
        }
    }

    /// Rule name, for inspection and logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Evaluate the rule.
    pub fn check(&self, request: &FetchRequest) -> Option<RouteDecision> {
        (self.predicate)(request)
    }
}

/// Ordered rule list.
pub struct Router {
    rules: Vec<RouteRule>,
}

impl Router {
    /// Build the standard rule set from configuration, in priority order:
    /// non-GET, non-http(s), navigation, network-first markers, cache-first
    /// markers, default.
    pub fn from_config(config: &SwConfig) -> Self {
        let network_first = config.network_first_markers.clone();
        let cache_first = config.cache_first_markers.clone();

        let rules = vec![
            RouteRule::new("non-get", |req| {
                (req.method != http::Method::GET).then_some(RouteDecision::Passthrough)
            }),
            RouteRule::new("non-http", |req| {
                (!matches!(req.url.scheme(), "http" | "https"))
                    .then_some(RouteDecision::Passthrough)
            }),
            RouteRule::new("navigation", |req| {
                req.is_navigation()
                    .then_some(RouteDecision::Handle(RoutingClass::Navigation))
            }),
            RouteRule::new("network-first-marker", move |req| {
                let url = req.url.as_str();
                network_first
                    .iter()
                    .any(|marker| url.contains(marker.as_str()))
                    .then_some(RouteDecision::Handle(RoutingClass::NetworkFirst))
            }),
            RouteRule::new("cache-first-marker", move |req| {
                let url = req.url.as_str();
                cache_first
                    .iter()
                    .any(|marker| url.contains(marker.as_str()))
                    .then_some(RouteDecision::Handle(RoutingClass::CacheFirst))
            }),
            RouteRule::new("default", |_| {
                Some(RouteDecision::Handle(RoutingClass::Default))
            }),
        ];

        Self { rules }
    }

    /// Classify a request: first matching rule wins. The terminal default
    /// rule keeps classification total.
    pub fn classify(&self, request: &FetchRequest) -> RouteDecision {
        for rule in &self.rules {
            if let Some(decision) = rule.check(request) {
                return decision;
            }
        }
        RouteDecision::Handle(RoutingClass::Default)
    }

    /// Rule names in evaluation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(RouteRule::name).collect()
    }
}
