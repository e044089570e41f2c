//! Request classification.
//!
//! Every intercepted request gets exactly one label, and the label alone
//! decides which caching strategy handles it. Navigation is checked first, so
//! a page load from a static host is still a navigation.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Destination, ProxyRequest};

/// Label assigned to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestClass {
    Navigation,
    StaticAsset,
    Other,
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestClass::Navigation => "NAVIGATION",
            RequestClass::StaticAsset => "STATIC_ASSET",
            RequestClass::Other => "OTHER",
        })
    }
}

/// Which destinations and hosts count as immutable static content.
#[derive(Debug, Clone, Default)]
pub struct StaticRules {
    hosts: HashSet<String>,
    destinations: HashSet<Destination>,
}

impl StaticRules {
    pub fn new<H, S>(hosts: H, destinations: impl IntoIterator<Item = Destination>) -> Self
    where
        H: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts.into_iter().map(|h| h.as_ref().trim().to_ascii_lowercase()).collect(),
            destinations: destinations.into_iter().collect(),
        }
    }

    pub fn is_static_host(&self, host: &str) -> bool {
        self.hosts.contains(&host.to_ascii_lowercase())
    }

    pub fn is_static_destination(&self, destination: Destination) -> bool {
        self.destinations.contains(&destination)
    }
}

/// Classify a request.
pub fn classify(request: &ProxyRequest, rules: &StaticRules) -> RequestClass {
    if request.navigate {
        return RequestClass::Navigation;
    }

    if rules.is_static_destination(request.destination) || request.host().is_some_and(|h| rules.is_static_host(h)) {
        return RequestClass::StaticAsset;
    }

    RequestClass::Other
}
