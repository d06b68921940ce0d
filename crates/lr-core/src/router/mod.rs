//! Request router: per-request classification at the device's network
//! boundary.
//!
//! For every outgoing request the router decides `Passthrough` (platform
//! networking applies untouched) or `InterceptWithFallback` (the router
//! issues the request itself and substitutes a defined empty response only
//! on network failure). The hard invariant: API, auth, payment, and
//! third-party SDK traffic is never delayed, retried, or answered
//! synthetically — the passthrough rules exist to guarantee that.
//!
//! Rules are static configuration, evaluated in declared order, first
//! match wins, no match defaults to passthrough. Classification never
//! errors; anything the router cannot even parse passes through.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::{CoreError, Result};

/// What the router does with a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Default platform network handling; no caching, no fallback.
    Passthrough,
    /// The router performs the request and substitutes an empty
    /// no-content response on network failure.
    InterceptWithFallback,
}

/// Match predicate over a request's scheme, host, path, or origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePredicate {
    /// Request scheme is one of these (extension/plugin schemes).
    SchemeIn(Vec<String>),
    /// Request host equals or is a subdomain of one of these.
    HostSuffixIn(Vec<String>),
    /// Request path contains this segment marker.
    PathContains(String),
    /// Request targets one of these ports.
    PortIn(Vec<u16>),
    /// Request origin differs from the router's own origin.
    CrossOrigin,
    /// Matches everything.
    Always,
}

/// One ordered routing rule.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    /// Diagnostic name for logs.
    pub label: &'static str,
    pub predicate: RoutePredicate,
    pub disposition: Disposition,
}

/// Static router configuration. Changing it requires a new router
/// instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// The origin the router itself serves assets from.
    pub own_origin: String,

    /// Non-origin schemes used by the host platform's extension system.
    #[serde(default = "default_extension_schemes")]
    pub extension_schemes: Vec<String>,

    /// Known advertising/analytics domains.
    #[serde(default = "default_analytics_hosts")]
    pub analytics_hosts: Vec<String>,

    /// Backend API/data-layer domains.
    #[serde(default)]
    pub api_hosts: Vec<String>,

    /// Path segment marking API traffic regardless of host.
    #[serde(default = "default_api_marker")]
    pub api_path_marker: String,

    /// Known local-development ports.
    #[serde(default = "default_dev_ports")]
    pub dev_ports: Vec<u16>,
}

fn default_extension_schemes() -> Vec<String> {
    ["chrome-extension", "moz-extension", "safari-web-extension"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_analytics_hosts() -> Vec<String> {
    [
        "doubleclick.net",
        "googlesyndication.com",
        "google-analytics.com",
        "googletagmanager.com",
        "facebook.net",
        "segment.io",
        "sentry.io",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_api_marker() -> String {
    "/api/".to_string()
}

fn default_dev_ports() -> Vec<u16> {
    vec![3000, 3001, 5173, 8080, 8100, 35729]
}

impl RouterConfig {
    pub fn new(own_origin: impl Into<String>) -> Self {
        Self {
            own_origin: own_origin.into(),
            extension_schemes: default_extension_schemes(),
            analytics_hosts: default_analytics_hosts(),
            api_hosts: Vec::new(),
            api_path_marker: default_api_marker(),
            dev_ports: default_dev_ports(),
        }
    }

    /// Add backend API hosts that must always pass through.
    pub fn with_api_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.api_hosts.extend(hosts);
        self
    }
}

/// Response substituted when an intercepted fetch fails at the network
/// layer. Deliberately empty: callers see "no content", never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FallbackResponse {
    /// The defined empty response.
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: Vec::new(),
        }
    }
}

/// The per-request classifier plus intercept fetcher.
pub struct RequestRouter {
    origin: Url,
    rules: Vec<RoutingRule>,
    agent: ureq::Agent,
}

impl RequestRouter {
    /// Build a router with the required default rule set for the given
    /// configuration.
    pub fn new(config: RouterConfig) -> Result<Self> {
        let origin = Url::parse(&config.own_origin)
            .map_err(|err| CoreError::Config(format!("own_origin '{}': {}", config.own_origin, err)))?;
        let rules = Self::default_rules(&config);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build();
        Ok(Self {
            origin,
            rules,
            agent,
        })
    }

    /// The required default rule set, in precedence order. Rules 1-5 are
    /// the never-intercept guarantees; only same-origin static assets
    /// reach the final intercept rule.
    fn default_rules(config: &RouterConfig) -> Vec<RoutingRule> {
        vec![
            RoutingRule {
                label: "extension-scheme",
                predicate: RoutePredicate::SchemeIn(config.extension_schemes.clone()),
                disposition: Disposition::Passthrough,
            },
            RoutingRule {
                label: "analytics-domain",
                predicate: RoutePredicate::HostSuffixIn(config.analytics_hosts.clone()),
                disposition: Disposition::Passthrough,
            },
            RoutingRule {
                label: "api-host",
                predicate: RoutePredicate::HostSuffixIn(config.api_hosts.clone()),
                disposition: Disposition::Passthrough,
            },
            RoutingRule {
                label: "api-path",
                predicate: RoutePredicate::PathContains(config.api_path_marker.clone()),
                disposition: Disposition::Passthrough,
            },
            RoutingRule {
                label: "dev-port",
                predicate: RoutePredicate::PortIn(config.dev_ports.clone()),
                disposition: Disposition::Passthrough,
            },
            RoutingRule {
                label: "cross-origin",
                predicate: RoutePredicate::CrossOrigin,
                disposition: Disposition::Passthrough,
            },
            RoutingRule {
                label: "same-origin-asset",
                predicate: RoutePredicate::Always,
                disposition: Disposition::InterceptWithFallback,
            },
        ]
    }

    /// The ordered rule list.
    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    /// Resolve a request string to a URL. Absolute URLs parse directly;
    /// root-relative references resolve against our own origin. Anything
    /// else is unparseable: `Url::join` would happily treat junk like
    /// `::::` as a relative path, so the join is gated on a leading slash.
    fn resolve(&self, request: &str) -> Option<Url> {
        if let Ok(url) = Url::parse(request) {
            return Some(url);
        }
        if request.starts_with('/') {
            return self.origin.join(request).ok();
        }
        None
    }

    /// Classify one request. Never errors: unparseable requests pass
    /// through, unmatched requests fall to the documented default.
    pub fn classify(&self, request: &str) -> Disposition {
        let Some(url) = self.resolve(request) else {
            return Disposition::Passthrough;
        };

        for rule in &self.rules {
            if self.matches(&rule.predicate, &url) {
                trace!(request, rule = rule.label, disposition = ?rule.disposition, "Request classified");
                return rule.disposition;
            }
        }
        Disposition::Passthrough
    }

    fn matches(&self, predicate: &RoutePredicate, url: &Url) -> bool {
        match predicate {
            RoutePredicate::SchemeIn(schemes) => {
                schemes.iter().any(|s| s.as_str() == url.scheme())
            }
            RoutePredicate::HostSuffixIn(hosts) => match url.host_str() {
                Some(host) => hosts
                    .iter()
                    .any(|h| host == h.as_str() || host.ends_with(&format!(".{}", h))),
                None => false,
            },
            RoutePredicate::PathContains(marker) => url.path().contains(marker.as_str()),
            RoutePredicate::PortIn(ports) => url
                .port_or_known_default()
                .is_some_and(|port| ports.contains(&port)),
            RoutePredicate::CrossOrigin => url.origin() != self.origin.origin(),
            RoutePredicate::Always => true,
        }
    }

    /// Perform an intercepted request. Network failure is swallowed into
    /// the defined empty response; HTTP error statuses are real responses
    /// and are returned as received.
    pub fn fetch_with_fallback(&self, request: &str) -> FallbackResponse {
        let Some(url) = self.resolve(request) else {
            return FallbackResponse::no_content();
        };

        match self.agent.get(url.as_str()).call() {
            Ok(response) => {
                let status = response.status();
                let mut body = Vec::new();
                if std::io::Read::read_to_end(&mut response.into_reader(), &mut body).is_err() {
                    debug!(%url, "Intercepted body read failed, substituting empty response");
                    return FallbackResponse::no_content();
                }
                FallbackResponse { status, body }
            }
            Err(ureq::Error::Status(status, response)) => {
                let mut body = Vec::new();
                let _ = std::io::Read::read_to_end(&mut response.into_reader(), &mut body);
                FallbackResponse { status, body }
            }
            Err(ureq::Error::Transport(err)) => {
                debug!(%url, error = %err, "Intercepted fetch failed, substituting empty response");
                FallbackResponse::no_content()
            }
        }
    }
}
