//! Synthetic routing request used to tell a live service from a live process.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ureq::Agent;

/// A longitude/latitude pair as OSRM expects it in URLs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

/// Distance (meters) and duration (seconds) of the first returned route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteSummary {
    pub distance: f64,
    pub duration: f64,
}

impl RouteSummary {
    pub fn is_positive(&self) -> bool {
        self.distance > 0.0 && self.duration > 0.0
    }
}

/// What the service answered to the synthetic request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteCheck {
    Route(RouteSummary),
    /// The body parsed but carried no route.
    NoRoute {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },
}

/// Issues the synthetic route request against a locally published port.
///
/// Errors mean the service could not be asked or answered garbage
/// (connection refused, timeout, malformed body).
pub trait HealthProbe {
    fn check_route(&self, port: u16) -> Result<RouteCheck>;
}

#[derive(Debug, Clone)]
pub struct HealthTarget {
    pub host: String,
    pub profile: String,
    pub from: Coordinate,
    pub to: Coordinate,
}

impl HealthTarget {
    pub fn route_url(&self, port: u16) -> String {
        format!(
            "http://{}:{port}/route/v1/{}/{},{};{},{}",
            self.host, self.profile, self.from.lon, self.from.lat, self.to.lon, self.to.lat
        )
    }
}

pub struct HttpHealthProbe {
    agent: Agent,
    target: HealthTarget,
}

impl HttpHealthProbe {
    pub fn new(target: HealthTarget, timeout: Duration) -> Self {
        // OSRM answers "no route" with a 400 and a JSON body worth reading.
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: Agent::new_with_config(config),
            target,
        }
    }
}

impl HealthProbe for HttpHealthProbe {
    fn check_route(&self, port: u16) -> Result<RouteCheck> {
        let url = self.target.route_url(port);
        let mut response = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("GET {url}"))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("read body of {url}"))?;
        tracing::debug!(port, status, body_bytes = body.len(), "health probe answered");
        interpret_route_body(status, &body)
    }
}

#[derive(Deserialize)]
struct RouteResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Option<Vec<RouteBody>>,
}

#[derive(Deserialize)]
struct RouteBody {
    distance: f64,
    duration: f64,
}

/// Parse an OSRM `/route` response body.
pub fn interpret_route_body(status: u16, body: &str) -> Result<RouteCheck> {
    let parsed: RouteResponse = serde_json::from_str(body)
        .map_err(|err| anyhow!("malformed route response (HTTP {status}): {err}"))?;
    match parsed.routes.as_deref().and_then(|routes| routes.first()) {
        Some(route) => Ok(RouteCheck::Route(RouteSummary {
            distance: route.distance,
            duration: route.duration,
        })),
        None => Ok(RouteCheck::NoRoute {
            status,
            code: parsed.code,
            message: parsed.message,
        }),
    }
}
