//! Route Parser
//!
//! Decodes a `to` address into its routable parts.
//!
//! ```text
//! [instance[-subID]@]serviceName[:segment]*[[httpMethod]]apiRoute
//!
//! serviceA:[get]/users/1          -> service "serviceA", method "get", route "/users/1"
//! 123-abc@serviceA:/x             -> instance "123", subID "abc", service "serviceA"
//! http://host:8080:/health        -> service "http://host", route "8080:/health"
//! ```

use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route field has invalid number of routable segments")]
    InvalidSegmentCount,
    #[error("route field has ill-formed HTTP method verb in segment")]
    IllFormedVerb,
}

/// Read-only view of a `to` address. Recomputed per use, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedRoute {
    pub instance: String,
    pub sub_id: String,
    pub service_name: String,
    /// Lower-cased verb; `None` when the address carries no bracketed verb.
    pub http_method: Option<String>,
    pub api_route: String,
}

impl ParsedRoute {
    /// Whether the address pins a specific instance (`instance@service:...`).
    pub fn targets_instance(&self) -> bool {
        !self.instance.is_empty()
    }
}

impl FromStr for ParsedRoute {
    type Err = RouteError;

    fn from_str(to: &str) -> Result<Self, Self::Err> {
        parse_route(to)
    }
}

pub fn parse_route(to: &str) -> Result<ParsedRoute, RouteError> {
    let mut segments: Vec<String> = to.split(':').map(str::to_string).collect();
    if segments.len() < 2 {
        return Err(RouteError::InvalidSegmentCount);
    }

    let mut route = ParsedRoute::default();

    if let Some((prefix, rest)) = segments[0].split_once('@') {
        let prefix = prefix.to_string();
        let rest = rest.to_string();
        segments[0] = rest;

        let mut parts = prefix.split('-');
        match (parts.next(), parts.next()) {
            (Some(instance), Some(sub_id)) => {
                route.instance = instance.to_string();
                route.sub_id = sub_id.to_string();
            }
            _ => route.instance = prefix.clone(),
        }
    }

    // Keep scheme-qualified hosts (`http://host`) in one piece.
    if segments[0].starts_with("http") {
        let url = format!("{}:{}", segments[0], segments[1]);
        segments.remove(0);
        segments[0] = url;
    }

    route.service_name = segments.remove(0);
    let mut api_route = segments.join(":");

    if api_route.starts_with('[') {
        let close = api_route.find(']').ok_or(RouteError::IllFormedVerb)?;
        let method = api_route[1..close].to_lowercase();
        if close > 1 {
            api_route = api_route[close + 1..].to_string();
        }
        route.http_method = Some(method);
    }

    route.api_route = api_route;
    Ok(route)
}
