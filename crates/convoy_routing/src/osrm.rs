use async_trait::async_trait;
use jiff::SignedDuration;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    coordinate::Coordinate,
    meters::Meters,
    provider::{RouteQuery, RouteResponse, RoutingProvider},
    route_plan::Congestion,
};

#[derive(Debug, Error)]
pub enum OsrmError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OSRM returned {code}: {message}")]
    Api { code: String, message: String },

    #[error("Incomplete response")]
    IncompleteResponse,

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct OsrmRouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

pub struct OsrmRouteClientParams {
    pub osrm_url: String,
}

pub const OSRM_ROUTE_API_PATH: &str = "/route/v1/driving/";

/// Client for the OSRM `route` service. OSRM has no live traffic, so every
/// segment is labelled `Unknown` and departure times are ignored.
pub struct OsrmRouteClient {
    params: OsrmRouteClientParams,
    client: reqwest::Client,
}

impl OsrmRouteClient {
    pub fn new(params: OsrmRouteClientParams) -> Self {
        Self {
            params,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, query: &RouteQuery) -> String {
        let mut url = self.params.osrm_url.trim_end_matches('/').to_string();
        url.push_str(OSRM_ROUTE_API_PATH);
        url.push_str(&format!("{};{}", query.origin, query.destination));
        url
    }

    pub async fn fetch_route(&self, query: &RouteQuery) -> Result<RouteResponse, OsrmError> {
        let response = self
            .client
            .get(self.url(query))
            .query(&[
                ("overview", "full"),
                ("geometries", "geojson"),
                ("steps", "false"),
            ])
            .send()
            .await?;

        // OSRM reports routing failures as JSON bodies with a 4xx status
        let bytes = response.bytes().await?;
        parse_route(&bytes)
    }
}

fn parse_route(bytes: &[u8]) -> Result<RouteResponse, OsrmError> {
    let response: OsrmRouteResponse = serde_json::from_slice(bytes)?;

    if response.code != "Ok" {
        return Err(OsrmError::Api {
            message: response.message.unwrap_or_default(),
            code: response.code,
        });
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(OsrmError::IncompleteResponse)?;

    let segments = route.geometry.coordinates.len().saturating_sub(1);

    Ok(RouteResponse {
        polyline: route
            .geometry
            .coordinates
            .into_iter()
            .map(Coordinate::from)
            .collect(),
        distance: Meters::new(route.distance),
        duration: SignedDuration::from_secs_f64(route.duration.max(0.0)),
        congestion: vec![Congestion::Unknown; segments],
    })
}

#[async_trait]
impl RoutingProvider for OsrmRouteClient {
    fn name(&self) -> &str {
        "osrm"
    }

    async fn route(&self, query: &RouteQuery) -> anyhow::Result<RouteResponse> {
        Ok(self.fetch_route(query).await?)
    }
}
