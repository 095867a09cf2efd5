use std::fmt::Display;

use async_trait::async_trait;
use jiff::SignedDuration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    coordinate::Coordinate,
    meters::Meters,
    provider::{RouteQuery, RouteResponse, RoutingProvider},
    route_plan::Congestion,
};

pub const MAPBOX_DIRECTIONS_API_URL: &str = "https://api.mapbox.com/directions/v5/mapbox";

#[derive(Debug, Deserialize, Serialize, JsonSchema, Copy, Clone, Hash, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MapboxProfile {
    /// Live and historic traffic, the only profile with congestion annotations.
    #[default]
    DrivingTraffic,
    Driving,
}

impl Display for MapboxProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MapboxProfile::DrivingTraffic => "driving-traffic",
                MapboxProfile::Driving => "driving",
            }
        )
    }
}

#[derive(Debug, Error)]
pub enum MapboxError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("No route found: {0}")]
    NoRoute(String),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct DirectionsResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
    geometry: LineStringGeometry,
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Deserialize)]
struct LineStringGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
struct DirectionsLeg {
    annotation: Option<LegAnnotation>,
}

#[derive(Deserialize)]
struct LegAnnotation {
    #[serde(default)]
    congestion: Vec<String>,
}

pub struct MapboxDirectionsClientParams {
    pub access_token: String,
    pub profile: MapboxProfile,
    pub base_url: String,
}

impl MapboxDirectionsClientParams {
    pub fn new(access_token: String, profile: MapboxProfile) -> Self {
        Self {
            access_token,
            profile,
            base_url: String::from(MAPBOX_DIRECTIONS_API_URL),
        }
    }
}

pub struct MapboxDirectionsClient {
    params: MapboxDirectionsClientParams,
    client: reqwest::Client,
}

impl MapboxDirectionsClient {
    pub fn new(params: MapboxDirectionsClientParams) -> Self {
        Self {
            params,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, query: &RouteQuery) -> String {
        format!(
            "{}/{}/{};{}",
            self.params.base_url, self.params.profile, query.origin, query.destination
        )
    }

    pub async fn fetch_route(&self, query: &RouteQuery) -> Result<RouteResponse, MapboxError> {
        let mut params: Vec<(&str, String)> = vec![
            ("access_token", self.params.access_token.clone()),
            ("geometries", String::from("geojson")),
            ("overview", String::from("full")),
            ("alternatives", String::from("false")),
        ];

        if self.params.profile == MapboxProfile::DrivingTraffic {
            params.push(("annotations", String::from("congestion")));
        }

        if let Some(departure_time) = query.departure_time {
            params.push((
                "depart_at",
                departure_time.strftime("%Y-%m-%dT%H:%MZ").to_string(),
            ));
        }

        let response = self
            .client
            .get(self.url(query))
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(MapboxError::Api { status, message });
        }

        let bytes = response.bytes().await?;
        let route = parse_directions(&bytes)?;

        debug!(
            "MapboxDirections: {} points, {:.0}m, {:.0}s",
            route.polyline.len(),
            route.distance.value(),
            route.duration.as_secs_f64()
        );

        Ok(route)
    }
}

fn parse_directions(bytes: &[u8]) -> Result<RouteResponse, MapboxError> {
    let directions: DirectionsResponse = serde_json::from_slice(bytes)?;

    if directions.code != "Ok" {
        return Err(MapboxError::NoRoute(
            directions.message.unwrap_or(directions.code),
        ));
    }

    let route = directions
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| MapboxError::NoRoute(String::from("empty route list")))?;

    let congestion = route
        .legs
        .iter()
        .filter_map(|leg| leg.annotation.as_ref())
        .flat_map(|annotation| annotation.congestion.iter())
        .map(|label| Congestion::from_label(label))
        .collect();

    Ok(RouteResponse {
        polyline: route
            .geometry
            .coordinates
            .into_iter()
            .map(Coordinate::from)
            .collect(),
        distance: Meters::new(route.distance),
        duration: SignedDuration::from_secs_f64(route.duration.max(0.0)),
        congestion,
    })
}

#[async_trait]
impl RoutingProvider for MapboxDirectionsClient {
    fn name(&self) -> &str {
        "mapbox"
    }

    async fn route(&self, query: &RouteQuery) -> anyhow::Result<RouteResponse> {
        Ok(self.fetch_route(query).await?)
    }
}
