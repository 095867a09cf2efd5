use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    kmh::Kmh,
    mapbox_directions::{MapboxDirectionsClient, MapboxDirectionsClientParams, MapboxProfile},
    osrm::{OsrmRouteClient, OsrmRouteClientParams},
    provider::RoutingProvider,
    straight_line::StraightLineProvider,
};

pub const MAPBOX_ACCESS_TOKEN_ENV_VAR: &str = "MAPBOX_ACCESS_TOKEN";
pub const OSRM_URL_ENV_VAR: &str = "CONVOY_OSRM_URL";

#[derive(Debug, Error)]
pub enum ProviderSetupError {
    #[error("Environment variable {0} is not set")]
    MissingEnvVar(&'static str),
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteProvider {
    /// https://docs.mapbox.com/api/navigation/directions/
    MapboxDirections {
        #[serde(default)]
        profile: MapboxProfile,
    },
    /// A self-hosted OSRM instance; the URL falls back to `CONVOY_OSRM_URL`.
    Osrm {
        #[serde(default)]
        url: Option<String>,
    },
    AsTheCrowFlies { speed_kmh: f64 },
}

impl Default for RouteProvider {
    fn default() -> Self {
        RouteProvider::MapboxDirections {
            profile: MapboxProfile::default(),
        }
    }
}

impl RouteProvider {
    /// Builds the provider, reading secrets and endpoints from the environment.
    pub fn build(&self) -> Result<Arc<dyn RoutingProvider>, ProviderSetupError> {
        match self {
            RouteProvider::MapboxDirections { profile } => {
                let access_token = std::env::var(MAPBOX_ACCESS_TOKEN_ENV_VAR)
                    .map_err(|_| ProviderSetupError::MissingEnvVar(MAPBOX_ACCESS_TOKEN_ENV_VAR))?;

                Ok(Arc::new(MapboxDirectionsClient::new(
                    MapboxDirectionsClientParams::new(access_token, *profile),
                )))
            }
            RouteProvider::Osrm { url } => {
                let osrm_url = match url {
                    Some(url) => url.clone(),
                    None => std::env::var(OSRM_URL_ENV_VAR)
                        .map_err(|_| ProviderSetupError::MissingEnvVar(OSRM_URL_ENV_VAR))?,
                };

                Ok(Arc::new(OsrmRouteClient::new(OsrmRouteClientParams {
                    osrm_url,
                })))
            }
            RouteProvider::AsTheCrowFlies { speed_kmh } => {
                Ok(Arc::new(StraightLineProvider::new(Kmh::new(*speed_kmh))))
            }
        }
    }
}
