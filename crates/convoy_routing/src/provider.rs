use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};

use crate::{
    coordinate::Coordinate,
    meters::Meters,
    route_plan::{Congestion, RoutePlan},
};

#[derive(Debug, Clone, Copy)]
pub struct RouteQuery {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub departure_time: Option<Timestamp>,
}

impl RouteQuery {
    pub fn new(origin: Coordinate, destination: Coordinate) -> Self {
        Self {
            origin,
            destination,
            departure_time: None,
        }
    }

    pub fn departing_at(mut self, departure_time: Timestamp) -> Self {
        self.departure_time = Some(departure_time);
        self
    }
}

/// What a routing provider answers for a driving query.
#[derive(Debug, Clone)]
pub struct RouteResponse {
    pub polyline: Vec<Coordinate>,
    pub distance: Meters,
    pub duration: SignedDuration,
    /// One label per polyline segment, `Unknown` when the provider has no traffic data.
    pub congestion: Vec<Congestion>,
}

impl From<RouteResponse> for RoutePlan {
    fn from(response: RouteResponse) -> Self {
        RoutePlan::new(
            response.polyline,
            response.distance,
            response.duration,
            response.congestion,
        )
    }
}

/// A driving route source. Implementations perform a single attempt; retrying is
/// the caller's concern.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn route(&self, query: &RouteQuery) -> anyhow::Result<RouteResponse>;
}
