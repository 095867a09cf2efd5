use async_trait::async_trait;

use crate::{
    kmh::Kmh,
    provider::{RouteQuery, RouteResponse, RoutingProvider},
    route_plan::Congestion,
};

/// Offline provider answering with the great-circle segment between the two points.
pub struct StraightLineProvider {
    speed: Kmh,
}

impl StraightLineProvider {
    pub fn new(speed: Kmh) -> Self {
        Self { speed }
    }
}

pub fn straight_line_route(query: &RouteQuery, speed: Kmh) -> RouteResponse {
    let distance = query.origin.haversine_distance(&query.destination);

    RouteResponse {
        polyline: vec![query.origin, query.destination],
        distance,
        duration: distance / speed,
        congestion: vec![Congestion::Unknown],
    }
}

#[async_trait]
impl RoutingProvider for StraightLineProvider {
    fn name(&self) -> &str {
        "as_the_crow_flies"
    }

    async fn route(&self, query: &RouteQuery) -> anyhow::Result<RouteResponse> {
        if self.speed.value() <= 0.0 {
            anyhow::bail!("speed must be positive, got {} km/h", self.speed.value());
        }

        Ok(straight_line_route(query, self.speed))
    }
}
