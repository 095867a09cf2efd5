use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use jiff::SignedDuration;

use crate::{
    coordinate::Coordinate,
    provider::{RouteQuery, RouteResponse, RoutingProvider},
    route_plan::Congestion,
};

pub fn los_angeles() -> Coordinate {
    Coordinate::new(-118.2437, 34.0522)
}

pub fn san_francisco() -> Coordinate {
    Coordinate::new(-122.4194, 37.7749)
}

#[derive(Default)]
pub struct FailingProvider {
    calls: AtomicU32,
}

impl FailingProvider {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn route(&self, _query: &RouteQuery) -> anyhow::Result<RouteResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("service unavailable")
    }
}

pub struct FixedProvider {
    duration: SignedDuration,
}

impl FixedProvider {
    pub fn new(duration: SignedDuration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl RoutingProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn route(&self, query: &RouteQuery) -> anyhow::Result<RouteResponse> {
        Ok(RouteResponse {
            polyline: vec![query.origin, query.destination],
            distance: query.origin.haversine_distance(&query.destination),
            duration: self.duration,
            congestion: vec![Congestion::Moderate],
        })
    }
}
