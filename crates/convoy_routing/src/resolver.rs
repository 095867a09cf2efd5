use std::sync::Arc;

use jiff::Timestamp;
use tracing::{info, warn};

use crate::{
    coordinate::Coordinate,
    kmh::Kmh,
    provider::{RouteQuery, RouteResponse, RoutingProvider},
    retry::{RetryOutcome, RetryPolicy},
    route_plan::RoutePlan,
};

pub const DEFAULT_FALLBACK_SPEED_KMH: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct Resolution {
    pub plan: RoutePlan,
    pub attempts: u32,
    /// Last provider error when the plan had to be degraded.
    pub error: Option<String>,
}

/// Resolves driving routes with bounded retries and a straight-line fallback.
#[derive(Clone)]
pub struct RouteResolver {
    provider: Arc<dyn RoutingProvider>,
    retry_policy: RetryPolicy,
    fallback_speed: Kmh,
}

impl RouteResolver {
    pub fn new(provider: Arc<dyn RoutingProvider>) -> Self {
        Self {
            provider,
            retry_policy: RetryPolicy::default(),
            fallback_speed: Kmh::new(DEFAULT_FALLBACK_SPEED_KMH),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_fallback_speed(mut self, fallback_speed: Kmh) -> Self {
        self.fallback_speed = fallback_speed;
        self
    }

    pub fn provider(&self) -> &Arc<dyn RoutingProvider> {
        &self.provider
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Queries the provider with the shared retry policy, without falling back.
    pub async fn query(&self, query: &RouteQuery) -> RetryOutcome<RouteResponse> {
        let label = format!("route[{}]", self.provider.name());
        self.retry_policy
            .run(&label, || self.provider.route(query))
            .await
    }

    /// Always yields a trackable plan: the provider route, or a degraded
    /// straight line once the retries are exhausted.
    pub async fn resolve(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        departure_time: Option<Timestamp>,
    ) -> Resolution {
        let query = RouteQuery {
            origin,
            destination,
            departure_time,
        };

        let outcome = self.query(&query).await;
        let attempts = outcome.attempts;

        match outcome.into_result() {
            Ok(response) if response.polyline.len() >= 2 => {
                let plan = RoutePlan::from(response);
                info!(
                    "Resolved route {} -> {}: {} points, {}, {:.0}s",
                    origin,
                    destination,
                    plan.polyline().len(),
                    plan.distance(),
                    plan.duration().as_secs_f64()
                );
                Resolution {
                    plan,
                    attempts,
                    error: None,
                }
            }
            Ok(_) => {
                warn!("Provider returned an empty geometry, using a straight line");
                Resolution {
                    plan: RoutePlan::degraded(origin, destination, self.fallback_speed),
                    attempts,
                    error: Some(String::from("empty geometry")),
                }
            }
            Err(error) => {
                warn!(
                    "Route unavailable after {} attempts ({}), using a straight line",
                    attempts, error
                );
                Resolution {
                    plan: RoutePlan::degraded(origin, destination, self.fallback_speed),
                    attempts,
                    error: Some(error),
                }
            }
        }
    }
}
