use convoy_routing::{meters::Meters, provider::RouteResponse, route_plan::Congestion};
use jiff::{SignedDuration, Timestamp};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Changes smaller than this are reported as steady.
pub const DEFAULT_STEADY_THRESHOLD: SignedDuration = SignedDuration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrafficSeverity {
    Low,
    Medium,
    High,
}

impl TrafficSeverity {
    /// Share of heavy or severe segments >= 25% is high, share of moderate or
    /// worse >= 25% is medium. Unknown segments count as free flowing.
    pub fn from_congestion(congestion: &[Congestion]) -> Self {
        if congestion.is_empty() {
            return TrafficSeverity::Low;
        }

        let total = congestion.len() as f64;
        let heavy = congestion
            .iter()
            .filter(|label| matches!(label, Congestion::Heavy | Congestion::Severe))
            .count() as f64;
        let moderate = congestion
            .iter()
            .filter(|label| {
                matches!(
                    label,
                    Congestion::Moderate | Congestion::Heavy | Congestion::Severe
                )
            })
            .count() as f64;

        if heavy / total >= 0.25 {
            TrafficSeverity::High
        } else if moderate / total >= 0.25 {
            TrafficSeverity::Medium
        } else {
            TrafficSeverity::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Worsening,
    Steady,
}

impl Trend {
    /// Compares two arrival estimates; moves under `steady_threshold` are steady.
    pub fn between(
        previous_arrival: Timestamp,
        current_arrival: Timestamp,
        steady_threshold: SignedDuration,
    ) -> Self {
        let delta = current_arrival.duration_since(previous_arrival);
        if delta.abs() < steady_threshold {
            Trend::Steady
        } else if delta.is_positive() {
            Trend::Worsening
        } else {
            Trend::Improving
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaSnapshot {
    /// When the underlying request was issued; orders snapshots.
    pub timestamp: Timestamp,
    pub adjusted_duration: SignedDuration,
    pub adjusted_arrival: Timestamp,
    pub remaining_distance: Meters,
    pub severity: TrafficSeverity,
    pub trend: Trend,
    pub stale: bool,
}

/// A refresh result travelling back from the refresher task.
#[derive(Debug)]
pub struct EtaUpdate {
    pub generation: u64,
    pub issued_at: Timestamp,
    pub outcome: Result<RouteResponse, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtaApplied {
    Replaced,
    MarkedStale,
    /// Older than the current snapshot, or from another generation.
    Discarded,
}

/// Holds the latest ETA snapshot and decides what a refresh result does to it.
#[derive(Debug, Clone)]
pub struct EtaTracker {
    current: Option<EtaSnapshot>,
    steady_threshold: SignedDuration,
}

impl Default for EtaTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STEADY_THRESHOLD)
    }
}

impl EtaTracker {
    pub fn new(steady_threshold: SignedDuration) -> Self {
        Self {
            current: None,
            steady_threshold,
        }
    }

    pub fn current(&self) -> Option<&EtaSnapshot> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Seeds the tracker from the initial route.
    pub fn seed(
        &mut self,
        issued_at: Timestamp,
        duration: SignedDuration,
        remaining_distance: Meters,
        congestion: &[Congestion],
    ) -> &EtaSnapshot {
        self.current.insert(EtaSnapshot {
            timestamp: issued_at,
            adjusted_duration: duration,
            adjusted_arrival: issued_at + duration,
            remaining_distance,
            severity: TrafficSeverity::from_congestion(congestion),
            trend: Trend::Steady,
            stale: false,
        })
    }

    /// Applies a successful refresh issued at `issued_at`.
    pub fn apply_success(&mut self, issued_at: Timestamp, response: &RouteResponse) -> EtaApplied {
        if let Some(current) = &self.current {
            if issued_at <= current.timestamp {
                debug!(
                    "Discarding ETA issued at {} (current snapshot from {})",
                    issued_at, current.timestamp
                );
                return EtaApplied::Discarded;
            }
        }

        let adjusted_arrival = issued_at + response.duration;
        let trend = self
            .current
            .as_ref()
            .map(|previous| {
                Trend::between(
                    previous.adjusted_arrival,
                    adjusted_arrival,
                    self.steady_threshold,
                )
            })
            .unwrap_or(Trend::Steady);

        self.current = Some(EtaSnapshot {
            timestamp: issued_at,
            adjusted_duration: response.duration,
            adjusted_arrival,
            remaining_distance: response.distance,
            severity: TrafficSeverity::from_congestion(&response.congestion),
            trend,
            stale: false,
        });

        EtaApplied::Replaced
    }

    /// A failed refresh keeps the last good snapshot but flags it stale.
    pub fn apply_failure(&mut self, issued_at: Timestamp, error: &str) -> EtaApplied {
        match &mut self.current {
            Some(current) if issued_at > current.timestamp => {
                warn!("ETA refresh failed ({}), keeping last estimate", error);
                current.stale = true;
                EtaApplied::MarkedStale
            }
            Some(_) => EtaApplied::Discarded,
            None => {
                warn!("ETA refresh failed ({}) with no estimate to fall back on", error);
                EtaApplied::Discarded
            }
        }
    }

    pub fn apply(&mut self, issued_at: Timestamp, outcome: &Result<RouteResponse, String>) -> EtaApplied {
        match outcome {
            Ok(response) => self.apply_success(issued_at, response),
            Err(error) => self.apply_failure(issued_at, error),
        }
    }
}
