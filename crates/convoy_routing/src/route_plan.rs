use jiff::SignedDuration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{coordinate::Coordinate, kmh::Kmh, meters::Meters};

/// Traffic label of a single polyline segment, as annotated by the routing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Congestion {
    #[default]
    Unknown,
    Low,
    Moderate,
    Heavy,
    Severe,
}

impl Congestion {
    pub fn from_label(label: &str) -> Self {
        match label {
            "low" => Congestion::Low,
            "moderate" => Congestion::Moderate,
            "heavy" => Congestion::Heavy,
            "severe" => Congestion::Severe,
            _ => Congestion::Unknown,
        }
    }
}

/// A resolved driving route.
///
/// `cumulative_distances[i]` is the along-route distance from the first vertex to
/// `polyline[i]`; it is strictly increasing. A plan is never mutated: a new fetch
/// produces a new plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePlan {
    polyline: Vec<Coordinate>,
    cumulative_distances: Vec<Meters>,
    distance: Meters,
    duration: SignedDuration,
    congestion: Vec<Congestion>,
    degraded: bool,
}

impl RoutePlan {
    /// Builds a plan from provider data.
    ///
    /// Zero-length segments are dropped together with their congestion label.
    /// `congestion` is padded with `Unknown` or truncated to one label per segment.
    pub fn new(
        polyline: Vec<Coordinate>,
        distance: Meters,
        duration: SignedDuration,
        congestion: Vec<Congestion>,
    ) -> Self {
        let mut points: Vec<Coordinate> = Vec::with_capacity(polyline.len());
        let mut cumulative_distances: Vec<Meters> = Vec::with_capacity(polyline.len());
        let mut labels: Vec<Congestion> = Vec::with_capacity(polyline.len().saturating_sub(1));

        for (index, point) in polyline.into_iter().enumerate() {
            match points.last() {
                None => {
                    points.push(point);
                    cumulative_distances.push(Meters::ZERO);
                }
                Some(previous) => {
                    let segment = previous.haversine_distance(&point);
                    if segment.value() <= 0.0 {
                        continue;
                    }

                    let total = cumulative_distances[cumulative_distances.len() - 1] + segment;
                    points.push(point);
                    cumulative_distances.push(total);
                    labels.push(congestion.get(index - 1).copied().unwrap_or_default());
                }
            }
        }

        RoutePlan {
            polyline: points,
            cumulative_distances,
            distance,
            duration: duration.max(SignedDuration::ZERO),
            congestion: labels,
            degraded: false,
        }
    }

    /// Straight-line plan used when no provider data is available.
    pub fn degraded(origin: Coordinate, destination: Coordinate, assumed_speed: Kmh) -> Self {
        let distance = origin.haversine_distance(&destination);
        let duration = if assumed_speed.value() > 0.0 {
            distance / assumed_speed
        } else {
            SignedDuration::ZERO
        };

        let mut plan = RoutePlan::new(
            vec![origin, destination],
            distance,
            duration,
            vec![Congestion::Unknown],
        );
        plan.degraded = true;
        plan
    }

    pub fn polyline(&self) -> &[Coordinate] {
        &self.polyline
    }

    pub fn cumulative_distances(&self) -> &[Meters] {
        &self.cumulative_distances
    }

    /// Distance reported by the provider.
    pub fn distance(&self) -> Meters {
        self.distance
    }

    /// Length of the polyline itself, which interpolation runs along.
    pub fn geometry_length(&self) -> Meters {
        self.cumulative_distances
            .last()
            .copied()
            .unwrap_or(Meters::ZERO)
    }

    pub fn duration(&self) -> SignedDuration {
        self.duration
    }

    pub fn congestion(&self) -> &[Congestion] {
        &self.congestion
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn origin(&self) -> Option<Coordinate> {
        self.polyline.first().copied()
    }

    pub fn destination(&self) -> Option<Coordinate> {
        self.polyline.last().copied()
    }

    pub fn segment_count(&self) -> usize {
        self.polyline.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_distances_strictly_increasing() {
        let plan = RoutePlan::new(
            vec![
                Coordinate::new(4.35, 50.85),
                Coordinate::new(4.36, 50.85),
                Coordinate::new(4.36, 50.85),
                Coordinate::new(4.36, 50.86),
            ],
            Meters::new(1_800.0),
            SignedDuration::from_secs(240),
            vec![Congestion::Low, Congestion::Heavy, Congestion::Moderate],
        );

        assert_eq!(plan.polyline().len(), 3);
        assert_eq!(plan.congestion(), &[Congestion::Low, Congestion::Moderate]);
        assert!(
            plan.cumulative_distances()
                .windows(2)
                .all(|pair| pair[0] < pair[1])
        );
        assert_eq!(plan.distance(), Meters::new(1_800.0));
    }

    #[test]
    fn test_collapses_to_single_point() {
        let point = Coordinate::new(4.35, 50.85);
        let plan = RoutePlan::new(
            vec![point, point],
            Meters::ZERO,
            SignedDuration::ZERO,
            vec![],
        );

        assert_eq!(plan.polyline(), &[point]);
        assert_eq!(plan.geometry_length(), Meters::ZERO);
        assert_eq!(plan.segment_count(), 0);
    }

    #[test]
    fn test_pads_missing_congestion() {
        let plan = RoutePlan::new(
            vec![
                Coordinate::new(4.35, 50.85),
                Coordinate::new(4.36, 50.85),
                Coordinate::new(4.37, 50.85),
            ],
            Meters::new(1_400.0),
            SignedDuration::from_secs(120),
            vec![Congestion::Heavy],
        );

        assert_eq!(plan.congestion(), &[Congestion::Heavy, Congestion::Unknown]);
    }

    #[test]
    fn test_degraded_plan() {
        let origin = Coordinate::new(-118.2437, 34.0522);
        let destination = Coordinate::new(-122.4194, 37.7749);
        let plan = RoutePlan::degraded(origin, destination, Kmh::new(60.0));

        let expected = origin.haversine_distance(&destination);

        assert!(plan.is_degraded());
        assert_eq!(plan.polyline(), &[origin, destination]);
        assert_eq!(plan.distance(), expected);
        assert!((plan.duration().as_secs_f64() - expected.value() * 3.6 / 60.0).abs() < 1e-3);
    }

    #[test]
    fn test_congestion_labels() {
        assert_eq!(Congestion::from_label("severe"), Congestion::Severe);
        assert_eq!(Congestion::from_label("whatever"), Congestion::Unknown);
    }
}
