use convoy_routing::{coordinate::Coordinate, meters::Meters, route_plan::RoutePlan};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InterpolatedPosition {
    pub position: Coordinate,
    /// Degrees clockwise from north, within [0, 360).
    pub heading: f64,
    /// Index of the segment the position lies on, `polyline[i]..polyline[i + 1]`.
    pub segment: usize,
    /// Along-route distance from the origin.
    pub travelled: Meters,
}

/// Position and heading at `progress` along the route.
///
/// `progress` is clamped to [0, 1]; NaN counts as 0. The first and last
/// vertices are returned exactly at 0 and 1.
pub fn interpolate(plan: &RoutePlan, progress: f64) -> Option<InterpolatedPosition> {
    interpolate_polyline(plan.polyline(), plan.cumulative_distances(), progress)
}

pub fn interpolate_polyline(
    polyline: &[Coordinate],
    cumulative_distances: &[Meters],
    progress: f64,
) -> Option<InterpolatedPosition> {
    let first = *polyline.first()?;

    if polyline.len() < 2 || cumulative_distances.len() != polyline.len() {
        return Some(InterpolatedPosition {
            position: first,
            heading: 0.0,
            segment: 0,
            travelled: Meters::ZERO,
        });
    }

    let progress = if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    };

    let last_index = polyline.len() - 1;
    let total = cumulative_distances[last_index];

    if progress <= 0.0 {
        return Some(InterpolatedPosition {
            position: first,
            heading: first.bearing(&polyline[1]),
            segment: 0,
            travelled: Meters::ZERO,
        });
    }

    if progress >= 1.0 {
        return Some(InterpolatedPosition {
            position: polyline[last_index],
            heading: polyline[last_index - 1].bearing(&polyline[last_index]),
            segment: last_index - 1,
            travelled: total,
        });
    }

    let target = total * progress;

    // first vertex strictly beyond the target ends the bracketing segment
    let end = cumulative_distances
        .partition_point(|distance| *distance <= target)
        .clamp(1, last_index);
    let start = end - 1;

    let from = polyline[start];
    let to = polyline[end];
    let segment_length = cumulative_distances[end] - cumulative_distances[start];

    let fraction = if segment_length.value() > 0.0 {
        ((target - cumulative_distances[start]) / segment_length).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(InterpolatedPosition {
        position: Coordinate::new(
            from.lon + (to.lon - from.lon) * fraction,
            from.lat + (to.lat - from.lat) * fraction,
        ),
        heading: from.bearing(&to),
        segment: start,
        travelled: target,
    })
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;

    use super::*;

    fn plan(points: &[(f64, f64)]) -> RoutePlan {
        let polyline: Vec<Coordinate> = points
            .iter()
            .map(|&(lon, lat)| Coordinate::new(lon, lat))
            .collect();
        RoutePlan::new(polyline, Meters::ZERO, SignedDuration::from_secs(600), vec![])
    }

    #[test]
    fn test_endpoints_are_exact() {
        let plan = plan(&[(4.35, 50.85), (4.36, 50.851), (4.38, 50.86), (4.39, 50.87)]);

        let start = interpolate(&plan, 0.0).unwrap();
        let end = interpolate(&plan, 1.0).unwrap();

        assert_eq!(start.position, plan.polyline()[0]);
        assert_eq!(end.position, plan.polyline()[3]);
        assert_eq!(end.segment, 2);
    }

    #[test]
    fn test_out_of_range_progress_is_clamped() {
        let plan = plan(&[(4.35, 50.85), (4.36, 50.85)]);

        assert_eq!(interpolate(&plan, -0.5).unwrap().position, plan.polyline()[0]);
        assert_eq!(interpolate(&plan, 1.5).unwrap().position, plan.polyline()[1]);
        assert_eq!(interpolate(&plan, f64::NAN).unwrap().position, plan.polyline()[0]);
    }

    #[test]
    fn test_stays_within_bracketing_segment() {
        let plan = plan(&[
            (4.35, 50.85),
            (4.36, 50.851),
            (4.355, 50.86),
            (4.37, 50.865),
            (4.39, 50.87),
        ]);

        for step in 0..=200 {
            let progress = step as f64 / 200.0;
            let result = interpolate(&plan, progress).unwrap();
            let from = plan.polyline()[result.segment];
            let to = plan.polyline()[result.segment + 1];

            let (min_lon, max_lon) = (from.lon.min(to.lon), from.lon.max(to.lon));
            let (min_lat, max_lat) = (from.lat.min(to.lat), from.lat.max(to.lat));

            assert!(result.position.lon >= min_lon - 1e-12 && result.position.lon <= max_lon + 1e-12);
            assert!(result.position.lat >= min_lat - 1e-12 && result.position.lat <= max_lat + 1e-12);
            assert!((0.0..360.0).contains(&result.heading));
        }
    }

    #[test]
    fn test_midpoint_of_straight_segment() {
        let plan = plan(&[(0.0, 0.0), (0.0, 1.0)]);

        let result = interpolate(&plan, 0.5).unwrap();

        assert!((result.position.lat - 0.5).abs() < 1e-9);
        assert!(result.heading.abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_route() {
        let plan = plan(&[(4.35, 50.85), (4.35, 50.85)]);

        for progress in [0.0, 0.5, 1.0] {
            let result = interpolate(&plan, progress).unwrap();
            assert_eq!(result.position, Coordinate::new(4.35, 50.85));
            assert_eq!(result.heading, 0.0);
        }
    }

    #[test]
    fn test_empty_polyline() {
        assert!(interpolate_polyline(&[], &[], 0.5).is_none());
    }

    #[test]
    fn test_progress_on_vertex() {
        let plan = plan(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let progress = plan.cumulative_distances()[1] / plan.geometry_length();

        let result = interpolate(&plan, progress).unwrap();

        assert!(result.segment <= 1);
        assert!((result.position.lat - 1.0).abs() < 1e-9);
        assert!(result.position.lon.abs() < 1e-9);
    }

    #[test]
    fn test_heading_follows_current_segment() {
        let plan = plan(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);

        let north = interpolate(&plan, 0.25).unwrap();
        let east = interpolate(&plan, 0.75).unwrap();

        assert_eq!(north.segment, 0);
        assert!(north.heading.abs() < 1e-6);
        assert_eq!(east.segment, 1);
        assert!((east.heading - 90.0).abs() < 0.1);
    }
}
