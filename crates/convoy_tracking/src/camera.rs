use convoy_routing::coordinate::{Coordinate, normalize_bearing};
use jiff::{SignedDuration, Timestamp};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CameraConfig {
    pub zoom: f64,
    /// Tilt in degrees, 0 looks straight down.
    pub pitch: f64,
    /// Time without interaction before following re-engages.
    pub idle_timeout: SignedDuration,
    /// Length of the ease towards a new target.
    pub easing: SignedDuration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            zoom: 13.0,
            pitch: 45.0,
            idle_timeout: SignedDuration::from_secs(5),
            easing: SignedDuration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraPose {
    pub center: Coordinate,
    pub bearing: f64,
    pub zoom: f64,
    pub pitch: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CameraMode {
    Following,
    ManualOverride { last_interaction: Timestamp },
}

pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Signed difference from `from` to `to` along the shortest arc, in (-180, 180].
pub fn shortest_arc(from: f64, to: f64) -> f64 {
    let delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

/// Follow camera with a manual override sub-state.
///
/// Poses are produced once per frame while following. Each frame moves the
/// camera from the last applied pose towards the target by an ease-out cubic
/// factor of the elapsed frame time over the easing window, so a frame longer
/// than the window lands exactly on the target.
#[derive(Debug, Clone)]
pub struct CameraController {
    config: CameraConfig,
    mode: CameraMode,
    follow_enabled: bool,
    applied: Option<CameraPose>,
    last_update: Option<Timestamp>,
}

impl CameraController {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            mode: CameraMode::Following,
            follow_enabled: true,
            applied: None,
            last_update: None,
        }
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn is_following(&self) -> bool {
        self.follow_enabled && self.mode == CameraMode::Following
    }

    pub fn follow_enabled(&self) -> bool {
        self.follow_enabled
    }

    pub fn applied_pose(&self) -> Option<CameraPose> {
        self.applied
    }

    /// Any pan, zoom or rotate gesture on the view.
    pub fn on_interaction(&mut self, now: Timestamp) {
        if self.mode == CameraMode::Following {
            debug!("Camera switched to manual override");
        }
        self.mode = CameraMode::ManualOverride {
            last_interaction: now,
        };
    }

    /// Explicit follow toggle. Disabling keeps the camera in manual override
    /// until re-enabled, whatever the idle time.
    pub fn set_follow_enabled(&mut self, enabled: bool, now: Timestamp) {
        self.follow_enabled = enabled;

        if enabled {
            self.engage(now);
        } else if self.mode == CameraMode::Following {
            self.mode = CameraMode::ManualOverride {
                last_interaction: now,
            };
        }
    }

    /// Pose for this frame, or `None` while the user controls the view.
    pub fn update(&mut self, now: Timestamp, position: Coordinate, heading: f64) -> Option<CameraPose> {
        if let CameraMode::ManualOverride { last_interaction } = self.mode {
            if !self.follow_enabled || now.duration_since(last_interaction) < self.config.idle_timeout {
                return None;
            }
            self.engage(now);
        }

        let target = CameraPose {
            center: position,
            bearing: normalize_bearing(heading),
            zoom: self.config.zoom,
            pitch: self.config.pitch,
        };

        let pose = match (self.applied, self.last_update) {
            (Some(applied), Some(last_update)) => {
                let window = self.config.easing.as_secs_f64();
                let factor = if window <= 0.0 {
                    1.0
                } else {
                    let frame = now.duration_since(last_update).as_secs_f64().max(0.0);
                    ease_out_cubic(frame / window)
                };
                blend(&applied, &target, factor)
            }
            _ => target,
        };

        self.applied = Some(pose);
        self.last_update = Some(now);
        Some(pose)
    }

    /// Back to following with no pose history.
    pub fn reset(&mut self) {
        self.mode = CameraMode::Following;
        self.follow_enabled = true;
        self.applied = None;
        self.last_update = None;
    }

    fn engage(&mut self, now: Timestamp) {
        if self.mode != CameraMode::Following {
            debug!("Camera following re-engaged");
        }
        self.mode = CameraMode::Following;
        // fresh ease from the last applied pose
        self.last_update = Some(now);
    }
}

fn blend(from: &CameraPose, to: &CameraPose, factor: f64) -> CameraPose {
    if factor >= 1.0 {
        return *to;
    }

    let lerp = |a: f64, b: f64| a + (b - a) * factor;

    CameraPose {
        center: Coordinate::new(
            lerp(from.center.lon, to.center.lon),
            lerp(from.center.lat, to.center.lat),
        ),
        bearing: normalize_bearing(from.bearing + shortest_arc(from.bearing, to.bearing) * factor),
        zoom: lerp(from.zoom, to.zoom),
        pitch: lerp(from.pitch, to.pitch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_millis(millis: i64) -> Timestamp {
        let origin: Timestamp = "2025-06-10T08:00:00Z".parse().unwrap();
        origin + SignedDuration::from_millis(millis)
    }

    fn brussels() -> Coordinate {
        Coordinate::new(4.3517, 50.8503)
    }

    fn ghent() -> Coordinate {
        Coordinate::new(3.7174, 51.0543)
    }

    #[test]
    fn test_first_update_snaps_to_target() {
        let mut camera = CameraController::new(CameraConfig::default());

        let pose = camera.update(at_millis(0), brussels(), 90.0).unwrap();

        assert_eq!(pose.center, brussels());
        assert_eq!(pose.bearing, 90.0);
        assert_eq!(pose.zoom, 13.0);
        assert_eq!(pose.pitch, 45.0);
    }

    #[test]
    fn test_motion_is_eased_between_frames() {
        let mut camera = CameraController::new(CameraConfig::default());
        camera.update(at_millis(0), brussels(), 0.0);

        let pose = camera.update(at_millis(100), ghent(), 0.0).unwrap();

        // 100 ms of a 1 s ease-out cubic covers 27.1% of the way
        let expected = brussels().lon + (ghent().lon - brussels().lon) * ease_out_cubic(0.1);
        assert!((pose.center.lon - expected).abs() < 1e-9);
        assert!(pose.center.lon < brussels().lon && pose.center.lon > ghent().lon);

        let pose = camera.update(at_millis(1_200), ghent(), 0.0).unwrap();
        assert_eq!(pose.center, ghent());
    }

    #[test]
    fn test_bearing_takes_shortest_arc() {
        let mut camera = CameraController::new(CameraConfig::default());
        camera.update(at_millis(0), brussels(), 350.0);

        let pose = camera.update(at_millis(500), brussels(), 10.0).unwrap();

        assert!(pose.bearing > 350.0 || pose.bearing < 10.0);
        assert_eq!(shortest_arc(350.0, 10.0), 20.0);
        assert_eq!(shortest_arc(10.0, 350.0), -20.0);
    }

    #[test]
    fn test_interaction_suspends_following_until_idle_timeout() {
        let mut camera = CameraController::new(CameraConfig::default());
        camera.update(at_millis(0), brussels(), 0.0);

        camera.on_interaction(at_millis(1_000));
        assert!(camera.update(at_millis(2_000), ghent(), 0.0).is_none());

        // another gesture restarts the idle window
        camera.on_interaction(at_millis(4_000));
        assert!(camera.update(at_millis(8_000), ghent(), 0.0).is_none());

        let pose = camera.update(at_millis(9_000), ghent(), 0.0).unwrap();
        assert_eq!(camera.mode(), CameraMode::Following);
        // re-engaging eases from the last applied pose
        assert_eq!(pose.center, brussels());

        let pose = camera.update(at_millis(10_000), ghent(), 0.0).unwrap();
        assert_eq!(pose.center, ghent());
    }

    #[test]
    fn test_disabled_following_never_reengages() {
        let mut camera = CameraController::new(CameraConfig::default());
        camera.update(at_millis(0), brussels(), 0.0);

        camera.set_follow_enabled(false, at_millis(100));
        assert!(camera.update(at_millis(60_000), ghent(), 0.0).is_none());

        camera.set_follow_enabled(true, at_millis(60_000));
        assert!(camera.is_following());
        assert!(camera.update(at_millis(60_016), ghent(), 0.0).is_some());
    }

    #[test]
    fn test_ease_out_cubic_shape() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert_eq!(ease_out_cubic(2.0), 1.0);
        assert!(ease_out_cubic(0.5) > 0.5);
    }
}
