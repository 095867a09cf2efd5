#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use convoy_routing::{
    coordinate::Coordinate,
    meters::Meters,
    provider::{RouteQuery, RouteResponse, RoutingProvider},
    route_plan::{Congestion, RoutePlan},
};
use convoy_tracking::{
    camera::CameraPose,
    checkpoint::CheckpointEvent,
    eta::EtaSnapshot,
    render::{FrameUpdate, Presentation},
};
use jiff::{SignedDuration, Timestamp};

pub fn los_angeles() -> Coordinate {
    Coordinate::new(-118.2437, 34.0522)
}

pub fn san_francisco() -> Coordinate {
    Coordinate::new(-122.4194, 37.7749)
}

pub fn at(seconds: i64) -> Timestamp {
    let origin: Timestamp = "2025-06-10T08:00:00Z".parse().unwrap();
    origin + SignedDuration::from_secs(seconds)
}

/// Los Angeles to San Francisco along I-5, roughly 588 km.
pub fn interstate_5() -> Vec<Coordinate> {
    vec![
        los_angeles(),
        Coordinate::new(-118.5426, 34.3917),
        Coordinate::new(-118.8648, 34.8417),
        Coordinate::new(-119.4696, 35.4005),
        Coordinate::new(-119.9618, 36.0083),
        Coordinate::new(-120.8499, 37.0583),
        Coordinate::new(-121.4260, 37.7397),
        san_francisco(),
    ]
}

pub fn interstate_5_plan() -> RoutePlan {
    let polyline = interstate_5();
    let congestion = vec![Congestion::Low; polyline.len() - 1];
    RoutePlan::new(
        polyline,
        Meters::new(615_000.0),
        SignedDuration::from_secs(21_600),
        congestion,
    )
}

/// Answers every query with the scripted durations in order, repeating the last one.
pub struct ScriptedProvider {
    durations: Vec<SignedDuration>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(seconds: &[i64]) -> Self {
        Self {
            durations: seconds.iter().map(|s| SignedDuration::from_secs(*s)).collect(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn route(&self, query: &RouteQuery) -> anyhow::Result<RouteResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let duration = self
            .durations
            .get(call)
            .or(self.durations.last())
            .copied()
            .unwrap_or(SignedDuration::ZERO);

        Ok(RouteResponse {
            polyline: vec![query.origin, query.destination],
            distance: query.origin.haversine_distance(&query.destination),
            duration,
            congestion: vec![Congestion::Heavy],
        })
    }
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
        anyhow::bail!("503 Service Unavailable")
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub frames: Vec<FrameUpdate>,
    pub etas: Vec<EtaSnapshot>,
    pub checkpoints: Vec<CheckpointEvent>,
    pub stopped: bool,
}

impl Recorded {
    pub fn camera_poses(&self) -> Vec<CameraPose> {
        self.frames.iter().filter_map(|frame| frame.camera_pose).collect()
    }
}

/// Presentation that records everything it receives.
#[derive(Clone, Default)]
pub struct RecordingPresentation {
    pub recorded: Arc<Mutex<Recorded>>,
}

impl Presentation for RecordingPresentation {
    fn on_frame(&mut self, frame: &FrameUpdate) {
        self.recorded.lock().unwrap().frames.push(*frame);
    }

    fn on_eta(&mut self, snapshot: &EtaSnapshot) {
        self.recorded.lock().unwrap().etas.push(snapshot.clone());
    }

    fn on_checkpoint(&mut self, event: &CheckpointEvent) {
        self.recorded.lock().unwrap().checkpoints.push(event.clone());
    }

    fn on_stop(&mut self) {
        self.recorded.lock().unwrap().stopped = true;
    }
}
