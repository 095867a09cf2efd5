use convoy_routing::{
    coordinate::Coordinate, resolver::RouteResolver, route_plan::RoutePlan,
};
use jiff::{SignedDuration, Timestamp};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::{
    camera::{CameraConfig, CameraController},
    checkpoint::{Checkpoint, CheckpointEvent, CheckpointNotifier, default_checkpoints},
    eta::{DEFAULT_STEADY_THRESHOLD, EtaApplied, EtaSnapshot, EtaTracker, EtaUpdate},
    eta_refresher::{DEFAULT_REFRESH_INTERVAL, EtaRefresher, RefresherInput},
    interpolator::interpolate,
    progress_clock::{ProgressClock, RunState, TimingMode},
    render::FrameUpdate,
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub timing: TimingMode,
    pub checkpoints: Vec<Checkpoint>,
    pub camera: CameraConfig,
    pub steady_threshold: SignedDuration,
    pub refresh_interval: SignedDuration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timing: TimingMode::default(),
            checkpoints: default_checkpoints(),
            camera: CameraConfig::default(),
            steady_threshold: DEFAULT_STEADY_THRESHOLD,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Everything a presentation needs from one frame.
#[derive(Debug, Clone)]
pub struct SessionFrame {
    pub update: FrameUpdate,
    pub state: RunState,
    pub checkpoints: Vec<CheckpointEvent>,
    /// Set when a refresh changed the ETA since the previous frame.
    pub eta: Option<EtaSnapshot>,
    /// True only on the frame that reached the destination.
    pub completed: bool,
}

/// One shipment timeline: route, clock, checkpoints, camera and ETA.
///
/// All animation state is updated from `frame` on a single task. Refresh
/// results arrive through a channel and are merged on the next frame; the
/// generation counter discards anything issued before the last reset.
pub struct TrackingSession {
    origin: Coordinate,
    destination: Coordinate,
    plan: RoutePlan,
    options: SessionOptions,
    clock: ProgressClock,
    notifier: CheckpointNotifier,
    camera: CameraController,
    eta: EtaTracker,
    refresher_input: watch::Sender<RefresherInput>,
    updates_tx: mpsc::UnboundedSender<EtaUpdate>,
    updates_rx: mpsc::UnboundedReceiver<EtaUpdate>,
}

impl TrackingSession {
    pub fn new(
        origin: Coordinate,
        destination: Coordinate,
        plan: RoutePlan,
        options: SessionOptions,
    ) -> Self {
        let clock = ProgressClock::new(options.timing.total_duration(plan.duration()));
        let (refresher_input, _) = watch::channel(RefresherInput::default());
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        Self {
            origin,
            destination,
            notifier: CheckpointNotifier::new(options.checkpoints.clone()),
            camera: CameraController::new(options.camera),
            eta: EtaTracker::new(options.steady_threshold),
            plan,
            options,
            clock,
            refresher_input,
            updates_tx,
            updates_rx,
        }
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    pub fn destination(&self) -> Coordinate {
        self.destination
    }

    pub fn plan(&self) -> &RoutePlan {
        &self.plan
    }

    pub fn state(&self) -> RunState {
        self.clock.state()
    }

    pub fn progress(&self) -> f64 {
        self.clock.progress()
    }

    pub fn generation(&self) -> u64 {
        self.clock.generation()
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.clock.started_at()
    }

    pub fn eta(&self) -> Option<&EtaSnapshot> {
        self.eta.current()
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraController {
        &mut self.camera
    }

    pub fn notifier(&self) -> &CheckpointNotifier {
        &self.notifier
    }

    /// Refresher bound to this session's channels.
    pub fn eta_refresher(&self, resolver: RouteResolver) -> EtaRefresher {
        EtaRefresher::new(
            resolver,
            self.destination,
            self.options.refresh_interval,
            self.refresher_input.subscribe(),
            self.updates_tx.clone(),
        )
    }

    /// Sender for refresh results produced outside the built-in refresher.
    pub fn eta_updates(&self) -> mpsc::UnboundedSender<EtaUpdate> {
        self.updates_tx.clone()
    }

    pub fn start(&mut self, now: Timestamp) -> bool {
        if !self.clock.start(now) {
            return false;
        }

        info!(
            "Tracking {} -> {} over {} ({}s{})",
            self.origin,
            self.destination,
            self.plan.distance(),
            self.plan.duration().as_secs(),
            if self.plan.is_degraded() { ", degraded" } else { "" }
        );

        self.eta.seed(
            now,
            self.plan.duration(),
            self.plan.distance(),
            self.plan.congestion(),
        );
        self.publish_input();
        true
    }

    pub fn pause(&mut self, now: Timestamp) -> bool {
        let paused = self.clock.pause(now);
        if paused {
            debug!("Session paused at {:.3}", self.clock.progress());
            self.publish_input();
        }
        paused
    }

    pub fn resume(&mut self, now: Timestamp) -> bool {
        let resumed = self.clock.resume(now);
        if resumed {
            debug!("Session resumed at {:.3}", self.clock.progress());
            self.publish_input();
        }
        resumed
    }

    /// Back to Idle with a new generation; in-flight refreshes become stale.
    pub fn reset(&mut self) -> u64 {
        let generation = self.clock.reset();
        self.notifier.reset(generation);
        self.camera.reset();
        self.eta.clear();

        // drop results that were queued before the reset
        while self.updates_rx.try_recv().is_ok() {}

        info!("Session reset (generation {})", generation);
        self.publish_input();
        generation
    }

    pub fn apply_eta_update(&mut self, update: &EtaUpdate) -> EtaApplied {
        if update.generation != self.clock.generation() {
            debug!(
                "Discarding ETA from generation {} (current {})",
                update.generation,
                self.clock.generation()
            );
            return EtaApplied::Discarded;
        }

        self.eta.apply(update.issued_at, &update.outcome)
    }

    /// Advances the session to `now`. Called once per rendered frame.
    pub fn frame(&mut self, now: Timestamp) -> SessionFrame {
        let eta = self.merge_eta_updates();

        let tick = self.clock.tick(now);

        let (position, heading) = interpolate(&self.plan, tick.progress)
            .map(|interpolated| (interpolated.position, interpolated.heading))
            .unwrap_or((self.origin, 0.0));

        let camera_pose = self.camera.update(now, position, heading);

        let checkpoints = match tick.state {
            RunState::Idle => Vec::new(),
            _ => self.notifier.update(tick.progress, now),
        };

        if tick.completed {
            info!("Shipment delivered (generation {})", self.clock.generation());
        }

        self.refresher_input.send_replace(RefresherInput {
            generation: self.clock.generation(),
            running: tick.state == RunState::Running,
            position: Some(position),
        });

        SessionFrame {
            update: FrameUpdate {
                timestamp: now,
                progress: tick.progress,
                position,
                heading,
                camera_pose,
            },
            state: tick.state,
            checkpoints,
            eta,
            completed: tick.completed,
        }
    }

    fn merge_eta_updates(&mut self) -> Option<EtaSnapshot> {
        let mut changed = false;

        while let Ok(update) = self.updates_rx.try_recv() {
            if self.apply_eta_update(&update) != EtaApplied::Discarded {
                changed = true;
            }
        }

        if changed { self.eta.current().cloned() } else { None }
    }

    fn publish_input(&self) {
        let previous = *self.refresher_input.borrow();
        self.refresher_input.send_replace(RefresherInput {
            generation: self.clock.generation(),
            running: self.clock.is_running(),
            position: previous.position,
        });
    }
}
