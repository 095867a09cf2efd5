use convoy_routing::{coordinate::Coordinate, resolver::RouteResolver};
use jiff::SignedDuration;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info};

use crate::{
    eta::EtaSnapshot,
    progress_clock::{RunState, WallClock},
    render::Presentation,
    session::TrackingSession,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Pause,
    Resume,
    Reset,
    /// The user moved the view.
    Interaction,
    SetFollow(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverStatus {
    pub state: RunState,
    pub progress: f64,
    pub generation: u64,
    pub position: Option<Coordinate>,
    pub heading: f64,
    pub eta: Option<EtaSnapshot>,
}

impl Default for DriverStatus {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            progress: 0.0,
            generation: 0,
            position: None,
            heading: 0.0,
            eta: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub frame_interval: SignedDuration,
    /// Stop the loop on the frame that reaches the destination.
    pub stop_on_completion: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            frame_interval: SignedDuration::from_millis(100),
            stop_on_completion: true,
        }
    }
}

/// Headless host for a session: ticks it on a fixed interval, runs the ETA
/// refresher next to it and forwards everything to an optional presentation.
///
/// Dropping the driver ends the loop as well; [`SessionDriver::stop`] also
/// hands the session back.
pub struct SessionDriver {
    commands: mpsc::UnboundedSender<SessionCommand>,
    stop: watch::Sender<bool>,
    status: watch::Receiver<DriverStatus>,
    handle: JoinHandle<TrackingSession>,
}

impl SessionDriver {
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        session: TrackingSession,
        resolver: Option<RouteResolver>,
        presentation: Option<Box<dyn Presentation>>,
        options: DriverOptions,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        let (status_tx, status) = watch::channel(DriverStatus::default());

        let handle = tokio::spawn(drive(
            session,
            resolver,
            presentation,
            options,
            commands_rx,
            stop_rx,
            status_tx,
        ));

        Self {
            commands,
            stop,
            status,
            handle,
        }
    }

    pub fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            debug!("Session loop already finished, dropping {:?}", command);
        }
    }

    pub fn start(&self) {
        self.send(SessionCommand::Start);
    }

    pub fn pause(&self) {
        self.send(SessionCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(SessionCommand::Resume);
    }

    pub fn reset(&self) {
        self.send(SessionCommand::Reset);
    }

    pub fn status(&self) -> DriverStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DriverStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Resolves once the loop stopped by itself, on completion or after `stop`.
    pub async fn join(self) -> anyhow::Result<TrackingSession> {
        Ok(self.handle.await?)
    }

    /// Stops ticking, stops the refresher and hands the session back.
    pub async fn stop(self) -> anyhow::Result<TrackingSession> {
        // the loop may have finished on its own already
        let _ = self.stop.send(true);
        Ok(self.handle.await?)
    }
}

async fn drive(
    mut session: TrackingSession,
    resolver: Option<RouteResolver>,
    mut presentation: Option<Box<dyn Presentation>>,
    options: DriverOptions,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut stop: watch::Receiver<bool>,
    status: watch::Sender<DriverStatus>,
) -> TrackingSession {
    let clock = WallClock::default();

    let refresher = resolver.map(|resolver| {
        tokio::spawn(session.eta_refresher(resolver).with_clock(clock).run())
    });

    let period = options
        .frame_interval
        .max(SignedDuration::from_millis(1))
        .unsigned_abs();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = session.frame(clock.now());

                if let Some(presentation) = presentation.as_mut() {
                    presentation.on_frame(&frame.update);
                    if let Some(eta) = &frame.eta {
                        presentation.on_eta(eta);
                    }
                    for event in &frame.checkpoints {
                        presentation.on_checkpoint(event);
                    }
                }

                status.send_replace(DriverStatus {
                    state: frame.state,
                    progress: frame.update.progress,
                    generation: session.generation(),
                    position: Some(frame.update.position),
                    heading: frame.update.heading,
                    eta: session.eta().cloned(),
                });

                if frame.completed && options.stop_on_completion {
                    info!("Session completed, stopping driver");
                    break;
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                apply_command(&mut session, command, &clock);
            }
            _ = stop.changed() => {
                debug!("Driver stop requested");
                break;
            }
        }
    }

    if let Some(refresher) = refresher {
        refresher.abort();
    }

    if let Some(presentation) = presentation.as_mut() {
        presentation.on_stop();
    }

    session
}

fn apply_command(session: &mut TrackingSession, command: SessionCommand, clock: &WallClock) {
    let now = clock.now();

    let applied = match command {
        SessionCommand::Start => session.start(now),
        SessionCommand::Pause => session.pause(now),
        SessionCommand::Resume => session.resume(now),
        SessionCommand::Reset => {
            session.reset();
            true
        }
        SessionCommand::Interaction => {
            session.camera_mut().on_interaction(now);
            true
        }
        SessionCommand::SetFollow(enabled) => {
            session.camera_mut().set_follow_enabled(enabled, now);
            true
        }
    };

    if !applied {
        debug!("Ignoring {:?} in state {:?}", command, session.state());
    }
}
