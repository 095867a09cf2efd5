use convoy_routing::{coordinate::Coordinate, provider::RouteQuery, resolver::RouteResolver};
use jiff::SignedDuration;
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{eta::EtaUpdate, progress_clock::WallClock};

pub const DEFAULT_REFRESH_INTERVAL: SignedDuration = SignedDuration::from_secs(60);

/// What the session tells the refresher after every frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RefresherInput {
    pub generation: u64,
    pub running: bool,
    /// Current interpolated position, origin of the remaining leg.
    pub position: Option<Coordinate>,
}

/// Periodically re-queries the remaining leg while the session is running.
///
/// Ticks only count while running: pausing stops the timer and resuming
/// restarts a full interval. Each request runs detached, so a pause or a
/// reset never cancels it; the session drops results from older generations.
pub struct EtaRefresher {
    resolver: RouteResolver,
    destination: Coordinate,
    interval: SignedDuration,
    input: watch::Receiver<RefresherInput>,
    updates: mpsc::UnboundedSender<EtaUpdate>,
    clock: WallClock,
}

impl EtaRefresher {
    pub fn new(
        resolver: RouteResolver,
        destination: Coordinate,
        interval: SignedDuration,
        input: watch::Receiver<RefresherInput>,
        updates: mpsc::UnboundedSender<EtaUpdate>,
    ) -> Self {
        Self {
            resolver,
            destination,
            interval: interval.max(SignedDuration::from_secs(1)),
            input,
            updates,
            clock: WallClock::default(),
        }
    }

    /// Timestamps requests on the same timeline as the session frames.
    pub fn with_clock(mut self, clock: WallClock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs until the session drops its end of either channel.
    pub async fn run(mut self) {
        let period = self.interval.unsigned_abs();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (mut running, mut generation) = {
            let input = self.input.borrow();
            (input.running, input.generation)
        };

        info!(
            "ETA refresher started, every {}s towards {}",
            self.interval.as_secs(),
            self.destination
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.updates.is_closed() {
                        break;
                    }

                    let input = *self.input.borrow();
                    if !input.running {
                        continue;
                    }

                    if let Some(position) = input.position {
                        self.spawn_request(input.generation, position);
                    }
                }
                changed = self.input.changed() => {
                    if changed.is_err() {
                        break;
                    }

                    let input = *self.input.borrow_and_update();
                    if input.running && (!running || input.generation != generation) {
                        // resumed or restarted: the next refresh is a full interval away
                        ticker.reset();
                    }
                    running = input.running;
                    generation = input.generation;
                }
            }
        }

        debug!("ETA refresher stopped");
    }

    fn spawn_request(&self, generation: u64, position: Coordinate) {
        let issued_at = self.clock.now();
        let query = RouteQuery::new(position, self.destination).departing_at(issued_at);
        let resolver = self.resolver.clone();
        let updates = self.updates.clone();

        debug!("Refreshing ETA from {} (generation {})", position, generation);

        tokio::spawn(async move {
            let outcome = resolver.query(&query).await.into_result();
            // the session may have stopped in the meantime
            let _ = updates.send(EtaUpdate {
                generation,
                issued_at,
                outcome,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use convoy_routing::{
        meters::Meters,
        provider::{RouteResponse, RoutingProvider},
        route_plan::Congestion,
    };

    use super::*;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RoutingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn route(&self, query: &RouteQuery) -> anyhow::Result<RouteResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RouteResponse {
                polyline: vec![query.origin, query.destination],
                distance: Meters::new(10_000.0),
                duration: SignedDuration::from_secs(600),
                congestion: vec![Congestion::Low],
            })
        }
    }

    fn running_at(generation: u64, running: bool) -> RefresherInput {
        RefresherInput {
            generation,
            running,
            position: Some(Coordinate::new(4.35, 50.85)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_only_while_running() {
        let provider = Arc::new(CountingProvider::default());
        let resolver = RouteResolver::new(provider.clone());
        let (input_tx, input_rx) = watch::channel(running_at(0, true));
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();

        let refresher = EtaRefresher::new(
            resolver,
            Coordinate::new(3.7174, 51.0543),
            SignedDuration::from_secs(60),
            input_rx,
            updates_tx,
        );
        let handle = tokio::spawn(refresher.run());

        tokio::time::sleep(Duration::from_secs(61)).await;
        let update = updates_rx.recv().await.unwrap();
        assert_eq!(update.generation, 0);
        assert_eq!(
            update.outcome.unwrap().duration,
            SignedDuration::from_secs(600)
        );

        input_tx.send(running_at(0, false)).unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        input_tx.send(running_at(1, true)).unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        let update = updates_rx.recv().await.unwrap();
        assert_eq!(update.generation, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        drop(input_tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_session_drops_updates() {
        let resolver = RouteResolver::new(Arc::new(CountingProvider::default()));
        let (_input_tx, input_rx) = watch::channel(running_at(0, true));
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        let refresher = EtaRefresher::new(
            resolver,
            Coordinate::new(3.7174, 51.0543),
            SignedDuration::from_secs(60),
            input_rx,
            updates_tx,
        );
        let handle = tokio::spawn(refresher.run());

        drop(updates_rx);
        tokio::time::sleep(Duration::from_secs(61)).await;

        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_generation_waits_a_full_interval() {
        let provider = Arc::new(CountingProvider::default());
        let resolver = RouteResolver::new(provider.clone());
        let (input_tx, input_rx) = watch::channel(running_at(0, true));
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();

        let refresher = EtaRefresher::new(
            resolver,
            Coordinate::new(3.7174, 51.0543),
            SignedDuration::from_secs(60),
            input_rx,
            updates_tx,
        );
        let handle = tokio::spawn(refresher.run());

        // reset and start land in one update, the refresher never sees a pause
        tokio::time::sleep(Duration::from_secs(50)).await;
        input_tx.send(running_at(1, true)).unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(41)).await;
        let update = updates_rx.recv().await.unwrap();
        assert_eq!(update.generation, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        drop(input_tx);
        handle.await.unwrap();
    }
}
