use std::sync::{Arc, OnceLock};

use convoy_routing::{
    coordinate::Coordinate,
    retry::RetryPolicy,
    static_map::{MapMarker, StaticMapError, StaticMapProvider, StaticMapRequest},
};
use jiff::{SignedDuration, Timestamp};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{camera::CameraPose, checkpoint::CheckpointEvent, eta::EtaSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderCapability {
    InteractiveVector,
    Interactive2d,
    StaticImage,
}

/// What the host reports about its rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct CapabilityProbe {
    pub hardware_acceleration: bool,
    pub vector_context: bool,
    pub canvas_2d: bool,
}

impl CapabilityProbe {
    pub fn classify(&self) -> RenderCapability {
        if !self.hardware_acceleration {
            return RenderCapability::StaticImage;
        }

        if self.vector_context {
            RenderCapability::InteractiveVector
        } else if self.canvas_2d {
            RenderCapability::Interactive2d
        } else {
            RenderCapability::StaticImage
        }
    }
}

/// Probes once and remembers the answer for the lifetime of the session.
#[derive(Debug, Default)]
pub struct RenderCapabilitySelector {
    selected: OnceLock<RenderCapability>,
}

impl RenderCapabilitySelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `probe` on the first call only; later calls return the first result.
    pub fn select<F>(&self, probe: F) -> RenderCapability
    where
        F: FnOnce() -> CapabilityProbe,
    {
        *self.selected.get_or_init(|| {
            let probe = probe();
            let capability = probe.classify();
            if capability == RenderCapability::StaticImage {
                warn!(
                    "No interactive rendering available ({:?}), presenting static images",
                    probe
                );
            } else {
                info!("Render capability: {:?}", capability);
            }
            capability
        })
    }

    pub fn selected(&self) -> Option<RenderCapability> {
        self.selected.get().copied()
    }
}

/// Per-frame output of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameUpdate {
    pub timestamp: Timestamp,
    pub progress: f64,
    pub position: Coordinate,
    pub heading: f64,
    /// `None` while the user controls the view.
    pub camera_pose: Option<CameraPose>,
}

/// A surface consuming the session stream. Implementations must not block.
pub trait Presentation: Send {
    fn on_frame(&mut self, frame: &FrameUpdate);

    fn on_eta(&mut self, _snapshot: &EtaSnapshot) {}

    fn on_checkpoint(&mut self, _event: &CheckpointEvent) {}

    fn on_stop(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StaticImageConfig {
    pub refresh_interval: SignedDuration,
    pub zoom: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for StaticImageConfig {
    fn default() -> Self {
        Self {
            refresh_interval: SignedDuration::from_secs(10),
            zoom: 12.0,
            width: 800,
            height: 600,
        }
    }
}

/// Decides when a new static image is due.
#[derive(Debug, Clone)]
pub struct StaticImageScheduler {
    config: StaticImageConfig,
    destination: Coordinate,
    last_rendered: Option<Timestamp>,
    checkpoint_pending: bool,
}

impl StaticImageScheduler {
    pub fn new(config: StaticImageConfig, destination: Coordinate) -> Self {
        Self {
            config,
            destination,
            last_rendered: None,
            checkpoint_pending: false,
        }
    }

    pub fn mark_checkpoint(&mut self) {
        self.checkpoint_pending = true;
    }

    /// Request for this frame when the refresh interval elapsed or a
    /// checkpoint fired since the last image.
    pub fn next_request(&mut self, frame: &FrameUpdate) -> Option<StaticMapRequest> {
        let due = match self.last_rendered {
            None => true,
            Some(last) => {
                self.checkpoint_pending
                    || frame.timestamp.duration_since(last) >= self.config.refresh_interval
            }
        };

        if !due {
            return None;
        }

        self.last_rendered = Some(frame.timestamp);
        self.checkpoint_pending = false;

        Some(StaticMapRequest {
            center: frame.position,
            zoom: self.config.zoom,
            bearing: 0.0,
            markers: vec![
                MapMarker::new(frame.position, "1d4ed8").with_label("car"),
                MapMarker::new(self.destination, "dc2626").with_label("b"),
            ],
            width: self.config.width,
            height: self.config.height,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StaticImage {
    pub request: StaticMapRequest,
    pub bytes: Vec<u8>,
}

/// Static-image path: renders a map centered on the current position in the
/// background and hands the images to `images`. Every render is bounded by
/// `retry_policy`.
pub struct StaticImagePresentation {
    scheduler: StaticImageScheduler,
    provider: Arc<dyn StaticMapProvider>,
    retry_policy: RetryPolicy,
    images: mpsc::UnboundedSender<StaticImage>,
}

impl StaticImagePresentation {
    /// Must be created inside a tokio runtime.
    pub fn new(
        scheduler: StaticImageScheduler,
        provider: Arc<dyn StaticMapProvider>,
        retry_policy: RetryPolicy,
        images: mpsc::UnboundedSender<StaticImage>,
    ) -> Self {
        Self {
            scheduler,
            provider,
            retry_policy,
            images,
        }
    }
}

impl Presentation for StaticImagePresentation {
    fn on_frame(&mut self, frame: &FrameUpdate) {
        let Some(request) = self.scheduler.next_request(frame) else {
            return;
        };

        debug!("Requesting static map {}", self.provider.url(&request));

        let provider = Arc::clone(&self.provider);
        let retry_policy = self.retry_policy.clone();
        let images = self.images.clone();
        tokio::spawn(async move {
            let rendered = retry_policy
                .call(
                    "static map",
                    || provider.render(&request),
                    |_: &StaticMapError| true,
                )
                .await;

            match rendered {
                Ok(bytes) => {
                    // the receiver may be gone after stop
                    let _ = images.send(StaticImage { request, bytes });
                }
                Err(error) => warn!("Static map render failed: {}", error),
            }
        });
    }

    fn on_checkpoint(&mut self, _event: &CheckpointEvent) {
        self.scheduler.mark_checkpoint();
    }
}
