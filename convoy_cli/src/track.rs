use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args, ValueEnum};
use convoy_routing::{
    coordinate::Coordinate,
    geocoding::{Geocoder, MapboxGeocoder},
    mapbox_directions::MapboxProfile,
    retry::RetryPolicy,
    route_provider::{MAPBOX_ACCESS_TOKEN_ENV_VAR, RouteProvider},
    static_map::MapboxStaticMap,
};
use convoy_tracking::{
    config::TrackerConfig,
    driver::{DriverOptions, SessionDriver},
    progress_clock::{RunState, TimingMode},
    render::{
        CapabilityProbe, Presentation, RenderCapability, RenderCapabilitySelector, StaticImage,
        StaticImagePresentation, StaticImageScheduler,
    },
    session::TrackingSession,
    session_cache::{CachedSession, SessionCache},
};
use jiff::{SignedDuration, Timestamp};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    parsers::{parse_coordinate, parse_duration},
    terminal::TerminalPresentation,
};

#[derive(Clone, Copy, ValueEnum)]
pub enum ProviderArg {
    Mapbox,
    Osrm,
    /// Straight line at the fallback speed, no network needed.
    Crow,
}

impl ProviderArg {
    pub fn route_provider(&self, config: &TrackerConfig) -> RouteProvider {
        match self {
            ProviderArg::Mapbox => RouteProvider::MapboxDirections {
                profile: MapboxProfile::DrivingTraffic,
            },
            ProviderArg::Osrm => RouteProvider::Osrm { url: None },
            ProviderArg::Crow => RouteProvider::AsTheCrowFlies {
                speed_kmh: config.fallback_speed_kmh,
            },
        }
    }
}

#[derive(Args)]
pub struct TrackerArgs {
    /// Tracker settings as JSON, see `convoy schema`
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Play the whole route back in this time (e.g., "90s", "PT2M")
    #[arg(short, long, value_parser = parse_duration)]
    pub accelerated: Option<SignedDuration>,

    #[arg(short, long, value_enum)]
    pub provider: Option<ProviderArg>,

    /// Present static map images instead of the terminal view
    #[arg(long)]
    pub static_only: bool,

    /// Where static map images are written
    #[arg(long, default_value = ".")]
    pub images: PathBuf,
}

impl TrackerArgs {
    pub fn config(&self) -> anyhow::Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => TrackerConfig::from_path(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => TrackerConfig::default(),
        };

        if let Some(playback) = self.accelerated {
            config.timing = TimingMode::Accelerated { playback };
        }

        if let Some(provider) = self.provider {
            config.provider = provider.route_provider(&config);
        }

        Ok(config)
    }
}

#[derive(Args)]
pub struct TrackArgs {
    /// Pickup as lon,lat
    #[arg(long, value_parser = parse_coordinate, required_unless_present = "from_address")]
    pub from: Option<Coordinate>,

    /// Pickup address, resolved with Mapbox
    #[arg(long, conflicts_with = "from")]
    pub from_address: Option<String>,

    /// Drop-off as lon,lat
    #[arg(long, value_parser = parse_coordinate, required_unless_present = "to_address")]
    pub to: Option<Coordinate>,

    /// Drop-off address, resolved with Mapbox
    #[arg(long, conflicts_with = "to")]
    pub to_address: Option<String>,

    #[command(flatten)]
    pub tracker: TrackerArgs,
}

pub struct Endpoint {
    pub coordinate: Coordinate,
    pub name: Option<String>,
}

async fn resolve_endpoint(
    coordinate: Option<Coordinate>,
    address: Option<&str>,
    geocoder: &mut Option<MapboxGeocoder>,
    retry_policy: &RetryPolicy,
) -> anyhow::Result<Endpoint> {
    if let Some(coordinate) = coordinate {
        return Ok(Endpoint {
            coordinate,
            name: None,
        });
    }

    let address = address.context("Either a coordinate or an address is required")?;

    if geocoder.is_none() {
        let access_token = std::env::var(MAPBOX_ACCESS_TOKEN_ENV_VAR)
            .with_context(|| format!("{MAPBOX_ACCESS_TOKEN_ENV_VAR} is required to resolve addresses"))?;
        *geocoder = Some(
            MapboxGeocoder::new(access_token).with_retry_policy(retry_policy.clone()),
        );
    }

    let Some(geocoder) = geocoder.as_ref() else {
        anyhow::bail!("Geocoder unavailable");
    };

    match geocoder.resolve(address).await {
        Ok(place) => {
            info!("{} -> {}", address, place.display_name);
            Ok(Endpoint {
                coordinate: place.coordinate,
                name: Some(place.display_name),
            })
        }
        Err(error) if error.is_user_correctable() => {
            anyhow::bail!("{error}. Check the address and try again.")
        }
        Err(error) => Err(error.into()),
    }
}

pub async fn run(args: TrackArgs) -> anyhow::Result<()> {
    let config = args.tracker.config()?;

    let retry_policy = config.retry.policy();
    let mut geocoder = None;
    let origin = resolve_endpoint(
        args.from,
        args.from_address.as_deref(),
        &mut geocoder,
        &retry_policy,
    )
    .await?;
    let destination = resolve_endpoint(
        args.to,
        args.to_address.as_deref(),
        &mut geocoder,
        &retry_policy,
    )
    .await?;

    track(origin, destination, config, &args.tracker).await
}

pub async fn resume(tracker: TrackerArgs) -> anyhow::Result<()> {
    let cache = SessionCache::from_env()?;
    let mut config = tracker.config()?;
    let cache = cache.with_freshness(config.cache_freshness);

    let Some(cached) = cache.load(Timestamp::now())? else {
        anyhow::bail!("No session to resume");
    };

    info!(
        "Resuming session from {}",
        cached.saved_at.strftime("%Y-%m-%d %H:%M UTC")
    );

    if tracker.accelerated.is_none() {
        config.timing = cached.timing;
    }

    track(
        Endpoint {
            coordinate: cached.origin,
            name: cached.origin_name,
        },
        Endpoint {
            coordinate: cached.destination,
            name: cached.destination_name,
        },
        config,
        &tracker,
    )
    .await
}

async fn track(
    origin: Endpoint,
    destination: Endpoint,
    config: TrackerConfig,
    tracker: &TrackerArgs,
) -> anyhow::Result<()> {
    let resolver = config.resolver()?;

    let resolution = resolver
        .resolve(origin.coordinate, destination.coordinate, Some(Timestamp::now()))
        .await;

    if let Some(error) = &resolution.error {
        warn!(
            "Route unavailable after {} attempts ({}), tracking a straight line",
            resolution.attempts, error
        );
    }

    save_session(&origin, &destination, &config);

    let session = TrackingSession::new(
        origin.coordinate,
        destination.coordinate,
        resolution.plan,
        config.session_options(),
    );

    let selector = RenderCapabilitySelector::new();
    let capability = selector.select(|| CapabilityProbe {
        hardware_acceleration: !tracker.static_only,
        vector_context: false,
        canvas_2d: true,
    });

    let presentation = presentation(capability, &config, destination.coordinate, tracker)?;

    let driver = SessionDriver::spawn(
        session,
        Some(resolver),
        Some(presentation),
        DriverOptions {
            frame_interval: config.frame_interval,
            stop_on_completion: true,
        },
    );
    driver.start();

    let mut status = driver.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = status.wait_for(|status| status.state == RunState::Completed) => {}
    }

    let session = driver.stop().await?;

    match session.eta() {
        Some(eta) => info!(
            "Stopped at {:.1}% ({:?}), last ETA {}",
            session.progress() * 100.0,
            session.state(),
            eta.adjusted_arrival.strftime("%H:%M UTC")
        ),
        None => info!("Stopped at {:.1}%", session.progress() * 100.0),
    }

    Ok(())
}

fn save_session(origin: &Endpoint, destination: &Endpoint, config: &TrackerConfig) {
    let cache = match SessionCache::from_env() {
        Ok(cache) => cache,
        Err(error) => {
            debug!("Session not cached: {}", error);
            return;
        }
    };

    let cached = CachedSession {
        origin: origin.coordinate,
        destination: destination.coordinate,
        origin_name: origin.name.clone(),
        destination_name: destination.name.clone(),
        timing: config.timing,
        saved_at: Timestamp::now(),
    };

    if let Err(error) = cache.save(&cached) {
        warn!("Failed to cache session: {}", error);
    }
}

fn presentation(
    capability: RenderCapability,
    config: &TrackerConfig,
    destination: Coordinate,
    tracker: &TrackerArgs,
) -> anyhow::Result<Box<dyn Presentation>> {
    if capability != RenderCapability::StaticImage {
        return Ok(Box::new(TerminalPresentation::new()));
    }

    let access_token = std::env::var(MAPBOX_ACCESS_TOKEN_ENV_VAR)
        .with_context(|| format!("{MAPBOX_ACCESS_TOKEN_ENV_VAR} is required for static images"))?;

    if !tracker.images.is_dir() {
        anyhow::bail!("Path {} is not a directory", tracker.images.display());
    }

    let (images_tx, images_rx) = mpsc::unbounded_channel();
    tokio::spawn(write_images(images_rx, tracker.images.clone()));

    Ok(Box::new(StaticImagePresentation::new(
        StaticImageScheduler::new(config.static_image, destination),
        Arc::new(MapboxStaticMap::new(access_token)),
        config.retry.policy(),
        images_tx,
    )))
}

async fn write_images(mut images: mpsc::UnboundedReceiver<StaticImage>, folder: PathBuf) {
    let mut count = 0;

    while let Some(image) = images.recv().await {
        count += 1;
        let path = folder.join(format!("convoy_{count:04}.png"));

        match tokio::fs::write(&path, &image.bytes).await {
            Ok(()) => info!(
                "Map at {} written to {}",
                image.request.center,
                path.display()
            ),
            Err(error) => warn!("Failed to write {}: {}", path.display(), error),
        }
    }
}
