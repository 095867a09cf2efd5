use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use comfy_table::Table;
use convoy_routing::{
    geocoding::{LatestOnlyGeocoder, MapboxGeocoder},
    route_provider::MAPBOX_ACCESS_TOKEN_ENV_VAR,
};
use convoy_tracking::config::TrackerConfig;

#[derive(Args)]
pub struct GeocodeArgs {
    /// Addresses to resolve, one lookup after the other
    #[arg(required = true)]
    addresses: Vec<String>,

    /// Tracker settings as JSON, for the retry policy
    #[arg(short, long)]
    config: Option<PathBuf>,
}

pub async fn run(args: GeocodeArgs) -> anyhow::Result<()> {
    let access_token = std::env::var(MAPBOX_ACCESS_TOKEN_ENV_VAR)
        .map_err(|_| anyhow::anyhow!("{MAPBOX_ACCESS_TOKEN_ENV_VAR} is not set"))?;
    let config = match &args.config {
        Some(path) => TrackerConfig::from_path(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    let geocoder = LatestOnlyGeocoder::new(
        MapboxGeocoder::new(access_token).with_retry_policy(config.retry.policy()),
    );

    let mut table = Table::new();
    table.set_header(vec!["Query", "Place", "Longitude", "Latitude"]);

    for address in &args.addresses {
        match geocoder.resolve(address).await {
            Ok(place) => {
                table.add_row(vec![
                    address.clone(),
                    place.display_name,
                    format!("{:.6}", place.coordinate.lon),
                    format!("{:.6}", place.coordinate.lat),
                ]);
            }
            Err(error) if error.is_user_correctable() => {
                table.add_row(vec![address.clone(), error.to_string(), String::new(), String::new()]);
            }
            Err(error) => return Err(error.into()),
        }
    }

    println!("{table}");
    Ok(())
}
