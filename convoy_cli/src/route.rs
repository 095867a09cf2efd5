use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use clap::Args;
use comfy_table::Table;
use convoy_routing::{coordinate::Coordinate, route_plan::RoutePlan};
use convoy_tracking::eta::TrafficSeverity;
use geojson::{Feature, GeoJson, Geometry, JsonObject, Value::LineString};
use jiff::Timestamp;

use crate::{
    parsers::{parse_coordinate, parse_duration},
    track::TrackerArgs,
};

#[derive(Args)]
pub struct RouteArgs {
    /// Origin as lon,lat
    #[arg(long, value_parser = parse_coordinate)]
    from: Coordinate,

    /// Destination as lon,lat
    #[arg(long, value_parser = parse_coordinate)]
    to: Coordinate,

    /// Depart this long from now (e.g., "30m")
    #[arg(long, value_parser = parse_duration)]
    depart_in: Option<jiff::SignedDuration>,

    /// Write the route as a GeoJSON feature
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    tracker: TrackerArgs,
}

fn to_feature(plan: &RoutePlan) -> Feature {
    let points: Vec<Vec<f64>> = plan
        .polyline()
        .iter()
        .map(|point| vec![point.lon, point.lat])
        .collect();

    let mut properties = JsonObject::new();
    properties.insert(
        String::from("distance_m"),
        serde_json::json!(plan.distance().value()),
    );
    properties.insert(
        String::from("duration_s"),
        serde_json::json!(plan.duration().as_secs()),
    );
    properties.insert(String::from("degraded"), serde_json::json!(plan.is_degraded()));

    Feature {
        bbox: None,
        properties: Some(properties),
        foreign_members: None,
        id: None,
        geometry: Some(Geometry::new(LineString(points))),
    }
}

pub async fn run(args: RouteArgs) -> anyhow::Result<()> {
    let config = args.tracker.config()?;
    let resolver = config.resolver()?;

    let departure = args
        .depart_in
        .map(|delay| Timestamp::now() + delay)
        .unwrap_or_else(Timestamp::now);

    let resolution = resolver.resolve(args.from, args.to, Some(departure)).await;
    let plan = &resolution.plan;

    let mut table = Table::new();
    table.set_header(vec!["Provider", "Distance", "Duration", "Vertices", "Traffic", "Degraded"]);
    table.add_row(vec![
        resolver.provider().name().to_string(),
        plan.distance().to_string(),
        format!("{:#}", plan.duration()),
        plan.polyline().len().to_string(),
        format!("{:?}", TrafficSeverity::from_congestion(plan.congestion())),
        plan.is_degraded().to_string(),
    ]);
    println!("{table}");

    if let Some(error) = &resolution.error {
        println!("Provider failed after {} attempts: {}", resolution.attempts, error);
    }

    if let Some(output) = args.output {
        let file = File::create(&output)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &GeoJson::Feature(to_feature(plan)))?;
        writer.flush()?;
        println!("Route written to {}", output.display());
    }

    Ok(())
}
