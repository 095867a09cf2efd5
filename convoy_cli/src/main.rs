use clap::{Parser, Subcommand};
use convoy_tracking::config::TrackerConfig;
use mimalloc::MiMalloc;

use crate::{
    geocode::GeocodeArgs,
    route::RouteArgs,
    track::{TrackArgs, TrackerArgs},
};

mod geocode;
mod parsers;
mod route;
mod terminal;
mod track;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Animate a shipment from pickup to drop-off with a live ETA
    #[command(visible_alias = "t")]
    Track {
        #[command(flatten)]
        args: TrackArgs,
    },
    /// Resume the last session started within the freshness window
    Resume {
        #[command(flatten)]
        args: TrackerArgs,
    },
    /// Resolve a single route and print a summary
    Route {
        #[command(flatten)]
        args: RouteArgs,
    },
    /// Resolve addresses to coordinates
    Geocode {
        #[command(flatten)]
        args: GeocodeArgs,
    },
    /// Print the JSON schema of the tracker config
    Schema,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::from_filename("./.env.local").ok();

    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    match cli.command {
        Some(Commands::Track { args }) => track::run(args).await?,
        Some(Commands::Resume { args }) => track::resume(args).await?,
        Some(Commands::Route { args }) => route::run(args).await?,
        Some(Commands::Geocode { args }) => geocode::run(args).await?,
        Some(Commands::Schema) => {
            let schema = schemars::schema_for!(TrackerConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        None => {}
    }

    Ok(())
}
