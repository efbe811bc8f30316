use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::Shell;
use std::path::PathBuf;

use trip_core::{GeoPoint, LabelMode};

#[derive(Parser, Debug)]
#[command(
    name = "tripdur",
    author,
    version,
    about = "Taxi trip-duration feature pipeline",
    long_about = None
)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build standardized feature matrices and target buckets from a data directory
    Prepare(PrepareArgs),
    /// Print the geohash bytes of a coordinate
    Geohash {
        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Number of output bytes (even, 2..=24)
        #[arg(long, default_value_t = 12)]
        precision: usize,
        /// Also print the bounding box the bytes decode to
        #[arg(long)]
        bounds: bool,
    },
    /// Haversine and manhattan distance between two points
    Distance {
        /// Start point as `lat,lng`
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        from: GeoPoint,
        /// End point as `lat,lng`
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        to: GeoPoint,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct PrepareArgs {
    /// Directory holding the trip tables and the `osrm/` routing tables
    #[arg(value_hint = ValueHint::DirPath)]
    pub datadir: PathBuf,
    #[arg(long, default_value = "train.csv")]
    pub trainset: String,
    #[arg(long, default_value = "test.csv")]
    pub testset: String,
    /// TOML file with pipeline settings; flags override it
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Fraction of training rows held out for validation
    #[arg(long)]
    pub valid_size: Option<f64>,
    /// Number of target buckets
    #[arg(long)]
    pub buckets: Option<usize>,
    /// Copy the data directory to the scratch directory before caching
    #[arg(long)]
    pub cache_read_only: bool,
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub scratch_dir: Option<PathBuf>,
    /// Geohash bytes per trip side
    #[arg(long)]
    pub precision: Option<usize>,
    #[arg(long)]
    pub clusters: Option<usize>,
    /// Coordinate window, in standard deviations, for fitting PCA and k-means
    #[arg(long)]
    pub outlier_std: Option<f64>,
    /// Seed of the train/validation shuffle
    #[arg(long)]
    pub seed: Option<u64>,
    /// `hard` bucket indices or `soft` Gaussian distributions
    #[arg(long)]
    pub labels: Option<LabelMode>,
    /// Write train/valid/test CSV files and buckets.json here
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    pub out: Option<PathBuf>,
}

/// Parse `lat,lng` into a validated point.
pub fn parse_point(raw: &str) -> Result<GeoPoint, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected `lat,lng`, got '{raw}'"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|err| format!("bad latitude '{lat}': {err}"))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|err| format!("bad longitude '{lng}': {err}"))?;
    GeoPoint::new(lat, lng).map_err(|err| err.to_string())
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
