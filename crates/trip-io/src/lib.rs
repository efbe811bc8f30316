//! Input and output for the trip-duration pipeline: polars-backed loading of
//! trip and routing tables, scratch copies of the data directory and CSV/JSON
//! export of the prepared matrices.

pub mod datadir;
pub mod export;
pub mod frame;
pub mod routing;
pub mod trips;

pub use datadir::copy_data_dir;
pub use export::{
    matrix_frame, write_buckets_json, write_matrix_csv, write_staged, MatrixExport,
};
pub use routing::{load_routing, RouteStats, RoutingTables};
pub use trips::{load_trips, read_trip_table, TripRecord};
