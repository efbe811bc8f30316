use std::io::{self, Write};

use anyhow::Result;
use tabwriter::TabWriter;

use trip_core::{haversine, manhattan, GeoPoint};

pub fn handle(from: GeoPoint, to: GeoPoint) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "METRIC\tKM")?;
    writeln!(
        writer,
        "haversine\t{:.3}",
        haversine(from.lat, from.lng, to.lat, to.lng)
    )?;
    writeln!(
        writer,
        "manhattan\t{:.3}",
        manhattan(from.lat, from.lng, to.lat, to.lng)
    )?;
    writer.flush()?;
    Ok(())
}
