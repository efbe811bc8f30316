use anyhow::Result;

use trip_core::{decode_bounds, geohash};

pub fn handle(lon: f64, lat: f64, precision: usize, bounds: bool) -> Result<()> {
    let bytes = geohash(lon, lat, precision)?;
    let rendered: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
    println!("{}", rendered.join(" "));
    if bounds {
        let b = decode_bounds(&bytes)?;
        println!(
            "lon [{:.9}, {:.9}] lat [{:.9}, {:.9}]",
            b.min_lng, b.max_lng, b.min_lat, b.max_lat
        );
    }
    Ok(())
}
