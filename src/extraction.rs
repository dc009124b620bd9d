use chrono::{DateTime, Utc};
use log::{debug, warn};
use crate::manager_psl::WindowedDataset;
use crate::targets::TargetLocation;

/// One extracted value for a (location, timestamp) pair
pub struct TimeSeriesPoint {
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Normalizes a longitude into the 0-360 domain.
///
/// All distance comparisons in this module happen in 0-360, the native
/// domain of the PSL grids, so grid longitudes pass through unchanged and
/// only the targets actually move.
pub fn to_domain_360(lon: f64) -> f64 {
    lon.rem_euclid(360.0)
}

/// Normalizes a longitude into the -180-180 domain
pub fn to_domain_180(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Returns the (lat index, lon index) of the grid cell nearest to the given
/// point, by squared Euclidean distance in coordinate space.
///
/// The scan order is fixed (lat-major, then lon) and only a strictly smaller
/// distance replaces the running minimum, so ties always resolve to the
/// first minimal cell and repeated runs pick the identical cell.
///
/// # Arguments
///
/// * 'lats' - grid latitude axis
/// * 'lons' - grid longitude axis
/// * 'lat' - target latitude
/// * 'lon' - target longitude, any domain
pub fn nearest_cell(lats: &[f64], lons: &[f64], lat: f64, lon: f64) -> Option<(usize, usize)> {
    let lon = to_domain_360(lon);

    let mut best: Option<(usize, usize, f64)> = None;
    for (i, grid_lat) in lats.iter().enumerate() {
        for (j, grid_lon) in lons.iter().enumerate() {
            let dlat = grid_lat - lat;
            let dlon = to_domain_360(*grid_lon) - lon;
            let dist = dlat * dlat + dlon * dlon;

            if best.is_none_or(|(_, _, d)| dist < d) {
                best = Some((i, j, dist));
            }
        }
    }

    best.map(|(i, j, _)| (i, j))
}

/// Extracts the time series of the nearest grid cell for every target.
///
/// The result keeps target order, and within a target the window's time
/// order. A cell holding only fill values contributes no points, which is
/// not an error - the location simply ends up as an empty report column.
///
/// # Arguments
///
/// * 'window' - the windowed dataset to extract from
/// * 'targets' - the configured target locations
pub fn extract_points(window: &WindowedDataset, targets: &[TargetLocation]) -> Vec<TimeSeriesPoint> {
    let mut points: Vec<TimeSeriesPoint> = Vec::new();

    for target in targets {
        let Some((i, j)) = nearest_cell(&window.lats, &window.lons, target.lat, target.lon) else {
            warn!("no grid cell for target {}, grid is empty", target.name);
            continue;
        };

        debug!(
            "target {} ({}, {}) -> cell ({}, {})",
            target.name, target.lat, target.lon, window.lats[i], window.lons[j]
        );

        for (t, timestamp) in window.times.iter().enumerate() {
            if let Some(value) = window.value_at(t, i, j) {
                points.push(TimeSeriesPoint {
                    location: target.name.clone(),
                    timestamp: *timestamp,
                    value,
                });
            }
        }
    }

    points
}
