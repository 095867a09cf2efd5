pub mod coordinate;
pub mod geocoding;
pub mod kmh;
pub mod mapbox_directions;
pub mod meters;
pub mod osrm;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod route_plan;
pub mod route_provider;
pub mod static_map;
pub mod straight_line;

#[cfg(test)]
pub(crate) mod test_utils;
