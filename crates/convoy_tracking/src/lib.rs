pub mod camera;
pub mod checkpoint;
pub mod config;
pub mod driver;
pub mod eta;
pub mod eta_refresher;
pub mod interpolator;
pub mod progress_clock;
pub mod render;
pub mod session;
pub mod session_cache;
