//! File loading for Millwright: simulation config in RON, TOML or JSON, and
//! binary world snapshots.

pub mod config;
pub mod loader;
pub mod world;

pub use config::{load_sim_config, load_sim_config_from_dir};
pub use loader::{DataLoadError, Format};
pub use world::{load_world, save_world};
