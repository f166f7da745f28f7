//! Millwright Core -- the hot-path optimizer for large factory simulations.
//!
//! The host simulation keeps its machines in sparse, per-kind pools addressed
//! by stable ids (see [`source::SourceWorld`]). This crate turns that object
//! model into dense, index-addressed arrays grouped by entity kind and by
//! material-flow connectivity, ticks them in parallel, and writes the results
//! back.
//!
//! # Build Pipeline
//!
//! [`engine::OptimizedWorld::build`] runs once per topology generation:
//!
//! 1. **Connectivity** -- [`graph::ConnectivityGraph`] links entities by
//!    material flow and partitions them into balanced regions.
//! 2. **Pools** -- every region builds one dense pool per entity kind
//!    ([`pool`]), interning recipes and profiles into the shared
//!    [`statics::StaticDataStore`] and need patterns into
//!    [`needs::NeedsPatterns`].
//! 3. **Schedule** -- [`schedule::build_tree`] assembles the phase tree that
//!    [`schedule::WorkScheduler`] drains every tick.
//!
//! # Six-Phase Tick
//!
//! 1. **PowerDemand** -- consumers and generators post to network totals.
//! 2. **PowerBalance** -- satisfaction ratios per network (single unit).
//! 3. **Production** -- assemblers, labs, miners, generators, turrets.
//! 4. **Transport** -- inserters, belts, tanks, sprayers, monitors.
//! 5. **Handoff** -- cargo crossing region boundaries (single unit).
//! 6. **Bookkeeping** -- fold per-tick statistics (single unit).
//!
//! Every phase is a global barrier: no unit of phase N+1 starts before all
//! units of phase N have finished.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- owns the source world and keeps the optimized
//!   build in step with it.
//! - [`cargo::CargoPathBuffer`] -- bit-exact conveyor byte encoding.
//! - [`id::TypedIndex`] -- `(kind, dense index)` cross-reference.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point for deterministic ratios.

pub mod cargo;
pub mod config;
pub mod engine;
pub mod fixed;
pub mod graph;
pub mod id;
pub mod needs;
pub mod pool;
pub mod power;
pub mod region;
pub mod schedule;
pub mod snapshot;
pub mod source;
pub mod statics;
pub mod stats;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
