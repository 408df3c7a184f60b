/*
[INPUT]:  Public API exports for the deri-grid strategy crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod engine;
pub mod gateway;
pub mod grid;
pub mod ladder;
pub mod store;

// Re-export main types for convenience
pub use config::GridConfig;
pub use engine::{CycleReport, EnginePhase, GridEngine};
pub use gateway::ExchangeGateway;
pub use ladder::{GridOrder, Ladder, LadderPair};
pub use store::{OrderStore, StoreError};
