//! Control loop orchestration.
//!
//! `ControlLoopDriver` owns every per-run piece of state and drives the
//! frame -> estimate -> command -> vehicle cycle on the calling thread.
//! Other threads only ever reach it through a `CancelHandle`.

pub mod cancel;
pub mod config;
pub mod context;
mod driver;
pub mod report;
pub mod ticker;

pub use cancel::{CancelHandle, CancelSignal, cancel_channel, spawn_key_watcher};
pub use config::PilotConfig;
pub use context::IterationContext;
pub use driver::{ControlLoopDriver, LoopConfig};
pub use report::{LoopSummary, TerminationReason};
pub use ticker::{Tick, Ticker};
