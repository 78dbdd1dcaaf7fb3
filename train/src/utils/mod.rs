//! Misc utilities.

mod checkpoint;
mod lr_scheduler;
mod meter;
mod throughput;

pub use checkpoint::*;
pub use lr_scheduler::*;
pub use meter::*;
pub use throughput::*;
