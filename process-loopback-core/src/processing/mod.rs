#[cfg(feature = "intermediate-queue")]
pub mod decoupler;
pub mod execution_monitor;
#[cfg(feature = "intermediate-queue")]
pub mod handoff_queue;
pub mod producer;
