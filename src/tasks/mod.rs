//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is alive.
//!
//! # Tasks
//! - Memory Monitor: Recomputes memory usage and evicts over-budget entries

mod memory_monitor;

pub use memory_monitor::{MemoryMonitor, MemoryReport};
