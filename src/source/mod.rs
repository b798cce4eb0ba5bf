//! Search data source module
//!
//! Defines the connection and cursor capabilities the aggregator relies on,
//! plus the backends implementing them.

mod cursor;
pub mod memory;
mod traits;
pub mod windows;

pub use cursor::{Record, RowCursor};
pub use memory::{Document, FaultPlan, MemoryIndex, MemoryProvider};
pub use traits::*;
pub use windows::WindowsSearchProvider;
