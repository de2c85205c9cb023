//! Poll-cycle window aggregation
//!
//! - `traversal` - cursor-paginated fetch with cycle guard and page limit
//! - `window` - per-cycle `WindowAccumulator`
//! - `devices` - device list refresh
//! - `scheduler` - `aggregate_window` and the fixed-interval cycle loop

pub mod devices;
pub mod scheduler;
pub mod traversal;
pub mod window;

pub use scheduler::{aggregate_window, run_cycle, run_poll_cycles, window_filter, WindowReport};
pub use traversal::{CursorTraversal, StopReason, TraversalRequest};
pub use window::{WindowAccumulator, WindowSummary};
