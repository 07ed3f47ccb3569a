//! Clocks, time mappers and the time graph.

mod clock;
mod graph;
mod mapper;

pub use clock::{Clock, ManualClock};
pub use graph::{ScopedMapper, TimeGraph};
pub use mapper::TimeMapper;
