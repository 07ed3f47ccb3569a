//! Core foundation: geometry, timestamps, clocks and the time graph.

pub mod time;
pub mod types;
