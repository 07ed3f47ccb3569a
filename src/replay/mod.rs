//! Out-of-order measurement absorption: filter contract + replay engine.

mod engine;
mod filter;

pub use engine::{ReplayConfig, ReplayEngine, REWIND_EPSILON};
pub use filter::{HasTimestamp, ReplayableFilter};
