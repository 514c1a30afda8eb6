//! Shared utilities for the workspace: tracing init, stats counters, and
//! human-readable duration formatting/parsing.

pub mod logging;
pub mod stats;
pub mod time;

pub use logging::init_tracing;
pub use stats::StatsCounter;
pub use time::{format_duration, parse_period, PeriodError};
