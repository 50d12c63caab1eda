//! Utility functions module
//!
//! Contains helper functions for units formatting and timeout parsing.

pub mod units;

// Re-export commonly used functions
pub use units::{
    format_duration, format_memory_mb, format_percent_delta, format_seconds, parse_timeout,
};
