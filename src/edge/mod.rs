//! Live edge lookup: a burst firing now, matched against the scanned
//! probability table.

pub mod matcher;

pub use matcher::{minute_closes, EdgeConfig, EdgeMatch, EdgeReading, LiveEdgeMatcher, NoMatchReason};
