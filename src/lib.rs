//! Live FX analytics: currency strength, oscillators over derived series,
//! and a historical conditional-probability table matched against live
//! price bursts.

pub mod api;
pub mod config;
pub mod db;
pub mod edge;
pub mod engine;
pub mod error;
pub mod feed;
pub mod oscillator;
pub mod scanner;
pub mod state;
pub mod strength;
pub mod types;
