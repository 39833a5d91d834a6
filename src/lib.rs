//! Stadthavet passage tracker
//!
//! Collects AIS tracks around the Stad peninsula, detects reference line
//! crossings and weather-bound waiting, and keeps daily statistics.

pub mod aggregate;
pub mod barentswatch;
pub mod config;
pub mod crossing;
pub mod database;
pub mod errors;
pub mod geo;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod registry;
pub mod scheduler;
pub mod waiting;
pub mod weather;
