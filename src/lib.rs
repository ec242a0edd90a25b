//! Gear & Go library
//!
//! Gear closet persistence, pack weight aggregation, a TTL cache for trip
//! weather and a versioned offline cache for the app shell. The `gearngo`
//! binary is a thin front end over these modules.

pub mod app;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod gear;
pub mod shell;
pub mod storage;
