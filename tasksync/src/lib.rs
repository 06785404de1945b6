//! `TaskSync` — client-side task synchronization core library.

pub mod config;
pub mod query;
pub mod seed;
pub mod session;
pub mod stats;
pub mod store;
