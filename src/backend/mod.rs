//! Feature-gated wire adapters
//!
//! Each adapter binds one concrete wire library to the connection traits in
//! [`crate::connection`]. None are compiled by default; enable the matching
//! feature flag.

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;
