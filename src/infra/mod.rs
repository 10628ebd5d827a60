//! Infrastructure adapters and runtime bootstrap.

pub mod collections;
pub mod db;
pub mod error;
pub mod export;
pub mod memory;
pub mod private_config;
pub mod telemetry;
