//! Vellum: settings cache, cache metrics and configuration reconciliation.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
