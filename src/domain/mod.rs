//! Domain layer types and invariants.

pub mod checksum;
pub mod entities;
pub mod error;
pub mod settings;
