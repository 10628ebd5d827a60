//! Application services: reconciliation, settings snapshots and the
//! persistence traits they depend on.

pub mod error;
pub mod reconciler;
pub mod repos;
pub mod settings_import;
