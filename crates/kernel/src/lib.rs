//! Core crate for biblio: domain model, ledger traits, settings, and the
//! module registry the application assembles itself from.

pub mod error;
pub mod ledger;
pub mod model;
pub mod module;
pub mod notify;
pub mod registry;
pub mod settings;

pub use module::{InitCtx, Migration, Module};
pub use registry::ModuleRegistry;
