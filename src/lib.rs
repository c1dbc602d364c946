//! biblio: a library-management backend.
//!
//! The catalog, account, and lending modules plug into the kernel's module
//! registry; the lending module owns the reservation state machine and the
//! periodic reconciliation sweep.

pub mod modules;

pub use modules::register_all;
