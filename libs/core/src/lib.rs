//! Shared infrastructure for the tessera content repository.
//!
//! This crate deliberately stays small: it hosts the telemetry bootstrap and
//! the [`telemetry::SubsystemInfo`] reporting trait so that every subsystem
//! crate describes itself the same way at startup.

pub mod telemetry;
