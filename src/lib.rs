//! Geofence gateway library
//!
//! Evaluates batches of device positions against administrator-defined
//! fences and emits entry/exit transitions. Exposes modules for
//! integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
