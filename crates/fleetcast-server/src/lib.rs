//! Fleetcast Server - request gateway in front of the dispatch core
//!
//! This crate provides:
//! - HTTP routes accepting unicast, disconnect, broadcast and probe requests
//! - Command line and layered configuration loading
//! - Logging bootstrap

pub mod api;
pub mod model;
pub mod startup;
