//! Fleetcast API - data model and wire bodies
//!
//! This crate provides:
//! - Node and client binding descriptors read from the presence store
//! - Probe samples and the fleet-wide probe aggregate
//! - Request/response bodies exchanged with sibling nodes and gateway callers

pub mod model;

pub use model::{
    Acknowledgement, DisconnectBody, EventKind, NodeDescriptor, PayloadBody, ProbeAggregate,
    ProbeAggregateBuilder, ProbeReport, ProbeSample, ProbeTotal,
};
