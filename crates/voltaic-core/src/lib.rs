//! Core circuit representation for Voltaic.
//!
//! This crate holds everything the rest of the engine agrees on:
//! - the error taxonomy ([`error::CoreError`]),
//! - engine configuration ([`config::SimConfig`]),
//! - the circuit data model (nodes, wires, components, probes),
//! - topology resolution (wire coalescing, ground indexing, node map),
//! - the dense MNA system matrix with its stamp helpers,
//! - netlist persistence (binary `.circ` + JSON mirror).

pub mod circuit;
pub mod component;
pub mod config;
pub mod error;
pub mod mna;
pub mod netlist;
pub mod topology;

pub use circuit::{Circuit, MAX_PROBES, Node, NodeId, Probe, Wire};
pub use component::{Component, ComponentId, ComponentKind, Waveform};
pub use config::{Environment, SimConfig, SolverConfig};
pub use error::{CoreError, Result};
pub use mna::MnaSystem;
pub use topology::NodeMap;
