//! Device models and MNA stamps for Voltaic.
//!
//! This crate provides device models for:
//! - Passive elements: R (plus LDR/thermistor), C, L, switches, relays,
//!   meters, ideal transformers
//! - Sources: V, I with time-varying waveforms, sweeps, and noise
//! - Nonlinear devices: diode family, BJT, MOSFET, op-amp
//! - The mixed-signal logic bridge and the wireless antenna registry
//!
//! [`bind::bind`] turns a `Circuit` plus its `NodeMap` into a
//! [`bind::DeviceSet`] of matrix-index-bound instances implementing the
//! [`stamp::Stamp`] contract.

pub mod bind;
pub mod bjt;
pub mod diode;
pub mod logic;
pub mod mosfet;
pub mod opamp;
pub mod passive;
pub mod sources;
pub mod stamp;
pub mod thermal;
pub mod waveforms;
pub mod wireless;

pub use bind::{Device, DeviceSet, bind};
pub use stamp::{IntegrationMethod, Stamp, StampContext};
