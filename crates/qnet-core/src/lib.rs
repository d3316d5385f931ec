//! # qnet Core
//!
//! Core types, errors and shared primitives for the qnet quantum network
//! simulator.
//!
//! This crate provides the pieces every other qnet crate builds on:
//!
//! - [`AgentId`] / [`ChannelId`]: identities for agents and the links between them
//! - [`MasterClock`]: per-trial simulated time plus the transaction log
//! - [`Program`] / [`SharedProgram`]: the instruction log handed to the
//!   external quantum engine (gates, noise channels, measurements)
//! - [`noise`]: probabilistic noise operators
//! - [`rng`]: seeded, reproducible random streams
//! - Error taxonomy: [`ConfigError`], [`AgentError`], [`QnetError`]

pub mod clock;
pub mod error;
pub mod identity;
pub mod noise;
pub mod program;
pub mod rng;

pub use clock::*;
pub use error::*;
pub use identity::*;
pub use program::*;
pub use rng::{SimRng, derive_seed, seeded, stream_seed};

/// Speed of light in km/s, the default signal propagation speed
pub const SIGNAL_SPEED: f64 = 2.998e5;

/// Default photon pulse length in seconds (10 ps)
pub const DEFAULT_PULSE_LENGTH: f64 = 10e-12;

/// Bits carried by one classical word on the wire
pub const WORD_BITS: f64 = 64.0;
