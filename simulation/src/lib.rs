//! # qnet Simulation
//!
//! Runs quantum network protocols over many independent trials.
//!
//! ## Overview
//!
//! A simulation is a [`Topology`] (agents, quantum and classical links,
//! device chains, and the program each agent runs) plus a [`SimConfig`].
//! Every trial builds a fresh copy of the network and runs each agent as its
//! own tokio task; agents exchange qubits and classical words over channels
//! that model emission, propagation and device delays.
//!
//! ## Architecture
//!
//! - **Config** (`config.rs`): serde network description and run settings
//! - **Topology** (`topology.rs`): network plus program assignment, validated up front
//! - **Trial** (`trial.rs`): one run of the network to completion
//! - **Simulation** (`simulation.rs`): parallel multi-trial driver and aggregate report
//! - **Scenarios** (`scenarios.rs`): bundled protocols used by the `qnet-sim` CLI
//!
//! ## Example
//!
//! ```rust,ignore
//! use qnet_simulation::*;
//!
//! let topology = Topology::new()
//!     .agent(AgentConfig::new("Alice").with_qubits(0..10))
//!     .agent(AgentConfig::new("Bob"))
//!     .quantum_link(QuantumLinkConfig::new("Alice", "Bob").with_device(DeviceDescriptor::fiber(20.0)))
//!     .assign("Alice", SendAll { to: "Bob".into() })
//!     .assign("Bob", Collect { from: "Alice".into(), expected: 10 });
//!
//! let report = Simulation::new(topology, SimConfig::seeded(100, 42)).run().await?;
//! println!("{}", report);
//! ```

pub mod config;
pub mod scenarios;
pub mod simulation;
pub mod topology;
pub mod trial;

// Re-export main types
pub use config::{AgentConfig, ClassicalLinkConfig, NetworkConfig, QuantumLinkConfig, SimConfig};
pub use scenarios::{Collect, SendAll};
pub use simulation::{Simulation, SimulationReport, Summary};
pub use topology::Topology;
pub use trial::{TrialOutcome, TrialResult};

pub use qnet_devices::DeviceDescriptor;
pub use qnet_network::{Agent, AgentProgram, AgentReport, AgentStatus, PeerRequirement};
