//! # qnet Network
//!
//! Channels and the agent execution context.
//!
//! ## Components
//!
//! - [`Lane`]: one direction of a channel; a synchronized FIFO whose receiver
//!   blocks until an item arrives
//! - [`QuantumChannel`]: directed link with a transit device chain
//! - [`ClassicalChannel`]: symmetric link with one lane per direction
//! - [`Agent`]: what a protocol program runs against
//! - [`AgentProgram`]: trait implemented by protocol programs
//!
//! ## Example
//!
//! ```rust,ignore
//! use qnet_network::{Agent, AgentProgram};
//!
//! struct Sender;
//!
//! #[async_trait::async_trait]
//! impl AgentProgram for Sender {
//!     async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
//!         agent.c_send(&"Bob".into(), &[7])
//!     }
//! }
//! ```

pub mod agent;
pub mod channel;
pub mod lane;

pub use agent::{
    Agent, AgentProgram, AgentReport, AgentStatus, Memory, PeerRequirement, QuantumDelivery,
};
pub use channel::{ChannelReport, ClassicalChannel, ClassicalSettings, Propagation, QuantumChannel};
pub use lane::{Departure, InFlight, Lane, LaneCounts};
