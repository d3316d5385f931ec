//! Error types for qnet
//!
//! Errors fall into three groups:
//!
//! - [`ConfigError`]: problems with the topology, device descriptors or run
//!   settings. Detected before any trial starts and fatal to the whole run.
//! - [`AgentError`]: failures raised while an agent's program executes
//!   (timeouts, missing channels, qubit ownership). Fatal to that trial only.
//! - [`QnetError`]: top-level error returned by the simulation driver.
//!
//! Losing a qubit in transit is not an error; it is reported as a normal
//! delivery outcome.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::identity::{AgentId, ChannelId, ChannelKind};
use crate::program::QubitId;

/// Top-level error type for qnet
#[derive(Debug, Error)]
pub enum QnetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Errors detected while validating a configuration
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum ConfigError {
    #[error("Unknown device kind: {0}")]
    UnknownDevice(String),

    #[error("Unknown parameter `{parameter}` for device `{device}`")]
    UnknownParameter { device: String, parameter: String },

    #[error("Invalid value {value} for `{parameter}` on device `{device}`: {reason}")]
    InvalidParameter {
        device: String,
        parameter: String,
        value: f64,
        reason: String,
    },

    #[error("Invalid agent name: {0:?}")]
    InvalidAgentName(String),

    #[error("Duplicate agent: {0}")]
    DuplicateAgent(AgentId),

    #[error("Qubit {qubit} is owned by both {first} and {second}")]
    QubitConflict {
        qubit: QubitId,
        first: AgentId,
        second: AgentId,
    },

    #[error("Channel {channel} references undeclared agent {agent}")]
    UndeclaredAgent { channel: String, agent: AgentId },

    #[error("Channel {0} connects an agent to itself")]
    SelfLink(String),

    #[error("Duplicate channel: {0}")]
    DuplicateChannel(String),

    #[error("Invalid value {value} for `{setting}` on channel {channel}: {reason}")]
    InvalidLink {
        channel: String,
        setting: String,
        value: f64,
        reason: String,
    },

    #[error("Program assigned to undeclared agent: {0}")]
    ProgramWithoutAgent(AgentId),

    #[error("Agent {0} has no program")]
    AgentWithoutProgram(AgentId),

    #[error("Agent {agent} requires a {kind} channel with {peer} that the topology does not declare")]
    MissingChannel {
        agent: AgentId,
        peer: AgentId,
        kind: ChannelKind,
    },

    #[error("Invalid simulation setting: {0}")]
    InvalidSetting(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to read configuration: {0}")]
    Io(String),
}

/// Errors raised by an agent while its program runs
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum AgentError {
    #[error("No {kind} channel between {agent} and {peer}")]
    NotConnected {
        agent: AgentId,
        peer: AgentId,
        kind: ChannelKind,
    },

    #[error("Agent {agent} does not own qubit {qubit}")]
    QubitNotOwned { agent: AgentId, qubit: QubitId },

    #[error("Qubit {qubit} appears more than once in one operation of {agent}")]
    RepeatedQubit { agent: AgentId, qubit: QubitId },

    #[error("Receive on {channel} timed out after {waited:?}")]
    Timeout { channel: ChannelId, waited: Duration },

    #[error("Classical memory slot `{0}` is not set")]
    MissingMemory(String),

    #[error("Program failed: {0}")]
    Program(String),
}

/// Result type alias for configuration validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for top-level qnet operations
pub type QnetResult<T> = Result<T, QnetError>;
