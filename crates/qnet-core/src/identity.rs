//! Agent and channel identities
//!
//! Agents are identified by name ("Alice", "Bob"). Two agents are the same
//! agent exactly when their names match, regardless of any other state.
//! Channels are identified by their kind and endpoints.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Unique identifier for an agent in the network
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create a validated agent identity
    ///
    /// Names must be non-empty and must not contain whitespace or the
    /// `->` / `<->` link separators.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if Self::is_valid_name(&name) {
            Ok(Self(name))
        } else {
            Err(ConfigError::InvalidAgentName(name))
        }
    }

    /// Check whether a name is usable as an agent identity
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && !name.chars().any(char::is_whitespace) && !name.contains("->")
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for AgentId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// The kind of data a channel carries
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[display("quantum")]
    Quantum,
    #[display("classical")]
    Classical,
}

/// Identifier for a channel
///
/// Quantum channels are directed (`from -> to`). Classical channels are
/// symmetric; their endpoints are stored in sorted order so that
/// `Alice<->Bob` and `Bob<->Alice` name the same channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub kind: ChannelKind,
    pub from: AgentId,
    pub to: AgentId,
}

impl ChannelId {
    /// Directed quantum channel identifier
    pub fn quantum(from: AgentId, to: AgentId) -> Self {
        Self {
            kind: ChannelKind::Quantum,
            from,
            to,
        }
    }

    /// Symmetric classical channel identifier (normalized endpoint order)
    pub fn classical(a: AgentId, b: AgentId) -> Self {
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        Self {
            kind: ChannelKind::Classical,
            from,
            to,
        }
    }

    /// Whether the agent is one of the channel's endpoints
    pub fn touches(&self, agent: &AgentId) -> bool {
        &self.from == agent || &self.to == agent
    }

    /// The endpoint opposite to `agent`, if `agent` is an endpoint
    pub fn peer_of(&self, agent: &AgentId) -> Option<&AgentId> {
        if &self.from == agent {
            Some(&self.to)
        } else if &self.to == agent {
            Some(&self.from)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ChannelKind::Quantum => write!(f, "{}->{}", self.from, self.to),
            ChannelKind::Classical => write!(f, "{}<->{}", self.from, self.to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_validation() {
        assert!(AgentId::new("Alice").is_ok());
        assert!(AgentId::new("node-7").is_ok());
        assert!(AgentId::new("").is_err());
        assert!(AgentId::new("Al ice").is_err());
        assert!(AgentId::new("A->B").is_err());
    }

    #[test]
    fn test_agent_identity_is_by_name() {
        let a1 = AgentId::from("Alice");
        let a2 = AgentId::new("Alice").unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, AgentId::from("Bob"));
        assert_eq!(a1.to_string(), "Alice");
    }

    #[test]
    fn test_classical_channel_id_is_symmetric() {
        let ab = ChannelId::classical("Alice".into(), "Bob".into());
        let ba = ChannelId::classical("Bob".into(), "Alice".into());
        assert_eq!(ab, ba);
        assert_eq!(ab.to_string(), "Alice<->Bob");
    }

    #[test]
    fn test_quantum_channel_id_is_directed() {
        let ab = ChannelId::quantum("Alice".into(), "Bob".into());
        let ba = ChannelId::quantum("Bob".into(), "Alice".into());
        assert_ne!(ab, ba);
        assert_eq!(ab.to_string(), "Alice->Bob");
        assert_eq!(ab.peer_of(&"Alice".into()), Some(&AgentId::from("Bob")));
        assert_eq!(ab.peer_of(&"Carol".into()), None);
        assert!(ab.touches(&"Bob".into()));
    }
}
