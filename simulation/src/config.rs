//! Configuration types for a simulation run
//!
//! [`NetworkConfig`] is the declarative network description (agents, links,
//! device chains) and can be loaded from JSON. [`SimConfig`] controls how
//! the trials themselves are run.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use qnet_core::{ConfigError, ConfigResult, DEFAULT_PULSE_LENGTH, QubitId, SIGNAL_SPEED};
use qnet_devices::DeviceDescriptor;

fn default_signal_speed() -> f64 {
    SIGNAL_SPEED
}

fn default_pulse_length() -> f64 {
    DEFAULT_PULSE_LENGTH
}

/// One agent of the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub name: String,
    /// Qubits the agent owns when a trial starts
    #[serde(default)]
    pub qubits: Vec<QubitId>,
    /// Initial classical memory
    #[serde(default)]
    pub memory: BTreeMap<String, i64>,
    /// Applied to everything the agent sends on quantum channels
    #[serde(default)]
    pub source_devices: Vec<DeviceDescriptor>,
    /// Applied to everything the agent receives on quantum channels
    #[serde(default)]
    pub target_devices: Vec<DeviceDescriptor>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qubits: Vec::new(),
            memory: BTreeMap::new(),
            source_devices: Vec::new(),
            target_devices: Vec::new(),
        }
    }

    pub fn with_qubits(mut self, qubits: impl IntoIterator<Item = QubitId>) -> Self {
        self.qubits.extend(qubits);
        self
    }

    pub fn with_memory(mut self, name: impl Into<String>, value: i64) -> Self {
        self.memory.insert(name.into(), value);
        self
    }

    pub fn with_source(mut self, device: DeviceDescriptor) -> Self {
        self.source_devices.push(device);
        self
    }

    pub fn with_target(mut self, device: DeviceDescriptor) -> Self {
        self.target_devices.push(device);
        self
    }
}

/// Directed quantum link
///
/// Distance usually lives in a fiber device on the chain; `length` adds
/// free-space propagation on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantumLinkConfig {
    pub from: String,
    pub to: String,
    /// Extra propagation distance in km
    #[serde(default)]
    pub length: f64,
    #[serde(default = "default_signal_speed")]
    pub signal_speed: f64,
    /// Transit device chain, applied in order
    #[serde(default)]
    pub devices: Vec<DeviceDescriptor>,
}

impl QuantumLinkConfig {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            length: 0.0,
            signal_speed: SIGNAL_SPEED,
            devices: Vec::new(),
        }
    }

    pub fn with_device(mut self, device: DeviceDescriptor) -> Self {
        self.devices.push(device);
        self
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }
}

/// Symmetric classical link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassicalLinkConfig {
    pub from: String,
    pub to: String,
    /// Length in km
    #[serde(default)]
    pub length: f64,
    #[serde(default = "default_signal_speed")]
    pub signal_speed: f64,
    /// Seconds per transmitted bit
    #[serde(default = "default_pulse_length")]
    pub pulse_length: f64,
    /// Probability of flipping the lowest bit of a word in transit
    #[serde(default)]
    pub flip_probability: f64,
}

impl ClassicalLinkConfig {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            length: 0.0,
            signal_speed: SIGNAL_SPEED,
            pulse_length: DEFAULT_PULSE_LENGTH,
            flip_probability: 0.0,
        }
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }
}

/// Declarative description of a network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub quantum_links: Vec<QuantumLinkConfig>,
    #[serde(default)]
    pub classical_links: Vec<ClassicalLinkConfig>,
}

impl NetworkConfig {
    /// Parse a network description from JSON
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a network description from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

/// Configuration for a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Number of independent trials
    pub trials: usize,
    /// Base seed; a random one is drawn when unset
    pub seed: Option<u64>,
    /// Limit on a single blocking receive, in milliseconds
    pub receive_timeout_ms: Option<u64>,
    /// Limit on a whole trial, in milliseconds
    pub trial_timeout_ms: Option<u64>,
    /// How long stopped agents get to wind down before they are abandoned,
    /// in milliseconds
    pub stop_grace_ms: u64,
    /// Trials allowed to run at the same time
    pub max_parallel_trials: usize,
    /// Keep every send and receive in the trial result
    pub record_transactions: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            trials: 1,
            seed: None,
            receive_timeout_ms: None,
            trial_timeout_ms: Some(60_000),
            stop_grace_ms: 250,
            max_parallel_trials: 8,
            record_transactions: false,
        }
    }
}

impl SimConfig {
    /// Seeded configuration running `trials` trials
    pub fn seeded(trials: usize, seed: u64) -> Self {
        Self {
            trials,
            seed: Some(seed),
            ..Default::default()
        }
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = Some(ceil_millis(timeout));
        self
    }

    pub fn with_trial_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.trial_timeout_ms = timeout.map(ceil_millis);
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace_ms = ceil_millis(grace);
        self
    }

    pub fn with_transactions(mut self, record: bool) -> Self {
        self.record_transactions = record;
        self
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }

    pub fn trial_timeout(&self) -> Option<Duration> {
        self.trial_timeout_ms.map(Duration::from_millis)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Reject settings no run can use
    pub fn validate(&self) -> ConfigResult<()> {
        if self.trials == 0 {
            return Err(ConfigError::InvalidSetting("trials must be at least 1".into()));
        }
        if self.max_parallel_trials == 0 {
            return Err(ConfigError::InvalidSetting(
                "max_parallel_trials must be at least 1".into(),
            ));
        }
        if self.receive_timeout_ms == Some(0) || self.trial_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidSetting("timeouts must be positive".into()));
        }
        Ok(())
    }
}

/// Whole milliseconds, rounding any remainder up
fn ceil_millis(duration: Duration) -> u64 {
    let mut millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_from_json() {
        let json = r#"{
            "agents": [
                {"name": "Alice", "qubits": [0, 1], "memory": {"bit": 1}},
                {"name": "Bob", "target_devices": [{"kind": "detector"}]}
            ],
            "quantum_links": [
                {"from": "Alice", "to": "Bob",
                 "devices": [{"kind": "fiber", "params": {"length": 10.0}}]}
            ],
            "classical_links": [{"from": "Bob", "to": "Alice", "length": 10.0}]
        }"#;
        let config = NetworkConfig::from_json_str(json).unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].qubits, vec![0, 1]);
        assert_eq!(config.agents[0].memory["bit"], 1);
        assert_eq!(config.quantum_links[0].length, 0.0);
        assert_eq!(config.quantum_links[0].signal_speed, SIGNAL_SPEED);
        assert_eq!(config.quantum_links[0].devices[0], DeviceDescriptor::fiber(10.0));
        assert_eq!(config.classical_links[0].pulse_length, DEFAULT_PULSE_LENGTH);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = NetworkConfig::from_json_str(r#"{"agents": [{"name": "A", "qbits": [0]}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = NetworkConfig::from_path("/nonexistent/qnet.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_sim_config_validation() {
        assert!(SimConfig::default().validate().is_ok());
        assert!(SimConfig::default().with_trials(0).validate().is_err());
        let config = SimConfig {
            max_parallel_trials: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = SimConfig::default().with_receive_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sub_millisecond_timeouts_round_up() {
        let config = SimConfig::default()
            .with_receive_timeout(Duration::from_micros(300))
            .with_trial_timeout(Some(Duration::from_micros(1_500)));
        assert_eq!(config.receive_timeout(), Some(Duration::from_millis(1)));
        assert_eq!(config.trial_timeout(), Some(Duration::from_millis(2)));
        assert!(config.validate().is_ok());

        let config = SimConfig::default().with_trial_timeout(Some(Duration::from_millis(40)));
        assert_eq!(config.trial_timeout_ms, Some(40));
    }

    #[test]
    fn test_sim_config_from_partial_json() {
        let config: SimConfig = serde_json::from_str(r#"{"trials": 4, "seed": 9}"#).unwrap();
        assert_eq!(config.trials, 4);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.trial_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.stop_grace(), Duration::from_millis(250));
    }
}
