//! Network topology and program assignment
//!
//! A [`Topology`] is the declarative network ([`NetworkConfig`]) plus the
//! program each agent runs. Nothing is instantiated here: every trial builds
//! its own agents, channels and devices from the validated [`Blueprint`], so
//! trials never share mutable state.
//!
//! All configuration problems are detected in [`Topology::validate`], before
//! any trial starts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use qnet_core::{AgentId, ChannelId, ConfigError, ConfigResult, QubitId};
use qnet_devices::Device;
use qnet_network::{AgentProgram, ClassicalSettings, Memory, Propagation};

use crate::config::{AgentConfig, ClassicalLinkConfig, NetworkConfig, QuantumLinkConfig};

/// A network plus the programs its agents run
#[derive(Clone, Default)]
pub struct Topology {
    network: NetworkConfig,
    programs: BTreeMap<AgentId, Arc<dyn AgentProgram>>,
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a network loaded from configuration
    pub fn from_config(network: NetworkConfig) -> Self {
        Self {
            network,
            programs: BTreeMap::new(),
        }
    }

    /// Declare an agent
    pub fn agent(mut self, agent: AgentConfig) -> Self {
        self.network.agents.push(agent);
        self
    }

    /// Declare a directed quantum link
    pub fn quantum_link(mut self, link: QuantumLinkConfig) -> Self {
        self.network.quantum_links.push(link);
        self
    }

    /// Declare a symmetric classical link
    pub fn classical_link(mut self, link: ClassicalLinkConfig) -> Self {
        self.network.classical_links.push(link);
        self
    }

    /// Run `program` on the named agent in every trial
    pub fn assign<P>(self, agent: impl Into<AgentId>, program: P) -> Self
    where
        P: AgentProgram + 'static,
    {
        self.assign_shared(agent, Arc::new(program))
    }

    /// Like [`assign`](Self::assign) for a program shared with other agents
    pub fn assign_shared(mut self, agent: impl Into<AgentId>, program: Arc<dyn AgentProgram>) -> Self {
        self.programs.insert(agent.into(), program);
        self
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn agent_count(&self) -> usize {
        self.network.agents.len()
    }

    /// Check the whole topology without building anything
    pub fn validate(&self) -> ConfigResult<()> {
        self.blueprint().map(|_| ())
    }

    /// Validate and resolve the topology into per-trial building instructions
    pub(crate) fn blueprint(&self) -> ConfigResult<Blueprint> {
        let agents = self.agent_plans()?;
        let declared: BTreeSet<AgentId> = agents.iter().map(|a| a.id.clone()).collect();

        let mut channels = BTreeSet::new();
        let mut quantum = Vec::new();
        for link in &self.network.quantum_links {
            let plan = quantum_plan(link, &declared)?;
            if !channels.insert(plan.id.clone()) {
                return Err(ConfigError::DuplicateChannel(plan.id.to_string()));
            }
            quantum.push(plan);
        }
        let mut classical = Vec::new();
        for link in &self.network.classical_links {
            let plan = classical_plan(link, &declared)?;
            if !channels.insert(plan.id.clone()) {
                return Err(ConfigError::DuplicateChannel(plan.id.to_string()));
            }
            classical.push(plan);
        }

        if let Some(stray) = self.programs.keys().find(|id| !declared.contains(*id)) {
            return Err(ConfigError::ProgramWithoutAgent(stray.clone()));
        }

        let mut plans = Vec::with_capacity(agents.len());
        for agent in agents {
            let program = self
                .programs
                .get(&agent.id)
                .cloned()
                .ok_or_else(|| ConfigError::AgentWithoutProgram(agent.id.clone()))?;
            for requirement in program.peers() {
                if !channels.contains(&requirement.channel_for(&agent.id)) {
                    return Err(ConfigError::MissingChannel {
                        agent: agent.id.clone(),
                        peer: requirement.peer().clone(),
                        kind: requirement.kind(),
                    });
                }
            }
            plans.push(AgentPlan {
                id: agent.id,
                qubits: agent.qubits,
                memory: agent.memory,
                source_devices: agent.source_devices,
                target_devices: agent.target_devices,
                program,
            });
        }

        Ok(Blueprint {
            agents: plans,
            quantum,
            classical,
        })
    }

    fn agent_plans(&self) -> ConfigResult<Vec<ResolvedAgent>> {
        let mut seen = BTreeSet::new();
        let mut owners: BTreeMap<QubitId, AgentId> = BTreeMap::new();
        let mut resolved = Vec::with_capacity(self.network.agents.len());

        for agent in &self.network.agents {
            let id = AgentId::new(agent.name.clone())?;
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateAgent(id));
            }
            for &qubit in &agent.qubits {
                if let Some(first) = owners.insert(qubit, id.clone()) {
                    if first != id {
                        return Err(ConfigError::QubitConflict {
                            qubit,
                            first,
                            second: id,
                        });
                    }
                }
            }
            resolved.push(ResolvedAgent {
                id,
                qubits: agent.qubits.clone(),
                memory: agent.memory.clone(),
                source_devices: Device::chain(&agent.source_devices)?,
                target_devices: Device::chain(&agent.target_devices)?,
            });
        }
        resolved.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(resolved)
    }

    /// Text summary of agents and links
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Network Topology:\n");
        let _ = writeln!(output, "  Agents: {}", self.network.agents.len());
        for agent in &self.network.agents {
            let program = if self.programs.contains_key(&AgentId::from(agent.name.as_str())) {
                ""
            } else {
                " (no program)"
            };
            let _ = writeln!(output, "    {} qubits={:?}{}", agent.name, agent.qubits, program);
        }
        let _ = writeln!(output, "  Quantum links: {}", self.network.quantum_links.len());
        for link in &self.network.quantum_links {
            let devices: Vec<&str> = link.devices.iter().map(|d| d.kind.as_str()).collect();
            let _ = writeln!(output, "    {} -> {} [{}]", link.from, link.to, devices.join(", "));
        }
        let _ = writeln!(output, "  Classical links: {}", self.network.classical_links.len());
        for link in &self.network.classical_links {
            let _ = writeln!(output, "    {} <-> {} ({} km)", link.from, link.to, link.length);
        }
        output
    }
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("network", &self.network)
            .field("programs", &self.programs.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct ResolvedAgent {
    id: AgentId,
    qubits: Vec<QubitId>,
    memory: Memory,
    source_devices: Vec<Device>,
    target_devices: Vec<Device>,
}

/// Validated topology: what a trial instantiates
pub(crate) struct Blueprint {
    /// Sorted by agent id
    pub agents: Vec<AgentPlan>,
    pub quantum: Vec<QuantumPlan>,
    pub classical: Vec<ClassicalPlan>,
}

pub(crate) struct AgentPlan {
    pub id: AgentId,
    pub qubits: Vec<QubitId>,
    pub memory: Memory,
    /// Device prototypes; each trial works on fresh copies
    pub source_devices: Vec<Device>,
    pub target_devices: Vec<Device>,
    pub program: Arc<dyn AgentProgram>,
}

pub(crate) struct QuantumPlan {
    pub id: ChannelId,
    pub propagation: Propagation,
    pub devices: Vec<Device>,
}

pub(crate) struct ClassicalPlan {
    pub id: ChannelId,
    pub a: AgentId,
    pub b: AgentId,
    pub settings: ClassicalSettings,
}

/// Fresh, zeroed copies of a device chain
pub(crate) fn instantiate(prototypes: &[Device]) -> Vec<Device> {
    prototypes
        .iter()
        .cloned()
        .map(|mut device| {
            device.reset();
            device
        })
        .collect()
}

fn endpoints(
    from: &str,
    to: &str,
    label: &str,
    declared: &BTreeSet<AgentId>,
) -> ConfigResult<(AgentId, AgentId)> {
    let ids = [AgentId::from(from), AgentId::from(to)];
    for id in &ids {
        if !declared.contains(id) {
            return Err(ConfigError::UndeclaredAgent {
                channel: label.to_string(),
                agent: id.clone(),
            });
        }
    }
    let [from, to] = ids;
    if from == to {
        return Err(ConfigError::SelfLink(label.to_string()));
    }
    Ok((from, to))
}

fn check_link(channel: &str, setting: &str, value: f64, positive: bool) -> ConfigResult<()> {
    let in_range = if positive { value > 0.0 } else { value >= 0.0 };
    let valid = value.is_finite() && in_range;
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidLink {
            channel: channel.to_string(),
            setting: setting.to_string(),
            value,
            reason: if positive { "must be positive" } else { "must not be negative" }.to_string(),
        })
    }
}

fn quantum_plan(link: &QuantumLinkConfig, declared: &BTreeSet<AgentId>) -> ConfigResult<QuantumPlan> {
    let label = format!("{}->{}", link.from, link.to);
    let (from, to) = endpoints(&link.from, &link.to, &label, declared)?;
    check_link(&label, "length", link.length, false)?;
    check_link(&label, "signal_speed", link.signal_speed, true)?;
    Ok(QuantumPlan {
        id: ChannelId::quantum(from, to),
        propagation: Propagation::new(link.length).with_signal_speed(link.signal_speed),
        devices: Device::chain(&link.devices)?,
    })
}

fn classical_plan(link: &ClassicalLinkConfig, declared: &BTreeSet<AgentId>) -> ConfigResult<ClassicalPlan> {
    let label = format!("{}<->{}", link.from, link.to);
    let (a, b) = endpoints(&link.from, &link.to, &label, declared)?;
    check_link(&label, "length", link.length, false)?;
    check_link(&label, "signal_speed", link.signal_speed, true)?;
    check_link(&label, "pulse_length", link.pulse_length, true)?;
    if !(0.0..=1.0).contains(&link.flip_probability) {
        return Err(ConfigError::InvalidLink {
            channel: label,
            setting: "flip_probability".to_string(),
            value: link.flip_probability,
            reason: "must be between 0 and 1".to_string(),
        });
    }
    Ok(ClassicalPlan {
        id: ChannelId::classical(a.clone(), b.clone()),
        a,
        b,
        settings: ClassicalSettings {
            propagation: Propagation::new(link.length).with_signal_speed(link.signal_speed),
            pulse_length: link.pulse_length,
            flip_probability: link.flip_probability,
        },
    })
}
