//! Bundled scenarios
//!
//! - **fiber sweep**: Alice sends single qubits to Bob over fibers of
//!   increasing length; the measured loss rate tracks the fiber's
//!   attenuation curve.
//! - **ping**: two agents bounce a classical counter back and forth.
//! - **relay**: Charlie distributes Bell pairs to Alice and Bob; Alice
//!   encodes two bits per pair and sends her half to Bob through Eve, who
//!   measures and forwards it. Bob decodes and acknowledges over a classical
//!   link.

use async_trait::async_trait;
use rand::Rng;
use tracing::info;

use qnet_core::{AgentId, AgentResult, Gate, QnetResult, SimTime};
use qnet_devices::{DeviceDescriptor, Fiber, FiberConfig};
use qnet_network::{Agent, AgentProgram, PeerRequirement};

use crate::config::{AgentConfig, ClassicalLinkConfig, NetworkConfig, QuantumLinkConfig, SimConfig};
use crate::simulation::{Simulation, SimulationReport};
use crate::topology::Topology;

fn picoseconds(time: SimTime) -> i64 {
    (time * 1e12).round() as i64
}

/// Sends every qubit it owns to `to`, one per send
pub struct SendAll {
    pub to: AgentId,
}

#[async_trait]
impl AgentProgram for SendAll {
    fn peers(&self) -> Vec<PeerRequirement> {
        vec![PeerRequirement::QuantumTo(self.to.clone())]
    }

    async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
        let qubits = agent.qubits();
        for &qubit in &qubits {
            agent.q_send(&self.to, &[qubit])?;
        }
        agent.set("sent", qubits.len() as i64);
        Ok(())
    }
}

/// Receives `expected` sends from `from` and measures whatever arrives
pub struct Collect {
    pub from: AgentId,
    pub expected: usize,
}

#[async_trait]
impl AgentProgram for Collect {
    fn peers(&self) -> Vec<PeerRequirement> {
        vec![PeerRequirement::QuantumFrom(self.from.clone())]
    }

    async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
        let mut received = 0;
        let mut lost = 0;
        for _ in 0..self.expected {
            let delivery = agent.q_receive(&self.from).await?;
            lost += delivery.lost.len() as i64;
            for qubit in delivery.arrived {
                agent.measure(qubit, "ro")?;
                received += 1;
            }
        }
        agent.set("received", received);
        agent.set("lost", lost);
        agent.set("clock_ps", picoseconds(agent.clock()));
        Ok(())
    }
}

/// Alice to Bob over a single fiber of `length` km
pub fn fiber_network(length: f64, qubits: usize) -> NetworkConfig {
    NetworkConfig {
        agents: vec![
            AgentConfig::new("Alice").with_qubits(0..qubits),
            AgentConfig::new("Bob"),
        ],
        quantum_links: vec![
            QuantumLinkConfig::new("Alice", "Bob").with_device(DeviceDescriptor::fiber(length)),
        ],
        classical_links: Vec::new(),
    }
}

/// Attach the send/collect programs to a network containing Alice and Bob
///
/// Bob expects one send per qubit Alice starts with.
pub fn fiber_topology(network: NetworkConfig) -> Topology {
    let expected = network
        .agents
        .iter()
        .find(|a| a.name == "Alice")
        .map_or(0, |a| a.qubits.len());
    Topology::from_config(network)
        .assign("Alice", SendAll { to: "Bob".into() })
        .assign(
            "Bob",
            Collect {
                from: "Alice".into(),
                expected,
            },
        )
}

/// One point of a fiber sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub length: f64,
    pub delivered: u64,
    pub lost: u64,
    /// Loss predicted by the fiber's attenuation curve
    pub expected_loss: f64,
}

impl SweepPoint {
    pub fn loss_rate(&self) -> f64 {
        let total = self.delivered + self.lost;
        if total == 0 {
            0.0
        } else {
            self.lost as f64 / total as f64
        }
    }
}

/// Measure loss over each fiber length
pub async fn fiber_sweep(lengths: &[f64], qubits: usize, config: &SimConfig) -> QnetResult<Vec<SweepPoint>> {
    info!("=== Running fiber sweep ===");
    let mut points = Vec::with_capacity(lengths.len());
    for &length in lengths {
        let report = Simulation::new(fiber_topology(fiber_network(length, qubits)), config.clone())
            .run()
            .await?;
        let fiber = Fiber::new(FiberConfig {
            length,
            ..Default::default()
        });
        let point = SweepPoint {
            length,
            delivered: report.summary.delivered,
            lost: report.summary.lost,
            expected_loss: 1.0 - fiber.survival_probability(),
        };
        info!(
            length,
            loss_rate = point.loss_rate(),
            expected = point.expected_loss,
            "fiber sweep point"
        );
        points.push(point);
    }
    Ok(points)
}

/// Sends a counter and expects it back incremented
pub struct Ping {
    pub peer: AgentId,
    pub rounds: i64,
}

#[async_trait]
impl AgentProgram for Ping {
    fn peers(&self) -> Vec<PeerRequirement> {
        vec![PeerRequirement::Classical(self.peer.clone())]
    }

    async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
        let mut mismatches = 0;
        for round in 0..self.rounds {
            agent.c_send(&self.peer, &[round])?;
            let reply = agent.c_receive(&self.peer).await?;
            if reply.first() != Some(&(round + 1)) {
                mismatches += 1;
            }
        }
        agent.set("rounds", self.rounds);
        agent.set("mismatches", mismatches);
        agent.set("clock_ps", picoseconds(agent.clock()));
        agent.log("ping finished");
        Ok(())
    }
}

/// Answers every counter with its successor
pub struct Pong {
    pub peer: AgentId,
    pub rounds: i64,
}

#[async_trait]
impl AgentProgram for Pong {
    fn peers(&self) -> Vec<PeerRequirement> {
        vec![PeerRequirement::Classical(self.peer.clone())]
    }

    async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
        for _ in 0..self.rounds {
            let words = agent.c_receive(&self.peer).await?;
            let next = words.first().copied().unwrap_or_default() + 1;
            agent.c_send(&self.peer, &[next])?;
            agent.set("last", next);
        }
        Ok(())
    }
}

/// Alice and Bob on a classical link of `length` km
pub fn ping_topology(length: f64, rounds: i64) -> Topology {
    Topology::new()
        .agent(AgentConfig::new("Alice"))
        .agent(AgentConfig::new("Bob"))
        .classical_link(ClassicalLinkConfig::new("Alice", "Bob").with_length(length))
        .assign(
            "Alice",
            Ping {
                peer: "Bob".into(),
                rounds,
            },
        )
        .assign(
            "Bob",
            Pong {
                peer: "Alice".into(),
                rounds,
            },
        )
}

pub async fn ping(length: f64, rounds: i64, config: &SimConfig) -> QnetResult<SimulationReport> {
    info!("=== Running ping ===");
    Simulation::new(ping_topology(length, rounds), config.clone()).run().await
}

/// Prepares Bell pairs and hands one half to each of two agents
pub struct BellSource {
    pub pairs: usize,
    pub left: AgentId,
    pub right: AgentId,
}

#[async_trait]
impl AgentProgram for BellSource {
    fn peers(&self) -> Vec<PeerRequirement> {
        vec![
            PeerRequirement::QuantumTo(self.left.clone()),
            PeerRequirement::QuantumTo(self.right.clone()),
        ]
    }

    async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
        for pair in 0..self.pairs {
            let (a, b) = (2 * pair, 2 * pair + 1);
            agent.apply(Gate::H(a))?;
            agent.apply(Gate::Cnot { control: a, target: b })?;
            agent.q_send(&self.left, &[a])?;
            agent.q_send(&self.right, &[b])?;
        }
        Ok(())
    }
}

/// Encodes two random bits per pair and forwards its half
pub struct DenseEncoder {
    pub pairs: usize,
    pub source: AgentId,
    pub next_hop: AgentId,
    pub acknowledger: AgentId,
}

#[async_trait]
impl AgentProgram for DenseEncoder {
    fn peers(&self) -> Vec<PeerRequirement> {
        vec![
            PeerRequirement::QuantumFrom(self.source.clone()),
            PeerRequirement::QuantumTo(self.next_hop.clone()),
            PeerRequirement::Classical(self.acknowledger.clone()),
        ]
    }

    async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
        for pair in 0..self.pairs {
            let delivery = agent.q_receive(&self.source).await?;
            let bits: i64 = agent.rng().random_range(0..4);
            for &qubit in &delivery.arrived {
                if bits & 1 == 1 {
                    agent.apply(Gate::X(qubit))?;
                }
                if bits & 2 == 2 {
                    agent.apply(Gate::Z(qubit))?;
                }
            }
            agent.set(format!("sent_{pair}"), bits);
            // an empty send keeps the downstream hops in step
            agent.q_send(&self.next_hop, &delivery.arrived)?;
        }
        let ack = agent.c_receive(&self.acknowledger).await?;
        agent.set("acknowledged", ack.first().copied().unwrap_or_default());
        Ok(())
    }
}

/// Measures everything that passes through, then forwards it
pub struct Interceptor {
    pub pairs: usize,
    pub from: AgentId,
    pub to: AgentId,
}

#[async_trait]
impl AgentProgram for Interceptor {
    fn peers(&self) -> Vec<PeerRequirement> {
        vec![
            PeerRequirement::QuantumFrom(self.from.clone()),
            PeerRequirement::QuantumTo(self.to.clone()),
        ]
    }

    async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
        let mut intercepted = 0;
        for _ in 0..self.pairs {
            let delivery = agent.q_receive(&self.from).await?;
            for &qubit in &delivery.arrived {
                agent.measure(qubit, "eve")?;
                intercepted += 1;
            }
            agent.q_send(&self.to, &delivery.arrived)?;
        }
        agent.set("intercepted", intercepted);
        Ok(())
    }
}

/// Decodes pairs whose halves both arrived and acknowledges the count
pub struct DenseDecoder {
    pub pairs: usize,
    pub source: AgentId,
    pub relay: AgentId,
    pub sender: AgentId,
}

#[async_trait]
impl AgentProgram for DenseDecoder {
    fn peers(&self) -> Vec<PeerRequirement> {
        vec![
            PeerRequirement::QuantumFrom(self.source.clone()),
            PeerRequirement::QuantumFrom(self.relay.clone()),
            PeerRequirement::Classical(self.sender.clone()),
        ]
    }

    async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
        let mut decoded = 0;
        let mut broken = 0;
        for _ in 0..self.pairs {
            let local = agent.q_receive(&self.source).await?;
            let relayed = agent.q_receive(&self.relay).await?;
            match (local.arrived.first(), relayed.arrived.first()) {
                (Some(&mine), Some(&theirs)) => {
                    agent.apply(Gate::Cnot {
                        control: theirs,
                        target: mine,
                    })?;
                    agent.apply(Gate::H(theirs))?;
                    agent.measure(theirs, "ro")?;
                    agent.measure(mine, "ro")?;
                    decoded += 1;
                }
                _ => broken += 1,
            }
        }
        agent.set("decoded", decoded);
        agent.set("broken", broken);
        agent.c_send(&self.sender, &[decoded])?;
        agent.log("decoding finished");
        Ok(())
    }
}

/// Charlie feeds Alice and Bob; Alice reaches Bob only through Eve
///
/// Both Alice->Eve and Eve->Bob run over `fiber_length` km of fiber, and a
/// classical link of the combined length carries Bob's acknowledgement.
pub fn relay_topology(pairs: usize, fiber_length: f64) -> Topology {
    Topology::new()
        .agent(AgentConfig::new("Charlie").with_qubits(0..2 * pairs))
        .agent(AgentConfig::new("Alice"))
        .agent(AgentConfig::new("Eve"))
        .agent(AgentConfig::new("Bob"))
        .quantum_link(QuantumLinkConfig::new("Charlie", "Alice"))
        .quantum_link(QuantumLinkConfig::new("Charlie", "Bob"))
        .quantum_link(
            QuantumLinkConfig::new("Alice", "Eve").with_device(DeviceDescriptor::fiber(fiber_length)),
        )
        .quantum_link(
            QuantumLinkConfig::new("Eve", "Bob").with_device(DeviceDescriptor::fiber(fiber_length)),
        )
        .classical_link(ClassicalLinkConfig::new("Alice", "Bob").with_length(2.0 * fiber_length))
        .assign(
            "Charlie",
            BellSource {
                pairs,
                left: "Alice".into(),
                right: "Bob".into(),
            },
        )
        .assign(
            "Alice",
            DenseEncoder {
                pairs,
                source: "Charlie".into(),
                next_hop: "Eve".into(),
                acknowledger: "Bob".into(),
            },
        )
        .assign(
            "Eve",
            Interceptor {
                pairs,
                from: "Alice".into(),
                to: "Bob".into(),
            },
        )
        .assign(
            "Bob",
            DenseDecoder {
                pairs,
                source: "Charlie".into(),
                relay: "Eve".into(),
                sender: "Alice".into(),
            },
        )
}

pub async fn relay(pairs: usize, fiber_length: f64, config: &SimConfig) -> QnetResult<SimulationReport> {
    info!("=== Running relay ===");
    Simulation::new(relay_topology(pairs, fiber_length), config.clone())
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_topologies_validate() {
        assert!(fiber_topology(fiber_network(5.0, 4)).validate().is_ok());
        assert!(ping_topology(1.0, 3).validate().is_ok());
        assert!(relay_topology(2, 1.0).validate().is_ok());
    }

    #[test]
    fn test_fiber_topology_expects_alice_qubits() {
        let topology = fiber_topology(fiber_network(1.0, 7));
        assert_eq!(topology.agent_count(), 2);
        assert!(topology.visualize().contains("Alice -> Bob [fiber]"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ping_rounds() {
        let report = ping(10.0, 5, &SimConfig::seeded(2, 1)).await.unwrap();
        for trial in &report.trials {
            assert!(trial.is_completed());
            let alice = trial.memory("Alice").unwrap();
            assert_eq!(alice["rounds"], 5);
            assert_eq!(alice["mismatches"], 0);
            assert_eq!(trial.memory("Bob").unwrap()["last"], 5);
            // ten crossings of 10 km
            assert!(alice["clock_ps"] >= picoseconds(10.0 * 10.0 / qnet_core::SIGNAL_SPEED));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lossless_relay_decodes_every_pair() {
        let report = relay(3, 0.0, &SimConfig::seeded(2, 9)).await.unwrap();
        for trial in &report.trials {
            assert!(trial.is_completed(), "{:?}", trial.outcome);
            assert_eq!(trial.memory("Bob").unwrap()["decoded"], 3);
            assert_eq!(trial.memory("Alice").unwrap()["acknowledged"], 3);
            assert_eq!(trial.memory("Eve").unwrap()["intercepted"], 3);
            assert_eq!(trial.program.measurements_into("eve"), 3);
            assert_eq!(trial.program.measurements_into("ro"), 6);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_loss_grows_with_length() {
        let points = fiber_sweep(&[0.0, 50.0], 50, &SimConfig::seeded(2, 4)).await.unwrap();
        assert_eq!(points[0].lost, 0);
        assert_eq!(points[0].delivered, 100);
        assert!(points[1].loss_rate() > points[0].loss_rate());
        assert!(points[1].expected_loss > 0.5);
    }
}
