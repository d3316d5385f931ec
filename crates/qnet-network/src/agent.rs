//! Agent execution context
//!
//! An [`Agent`] is what a protocol program sees while it runs: its identity,
//! classical memory, owned qubits, local clock and the channels to its peers.
//! Programs implement [`AgentProgram`] and receive `&mut Agent`.
//!
//! ## Clock discipline
//!
//! The local clock only moves forward, and only on completed sends and
//! receives. A send advances the clock to the moment emission finished; a
//! receive advances it to the moment the item was ready at the receiver.
//! Every completed operation is reported to the trial's [`MasterClock`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use qnet_core::{
    AgentError, AgentId, AgentResult, ChannelId, ChannelKind, DEFAULT_PULSE_LENGTH, Gate,
    MasterClock, QubitId, SharedProgram, SimRng, SimTime, Transaction, TransactionKind,
    TransactionPayload, seeded, stream_seed,
};
use qnet_devices::{Device, DeviceEnv, DeviceReport, QuantumPayload, run_chain};

use crate::channel::{ClassicalChannel, QuantumChannel};

/// Classical memory of an agent
pub type Memory = BTreeMap<String, i64>;

/// A channel a program needs in order to run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PeerRequirement {
    /// Quantum channel from this agent to the peer
    QuantumTo(AgentId),
    /// Quantum channel from the peer to this agent
    QuantumFrom(AgentId),
    /// Classical channel with the peer
    Classical(AgentId),
}

impl PeerRequirement {
    pub fn peer(&self) -> &AgentId {
        match self {
            PeerRequirement::QuantumTo(peer)
            | PeerRequirement::QuantumFrom(peer)
            | PeerRequirement::Classical(peer) => peer,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            PeerRequirement::Classical(_) => ChannelKind::Classical,
            _ => ChannelKind::Quantum,
        }
    }

    /// Channel that satisfies this requirement for `agent`
    pub fn channel_for(&self, agent: &AgentId) -> ChannelId {
        match self {
            PeerRequirement::QuantumTo(peer) => ChannelId::quantum(agent.clone(), peer.clone()),
            PeerRequirement::QuantumFrom(peer) => ChannelId::quantum(peer.clone(), agent.clone()),
            PeerRequirement::Classical(peer) => ChannelId::classical(agent.clone(), peer.clone()),
        }
    }
}

/// A protocol run by one agent
///
/// The same program value is shared by every trial, so per-run state belongs
/// in the agent's memory, not in the program.
#[async_trait]
pub trait AgentProgram: Send + Sync {
    /// Channels this program will use; checked before any trial starts
    fn peers(&self) -> Vec<PeerRequirement> {
        Vec::new()
    }

    async fn run(&self, agent: &mut Agent) -> AgentResult<()>;
}

/// How an agent's program ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Completed,
    Failed(AgentError),
    /// The whole trial ran out of time
    TimedOut,
    /// Stopped because another agent in the trial failed
    Aborted,
}

impl AgentStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, AgentStatus::Completed)
    }
}

/// Outcome of a quantum receive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantumDelivery {
    /// Qubits that reached the receiver, now owned by it
    pub arrived: Vec<QubitId>,
    /// Qubits dropped in transit
    pub lost: Vec<QubitId>,
    pub ready_at: SimTime,
    pub received_at: SimTime,
}

impl QuantumDelivery {
    /// Whether qubits were sent and none of them survived the trip
    pub fn is_lost(&self) -> bool {
        self.arrived.is_empty() && !self.lost.is_empty()
    }

    /// Whether the sender sent nothing
    pub fn is_empty(&self) -> bool {
        self.arrived.is_empty() && self.lost.is_empty()
    }
}

/// Final state of an agent at the end of a trial
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReport {
    pub id: AgentId,
    pub status: AgentStatus,
    pub clock: SimTime,
    pub memory: Memory,
    pub qubits: Vec<QubitId>,
    pub devices: Vec<DeviceReport>,
}

pub struct Agent {
    id: AgentId,
    clock: SimTime,
    memory: Memory,
    qubits: BTreeSet<QubitId>,
    program: SharedProgram,
    master: Arc<MasterClock>,
    quantum_out: HashMap<AgentId, Arc<QuantumChannel>>,
    quantum_in: HashMap<AgentId, Arc<QuantumChannel>>,
    classical: HashMap<AgentId, Arc<ClassicalChannel>>,
    source_devices: Vec<Device>,
    target_devices: Vec<Device>,
    device_rng: SimRng,
    rng: SimRng,
    receive_timeout: Option<Duration>,
}

impl Agent {
    /// Create an agent with an empty memory and a clock at zero
    ///
    /// `seed` is the agent's own stream; program and device randomness are
    /// derived from it separately.
    pub fn new(id: AgentId, program: SharedProgram, master: Arc<MasterClock>, seed: u64) -> Self {
        Self {
            id,
            clock: 0.0,
            memory: Memory::new(),
            qubits: BTreeSet::new(),
            program,
            master,
            quantum_out: HashMap::new(),
            quantum_in: HashMap::new(),
            classical: HashMap::new(),
            source_devices: Vec::new(),
            target_devices: Vec::new(),
            device_rng: seeded(stream_seed(seed, "devices")),
            rng: seeded(stream_seed(seed, "program")),
            receive_timeout: None,
        }
    }

    pub fn with_qubits(mut self, qubits: impl IntoIterator<Item = QubitId>) -> Self {
        self.qubits.extend(qubits);
        self
    }

    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memory = memory;
        self
    }

    /// Devices applied to everything this agent sends on quantum channels
    pub fn with_source_devices(mut self, devices: Vec<Device>) -> Self {
        self.source_devices = devices;
        self
    }

    /// Devices applied to everything this agent receives on quantum channels
    pub fn with_target_devices(mut self, devices: Vec<Device>) -> Self {
        self.target_devices = devices;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Attach a quantum channel this agent is an endpoint of
    pub fn attach_quantum(&mut self, channel: Arc<QuantumChannel>) {
        let id = channel.id().clone();
        if id.from == self.id {
            self.quantum_out.insert(id.to, channel);
        } else if id.to == self.id {
            self.quantum_in.insert(id.from, channel);
        }
    }

    /// Attach a classical channel this agent is an endpoint of
    pub fn attach_classical(&mut self, channel: Arc<ClassicalChannel>) {
        if let Some(peer) = channel.id().peer_of(&self.id).cloned() {
            self.classical.insert(peer, channel);
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Local simulated time
    pub fn clock(&self) -> SimTime {
        self.clock
    }

    /// Trial-wide time: the latest completion any agent has reported
    pub fn read_master_time(&self) -> SimTime {
        self.master.time()
    }

    pub fn qubits(&self) -> Vec<QubitId> {
        self.qubits.iter().copied().collect()
    }

    pub fn owns(&self, qubit: QubitId) -> bool {
        self.qubits.contains(&qubit)
    }

    pub fn program(&self) -> &SharedProgram {
        &self.program
    }

    /// Agent-private random stream for protocol decisions
    pub fn rng(&mut self) -> &mut SimRng {
        &mut self.rng
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.memory.get(name).copied()
    }

    /// Like [`get`](Self::get) but a missing slot is an error
    pub fn require(&self, name: &str) -> AgentResult<i64> {
        self.get(name)
            .ok_or_else(|| AgentError::MissingMemory(name.to_string()))
    }

    pub fn set(&mut self, name: impl Into<String>, value: i64) {
        self.memory.insert(name.into(), value);
    }

    /// Protocol-level log line tagged with the agent and its clock
    pub fn log(&self, label: &str) {
        info!(agent = %self.id, clock = self.clock, "{label}");
    }

    fn check_owned(&self, qubit: QubitId) -> AgentResult<()> {
        if self.owns(qubit) {
            Ok(())
        } else {
            Err(AgentError::QubitNotOwned {
                agent: self.id.clone(),
                qubit,
            })
        }
    }

    /// Every qubit owned, none listed twice
    fn check_operands(&self, qubits: &[QubitId]) -> AgentResult<()> {
        let mut seen = BTreeSet::new();
        for &qubit in qubits {
            self.check_owned(qubit)?;
            if !seen.insert(qubit) {
                return Err(AgentError::RepeatedQubit {
                    agent: self.id.clone(),
                    qubit,
                });
            }
        }
        Ok(())
    }

    /// Append a gate to the trial program
    ///
    /// Every qubit the gate touches must belong to this agent, and a
    /// two-qubit gate needs two distinct qubits.
    pub fn apply(&mut self, gate: Gate) -> AgentResult<()> {
        self.check_operands(&gate.qubits())?;
        self.program.with(|p| p.gate(gate));
        Ok(())
    }

    /// Measure an owned qubit into a classical register of the trial program
    pub fn measure(&mut self, qubit: QubitId, register: &str) -> AgentResult<()> {
        self.check_owned(qubit)?;
        self.program.with(|p| p.measure(qubit, register));
        Ok(())
    }

    fn not_connected(&self, peer: &AgentId, kind: ChannelKind) -> AgentError {
        AgentError::NotConnected {
            agent: self.id.clone(),
            peer: peer.clone(),
            kind,
        }
    }

    fn advance(&mut self, to: SimTime) {
        assert!(
            to >= self.clock,
            "clock of {} would go backwards: {} -> {}",
            self.id,
            self.clock,
            to
        );
        self.clock = to;
    }

    fn record(&self, kind: TransactionKind, source: &AgentId, target: &AgentId, payload: TransactionPayload) {
        self.master.record(Transaction {
            time: self.clock,
            kind,
            source: source.clone(),
            target: target.clone(),
            payload,
        });
    }

    async fn wait<F: Future>(&self, channel: ChannelId, receive: F) -> AgentResult<F::Output> {
        match self.receive_timeout {
            Some(limit) => tokio::time::timeout(limit, receive).await.map_err(|_| {
                warn!(agent = %self.id, %channel, ?limit, "receive timed out");
                AgentError::Timeout {
                    channel,
                    waited: limit,
                }
            }),
            None => Ok(receive.await),
        }
    }

    /// Send owned qubits to `peer`
    ///
    /// The qubits leave this agent immediately, whether or not they survive
    /// the trip. Returns once emission is complete; never waits for delivery.
    pub fn q_send(&mut self, peer: &AgentId, qubits: &[QubitId]) -> AgentResult<()> {
        let channel = self
            .quantum_out
            .get(peer)
            .cloned()
            .ok_or_else(|| self.not_connected(peer, ChannelKind::Quantum))?;
        self.check_operands(qubits)?;
        for qubit in qubits {
            self.qubits.remove(qubit);
        }

        let mut payload = QuantumPayload::new(qubits.to_vec());
        let per_qubit = if self.source_devices.is_empty() {
            DEFAULT_PULSE_LENGTH
        } else {
            let mut env = DeviceEnv {
                rng: &mut self.device_rng,
                program: &self.program,
            };
            run_chain(&mut self.source_devices, &mut payload, &mut env);
            self.source_devices.iter().map(Device::delay).sum()
        };
        let source_delay = per_qubit * qubits.len() as f64;

        let departure = channel.put(payload, self.clock, source_delay);
        self.advance(departure.completed_at);
        debug!(
            agent = %self.id,
            %peer,
            ?qubits,
            clock = self.clock,
            ready_at = departure.ready_at,
            "quantum send"
        );
        self.record(
            TransactionKind::Sent,
            &self.id,
            peer,
            TransactionPayload::Qubits(qubits.to_vec()),
        );
        Ok(())
    }

    /// Wait for the next qubits from `peer`
    ///
    /// Lost qubits are reported in the delivery, not as an error.
    pub async fn q_receive(&mut self, peer: &AgentId) -> AgentResult<QuantumDelivery> {
        let channel = self
            .quantum_in
            .get(peer)
            .cloned()
            .ok_or_else(|| self.not_connected(peer, ChannelKind::Quantum))?;
        let item = self.wait(channel.id().clone(), channel.get()).await?;

        let mut payload = item.payload;
        let target_delay: SimTime = if self.target_devices.is_empty() {
            0.0
        } else {
            let mut env = DeviceEnv {
                rng: &mut self.device_rng,
                program: &self.program,
            };
            run_chain(&mut self.target_devices, &mut payload, &mut env)
        };
        channel.record_receipt(&payload);

        let received_at = self.clock.max(item.ready_at + target_delay);
        self.advance(received_at);
        self.qubits.extend(payload.qubits.iter().copied());
        debug!(
            agent = %self.id,
            %peer,
            arrived = ?payload.qubits,
            lost = ?payload.lost,
            clock = self.clock,
            "quantum receive"
        );
        self.record(
            TransactionKind::Received,
            peer,
            &self.id,
            TransactionPayload::Qubits(payload.qubits.clone()),
        );
        Ok(QuantumDelivery {
            arrived: payload.qubits,
            lost: payload.lost,
            ready_at: item.ready_at,
            received_at,
        })
    }

    /// Send classical words to `peer`
    pub fn c_send(&mut self, peer: &AgentId, words: &[i64]) -> AgentResult<()> {
        let channel = self
            .classical
            .get(peer)
            .cloned()
            .ok_or_else(|| self.not_connected(peer, ChannelKind::Classical))?;
        let departure = channel
            .put(&self.id, words.to_vec(), self.clock)
            .ok_or_else(|| self.not_connected(peer, ChannelKind::Classical))?;
        self.advance(departure.completed_at);
        self.record(
            TransactionKind::Sent,
            &self.id,
            peer,
            TransactionPayload::Words(words.to_vec()),
        );
        Ok(())
    }

    /// Wait for the next classical words from `peer`
    pub async fn c_receive(&mut self, peer: &AgentId) -> AgentResult<Vec<i64>> {
        let channel = self
            .classical
            .get(peer)
            .cloned()
            .ok_or_else(|| self.not_connected(peer, ChannelKind::Classical))?;
        let item = self
            .wait(channel.id().clone(), channel.get(&self.id))
            .await?
            .ok_or_else(|| self.not_connected(peer, ChannelKind::Classical))?;

        let received_at = self.clock.max(item.ready_at);
        self.advance(received_at);
        debug!(agent = %self.id, %peer, words = ?item.payload, clock = self.clock, "classical receive");
        self.record(
            TransactionKind::Received,
            peer,
            &self.id,
            TransactionPayload::Words(item.payload.clone()),
        );
        Ok(item.payload)
    }

    /// Consume the agent into its end-of-trial report
    pub fn into_report(self, status: AgentStatus) -> AgentReport {
        let mut devices = DeviceReport::collect(&format!("{}/source", self.id), &self.source_devices);
        devices.extend(DeviceReport::collect(
            &format!("{}/target", self.id),
            &self.target_devices,
        ));
        AgentReport {
            id: self.id,
            status,
            clock: self.clock,
            memory: self.memory,
            qubits: self.qubits.into_iter().collect(),
            devices,
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("clock", &self.clock)
            .field("memory", &self.memory)
            .field("qubits", &self.qubits)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Agent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Agent {}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> Agent {
        Agent::new(
            AgentId::from(name),
            SharedProgram::default(),
            Arc::new(MasterClock::new(true)),
            7,
        )
    }

    #[test]
    fn test_gate_on_foreign_qubit_is_rejected() {
        let mut alice = agent("Alice").with_qubits([0, 1]);
        assert!(alice.apply(Gate::Cnot { control: 0, target: 1 }).is_ok());
        let err = alice.apply(Gate::H(5)).unwrap_err();
        assert_eq!(
            err,
            AgentError::QubitNotOwned {
                agent: AgentId::from("Alice"),
                qubit: 5,
            }
        );
        assert_eq!(alice.program().snapshot().len(), 1);
    }

    #[test]
    fn test_gate_on_one_qubit_twice_is_rejected() {
        let mut alice = agent("Alice").with_qubits([0, 1]);
        let err = alice.apply(Gate::Cnot { control: 1, target: 1 }).unwrap_err();
        assert_eq!(
            err,
            AgentError::RepeatedQubit {
                agent: AgentId::from("Alice"),
                qubit: 1,
            }
        );
        assert!(alice.apply(Gate::Swap(0, 0)).is_err());
        assert!(alice.program().snapshot().is_empty());
    }

    #[test]
    fn test_send_without_channel() {
        let mut alice = agent("Alice").with_qubits([0]);
        let err = alice.q_send(&AgentId::from("Bob"), &[0]).unwrap_err();
        assert!(matches!(err, AgentError::NotConnected { kind: ChannelKind::Quantum, .. }));
        // a failed send keeps the qubit
        assert!(alice.owns(0));
    }

    #[test]
    fn test_memory() {
        let mut alice = agent("Alice");
        assert!(alice.require("key").is_err());
        alice.set("key", 3);
        assert_eq!(alice.require("key"), Ok(3));
    }

    #[test]
    fn test_identity_is_by_id() {
        let a = agent("Alice").with_qubits([1]);
        let b = agent("Alice");
        assert_eq!(a, b);
        assert_ne!(a, agent("Bob"));
    }

    #[tokio::test]
    async fn test_send_moves_qubit_ownership() {
        let program = SharedProgram::default();
        let master = Arc::new(MasterClock::new(true));
        let channel = Arc::new(QuantumChannel::new(
            ChannelId::quantum("Alice".into(), "Bob".into()),
            Default::default(),
            Vec::new(),
            program.clone(),
            0,
        ));
        let mut alice = Agent::new("Alice".into(), program.clone(), master.clone(), 1).with_qubits([0, 1]);
        let mut bob = Agent::new("Bob".into(), program, master.clone(), 2);
        alice.attach_quantum(channel.clone());
        bob.attach_quantum(channel);

        alice.q_send(bob.id(), &[1]).unwrap();
        assert_eq!(alice.qubits(), vec![0]);
        assert!((alice.clock() - DEFAULT_PULSE_LENGTH).abs() < 1e-20);

        let delivery = bob.q_receive(&"Alice".into()).await.unwrap();
        assert_eq!(delivery.arrived, vec![1]);
        assert!(!delivery.is_lost());
        assert_eq!(bob.qubits(), vec![1]);
        assert_eq!(master.transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_sending_a_qubit_twice_is_rejected() {
        let program = SharedProgram::default();
        let master = Arc::new(MasterClock::new(false));
        let channel = Arc::new(QuantumChannel::new(
            ChannelId::quantum("Alice".into(), "Bob".into()),
            Default::default(),
            Vec::new(),
            program.clone(),
            0,
        ));
        let mut alice = Agent::new("Alice".into(), program.clone(), master.clone(), 1).with_qubits([0, 1]);
        let mut bob = Agent::new("Bob".into(), program, master, 2);
        alice.attach_quantum(channel.clone());
        bob.attach_quantum(channel.clone());

        let err = alice.q_send(bob.id(), &[0, 0]).unwrap_err();
        assert_eq!(
            err,
            AgentError::RepeatedQubit {
                agent: AgentId::from("Alice"),
                qubit: 0,
            }
        );
        // nothing left the agent and the clock did not move
        assert_eq!(alice.qubits(), vec![0, 1]);
        assert_eq!(alice.clock(), 0.0);

        alice.q_send(bob.id(), &[0, 1]).unwrap();
        let delivery = bob.q_receive(&"Alice".into()).await.unwrap();
        assert_eq!(delivery.arrived, vec![0, 1]);
        let report = channel.report();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.delivered + report.lost, 2);
    }

    #[tokio::test]
    async fn test_empty_send_is_not_a_loss() {
        let program = SharedProgram::default();
        let master = Arc::new(MasterClock::new(false));
        let channel = Arc::new(QuantumChannel::new(
            ChannelId::quantum("Alice".into(), "Bob".into()),
            Default::default(),
            Vec::new(),
            program.clone(),
            0,
        ));
        let mut alice = Agent::new("Alice".into(), program.clone(), master.clone(), 1);
        let mut bob = Agent::new("Bob".into(), program, master, 2);
        alice.attach_quantum(channel.clone());
        bob.attach_quantum(channel);

        alice.q_send(bob.id(), &[]).unwrap();
        let delivery = bob.q_receive(&"Alice".into()).await.unwrap();
        assert!(delivery.is_empty());
        assert!(!delivery.is_lost());
    }
}
