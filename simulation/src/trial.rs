//! A single trial
//!
//! A trial instantiates the blueprint (fresh program, master clock, channels,
//! devices and agents), runs every agent as its own tokio task, and collects
//! a [`TrialResult`] once all of them have finished.
//!
//! When an agent fails, the remaining agents are stopped and report as
//! aborted. When the trial runs past its time limit, all agents still
//! running are stopped and report as timed out. Either way every agent's
//! memory ends up in the result, unless its program ignores the stop for
//! longer than the grace period; such an agent is abandoned and reported with
//! an empty memory.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use qnet_core::{
    AgentError, AgentId, ChannelKind, MasterClock, Program, SharedProgram, SimTime, Transaction,
    stream_seed,
};
use qnet_network::{
    Agent, AgentReport, AgentStatus, ChannelReport, ClassicalChannel, Memory, QuantumChannel,
};

use crate::config::SimConfig;
use crate::topology::{Blueprint, instantiate};

/// How a trial ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    /// Every agent's program returned successfully
    Completed,
    /// The first agent failure; the others were stopped
    Failed { agent: AgentId, error: AgentError },
    /// The trial ran past its time limit
    TimedOut,
}

/// Everything a finished trial leaves behind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    pub index: usize,
    pub seed: u64,
    pub outcome: TrialOutcome,
    /// Sorted by agent id
    pub agents: Vec<AgentReport>,
    /// Quantum channels first, then classical, in declaration order
    pub channels: Vec<ChannelReport>,
    /// Instruction log for the quantum engine
    pub program: Program,
    /// Empty unless transaction recording is enabled
    pub transactions: Vec<Transaction>,
    /// Latest completion time any agent reported
    pub sim_time: SimTime,
    pub wall_time: Duration,
}

impl TrialResult {
    pub fn is_completed(&self) -> bool {
        self.outcome == TrialOutcome::Completed
    }

    pub fn agent(&self, name: &str) -> Option<&AgentReport> {
        self.agents.iter().find(|a| a.id.as_str() == name)
    }

    /// Final classical memory of an agent
    pub fn memory(&self, name: &str) -> Option<&Memory> {
        self.agent(name).map(|a| &a.memory)
    }

    fn quantum_channels(&self) -> impl Iterator<Item = &ChannelReport> {
        self.channels
            .iter()
            .filter(|c| c.channel.kind == ChannelKind::Quantum)
    }

    /// Qubits that reached their receivers
    pub fn delivered(&self) -> u64 {
        self.quantum_channels().map(|c| c.delivered).sum()
    }

    /// Qubits lost anywhere between sender and receiver
    pub fn lost(&self) -> u64 {
        self.quantum_channels().map(|c| c.lost).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    TimedOut,
    Aborted,
}

/// Report of a joined agent task; panics are re-raised
fn finished(joined: Result<AgentReport, JoinError>) -> Option<AgentReport> {
    match joined {
        Ok(report) => Some(report),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => {
            warn!(error = %err, "agent task cancelled");
            None
        }
    }
}

/// Placeholder for an agent whose task never returned; its memory is lost
fn abandoned(id: AgentId, stop: Stop) -> AgentReport {
    warn!(agent = %id, "agent abandoned");
    AgentReport {
        id,
        status: match stop {
            Stop::TimedOut => AgentStatus::TimedOut,
            Stop::Aborted => AgentStatus::Aborted,
        },
        clock: 0.0,
        memory: Memory::new(),
        qubits: Vec::new(),
        devices: Vec::new(),
    }
}

/// Build and run one trial to completion
pub(crate) async fn run_trial(
    blueprint: &Blueprint,
    index: usize,
    seed: u64,
    config: &SimConfig,
) -> TrialResult {
    let started = Instant::now();
    let program = SharedProgram::default();
    let master = Arc::new(MasterClock::new(config.record_transactions));

    let quantum: Vec<Arc<QuantumChannel>> = blueprint
        .quantum
        .iter()
        .map(|plan| {
            Arc::new(QuantumChannel::new(
                plan.id.clone(),
                plan.propagation,
                instantiate(&plan.devices),
                program.clone(),
                stream_seed(seed, &plan.id.to_string()),
            ))
        })
        .collect();
    let classical: Vec<Arc<ClassicalChannel>> = blueprint
        .classical
        .iter()
        .map(|plan| {
            Arc::new(ClassicalChannel::new(
                plan.a.clone(),
                plan.b.clone(),
                plan.settings,
                stream_seed(seed, &plan.id.to_string()),
            ))
        })
        .collect();

    let (stop_tx, stop_rx) = watch::channel(None::<Stop>);
    let mut tasks = JoinSet::new();
    for plan in &blueprint.agents {
        let mut agent = Agent::new(
            plan.id.clone(),
            program.clone(),
            master.clone(),
            stream_seed(seed, plan.id.as_str()),
        )
        .with_qubits(plan.qubits.iter().copied())
        .with_memory(plan.memory.clone())
        .with_source_devices(instantiate(&plan.source_devices))
        .with_target_devices(instantiate(&plan.target_devices))
        .with_receive_timeout(config.receive_timeout());
        for channel in quantum.iter().filter(|c| c.id().touches(&plan.id)) {
            agent.attach_quantum(channel.clone());
        }
        for channel in classical.iter().filter(|c| c.id().touches(&plan.id)) {
            agent.attach_classical(channel.clone());
        }

        let agent_program = plan.program.clone();
        let mut stop = stop_rx.clone();
        let span = info_span!("agent", agent = %plan.id);
        tasks.spawn(
            async move {
                debug!("agent started");
                // the program always takes its first step before a stop is seen
                let status = tokio::select! {
                    biased;
                    result = agent_program.run(&mut agent) => match result {
                        Ok(()) => AgentStatus::Completed,
                        Err(error) => AgentStatus::Failed(error),
                    },
                    stopped = stop.wait_for(Option::is_some) => match stopped.map(|s| *s) {
                        Ok(Some(Stop::TimedOut)) => AgentStatus::TimedOut,
                        _ => AgentStatus::Aborted,
                    },
                };
                debug!(?status, clock = agent.clock(), "agent finished");
                agent.into_report(status)
            }
            .instrument(span),
        );
    }
    info!(agents = blueprint.agents.len(), "trial started");

    let mut deadline = config.trial_timeout().map(|limit| started + limit);
    let mut stopped = None;
    let mut outcome = TrialOutcome::Completed;
    let mut agents = Vec::with_capacity(blueprint.agents.len());
    loop {
        let joined = match deadline {
            Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                Ok(joined) => joined,
                Err(_) if stopped.is_none() => {
                    warn!(running = tasks.len(), "trial timed out");
                    outcome = TrialOutcome::TimedOut;
                    stopped = Some(Stop::TimedOut);
                    stop_tx.send_replace(stopped);
                    deadline = Some(Instant::now() + config.stop_grace());
                    continue;
                }
                Err(_) => {
                    while let Some(joined) = tasks.try_join_next() {
                        agents.extend(finished(joined));
                    }
                    warn!(running = tasks.len(), "agents ignored the stop signal, abandoning them");
                    tasks.abort_all();
                    break;
                }
            },
            None => tasks.join_next().await,
        };
        let Some(joined) = joined else { break };
        let Some(report) = finished(joined) else { continue };

        if let AgentStatus::Failed(error) = &report.status {
            if outcome == TrialOutcome::Completed {
                warn!(agent = %report.id, %error, "agent failed, aborting trial");
                outcome = TrialOutcome::Failed {
                    agent: report.id.clone(),
                    error: error.clone(),
                };
                stopped = Some(Stop::Aborted);
                stop_tx.send_replace(stopped);
                deadline = Some(Instant::now() + config.stop_grace());
            }
        }
        agents.push(report);
    }

    // agents still stuck in their program after the grace period
    if let Some(stop) = stopped {
        for plan in &blueprint.agents {
            if !agents.iter().any(|a| a.id == plan.id) {
                agents.push(abandoned(plan.id.clone(), stop));
            }
        }
    }
    agents.sort_by(|a, b| a.id.cmp(&b.id));

    let channels = quantum
        .iter()
        .map(|c| c.report())
        .chain(classical.iter().map(|c| c.report()))
        .collect();
    let result = TrialResult {
        index,
        seed,
        outcome,
        agents,
        channels,
        program: program.snapshot(),
        transactions: master.take_transactions(),
        sim_time: master.time(),
        wall_time: started.elapsed(),
    };
    info!(
        outcome = ?result.outcome,
        delivered = result.delivered(),
        lost = result.lost(),
        sim_time = result.sim_time,
        "trial finished"
    );
    result
}
