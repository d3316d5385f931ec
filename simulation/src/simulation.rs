//! Multi-trial simulation driver
//!
//! Validates the topology once, then runs `trials` independent trials in
//! parallel. Trial `i` is seeded with `derive_seed(base_seed, i)`, and every
//! agent and channel inside it draws from its own sub-stream, so a seeded run
//! is reproducible however the scheduler interleaves tasks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use qnet_core::{QnetError, QnetResult, SimTime, derive_seed};
use qnet_devices::DeviceStats;
use qnet_network::Memory;

use crate::config::SimConfig;
use crate::topology::Topology;
use crate::trial::{TrialOutcome, TrialResult, run_trial};

/// A topology plus the settings to run it with
#[derive(Debug, Clone)]
pub struct Simulation {
    topology: Topology,
    config: SimConfig,
}

impl Simulation {
    /// Create a new simulation with the given topology and configuration
    pub fn new(topology: Topology, config: SimConfig) -> Self {
        Self { topology, config }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Run every trial and aggregate the results
    ///
    /// Configuration problems are reported before any trial starts. Agent
    /// failures and timeouts are recorded per trial and do not fail the run.
    pub async fn run(&self) -> QnetResult<SimulationReport> {
        self.config.validate()?;
        let blueprint = Arc::new(self.topology.blueprint()?);

        let run_id = Uuid::new_v4();
        let base_seed = self.config.seed.unwrap_or_else(rand::random);
        let started = Instant::now();
        info!(
            %run_id,
            base_seed,
            trials = self.config.trials,
            agents = blueprint.agents.len(),
            "simulation started"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_parallel_trials));
        let config = Arc::new(self.config.clone());
        let mut tasks = JoinSet::new();
        for index in 0..self.config.trials {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| QnetError::Runtime(e.to_string()))?;
            let blueprint = blueprint.clone();
            let config = config.clone();
            let seed = derive_seed(base_seed, index as u64);
            tasks.spawn(
                async move {
                    let _permit = permit;
                    run_trial(&blueprint, index, seed, &config).await
                }
                .instrument(info_span!("trial", index, seed)),
            );
        }

        let mut trials = Vec::with_capacity(self.config.trials);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => trials.push(result),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => return Err(QnetError::Runtime(err.to_string())),
            }
        }
        trials.sort_by_key(|t| t.index);

        let summary = Summary::from_trials(&trials);
        let report = SimulationReport {
            run_id,
            base_seed,
            trials,
            summary,
            wall_time: started.elapsed(),
        };
        info!(
            %run_id,
            completed = report.summary.completed,
            failed = report.summary.failed,
            timed_out = report.summary.timed_out,
            delivered = report.summary.delivered,
            lost = report.summary.lost,
            "simulation finished"
        );
        Ok(report)
    }

    /// Run on a fresh multi-thread runtime
    pub fn run_blocking(&self) -> QnetResult<SimulationReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| QnetError::Runtime(e.to_string()))?;
        runtime.block_on(self.run())
    }
}

/// Aggregates over all trials of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub trials: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Qubits delivered over quantum channels
    pub delivered: u64,
    /// Qubits lost in transit or at the receiver
    pub lost: u64,
    /// Device counters summed over trials, keyed by `owner[position] kind`
    pub devices: BTreeMap<String, DeviceStats>,
    pub mean_sim_time: SimTime,
}

impl Summary {
    pub fn from_trials(trials: &[TrialResult]) -> Self {
        let mut summary = Summary {
            trials: trials.len(),
            ..Default::default()
        };
        for trial in trials {
            match trial.outcome {
                TrialOutcome::Completed => summary.completed += 1,
                TrialOutcome::Failed { .. } => summary.failed += 1,
                TrialOutcome::TimedOut => summary.timed_out += 1,
            }
            summary.delivered += trial.delivered();
            summary.lost += trial.lost();
            summary.mean_sim_time += trial.sim_time;

            let devices = trial
                .channels
                .iter()
                .flat_map(|c| c.devices.iter())
                .chain(trial.agents.iter().flat_map(|a| a.devices.iter()));
            for device in devices {
                let key = format!("{}[{}] {}", device.owner, device.position, device.kind);
                summary.devices.entry(key).or_default().merge(&device.stats);
            }
        }
        if !trials.is_empty() {
            summary.mean_sim_time /= trials.len() as f64;
        }
        summary
    }

    /// Fraction of sent qubits that were lost
    pub fn loss_rate(&self) -> f64 {
        let total = self.delivered + self.lost;
        if total == 0 {
            0.0
        } else {
            self.lost as f64 / total as f64
        }
    }
}

/// Results of a whole run, trials in index order
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub run_id: Uuid,
    /// Seed the trial seeds were derived from; pass it back to reproduce the run
    pub base_seed: u64,
    pub trials: Vec<TrialResult>,
    pub summary: Summary,
    pub wall_time: Duration,
}

impl SimulationReport {
    /// Final memory of one agent in every trial
    pub fn memories(&self, agent: &str) -> Vec<Option<&Memory>> {
        self.trials.iter().map(|t| t.memory(agent)).collect()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.summary;
        writeln!(f, "=== Simulation {} ===", self.run_id)?;
        writeln!(f, "  Base seed: {}", self.base_seed)?;
        writeln!(
            f,
            "  Trials: {} ({} completed, {} failed, {} timed out)",
            s.trials, s.completed, s.failed, s.timed_out
        )?;
        writeln!(
            f,
            "  Qubits: {} delivered, {} lost (loss rate {:.3})",
            s.delivered,
            s.lost,
            s.loss_rate()
        )?;
        writeln!(f, "  Mean simulated time: {:e} s", s.mean_sim_time)?;
        writeln!(f, "  Wall time: {:?}", self.wall_time)?;
        if !s.devices.is_empty() {
            writeln!(f, "  Devices:")?;
            for (name, stats) in &s.devices {
                writeln!(
                    f,
                    "    {}: uses={} successes={} losses={} detections={} dark_counts={} multi_photon={}",
                    name,
                    stats.uses,
                    stats.successes,
                    stats.losses,
                    stats.detections,
                    stats.dark_counts,
                    stats.multi_photon
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qnet_core::{AgentError, AgentResult};
    use qnet_network::{Agent, AgentProgram};

    use crate::config::AgentConfig;

    struct Count;

    #[async_trait]
    impl AgentProgram for Count {
        async fn run(&self, agent: &mut Agent) -> AgentResult<()> {
            let draw = rand::Rng::random_range(agent.rng(), 0..1_000_000i64);
            agent.set("draw", draw);
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl AgentProgram for Fail {
        async fn run(&self, _agent: &mut Agent) -> AgentResult<()> {
            Err(AgentError::Program("boom".into()))
        }
    }

    fn solo<P: AgentProgram + 'static>(program: P) -> Topology {
        Topology::new().agent(AgentConfig::new("Alice")).assign("Alice", program)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_trials_sorted_and_seeded() {
        let report = Simulation::new(solo(Count), SimConfig::seeded(6, 11))
            .run()
            .await
            .unwrap();
        assert_eq!(report.base_seed, 11);
        let indices: Vec<usize> = report.trials.iter().map(|t| t.index).collect();
        assert_eq!(indices, (0..6).collect::<Vec<_>>());
        assert_eq!(report.trials[2].seed, derive_seed(11, 2));
        assert_eq!(report.summary.completed, 6);
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let report = Simulation::new(solo(Fail), SimConfig::seeded(3, 0))
            .run()
            .await
            .unwrap();
        assert_eq!(report.summary.failed, 3);
        assert!(report.to_string().contains("3 failed"));
    }

    #[test]
    fn test_run_blocking() {
        let report = Simulation::new(solo(Count), SimConfig::seeded(2, 5))
            .run_blocking()
            .unwrap();
        assert_eq!(report.trials.len(), 2);
        assert!(report.memories("Alice").iter().all(|m| m.is_some()));
    }

    #[test]
    fn test_invalid_settings_fail_before_running() {
        let simulation = Simulation::new(solo(Count), SimConfig::default().with_trials(0));
        let err = tokio_test::block_on(simulation.run()).unwrap_err();
        assert!(matches!(err, QnetError::Config(_)));
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::from_trials(&[]);
        assert_eq!(summary.trials, 0);
        assert_eq!(summary.loss_rate(), 0.0);
    }
}
