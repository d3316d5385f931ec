//! Master clock for a trial
//!
//! Every agent keeps its own local clock. The master clock is the trial-wide
//! view: it advances to the latest completion time any agent reports and,
//! when enabled, keeps a log of every send and receive.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::identity::{AgentId, ChannelKind};
use crate::program::QubitId;

/// Simulated time in seconds
pub type SimTime = f64;

/// Direction of a recorded transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sent,
    Received,
}

/// What a transaction carried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionPayload {
    Qubits(Vec<QubitId>),
    Words(Vec<i64>),
}

/// A single send or receive seen by the master clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Local time of the acting agent when the operation completed
    pub time: SimTime,
    pub kind: TransactionKind,
    pub source: AgentId,
    pub target: AgentId,
    pub payload: TransactionPayload,
}

impl Transaction {
    /// Medium the transaction travelled over
    pub fn channel_kind(&self) -> ChannelKind {
        match self.payload {
            TransactionPayload::Qubits(_) => ChannelKind::Quantum,
            TransactionPayload::Words(_) => ChannelKind::Classical,
        }
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (label, items) = match &self.payload {
            TransactionPayload::Qubits(q) => ("Qubits", format!("{:?}", q)),
            TransactionPayload::Words(w) => ("Bits", format!("{:?}", w)),
        };
        match self.kind {
            TransactionKind::Sent => write!(
                f,
                "{} {} sent from {} to {} at {:e}",
                label, items, self.source, self.target, self.time
            ),
            TransactionKind::Received => write!(
                f,
                "{} {} received by {} from {} at {:e}",
                label, items, self.target, self.source, self.time
            ),
        }
    }
}

#[derive(Debug, Default)]
struct ClockState {
    time: SimTime,
    transactions: Vec<Transaction>,
}

/// Trial-wide simulated clock
#[derive(Debug, Default)]
pub struct MasterClock {
    state: Mutex<ClockState>,
    keep_log: bool,
}

impl MasterClock {
    /// Create a master clock at time zero
    ///
    /// With `keep_log` set, every recorded transaction is retained.
    pub fn new(keep_log: bool) -> Self {
        Self {
            state: Mutex::new(ClockState::default()),
            keep_log,
        }
    }

    /// Latest completion time recorded by any agent
    pub fn time(&self) -> SimTime {
        self.state.lock().time
    }

    /// Record a transaction and advance the clock to its time if later
    pub fn record(&self, transaction: Transaction) {
        trace!(%transaction, "master clock");
        let mut state = self.state.lock();
        state.time = state.time.max(transaction.time);
        if self.keep_log {
            state.transactions.push(transaction);
        }
    }

    /// Copy of the transaction log
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().transactions.clone()
    }

    /// Drain the transaction log
    pub fn take_transactions(&self) -> Vec<Transaction> {
        std::mem::take(&mut self.state.lock().transactions)
    }
}
