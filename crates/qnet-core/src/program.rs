//! Quantum program instruction log
//!
//! qnet does not simulate quantum states itself. Agents and devices append
//! instructions (gates, noise channels, measurements) to a [`Program`] that
//! is shared by every agent in a trial; the final program is handed to an
//! external quantum engine for execution.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Index of a qubit in the trial's quantum register
pub type QubitId = usize;

/// Gates an agent can apply to qubits it owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Gate {
    I(QubitId),
    X(QubitId),
    Y(QubitId),
    Z(QubitId),
    H(QubitId),
    S(QubitId),
    T(QubitId),
    Rx { angle: f64, qubit: QubitId },
    Ry { angle: f64, qubit: QubitId },
    Rz { angle: f64, qubit: QubitId },
    Cnot { control: QubitId, target: QubitId },
    Cz { control: QubitId, target: QubitId },
    Cphase { angle: f64, control: QubitId, target: QubitId },
    Swap(QubitId, QubitId),
}

impl Gate {
    /// Qubits the gate acts on
    pub fn qubits(&self) -> Vec<QubitId> {
        match *self {
            Gate::I(q) | Gate::X(q) | Gate::Y(q) | Gate::Z(q) | Gate::H(q) | Gate::S(q) | Gate::T(q) => {
                vec![q]
            }
            Gate::Rx { qubit, .. } | Gate::Ry { qubit, .. } | Gate::Rz { qubit, .. } => vec![qubit],
            Gate::Cnot { control, target }
            | Gate::Cz { control, target }
            | Gate::Cphase { control, target, .. } => vec![control, target],
            Gate::Swap(a, b) => vec![a, b],
        }
    }
}

/// Single-qubit noise channels expressed as Kraus maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseChannel {
    BitFlip,
    PhaseFlip,
    Depolarizing,
}

impl NoiseChannel {
    /// Pauli weights of the channel's Kraus operators
    ///
    /// Each Kraus operator is `sqrt(weight) * pauli`. The weights always sum to 1.
    pub fn kraus_weights(&self, probability: f64) -> Vec<(char, f64)> {
        let p = probability.clamp(0.0, 1.0);
        match self {
            NoiseChannel::BitFlip => vec![('I', 1.0 - p), ('X', p)],
            NoiseChannel::PhaseFlip => vec![('I', 1.0 - p), ('Z', p)],
            NoiseChannel::Depolarizing => {
                vec![('I', 1.0 - p), ('X', p / 3.0), ('Y', p / 3.0), ('Z', p / 3.0)]
            }
        }
    }
}

/// One entry in the program log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Declare a classical readout register
    Declare { register: String, size: usize },
    /// Apply a unitary gate
    Gate(Gate),
    /// Apply a noise channel with the given probability
    Noise {
        channel: NoiseChannel,
        qubit: QubitId,
        probability: f64,
    },
    /// Measure a qubit into a classical register
    Measure { qubit: QubitId, register: String },
}

/// Ordered instruction log for one trial
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Append a gate
    pub fn gate(&mut self, gate: Gate) {
        self.push(Instruction::Gate(gate));
    }

    /// Declare a readout register unless it already exists
    pub fn declare(&mut self, register: &str, size: usize) {
        if !self.is_declared(register) {
            self.push(Instruction::Declare {
                register: register.to_string(),
                size,
            });
        }
    }

    /// Whether a register with this name has been declared
    pub fn is_declared(&self, register: &str) -> bool {
        self.instructions
            .iter()
            .any(|i| matches!(i, Instruction::Declare { register: r, .. } if r == register))
    }

    /// Measure a qubit into `register`, declaring the register on first use
    pub fn measure(&mut self, qubit: QubitId, register: &str) {
        self.declare(register, 1);
        self.push(Instruction::Measure {
            qubit,
            register: register.to_string(),
        });
    }

    /// All instructions in order
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the program is empty
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Number of measurements recorded into `register`
    pub fn measurements_into(&self, register: &str) -> usize {
        self.instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Measure { register: r, .. } if r == register))
            .count()
    }
}

/// Program shared by all agents and devices of one trial
#[derive(Debug, Clone, Default)]
pub struct SharedProgram {
    inner: Arc<Mutex<Program>>,
}

impl SharedProgram {
    /// Create a new shared program
    pub fn new(program: Program) -> Self {
        Self {
            inner: Arc::new(Mutex::new(program)),
        }
    }

    /// Run a closure with exclusive access to the program
    pub fn with<R>(&self, f: impl FnOnce(&mut Program) -> R) -> R {
        let mut program = self.inner.lock();
        f(&mut program)
    }

    /// Copy of the current program
    pub fn snapshot(&self) -> Program {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_qubits() {
        assert_eq!(Gate::H(2).qubits(), vec![2]);
        assert_eq!(Gate::Cnot { control: 0, target: 1 }.qubits(), vec![0, 1]);
        assert_eq!(Gate::Rz { angle: 0.5, qubit: 4 }.qubits(), vec![4]);
    }

    #[test]
    fn test_declare_is_idempotent() {
        let mut program = Program::new();
        program.declare("ro", 2);
        program.declare("ro", 2);
        assert_eq!(program.len(), 1);
        assert!(program.is_declared("ro"));
    }

    #[test]
    fn test_measure_declares_register() {
        let mut program = Program::new();
        program.measure(0, "fiber");
        program.measure(1, "fiber");
        assert!(program.is_declared("fiber"));
        assert_eq!(program.measurements_into("fiber"), 2);
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn test_kraus_weights_sum_to_one() {
        for channel in [NoiseChannel::BitFlip, NoiseChannel::PhaseFlip, NoiseChannel::Depolarizing] {
            let total: f64 = channel.kraus_weights(0.3).iter().map(|(_, w)| w).sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_shared_program_snapshot() {
        let shared = SharedProgram::default();
        let clone = shared.clone();
        clone.with(|p| p.gate(Gate::X(0)));
        assert_eq!(shared.snapshot().len(), 1);
    }
}
