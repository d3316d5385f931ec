//! Noise operators
//!
//! Stateless functions that perturb a qubit (by appending instructions to the
//! trial [`Program`]) or a classical bit. Every operator that draws
//! randomness takes the caller's generator, so results are reproducible from
//! a seed.
//!
//! Probabilities outside `[0, 1]` are clamped.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::program::{Gate, Instruction, NoiseChannel, Program, QubitId};

/// Apply a bit flip (X) channel with probability `prob`
pub fn bit_flip(program: &mut Program, qubit: QubitId, prob: f64) {
    kraus(program, NoiseChannel::BitFlip, qubit, prob);
}

/// Apply a phase flip (Z) channel with probability `prob`
pub fn phase_flip(program: &mut Program, qubit: QubitId, prob: f64) {
    kraus(program, NoiseChannel::PhaseFlip, qubit, prob);
}

/// Apply a depolarizing channel with total error probability `prob`
pub fn depolarizing_noise(program: &mut Program, qubit: QubitId, prob: f64) {
    kraus(program, NoiseChannel::Depolarizing, qubit, prob);
}

fn kraus(program: &mut Program, channel: NoiseChannel, qubit: QubitId, prob: f64) {
    program.push(Instruction::Noise {
        channel,
        qubit,
        probability: prob.clamp(0.0, 1.0),
    });
}

/// Measure `qubit` into `register` unless a draw falls under `prob`
///
/// `prob` is the probability that the qubit is left untouched; the qubit is
/// measured with probability `1 - prob`. Returns the qubit when it was
/// measured.
pub fn measure<R: Rng>(
    program: &mut Program,
    rng: &mut R,
    qubit: QubitId,
    prob: f64,
    register: &str,
) -> Option<QubitId> {
    if rng.random::<f64>() >= prob.clamp(0.0, 1.0) {
        program.measure(qubit, register);
        Some(qubit)
    } else {
        None
    }
}

/// Apply a random X and Z rotation with probability `1 - prob`
///
/// Both angles are drawn from a normal distribution with mean 0 and the given
/// standard deviation. A non-positive `std_dev` never rotates and draws
/// nothing. Returns whether a rotation was applied.
pub fn normal_unitary_rotation<R: Rng>(
    program: &mut Program,
    rng: &mut R,
    qubit: QubitId,
    prob: f64,
    std_dev: f64,
) -> bool {
    if std_dev <= 0.0 || !std_dev.is_finite() {
        return false;
    }
    if rng.random::<f64>() < prob.clamp(0.0, 1.0) {
        return false;
    }
    let Ok(normal) = Normal::new(0.0, std_dev) else {
        return false;
    };
    let x_angle = normal.sample(rng);
    let z_angle = normal.sample(rng);
    program.gate(Gate::Rx { angle: x_angle, qubit });
    program.gate(Gate::Rz { angle: z_angle, qubit });
    true
}

/// Flip the lowest bit of a classical word with probability `prob`
pub fn flip_classical_bit<R: Rng>(rng: &mut R, word: i64, prob: f64) -> i64 {
    if prob > 0.0 && rng.random_bool(prob.clamp(0.0, 1.0)) {
        word ^ 1
    } else {
        word
    }
}
