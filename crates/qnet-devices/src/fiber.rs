//! Optical fiber
//!
//! Each photon survives the fiber with a probability given by the loss curve;
//! a lost photon is measured into the `fiber` register. Surviving photons may
//! pick up a random rotation whose spread grows with the square root of the
//! length.

use serde::{Deserialize, Serialize};
use tracing::trace;

use qnet_core::{ConfigResult, SIGNAL_SPEED, SimTime, noise};

use crate::descriptor::ParamReader;
use crate::loss::LossModel;
use crate::{DeviceEnv, DeviceStats, QuantumPayload, partition_losses};

/// Register that lost photons are measured into
pub const FIBER_REGISTER: &str = "fiber";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberConfig {
    /// Length in km
    pub length: f64,
    /// Loss per km; units follow `loss_model`
    pub attenuation_coefficient: f64,
    pub loss_model: LossModel,
    /// Rotation spread per sqrt(km); 0 disables rotation noise
    pub rotation_std: f64,
    /// Propagation speed in km/s
    pub signal_speed: f64,
    /// When false the fiber only delays
    pub apply_error: bool,
}

impl Default for FiberConfig {
    fn default() -> Self {
        Self {
            length: 0.0,
            attenuation_coefficient: 0.16,
            loss_model: LossModel::Decibel,
            rotation_std: 0.0,
            signal_speed: SIGNAL_SPEED,
            apply_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fiber {
    config: FiberConfig,
    survival: f64,
    stats: DeviceStats,
}

impl Fiber {
    pub fn new(config: FiberConfig) -> Self {
        let survival = config
            .loss_model
            .survival(config.attenuation_coefficient, config.length);
        Self {
            config,
            survival,
            stats: DeviceStats::default(),
        }
    }

    pub(crate) fn from_params(reader: &mut ParamReader<'_>) -> ConfigResult<Self> {
        let defaults = FiberConfig::default();
        let config = FiberConfig {
            length: reader.non_negative("length", defaults.length)?,
            attenuation_coefficient: reader
                .number("attenuation_coefficient", defaults.attenuation_coefficient)?,
            loss_model: LossModel::from_code(reader.code("loss_model", 0, 1)?)
                .unwrap_or_default(),
            rotation_std: reader.non_negative("rotation_std", defaults.rotation_std)?,
            signal_speed: reader.positive("signal_speed", defaults.signal_speed)?,
            apply_error: reader.flag("apply_error", defaults.apply_error)?,
        };
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &FiberConfig {
        &self.config
    }

    /// Probability that one photon makes it through
    pub fn survival_probability(&self) -> f64 {
        self.survival
    }

    /// Propagation time over the full length
    pub fn delay(&self) -> SimTime {
        self.config.length / self.config.signal_speed
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.stats = DeviceStats::default();
    }

    pub fn apply(&mut self, payload: &mut QuantumPayload, env: &mut DeviceEnv<'_>) -> SimTime {
        let entering = payload.qubits.len() as u64;
        self.stats.uses += entering;

        if !self.config.apply_error {
            self.stats.successes += entering;
            return self.delay();
        }

        let program = env.program;
        let rng = &mut *env.rng;
        let survival = self.survival;
        let (kept, dropped) = partition_losses(payload, |qubit| {
            program
                .with(|p| noise::measure(p, &mut *rng, qubit, survival, FIBER_REGISTER))
                .is_some()
        });

        let spread = self.config.rotation_std * self.config.length.sqrt();
        if spread > 0.0 {
            for &qubit in &payload.qubits {
                program.with(|p| noise::normal_unitary_rotation(p, &mut *rng, qubit, 0.0, spread));
            }
        }

        if dropped > 0 {
            trace!(length = self.config.length, dropped, kept, "fiber loss");
        }
        self.stats.successes += kept;
        self.stats.losses += dropped;
        self.delay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{SharedProgram, seeded};

    fn pass(fiber: &mut Fiber, seed: u64, qubits: usize) -> (QuantumPayload, SharedProgram) {
        let program = SharedProgram::default();
        let mut rng = seeded(seed);
        let mut env = DeviceEnv {
            rng: &mut rng,
            program: &program,
        };
        let mut payload = QuantumPayload::new((0..qubits).collect());
        fiber.apply(&mut payload, &mut env);
        (payload, program)
    }

    #[test]
    fn test_lost_photons_are_measured_into_fiber_register() {
        let mut fiber = Fiber::new(FiberConfig {
            length: 100.0,
            ..Default::default()
        });
        let (payload, program) = pass(&mut fiber, 21, 400);
        assert!(!payload.lost.is_empty());
        assert_eq!(
            program.snapshot().measurements_into(FIBER_REGISTER),
            payload.lost.len()
        );
        assert_eq!(fiber.stats().losses as usize, payload.lost.len());
        assert_eq!(fiber.stats().uses, 400);
    }

    #[test]
    fn test_loss_rate_tracks_survival_curve() {
        let mut fiber = Fiber::new(FiberConfig {
            length: 25.0,
            ..Default::default()
        });
        pass(&mut fiber, 5, 20_000);
        let expected = 1.0 - fiber.survival_probability();
        assert!((fiber.stats().loss_rate() - expected).abs() < 0.02);
    }

    #[test]
    fn test_error_free_fiber_only_delays() {
        let mut fiber = Fiber::new(FiberConfig {
            length: 500.0,
            apply_error: false,
            ..Default::default()
        });
        let (payload, program) = pass(&mut fiber, 1, 10);
        assert_eq!(payload.qubits.len(), 10);
        assert!(program.snapshot().is_empty());
        assert!((fiber.delay() - 500.0 / SIGNAL_SPEED).abs() < 1e-15);
    }

    #[test]
    fn test_rotation_noise_on_survivors() {
        let mut fiber = Fiber::new(FiberConfig {
            length: 4.0,
            attenuation_coefficient: 0.0,
            rotation_std: 0.01,
            ..Default::default()
        });
        let (payload, program) = pass(&mut fiber, 8, 3);
        assert_eq!(payload.qubits.len(), 3);
        // one Rx and one Rz per surviving qubit
        assert_eq!(program.snapshot().len(), 6);
    }
}
