//! Intensity modulator for weak-coherent pulses
//!
//! Attenuates each pulse to a Poisson photon number with mean
//! `average_photons`. An empty pulse carries nothing and its qubit is lost;
//! pulses with more than one photon are counted as multi-photon events.

use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use qnet_core::{ConfigError, ConfigResult, SimTime};

use crate::descriptor::ParamReader;
use crate::{DeviceEnv, DeviceStats, QuantumPayload, partition_losses};

pub const MODULATOR_REGISTER: &str = "intensity_modulator";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulatorConfig {
    pub average_photons: f64,
    pub apply_error: bool,
}

impl Default for ModulatorConfig {
    fn default() -> Self {
        Self {
            average_photons: 1.0,
            apply_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntensityModulator {
    config: ModulatorConfig,
    stats: DeviceStats,
}

impl IntensityModulator {
    pub fn new(config: ModulatorConfig) -> ConfigResult<Self> {
        Poisson::new(config.average_photons).map_err(|e| ConfigError::InvalidParameter {
            device: "intensity_modulator".to_string(),
            parameter: "average_photons".to_string(),
            value: config.average_photons,
            reason: e.to_string(),
        })?;
        Ok(Self {
            config,
            stats: DeviceStats::default(),
        })
    }

    pub(crate) fn from_params(reader: &mut ParamReader<'_>) -> ConfigResult<Self> {
        let defaults = ModulatorConfig::default();
        Self::new(ModulatorConfig {
            average_photons: reader.positive("average_photons", defaults.average_photons)?,
            apply_error: reader.flag("apply_error", defaults.apply_error)?,
        })
    }

    pub fn config(&self) -> &ModulatorConfig {
        &self.config
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
            return 0.0;
        }
        let Ok(photons) = Poisson::new(self.config.average_photons) else {
            return 0.0;
        };

        let program = env.program;
        let rng = &mut *env.rng;
        let stats = &mut self.stats;
        let (_, dropped) = partition_losses(payload, |qubit| {
            let count: f64 = photons.sample(&mut *rng);
            if count == 0.0 {
                program.with(|p| p.measure(qubit, MODULATOR_REGISTER));
                return true;
            }
            if count > 1.0 {
                stats.multi_photon += 1;
            } else {
                stats.successes += 1;
            }
            false
        });
        self.stats.losses += dropped;
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{SharedProgram, seeded};

    #[test]
    fn test_vacuum_fraction_is_lost() {
        let mut modulator = IntensityModulator::new(ModulatorConfig {
            average_photons: 0.5,
            ..Default::default()
        })
        .unwrap();
        let program = SharedProgram::default();
        let mut rng = seeded(31);
        let mut env = DeviceEnv {
            rng: &mut rng,
            program: &program,
        };
        let mut payload = QuantumPayload::new((0..10_000).collect());
        modulator.apply(&mut payload, &mut env);

        let stats = modulator.stats();
        // P(N = 0) for a mean of 0.5
        assert!((stats.loss_rate() - (-0.5f64).exp()).abs() < 0.02);
        assert_eq!(stats.successes + stats.multi_photon + stats.losses, 10_000);
        assert_eq!(payload.lost.len() as u64, stats.losses);
    }

    #[test]
    fn test_rejects_zero_mean() {
        assert!(
            IntensityModulator::new(ModulatorConfig {
                average_photons: 0.0,
                ..Default::default()
            })
            .is_err()
        );
    }
}
