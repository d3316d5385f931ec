//! Pulsed laser source
//!
//! Every qubit sent through a laser is one pulse. The photon count of a pulse
//! is Poisson-distributed around `expected_photons`; a pulse whose count hits
//! the (rounded) expectation is a success. The laser never drops qubits.

use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use qnet_core::{ConfigError, ConfigResult, DEFAULT_PULSE_LENGTH, SimTime, noise};

use crate::descriptor::ParamReader;
use crate::{DeviceEnv, DeviceStats, QuantumPayload};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserConfig {
    /// Seconds per pulse
    pub pulse_length: f64,
    /// Mean photons per pulse
    pub expected_photons: f64,
    /// Spread of the random rotation applied to each pulse; 0 disables it
    pub rotation_std: f64,
    pub apply_error: bool,
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            pulse_length: DEFAULT_PULSE_LENGTH,
            expected_photons: 1.0,
            rotation_std: 0.0,
            apply_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Laser {
    config: LaserConfig,
    stats: DeviceStats,
}

impl Laser {
    pub fn new(config: LaserConfig) -> ConfigResult<Self> {
        Poisson::new(config.expected_photons).map_err(|e| ConfigError::InvalidParameter {
            device: "laser".to_string(),
            parameter: "expected_photons".to_string(),
            value: config.expected_photons,
            reason: e.to_string(),
        })?;
        Ok(Self {
            config,
            stats: DeviceStats::default(),
        })
    }

    pub(crate) fn from_params(reader: &mut ParamReader<'_>) -> ConfigResult<Self> {
        let defaults = LaserConfig::default();
        Self::new(LaserConfig {
            pulse_length: reader.positive("pulse_length", defaults.pulse_length)?,
            expected_photons: reader.positive("expected_photons", defaults.expected_photons)?,
            rotation_std: reader.non_negative("rotation_std", defaults.rotation_std)?,
            apply_error: reader.flag("apply_error", defaults.apply_error)?,
        })
    }

    pub fn config(&self) -> &LaserConfig {
        &self.config
    }

    pub fn delay(&self) -> SimTime {
        self.config.pulse_length
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.stats = DeviceStats::default();
    }

    pub fn apply(&mut self, payload: &mut QuantumPayload, env: &mut DeviceEnv<'_>) -> SimTime {
        self.stats.uses += payload.qubits.len() as u64;
        if !self.config.apply_error {
            self.stats.successes += payload.qubits.len() as u64;
            return self.delay();
        }

        let Ok(photons) = Poisson::new(self.config.expected_photons) else {
            return self.delay();
        };
        let target = self.config.expected_photons.round();
        for &qubit in &payload.qubits {
            let count: f64 = photons.sample(&mut *env.rng);
            if count == target {
                self.stats.successes += 1;
            }
            if count > 1.0 {
                self.stats.multi_photon += 1;
            }
            if self.config.rotation_std > 0.0 {
                let rng = &mut *env.rng;
                let std = self.config.rotation_std;
                env.program
                    .with(|p| noise::normal_unitary_rotation(p, rng, qubit, 0.0, std));
            }
        }
        self.delay()
    }
}
