//! Single-photon detector
//!
//! A photon is registered with probability `detection_efficiency`. A photon
//! that is missed may still produce a click through a dark count; the qubit
//! then carries no information and is fully depolarized. Photons that
//! produce no click at all are measured into the `detector` register and lost.

use rand::Rng;
use serde::{Deserialize, Serialize};

use qnet_core::{ConfigResult, SimTime, noise};

use crate::descriptor::ParamReader;
use crate::{DeviceEnv, DeviceStats, QuantumPayload, partition_losses};

pub const DETECTOR_REGISTER: &str = "detector";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub detection_efficiency: f64,
    pub dark_count_probability: f64,
    /// Fixed processing delay added to every received payload, in seconds;
    /// clicks are never suppressed
    pub dead_time: f64,
    pub apply_error: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            detection_efficiency: 0.9,
            dark_count_probability: 0.0,
            dead_time: 0.0,
            apply_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detector {
    config: DetectorConfig,
    stats: DeviceStats,
}

enum Click {
    Photon,
    Dark,
    Nothing,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            stats: DeviceStats::default(),
        }
    }

    pub(crate) fn from_params(reader: &mut ParamReader<'_>) -> ConfigResult<Self> {
        let defaults = DetectorConfig::default();
        Ok(Self::new(DetectorConfig {
            detection_efficiency: reader
                .probability("detection_efficiency", defaults.detection_efficiency)?,
            dark_count_probability: reader
                .probability("dark_count_probability", defaults.dark_count_probability)?,
            dead_time: reader.non_negative("dead_time", defaults.dead_time)?,
            apply_error: reader.flag("apply_error", defaults.apply_error)?,
        }))
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn delay(&self) -> SimTime {
        self.config.dead_time
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
            self.stats.detections += entering;
            self.stats.successes += entering;
            return self.delay();
        }

        let DetectorConfig {
            detection_efficiency,
            dark_count_probability,
            ..
        } = self.config;
        let program = env.program;
        let rng = &mut *env.rng;
        let stats = &mut self.stats;

        let (_, dropped) = partition_losses(payload, |qubit| {
            let click = if rng.random_bool(detection_efficiency) {
                Click::Photon
            } else if dark_count_probability > 0.0 && rng.random_bool(dark_count_probability) {
                Click::Dark
            } else {
                Click::Nothing
            };
            match click {
                Click::Photon => {
                    stats.detections += 1;
                    stats.successes += 1;
                    false
                }
                Click::Dark => {
                    stats.detections += 1;
                    stats.dark_counts += 1;
                    program.with(|p| noise::depolarizing_noise(p, qubit, 1.0));
                    false
                }
                Click::Nothing => {
                    program.with(|p| p.measure(qubit, DETECTOR_REGISTER));
                    true
                }
            }
        });
        self.stats.losses += dropped;
        self.delay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{Instruction, NoiseChannel, SharedProgram, seeded};

    fn detect(config: DetectorConfig, seed: u64, n: usize) -> (Detector, QuantumPayload, SharedProgram) {
        let mut detector = Detector::new(config);
        let program = SharedProgram::default();
        let mut rng = seeded(seed);
        let mut env = DeviceEnv {
            rng: &mut rng,
            program: &program,
        };
        let mut payload = QuantumPayload::new((0..n).collect());
        detector.apply(&mut payload, &mut env);
        (detector, payload, program)
    }

    #[test]
    fn test_perfect_detector_sees_everything() {
        let (detector, payload, program) = detect(
            DetectorConfig {
                detection_efficiency: 1.0,
                ..Default::default()
            },
            3,
            50,
        );
        assert_eq!(payload.qubits.len(), 50);
        assert_eq!(detector.stats().detections, 50);
        assert!(program.snapshot().is_empty());
    }

    #[test]
    fn test_blind_detector_with_dark_counts_depolarizes() {
        let (detector, payload, program) = detect(
            DetectorConfig {
                detection_efficiency: 0.0,
                dark_count_probability: 1.0,
                ..Default::default()
            },
            3,
            4,
        );
        assert_eq!(payload.qubits.len(), 4);
        assert_eq!(detector.stats().dark_counts, 4);
        assert!(program.snapshot().instructions().iter().all(|i| matches!(
            i,
            Instruction::Noise {
                channel: NoiseChannel::Depolarizing,
                probability,
                ..
            } if *probability == 1.0
        )));
    }

    #[test]
    fn test_dead_time_delays_without_blocking_clicks() {
        let config = DetectorConfig {
            detection_efficiency: 1.0,
            dead_time: 5e-8,
            ..Default::default()
        };
        let (detector, payload, _) = detect(config, 1, 20);
        assert_eq!(payload.qubits.len(), 20);
        assert_eq!(detector.stats().detections, 20);
        assert_eq!(detector.delay(), 5e-8);
    }

    #[test]
    fn test_missed_photons_are_lost() {
        let (detector, payload, program) = detect(DetectorConfig::default(), 12, 5_000);
        let stats = detector.stats();
        assert_eq!(stats.losses as usize, payload.lost.len());
        assert_eq!(stats.detections + stats.losses, 5_000);
        assert!((stats.loss_rate() - 0.1).abs() < 0.02);
        assert_eq!(
            program.snapshot().measurements_into(DETECTOR_REGISTER),
            payload.lost.len()
        );
    }
}
