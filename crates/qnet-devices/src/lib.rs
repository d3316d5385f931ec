//! # qnet Devices
//!
//! Optical devices that sit in the path of a quantum channel.
//!
//! A device sees every payload that passes through it. It may drop qubits
//! (a lost photon), perturb them (by appending noise to the trial program)
//! or simply delay them, and it keeps usage counters that are reported at
//! the end of each trial.
//!
//! ## Device kinds
//!
//! - [`Fiber`]: attenuating medium; loss grows with length and attenuation
//! - [`Laser`]: photon source; draws Poisson photon counts per pulse
//! - [`Detector`]: single-photon detector with finite efficiency and dark counts
//! - [`IntensityModulator`]: weak-coherent source; empty pulses are lost
//!
//! ## Configuration
//!
//! Devices are normally built from a [`DeviceDescriptor`]:
//!
//! ```rust,ignore
//! use qnet_devices::{Device, DeviceDescriptor};
//!
//! let fiber = Device::from_descriptor(
//!     &DeviceDescriptor::fiber(10.0).with("attenuation_coefficient", 0.2),
//! )?;
//! ```

pub mod descriptor;
pub mod detector;
pub mod fiber;
pub mod laser;
pub mod loss;
pub mod modulator;

pub use descriptor::DeviceDescriptor;
pub use detector::{Detector, DetectorConfig};
pub use fiber::{Fiber, FiberConfig};
pub use laser::{Laser, LaserConfig};
pub use loss::LossModel;
pub use modulator::{IntensityModulator, ModulatorConfig};

use serde::{Deserialize, Serialize};

use qnet_core::{ConfigError, ConfigResult, QubitId, SharedProgram, SimRng, SimTime};

use crate::descriptor::ParamReader;

/// Qubits travelling together through a channel
///
/// Devices move qubits from `qubits` to `lost`; nothing ever moves back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumPayload {
    /// Qubits still in flight
    pub qubits: Vec<QubitId>,
    /// Qubits dropped along the way
    pub lost: Vec<QubitId>,
}

impl QuantumPayload {
    /// Payload carrying the given qubits
    pub fn new(qubits: Vec<QubitId>) -> Self {
        Self {
            qubits,
            lost: Vec::new(),
        }
    }

    /// Total qubits sent, surviving or not
    pub fn len(&self) -> usize {
        self.qubits.len() + self.lost.len()
    }

    /// Whether the payload carries no qubits at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every qubit has been lost
    pub fn is_lost(&self) -> bool {
        self.qubits.is_empty() && !self.lost.is_empty()
    }
}

/// Usage counters kept by every device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    /// Qubits that entered the device
    pub uses: u64,
    /// Qubits that passed with the expected outcome
    pub successes: u64,
    /// Qubits dropped by the device
    pub losses: u64,
    /// Detection events (detectors only)
    pub detections: u64,
    /// Detections caused by dark counts
    pub dark_counts: u64,
    /// Pulses carrying more than one photon
    pub multi_photon: u64,
}

impl DeviceStats {
    /// Add another device's counters to this one
    pub fn merge(&mut self, other: &DeviceStats) {
        self.uses += other.uses;
        self.successes += other.successes;
        self.losses += other.losses;
        self.detections += other.detections;
        self.dark_counts += other.dark_counts;
        self.multi_photon += other.multi_photon;
    }

    /// Fraction of uses that ended in a loss
    pub fn loss_rate(&self) -> f64 {
        if self.uses == 0 {
            0.0
        } else {
            self.losses as f64 / self.uses as f64
        }
    }
}

/// Counters of one device, labelled with where it sits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    /// Channel or agent the device is chained into
    pub owner: String,
    /// Index in the owner's chain
    pub position: usize,
    pub kind: String,
    pub stats: DeviceStats,
}

impl DeviceReport {
    /// Reports for every device in a chain
    pub fn collect(owner: &str, devices: &[Device]) -> Vec<DeviceReport> {
        devices
            .iter()
            .enumerate()
            .map(|(position, device)| DeviceReport {
                owner: owner.to_string(),
                position,
                kind: device.name().to_string(),
                stats: device.stats(),
            })
            .collect()
    }
}

/// What a device needs from its surroundings while a payload passes
pub struct DeviceEnv<'a> {
    /// Random stream of the channel or agent that owns the device
    pub rng: &'a mut SimRng,
    /// Trial program, for noise and loss measurements
    pub program: &'a SharedProgram,
}

/// A device in a channel's path
#[derive(Debug, Clone, PartialEq)]
pub enum Device {
    Fiber(Fiber),
    Laser(Laser),
    Detector(Detector),
    IntensityModulator(IntensityModulator),
}

impl Device {
    /// Build and validate a device from its descriptor
    pub fn from_descriptor(descriptor: &DeviceDescriptor) -> ConfigResult<Self> {
        let mut reader = ParamReader::new(descriptor);
        let device = match descriptor.kind.as_str() {
            "fiber" => Device::Fiber(Fiber::from_params(&mut reader)?),
            "laser" => Device::Laser(Laser::from_params(&mut reader)?),
            "detector" | "snspd" => Device::Detector(Detector::from_params(&mut reader)?),
            "intensity_modulator" => {
                Device::IntensityModulator(IntensityModulator::from_params(&mut reader)?)
            }
            other => return Err(ConfigError::UnknownDevice(other.to_string())),
        };
        reader.finish()?;
        Ok(device)
    }

    /// Build a device chain from descriptors
    pub fn chain(descriptors: &[DeviceDescriptor]) -> ConfigResult<Vec<Device>> {
        descriptors.iter().map(Device::from_descriptor).collect()
    }

    /// Device kind name
    pub fn name(&self) -> &'static str {
        match self {
            Device::Fiber(_) => "fiber",
            Device::Laser(_) => "laser",
            Device::Detector(_) => "detector",
            Device::IntensityModulator(_) => "intensity_modulator",
        }
    }

    /// Pass a payload through the device and return its processing delay
    pub fn apply(&mut self, payload: &mut QuantumPayload, env: &mut DeviceEnv<'_>) -> SimTime {
        match self {
            Device::Fiber(d) => d.apply(payload, env),
            Device::Laser(d) => d.apply(payload, env),
            Device::Detector(d) => d.apply(payload, env),
            Device::IntensityModulator(d) => d.apply(payload, env),
        }
    }

    /// Processing delay, independent of the payload
    pub fn delay(&self) -> SimTime {
        match self {
            Device::Fiber(d) => d.delay(),
            Device::Laser(d) => d.delay(),
            Device::Detector(d) => d.delay(),
            Device::IntensityModulator(_) => 0.0,
        }
    }

    /// Usage counters
    pub fn stats(&self) -> DeviceStats {
        match self {
            Device::Fiber(d) => d.stats(),
            Device::Laser(d) => d.stats(),
            Device::Detector(d) => d.stats(),
            Device::IntensityModulator(d) => d.stats(),
        }
    }

    /// Clear usage counters, keeping configuration
    pub fn reset(&mut self) {
        match self {
            Device::Fiber(d) => d.reset(),
            Device::Laser(d) => d.reset(),
            Device::Detector(d) => d.reset(),
            Device::IntensityModulator(d) => d.reset(),
        }
    }
}

/// Pass a payload through a chain of devices in order
///
/// Returns the summed processing delay. Devices later in the chain only see
/// the qubits that survived earlier ones.
pub fn run_chain(devices: &mut [Device], payload: &mut QuantumPayload, env: &mut DeviceEnv<'_>) -> SimTime {
    devices.iter_mut().map(|device| device.apply(payload, env)).sum()
}

/// Move each qubit for which `lose` returns true from `qubits` into `lost`
pub(crate) fn partition_losses(
    payload: &mut QuantumPayload,
    mut lose: impl FnMut(QubitId) -> bool,
) -> (u64, u64) {
    let mut kept = 0;
    let mut dropped = 0;
    for qubit in std::mem::take(&mut payload.qubits) {
        if lose(qubit) {
            payload.lost.push(qubit);
            dropped += 1;
        } else {
            payload.qubits.push(qubit);
            kept += 1;
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::seeded;

    #[test]
    fn test_unknown_device_kind() {
        let err = Device::from_descriptor(&DeviceDescriptor::new("beamsplitter")).unwrap_err();
        assert_eq!(err, ConfigError::UnknownDevice("beamsplitter".to_string()));
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let descriptor = DeviceDescriptor::fiber(5.0).with("attenuation", 0.2);
        assert!(matches!(
            Device::from_descriptor(&descriptor),
            Err(ConfigError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_zero_loss_chain_keeps_every_qubit() {
        let mut chain = Device::chain(&[
            DeviceDescriptor::laser(),
            DeviceDescriptor::fiber(0.0),
            DeviceDescriptor::detector(1.0),
        ])
        .unwrap();
        let program = SharedProgram::default();
        let mut rng = seeded(11);
        let mut env = DeviceEnv {
            rng: &mut rng,
            program: &program,
        };
        for round in 0..20 {
            let mut payload = QuantumPayload::new(vec![round, round + 100]);
            run_chain(&mut chain, &mut payload, &mut env);
            assert_eq!(payload.qubits, vec![round, round + 100]);
            assert!(payload.lost.is_empty());
        }
        assert_eq!(chain[1].stats().losses, 0);
        assert_eq!(chain[2].stats().detections, 40);
    }

    #[test]
    fn test_chain_delay_is_summed() {
        let mut chain = Device::chain(&[
            DeviceDescriptor::laser().with("pulse_length", 1e-9),
            DeviceDescriptor::fiber(2.998),
        ])
        .unwrap();
        let expected: f64 = chain.iter().map(Device::delay).sum();
        let program = SharedProgram::default();
        let mut rng = seeded(2);
        let mut env = DeviceEnv {
            rng: &mut rng,
            program: &program,
        };
        let mut payload = QuantumPayload::new(vec![0]);
        let delay = run_chain(&mut chain, &mut payload, &mut env);
        assert!((delay - expected).abs() < 1e-18);
        assert!((delay - (1e-9 + 1e-5)).abs() < 1e-15);
    }

    #[test]
    fn test_reset_is_idempotent_and_keeps_config() {
        let mut device = Device::from_descriptor(&DeviceDescriptor::fiber(40.0)).unwrap();
        let before = device.clone();
        let program = SharedProgram::default();
        let mut rng = seeded(4);
        let mut env = DeviceEnv {
            rng: &mut rng,
            program: &program,
        };
        let mut payload = QuantumPayload::new((0..10).collect());
        device.apply(&mut payload, &mut env);
        assert_eq!(device.stats().uses, 10);

        device.reset();
        assert_eq!(device.stats(), DeviceStats::default());
        assert_eq!(device, before);
        device.reset();
        assert_eq!(device, before);
    }

    #[test]
    fn test_payload_loss_flags() {
        let mut payload = QuantumPayload::new(vec![1, 2]);
        assert!(!payload.is_lost());
        let (kept, dropped) = partition_losses(&mut payload, |q| q == 1);
        assert_eq!((kept, dropped), (1, 1));
        assert_eq!(payload.len(), 2);
        partition_losses(&mut payload, |_| true);
        assert!(payload.is_lost());
    }

    #[test]
    fn test_stats_merge() {
        let mut total = DeviceStats::default();
        let one = DeviceStats {
            uses: 4,
            losses: 1,
            successes: 3,
            ..Default::default()
        };
        total.merge(&one);
        total.merge(&one);
        assert_eq!(total.uses, 8);
        assert_eq!(total.losses, 2);
        assert!((total.loss_rate() - 0.25).abs() < 1e-12);
    }
}
