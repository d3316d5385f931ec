//! Loss curves for attenuating media
//!
//! Survival probability falls monotonically with length and attenuation
//! coefficient. The curve is selectable per device.

use serde::{Deserialize, Serialize};

/// Shape of the survival curve of an attenuating medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossModel {
    /// Coefficient in dB/km: `10^(-|α|·L / 10)`
    #[default]
    Decibel,
    /// Coefficient in 1/km: `e^(-|α|·L)`
    Exponential,
}

impl LossModel {
    /// Parameter code used in device descriptors
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LossModel::Decibel),
            1 => Some(LossModel::Exponential),
            _ => None,
        }
    }

    /// Probability that a photon survives `length` km
    ///
    /// The sign of the coefficient is ignored, so both `-0.16` and `0.16`
    /// describe the same fiber.
    pub fn survival(&self, attenuation_coefficient: f64, length: f64) -> f64 {
        let exponent = attenuation_coefficient.abs() * length.max(0.0);
        let survival = match self {
            LossModel::Decibel => 10f64.powf(-exponent / 10.0),
            LossModel::Exponential => (-exponent).exp(),
        };
        survival.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_length_never_loses() {
        assert_eq!(LossModel::Decibel.survival(0.16, 0.0), 1.0);
        assert_eq!(LossModel::Exponential.survival(0.16, 0.0), 1.0);
    }

    #[test]
    fn test_decibel_curve() {
        // 50 km at 0.2 dB/km is 10 dB, i.e. a tenth survives
        let s = LossModel::Decibel.survival(-0.2, 50.0);
        assert!((s - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_survival_is_monotonic() {
        for model in [LossModel::Decibel, LossModel::Exponential] {
            let mut previous = 1.0;
            for km in 1..100 {
                let s = model.survival(0.16, km as f64);
                assert!(s < previous);
                previous = s;
            }
            assert!(model.survival(0.3, 10.0) < model.survival(0.1, 10.0));
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(LossModel::from_code(0), Some(LossModel::Decibel));
        assert_eq!(LossModel::from_code(1), Some(LossModel::Exponential));
        assert_eq!(LossModel::from_code(2), None);
    }
}
