//! Device descriptors
//!
//! A descriptor is the configuration-file form of a device: a kind name plus
//! named numeric parameters. Building a [`Device`](crate::Device) from a
//! descriptor validates every parameter; unknown parameter names and
//! out-of-range values are configuration errors.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use qnet_core::{ConfigError, ConfigResult};

/// Configuration-file description of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDescriptor {
    /// Device kind: `fiber`, `laser`, `detector` or `intensity_modulator`
    pub kind: String,
    /// Named numeric parameters
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl DeviceDescriptor {
    /// Descriptor with no parameters (all defaults)
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    /// Set a parameter
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Fiber of the given length in km
    pub fn fiber(length: f64) -> Self {
        Self::new("fiber").with("length", length)
    }

    /// Laser source with default pulse length and photon expectation
    pub fn laser() -> Self {
        Self::new("laser")
    }

    /// Single-photon detector with the given efficiency
    pub fn detector(detection_efficiency: f64) -> Self {
        Self::new("detector").with("detection_efficiency", detection_efficiency)
    }

    /// Intensity modulator producing `average_photons` per pulse on average
    pub fn intensity_modulator(average_photons: f64) -> Self {
        Self::new("intensity_modulator").with("average_photons", average_photons)
    }
}

/// Reads parameters off a descriptor, tracking which names were recognized
pub(crate) struct ParamReader<'a> {
    device: &'a str,
    params: &'a BTreeMap<String, f64>,
    seen: BTreeSet<&'static str>,
}

impl<'a> ParamReader<'a> {
    pub(crate) fn new(descriptor: &'a DeviceDescriptor) -> Self {
        Self {
            device: &descriptor.kind,
            params: &descriptor.params,
            seen: BTreeSet::new(),
        }
    }

    fn invalid(&self, name: &str, value: f64, reason: &str) -> ConfigError {
        ConfigError::InvalidParameter {
            device: self.device.to_string(),
            parameter: name.to_string(),
            value,
            reason: reason.to_string(),
        }
    }

    /// Any finite value
    pub(crate) fn number(&mut self, name: &'static str, default: f64) -> ConfigResult<f64> {
        self.seen.insert(name);
        let value = self.params.get(name).copied().unwrap_or(default);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.invalid(name, value, "must be finite"))
        }
    }

    /// A finite value >= 0
    pub(crate) fn non_negative(&mut self, name: &'static str, default: f64) -> ConfigResult<f64> {
        let value = self.number(name, default)?;
        if value >= 0.0 {
            Ok(value)
        } else {
            Err(self.invalid(name, value, "must not be negative"))
        }
    }

    /// A finite value > 0
    pub(crate) fn positive(&mut self, name: &'static str, default: f64) -> ConfigResult<f64> {
        let value = self.number(name, default)?;
        if value > 0.0 {
            Ok(value)
        } else {
            Err(self.invalid(name, value, "must be positive"))
        }
    }

    /// A value in `[0, 1]`
    pub(crate) fn probability(&mut self, name: &'static str, default: f64) -> ConfigResult<f64> {
        let value = self.number(name, default)?;
        if (0.0..=1.0).contains(&value) {
            Ok(value)
        } else {
            Err(self.invalid(name, value, "must be between 0 and 1"))
        }
    }

    /// A 0/1 flag
    pub(crate) fn flag(&mut self, name: &'static str, default: bool) -> ConfigResult<bool> {
        let value = self.number(name, if default { 1.0 } else { 0.0 })?;
        match value {
            v if v == 0.0 => Ok(false),
            v if v == 1.0 => Ok(true),
            v => Err(self.invalid(name, v, "must be 0 or 1")),
        }
    }

    /// A small non-negative integer code
    pub(crate) fn code(&mut self, name: &'static str, default: u8, max: u8) -> ConfigResult<u8> {
        let value = self.number(name, f64::from(default))?;
        if value.fract() == 0.0 && (0.0..=f64::from(max)).contains(&value) {
            Ok(value as u8)
        } else {
            Err(self.invalid(name, value, "is not a recognized option"))
        }
    }

    /// Fail on any parameter that was never read
    pub(crate) fn finish(self) -> ConfigResult<()> {
        match self.params.keys().find(|k| !self.seen.contains(k.as_str())) {
            Some(unknown) => Err(ConfigError::UnknownParameter {
                device: self.device.to_string(),
                parameter: unknown.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_rejects_unknown() {
        let descriptor = DeviceDescriptor::new("fiber").with("length", 1.0).with("colour", 2.0);
        let mut reader = ParamReader::new(&descriptor);
        assert_eq!(reader.non_negative("length", 0.0).unwrap(), 1.0);
        let err = reader.finish().unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownParameter {
                device: "fiber".to_string(),
                parameter: "colour".to_string(),
            }
        );
    }

    #[test]
    fn test_reader_ranges() {
        let descriptor = DeviceDescriptor::new("detector")
            .with("p", 1.5)
            .with("flag", 0.5)
            .with("neg", -1.0);
        let mut reader = ParamReader::new(&descriptor);
        assert!(reader.probability("p", 0.0).is_err());
        assert!(reader.flag("flag", true).is_err());
        assert!(reader.non_negative("neg", 0.0).is_err());
        assert!(reader.positive("missing", 2.0).is_ok());
    }

    #[test]
    fn test_descriptor_json_shape() {
        let json = r#"{ "kind": "fiber", "params": { "length": 25.0 } }"#;
        let descriptor: DeviceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor, DeviceDescriptor::fiber(25.0));

        let bad = r#"{ "kind": "fiber", "length": 25.0 }"#;
        assert!(serde_json::from_str::<DeviceDescriptor>(bad).is_err());
    }
}
