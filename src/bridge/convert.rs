//! Mapping between logic levels and voltages.
use crate::{config::BridgeConfig, BridgeError};

/// Three-valued logic level seen on the discrete side.
///
/// High impedance and other undriven states are folded into `Unknown` by the host shim.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Logic {
    Low,
    High,
    Unknown,
}

/// Converts between [`Logic`] levels and voltages under configured thresholds.
///
/// Construction guarantees `0 <= low < high <= vcc`, so `analog_to_digital` is monotone:
/// raising the voltage can only move the result from `Low` to `Unknown` to `High`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LevelConverter {
    vcc: f64,
    threshold_low: f64,
    threshold_high: f64,
}

impl LevelConverter {
    pub fn new(vcc: f64, threshold_low: f64, threshold_high: f64) -> Result<Self, BridgeError> {
        if !(vcc > 0.0) || !vcc.is_finite() {
            return Err(BridgeError::Config("VCC voltage must be positive".to_string()));
        }
        if !(threshold_low < threshold_high) {
            return Err(BridgeError::Config(
                "logic threshold low must be less than high".to_string(),
            ));
        }
        if threshold_low < 0.0 || threshold_high > vcc {
            return Err(BridgeError::Config(
                "logic thresholds must be within [0, VCC]".to_string(),
            ));
        }
        Ok(Self {
            vcc,
            threshold_low,
            threshold_high,
        })
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self, BridgeError> {
        Self::new(
            config.vcc,
            config.logic_threshold_low,
            config.logic_threshold_high,
        )
    }

    /// Low drives 0 V, high drives VCC, anything undefined sits at mid-rail.
    #[inline]
    pub fn digital_to_analog(&self, level: Logic) -> f64 {
        match level {
            Logic::Low => 0.0,
            Logic::High => self.vcc,
            Logic::Unknown => 0.5 * self.vcc,
        }
    }

    #[inline]
    pub fn analog_to_digital(&self, voltage: f64) -> Logic {
        if voltage < self.threshold_low {
            Logic::Low
        } else if voltage > self.threshold_high {
            Logic::High
        } else {
            Logic::Unknown
        }
    }
}
