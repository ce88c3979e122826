use std::path::PathBuf;

use crate::{bridge::convert::LevelConverter, BridgeError, VirtualTime};

pub const ENV_NETLIST: &str = "SPICE_NETLIST";
pub const ENV_INSTANCES: &str = "HDL_INSTANCE";
pub const ENV_VCC: &str = "VCC";
pub const ENV_THRESHOLD_LOW: &str = "LOGIC_THRESHOLD_LOW";
pub const ENV_THRESHOLD_HIGH: &str = "LOGIC_THRESHOLD_HIGH";
pub const ENV_MIN_CHANGE: &str = "MIN_ANALOG_CHANGE";

const DEFAULT_VCC: f64 = 1.0;
const DEFAULT_LOW_FRACTION: f64 = 0.3;
const DEFAULT_HIGH_FRACTION: f64 = 0.7;
const DEFAULT_MIN_CHANGE: f64 = 1e-9;
const DEFAULT_TIME_PRECISION: u64 = 1_000_000_000_000;

/// Run-wide settings of a co-simulation session.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub spice_netlist: PathBuf,
    pub hdl_instances: Vec<String>,
    /// Prefix port names with their instance path. Needed once several instances are coupled.
    pub full_path_discovery: bool,
    pub vcc: f64,
    pub logic_threshold_low: f64,
    pub logic_threshold_high: f64,
    pub min_analog_change: f64,
    /// Ticks per second.
    pub time_precision: u64,
    /// Where the solver writes its results at the end of the run, if anywhere.
    pub dump_path: Option<PathBuf>,
}

impl BridgeConfig {
    /// Create a configuration for one netlist and the given design instances
    pub fn new<I, S>(spice_netlist: impl Into<PathBuf>, hdl_instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            spice_netlist: spice_netlist.into(),
            hdl_instances: hdl_instances.into_iter().map(Into::into).collect(),
            full_path_discovery: false,
            vcc: DEFAULT_VCC,
            logic_threshold_low: DEFAULT_LOW_FRACTION * DEFAULT_VCC,
            logic_threshold_high: DEFAULT_HIGH_FRACTION * DEFAULT_VCC,
            min_analog_change: DEFAULT_MIN_CHANGE,
            time_precision: DEFAULT_TIME_PRECISION,
            dump_path: Some(PathBuf::from("dump.raw")),
        }
    }

    pub fn with_full_path_discovery(mut self, enabled: bool) -> Self {
        self.full_path_discovery = enabled;
        self
    }

    /// Set the supply voltage and reset both thresholds to 30% / 70% of it
    pub fn with_vcc(mut self, vcc: f64) -> Self {
        self.vcc = vcc;
        self.logic_threshold_low = DEFAULT_LOW_FRACTION * vcc;
        self.logic_threshold_high = DEFAULT_HIGH_FRACTION * vcc;
        self
    }

    pub fn with_logic_thresholds(mut self, low: f64, high: f64) -> Self {
        self.logic_threshold_low = low;
        self.logic_threshold_high = high;
        self
    }

    pub fn with_min_analog_change(mut self, min_change: f64) -> Self {
        self.min_analog_change = min_change;
        self
    }

    pub fn with_time_precision(mut self, ticks_per_second: u64) -> Self {
        self.time_precision = ticks_per_second;
        self
    }

    /// Set the precision from a host exponent, e.g. `-12` for picosecond ticks
    pub fn with_time_precision_exponent(mut self, exponent: i32) -> Result<Self, BridgeError> {
        let invalid = || BridgeError::InvalidSetting {
            name: "time precision exponent",
            value: exponent.to_string(),
        };
        if exponent > 0 {
            return Err(invalid());
        }
        self.time_precision = 10u64
            .checked_pow(exponent.unsigned_abs())
            .ok_or_else(invalid)?;
        Ok(self)
    }

    pub fn with_dump_path(mut self, path: Option<PathBuf>) -> Self {
        self.dump_path = path;
        self
    }

    /// Read settings through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let netlist = lookup(ENV_NETLIST).ok_or(BridgeError::MissingSetting(ENV_NETLIST))?;
        let instances = lookup(ENV_INSTANCES).ok_or(BridgeError::MissingSetting(ENV_INSTANCES))?;
        let (hdl_instances, full_path) = parse_instance_names(&instances);

        let vcc = optional_number(&lookup, ENV_VCC)?.unwrap_or(DEFAULT_VCC);
        let low = optional_number(&lookup, ENV_THRESHOLD_LOW)?
            .unwrap_or(DEFAULT_LOW_FRACTION * vcc);
        let high = optional_number(&lookup, ENV_THRESHOLD_HIGH)?
            .unwrap_or(DEFAULT_HIGH_FRACTION * vcc);
        let min_change = optional_number(&lookup, ENV_MIN_CHANGE)?.unwrap_or(DEFAULT_MIN_CHANGE);

        let config = Self::new(netlist, hdl_instances)
            .with_full_path_discovery(full_path)
            .with_vcc(vcc)
            .with_logic_thresholds(low, high)
            .with_min_analog_change(min_change);
        config.validate()?;
        Ok(config)
    }

    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, BridgeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.spice_netlist.as_os_str().is_empty() {
            return Err(BridgeError::Config(
                "SPICE netlist path cannot be empty".to_string(),
            ));
        }

        if self.hdl_instances.is_empty() {
            return Err(BridgeError::Config(
                "HDL instance names cannot be empty".to_string(),
            ));
        }

        if self.hdl_instances.iter().any(|name| name.is_empty()) {
            return Err(BridgeError::Config(
                "HDL instance name cannot be empty".to_string(),
            ));
        }

        LevelConverter::from_config(self)?;

        if !(self.min_analog_change >= 0.0) || !self.min_analog_change.is_finite() {
            return Err(BridgeError::Config(
                "minimum analog change must be a finite non-negative number".to_string(),
            ));
        }

        if self.time_precision == 0 {
            return Err(BridgeError::Config(
                "time precision must be at least one tick per second".to_string(),
            ));
        }

        Ok(())
    }

    pub fn tick_scale(&self) -> TickScale {
        TickScale::new(self.time_precision)
    }
}

/// Split a comma-separated instance list. Any comma switches on full-path discovery.
fn parse_instance_names(raw: &str) -> (Vec<String>, bool) {
    if raw.is_empty() {
        return (Vec::new(), false);
    }
    let full_path = raw.contains(',');
    let mut names: Vec<String> = raw.split(',').map(|s| s.trim().to_string()).collect();
    if full_path && names.last().is_some_and(|last| last.is_empty()) {
        names.pop();
    }
    (names, full_path)
}

fn optional_number<F>(lookup: &F, name: &'static str) -> Result<Option<f64>, BridgeError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| BridgeError::InvalidSetting { name, value: raw }),
    }
}

/// Converts between solver seconds and integer ticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TickScale {
    ticks_per_second: u64,
}

impl TickScale {
    pub fn new(ticks_per_second: u64) -> Self {
        Self {
            ticks_per_second: ticks_per_second.max(1),
        }
    }

    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    /// Round to the nearest tick. Negative times clamp to zero.
    #[inline]
    pub fn to_ticks(&self, seconds: f64) -> VirtualTime {
        (seconds * self.ticks_per_second as f64).round() as VirtualTime
    }

    #[inline]
    pub fn to_seconds(&self, ticks: VirtualTime) -> f64 {
        ticks as f64 / self.ticks_per_second as f64
    }
}
