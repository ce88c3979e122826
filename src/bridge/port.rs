use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// `f64` stored in an `AtomicU64` through its bit pattern.
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(bytemuck::cast::<f64, u64>(value)),
        }
    }

    #[inline(always)]
    pub fn load(&self) -> f64 {
        bytemuck::cast::<u64, f64>(self.bits.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub fn store(&self, value: f64) {
        self.bits
            .store(bytemuck::cast::<f64, u64>(value), Ordering::Release);
    }
}

impl std::fmt::Debug for AtomicF64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicF64").field(&self.load()).finish()
    }
}

/// Which engine drives a port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Written by the discrete engine, sampled by the continuous one (an analog input).
    DiscreteDrivesContinuous,
    /// Computed by the continuous engine, applied to the discrete one (an analog output).
    ContinuousDrivesDiscrete,
    /// Driven from both sides. Never registered.
    Bidirectional,
}

/// Underlying signal kind of a port on the discrete side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Multi-valued logic net.
    Net,
    /// Register.
    Reg,
    /// Real-valued variable; carries voltages without logic conversion.
    RealVar,
    /// Anything else the host reports. Never registered.
    Other,
}

impl SignalKind {
    pub fn is_real(self) -> bool {
        matches!(self, SignalKind::RealVar)
    }
}

/// What the discrete host reports about one port of a design instance.
#[derive(Clone, Debug, PartialEq)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
    pub kind: SignalKind,
    /// `Some(n)` for an `n`-bit vector, `None` for a scalar.
    pub width: Option<u32>,
    /// Hierarchical path of the owning instance, used by full-path naming.
    pub instance_path: Option<String>,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>, direction: PortDirection, kind: SignalKind) -> Self {
        Self {
            name: name.into(),
            direction,
            kind,
            width: None,
            instance_path: None,
        }
    }

    /// Widths of 0 and 1 are treated as scalars.
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = if width > 1 { Some(width) } else { None };
        self
    }

    pub fn within_instance(mut self, path: impl Into<String>) -> Self {
        self.instance_path = Some(path.into());
        self
    }

    /// Lower-cased registry name, prefixed with the instance path when `full_path` is set.
    pub fn qualified_name(&self, full_path: bool) -> String {
        match (&self.instance_path, full_path) {
            (Some(path), true) => format!("{path}.{}", self.name).to_lowercase(),
            _ => self.name.to_lowercase(),
        }
    }
}

/// Name of bit `index` of the vector `base`.
pub fn bit_name(base: &str, index: u32) -> String {
    format!("{base}[{index}]")
}

/// One scalar signal endpoint held by the [`PortRegistry`](super::PortRegistry).
#[derive(Debug)]
pub struct Port {
    name: String,
    base_name: String,
    direction: PortDirection,
    kind: SignalKind,
    width: u32,
    bit_index: Option<u32>,
    value: AtomicF64,
    changed: AtomicBool,
}

impl Port {
    /// New ports start at 0.0 and flagged as changed, so their first value is always propagated.
    pub(crate) fn new(
        name: String,
        base_name: String,
        direction: PortDirection,
        kind: SignalKind,
        width: u32,
        bit_index: Option<u32>,
    ) -> Self {
        Self {
            name,
            base_name,
            direction,
            kind,
            width,
            bit_index,
            value: AtomicF64::new(0.0),
            changed: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn bit_index(&self) -> Option<u32> {
        self.bit_index
    }

    pub fn value(&self) -> f64 {
        self.value.load()
    }

    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    /// Store `value` only if it moved by more than `min_change`; returns whether it was stored.
    ///
    /// The value is written before the flag is raised, so a consumer that clears the flag
    /// always reads a value at least as new as the one that raised it.
    pub(crate) fn store_debounced(&self, value: f64, min_change: f64) -> bool {
        let old = self.value.load();
        if (value - old).abs() > min_change {
            self.value.store(value);
            self.changed.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Clear the changed flag, returning whether it was set.
    pub(crate) fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }
}

/// A port value handed out by `drain_changed`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangedPort {
    pub name: String,
    pub value: f64,
    pub kind: SignalKind,
}

#[cfg(test)]
mod port_tests {
    use super::*;
    use PortDirection::{ContinuousDrivesDiscrete, DiscreteDrivesContinuous};

    #[test]
    fn test_atomic_f64_keeps_bit_pattern() {
        let cell = AtomicF64::new(0.0);
        assert_eq!(cell.load(), 0.0);
        cell.store(-1.25e-9);
        assert_eq!(cell.load(), -1.25e-9);
        cell.store(f64::INFINITY);
        assert_eq!(cell.load(), f64::INFINITY);
        cell.store(f64::NAN);
        assert!(cell.load().is_nan());
    }

    #[test]
    fn test_descriptor_naming() {
        let desc = PortDescriptor::new("DataIn", DiscreteDrivesContinuous, SignalKind::Net)
            .within_instance("TB.Dut");
        assert_eq!(desc.qualified_name(false), "datain");
        assert_eq!(desc.qualified_name(true), "tb.dut.datain");

        let bare = PortDescriptor::new("Q", ContinuousDrivesDiscrete, SignalKind::Reg);
        assert_eq!(bare.qualified_name(true), "q");
        assert_eq!(bit_name("bus", 3), "bus[3]");
    }

    #[test]
    fn test_width_one_is_scalar() {
        let desc = PortDescriptor::new("a", DiscreteDrivesContinuous, SignalKind::Net);
        assert_eq!(desc.clone().with_width(1).width, None);
        assert_eq!(desc.clone().with_width(0).width, None);
        assert_eq!(desc.with_width(8).width, Some(8));
    }

    #[test]
    fn test_new_port_starts_changed_at_zero() {
        let port = Port::new(
            "out".into(),
            "out".into(),
            PortDirection::ContinuousDrivesDiscrete,
            SignalKind::Net,
            1,
            None,
        );
        assert_eq!(port.value(), 0.0);
        assert!(port.take_changed());
        assert!(!port.take_changed());
    }

    #[test]
    fn test_debounce() {
        let port = Port::new(
            "out".into(),
            "out".into(),
            PortDirection::ContinuousDrivesDiscrete,
            SignalKind::RealVar,
            1,
            None,
        );
        port.take_changed();
        assert!(!port.store_debounced(0.05, 0.1));
        assert_eq!(port.value(), 0.0);
        assert!(!port.is_changed());

        assert!(port.store_debounced(0.5, 0.1));
        assert_eq!(port.value(), 0.5);
        assert!(port.is_changed());

        // exactly the threshold is not enough
        port.take_changed();
        assert!(!port.store_debounced(0.75, 0.25));
        assert!(!port.is_changed());
    }
}
