//! Interfaces the two engines expose to the bridge.
//!
//! A shim for a concrete simulator implements these traits and forwards its native
//! callbacks to [`DiscreteSide`](crate::DiscreteSide) and
//! [`ContinuousSide`](crate::ContinuousSide).
use std::path::Path;

use crate::{
    bridge::{convert::Logic, port::PortDescriptor},
    BridgeError, VirtualTime,
};

/// Handle of a scheduled wake-up on the discrete engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WakeId(pub u64);

/// A signal value as the discrete engine sees it.
#[derive(Clone, Debug, PartialEq)]
pub enum SignalValue {
    Logic(Logic),
    Real(f64),
    /// Bit `i` of the vector is element `i`.
    Vector(Vec<Logic>),
}

/// The event-driven engine, called only from its own thread.
pub trait DiscreteHost {
    /// Current simulation time in ticks.
    fn now(&self) -> VirtualTime;

    /// Ports of the instance at `instance`, or `None` if there is no such instance.
    fn instance_ports(&self, instance: &str) -> Option<Vec<PortDescriptor>>;

    /// Ask for value-change callbacks on `port`.
    fn watch(&mut self, port: &PortDescriptor);

    fn read_signal(&self, name: &str) -> Option<SignalValue>;

    fn write_signal(&mut self, name: &str, value: SignalValue);

    /// Schedule a wake-up `delay` ticks from now. A delay of 0 fires later in the current tick.
    fn schedule_wake(&mut self, delay: VirtualTime) -> WakeId;

    fn cancel_wake(&mut self, id: WakeId);

    /// End the simulation with `code`.
    fn finish(&mut self, code: i32);
}

/// Lifecycle control of the continuous engine.
pub trait ContinuousSolver {
    fn load(&mut self, netlist: &Path) -> Result<(), BridgeError>;

    /// Start integrating on the solver's own background thread.
    fn start(&mut self) -> Result<(), BridgeError>;

    fn is_running(&self) -> bool;

    fn halt(&mut self);

    fn dump(&mut self, path: &Path) -> Result<(), BridgeError>;
}

/// Read access to the solver's most recent accepted sample.
pub trait SampleProbe {
    /// Latest value of a quantity such as `v(out)`.
    fn latest_sample(&self, quantity: &str) -> Option<f64>;
}

impl<F> SampleProbe for F
where
    F: Fn(&str) -> Option<f64>,
{
    fn latest_sample(&self, quantity: &str) -> Option<f64> {
        self(quantity)
    }
}
