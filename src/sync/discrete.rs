use tracing::{debug, info, warn};

use super::{
    redo::{EdgeArming, SyncState},
    Coupling,
};
use crate::{
    barrier::EngineId,
    bridge::port::{bit_name, PortDirection, SignalKind},
    host::{DiscreteHost, SignalValue, WakeId},
    BridgeError, VirtualTime,
};

/// Delay until the next apply point: the tick where the solver's current step ends.
pub fn next_wake_delay(hint: Option<VirtualTime>, now: VirtualTime) -> VirtualTime {
    hint.map_or(1, |hint| hint.saturating_sub(now)).max(1)
}

/// Discrete-engine half of the protocol. Lives on the discrete engine's thread.
pub struct DiscreteSide {
    coupling: Coupling,
    arming: EdgeArming,
    next_wake: Option<WakeId>,
    state: SyncState,
}

impl DiscreteSide {
    pub fn new(coupling: Coupling) -> Self {
        Self {
            coupling,
            arming: EdgeArming::default(),
            next_wake: None,
            state: SyncState::Idle,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn coupling(&self) -> &Coupling {
        &self.coupling
    }

    /// First rendezvous at tick 1, then a zero-delay wake to enter the regular cycle.
    pub fn on_start<H>(&mut self, host: &mut H) -> Result<(), BridgeError>
    where
        H: DiscreteHost + ?Sized,
    {
        self.state = SyncState::AwaitingContinuousCatchUp;
        if !self.coupling.barrier.publish_and_wait(EngineId::Discrete, 1) {
            self.state = SyncState::Shutdown;
            return Err(BridgeError::Shutdown);
        }
        self.state = SyncState::Idle;
        self.next_wake = Some(host.schedule_wake(0));
        debug!("initial rendezvous complete");
        Ok(())
    }

    /// Value-change callback of a watched discrete-driven signal.
    ///
    /// `name` must match the registered port name up to case; vectors update every bit.
    pub fn on_value_change<H>(&mut self, host: &mut H, name: &str, value: &SignalValue)
    where
        H: DiscreteHost + ?Sized,
    {
        if self.state == SyncState::Shutdown {
            return;
        }
        // the solver may be rolled back, so the pending wake is recomputed at the apply point
        if let Some(id) = self.next_wake.take() {
            host.cancel_wake(id);
        }
        let now = host.now();
        if self.arming.arm(now) {
            host.schedule_wake(0);
            debug!(now, signal = name, "armed re-synchronization");
        }
        self.apply_input(&name.to_lowercase(), value);
    }

    /// Wake-up callback; the apply point of the protocol. Returns the resulting state.
    pub fn on_wake<H>(&mut self, host: &mut H) -> SyncState
    where
        H: DiscreteHost + ?Sized,
    {
        if self.state == SyncState::Shutdown {
            return self.state;
        }
        self.next_wake = None;
        let barrier = &self.coupling.barrier;
        let now = host.now();
        let armed = self.arming.take();

        if armed && barrier.read_time(EngineId::Continuous) > now {
            debug!(
                now,
                continuous = barrier.read_time(EngineId::Continuous),
                "edge inside a committed step, requesting redo"
            );
            // the flag must be visible before the publish can release a waiting solver
            barrier.set_redo(true);
            barrier.publish_no_wait(EngineId::Continuous, now);
            self.state = SyncState::RedoPending;
        } else {
            self.state = SyncState::AwaitingContinuousCatchUp;
        }

        if !barrier.publish_and_wait(EngineId::Discrete, now + 1) {
            info!(now, "barrier shut down, discrete side stops");
            self.state = SyncState::Shutdown;
            return self.state;
        }
        self.state = SyncState::Idle;

        if armed {
            self.refresh_inputs(host);
        }
        self.apply_outputs(host);

        let delay = next_wake_delay(self.coupling.barrier.next_step_hint(), now);
        if delay == 1 {
            debug!(now, "small step");
        }
        self.next_wake = Some(host.schedule_wake(delay));
        self.state
    }

    fn apply_input(&self, name: &str, value: &SignalValue) {
        let registry = &self.coupling.registry;
        let converter = &self.coupling.converter;
        // lookup failures are already logged by the registry
        match value {
            SignalValue::Logic(level) => {
                let _ = registry.update_from_discrete(name, converter.digital_to_analog(*level));
            }
            SignalValue::Real(volts) => {
                let _ = registry.update_from_discrete(name, *volts);
            }
            SignalValue::Vector(bits) if bits.len() == 1 => {
                let _ = registry.update_from_discrete(name, converter.digital_to_analog(bits[0]));
            }
            SignalValue::Vector(bits) => {
                for (i, level) in bits.iter().enumerate() {
                    let _ = registry.update_from_discrete(
                        &bit_name(name, i as u32),
                        converter.digital_to_analog(*level),
                    );
                }
            }
        }
    }

    /// Re-read every discrete-driven port from the host.
    fn refresh_inputs<H>(&self, host: &H)
    where
        H: DiscreteHost + ?Sized,
    {
        for port in self.coupling.registry.ports(PortDirection::DiscreteDrivesContinuous) {
            match host.read_signal(port.name()) {
                Some(value) => self.apply_input(port.name(), &value),
                None => warn!(port = port.name(), "digital input not readable"),
            }
        }
    }

    /// Push changed continuous-driven values into the discrete engine.
    fn apply_outputs<H>(&self, host: &mut H)
    where
        H: DiscreteHost + ?Sized,
    {
        for changed in self
            .coupling
            .registry
            .drain_changed(PortDirection::ContinuousDrivesDiscrete)
        {
            let value = match changed.kind {
                SignalKind::RealVar => SignalValue::Real(changed.value),
                _ => SignalValue::Logic(self.coupling.converter.analog_to_digital(changed.value)),
            };
            debug!(port = changed.name.as_str(), ?value, "updated digital output");
            host.write_signal(&changed.name, value);
        }
    }
}
