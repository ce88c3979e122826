use tracing::{debug, trace};

use super::{redo::{shortened_delta, SyncState}, Coupling};
use crate::{
    barrier::EngineId,
    bridge::port::PortDirection,
    host::SampleProbe,
    BridgeError,
};

/// Point in the solver's step at which the sync callback fires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepLocation {
    /// A step to `time` was computed and may still be rejected.
    Begin,
    /// `time` was accepted; `delta` is the next step the solver proposes.
    End,
}

/// Arguments of the solver's per-step sync callback. Times are in seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepSync {
    pub time: f64,
    pub delta: f64,
    pub old_delta: f64,
    /// Set when the solver is already redoing a step of its own accord.
    pub redo_step: bool,
    pub location: StepLocation,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StepDecision {
    Proceed,
    /// Discard the step and recompute it from `time - old_delta` with `delta` seconds.
    Redo { delta: f64 },
}

/// Continuous-engine half of the protocol. Cheap to clone; every clone shares one coupling.
#[derive(Clone)]
pub struct ContinuousSide {
    coupling: Coupling,
}

impl ContinuousSide {
    pub fn new(coupling: Coupling) -> Self {
        Self { coupling }
    }

    pub fn coupling(&self) -> &Coupling {
        &self.coupling
    }

    pub fn is_shutdown(&self) -> bool {
        self.coupling.barrier.is_shutdown()
    }

    pub fn state(&self) -> SyncState {
        let barrier = &self.coupling.barrier;
        if barrier.is_shutdown() {
            SyncState::Shutdown
        } else if barrier.needs_redo() {
            SyncState::RedoPending
        } else {
            SyncState::Idle
        }
    }

    /// Per-step sync callback. Never blocks.
    pub fn on_step_sync<P>(&self, sync: &StepSync, probe: &P) -> StepDecision
    where
        P: SampleProbe + ?Sized,
    {
        if sync.redo_step {
            return StepDecision::Proceed;
        }
        let barrier = &self.coupling.barrier;
        let scale = &self.coupling.scale;
        let time = scale.to_ticks(sync.time);
        let delta = scale.to_ticks(sync.delta);
        let published = barrier.read_time(EngineId::Continuous);
        trace!(time, delta, published, location = ?sync.location, "step sync");

        if published > time.saturating_add(delta) {
            return StepDecision::Proceed;
        }

        match sync.location {
            StepLocation::Begin if barrier.needs_redo() => {
                // the provisional time published by the discrete side
                let target = published;
                if time < target {
                    debug!(time, target, "step ends before the edge, redo deferred");
                    return StepDecision::Proceed;
                }
                let old_delta = scale.to_ticks(sync.old_delta);
                let new_delta = shortened_delta(target, time, old_delta);
                barrier.set_redo(false);
                debug!(time, target, old_delta, new_delta, "redo step");
                StepDecision::Redo {
                    delta: scale.to_seconds(new_delta),
                }
            }
            StepLocation::Begin => StepDecision::Proceed,
            StepLocation::End => {
                let hint = time.saturating_add(delta);
                barrier.set_next_step_hint(hint);
                trace!(hint, "next step hint");
                self.refresh_outputs(probe);
                StepDecision::Proceed
            }
        }
    }

    /// Read every continuous-driven port's `v(<name>)` from the probe under the debounce rule.
    ///
    /// Returns how many ports changed.
    pub fn refresh_outputs<P>(&self, probe: &P) -> usize
    where
        P: SampleProbe + ?Sized,
    {
        let registry = &self.coupling.registry;
        let mut updated = 0;
        for port in registry.ports(PortDirection::ContinuousDrivesDiscrete) {
            if let Some(value) = probe.latest_sample(&format!("v({})", port.name())) {
                let old = port.value();
                if port.store_debounced(value, registry.min_change()) {
                    debug!(port = port.name(), old, new = value, "analog output updated");
                    updated += 1;
                }
            }
        }
        updated
    }

    /// Source sampling callback: the value the solver should drive for `source` at `time`.
    ///
    /// The first character of `source` is the device designator and is dropped. Unless a
    /// redo is pending this first waits for the discrete engine to reach `time`.
    pub fn on_source_sample(&self, source: &str, time: f64) -> Result<f64, BridgeError> {
        let barrier = &self.coupling.barrier;
        if !barrier.needs_redo() {
            let ticks = self.coupling.scale.to_ticks(time);
            if !barrier.publish_and_wait(EngineId::Continuous, ticks) {
                trace!(source, "sample after shutdown");
            }
        }
        let name: String = source.chars().skip(1).collect::<String>().to_lowercase();
        self.coupling.registry.read_value(&name)
    }
}
