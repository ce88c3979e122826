//! State of the redo handshake.
use crate::VirtualTime;

/// Where the discrete side stands in the synchronization protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Clocks agree; nothing is outstanding.
    Idle,
    /// Blocked in the barrier until the continuous engine reaches the published tick.
    AwaitingContinuousCatchUp,
    /// An edge landed inside a step the continuous engine already took; it must shorten it.
    RedoPending,
    /// The barrier was shut down. No further wakes are scheduled.
    Shutdown,
}

/// Tracks the zero-delay wake armed by signal edges.
///
/// Any number of edges within one tick arm a single wake.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeArming {
    armed_at: Option<VirtualTime>,
}

impl EdgeArming {
    /// Arm for `now`. Returns `true` if a new wake must be scheduled.
    pub fn arm(&mut self, now: VirtualTime) -> bool {
        if self.armed_at == Some(now) {
            return false;
        }
        self.armed_at = Some(now);
        true
    }

    /// Disarm, returning whether an edge was pending.
    pub fn take(&mut self) -> bool {
        self.armed_at.take().is_some()
    }
}

/// Shorten a step so it ends at `target` instead of overshooting it.
///
/// `time` is where the solver stands and `old_delta` the step that carried it there, all in
/// ticks. The result never drops below one tick.
pub fn shortened_delta(
    target: VirtualTime,
    time: VirtualTime,
    old_delta: VirtualTime,
) -> VirtualTime {
    let overshoot = time.saturating_sub(target);
    old_delta.saturating_sub(overshoot).max(1)
}
