//! Two-party virtual-time barrier shared by the discrete and continuous engines.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::{BridgeError, VirtualTime};

const NO_HINT: u64 = u64::MAX;

/// Identifies one of the two participants of a [`TimeBarrier`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EngineId {
    Discrete = 0,
    Continuous = 1,
}

impl EngineId {
    /// The opposite participant.
    #[inline(always)]
    pub fn other(self) -> Self {
        match self {
            EngineId::Discrete => EngineId::Continuous,
            EngineId::Continuous => EngineId::Discrete,
        }
    }

    #[inline(always)]
    fn slot(self) -> usize {
        self as usize
    }

    /// Convert a raw id coming from a foreign callback, panicking on anything that is not 0 or 1.
    ///
    /// Use this only in shims that have no way to report an error; a bad id there is a bug
    /// in the shim and barrier state must not be touched.
    pub fn from_raw(raw: i64) -> Self {
        match Self::try_from(raw) {
            Ok(id) => id,
            Err(err) => panic!("{err}"),
        }
    }
}

impl TryFrom<i64> for EngineId {
    type Error = BridgeError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(EngineId::Discrete),
            1 => Ok(EngineId::Continuous),
            other => Err(BridgeError::InvalidEngineId(other)),
        }
    }
}

/// Rendezvous point holding each engine's last published virtual time.
///
/// `publish_and_wait` is the only blocking call. Everything else is a plain load or
/// store, safe from either thread.
pub struct TimeBarrier {
    times: Mutex<[VirtualTime; 2]>,
    cv: Condvar,
    shutdown: AtomicBool,
    redo: AtomicBool,
    next_step_hint: AtomicU64,
}

impl Default for TimeBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeBarrier {
    pub fn new() -> Self {
        Self {
            times: Mutex::new([0; 2]),
            cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            redo: AtomicBool::new(false),
            next_step_hint: AtomicU64::new(NO_HINT),
        }
    }

    /// Publish `time` for `engine`, then block until the other engine's slot is at least
    /// this engine's slot.
    ///
    /// Returns `true` once the clocks agree and `false` if the barrier was (or gets) shut
    /// down. The own slot is re-read on every wake-up because the discrete side may
    /// overwrite the continuous slot with a provisional time during a redo.
    pub fn publish_and_wait(&self, engine: EngineId, time: VirtualTime) -> bool {
        let mut times = self.times.lock();
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }
        times[engine.slot()] = time;
        self.cv.notify_all();

        let mine = engine.slot();
        let other = engine.other().slot();
        while !self.shutdown.load(Ordering::Acquire) && times[other] < times[mine] {
            self.cv.wait(&mut times);
        }
        !self.shutdown.load(Ordering::Acquire)
    }

    /// Record `time` for `engine` without waiting for the other side.
    pub fn publish_no_wait(&self, engine: EngineId, time: VirtualTime) {
        let mut times = self.times.lock();
        times[engine.slot()] = time;
        self.cv.notify_all();
    }

    /// Snapshot of the last time published for `engine`.
    pub fn read_time(&self, engine: EngineId) -> VirtualTime {
        self.times.lock()[engine.slot()]
    }

    /// Wake every waiter and make all current and future waits fail. Idempotent.
    pub fn request_shutdown(&self) {
        {
            let _times = self.times.lock();
            if self.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        debug!("time barrier shut down");
        self.cv.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn set_redo(&self, needs_redo: bool) {
        self.redo.store(needs_redo, Ordering::Release);
    }

    pub fn needs_redo(&self) -> bool {
        self.redo.load(Ordering::Acquire)
    }

    /// Publish where the continuous engine plans to end its next step.
    pub fn set_next_step_hint(&self, time: VirtualTime) {
        self.next_step_hint.store(time.min(NO_HINT - 1), Ordering::Release);
    }

    pub fn clear_next_step_hint(&self) {
        self.next_step_hint.store(NO_HINT, Ordering::Release);
    }

    pub fn next_step_hint(&self) -> Option<VirtualTime> {
        match self.next_step_hint.load(Ordering::Acquire) {
            NO_HINT => None,
            hint => Some(hint),
        }
    }
}
