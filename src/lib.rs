//! `tandem` couples a discrete-event simulator and a continuous-time solver.
//!
//! The two engines run on their own threads and call into this crate from their
//! own callback mechanisms. A [`barrier::TimeBarrier`] keeps their virtual clocks
//! in agreement (with a redo handshake that lets the solver shorten a step it took
//! too early), and a [`bridge::PortRegistry`] carries signal values across.
use thiserror::Error;

pub mod barrier;
pub mod bridge;
pub mod config;
pub mod host;
pub mod sync;

pub use barrier::{EngineId, TimeBarrier};
pub use bridge::{
    convert::{LevelConverter, Logic},
    discovery::discover_ports,
    port::{ChangedPort, PortDescriptor, PortDirection, SignalKind},
    PortRegistry,
};
pub use config::{BridgeConfig, TickScale};
pub use host::{ContinuousSolver, DiscreteHost, SampleProbe, SignalValue, WakeId};
pub use sync::{
    continuous::{ContinuousSide, StepDecision, StepLocation, StepSync},
    discrete::DiscreteSide,
    redo::SyncState,
    CoSimulation, Coupling,
};

/// Integer count of ticks at the configured time precision.
pub type VirtualTime = u64;

/// Error enum for reporting co-simulation faults
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("required setting `{0}` is not set")]
    MissingSetting(&'static str),
    #[error("invalid value for `{name}`: {value}")]
    InvalidSetting { name: &'static str, value: String },
    #[error("invalid engine id {0}: must be 0 (discrete) or 1 (continuous)")]
    InvalidEngineId(i64),
    #[error("port `{0}` not found")]
    PortNotFound(String),
    #[error("port `{name}` not supported: {reason}")]
    UnsupportedPort { name: String, reason: String },
    #[error("port `{0}` registered twice")]
    DuplicatePort(String),
    #[error("instance `{0}` not found")]
    InstanceNotFound(String),
    #[error("continuous engine failed to start: {0}")]
    EngineInit(String),
    #[error("co-simulation has been shut down")]
    Shutdown,
}

/// Install a `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this twice is harmless;
/// the second install is ignored.
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}
