//! Protocol logic invoked from each engine's own callbacks.
//!
//! [`DiscreteSide`] runs on the discrete engine's thread and [`ContinuousSide`] on the
//! solver's. Both share a [`Coupling`]; [`CoSimulation`] owns the session lifecycle.
use std::sync::Arc;

use tracing::{error, info};

use crate::{
    barrier::TimeBarrier,
    bridge::{convert::LevelConverter, discovery::discover_ports, PortRegistry},
    config::{BridgeConfig, TickScale},
    host::{ContinuousSolver, DiscreteHost},
    BridgeError,
};

pub mod continuous;
pub mod discrete;
pub mod redo;

use continuous::ContinuousSide;
use discrete::DiscreteSide;

/// Shared state of one coupled run.
#[derive(Clone)]
pub struct Coupling {
    pub barrier: Arc<TimeBarrier>,
    pub registry: Arc<PortRegistry>,
    pub converter: LevelConverter,
    pub scale: TickScale,
}

impl Coupling {
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            barrier: Arc::new(TimeBarrier::new()),
            registry: Arc::new(PortRegistry::from_config(config)),
            converter: LevelConverter::from_config(config)?,
            scale: config.tick_scale(),
        })
    }

    pub fn discrete_side(&self) -> DiscreteSide {
        DiscreteSide::new(self.clone())
    }

    pub fn continuous_side(&self) -> ContinuousSide {
        ContinuousSide::new(self.clone())
    }
}

/// A discrete engine and a continuous solver coupled for one run.
pub struct CoSimulation<S: ContinuousSolver> {
    config: BridgeConfig,
    coupling: Coupling,
    solver: S,
    discrete: DiscreteSide,
    finished: bool,
}

impl<S: ContinuousSolver> CoSimulation<S> {
    /// Validate `config` and build the solver around the continuous half of the coupling.
    pub fn new<F>(config: BridgeConfig, make_solver: F) -> Result<Self, BridgeError>
    where
        F: FnOnce(ContinuousSide) -> S,
    {
        let coupling = Coupling::new(&config)?;
        let solver = make_solver(coupling.continuous_side());
        let discrete = coupling.discrete_side();
        Ok(Self {
            config,
            coupling,
            solver,
            discrete,
            finished: false,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn coupling(&self) -> &Coupling {
        &self.coupling
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// The discrete half; forward value-change and wake callbacks to it.
    pub fn discrete(&mut self) -> &mut DiscreteSide {
        &mut self.discrete
    }

    /// Discover ports, bring up the solver and perform the first rendezvous.
    ///
    /// If the solver fails to come up the host is told to finish with code 1.
    pub fn start<H>(&mut self, host: &mut H) -> Result<(), BridgeError>
    where
        H: DiscreteHost + ?Sized,
    {
        self.log_summary();

        let instances = &self.config.hdl_instances;
        let registered = discover_ports(&mut *host, &self.coupling.registry, instances);
        info!(ports = registered, "port discovery complete");
        self.coupling.registry.log_status();

        let netlist = self.config.spice_netlist.clone();
        let started = self
            .solver
            .load(&netlist)
            .and_then(|_| self.solver.start())
            .map_err(|err| match err {
                BridgeError::EngineInit(_) => err,
                other => BridgeError::EngineInit(other.to_string()),
            });
        if let Err(err) = started {
            error!("{err}");
            host.finish(1);
            return Err(err);
        }
        if !self.solver.is_running() {
            let err = BridgeError::EngineInit("solver is not running".to_string());
            error!("{err}");
            host.finish(1);
            return Err(err);
        }

        self.discrete.on_start(host)
    }

    /// Shut the barrier down, halt the solver and write the optional dump. Idempotent.
    pub fn finish(&mut self) -> Result<(), BridgeError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.coupling.barrier.request_shutdown();
        self.solver.halt();
        self.coupling.registry.log_status();
        if let Some(path) = self.config.dump_path.clone() {
            if let Err(err) = self.solver.dump(&path) {
                error!(path = %path.display(), "failed to write results: {err}");
                return Err(err);
            }
        }
        info!("end of simulation");
        Ok(())
    }

    fn log_summary(&self) {
        let config = &self.config;
        info!(netlist = %config.spice_netlist.display(), "using SPICE netlist");
        info!(
            instances = config.hdl_instances.join(", ").as_str(),
            full_path = config.full_path_discovery,
            "using HDL instances"
        );
        info!(
            vcc = config.vcc,
            low = config.logic_threshold_low,
            high = config.logic_threshold_high,
            "using logic levels"
        );
        info!(ticks_per_second = config.time_precision, "simulation precision");
    }
}

#[cfg(test)]
mod cosim_lifecycle_tests {
    use super::*;
    use crate::{
        bridge::port::{PortDescriptor, PortDirection, SignalKind},
        host::{SignalValue, WakeId},
        EngineId, VirtualTime,
    };
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct RecordingHost {
        finished_with: Option<i32>,
        wakes: Vec<VirtualTime>,
    }

    impl DiscreteHost for RecordingHost {
        fn now(&self) -> VirtualTime {
            0
        }
        fn instance_ports(&self, instance: &str) -> Option<Vec<PortDescriptor>> {
            (instance == "tb.dut").then(|| {
                let direction = PortDirection::DiscreteDrivesContinuous;
                vec![PortDescriptor::new("vin", direction, SignalKind::Net)]
            })
        }
        fn watch(&mut self, _port: &PortDescriptor) {}
        fn read_signal(&self, _name: &str) -> Option<SignalValue> {
            None
        }
        fn write_signal(&mut self, _name: &str, _value: SignalValue) {}
        fn schedule_wake(&mut self, delay: VirtualTime) -> WakeId {
            self.wakes.push(delay);
            WakeId(self.wakes.len() as u64)
        }
        fn cancel_wake(&mut self, _id: WakeId) {}
        fn finish(&mut self, code: i32) {
            self.finished_with = Some(code);
        }
    }

    /// Solver stub that either refuses to run or pretends the first sample already happened.
    struct StubSolver {
        side: ContinuousSide,
        runs: bool,
        loaded: Option<PathBuf>,
        halted: bool,
        dumped: Option<PathBuf>,
    }

    impl ContinuousSolver for StubSolver {
        fn load(&mut self, netlist: &Path) -> Result<(), BridgeError> {
            self.loaded = Some(netlist.to_path_buf());
            Ok(())
        }
        fn start(&mut self) -> Result<(), BridgeError> {
            if self.runs {
                self.side
                    .coupling()
                    .barrier
                    .publish_no_wait(EngineId::Continuous, 5);
            }
            Ok(())
        }
        fn is_running(&self) -> bool {
            self.runs
        }
        fn halt(&mut self) {
            self.halted = true;
        }
        fn dump(&mut self, path: &Path) -> Result<(), BridgeError> {
            self.dumped = Some(path.to_path_buf());
            Ok(())
        }
    }

    fn session(runs: bool) -> CoSimulation<StubSolver> {
        let config = BridgeConfig::new("rc.cir", ["tb.dut"]);
        CoSimulation::new(config, |side| StubSolver {
            side,
            runs,
            loaded: None,
            halted: false,
            dumped: None,
        })
        .unwrap()
    }

    #[test]
    fn test_start_and_finish() {
        let mut sim = session(true);
        let mut host = RecordingHost::default();
        sim.start(&mut host).unwrap();

        assert_eq!(sim.solver().loaded, Some(PathBuf::from("rc.cir")));
        assert_eq!(sim.coupling().registry.list_discrete_driven_names(), vec!["vin"]);
        assert_eq!(sim.coupling().barrier.read_time(EngineId::Discrete), 1);
        assert_eq!(host.wakes, vec![0]);
        assert_eq!(host.finished_with, None);

        sim.finish().unwrap();
        sim.finish().unwrap();
        assert!(sim.coupling().barrier.is_shutdown());
        assert!(sim.solver().halted);
        assert_eq!(sim.solver().dumped, Some(PathBuf::from("dump.raw")));
    }

    #[test]
    fn test_solver_failure_finishes_host() {
        let mut sim = session(false);
        let mut host = RecordingHost::default();
        let result = sim.start(&mut host);
        assert!(matches!(result, Err(BridgeError::EngineInit(_))));
        assert_eq!(host.finished_with, Some(1));
        assert!(host.wakes.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let config = BridgeConfig::new("", ["tb.dut"]);
        let result = CoSimulation::new(config, |side| StubSolver {
            side,
            runs: true,
            loaded: None,
            halted: false,
            dumped: None,
        });
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
