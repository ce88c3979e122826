//! A clock driving an RC low-pass, with a comparator reading the filtered node back.
//!
//! Run with `RUST_LOG=tandem=debug` to watch the redo handshake.
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
    path::Path,
    thread::{self, JoinHandle},
    time::Instant,
};

use tandem::{
    init_logging, BridgeConfig, BridgeError, CoSimulation, ContinuousSide, ContinuousSolver,
    DiscreteHost, Logic, PortDescriptor, PortDirection, SignalKind, SignalValue, StepDecision,
    StepLocation, StepSync, SyncState, VirtualTime, WakeId,
};
use tracing::info;
use PortDirection::{ContinuousDrivesDiscrete, DiscreteDrivesContinuous};

const PRECISION_EXPONENT: i32 = -9;
const STEP_SECONDS: f64 = 25e-9;
const TAU_SECONDS: f64 = 40e-9;
const HALF_PERIOD: VirtualTime = 250;
const END: VirtualTime = 5_000;

/// Event queue with a clock on `clk` and a comparator output on `cmp`.
struct ClockDriver {
    now: VirtualTime,
    seq: u64,
    wakes: BinaryHeap<Reverse<(VirtualTime, u64)>>,
    cancelled: HashSet<WakeId>,
    clk: Logic,
    cmp: Logic,
    cmp_edges: usize,
}

impl ClockDriver {
    fn new() -> Self {
        Self {
            now: 0,
            seq: 0,
            wakes: BinaryHeap::new(),
            cancelled: HashSet::new(),
            clk: Logic::Low,
            cmp: Logic::Unknown,
            cmp_edges: 0,
        }
    }

    fn next_clock_edge(&self) -> VirtualTime {
        (self.now / HALF_PERIOD + 1) * HALF_PERIOD
    }
}

impl DiscreteHost for ClockDriver {
    fn now(&self) -> VirtualTime {
        self.now
    }

    fn instance_ports(&self, instance: &str) -> Option<Vec<PortDescriptor>> {
        (instance == "top.filter").then(|| {
            vec![
                PortDescriptor::new("clk", DiscreteDrivesContinuous, SignalKind::Reg),
                PortDescriptor::new("cmp", ContinuousDrivesDiscrete, SignalKind::Net),
            ]
        })
    }

    fn watch(&mut self, port: &PortDescriptor) {
        info!(port = port.name.as_str(), "watching");
    }

    fn read_signal(&self, name: &str) -> Option<SignalValue> {
        (name == "clk").then_some(SignalValue::Logic(self.clk))
    }

    fn write_signal(&mut self, name: &str, value: SignalValue) {
        if let ("cmp", SignalValue::Logic(level)) = (name, value) {
            if level != self.cmp {
                self.cmp_edges += 1;
                info!(now = self.now, ?level, "comparator");
            }
            self.cmp = level;
        }
    }

    fn schedule_wake(&mut self, delay: VirtualTime) -> WakeId {
        self.seq += 1;
        self.wakes.push(Reverse((self.now + delay, self.seq)));
        WakeId(self.seq)
    }

    fn cancel_wake(&mut self, id: WakeId) {
        self.cancelled.insert(id);
    }

    fn finish(&mut self, code: i32) {
        info!(code, "finish requested");
    }
}

/// First-order RC node integrated with implicit Euler at a fixed step.
struct RcFilter {
    side: ContinuousSide,
    worker: Option<JoinHandle<usize>>,
}

impl RcFilter {
    fn integrate(side: ContinuousSide) -> usize {
        let mut time = 0.0;
        let mut step = STEP_SECONDS;
        let mut node = 0.0;
        let mut redos = 0;
        let nothing = |_: &str| -> Option<f64> { None };

        while !side.is_shutdown() {
            let next = time + step;
            let drive = side.on_source_sample("vclk", next).unwrap_or(0.0);
            let candidate = node + (drive - node) * step / (TAU_SECONDS + step);

            let begin = StepSync {
                time: next,
                delta: STEP_SECONDS,
                old_delta: step,
                redo_step: false,
                location: StepLocation::Begin,
            };
            if let StepDecision::Redo { delta } = side.on_step_sync(&begin, &nothing) {
                redos += 1;
                step = delta;
                continue;
            }

            time = next;
            node = candidate;
            let end = StepSync {
                location: StepLocation::End,
                time,
                ..begin
            };
            side.on_step_sync(&end, &|quantity: &str| (quantity == "v(cmp)").then_some(node));
            step = STEP_SECONDS;
        }
        redos
    }
}

impl ContinuousSolver for RcFilter {
    fn load(&mut self, netlist: &Path) -> Result<(), BridgeError> {
        info!(netlist = %netlist.display(), "built-in RC model, netlist ignored");
        Ok(())
    }

    fn start(&mut self) -> Result<(), BridgeError> {
        let side = self.side.clone();
        self.worker = Some(thread::spawn(move || RcFilter::integrate(side)));
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn halt(&mut self) {
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(redos) => info!(redos, "solver halted"),
                Err(_) => info!("solver thread panicked"),
            }
        }
    }

    fn dump(&mut self, path: &Path) -> Result<(), BridgeError> {
        info!(path = %path.display(), "nothing to dump");
        Ok(())
    }
}

fn main() -> Result<(), BridgeError> {
    init_logging("info");

    let config = BridgeConfig::new("rc.cir", ["top.filter"])
        .with_time_precision_exponent(PRECISION_EXPONENT)?
        .with_min_analog_change(1e-6)
        .with_dump_path(None);
    let mut sim = CoSimulation::new(config, |side| RcFilter { side, worker: None })?;
    let mut driver = ClockDriver::new();

    let start = Instant::now();
    sim.start(&mut driver)?;

    let mut next_edge = driver.next_clock_edge();
    while let Some(Reverse((wake_at, id))) = driver.wakes.peek().copied() {
        // clock edges come before wakes of the same tick
        if next_edge <= wake_at && next_edge <= END {
            driver.now = next_edge;
            driver.clk = match driver.clk {
                Logic::High => Logic::Low,
                _ => Logic::High,
            };
            let clk = SignalValue::Logic(driver.clk);
            sim.discrete().on_value_change(&mut driver, "clk", &clk);
            next_edge = driver.next_clock_edge();
            continue;
        }
        driver.wakes.pop();
        if wake_at > END {
            break;
        }
        if driver.cancelled.remove(&WakeId(id)) {
            continue;
        }
        driver.now = wake_at;
        if sim.discrete().on_wake(&mut driver) == SyncState::Shutdown {
            break;
        }
    }
    sim.finish()?;

    let elapsed = start.elapsed();
    println!("Simulated {END} ns in {elapsed:.2?}");
    println!("Comparator edges: {}", driver.cmp_edges);
    Ok(())
}
