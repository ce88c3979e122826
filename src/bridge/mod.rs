//! Named signal ports shared between the two engines.
//!
//! Ports live in two buckets keyed by lower-cased name, one per direction. Each bucket has
//! its own lock; values and change flags are per-port atomics, so a reader holding
//! an `Arc<Port>` never blocks the bucket.
use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::{config::BridgeConfig, BridgeError};

pub mod convert;
pub mod discovery;
pub mod port;

use port::{bit_name, ChangedPort, Port, PortDescriptor, PortDirection, SignalKind};

type Bucket = RwLock<HashMap<String, Arc<Port>>>;

pub struct PortRegistry {
    discrete_driven: Bucket,
    continuous_driven: Bucket,
    min_change: f64,
    full_path_names: bool,
}

impl PortRegistry {
    pub fn new(min_change: f64, full_path_names: bool) -> Self {
        Self {
            discrete_driven: RwLock::new(HashMap::new()),
            continuous_driven: RwLock::new(HashMap::new()),
            min_change,
            full_path_names,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.min_analog_change, config.full_path_discovery)
    }

    pub fn min_change(&self) -> f64 {
        self.min_change
    }

    fn bucket(&self, direction: PortDirection) -> Option<&Bucket> {
        match direction {
            PortDirection::DiscreteDrivesContinuous => Some(&self.discrete_driven),
            PortDirection::ContinuousDrivesDiscrete => Some(&self.continuous_driven),
            PortDirection::Bidirectional => None,
        }
    }

    /// Register the port(s) described by `descriptor`, returning the registered names.
    ///
    /// A vector of width N becomes N bit-ports `name[0]..name[N-1]`. Nothing is registered
    /// if any resulting name is already taken.
    pub fn register_port(&self, descriptor: &PortDescriptor) -> Result<Vec<String>, BridgeError> {
        let name = descriptor.qualified_name(self.full_path_names);
        let bucket = match self.bucket(descriptor.direction) {
            Some(bucket) => bucket,
            None => {
                return Err(BridgeError::UnsupportedPort {
                    name,
                    reason: "inout ports are not supported".to_string(),
                })
            }
        };
        if descriptor.kind == SignalKind::Other {
            return Err(BridgeError::UnsupportedPort {
                name,
                reason: "unsupported net type".to_string(),
            });
        }

        let ports: Vec<Port> = match descriptor.width {
            Some(width) => (0..width)
                .map(|i| {
                    Port::new(
                        bit_name(&name, i),
                        name.clone(),
                        descriptor.direction,
                        descriptor.kind,
                        width,
                        Some(i),
                    )
                })
                .collect(),
            None => vec![Port::new(
                name.clone(),
                name.clone(),
                descriptor.direction,
                descriptor.kind,
                1,
                None,
            )],
        };

        let mut map = bucket.write();
        if let Some(taken) = ports.iter().find(|p| map.contains_key(p.name())) {
            return Err(BridgeError::DuplicatePort(taken.name().to_string()));
        }
        let mut names = Vec::with_capacity(ports.len());
        for port in ports {
            debug!(
                port = port.name(),
                direction = ?port.direction(),
                kind = ?port.kind(),
                "registered port"
            );
            names.push(port.name().to_string());
            map.insert(port.name().to_string(), Arc::new(port));
        }
        Ok(names)
    }

    /// Shared handle to one port, if registered.
    pub fn port(&self, direction: PortDirection, name: &str) -> Option<Arc<Port>> {
        self.bucket(direction)?.read().get(name).cloned()
    }

    /// Every port of one bucket, sorted by name.
    pub fn ports(&self, direction: PortDirection) -> Vec<Arc<Port>> {
        let mut ports: Vec<Arc<Port>> = match self.bucket(direction) {
            Some(bucket) => bucket.read().values().cloned().collect(),
            None => Vec::new(),
        };
        ports.sort_by(|a, b| a.name().cmp(b.name()));
        ports
    }

    /// Current value of a discrete-driven port, as sampled by the continuous engine.
    pub fn read_value(&self, name: &str) -> Result<f64, BridgeError> {
        match self.discrete_driven.read().get(name) {
            Some(port) => Ok(port.value()),
            None => {
                error!(port = name, "analog input not found");
                Err(BridgeError::PortNotFound(name.to_string()))
            }
        }
    }

    /// Debounced write of a value computed by the continuous engine.
    pub fn update_from_continuous(&self, name: &str, value: f64) -> Result<bool, BridgeError> {
        self.update(PortDirection::ContinuousDrivesDiscrete, name, value)
    }

    /// Debounced write of a value driven by the discrete engine.
    pub fn update_from_discrete(&self, name: &str, value: f64) -> Result<bool, BridgeError> {
        self.update(PortDirection::DiscreteDrivesContinuous, name, value)
    }

    fn update(
        &self,
        direction: PortDirection,
        name: &str,
        value: f64,
    ) -> Result<bool, BridgeError> {
        let port = match self.port(direction, name) {
            Some(port) => port,
            None => {
                error!(port = name, ?direction, "port not found");
                return Err(BridgeError::PortNotFound(name.to_string()));
            }
        };
        let old = port.value();
        let written = port.store_debounced(value, self.min_change);
        if written {
            debug!(port = name, old, new = value, "port updated");
        }
        Ok(written)
    }

    /// Consume the changed flag of every port in one bucket.
    ///
    /// Each port appears at most once. A write racing with the drain is either included
    /// here or leaves its flag set for the next call.
    pub fn drain_changed(&self, direction: PortDirection) -> Vec<ChangedPort> {
        let bucket = match self.bucket(direction) {
            Some(bucket) => bucket,
            None => return Vec::new(),
        };
        let mut changed: Vec<ChangedPort> = bucket
            .read()
            .values()
            .filter(|port| port.take_changed())
            .map(|port| ChangedPort {
                name: port.name().to_string(),
                value: port.value(),
                kind: port.kind(),
            })
            .collect();
        changed.sort_by(|a, b| a.name.cmp(&b.name));
        changed
    }

    pub fn list_discrete_driven_names(&self) -> Vec<String> {
        Self::sorted_names(&self.discrete_driven)
    }

    pub fn list_continuous_driven_names(&self) -> Vec<String> {
        Self::sorted_names(&self.continuous_driven)
    }

    fn sorted_names(bucket: &Bucket) -> Vec<String> {
        let mut names: Vec<String> = bucket.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.discrete_driven.read().len() + self.continuous_driven.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dump every port with its value and changed flag at debug level.
    pub fn log_status(&self) {
        for (label, direction) in [
            ("analog input", PortDirection::DiscreteDrivesContinuous),
            ("analog output", PortDirection::ContinuousDrivesDiscrete),
        ] {
            for port in self.ports(direction) {
                debug!(
                    port = port.name(),
                    base = port.base_name(),
                    bit = ?port.bit_index(),
                    kind = ?port.kind(),
                    value = port.value(),
                    changed = port.is_changed(),
                    "{label}"
                );
            }
        }
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use std::{sync::atomic::{AtomicBool, Ordering}, thread};

    fn input(name: &str) -> PortDescriptor {
        PortDescriptor::new(name, PortDirection::DiscreteDrivesContinuous, SignalKind::Net)
    }

    fn output(name: &str) -> PortDescriptor {
        PortDescriptor::new(name, PortDirection::ContinuousDrivesDiscrete, SignalKind::Net)
    }

    #[test]
    fn test_vector_expands_into_bit_ports() {
        let registry = PortRegistry::new(1e-9, false);
        let names = registry.register_port(&input("Data").with_width(4)).unwrap();
        assert_eq!(names, vec!["data[0]", "data[1]", "data[2]", "data[3]"]);
        assert_eq!(registry.list_discrete_driven_names(), names);
        assert!(registry.list_continuous_driven_names().is_empty());

        assert!(registry.update_from_discrete("data[2]", 1.0).unwrap());
        assert_eq!(registry.read_value("data[2]"), Ok(1.0));
        assert_eq!(registry.read_value("data[1]"), Ok(0.0));

        let bit = registry.port(PortDirection::DiscreteDrivesContinuous, "data[3]").unwrap();
        assert_eq!(bit.base_name(), "data");
        assert_eq!(bit.bit_index(), Some(3));
        assert_eq!(bit.width(), 4);
        assert_eq!(registry.read_value("data"), Err(BridgeError::PortNotFound("data".into())));
    }

    #[test]
    fn test_full_path_names() {
        let registry = PortRegistry::new(1e-9, true);
        let names = registry
            .register_port(&output("Y").within_instance("tb.U1"))
            .unwrap();
        assert_eq!(names, vec!["tb.u1.y"]);
    }

    #[test]
    fn test_rejected_ports() {
        let registry = PortRegistry::new(1e-9, false);
        let inout = PortDescriptor::new("io", PortDirection::Bidirectional, SignalKind::Net);
        assert!(matches!(
            registry.register_port(&inout),
            Err(BridgeError::UnsupportedPort { .. })
        ));
        let direction = PortDirection::DiscreteDrivesContinuous;
        let odd = PortDescriptor::new("mem", direction, SignalKind::Other);
        assert!(matches!(
            registry.register_port(&odd),
            Err(BridgeError::UnsupportedPort { .. })
        ));

        registry.register_port(&input("a")).unwrap();
        assert_eq!(
            registry.register_port(&input("A")),
            Err(BridgeError::DuplicatePort("a".into()))
        );
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_from_continuous_debounce_law() {
        let registry = PortRegistry::new(0.01, false);
        registry.register_port(&output("out")).unwrap();
        assert_eq!(registry.drain_changed(PortDirection::ContinuousDrivesDiscrete).len(), 1);

        assert_eq!(registry.update_from_continuous("out", 0.005), Ok(false));
        assert!(registry.drain_changed(PortDirection::ContinuousDrivesDiscrete).is_empty());

        assert_eq!(registry.update_from_continuous("out", 0.8), Ok(true));
        assert_eq!(
            registry.drain_changed(PortDirection::ContinuousDrivesDiscrete),
            vec![ChangedPort { name: "out".into(), value: 0.8, kind: SignalKind::Net }]
        );
        assert!(registry.drain_changed(PortDirection::ContinuousDrivesDiscrete).is_empty());

        assert_eq!(
            registry.update_from_continuous("missing", 1.0),
            Err(BridgeError::PortNotFound("missing".into()))
        );
        // wrong bucket
        assert!(registry.update_from_discrete("out", 1.0).is_err());
    }

    #[test]
    fn test_drain_is_sorted_and_once_per_port() {
        let registry = PortRegistry::new(1e-9, false);
        registry.register_port(&output("b")).unwrap();
        registry.register_port(&output("a")).unwrap();
        registry.register_port(&output("c")).unwrap();
        let first: Vec<String> = registry
            .drain_changed(PortDirection::ContinuousDrivesDiscrete)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(first, vec!["a", "b", "c"]);

        registry.update_from_continuous("c", 1.0).unwrap();
        registry.update_from_continuous("c", 2.0).unwrap();
        let second = registry.drain_changed(PortDirection::ContinuousDrivesDiscrete);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].value, 2.0);
        assert!(registry.drain_changed(PortDirection::Bidirectional).is_empty());
    }

    #[test]
    fn test_concurrent_drain_loses_no_update() {
        const WRITES: u32 = 20_000;
        let registry = Arc::new(PortRegistry::new(1e-9, false));
        registry.register_port(&output("ramp")).unwrap();
        registry.drain_changed(PortDirection::ContinuousDrivesDiscrete);
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let registry = Arc::clone(&registry);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 1..=WRITES {
                    registry.update_from_continuous("ramp", i as f64).unwrap();
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut last_seen = 0.0;
        loop {
            let finished = done.load(Ordering::Acquire);
            for port in registry.drain_changed(PortDirection::ContinuousDrivesDiscrete) {
                assert!(port.value >= last_seen, "values went backwards");
                last_seen = port.value;
            }
            if finished {
                break;
            }
        }
        // one more pass after the writer is known to be done
        for port in registry.drain_changed(PortDirection::ContinuousDrivesDiscrete) {
            last_seen = port.value;
        }
        writer.join().unwrap();
        assert_eq!(last_seen, WRITES as f64);
    }
}
