use tracing::{error, info, warn};

use super::{port::PortDirection, PortRegistry};
use crate::{host::DiscreteHost, BridgeError};

/// Register the ports of every configured instance, returning how many ports were added.
///
/// Missing instances and unsupported ports are logged and skipped. Ports without an instance
/// path take the configured instance name. Ports driven by the discrete engine are watched so
/// their edges reach the bridge.
pub fn discover_ports<H>(host: &mut H, registry: &PortRegistry, instances: &[String]) -> usize
where
    H: DiscreteHost + ?Sized,
{
    let mut registered = 0;
    for instance in instances {
        let ports = match host.instance_ports(instance) {
            Some(ports) => ports,
            None => {
                error!("{}", BridgeError::InstanceNotFound(instance.clone()));
                continue;
            }
        };
        info!(instance = instance.as_str(), ports = ports.len(), "processing instance");

        for descriptor in ports {
            let descriptor = if descriptor.instance_path.is_none() {
                descriptor.within_instance(instance.as_str())
            } else {
                descriptor
            };
            match registry.register_port(&descriptor) {
                Ok(names) => {
                    registered += names.len();
                    if descriptor.direction == PortDirection::DiscreteDrivesContinuous {
                        host.watch(&descriptor);
                    }
                }
                Err(err) => warn!(instance = instance.as_str(), "skipping port: {err}"),
            }
        }
    }
    registered
}
