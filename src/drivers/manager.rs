//! Device manager
//!

use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use log::{info, warn};

use super::Device;

pub struct DeviceManager {
    devices: Vec<Arc<dyn Device>>,
    interrupt_map: BTreeMap<usize, Arc<dyn Device>>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            interrupt_map: BTreeMap::new(),
        }
    }

    pub fn devices(&self) -> &[Arc<dyn Device>] {
        &self.devices
    }

    /// Keep the device and route its interrupt line, if it has one
    pub fn register(&mut self, dev: Arc<dyn Device>) {
        if let Some(irq) = dev.interrupt_number() {
            if let Some(old) = self.interrupt_map.insert(irq, dev.clone()) {
                warn!("IRQ {} moved from {} to {}", irq, old.name(), dev.name());
            }
        }
        info!("Device {} registered", dev.name());
        self.devices.push(dev);
    }

    pub fn interrupt_handler(&self, irq: usize) {
        if let Some(dev) = self.interrupt_map.get(&irq) {
            dev.interrupt_handler();
        } else {
            warn!("Unknown interrupt: {}", irq);
        }
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
