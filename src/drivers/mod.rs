pub mod manager;
pub mod sdio;

use spin::{Mutex, MutexGuard};

pub use manager::DeviceManager;

use sdio::{Sdio, SdmmcPort, Timer};

/// General Device Operations
/// Adapted from ArceOS
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    /// Interrupt number, `None` for polled devices
    fn interrupt_number(&self) -> Option<usize>;

    /// Interrupt handler
    fn interrupt_handler(&self);
}

/// An SDIO handle shared between thread context and its interrupt line
pub struct SdioDevice<P: SdmmcPort, T: Timer> {
    name: &'static str,
    irq: Option<usize>,
    inner: Mutex<Sdio<P, T>>,
}

impl<P: SdmmcPort, T: Timer> SdioDevice<P, T> {
    pub fn new(name: &'static str, irq: Option<usize>, sdio: Sdio<P, T>) -> Self {
        Self {
            name,
            irq,
            inner: Mutex::new(sdio),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Sdio<P, T>> {
        self.inner.lock()
    }
}

impl<P, T> Device for SdioDevice<P, T>
where
    P: SdmmcPort + Send,
    T: Timer + Send,
{
    fn name(&self) -> &str {
        self.name
    }

    fn interrupt_number(&self) -> Option<usize> {
        self.irq
    }

    fn interrupt_handler(&self) {
        self.inner.lock().irq_handler();
    }
}
