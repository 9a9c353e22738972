//! GPIO capability set for the appliance buttons
//!
//! Provides:
//! - [`SysfsGpio`] reading lines through the Linux sysfs interface
//! - [`StubGpio`] for hosts without GPIO (every read reports "not pressed")
//! - [`GpioGuard`] which releases the lines exactly once when dropped

use crate::{Result, ZelnaError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default sysfs root for GPIO lines
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Minimal pin capability used by the edge detector.
///
/// `read` returns the raw line level (`true` = high). Buttons are wired
/// active-low with pull-ups, so a released button reads high.
pub trait GpioPins: Send {
    fn configure_input(&mut self, pin: u32) -> Result<()>;
    fn read(&mut self, pin: u32) -> Result<bool>;
    fn release_all(&mut self);
}

/// Stand-in for hosts without GPIO hardware
#[derive(Debug, Default)]
pub struct StubGpio {
    configured: Vec<u32>,
}

impl StubGpio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GpioPins for StubGpio {
    fn configure_input(&mut self, pin: u32) -> Result<()> {
        debug!("Stub GPIO pin {} set up as input", pin);
        self.configured.push(pin);
        Ok(())
    }

    fn read(&mut self, _pin: u32) -> Result<bool> {
        // High level: button not pressed
        Ok(true)
    }

    fn release_all(&mut self) {
        if !self.configured.is_empty() {
            debug!("Stub GPIO cleanup ({} pins)", self.configured.len());
        }
        self.configured.clear();
    }
}

/// GPIO access through `/sys/class/gpio`.
///
/// Pull-up configuration is not exposed by sysfs; the board's device tree
/// (or external resistors) must provide it.
#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    exported: Vec<u32>,
}

impl SysfsGpio {
    pub fn new() -> Self {
        Self::with_root(SYSFS_GPIO_ROOT)
    }

    /// Use a different sysfs root (tests point this at a temp dir)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exported: Vec::new(),
        }
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn write_attr(path: &Path, value: &str) -> Result<()> {
        fs::write(path, value)
            .map_err(|e| ZelnaError::Gpio(format!("write {}: {}", path.display(), e)))
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioPins for SysfsGpio {
    fn configure_input(&mut self, pin: u32) -> Result<()> {
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            Self::write_attr(&self.root.join("export"), &pin.to_string())?;
            self.exported.push(pin);
        }
        Self::write_attr(&dir.join("direction"), "in")?;
        info!("GPIO pin {} configured as input", pin);
        Ok(())
    }

    fn read(&mut self, pin: u32) -> Result<bool> {
        let path = self.pin_dir(pin).join("value");
        let raw = fs::read_to_string(&path)
            .map_err(|e| ZelnaError::Gpio(format!("read pin {}: {}", pin, e)))?;
        match raw.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(ZelnaError::Gpio(format!(
                "pin {} returned unexpected value {:?}",
                pin, other
            ))),
        }
    }

    fn release_all(&mut self) {
        for pin in self.exported.drain(..) {
            let path = self.root.join("unexport");
            if let Err(e) = fs::write(&path, pin.to_string()) {
                warn!("Failed to unexport GPIO pin {}: {}", pin, e);
            }
        }
        debug!("GPIO lines released");
    }
}

/// Owns the GPIO lines for the lifetime of a worker and releases them once
pub struct GpioGuard {
    pins: Box<dyn GpioPins>,
    released: bool,
}

impl GpioGuard {
    pub fn new(pins: Box<dyn GpioPins>) -> Self {
        Self {
            pins,
            released: false,
        }
    }

    pub fn pins(&mut self) -> &mut dyn GpioPins {
        self.pins.as_mut()
    }

    /// Release now instead of waiting for drop; later calls do nothing
    pub fn release(&mut self) {
        if !self.released {
            self.pins.release_all();
            self.released = true;
        }
    }
}

impl Drop for GpioGuard {
    fn drop(&mut self) {
        self.release();
    }
}
