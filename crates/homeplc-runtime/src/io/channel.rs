//! Bus transaction channels.
//!
//! A channel moves raw frames to and from device addresses. The bus keeps
//! the per-module caches; the channel only performs transactions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use smol_str::SmolStr;

use crate::error::RuntimeError;

/// Raw frame transport for one physical bus.
pub trait BusChannel: Send {
    /// Acquire the bus for the given device addresses.
    fn open(&mut self, addresses: &[u16]) -> Result<(), RuntimeError>;

    /// Read `buf.len()` bytes from `address`, optionally after selecting `register`.
    fn read(
        &mut self,
        address: u16,
        register: Option<u8>,
        buf: &mut [u8],
    ) -> Result<(), RuntimeError>;

    /// Write one frame to `address`.
    fn write(&mut self, address: u16, frame: &[u8]) -> Result<(), RuntimeError>;

    /// Release the bus.
    fn close(&mut self);
}

/// Hands out channels by bus path. Creating a channel never touches hardware.
pub trait ChannelProvider: Send + Sync {
    fn channel(&self, bus: &str) -> Result<Box<dyn BusChannel>, RuntimeError>;
}

/// Channels backed by the host's I2C character devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemChannels;

impl ChannelProvider for SystemChannels {
    fn channel(&self, bus: &str) -> Result<Box<dyn BusChannel>, RuntimeError> {
        system_channel(bus)
    }
}

#[cfg(target_os = "linux")]
fn system_channel(bus: &str) -> Result<Box<dyn BusChannel>, RuntimeError> {
    Ok(Box::new(linux::LinuxI2cChannel::new(bus)))
}

#[cfg(not(target_os = "linux"))]
fn system_channel(bus: &str) -> Result<Box<dyn BusChannel>, RuntimeError> {
    Err(RuntimeError::InvalidConfig(
        format!("i2c bus '{bus}' requires linux i2c-dev support").into(),
    ))
}

#[cfg(target_os = "linux")]
pub use linux::LinuxI2cChannel;

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::HashMap;

    use i2cdev::core::I2CDevice;
    use i2cdev::linux::LinuxI2CDevice;
    use smol_str::SmolStr;

    use super::BusChannel;
    use crate::error::RuntimeError;

    /// `/dev/i2c-N` access through the i2c-dev ioctl interface.
    pub struct LinuxI2cChannel {
        path: SmolStr,
        devices: HashMap<u16, LinuxI2CDevice>,
    }

    impl std::fmt::Debug for LinuxI2cChannel {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("LinuxI2cChannel")
                .field("path", &self.path)
                .field("devices", &self.devices.len())
                .finish()
        }
    }

    impl LinuxI2cChannel {
        #[must_use]
        pub fn new(path: impl Into<SmolStr>) -> Self {
            Self {
                path: path.into(),
                devices: HashMap::new(),
            }
        }

        fn device(&mut self, address: u16) -> Result<&mut LinuxI2CDevice, RuntimeError> {
            let path = self.path.clone();
            self.devices.get_mut(&address).ok_or_else(|| {
                RuntimeError::BusTransaction(
                    format!("{path}: device {address:#04x} not opened").into(),
                )
            })
        }
    }

    impl BusChannel for LinuxI2cChannel {
        fn open(&mut self, addresses: &[u16]) -> Result<(), RuntimeError> {
            let mut devices = HashMap::new();
            for &address in addresses {
                let device = LinuxI2CDevice::new(self.path.as_str(), address).map_err(|err| {
                    RuntimeError::BusTransaction(
                        format!("{}: open {address:#04x} failed: {err}", self.path).into(),
                    )
                })?;
                devices.insert(address, device);
            }
            self.devices = devices;
            Ok(())
        }

        fn read(
            &mut self,
            address: u16,
            register: Option<u8>,
            buf: &mut [u8],
        ) -> Result<(), RuntimeError> {
            let path = self.path.clone();
            let device = self.device(address)?;
            let fail = |err: i2cdev::linux::LinuxI2CError| {
                RuntimeError::BusTransaction(
                    format!("{path}: read {address:#04x} failed: {err}").into(),
                )
            };
            if let Some(register) = register {
                device.write(&[register]).map_err(fail)?;
            }
            device.read(buf).map_err(fail)
        }

        fn write(&mut self, address: u16, frame: &[u8]) -> Result<(), RuntimeError> {
            let path = self.path.clone();
            let device = self.device(address)?;
            device.write(frame).map_err(|err| {
                RuntimeError::BusTransaction(
                    format!("{path}: write {address:#04x} failed: {err}").into(),
                )
            })
        }

        fn close(&mut self) {
            self.devices.clear();
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedDevice {
    registers: [u8; 8],
    frames: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct SimulatedBus {
    devices: HashMap<u16, SimulatedDevice>,
    open: bool,
    open_count: u32,
    close_count: u32,
    fail_open: bool,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory device images shared between a simulated channel and its observer.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBusState {
    inner: Arc<Mutex<SimulatedBus>>,
}

impl SimulatedBusState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device that acknowledges transactions at `address`.
    #[must_use]
    pub fn with_device(self, address: u16) -> Self {
        self.lock().devices.entry(address).or_default();
        self
    }

    /// Set the bytes returned by reads starting at `register` (0 for plain reads).
    pub fn set_registers(&self, address: u16, register: u8, bytes: &[u8]) {
        let mut bus = self.lock();
        let device = bus.devices.entry(address).or_default();
        for (offset, byte) in bytes.iter().enumerate() {
            if let Some(slot) = device.registers.get_mut(usize::from(register) + offset) {
                *slot = *byte;
            }
        }
    }

    /// Frames written to `address`, oldest first.
    #[must_use]
    pub fn frames(&self, address: u16) -> Vec<Vec<u8>> {
        self.lock()
            .devices
            .get(&address)
            .map(|device| device.frames.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn last_frame(&self, address: u16) -> Option<Vec<u8>> {
        self.frames(address).pop()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    #[must_use]
    pub fn open_count(&self) -> u32 {
        self.lock().open_count
    }

    #[must_use]
    pub fn close_count(&self) -> u32 {
        self.lock().close_count
    }

    pub fn fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedBus> {
        self.inner.lock().expect("simulated bus lock poisoned")
    }
}

/// Channel over a [`SimulatedBusState`].
#[derive(Debug, Clone)]
pub struct SimulatedChannel {
    path: SmolStr,
    state: SimulatedBusState,
}

impl SimulatedChannel {
    #[must_use]
    pub fn new(path: impl Into<SmolStr>, state: SimulatedBusState) -> Self {
        Self {
            path: path.into(),
            state,
        }
    }

    fn nack(&self, address: u16) -> RuntimeError {
        RuntimeError::BusTransaction(format!("{}: no ack from {address:#04x}", self.path).into())
    }
}

impl BusChannel for SimulatedChannel {
    fn open(&mut self, addresses: &[u16]) -> Result<(), RuntimeError> {
        let mut bus = self.state.lock();
        if bus.fail_open {
            return Err(RuntimeError::BusTransaction(
                format!("{}: cannot open bus", self.path).into(),
            ));
        }
        if let Some(missing) = addresses.iter().find(|a| !bus.devices.contains_key(*a)) {
            return Err(self.nack(*missing));
        }
        bus.open = true;
        bus.open_count += 1;
        Ok(())
    }

    fn read(
        &mut self,
        address: u16,
        register: Option<u8>,
        buf: &mut [u8],
    ) -> Result<(), RuntimeError> {
        let bus = self.state.lock();
        if !bus.open || bus.fail_reads {
            return Err(self.nack(address));
        }
        let device = bus.devices.get(&address).ok_or_else(|| self.nack(address))?;
        let start = usize::from(register.unwrap_or(0));
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = device.registers.get(start + offset).copied().unwrap_or(0xFF);
        }
        Ok(())
    }

    fn write(&mut self, address: u16, frame: &[u8]) -> Result<(), RuntimeError> {
        let mut bus = self.state.lock();
        if !bus.open || bus.fail_writes {
            return Err(self.nack(address));
        }
        let device = bus
            .devices
            .get_mut(&address)
            .ok_or_else(|| self.nack(address))?;
        device.frames.push(frame.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        let mut bus = self.state.lock();
        if bus.open {
            bus.open = false;
            bus.close_count += 1;
        }
    }
}

/// Provider handing out simulated channels, one shared state per bus path.
#[derive(Debug, Clone, Default)]
pub struct SimulatedChannels {
    buses: Arc<Mutex<HashMap<SmolStr, SimulatedBusState>>>,
}

impl SimulatedChannels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared state for `bus`, created on first use.
    #[must_use]
    pub fn bus(&self, bus: &str) -> SimulatedBusState {
        self.buses
            .lock()
            .expect("simulated channels lock poisoned")
            .entry(SmolStr::new(bus))
            .or_default()
            .clone()
    }
}

impl ChannelProvider for SimulatedChannels {
    fn channel(&self, bus: &str) -> Result<Box<dyn BusChannel>, RuntimeError> {
        Ok(Box::new(SimulatedChannel::new(bus, self.bus(bus))))
    }
}
