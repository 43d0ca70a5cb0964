//! Addressable bus with cached module port images.

use smol_str::SmolStr;

use crate::error::RuntimeError;

use super::channel::BusChannel;
use super::expander::{Direction, ExpanderKind};

/// Index of an input module within its bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputHandle(usize);

/// Index of an output module within its bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputHandle(usize);

#[derive(Debug)]
struct InputModule {
    address: u16,
    kind: ExpanderKind,
    invert: bool,
    image: u16,
}

#[derive(Debug)]
struct OutputModule {
    address: u16,
    kind: ExpanderKind,
    invert: bool,
    staged: u16,
    committed: Option<u16>,
}

/// One physical bus and the modules registered on it.
///
/// `read_inputs` and `write_outputs` each perform one bulk transaction per
/// cycle; pin accessors only touch the cache.
pub struct Bus {
    path: SmolStr,
    channel: Box<dyn BusChannel>,
    initialized: bool,
    inputs: Vec<InputModule>,
    outputs: Vec<OutputModule>,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("path", &self.path)
            .field("initialized", &self.initialized)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl Bus {
    #[must_use]
    pub fn new(path: impl Into<SmolStr>, channel: Box<dyn BusChannel>) -> Self {
        Self {
            path: path.into(),
            channel,
            initialized: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Addresses of every registered module, inputs first.
    pub fn addresses(&self) -> impl Iterator<Item = u16> + '_ {
        self.inputs
            .iter()
            .map(|module| module.address)
            .chain(self.outputs.iter().map(|module| module.address))
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn register_input(
        &mut self,
        address: u16,
        kind: ExpanderKind,
        invert: bool,
    ) -> Result<InputHandle, RuntimeError> {
        self.check_registration(address)?;
        self.inputs.push(InputModule {
            address,
            kind,
            invert,
            image: 0,
        });
        Ok(InputHandle(self.inputs.len() - 1))
    }

    pub fn register_output(
        &mut self,
        address: u16,
        kind: ExpanderKind,
        invert: bool,
    ) -> Result<OutputHandle, RuntimeError> {
        self.check_registration(address)?;
        self.outputs.push(OutputModule {
            address,
            kind,
            invert,
            staged: 0,
            committed: None,
        });
        Ok(OutputHandle(self.outputs.len() - 1))
    }

    fn check_registration(&self, address: u16) -> Result<(), RuntimeError> {
        if self.initialized {
            return Err(RuntimeError::BusInitialized(self.path.clone()));
        }
        let taken = self.inputs.iter().any(|module| module.address == address)
            || self.outputs.iter().any(|module| module.address == address);
        if taken {
            return Err(RuntimeError::DuplicateAddress {
                bus: self.path.clone(),
                address,
            });
        }
        Ok(())
    }

    /// Open the channel and configure every registered module.
    pub fn init(&mut self) -> Result<(), RuntimeError> {
        if self.initialized {
            return Err(RuntimeError::BusInitialized(self.path.clone()));
        }
        let addresses: Vec<u16> = self
            .inputs
            .iter()
            .map(|module| module.address)
            .chain(self.outputs.iter().map(|module| module.address))
            .collect();
        self.channel.open(&addresses)?;
        if let Err(err) = self.configure_modules() {
            self.channel.close();
            return Err(err);
        }
        self.initialized = true;
        tracing::debug!(
            bus = %self.path,
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "bus initialized"
        );
        Ok(())
    }

    fn configure_modules(&mut self) -> Result<(), RuntimeError> {
        let inputs = self
            .inputs
            .iter()
            .map(|module| (module.address, module.kind, Direction::Input));
        let outputs = self
            .outputs
            .iter()
            .map(|module| (module.address, module.kind, Direction::Output));
        let frames: Vec<(u16, Vec<u8>)> = inputs
            .chain(outputs)
            .flat_map(|(address, kind, direction)| {
                kind.init_frames(direction)
                    .into_iter()
                    .map(move |frame| (address, frame))
            })
            .collect();
        for (address, frame) in frames {
            self.channel.write(address, &frame)?;
        }
        Ok(())
    }

    /// Read every input module; the cache is only updated if all reads succeed.
    pub fn read_inputs(&mut self) -> Result<(), RuntimeError> {
        self.ensure_initialized()?;
        let mut images = Vec::with_capacity(self.inputs.len());
        let mut buf = [0u8; 2];
        for module in &self.inputs {
            let frame = &mut buf[..module.kind.frame_len()];
            self.channel
                .read(module.address, module.kind.input_register(), frame)?;
            images.push(module.kind.decode_input(frame));
        }
        for (module, image) in self.inputs.iter_mut().zip(images) {
            module.image = image;
        }
        Ok(())
    }

    /// Push staged output images for modules that changed or were never written.
    ///
    /// Stops at the first failing module; unwritten modules are retried on the
    /// next call.
    pub fn write_outputs(&mut self) -> Result<(), RuntimeError> {
        self.ensure_initialized()?;
        for module in &mut self.outputs {
            if module.committed == Some(module.staged) {
                continue;
            }
            let wire = if module.invert {
                !module.staged & module.kind.pin_mask()
            } else {
                module.staged
            };
            self.channel
                .write(module.address, &module.kind.output_frame(wire))?;
            module.committed = Some(module.staged);
        }
        Ok(())
    }

    /// Cached level of an input pin.
    pub fn get_input(&self, handle: InputHandle, pin: u8) -> Result<bool, RuntimeError> {
        let module = self.input_module(handle)?;
        check_pin(module.kind, pin, module.address)?;
        let raw = module.image & (1 << pin) != 0;
        Ok(raw != module.invert)
    }

    /// Stage an output pin level for the next `write_outputs`.
    pub fn set_output(
        &mut self,
        handle: OutputHandle,
        pin: u8,
        value: bool,
    ) -> Result<(), RuntimeError> {
        let path = self.path.clone();
        let module = self
            .outputs
            .get_mut(handle.0)
            .ok_or_else(|| RuntimeError::InvalidConfig(format!("{path}: unknown output module").into()))?;
        check_pin(module.kind, pin, module.address)?;
        if value {
            module.staged |= 1 << pin;
        } else {
            module.staged &= !(1 << pin);
        }
        Ok(())
    }

    #[must_use]
    pub fn input_kind(&self, handle: InputHandle) -> Option<ExpanderKind> {
        self.inputs.get(handle.0).map(|module| module.kind)
    }

    #[must_use]
    pub fn output_kind(&self, handle: OutputHandle) -> Option<ExpanderKind> {
        self.outputs.get(handle.0).map(|module| module.kind)
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    /// Release the channel. Safe to call more than once.
    pub fn close(&mut self) {
        if self.initialized {
            self.channel.close();
            self.initialized = false;
            tracing::debug!(bus = %self.path, "bus closed");
        }
    }

    fn ensure_initialized(&self) -> Result<(), RuntimeError> {
        if self.initialized {
            Ok(())
        } else {
            Err(RuntimeError::BusNotInitialized(self.path.clone()))
        }
    }

    fn input_module(&self, handle: InputHandle) -> Result<&InputModule, RuntimeError> {
        self.inputs.get(handle.0).ok_or_else(|| {
            RuntimeError::InvalidConfig(format!("{}: unknown input module", self.path).into())
        })
    }
}

/// Reject pins outside the module's pin range.
pub fn check_pin(kind: ExpanderKind, pin: u8, address: u16) -> Result<(), RuntimeError> {
    if pin < kind.pin_count() {
        return Ok(());
    }
    Err(RuntimeError::InvalidPin {
        component: format!("{kind}@{address:#04x}").into(),
        pin: u32::from(pin),
        pins: kind.pin_count(),
    })
}
