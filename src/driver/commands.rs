//! Host command surface: switch outputs, query pins, reset the board

use crate::core::{
    Error, ModuleInfo, ModuleType, PropertyChanged, Result, DOMAIN, GPIO_DESCRIPTION,
    REGISTER_DESCRIPTION, STATUS_LEVEL,
};
use crate::driver::DriverState;
use crate::hardware::{is_register, register_addresses, OUTPUT_ADDRESSES};
use std::fmt;
use std::str::FromStr;

/// Commands the host can route to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read a pin and refresh its cached value
    ParameterStatus,
    /// Drive a pin to 1
    ControlOn,
    /// Drive a pin to 0
    ControlOff,
    /// Clear every output and register
    ControlReset,
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Parameter.Status" => Ok(Command::ParameterStatus),
            "Control.On" => Ok(Command::ControlOn),
            "Control.Off" => Ok(Command::ControlOff),
            "Control.Reset" => Ok(Command::ControlReset),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::ParameterStatus => "Parameter.Status",
            Command::ControlOn => "Control.On",
            Command::ControlOff => "Control.Off",
            Command::ControlReset => "Control.Reset",
        };
        f.write_str(name)
    }
}

impl DriverState {
    /// Execute a host command against `address`
    ///
    /// Returns the pin value for [`Command::ParameterStatus`], `None` otherwise.
    pub fn execute(&mut self, command: Command, address: u8) -> Result<Option<String>> {
        log::debug!("Command {} on {}", command, address);

        match command {
            Command::ControlOn => {
                self.switch(address, true)?;
                Ok(None)
            }
            Command::ControlOff => {
                self.switch(address, false)?;
                Ok(None)
            }
            Command::ParameterStatus => {
                let value = self.source.read(address)?.trim().to_string();
                if is_register(address) {
                    self.reg_pins.insert(address, value.clone());
                } else {
                    self.gpio_pins.insert(address, value != "0");
                }
                Ok(Some(value))
            }
            Command::ControlReset => {
                let cleanup = self.clean_up_all_pins();
                for level in self.gpio_pins.values_mut() {
                    *level = false;
                }
                for value in self.reg_pins.values_mut() {
                    *value = "0".to_string();
                }
                self.engine.reset();
                log::info!("Board reset");
                cleanup.map(|_| None)
            }
        }
    }

    fn switch(&mut self, address: u8, on: bool) -> Result<()> {
        let level: u32 = if on { 1 } else { 0 };
        self.source.write(address, &level.to_string())?;

        if is_register(address) {
            self.reg_pins.insert(address, level.to_string());
        } else {
            self.gpio_pins.insert(address, on);
        }
        self.sink.emit(PropertyChanged::new(address, GPIO_DESCRIPTION, STATUS_LEVEL, level));
        Ok(())
    }

    /// Drive every output and register file to 0
    ///
    /// Every pin is attempted; the first failure is returned.
    pub fn clean_up_all_pins(&mut self) -> Result<()> {
        let mut first_error = None;

        for address in OUTPUT_ADDRESSES.into_iter().chain(register_addresses()) {
            if let Err(e) = self.source.write(address, "0") {
                log::warn!("Failed to clear pin {}: {}", address, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// List every module and publish its current value
    pub fn modules(&mut self) -> Vec<ModuleInfo> {
        let mut modules = Vec::with_capacity(self.reg_pins.len() + self.gpio_pins.len());

        for (&address, value) in &self.reg_pins {
            modules.push(ModuleInfo {
                domain: DOMAIN.to_string(),
                address,
                description: REGISTER_DESCRIPTION.to_string(),
                module_type: ModuleType::Sensor,
            });
            self.sink.emit(PropertyChanged::new(
                address,
                REGISTER_DESCRIPTION,
                STATUS_LEVEL,
                value.as_str(),
            ));
        }

        for (&address, &level) in &self.gpio_pins {
            modules.push(ModuleInfo {
                domain: DOMAIN.to_string(),
                address,
                description: GPIO_DESCRIPTION.to_string(),
                module_type: ModuleType::Switch,
            });
            self.sink.emit(PropertyChanged::new(
                address,
                GPIO_DESCRIPTION,
                STATUS_LEVEL,
                if level { 1u32 } else { 0 },
            ));
        }

        modules
    }
}
