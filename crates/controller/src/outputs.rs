//! Pump and status-LED outputs via GPIO. The `gpio` feature gates the real
//! rppal driver; without it, a mock implementation tracks state and logs.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ports::{OutputBank, OutputLine};

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Clonable handle over one output bank. The wake cycle and the watchdog
/// task hold clones of the same pins, so the emergency path can drive
/// everything off before forcing sleep.
pub struct SharedOutputs<O>(Arc<Mutex<O>>);

impl<O> Clone for SharedOutputs<O> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<O: OutputBank> SharedOutputs<O> {
    pub fn new(inner: O) -> Self {
        Self(Arc::new(Mutex::new(inner)))
    }

    /// Run `f` against the underlying bank.
    pub fn with<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        let mut guard = match self.0.lock() {
            Ok(guard) => guard,
            // A panic while holding the lock cannot be allowed to keep the
            // pump energized; take the bank anyway.
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl<O: OutputBank> OutputBank for SharedOutputs<O> {
    fn set(&mut self, line: OutputLine, on: bool) {
        self.with(|o| o.set(line, on))
    }

    fn all_off(&mut self) {
        self.with(|o| o.all_off())
    }
}

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

/// GPIO pin assignment for the logical output lines.
#[derive(Debug, Clone, Copy)]
pub struct OutputPins {
    pub pump: u8,
    pub status_led: u8,
}

fn lines(pins: OutputPins) -> [(OutputLine, u8); 2] {
    [
        (OutputLine::Pump, pins.pump),
        (OutputLine::StatusLed, pins.status_led),
    ]
}

// ---------------------------------------------------------------------------
// Real GPIO outputs (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct GpioOutputs {
    pins: HashMap<OutputLine, OutputPin>,
    active_low: bool, // pump relay boards are commonly active-low
}

#[cfg(feature = "gpio")]
impl GpioOutputs {
    pub fn new(assignment: OutputPins, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new()?;
        let mut pins = HashMap::new();

        for (line, pin_num) in lines(assignment) {
            let mut pin = gpio.get(pin_num)?.into_output();

            // Fail-safe: ensure OFF at startup
            if active_low {
                pin.set_high();
            } else {
                pin.set_low();
            }

            pins.insert(line, pin);
        }

        Ok(Self { pins, active_low })
    }
}

#[cfg(feature = "gpio")]
impl OutputBank for GpioOutputs {
    fn set(&mut self, line: OutputLine, on: bool) {
        if let Some(pin) = self.pins.get_mut(&line) {
            // active-low: LOW = ON, HIGH = OFF
            if on != self.active_low {
                pin.set_high()
            } else {
                pin.set_low()
            }
            tracing::info!(?line, on, "output set");
        }
    }

    fn all_off(&mut self) {
        let keys: Vec<OutputLine> = self.pins.keys().copied().collect();
        for line in keys {
            self.set(line, false);
        }
    }
}

// ---------------------------------------------------------------------------
// Mock outputs (development — no hardware, logs state changes)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct GpioOutputs {
    pub(crate) states: HashMap<OutputLine, bool>,
}

#[cfg(not(feature = "gpio"))]
impl GpioOutputs {
    pub fn new(assignment: OutputPins, _active_low: bool) -> Result<Self> {
        let mut states = HashMap::new();
        for (line, pin_num) in lines(assignment) {
            tracing::info!(?line, gpio = pin_num, "[mock-gpio] registered output (not wired)");
            states.insert(line, false);
        }
        Ok(Self { states })
    }
}

#[cfg(not(feature = "gpio"))]
impl OutputBank for GpioOutputs {
    fn set(&mut self, line: OutputLine, on: bool) {
        if let Some(state) = self.states.get_mut(&line) {
            *state = on;
            tracing::info!(?line, on, "[mock-gpio] output set");
        }
    }

    fn all_off(&mut self) {
        let keys: Vec<OutputLine> = self.states.keys().copied().collect();
        for line in keys {
            self.set(line, false);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pins() -> OutputPins {
        OutputPins {
            pump: 17,
            status_led: 27,
        }
    }

    // -- GpioOutputs (mock) ---------------------------------------------------

    #[test]
    fn new_registers_both_lines_off() {
        let bank = GpioOutputs::new(pins(), true).unwrap();
        assert_eq!(bank.states.len(), 2);
        assert!(!bank.states[&OutputLine::Pump]);
        assert!(!bank.states[&OutputLine::StatusLed]);
    }

    #[test]
    fn set_pump_on() {
        let mut bank = GpioOutputs::new(pins(), true).unwrap();
        bank.set(OutputLine::Pump, true);
        assert!(bank.states[&OutputLine::Pump]);
        assert!(!bank.states[&OutputLine::StatusLed]);
    }

    #[test]
    fn set_then_clear() {
        let mut bank = GpioOutputs::new(pins(), true).unwrap();
        bank.set(OutputLine::StatusLed, true);
        bank.set(OutputLine::StatusLed, false);
        assert!(!bank.states[&OutputLine::StatusLed]);
    }

    #[test]
    fn all_off_resets_everything() {
        let mut bank = GpioOutputs::new(pins(), true).unwrap();
        bank.set(OutputLine::Pump, true);
        bank.set(OutputLine::StatusLed, true);
        bank.all_off();
        assert!(!bank.states[&OutputLine::Pump]);
        assert!(!bank.states[&OutputLine::StatusLed]);
    }

    // -- SharedOutputs --------------------------------------------------------

    #[test]
    fn shared_clones_drive_the_same_pins() {
        let mut a = SharedOutputs::new(GpioOutputs::new(pins(), true).unwrap());
        let mut b = a.clone();

        a.set(OutputLine::Pump, true);
        assert!(b.with(|bank| bank.states[&OutputLine::Pump]));

        b.all_off();
        assert!(!a.with(|bank| bank.states[&OutputLine::Pump]));
    }
}
