//! NES controller input handling.
//!
//! This module emulates the NES standard controller protocol, which uses a
//! **strobe-based parallel-to-serial shift register** (4021 IC) to read
//! 8 button states sequentially.
//!
//! # Hardware Protocol
//!
//! The NES controller protocol works as follows:
//!
//! 1. **Strobe** ($4016 write, bit 0):
//!    - Write 1: Continuously reload shift register (parallel mode)
//!    - Write 0: Enable serial reads (shift mode)
//!    - Falling edge (1 → 0) latches current button states
//!
//! 2. **Serial Read** ($4016/$4017 read):
//!    - Returns one button bit per read
//!    - Order: A, B, Select, Start, Up, Down, Left, Right
//!    - Reads 9+ always return 1
//!
//! # Registers
//!
//! - **$4016**: Controller 1 data (read) / Strobe (write)
//! - **$4017**: Controller 2 data (read) / APU Frame Counter (write)
//!
//! **Note**: $4016 writes strobe BOTH controllers simultaneously.
//!
//! # Usage Example
//!
//! ```no_run
//! use rustynes_core::{Console, Button};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rom = std::fs::read("game.nes")?;
//! let mut console = Console::from_rom_bytes(&rom)?;
//!
//! // Set controller 1 button state
//! console.set_button_1(Button::A, true);       // Press A
//! console.set_button_1(Button::Start, true);   // Press Start
//!
//! // Step frames
//! for _ in 0..60 {
//!     console.step_frame();
//! }
//!
//! // Release buttons
//! console.set_button_1(Button::A, false);
//! console.set_button_1(Button::Start, false);
//! # Ok(())
//! # }
//! ```

mod controller;

pub use controller::{Button, Controller};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

/// Number of controller ports this core models (standard NES has two).
pub const MAX_PLAYERS: usize = 2;

/// A pluggable external input source (keyboard, gamepad, replay stream)
/// that can be registered against a controller port.
///
/// Host applications implement this to feed live input into the console
/// without the core depending on any particular input backend; the core
/// polls registered devices once per [`crate::Console::step`] call.
pub trait InputDevice: Send {
    /// Poll the current button state, encoded the same way as
    /// [`Controller::buttons`] (bit 0 = A .. bit 7 = Right).
    fn poll(&mut self) -> u8;
}

/// Registry of pluggable input devices, one slot per controller port.
#[derive(Default)]
pub struct InputRegistry {
    devices: [Option<Box<dyn InputDevice>>; MAX_PLAYERS],
}

impl InputRegistry {
    /// Create an empty registry (no devices registered).
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: [None, None],
        }
    }

    /// Register a device against a port, replacing any previously
    /// registered device there. Ports beyond [`MAX_PLAYERS`] are ignored.
    pub fn register(&mut self, port: usize, device: Box<dyn InputDevice>) {
        if let Some(slot) = self.devices.get_mut(port) {
            *slot = Some(device);
        }
    }

    /// Remove the device registered at a port, if any.
    pub fn unregister(&mut self, port: usize) {
        if let Some(slot) = self.devices.get_mut(port) {
            *slot = None;
        }
    }

    /// Remove all registered devices.
    pub fn unregister_all(&mut self) {
        for slot in &mut self.devices {
            *slot = None;
        }
    }

    /// Poll the device registered at a port, if any.
    pub fn poll(&mut self, port: usize) -> Option<u8> {
        self.devices.get_mut(port).and_then(|slot| slot.as_mut()).map(|d| d.poll())
    }
}
