//! NES Console Implementation.
//!
//! The Console struct provides the high-level emulation API, managing the
//! CPU, PPU, and mapper integration with proper timing.

use crate::bus::{ControllerState, NesBus};
use crate::input::{Button, InputDevice, InputRegistry};
use crate::save_state::{Reader, SnapshotError, Writer};
use rustynes_cpu::{Cpu, Status};
use rustynes_mappers::{Mapper, Rom, RomError, create_mapper};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, string::String, vec::Vec};

/// NES emulation timing constants.
pub mod timing {
    /// Master clock frequency (NTSC).
    pub const MASTER_CLOCK_NTSC: u32 = 21_477_272;
    /// CPU clock frequency (NTSC).
    pub const CPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 12;
    /// PPU clock frequency (NTSC).
    pub const PPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 4;
    /// CPU cycles per frame (NTSC).
    pub const CPU_CYCLES_PER_FRAME: u32 = 29_780;
    /// PPU dots per scanline.
    pub const PPU_DOTS_PER_SCANLINE: u16 = 341;
    /// Total scanlines (including vblank).
    pub const PPU_SCANLINES: u16 = 262;
    /// Target frame rate (NTSC).
    pub const FRAME_RATE_NTSC: f64 = 60.0988;
}

/// Console error type.
#[derive(Debug, Clone)]
pub enum ConsoleError {
    /// ROM loading error.
    RomError(RomError),
    /// Invalid state.
    InvalidState(String),
}

impl From<RomError> for ConsoleError {
    fn from(err: RomError) -> Self {
        Self::RomError(err)
    }
}

impl core::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RomError(e) => write!(f, "ROM error: {e}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConsoleError {}

/// NES console emulator.
pub struct Console {
    /// 6502 CPU.
    cpu: Cpu,
    /// System bus (PPU, APU, mapper, RAM).
    bus: NesBus,
    /// Frame buffer (256x240 RGBA).
    framebuffer: Vec<u8>,
    /// Total CPU cycles executed.
    total_cycles: u64,
    /// Frame counter.
    frame_count: u64,
    /// Is emulation running?
    running: bool,
    /// Cooperative stop flag; set by [`Self::stop`], checked by callers that
    /// drive the emulation loop (e.g. [`Self::run_program`]).
    stop_requested: bool,
    /// Pluggable external input devices, one per controller port.
    input_registry: InputRegistry,
}

impl Console {
    /// Create a new console with the given ROM.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn new(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        let rom = Rom::load(rom_data)?;
        let mapper = create_mapper(&rom)?;
        Self::with_mapper(mapper)
    }

    /// Create a new console from ROM bytes (alias for `new`).
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn from_rom_bytes(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        Self::new(rom_data)
    }

    /// Create a new console from ROM bytes with sample rate configuration.
    ///
    /// Note: audio synthesis is out of scope for this crate, so the sample
    /// rate is accepted for API compatibility but otherwise unused.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn from_rom_bytes_with_sample_rate(
        rom_data: &[u8],
        _sample_rate: u32,
    ) -> Result<Self, ConsoleError> {
        Self::new(rom_data)
    }

    /// Create a console with a pre-created mapper.
    ///
    /// # Errors
    ///
    /// Returns an error if the console cannot be initialized.
    pub fn with_mapper(mapper: Box<dyn Mapper>) -> Result<Self, ConsoleError> {
        let bus = NesBus::new(mapper);
        let cpu = Cpu::new();

        Ok(Self {
            cpu,
            bus,
            framebuffer: vec![0; 256 * 240 * 4],
            total_cycles: 0,
            frame_count: 0,
            running: true,
            stop_requested: false,
            input_registry: InputRegistry::new(),
        })
    }

    /// Reset the console to initial state.
    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.bus);
        self.bus.reset();
        self.total_cycles = 0;
        self.running = true;
        self.stop_requested = false;
    }

    /// Power on the console (cold boot).
    pub fn power_on(&mut self) {
        self.reset();
    }

    /// Load a new ROM into the console, replacing the current mapper.
    ///
    /// Equivalent to building a fresh [`Console`] from `rom_data`, except
    /// registered input devices and the framebuffer allocation are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be parsed or uses an unsupported mapper.
    pub fn load_rom(&mut self, rom_data: &[u8]) -> Result<(), ConsoleError> {
        let rom = Rom::load(rom_data)?;
        let mapper = create_mapper(&rom)?;
        self.bus = NesBus::new(mapper);
        self.cpu = Cpu::new();
        self.reset();
        Ok(())
    }

    /// Load raw bytes directly into RAM at `addr` and position the program
    /// counter there, bypassing the normal cartridge/reset-vector path.
    ///
    /// Intended for driving the CPU with small hand-written test programs;
    /// bytes that fall outside the 2KB internal RAM window are not written.
    /// The caller drives execution afterwards with [`Self::step`] or
    /// [`Self::step_to`]; this only loads and positions the program.
    pub fn run_program(&mut self, program: &[u8], addr: u16) {
        for (i, &byte) in program.iter().enumerate() {
            let Some(target) = addr.checked_add(i as u16) else {
                break;
            };
            if (target as usize) < self.bus.ram.len() {
                self.bus.ram[target as usize] = byte;
            }
        }
        self.cpu.pc = addr;
        self.stop_requested = false;
    }

    /// Request that the emulation loop stop at the next cooperative check
    /// point. Does not interrupt an in-progress [`Self::step`] call.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Check whether [`Self::stop`] has been called since the last reset.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Register an external input device against a controller port (0 or 1).
    pub fn register_input(&mut self, port: usize, device: Box<dyn InputDevice>) {
        self.input_registry.register(port, device);
    }

    /// Unregister the input device at a controller port, if any.
    pub fn unregister_input(&mut self, port: usize) {
        self.input_registry.unregister(port);
    }

    /// Unregister all input devices.
    pub fn unregister_all_inputs(&mut self) {
        self.input_registry.unregister_all();
    }

    /// Set a single button on controller 1.
    pub fn set_button_1(&mut self, button: Button, pressed: bool) {
        Self::apply_button(&mut self.bus.controller1, button, pressed);
    }

    /// Set a single button on controller 2.
    pub fn set_button_2(&mut self, button: Button, pressed: bool) {
        Self::apply_button(&mut self.bus.controller2, button, pressed);
    }

    fn apply_button(state: &mut ControllerState, button: Button, pressed: bool) {
        if pressed {
            state.buttons |= button as u8;
        } else {
            state.buttons &= !(button as u8);
        }
    }

    /// Poll any registered input devices and apply their state to the
    /// corresponding controller port, overriding the port's last pushed
    /// button state for devices that are currently registered.
    fn poll_registered_inputs(&mut self) {
        if let Some(buttons) = self.input_registry.poll(0) {
            self.bus.controller1.buttons = buttons;
        }
        if let Some(buttons) = self.input_registry.poll(1) {
            self.bus.controller2.buttons = buttons;
        }
    }

    /// Run emulation for one CPU instruction.
    ///
    /// Returns the number of CPU cycles executed.
    pub fn step(&mut self) -> u8 {
        if !self.running {
            return 0;
        }

        self.poll_registered_inputs();

        // Handle OAM DMA
        if self.bus.oam_dma_pending() {
            let dma_cycles = self.bus.execute_oam_dma();
            self.step_components(dma_cycles);
            return dma_cycles as u8;
        }

        // Handle interrupts
        if self.bus.nmi_pending() {
            self.bus.acknowledge_nmi();
            self.cpu.trigger_nmi();
        } else if self.bus.irq_pending() && !self.cpu.status().contains(Status::I) {
            self.cpu.set_irq(true);
        }

        // Execute one CPU instruction
        let cycles = self.cpu.step(&mut self.bus);
        self.step_components(u16::from(cycles));
        self.bus.add_cpu_cycles(cycles);
        self.total_cycles += u64::from(cycles);

        cycles
    }

    /// Step the PPU for the given number of CPU cycles.
    fn step_components(&mut self, cpu_cycles: u16) {
        for _ in 0..cpu_cycles {
            // Step PPU (3 dots per CPU cycle)
            self.bus.step_ppu();
        }
    }

    /// Run emulation for one frame (approximately 29,780 CPU cycles).
    ///
    /// Returns the actual number of CPU cycles executed.
    pub fn step_frame(&mut self) -> u64 {
        let start_cycles = self.total_cycles;
        let target_cycles = self.total_cycles + u64::from(timing::CPU_CYCLES_PER_FRAME);

        while self.total_cycles < target_cycles && self.running {
            self.step();
        }

        // Copy PPU framebuffer
        self.update_framebuffer();
        self.frame_count += 1;

        self.total_cycles - start_cycles
    }

    /// Run emulation for one frame with cycle-accurate timing.
    ///
    /// This is an alias for `step_frame()` for API compatibility.
    /// Returns the actual number of CPU cycles executed.
    pub fn step_frame_accurate(&mut self) -> u64 {
        self.step_frame()
    }

    /// Update the framebuffer from PPU output.
    fn update_framebuffer(&mut self) {
        let ppu_buffer = self.bus.ppu.frame_buffer();

        // Convert PPU palette indices to RGBA
        for (i, &palette_idx) in ppu_buffer.iter().enumerate() {
            let rgb = crate::palette::NES_PALETTE[palette_idx as usize & 0x3F];
            let offset = i * 4;
            self.framebuffer[offset] = rgb.0; // R
            self.framebuffer[offset + 1] = rgb.1; // G
            self.framebuffer[offset + 2] = rgb.2; // B
            self.framebuffer[offset + 3] = 255; // A
        }
    }

    /// Get the current framebuffer (256x240 RGBA).
    #[must_use]
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Set controller 1 state from button byte.
    pub fn set_controller_1(&mut self, buttons: u8) {
        self.bus.controller1 = ControllerState { buttons };
    }

    /// Set controller 2 state from button byte.
    pub fn set_controller_2(&mut self, buttons: u8) {
        self.bus.controller2 = ControllerState { buttons };
    }

    /// Set controller 1 state.
    pub fn set_controller1(&mut self, state: ControllerState) {
        self.bus.controller1 = state;
    }

    /// Set controller 2 state.
    pub fn set_controller2(&mut self, state: ControllerState) {
        self.bus.controller2 = state;
    }

    /// Get controller 1 state.
    #[must_use]
    pub fn controller1(&self) -> ControllerState {
        self.bus.controller1
    }

    /// Get controller 2 state.
    #[must_use]
    pub fn controller2(&self) -> ControllerState {
        self.bus.controller2
    }

    /// Get the total CPU cycles executed.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Get the frame count.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Check if emulation is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pause emulation.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resume emulation.
    pub fn resume(&mut self) {
        self.running = true;
    }

    /// Get a reference to the CPU for debugging.
    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Get a reference to the PPU for debugging.
    #[must_use]
    pub fn ppu(&self) -> &rustynes_ppu::Ppu {
        &self.bus.ppu
    }

    /// Get the total CPU cycles (alias for `total_cycles`).
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Peek at memory without side effects.
    ///
    /// This is useful for debugging/display purposes where we don't want
    /// to trigger PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek_memory(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Get a reference to the bus for debugging.
    #[must_use]
    pub fn bus(&self) -> &NesBus {
        &self.bus
    }

    /// Get a mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut NesBus {
        &mut self.bus
    }

    /// Get the mapper number.
    #[must_use]
    pub fn mapper_number(&self) -> u16 {
        self.bus.mapper.mapper_number()
    }

    /// Get the mapper name.
    #[must_use]
    pub fn mapper_name(&self) -> &'static str {
        self.bus.mapper.mapper_name()
    }

    /// Check if the ROM has battery-backed RAM.
    #[must_use]
    pub fn has_battery(&self) -> bool {
        self.bus.mapper.has_battery()
    }

    /// Get battery-backed RAM for saving.
    #[must_use]
    pub fn battery_ram(&self) -> Option<&[u8]> {
        self.bus.mapper.battery_ram()
    }

    /// Load battery-backed RAM.
    pub fn load_battery_ram(&mut self, data: &[u8]) {
        self.bus.mapper.set_battery_ram(data);
    }

    /// Take a read-only snapshot of the pieces of state most useful for
    /// debuggers and frontends: the current frame buffer, CPU RAM, PPU
    /// nametable RAM, and OAM.
    #[must_use]
    pub fn snapshot(&self) -> ConsoleSnapshot<'_> {
        ConsoleSnapshot {
            frame_buffer: &self.framebuffer,
            frame_width: 256,
            frame_height: 240,
            cpu_ram: &self.bus.ram,
            ppu_vram: &self.bus.ciram,
            ppu_oam: self.bus.ppu.oam(),
        }
    }

    /// Serialize the complete emulation state into a flat byte blob.
    ///
    /// The blob can later be restored with [`Self::deserialize`], including
    /// on a different `Console` instance built from the same ROM/mapper.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.bytes(crate::save_state::MAGIC);
        w.u32(crate::save_state::VERSION);
        w.u64(self.total_cycles);
        w.bool(self.stop_requested);

        // CPU
        w.u8(self.cpu.a);
        w.u8(self.cpu.x);
        w.u8(self.cpu.y);
        w.u16(self.cpu.pc);
        w.u8(self.cpu.sp);
        w.u8(self.cpu.status().bits());
        w.u64(self.cpu.cycles);
        w.u8(self.cpu.stall);
        w.bool(self.cpu.jammed);
        let (nmi_pending, irq_pending, prev_irq_inhibit, suppress_nmi_next) =
            self.cpu.interrupt_latches();
        w.bool(nmi_pending);
        w.bool(irq_pending);
        w.bool(prev_irq_inhibit);
        w.bool(suppress_nmi_next);

        // RAM
        w.bytes(&self.bus.ram);
        w.bytes(&self.bus.ciram);

        // PPU
        let ppu = &self.bus.ppu;
        w.u8(ppu.ctrl().bits());
        w.u8(ppu.mask().bits());
        w.u8(ppu.status().bits());
        w.u16(ppu.scroll().raw_v());
        w.u16(ppu.scroll().raw_t());
        w.u8(ppu.scroll().raw_x());
        w.bool(ppu.scroll().raw_w());
        w.bytes(ppu.oam());
        w.u8(ppu.oam_addr());
        w.bytes(ppu.palette_ram());
        w.u8(ppu.vram_read_buffer());
        w.u8(ppu.open_bus_latch());
        w.u32(ppu.decay_counter());
        w.u16(ppu.scanline());
        w.u16(ppu.dot());
        w.u32(ppu.frame());
        w.bool(ppu.odd_frame());
        w.bool(ppu.nmi_pending());

        // Input
        w.u8(self.bus.controller1.buttons);
        w.u8(self.bus.controller2.buttons);
        let (
            controller1_shift,
            controller2_shift,
            controller_strobe,
            oam_dma_page,
            last_bus_value,
            bus_irq_pending,
            last_a12,
            cpu_cycles,
        ) = self.bus.raw_state();
        w.u8(controller1_shift);
        w.u8(controller2_shift);
        w.bool(controller_strobe);
        w.bool(oam_dma_page.is_some());
        w.u8(oam_dma_page.unwrap_or(0));
        w.u8(last_bus_value);
        w.bool(bus_irq_pending);
        w.bool(last_a12);
        w.u64(cpu_cycles);

        // Mapper
        w.u16(self.bus.mapper.mapper_number());
        let mapper_state = self.bus.mapper.save_state();
        w.u32(mapper_state.len() as u32);
        w.bytes(&mapper_state);

        w.into_inner()
    }

    /// Restore state previously produced by [`Self::serialize`].
    ///
    /// # Errors
    ///
    /// Returns an error if the blob's magic/version is unrecognized, if it
    /// is truncated, or if its mapper sub-blob was produced by a different
    /// mapper than the one currently attached to this console.
    pub fn deserialize(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let mut r = Reader::new(data);

        let magic = r.array::<4>()?;
        if &magic != crate::save_state::MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        let version = r.u32()?;
        if version != crate::save_state::VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        let total_cycles = r.u64()?;
        let stop_requested = r.bool()?;

        // CPU
        let a = r.u8()?;
        let x = r.u8()?;
        let y = r.u8()?;
        let pc = r.u16()?;
        let sp = r.u8()?;
        let status = Status::from_bits_truncate(r.u8()?);
        let cycles = r.u64()?;
        let stall = r.u8()?;
        let jammed = r.bool()?;
        let nmi_pending = r.bool()?;
        let irq_pending = r.bool()?;
        let prev_irq_inhibit = r.bool()?;
        let suppress_nmi_next = r.bool()?;

        // RAM
        let ram = r.array::<2048>()?;
        let ciram = r.array::<2048>()?;

        // PPU
        let ppu_ctrl = r.u8()?;
        let ppu_mask = r.u8()?;
        let ppu_status = r.u8()?;
        let scroll_v = r.u16()?;
        let scroll_t = r.u16()?;
        let scroll_x = r.u8()?;
        let scroll_w = r.bool()?;
        let oam = r.array::<{ rustynes_ppu::OAM_SIZE }>()?;
        let oam_addr = r.u8()?;
        let palette = r.array::<32>()?;
        let vram_read_buffer = r.u8()?;
        let open_bus_latch = r.u8()?;
        let decay_counter = r.u32()?;
        let scanline = r.u16()?;
        let dot = r.u16()?;
        let frame = r.u32()?;
        let odd_frame = r.bool()?;
        let ppu_nmi_pending = r.bool()?;

        // Input
        let controller1_buttons = r.u8()?;
        let controller2_buttons = r.u8()?;
        let controller1_shift = r.u8()?;
        let controller2_shift = r.u8()?;
        let controller_strobe = r.bool()?;
        let oam_dma_present = r.bool()?;
        let oam_dma_value = r.u8()?;
        let last_bus_value = r.u8()?;
        let bus_irq_pending = r.bool()?;
        let last_a12 = r.bool()?;
        let cpu_cycles = r.u64()?;

        // Mapper
        let mapper_number = r.u16()?;
        let actual_mapper_number = self.bus.mapper.mapper_number();
        if mapper_number != actual_mapper_number {
            return Err(SnapshotError::MapperMismatch {
                expected: mapper_number,
                actual: actual_mapper_number,
            });
        }
        let mapper_state_len = r.u32()? as usize;
        let mapper_state = r.bytes(mapper_state_len)?;

        // Everything decoded successfully; now apply it.
        self.total_cycles = total_cycles;
        self.stop_requested = stop_requested;

        self.cpu.restore(
            a,
            x,
            y,
            pc,
            sp,
            status,
            cycles,
            stall,
            jammed,
            nmi_pending,
            irq_pending,
            prev_irq_inhibit,
            suppress_nmi_next,
        );

        self.bus.ram = ram;
        self.bus.ciram = ciram;

        self.bus.ppu.restore_raw_state(
            ppu_ctrl,
            ppu_mask,
            ppu_status,
            scroll_v,
            scroll_t,
            scroll_x,
            scroll_w,
            oam,
            oam_addr,
            palette,
            vram_read_buffer,
            open_bus_latch,
            decay_counter,
            scanline,
            dot,
            frame,
            odd_frame,
            ppu_nmi_pending,
        );

        self.bus.controller1.buttons = controller1_buttons;
        self.bus.controller2.buttons = controller2_buttons;
        self.bus.restore_raw_state(
            controller1_shift,
            controller2_shift,
            controller_strobe,
            oam_dma_present.then_some(oam_dma_value),
            last_bus_value,
            bus_irq_pending,
            last_a12,
            cpu_cycles,
        );

        self.bus.mapper.load_state(mapper_state);

        self.update_framebuffer();

        Ok(())
    }
}

/// A read-only borrowed view over the pieces of emulation state most
/// useful for debuggers and frontends.
///
/// Unlike [`Console::serialize`], this does not capture everything needed
/// to restore execution; it is meant for inspection and display.
pub struct ConsoleSnapshot<'a> {
    /// Current frame buffer (RGBA).
    pub frame_buffer: &'a [u8],
    /// Frame buffer width in pixels.
    pub frame_width: u32,
    /// Frame buffer height in pixels.
    pub frame_height: u32,
    /// CPU internal RAM (2KB).
    pub cpu_ram: &'a [u8; 2048],
    /// PPU nametable RAM (CIRAM, 2KB).
    pub ppu_vram: &'a [u8; 2048],
    /// PPU object attribute memory.
    pub ppu_oam: &'a [u8; rustynes_ppu::OAM_SIZE],
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustynes_mappers::{Mirroring, Nrom, RomHeader};

    #[cfg(not(feature = "std"))]
    use alloc::{boxed::Box, vec, vec::Vec};

    fn create_test_console() -> Console {
        let rom = Rom {
            header: RomHeader {
                prg_rom_size: 32768,
                chr_rom_size: 8192,
                mapper_number: 0,
                submapper: 0,
                mirroring: Mirroring::Vertical,
                has_battery: false,
                has_trainer: false,
                nes2_format: false,
                prg_ram_size: 0,
                prg_nvram_size: 0,
                chr_ram_size: 0,
                chr_nvram_size: 0,
            },
            // Simple program: NOP loop at $8000
            prg_rom: {
                let mut prg = vec![0xEA; 32768]; // Fill with NOPs
                // Reset vector at $FFFC points to $8000
                prg[0x7FFC] = 0x00;
                prg[0x7FFD] = 0x80;
                prg
            },
            chr_rom: vec![0; 8192],
            trainer: None,
        };
        Console::with_mapper(Box::new(Nrom::new(&rom))).unwrap()
    }

    #[test]
    fn test_console_creation() {
        let console = create_test_console();
        assert_eq!(console.mapper_number(), 0);
        assert_eq!(console.mapper_name(), "NROM");
    }

    #[test]
    fn test_console_step() {
        let mut console = create_test_console();
        console.reset();

        let cycles = console.step();
        assert!(cycles > 0);
        assert!(console.total_cycles() > 0);
    }

    #[test]
    fn test_console_framebuffer() {
        let console = create_test_console();
        let fb = console.framebuffer();
        assert_eq!(fb.len(), 256 * 240 * 4);
    }

    #[test]
    fn test_console_pause_resume() {
        let mut console = create_test_console();
        assert!(console.is_running());

        console.pause();
        assert!(!console.is_running());

        console.resume();
        assert!(console.is_running());
    }

    #[test]
    fn test_controller_state() {
        let mut console = create_test_console();

        let state = ControllerState {
            buttons: ControllerState::A | ControllerState::START,
        };
        console.set_controller1(state);

        assert_eq!(console.controller1().buttons, 0x09);
    }

    #[test]
    fn test_console_reset() {
        let mut console = create_test_console();

        // Run some cycles
        for _ in 0..100 {
            console.step();
        }

        let cycles_before = console.total_cycles();
        assert!(cycles_before > 0);

        console.reset();
        assert_eq!(console.total_cycles(), 0);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut console = create_test_console();
        console.reset();
        for _ in 0..50 {
            console.step();
        }

        let blob = console.serialize();
        assert_eq!(&blob[0..4], crate::save_state::MAGIC);

        let cycles_before = console.total_cycles();
        let pc_before = console.cpu().pc;

        for _ in 0..50 {
            console.step();
        }
        assert_ne!(console.total_cycles(), cycles_before);

        console.deserialize(&blob).unwrap();
        assert_eq!(console.total_cycles(), cycles_before);
        assert_eq!(console.cpu().pc, pc_before);
    }

    #[test]
    fn test_deserialize_rejects_bad_magic() {
        let mut console = create_test_console();
        let err = console.deserialize(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidMagic));
    }

    #[test]
    fn test_deserialize_rejects_truncated_blob() {
        let mut console = create_test_console();
        let blob = console.serialize();
        let err = console.deserialize(&blob[..8]).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated { .. }));
    }

    #[test]
    fn test_stop_request() {
        let mut console = create_test_console();
        assert!(!console.stop_requested());

        console.stop();
        assert!(console.stop_requested());

        console.reset();
        assert!(!console.stop_requested());
    }

    #[test]
    fn test_run_program_positions_pc_and_writes_ram() {
        let mut console = create_test_console();
        console.run_program(&[0xA9, 0x42, 0xEA], 0x0200);

        assert_eq!(console.cpu().pc, 0x0200);
        assert_eq!(console.bus().ram[0x0200], 0xA9);
        assert_eq!(console.bus().ram[0x0201], 0x42);
        assert_eq!(console.bus().ram[0x0202], 0xEA);
    }

    struct FixedInput(u8);

    impl InputDevice for FixedInput {
        fn poll(&mut self) -> u8 {
            self.0
        }
    }

    #[test]
    fn test_register_input_overrides_controller1() {
        let mut console = create_test_console();
        console.register_input(0, Box::new(FixedInput(ControllerState::A)));

        console.step();
        assert_eq!(console.controller1().buttons, ControllerState::A);

        console.unregister_input(0);
        console.set_controller_1(0);
        console.step();
        assert_eq!(console.controller1().buttons, 0);
    }

    #[test]
    fn test_unregister_all_inputs() {
        let mut console = create_test_console();
        console.register_input(0, Box::new(FixedInput(ControllerState::A)));
        console.register_input(1, Box::new(FixedInput(ControllerState::B)));

        console.unregister_all_inputs();
        console.step();

        assert_eq!(console.controller1().buttons, 0);
        assert_eq!(console.controller2().buttons, 0);
    }

    #[test]
    fn test_console_snapshot_view() {
        let console = create_test_console();
        let snap = console.snapshot();
        assert_eq!(snap.frame_width, 256);
        assert_eq!(snap.frame_height, 240);
        assert_eq!(snap.cpu_ram.len(), 2048);
    }
}
