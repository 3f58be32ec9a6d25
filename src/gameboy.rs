use crate::{
    CLOCK_HZ,
    cartridge::{Cartridge, LoadError},
    cpu::Cpu,
    input::JoypadState,
    mmu::Mmu,
    ppu::{SCREEN_HEIGHT, SCREEN_WIDTH},
    savestate::{SaveState, SaveStateError},
};

/// The whole machine: CPU plus bus, driven from a single stepping loop.
pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    /// Unspent fraction of the cycle budget carried between ticks.
    cycle_budget: f64,
}

impl GameBoy {
    /// Build a machine around a raw ROM image. Header problems and unknown
    /// mapper types surface here; a constructed machine never fails later.
    pub fn new(rom: Vec<u8>) -> Result<Self, LoadError> {
        let cart = Cartridge::from_bytes(rom)?;
        Ok(Self {
            cpu: Cpu::new(),
            mmu: Mmu::new(cart),
            cycle_budget: 0.0,
        })
    }

    /// Reset CPU and bus to power-on defaults, keeping the loaded cartridge
    /// (including its banking and RTC state).
    pub fn reset(&mut self) {
        self.cpu = Cpu::new();
        self.mmu.reset();
        self.cycle_budget = 0.0;
    }

    pub fn title(&self) -> &str {
        self.mmu.cart.title()
    }

    /// Convert elapsed wall time into an emulated cycle budget and run
    /// instructions until it is spent. The fractional remainder carries over
    /// so long-run timing matches the 4.194304 MHz clock exactly.
    pub fn tick(&mut self, dt_seconds: f64) {
        self.cycle_budget += dt_seconds * CLOCK_HZ as f64;
        while self.cycle_budget >= 1.0 {
            self.cycle_budget -= self.step_instruction() as f64;
        }
    }

    /// Run one CPU step and propagate its cycle cost: timer first, then the
    /// MBC RTC, then the rest of the hardware. The timer-before-next-fetch
    /// ordering is what makes timer interrupts visible to the CPU's next
    /// interrupt check.
    pub fn step_instruction(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.mmu);
        self.mmu.timer.step(cycles, &mut self.mmu.interrupts);
        self.mmu.cart.step_rtc(cycles);
        self.mmu.ppu.step(cycles, &mut self.mmu.interrupts);
        self.mmu.serial.step(cycles, &mut self.mmu.interrupts);
        self.mmu.apu.step(cycles);
        self.mmu.dma_step(cycles);
        cycles
    }

    /// Inject the frontend's button snapshot. Pressing any button wakes a
    /// STOP-stalled CPU.
    pub fn set_joypad(&mut self, state: JoypadState) {
        self.mmu.input.set_state(state, &mut self.mmu.interrupts);
        if self.cpu.stopped && state.any_pressed() {
            self.cpu.stopped = false;
        }
    }

    /// Most recently completed frame; the core never blocks on consumption.
    pub fn framebuffer(&self) -> &[u32; SCREEN_WIDTH * SCREEN_HEIGHT] {
        self.mmu.ppu.framebuffer()
    }

    pub fn frame_ready(&self) -> bool {
        self.mmu.ppu.frame_ready()
    }

    pub fn clear_frame_flag(&mut self) {
        self.mmu.ppu.clear_frame_flag()
    }

    /// Drain the audio sample frames produced since the last call.
    pub fn take_audio_samples(&mut self) -> Vec<[i16; 2]> {
        self.mmu.apu.take_samples()
    }

    /// Drain bytes written to the serial port (test ROM console output).
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.mmu.serial.take_output()
    }

    /// True when external RAM or the RTC changed since the flag was cleared;
    /// hosts poll this to schedule battery saves.
    pub fn ram_dirty(&self) -> bool {
        self.mmu.cart.ram_dirty()
    }

    pub fn clear_ram_dirty(&mut self) {
        self.mmu.cart.clear_ram_dirty()
    }

    /// Byte-addressable pass-through for inspection tooling. Deliberately
    /// reuses the bus's own routing so a debugger sees exactly what the CPU
    /// sees, banking included.
    pub fn debug_read(&self, addr: u16) -> u8 {
        self.mmu.read_byte(addr)
    }

    pub fn debug_write(&mut self, addr: u16, val: u8) {
        self.mmu.write_byte(addr, val)
    }

    /// Take a consistent, fully-owned snapshot of the persistent state. Safe
    /// to hand to a background writer while emulation continues.
    pub fn save_state(&self) -> SaveState {
        SaveState {
            title: self.title().to_string(),
            ram: self.mmu.cart.ram().to_vec(),
            rtc: self.mmu.cart.rtc().map(|rtc| rtc.snapshot()),
        }
    }

    /// Restore a snapshot. Validation happens up front; on failure the
    /// machine is left untouched.
    pub fn load_state(&mut self, state: &SaveState) -> Result<(), SaveStateError> {
        if state.title != self.title() {
            return Err(SaveStateError::TitleMismatch {
                expected: self.title().to_string(),
                found: state.title.clone(),
            });
        }
        if state.ram.len() != self.mmu.cart.ram().len() {
            return Err(SaveStateError::RamSizeMismatch {
                expected: self.mmu.cart.ram().len(),
                found: state.ram.len(),
            });
        }
        match (&state.rtc, self.mmu.cart.rtc().is_some()) {
            (Some(_), false) => return Err(SaveStateError::UnexpectedRtc),
            (None, true) => return Err(SaveStateError::MissingRtc),
            _ => {}
        }

        self.mmu.cart.restore_ram(&state.ram);
        if let (Some(snapshot), Some(rtc)) = (&state.rtc, self.mmu.cart.rtc_mut()) {
            rtc.restore(snapshot);
        }
        log::info!("restored persistent state for \"{}\"", self.title());
        Ok(())
    }
}
