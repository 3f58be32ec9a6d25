use crate::{
    apu::Apu, cartridge::Cartridge, input::Input, interrupts::InterruptController, ppu::Ppu,
    serial::Serial, timer::Timer,
};

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;

// OAM DMA keeps the OAM bus busy for 160 machine cycles.
const OAM_DMA_CYCLES: u32 = 640;

/// Memory bus: routes the 16-bit address space to the cartridge (through its
/// banking controller), video/work/high RAM, OAM and the I/O register window.
///
/// `read_byte` and `write_byte` are total; addresses with no backing owner
/// read 0xFF and ignore writes.
pub struct Mmu {
    pub cart: Cartridge,
    wram: [u8; WRAM_SIZE],
    hram: [u8; HRAM_SIZE],
    pub interrupts: InterruptController,
    pub timer: Timer,
    pub ppu: Ppu,
    pub apu: Apu,
    pub serial: Serial,
    pub input: Input,
    /// Last value written to the OAM DMA register.
    dma: u8,
    /// Remaining T-cycles of the active OAM DMA transfer.
    dma_cycles: u32,
}

impl Mmu {
    pub fn new(cart: Cartridge) -> Self {
        Self {
            cart,
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            interrupts: InterruptController::new(),
            timer: Timer::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            serial: Serial::new(),
            input: Input::new(),
            dma: 0,
            dma_cycles: 0,
        }
    }

    /// Reset everything except the cartridge to power-on defaults.
    pub fn reset(&mut self) {
        self.wram = [0; WRAM_SIZE];
        self.hram = [0; HRAM_SIZE];
        self.interrupts = InterruptController::new();
        self.timer = Timer::new();
        self.ppu = Ppu::new();
        self.apu = Apu::new();
        self.serial = Serial::new();
        self.input = Input::new();
        self.dma = 0;
        self.dma_cycles = 0;
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.cart.read(addr),
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize]
                } else {
                    0xFF
                }
            }
            0xA000..=0xBFFF => self.cart.read(addr),
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            // Echo RAM mirrors 0xC000..=0xDDFF.
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => {
                if self.dma_cycles == 0 && self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize]
                } else {
                    0xFF
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.interrupts.read_flag(),
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF46 => self.dma,
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.interrupts.read_enable(),
            _ => 0xFF,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.write(addr, val),
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize] = val;
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => {
                if self.dma_cycles == 0 && self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize] = val;
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.interrupts.write_flag(val),
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF46 => self.start_oam_dma(val),
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val, &mut self.interrupts),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.interrupts.write_enable(val),
            _ => log::trace!("ignored write to unmapped I/O {addr:04X}"),
        }
    }

    /// Copy 160 bytes from `val << 8` into OAM. The transfer occupies the OAM
    /// bus for the next 640 T-cycles, during which CPU accesses read 0xFF.
    fn start_oam_dma(&mut self, val: u8) {
        self.dma = val;
        let src = (val as u16) << 8;
        for i in 0..self.ppu.oam.len() as u16 {
            self.ppu.oam[i as usize] = self.dma_source_read(src.wrapping_add(i));
        }
        self.dma_cycles = OAM_DMA_CYCLES;
    }

    /// Source reads for OAM DMA bypass the PPU access gates; addresses above
    /// the echo region wrap back into work RAM.
    fn dma_source_read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.read(addr),
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFFFF => self.wram[(addr as usize - 0xE000) & (WRAM_SIZE - 1)],
        }
    }

    /// Count down the OAM DMA bus-busy window.
    pub fn dma_step(&mut self, cycles: u32) {
        self.dma_cycles = self.dma_cycles.saturating_sub(cycles);
    }

    pub fn dma_active(&self) -> bool {
        self.dma_cycles > 0
    }
}
