use thiserror::Error;

use crate::CLOCK_HZ;

const HEADER_END: usize = 0x150;
const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

// MBC2 carries 512x4-bit RAM on the controller die, regardless of the
// header's RAM size code.
const MBC2_RAM_SIZE: usize = 0x200;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("ROM image too short to contain a cartridge header ({len} bytes)")]
    RomTooShort { len: usize },
    #[error("unsupported cartridge type byte {0:#04X}")]
    UnsupportedCartridgeType(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Cartridge header fields, parsed once at load and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Header {
    pub title: String,
    pub cart_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub destination: u8,
    pub cgb: bool,
    pub sgb: bool,
    pub old_licensee: u8,
    pub new_licensee: [u8; 2],
    pub mask_rom_version: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
    computed_checksum: u8,
}

impl Header {
    pub fn parse(rom: &[u8]) -> Result<Self, LoadError> {
        if rom.len() < HEADER_END {
            return Err(LoadError::RomTooShort { len: rom.len() });
        }

        let mut title_bytes = &rom[0x134..0x143];
        if let Some(pos) = title_bytes.iter().position(|&b| b == 0) {
            title_bytes = &title_bytes[..pos];
        }
        let title = String::from_utf8_lossy(title_bytes).trim().to_string();

        // Checksum over 0x134..=0x14C as computed by the boot ROM.
        let computed_checksum = rom[0x134..=0x14C]
            .iter()
            .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1));

        Ok(Self {
            title,
            cart_type: rom[0x147],
            rom_size_code: rom[0x148],
            ram_size_code: rom[0x149],
            destination: rom[0x14A],
            cgb: rom[0x143] & 0x80 != 0,
            sgb: rom[0x146] == 0x03,
            old_licensee: rom[0x14B],
            new_licensee: [rom[0x144], rom[0x145]],
            mask_rom_version: rom[0x14C],
            header_checksum: rom[0x14D],
            global_checksum: u16::from_be_bytes([rom[0x14E], rom[0x14F]]),
            computed_checksum,
        })
    }

    pub fn mbc_kind(&self) -> Result<MbcKind, LoadError> {
        match self.cart_type {
            0x00 | 0x08 | 0x09 => Ok(MbcKind::None),
            0x01..=0x03 => Ok(MbcKind::Mbc1),
            0x05 | 0x06 => Ok(MbcKind::Mbc2),
            0x0F..=0x13 => Ok(MbcKind::Mbc3),
            0x19..=0x1E => Ok(MbcKind::Mbc5),
            other => Err(LoadError::UnsupportedCartridgeType(other)),
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    pub fn has_rtc(&self) -> bool {
        matches!(self.cart_type, 0x0F | 0x10 | 0x13)
    }

    pub fn header_checksum_ok(&self) -> bool {
        self.computed_checksum == self.header_checksum
    }

    pub fn rom_size_bytes(&self) -> usize {
        match self.rom_size_code {
            code @ 0x00..=0x08 => (32 * 1024) << code,
            0x52 => 72 * ROM_BANK_SIZE,
            0x53 => 80 * ROM_BANK_SIZE,
            0x54 => 96 * ROM_BANK_SIZE,
            _ => 32 * 1024,
        }
    }

    pub fn ram_size_bytes(&self) -> usize {
        match self.ram_size_code {
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        }
    }

    pub fn rom_size_text(&self) -> &'static str {
        match self.rom_size_code {
            0x00 => "32 KB (no banking)",
            0x01 => "64 KB (4 banks)",
            0x02 => "128 KB (8 banks)",
            0x03 => "256 KB (16 banks)",
            0x04 => "512 KB (32 banks)",
            0x05 => "1 MB (64 banks)",
            0x06 => "2 MB (128 banks)",
            0x07 => "4 MB (256 banks)",
            0x08 => "8 MB (512 banks)",
            0x52 => "1.1 MB (72 banks)",
            0x53 => "1.2 MB (80 banks)",
            0x54 => "1.5 MB (96 banks)",
            _ => "unknown",
        }
    }

    pub fn ram_size_text(&self) -> &'static str {
        match self.ram_size_code {
            0x00 => "0 KB (no RAM)",
            0x01 => "2 KB (1 bank)",
            0x02 => "8 KB (1 bank)",
            0x03 => "32 KB (4 banks)",
            0x04 => "128 KB (16 banks)",
            0x05 => "64 KB (8 banks)",
            _ => "unknown",
        }
    }

    pub fn cart_type_text(&self) -> &'static str {
        match self.cart_type {
            0x00 => "ROM only",
            0x01 => "MBC1",
            0x02 => "MBC1 + RAM",
            0x03 => "MBC1 + RAM + battery",
            0x05 => "MBC2",
            0x06 => "MBC2 + battery",
            0x08 => "ROM + RAM",
            0x09 => "ROM + RAM + battery",
            0x0F => "MBC3 + timer + battery",
            0x10 => "MBC3 + timer + RAM + battery",
            0x11 => "MBC3",
            0x12 => "MBC3 + RAM",
            0x13 => "MBC3 + RAM + battery",
            0x19 => "MBC5",
            0x1A => "MBC5 + RAM",
            0x1B => "MBC5 + RAM + battery",
            0x1C => "MBC5 + rumble",
            0x1D => "MBC5 + rumble + RAM",
            0x1E => "MBC5 + rumble + RAM + battery",
            _ => "unknown",
        }
    }

    pub fn licensee_text(&self) -> &'static str {
        match self.old_licensee {
            0x00 => "none",
            0x01 => "nintendo",
            0x08 => "capcom",
            0x13 => "electronic arts",
            0x18 => "hudsonsoft",
            0x1F => "virgin",
            0x31 => "nintendo",
            0x32 => "bandai",
            0x33 => match &self.new_licensee {
                b"01" => "nintendo",
                b"08" => "capcom",
                b"13" => "electronic arts",
                b"34" => "konami",
                b"A4" => "konami",
                _ => "unknown",
            },
            0x34 => "konami",
            0x41 => "ubisoft",
            0x42 => "atlus",
            0x51 => "acclaim",
            0x52 => "activision",
            0x56 => "ljn",
            0x67 => "ocean",
            0x69 => "electronic arts",
            0x6F => "electro brain",
            0x71 => "interplay",
            0x78 => "thq",
            0x79 => "accolade",
            0x7F => "kemco",
            0x8B => "bullet-proof software",
            0x97 => "kaneko",
            0x9B => "tecmo",
            0xA4 => "konami",
            0xB1 => "ascii or nexoft",
            0xB4 => "enix",
            0xB6 => "HAL",
            0xB7 => "SNK",
            0xBB => "sunsoft",
            0xC0 => "taito",
            0xC2 => "kemco",
            0xC3 => "squaresoft",
            0xCA => "ultra",
            0xCB => "vap",
            _ => "unknown",
        }
    }
}

/// Live and latched RTC register sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        ((self.days >> 8) as u8 & 0x01)
            | if self.halt { 0x40 } else { 0 }
            | if self.carry { 0x80 } else { 0 }
    }
}

/// MBC3 real-time clock, advanced purely from emulated cycles.
#[derive(Debug, Clone)]
pub struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    /// Fraction of the current second, in T-cycles.
    subsecond_cycles: u32,
}

/// Externally visible copy of the full RTC state, used by save states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcSnapshot {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day_low: u8,
    pub day_high: bool,
    pub halt: bool,
    pub carry: bool,
    pub subsecond_cycles: u32,
}

impl Rtc {
    fn new() -> Self {
        Self {
            regs: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            subsecond_cycles: 0,
        }
    }

    /// Copy the live registers into the latched set read by the bus.
    fn latch(&mut self) {
        self.latched = self.regs;
    }

    fn read_latched(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => (self.latched.days & 0x00FF) as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    fn write_register(&mut self, reg: u8, val: u8) {
        match reg {
            0x08 => {
                self.regs.seconds = val & 0x3F;
                // A seconds write restarts the current second.
                self.subsecond_cycles = 0;
            }
            0x09 => self.regs.minutes = val & 0x3F,
            0x0A => self.regs.hours = val & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | val as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | ((val as u16 & 0x01) << 8);
                self.regs.halt = val & 0x40 != 0;
                // The carry flag is sticky: it only changes by explicit write.
                self.regs.carry = val & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn step(&mut self, cycles: u64) {
        if self.regs.halt {
            return;
        }
        let total = self.subsecond_cycles as u64 + cycles;
        self.subsecond_cycles = (total % CLOCK_HZ as u64) as u32;
        let seconds = total / CLOCK_HZ as u64;
        if seconds > 0 {
            self.advance_seconds(seconds);
        }
    }

    fn advance_seconds(&mut self, seconds: u64) {
        let seconds = self.regs.seconds as u64 + seconds;
        self.regs.seconds = (seconds % 60) as u8;
        let minutes = self.regs.minutes as u64 + seconds / 60;
        self.regs.minutes = (minutes % 60) as u8;
        let hours = self.regs.hours as u64 + minutes / 60;
        self.regs.hours = (hours % 24) as u8;
        let days = self.regs.days as u64 + hours / 24;
        if days > 0x1FF {
            self.regs.carry = true;
        }
        self.regs.days = (days & 0x1FF) as u16;
    }

    pub fn snapshot(&self) -> RtcSnapshot {
        RtcSnapshot {
            seconds: self.regs.seconds,
            minutes: self.regs.minutes,
            hours: self.regs.hours,
            day_low: (self.regs.days & 0x00FF) as u8,
            day_high: self.regs.days & 0x0100 != 0,
            halt: self.regs.halt,
            carry: self.regs.carry,
            subsecond_cycles: self.subsecond_cycles,
        }
    }

    pub fn restore(&mut self, snapshot: &RtcSnapshot) {
        self.regs = RtcRegisters {
            seconds: snapshot.seconds & 0x3F,
            minutes: snapshot.minutes & 0x3F,
            hours: snapshot.hours & 0x1F,
            days: snapshot.day_low as u16 | ((snapshot.day_high as u16) << 8),
            halt: snapshot.halt,
            carry: snapshot.carry,
        };
        self.subsecond_cycles = snapshot.subsecond_cycles.min(CLOCK_HZ - 1);
        self.latch();
    }
}

/// Banking hardware state, mutated only by bus writes to the control ranges.
#[derive(Debug)]
enum MbcState {
    None,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
        rtc: Option<Rtc>,
        latch_armed: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
}

/// Immutable ROM plus its banking controller and external RAM.
#[derive(Debug)]
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    header: Header,
    mbc: MbcState,
    /// Set on any external-RAM or RTC-register write; the host polls this to
    /// schedule battery saves.
    ram_dirty: bool,
}

impl Cartridge {
    /// Construct a cartridge and its banking controller from a raw ROM image.
    /// The controller variant is keyed on the header's cartridge type byte;
    /// an unrecognized byte is a load failure, not a fallback.
    pub fn from_bytes(rom: Vec<u8>) -> Result<Self, LoadError> {
        let header = Header::parse(&rom)?;
        let kind = header.mbc_kind()?;

        let ram_size = match kind {
            MbcKind::Mbc2 => MBC2_RAM_SIZE,
            _ => header.ram_size_bytes(),
        };

        let mbc = match kind {
            MbcKind::None => MbcState::None,
            MbcKind::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcKind::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcKind::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc: header.has_rtc().then(Rtc::new),
                latch_armed: false,
            },
            MbcKind::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        log::info!(
            "loaded cartridge \"{}\" ({}, {}, {})",
            header.title,
            header.cart_type_text(),
            header.rom_size_text(),
            header.ram_size_text(),
        );
        if !header.header_checksum_ok() {
            log::warn!(
                "header checksum mismatch (stored {:#04X}, computed {:#04X})",
                header.header_checksum,
                header.computed_checksum,
            );
        }

        Ok(Self {
            rom,
            ram: vec![0; ram_size],
            header,
            mbc,
            ram_dirty: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn title(&self) -> &str {
        &self.header.title
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Replace external RAM contents wholesale (save-state restore). The
    /// caller has already validated the length.
    pub(crate) fn restore_ram(&mut self, data: &[u8]) {
        self.ram.copy_from_slice(data);
    }

    pub fn ram_dirty(&self) -> bool {
        self.ram_dirty
    }

    pub fn clear_ram_dirty(&mut self) {
        self.ram_dirty = false;
    }

    pub fn rtc(&self) -> Option<&Rtc> {
        match &self.mbc {
            MbcState::Mbc3 { rtc, .. } => rtc.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match &mut self.mbc {
            MbcState::Mbc3 { rtc, .. } => rtc.as_mut(),
            _ => None,
        }
    }

    /// Feed elapsed emulated time into the RTC's fractional accumulator.
    pub fn step_rtc(&mut self, cycles: u32) {
        if let Some(rtc) = self.rtc_mut() {
            rtc.step(cycles as u64);
        }
    }

    fn rom_bank_count(&self) -> usize {
        (self.rom.len() / ROM_BANK_SIZE).max(1)
    }

    fn rom_byte(&self, bank: usize, addr: u16) -> u8 {
        let offset = bank * ROM_BANK_SIZE + (addr as usize & (ROM_BANK_SIZE - 1));
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    fn ram_byte(&self, bank: usize, addr: u16) -> u8 {
        let offset = bank * RAM_BANK_SIZE + (addr as usize - 0xA000);
        self.ram.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn read(&self, addr: u16) -> u8 {
        let bank_count = self.rom_bank_count();
        match (&self.mbc, addr) {
            (MbcState::None, 0x0000..=0x7FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }

            (MbcState::Mbc1 { ram_bank, mode, .. }, 0x0000..=0x3FFF) => {
                // In RAM-banking mode the shared 2-bit register also remaps
                // the fixed window on large carts.
                let bank = if *mode == 0 {
                    0
                } else {
                    (((*ram_bank as usize) & 0x03) << 5) % bank_count
                };
                self.rom_byte(bank, addr)
            }
            (
                MbcState::Mbc1 {
                    rom_bank, ram_bank, ..
                },
                0x4000..=0x7FFF,
            ) => {
                let mut bank = (((*ram_bank as usize) & 0x03) << 5) | (*rom_bank as usize & 0x1F);
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                self.rom_byte(bank % bank_count, addr)
            }

            (MbcState::Mbc2 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc3 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc5 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }

            (MbcState::Mbc2 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (*rom_bank as usize & 0x0F).max(1);
                self.rom_byte(bank % bank_count, addr)
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (*rom_bank as usize & 0x7F).max(1);
                self.rom_byte(bank % bank_count, addr)
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                // MBC5 is the one controller where bank 0 is selectable.
                self.rom_byte(*rom_bank as usize % bank_count, addr)
            }

            (MbcState::None, 0xA000..=0xBFFF) => self.ram_byte(0, addr),
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF)
            | (MbcState::Mbc5 { ram_enable, .. }, 0xA000..=0xBFFF)
                if !*ram_enable =>
            {
                0xFF
            }
            (
                MbcState::Mbc1 {
                    ram_bank, mode, ..
                },
                0xA000..=0xBFFF,
            ) => {
                let bank = if *mode == 0 { 0 } else { *ram_bank as usize & 0x03 };
                self.ram_byte(bank, addr)
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    // 512 half-bytes, mirrored across the whole window; the
                    // upper nibble is open bus and reads high.
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    0xF0 | (self.ram.get(idx).copied().unwrap_or(0x0F) & 0x0F)
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable {
                    0xFF
                } else {
                    match *ram_bank {
                        0x00..=0x03 => self.ram_byte(*ram_bank as usize, addr),
                        0x08..=0x0C => rtc
                            .as_ref()
                            .map(|r| r.read_latched(*ram_bank))
                            .unwrap_or(0xFF),
                        _ => 0xFF,
                    }
                }
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0xA000..=0xBFFF) => {
                self.ram_byte(*ram_bank as usize, addr)
            }

            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.mbc, addr) {
            (MbcState::None, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                    self.ram_dirty = true;
                }
            }
            (MbcState::None, _) => {}

            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                // Writing 0 selects bank 1; the remap applies to the low five
                // bits only.
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
                log::trace!("MBC1 ROM bank -> {rom_bank}");
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (
                MbcState::Mbc1 {
                    ram_enable,
                    ram_bank,
                    mode,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable {
                    let bank = if *mode == 0 { 0 } else { *ram_bank as usize & 0x03 };
                    let idx = bank * RAM_BANK_SIZE + (addr as usize - 0xA000);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                        self.ram_dirty = true;
                    }
                }
            }

            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                0x0000..=0x3FFF,
            ) => {
                // Address bit 8 selects between the RAM gate and the ROM bank
                // register across the whole range.
                if addr & 0x0100 == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = val & 0x0F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val & 0x0F;
                        self.ram_dirty = true;
                    }
                }
            }

            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                // Doubles as the RTC register selector (0x08..=0x0C).
                *ram_bank = val;
            }
            (
                MbcState::Mbc3 {
                    latch_armed, rtc, ..
                },
                0x6000..=0x7FFF,
            ) => {
                // Strict 0x00-then-0x01 sequence copies the live clock into
                // the latched registers.
                if val == 0x00 {
                    *latch_armed = true;
                } else {
                    if val == 0x01
                        && *latch_armed
                        && let Some(rtc) = rtc
                    {
                        rtc.latch();
                    }
                    *latch_armed = false;
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable {
                    match *ram_bank {
                        0x00..=0x03 => {
                            let idx =
                                (*ram_bank as usize) * RAM_BANK_SIZE + (addr as usize - 0xA000);
                            if let Some(b) = self.ram.get_mut(idx) {
                                *b = val;
                                self.ram_dirty = true;
                            }
                        }
                        0x08..=0x0C => {
                            let reg = *ram_bank;
                            if let Some(rtc) = rtc.as_mut() {
                                rtc.write_register(reg, val);
                                self.ram_dirty = true;
                            }
                        }
                        _ => {}
                    }
                }
            }

            (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0x0FF) | ((val as u16 & 0x01) << 8);
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            (
                MbcState::Mbc5 {
                    ram_enable,
                    ram_bank,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable {
                    let idx = (*ram_bank as usize) * RAM_BANK_SIZE + (addr as usize - 0xA000);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                        self.ram_dirty = true;
                    }
                }
            }

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with(cart_type: u8, rom_size_code: u8, ram_size_code: u8) -> Vec<u8> {
        let banks = match rom_size_code {
            code @ 0x00..=0x08 => 2 << code,
            _ => 2,
        };
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        // Tag every bank so reads identify which one is mapped.
        for bank in 0..banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
            rom[bank * ROM_BANK_SIZE + 1] = (bank >> 8) as u8;
        }
        rom[0x147] = cart_type;
        rom[0x148] = rom_size_code;
        rom[0x149] = ram_size_code;
        rom
    }

    #[test]
    fn short_rom_is_a_load_failure() {
        assert!(matches!(
            Cartridge::from_bytes(vec![0; 0x100]),
            Err(LoadError::RomTooShort { len: 0x100 })
        ));
    }

    #[test]
    fn unknown_cartridge_type_is_a_load_failure() {
        let rom = rom_with(0xFC, 0x00, 0x00);
        assert!(matches!(
            Cartridge::from_bytes(rom),
            Err(LoadError::UnsupportedCartridgeType(0xFC))
        ));
    }

    #[test]
    fn header_fields_parse_from_fixed_offsets() {
        let mut rom = rom_with(0x13, 0x02, 0x03);
        rom[0x134..0x134 + 7].copy_from_slice(b"POCKET\0");
        rom[0x14A] = 0x01;
        rom[0x14B] = 0x33;
        rom[0x144] = b'0';
        rom[0x145] = b'1';
        let checksum = rom[0x134..=0x14C]
            .iter()
            .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1));
        rom[0x14D] = checksum;

        let cart = Cartridge::from_bytes(rom).unwrap();
        let header = cart.header();
        assert_eq!(header.title, "POCKET");
        assert_eq!(header.mbc_kind().unwrap(), MbcKind::Mbc3);
        assert!(header.has_battery());
        assert!(header.has_rtc());
        assert!(header.header_checksum_ok());
        assert_eq!(header.rom_size_bytes(), 128 * 1024);
        assert_eq!(header.ram_size_bytes(), 0x8000);
        assert_eq!(header.licensee_text(), "nintendo");
        assert_eq!(header.cart_type_text(), "MBC3 + RAM + battery");
    }

    #[test]
    fn rom_only_ignores_bank_select_writes() {
        let mut cart = Cartridge::from_bytes(rom_with(0x00, 0x00, 0x00)).unwrap();
        cart.write(0x2000, 0x05);
        assert_eq!(cart.read(0x0000), 0x00);
        assert_eq!(cart.read(0x4000), 0x01);
    }

    #[test]
    fn mbc1_bank_zero_write_maps_bank_one() {
        let mut cart = Cartridge::from_bytes(rom_with(0x01, 0x04, 0x00)).unwrap();
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 0x01);
        cart.write(0x6000, 0x01); // RAM-banking mode
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 0x01);
    }

    #[test]
    fn mbc1_upper_bits_extend_the_switchable_bank() {
        let mut cart = Cartridge::from_bytes(rom_with(0x01, 0x05, 0x00)).unwrap();
        cart.write(0x2000, 0x02);
        cart.write(0x4000, 0x01); // upper bits = 0b01 -> bank 0x22
        assert_eq!(cart.read(0x4000), 0x22);
        // In mode 1 the same bits remap the fixed window to bank 0x20.
        assert_eq!(cart.read(0x0000), 0x00);
        cart.write(0x6000, 0x01);
        assert_eq!(cart.read(0x0000), 0x20);
    }

    #[test]
    fn ram_gate_blocks_access_until_enabled() {
        let mut cart = Cartridge::from_bytes(rom_with(0x03, 0x01, 0x02)).unwrap();
        cart.write(0xA000, 0x55);
        assert_eq!(cart.read(0xA000), 0xFF);
        assert!(!cart.ram_dirty());

        cart.write(0x0000, 0x0A);
        cart.write(0xA000, 0x55);
        assert_eq!(cart.read(0xA000), 0x55);
        assert!(cart.ram_dirty());

        cart.write(0x0000, 0x00);
        assert_eq!(cart.read(0xA000), 0xFF);
    }

    #[test]
    fn mbc2_register_select_uses_address_bit_eight() {
        let mut cart = Cartridge::from_bytes(rom_with(0x06, 0x02, 0x00)).unwrap();
        // Bit 8 set: ROM bank register, so RAM stays disabled.
        cart.write(0x0100, 0x0A);
        assert_eq!(cart.read(0xA000), 0xFF);
        cart.write(0x0000, 0x0A);
        cart.write(0x0100, 0x03);
        assert_eq!(cart.read(0x4000), 0x03);

        cart.write(0xA005, 0xAB);
        assert_eq!(cart.read(0xA005), 0xFB);
        // The 512-nibble RAM is mirrored through the whole window.
        assert_eq!(cart.read(0xA205), 0xFB);
    }

    #[test]
    fn mbc5_bank_number_spans_two_registers() {
        let mut cart = Cartridge::from_bytes(rom_with(0x19, 0x08, 0x00)).unwrap();
        cart.write(0x2000, 0x34);
        cart.write(0x3000, 0x01);
        assert_eq!(cart.read(0x4000), 0x34);
        assert_eq!(cart.read(0x4001), 0x01);
        // Unlike MBC1/2/3, bank 0 is selectable.
        cart.write(0x2000, 0x00);
        cart.write(0x3000, 0x00);
        assert_eq!(cart.read(0x4000), 0x00);
    }

    #[test]
    fn rtc_cascades_through_base_60_60_24() {
        let mut cart = Cartridge::from_bytes(rom_with(0x0F, 0x01, 0x00)).unwrap();
        let elapsed = ((2 * 24 * 60 + 3 * 60 + 4) * 60 + 5) as u64; // 2d 3h 4m 5s
        cart.rtc_mut().unwrap().step(elapsed * CLOCK_HZ as u64);

        cart.write(0x0000, 0x0A);
        cart.write(0x6000, 0x00);
        cart.write(0x6000, 0x01);
        cart.write(0x4000, 0x08);
        assert_eq!(cart.read(0xA000), 5);
        cart.write(0x4000, 0x09);
        assert_eq!(cart.read(0xA000), 4);
        cart.write(0x4000, 0x0A);
        assert_eq!(cart.read(0xA000), 3);
        cart.write(0x4000, 0x0B);
        assert_eq!(cart.read(0xA000), 2);
        cart.write(0x4000, 0x0C);
        assert_eq!(cart.read(0xA000), 0x00);
    }

    #[test]
    fn rtc_day_overflow_sets_sticky_carry() {
        let mut cart = Cartridge::from_bytes(rom_with(0x0F, 0x01, 0x00)).unwrap();
        let rtc = cart.rtc_mut().unwrap();
        rtc.regs.days = 0x1FF;
        rtc.regs.hours = 23;
        rtc.regs.minutes = 59;
        rtc.regs.seconds = 59;
        rtc.step(CLOCK_HZ as u64);
        assert_eq!(rtc.regs.days, 0);
        assert!(rtc.regs.carry);
        // Carry stays set until explicitly cleared by a control write.
        rtc.step(60 * CLOCK_HZ as u64);
        assert!(rtc.regs.carry);
        rtc.write_register(0x0C, 0x00);
        assert!(!rtc.regs.carry);
    }

    #[test]
    fn halted_rtc_does_not_advance() {
        let mut cart = Cartridge::from_bytes(rom_with(0x0F, 0x01, 0x00)).unwrap();
        cart.write(0x0000, 0x0A);
        cart.write(0x4000, 0x0C);
        cart.write(0xA000, 0x40); // halt
        cart.step_rtc(CLOCK_HZ * 10);

        cart.write(0x6000, 0x00);
        cart.write(0x6000, 0x01);
        cart.write(0x4000, 0x08);
        assert_eq!(cart.read(0xA000), 0);
    }

    #[test]
    fn rtc_latch_requires_strict_sequence() {
        let mut cart = Cartridge::from_bytes(rom_with(0x0F, 0x01, 0x00)).unwrap();
        cart.rtc_mut().unwrap().step(7 * CLOCK_HZ as u64);
        cart.write(0x0000, 0x0A);
        cart.write(0x4000, 0x08);

        // Latched copy still holds the power-on value.
        assert_eq!(cart.read(0xA000), 0);

        // 0x01 without a preceding 0x00 does not latch.
        cart.write(0x6000, 0x01);
        assert_eq!(cart.read(0xA000), 0);

        // An interloping write disarms the sequence.
        cart.write(0x6000, 0x00);
        cart.write(0x6000, 0x02);
        cart.write(0x6000, 0x01);
        assert_eq!(cart.read(0xA000), 0);

        cart.write(0x6000, 0x00);
        cart.write(0x6000, 0x01);
        assert_eq!(cart.read(0xA000), 7);
    }
}
