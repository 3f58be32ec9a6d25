use bitflags::bitflags;

bitflags! {
    /// One bit per interrupt source, shared by the IE and IF registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InterruptFlags: u8 {
        const VBLANK = 0x01;
        const STAT = 0x02;
        const TIMER = 0x04;
        const SERIAL = 0x08;
        const JOYPAD = 0x10;
    }
}

// IF bits 5-7 are not wired and read back as 1.
const IF_UNUSED: u8 = 0xE0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    Stat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub const fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => 0x40,
            Interrupt::Stat => 0x48,
            Interrupt::Timer => 0x50,
            Interrupt::Serial => 0x58,
            Interrupt::Joypad => 0x60,
        }
    }

    const fn flag(self) -> InterruptFlags {
        match self {
            Interrupt::VBlank => InterruptFlags::VBLANK,
            Interrupt::Stat => InterruptFlags::STAT,
            Interrupt::Timer => InterruptFlags::TIMER,
            Interrupt::Serial => InterruptFlags::SERIAL,
            Interrupt::Joypad => InterruptFlags::JOYPAD,
        }
    }
}

/// Enable (IE) and request (IF) bitsets for the five interrupt sources.
///
/// Requesting an already-requested source is idempotent; there is no queue
/// beyond the bitset itself.
#[derive(Debug, Default)]
pub struct InterruptController {
    enable: InterruptFlags,
    request: InterruptFlags,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, source: Interrupt) {
        self.request.insert(source.flag());
    }

    /// Clear a single request bit when the CPU dispatches the source.
    pub fn acknowledge(&mut self, source: Interrupt) {
        self.request.remove(source.flag());
    }

    /// Sources that are both requested and enabled.
    pub fn pending(&self) -> InterruptFlags {
        self.enable & self.request
    }

    pub fn has_pending(&self) -> bool {
        !self.pending().is_empty()
    }

    /// Highest-priority pending source; priority is ascending bit index.
    pub fn highest_priority(&self) -> Option<Interrupt> {
        let pending = self.pending();
        [
            Interrupt::VBlank,
            Interrupt::Stat,
            Interrupt::Timer,
            Interrupt::Serial,
            Interrupt::Joypad,
        ]
        .into_iter()
        .find(|source| pending.contains(source.flag()))
    }

    pub fn read_flag(&self) -> u8 {
        self.request.bits() | IF_UNUSED
    }

    pub fn write_flag(&mut self, val: u8) {
        self.request = InterruptFlags::from_bits_truncate(val);
    }

    pub fn read_enable(&self) -> u8 {
        self.enable.bits()
    }

    pub fn write_enable(&mut self, val: u8) {
        // IE keeps its upper bits writable on hardware, but only the low five
        // participate in dispatch.
        self.enable = InterruptFlags::from_bits_truncate(val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_ascending_bit_order() {
        let mut ic = InterruptController::new();
        ic.write_enable(0x1F);
        ic.request(Interrupt::Joypad);
        ic.request(Interrupt::Timer);
        assert_eq!(ic.highest_priority(), Some(Interrupt::Timer));
        ic.request(Interrupt::VBlank);
        assert_eq!(ic.highest_priority(), Some(Interrupt::VBlank));
    }

    #[test]
    fn masked_sources_are_not_pending() {
        let mut ic = InterruptController::new();
        ic.request(Interrupt::Serial);
        assert!(!ic.has_pending());
        ic.write_enable(0x08);
        assert!(ic.has_pending());
        ic.acknowledge(Interrupt::Serial);
        assert!(!ic.has_pending());
    }

    #[test]
    fn repeated_requests_are_idempotent() {
        let mut ic = InterruptController::new();
        ic.write_enable(0x04);
        ic.request(Interrupt::Timer);
        ic.request(Interrupt::Timer);
        ic.acknowledge(Interrupt::Timer);
        assert!(!ic.has_pending());
    }

    #[test]
    fn flag_register_upper_bits_read_high() {
        let mut ic = InterruptController::new();
        assert_eq!(ic.read_flag(), 0xE0);
        ic.write_flag(0xFF);
        assert_eq!(ic.read_flag(), 0xFF);
        assert_eq!(ic.read_enable(), 0x00);
    }
}
