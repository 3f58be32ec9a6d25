use crate::mmu::Mmu;

// Flag bits in the F register; the low nibble always reads zero.
const FLAG_Z: u8 = 0x80; // Zero
const FLAG_N: u8 = 0x40; // Subtract
const FLAG_H: u8 = 0x20; // Half carry
const FLAG_C: u8 = 0x10; // Carry

// Post-boot register state (DMG).
const BOOT_A: u8 = 0x01;
const BOOT_F: u8 = 0xB0;
const BOOT_B: u8 = 0x00;
const BOOT_C: u8 = 0x13;
const BOOT_D: u8 = 0x00;
const BOOT_E: u8 = 0xD8;
const BOOT_H: u8 = 0x01;
const BOOT_L: u8 = 0x4D;
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

// T-cycle cost of servicing an interrupt (5 machine cycles).
const INTERRUPT_DISPATCH_CYCLES: u32 = 20;

/// SM83 CPU. `step` executes interrupt dispatch or one instruction and
/// returns its cost in T-cycles; the aggregate machine propagates that cost
/// to the other hardware blocks.
pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    /// Total T-cycles executed since power-on.
    pub cycles: u64,
    pub ime: bool,
    /// EI takes effect after the *next* instruction completes.
    ime_pending: bool,
    pub halted: bool,
    pub stopped: bool,
    /// HALT executed with IME clear and an interrupt pending: the following
    /// fetch does not advance PC, so that opcode runs twice.
    halt_bug: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: BOOT_A,
            f: BOOT_F,
            b: BOOT_B,
            c: BOOT_C,
            d: BOOT_D,
            e: BOOT_E,
            h: BOOT_H,
            l: BOOT_L,
            sp: BOOT_SP,
            pc: BOOT_PC,
            cycles: 0,
            ime: false,
            ime_pending: false,
            halted: false,
            stopped: false,
            halt_bug: false,
        }
    }

    pub fn get_af(&self) -> u16 {
        ((self.a as u16) << 8) | self.f as u16
    }

    fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = val as u8 & 0xF0;
    }

    pub fn get_bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }

    fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    pub fn get_de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }

    fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    pub fn get_hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }

    fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    /// Register-pair decode for the 16-bit rows (BC/DE/HL/SP).
    fn read_rp(&self, index: u8) -> u16 {
        match index & 0x03 {
            0 => self.get_bc(),
            1 => self.get_de(),
            2 => self.get_hl(),
            _ => self.sp,
        }
    }

    fn write_rp(&mut self, index: u8, val: u16) {
        match index & 0x03 {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.set_hl(val),
            _ => self.sp = val,
        }
    }

    /// 8-bit register decode; index 6 is the (HL) memory operand.
    fn read_reg(&self, mmu: &Mmu, index: u8) -> u8 {
        match index & 0x07 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => mmu.read_byte(self.get_hl()),
            _ => self.a,
        }
    }

    fn write_reg(&mut self, mmu: &mut Mmu, index: u8, val: u8) {
        match index & 0x07 {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            6 => mmu.write_byte(self.get_hl(), val),
            _ => self.a = val,
        }
    }

    /// Branch-condition decode for the conditional jump/call/return rows.
    fn condition(&self, index: u8) -> bool {
        match index & 0x03 {
            0 => self.f & FLAG_Z == 0,
            1 => self.f & FLAG_Z != 0,
            2 => self.f & FLAG_C == 0,
            _ => self.f & FLAG_C != 0,
        }
    }

    fn fetch8(&mut self, mmu: &Mmu) -> u8 {
        let val = mmu.read_byte(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    fn fetch16(&mut self, mmu: &Mmu) -> u16 {
        let lo = self.fetch8(mmu) as u16;
        let hi = self.fetch8(mmu) as u16;
        (hi << 8) | lo
    }

    fn push16(&mut self, mmu: &mut Mmu, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        mmu.write_byte(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        mmu.write_byte(self.sp, val as u8);
    }

    fn pop16(&mut self, mmu: &Mmu) -> u16 {
        let lo = mmu.read_byte(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = mmu.read_byte(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    // ---- ALU helpers. Half carry comes out of bit 3, carry out of bit 7.

    fn add_flags(&mut self, val: u8, with_carry: bool) -> u8 {
        let carry_in = (with_carry && self.f & FLAG_C != 0) as u8;
        let (partial, c1) = self.a.overflowing_add(val);
        let (res, c2) = partial.overflowing_add(carry_in);
        self.f = if res == 0 { FLAG_Z } else { 0 }
            | if (self.a & 0x0F) + (val & 0x0F) + carry_in > 0x0F {
                FLAG_H
            } else {
                0
            }
            | if c1 || c2 { FLAG_C } else { 0 };
        res
    }

    fn sub_flags(&mut self, val: u8, with_carry: bool) -> u8 {
        let carry_in = (with_carry && self.f & FLAG_C != 0) as u8;
        let (partial, b1) = self.a.overflowing_sub(val);
        let (res, b2) = partial.overflowing_sub(carry_in);
        self.f = FLAG_N
            | if res == 0 { FLAG_Z } else { 0 }
            | if (self.a & 0x0F) < (val & 0x0F) + carry_in {
                FLAG_H
            } else {
                0
            }
            | if b1 || b2 { FLAG_C } else { 0 };
        res
    }

    fn and_a(&mut self, val: u8) {
        self.a &= val;
        self.f = if self.a == 0 { FLAG_Z } else { 0 } | FLAG_H;
    }

    fn xor_a(&mut self, val: u8) {
        self.a ^= val;
        self.f = if self.a == 0 { FLAG_Z } else { 0 };
    }

    fn or_a(&mut self, val: u8) {
        self.a |= val;
        self.f = if self.a == 0 { FLAG_Z } else { 0 };
    }

    /// Dispatch for the 0x80..=0xBF block and the d8 immediates.
    fn alu(&mut self, op: u8, val: u8) {
        match op & 0x07 {
            0 => self.a = self.add_flags(val, false),
            1 => self.a = self.add_flags(val, true),
            2 => self.a = self.sub_flags(val, false),
            3 => self.a = self.sub_flags(val, true),
            4 => self.and_a(val),
            5 => self.xor_a(val),
            6 => self.or_a(val),
            // CP: subtraction flags without storing the result.
            _ => {
                self.sub_flags(val, false);
            }
        }
    }

    // INC/DEC leave the carry flag untouched.

    fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        self.f = (self.f & FLAG_C)
            | if res == 0 { FLAG_Z } else { 0 }
            | if val & 0x0F == 0x0F { FLAG_H } else { 0 };
        res
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        self.f = (self.f & FLAG_C)
            | FLAG_N
            | if res == 0 { FLAG_Z } else { 0 }
            | if val & 0x0F == 0 { FLAG_H } else { 0 };
        res
    }

    /// ADD HL,rr: half carry out of bit 11, carry out of bit 15, Z preserved.
    fn add_hl(&mut self, val: u16) {
        let hl = self.get_hl();
        let (res, carry) = hl.overflowing_add(val);
        self.f = (self.f & FLAG_Z)
            | if (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF {
                FLAG_H
            } else {
                0
            }
            | if carry { FLAG_C } else { 0 };
        self.set_hl(res);
    }

    /// ADD SP,e / LD HL,SP+e: flags come from the unsigned low byte.
    fn sp_plus_e(&mut self, offset: u8) -> u16 {
        let e = offset as i8 as i16 as u16;
        self.f = if (self.sp & 0x0F) + (e & 0x0F) > 0x0F {
            FLAG_H
        } else {
            0
        } | if (self.sp & 0xFF) + (e & 0xFF) > 0xFF {
            FLAG_C
        } else {
            0
        };
        self.sp.wrapping_add(e)
    }

    // ---- Rotate/shift helpers shared by the A-register forms and the CB
    // table. The A forms clear Z afterwards.

    fn rlc(&mut self, val: u8) -> u8 {
        let res = val.rotate_left(1);
        self.f = if res == 0 { FLAG_Z } else { 0 } | if val & 0x80 != 0 { FLAG_C } else { 0 };
        res
    }

    fn rrc(&mut self, val: u8) -> u8 {
        let res = val.rotate_right(1);
        self.f = if res == 0 { FLAG_Z } else { 0 } | if val & 0x01 != 0 { FLAG_C } else { 0 };
        res
    }

    fn rl(&mut self, val: u8) -> u8 {
        let res = (val << 1) | (self.f >> 4 & 0x01);
        self.f = if res == 0 { FLAG_Z } else { 0 } | if val & 0x80 != 0 { FLAG_C } else { 0 };
        res
    }

    fn rr(&mut self, val: u8) -> u8 {
        let res = (val >> 1) | ((self.f & FLAG_C) << 3);
        self.f = if res == 0 { FLAG_Z } else { 0 } | if val & 0x01 != 0 { FLAG_C } else { 0 };
        res
    }

    fn sla(&mut self, val: u8) -> u8 {
        let res = val << 1;
        self.f = if res == 0 { FLAG_Z } else { 0 } | if val & 0x80 != 0 { FLAG_C } else { 0 };
        res
    }

    fn sra(&mut self, val: u8) -> u8 {
        let res = (val >> 1) | (val & 0x80);
        self.f = if res == 0 { FLAG_Z } else { 0 } | if val & 0x01 != 0 { FLAG_C } else { 0 };
        res
    }

    fn swap(&mut self, val: u8) -> u8 {
        let res = val.rotate_left(4);
        self.f = if res == 0 { FLAG_Z } else { 0 };
        res
    }

    fn srl(&mut self, val: u8) -> u8 {
        let res = val >> 1;
        self.f = if res == 0 { FLAG_Z } else { 0 } | if val & 0x01 != 0 { FLAG_C } else { 0 };
        res
    }

    /// BCD correction after an add or subtract.
    fn daa(&mut self) {
        let mut correction = 0u8;
        let mut carry = false;
        if self.f & FLAG_H != 0 || (self.f & FLAG_N == 0 && self.a & 0x0F > 0x09) {
            correction |= 0x06;
        }
        if self.f & FLAG_C != 0 || (self.f & FLAG_N == 0 && self.a > 0x99) {
            correction |= 0x60;
            carry = true;
        }
        self.a = if self.f & FLAG_N == 0 {
            self.a.wrapping_add(correction)
        } else {
            self.a.wrapping_sub(correction)
        };
        self.f = (self.f & FLAG_N)
            | if self.a == 0 { FLAG_Z } else { 0 }
            | if carry { FLAG_C } else { 0 };
    }

    /// Service the highest-priority pending interrupt, displacing the next
    /// instruction fetch.
    fn dispatch_interrupt(&mut self, mmu: &mut Mmu) -> u32 {
        let Some(source) = mmu.interrupts.highest_priority() else {
            return 0;
        };
        self.halted = false;
        self.ime = false;
        self.ime_pending = false;
        mmu.interrupts.acknowledge(source);
        self.push16(mmu, self.pc);
        self.pc = source.vector();
        INTERRUPT_DISPATCH_CYCLES
    }

    /// Execute interrupt dispatch or one instruction; returns the T-cycle
    /// cost. Total over all inputs: undocumented opcodes fall back to a
    /// 4-cycle no-op.
    pub fn step(&mut self, mmu: &mut Mmu) -> u32 {
        #[cfg(feature = "cpu-trace")]
        log::trace!("{}", self.debug_state());

        let cycles = self.step_inner(mmu);
        self.cycles += cycles as u64;
        cycles
    }

    fn step_inner(&mut self, mmu: &mut Mmu) -> u32 {
        if self.ime && mmu.interrupts.has_pending() {
            return self.dispatch_interrupt(mmu);
        }

        // EI lands here: one full instruction has run since, so the enable
        // takes effect before the next fetch (but after the dispatch check
        // above, preserving the one-instruction shadow).
        if self.ime_pending {
            self.ime = true;
            self.ime_pending = false;
        }

        if self.stopped {
            return 4;
        }

        if self.halted {
            if mmu.interrupts.has_pending() {
                // IME is clear (handled above): resume without dispatching.
                self.halted = false;
            } else {
                return 4;
            }
        }

        let opcode = if self.halt_bug {
            self.halt_bug = false;
            mmu.read_byte(self.pc)
        } else {
            self.fetch8(mmu)
        };
        self.execute(mmu, opcode)
    }

    fn execute(&mut self, mmu: &mut Mmu, opcode: u8) -> u32 {
        match opcode {
            0x00 => 4, // NOP

            // LD rr,d16
            0x01 | 0x11 | 0x21 | 0x31 => {
                let val = self.fetch16(mmu);
                self.write_rp(opcode >> 4, val);
                12
            }

            // LD (BC/DE),A and LD A,(BC/DE)
            0x02 | 0x12 => {
                let addr = self.read_rp(opcode >> 4);
                mmu.write_byte(addr, self.a);
                8
            }
            0x0A | 0x1A => {
                let addr = self.read_rp(opcode >> 4);
                self.a = mmu.read_byte(addr);
                8
            }

            // INC/DEC rr (no flags)
            0x03 | 0x13 | 0x23 | 0x33 => {
                let val = self.read_rp(opcode >> 4).wrapping_add(1);
                self.write_rp(opcode >> 4, val);
                8
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let val = self.read_rp(opcode >> 4).wrapping_sub(1);
                self.write_rp(opcode >> 4, val);
                8
            }

            // INC/DEC r
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = (opcode >> 3) & 0x07;
                let val = self.read_reg(mmu, r);
                let res = self.inc8(val);
                self.write_reg(mmu, r, res);
                if r == 6 { 12 } else { 4 }
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = (opcode >> 3) & 0x07;
                let val = self.read_reg(mmu, r);
                let res = self.dec8(val);
                self.write_reg(mmu, r, res);
                if r == 6 { 12 } else { 4 }
            }

            // LD r,d8
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let val = self.fetch8(mmu);
                let r = (opcode >> 3) & 0x07;
                self.write_reg(mmu, r, val);
                if r == 6 { 12 } else { 8 }
            }

            // Accumulator rotates; Z is always cleared.
            0x07 => {
                self.a = self.rlc(self.a);
                self.f &= !FLAG_Z;
                4
            }
            0x0F => {
                self.a = self.rrc(self.a);
                self.f &= !FLAG_Z;
                4
            }
            0x17 => {
                self.a = self.rl(self.a);
                self.f &= !FLAG_Z;
                4
            }
            0x1F => {
                self.a = self.rr(self.a);
                self.f &= !FLAG_Z;
                4
            }

            // LD (a16),SP
            0x08 => {
                let addr = self.fetch16(mmu);
                mmu.write_byte(addr, self.sp as u8);
                mmu.write_byte(addr.wrapping_add(1), (self.sp >> 8) as u8);
                20
            }

            // ADD HL,rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                self.add_hl(self.read_rp(opcode >> 4));
                8
            }

            // STOP: stalls until an external wake (joypad press). The padding
            // byte is consumed and DIV resets.
            0x10 => {
                let _ = self.fetch8(mmu);
                mmu.timer.reset_div();
                self.stopped = true;
                4
            }

            // JR
            0x18 => {
                let offset = self.fetch8(mmu) as i8;
                self.pc = self.pc.wrapping_add(offset as u16);
                12
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.fetch8(mmu) as i8;
                if self.condition(opcode >> 3) {
                    self.pc = self.pc.wrapping_add(offset as u16);
                    12
                } else {
                    8
                }
            }

            // LD (HL±),A and LD A,(HL±)
            0x22 => {
                let addr = self.get_hl();
                mmu.write_byte(addr, self.a);
                self.set_hl(addr.wrapping_add(1));
                8
            }
            0x2A => {
                let addr = self.get_hl();
                self.a = mmu.read_byte(addr);
                self.set_hl(addr.wrapping_add(1));
                8
            }
            0x32 => {
                let addr = self.get_hl();
                mmu.write_byte(addr, self.a);
                self.set_hl(addr.wrapping_sub(1));
                8
            }
            0x3A => {
                let addr = self.get_hl();
                self.a = mmu.read_byte(addr);
                self.set_hl(addr.wrapping_sub(1));
                8
            }

            0x27 => {
                self.daa();
                4
            }
            0x2F => {
                // CPL
                self.a = !self.a;
                self.f |= FLAG_N | FLAG_H;
                4
            }
            0x37 => {
                // SCF
                self.f = (self.f & FLAG_Z) | FLAG_C;
                4
            }
            0x3F => {
                // CCF
                self.f = (self.f & FLAG_Z) | ((self.f ^ FLAG_C) & FLAG_C);
                4
            }

            0x76 => {
                // HALT. With IME clear and an interrupt already pending, the
                // next fetch reads the same opcode twice.
                if !self.ime && mmu.interrupts.has_pending() {
                    self.halt_bug = true;
                } else {
                    self.halted = true;
                }
                4
            }

            // LD r,r'
            0x40..=0x7F => {
                let src = opcode & 0x07;
                let dst = (opcode >> 3) & 0x07;
                let val = self.read_reg(mmu, src);
                self.write_reg(mmu, dst, val);
                if src == 6 || dst == 6 { 8 } else { 4 }
            }

            // ALU A,r
            0x80..=0xBF => {
                let src = opcode & 0x07;
                let val = self.read_reg(mmu, src);
                self.alu(opcode >> 3, val);
                if src == 6 { 8 } else { 4 }
            }

            // RET cc / RET / RETI
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                if self.condition(opcode >> 3) {
                    self.pc = self.pop16(mmu);
                    20
                } else {
                    8
                }
            }
            0xC9 => {
                self.pc = self.pop16(mmu);
                16
            }
            0xD9 => {
                // RETI enables IME without the EI delay.
                self.pc = self.pop16(mmu);
                self.ime = true;
                16
            }

            // POP/PUSH
            0xC1 | 0xD1 | 0xE1 => {
                let val = self.pop16(mmu);
                self.write_rp((opcode >> 4) & 0x03, val);
                12
            }
            0xF1 => {
                let val = self.pop16(mmu);
                self.set_af(val);
                12
            }
            0xC5 | 0xD5 | 0xE5 => {
                let val = self.read_rp((opcode >> 4) & 0x03);
                self.push16(mmu, val);
                16
            }
            0xF5 => {
                let val = self.get_af();
                self.push16(mmu, val);
                16
            }

            // JP
            0xC3 => {
                self.pc = self.fetch16(mmu);
                16
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let addr = self.fetch16(mmu);
                if self.condition(opcode >> 3) {
                    self.pc = addr;
                    16
                } else {
                    12
                }
            }
            0xE9 => {
                self.pc = self.get_hl();
                4
            }

            // CALL
            0xCD => {
                let addr = self.fetch16(mmu);
                self.push16(mmu, self.pc);
                self.pc = addr;
                24
            }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let addr = self.fetch16(mmu);
                if self.condition(opcode >> 3) {
                    self.push16(mmu, self.pc);
                    self.pc = addr;
                    24
                } else {
                    12
                }
            }

            // RST
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.push16(mmu, self.pc);
                self.pc = (opcode & 0x38) as u16;
                16
            }

            // ALU A,d8
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let val = self.fetch8(mmu);
                self.alu(opcode >> 3, val);
                8
            }

            0xCB => {
                let op = self.fetch8(mmu);
                self.execute_cb(mmu, op)
            }

            // High-page loads
            0xE0 => {
                let offset = self.fetch8(mmu);
                mmu.write_byte(0xFF00 | offset as u16, self.a);
                12
            }
            0xF0 => {
                let offset = self.fetch8(mmu);
                self.a = mmu.read_byte(0xFF00 | offset as u16);
                12
            }
            0xE2 => {
                mmu.write_byte(0xFF00 | self.c as u16, self.a);
                8
            }
            0xF2 => {
                self.a = mmu.read_byte(0xFF00 | self.c as u16);
                8
            }
            0xEA => {
                let addr = self.fetch16(mmu);
                mmu.write_byte(addr, self.a);
                16
            }
            0xFA => {
                let addr = self.fetch16(mmu);
                self.a = mmu.read_byte(addr);
                16
            }

            // SP arithmetic
            0xE8 => {
                let offset = self.fetch8(mmu);
                self.sp = self.sp_plus_e(offset);
                16
            }
            0xF8 => {
                let offset = self.fetch8(mmu);
                let res = self.sp_plus_e(offset);
                self.set_hl(res);
                12
            }
            0xF9 => {
                self.sp = self.get_hl();
                8
            }

            // Interrupt master enable
            0xF3 => {
                // DI is immediate and cancels a pending EI.
                self.ime = false;
                self.ime_pending = false;
                4
            }
            0xFB => {
                if !self.ime {
                    self.ime_pending = true;
                }
                4
            }

            // Undocumented opcodes (0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB..=0xED,
            // 0xF4, 0xFC, 0xFD): burn the fetch and continue.
            _ => {
                log::trace!(
                    "undocumented opcode {opcode:02X} at {:04X}",
                    self.pc.wrapping_sub(1)
                );
                4
            }
        }
    }

    fn execute_cb(&mut self, mmu: &mut Mmu, op: u8) -> u32 {
        let r = op & 0x07;
        match op {
            0x00..=0x3F => {
                let val = self.read_reg(mmu, r);
                let res = match op >> 3 {
                    0 => self.rlc(val),
                    1 => self.rrc(val),
                    2 => self.rl(val),
                    3 => self.rr(val),
                    4 => self.sla(val),
                    5 => self.sra(val),
                    6 => self.swap(val),
                    _ => self.srl(val),
                };
                self.write_reg(mmu, r, res);
                if r == 6 { 16 } else { 8 }
            }
            0x40..=0x7F => {
                // BIT: read-only, so the (HL) form is one access shorter.
                let bit = (op >> 3) & 0x07;
                let val = self.read_reg(mmu, r);
                self.f = (self.f & FLAG_C)
                    | FLAG_H
                    | if val & (1 << bit) == 0 { FLAG_Z } else { 0 };
                if r == 6 { 12 } else { 8 }
            }
            0x80..=0xBF => {
                let bit = (op >> 3) & 0x07;
                let val = self.read_reg(mmu, r) & !(1 << bit);
                self.write_reg(mmu, r, val);
                if r == 6 { 16 } else { 8 }
            }
            0xC0..=0xFF => {
                let bit = (op >> 3) & 0x07;
                let val = self.read_reg(mmu, r) | (1 << bit);
                self.write_reg(mmu, r, val);
                if r == 6 { 16 } else { 8 }
            }
        }
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X}",
            self.get_af(),
            self.get_bc(),
            self.get_de(),
            self.get_hl(),
            self.pc,
            self.sp
        )
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
