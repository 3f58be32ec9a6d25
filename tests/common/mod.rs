#![allow(dead_code)]

use dmg_core::GameBoy;

pub const ROM_BANK_SIZE: usize = 0x4000;

/// Route `log` output into the test harness. Safe to call repeatedly.
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build a synthetic ROM image: header bytes poked in place, entry point
/// jumping to the program copied at 0x150.
pub fn build_rom(cart_type: u8, rom_size_code: u8, ram_size_code: u8, program: &[u8]) -> Vec<u8> {
    let banks = match rom_size_code {
        code @ 0x00..=0x08 => 2usize << code,
        _ => 2,
    };
    let mut rom = vec![0u8; banks * ROM_BANK_SIZE];

    // Entry point: JP 0x0150.
    rom[0x100] = 0xC3;
    rom[0x101] = 0x50;
    rom[0x102] = 0x01;

    rom[0x147] = cart_type;
    rom[0x148] = rom_size_code;
    rom[0x149] = ram_size_code;

    rom[0x150..0x150 + program.len()].copy_from_slice(program);
    rom
}

/// A ROM-only machine with `program` mapped at 0x150.
pub fn machine(program: &[u8]) -> GameBoy {
    GameBoy::new(build_rom(0x00, 0x00, 0x00, program)).unwrap()
}

/// Step until PC reaches `target`, with a step bound so a broken test fails
/// instead of hanging.
pub fn run_until_pc(gb: &mut GameBoy, target: u16, max_steps: u32) {
    for _ in 0..max_steps {
        if gb.cpu.pc == target {
            return;
        }
        gb.step_instruction();
    }
    panic!(
        "PC never reached {target:04X} within {max_steps} steps (state: {})",
        gb.cpu.debug_state()
    );
}
