mod common;

use dmg_core::{CLOCK_HZ, GameBoy, JoypadState};

#[test]
fn rom_only_cartridge_maps_bytes_directly() {
    let mut rom = common::build_rom(0x00, 0x00, 0x00, &[0x00]);
    rom[0x0000] = 0x42;
    rom[0x4000] = 0x99;
    let mut gb = GameBoy::new(rom).unwrap();

    assert_eq!(gb.debug_read(0x0000), 0x42);
    assert_eq!(gb.debug_read(0x4000), 0x99);

    // No banking registers are observable: address 0x0000 returns the ROM's
    // first byte unconditionally, whatever gets written to bank-select.
    gb.debug_write(0x2000, 0x01);
    gb.debug_write(0x2000, 0x7F);
    assert_eq!(gb.debug_read(0x0000), 0x42);
    assert_eq!(gb.debug_read(0x4000), 0x99);
}

#[test]
fn truncated_rom_is_rejected() {
    assert!(GameBoy::new(vec![0u8; 0x80]).is_err());
}

#[test]
fn echo_ram_is_visible_through_debug_io() {
    let mut gb = common::machine(&[0x00]);
    gb.debug_write(0xC456, 0x77);
    assert_eq!(gb.debug_read(0xE456), 0x77);
    assert_eq!(gb.debug_read(0xFEA0), 0xFF);
}

#[test]
fn tick_spends_the_wall_clock_cycle_budget() {
    let mut gb = common::machine(&[0x00]);
    let before = gb.cpu.cycles;
    for _ in 0..60 {
        gb.tick(1.0 / 60.0);
    }
    let spent = (gb.cpu.cycles - before) as i64;
    // One emulated second, to within a single instruction of slack (the
    // fractional remainder carries between ticks).
    assert!(
        (spent - CLOCK_HZ as i64).abs() <= 24,
        "spent {spent} cycles, expected about {CLOCK_HZ}"
    );
}

#[test]
fn frame_pull_point_flips_once_per_frame() {
    let mut gb = common::machine(&[0x00]);
    assert!(!gb.frame_ready());
    gb.tick(0.0168); // just over one 70224-cycle frame
    assert!(gb.frame_ready());
    assert_eq!(gb.framebuffer().len(), 160 * 144);

    gb.clear_frame_flag();
    gb.tick(0.001);
    assert!(!gb.frame_ready());
}

#[test]
fn audio_pull_point_produces_samples() {
    let mut gb = common::machine(&[0x00]);
    gb.tick(0.01);
    let frames = gb.take_audio_samples();
    // ~480 frames of 48kHz output for 10ms of emulated time.
    assert!((450..=510).contains(&frames.len()), "{}", frames.len());
}

#[test]
fn serial_output_is_captured_and_raises_the_interrupt() {
    // LD A,0x5A; LDH (0x01),A; LD A,0x81; LDH (0x02),A; JR -2
    let mut gb = common::machine(&[0x3E, 0x5A, 0xE0, 0x01, 0x3E, 0x81, 0xE0, 0x02, 0x18, 0xFE]);
    for _ in 0..600 {
        gb.step_instruction();
    }
    assert_eq!(gb.take_serial_output(), vec![0x5A]);
    assert_eq!(gb.debug_read(0xFF0F) & 0x08, 0x08);
}

#[test]
fn stop_stalls_until_a_button_wakes_the_cpu() {
    // STOP (with its padding byte), then INC A.
    let mut gb = common::machine(&[0x10, 0x00, 0x3C]);
    common::run_until_pc(&mut gb, 0x0150, 10);
    gb.step_instruction();
    assert!(gb.cpu.stopped);

    let pc = gb.cpu.pc;
    for _ in 0..16 {
        gb.step_instruction();
    }
    assert_eq!(gb.cpu.pc, pc);

    gb.set_joypad(JoypadState {
        start: true,
        ..Default::default()
    });
    assert!(!gb.cpu.stopped);
    gb.step_instruction();
    assert_eq!(gb.cpu.pc, pc.wrapping_add(1));
}

#[test]
fn joypad_register_reflects_injected_state() {
    let mut gb = common::machine(&[0x00]);
    gb.debug_write(0xFFFF, 0x10);
    gb.debug_write(0xFF00, 0x10); // select the button half

    gb.set_joypad(JoypadState {
        start: true,
        ..Default::default()
    });
    assert_eq!(gb.debug_read(0xFF00), 0xC0 | 0x10 | 0x07);
    // The high-to-low edge on a selected line requested the interrupt.
    assert_eq!(gb.debug_read(0xFF0F) & 0x10, 0x10);
}

#[test]
fn reset_preserves_the_cartridge_but_not_machine_state() {
    let mut gb = common::machine(&[0x00]);
    gb.debug_write(0xC000, 0x55);
    gb.tick(0.005);
    gb.reset();
    assert_eq!(gb.debug_read(0xC000), 0x00);
    assert_eq!(gb.cpu.pc, 0x0100);
    assert_eq!(gb.debug_read(0x0100), 0xC3); // ROM still mapped
}
