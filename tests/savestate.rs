mod common;

use dmg_core::{GameBoy, SaveState, SaveStateError};

fn rtc_machine() -> GameBoy {
    // MBC3 + timer + RAM + battery, 32KB RAM.
    let rom = common::build_rom(0x10, 0x01, 0x03, &[0x00]);
    GameBoy::new(rom).unwrap()
}

fn titled_rom(title: &[u8]) -> Vec<u8> {
    let mut rom = common::build_rom(0x10, 0x01, 0x03, &[0x00]);
    rom[0x134..0x134 + title.len()].copy_from_slice(title);
    rom
}

#[test]
fn save_state_round_trips_bit_identically() {
    common::init_logs();
    let mut gb = rtc_machine();

    gb.debug_write(0x0000, 0x0A); // open the RAM/RTC gate
    for i in 0..64u16 {
        gb.debug_write(0xA000 + i, (i as u8).wrapping_mul(3));
    }
    // Put something distinctive in the clock.
    gb.debug_write(0x4000, 0x08);
    gb.debug_write(0xA000, 12);
    gb.debug_write(0x4000, 0x09);
    gb.debug_write(0xA000, 34);
    gb.debug_write(0x4000, 0x0C);
    gb.debug_write(0xA000, 0x81); // day bit 8 + carry

    let state = gb.save_state();
    let decoded = SaveState::from_bytes(&state.to_bytes()).unwrap();
    assert_eq!(decoded, state);

    let mut restored = rtc_machine();
    restored.load_state(&decoded).unwrap();
    assert_eq!(restored.save_state(), state);

    restored.debug_write(0x0000, 0x0A);
    restored.debug_write(0x6000, 0x00);
    restored.debug_write(0x6000, 0x01);
    restored.debug_write(0x4000, 0x08);
    assert_eq!(restored.debug_read(0xA000), 12);

    restored.debug_write(0x4000, 0x00); // back from the RTC selector to RAM
    for i in 0..64u16 {
        assert_eq!(restored.debug_read(0xA000 + i), (i as u8).wrapping_mul(3));
    }
}

#[test]
fn ram_size_mismatch_is_rejected_and_state_untouched() {
    let mut gb = rtc_machine();
    gb.debug_write(0x0000, 0x0A);
    gb.debug_write(0xA000, 0x77);

    let mut state = gb.save_state();
    state.ram = vec![0; 0x800];
    assert!(matches!(
        gb.load_state(&state),
        Err(SaveStateError::RamSizeMismatch {
            expected: 0x8000,
            found: 0x800
        })
    ));
    assert_eq!(gb.debug_read(0xA000), 0x77);
}

#[test]
fn title_mismatch_is_rejected() {
    let mut gb = GameBoy::new(titled_rom(b"ALPHA")).unwrap();
    let other = GameBoy::new(titled_rom(b"OMEGA")).unwrap();
    let state = other.save_state();
    assert!(matches!(
        gb.load_state(&state),
        Err(SaveStateError::TitleMismatch { .. })
    ));
}

#[test]
fn rtc_presence_must_match_the_cartridge() {
    // Same title and RAM size, but no RTC on the donor cartridge.
    let donor = GameBoy::new(common::build_rom(0x03, 0x01, 0x03, &[0x00])).unwrap();
    let mut gb = rtc_machine();
    assert!(matches!(
        gb.load_state(&donor.save_state()),
        Err(SaveStateError::MissingRtc)
    ));

    let mut plain = GameBoy::new(common::build_rom(0x03, 0x01, 0x03, &[0x00])).unwrap();
    assert!(matches!(
        plain.load_state(&gb.save_state()),
        Err(SaveStateError::UnexpectedRtc)
    ));
}

#[test]
fn ram_dirty_tracks_writes_through_the_gate() {
    let mut gb = rtc_machine();
    assert!(!gb.ram_dirty());

    // Gate closed: the write is dropped and the flag stays clear.
    gb.debug_write(0xA000, 0x01);
    assert!(!gb.ram_dirty());

    gb.debug_write(0x0000, 0x0A);
    gb.debug_write(0xA000, 0x01);
    assert!(gb.ram_dirty());
    gb.clear_ram_dirty();
    assert!(!gb.ram_dirty());
}
