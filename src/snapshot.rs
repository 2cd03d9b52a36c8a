//! Binary snapshot format: a versioned header followed by the fixed-order
//! serialized state of every subcomponent. `save()` and `load()` walk the
//! same field order, so a round trip through an unmodified state is
//! byte-identical.

use std::fmt;

use crate::agnus::Agnus;
use crate::amiga::Amiga;
use crate::beam::Beam;
use crate::blitter::Blitter;
use crate::cia::Cia;
use crate::config::Region;
use crate::copper::Copper;
use crate::denise::{Denise, Sprite};
use crate::disk::FloppyDrive;
use crate::keyboard::Keyboard;
use crate::paula::Paula;

const MAGIC: [u8; 6] = *b"VASNAP";
const VERSION_MAJOR: u8 = 0;
const VERSION_MINOR: u8 = 1;
const VERSION_SUBMINOR: u8 = 0;
const BETA: u8 = 0;
const HEADER_LEN: usize = 16;

#[derive(Debug)]
pub enum SnapshotError {
    TooOld,
    TooNew,
    IsBeta,
    Corrupted,
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooOld => write!(f, "snapshot was written by an older, incompatible version"),
            Self::TooNew => write!(f, "snapshot was written by a newer, incompatible version"),
            Self::IsBeta => write!(f, "snapshot was written by a beta build and is not supported"),
            Self::Corrupted => write!(f, "snapshot data is truncated or malformed"),
        }
    }
}

impl std::error::Error for SnapshotError {}

/// Appends fixed-size fields in a declared order; mirrors `Reader` below.
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn bytes(&mut self, v: &[u8]) {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }
}

/// Reads fields back in the same declared order `Writer` wrote them.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, SnapshotError> {
        let b = *self.data.get(self.pos).ok_or(SnapshotError::Corrupted)?;
        self.pos += 1;
        Ok(b)
    }
    fn bool(&mut self) -> Result<bool, SnapshotError> {
        Ok(self.u8()? != 0)
    }
    fn u16(&mut self) -> Result<u16, SnapshotError> {
        let end = self.pos + 2;
        let slice = self.data.get(self.pos..end).ok_or(SnapshotError::Corrupted)?;
        self.pos = end;
        Ok(u16::from_le_bytes(slice.try_into().expect("len checked")))
    }
    fn i16(&mut self) -> Result<i16, SnapshotError> {
        Ok(self.u16()? as i16)
    }
    fn u32(&mut self) -> Result<u32, SnapshotError> {
        let end = self.pos + 4;
        let slice = self.data.get(self.pos..end).ok_or(SnapshotError::Corrupted)?;
        self.pos = end;
        Ok(u32::from_le_bytes(slice.try_into().expect("len checked")))
    }
    fn u64(&mut self) -> Result<u64, SnapshotError> {
        let end = self.pos + 8;
        let slice = self.data.get(self.pos..end).ok_or(SnapshotError::Corrupted)?;
        self.pos = end;
        Ok(u64::from_le_bytes(slice.try_into().expect("len checked")))
    }
    fn i64(&mut self) -> Result<i64, SnapshotError> {
        Ok(self.u64()? as i64)
    }
    fn bytes(&mut self) -> Result<Vec<u8>, SnapshotError> {
        let len = self.u32()? as usize;
        let end = self.pos + len;
        let slice = self.data.get(self.pos..end).ok_or(SnapshotError::Corrupted)?;
        self.pos = end;
        Ok(slice.to_vec())
    }
}

fn write_beam(w: &mut Writer, beam: &Beam) {
    w.u8(match beam.region {
        Region::Pal => 0,
        Region::Ntsc => 1,
    });
    w.u64(beam.frame);
    w.u16(beam.v);
    w.u16(beam.h);
    w.bool(beam.lof);
    w.bool(beam.lof_toggle);
    w.bool(beam.lol);
    w.bool(beam.lol_toggle);
}

fn read_beam(r: &mut Reader<'_>) -> Result<Beam, SnapshotError> {
    let region = match r.u8()? {
        0 => Region::Pal,
        _ => Region::Ntsc,
    };
    let mut beam = Beam::new(region);
    beam.frame = r.u64()?;
    beam.v = r.u16()?;
    beam.h = r.u16()?;
    beam.lof = r.bool()?;
    beam.lof_toggle = r.bool()?;
    beam.lol = r.bool()?;
    beam.lol_toggle = r.bool()?;
    Ok(beam)
}

fn write_agnus(w: &mut Writer, agnus: &Agnus) {
    write_beam(w, &agnus.beam);
    w.u16(agnus.dmacon);
    w.u16(agnus.bplcon0);
    for ptr in agnus.bpl_pt {
        w.u32(ptr);
    }
    w.i16(agnus.bpl1mod);
    w.i16(agnus.bpl2mod);
    w.u16(agnus.ddfstrt);
    w.u16(agnus.ddfstop);
    w.u16(agnus.diwstrt);
    w.u16(agnus.diwstop);
    for ptr in agnus.spr_pt {
        w.u32(ptr);
    }
    w.u32(agnus.dsk_pt);
}

fn read_agnus(r: &mut Reader<'_>, agnus: &mut Agnus) -> Result<(), SnapshotError> {
    agnus.beam = read_beam(r)?;
    agnus.dmacon = r.u16()?;
    agnus.bplcon0 = r.u16()?;
    for slot in &mut agnus.bpl_pt {
        *slot = r.u32()?;
    }
    agnus.bpl1mod = r.i16()?;
    agnus.bpl2mod = r.i16()?;
    agnus.ddfstrt = r.u16()?;
    agnus.ddfstop = r.u16()?;
    agnus.diwstrt = r.u16()?;
    agnus.diwstop = r.u16()?;
    for slot in &mut agnus.spr_pt {
        *slot = r.u32()?;
    }
    agnus.dsk_pt = r.u32()?;
    Ok(())
}

fn write_blitter(w: &mut Writer, blitter: &Blitter) {
    let regs = &blitter.regs;
    w.u16(regs.bltcon0);
    w.u16(regs.bltcon1);
    w.u16(regs.bltafwm);
    w.u16(regs.bltalwm);
    w.u32(regs.bltapt);
    w.u32(regs.bltbpt);
    w.u32(regs.bltcpt);
    w.u32(regs.bltdpt);
    w.i16(regs.bltamod);
    w.i16(regs.bltbmod);
    w.i16(regs.bltcmod);
    w.i16(regs.bltdmod);
    w.u16(regs.bltsize);
    w.bool(blitter.running);
    w.bool(blitter.bzero);
    w.bytes(&blitter.snapshot_bytes());
}

fn read_blitter(r: &mut Reader<'_>, blitter: &mut Blitter) -> Result<(), SnapshotError> {
    let regs = &mut blitter.regs;
    regs.bltcon0 = r.u16()?;
    regs.bltcon1 = r.u16()?;
    regs.bltafwm = r.u16()?;
    regs.bltalwm = r.u16()?;
    regs.bltapt = r.u32()?;
    regs.bltbpt = r.u32()?;
    regs.bltcpt = r.u32()?;
    regs.bltdpt = r.u32()?;
    regs.bltamod = r.i16()?;
    regs.bltbmod = r.i16()?;
    regs.bltcmod = r.i16()?;
    regs.bltdmod = r.i16()?;
    regs.bltsize = r.u16()?;
    blitter.running = r.bool()?;
    blitter.bzero = r.bool()?;
    let job_bytes = r.bytes()?;
    blitter.restore_bytes(&job_bytes).map_err(|()| SnapshotError::Corrupted)
}

fn write_copper(w: &mut Writer, copper: &Copper) {
    w.bytes(&copper.snapshot_bytes());
}

fn read_copper(r: &mut Reader<'_>, copper: &mut Copper) -> Result<(), SnapshotError> {
    let bytes = r.bytes()?;
    copper.restore_bytes(&bytes).map_err(|()| SnapshotError::Corrupted)
}

fn write_keyboard(w: &mut Writer, keyboard: &Keyboard) {
    w.bytes(&keyboard.snapshot_bytes());
}

fn read_keyboard(r: &mut Reader<'_>, keyboard: &mut Keyboard) -> Result<(), SnapshotError> {
    let bytes = r.bytes()?;
    keyboard.restore_bytes(&bytes).map_err(|()| SnapshotError::Corrupted)
}

fn write_sprite(w: &mut Writer, sprite: &Sprite) {
    w.u16(sprite.pos);
    w.u16(sprite.ctl);
    w.u16(sprite.data);
    w.u16(sprite.datb);
    w.bool(sprite.armed);
}

fn read_sprite(r: &mut Reader<'_>, sprite: &mut Sprite) -> Result<(), SnapshotError> {
    sprite.pos = r.u16()?;
    sprite.ctl = r.u16()?;
    sprite.data = r.u16()?;
    sprite.datb = r.u16()?;
    sprite.armed = r.bool()?;
    Ok(())
}

fn write_denise(w: &mut Writer, denise: &Denise) {
    for color in denise.palette {
        w.u16(color);
    }
    w.u16(denise.bplcon0);
    w.u16(denise.bplcon1);
    w.u16(denise.bplcon2);
    w.u16(denise.bplcon3);
    w.u16(denise.diwstrt);
    w.u16(denise.diwstop);
    w.u16(denise.clxdat);
    w.u16(denise.clxcon);
    for sprite in &denise.sprites {
        write_sprite(w, sprite);
    }
}

fn read_denise(r: &mut Reader<'_>, denise: &mut Denise) -> Result<(), SnapshotError> {
    for slot in &mut denise.palette {
        *slot = r.u16()?;
    }
    denise.bplcon0 = r.u16()?;
    denise.bplcon1 = r.u16()?;
    denise.bplcon2 = r.u16()?;
    denise.bplcon3 = r.u16()?;
    denise.diwstrt = r.u16()?;
    denise.diwstop = r.u16()?;
    denise.clxdat = r.u16()?;
    denise.clxcon = r.u16()?;
    for sprite in &mut denise.sprites {
        read_sprite(r, sprite)?;
    }
    Ok(())
}

fn write_paula(w: &mut Writer, paula: &Paula) {
    w.u16(paula.intena);
    w.u16(paula.intreq);
    w.u16(paula.adkcon);
    w.u16(paula.disk.dsklen);
    w.u16(paula.disk.dsksync);
    w.u16(paula.disk.dskbytr);
    w.bool(paula.disk.turbo);
    w.bytes(&paula.audio_snapshot_bytes());
}

fn read_paula(r: &mut Reader<'_>, paula: &mut Paula) -> Result<(), SnapshotError> {
    paula.intena = r.u16()?;
    paula.intreq = r.u16()?;
    paula.adkcon = r.u16()?;
    paula.disk.dsklen = r.u16()?;
    paula.disk.dsksync = r.u16()?;
    paula.disk.dskbytr = r.u16()?;
    paula.disk.turbo = r.bool()?;
    let audio_bytes = r.bytes()?;
    paula.restore_audio_bytes(&audio_bytes).map_err(|()| SnapshotError::Corrupted)?;
    Ok(())
}

fn write_cia(w: &mut Writer, cia: &Cia) {
    w.bytes(&cia.snapshot_bytes());
}

fn read_cia(r: &mut Reader<'_>, cia: &mut Cia) -> Result<(), SnapshotError> {
    let bytes = r.bytes()?;
    cia.restore_bytes(&bytes).map_err(|()| SnapshotError::Corrupted)
}

fn write_drive(w: &mut Writer, drive: &FloppyDrive) {
    w.bytes(&drive.snapshot_bytes());
}

fn read_drive(r: &mut Reader<'_>, drive: &mut FloppyDrive) -> Result<(), SnapshotError> {
    let bytes = r.bytes()?;
    drive.restore_bytes(&bytes).map_err(|()| SnapshotError::Corrupted)
}

/// Serialize `amiga`'s full state. Traversal order: meta, Agnus, Copper, CPU
/// program counter, chip/slow RAM, both CIAs, Denise, Blitter, Paula,
/// keyboard, drives.
#[must_use]
pub fn save(amiga: &Amiga) -> Vec<u8> {
    let mut w = Writer::new();
    w.buf.extend_from_slice(&MAGIC);
    w.u8(VERSION_MAJOR);
    w.u8(VERSION_MINOR);
    w.u8(VERSION_SUBMINOR);
    w.u8(BETA);
    w.u64(amiga.master_cycle as u64);
    debug_assert_eq!(w.buf.len(), HEADER_LEN);

    write_agnus(&mut w, &amiga.agnus);
    write_copper(&mut w, &amiga.copper);
    w.u32(amiga.cpu.pc());
    w.bytes(&amiga.memory.chip_ram);
    w.bytes(&amiga.memory.slow_ram);
    write_cia(&mut w, &amiga.cia_a);
    write_cia(&mut w, &amiga.cia_b);
    write_denise(&mut w, &amiga.denise);
    write_blitter(&mut w, &amiga.blitter);
    write_paula(&mut w, &amiga.paula);
    write_keyboard(&mut w, &amiga.keyboard);
    write_drive(&mut w, &amiga.df0);
    w.buf
}

/// Restore `amiga`'s state from a blob produced by [`save`]. `amiga` must
/// already be constructed with matching RAM/ROM sizing; only mutable runtime
/// state is overwritten.
///
/// # Errors
/// Returns [`SnapshotError`] if the header is absent, mismatched, or the
/// trailing data is truncated relative to the declared traversal.
pub fn load(amiga: &mut Amiga, data: &[u8]) -> Result<(), SnapshotError> {
    if data.len() < HEADER_LEN || data[0..6] != MAGIC {
        return Err(SnapshotError::Corrupted);
    }
    let major = data[6];
    let beta = data[9];
    if beta != 0 {
        return Err(SnapshotError::IsBeta);
    }
    if major < VERSION_MAJOR {
        return Err(SnapshotError::TooOld);
    }
    if major > VERSION_MAJOR {
        return Err(SnapshotError::TooNew);
    }

    let mut r = Reader::new(&data[HEADER_LEN..]);
    read_agnus(&mut r, &mut amiga.agnus)?;
    read_copper(&mut r, &mut amiga.copper)?;
    let cpu_pc = r.u32()?;
    amiga.cpu.reset();
    amiga.cpu.set_pc(cpu_pc);

    let chip = r.bytes()?;
    if chip.len() != amiga.memory.chip_ram.len() {
        return Err(SnapshotError::Corrupted);
    }
    amiga.memory.chip_ram.copy_from_slice(&chip);
    let slow = r.bytes()?;
    if slow.len() != amiga.memory.slow_ram.len() {
        return Err(SnapshotError::Corrupted);
    }
    amiga.memory.slow_ram.copy_from_slice(&slow);

    read_cia(&mut r, &mut amiga.cia_a)?;
    read_cia(&mut r, &mut amiga.cia_b)?;
    read_denise(&mut r, &mut amiga.denise)?;
    read_blitter(&mut r, &mut amiga.blitter)?;
    read_paula(&mut r, &mut amiga.paula)?;
    read_keyboard(&mut r, &mut amiga.keyboard)?;
    read_drive(&mut r, &mut amiga.df0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AmigaConfig, AmigaModel};
    use crate::config::KickstartSource;

    fn a500() -> Amiga {
        let cfg = AmigaConfig::preset(AmigaModel::A500, KickstartSource::Rom(vec![0xAA; 256 * 1024]));
        Amiga::new(cfg).expect("valid config")
    }

    #[test]
    fn round_trip_from_reset_state_is_byte_equal() {
        let amiga = a500();
        let first = save(&amiga);
        let mut amiga2 = a500();
        load(&mut amiga2, &first).expect("valid snapshot");
        let second = save(&amiga2);
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip_after_running_frames_is_byte_equal() {
        let mut amiga = a500();
        amiga.power_on();
        for _ in 0..5000 {
            amiga.step_cck();
        }
        let first = save(&amiga);
        let mut amiga2 = a500();
        amiga2.power_on();
        load(&mut amiga2, &first).expect("valid snapshot");
        let second = save(&amiga2);
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip_preserves_copper_audio_and_blit_mid_progress_state() {
        let mut amiga = a500();
        amiga.power_on();

        // Drive the Copper mid-list, waiting on the beam.
        amiga.copper.cop1lc = 0x4000;
        amiga.copper.pc = 0x4080;
        amiga.copper.active_list = 1;
        amiga.copper.state = crate::copper::State::Wait;
        amiga.copper.waiting = true;
        amiga.copper.cdang = true;

        // Arm audio channel 0 and tick enough CCKs to reach the Play state.
        amiga.paula.write_audio_register(0x0A0, 0x0010);
        amiga.paula.write_audio_register(0x0A2, 0x0000);
        amiga.paula.write_audio_register(0x0A4, 4);
        amiga.paula.write_audio_register(0x0A6, 200);
        amiga.paula.write_audio_register(0x0A8, 32);
        for _ in 0..400 {
            amiga.paula.tick_audio_cck(0x8201, Some(0), |_| 0x55);
        }
        assert_eq!(amiga.paula.audio_state(0), crate::paula::AudioState::Play);

        // Start a blit and advance it partway through its cycle budget.
        amiga.blitter.regs.bltcon0 = 0xFF | 0x0800;
        amiga.blitter.regs.bltafwm = 0xFFFF;
        amiga.blitter.regs.bltalwm = 0xFFFF;
        amiga.blitter.regs.bltsize = (4 << 6) | 1;
        amiga.blitter.start(|_| 0xAAAA);
        amiga.blitter.tick(|_, _| {});

        let cpu_pc = amiga.cpu.pc();
        let first = save(&amiga);

        let mut amiga2 = a500();
        amiga2.power_on();
        load(&mut amiga2, &first).expect("valid snapshot");

        assert_eq!(amiga2.copper.state, amiga.copper.state);
        assert_eq!(amiga2.copper.pc, amiga.copper.pc);
        assert_eq!(amiga2.copper.active_list, amiga.copper.active_list);
        assert!(amiga2.copper.cdang);
        assert_eq!(amiga2.paula.audio_state(0), crate::paula::AudioState::Play);
        assert!(amiga2.blitter.running);
        assert_eq!(amiga2.cpu.pc(), cpu_pc);

        let second = save(&amiga2);
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut amiga = a500();
        let garbage = vec![0u8; 64];
        assert!(matches!(load(&mut amiga, &garbage), Err(SnapshotError::Corrupted)));
    }

    #[test]
    fn rejects_newer_major_version() {
        let mut amiga = a500();
        let mut blob = save(&amiga);
        blob[6] = VERSION_MAJOR + 1;
        assert!(matches!(load(&mut amiga, &blob), Err(SnapshotError::TooNew)));
    }

    #[test]
    fn rejects_beta_builds() {
        let mut amiga = a500();
        let mut blob = save(&amiga);
        blob[9] = 1;
        assert!(matches!(load(&mut amiga, &blob), Err(SnapshotError::IsBeta)));
    }

    #[test]
    fn rejects_truncated_data() {
        let mut amiga = a500();
        let blob = save(&amiga);
        let truncated = &blob[..HEADER_LEN + 4];
        assert!(matches!(load(&mut amiga, truncated), Err(SnapshotError::Corrupted)));
    }
}
