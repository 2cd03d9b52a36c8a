//! Floppy drive mechanism: head positioning, motor spin-up, disk-change
//! sensing, and raw MFM track encoding.
//!
//! Disk image parsing (ADF/IPF) is an external collaborator; this module
//! only needs a source of 512-byte sectors, exposed through `TrackSource`
//! so callers can plug in whatever image format they parse elsewhere.

/// A source of sector data for one side of one cylinder. Implemented by the
/// (external) disk-image layer; this crate only consumes it.
pub trait TrackSource {
    /// Sector bytes for `cylinder`/`head`, `sectors_per_track * 512` bytes.
    fn read_track_sectors(&self, cylinder: u32, head: u32) -> &[u8];
    fn sectors_per_track(&self) -> u32;
}

/// E-clock ticks for motor spin-up (~500ms at 709 kHz).
const MOTOR_SPINUP_TICKS: u32 = 350_000;

pub struct DriveStatus {
    pub disk_change: bool,
    pub write_protect: bool,
    pub track0: bool,
    pub ready: bool,
}

pub struct FloppyDrive {
    cylinder: u32,
    head: u32,
    motor_on: bool,
    motor_spinning: bool,
    spin_timer: u32,
    selected: bool,
    disk_present: bool,
    disk_changed: bool,
    write_protected: bool,
    prev_step: bool,
    track_data: Vec<u8>,
    bit_pos: usize,
}

impl FloppyDrive {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cylinder: 0,
            head: 0,
            motor_on: false,
            motor_spinning: false,
            spin_timer: 0,
            selected: false,
            disk_present: false,
            disk_changed: true,
            write_protected: false,
            prev_step: true,
            track_data: Vec::new(),
            bit_pos: 0,
        }
    }

    /// Load the current cylinder/head's MFM-encoded bytes for bit-by-bit DMA
    /// streaming, as produced by [`Self::encode_current_track`]. The caller
    /// (the disk-image layer, or a test driving the controller directly) is
    /// responsible for re-loading this whenever the head steps to a new
    /// track.
    pub fn load_track(&mut self, data: Vec<u8>) {
        self.track_data = data;
        self.bit_pos = 0;
    }

    /// Next MFM bit (MSB-first) off the loaded track, wrapping around the
    /// end of the track the way a spinning disk revisits its start. Returns
    /// `None` if no track data has been loaded.
    pub fn next_mfm_bit(&mut self) -> Option<u8> {
        if self.track_data.is_empty() {
            return None;
        }
        let byte = self.track_data[self.bit_pos / 8];
        let bit = (byte >> (7 - (self.bit_pos % 8))) & 1;
        self.bit_pos = (self.bit_pos + 1) % (self.track_data.len() * 8);
        Some(bit)
    }

    /// Loaded track reinterpreted as big-endian 16-bit words, for the turbo
    /// DMA path that skips per-bit shifting. Returns `None` if no track data
    /// has been loaded.
    #[must_use]
    pub fn current_track_words(&self) -> Option<Vec<u16>> {
        if self.track_data.is_empty() {
            return None;
        }
        Some(self.track_data.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
    }

    pub fn insert_disk(&mut self, write_protected: bool) {
        self.disk_present = true;
        self.write_protected = write_protected;
        self.disk_changed = false;
    }

    pub fn eject_disk(&mut self) {
        self.disk_present = false;
        self.disk_changed = true;
    }

    /// Update control signals from CIA-B port B. All parameters are already
    /// decoded to active-high "asserted" booleans.
    pub fn update_control(&mut self, step: bool, dir_inward: bool, side_upper: bool, sel: bool, motor: bool) {
        if sel {
            self.selected = true;
            self.motor_on = motor;
            if motor && !self.motor_spinning {
                self.spin_timer = 0;
            }
            if !motor {
                self.motor_spinning = false;
                self.spin_timer = 0;
            }
        } else {
            self.selected = false;
        }

        self.head = u32::from(side_upper);

        let step_edge = step && !self.prev_step;
        self.prev_step = step;

        if step_edge {
            if dir_inward {
                if self.cylinder < 79 {
                    self.cylinder += 1;
                }
            } else if self.cylinder > 0 {
                self.cylinder -= 1;
            }
            if self.disk_present {
                self.disk_changed = false;
            }
        }
    }

    /// Advance the motor spin-up timer by one E-clock tick.
    pub fn tick(&mut self) {
        if self.motor_on && !self.motor_spinning {
            self.spin_timer += 1;
            if self.spin_timer >= MOTOR_SPINUP_TICKS {
                self.motor_spinning = true;
            }
        }
    }

    /// Serialize head position, motor, and disk-presence state for
    /// snapshotting. Inserted disk image bytes are the image layer's
    /// responsibility, not this drive mechanism's.
    #[must_use]
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20);
        out.extend_from_slice(&self.cylinder.to_le_bytes());
        out.extend_from_slice(&self.head.to_le_bytes());
        out.push(u8::from(self.motor_on));
        out.push(u8::from(self.motor_spinning));
        out.extend_from_slice(&self.spin_timer.to_le_bytes());
        out.push(u8::from(self.selected));
        out.push(u8::from(self.disk_present));
        out.push(u8::from(self.disk_changed));
        out.push(u8::from(self.write_protected));
        out.push(u8::from(self.prev_step));
        out
    }

    /// Restore state written by [`Self::snapshot_bytes`].
    ///
    /// # Errors
    /// Returns `Err` if `bytes` is shorter than the expected field layout.
    pub fn restore_bytes(&mut self, bytes: &[u8]) -> Result<(), ()> {
        if bytes.len() < 19 {
            return Err(());
        }
        let mut i = 0usize;
        let mut u8_next = || {
            let v = bytes[i];
            i += 1;
            v
        };
        self.cylinder = u32::from_le_bytes([u8_next(), u8_next(), u8_next(), u8_next()]);
        self.head = u32::from_le_bytes([u8_next(), u8_next(), u8_next(), u8_next()]);
        self.motor_on = u8_next() != 0;
        self.motor_spinning = u8_next() != 0;
        self.spin_timer = u32::from_le_bytes([u8_next(), u8_next(), u8_next(), u8_next()]);
        self.selected = u8_next() != 0;
        self.disk_present = u8_next() != 0;
        self.disk_changed = u8_next() != 0;
        self.write_protected = u8_next() != 0;
        self.prev_step = u8_next() != 0;
        Ok(())
    }

    #[must_use]
    pub fn status(&self) -> DriveStatus {
        DriveStatus {
            disk_change: self.disk_changed,
            write_protect: self.write_protected,
            track0: self.cylinder == 0,
            ready: self.motor_spinning,
        }
    }

    #[must_use]
    pub fn encode_current_track<T: TrackSource>(&self, source: &T) -> Option<Vec<u8>> {
        if !self.disk_present {
            return None;
        }
        let track_num = (self.cylinder * 2 + self.head) as u8;
        let sectors = source.read_track_sectors(self.cylinder, self.head);
        Some(encode_mfm_track(sectors, track_num, source.sectors_per_track()))
    }

    #[must_use]
    pub const fn cylinder(&self) -> u32 {
        self.cylinder
    }
    #[must_use]
    pub const fn head(&self) -> u32 {
        self.head
    }
    #[must_use]
    pub const fn motor_on(&self) -> bool {
        self.motor_on
    }
    #[must_use]
    pub const fn selected(&self) -> bool {
        self.selected
    }
}

impl Default for FloppyDrive {
    fn default() -> Self {
        Self::new()
    }
}

/// Size of one MFM-encoded DD track (11 sectors, fixed buffer with gap fill).
pub const MFM_TRACK_BYTES: usize = 13_630;

/// Encode a track's worth of 512-byte sectors into Amiga raw MFM format
/// (odd/even bit-split per longword, each half MFM-encoded separately).
#[must_use]
pub fn encode_mfm_track(track_sectors: &[u8], track_num: u8, sectors_per_track: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MFM_TRACK_BYTES);
    for sector in 0..sectors_per_track {
        let start = sector as usize * 512;
        let sector_data = &track_sectors[start..start + 512];
        encode_sector(&mut buf, track_num, sector as u8, sectors_per_track as u8, sector_data);
    }
    while buf.len() < MFM_TRACK_BYTES {
        buf.push(0xAA);
    }
    buf.truncate(MFM_TRACK_BYTES);
    buf
}

fn encode_sector(buf: &mut Vec<u8>, track: u8, sector: u8, sectors_per_track: u8, data: &[u8]) {
    buf.extend_from_slice(&[0xAA, 0xAA, 0xAA, 0xAA]);
    buf.extend_from_slice(&[0x44, 0x89, 0x44, 0x89]);

    let sectors_to_gap = sectors_per_track - sector - 1;
    let info_long = u32::from_be_bytes([0xFF, track, sector, sectors_to_gap]);
    let info_odd = mfm_encode_long(odd_bits(info_long));
    let info_even = mfm_encode_long(even_bits(info_long));
    buf.extend_from_slice(&info_odd.to_be_bytes());
    buf.extend_from_slice(&info_even.to_be_bytes());

    let mut label_mfm_odd = [0u32; 4];
    let mut label_mfm_even = [0u32; 4];
    for i in 0..4 {
        label_mfm_odd[i] = mfm_encode_long(0);
        label_mfm_even[i] = mfm_encode_long(0);
    }
    for l in &label_mfm_odd {
        buf.extend_from_slice(&l.to_be_bytes());
    }
    for l in &label_mfm_even {
        buf.extend_from_slice(&l.to_be_bytes());
    }

    let mut hdr_cksum = info_odd ^ info_even;
    for i in 0..4 {
        hdr_cksum ^= label_mfm_odd[i] ^ label_mfm_even[i];
    }
    buf.extend_from_slice(&mfm_encode_long(odd_bits(hdr_cksum)).to_be_bytes());
    buf.extend_from_slice(&mfm_encode_long(even_bits(hdr_cksum)).to_be_bytes());

    let mut data_longs = [0u32; 128];
    for (i, chunk) in data.chunks_exact(4).enumerate() {
        data_longs[i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    let mut data_cksum = 0u32;
    let mut data_mfm_odd = [0u32; 128];
    let mut data_mfm_even = [0u32; 128];
    for i in 0..128 {
        data_mfm_odd[i] = mfm_encode_long(odd_bits(data_longs[i]));
        data_mfm_even[i] = mfm_encode_long(even_bits(data_longs[i]));
        data_cksum ^= data_mfm_odd[i] ^ data_mfm_even[i];
    }
    buf.extend_from_slice(&mfm_encode_long(odd_bits(data_cksum)).to_be_bytes());
    buf.extend_from_slice(&mfm_encode_long(even_bits(data_cksum)).to_be_bytes());
    for l in &data_mfm_odd {
        buf.extend_from_slice(&l.to_be_bytes());
    }
    for l in &data_mfm_even {
        buf.extend_from_slice(&l.to_be_bytes());
    }
}

fn odd_bits(val: u32) -> u32 {
    let mut result = 0u32;
    for i in 0..16 {
        result |= ((val >> (1 + i * 2)) & 1) << i;
    }
    result
}

fn even_bits(val: u32) -> u32 {
    let mut result = 0u32;
    for i in 0..16 {
        result |= ((val >> (i * 2)) & 1) << i;
    }
    result
}

/// MFM-encode a 16-bit data value: each data bit gets a preceding clock bit,
/// set only when both the previous and current data bits are zero.
fn mfm_encode_long(data: u32) -> u32 {
    let data = data & 0xFFFF;
    let mut mfm = 0u32;
    for i in (0..16).rev() {
        let data_bit = (data >> i) & 1;
        let bit_pos = (15 - i) * 2;
        let prev_data = if i < 15 { (data >> (i + 1)) & 1 } else { 0 };
        let clock = u32::from(prev_data == 0 && data_bit == 0);
        mfm |= clock << (31 - bit_pos);
        mfm |= data_bit << (30 - bit_pos);
    }
    mfm
}

#[cfg(test)]
fn mfm_decode_long(mfm: u32) -> u32 {
    let mut data = 0u32;
    for i in 0..16 {
        data |= ((mfm >> (30 - i * 2)) & 1) << (15 - i);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ZeroTrack {
        sectors: u32,
    }
    impl TrackSource for ZeroTrack {
        fn read_track_sectors(&self, _cylinder: u32, _head: u32) -> &[u8] {
            Box::leak(vec![0u8; self.sectors as usize * 512].into_boxed_slice())
        }
        fn sectors_per_track(&self) -> u32 {
            self.sectors
        }
    }

    #[test]
    fn step_toward_center_and_edge() {
        let mut drive = FloppyDrive::new();
        drive.update_control(false, true, false, true, true);
        drive.update_control(true, true, false, true, true);
        assert_eq!(drive.cylinder(), 1);
        drive.update_control(false, false, false, true, true);
        drive.update_control(true, false, false, true, true);
        assert_eq!(drive.cylinder(), 0);
    }

    #[test]
    fn cylinder_clamps_at_track_boundaries() {
        let mut drive = FloppyDrive::new();
        drive.update_control(false, false, false, true, true);
        drive.update_control(true, false, false, true, true);
        assert_eq!(drive.cylinder(), 0);
    }

    #[test]
    fn motor_spins_up_after_delay() {
        let mut drive = FloppyDrive::new();
        drive.update_control(false, false, false, true, true);
        assert!(!drive.status().ready);
        for _ in 0..MOTOR_SPINUP_TICKS {
            drive.tick();
        }
        assert!(drive.status().ready);
    }

    #[test]
    fn disk_change_clears_on_step_after_insert() {
        let mut drive = FloppyDrive::new();
        drive.insert_disk(false);
        assert!(!drive.status().disk_change);
        drive.eject_disk();
        assert!(drive.status().disk_change);
        drive.insert_disk(false);
        drive.update_control(false, true, false, true, true);
        drive.update_control(true, true, false, true, true);
        assert!(!drive.status().disk_change);
    }

    #[test]
    fn mfm_encode_decode_round_trip_for_representative_values() {
        for data in [0x0000u32, 0xFFFF, 0xAAAA, 0x5555, 0xDEAD] {
            assert_eq!(mfm_decode_long(mfm_encode_long(data)), data);
        }
    }

    #[test]
    fn encode_track_has_one_sync_per_sector() {
        let source = ZeroTrack { sectors: 11 };
        let mut drive = FloppyDrive::new();
        drive.insert_disk(false);
        let mfm = drive.encode_current_track(&source).expect("disk present");
        let sync = [0x44u8, 0x89, 0x44, 0x89];
        let count = mfm.windows(4).filter(|w| *w == sync).count();
        assert_eq!(count, 11);
        assert_eq!(mfm.len(), MFM_TRACK_BYTES);
    }

    #[test]
    fn next_mfm_bit_streams_msb_first_and_wraps() {
        let mut drive = FloppyDrive::new();
        drive.load_track(vec![0b1011_0000]);
        let bits: Vec<u8> = (0..8).map(|_| drive.next_mfm_bit().unwrap()).collect();
        assert_eq!(bits, vec![1, 0, 1, 1, 0, 0, 0, 0]);
        assert_eq!(drive.next_mfm_bit(), Some(1)); // wrapped back to bit 0
    }

    #[test]
    fn current_track_words_reinterprets_bytes_as_big_endian_words() {
        let mut drive = FloppyDrive::new();
        assert!(drive.current_track_words().is_none());
        drive.load_track(vec![0x44, 0x89, 0xAA, 0xBB]);
        assert_eq!(drive.current_track_words(), Some(vec![0x4489, 0xAABB]));
    }
}
