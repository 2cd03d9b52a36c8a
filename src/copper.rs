//! Copper: the MOVE/WAIT/SKIP micro-program interpreter driven by the beam.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Fetch1,
    Fetch2,
    Wait,
    WaitBlitterFinished,
}

impl State {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Fetch1 => 1,
            Self::Fetch2 => 2,
            Self::Wait => 3,
            Self::WaitBlitterFinished => 4,
        }
    }

    const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Idle),
            1 => Some(Self::Fetch1),
            2 => Some(Self::Fetch2),
            3 => Some(Self::Wait),
            4 => Some(Self::WaitBlitterFinished),
            _ => None,
        }
    }
}

/// One completed Copper action for the caller to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopperAction {
    /// Write `value` to custom register at byte offset `reg` (0x000-0x1FE).
    Move { reg: u16, value: u16 },
}

pub struct Copper {
    pub state: State,
    pub cop1lc: u32,
    pub cop2lc: u32,
    pub pc: u32,
    pub active_list: u8,
    ir1: u16,
    ir2: u16,
    pub waiting: bool,
    /// COPCON bit 1: when clear, writes to registers < 0x80 are clamped.
    pub cdang: bool,
}

impl Copper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            cop1lc: 0,
            cop2lc: 0,
            pc: 0,
            active_list: 1,
            ir1: 0,
            ir2: 0,
            waiting: false,
            cdang: false,
        }
    }

    pub fn jump(&mut self, list: u8) {
        self.active_list = list;
        self.pc = if list == 1 { self.cop1lc } else { self.cop2lc };
        self.state = State::Fetch1;
        self.waiting = false;
    }

    pub fn vblank_restart(&mut self) {
        self.jump(1);
    }

    /// Advance one Copper cycle. `blitter_finished` reflects the Blitter's
    /// current `!running` state for BFD-gated waits.
    pub fn tick(
        &mut self,
        vpos: u16,
        hpos: u16,
        blitter_finished: bool,
        mut read_mem: impl FnMut(u32) -> u16,
    ) -> Option<CopperAction> {
        match self.state {
            State::Idle => None,
            State::Fetch1 => {
                self.ir1 = read_mem(self.pc);
                self.pc = self.pc.wrapping_add(2);
                self.state = State::Fetch2;
                None
            }
            State::Fetch2 => {
                self.ir2 = read_mem(self.pc);
                self.pc = self.pc.wrapping_add(2);
                self.execute(vpos, hpos, blitter_finished)
            }
            State::Wait | State::WaitBlitterFinished => {
                let beam_ok = self.check_wait(vpos, hpos);
                let bfd_ok = self.state != State::WaitBlitterFinished || blitter_finished;
                if beam_ok && bfd_ok {
                    self.waiting = false;
                    self.state = State::Fetch1;
                }
                None
            }
        }
    }

    fn execute(&mut self, vpos: u16, hpos: u16, blitter_finished: bool) -> Option<CopperAction> {
        if (self.ir1 & 1) == 0 {
            let reg = self.clamp_dangerous(self.ir1 & 0x01FE);
            let val = self.ir2;
            self.state = State::Fetch1;
            reg.map(|reg| CopperAction::Move { reg, value: val })
        } else {
            let is_skip = (self.ir2 & 1) != 0;
            let needs_bfd = (self.ir2 & 0x8000) == 0;
            let beam_ok = self.check_wait(vpos, hpos);
            let satisfied = beam_ok && (!needs_bfd || blitter_finished);
            if is_skip {
                if satisfied {
                    self.pc = self.pc.wrapping_add(4);
                }
                self.state = State::Fetch1;
                None
            } else {
                if satisfied {
                    self.state = State::Fetch1;
                } else {
                    self.waiting = true;
                    self.state = if needs_bfd {
                        State::WaitBlitterFinished
                    } else {
                        State::Wait
                    };
                }
                None
            }
        }
    }

    /// Registers below 0x80 are write-protected unless `cdang` is set. When
    /// clamped, the write is silently dropped (no bus error on real hardware).
    fn clamp_dangerous(&self, reg: u16) -> Option<u16> {
        if reg < 0x80 && !self.cdang {
            None
        } else {
            Some(reg)
        }
    }

    /// Serialize all state for snapshotting, in field declaration order.
    #[must_use]
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20);
        out.push(self.state.to_u8());
        out.extend_from_slice(&self.cop1lc.to_le_bytes());
        out.extend_from_slice(&self.cop2lc.to_le_bytes());
        out.extend_from_slice(&self.pc.to_le_bytes());
        out.push(self.active_list);
        out.extend_from_slice(&self.ir1.to_le_bytes());
        out.extend_from_slice(&self.ir2.to_le_bytes());
        out.push(u8::from(self.waiting));
        out.push(u8::from(self.cdang));
        out
    }

    /// Restore state written by [`Self::snapshot_bytes`].
    ///
    /// # Errors
    /// Returns `Err` if `bytes` is shorter than the expected field layout or
    /// carries an unrecognized state discriminant.
    pub fn restore_bytes(&mut self, bytes: &[u8]) -> Result<(), ()> {
        if bytes.len() < 20 {
            return Err(());
        }
        let mut i = 0usize;
        let mut u8_next = || {
            let v = bytes[i];
            i += 1;
            v
        };
        let state = State::from_u8(u8_next()).ok_or(())?;
        let cop1lc = u32::from_le_bytes([u8_next(), u8_next(), u8_next(), u8_next()]);
        let cop2lc = u32::from_le_bytes([u8_next(), u8_next(), u8_next(), u8_next()]);
        let pc = u32::from_le_bytes([u8_next(), u8_next(), u8_next(), u8_next()]);
        let active_list = u8_next();
        let ir1 = u16::from_le_bytes([u8_next(), u8_next()]);
        let ir2 = u16::from_le_bytes([u8_next(), u8_next()]);
        let waiting = u8_next() != 0;
        let cdang = u8_next() != 0;
        self.state = state;
        self.cop1lc = cop1lc;
        self.cop2lc = cop2lc;
        self.pc = pc;
        self.active_list = active_list;
        self.ir1 = ir1;
        self.ir2 = ir2;
        self.waiting = waiting;
        self.cdang = cdang;
        Ok(())
    }

    fn check_wait(&self, vpos: u16, hpos: u16) -> bool {
        if self.ir1 == 0xFFFF && self.ir2 == 0xFFFE {
            return false;
        }
        let wait_v = (self.ir1 >> 8) & 0xFF;
        let wait_h = (self.ir1 >> 1) & 0x7F;
        let mask_v = (self.ir2 >> 8) & 0x7F;
        let mask_h = (self.ir2 >> 1) & 0x7F;

        let cur_v = vpos & 0xFF;
        let cur_h = (hpos >> 1) & 0x7F;

        let cmp_cur = ((cur_v & mask_v) << 7) | (cur_h & mask_h);
        let cmp_wait = ((wait_v & mask_v) << 7) | (wait_h & mask_h);
        let result = cmp_cur >= cmp_wait;

        if result && (wait_v & 0x80 != 0) && (cur_v & 0x80 == 0) {
            return false;
        }
        result
    }
}

impl Default for Copper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_emits_register_write() {
        let mut cop = Copper::new();
        cop.cdang = true;
        let mem = |addr: u32| -> u16 {
            match addr {
                0 => 0x0100,
                2 => 0x1200,
                _ => 0,
            }
        };
        cop.pc = 0;
        cop.state = State::Fetch1;
        assert_eq!(cop.tick(0, 0, true, mem), None);
        let action = cop.tick(0, 0, true, mem);
        assert_eq!(action, Some(CopperAction::Move { reg: 0x100, value: 0x1200 }));
    }

    #[test]
    fn move_below_0x80_is_clamped_without_cdang() {
        let mut cop = Copper::new();
        cop.cdang = false;
        let mem = |addr: u32| -> u16 {
            match addr {
                0 => 0x0020,
                2 => 0xBEEF,
                _ => 0,
            }
        };
        cop.pc = 0;
        cop.state = State::Fetch1;
        cop.tick(0, 0, true, mem);
        assert_eq!(cop.tick(0, 0, true, mem), None);
    }

    #[test]
    fn wait_without_bfd_bit_blocks_until_blitter_finished() {
        let mut cop = Copper::new();
        let mem = |addr: u32| -> u16 {
            match addr {
                0 => 0x0001,
                2 => 0x0000, // bit15=0: BFD wait required
                _ => 0,
            }
        };
        cop.pc = 0;
        cop.state = State::Fetch1;
        cop.tick(0, 0, false, mem);
        cop.tick(0, 0, false, mem);
        assert_eq!(cop.state, State::WaitBlitterFinished);
        cop.tick(0, 0, false, mem);
        assert_eq!(cop.state, State::WaitBlitterFinished);
        cop.tick(0, 0, true, mem);
        assert_eq!(cop.state, State::Fetch1);
    }

    #[test]
    fn snapshot_round_trips_mid_wait_state() {
        let mut cop = Copper::new();
        cop.cop1lc = 0x4000;
        cop.cop2lc = 0x8000;
        cop.pc = 0x4102;
        cop.active_list = 2;
        cop.cdang = true;
        cop.waiting = true;
        cop.state = State::WaitBlitterFinished;
        let mem = |addr: u32| -> u16 {
            match addr {
                0 => 0x0001,
                2 => 0x0000,
                _ => 0,
            }
        };
        cop.tick(0, 0, false, mem);

        let bytes = cop.snapshot_bytes();
        let mut restored = Copper::new();
        restored.restore_bytes(&bytes).unwrap();
        assert_eq!(restored.state, cop.state);
        assert_eq!(restored.cop1lc, cop.cop1lc);
        assert_eq!(restored.cop2lc, cop.cop2lc);
        assert_eq!(restored.pc, cop.pc);
        assert_eq!(restored.active_list, cop.active_list);
        assert_eq!(restored.waiting, cop.waiting);
        assert_eq!(restored.cdang, cop.cdang);
        assert_eq!(restored.snapshot_bytes(), bytes);
    }

    #[test]
    fn skip_advances_pc_when_condition_met() {
        let mut cop = Copper::new();
        let mem = |addr: u32| -> u16 {
            match addr {
                0 => 0x0001,
                2 => 0x8001,
                _ => 0x0000,
            }
        };
        cop.pc = 0;
        cop.state = State::Fetch1;
        cop.tick(100, 100, true, mem);
        cop.tick(100, 100, true, mem);
        assert_eq!(cop.state, State::Fetch1);
        assert_eq!(cop.pc, 8);
    }

    #[test]
    fn vblank_restart_resets_pc_to_cop1lc() {
        let mut cop = Copper::new();
        cop.cop1lc = 0x4000;
        cop.pc = 0x9999;
        cop.state = State::Wait;
        cop.vblank_restart();
        assert_eq!(cop.pc, 0x4000);
        assert_eq!(cop.state, State::Fetch1);
        assert!(!cop.waiting);
    }
}
