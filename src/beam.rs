//! Beam position: frame/line/column counters for PAL and NTSC geometry.

use crate::config::Region;

pub const PAL_LINES_LONG: u16 = 313;
pub const PAL_LINES_SHORT: u16 = 312;
pub const PAL_CCKS: u16 = 227;
pub const NTSC_LINES_LONG: u16 = 263;
pub const NTSC_LINES_SHORT: u16 = 262;
pub const NTSC_CCKS_LONG: u16 = 228;
pub const NTSC_CCKS_SHORT: u16 = 227;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beam {
    pub region: Region,
    pub frame: u64,
    pub v: u16,
    pub h: u16,
    /// Long-frame toggle: when set, this frame has one extra raster line.
    pub lof: bool,
    pub lof_toggle: bool,
    /// Long-line toggle (NTSC only): alternates line length 228/227.
    pub lol: bool,
    pub lol_toggle: bool,
}

impl Beam {
    #[must_use]
    pub fn new(region: Region) -> Self {
        Self {
            region,
            frame: 0,
            v: 0,
            h: 0,
            lof: true,
            lof_toggle: true,
            lol: false,
            lol_toggle: true,
        }
    }

    #[must_use]
    pub fn v_count(&self) -> u16 {
        match self.region {
            Region::Pal => {
                if self.lof {
                    PAL_LINES_LONG
                } else {
                    PAL_LINES_SHORT
                }
            }
            Region::Ntsc => {
                if self.lof {
                    NTSC_LINES_LONG
                } else {
                    NTSC_LINES_SHORT
                }
            }
        }
    }

    #[must_use]
    pub fn h_count(&self) -> u16 {
        match self.region {
            Region::Pal => PAL_CCKS,
            Region::Ntsc => {
                if self.lol {
                    NTSC_CCKS_LONG
                } else {
                    NTSC_CCKS_SHORT
                }
            }
        }
    }

    /// Map a DMA-cycle column to the output pixel column (4 lores pixels per
    /// DMA cycle, HBLANK-origin).
    #[must_use]
    pub fn pixel(h: u16) -> u32 {
        u32::from(h) * 4
    }

    /// Advance one DMA cycle. Returns `true` if a new line started, and a
    /// second `true` if that new line also began a new frame.
    pub fn advance(&mut self) -> (bool, bool) {
        self.h += 1;
        if self.region == Region::Ntsc {
            self.lol = !self.lol;
        }
        if self.h < self.h_count() {
            return (false, false);
        }
        self.h = 0;
        self.v += 1;
        if self.v < self.v_count() {
            return (true, false);
        }
        self.v = 0;
        self.frame += 1;
        if self.lof_toggle {
            self.lof = !self.lof;
        }
        (true, true)
    }
}
