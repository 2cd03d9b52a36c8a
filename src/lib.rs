//! Cycle-accurate execution core for a Commodore Amiga emulator: DMA
//! arbitration and beam timing (Agnus), the pixel pipeline and sprites
//! (Denise), audio/disk/interrupts (Paula), the two 8520 CIAs, the 24-bit
//! memory map, and the Copper/Blitter coprocessors. A 68000 core, disk-image
//! parsers, and any host shell/GUI are external collaborators that plug in
//! through the traits this crate defines (`CpuCore`/`CpuBus`, `TrackSource`).

pub mod agnus;
pub mod amiga;
pub mod beam;
pub mod blitter;
pub mod cia;
pub mod config;
pub mod copper;
pub mod cpu;
pub mod custom_regs;
pub mod denise;
pub mod disk;
pub mod keyboard;
pub mod memory;
pub mod paula;
pub mod scheduler;
pub mod snapshot;

pub use amiga::{Amiga, AmigaError};
pub use config::AmigaConfig;
