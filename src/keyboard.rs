//! Amiga keyboard controller: a 6500/1-derived state machine that shifts
//! key bytes into CIA-A's SDR serially at E-clock rate.
//!
//! Power-up sequence: the keyboard sends $FD (init power-up) then $FE
//! (terminate power-up), each requiring a handshake from the host.

use std::collections::VecDeque;

const POWERUP_DELAY_TICKS: u32 = 150_000;
const BYTE_INTERVAL_TICKS: u32 = 700;
const HANDSHAKE_TIMEOUT_TICKS: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    PowerUpDelay,
    SendInitPowerUp,
    WaitHandshakeInit,
    SendTermPowerUp,
    WaitHandshakeTerm,
    Idle,
    WaitHandshakeKey,
}

impl State {
    const fn to_u8(self) -> u8 {
        match self {
            Self::PowerUpDelay => 0,
            Self::SendInitPowerUp => 1,
            Self::WaitHandshakeInit => 2,
            Self::SendTermPowerUp => 3,
            Self::WaitHandshakeTerm => 4,
            Self::Idle => 5,
            Self::WaitHandshakeKey => 6,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::SendInitPowerUp,
            2 => Self::WaitHandshakeInit,
            3 => Self::SendTermPowerUp,
            4 => Self::WaitHandshakeTerm,
            5 => Self::Idle,
            6 => Self::WaitHandshakeKey,
            _ => Self::PowerUpDelay,
        }
    }
}

pub struct Keyboard {
    state: State,
    timer: u32,
    key_queue: VecDeque<u8>,
}

impl Keyboard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::PowerUpDelay,
            timer: 0,
            key_queue: VecDeque::new(),
        }
    }

    /// Tick at E-clock rate (~709 kHz). Returns `Some(byte)` when a rotated
    /// keycode is ready to inject into CIA-A's SDR.
    pub fn tick(&mut self) -> Option<u8> {
        self.timer = self.timer.saturating_add(1);
        match self.state {
            State::PowerUpDelay => {
                if self.timer >= POWERUP_DELAY_TICKS {
                    self.state = State::SendInitPowerUp;
                    self.timer = 0;
                }
                None
            }
            State::SendInitPowerUp => {
                self.state = State::WaitHandshakeInit;
                self.timer = 0;
                Some(rotate_byte(0xFD))
            }
            State::WaitHandshakeInit => {
                if self.timer >= HANDSHAKE_TIMEOUT_TICKS {
                    self.state = State::SendInitPowerUp;
                    self.timer = 0;
                }
                None
            }
            State::SendTermPowerUp => {
                self.state = State::WaitHandshakeTerm;
                self.timer = 0;
                Some(rotate_byte(0xFE))
            }
            State::WaitHandshakeTerm => {
                if self.timer >= HANDSHAKE_TIMEOUT_TICKS {
                    self.state = State::SendTermPowerUp;
                    self.timer = 0;
                }
                None
            }
            State::Idle => {
                if self.timer >= BYTE_INTERVAL_TICKS {
                    if let Some(byte) = self.key_queue.pop_front() {
                        self.state = State::WaitHandshakeKey;
                        self.timer = 0;
                        return Some(rotate_byte(byte));
                    }
                }
                None
            }
            State::WaitHandshakeKey => {
                if self.timer >= HANDSHAKE_TIMEOUT_TICKS {
                    self.state = State::Idle;
                    self.timer = 0;
                }
                None
            }
        }
    }

    /// Host acknowledged the last byte (handshake pulse on CIA-A's SP/CNT).
    pub fn handshake(&mut self) {
        match self.state {
            State::WaitHandshakeInit => {
                self.state = State::SendTermPowerUp;
                self.timer = 0;
            }
            State::WaitHandshakeTerm | State::WaitHandshakeKey => {
                self.state = State::Idle;
                self.timer = 0;
            }
            _ => {}
        }
    }

    /// Queue a key event. `pressed=false` sets the up-stroke bit (bit 7).
    pub fn key_event(&mut self, keycode: u8, pressed: bool) {
        let byte = if pressed { keycode & 0x7F } else { keycode | 0x80 };
        self.key_queue.push_back(byte);
    }

    /// Serialize the handshake state machine and pending key queue.
    #[must_use]
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(9 + self.key_queue.len());
        out.push(self.state.to_u8());
        out.extend_from_slice(&self.timer.to_le_bytes());
        out.extend_from_slice(&(self.key_queue.len() as u32).to_le_bytes());
        out.extend(self.key_queue.iter().copied());
        out
    }

    /// Restore state written by [`Self::snapshot_bytes`].
    ///
    /// # Errors
    /// Returns `Err` if `bytes` is shorter than its declared queue length.
    pub fn restore_bytes(&mut self, bytes: &[u8]) -> Result<(), ()> {
        if bytes.len() < 9 {
            return Err(());
        }
        self.state = State::from_u8(bytes[0]);
        self.timer = u32::from_le_bytes(bytes[1..5].try_into().map_err(|_| ())?);
        let len = u32::from_le_bytes(bytes[5..9].try_into().map_err(|_| ())?) as usize;
        let queue = bytes.get(9..9 + len).ok_or(())?;
        self.key_queue = queue.iter().copied().collect();
        Ok(())
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

/// Amiga keycodes are rotated left 1 bit before serial transmission; the
/// ROM's keyboard interrupt handler rotates right to recover the byte.
fn rotate_byte(byte: u8) -> u8 {
    (byte << 1) | (byte >> 7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_up_sequence_sends_fd_then_fe() {
        let mut kb = Keyboard::new();
        for _ in 0..POWERUP_DELAY_TICKS - 1 {
            assert_eq!(kb.tick(), None);
        }
        assert_eq!(kb.tick(), None);
        assert_eq!(kb.tick(), Some(rotate_byte(0xFD)));
        assert_eq!(kb.tick(), None);
        kb.handshake();
        assert_eq!(kb.tick(), Some(rotate_byte(0xFE)));
        kb.handshake();
        assert_eq!(kb.state, State::Idle);
    }

    #[test]
    fn queued_key_sent_after_byte_interval() {
        let mut kb = Keyboard::new();
        kb.state = State::Idle;
        kb.timer = 0;
        kb.key_event(0x45, true);
        for _ in 0..BYTE_INTERVAL_TICKS - 1 {
            assert_eq!(kb.tick(), None);
        }
        assert_eq!(kb.tick(), Some(rotate_byte(0x45)));
    }

    #[test]
    fn key_release_sets_bit7() {
        let mut kb = Keyboard::new();
        kb.key_event(0x45, false);
        assert_eq!(kb.key_queue.front(), Some(&0xC5));
    }

    #[test]
    fn rotate_byte_round_trips() {
        for byte in 0..=255u8 {
            let rotated = rotate_byte(byte);
            let recovered = (rotated >> 1) | (rotated << 7);
            assert_eq!(recovered, byte);
        }
    }
}
