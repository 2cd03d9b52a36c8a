//! Discrete-event scheduler: 32 named slots across three priority tiers.
//!
//! Primary slots are checked every cycle; secondary and tertiary slots are
//! checked only when their tier's summary trigger is due, keeping the hot
//! path down to a handful of comparisons when nothing beyond REG/CIA/DMA
//! work is pending.

pub const NEVER: i64 = i64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Slot {
    // Primary tier: serviced every cycle in this fixed order.
    Reg = 0,
    CiaA,
    CiaB,
    Bpl,
    Das,
    Cop,
    Blt,
    Sec,
    // Secondary tier: serviced only when `Sec` is due.
    Ch0,
    Ch1,
    Ch2,
    Ch3,
    Dsk,
    Vbl,
    Irq,
    Ipl,
    Kbd,
    Txd,
    Rxd,
    Pot,
    Ter,
    // Tertiary tier: serviced only when `Ter` is due.
    Dc0,
    Dc1,
    Dc2,
    Dc3,
    Hd0,
    Hd1,
    Hd2,
    Hd3,
    Mse1,
    Mse2,
    Rsh,
    Key,
    Srv,
    Ser,
    Btr,
    Ala,
    Ins,
}

pub const SLOT_COUNT: usize = 38;
const PRIMARY_END: usize = Slot::Sec as usize; // exclusive; Sec itself is primary-adjacent
const SECONDARY_START: usize = Slot::Sec as usize + 1;
const SECONDARY_END: usize = Slot::Ter as usize; // exclusive
const TERTIARY_START: usize = Slot::Ter as usize + 1;

const PRIMARY_ORDER: [Slot; 7] = [
    Slot::Reg,
    Slot::CiaA,
    Slot::CiaB,
    Slot::Bpl,
    Slot::Das,
    Slot::Cop,
    Slot::Blt,
];

/// One pending (or cancelled) event: a trigger cycle plus an opaque payload
/// the handler can use to disambiguate sub-cases without a second table.
#[derive(Debug, Clone, Copy)]
struct EventEntry {
    trigger: i64,
    data: i64,
}

impl EventEntry {
    const fn idle() -> Self {
        Self {
            trigger: NEVER,
            data: 0,
        }
    }
}

/// Fixed-capacity scheduler over the 32 named slots.
///
/// `next_trigger` mirrors the minimum of the primary-tier triggers so the
/// caller's hot loop can test a single `i64` before doing any per-slot work.
pub struct Scheduler {
    entries: [EventEntry; SLOT_COUNT],
    next_trigger: i64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: [EventEntry::idle(); SLOT_COUNT],
            next_trigger: NEVER,
        }
    }

    #[must_use]
    pub fn next_trigger(&self) -> i64 {
        self.next_trigger
    }

    #[must_use]
    pub fn trigger(&self, slot: Slot) -> i64 {
        self.entries[slot as usize].trigger
    }

    #[must_use]
    pub fn data(&self, slot: Slot) -> i64 {
        self.entries[slot as usize].data
    }

    pub fn schedule_abs(&mut self, slot: Slot, cycle: i64, data: i64) {
        self.entries[slot as usize] = EventEntry {
            trigger: cycle,
            data,
        };
        self.percolate(slot, cycle);
    }

    pub fn schedule_rel(&mut self, slot: Slot, now: i64, delta: i64, data: i64) {
        self.schedule_abs(slot, now + delta, data);
    }

    pub fn cancel(&mut self, slot: Slot) {
        self.entries[slot as usize] = EventEntry::idle();
        self.recompute_tier_for(slot);
    }

    #[must_use]
    pub fn is_due(&self, slot: Slot, now: i64) -> bool {
        self.entries[slot as usize].trigger <= now
    }

    #[must_use]
    pub fn has_event(&self, slot: Slot) -> bool {
        self.entries[slot as usize].trigger != NEVER
    }

    /// Propagate a newly-scheduled trigger up into its tier summary slot
    /// (`Sec`/`Ter`) and, if it is a primary-tier trigger, into `next_trigger`.
    fn percolate(&mut self, slot: Slot, cycle: i64) {
        let idx = slot as usize;
        if idx < SECONDARY_START {
            if cycle < self.next_trigger {
                self.next_trigger = cycle;
            }
        } else if idx < SECONDARY_END {
            let sec = &mut self.entries[Slot::Sec as usize];
            if cycle < sec.trigger {
                sec.trigger = cycle;
                if cycle < self.next_trigger {
                    self.next_trigger = cycle;
                }
            }
        } else {
            let ter = &mut self.entries[Slot::Ter as usize];
            if cycle < ter.trigger {
                ter.trigger = cycle;
                let sec = &mut self.entries[Slot::Sec as usize];
                if cycle < sec.trigger {
                    sec.trigger = cycle;
                    if cycle < self.next_trigger {
                        self.next_trigger = cycle;
                    }
                }
            }
        }
    }

    /// After cancelling or draining one slot, its tier's summary trigger may
    /// need to widen back out to the next-soonest member.
    fn recompute_tier_for(&mut self, slot: Slot) {
        let idx = slot as usize;
        if idx < SECONDARY_START {
            self.recompute_next_trigger();
        } else if idx < SECONDARY_END || slot == Slot::Sec {
            self.recompute_sec();
            self.recompute_next_trigger();
        } else {
            self.recompute_ter();
            self.recompute_sec();
            self.recompute_next_trigger();
        }
    }

    fn recompute_sec(&mut self) {
        let min = self.entries[SECONDARY_START..SECONDARY_END]
            .iter()
            .map(|e| e.trigger)
            .min()
            .unwrap_or(NEVER);
        self.entries[Slot::Sec as usize].trigger = min;
    }

    fn recompute_ter(&mut self) {
        let min = self.entries[TERTIARY_START..SLOT_COUNT]
            .iter()
            .map(|e| e.trigger)
            .min()
            .unwrap_or(NEVER);
        self.entries[Slot::Ter as usize].trigger = min;
    }

    fn recompute_next_trigger(&mut self) {
        let min = self.entries[0..=PRIMARY_END]
            .iter()
            .map(|e| e.trigger)
            .min()
            .unwrap_or(NEVER);
        self.next_trigger = min;
    }

    /// Drain every primary slot due at or before `now`, then secondary and
    /// tertiary tiers if their summary trigger is due. `service` is called
    /// once per due slot with its data payload; it may reschedule any slot,
    /// including the one currently firing.
    pub fn execute_until(&mut self, now: i64, mut service: impl FnMut(&mut Self, Slot, i64)) {
        if now < self.next_trigger {
            return;
        }
        for &slot in &PRIMARY_ORDER {
            if self.is_due(slot, now) {
                let data = self.data(slot);
                service(self, slot, data);
            }
        }
        if self.is_due(Slot::Sec, now) {
            for idx in SECONDARY_START..SECONDARY_END {
                let slot = SLOT_BY_INDEX[idx];
                if self.is_due(slot, now) {
                    let data = self.data(slot);
                    service(self, slot, data);
                }
            }
            self.recompute_sec();
        }
        if self.is_due(Slot::Ter, now) {
            for idx in TERTIARY_START..SLOT_COUNT {
                let slot = SLOT_BY_INDEX[idx];
                if self.is_due(slot, now) {
                    let data = self.data(slot);
                    service(self, slot, data);
                }
            }
            self.recompute_ter();
            self.recompute_sec();
        }
        self.recompute_next_trigger();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

const SLOT_BY_INDEX: [Slot; SLOT_COUNT] = [
    Slot::Reg,
    Slot::CiaA,
    Slot::CiaB,
    Slot::Bpl,
    Slot::Das,
    Slot::Cop,
    Slot::Blt,
    Slot::Sec,
    Slot::Ch0,
    Slot::Ch1,
    Slot::Ch2,
    Slot::Ch3,
    Slot::Dsk,
    Slot::Vbl,
    Slot::Irq,
    Slot::Ipl,
    Slot::Kbd,
    Slot::Txd,
    Slot::Rxd,
    Slot::Pot,
    Slot::Ter,
    Slot::Dc0,
    Slot::Dc1,
    Slot::Dc2,
    Slot::Dc3,
    Slot::Hd0,
    Slot::Hd1,
    Slot::Hd2,
    Slot::Hd3,
    Slot::Mse1,
    Slot::Mse2,
    Slot::Rsh,
    Slot::Key,
    Slot::Srv,
    Slot::Ser,
    Slot::Btr,
    Slot::Ala,
    Slot::Ins,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_scheduler_never_triggers() {
        let s = Scheduler::new();
        assert_eq!(s.next_trigger(), NEVER);
        for idx in 0..SLOT_COUNT {
            assert_eq!(s.entries[idx].trigger, NEVER);
        }
    }

    #[test]
    fn scheduling_a_primary_slot_updates_next_trigger() {
        let mut s = Scheduler::new();
        s.schedule_abs(Slot::Blt, 100, 0);
        assert_eq!(s.next_trigger(), 100);
        s.schedule_abs(Slot::Cop, 50, 0);
        assert_eq!(s.next_trigger(), 50);
    }

    #[test]
    fn secondary_trigger_percolates_into_sec_and_next_trigger() {
        let mut s = Scheduler::new();
        s.schedule_abs(Slot::Vbl, 1000, 0);
        assert_eq!(s.trigger(Slot::Sec), 1000);
        assert_eq!(s.next_trigger(), 1000);
        s.schedule_abs(Slot::Kbd, 500, 0);
        assert_eq!(s.trigger(Slot::Sec), 500);
        assert_eq!(s.next_trigger(), 500);
    }

    #[test]
    fn tertiary_trigger_percolates_through_ter_and_sec() {
        let mut s = Scheduler::new();
        s.schedule_abs(Slot::Hd0, 2000, 7);
        assert_eq!(s.trigger(Slot::Ter), 2000);
        assert_eq!(s.trigger(Slot::Sec), 2000);
        assert_eq!(s.next_trigger(), 2000);
    }

    #[test]
    fn execute_until_services_due_primary_slots_in_fixed_order() {
        let mut s = Scheduler::new();
        s.schedule_abs(Slot::Blt, 10, 0);
        s.schedule_abs(Slot::Reg, 10, 0);
        let mut order = Vec::new();
        s.execute_until(10, |sched, slot, _| {
            order.push(slot);
            sched.cancel(slot);
        });
        assert_eq!(order, vec![Slot::Reg, Slot::Blt]);
        assert_eq!(s.next_trigger(), NEVER);
    }

    #[test]
    fn execute_until_drains_secondary_tier_only_when_due() {
        let mut s = Scheduler::new();
        s.schedule_abs(Slot::Kbd, 100, 0);
        s.schedule_abs(Slot::Vbl, 200, 0);
        let mut fired = Vec::new();
        s.execute_until(100, |sched, slot, _| {
            fired.push(slot);
            sched.cancel(slot);
        });
        assert_eq!(fired, vec![Slot::Kbd]);
        // Vbl still pending at 200, Sec summary now reflects it.
        assert_eq!(s.trigger(Slot::Sec), 200);
    }

    #[test]
    fn cancel_reopens_tier_to_next_soonest_member() {
        let mut s = Scheduler::new();
        s.schedule_abs(Slot::Dc0, 10, 0);
        s.schedule_abs(Slot::Hd0, 20, 0);
        assert_eq!(s.trigger(Slot::Ter), 10);
        s.cancel(Slot::Dc0);
        assert_eq!(s.trigger(Slot::Ter), 20);
        assert_eq!(s.next_trigger(), 20);
    }

    #[test]
    fn reschedule_during_service_is_observed_next_round() {
        let mut s = Scheduler::new();
        s.schedule_abs(Slot::Cop, 10, 0);
        s.execute_until(10, |sched, slot, _| {
            sched.schedule_abs(slot, 30, 0);
        });
        assert_eq!(s.trigger(Slot::Cop), 30);
        assert_eq!(s.next_trigger(), 30);
    }
}
