use crate::effects::pulsing::PulseId;
use crate::effects::record::EffectId;
use crate::entities::living::LivingId;
use crate::world::timer::TimerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(pub u64);

/// Default period between distance sweeps.
pub const RANGE_CHECK_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeMonitorEntry {
    pub effect: EffectId,
    pub active: bool,
}

/// Periodic distance gate for one chant's buffs. Effects leaving range are
/// deactivated in place (kept on the owner's list, marked fading) and
/// reactivated when the owner returns; the monitor never destroys them.
#[derive(Debug)]
pub struct RangeMonitor {
    pub id: MonitorId,
    pub pulse: PulseId,
    pub caster: LivingId,
    pub range_max: u32,
    pub timer: Option<TimerId>,
    entries: Vec<RangeMonitorEntry>,
}

impl RangeMonitor {
    pub fn new(id: MonitorId, pulse: PulseId, caster: LivingId, range_max: u32) -> Self {
        Self {
            id,
            pulse,
            caster,
            range_max,
            timer: None,
            entries: Vec::new(),
        }
    }

    /// Track an effect, initially active. No-op if already tracked.
    pub fn add(&mut self, effect: EffectId) {
        if self.tracks(effect) {
            return;
        }
        self.entries.push(RangeMonitorEntry {
            effect,
            active: true,
        });
    }

    pub fn remove(&mut self, effect: EffectId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.effect != effect);
        self.entries.len() != before
    }

    pub fn tracks(&self, effect: EffectId) -> bool {
        self.entries.iter().any(|entry| entry.effect == effect)
    }

    pub fn is_active(&self, effect: EffectId) -> Option<bool> {
        self.entries
            .iter()
            .find(|entry| entry.effect == effect)
            .map(|entry| entry.active)
    }

    pub fn set_active(&mut self, effect: EffectId, active: bool) -> bool {
        for entry in &mut self.entries {
            if entry.effect == effect {
                let changed = entry.active != active;
                entry.active = active;
                return changed;
            }
        }
        false
    }

    pub fn entries(&self) -> impl Iterator<Item = RangeMonitorEntry> + '_ {
        self.entries.iter().copied()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(EffectId) -> bool) {
        self.entries.retain(|entry| keep(entry.effect));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> RangeMonitor {
        RangeMonitor::new(MonitorId(1), PulseId(1), LivingId(1), 1_500)
    }

    #[test]
    fn entries_start_active_and_dedupe() {
        let mut monitor = monitor();
        monitor.add(EffectId(1));
        monitor.add(EffectId(1));
        assert_eq!(monitor.len(), 1);
        assert_eq!(monitor.is_active(EffectId(1)), Some(true));
    }

    #[test]
    fn toggling_reports_transitions_only() {
        let mut monitor = monitor();
        monitor.add(EffectId(1));
        assert!(monitor.set_active(EffectId(1), false));
        assert!(!monitor.set_active(EffectId(1), false));
        assert!(monitor.set_active(EffectId(1), true));
        assert!(!monitor.set_active(EffectId(2), true));
    }

    #[test]
    fn retain_prunes_expired_entries() {
        let mut monitor = monitor();
        monitor.add(EffectId(1));
        monitor.add(EffectId(2));
        monitor.retain(|effect| effect == EffectId(2));
        assert!(!monitor.tracks(EffectId(1)));
        assert!(monitor.tracks(EffectId(2)));
    }
}
