use crate::entities::living::LivingId;
use crate::spells::handler::SpellHandler;
use crate::spells::spell::SpellKind;
use crate::world::timer::TimerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(pub u64);

/// Restart divisor cap for immunity-shrinking effects.
pub const IMMUNITY_DIVISOR_CAP: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    /// Constructed but not yet started.
    Created,
    Active,
    /// Terminal; a fresh record is required to reapply.
    Expired,
}

/// Variant selected at construction from the spell family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectVariant {
    Standard,
    /// Crowd control builds immunity: every restart shrinks the duration.
    Immunity { started_count: u32 },
}

/// What the effect's timer decided when it elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectTickOutcome {
    Pulse { next_delay_ms: u64 },
    Expire,
}

/// A running instance of a spell's influence on one target. Owns its
/// duration/pulse timing; list and concentration membership are managed by
/// the engine around it.
#[derive(Debug)]
pub struct EffectRecord {
    pub id: EffectId,
    pub owner: LivingId,
    pub handler: SpellHandler,
    pub duration_ms: u64,
    pub frequency_ms: u64,
    pub effectiveness: f64,
    pub state: EffectState,
    pub variant: EffectVariant,
    pub timer: Option<TimerId>,
    /// Deactivated by range gating but still listed on the owner.
    pub fading: bool,
    /// Rebuilt from storage; start messages are suppressed.
    pub restored: bool,
    time_since_start_ms: u64,
    pending_delay_ms: u64,
}

impl EffectRecord {
    pub fn new(
        id: EffectId,
        owner: LivingId,
        handler: SpellHandler,
        duration_ms: u64,
        frequency_ms: u64,
        effectiveness: f64,
    ) -> Self {
        let variant = match handler.spell.kind {
            SpellKind::CrowdControl => EffectVariant::Immunity { started_count: 0 },
            _ => EffectVariant::Standard,
        };
        Self {
            id,
            owner,
            handler,
            duration_ms,
            frequency_ms,
            effectiveness,
            state: EffectState::Created,
            variant,
            timer: None,
            fading: false,
            restored: false,
            time_since_start_ms: 0,
            pending_delay_ms: 0,
        }
    }

    pub fn concentration(&self) -> u16 {
        self.handler.spell.concentration_cost
    }

    pub fn is_active(&self) -> bool {
        self.state == EffectState::Active
    }

    pub fn is_expired(&self) -> bool {
        self.state == EffectState::Expired
    }

    /// duration 0 with no pulse means permanent until explicit cancel.
    pub fn is_permanent(&self) -> bool {
        self.duration_ms == 0 && self.frequency_ms == 0
    }

    pub fn remaining_ms(&self) -> u64 {
        self.duration_ms.saturating_sub(self.time_since_start_ms)
    }

    pub fn remaining_fraction(&self) -> f64 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        self.remaining_ms() as f64 / self.duration_ms as f64
    }

    /// Shrink the duration for a (re)start of an immunity effect. The first
    /// application runs at full duration; the Nth restart divides by
    /// `min(20, 2N)`.
    pub fn apply_restart_shrink(&mut self) {
        if let EffectVariant::Immunity { started_count } = &mut self.variant {
            if *started_count > 0 {
                let divisor = u64::from((*started_count * 2).min(IMMUNITY_DIVISOR_CAP));
                self.duration_ms /= divisor;
            }
            *started_count += 1;
        }
    }

    /// Transition to active and compute the initial timer delay, if any.
    /// Returns None when the effect was not startable (programming error,
    /// handled by the caller).
    pub fn begin(&mut self) -> Option<Option<u64>> {
        if self.state != EffectState::Created {
            return None;
        }
        self.apply_restart_shrink();
        self.state = EffectState::Active;
        self.time_since_start_ms = 0;
        Some(self.arm_delay())
    }

    /// Reconfigure in place for an overwrite or a range-gate reactivation;
    /// timing restarts from zero.
    pub fn rearm(&mut self) -> Option<u64> {
        self.apply_restart_shrink();
        self.state = EffectState::Active;
        self.time_since_start_ms = 0;
        self.arm_delay()
    }

    fn arm_delay(&mut self) -> Option<u64> {
        if self.duration_ms == 0 && self.frequency_ms == 0 {
            return None;
        }
        let delay = if self.frequency_ms == 0 {
            self.duration_ms
        } else {
            let freq = self.frequency_ms;
            if self.duration_ms > 0 && !self.unbounded() {
                freq.min(self.duration_ms)
            } else {
                freq
            }
        };
        self.pending_delay_ms = delay;
        Some(delay)
    }

    /// Effects that bill the caster's concentration pulse until cancelled.
    /// Chant payloads are the exception: the chant pays the upkeep and
    /// refreshes them, so they run out their duration once it stops.
    fn unbounded(&self) -> bool {
        if self.duration_ms == 0 {
            return true;
        }
        self.concentration() > 0 && !self.handler.is_chant()
    }

    /// Advance elapsed time when the timer fires and decide whether to
    /// pulse again or expire.
    pub fn on_timer_elapsed(&mut self) -> EffectTickOutcome {
        self.time_since_start_ms = self
            .time_since_start_ms
            .saturating_add(self.pending_delay_ms);
        let unbounded = self.unbounded();
        if !unbounded && self.time_since_start_ms >= self.duration_ms {
            return EffectTickOutcome::Expire;
        }
        let next = if unbounded {
            self.frequency_ms
        } else {
            self.frequency_ms.min(self.remaining_ms())
        };
        self.pending_delay_ms = next;
        EffectTickOutcome::Pulse { next_delay_ms: next }
    }

    /// Mark expired; returns false if already terminal so the expire hook
    /// runs exactly once.
    pub fn expire(&mut self) -> bool {
        if self.state == EffectState::Expired {
            return false;
        }
        self.state = EffectState::Expired;
        true
    }

    /// Seed elapsed time for an effect restored at partial duration.
    pub fn seed_remaining(&mut self, remaining_fraction: f64) {
        if self.duration_ms == 0 {
            return;
        }
        let fraction = remaining_fraction.clamp(0.0, 1.0);
        let remaining = (self.duration_ms as f64 * fraction) as u64;
        self.time_since_start_ms = self.duration_ms.saturating_sub(remaining);
    }
}
