use crate::entities::living::LivingId;
use crate::spells::handler::SpellHandler;
use crate::world::timer::TimerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PulseId(pub u64);

/// A caster-anchored, continuously re-triggering effect (chant/song). It
/// has no owner-side duration: its lifecycle is the caster's concentration
/// budget and explicit cancellation, nothing else.
#[derive(Debug)]
pub struct PulsingSpellEffect {
    pub id: PulseId,
    pub caster: LivingId,
    pub handler: SpellHandler,
    pub frequency_ms: u64,
    pub timer: Option<TimerId>,
    cancelled: bool,
}

impl PulsingSpellEffect {
    pub fn new(id: PulseId, caster: LivingId, handler: SpellHandler) -> Self {
        let frequency_ms = handler.spell.frequency_ms;
        Self {
            id,
            caster,
            handler,
            frequency_ms,
            timer: None,
            cancelled: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Single-shot; the stale-timer guard at dispatch checks this.
    pub fn cancel(&mut self) -> bool {
        if self.cancelled {
            return false;
        }
        self.cancelled = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spells::spell::{test_spell, SpellKind, SpellLineId};

    #[test]
    fn cancel_is_single_shot() {
        let mut chant_spell = test_spell(1, SpellKind::Chant);
        chant_spell.frequency_ms = 3_000;
        let handler = SpellHandler::new(LivingId(1), chant_spell, SpellLineId(1));
        let mut pulse = PulsingSpellEffect::new(PulseId(1), LivingId(1), handler);
        assert_eq!(pulse.frequency_ms, 3_000);
        assert!(pulse.cancel());
        assert!(!pulse.cancel());
        assert!(pulse.is_cancelled());
    }
}
