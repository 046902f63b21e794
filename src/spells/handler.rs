use crate::entities::living::LivingId;
use crate::spells::pulse_scaling::PulseScaling;
use crate::spells::spell::{Spell, SpellKind, SpellLineId};

/// Behavior object bound 1:1 to (caster, spell, line) for the life of one
/// cast attempt or one persistent effect. Per-instance state (the pulse
/// counter) lives here, never in ambient globals.
#[derive(Debug, Clone)]
pub struct SpellHandler {
    pub caster: LivingId,
    pub spell: Spell,
    pub line: SpellLineId,
    pub scaling: PulseScaling,
}

impl SpellHandler {
    pub fn new(caster: LivingId, spell: Spell, line: SpellLineId) -> Self {
        let scaling = if spell.pulse_step != 0.0 {
            PulseScaling::new(spell.pulse_step, spell.pulse_lower_bound, spell.pulse_upper_bound)
        } else {
            PulseScaling::flat()
        };
        Self {
            caster,
            spell,
            line,
            scaling,
        }
    }

    pub fn has_positive_effect(&self) -> bool {
        self.spell.has_positive_effect()
    }

    pub fn costs_concentration(&self) -> bool {
        self.spell.costs_concentration()
    }

    pub fn needs_los(&self) -> bool {
        self.spell.needs_los
    }

    pub fn is_chant(&self) -> bool {
        matches!(self.spell.kind, SpellKind::Chant)
    }

    pub fn is_bolt(&self) -> bool {
        matches!(self.spell.kind, SpellKind::Bolt { .. })
    }

    /// Chant buffs on other livings are gated by live distance to the
    /// caster; everything else is not.
    pub fn range_gated(&self) -> bool {
        self.is_chant() && self.spell.radius > 0
    }

    /// Effectiveness for the next pulse of this handler instance.
    pub fn pulse_effectiveness(&mut self, base: f64) -> f64 {
        base * self.scaling.next_multiplier()
    }

    /// Split the cast time into the stage 0→1 and stage 1→2 delays. The
    /// first leg is a third of the cast, capped so long casts still get an
    /// early interrupt window.
    pub fn stage_delays(&self, max_stage_len_ms: u64) -> (u64, u64) {
        let cast_time = self.spell.cast_time_ms;
        let interim = (cast_time / 3).clamp(1, max_stage_len_ms.max(1));
        let commit = cast_time.saturating_sub(interim).max(1);
        (interim, commit)
    }
}
