use serde::{Deserialize, Serialize};

use crate::combat::damage::DamageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpellId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpellLineId(pub u16);

/// A progression line spells are trained in; a handler is bound to one
/// (caster, spell, line) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellLine {
    pub id: SpellLineId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellTargetKind {
    SelfOnly,
    Ally,
    Enemy,
}

/// Spell family; selects handler behavior at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellKind {
    DirectDamage,
    Heal,
    Buff,
    Debuff,
    /// Crowd control whose duration shrinks on reapplication.
    CrowdControl,
    /// Projectile with distance-proportional delivery delay.
    Bolt { chain_hops: u8 },
    /// Caster-anchored pulsing song, bounded by concentration.
    Chant,
}

fn default_effectiveness_bound_lower() -> f64 {
    1.0
}

fn default_effectiveness_bound_upper() -> f64 {
    1.0
}

/// Immutable spell template. Loaded once; many handler and effect instances
/// reference one `Spell` by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spell {
    pub id: SpellId,
    pub name: String,
    pub kind: SpellKind,
    pub target: SpellTargetKind,
    #[serde(default)]
    pub cast_time_ms: u64,
    #[serde(default)]
    pub duration_ms: u64,
    /// Pulse frequency in ms; 0 = non-pulsing.
    #[serde(default)]
    pub frequency_ms: u64,
    #[serde(default)]
    pub power_cost: i32,
    #[serde(default)]
    pub concentration_cost: u16,
    #[serde(default)]
    pub range: u32,
    #[serde(default)]
    pub radius: u32,
    #[serde(default)]
    pub recast_delay_ms: u64,
    #[serde(default)]
    pub client_effect: u16,
    pub damage_type: DamageType,
    /// Nominal payload magnitude before effectiveness and resists.
    #[serde(default)]
    pub base_value: i32,
    /// Per-pulse effectiveness step; 0 = flat pulses.
    #[serde(default)]
    pub pulse_step: f64,
    #[serde(default = "default_effectiveness_bound_lower")]
    pub pulse_lower_bound: f64,
    #[serde(default = "default_effectiveness_bound_upper")]
    pub pulse_upper_bound: f64,
    #[serde(default)]
    pub needs_los: bool,
}

impl Spell {
    pub fn is_instant_cast(&self) -> bool {
        self.cast_time_ms == 0
    }

    pub fn is_pulsing(&self) -> bool {
        self.frequency_ms > 0
    }

    pub fn costs_concentration(&self) -> bool {
        self.concentration_cost > 0
    }

    /// Duration spells leave a record on the target; instantaneous payloads
    /// (damage, heal, bolt impact) do not.
    pub fn leaves_effect(&self) -> bool {
        matches!(
            self.kind,
            SpellKind::Buff | SpellKind::Debuff | SpellKind::CrowdControl
        )
    }

    pub fn has_positive_effect(&self) -> bool {
        matches!(self.kind, SpellKind::Heal | SpellKind::Buff | SpellKind::Chant)
    }
}

#[cfg(test)]
pub(crate) fn test_spell(id: u32, kind: SpellKind) -> Spell {
    Spell {
        id: SpellId(id),
        name: format!("spell {id}"),
        kind,
        target: match kind {
            SpellKind::Heal | SpellKind::Buff => SpellTargetKind::Ally,
            SpellKind::Chant => SpellTargetKind::SelfOnly,
            _ => SpellTargetKind::Enemy,
        },
        cast_time_ms: 0,
        duration_ms: 0,
        frequency_ms: 0,
        power_cost: 0,
        concentration_cost: 0,
        range: 1500,
        radius: 0,
        recast_delay_ms: 0,
        client_effect: 0,
        damage_type: DamageType::Spirit,
        base_value: 0,
        pulse_step: 0.0,
        pulse_lower_bound: 1.0,
        pulse_upper_bound: 1.0,
        needs_los: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_kinds_leave_effects() {
        assert!(test_spell(1, SpellKind::Buff).leaves_effect());
        assert!(test_spell(2, SpellKind::CrowdControl).leaves_effect());
        assert!(!test_spell(3, SpellKind::DirectDamage).leaves_effect());
        assert!(!test_spell(4, SpellKind::Chant).leaves_effect());
    }

    #[test]
    fn harmful_kinds_are_not_positive() {
        assert!(test_spell(1, SpellKind::Buff).has_positive_effect());
        assert!(!test_spell(2, SpellKind::Debuff).has_positive_effect());
        assert!(!test_spell(3, SpellKind::CrowdControl).has_positive_effect());
    }
}
