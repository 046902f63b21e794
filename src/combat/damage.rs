use serde::{Deserialize, Serialize};

use crate::entities::living::Living;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    Crush,
    Slash,
    Thrust,
    Body,
    Cold,
    Energy,
    Heat,
    Matter,
    Spirit,
}

impl DamageType {
    pub const COUNT: usize = 9;

    pub fn index(self) -> usize {
        match self {
            Self::Crush => 0,
            Self::Slash => 1,
            Self::Thrust => 2,
            Self::Body => 3,
            Self::Cold => 4,
            Self::Energy => 5,
            Self::Heat => 6,
            Self::Matter => 7,
            Self::Spirit => 8,
        }
    }
}

/// Classification of a resolved magical attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackVerdict {
    Hit,
    Resisted,
    Immune,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackOutcome {
    pub verdict: AttackVerdict,
    /// Final amount after resists, zero unless `verdict` is `Hit`.
    pub amount: i32,
}

impl AttackOutcome {
    pub fn missed(verdict: AttackVerdict) -> Self {
        Self { verdict, amount: 0 }
    }
}

/// Seam to the combat/resist pipeline. The engine hands over
/// (attacker, target, damage type, base amount) and gets back the resolved
/// amount plus verdict; everything behind this trait is opaque to the
/// cast/effect machinery.
pub trait DamagePipeline {
    fn resolve(
        &mut self,
        attacker: &Living,
        target: &Living,
        damage_type: DamageType,
        base_amount: i32,
    ) -> AttackOutcome;
}

/// Default pipeline: flat percentage resists per damage type, full immunity
/// at 100%+ resist. Deterministic so scenario tests stay reproducible.
#[derive(Debug, Default)]
pub struct ResistPipeline;

impl DamagePipeline for ResistPipeline {
    fn resolve(
        &mut self,
        _attacker: &Living,
        target: &Living,
        damage_type: DamageType,
        base_amount: i32,
    ) -> AttackOutcome {
        let resist = i32::from(target.resist(damage_type));
        if resist >= 100 {
            return AttackOutcome::missed(AttackVerdict::Immune);
        }
        let reduced = i64::from(base_amount) * i64::from(100 - resist.max(0)) / 100;
        let amount = reduced.clamp(0, i64::from(i32::MAX)) as i32;
        if amount == 0 && base_amount > 0 {
            return AttackOutcome::missed(AttackVerdict::Resisted);
        }
        AttackOutcome {
            verdict: AttackVerdict::Hit,
            amount,
        }
    }
}
