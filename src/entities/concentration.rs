use std::fmt;

use crate::effects::pulsing::PulseId;
use crate::effects::record::EffectId;

/// A caster-side entry paying concentration upkeep: either a duration
/// effect on some target or a caster-anchored pulsing chant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcentrationMember {
    Effect(EffectId),
    Pulse(PulseId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcentrationError {
    BudgetExceeded { cost: u16, free: u16 },
    AlreadyRegistered,
}

impl fmt::Display for ConcentrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExceeded { cost, free } => {
                write!(f, "concentration cost {cost} exceeds free budget {free}")
            }
            Self::AlreadyRegistered => write!(f, "member already pays concentration"),
        }
    }
}

/// Finite per-caster budget consumed by persistent effects. Additions are
/// rejected before any state mutation when the budget would be exceeded.
#[derive(Debug, Clone, Default)]
pub struct ConcentrationSet {
    budget: u16,
    members: Vec<(ConcentrationMember, u16)>,
}

impl ConcentrationSet {
    pub fn new(budget: u16) -> Self {
        Self {
            budget,
            members: Vec::new(),
        }
    }

    pub fn budget(&self) -> u16 {
        self.budget
    }

    pub fn used(&self) -> u16 {
        self.members.iter().map(|(_, cost)| *cost).sum()
    }

    pub fn free(&self) -> u16 {
        self.budget.saturating_sub(self.used())
    }

    pub fn can_afford(&self, cost: u16) -> bool {
        cost <= self.free()
    }

    pub fn add(&mut self, member: ConcentrationMember, cost: u16) -> Result<(), ConcentrationError> {
        if self.members.iter().any(|(existing, _)| *existing == member) {
            return Err(ConcentrationError::AlreadyRegistered);
        }
        if !self.can_afford(cost) {
            return Err(ConcentrationError::BudgetExceeded {
                cost,
                free: self.free(),
            });
        }
        self.members.push((member, cost));
        Ok(())
    }

    pub fn remove(&mut self, member: ConcentrationMember) -> bool {
        let before = self.members.len();
        self.members.retain(|(existing, _)| *existing != member);
        self.members.len() != before
    }

    pub fn contains(&self, member: ConcentrationMember) -> bool {
        self.members.iter().any(|(existing, _)| *existing == member)
    }

    pub fn members(&self) -> impl Iterator<Item = ConcentrationMember> + '_ {
        self.members.iter().map(|(member, _)| *member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
