use std::collections::HashMap;

use crate::combat::damage::DamageType;
use crate::entities::concentration::ConcentrationSet;
use crate::entities::effect_list::EffectList;
use crate::spells::spell::SpellId;
use crate::world::position::Position;
use crate::world::region::RegionId;
use crate::world::time::{Cooldown, GameTick};

/// Ids are monotonic and never reused, so a stale id held by a timer or a
/// bolt in flight simply fails lookup instead of touching freed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LivingId(pub u32);

/// Construction-time parameters for a living entity.
#[derive(Debug, Clone)]
pub struct LivingSpec {
    pub name: String,
    pub position: Position,
    pub max_health: i32,
    pub max_power: i32,
    pub concentration_budget: u16,
}

impl LivingSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Position::default(),
            max_health: 100,
            max_power: 100,
            concentration_budget: 20,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_power(mut self, max_power: i32) -> Self {
        self.max_power = max_power;
        self
    }

    pub fn with_concentration(mut self, budget: u16) -> Self {
        self.concentration_budget = budget;
        self
    }
}

/// A player or creature participating in the simulation.
#[derive(Debug)]
pub struct Living {
    pub id: LivingId,
    pub name: String,
    pub region: RegionId,
    pub position: Position,
    pub alive: bool,
    /// False once removed from the world; timers targeting it no-op.
    pub in_world: bool,
    pub health: i32,
    pub max_health: i32,
    pub power: i32,
    pub max_power: i32,
    pub silenced: bool,
    pub stunned: bool,
    /// Aggregate of active buff/debuff payload values.
    pub stat_bonus: i32,
    pub effects: EffectList,
    pub concentration: ConcentrationSet,
    resists: [i16; DamageType::COUNT],
    recast: HashMap<SpellId, Cooldown>,
    last_interrupted_at: Option<GameTick>,
}

impl Living {
    pub fn new(id: LivingId, region: RegionId, spec: LivingSpec) -> Self {
        Self {
            id,
            name: spec.name,
            region,
            position: spec.position,
            alive: true,
            in_world: true,
            health: spec.max_health,
            max_health: spec.max_health,
            power: spec.max_power,
            max_power: spec.max_power,
            silenced: false,
            stunned: false,
            stat_bonus: 0,
            effects: EffectList::new(),
            concentration: ConcentrationSet::new(spec.concentration_budget),
            resists: [0; DamageType::COUNT],
            recast: HashMap::new(),
            last_interrupted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.alive && self.in_world
    }

    pub fn resist(&self, damage_type: DamageType) -> i16 {
        self.resists[damage_type.index()]
    }

    pub fn set_resist(&mut self, damage_type: DamageType, percent: i16) {
        self.resists[damage_type.index()] = percent;
    }

    /// Apply resolved damage; death flips `alive`, it never goes negative.
    pub fn take_damage(&mut self, amount: i32) {
        self.health = self.health.saturating_sub(amount.max(0)).max(0);
        if self.health == 0 {
            self.alive = false;
        }
    }

    pub fn heal(&mut self, amount: i32) -> i32 {
        if !self.alive {
            return 0;
        }
        let healed = amount.max(0).min(self.max_health - self.health);
        self.health += healed;
        healed
    }

    pub fn can_afford_power(&self, cost: i32) -> bool {
        self.power >= cost
    }

    pub fn consume_power(&mut self, cost: i32) -> bool {
        if !self.can_afford_power(cost) {
            return false;
        }
        self.power -= cost;
        true
    }

    pub fn recast_ready(&self, spell: SpellId, now: GameTick) -> bool {
        self.recast
            .get(&spell)
            .map(|cooldown| cooldown.is_ready(now))
            .unwrap_or(true)
    }

    pub fn recast_remaining_ms(&self, spell: SpellId, now: GameTick) -> u64 {
        self.recast
            .get(&spell)
            .map(|cooldown| cooldown.remaining_ms(now))
            .unwrap_or(0)
    }

    pub fn arm_recast(&mut self, spell: SpellId, now: GameTick, delay_ms: u64) {
        if delay_ms == 0 {
            return;
        }
        self.recast.insert(spell, Cooldown::from_now(now, delay_ms));
    }

    pub fn interrupt(&mut self, now: GameTick) {
        self.last_interrupted_at = Some(now);
    }

    pub fn interrupted_since(&self, tick: GameTick) -> bool {
        self.last_interrupted_at
            .map(|at| at >= tick)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn living() -> Living {
        Living::new(LivingId(1), RegionId(1), LivingSpec::named("test"))
    }

    #[test]
    fn damage_kills_at_zero_health() {
        let mut living = living();
        living.take_damage(99);
        assert!(living.alive);
        living.take_damage(10);
        assert_eq!(living.health, 0);
        assert!(!living.alive);
    }

    #[test]
    fn heal_caps_at_max_and_skips_the_dead() {
        let mut living = living();
        living.take_damage(30);
        assert_eq!(living.heal(50), 30);
        assert_eq!(living.health, living.max_health);

        living.take_damage(1000);
        assert_eq!(living.heal(50), 0);
    }

    #[test]
    fn power_cannot_go_negative() {
        let mut living = living();
        assert!(living.consume_power(100));
        assert!(!living.consume_power(1));
        assert_eq!(living.power, 0);
    }

    #[test]
    fn recast_blocks_until_ready() {
        let mut living = living();
        let spell = SpellId(9);
        assert!(living.recast_ready(spell, GameTick(0)));
        living.arm_recast(spell, GameTick(0), 10_000);
        assert!(!living.recast_ready(spell, GameTick(9_999)));
        assert_eq!(living.recast_remaining_ms(spell, GameTick(9_000)), 1_000);
        assert!(living.recast_ready(spell, GameTick(10_000)));
        assert_eq!(living.recast_remaining_ms(spell, GameTick(10_000)), 0);
    }

    #[test]
    fn interrupts_compare_against_cast_start() {
        let mut living = living();
        assert!(!living.interrupted_since(GameTick(0)));
        living.interrupt(GameTick(500));
        assert!(living.interrupted_since(GameTick(400)));
        assert!(!living.interrupted_since(GameTick(501)));
    }
}
