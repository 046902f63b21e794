use crate::entities::living::LivingId;
use crate::spells::handler::SpellHandler;
use crate::world::position::Position;
use crate::world::timer::TimerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoltId(pub u64);

/// Effectiveness lost per chain hop.
pub const CHAIN_HOP_DECREMENT: f64 = 0.1;

/// Distance-proportional delivery delay: a bolt covers 85 units per 100 ms.
pub fn travel_time_ms(distance: u32) -> u64 {
    1 + u64::from(distance) * 100 / 85
}

/// One projectile in flight. Destroyed on arrival or when its target
/// becomes invalid; chains spawn a fresh delivery per hop.
#[derive(Debug)]
pub struct BoltDelivery {
    pub id: BoltId,
    pub target: LivingId,
    pub handler: SpellHandler,
    pub effectiveness: f64,
    /// Where this leg was fired from; chains recompute from the impact point.
    pub launched_from: Position,
    pub hops_remaining: u8,
    /// Targets already struck this chain; never hit twice.
    pub already_hit: Vec<LivingId>,
    pub timer: Option<TimerId>,
}

impl BoltDelivery {
    pub fn new(
        id: BoltId,
        target: LivingId,
        handler: SpellHandler,
        effectiveness: f64,
        launched_from: Position,
        hops_remaining: u8,
    ) -> Self {
        Self {
            id,
            target,
            handler,
            effectiveness,
            launched_from,
            hops_remaining,
            already_hit: Vec::new(),
            timer: None,
        }
    }

    pub fn caster(&self) -> LivingId {
        self.handler.caster
    }

    /// Effectiveness of the next hop, floored at zero.
    pub fn hop_effectiveness(&self) -> f64 {
        (self.effectiveness - CHAIN_HOP_DECREMENT).max(0.0)
    }

    pub fn can_chain(&self) -> bool {
        self.hops_remaining > 0 && self.hop_effectiveness() > 0.0
    }
}
