use std::collections::HashMap;

use crate::cast::bolt::{travel_time_ms, BoltDelivery, BoltId};
use crate::cast::sequencer::{
    CastError, CastId, CastSequencer, CastStage, LosRequest, LosRequestId, LosState,
    SETTLE_DELAY_MS,
};
use crate::combat::damage::{AttackVerdict, DamagePipeline, DamageType, ResistPipeline};
use crate::config::EngineTuning;
use crate::effects::pulsing::{PulseId, PulsingSpellEffect};
use crate::effects::range_monitor::{MonitorId, RangeMonitor};
use crate::effects::record::{EffectId, EffectRecord, EffectTickOutcome};
use crate::entities::concentration::ConcentrationMember;
use crate::entities::living::{Living, LivingId, LivingSpec};
use crate::events::{EventLog, InterruptReason, MessageKind, WorldEvent};
use crate::spells::handler::SpellHandler;
use crate::spells::library::SpellLibrary;
use crate::spells::spell::{SpellId, SpellKind, SpellLineId, SpellTargetKind};
use crate::telemetry::logging;
use crate::world::position::Position;
use crate::world::region::{Region, RegionId, TimerTask};
use crate::world::time::GameTick;
use crate::world::timer::TimerId;

/// How a cast request was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    Started(CastId),
    /// The spell was an already-running chant; recasting stops it.
    ChantStopped,
}

/// Owns every living, effect, cast and timer, and drives them from the
/// region clocks. All cross-entity mutation funnels through here; the
/// records themselves only hold their own state.
pub struct SpellEngine {
    library: SpellLibrary,
    tuning: EngineTuning,
    regions: HashMap<RegionId, Region>,
    livings: HashMap<LivingId, Living>,
    casts: HashMap<CastId, CastSequencer>,
    casting: HashMap<LivingId, CastId>,
    effects: HashMap<EffectId, EffectRecord>,
    pulses: HashMap<PulseId, PulsingSpellEffect>,
    monitors: HashMap<MonitorId, RangeMonitor>,
    bolts: HashMap<BoltId, BoltDelivery>,
    pipeline: Box<dyn DamagePipeline>,
    events: EventLog,
    los_outbox: Vec<LosRequest>,
    next_living: u32,
    next_handle: u64,
}

impl SpellEngine {
    pub fn new(library: SpellLibrary, tuning: EngineTuning) -> Self {
        Self::with_pipeline(library, tuning, Box::new(ResistPipeline))
    }

    pub fn with_pipeline(
        library: SpellLibrary,
        tuning: EngineTuning,
        pipeline: Box<dyn DamagePipeline>,
    ) -> Self {
        Self {
            library,
            tuning,
            regions: HashMap::new(),
            livings: HashMap::new(),
            casts: HashMap::new(),
            casting: HashMap::new(),
            effects: HashMap::new(),
            pulses: HashMap::new(),
            monitors: HashMap::new(),
            bolts: HashMap::new(),
            pipeline,
            events: EventLog::new(),
            los_outbox: Vec::new(),
            next_living: 0,
            next_handle: 0,
        }
    }

    pub fn library(&self) -> &SpellLibrary {
        &self.library
    }

    pub fn add_region(&mut self, id: RegionId) {
        self.regions.entry(id).or_insert_with(|| Region::new(id));
    }

    pub fn now(&self, region: RegionId) -> GameTick {
        self.regions
            .get(&region)
            .map(Region::now)
            .unwrap_or(GameTick(0))
    }

    pub fn add_living(&mut self, region: RegionId, spec: LivingSpec) -> Result<LivingId, String> {
        if !self.regions.contains_key(&region) {
            return Err(format!("region {:?} does not exist", region));
        }
        self.next_living += 1;
        let id = LivingId(self.next_living);
        logging::log_game(&format!("{} entered region {:?}", spec.name, region));
        self.livings.insert(id, Living::new(id, region, spec));
        Ok(id)
    }

    pub fn living(&self, id: LivingId) -> Option<&Living> {
        self.livings.get(&id)
    }

    pub fn living_mut(&mut self, id: LivingId) -> Option<&mut Living> {
        self.livings.get_mut(&id)
    }

    pub fn effect(&self, id: EffectId) -> Option<&EffectRecord> {
        self.effects.get(&id)
    }

    pub fn find_effect(&self, owner: LivingId, spell: SpellId) -> Option<&EffectRecord> {
        self.effects
            .values()
            .find(|effect| effect.owner == owner && effect.handler.spell.id == spell)
    }

    pub fn active_cast(&self, caster: LivingId) -> Option<CastId> {
        self.casting.get(&caster).copied()
    }

    pub fn cast_stage(&self, cast: CastId) -> Option<CastStage> {
        self.casts.get(&cast).map(|cast| cast.stage)
    }

    pub fn active_chant(&self, caster: LivingId, spell: SpellId) -> Option<PulseId> {
        self.chant_of(caster, spell)
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        self.events.drain()
    }

    /// Pending visibility checks for the external line-of-sight service.
    pub fn take_los_requests(&mut self) -> Vec<LosRequest> {
        std::mem::take(&mut self.los_outbox)
    }

    /// Tear down everything the living anchors, then drop it. Stale timers
    /// referencing its ids no-op at dispatch.
    pub fn remove_living(&mut self, id: LivingId) {
        self.detach_living(id);
        self.livings.remove(&id);
    }

    /// Region transfer clears all region-bound state first; nothing carries
    /// a timer handle across clocks.
    pub fn move_to_region(
        &mut self,
        id: LivingId,
        region: RegionId,
        position: Position,
    ) -> Result<(), String> {
        if !self.regions.contains_key(&region) {
            return Err(format!("region {:?} does not exist", region));
        }
        if !self.livings.contains_key(&id) {
            return Err(format!("living {:?} does not exist", id));
        }
        self.detach_living(id);
        if let Some(living) = self.livings.get_mut(&id) {
            living.region = region;
            living.position = position;
        }
        Ok(())
    }

    fn detach_living(&mut self, id: LivingId) {
        if let Some(cast_id) = self.casting.get(&id).copied() {
            self.abort_cast(cast_id, InterruptReason::Cancelled);
        }
        let chants: Vec<PulseId> = self
            .pulses
            .values()
            .filter(|pulse| pulse.caster == id)
            .map(|pulse| pulse.id)
            .collect();
        for pulse in chants {
            self.stop_pulse(pulse, false);
        }
        let owned: Vec<EffectId> = self
            .effects
            .values()
            .filter(|effect| effect.owner == id)
            .map(|effect| effect.id)
            .collect();
        for effect in owned {
            self.expire_effect(effect, false);
        }
        // Effects this living pays concentration for fall off with it.
        let sustained: Vec<EffectId> = self
            .effects
            .values()
            .filter(|effect| {
                effect.handler.caster == id
                    && effect.concentration() > 0
                    && !effect.handler.is_chant()
            })
            .map(|effect| effect.id)
            .collect();
        for effect in sustained {
            self.expire_effect(effect, true);
        }
    }

    pub fn request_cast(
        &mut self,
        caster_id: LivingId,
        spell_id: SpellId,
        line: SpellLineId,
        target_id: LivingId,
    ) -> Result<CastOutcome, CastError> {
        let spell = self
            .library
            .get(spell_id)
            .cloned()
            .ok_or(CastError::UnknownSpell)?;
        let (region, active, silenced, stunned) = {
            let caster = self.livings.get(&caster_id).ok_or(CastError::UnknownCaster)?;
            (caster.region, caster.is_active(), caster.silenced, caster.stunned)
        };
        if !active {
            return Err(CastError::CasterDead);
        }
        if silenced {
            return Err(CastError::CasterSilenced);
        }
        if stunned {
            return Err(CastError::CasterStunned);
        }
        if self.casting.contains_key(&caster_id) {
            return Err(CastError::AlreadyCasting);
        }
        if matches!(spell.kind, SpellKind::Chant) {
            if let Some(running) = self.chant_of(caster_id, spell_id) {
                self.stop_pulse(running, true);
                return Ok(CastOutcome::ChantStopped);
            }
        }
        let resolved_target = match spell.target {
            SpellTargetKind::SelfOnly => caster_id,
            _ => target_id,
        };
        let now = self.now(region);
        {
            let caster = self.livings.get(&caster_id).ok_or(CastError::UnknownCaster)?;
            let target = self
                .livings
                .get(&resolved_target)
                .ok_or(CastError::UnknownTarget)?;
            if !target.is_active() {
                return Err(CastError::TargetDead);
            }
            if target.region != caster.region {
                return Err(CastError::TargetWrongRegion);
            }
            if spell.range > 0 && !caster.position.is_within_range(target.position, spell.range) {
                return Err(CastError::TargetOutOfRange);
            }
            if !caster.can_afford_power(spell.power_cost) {
                return Err(CastError::PowerInsufficient);
            }
            if spell.costs_concentration() && !caster.concentration.can_afford(spell.concentration_cost)
            {
                return Err(CastError::ConcentrationInsufficient);
            }
            if !caster.recast_ready(spell_id, now) {
                return Err(CastError::RecastBlocked {
                    remaining_ms: caster.recast_remaining_ms(spell_id, now),
                });
            }
        }
        let cast_id = CastId(self.next_handle());
        let handler = SpellHandler::new(caster_id, spell.clone(), line);
        let mut cast =
            CastSequencer::new(cast_id, resolved_target, handler, now, self.tuning.max_stage_len_ms);
        self.events.push(WorldEvent::CastStarted {
            cast: cast_id,
            caster: caster_id,
            spell: spell_id,
        });
        if spell.cast_time_ms > 0 {
            self.events.push(WorldEvent::CastAnimation {
                caster: caster_id,
                client_effect: spell.client_effect,
                duration_ms: spell.cast_time_ms,
            });
            self.events.message(
                caster_id,
                MessageKind::Spell,
                format!("You begin casting {}.", spell.name),
            );
        }
        cast.timer =
            self.schedule_task(region, TimerTask::CastStage(cast_id), cast.delay_before_interim);
        self.casts.insert(cast_id, cast);
        self.casting.insert(caster_id, cast_id);
        Ok(CastOutcome::Started(cast_id))
    }

    pub fn cancel_cast(&mut self, caster: LivingId) -> bool {
        let Some(cast_id) = self.casting.get(&caster).copied() else {
            return false;
        };
        let interruptible = self
            .casts
            .get(&cast_id)
            .map(|cast| cast.interruptible())
            .unwrap_or(false);
        if !interruptible {
            return false;
        }
        self.abort_cast(cast_id, InterruptReason::Cancelled);
        true
    }

    /// Combat feedback: being hit breaks any cast still in its interrupt
    /// window and stamps the interrupt tick for later stage checks.
    pub fn notify_attacked(&mut self, victim: LivingId) {
        let Some(region) = self.livings.get(&victim).map(|v| v.region) else {
            return;
        };
        let now = self.now(region);
        if let Some(living) = self.livings.get_mut(&victim) {
            living.interrupt(now);
        }
        if let Some(cast_id) = self.casting.get(&victim).copied() {
            let interruptible = self
                .casts
                .get(&cast_id)
                .map(|cast| cast.interruptible())
                .unwrap_or(false);
            if interruptible {
                self.abort_cast(cast_id, InterruptReason::CasterAttacked);
            }
        }
    }

    pub fn notify_moved(&mut self, living_id: LivingId, position: Position) {
        match self.livings.get_mut(&living_id) {
            Some(living) => living.position = position,
            None => return,
        }
        if let Some(cast_id) = self.casting.get(&living_id).copied() {
            let breaks = self
                .casts
                .get(&cast_id)
                .map(|cast| cast.interruptible() && cast.handler.spell.cast_time_ms > 0)
                .unwrap_or(false);
            if breaks {
                self.abort_cast(cast_id, InterruptReason::CasterMoved);
            }
        }
    }

    /// Answer from the external line-of-sight service.
    pub fn deliver_los(&mut self, request: LosRequestId, visible: bool) {
        let cast_id = self
            .casts
            .values()
            .find(|cast| matches!(cast.los, LosState::Pending { request: r } if r == request))
            .map(|cast| cast.id);
        let Some(cast_id) = cast_id else {
            return;
        };
        let waiting = {
            let Some(cast) = self.casts.get_mut(&cast_id) else {
                return;
            };
            cast.los = if visible { LosState::Granted } else { LosState::Denied };
            cast.waiting_on_los
        };
        if !waiting {
            // Not at the commit gate yet; the stage tick reads the verdict.
            return;
        }
        if visible {
            self.commit_cast(cast_id);
        } else {
            self.abort_cast(cast_id, InterruptReason::LosDenied);
        }
    }

    /// Drop a persistent effect before its natural end. Harmful effects
    /// cannot be shrugged off by their owner.
    pub fn cancel_effect(&mut self, owner: LivingId, effect: EffectId, user_requested: bool) -> bool {
        let Some(record) = self.effects.get(&effect) else {
            return false;
        };
        if record.owner != owner {
            return false;
        }
        if user_requested && !record.handler.has_positive_effect() {
            self.events.message(
                owner,
                MessageKind::System,
                "You cannot remove that effect.".to_string(),
            );
            return false;
        }
        self.expire_effect(effect, true);
        true
    }

    /// Rebuild a saved effect at partial duration. Start messages are
    /// suppressed; expiry behaves normally.
    pub fn restore_effect(
        &mut self,
        owner: LivingId,
        spell_id: SpellId,
        line: SpellLineId,
        remaining_fraction: f64,
        effectiveness: f64,
    ) -> Result<EffectId, String> {
        let spell = self
            .library
            .get(spell_id)
            .cloned()
            .ok_or_else(|| format!("unknown spell {:?}", spell_id))?;
        if !spell.leaves_effect() {
            return Err(format!("spell {} leaves no effect to restore", spell.name));
        }
        let region = self
            .livings
            .get(&owner)
            .map(|living| living.region)
            .ok_or_else(|| format!("living {:?} does not exist", owner))?;
        let effect_id = EffectId(self.next_handle());
        let handler = SpellHandler::new(owner, spell.clone(), line);
        let mut record = EffectRecord::new(
            effect_id,
            owner,
            handler,
            spell.duration_ms,
            spell.frequency_ms,
            effectiveness,
        );
        record.restored = true;
        let _ = record.begin();
        record.seed_remaining(remaining_fraction);
        if !record.is_permanent() {
            let remaining = record.remaining_ms().max(1);
            let delay = if spell.frequency_ms > 0 {
                spell.frequency_ms.min(remaining)
            } else {
                remaining
            };
            record.timer = self.schedule_task(region, TimerTask::EffectTick(effect_id), delay);
        }
        let mut bar_update = false;
        if let Some(living) = self.livings.get_mut(&owner) {
            living.effects.begin_changes();
            living.effects.add(effect_id);
            bar_update = living.effects.commit_changes();
        }
        if bar_update {
            self.events.push(WorldEvent::EffectBarUpdate { owner });
        }
        self.effects.insert(effect_id, record);
        self.apply_effect_bonus(effect_id, true);
        Ok(effect_id)
    }

    /// Move a region's clock forward, firing every timer that comes due on
    /// the way. Each timer runs with the clock set to its own due tick.
    pub fn advance(&mut self, region_id: RegionId, ms: u64) {
        let Some(target) = self
            .regions
            .get(&region_id)
            .map(|region| region.now().saturating_add(ms))
        else {
            return;
        };
        loop {
            let fired = {
                let Some(region) = self.regions.get_mut(&region_id) else {
                    return;
                };
                match region.timers.next_due() {
                    Some(due) if due <= target => {
                        let delta = due.saturating_sub(region.now());
                        region.clock.advance(delta);
                        region.timers.pop_ready(due)
                    }
                    _ => break,
                }
            };
            if let Some((timer, task)) = fired {
                self.dispatch(region_id, timer, task);
            }
        }
        if let Some(region) = self.regions.get_mut(&region_id) {
            let delta = target.saturating_sub(region.now());
            region.clock.advance(delta);
        }
    }

    fn dispatch(&mut self, region: RegionId, timer: TimerId, task: TimerTask) {
        match task {
            TimerTask::CastStage(id) => self.cast_stage_tick(id, timer),
            TimerTask::EffectTick(id) => self.effect_tick(id, timer),
            TimerTask::PulseTick(id) => self.pulse_tick(id, timer),
            TimerTask::BoltArrival(id) => self.bolt_arrival(region, id, timer),
            TimerTask::RangeCheck(id) => self.range_check_tick(id, timer),
            TimerTask::LosTimeout(id) => self.los_timeout(id),
        }
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn schedule_task(&mut self, region: RegionId, task: TimerTask, delay_ms: u64) -> Option<TimerId> {
        self.regions.get_mut(&region).map(|r| {
            let now = r.clock.now();
            r.timers.schedule(task, now, delay_ms)
        })
    }

    fn cancel_timer(&mut self, region: RegionId, timer: Option<TimerId>) {
        if let Some(timer) = timer {
            if let Some(r) = self.regions.get_mut(&region) {
                r.timers.cancel(timer);
            }
        }
    }

    fn chant_of(&self, caster: LivingId, spell: SpellId) -> Option<PulseId> {
        self.pulses
            .values()
            .find(|pulse| {
                pulse.caster == caster && pulse.handler.spell.id == spell && !pulse.is_cancelled()
            })
            .map(|pulse| pulse.id)
    }

    // --- cast stage machine ---

    fn cast_stage_tick(&mut self, cast_id: CastId, timer: TimerId) {
        let stage = match self.casts.get(&cast_id) {
            Some(cast) if cast.timer == Some(timer) => cast.stage,
            _ => return,
        };
        match stage {
            CastStage::PreCast => self.cast_interim_tick(cast_id),
            CastStage::Interim => self.cast_commit_tick(cast_id),
            CastStage::Commit => self.cast_settle_tick(cast_id),
            CastStage::PostCommit | CastStage::Done => self.finish_cast(cast_id),
        }
    }

    /// Everything that can still break a cast in flight.
    fn validate_cast(&self, cast_id: CastId) -> Option<InterruptReason> {
        let cast = self.casts.get(&cast_id)?;
        let caster = match self.livings.get(&cast.caster()) {
            Some(caster) => caster,
            None => return Some(InterruptReason::CasterDead),
        };
        if !caster.is_active() {
            return Some(InterruptReason::CasterDead);
        }
        if caster.silenced {
            return Some(InterruptReason::CasterSilenced);
        }
        if caster.interrupted_since(cast.started_at) {
            return Some(InterruptReason::CasterAttacked);
        }
        let target = match self.livings.get(&cast.target) {
            Some(target) => target,
            None => return Some(InterruptReason::TargetInvalid),
        };
        if !target.is_active() {
            return Some(InterruptReason::TargetDead);
        }
        if target.region != caster.region {
            return Some(InterruptReason::TargetInvalid);
        }
        let range = cast.handler.spell.range;
        if range > 0 && !caster.position.is_within_range(target.position, range) {
            return Some(InterruptReason::TargetOutOfRange);
        }
        if !caster.can_afford_power(cast.handler.spell.power_cost) {
            return Some(InterruptReason::PowerInsufficient);
        }
        None
    }

    fn cast_interim_tick(&mut self, cast_id: CastId) {
        if !self.casts.contains_key(&cast_id) {
            return;
        }
        if let Some(reason) = self.validate_cast(cast_id) {
            self.abort_cast(cast_id, reason);
            return;
        }
        let (caster_id, target_id, needs_los, commit_delay) = {
            let Some(cast) = self.casts.get_mut(&cast_id) else {
                return;
            };
            cast.advance_stage();
            (cast.caster(), cast.target, cast.handler.needs_los(), cast.delay_before_commit)
        };
        let Some(region) = self.livings.get(&caster_id).map(|c| c.region) else {
            return;
        };
        if needs_los {
            let request = LosRequest {
                id: LosRequestId(self.next_handle()),
                observer: caster_id,
                subject: target_id,
            };
            if let Some(cast) = self.casts.get_mut(&cast_id) {
                cast.los = LosState::Pending { request: request.id };
            }
            self.los_outbox.push(request);
            let _ = self.schedule_task(
                region,
                TimerTask::LosTimeout(cast_id),
                self.tuning.los_timeout_ms,
            );
        }
        let timer = self.schedule_task(region, TimerTask::CastStage(cast_id), commit_delay);
        if let Some(cast) = self.casts.get_mut(&cast_id) {
            cast.timer = timer;
        }
    }

    fn cast_commit_tick(&mut self, cast_id: CastId) {
        if !self.casts.contains_key(&cast_id) {
            return;
        }
        if let Some(reason) = self.validate_cast(cast_id) {
            self.abort_cast(cast_id, reason);
            return;
        }
        let los = match self.casts.get(&cast_id) {
            Some(cast) => cast.los,
            None => return,
        };
        match los {
            LosState::Pending { .. } => {
                // Stall at the gate; the response or the timeout resolves it.
                if let Some(cast) = self.casts.get_mut(&cast_id) {
                    cast.waiting_on_los = true;
                    cast.timer = None;
                }
            }
            LosState::Denied => self.abort_cast(cast_id, InterruptReason::LosDenied),
            LosState::NotRequired | LosState::Granted => self.commit_cast(cast_id),
        }
    }

    fn commit_cast(&mut self, cast_id: CastId) {
        if !self.casts.contains_key(&cast_id) {
            return;
        }
        if let Some(reason) = self.validate_cast(cast_id) {
            self.abort_cast(cast_id, reason);
            return;
        }
        let (caster_id, target_id, handler) = {
            let Some(cast) = self.casts.get(&cast_id) else {
                return;
            };
            (cast.caster(), cast.target, cast.handler.clone())
        };
        let spell = handler.spell.clone();
        let Some(region) = self.livings.get(&caster_id).map(|c| c.region) else {
            self.abort_cast(cast_id, InterruptReason::CasterDead);
            return;
        };
        let now = self.now(region);
        // Cost and cooldown commit together or not at all.
        let paid = match self.livings.get_mut(&caster_id) {
            Some(caster) => {
                let paid = caster.consume_power(spell.power_cost);
                if paid {
                    caster.arm_recast(spell.id, now, spell.recast_delay_ms);
                }
                paid
            }
            None => false,
        };
        if !paid {
            self.abort_cast(cast_id, InterruptReason::PowerInsufficient);
            return;
        }
        if let Some(cast) = self.casts.get_mut(&cast_id) {
            cast.advance_stage();
            cast.waiting_on_los = false;
        }
        self.events.push(WorldEvent::CastFinished {
            cast: cast_id,
            caster: caster_id,
            spell: spell.id,
        });
        let caster_pos = self
            .livings
            .get(&caster_id)
            .map(|c| c.position)
            .unwrap_or_default();
        match spell.kind {
            SpellKind::DirectDamage => {
                self.events.push(WorldEvent::SpellAnimation {
                    caster: caster_id,
                    target: target_id,
                    client_effect: spell.client_effect,
                    delay_ms: 0,
                    success: true,
                });
                self.deal_spell_damage(caster_id, target_id, spell.damage_type, spell.base_value, &spell.name);
            }
            SpellKind::Heal => {
                self.events.push(WorldEvent::SpellAnimation {
                    caster: caster_id,
                    target: target_id,
                    client_effect: spell.client_effect,
                    delay_ms: 0,
                    success: true,
                });
                let target_name = self
                    .livings
                    .get(&target_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_default();
                let healed = self
                    .livings
                    .get_mut(&target_id)
                    .map(|t| t.heal(spell.base_value))
                    .unwrap_or(0);
                self.events.message(
                    caster_id,
                    MessageKind::Spell,
                    format!("You heal {} for {} hit points.", target_name, healed),
                );
            }
            SpellKind::Buff | SpellKind::Debuff | SpellKind::CrowdControl => {
                self.events.push(WorldEvent::SpellAnimation {
                    caster: caster_id,
                    target: target_id,
                    client_effect: spell.client_effect,
                    delay_ms: 0,
                    success: true,
                });
                self.start_effect(handler, target_id, 1.0);
            }
            SpellKind::Bolt { chain_hops } => {
                self.launch_bolt(handler, target_id, 1.0, caster_pos, chain_hops, Vec::new());
            }
            SpellKind::Chant => {
                self.start_pulse(handler);
            }
        }
        let timer = self.schedule_task(region, TimerTask::CastStage(cast_id), SETTLE_DELAY_MS);
        if let Some(cast) = self.casts.get_mut(&cast_id) {
            cast.timer = timer;
        }
    }

    fn cast_settle_tick(&mut self, cast_id: CastId) {
        if let Some(cast) = self.casts.get_mut(&cast_id) {
            cast.advance_stage();
            cast.advance_stage();
        }
        self.finish_cast(cast_id);
    }

    fn finish_cast(&mut self, cast_id: CastId) {
        if let Some(cast) = self.casts.remove(&cast_id) {
            self.casting.remove(&cast.caster());
        }
    }

    fn abort_cast(&mut self, cast_id: CastId, reason: InterruptReason) {
        let Some(cast) = self.casts.remove(&cast_id) else {
            return;
        };
        let caster_id = cast.caster();
        self.casting.remove(&caster_id);
        if let Some(region) = self.livings.get(&caster_id).map(|c| c.region) {
            self.cancel_timer(region, cast.timer);
        }
        self.events.push(WorldEvent::CastInterrupted {
            cast: cast_id,
            caster: caster_id,
            spell: cast.handler.spell.id,
            reason,
        });
        self.events.message(
            caster_id,
            MessageKind::Spell,
            "Your spell is interrupted.".to_string(),
        );
    }

    fn los_timeout(&mut self, cast_id: CastId) {
        let pending = self
            .casts
            .get(&cast_id)
            .map(|cast| matches!(cast.los, LosState::Pending { .. }))
            .unwrap_or(false);
        if pending {
            self.abort_cast(cast_id, InterruptReason::LosTimeout);
        }
    }

    // --- damage resolution ---

    fn resolve_damage(
        &mut self,
        attacker: LivingId,
        target: LivingId,
        damage_type: DamageType,
        base_amount: i32,
    ) -> Option<crate::combat::damage::AttackOutcome> {
        let attacker = self.livings.get(&attacker)?;
        let target = self.livings.get(&target)?;
        Some(self.pipeline.resolve(attacker, target, damage_type, base_amount))
    }

    fn deal_spell_damage(
        &mut self,
        attacker_id: LivingId,
        target_id: LivingId,
        damage_type: DamageType,
        base_amount: i32,
        spell_name: &str,
    ) {
        let Some(outcome) = self.resolve_damage(attacker_id, target_id, damage_type, base_amount)
        else {
            return;
        };
        let target_name = match self.livings.get(&target_id) {
            Some(target) => target.name.clone(),
            None => return,
        };
        match outcome.verdict {
            AttackVerdict::Hit => {
                let died = match self.livings.get_mut(&target_id) {
                    Some(target) => {
                        target.take_damage(outcome.amount);
                        !target.alive
                    }
                    None => return,
                };
                self.events.message(
                    attacker_id,
                    MessageKind::Spell,
                    format!(
                        "Your {} hits {} for {} damage!",
                        spell_name, target_name, outcome.amount
                    ),
                );
                if died {
                    self.events.message(
                        attacker_id,
                        MessageKind::Spell,
                        format!("{} dies!", target_name),
                    );
                    self.on_death(target_id);
                }
            }
            AttackVerdict::Resisted => {
                self.events.message(
                    attacker_id,
                    MessageKind::SpellResisted,
                    format!("{} resists the effect!", target_name),
                );
            }
            AttackVerdict::Immune => {
                self.events.message(
                    attacker_id,
                    MessageKind::SpellResisted,
                    format!("{} is immune to this effect!", target_name),
                );
            }
        }
    }

    fn on_death(&mut self, victim: LivingId) {
        if let Some(cast_id) = self.casting.get(&victim).copied() {
            self.abort_cast(cast_id, InterruptReason::CasterDead);
        }
        let chants: Vec<PulseId> = self
            .pulses
            .values()
            .filter(|pulse| pulse.caster == victim)
            .map(|pulse| pulse.id)
            .collect();
        for pulse in chants {
            self.stop_pulse(pulse, false);
        }
        let owned: Vec<EffectId> = self
            .effects
            .values()
            .filter(|effect| effect.owner == victim)
            .map(|effect| effect.id)
            .collect();
        for effect in owned {
            self.expire_effect(effect, false);
        }
        let sustained: Vec<EffectId> = self
            .effects
            .values()
            .filter(|effect| {
                effect.handler.caster == victim
                    && effect.concentration() > 0
                    && !effect.handler.is_chant()
            })
            .map(|effect| effect.id)
            .collect();
        for effect in sustained {
            self.expire_effect(effect, true);
        }
    }

    // --- persistent effects ---

    fn start_effect(
        &mut self,
        handler: SpellHandler,
        target_id: LivingId,
        effectiveness: f64,
    ) -> Option<EffectId> {
        let spell = handler.spell.clone();
        let caster_id = handler.caster;
        let region = self
            .livings
            .get(&target_id)
            .filter(|target| target.is_active())
            .map(|target| target.region)?;
        let existing = {
            let target = self.livings.get(&target_id)?;
            let mut found = None;
            for id in target.effects.effects() {
                if let Some(effect) = self.effects.get(&id) {
                    if effect.handler.spell.id == spell.id && !effect.is_expired() {
                        found = Some(id);
                        break;
                    }
                }
            }
            found
        };
        if let Some(existing_id) = existing {
            return self.overwrite_effect(existing_id, handler, effectiveness);
        }
        let effect_id = EffectId(self.next_handle());
        let record = EffectRecord::new(
            effect_id,
            target_id,
            handler,
            spell.duration_ms,
            spell.frequency_ms,
            effectiveness,
        );
        // Chant-carried buffs ride on the chant's upkeep; only standalone
        // effects register their own concentration.
        let pays_concentration = record.concentration() > 0 && !record.handler.is_chant();
        if pays_concentration {
            let added = match self.livings.get_mut(&caster_id) {
                Some(caster) => caster
                    .concentration
                    .add(ConcentrationMember::Effect(effect_id), record.concentration()),
                None => return None,
            };
            if let Err(err) = added {
                self.events
                    .message(caster_id, MessageKind::System, err.to_string());
                return None;
            }
        }
        let mut record = record;
        let mut bar_update = false;
        if let Some(target) = self.livings.get_mut(&target_id) {
            target.effects.begin_changes();
            target.effects.add(effect_id);
            bar_update = target.effects.commit_changes();
        }
        if bar_update {
            self.events.push(WorldEvent::EffectBarUpdate { owner: target_id });
        }
        let delay = record.begin().flatten();
        if let Some(delay_ms) = delay {
            if delay_ms > 0 {
                record.timer = self.schedule_task(region, TimerTask::EffectTick(effect_id), delay_ms);
            }
        }
        let name = record.handler.spell.name.clone();
        let positive = record.handler.has_positive_effect();
        let restored = record.restored;
        let pulsing = record.frequency_ms > 0;
        self.effects.insert(effect_id, record);
        self.apply_effect_bonus(effect_id, true);
        if !restored {
            if positive {
                self.events.message(
                    target_id,
                    MessageKind::Spell,
                    format!("The {} effect surrounds you.", name),
                );
            } else {
                self.events.message(
                    target_id,
                    MessageKind::Spell,
                    format!("You are afflicted by {}!", name),
                );
            }
        }
        // Pulsing effects land their first payload with the application.
        if pulsing {
            self.effect_pulse(effect_id);
        }
        Some(effect_id)
    }

    /// Replace a live effect of the same spell in place. The list slot and
    /// its client id survive; timing restarts.
    fn overwrite_effect(
        &mut self,
        effect_id: EffectId,
        handler: SpellHandler,
        effectiveness: f64,
    ) -> Option<EffectId> {
        let (owner_id, existing_pays, old_timer, was_fading) = {
            let effect = self.effects.get(&effect_id)?;
            (
                effect.owner,
                effect.concentration() > 0 && !effect.handler.is_chant(),
                effect.timer,
                effect.fading,
            )
        };
        let new_pays = handler.spell.costs_concentration() && !handler.is_chant();
        if existing_pays || new_pays {
            logging::log_spell(&format!(
                "refused overwrite of sustained effect on {:?}",
                owner_id
            ));
            self.events.message(
                handler.caster,
                MessageKind::System,
                "That effect is already active.".to_string(),
            );
            return None;
        }
        let region = self.livings.get(&owner_id).map(|owner| owner.region)?;
        if !was_fading {
            self.apply_effect_bonus(effect_id, false);
        }
        let spell = handler.spell.clone();
        let delay = {
            let effect = self.effects.get_mut(&effect_id)?;
            effect.handler = handler;
            effect.duration_ms = spell.duration_ms;
            effect.frequency_ms = spell.frequency_ms;
            effect.effectiveness = effectiveness;
            effect.fading = false;
            effect.rearm()
        };
        self.cancel_timer(region, old_timer);
        let new_timer = match delay {
            Some(delay_ms) if delay_ms > 0 => {
                self.schedule_task(region, TimerTask::EffectTick(effect_id), delay_ms)
            }
            _ => None,
        };
        if let Some(effect) = self.effects.get_mut(&effect_id) {
            effect.timer = new_timer;
        }
        let mut bar_update = false;
        if let Some(owner) = self.livings.get_mut(&owner_id) {
            owner.effects.begin_changes();
            owner.effects.mark_changed();
            bar_update = owner.effects.commit_changes();
        }
        if bar_update {
            self.events.push(WorldEvent::EffectBarUpdate { owner: owner_id });
        }
        self.apply_effect_bonus(effect_id, true);
        if spell.frequency_ms > 0 {
            self.effect_pulse(effect_id);
        }
        Some(effect_id)
    }

    fn expire_effect(&mut self, effect_id: EffectId, emit_messages: bool) {
        let expired = match self.effects.get_mut(&effect_id) {
            Some(effect) => effect.expire(),
            None => return,
        };
        if !expired {
            return;
        }
        let was_fading = self
            .effects
            .get(&effect_id)
            .map(|effect| effect.fading)
            .unwrap_or(false);
        if !was_fading {
            self.apply_effect_bonus(effect_id, false);
        }
        let Some(record) = self.effects.remove(&effect_id) else {
            return;
        };
        if let Some(region) = self.livings.get(&record.owner).map(|owner| owner.region) {
            self.cancel_timer(region, record.timer);
        }
        let mut bar_update = false;
        if let Some(owner) = self.livings.get_mut(&record.owner) {
            owner.effects.begin_changes();
            owner.effects.remove(effect_id);
            bar_update = owner.effects.commit_changes();
        }
        if bar_update {
            self.events.push(WorldEvent::EffectBarUpdate { owner: record.owner });
        }
        if record.concentration() > 0 && !record.handler.is_chant() {
            if let Some(caster) = self.livings.get_mut(&record.handler.caster) {
                caster
                    .concentration
                    .remove(ConcentrationMember::Effect(effect_id));
            }
        }
        for monitor in self.monitors.values_mut() {
            monitor.remove(effect_id);
        }
        if emit_messages {
            self.events.message(
                record.owner,
                MessageKind::Spell,
                format!("The {} effect wears off.", record.handler.spell.name),
            );
        }
    }

    fn effect_tick(&mut self, effect_id: EffectId, timer: TimerId) {
        let outcome = {
            let Some(effect) = self.effects.get_mut(&effect_id) else {
                return;
            };
            if effect.timer != Some(timer) {
                return;
            }
            effect.timer = None;
            effect.on_timer_elapsed()
        };
        match outcome {
            EffectTickOutcome::Expire => self.expire_effect(effect_id, true),
            EffectTickOutcome::Pulse { next_delay_ms } => {
                self.effect_pulse(effect_id);
                if next_delay_ms == 0 {
                    return;
                }
                let owner = match self.effects.get(&effect_id) {
                    Some(effect) => effect.owner,
                    None => return,
                };
                let Some(region) = self.livings.get(&owner).map(|o| o.region) else {
                    return;
                };
                let timer =
                    self.schedule_task(region, TimerTask::EffectTick(effect_id), next_delay_ms);
                if let Some(effect) = self.effects.get_mut(&effect_id) {
                    effect.timer = timer;
                }
            }
        }
    }

    /// Periodic payload of a duration effect. Deactivated effects keep
    /// their timer alive but skip the payload.
    fn effect_pulse(&mut self, effect_id: EffectId) {
        let (owner, caster, damage_type, amount, kind, name) = {
            let Some(effect) = self.effects.get_mut(&effect_id) else {
                return;
            };
            if effect.fading {
                return;
            }
            let base = f64::from(effect.handler.spell.base_value) * effect.effectiveness;
            let amount = effect.handler.pulse_effectiveness(base) as i32;
            (
                effect.owner,
                effect.handler.caster,
                effect.handler.spell.damage_type,
                amount,
                effect.handler.spell.kind,
                effect.handler.spell.name.clone(),
            )
        };
        if matches!(kind, SpellKind::Debuff) && amount > 0 {
            self.deal_spell_damage(caster, owner, damage_type, amount, &name);
        }
    }

    fn apply_effect_bonus(&mut self, effect_id: EffectId, active: bool) {
        let (owner_id, kind, amount) = {
            let Some(effect) = self.effects.get(&effect_id) else {
                return;
            };
            let amount = (f64::from(effect.handler.spell.base_value) * effect.effectiveness) as i32;
            (effect.owner, effect.handler.spell.kind, amount)
        };
        let Some(owner) = self.livings.get_mut(&owner_id) else {
            return;
        };
        match kind {
            SpellKind::Buff | SpellKind::Chant => {
                owner.stat_bonus += if active { amount } else { -amount };
            }
            SpellKind::Debuff => {
                owner.stat_bonus += if active { -amount } else { amount };
            }
            SpellKind::CrowdControl => owner.stunned = active,
            _ => {}
        }
    }

    // --- chants ---

    fn start_pulse(&mut self, handler: SpellHandler) -> Option<PulseId> {
        let caster_id = handler.caster;
        let cost = handler.spell.concentration_cost;
        if !self.livings.contains_key(&caster_id) {
            return None;
        }
        let pulse_id = PulseId(self.next_handle());
        let added = match self.livings.get_mut(&caster_id) {
            Some(caster) => caster
                .concentration
                .add(ConcentrationMember::Pulse(pulse_id), cost),
            None => return None,
        };
        if let Err(err) = added {
            self.events
                .message(caster_id, MessageKind::System, err.to_string());
            return None;
        }
        let name = handler.spell.name.clone();
        let freq = handler.spell.frequency_ms;
        let pulse = PulsingSpellEffect::new(pulse_id, caster_id, handler);
        self.pulses.insert(pulse_id, pulse);
        self.events.message(
            caster_id,
            MessageKind::Spell,
            format!("You begin chanting {}.", name),
        );
        // First pulse lands with the commit.
        self.pulse_tick_apply(pulse_id);
        if freq > 0 {
            if let Some(region) = self.livings.get(&caster_id).map(|c| c.region) {
                let timer = self.schedule_task(region, TimerTask::PulseTick(pulse_id), freq);
                if let Some(pulse) = self.pulses.get_mut(&pulse_id) {
                    pulse.timer = timer;
                }
            }
        }
        Some(pulse_id)
    }

    fn stop_pulse(&mut self, pulse_id: PulseId, emit_message: bool) {
        let cancelled = match self.pulses.get_mut(&pulse_id) {
            Some(pulse) => pulse.cancel(),
            None => return,
        };
        if !cancelled {
            return;
        }
        let Some(pulse) = self.pulses.remove(&pulse_id) else {
            return;
        };
        let caster_id = pulse.caster;
        let region = self.livings.get(&caster_id).map(|c| c.region);
        if let Some(region) = region {
            self.cancel_timer(region, pulse.timer);
        }
        let monitors: Vec<(MonitorId, Option<TimerId>)> = self
            .monitors
            .values()
            .filter(|monitor| monitor.pulse == pulse_id)
            .map(|monitor| (monitor.id, monitor.timer))
            .collect();
        for (monitor_id, timer) in monitors {
            self.monitors.remove(&monitor_id);
            if let Some(region) = region {
                self.cancel_timer(region, timer);
            }
        }
        if let Some(caster) = self.livings.get_mut(&caster_id) {
            caster
                .concentration
                .remove(ConcentrationMember::Pulse(pulse_id));
        }
        if emit_message {
            self.events.message(
                caster_id,
                MessageKind::Spell,
                format!("You stop chanting {}.", pulse.handler.spell.name),
            );
        }
    }

    fn pulse_tick(&mut self, pulse_id: PulseId, timer: TimerId) {
        let (caster_id, freq, live) = {
            let Some(pulse) = self.pulses.get(&pulse_id) else {
                return;
            };
            (
                pulse.caster,
                pulse.frequency_ms,
                pulse.timer == Some(timer) && !pulse.is_cancelled(),
            )
        };
        if !live {
            return;
        }
        let caster_ok = self
            .livings
            .get(&caster_id)
            .map(|caster| caster.is_active())
            .unwrap_or(false);
        if !caster_ok {
            self.stop_pulse(pulse_id, false);
            return;
        }
        self.pulse_tick_apply(pulse_id);
        if freq == 0 {
            return;
        }
        let Some(region) = self.livings.get(&caster_id).map(|c| c.region) else {
            return;
        };
        let timer = self.schedule_task(region, TimerTask::PulseTick(pulse_id), freq);
        if let Some(pulse) = self.pulses.get_mut(&pulse_id) {
            pulse.timer = timer;
        }
    }

    fn pulse_tick_apply(&mut self, pulse_id: PulseId) {
        let (caster_id, handler, radius, range_gated) = {
            let Some(pulse) = self.pulses.get(&pulse_id) else {
                return;
            };
            (
                pulse.caster,
                pulse.handler.clone(),
                pulse.handler.spell.radius,
                pulse.handler.range_gated(),
            )
        };
        let multiplier = {
            let Some(pulse) = self.pulses.get_mut(&pulse_id) else {
                return;
            };
            pulse.handler.pulse_effectiveness(1.0)
        };
        let Some((region, caster_pos)) = self
            .livings
            .get(&caster_id)
            .map(|caster| (caster.region, caster.position))
        else {
            return;
        };
        let targets: Vec<LivingId> = if radius > 0 {
            self.livings
                .values()
                .filter(|living| {
                    living.region == region
                        && living.is_active()
                        && caster_pos.is_within_range(living.position, radius)
                })
                .map(|living| living.id)
                .collect()
        } else {
            vec![caster_id]
        };
        for target in targets {
            let applied = self.start_effect(handler.clone(), target, multiplier);
            if range_gated && target != caster_id {
                if let Some(effect_id) = applied {
                    self.track_in_monitor(pulse_id, effect_id, region);
                }
            }
        }
    }

    fn track_in_monitor(&mut self, pulse_id: PulseId, effect_id: EffectId, region: RegionId) {
        let existing = self
            .monitors
            .values()
            .find(|monitor| monitor.pulse == pulse_id)
            .map(|monitor| monitor.id);
        let monitor_id = match existing {
            Some(id) => id,
            None => {
                let (caster, radius) = match self.pulses.get(&pulse_id) {
                    Some(pulse) => (pulse.caster, pulse.handler.spell.radius),
                    None => return,
                };
                let id = MonitorId(self.next_handle());
                let mut monitor = RangeMonitor::new(id, pulse_id, caster, radius);
                monitor.timer = self.schedule_task(
                    region,
                    TimerTask::RangeCheck(id),
                    self.tuning.range_check_interval_ms,
                );
                self.monitors.insert(id, monitor);
                id
            }
        };
        if let Some(monitor) = self.monitors.get_mut(&monitor_id) {
            monitor.add(effect_id);
        }
    }

    fn range_check_tick(&mut self, monitor_id: MonitorId, timer: TimerId) {
        let live = match self.monitors.get(&monitor_id) {
            Some(monitor) => monitor.timer == Some(timer),
            None => return,
        };
        if !live {
            return;
        }
        let (caster_id, range) = match self.monitors.get(&monitor_id) {
            Some(monitor) => (monitor.caster, monitor.range_max),
            None => return,
        };
        let Some((caster_pos, region)) = self
            .livings
            .get(&caster_id)
            .map(|caster| (caster.position, caster.region))
        else {
            self.monitors.remove(&monitor_id);
            return;
        };
        {
            let effects = &self.effects;
            if let Some(monitor) = self.monitors.get_mut(&monitor_id) {
                monitor.retain(|id| effects.contains_key(&id));
            }
        }
        let entries: Vec<EffectId> = match self.monitors.get(&monitor_id) {
            Some(monitor) => monitor.entries().map(|entry| entry.effect).collect(),
            None => return,
        };
        for effect_id in entries {
            let Some(owner) = self.effects.get(&effect_id).map(|effect| effect.owner) else {
                continue;
            };
            let in_range = owner == caster_id
                || self
                    .livings
                    .get(&owner)
                    .map(|o| o.region == region && caster_pos.is_within_range(o.position, range))
                    .unwrap_or(false);
            let changed = self
                .monitors
                .get_mut(&monitor_id)
                .map(|monitor| monitor.set_active(effect_id, in_range))
                .unwrap_or(false);
            if changed {
                self.set_effect_fading(effect_id, !in_range);
            }
        }
        let empty = self
            .monitors
            .get(&monitor_id)
            .map(|monitor| monitor.is_empty())
            .unwrap_or(true);
        if empty {
            self.monitors.remove(&monitor_id);
            return;
        }
        let timer = self.schedule_task(
            region,
            TimerTask::RangeCheck(monitor_id),
            self.tuning.range_check_interval_ms,
        );
        if let Some(monitor) = self.monitors.get_mut(&monitor_id) {
            monitor.timer = timer;
        }
    }

    fn set_effect_fading(&mut self, effect_id: EffectId, fading: bool) {
        let (owner_id, name) = {
            let Some(effect) = self.effects.get_mut(&effect_id) else {
                return;
            };
            if effect.fading == fading {
                return;
            }
            effect.fading = fading;
            (effect.owner, effect.handler.spell.name.clone())
        };
        self.apply_effect_bonus(effect_id, !fading);
        let mut bar_update = false;
        if let Some(owner) = self.livings.get_mut(&owner_id) {
            owner.effects.begin_changes();
            owner.effects.mark_changed();
            bar_update = owner.effects.commit_changes();
        }
        if bar_update {
            self.events.push(WorldEvent::EffectBarUpdate { owner: owner_id });
        }
        if fading {
            self.events.message(
                owner_id,
                MessageKind::Spell,
                format!("The {} effect fades as you move away.", name),
            );
        } else {
            self.events.message(
                owner_id,
                MessageKind::Spell,
                format!("The {} effect returns.", name),
            );
        }
    }

    // --- bolts ---

    fn launch_bolt(
        &mut self,
        handler: SpellHandler,
        target_id: LivingId,
        effectiveness: f64,
        launched_from: Position,
        hops: u8,
        already_hit: Vec<LivingId>,
    ) {
        let Some((region, target_pos, target_name)) = self
            .livings
            .get(&target_id)
            .map(|target| (target.region, target.position, target.name.clone()))
        else {
            return;
        };
        let distance = launched_from.distance_to(target_pos);
        let travel = travel_time_ms(distance);
        let bolt_id = BoltId(self.next_handle());
        let mut bolt = BoltDelivery::new(bolt_id, target_id, handler, effectiveness, launched_from, hops);
        bolt.already_hit = already_hit;
        self.events.push(WorldEvent::SpellAnimation {
            caster: bolt.caster(),
            target: target_id,
            client_effect: bolt.handler.spell.client_effect,
            delay_ms: travel,
            success: true,
        });
        self.events.message(
            bolt.caster(),
            MessageKind::Spell,
            format!("You launch {} at {}.", bolt.handler.spell.name, target_name),
        );
        bolt.timer = self.schedule_task(region, TimerTask::BoltArrival(bolt_id), travel);
        self.bolts.insert(bolt_id, bolt);
    }

    fn bolt_arrival(&mut self, region: RegionId, bolt_id: BoltId, timer: TimerId) {
        let live = match self.bolts.get(&bolt_id) {
            Some(bolt) => bolt.timer == Some(timer),
            None => return,
        };
        if !live {
            return;
        }
        let Some(mut bolt) = self.bolts.remove(&bolt_id) else {
            return;
        };
        let caster_id = bolt.caster();
        if !self.livings.contains_key(&caster_id) {
            return;
        }
        // An invalid victim at arrival is a silent fizzle.
        let Some((target_pos, target_ok)) = self
            .livings
            .get(&bolt.target)
            .map(|target| (target.position, target.is_active() && target.region == region))
        else {
            return;
        };
        if !target_ok {
            return;
        }
        bolt.already_hit.push(bolt.target);
        let amount = (f64::from(bolt.handler.spell.base_value) * bolt.effectiveness) as i32;
        let name = bolt.handler.spell.name.clone();
        self.deal_spell_damage(caster_id, bolt.target, bolt.handler.spell.damage_type, amount, &name);
        if !bolt.can_chain() {
            return;
        }
        let radius = bolt.handler.spell.radius;
        if radius == 0 {
            return;
        }
        let next = self
            .livings
            .values()
            .filter(|living| {
                living.is_active()
                    && living.region == region
                    && living.id != caster_id
                    && !bolt.already_hit.contains(&living.id)
            })
            .filter(|living| target_pos.is_within_range(living.position, radius))
            .min_by_key(|living| target_pos.distance_to(living.position))
            .map(|living| living.id);
        if let Some(next_target) = next {
            self.launch_bolt(
                bolt.handler.clone(),
                next_target,
                bolt.hop_effectiveness(),
                target_pos,
                bolt.hops_remaining.saturating_sub(1),
                bolt.already_hit.clone(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spells::spell::{test_spell, Spell, SpellLine};

    const REGION: RegionId = RegionId(1);
    const LINE: SpellLineId = SpellLineId(1);

    fn engine_with(spells: Vec<Spell>) -> SpellEngine {
        let mut library = SpellLibrary::new();
        library
            .insert_line(SpellLine {
                id: LINE,
                name: "Testing".to_string(),
            })
            .expect("line");
        for spell in spells {
            library.insert(spell).expect("insert");
        }
        let mut engine = SpellEngine::new(library, EngineTuning::default());
        engine.add_region(REGION);
        engine
    }

    fn add_at(engine: &mut SpellEngine, name: &str, x: i32) -> LivingId {
        engine
            .add_living(REGION, LivingSpec::named(name).at(Position::new(x, 0, 0)))
            .expect("living")
    }

    fn smite() -> Spell {
        let mut spell = test_spell(1, SpellKind::DirectDamage);
        spell.cast_time_ms = 2_000;
        spell.power_cost = 10;
        spell.base_value = 50;
        spell
    }

    fn count_messages(events: &[WorldEvent], needle: &str) -> usize {
        events
            .iter()
            .filter(|event| {
                matches!(event, WorldEvent::Message { text, .. } if text.contains(needle))
            })
            .count()
    }

    fn interrupt_reasons(events: &[WorldEvent]) -> Vec<InterruptReason> {
        events
            .iter()
            .filter_map(|event| match event {
                WorldEvent::CastInterrupted { reason, .. } => Some(*reason),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn completed_cast_costs_power_and_deals_damage() {
        let mut engine = engine_with(vec![smite()]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        let outcome = engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("cast accepted");
        assert!(matches!(outcome, CastOutcome::Started(_)));

        engine.advance(REGION, 2_200);
        assert_eq!(engine.living(target).expect("target").health, 50);
        assert_eq!(engine.living(caster).expect("caster").power, 90);
        assert_eq!(engine.active_cast(caster), None);
        let events = engine.drain_events();
        assert!(events
            .iter()
            .any(|event| matches!(event, WorldEvent::CastFinished { .. })));
    }

    #[test]
    fn target_death_mid_cast_aborts_without_cost() {
        let mut engine = engine_with(vec![smite()]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("cast accepted");
        engine.advance(REGION, 500);
        engine.living_mut(target).expect("target").take_damage(1_000);
        engine.advance(REGION, 2_000);

        assert_eq!(engine.living(caster).expect("caster").power, 100);
        let events = engine.drain_events();
        assert_eq!(interrupt_reasons(&events), vec![InterruptReason::TargetDead]);
        assert!(!events
            .iter()
            .any(|event| matches!(event, WorldEvent::CastFinished { .. })));
    }

    #[test]
    fn attack_interrupts_only_before_commit() {
        let mut engine = engine_with(vec![smite()]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("cast accepted");
        engine.advance(REGION, 100);
        engine.notify_attacked(caster);
        engine.advance(REGION, 2_500);
        let events = engine.drain_events();
        assert_eq!(
            interrupt_reasons(&events),
            vec![InterruptReason::CasterAttacked]
        );

        // Past the commit the hit no longer matters.
        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("second cast");
        engine.advance(REGION, 2_050);
        engine.notify_attacked(caster);
        engine.advance(REGION, 200);
        let events = engine.drain_events();
        assert!(interrupt_reasons(&events).is_empty());
        assert!(events
            .iter()
            .any(|event| matches!(event, WorldEvent::CastFinished { .. })));
    }

    #[test]
    fn movement_interrupts_timed_casts() {
        let mut engine = engine_with(vec![smite()]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("cast accepted");
        engine.notify_moved(caster, Position::new(10, 0, 0));
        let events = engine.drain_events();
        assert_eq!(
            interrupt_reasons(&events),
            vec![InterruptReason::CasterMoved]
        );
    }

    #[test]
    fn second_cast_rejected_while_casting() {
        let mut engine = engine_with(vec![smite()]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("first cast");
        let err = engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect_err("still casting");
        assert_eq!(err, CastError::AlreadyCasting);
    }

    #[test]
    fn recast_delay_blocks_until_ready() {
        let mut spell = smite();
        spell.cast_time_ms = 1_000;
        spell.recast_delay_ms = 10_000;
        let mut engine = engine_with(vec![spell]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("first cast");
        engine.advance(REGION, 1_200);
        let err = engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect_err("cooling down");
        match err {
            CastError::RecastBlocked { remaining_ms } => assert_eq!(remaining_ms, 9_800),
            other => panic!("unexpected error {other:?}"),
        }
        engine.advance(REGION, 10_000);
        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("cooldown over");
    }

    #[test]
    fn power_shortfall_rejected_before_the_cast_starts() {
        let mut engine = engine_with(vec![smite()]);
        let caster = engine
            .add_living(REGION, LivingSpec::named("weak").with_power(5))
            .expect("living");
        let target = add_at(&mut engine, "target", 100);

        let err = engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect_err("not enough power");
        assert_eq!(err, CastError::PowerInsufficient);
        assert_eq!(engine.active_cast(caster), None);
    }

    #[test]
    fn pulsing_debuff_runs_its_full_lifecycle() {
        let mut dot = test_spell(2, SpellKind::Debuff);
        dot.cast_time_ms = 1_000;
        dot.duration_ms = 20_000;
        dot.frequency_ms = 5_000;
        dot.base_value = 10;
        let mut engine = engine_with(vec![dot]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(2), LINE, target)
            .expect("cast accepted");
        engine.advance(REGION, 1_100);
        let effect = engine.find_effect(target, SpellId(2)).expect("effect started");
        assert!(effect.is_active());
        assert_eq!(engine.living(target).expect("target").effects.len(), 1);
        assert_eq!(engine.living(target).expect("target").stat_bonus, -10);

        // First payload with the application, then +5s, +10s, +15s, expiry
        // at +20s.
        engine.advance(REGION, 25_000);
        assert!(engine.find_effect(target, SpellId(2)).is_none());
        let target_ref = engine.living(target).expect("target");
        assert_eq!(target_ref.health, 60);
        assert_eq!(target_ref.stat_bonus, 0);
        assert!(target_ref.effects.is_empty());
        let events = engine.drain_events();
        assert_eq!(count_messages(&events, "wears off"), 1);
    }

    #[test]
    fn recasting_a_buff_overwrites_in_place() {
        let mut buff = test_spell(3, SpellKind::Buff);
        buff.cast_time_ms = 1_000;
        buff.duration_ms = 20_000;
        buff.base_value = 5;
        let mut engine = engine_with(vec![buff]);
        let caster = add_at(&mut engine, "caster", 0);
        let ally = add_at(&mut engine, "ally", 100);

        engine
            .request_cast(caster, SpellId(3), LINE, ally)
            .expect("first cast");
        engine.advance(REGION, 5_000);
        let first_effect = engine.find_effect(ally, SpellId(3)).expect("effect").id;
        let slot = engine
            .living(ally)
            .expect("ally")
            .effects
            .internal_id(first_effect)
            .expect("slot");

        engine
            .request_cast(caster, SpellId(3), LINE, ally)
            .expect("second cast");
        engine.advance(REGION, 1_100);

        // Same record, same client slot, restarted clock, single stack.
        let effect = engine.find_effect(ally, SpellId(3)).expect("effect");
        assert_eq!(effect.id, first_effect);
        assert_eq!(effect.remaining_ms(), 20_000);
        let ally_ref = engine.living(ally).expect("ally");
        assert_eq!(ally_ref.effects.len(), 1);
        assert_eq!(ally_ref.effects.internal_id(first_effect), Some(slot));
        assert_eq!(ally_ref.stat_bonus, 5);

        // Expires relative to the overwrite, not the first application.
        engine.advance(REGION, 18_000);
        assert!(engine.find_effect(ally, SpellId(3)).is_some());
        engine.advance(REGION, 3_000);
        assert!(engine.find_effect(ally, SpellId(3)).is_none());
        assert_eq!(engine.living(ally).expect("ally").stat_bonus, 0);
    }

    #[test]
    fn crowd_control_builds_immunity_on_reapplication() {
        let mut mez = test_spell(4, SpellKind::CrowdControl);
        mez.duration_ms = 60_000;
        let mut engine = engine_with(vec![mez]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(4), LINE, target)
            .expect("first mez");
        engine.advance(REGION, 200);
        assert!(engine.living(target).expect("target").stunned);
        assert_eq!(
            engine.find_effect(target, SpellId(4)).expect("effect").duration_ms,
            60_000
        );

        engine
            .request_cast(caster, SpellId(4), LINE, target)
            .expect("second mez");
        engine.advance(REGION, 200);
        assert_eq!(
            engine.find_effect(target, SpellId(4)).expect("effect").duration_ms,
            30_000
        );

        engine
            .request_cast(caster, SpellId(4), LINE, target)
            .expect("third mez");
        engine.advance(REGION, 200);
        assert_eq!(
            engine.find_effect(target, SpellId(4)).expect("effect").duration_ms,
            15_000
        );

        engine.advance(REGION, 16_000);
        assert!(engine.find_effect(target, SpellId(4)).is_none());
        assert!(!engine.living(target).expect("target").stunned);
    }

    #[test]
    fn concentration_budget_rejects_over_commitment() {
        let mut first = test_spell(5, SpellKind::Buff);
        first.concentration_cost = 12;
        first.frequency_ms = 4_000;
        first.base_value = 5;
        let mut second = first.clone();
        second.id = SpellId(6);
        second.name = "spell 6".to_string();
        let mut engine = engine_with(vec![first, second]);
        let caster = add_at(&mut engine, "caster", 0);
        let ally = add_at(&mut engine, "ally", 100);

        engine
            .request_cast(caster, SpellId(5), LINE, ally)
            .expect("first conc buff");
        engine.advance(REGION, 200);
        assert_eq!(engine.living(caster).expect("caster").concentration.used(), 12);

        let err = engine
            .request_cast(caster, SpellId(6), LINE, ally)
            .expect_err("over budget");
        assert_eq!(err, CastError::ConcentrationInsufficient);
    }

    #[test]
    fn concentration_effect_falls_with_its_caster() {
        let mut buff = test_spell(5, SpellKind::Buff);
        buff.concentration_cost = 5;
        buff.frequency_ms = 4_000;
        buff.base_value = 5;
        let mut engine = engine_with(vec![buff]);
        let caster = add_at(&mut engine, "caster", 0);
        let ally = add_at(&mut engine, "ally", 100);

        engine
            .request_cast(caster, SpellId(5), LINE, ally)
            .expect("conc buff");
        engine.advance(REGION, 20_000);
        assert!(engine.find_effect(ally, SpellId(5)).is_some());
        assert_eq!(engine.living(ally).expect("ally").stat_bonus, 5);

        engine.remove_living(caster);
        assert!(engine.find_effect(ally, SpellId(5)).is_none());
        let ally_ref = engine.living(ally).expect("ally");
        assert!(ally_ref.effects.is_empty());
        assert_eq!(ally_ref.stat_bonus, 0);
    }

    fn chant() -> Spell {
        let mut chant = test_spell(7, SpellKind::Chant);
        chant.frequency_ms = 3_000;
        chant.concentration_cost = 4;
        chant.radius = 1_000;
        chant.duration_ms = 20_000;
        chant.base_value = 3;
        chant
    }

    #[test]
    fn recasting_a_running_chant_stops_it() {
        let mut engine = engine_with(vec![chant()]);
        let caster = add_at(&mut engine, "bard", 0);

        let outcome = engine
            .request_cast(caster, SpellId(7), LINE, caster)
            .expect("chant starts");
        assert!(matches!(outcome, CastOutcome::Started(_)));
        engine.advance(REGION, 200);
        assert!(engine.active_chant(caster, SpellId(7)).is_some());
        assert_eq!(engine.living(caster).expect("bard").concentration.used(), 4);

        let outcome = engine
            .request_cast(caster, SpellId(7), LINE, caster)
            .expect("toggle accepted");
        assert_eq!(outcome, CastOutcome::ChantStopped);
        assert!(engine.active_chant(caster, SpellId(7)).is_none());
        assert_eq!(engine.living(caster).expect("bard").concentration.used(), 0);
    }

    #[test]
    fn chant_buffs_fade_and_return_with_range() {
        let mut engine = engine_with(vec![chant()]);
        let caster = add_at(&mut engine, "bard", 0);
        let ally = add_at(&mut engine, "ally", 500);

        engine
            .request_cast(caster, SpellId(7), LINE, caster)
            .expect("chant starts");
        engine.advance(REGION, 200);
        assert!(engine.find_effect(ally, SpellId(7)).is_some());
        assert_eq!(engine.living(ally).expect("ally").stat_bonus, 3);

        // Walk out; the next distance sweep deactivates without removing.
        engine.notify_moved(ally, Position::new(5_000, 0, 0));
        engine.advance(REGION, 6_000);
        let effect = engine.find_effect(ally, SpellId(7)).expect("still listed");
        assert!(effect.fading);
        let ally_ref = engine.living(ally).expect("ally");
        assert_eq!(ally_ref.stat_bonus, 0);
        assert_eq!(ally_ref.effects.len(), 1);

        // Walk back; the next chant pulse reactivates in place.
        engine.notify_moved(ally, Position::new(500, 0, 0));
        engine.advance(REGION, 6_000);
        let effect = engine.find_effect(ally, SpellId(7)).expect("reactivated");
        assert!(!effect.fading);
        assert_eq!(engine.living(ally).expect("ally").stat_bonus, 3);

        let events = engine.drain_events();
        assert_eq!(count_messages(&events, "fades as you move away"), 1);
    }

    fn bolt(chain_hops: u8) -> Spell {
        let mut bolt = test_spell(8, SpellKind::Bolt { chain_hops });
        bolt.base_value = 40;
        bolt.radius = 500;
        bolt
    }

    #[test]
    fn bolt_arrives_after_distance_proportional_delay() {
        let mut engine = engine_with(vec![bolt(0)]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 850);

        engine
            .request_cast(caster, SpellId(8), LINE, target)
            .expect("bolt cast");
        engine.advance(REGION, 500);
        // Committed and in flight, nothing landed yet.
        assert_eq!(engine.living(target).expect("target").health, 100);

        engine.advance(REGION, 600);
        assert_eq!(engine.living(target).expect("target").health, 60);
        let events = engine.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            WorldEvent::SpellAnimation { delay_ms: 1_001, .. }
        )));
    }

    #[test]
    fn bolt_fizzles_silently_on_a_dead_target() {
        let mut engine = engine_with(vec![bolt(0)]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 850);

        engine
            .request_cast(caster, SpellId(8), LINE, target)
            .expect("bolt cast");
        engine.advance(REGION, 500);
        engine.living_mut(target).expect("target").take_damage(1_000);
        engine.drain_events();

        engine.advance(REGION, 600);
        assert_eq!(engine.living(target).expect("target").health, 0);
        let events = engine.drain_events();
        assert_eq!(count_messages(&events, "damage"), 0);
    }

    #[test]
    fn bolt_chains_to_the_nearest_unstruck_enemy() {
        let mut engine = engine_with(vec![bolt(2)]);
        let caster = add_at(&mut engine, "caster", 0);
        let first = add_at(&mut engine, "first", 300);
        let second = add_at(&mut engine, "second", 500);

        engine
            .request_cast(caster, SpellId(8), LINE, first)
            .expect("bolt cast");
        engine.advance(REGION, 1_500);

        assert_eq!(engine.living(first).expect("first").health, 60);
        // One hop at 90% effectiveness, then no candidates remain.
        assert_eq!(engine.living(second).expect("second").health, 64);
        assert_eq!(engine.living(caster).expect("caster").health, 100);
    }

    fn los_smite() -> Spell {
        let mut spell = smite();
        spell.cast_time_ms = 1_000;
        spell.needs_los = true;
        spell
    }

    #[test]
    fn los_grant_lets_the_commit_through() {
        let mut engine = engine_with(vec![los_smite()]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("cast accepted");
        engine.advance(REGION, 400);
        let requests = engine.take_los_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].observer, caster);
        assert_eq!(requests[0].subject, target);

        engine.deliver_los(requests[0].id, true);
        engine.advance(REGION, 800);
        assert_eq!(engine.living(target).expect("target").health, 50);
    }

    #[test]
    fn los_denial_aborts_without_cost() {
        let mut engine = engine_with(vec![los_smite()]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("cast accepted");
        engine.advance(REGION, 400);
        let requests = engine.take_los_requests();
        engine.deliver_los(requests[0].id, false);
        engine.advance(REGION, 800);

        assert_eq!(engine.living(target).expect("target").health, 100);
        assert_eq!(engine.living(caster).expect("caster").power, 100);
        let events = engine.drain_events();
        assert_eq!(interrupt_reasons(&events), vec![InterruptReason::LosDenied]);
    }

    #[test]
    fn unanswered_los_times_out_at_the_commit_gate() {
        let mut engine = engine_with(vec![los_smite()]);
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("cast accepted");
        engine.advance(REGION, 10_000);

        assert_eq!(engine.living(target).expect("target").health, 100);
        assert_eq!(engine.active_cast(caster), None);
        let events = engine.drain_events();
        assert_eq!(interrupt_reasons(&events), vec![InterruptReason::LosTimeout]);
    }

    #[test]
    fn owners_may_shed_buffs_but_not_debuffs() {
        let mut buff = test_spell(3, SpellKind::Buff);
        buff.duration_ms = 30_000;
        buff.base_value = 5;
        let mut debuff = test_spell(2, SpellKind::Debuff);
        debuff.duration_ms = 30_000;
        debuff.base_value = 5;
        let mut engine = engine_with(vec![buff, debuff]);
        let caster = add_at(&mut engine, "caster", 0);
        let victim = add_at(&mut engine, "victim", 100);

        engine
            .request_cast(caster, SpellId(3), LINE, victim)
            .expect("buff cast");
        engine.advance(REGION, 200);
        engine
            .request_cast(caster, SpellId(2), LINE, victim)
            .expect("debuff cast");
        engine.advance(REGION, 200);
        let buff_id = engine.find_effect(victim, SpellId(3)).expect("buff").id;
        let debuff_id = engine.find_effect(victim, SpellId(2)).expect("debuff").id;

        assert!(engine.cancel_effect(victim, buff_id, true));
        assert!(!engine.cancel_effect(victim, debuff_id, true));
        assert!(engine.find_effect(victim, SpellId(3)).is_none());
        assert!(engine.find_effect(victim, SpellId(2)).is_some());
    }

    #[test]
    fn region_transfer_clears_casts_and_effects() {
        let mut buff = test_spell(3, SpellKind::Buff);
        buff.duration_ms = 30_000;
        buff.base_value = 5;
        let mut engine = engine_with(vec![smite(), buff]);
        engine.add_region(RegionId(2));
        let caster = add_at(&mut engine, "caster", 0);
        let target = add_at(&mut engine, "target", 100);

        engine
            .request_cast(caster, SpellId(3), LINE, caster)
            .expect("self buff");
        engine.advance(REGION, 2_200);
        engine
            .request_cast(caster, SpellId(1), LINE, target)
            .expect("attack cast");
        engine.advance(REGION, 500);

        engine
            .move_to_region(caster, RegionId(2), Position::default())
            .expect("transfer");
        assert_eq!(engine.active_cast(caster), None);
        assert!(engine.find_effect(caster, SpellId(3)).is_none());
        let caster_ref = engine.living(caster).expect("caster");
        assert_eq!(caster_ref.region, RegionId(2));
        assert!(caster_ref.effects.is_empty());
        assert_eq!(caster_ref.stat_bonus, 0);

        // Stale timers in the old region fire into nothing.
        engine.advance(REGION, 60_000);
        assert_eq!(engine.living(target).expect("target").health, 100);
    }

    #[test]
    fn restored_effect_resumes_quietly_at_partial_duration() {
        let mut buff = test_spell(3, SpellKind::Buff);
        buff.duration_ms = 20_000;
        buff.base_value = 5;
        let mut engine = engine_with(vec![buff]);
        let owner = add_at(&mut engine, "returning", 0);

        let effect_id = engine
            .restore_effect(owner, SpellId(3), LINE, 0.5, 1.0)
            .expect("restore");
        let effect = engine.effect(effect_id).expect("effect");
        assert!(effect.restored);
        assert_eq!(effect.remaining_ms(), 10_000);
        assert_eq!(engine.living(owner).expect("owner").stat_bonus, 5);
        let events = engine.drain_events();
        assert_eq!(count_messages(&events, "surrounds you"), 0);

        engine.advance(REGION, 10_100);
        assert!(engine.effect(effect_id).is_none());
        assert_eq!(engine.living(owner).expect("owner").stat_bonus, 0);
        let events = engine.drain_events();
        assert_eq!(count_messages(&events, "wears off"), 1);
    }
}
