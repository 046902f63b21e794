use crate::cast::bolt::BoltId;
use crate::cast::sequencer::CastId;
use crate::effects::pulsing::PulseId;
use crate::effects::range_monitor::MonitorId;
use crate::effects::record::EffectId;
use crate::world::time::{GameTick, RegionClock};
use crate::world::timer::TimerQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub u16);

/// Work a region timer performs when it elapses. Timers carry ids, never
/// references into game state; dispatch re-resolves the id and drops the
/// task silently when the owner is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTask {
    CastStage(CastId),
    EffectTick(EffectId),
    PulseTick(PulseId),
    BoltArrival(BoltId),
    RangeCheck(MonitorId),
    LosTimeout(CastId),
}

/// One spatial simulation domain. Owns a logical clock and the timer queue
/// every entity in the region schedules against; two timers of the same
/// region never run concurrently.
#[derive(Debug)]
pub struct Region {
    pub id: RegionId,
    pub clock: RegionClock,
    pub timers: TimerQueue<TimerTask>,
}

impl Region {
    pub fn new(id: RegionId) -> Self {
        Self {
            id,
            clock: RegionClock::new(),
            timers: TimerQueue::new(),
        }
    }

    pub fn now(&self) -> GameTick {
        self.clock.now()
    }
}
