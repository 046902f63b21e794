use std::time::Duration;

/// Region-local time in milliseconds since the region clock started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameTick(pub u64);

impl GameTick {
    pub fn saturating_add(self, ms: u64) -> GameTick {
        GameTick(self.0.saturating_add(ms))
    }

    pub fn saturating_sub(self, other: GameTick) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

/// Logical clock owned by one region. All timers in the region are scheduled
/// against this clock; it only moves when the region is explicitly advanced.
#[derive(Debug, Clone)]
pub struct RegionClock {
    now: GameTick,
}

impl Default for RegionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionClock {
    pub fn new() -> Self {
        Self { now: GameTick(0) }
    }

    pub fn now(&self) -> GameTick {
        self.now
    }

    pub fn advance(&mut self, ms: u64) -> GameTick {
        self.now = self.now.saturating_add(ms);
        self.now
    }

    pub fn advance_duration(&mut self, duration: Duration) -> GameTick {
        let ms = duration.as_millis().min(u64::MAX as u128) as u64;
        self.advance(ms)
    }
}

/// Recast delay bookkeeping for one spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    ready_at: GameTick,
}

impl Cooldown {
    pub fn new(ready_at: GameTick) -> Self {
        Self { ready_at }
    }

    pub fn from_now(now: GameTick, delay_ms: u64) -> Self {
        Self {
            ready_at: now.saturating_add(delay_ms),
        }
    }

    pub fn ready_at(&self) -> GameTick {
        self.ready_at
    }

    pub fn is_ready(&self, now: GameTick) -> bool {
        now >= self.ready_at
    }

    pub fn remaining_ms(&self, now: GameTick) -> u64 {
        self.ready_at.saturating_sub(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_monotonically() {
        let mut clock = RegionClock::new();
        assert_eq!(clock.now(), GameTick(0));
        clock.advance(250);
        clock.advance(750);
        assert_eq!(clock.now(), GameTick(1000));
    }

    #[test]
    fn cooldown_ready_after_delay() {
        let cooldown = Cooldown::from_now(GameTick(1000), 500);
        assert!(!cooldown.is_ready(GameTick(1499)));
        assert!(cooldown.is_ready(GameTick(1500)));
        assert_eq!(cooldown.remaining_ms(GameTick(1200)), 300);
        assert_eq!(cooldown.remaining_ms(GameTick(2000)), 0);
    }
}
