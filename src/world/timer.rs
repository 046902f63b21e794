use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::world::time::GameTick;

/// Handle to a scheduled timer. Ids are assigned monotonically and never
/// reused, so a stale handle held by a cancelled owner can never match a
/// live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

#[derive(Clone, Copy, Debug)]
struct HeapEntry {
    due: GameTick,
    id: TimerId,
}

/// Min-heap by due tick, ties broken by id so dispatch order is stable.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.id == other.id
    }
}

impl Eq for HeapEntry {}

/// One cooperative timer facility per region. Timers fire as discrete
/// callbacks when the owner drains `pop_ready`; cancellation removes the
/// index entry and the heap entry is lazily discarded, so a stopped timer
/// never fires.
#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<HeapEntry>,
    index: HashMap<TimerId, (GameTick, T)>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }

    /// Schedule a task `delay_ms` from `now`.
    pub fn schedule(&mut self, task: T, now: GameTick, delay_ms: u64) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let due = now.saturating_add(delay_ms);
        self.index.insert(id, (due, task));
        self.heap.push(HeapEntry { due, id });
        id
    }

    /// Stop a timer. Returns the task if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.index.remove(&id).map(|(_, task)| task)
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn due_at(&self, id: TimerId) -> Option<GameTick> {
        self.index.get(&id).map(|(due, _)| *due)
    }

    /// Due tick of the earliest live timer.
    pub fn next_due(&mut self) -> Option<GameTick> {
        loop {
            let entry = *self.heap.peek()?;
            if self.index.contains_key(&entry.id) {
                return Some(entry.due);
            }
            self.heap.pop();
        }
    }

    /// Pop the next timer that is due at or before `now`.
    pub fn pop_ready(&mut self, now: GameTick) -> Option<(TimerId, T)> {
        loop {
            let entry = *self.heap.peek()?;
            if !self.index.contains_key(&entry.id) {
                self.heap.pop();
                continue;
            }
            if entry.due > now {
                return None;
            }
            self.heap.pop();
            let (_, task) = self.index.remove(&entry.id)?;
            return Some((entry.id, task));
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_in_due_order() {
        let mut queue = TimerQueue::new();
        let now = GameTick(1000);
        queue.schedule("late", now, 500);
        queue.schedule("early", now, 100);

        assert_eq!(queue.pop_ready(GameTick(1099)), None);
        let (_, first) = queue.pop_ready(GameTick(1500)).expect("first ready");
        assert_eq!(first, "early");
        let (_, second) = queue.pop_ready(GameTick(1500)).expect("second ready");
        assert_eq!(second, "late");
        assert!(queue.is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut queue = TimerQueue::new();
        let now = GameTick(0);
        let id = queue.schedule("task", now, 100);
        assert_eq!(queue.cancel(id), Some("task"));
        assert_eq!(queue.cancel(id), None);
        assert_eq!(queue.pop_ready(GameTick(10_000)), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn same_due_tick_fires_in_schedule_order() {
        let mut queue = TimerQueue::new();
        let now = GameTick(0);
        queue.schedule(1u32, now, 50);
        queue.schedule(2u32, now, 50);
        queue.schedule(3u32, now, 50);

        let mut fired = Vec::new();
        while let Some((_, task)) = queue.pop_ready(GameTick(50)) {
            fired.push(task);
        }
        assert_eq!(fired, vec![1, 2, 3]);
    }

    #[test]
    fn next_due_skips_cancelled_entries() {
        let mut queue = TimerQueue::new();
        let now = GameTick(0);
        let early = queue.schedule("early", now, 10);
        queue.schedule("late", now, 20);
        queue.cancel(early);
        assert_eq!(queue.next_due(), Some(GameTick(20)));
    }
}
