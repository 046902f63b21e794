use crate::effects::record::EffectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectSlot {
    pub effect: EffectId,
    /// Stable per-owner id; the client keys icon slots on it, so overwrite
    /// must preserve it.
    pub internal_id: u16,
}

/// The effects currently applied to one living. Mutation happens through
/// begin/commit batches so a logical operation produces exactly one
/// client-visible update no matter how many effects it touches.
#[derive(Debug, Default, Clone)]
pub struct EffectList {
    slots: Vec<EffectSlot>,
    next_internal_id: u16,
    batch_depth: u32,
    pending_update: bool,
}

impl EffectList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_changes(&mut self) {
        self.batch_depth += 1;
    }

    /// Close a batch. Returns true when this was the outermost batch and
    /// something changed, i.e. when one update event should be emitted.
    pub fn commit_changes(&mut self) -> bool {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth == 0 && self.pending_update {
            self.pending_update = false;
            return true;
        }
        false
    }

    /// Insert an effect, assigning its internal id. Returns None when the
    /// effect is already present.
    pub fn add(&mut self, effect: EffectId) -> Option<u16> {
        if self.contains(effect) {
            return None;
        }
        self.next_internal_id = self.next_internal_id.wrapping_add(1).max(1);
        let internal_id = self.next_internal_id;
        self.slots.push(EffectSlot {
            effect,
            internal_id,
        });
        self.pending_update = true;
        Some(internal_id)
    }

    pub fn remove(&mut self, effect: EffectId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.effect != effect);
        let removed = self.slots.len() != before;
        if removed {
            self.pending_update = true;
        }
        removed
    }

    /// Record an in-place change (overwrite, fading toggle) for the next
    /// commit without touching slot order.
    pub fn mark_changed(&mut self) {
        self.pending_update = true;
    }

    pub fn contains(&self, effect: EffectId) -> bool {
        self.slots.iter().any(|slot| slot.effect == effect)
    }

    pub fn internal_id(&self, effect: EffectId) -> Option<u16> {
        self.slots
            .iter()
            .find(|slot| slot.effect == effect)
            .map(|slot| slot.internal_id)
    }

    pub fn effects(&self) -> impl Iterator<Item = EffectId> + '_ {
        self.slots.iter().map(|slot| slot.effect)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
