use crate::cast::sequencer::CastId;
use crate::entities::living::LivingId;
use crate::spells::spell::SpellId;

/// Chat channel classification, mirrored from the client protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Spell,
    SpellResisted,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    CasterDead,
    CasterAttacked,
    CasterMoved,
    CasterSilenced,
    TargetInvalid,
    TargetDead,
    TargetOutOfRange,
    PowerInsufficient,
    ConcentrationExhausted,
    RecastBlocked,
    LosDenied,
    LosTimeout,
    Cancelled,
}

/// Everything the engine tells the presentation layer. Fire-and-forget:
/// the engine appends, callers drain and broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    CastStarted {
        cast: CastId,
        caster: LivingId,
        spell: SpellId,
    },
    /// Cast animation to observers; delay is playback time in ms.
    CastAnimation {
        caster: LivingId,
        client_effect: u16,
        duration_ms: u64,
    },
    CastInterrupted {
        cast: CastId,
        caster: LivingId,
        spell: SpellId,
        reason: InterruptReason,
    },
    CastFinished {
        cast: CastId,
        caster: LivingId,
        spell: SpellId,
    },
    /// Spell impact animation; bolts carry their travel delay here.
    SpellAnimation {
        caster: LivingId,
        target: LivingId,
        client_effect: u16,
        delay_ms: u64,
        success: bool,
    },
    /// Exactly one per logical change batch on an owner's effect list.
    EffectBarUpdate {
        owner: LivingId,
    },
    Message {
        to: LivingId,
        kind: MessageKind,
        text: String,
    },
}

/// Append-only event log drained by the broadcast layer.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<WorldEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: WorldEvent) {
        self.events.push(event);
    }

    pub fn message(&mut self, to: LivingId, kind: MessageKind, text: impl Into<String>) {
        self.events.push(WorldEvent::Message {
            to,
            kind,
            text: text.into(),
        });
    }

    pub fn drain(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
