use std::fmt;

use crate::entities::living::LivingId;
use crate::spells::handler::SpellHandler;
use crate::world::time::GameTick;
use crate::world::timer::TimerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CastId(pub u64);

/// Settle delay between commit and the after-cast bookkeeping stage.
pub const SETTLE_DELAY_MS: u64 = 100;

/// Why a cast request was refused at the pre-cast boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastError {
    UnknownCaster,
    UnknownSpell,
    UnknownTarget,
    AlreadyCasting,
    CasterDead,
    CasterSilenced,
    CasterStunned,
    TargetDead,
    TargetOutOfRange,
    TargetWrongRegion,
    PowerInsufficient,
    ConcentrationInsufficient,
    RecastBlocked { remaining_ms: u64 },
}

impl fmt::Display for CastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCaster => write!(f, "caster does not exist"),
            Self::UnknownSpell => write!(f, "spell does not exist"),
            Self::UnknownTarget => write!(f, "target does not exist"),
            Self::AlreadyCasting => write!(f, "you are already casting a spell"),
            Self::CasterDead => write!(f, "you are dead and cannot cast"),
            Self::CasterSilenced => write!(f, "you are silenced"),
            Self::CasterStunned => write!(f, "you are stunned"),
            Self::TargetDead => write!(f, "your target is dead"),
            Self::TargetOutOfRange => write!(f, "your target is out of range"),
            Self::TargetWrongRegion => write!(f, "your target is gone"),
            Self::PowerInsufficient => write!(f, "you do not have enough power"),
            Self::ConcentrationInsufficient => write!(f, "you cannot concentrate any further"),
            Self::RecastBlocked { remaining_ms } => {
                write!(f, "you must wait {} seconds", remaining_ms / 1000)
            }
        }
    }
}

/// Cast progress: strictly 0→1→2→3→4, any stage may abort early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CastStage {
    PreCast,
    Interim,
    Commit,
    PostCommit,
    Done,
}

impl CastStage {
    pub fn next(self) -> CastStage {
        match self {
            Self::PreCast => Self::Interim,
            Self::Interim => Self::Commit,
            Self::Commit => Self::PostCommit,
            Self::PostCommit | Self::Done => Self::Done,
        }
    }
}

/// Line-of-sight gate on stage 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LosState {
    NotRequired,
    Pending { request: LosRequestId },
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LosRequestId(pub u64);

/// Asynchronous visibility check handed to the external LOS service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LosRequest {
    pub id: LosRequestId,
    pub observer: LivingId,
    pub subject: LivingId,
}

/// Short-lived staged state machine for one cast attempt. Owns its stage
/// timer; destroyed after stage 4 or on abort.
#[derive(Debug)]
pub struct CastSequencer {
    pub id: CastId,
    pub target: LivingId,
    pub handler: SpellHandler,
    pub stage: CastStage,
    pub started_at: GameTick,
    pub delay_before_interim: u64,
    pub delay_before_commit: u64,
    pub timer: Option<TimerId>,
    pub los: LosState,
    /// Stage 2 fired while LOS was pending; commit on the response.
    pub waiting_on_los: bool,
}

impl CastSequencer {
    pub fn new(
        id: CastId,
        target: LivingId,
        handler: SpellHandler,
        started_at: GameTick,
        max_stage_len_ms: u64,
    ) -> Self {
        let (delay_before_interim, delay_before_commit) = handler.stage_delays(max_stage_len_ms);
        Self {
            id,
            target,
            handler,
            stage: CastStage::PreCast,
            started_at,
            delay_before_interim,
            delay_before_commit,
            timer: None,
            los: LosState::NotRequired,
            waiting_on_los: false,
        }
    }

    pub fn caster(&self) -> LivingId {
        self.handler.caster
    }

    pub fn is_done(&self) -> bool {
        self.stage == CastStage::Done
    }

    /// Interrupts only matter before commit.
    pub fn interruptible(&self) -> bool {
        self.stage < CastStage::Commit
    }

    pub fn advance_stage(&mut self) -> CastStage {
        self.stage = self.stage.next();
        self.stage
    }
}
