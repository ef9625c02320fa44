use thiserror::Error;

use crate::synth::KeyId;
use crate::timing::GroupId;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SchedulerError {
    #[error("tempo must be a positive finite bpm, got {0}")]
    InvalidBpm(f64),
    #[error("item timing is malformed: {0}")]
    MalformedItem(&'static str),
    #[error("unknown group {0:?}")]
    UnknownGroup(GroupId),
    #[error("no item at index {0}")]
    UnknownItem(usize),
    #[error("group {0:?} is still referenced by a parent")]
    GroupStillReferenced(GroupId),
    #[error("group graph contains a cycle through {0:?}")]
    GroupCycle(GroupId),
    #[error("unknown key {0:?}")]
    UnknownKey(KeyId),
    #[error("unknown oscillator")]
    UnknownOsc,
    #[error("a key needs at least one block")]
    EmptyKey,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
