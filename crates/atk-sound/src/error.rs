//! Why a sound did not start.

use thiserror::Error;

/// Admission refusal. A refused sound simply does not play.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("priority too low to evict any playing sound")]
    LowPriority,

    #[error("no free player heap")]
    NotEnoughPlayerHeap,

    #[error("no free voice")]
    NotEnoughVoice,

    #[error("output receiver could not be bound")]
    InvalidReceiver,

    #[error("unknown sound player")]
    InvalidPlayer,

    #[error("unknown sound")]
    SoundNotFound,
}
