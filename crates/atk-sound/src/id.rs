//! Identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one playing instance. Every start gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SoundInstanceId(Uuid);

impl SoundInstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SoundInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SoundInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a sound entry in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoundId(pub u32);

/// Index of a player entry in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);
