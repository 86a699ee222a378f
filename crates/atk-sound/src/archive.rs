//! Sound archive table.
//!
//! The archive is the authored data the engine plays from: a list of
//! players (admission caps, heap pools) and a list of sounds (archive-layer
//! base values, kind and player assignment). It is stored as JSON.

use std::path::Path;

use atk_core::{AtkError, Result, SoundArchiveParam};
use serde::{Deserialize, Serialize};

use crate::id::{PlayerId, SoundId};
use crate::kind::SoundKindInfo;
use crate::sound3d::Sound3DParam;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerEntry {
    pub name: String,
    pub playable_sound_count: usize,
    pub player_heap_count: usize,
    pub player_heap_size: usize,
    pub first_come_based: bool,
}

impl Default for PlayerEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            playable_sound_count: 1,
            player_heap_count: 0,
            player_heap_size: 0,
            first_come_based: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEntry {
    pub name: String,
    pub player: PlayerId,
    #[serde(default)]
    pub param: SoundArchiveParam,
    #[serde(default)]
    pub kind: SoundKindInfo,
    /// Route the sound through the 3D engine when one is installed.
    #[serde(default)]
    pub is_3d: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundArchive {
    pub players: Vec<PlayerEntry>,
    pub sounds: Vec<SoundEntry>,
    /// Settings for the 3D engine, if the archive uses one.
    pub sound_3d: Option<Sound3DParam>,
}

impl SoundArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, entry: PlayerEntry) -> PlayerId {
        self.players.push(entry);
        PlayerId(self.players.len() as u32 - 1)
    }

    pub fn add_sound(&mut self, entry: SoundEntry) -> SoundId {
        self.sounds.push(entry);
        SoundId(self.sounds.len() as u32 - 1)
    }

    pub fn sound(&self, id: SoundId) -> Option<&SoundEntry> {
        self.sounds.get(id.0 as usize)
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerEntry> {
        self.players.get(id.0 as usize)
    }

    pub fn find_sound(&self, name: &str) -> Option<SoundId> {
        self.sounds
            .iter()
            .position(|s| s.name == name)
            .map(|i| SoundId(i as u32))
    }

    pub fn find_player(&self, name: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .position(|p| p.name == name)
            .map(|i| PlayerId(i as u32))
    }

    /// Every sound must name an existing player.
    pub fn validate(&self) -> Result<()> {
        for sound in &self.sounds {
            if self.player(sound.player).is_none() {
                return Err(AtkError::InvalidParameter(format!(
                    "sound '{}' refers to unknown player {}",
                    sound.name, sound.player.0
                )));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| AtkError::Serialization(format!("Failed to serialize sound archive: {}", e)))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let archive: Self = serde_json::from_slice(data)
            .map_err(|e| AtkError::Serialization(format!("Invalid sound archive: {}", e)))?;
        archive.validate()?;
        Ok(archive)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }
}
