//! Shared fixtures.

use std::sync::Arc;

use atk_core::SoundArchiveParam;
use atk_hardware::{HardwareManager, HardwareManagerParameter, SoftwareRenderer};
use atk_sound::{PlayerEntry, PlayerId, SoundArchive, SoundEntry, SoundId, SoundKindInfo};

pub fn hardware(parameter: HardwareManagerParameter) -> Arc<HardwareManager> {
    Arc::new(HardwareManager::initialize(parameter.with_sound_thread(false), Box::new(SoftwareRenderer::new())).unwrap())
}

pub fn looping_wave(name: &str, player: PlayerId, priority: i32) -> SoundEntry {
    SoundEntry {
        name: name.into(),
        player,
        param: SoundArchiveParam {
            player_priority: priority,
            ..Default::default()
        },
        kind: SoundKindInfo::Wave {
            channel_count: 1,
            length_frames: None,
        },
        is_3d: false,
    }
}

/// One player capped at `cap`, with looping waves at the given priorities.
pub fn archive(cap: usize, priorities: &[i32]) -> (SoundArchive, Vec<SoundId>) {
    let mut archive = SoundArchive::new();
    let player = archive.add_player(PlayerEntry {
        name: "se".into(),
        playable_sound_count: cap,
        ..Default::default()
    });
    let ids = priorities
        .iter()
        .enumerate()
        .map(|(i, &p)| archive.add_sound(looping_wave(&format!("s{i}"), player, p)))
        .collect();
    (archive, ids)
}
