//! The scripted demo scene.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use atk_core::constants::SOUND_FRAME_INTERVAL_USEC;
use atk_core::{AuxBus, SoundArchiveParam};
use atk_hardware::{HardwareManager, SoundThread};
use atk_sound::{
    PlayerEntry, Sound3DParam, SoundActor, SoundArchive, SoundEntry, SoundHandle, SoundKindInfo,
    SoundStartInfo, SoundSystem, SoundSystemFrameCallback,
};
use glam::Vec3;
use parking_lot::Mutex;
use tracing::{info, warn};

/// Frames allowed for the reset fade and pool detach.
const RESET_TIMEOUT_FRAMES: u32 = 200;

pub fn demo_archive() -> SoundArchive {
    let mut archive = SoundArchive::new();
    let bgm = archive.add_player(PlayerEntry {
        name: "bgm".into(),
        playable_sound_count: 1,
        player_heap_count: 1,
        player_heap_size: 4096,
        ..Default::default()
    });
    let se = archive.add_player(PlayerEntry {
        name: "se".into(),
        playable_sound_count: 2,
        ..Default::default()
    });
    let ambience = archive.add_player(PlayerEntry {
        name: "ambience".into(),
        playable_sound_count: 4,
        ..Default::default()
    });

    archive.add_sound(SoundEntry {
        name: "bgm_field".into(),
        player: bgm,
        param: SoundArchiveParam {
            volume: 0.8,
            player_priority: 100,
            ..Default::default()
        },
        kind: SoundKindInfo::Sequence {
            voice_count: 4,
            length_frames: None,
            priority_offset: 8,
        },
        is_3d: false,
    });
    for (name, priority) in [("se_step", 20), ("se_jump", 50), ("se_coin", 40)] {
        archive.add_sound(SoundEntry {
            name: name.into(),
            player: se,
            param: SoundArchiveParam {
                player_priority: priority,
                ..Default::default()
            },
            kind: SoundKindInfo::Wave {
                channel_count: 1,
                length_frames: Some(60),
            },
            is_3d: false,
        });
    }
    archive.add_sound(SoundEntry {
        name: "amb_river".into(),
        player: ambience,
        param: SoundArchiveParam::default(),
        kind: SoundKindInfo::Stream {
            track_count: 2,
            channel_count: 2,
            prefetch_frames: 4,
            length_frames: None,
        },
        is_3d: true,
    });
    archive.sound_3d = Some(Sound3DParam::default());
    archive
}

pub struct Scene {
    hardware: Arc<HardwareManager>,
    system: Arc<Mutex<SoundSystem>>,
    thread: Option<SoundThread>,
}

impl Scene {
    pub fn new(hardware: Arc<HardwareManager>, archive: SoundArchive) -> Result<Self> {
        let system = Arc::new(Mutex::new(SoundSystem::new(hardware.clone(), archive)));
        let thread = SoundThread::spawn(hardware.clone())?;
        match &thread {
            Some(t) => t.register_callback(Box::new(SoundSystemFrameCallback(system.clone()))),
            None => info!("Driving audio frames from the main thread"),
        }
        Ok(Self {
            hardware,
            system,
            thread,
        })
    }

    /// Let `frames` audio frames pass.
    fn wait_frames(&self, frames: u32) -> Result<()> {
        match &self.thread {
            Some(_) => std::thread::sleep(Duration::from_micros(u64::from(frames) * SOUND_FRAME_INTERVAL_USEC)),
            None => {
                for _ in 0..frames {
                    self.system.lock().run_frame()?;
                }
            }
        }
        Ok(())
    }

    fn start(&self, handle: &mut SoundHandle, name: &str, info: &SoundStartInfo) {
        let mut system = self.system.lock();
        let Some(id) = system.archive().find_sound(name) else {
            warn!(name, "Sound not in archive");
            return;
        };
        match system.start_sound(handle, id, info) {
            Ok(()) => info!(name, "Started"),
            Err(e) => info!(name, reason = %e, "Not started"),
        }
    }

    pub fn play(&mut self) -> Result<()> {
        let mut bgm = SoundHandle::new();
        self.start(
            &mut bgm,
            "bgm_field",
            &SoundStartInfo {
                fade_in_frames: 20,
                ..Default::default()
            },
        );
        bgm.set_effect_send(AuxBus::A, 0.3);
        self.wait_frames(40)?;

        // A moving 3D source.
        let river = SoundActor::new();
        river.set_position(Some(Vec3::new(-20.0, 0.0, -5.0)));
        let mut amb = SoundHandle::new();
        self.start(
            &mut amb,
            "amb_river",
            &SoundStartInfo {
                actor: Some(river.clone()),
                ..Default::default()
            },
        );
        for step in 0..10 {
            river.set_position(Some(Vec3::new(-20.0 + step as f32 * 4.0, 0.0, -5.0)));
            self.wait_frames(4)?;
        }
        amb.set_track_volume(0b10, 0.0, 30);

        // Three effects into a player capped at two.
        let mut steps = [SoundHandle::new(), SoundHandle::new(), SoundHandle::new()];
        for (handle, name) in steps.iter_mut().zip(["se_step", "se_jump", "se_coin"]) {
            self.start(handle, name, &SoundStartInfo::default());
            self.wait_frames(2)?;
        }
        info!(evicted = !steps[0].is_attached(), "Effect admission");

        // Pause everything briefly, then fade out.
        {
            let system = self.system.lock();
            system.pause_all_sound(true, 10);
        }
        self.wait_frames(20)?;
        {
            let system = self.system.lock();
            system.pause_all_sound(false, 10);
            info!(playing = system.playing_sound_count(), "Resumed");
        }
        self.wait_frames(20)?;
        self.system.lock().stop_all_sound(30);
        self.wait_frames(40)?;
        info!(playing = self.system.lock().playing_sound_count(), "Scene done");
        Ok(())
    }

    /// Fade the master out, detach pools and stop the sound thread.
    pub fn shutdown(mut self) -> Result<()> {
        self.hardware.prepare_reset();
        let mut waited = 0;
        while !self.hardware.is_reset_ready() {
            if waited == RESET_TIMEOUT_FRAMES {
                bail!("reset not ready after {} frames", RESET_TIMEOUT_FRAMES);
            }
            self.wait_frames(1)?;
            waited += 1;
        }
        self.hardware.complete_reset()?;
        info!(frames = waited, "Reset complete");

        if let Some(thread) = self.thread.take() {
            thread.shutdown();
        }
        self.system.lock().finalize();
        Ok(())
    }
}
