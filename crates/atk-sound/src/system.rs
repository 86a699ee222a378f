//! Sound system frame driver.
//!
//! `SoundSystem` owns the players built from the archive and drives every
//! sound once per audio frame: merge the layers of each sound, then take
//! the renderer lock once to commit voice parameters, and finally release
//! whatever stopped.

use std::sync::Arc;

use atk_hardware::{HardwareManager, OutputReceiver, SoundFrameCallback};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::actor::SoundActor;
use crate::ambient::AmbientInfo;
use crate::archive::SoundArchive;
use crate::basic_sound::{BasicSound, HandleSlot, SharedSound, VoiceList};
use crate::error::StartError;
use crate::handle::SoundHandle;
use crate::id::{PlayerId, SoundId};
use crate::kind::SoundKind;
use crate::player::SoundPlayer;
use crate::sound3d::Sound3DManager;

/// Per-start options.
#[derive(Default)]
pub struct SoundStartInfo {
    pub fade_in_frames: u32,
    /// Player override. `None` uses the archive entry's player.
    pub player: Option<PlayerId>,
    /// Output receiver. `None` uses the hardware default.
    pub receiver: Option<OutputReceiver>,
    pub actor: Option<SoundActor>,
    /// Ambient callbacks. Overrides the 3D engine for 3D sounds.
    pub ambient: Option<AmbientInfo>,
    /// Fade applied when a held sound is released.
    pub hold_fade_out_frames: u32,
}

pub struct SoundSystem {
    hardware: Arc<HardwareManager>,
    archive: SoundArchive,
    players: Vec<SoundPlayer>,
    sound_3d: Option<Arc<Sound3DManager>>,
    finalized: bool,
}

impl SoundSystem {
    pub fn new(hardware: Arc<HardwareManager>, archive: SoundArchive) -> Self {
        let players = archive
            .players
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let mut player = SoundPlayer::new(PlayerId(i as u32), entry.name.clone(), entry.playable_sound_count);
                player.set_first_come_based(entry.first_come_based);
                if entry.player_heap_count > 0 {
                    player.create_player_heaps(entry.player_heap_count, entry.player_heap_size);
                }
                player
            })
            .collect::<Vec<_>>();
        let sound_3d = archive.sound_3d.map(|p| Arc::new(Sound3DManager::new(p)));
        info!(
            players = players.len(),
            sounds = archive.sounds.len(),
            sound_3d = sound_3d.is_some(),
            "Sound system created"
        );
        Self {
            hardware,
            archive,
            players,
            sound_3d,
            finalized: false,
        }
    }

    pub fn hardware(&self) -> &Arc<HardwareManager> {
        &self.hardware
    }

    pub fn archive(&self) -> &SoundArchive {
        &self.archive
    }

    pub fn sound_3d_manager(&self) -> Option<&Arc<Sound3DManager>> {
        self.sound_3d.as_ref()
    }

    /// Install or remove the 3D engine. Sounds already playing keep the
    /// ambient callbacks they started with.
    pub fn set_sound_3d_manager(&mut self, manager: Option<Arc<Sound3DManager>>) {
        self.sound_3d = manager;
    }

    pub fn player(&self, id: PlayerId) -> Option<&SoundPlayer> {
        self.players.get(id.0 as usize)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut SoundPlayer> {
        self.players.get_mut(id.0 as usize)
    }

    pub fn players(&self) -> &[SoundPlayer] {
        &self.players
    }

    // ── Starting ────────────────────────────────────────────────

    /// Start `sound` and attach `handle` to it.
    pub fn start_sound(&mut self, handle: &mut SoundHandle, sound: SoundId, info: &SoundStartInfo) -> Result<(), StartError> {
        self.start_impl(handle, sound, info, HandleSlot::General, true)
    }

    /// Like `start_sound`, but the sound waits for `SoundHandle::start_prepared`.
    pub fn prepare_sound(&mut self, handle: &mut SoundHandle, sound: SoundId, info: &SoundStartInfo) -> Result<(), StartError> {
        self.start_impl(handle, sound, info, HandleSlot::General, false)
    }

    /// Keep `sound` playing for as long as this is called every frame.
    ///
    /// The first call starts the sound through the temporary handle slot.
    /// Each later call renews its auto-stop counter; one frame without a call
    /// stops it with `info.hold_fade_out_frames`.
    pub fn hold_sound(&mut self, handle: &mut SoundHandle, sound: SoundId, info: &SoundStartInfo) -> Result<(), StartError> {
        if handle.sound_id() == Some(sound) && handle.renew_auto_stop(1, info.hold_fade_out_frames) {
            return Ok(());
        }
        self.start_impl(handle, sound, info, HandleSlot::TempGeneral, true)?;
        handle.renew_auto_stop(1, info.hold_fade_out_frames);
        Ok(())
    }

    fn start_impl(
        &mut self,
        handle: &mut SoundHandle,
        sound_id: SoundId,
        info: &SoundStartInfo,
        slot: HandleSlot,
        start: bool,
    ) -> Result<(), StartError> {
        handle.detach();
        if self.finalized {
            warn!("start_sound after finalize");
            return Err(StartError::InvalidPlayer);
        }

        let entry = self.archive.sound(sound_id).ok_or(StartError::SoundNotFound)?;
        let player_id = info.player.unwrap_or(entry.player);
        let player_index = player_id.0 as usize;
        if player_index >= self.players.len() {
            return Err(StartError::InvalidPlayer);
        }

        let mut sound = BasicSound::new(sound_id, player_id, entry.param, SoundKind::from_info(&entry.kind));
        match (&info.ambient, &self.sound_3d) {
            (Some(ambient), _) => sound.set_ambient_info(ambient.clone()),
            (None, Some(manager)) if entry.is_3d => sound.set_ambient_info(manager.ambient_info()),
            _ => {}
        }

        // Admission sees the ambient priority delta, as every later frame will.
        let position = info.actor.as_ref().and_then(SoundActor::position);
        let priority = sound.init_player_priority(position);
        if !self.players[player_index].can_play_sound(priority) {
            trace!(sound = sound_id.0, priority, "Start refused by player");
            return Err(StartError::LowPriority);
        }

        sound.fade_in(info.fade_in_frames);
        let receiver = info.receiver.unwrap_or_else(|| self.hardware.default_receiver());
        if !sound.initialize(receiver, &self.hardware) {
            return Err(StartError::InvalidReceiver);
        }
        let instance = sound.id();
        let needs_heap = sound.kind().needs_player_heap();
        let voice_count = sound.kind().voice_count();
        let voice_priority = sound.kind().voice_priority(sound.priority());
        let shared: SharedSound = Arc::new(Mutex::new(sound));

        // Admission. An evicted sound stays evicted even if a later step fails.
        let evicted = match self.players[player_index].append_sound(shared.clone()) {
            Ok(evicted) => evicted,
            Err(e) => {
                self.finalize_sounds(vec![shared]);
                return Err(e);
            }
        };
        if let Some(evicted) = evicted {
            self.finalize_sounds(vec![evicted]);
        }

        if needs_heap {
            match self.players[player_index].alloc_player_heap() {
                Some(heap) => shared.lock().attach_player_heap(heap),
                None => {
                    debug!(sound = %instance, "No free player heap");
                    self.players[player_index].remove_sound(instance);
                    self.finalize_sounds(vec![shared]);
                    return Err(StartError::NotEnoughPlayerHeap);
                }
            }
        }

        let voices = {
            let mut renderer = self.hardware.lock_renderer();
            let mut voices = VoiceList::new();
            while voices.len() < voice_count {
                match renderer.alloc_voice(voice_priority) {
                    Some(voice) => voices.push(voice),
                    None => break,
                }
            }
            // With voice drop on, a later allocation may have taken an
            // earlier voice of this same sound.
            let complete = voices.len() == voice_count && voices.iter().all(|&v| renderer.is_voice_valid(v));
            if !complete {
                for voice in voices {
                    renderer.free_voice(voice);
                }
                None
            } else {
                Some(voices)
            }
        };
        match voices {
            Some(voices) => shared.lock().set_voices(voices),
            None => {
                debug!(sound = %instance, voice_count, "No free voice");
                self.players[player_index].remove_sound(instance);
                self.finalize_sounds(vec![shared]);
                return Err(StartError::NotEnoughVoice);
            }
        }

        handle.attach(&shared, slot);
        if let Some(actor) = &info.actor {
            actor.attach_sound(&shared);
        }
        if start {
            shared.lock().start_prepared();
        }
        debug!(
            sound = %instance,
            id = sound_id.0,
            player = player_id.0,
            priority,
            voices = voice_count,
            "Sound admitted"
        );
        Ok(())
    }

    // ── Frame ───────────────────────────────────────────────────

    /// Advance every sound by one audio frame and commit the voices.
    pub fn update(&mut self) {
        if self.finalized {
            return;
        }

        let mut finished = Vec::new();
        for player in &mut self.players {
            let overlay = *player.param();
            let mut resort = false;
            for sound in player.sounds() {
                resort |= sound.lock().update(&overlay).priority_changed;
            }
            if resort {
                player.sort_priority_list();
            }
            finished.extend(player.take_stopped());
        }

        let mut dropped = Vec::new();
        {
            let mut renderer = self.hardware.lock_renderer();
            for player in &self.players {
                for sound in player.sounds() {
                    let mut s = sound.lock();
                    if s.voices().iter().any(|&v| !renderer.is_voice_valid(v)) {
                        debug!(sound = %s.id(), "Voice dropped, stopping sound");
                        s.force_stop();
                        dropped.push((s.player_id(), s.id()));
                        continue;
                    }
                    for (voice, param) in s.voice_params() {
                        renderer.set_voice_param(voice, param);
                    }
                }
            }
        }

        for (player_id, instance) in dropped {
            if let Some(sound) = self
                .player_mut(player_id)
                .and_then(|p| p.remove_sound(instance))
            {
                finished.push(sound);
            }
        }
        if !finished.is_empty() {
            trace!(count = finished.len(), "Releasing stopped sounds");
            self.finalize_sounds(finished);
        }
    }

    /// `update` followed by one hardware frame. For callers that drive
    /// frames without the sound thread.
    pub fn run_frame(&mut self) -> atk_core::Result<bool> {
        self.update();
        self.hardware.execute_audio_renderer_rendering()
    }

    /// Release voices, heaps, receiver bindings and ambient args, then run
    /// the stop callbacks. The sounds must already be out of the players.
    fn finalize_sounds(&mut self, sounds: Vec<SharedSound>) {
        let released: Vec<_> = sounds
            .into_iter()
            .filter_map(|sound| {
                let mut s = sound.lock();
                let player = s.player_id();
                s.finalize().map(|r| (player, r))
            })
            .collect();

        if released.iter().any(|(_, r)| !r.voices.is_empty()) {
            let mut renderer = self.hardware.lock_renderer();
            for (_, r) in &released {
                for &voice in &r.voices {
                    renderer.free_voice(voice);
                }
            }
        }

        for (player, r) in released {
            if let Some(receiver) = r.receiver {
                self.hardware.unbind_receiver(receiver);
            }
            if let Some(heap) = r.heap {
                if let Some(p) = self.players.get_mut(player.0 as usize) {
                    p.free_player_heap(heap);
                }
            }
            if let Some(callback) = r.callback {
                callback(r.id);
            }
        }
    }

    // ── Group control ───────────────────────────────────────────

    pub fn stop_all_sound(&self, fade_frames: u32) {
        for player in &self.players {
            player.stop_all_sound(fade_frames);
        }
    }

    pub fn pause_all_sound(&self, flag: bool, fade_frames: u32) {
        for player in &self.players {
            player.pause_all_sound(flag, fade_frames);
        }
    }

    pub fn playing_sound_count(&self) -> usize {
        self.players.iter().map(SoundPlayer::playing_sound_count).sum()
    }

    /// Change a player's cap. Sounds over the new cap are released now.
    pub fn set_playable_sound_count(&mut self, player: PlayerId, count: usize) -> bool {
        let Some(p) = self.player_mut(player) else {
            debug_assert!(false, "unknown player {}", player.0);
            warn!(player = player.0, "set_playable_sound_count on unknown player");
            return false;
        };
        let removed = p.set_playable_sound_count(count);
        self.finalize_sounds(removed);
        true
    }

    /// Stop and release every sound. Idempotent.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        let mut all = Vec::new();
        for player in &mut self.players {
            let ids: Vec<_> = player.sounds().map(|s| s.lock().id()).collect();
            all.extend(ids.into_iter().filter_map(|id| player.remove_sound(id)));
        }
        self.finalize_sounds(all);
        self.finalized = true;
        info!("Sound system finalized");
    }
}

impl Drop for SoundSystem {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// Runs `SoundSystem::update` at the start of every sound thread frame.
pub struct SoundSystemFrameCallback(pub Arc<Mutex<SoundSystem>>);

impl SoundFrameCallback for SoundSystemFrameCallback {
    fn on_begin_sound_frame(&mut self) {
        self.0.lock().update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{PlayerEntry, SoundEntry};
    use crate::kind::SoundKindInfo;
    use crate::state::PlayerState;
    use atk_core::constants::PLAYER_PRIORITY_MAX;
    use atk_core::SoundArchiveParam;
    use atk_hardware::{HardwareManagerParameter, SoftwareRenderer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hardware(voices: usize) -> Arc<HardwareManager> {
        Arc::new(
            HardwareManager::initialize(
                HardwareManagerParameter::default()
                    .with_sound_thread(false)
                    .with_voice_count_max(voices),
                Box::new(SoftwareRenderer::new()),
            )
            .unwrap(),
        )
    }

    fn wave(name: &str, player: PlayerId, priority: i32) -> SoundEntry {
        SoundEntry {
            name: name.into(),
            player,
            param: SoundArchiveParam {
                player_priority: priority,
                ..Default::default()
            },
            kind: SoundKindInfo::default(),
            is_3d: false,
        }
    }

    fn archive() -> SoundArchive {
        let mut a = SoundArchive::new();
        let se = a.add_player(PlayerEntry {
            name: "se".into(),
            playable_sound_count: 2,
            ..Default::default()
        });
        let seq = a.add_player(PlayerEntry {
            name: "seq".into(),
            playable_sound_count: 4,
            player_heap_count: 1,
            player_heap_size: 256,
            ..Default::default()
        });
        a.add_sound(wave("low", se, 0));
        a.add_sound(wave("high", se, 5));
        a.add_sound(wave("mid", se, 3));
        a.add_sound(SoundEntry {
            name: "song".into(),
            player: seq,
            param: SoundArchiveParam::default(),
            kind: SoundKindInfo::Sequence {
                voice_count: 2,
                length_frames: None,
                priority_offset: 0,
            },
            is_3d: false,
        });
        a
    }

    #[test]
    fn test_start_commits_voices() {
        let hw = hardware(16);
        let mut system = SoundSystem::new(hw.clone(), archive());
        let mut handle = SoundHandle::new();
        system
            .start_sound(&mut handle, SoundId(0), &SoundStartInfo::default())
            .unwrap();
        assert!(handle.is_attached());
        assert_eq!(hw.active_voice_count(), 1);

        system.update();
        assert_eq!(handle.player_state(), Some(PlayerState::Play));
        let calc = handle.calculation_values().unwrap();
        let renderer = hw.lock_renderer();
        let sound = system.players()[0].sounds().next().unwrap().lock();
        let committed = renderer.voice_param(sound.voices()[0]).unwrap();
        assert_eq!(committed.param, calc.result);
        assert!(!committed.paused);
    }

    #[test]
    fn test_unknown_sound_and_player() {
        let mut system = SoundSystem::new(hardware(16), archive());
        let mut handle = SoundHandle::new();
        assert_eq!(
            system.start_sound(&mut handle, SoundId(99), &SoundStartInfo::default()),
            Err(StartError::SoundNotFound)
        );
        let info = SoundStartInfo {
            player: Some(PlayerId(9)),
            ..Default::default()
        };
        assert_eq!(
            system.start_sound(&mut handle, SoundId(0), &info),
            Err(StartError::InvalidPlayer)
        );
    }

    #[test]
    fn test_eviction_releases_voice() {
        let hw = hardware(16);
        let mut system = SoundSystem::new(hw.clone(), archive());
        let mut a = SoundHandle::new();
        let mut b = SoundHandle::new();
        let mut c = SoundHandle::new();
        let info = SoundStartInfo::default();
        system.start_sound(&mut a, SoundId(0), &info).unwrap();
        system.start_sound(&mut b, SoundId(1), &info).unwrap();
        system.start_sound(&mut c, SoundId(2), &info).unwrap();
        assert!(!a.is_attached());
        assert!(b.is_attached() && c.is_attached());
        assert_eq!(hw.active_voice_count(), 2);

        let mut d = SoundHandle::new();
        assert_eq!(system.start_sound(&mut d, SoundId(0), &info), Err(StartError::LowPriority));
        assert_eq!(hw.active_voice_count(), 2);
    }

    #[test]
    fn test_player_heap_exhaustion() {
        let hw = hardware(16);
        let mut system = SoundSystem::new(hw.clone(), archive());
        let info = SoundStartInfo::default();
        let mut first = SoundHandle::new();
        system.start_sound(&mut first, SoundId(3), &info).unwrap();
        let mut second = SoundHandle::new();
        assert_eq!(
            system.start_sound(&mut second, SoundId(3), &info),
            Err(StartError::NotEnoughPlayerHeap)
        );
        assert_eq!(system.player(PlayerId(1)).unwrap().playing_sound_count(), 1);
        assert_eq!(hw.active_voice_count(), 2);

        first.stop(0);
        system.update();
        assert_eq!(system.player(PlayerId(1)).unwrap().free_player_heap_count(), 1);
        system.start_sound(&mut second, SoundId(3), &info).unwrap();
    }

    #[test]
    fn test_not_enough_voice_rolls_back() {
        let hw = hardware(1);
        let mut system = SoundSystem::new(hw.clone(), archive());
        let mut handle = SoundHandle::new();
        assert_eq!(
            system.start_sound(&mut handle, SoundId(3), &SoundStartInfo::default()),
            Err(StartError::NotEnoughVoice)
        );
        assert_eq!(hw.active_voice_count(), 0);
        assert_eq!(system.playing_sound_count(), 0);
        assert_eq!(system.player(PlayerId(1)).unwrap().free_player_heap_count(), 1);
    }

    #[test]
    fn test_prepare_then_start() {
        let mut system = SoundSystem::new(hardware(16), archive());
        let mut handle = SoundHandle::new();
        system
            .prepare_sound(&mut handle, SoundId(0), &SoundStartInfo::default())
            .unwrap();
        system.update();
        assert!(handle.is_prepared());
        assert_eq!(handle.player_state(), Some(PlayerState::Init));
        handle.start_prepared();
        assert_eq!(handle.player_state(), Some(PlayerState::Play));
    }

    #[test]
    fn test_hold_sound_stops_without_renewal() {
        let mut system = SoundSystem::new(hardware(16), archive());
        let mut handle = SoundHandle::new();
        let info = SoundStartInfo::default();
        for _ in 0..5 {
            system.hold_sound(&mut handle, SoundId(1), &info).unwrap();
            system.update();
        }
        assert_eq!(system.playing_sound_count(), 1);
        let id = handle.id();

        system.update();
        system.update();
        assert_eq!(system.playing_sound_count(), 0);
        assert!(!handle.is_attached());
        assert!(id.is_some());
    }

    #[test]
    fn test_stop_callback_runs_on_release() {
        let mut system = SoundSystem::new(hardware(16), archive());
        let mut handle = SoundHandle::new();
        system
            .start_sound(&mut handle, SoundId(1), &SoundStartInfo::default())
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        handle.set_stop_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        system.stop_all_sound(0);
        system.update();
        system.update();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_voice_drop_force_stops_victim() {
        let hw = Arc::new(
            HardwareManager::initialize(
                HardwareManagerParameter::default()
                    .with_sound_thread(false)
                    .with_voice_count_max(1)
                    .with_voice_drop(true),
                Box::new(SoftwareRenderer::new()),
            )
            .unwrap(),
        );
        let mut system = SoundSystem::new(hw.clone(), archive());
        let mut victim = SoundHandle::new();
        system
            .start_sound(&mut victim, SoundId(0), &SoundStartInfo::default())
            .unwrap();
        system.update();

        // A voice taken from outside the system at a higher priority.
        let stolen = hw.alloc_voice(PLAYER_PRIORITY_MAX).unwrap();
        system.update();
        assert!(!victim.is_attached());
        assert_eq!(system.playing_sound_count(), 0);
        assert!(hw.lock_renderer().is_voice_valid(stolen));
        assert_eq!(hw.active_voice_count(), 1);
    }

    #[test]
    fn test_actor_and_receiver_released_on_finalize() {
        let hw = hardware(16);
        let mut system = SoundSystem::new(hw.clone(), archive());
        let actor = SoundActor::new();
        let info = SoundStartInfo {
            actor: Some(actor.clone()),
            ..Default::default()
        };
        let mut a = SoundHandle::new();
        let mut b = SoundHandle::new();
        system.start_sound(&mut a, SoundId(1), &info).unwrap();
        system.start_sound(&mut b, SoundId(2), &info).unwrap();
        assert_eq!(actor.playing_sound_count(), 2);

        system.finalize();
        assert_eq!(actor.playing_sound_count(), 0);
        assert_eq!(hw.active_voice_count(), 0);
        assert!(!a.is_attached());
        system.finalize();
    }

    #[test]
    fn test_shrink_playable_count() {
        let hw = hardware(16);
        let mut system = SoundSystem::new(hw.clone(), archive());
        let info = SoundStartInfo::default();
        let mut a = SoundHandle::new();
        let mut b = SoundHandle::new();
        system.start_sound(&mut a, SoundId(0), &info).unwrap();
        system.start_sound(&mut b, SoundId(1), &info).unwrap();
        assert!(system.set_playable_sound_count(PlayerId(0), 1));
        assert!(!a.is_attached());
        assert!(b.is_attached());
        assert_eq!(hw.active_voice_count(), 1);
    }
}
