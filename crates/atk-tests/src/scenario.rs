//! End-to-end scenarios through the sound system.

use std::any::Any;
use std::sync::Arc;

use atk_core::{OutputDevice, SoundAmbientParam};
use atk_hardware::HardwareManagerParameter;
use atk_sound::{
    AmbientInfo, AmbientParamUpdate, AmbientSoundInfo, MuteState, PauseState, PlayerState, Sound3DParam,
    SoundActor, SoundHandle, SoundStartInfo, SoundSystem, StartError,
};
use glam::Vec3;
use proptest::prelude::*;

use crate::common::{archive, hardware, looping_wave};

/// Ambient provider that only shifts priority.
struct PriorityShift(i32);

impl AmbientParamUpdate for PriorityShift {
    fn update_ambient_param(
        &self,
        _arg: Option<&(dyn Any + Send)>,
        _sound: &AmbientSoundInfo,
        _param: &mut SoundAmbientParam,
    ) {
    }

    fn ambient_priority(&self, _arg: Option<&(dyn Any + Send)>, _sound: &AmbientSoundInfo) -> i32 {
        self.0
    }
}

fn shifted(delta: i32) -> SoundStartInfo {
    SoundStartInfo {
        ambient: Some(AmbientInfo {
            param_update: Some(Arc::new(PriorityShift(delta))),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn eviction_then_stop_all_fade() {
    let hw = hardware(HardwareManagerParameter::default());
    let (archive, ids) = archive(2, &[0, 5, 3]);
    let mut system = SoundSystem::new(hw.clone(), archive);
    let info = SoundStartInfo::default();

    let mut a = SoundHandle::new();
    let mut b = SoundHandle::new();
    let mut c = SoundHandle::new();
    system.start_sound(&mut a, ids[0], &info).unwrap();
    system.start_sound(&mut b, ids[1], &info).unwrap();
    system.start_sound(&mut c, ids[2], &info).unwrap();

    assert!(!a.is_attached());
    assert!(b.is_attached());
    assert!(c.is_attached());
    assert_eq!(system.playing_sound_count(), 2);

    system.run_frame().unwrap();
    system.stop_all_sound(30);
    for frame in 1..30 {
        system.run_frame().unwrap();
        assert_eq!(b.player_state(), Some(PlayerState::Play), "stopped early at frame {frame}");
        assert!(b.calculation_values().unwrap().fade.stop_fade_volume > 0.0);
    }

    // One frame of fade left.
    assert_eq!(b.remaining_fade_frames(), 1);
    let calc = b.calculation_values().unwrap();
    assert!((calc.fade.stop_fade_volume - 1.0 / 30.0).abs() < 1e-4);
    assert!(calc.fade.is_stopping);

    // Frame 30: the fade reaches zero and the sounds are released.
    system.run_frame().unwrap();
    assert!(!b.is_attached());
    assert!(!c.is_attached());
    assert_eq!(system.playing_sound_count(), 0);
    assert_eq!(hw.active_voice_count(), 0);
}

#[test]
fn equal_priority_never_evicts() {
    let hw = hardware(HardwareManagerParameter::default());
    let (archive, ids) = archive(1, &[10, 10, 11]);
    let mut system = SoundSystem::new(hw, archive);
    let info = SoundStartInfo::default();
    let mut first = SoundHandle::new();
    let mut second = SoundHandle::new();
    system.start_sound(&mut first, ids[0], &info).unwrap();
    assert_eq!(system.start_sound(&mut second, ids[1], &info), Err(StartError::LowPriority));
    assert!(first.is_attached());
    system.start_sound(&mut second, ids[2], &info).unwrap();
    assert!(!first.is_attached());
}

#[test]
fn admission_uses_ambient_priority() {
    let hw = hardware(HardwareManagerParameter::default());
    let (archive, ids) = archive(1, &[10, 20, 20]);
    let mut system = SoundSystem::new(hw, archive);
    let mut a = SoundHandle::new();
    let mut b = SoundHandle::new();
    system.start_sound(&mut a, ids[0], &SoundStartInfo::default()).unwrap();

    // 20 - 15 = 5 does not outrank 10.
    assert_eq!(system.start_sound(&mut b, ids[1], &shifted(-15)), Err(StartError::LowPriority));
    assert!(a.is_attached());
    assert!(!b.is_attached());

    // 20 - 5 = 15 does, and the first frame keeps that priority.
    system.start_sound(&mut b, ids[2], &shifted(-5)).unwrap();
    assert!(!a.is_attached());
    system.run_frame().unwrap();
    assert_eq!(b.calculation_values().unwrap().result.priority, 15);
    let player = system.player(atk_sound::PlayerId(0)).unwrap();
    assert_eq!(player.lowest_priority(), Some(15));
}

#[test]
fn distant_3d_sound_cannot_evict() {
    let hw = hardware(HardwareManagerParameter::default());
    let (mut archive, ids) = archive(1, &[10]);
    let player = archive.sound(ids[0]).unwrap().player;
    let mut river = looping_wave("river", player, 20);
    river.is_3d = true;
    let river = archive.add_sound(river);
    archive.sound_3d = Some(Sound3DParam::default());
    let mut system = SoundSystem::new(hw, archive);

    let mut a = SoundHandle::new();
    system.start_sound(&mut a, ids[0], &SoundStartInfo::default()).unwrap();

    // Beyond the max distance the full reduction applies: 20 - 32 clamps to 0.
    let far = SoundActor::new();
    far.set_position(Some(Vec3::new(1000.0, 0.0, 0.0)));
    let mut b = SoundHandle::new();
    let info = SoundStartInfo {
        actor: Some(far),
        ..Default::default()
    };
    assert_eq!(system.start_sound(&mut b, river, &info), Err(StartError::LowPriority));
    assert!(a.is_attached());

    let near = SoundActor::new();
    near.set_position(Some(Vec3::ZERO));
    let info = SoundStartInfo {
        actor: Some(near),
        ..Default::default()
    };
    system.start_sound(&mut b, river, &info).unwrap();
    assert!(!a.is_attached());
}

#[test]
fn pause_and_mute_through_handle() {
    let hw = hardware(HardwareManagerParameter::default());
    let (archive, ids) = archive(4, &[10]);
    let mut system = SoundSystem::new(hw, archive);
    let mut h = SoundHandle::new();
    system.start_sound(&mut h, ids[0], &SoundStartInfo::default()).unwrap();
    system.run_frame().unwrap();

    h.pause(true, 4);
    assert_eq!(h.pause_state(), Some(PauseState::Pausing));
    h.pause(true, 4);
    assert_eq!(h.remaining_pause_fade_frames(), 4);
    for _ in 0..4 {
        system.run_frame().unwrap();
    }
    assert_eq!(h.pause_state(), Some(PauseState::Paused));

    h.pause(false, 0);
    assert_eq!(h.pause_state(), Some(PauseState::Normal));
    h.pause(false, 0);
    assert_eq!(h.pause_state(), Some(PauseState::Normal));

    h.mute(true, 2);
    system.run_frame().unwrap();
    system.run_frame().unwrap();
    assert_eq!(h.mute_state(), Some(MuteState::Muted));
    let calc = h.calculation_values().unwrap();
    assert_eq!(calc.result.volume, 0.0);
}

#[test]
fn committed_voice_matches_calculation_values() {
    let hw = hardware(HardwareManagerParameter::default());
    let (archive, ids) = archive(4, &[64]);
    let mut system = SoundSystem::new(hw.clone(), archive);
    let actor = SoundActor::new();
    actor.set_volume(0.5);
    let mut h = SoundHandle::new();
    let info = SoundStartInfo {
        actor: Some(actor.clone()),
        ..Default::default()
    };
    system.start_sound(&mut h, ids[0], &info).unwrap();
    h.set_pan(0.25);
    h.set_output_volume(OutputDevice::Sub, 0.0);
    system.player_mut(atk_sound::PlayerId(0)).unwrap().set_volume(0.5);
    system.run_frame().unwrap();

    let calc = h.calculation_values().unwrap();
    assert!((calc.result.volume - 0.25).abs() < 1e-6);
    assert_eq!(calc.result.output(OutputDevice::Main).pan, 0.25);

    let voices = hw.lock_renderer().voices();
    assert_eq!(voices.len(), 1);
    let (_, committed) = voices[0];
    assert_eq!(committed.param, calc.result);
    assert!(!committed.paused);
    assert_eq!(committed.receiver, hw.default_receiver());
}

proptest! {
    #[test]
    fn prop_voice_ceiling_holds(voice_max in 1usize..32, starts in 1usize..64) {
        let hw = hardware(HardwareManagerParameter::default().with_voice_count_max(voice_max));
        let (archive, ids) = archive(starts, &vec![64; starts]);
        let mut system = SoundSystem::new(hw.clone(), archive);
        let mut handles: Vec<SoundHandle> = (0..starts).map(|_| SoundHandle::new()).collect();
        let mut started = 0;
        for (handle, id) in handles.iter_mut().zip(&ids) {
            match system.start_sound(handle, *id, &SoundStartInfo::default()) {
                Ok(()) => started += 1,
                Err(e) => prop_assert_eq!(e, StartError::NotEnoughVoice),
            }
            prop_assert!(hw.active_voice_count() <= voice_max);
        }
        prop_assert_eq!(started, starts.min(voice_max));
        system.run_frame().unwrap();
        prop_assert_eq!(system.playing_sound_count(), started);
    }
}
