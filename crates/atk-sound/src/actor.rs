//! Sound actors.
//!
//! An actor is a layer shared by a group of sounds: a volume, pitch and pan
//! applied to all of them, plus an optional 3D position fed to the ambient
//! provider. Sounds keep only a weak link to their actor.

use std::sync::{Arc, Weak};

use atk_core::SoundActorParam;
use glam::Vec3;
use parking_lot::Mutex;

use crate::basic_sound::{BasicSound, SharedSound};

#[derive(Default)]
pub(crate) struct ActorShared {
    param: Mutex<SoundActorParam>,
    position: Mutex<Option<Vec3>>,
    sounds: Mutex<Vec<Weak<Mutex<BasicSound>>>>,
}

impl ActorShared {
    pub fn param(&self) -> SoundActorParam {
        *self.param.lock()
    }

    pub fn position(&self) -> Option<Vec3> {
        *self.position.lock()
    }
}

/// Cheap to clone; clones refer to the same actor.
#[derive(Clone, Default)]
pub struct SoundActor {
    inner: Arc<ActorShared>,
}

impl SoundActor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_volume(&self, volume: f32) {
        self.inner.param.lock().volume = volume.max(0.0);
    }

    pub fn volume(&self) -> f32 {
        self.inner.param.lock().volume
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.inner.param.lock().pitch = pitch.max(0.0);
    }

    pub fn pitch(&self) -> f32 {
        self.inner.param.lock().pitch
    }

    pub fn set_pan(&self, pan: f32) {
        self.inner.param.lock().pan = pan;
    }

    pub fn pan(&self) -> f32 {
        self.inner.param.lock().pan
    }

    pub fn param(&self) -> SoundActorParam {
        self.inner.param()
    }

    pub fn set_position(&self, position: Option<Vec3>) {
        *self.inner.position.lock() = position;
    }

    pub fn position(&self) -> Option<Vec3> {
        self.inner.position()
    }

    pub(crate) fn attach_sound(&self, sound: &SharedSound) {
        sound.lock().attach_actor(&self.inner);
        self.inner.sounds.lock().push(Arc::downgrade(sound));
    }

    /// Sounds still attached to this actor. Takes the list lock and each
    /// sound lock one after the other, never together.
    fn live_sounds(&self) -> Vec<SharedSound> {
        let candidates: Vec<SharedSound> = {
            let mut list = self.inner.sounds.lock();
            list.retain(|w| w.strong_count() > 0);
            list.iter().filter_map(Weak::upgrade).collect()
        };
        candidates
            .into_iter()
            .filter(|s| {
                let sound = s.lock();
                sound.is_playing() && sound.is_attached_to_actor(&self.inner)
            })
            .collect()
    }

    pub fn stop_all_sound(&self, fade_frames: u32) {
        for sound in self.live_sounds() {
            sound.lock().stop(fade_frames);
        }
    }

    pub fn pause_all_sound(&self, flag: bool, fade_frames: u32) {
        for sound in self.live_sounds() {
            sound.lock().pause(flag, fade_frames);
        }
    }

    pub fn playing_sound_count(&self) -> usize {
        self.live_sounds().len()
    }

    /// Detach every sound from this actor. The sounds keep playing.
    pub fn detach_all_sound(&self) {
        for sound in self.live_sounds() {
            sound.lock().detach_actor();
        }
        self.inner.sounds.lock().clear();
    }
}
