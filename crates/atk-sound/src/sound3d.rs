//! 3D sound engine.
//!
//! Computes the ambient layer of positioned sounds from the listener:
//! distance attenuation, pan by listener-relative direction and a priority
//! reduction that lets far sounds be evicted first.

use std::any::Any;
use std::sync::Arc;

use atk_core::SoundAmbientParam;
use glam::Vec3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ambient::{
    AmbientArg, AmbientArgAllocator, AmbientArgUpdate, AmbientInfo, AmbientParamUpdate,
    AmbientSoundInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecayCurve {
    /// Loses `decay_ratio` of full volume per unit distance.
    Linear,
    /// Multiplied by `decay_ratio` per unit distance.
    #[default]
    Logarithmic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sound3DParam {
    /// Distance up to which the sound plays at full volume.
    pub max_volume_distance: f32,
    pub unit_distance: f32,
    pub decay_ratio: f32,
    pub decay_curve: DecayCurve,
    /// Distance at which the full priority reduction applies.
    pub max_distance: f32,
    pub max_priority_reduction: i32,
    /// Pan reached by a sound directly to the side.
    pub pan_range: f32,
}

impl Default for Sound3DParam {
    fn default() -> Self {
        Self {
            max_volume_distance: 1.0,
            unit_distance: 1.0,
            decay_ratio: 0.5,
            decay_curve: DecayCurve::Logarithmic,
            max_distance: 100.0,
            max_priority_reduction: 32,
            pan_range: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sound3DListener {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for Sound3DListener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

/// Per-sound state: the actor position sampled this frame.
#[derive(Debug, Default)]
struct Sound3DArg {
    position: Option<Vec3>,
}

pub struct Sound3DManager {
    param: Sound3DParam,
    listener: Mutex<Sound3DListener>,
}

impl Sound3DManager {
    pub fn new(param: Sound3DParam) -> Self {
        Self {
            param,
            listener: Mutex::new(Sound3DListener::default()),
        }
    }

    pub fn param(&self) -> &Sound3DParam {
        &self.param
    }

    pub fn set_listener(&self, listener: Sound3DListener) {
        *self.listener.lock() = listener;
    }

    pub fn listener(&self) -> Sound3DListener {
        *self.listener.lock()
    }

    /// Callbacks wiring this manager into a sound.
    pub fn ambient_info(self: &Arc<Self>) -> AmbientInfo {
        AmbientInfo {
            param_update: Some(self.clone()),
            arg_update: Some(self.clone()),
            arg_allocator: Some(self.clone()),
            arg_size: std::mem::size_of::<Vec3>(),
        }
    }

    /// Volume factor at `distance`.
    pub fn distance_volume(&self, distance: f32) -> f32 {
        let p = &self.param;
        if distance <= p.max_volume_distance {
            return 1.0;
        }
        let units = (distance - p.max_volume_distance) / p.unit_distance.max(f32::EPSILON);
        match p.decay_curve {
            DecayCurve::Linear => (1.0 - p.decay_ratio * units).max(0.0),
            DecayCurve::Logarithmic => p.decay_ratio.powf(units),
        }
    }

    /// Priority delta at `distance` (zero or negative).
    pub fn distance_priority(&self, distance: f32) -> i32 {
        let p = &self.param;
        let span = (p.max_distance - p.max_volume_distance).max(f32::EPSILON);
        let t = ((distance - p.max_volume_distance) / span).clamp(0.0, 1.0);
        -((p.max_priority_reduction as f32 * t).round() as i32)
    }

    /// Ambient layer for a sound at `position`.
    pub fn compute(&self, position: Vec3, param: &mut SoundAmbientParam) {
        let listener = self.listener();
        let rel = position - listener.position;
        let distance = rel.length();
        param.volume = self.distance_volume(distance);

        if distance > f32::EPSILON {
            let forward = listener.forward.normalize_or_zero();
            let right = forward.cross(listener.up).normalize_or_zero();
            let side = rel.dot(right) / distance;
            let front = rel.dot(forward) / distance;
            param.pan = side * self.param.pan_range;
            param.surround_pan = 1.0 - front;
        }
    }
}

fn position_of(arg: Option<&(dyn Any + Send)>, sound: &AmbientSoundInfo) -> Option<Vec3> {
    arg.and_then(|a| a.downcast_ref::<Sound3DArg>())
        .and_then(|a| a.position)
        .or(sound.position)
}

impl AmbientParamUpdate for Sound3DManager {
    fn update_ambient_param(
        &self,
        arg: Option<&(dyn Any + Send)>,
        sound: &AmbientSoundInfo,
        param: &mut SoundAmbientParam,
    ) {
        if let Some(position) = position_of(arg, sound) {
            self.compute(position, param);
        }
    }

    fn ambient_priority(&self, arg: Option<&(dyn Any + Send)>, sound: &AmbientSoundInfo) -> i32 {
        match position_of(arg, sound) {
            Some(position) => self.distance_priority((position - self.listener().position).length()),
            None => 0,
        }
    }
}

impl AmbientArgUpdate for Sound3DManager {
    fn update_ambient_arg(&self, arg: &mut (dyn Any + Send), sound: &AmbientSoundInfo) {
        if let Some(arg) = arg.downcast_mut::<Sound3DArg>() {
            arg.position = sound.position;
        }
    }
}

impl AmbientArgAllocator for Sound3DManager {
    fn alloc_ambient_arg(&self, _size: usize) -> Option<AmbientArg> {
        Some(Box::new(Sound3DArg::default()))
    }

    fn free_ambient_arg(&self, _arg: AmbientArg, _sound: &AmbientSoundInfo) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_attenuation() {
        let m = Sound3DManager::new(Sound3DParam::default());
        assert_eq!(m.distance_volume(0.5), 1.0);
        assert!((m.distance_volume(2.0) - 0.5).abs() < 1e-6);
        assert!((m.distance_volume(3.0) - 0.25).abs() < 1e-6);

        let m = Sound3DManager::new(Sound3DParam {
            decay_curve: DecayCurve::Linear,
            decay_ratio: 0.25,
            ..Default::default()
        });
        assert!((m.distance_volume(3.0) - 0.5).abs() < 1e-6);
        assert_eq!(m.distance_volume(50.0), 0.0);
    }

    #[test]
    fn test_pan_follows_listener() {
        let m = Sound3DManager::new(Sound3DParam::default());
        let mut right = SoundAmbientParam::default();
        m.compute(Vec3::new(1.0, 0.0, 0.0), &mut right);
        assert!((right.pan - 0.9).abs() < 1e-5);
        assert!((right.surround_pan - 1.0).abs() < 1e-5);

        let mut front = SoundAmbientParam::default();
        m.compute(Vec3::new(0.0, 0.0, -1.0), &mut front);
        assert!(front.pan.abs() < 1e-5);
        assert!(front.surround_pan.abs() < 1e-5);

        m.set_listener(Sound3DListener {
            forward: Vec3::X,
            ..Default::default()
        });
        let mut ahead = SoundAmbientParam::default();
        m.compute(Vec3::new(1.0, 0.0, 0.0), &mut ahead);
        assert!(ahead.pan.abs() < 1e-5);
    }

    #[test]
    fn test_priority_reduction() {
        let m = Sound3DManager::new(Sound3DParam::default());
        assert_eq!(m.distance_priority(0.0), 0);
        assert_eq!(m.distance_priority(1000.0), -32);
        assert!(m.distance_priority(50.0) < 0);
    }

    #[test]
    fn test_unpositioned_sound_is_identity() {
        let m = Arc::new(Sound3DManager::new(Sound3DParam::default()));
        let info = m.ambient_info();
        let sound = AmbientSoundInfo {
            instance: crate::id::SoundInstanceId::new(),
            sound: crate::id::SoundId(0),
            position: None,
        };
        let mut param = SoundAmbientParam::default();
        let update = info.param_update.unwrap();
        update.update_ambient_param(None, &sound, &mut param);
        assert_eq!(param, SoundAmbientParam::default());
        assert_eq!(update.ambient_priority(None, &sound), 0);
    }
}
