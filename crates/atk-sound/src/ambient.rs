//! Ambient parameter callbacks.
//!
//! An ambient provider (typically the 3D sound engine) injects a fresh
//! `SoundAmbientParam` into a sound every frame. Per sound the calls run in a
//! fixed order: `alloc_ambient_arg` once on the first update, then every
//! frame `update_ambient_arg` followed by `update_ambient_param` and
//! `ambient_priority`, and `free_ambient_arg` when the sound is finalized.

use std::any::Any;
use std::sync::Arc;

use atk_core::SoundAmbientParam;
use glam::Vec3;

use crate::id::{SoundId, SoundInstanceId};

/// Provider-owned per-sound state.
pub type AmbientArg = Box<dyn Any + Send>;

/// What a provider can see of the sound it is computing for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientSoundInfo {
    pub instance: SoundInstanceId,
    pub sound: SoundId,
    /// Position of the sound's actor, if it has one.
    pub position: Option<Vec3>,
}

pub trait AmbientParamUpdate: Send + Sync {
    /// Write this frame's ambient layer into `param` (reset to identity beforehand).
    fn update_ambient_param(
        &self,
        arg: Option<&(dyn Any + Send)>,
        sound: &AmbientSoundInfo,
        param: &mut SoundAmbientParam,
    );

    /// Priority delta added to the sound's player priority.
    fn ambient_priority(&self, arg: Option<&(dyn Any + Send)>, sound: &AmbientSoundInfo) -> i32;
}

pub trait AmbientArgUpdate: Send + Sync {
    fn update_ambient_arg(&self, arg: &mut (dyn Any + Send), sound: &AmbientSoundInfo);
}

pub trait AmbientArgAllocator: Send + Sync {
    /// `None` disables the ambient layer for this sound.
    fn alloc_ambient_arg(&self, size: usize) -> Option<AmbientArg>;

    fn free_ambient_arg(&self, arg: AmbientArg, sound: &AmbientSoundInfo);
}

/// The callbacks a sound pulls its ambient layer from.
#[derive(Clone, Default)]
pub struct AmbientInfo {
    pub param_update: Option<Arc<dyn AmbientParamUpdate>>,
    pub arg_update: Option<Arc<dyn AmbientArgUpdate>>,
    pub arg_allocator: Option<Arc<dyn AmbientArgAllocator>>,
    pub arg_size: usize,
}

impl std::fmt::Debug for AmbientInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbientInfo")
            .field("param_update", &self.param_update.is_some())
            .field("arg_update", &self.arg_update.is_some())
            .field("arg_allocator", &self.arg_allocator.is_some())
            .field("arg_size", &self.arg_size)
            .finish()
    }
}

impl AmbientInfo {
    pub fn is_empty(&self) -> bool {
        self.param_update.is_none() && self.arg_update.is_none() && self.arg_allocator.is_none()
    }
}

enum ArgSlot {
    /// Not allocated yet.
    Pending,
    Ready(Option<AmbientArg>),
    /// Allocation failed; the ambient layer stays at identity.
    Failed,
}

/// Per-sound ambient state driven by `BasicSound`.
pub(crate) struct AmbientState {
    info: AmbientInfo,
    arg: ArgSlot,
    param: SoundAmbientParam,
}

impl AmbientState {
    pub fn new(info: AmbientInfo) -> Self {
        Self {
            info,
            arg: ArgSlot::Pending,
            param: SoundAmbientParam::default(),
        }
    }

    pub fn param(&self) -> &SoundAmbientParam {
        &self.param
    }

    #[cfg(test)]
    pub fn is_disabled(&self) -> bool {
        matches!(self.arg, ArgSlot::Failed)
    }

    /// Priority delta before the first frame, when no arg exists yet.
    pub fn initial_priority(&self, sound: &AmbientSoundInfo) -> i32 {
        self.info
            .param_update
            .as_ref()
            .map_or(0, |update| update.ambient_priority(None, sound))
    }

    /// Run the callbacks for one frame and return the ambient layer.
    pub fn update(&mut self, sound: &AmbientSoundInfo) -> SoundAmbientParam {
        if self.info.is_empty() {
            return self.param;
        }

        if let ArgSlot::Pending = self.arg {
            self.arg = match &self.info.arg_allocator {
                Some(alloc) => match alloc.alloc_ambient_arg(self.info.arg_size) {
                    Some(arg) => ArgSlot::Ready(Some(arg)),
                    None => {
                        tracing::warn!(sound = %sound.instance, "Ambient arg allocation failed; ambient layer disabled");
                        ArgSlot::Failed
                    }
                },
                None => ArgSlot::Ready(None),
            };
        }

        let arg = match &mut self.arg {
            ArgSlot::Ready(arg) => arg,
            ArgSlot::Pending | ArgSlot::Failed => return self.param,
        };

        if let (Some(update), Some(arg)) = (&self.info.arg_update, arg.as_mut()) {
            update.update_ambient_arg(&mut **arg, sound);
        }

        if let Some(update) = &self.info.param_update {
            let mut param = SoundAmbientParam::default();
            let arg_ref = arg.as_deref();
            update.update_ambient_param(arg_ref, sound, &mut param);
            param.priority = update.ambient_priority(arg_ref, sound);
            self.param = param;
        }
        self.param
    }

    /// Hand the arg back to its allocator.
    pub fn free(&mut self, sound: &AmbientSoundInfo) {
        if let ArgSlot::Ready(Some(arg)) = std::mem::replace(&mut self.arg, ArgSlot::Failed) {
            if let Some(alloc) = &self.info.arg_allocator {
                alloc.free_ambient_arg(arg, sound);
            }
        }
    }
}
