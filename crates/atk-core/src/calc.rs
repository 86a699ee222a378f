//! Per-layer inspection snapshot.
//!
//! `SoundParamCalculationValues` records what every layer contributed to a
//! sound's parameters in one frame, together with the merged result. It is
//! produced by the same call that computes the live parameters, so the
//! recorded result is always the one that was applied.

use serde::{Deserialize, Serialize};

use crate::constants::{AUX_BUS_COUNT, DEFAULT_PLAYER_PRIORITY, OUTPUT_LINE_MAIN};
use crate::param::{AuxBus, BiquadFilter, SoundAmbientParam, SoundParam};
use crate::resolve::{resolve, ParamLayers, ResolvedParam};

/// Absolute base values authored in the sound data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundArchiveParam {
    pub volume: f32,
    pub pitch: f32,
    pub pan: f32,
    pub surround_pan: f32,
    pub lpf: f32,
    pub biquad: BiquadFilter,
    pub main_send: f32,
    pub effect_send: [f32; AUX_BUS_COUNT],
    pub output_line: u32,
    pub player_priority: i32,
}

impl Default for SoundArchiveParam {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            pan: 0.0,
            surround_pan: 0.0,
            lpf: 0.0,
            biquad: BiquadFilter::NONE,
            main_send: 1.0,
            effect_send: [0.0; AUX_BUS_COUNT],
            output_line: OUTPUT_LINE_MAIN,
            player_priority: DEFAULT_PLAYER_PRIORITY,
        }
    }
}

impl SoundArchiveParam {
    pub fn effect_send(&self, bus: AuxBus) -> f32 {
        self.effect_send[bus.index()]
    }
}

/// Parameters an actor applies to all of its sounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundActorParam {
    pub volume: f32,
    pub pitch: f32,
    pub pan: f32,
}

impl Default for SoundActorParam {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            pan: 0.0,
        }
    }
}

/// The three independent fade channels of a sound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FadeVolumeParam {
    /// Stop / fade-in ramp.
    pub stop_fade_volume: f32,
    pub pause_fade_volume: f32,
    pub mute_fade_volume: f32,
    pub is_muted: bool,
    /// A stop fade is in progress.
    pub is_stopping: bool,
}

impl Default for FadeVolumeParam {
    fn default() -> Self {
        Self {
            stop_fade_volume: 1.0,
            pause_fade_volume: 1.0,
            mute_fade_volume: 1.0,
            is_muted: false,
            is_stopping: false,
        }
    }
}

impl FadeVolumeParam {
    /// Combined factor of all three channels.
    pub fn volume(&self) -> f32 {
        self.stop_fade_volume * self.pause_fade_volume * self.mute_fade_volume
    }
}

/// Snapshot of every layer plus the merged result for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SoundParamCalculationValues {
    pub archive: SoundArchiveParam,
    pub sound_3d: SoundAmbientParam,
    pub player: SoundParam,
    pub actor: SoundActorParam,
    pub handle: SoundParam,
    pub fade: FadeVolumeParam,
    pub result: ResolvedParam,
}

impl SoundParamCalculationValues {
    /// Resolve `layers` and record them with the result.
    pub fn compute(layers: &ParamLayers) -> Self {
        Self {
            archive: layers.archive,
            sound_3d: layers.sound_3d,
            player: layers.player,
            actor: layers.actor,
            handle: layers.handle,
            fade: layers.fade,
            result: resolve(layers),
        }
    }

    /// The layers this snapshot was computed from.
    pub fn layers(&self) -> ParamLayers {
        ParamLayers {
            archive: self.archive,
            sound_3d: self.sound_3d,
            player: self.player,
            actor: self.actor,
            handle: self.handle,
            fade: self.fade,
        }
    }
}
