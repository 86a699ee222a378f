//! Layered parameter resolution.
//!
//! Layers from lowest to highest: sound data (archive), ambient / 3D, player,
//! actor, handle. Continuous fields compose (volume and pitch multiply, pan /
//! surround pan / lpf / sends add their deltas and clamp). Discrete fields
//! (biquad filter, output line) are taken from the highest layer that does not
//! inherit: handle > player > ambient > archive. Actors carry no discrete
//! fields.

use serde::{Deserialize, Serialize};

use crate::calc::{FadeVolumeParam, SoundActorParam, SoundArchiveParam};
use crate::constants::*;
use crate::param::{
    AuxBus, BiquadFilter, BiquadFilterType, OutputDevice, SoundAmbientParam, SoundParam,
};

/// Every input to one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamLayers {
    pub archive: SoundArchiveParam,
    pub sound_3d: SoundAmbientParam,
    pub player: SoundParam,
    pub actor: SoundActorParam,
    pub handle: SoundParam,
    pub fade: FadeVolumeParam,
}

impl ParamLayers {
    /// Overlay layers in ascending precedence.
    fn overlays(&self) -> [&SoundParam; 3] {
        [&self.sound_3d, &self.player, &self.handle]
    }
}

/// Final parameters of one output device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputParam {
    pub volume: f32,
    pub pan: f32,
    pub surround_pan: f32,
    pub main_send: f32,
    pub effect_send: [f32; AUX_BUS_COUNT],
}

impl OutputParam {
    pub fn effect_send(&self, bus: AuxBus) -> f32 {
        self.effect_send[bus.index()]
    }
}

/// Merged per-voice parameters for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParam {
    pub volume: f32,
    pub pitch: f32,
    pub lpf: f32,
    pub biquad: BiquadFilter,
    pub output_line: u32,
    pub priority: i32,
    pub outputs: [OutputParam; OUTPUT_DEVICE_COUNT],
}

impl ResolvedParam {
    pub fn output(&self, device: OutputDevice) -> &OutputParam {
        &self.outputs[device.index()]
    }

    pub fn is_output_enabled(&self, device: OutputDevice) -> bool {
        self.output_line & device.line_bit() != 0
    }

    /// Copy with every volume scaled by `factor` (clamped again).
    pub fn scaled_volume(&self, factor: f32) -> Self {
        let mut out = *self;
        out.volume = clamp_volume(self.volume * factor);
        for o in out.outputs.iter_mut() {
            o.volume = clamp_volume(o.volume * factor);
        }
        out
    }
}

impl Default for ResolvedParam {
    fn default() -> Self {
        resolve(&ParamLayers::default())
    }
}

#[inline]
fn clamp_volume(v: f32) -> f32 {
    v.clamp(VOLUME_MIN, VOLUME_MAX)
}

/// Merge all layers into the final parameters.
pub fn resolve(layers: &ParamLayers) -> ResolvedParam {
    let archive = &layers.archive;
    let overlays = layers.overlays();

    let raw_volume = overlays
        .iter()
        .fold(archive.volume * layers.actor.volume, |acc, l| acc * l.volume)
        * layers.fade.volume();

    let pitch = overlays
        .iter()
        .fold(archive.pitch * layers.actor.pitch, |acc, l| acc * l.pitch)
        .max(PITCH_MIN);

    let lpf = overlays
        .iter()
        .fold(archive.lpf, |acc, l| acc + l.lpf)
        .clamp(LPF_FREQ_MIN, LPF_FREQ_MAX);

    let biquad = overlays
        .iter()
        .rev()
        .map(|l| l.biquad)
        .find(|b| !b.is_inherit())
        .unwrap_or(match archive.biquad.filter_type {
            BiquadFilterType::Inherit => BiquadFilter::NONE,
            _ => archive.biquad,
        });
    let biquad = BiquadFilter::new(
        biquad.filter_type,
        biquad.value.clamp(BIQUAD_VALUE_MIN, BIQUAD_VALUE_MAX),
    );

    let output_line = overlays
        .iter()
        .rev()
        .find_map(|l| l.output_line())
        .unwrap_or(archive.output_line);

    let priority = if layers.fade.is_stopping {
        PLAYER_PRIORITY_MIN
    } else {
        (archive.player_priority + layers.sound_3d.priority)
            .clamp(PLAYER_PRIORITY_MIN, PLAYER_PRIORITY_MAX)
    };

    let outputs = OutputDevice::ALL.map(|device| resolve_output(layers, &overlays, device, raw_volume));

    ResolvedParam {
        volume: clamp_volume(raw_volume),
        pitch,
        lpf,
        biquad,
        output_line,
        priority,
        outputs,
    }
}

fn resolve_output(
    layers: &ParamLayers,
    overlays: &[&SoundParam; 3],
    device: OutputDevice,
    raw_volume: f32,
) -> OutputParam {
    let archive = &layers.archive;
    let idx = device.index();

    let volume = overlays
        .iter()
        .fold(raw_volume, |acc, l| acc * l.outputs[idx].volume);

    let pan = overlays.iter().fold(archive.pan + layers.actor.pan, |acc, l| {
        acc + l.pan + l.outputs[idx].pan
    });

    let surround_pan = overlays.iter().fold(archive.surround_pan, |acc, l| {
        acc + l.surround_pan + l.outputs[idx].surround_pan
    });

    let main_send = overlays.iter().fold(archive.main_send, |acc, l| {
        acc + l.main_send + l.outputs[idx].main_send
    });

    let effect_send = AuxBus::ALL.map(|bus| {
        let b = bus.index();
        overlays
            .iter()
            .fold(archive.effect_send[b], |acc, l| {
                acc + l.effect_send[b] + l.outputs[idx].effect_send[b]
            })
            .clamp(SEND_MIN, SEND_MAX)
    });

    OutputParam {
        volume: clamp_volume(volume),
        pan: pan.clamp(PAN_MIN, PAN_MAX),
        surround_pan: surround_pan.clamp(SURROUND_PAN_MIN, SURROUND_PAN_MAX),
        main_send: main_send.clamp(SEND_MIN, SEND_MAX),
        effect_send,
    }
}
