//! Parameter containers.
//!
//! Every layer above the sound data speaks in the same vocabulary: volume and
//! pitch are multiplicative factors, pan / surround pan / lpf / sends are
//! relative deltas (0.0 leaves the lower layer untouched), and discrete fields
//! (biquad type, output line) carry an explicit "inherit" value.

use serde::{Deserialize, Serialize};

use crate::constants::{AUX_BUS_COUNT, OUTPUT_DEVICE_COUNT, OUTPUT_LINE_FLAG_INHERIT};

// ── Routing enums ───────────────────────────────────────────────

/// Physical output a voice can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputDevice {
    Main,
    Sub,
}

impl OutputDevice {
    pub const ALL: [OutputDevice; OUTPUT_DEVICE_COUNT] = [OutputDevice::Main, OutputDevice::Sub];

    pub const fn index(self) -> usize {
        match self {
            OutputDevice::Main => 0,
            OutputDevice::Sub => 1,
        }
    }

    /// Output-line bit that enables this device.
    pub const fn line_bit(self) -> u32 {
        1 << self.index()
    }
}

/// Auxiliary effect bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuxBus {
    A,
    B,
    C,
}

impl AuxBus {
    pub const ALL: [AuxBus; AUX_BUS_COUNT] = [AuxBus::A, AuxBus::B, AuxBus::C];

    pub const fn index(self) -> usize {
        match self {
            AuxBus::A => 0,
            AuxBus::B => 1,
            AuxBus::C => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Any bus a voice can send to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bus {
    Main,
    Aux(AuxBus),
}

impl Bus {
    /// Bus index with the main bus at 0 and aux buses following.
    pub const fn index(self) -> usize {
        match self {
            Bus::Main => 0,
            Bus::Aux(aux) => aux.index() + 1,
        }
    }
}

/// Channel layout of an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    Monaural,
    #[default]
    Stereo,
    Surround,
}

impl OutputMode {
    pub const fn channel_count(self) -> u32 {
        match self {
            OutputMode::Monaural => 1,
            OutputMode::Stereo => 2,
            OutputMode::Surround => 6,
        }
    }
}

// ── Biquad ──────────────────────────────────────────────────────

/// Biquad filter shape. `Inherit` defers to the next lower layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BiquadFilterType {
    #[default]
    Inherit,
    None,
    LowPass,
    HighPass,
    BandPass512,
    BandPass1024,
    BandPass2048,
    User(u8),
}

/// Filter type plus its strength in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BiquadFilter {
    pub filter_type: BiquadFilterType,
    pub value: f32,
}

impl BiquadFilter {
    pub const INHERIT: Self = Self {
        filter_type: BiquadFilterType::Inherit,
        value: 0.0,
    };

    pub const NONE: Self = Self {
        filter_type: BiquadFilterType::None,
        value: 0.0,
    };

    pub const fn new(filter_type: BiquadFilterType, value: f32) -> Self {
        Self { filter_type, value }
    }

    pub fn is_inherit(&self) -> bool {
        self.filter_type == BiquadFilterType::Inherit
    }
}

// ── Per-device ambient parameters ───────────────────────────────

/// Per-output-device overlay carried by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputAmbientParam {
    /// Multiplicative volume factor.
    pub volume: f32,
    /// Relative pan delta.
    pub pan: f32,
    /// Relative surround pan delta.
    pub surround_pan: f32,
    /// Relative main-bus send delta.
    pub main_send: f32,
    /// Relative send delta per aux bus.
    pub effect_send: [f32; AUX_BUS_COUNT],
}

impl Default for OutputAmbientParam {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            surround_pan: 0.0,
            main_send: 0.0,
            effect_send: [0.0; AUX_BUS_COUNT],
        }
    }
}

impl OutputAmbientParam {
    pub fn effect_send(&self, bus: AuxBus) -> f32 {
        self.effect_send[bus.index()]
    }

    pub fn set_effect_send(&mut self, bus: AuxBus, send: f32) {
        self.effect_send[bus.index()] = send;
    }
}

// ── Sound parameter layer ───────────────────────────────────────

/// One layer of sound parameters.
///
/// Used for the handle layer, the player overlay and (as
/// `SoundAmbientParam`) the ambient / 3D layer. The defaults are the identity
/// of the merge: a default layer changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundParam {
    pub volume: f32,
    pub pitch: f32,
    pub lpf: f32,
    pub biquad: BiquadFilter,
    /// Priority delta added to the base player priority.
    pub priority: i32,
    /// Output-line bitmask, or `OUTPUT_LINE_FLAG_INHERIT`.
    pub output_line_flag: i32,
    /// Transient per-play user value. Cleared every time the sound starts.
    pub user_data: u32,
    pub pan: f32,
    pub surround_pan: f32,
    pub main_send: f32,
    pub effect_send: [f32; AUX_BUS_COUNT],
    pub outputs: [OutputAmbientParam; OUTPUT_DEVICE_COUNT],
}

/// The ambient layer shares the layout of `SoundParam`.
pub type SoundAmbientParam = SoundParam;

impl Default for SoundParam {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            lpf: 0.0,
            biquad: BiquadFilter::INHERIT,
            priority: 0,
            output_line_flag: OUTPUT_LINE_FLAG_INHERIT,
            user_data: 0,
            pan: 0.0,
            surround_pan: 0.0,
            main_send: 0.0,
            effect_send: [0.0; AUX_BUS_COUNT],
            outputs: [OutputAmbientParam::default(); OUTPUT_DEVICE_COUNT],
        }
    }
}

impl SoundParam {
    pub fn output(&self, device: OutputDevice) -> &OutputAmbientParam {
        &self.outputs[device.index()]
    }

    pub fn output_mut(&mut self, device: OutputDevice) -> &mut OutputAmbientParam {
        &mut self.outputs[device.index()]
    }

    pub fn effect_send(&self, bus: AuxBus) -> f32 {
        self.effect_send[bus.index()]
    }

    pub fn set_effect_send(&mut self, bus: AuxBus, send: f32) {
        self.effect_send[bus.index()] = send;
    }

    /// Set a send by bus, main or aux.
    pub fn set_send(&mut self, bus: Bus, send: f32) {
        match bus {
            Bus::Main => self.main_send = send,
            Bus::Aux(aux) => self.set_effect_send(aux, send),
        }
    }

    /// Concrete output lines of this layer, `None` when inheriting.
    pub fn output_line(&self) -> Option<u32> {
        if self.output_line_flag == OUTPUT_LINE_FLAG_INHERIT {
            None
        } else {
            Some(self.output_line_flag as u32)
        }
    }

    pub fn set_output_line(&mut self, lines: u32) {
        self.output_line_flag = lines as i32;
    }

    pub fn reset_output_line(&mut self) {
        self.output_line_flag = OUTPUT_LINE_FLAG_INHERIT;
    }
}
