//! Engine-wide constants.

/// Length of one audio frame in milliseconds.
pub const SOUND_FRAME_INTERVAL_MSEC: u64 = 5;

/// Length of one audio frame in microseconds.
pub const SOUND_FRAME_INTERVAL_USEC: u64 = 5000;

/// Hard ceiling on concurrently active low-level voices. Driver enforced.
pub const ATK_VOICE_COUNT_MAX: usize = 192;

/// Default soft ceiling (renderer working set).
pub const DEFAULT_RENDERER_VOICE_COUNT_MAX: usize = 96;

/// Number of preset sub-mixes (main + additional effect).
pub const SUB_MIX_COUNT_MAX: usize = 2;

/// Number of output devices a sound can be routed to.
pub const OUTPUT_DEVICE_COUNT: usize = 2;

/// Number of auxiliary (effect) buses.
pub const AUX_BUS_COUNT: usize = 3;

/// Main bus plus every aux bus.
pub const BUS_COUNT: usize = AUX_BUS_COUNT + 1;

pub const PLAYER_PRIORITY_MIN: i32 = 0;
pub const PLAYER_PRIORITY_MAX: i32 = 127;
pub const DEFAULT_PLAYER_PRIORITY: i32 = 64;

/// Volume range accepted by a hardware voice.
pub const VOLUME_MIN: f32 = 0.0;
pub const VOLUME_MAX: f32 = 2.0;

pub const PITCH_MIN: f32 = 0.0;

pub const PAN_MIN: f32 = -1.0;
pub const PAN_MAX: f32 = 1.0;

/// Surround pan: 0.0 is front, 2.0 is rear.
pub const SURROUND_PAN_MIN: f32 = 0.0;
pub const SURROUND_PAN_MAX: f32 = 2.0;

/// Low-pass cutoff is expressed as a delta below the unfiltered value.
pub const LPF_FREQ_MIN: f32 = -1.0;
pub const LPF_FREQ_MAX: f32 = 0.0;

pub const SEND_MIN: f32 = 0.0;
pub const SEND_MAX: f32 = 1.0;

pub const BIQUAD_VALUE_MIN: f32 = 0.0;
pub const BIQUAD_VALUE_MAX: f32 = 1.0;

/// Sentinel output-line value meaning "use the lower layer's lines".
pub const OUTPUT_LINE_FLAG_INHERIT: i32 = -1;

/// Output-line bit routing a voice to `OutputDevice::Main`.
pub const OUTPUT_LINE_MAIN: u32 = 1 << 0;

/// Output-line bit routing a voice to `OutputDevice::Sub`.
pub const OUTPUT_LINE_SUB: u32 = 1 << 1;
