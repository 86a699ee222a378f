//! ATK Core - Foundation types for the sound engine
//!
//! This crate provides the data model shared by every ATK crate:
//! - Engine constants (frame interval, voice ceilings, parameter ranges)
//! - Parameter containers (`SoundParam`, `OutputAmbientParam`, ...)
//! - Per-frame fade ramps (`MoveValue`)
//! - The layered parameter resolver and its inspection snapshot

pub mod calc;
pub mod constants;
pub mod error;
pub mod move_value;
pub mod param;
pub mod resolve;

pub use calc::{FadeVolumeParam, SoundActorParam, SoundArchiveParam, SoundParamCalculationValues};
pub use error::{AtkError, Result};
pub use move_value::MoveValue;
pub use param::{
    AuxBus, BiquadFilter, BiquadFilterType, Bus, OutputAmbientParam, OutputDevice, OutputMode,
    SoundAmbientParam, SoundParam,
};
pub use resolve::{resolve, OutputParam, ParamLayers, ResolvedParam};
