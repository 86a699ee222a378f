//! ATK Hardware - audio frame scheduling and output topology
//!
//! Owns the low-level side of the sound engine: the voice pool, master and
//! bus volumes, sub-mixes, effect aux lists and the renderer update cycle.

pub mod effect;
pub mod manager;
pub mod parameter;
pub mod renderer;
pub mod submix;
pub mod thread;
pub mod voice;

pub use effect::{AuxEffect, EffectContext, EffectId, EffectTarget};
pub use manager::{HardwareManager, RendererLock};
pub use parameter::HardwareManagerParameter;
pub use renderer::{AudioRenderer, MemoryPoolId, RenderMonitor, SoftwareRenderer};
pub use submix::{OutputReceiver, SubMixId};
pub use thread::{SoundFrameCallback, SoundThread};
pub use voice::{VoiceId, VoiceParam};
