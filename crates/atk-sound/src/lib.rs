//! ATK Sound - sound instances and the per-frame driver
//!
//! This crate sits on top of `atk-hardware` and provides:
//! - `BasicSound` with its play / pause / mute / stop state machines
//! - Sequence, wave and stream sound kinds
//! - `SoundHandle` and `SoundActor` for client control
//! - `SoundPlayer` admission and priority eviction
//! - The ambient callback interface and a 3D engine built on it
//! - `SoundSystem`, which resolves every sound once per audio frame

pub mod actor;
pub mod ambient;
pub mod archive;
pub mod basic_sound;
pub mod error;
pub mod handle;
pub mod id;
pub mod kind;
pub mod player;
pub mod sound3d;
pub mod state;
pub mod system;

pub use actor::SoundActor;
pub use ambient::{AmbientArg, AmbientArgAllocator, AmbientArgUpdate, AmbientInfo, AmbientParamUpdate, AmbientSoundInfo};
pub use archive::{PlayerEntry, SoundArchive, SoundEntry};
pub use basic_sound::{BasicSound, HandleSlot, SoundStopCallback};
pub use error::StartError;
pub use handle::SoundHandle;
pub use id::{PlayerId, SoundId, SoundInstanceId};
pub use kind::{SoundKind, SoundKindInfo};
pub use player::{PlayerHeap, PlayerHeapList, SoundPlayer};
pub use sound3d::{DecayCurve, Sound3DListener, Sound3DManager, Sound3DParam};
pub use state::{Lifecycle, MuteState, PauseState, PlayerState};
pub use system::{SoundStartInfo, SoundSystem, SoundSystemFrameCallback};
