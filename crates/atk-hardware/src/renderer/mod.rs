//! Audio renderer driver interface.
//!
//! The hardware manager drives a renderer through `AudioRenderer`: one
//! `submit` per audio frame, with completion reported asynchronously through
//! the `RenderEventSender` handed over at initialization. Every call that can
//! fail returns a `Result`; the manager propagates those failures unchanged.

mod software;

pub use software::{DeviceMix, MixSummary, RenderMonitor, RenderStats, SoftwareRenderer};

use atk_core::{OutputMode, Result};
use crossbeam_channel::Sender;

use crate::submix::MixState;
use crate::voice::VoiceAllocator;

/// Signals frame completion back to the hardware manager.
#[derive(Debug, Clone)]
pub struct RenderEventSender(Sender<u64>);

impl RenderEventSender {
    pub(crate) fn new(tx: Sender<u64>) -> Self {
        Self(tx)
    }

    /// Report that rendering of `frame_index` has finished.
    pub fn signal(&self, frame_index: u64) {
        // A full channel only means nobody is waiting; the event is level-like.
        let _ = self.0.try_send(frame_index);
    }
}

/// Configuration handed to the renderer at initialization.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub sample_rate: u32,
    pub voice_count: usize,
    pub mix_count: usize,
    pub output_modes: Vec<OutputMode>,
    pub is_compatible_pan_curve_enabled: bool,
    pub is_compatible_downmix_enabled: bool,
    pub event: RenderEventSender,
}

/// Everything the renderer needs for one frame.
pub struct RenderFrame<'a> {
    pub index: u64,
    pub master_volume: f32,
    pub output_modes: &'a [OutputMode],
    pub device_enabled: &'a [bool],
    /// Final mix first, then every sub-mix.
    pub mixes: &'a [MixState],
    pub voices: &'a VoiceAllocator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryPoolId(pub u32);

/// A DMA-visible memory region the renderer reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPool {
    pub id: MemoryPoolId,
    pub size: usize,
}

/// Low-level audio renderer.
pub trait AudioRenderer: Send {
    fn initialize(&mut self, config: RendererConfig) -> Result<()>;

    /// Begin rendering one frame. Completion is signaled through the event.
    fn submit(&mut self, frame: &RenderFrame<'_>) -> Result<()>;

    /// Frames submitted but not yet completed.
    fn in_flight_frames(&self) -> usize;

    fn attach_memory_pool(&mut self, pool: &MemoryPool) -> Result<()>;

    /// Ask the renderer to release a pool. Takes effect asynchronously.
    fn request_detach_memory_pool(&mut self, id: MemoryPoolId);

    fn is_memory_pool_attached(&self, id: MemoryPoolId) -> bool;

    fn suspend(&mut self);

    fn resume(&mut self);

    fn finalize(&mut self);
}
