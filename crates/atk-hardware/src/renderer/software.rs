//! Reference renderer.
//!
//! Does no sample processing. Each frame it folds the committed voice
//! parameters into per-device bus gains (`MixSummary`), which is enough to
//! observe the effect of volume, pan, sends, bus volumes and the master
//! volume end to end. Completion can be delayed by a fixed number of frames
//! to model a renderer that still holds frames across the tick boundary.

use std::collections::VecDeque;
use std::sync::Arc;

use atk_core::constants::{AUX_BUS_COUNT, OUTPUT_DEVICE_COUNT};
use atk_core::{AtkError, OutputDevice, OutputMode, Result};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{AudioRenderer, MemoryPool, MemoryPoolId, RenderFrame, RendererConfig};
use crate::submix::{MixState, OutputReceiver};

/// Summed gains reaching one output device.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceMix {
    pub left: f32,
    pub right: f32,
    pub rear: f32,
    pub aux: [f32; AUX_BUS_COUNT],
}

impl DeviceMix {
    pub fn front(&self) -> f32 {
        self.left + self.right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MixSummary {
    pub devices: [DeviceMix; OUTPUT_DEVICE_COUNT],
}

impl MixSummary {
    pub fn device(&self, device: OutputDevice) -> &DeviceMix {
        &self.devices[device.index()]
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderStats {
    pub submitted_frames: u64,
    pub rendered_frames: u64,
    pub suspended_frames: u64,
    pub last_frame_index: u64,
    pub last_voice_count: usize,
    pub last_master_volume: f32,
    pub last_mix: MixSummary,
}

/// Shared view of what the software renderer has done.
#[derive(Debug, Clone, Default)]
pub struct RenderMonitor(Arc<Mutex<RenderStats>>);

impl RenderMonitor {
    pub fn stats(&self) -> RenderStats {
        self.0.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Attached,
    DetachRequested,
}

pub struct SoftwareRenderer {
    config: Option<RendererConfig>,
    latency: usize,
    in_flight: VecDeque<u64>,
    pools: Vec<(MemoryPool, PoolState)>,
    suspended: bool,
    monitor: RenderMonitor,
}

impl SoftwareRenderer {
    /// Renderer completing every frame during its own submit.
    pub fn new() -> Self {
        Self::with_latency(0)
    }

    /// Renderer completing a frame only after `latency` later submits.
    pub fn with_latency(latency: usize) -> Self {
        Self {
            config: None,
            latency,
            in_flight: VecDeque::new(),
            pools: Vec::new(),
            suspended: false,
            monitor: RenderMonitor::default(),
        }
    }

    pub fn monitor(&self) -> RenderMonitor {
        self.monitor.clone()
    }

    fn mix(&self, config: &RendererConfig, frame: &RenderFrame<'_>) -> MixSummary {
        let mut summary = MixSummary::default();
        for (_, voice) in frame.voices.iter() {
            if voice.paused {
                continue;
            }
            let p = &voice.param;
            for device in OutputDevice::ALL {
                let enabled = frame.device_enabled.get(device.index()).copied().unwrap_or(true);
                if !enabled || !p.is_output_enabled(device) {
                    continue;
                }
                let out = p.output(device);
                let gain = frame.master_volume * out.volume;
                let main = gain * out.main_send * stage_gain(frame.mixes, voice.receiver, 0);
                let (l, r) = pan_gain(out.pan, config.is_compatible_pan_curve_enabled);
                let rear_share = out.surround_pan * 0.5;

                let mode = frame
                    .output_modes
                    .get(device.index())
                    .copied()
                    .unwrap_or_default();
                let dm = &mut summary.devices[device.index()];
                let front = main * (1.0 - rear_share);
                let rear = main * rear_share;
                match mode {
                    OutputMode::Surround => {
                        dm.left += front * l;
                        dm.right += front * r;
                        dm.rear += rear;
                    }
                    OutputMode::Stereo | OutputMode::Monaural => {
                        let fold = if config.is_compatible_downmix_enabled {
                            1.0
                        } else {
                            std::f32::consts::FRAC_1_SQRT_2
                        };
                        let (mut fl, mut fr) = (front * l + rear * fold * l, front * r + rear * fold * r);
                        if mode == OutputMode::Monaural {
                            let m = (fl + fr) * 0.5;
                            fl = m;
                            fr = m;
                        }
                        dm.left += fl;
                        dm.right += fr;
                    }
                }
                for (b, send) in out.effect_send.iter().enumerate() {
                    dm.aux[b] += gain * send * stage_gain(frame.mixes, voice.receiver, b + 1);
                }
            }
        }
        summary
    }

    fn complete_frames(&mut self, keep: usize) {
        while self.in_flight.len() > keep {
            if let Some(done) = self.in_flight.pop_front() {
                if let Some(config) = &self.config {
                    config.event.signal(done);
                }
            }
        }
    }
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Left/right gain for `pan`.
fn pan_gain(pan: f32, linear: bool) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    if linear {
        ((1.0 - pan) * 0.5, (1.0 + pan) * 0.5)
    } else {
        // Constant-power panning: use sin/cos curve
        let angle = (pan + 1.0) * 0.25 * std::f32::consts::PI;
        (angle.cos(), angle.sin())
    }
}

/// Gain of `bus` through `receiver` and every stage it routes into.
fn stage_gain(mixes: &[MixState], receiver: OutputReceiver, bus: usize) -> f32 {
    let mut gain = 1.0;
    let mut current = Some(receiver);
    // Bounded walk; a sub-mix chain is never longer than the mix list.
    for _ in 0..=mixes.len() {
        let Some(r) = current else { break };
        let Some(stage) = mixes.iter().find(|m| m.receiver == r) else {
            break;
        };
        let bus_volume = stage.bus_volumes.get(bus).or(stage.bus_volumes.first()).copied().unwrap_or(1.0);
        gain *= stage.volume * bus_volume;
        current = stage.destination;
    }
    gain
}

impl AudioRenderer for SoftwareRenderer {
    fn initialize(&mut self, config: RendererConfig) -> Result<()> {
        if config.voice_count == 0 {
            return Err(AtkError::Renderer("voice count must be non-zero".into()));
        }
        debug!(
            sample_rate = config.sample_rate,
            voices = config.voice_count,
            mixes = config.mix_count,
            "Software renderer initialized"
        );
        self.config = Some(config);
        Ok(())
    }

    fn submit(&mut self, frame: &RenderFrame<'_>) -> Result<()> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| AtkError::Renderer("renderer not initialized".into()))?;

        let summary = (!self.suspended).then(|| self.mix(config, frame));

        {
            let mut stats = self.monitor.0.lock();
            stats.submitted_frames += 1;
            stats.last_frame_index = frame.index;
            match summary {
                Some(mix) => {
                    stats.rendered_frames += 1;
                    stats.last_voice_count = frame.voices.active_count();
                    stats.last_master_volume = frame.master_volume;
                    stats.last_mix = mix;
                }
                None => stats.suspended_frames += 1,
            }
        }
        trace!(frame = frame.index, suspended = self.suspended, "Frame submitted");

        self.pools.retain(|(_, state)| *state == PoolState::Attached);
        self.in_flight.push_back(frame.index);
        self.complete_frames(self.latency);
        Ok(())
    }

    fn in_flight_frames(&self) -> usize {
        self.in_flight.len()
    }

    fn attach_memory_pool(&mut self, pool: &MemoryPool) -> Result<()> {
        if self.pools.iter().any(|(p, _)| p.id == pool.id) {
            return Err(AtkError::InvalidParameter(format!(
                "memory pool {:?} already attached",
                pool.id
            )));
        }
        self.pools.push((*pool, PoolState::Attached));
        Ok(())
    }

    fn request_detach_memory_pool(&mut self, id: MemoryPoolId) {
        for (pool, state) in self.pools.iter_mut() {
            if pool.id == id {
                *state = PoolState::DetachRequested;
            }
        }
    }

    fn is_memory_pool_attached(&self, id: MemoryPoolId) -> bool {
        self.pools.iter().any(|(p, _)| p.id == id)
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
    }

    fn finalize(&mut self) {
        self.complete_frames(0);
        self.pools.clear();
        self.config = None;
    }
}
