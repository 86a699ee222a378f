//! Hardware manager.
//!
//! Process-wide context for the audio frame: voice pool, master and bus
//! volumes, output modes, sub-mix topology, effect aux lists, memory pools and
//! the renderer update / reset cycle.
//!
//! State is split across independent locks: the renderer lock (voices,
//! master volume, output settings, pools, the renderer itself), one lock per
//! effect aux list and the sub-mix list lock. Every method takes at most one
//! of them at a time, so no lock ordering exists to get wrong.

use std::time::Duration;

use atk_core::constants::{OUTPUT_DEVICE_COUNT, SOUND_FRAME_INTERVAL_MSEC};
use atk_core::{AtkError, AuxBus, Bus, MoveValue, OutputDevice, OutputMode, Result};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::effect::{AuxEffect, EffectAuxList, EffectId, EffectTarget};
use crate::parameter::HardwareManagerParameter;
use crate::renderer::{AudioRenderer, MemoryPool, MemoryPoolId, RenderEventSender, RenderFrame, RendererConfig};
use crate::submix::{OutputReceiver, SubMixId, SubMixList};
use crate::voice::{VoiceAllocator, VoiceId, VoiceParam};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResetPhase {
    Idle,
    /// Master volume ramping to zero.
    Fading,
    /// Pools asked to detach; waiting for the renderer to drain.
    Detaching,
}

struct RendererState {
    renderer: Box<dyn AudioRenderer>,
    voices: VoiceAllocator,
    master_volume: MoveValue,
    output_modes: [OutputMode; OUTPUT_DEVICE_COUNT],
    pending_output_modes: [Option<OutputMode>; OUTPUT_DEVICE_COUNT],
    device_enabled: [bool; OUTPUT_DEVICE_COUNT],
    pending_device_enabled: [Option<bool>; OUTPUT_DEVICE_COUNT],
    pools: Vec<MemoryPool>,
    next_pool_id: u32,
    frame_index: u64,
    suspended: bool,
    reset: ResetPhase,
    finalized: bool,
}

impl RendererState {
    fn apply_pending(&mut self) {
        for d in 0..OUTPUT_DEVICE_COUNT {
            if let Some(mode) = self.pending_output_modes[d].take() {
                debug!(device = d, ?mode, "Output mode applied");
                self.output_modes[d] = mode;
            }
            if let Some(enabled) = self.pending_device_enabled[d].take() {
                debug!(device = d, enabled, "Output device flag applied");
                self.device_enabled[d] = enabled;
            }
        }
    }
}

/// Exclusive access to the voice pool for one batch of voice updates.
///
/// Obtained from [`HardwareManager::lock_renderer`]. Holding it blocks the
/// frame submission, so keep the critical section short and do not call back
/// into the manager while it is alive.
pub struct RendererLock<'a> {
    state: MutexGuard<'a, RendererState>,
}

impl RendererLock<'_> {
    /// Allocate a voice. `None` when the pool is full and nothing can be dropped.
    pub fn alloc_voice(&mut self, priority: i32) -> Option<VoiceId> {
        if self.state.finalized {
            warn!("alloc_voice after finalize");
            return None;
        }
        self.state.voices.alloc(priority)
    }

    pub fn free_voice(&mut self, id: VoiceId) -> bool {
        self.state.voices.free(id)
    }

    /// Commit parameters for the next rendered frame. False for stale ids.
    pub fn set_voice_param(&mut self, id: VoiceId, param: VoiceParam) -> bool {
        self.state.voices.set_param(id, param)
    }

    pub fn voice_param(&self, id: VoiceId) -> Option<VoiceParam> {
        self.state.voices.param(id).copied()
    }

    /// False once the voice was freed or dropped for a higher-priority one.
    pub fn is_voice_valid(&self, id: VoiceId) -> bool {
        self.state.voices.is_valid(id)
    }

    pub fn active_voice_count(&self) -> usize {
        self.state.voices.active_count()
    }

    /// Snapshot of every active voice with its committed parameters.
    pub fn voices(&self) -> Vec<(VoiceId, VoiceParam)> {
        self.state.voices.iter().map(|(id, p)| (id, *p)).collect()
    }

    pub fn frame_index(&self) -> u64 {
        self.state.frame_index
    }
}

pub struct HardwareManager {
    parameter: HardwareManagerParameter,
    state: Mutex<RendererState>,
    effects: [Mutex<EffectAuxList>; 3],
    sub_mixes: Mutex<SubMixList>,
    events: Receiver<u64>,
}

impl HardwareManager {
    /// Validate `parameter`, bring up `renderer` and build the mix topology.
    ///
    /// A renderer that fails to initialize is returned as the error; nothing
    /// is left half-initialized.
    pub fn initialize(parameter: HardwareManagerParameter, mut renderer: Box<dyn AudioRenderer>) -> Result<Self> {
        parameter.validate()?;

        let sub_mixes = SubMixList::new(&parameter);
        let (tx, rx) = crossbeam_channel::bounded(1);
        renderer.initialize(RendererConfig {
            sample_rate: parameter.sample_rate,
            voice_count: parameter.voice_count_max,
            mix_count: sub_mixes.len() + 1,
            output_modes: parameter.output_modes.to_vec(),
            is_compatible_pan_curve_enabled: parameter.is_compatible_pan_curve_enabled,
            is_compatible_downmix_enabled: parameter.is_compatible_downmix_enabled,
            event: RenderEventSender::new(tx),
        })?;

        let effect_capacity = if parameter.is_effect_enabled {
            parameter.effect_count_max
        } else {
            0
        };
        let effects = [
            Mutex::new(EffectAuxList::new(EffectTarget::Default, effect_capacity)),
            Mutex::new(EffectAuxList::new(EffectTarget::FinalMix, effect_capacity)),
            Mutex::new(EffectAuxList::new(EffectTarget::AdditionalSubMix, effect_capacity)),
        ];

        info!(
            sample_rate = parameter.sample_rate,
            voices = parameter.voice_count_max,
            sub_mixes = sub_mixes.len(),
            sound_thread = parameter.is_sound_thread_enabled,
            "Hardware manager initialized"
        );

        Ok(Self {
            state: Mutex::new(RendererState {
                renderer,
                voices: VoiceAllocator::new(parameter.voice_count_max, parameter.is_voice_drop_enabled),
                master_volume: MoveValue::new(1.0),
                output_modes: parameter.output_modes,
                pending_output_modes: [None; OUTPUT_DEVICE_COUNT],
                device_enabled: [true; OUTPUT_DEVICE_COUNT],
                pending_device_enabled: [None; OUTPUT_DEVICE_COUNT],
                pools: Vec::new(),
                next_pool_id: 0,
                frame_index: 0,
                suspended: false,
                reset: ResetPhase::Idle,
                finalized: false,
            }),
            effects,
            sub_mixes: Mutex::new(sub_mixes),
            events: rx,
            parameter,
        })
    }

    pub fn parameter(&self) -> &HardwareManagerParameter {
        &self.parameter
    }

    pub fn is_initialized(&self) -> bool {
        !self.state.lock().finalized
    }

    /// Take the renderer lock for a batch of voice operations.
    pub fn lock_renderer(&self) -> RendererLock<'_> {
        RendererLock {
            state: self.state.lock(),
        }
    }

    /// Advance one audio frame of hardware-side state.
    ///
    /// Ramps master and bus volumes, applies pending output mode and device
    /// flag changes, moves the reset sequence forward and runs the effects.
    pub fn update(&self) {
        let frame_index = {
            let mut state = self.state.lock();
            if state.finalized {
                return;
            }
            state.master_volume.update();
            state.apply_pending();
            if state.reset == ResetPhase::Fading && state.master_volume.is_finished() {
                let RendererState { renderer, pools, .. } = &mut *state;
                for pool in pools.iter() {
                    renderer.request_detach_memory_pool(pool.id);
                }
                state.reset = ResetPhase::Detaching;
                debug!(pools = state.pools.len(), "Reset fade finished, detaching memory pools");
            }
            state.frame_index
        };

        self.sub_mixes.lock().update();
        self.update_effect_at(frame_index);
    }

    /// Run one frame of every effect aux list.
    pub fn update_effect(&self) {
        let frame_index = self.state.lock().frame_index;
        self.update_effect_at(frame_index);
    }

    fn update_effect_at(&self, frame_index: u64) {
        if !self.parameter.is_effect_enabled {
            return;
        }
        for list in &self.effects {
            list.lock().update(frame_index, self.parameter.sample_rate);
        }
    }

    /// Submit the current frame to the renderer.
    pub fn request_update_audio_renderer(&self) -> Result<()> {
        let mixes = self.sub_mixes.lock().snapshot();

        let mut state = self.state.lock();
        if state.finalized {
            return Err(AtkError::NotInitialized("hardware manager finalized".into()));
        }
        if self.parameter.is_memory_pool_attach_check_enabled
            && state.voices.active_count() > 0
            && state.pools.is_empty()
        {
            return Err(AtkError::Renderer(
                "voices active with no memory pool attached".into(),
            ));
        }

        state.frame_index += 1;
        let RendererState {
            renderer,
            voices,
            master_volume,
            output_modes,
            device_enabled,
            frame_index,
            ..
        } = &mut *state;
        let frame = RenderFrame {
            index: *frame_index,
            master_volume: master_volume.value(),
            output_modes: &output_modes[..],
            device_enabled: &device_enabled[..],
            mixes: &mixes,
            voices: &*voices,
        };
        trace!(frame = frame.index, voices = voices.active_count(), "Renderer update requested");
        renderer.submit(&frame)
    }

    /// Block until the renderer reports a finished frame. False if the
    /// renderer dropped its completion sender and no frame can arrive.
    pub fn wait_audio_renderer_event(&self) -> bool {
        match self.events.recv() {
            Ok(_) => true,
            Err(_) => {
                warn!("Renderer completion channel closed");
                false
            }
        }
    }

    /// Wait up to `timeout` for a finished frame. True if one arrived.
    pub fn timed_wait_audio_renderer_event(&self, timeout: Duration) -> bool {
        self.events.recv_timeout(timeout).is_ok()
    }

    /// Update, submit and wait for one frame.
    pub fn execute_audio_renderer_rendering(&self) -> Result<bool> {
        self.update();
        self.request_update_audio_renderer()?;
        Ok(self.timed_wait_audio_renderer_event(Duration::from_millis(SOUND_FRAME_INTERVAL_MSEC)))
    }

    pub fn suspend_audio_renderer(&self) {
        let mut state = self.state.lock();
        state.renderer.suspend();
        state.suspended = true;
        info!("Audio renderer suspended");
    }

    pub fn resume_audio_renderer(&self) {
        let mut state = self.state.lock();
        state.renderer.resume();
        state.suspended = false;
        info!("Audio renderer resumed");
    }

    pub fn is_audio_renderer_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    // Voices outside a batch.

    pub fn alloc_voice(&self, priority: i32) -> Option<VoiceId> {
        self.lock_renderer().alloc_voice(priority)
    }

    pub fn free_voice(&self, id: VoiceId) -> bool {
        self.lock_renderer().free_voice(id)
    }

    pub fn set_voice_param(&self, id: VoiceId, param: VoiceParam) -> bool {
        self.lock_renderer().set_voice_param(id, param)
    }

    pub fn active_voice_count(&self) -> usize {
        self.state.lock().voices.active_count()
    }

    pub fn dropped_voice_count(&self) -> u64 {
        self.state.lock().voices.dropped_count()
    }

    // Volumes.

    pub fn set_master_volume(&self, volume: f32, fade_frames: u32) {
        let mut state = self.state.lock();
        if state.reset != ResetPhase::Idle {
            warn!("set_master_volume ignored during reset");
            return;
        }
        state.master_volume.set_target(volume.max(0.0), fade_frames);
    }

    pub fn master_volume(&self) -> f32 {
        self.state.lock().master_volume.value()
    }

    /// The mix stage sounds render into when no receiver is given.
    pub fn default_receiver(&self) -> OutputReceiver {
        self.sub_mixes
            .lock()
            .main_sub_mix()
            .map(OutputReceiver::SubMix)
            .unwrap_or(OutputReceiver::FinalMix)
    }

    /// Ramp a bus of the default mix stage.
    pub fn set_bus_volume(&self, bus: Bus, volume: f32, fade_frames: u32) {
        let receiver = self.default_receiver();
        self.set_sub_mix_bus_volume(receiver, bus.index(), volume, fade_frames);
    }

    pub fn bus_volume(&self, bus: Bus) -> f32 {
        let receiver = self.default_receiver();
        self.sub_mix_bus_volume(receiver, bus.index())
    }

    /// Ramp one bus of `receiver`.
    ///
    /// An unknown receiver or bus index is a programming error; release
    /// builds log it and ignore the call.
    pub fn set_sub_mix_bus_volume(&self, receiver: OutputReceiver, bus: usize, volume: f32, fade_frames: u32) {
        let ok = self.sub_mixes.lock().set_bus_volume(receiver, bus, volume, fade_frames);
        debug_assert!(ok, "unknown receiver {:?} or bus {}", receiver, bus);
        if !ok {
            warn!(?receiver, bus, "set_sub_mix_bus_volume: unknown receiver or bus");
        }
    }

    /// Current bus volume of `receiver`; 0.0 for an unknown receiver or bus.
    pub fn sub_mix_bus_volume(&self, receiver: OutputReceiver, bus: usize) -> f32 {
        match self.sub_mixes.lock().bus_volume(receiver, bus) {
            Some(v) => v,
            None => {
                warn!(?receiver, bus, "sub_mix_bus_volume: unknown receiver or bus");
                0.0
            }
        }
    }

    pub fn set_sub_mix_volume(&self, receiver: OutputReceiver, volume: f32, fade_frames: u32) {
        if !self.sub_mixes.lock().set_volume(receiver, volume, fade_frames) {
            warn!(?receiver, "set_sub_mix_volume: unknown receiver");
        }
    }

    // Output devices. Changes take effect on the next update.

    pub fn set_output_mode(&self, device: OutputDevice, mode: OutputMode) {
        self.state.lock().pending_output_modes[device.index()] = Some(mode);
    }

    pub fn output_mode(&self, device: OutputDevice) -> OutputMode {
        self.state.lock().output_modes[device.index()]
    }

    pub fn set_output_device_flag(&self, device: OutputDevice, enabled: bool) {
        self.state.lock().pending_device_enabled[device.index()] = Some(enabled);
    }

    pub fn is_output_device_enabled(&self, device: OutputDevice) -> bool {
        self.state.lock().device_enabled[device.index()]
    }

    // Sub-mixes.

    pub fn add_sub_mix(&self, bus_count: usize, channel_count: u32, destination: OutputReceiver) -> Result<SubMixId> {
        if !self.parameter.is_sub_mix_enabled {
            return Err(AtkError::NotInitialized("sub-mix is disabled".into()));
        }
        self.sub_mixes.lock().add(bus_count, channel_count, destination)
    }

    /// Remove a user sub-mix. Refused while any receiver is bound to it.
    pub fn remove_sub_mix(&self, id: SubMixId) -> Result<()> {
        self.sub_mixes.lock().remove(id)
    }

    pub fn sub_mix_count(&self) -> usize {
        self.sub_mixes.lock().len()
    }

    pub fn main_sub_mix(&self) -> Option<SubMixId> {
        self.sub_mixes.lock().main_sub_mix()
    }

    pub fn additional_sub_mix(&self) -> Option<SubMixId> {
        self.sub_mixes.lock().additional_sub_mix()
    }

    /// Register a source against `receiver`. False if the receiver is unknown.
    pub fn bind_receiver(&self, receiver: OutputReceiver) -> bool {
        self.sub_mixes.lock().bind(receiver)
    }

    pub fn unbind_receiver(&self, receiver: OutputReceiver) {
        self.sub_mixes.lock().unbind(receiver)
    }

    // Effects.

    fn effect_list(&self, target: EffectTarget) -> &Mutex<EffectAuxList> {
        match target {
            EffectTarget::Default => &self.effects[0],
            EffectTarget::FinalMix => &self.effects[1],
            EffectTarget::AdditionalSubMix => &self.effects[2],
        }
    }

    pub fn append_effect(&self, target: EffectTarget, bus: AuxBus, effect: Box<dyn AuxEffect>) -> Result<EffectId> {
        if !self.parameter.is_effect_enabled {
            return Err(AtkError::NotInitialized("effect is disabled".into()));
        }
        if target == EffectTarget::AdditionalSubMix && !self.parameter.is_additional_effect_bus_enabled {
            return Err(AtkError::NotInitialized("additional effect bus is disabled".into()));
        }
        let frame_index = self.state.lock().frame_index;
        self.effect_list(target)
            .lock()
            .append(bus, effect, frame_index, self.parameter.sample_rate)
    }

    pub fn remove_effect(&self, target: EffectTarget, bus: AuxBus, id: EffectId) -> bool {
        self.effect_list(target).lock().remove(bus, id).is_some()
    }

    pub fn clear_effect(&self, target: EffectTarget, bus: AuxBus) {
        self.effect_list(target).lock().clear(bus)
    }

    pub fn effect_count(&self, target: EffectTarget, bus: AuxBus) -> usize {
        self.effect_list(target).lock().len(bus)
    }

    // Memory pools.

    pub fn attach_memory_pool(&self, size: usize) -> Result<MemoryPoolId> {
        let mut state = self.state.lock();
        if state.reset != ResetPhase::Idle {
            return Err(AtkError::InUse("reset in progress".into()));
        }
        let pool = MemoryPool {
            id: MemoryPoolId(state.next_pool_id),
            size,
        };
        state.renderer.attach_memory_pool(&pool)?;
        state.next_pool_id += 1;
        state.pools.push(pool);
        Ok(pool.id)
    }

    pub fn memory_pool_count(&self) -> usize {
        self.state.lock().pools.len()
    }

    // Reset.

    /// Fade the master volume out, then detach every memory pool.
    pub fn prepare_reset(&self) {
        let mut state = self.state.lock();
        if state.reset != ResetPhase::Idle {
            return;
        }
        let frames = self.parameter.reset_fade_frames;
        state.master_volume.set_target(0.0, frames);
        state.reset = ResetPhase::Fading;
        info!(fade_frames = frames, "Reset prepared");
    }

    /// True once the fade finished, no frames are in flight and every pool
    /// has been released by the renderer.
    pub fn is_reset_ready(&self) -> bool {
        let state = self.state.lock();
        state.reset == ResetPhase::Detaching
            && state.master_volume.is_finished()
            && state.renderer.in_flight_frames() == 0
            && state
                .pools
                .iter()
                .all(|p| !state.renderer.is_memory_pool_attached(p.id))
    }

    /// Leave the reset state: forget detached pools and restore the master volume.
    pub fn complete_reset(&self) -> Result<()> {
        if !self.is_reset_ready() {
            return Err(AtkError::InUse("reset not ready".into()));
        }
        let mut state = self.state.lock();
        state.pools.clear();
        state.master_volume.set(1.0);
        state.reset = ResetPhase::Idle;
        info!("Reset completed");
        Ok(())
    }

    /// Release every voice and effect and shut the renderer down.
    pub fn finalize(&self) {
        {
            let mut state = self.state.lock();
            if state.finalized {
                return;
            }
            state.voices.clear();
            state.renderer.finalize();
            state.pools.clear();
            state.finalized = true;
        }
        for list in &self.effects {
            list.lock().clear_all();
        }
        info!("Hardware manager finalized");
    }
}

impl Drop for HardwareManager {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::SoftwareRenderer;
    use atk_core::ResolvedParam;

    fn manager(parameter: HardwareManagerParameter) -> (HardwareManager, crate::renderer::RenderMonitor) {
        let renderer = SoftwareRenderer::new();
        let monitor = renderer.monitor();
        (HardwareManager::initialize(parameter, Box::new(renderer)).unwrap(), monitor)
    }

    struct FailingRenderer;

    impl AudioRenderer for FailingRenderer {
        fn initialize(&mut self, _config: RendererConfig) -> Result<()> {
            Err(AtkError::Renderer("no device".into()))
        }
        fn submit(&mut self, _frame: &RenderFrame<'_>) -> Result<()> {
            Ok(())
        }
        fn in_flight_frames(&self) -> usize {
            0
        }
        fn attach_memory_pool(&mut self, _pool: &MemoryPool) -> Result<()> {
            Ok(())
        }
        fn request_detach_memory_pool(&mut self, _id: MemoryPoolId) {}
        fn is_memory_pool_attached(&self, _id: MemoryPoolId) -> bool {
            false
        }
        fn suspend(&mut self) {}
        fn resume(&mut self) {}
        fn finalize(&mut self) {}
    }

    /// Comes up, but drops its completion sender.
    struct SilentRenderer;

    impl AudioRenderer for SilentRenderer {
        fn initialize(&mut self, _config: RendererConfig) -> Result<()> {
            Ok(())
        }
        fn submit(&mut self, _frame: &RenderFrame<'_>) -> Result<()> {
            Ok(())
        }
        fn in_flight_frames(&self) -> usize {
            0
        }
        fn attach_memory_pool(&mut self, _pool: &MemoryPool) -> Result<()> {
            Ok(())
        }
        fn request_detach_memory_pool(&mut self, _id: MemoryPoolId) {}
        fn is_memory_pool_attached(&self, _id: MemoryPoolId) -> bool {
            false
        }
        fn suspend(&mut self) {}
        fn resume(&mut self) {}
        fn finalize(&mut self) {}
    }

    #[test]
    fn test_wait_reports_closed_channel() {
        let hw = HardwareManager::initialize(HardwareManagerParameter::default(), Box::new(SilentRenderer)).unwrap();
        hw.request_update_audio_renderer().unwrap();
        assert!(!hw.wait_audio_renderer_event());

        let (hw, _) = manager(HardwareManagerParameter::default());
        hw.request_update_audio_renderer().unwrap();
        assert!(hw.wait_audio_renderer_event());
    }

    #[test]
    fn test_initialize_failure_propagates() {
        let result = HardwareManager::initialize(HardwareManagerParameter::default(), Box::new(FailingRenderer));
        assert!(matches!(result, Err(AtkError::Renderer(_))));
    }

    #[test]
    fn test_invalid_parameter_rejected() {
        let param = HardwareManagerParameter::default().with_sample_rate(44100);
        let result = HardwareManager::initialize(param, Box::new(SoftwareRenderer::new()));
        assert!(matches!(result, Err(AtkError::InvalidParameter(_))));
    }

    #[test]
    fn test_execute_signals_completion() {
        let (hw, monitor) = manager(HardwareManagerParameter::default());
        assert!(hw.execute_audio_renderer_rendering().unwrap());
        assert!(hw.execute_audio_renderer_rendering().unwrap());
        let stats = monitor.stats();
        assert_eq!(stats.submitted_frames, 2);
        assert_eq!(stats.rendered_frames, 2);
    }

    #[test]
    fn test_suspended_frames_still_complete() {
        let (hw, monitor) = manager(HardwareManagerParameter::default());
        hw.suspend_audio_renderer();
        assert!(hw.execute_audio_renderer_rendering().unwrap());
        hw.resume_audio_renderer();
        assert!(hw.execute_audio_renderer_rendering().unwrap());
        let stats = monitor.stats();
        assert_eq!(stats.suspended_frames, 1);
        assert_eq!(stats.rendered_frames, 1);
    }

    #[test]
    fn test_voice_param_reaches_renderer() {
        let (hw, monitor) = manager(HardwareManagerParameter::default());
        let id = {
            let mut lock = hw.lock_renderer();
            let id = lock.alloc_voice(64).unwrap();
            let mut param = VoiceParam::default();
            param.param = ResolvedParam::default().scaled_volume(0.5);
            assert!(lock.set_voice_param(id, param));
            id
        };
        hw.execute_audio_renderer_rendering().unwrap();
        let stats = monitor.stats();
        assert_eq!(stats.last_voice_count, 1);
        assert!(stats.last_mix.device(OutputDevice::Main).front() > 0.0);

        assert!(hw.free_voice(id));
        assert!(!hw.free_voice(id));
        assert_eq!(hw.active_voice_count(), 0);
    }

    #[test]
    fn test_master_volume_ramp() {
        let (hw, _) = manager(HardwareManagerParameter::default());
        hw.set_master_volume(0.0, 2);
        hw.update();
        assert!((hw.master_volume() - 0.5).abs() < 1e-6);
        hw.update();
        assert_eq!(hw.master_volume(), 0.0);
    }

    #[test]
    fn test_output_mode_applies_on_update() {
        let (hw, _) = manager(HardwareManagerParameter::default());
        hw.set_output_mode(OutputDevice::Main, OutputMode::Surround);
        assert_eq!(hw.output_mode(OutputDevice::Main), OutputMode::Stereo);
        hw.update();
        assert_eq!(hw.output_mode(OutputDevice::Main), OutputMode::Surround);

        hw.set_output_device_flag(OutputDevice::Sub, false);
        hw.update();
        assert!(!hw.is_output_device_enabled(OutputDevice::Sub));
    }

    #[test]
    fn test_reset_cycle() {
        let param = HardwareManagerParameter::default().with_reset_fade_frames(3);
        let (hw, _) = manager(param);
        hw.attach_memory_pool(4096).unwrap();
        hw.prepare_reset();
        assert!(!hw.is_reset_ready());
        for _ in 0..2 {
            hw.execute_audio_renderer_rendering().unwrap();
        }
        assert!(!hw.is_reset_ready());
        // Detach is requested on the fade's last frame and honoured by its submit.
        hw.execute_audio_renderer_rendering().unwrap();
        assert_eq!(hw.master_volume(), 0.0);
        assert!(hw.is_reset_ready());
        hw.complete_reset().unwrap();
        assert_eq!(hw.memory_pool_count(), 0);
        assert_eq!(hw.master_volume(), 1.0);
    }

    #[test]
    fn test_reset_waits_for_in_flight_frames() {
        let renderer = SoftwareRenderer::with_latency(2);
        let param = HardwareManagerParameter::default().with_reset_fade_frames(1);
        let hw = HardwareManager::initialize(param, Box::new(renderer)).unwrap();
        hw.prepare_reset();
        hw.update();
        hw.request_update_audio_renderer().unwrap();
        assert!(!hw.is_reset_ready());
    }

    #[test]
    fn test_memory_pool_check() {
        let param = HardwareManagerParameter::default().with_memory_pool_attach_check(true);
        let (hw, _) = manager(param);
        hw.alloc_voice(10).unwrap();
        assert!(hw.request_update_audio_renderer().is_err());
        hw.attach_memory_pool(1024).unwrap();
        assert!(hw.request_update_audio_renderer().is_ok());
    }

    #[test]
    fn test_sub_mix_remove_refused_while_bound() {
        let (hw, _) = manager(HardwareManagerParameter::default().with_user_sub_mix_count_max(2));
        let id = hw.add_sub_mix(2, 2, OutputReceiver::FinalMix).unwrap();
        assert!(hw.bind_receiver(OutputReceiver::SubMix(id)));
        assert!(matches!(hw.remove_sub_mix(id), Err(AtkError::InUse(_))));
        hw.unbind_receiver(OutputReceiver::SubMix(id));
        hw.remove_sub_mix(id).unwrap();
    }

    #[test]
    fn test_bus_volume_on_default_stage() {
        let (hw, _) = manager(HardwareManagerParameter::default());
        hw.set_bus_volume(Bus::Aux(AuxBus::B), 0.25, 0);
        hw.update();
        assert_eq!(hw.bus_volume(Bus::Aux(AuxBus::B)), 0.25);
        assert_eq!(hw.bus_volume(Bus::Main), 1.0);
    }

    #[test]
    fn test_effect_disabled() {
        struct Nop;
        impl AuxEffect for Nop {
            fn name(&self) -> &str {
                "nop"
            }
            fn update(&mut self, _ctx: &crate::effect::EffectContext) {}
        }
        let (hw, _) = manager(HardwareManagerParameter::default().with_effect(false));
        assert!(hw.append_effect(EffectTarget::Default, AuxBus::A, Box::new(Nop)).is_err());

        let (hw, _) = manager(HardwareManagerParameter::default().with_effect(true));
        let id = hw.append_effect(EffectTarget::Default, AuxBus::A, Box::new(Nop)).unwrap();
        assert_eq!(hw.effect_count(EffectTarget::Default, AuxBus::A), 1);
        assert!(hw.append_effect(EffectTarget::AdditionalSubMix, AuxBus::A, Box::new(Nop)).is_err());
        assert!(hw.remove_effect(EffectTarget::Default, AuxBus::A, id));
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let (hw, _) = manager(HardwareManagerParameter::default());
        hw.alloc_voice(1).unwrap();
        hw.finalize();
        hw.finalize();
        assert!(!hw.is_initialized());
        assert_eq!(hw.active_voice_count(), 0);
        assert!(hw.alloc_voice(1).is_none());
        assert!(hw.request_update_audio_renderer().is_err());
    }
}
