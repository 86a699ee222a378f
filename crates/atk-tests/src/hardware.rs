//! Render and reset cycles through the software renderer.

use std::sync::Arc;

use atk_core::{AtkError, OutputDevice, Result};
use atk_hardware::renderer::{MemoryPool, RenderFrame, RendererConfig};
use atk_hardware::{
    AudioRenderer, HardwareManager, HardwareManagerParameter, MemoryPoolId, RenderMonitor, SoftwareRenderer,
};
use atk_sound::{SoundHandle, SoundStartInfo, SoundSystem};

use crate::common::archive;

fn monitored(parameter: HardwareManagerParameter) -> (Arc<HardwareManager>, RenderMonitor) {
    let renderer = SoftwareRenderer::new();
    let monitor = renderer.monitor();
    let hw = HardwareManager::initialize(parameter.with_sound_thread(false), Box::new(renderer)).unwrap();
    (Arc::new(hw), monitor)
}

#[test]
fn hard_left_pan_reaches_left_channel_only() {
    let (hw, monitor) = monitored(HardwareManagerParameter::default());
    let (archive, ids) = archive(1, &[64]);
    let mut system = SoundSystem::new(hw.clone(), archive);
    let mut h = SoundHandle::new();
    system.start_sound(&mut h, ids[0], &SoundStartInfo::default()).unwrap();
    h.set_pan(-1.0);
    system.run_frame().unwrap();

    let stats = monitor.stats();
    assert_eq!(stats.last_voice_count, 1);
    let main = stats.last_mix.device(OutputDevice::Main);
    assert!((main.left - 1.0).abs() < 1e-5);
    assert!(main.right.abs() < 1e-5);
    let sub = stats.last_mix.device(OutputDevice::Sub);
    assert_eq!(sub.front(), 0.0);
}

#[test]
fn paused_sounds_are_silent() {
    let (hw, monitor) = monitored(HardwareManagerParameter::default());
    let (archive, ids) = archive(2, &[64, 64]);
    let mut system = SoundSystem::new(hw.clone(), archive);
    let mut a = SoundHandle::new();
    let mut b = SoundHandle::new();
    system.start_sound(&mut a, ids[0], &SoundStartInfo::default()).unwrap();
    system.start_sound(&mut b, ids[1], &SoundStartInfo::default()).unwrap();
    system.run_frame().unwrap();
    assert!(monitor.stats().last_mix.device(OutputDevice::Main).front() > 0.0);

    system.pause_all_sound(true, 0);
    system.run_frame().unwrap();
    assert_eq!(monitor.stats().last_mix.device(OutputDevice::Main).front(), 0.0);
    assert_eq!(system.playing_sound_count(), 2);
}

#[test]
fn reset_after_stop_all() {
    let (hw, monitor) = monitored(HardwareManagerParameter::default().with_reset_fade_frames(3));
    hw.attach_memory_pool(1024).unwrap();
    let (archive, ids) = archive(1, &[64]);
    let mut system = SoundSystem::new(hw.clone(), archive);
    let mut h = SoundHandle::new();
    system.start_sound(&mut h, ids[0], &SoundStartInfo::default()).unwrap();
    system.run_frame().unwrap();

    system.stop_all_sound(0);
    hw.prepare_reset();
    let mut frames = 0;
    while !hw.is_reset_ready() {
        assert!(frames < 10, "reset never became ready");
        system.run_frame().unwrap();
        frames += 1;
    }
    assert_eq!(hw.master_volume(), 0.0);
    assert_eq!(hw.active_voice_count(), 0);
    hw.complete_reset().unwrap();
    assert_eq!(hw.memory_pool_count(), 0);
    assert_eq!(hw.master_volume(), 1.0);
    assert!(monitor.stats().rendered_frames >= frames as u64);
}

#[test]
fn suspended_renderer_keeps_frame_cycle() {
    let (hw, monitor) = monitored(HardwareManagerParameter::default());
    hw.suspend_audio_renderer();
    assert!(hw.execute_audio_renderer_rendering().unwrap());
    hw.resume_audio_renderer();
    assert!(hw.execute_audio_renderer_rendering().unwrap());
    let stats = monitor.stats();
    assert_eq!(stats.suspended_frames, 1);
    assert_eq!(stats.submitted_frames, 2);
}

/// A driver that never comes up.
struct MissingDevice;

impl AudioRenderer for MissingDevice {
    fn initialize(&mut self, _config: RendererConfig) -> Result<()> {
        Err(AtkError::Renderer("device not present".into()))
    }
    fn submit(&mut self, _frame: &RenderFrame<'_>) -> Result<()> {
        Err(AtkError::NotInitialized("renderer".into()))
    }
    fn in_flight_frames(&self) -> usize {
        0
    }
    fn attach_memory_pool(&mut self, _pool: &MemoryPool) -> Result<()> {
        Err(AtkError::NotInitialized("renderer".into()))
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
fn renderer_initialize_failure_is_returned() {
    let result = HardwareManager::initialize(HardwareManagerParameter::default(), Box::new(MissingDevice));
    match result {
        Err(AtkError::Renderer(msg)) => assert!(msg.contains("device not present")),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("initialize succeeded without a device"),
    }
}
