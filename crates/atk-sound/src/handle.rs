//! Sound handles.
//!
//! A `SoundHandle` is the client's grip on a playing sound. It holds only a
//! weak reference and reaches the sound through `HandleTarget`, the narrow
//! set of operations a handle may perform. A sound has one general and one
//! temporary handle slot; attaching a new handle to an occupied slot
//! silently detaches the previous one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use atk_core::{AuxBus, BiquadFilter, BiquadFilterType, OutputDevice, SoundParam, SoundParamCalculationValues};
use parking_lot::Mutex;

use crate::basic_sound::{BasicSound, HandleSlot, SharedSound, SoundStopCallback};
use crate::id::{SoundId, SoundInstanceId};
use crate::state::{MuteState, PauseState, PlayerState};

/// The operations a handle may perform on its sound.
pub(crate) trait HandleTarget: Send {
    fn holds_handle(&self, slot: HandleSlot, token: u64) -> bool;
    fn release_handle(&mut self, slot: HandleSlot, token: u64);
    fn instance_id(&self) -> SoundInstanceId;
    fn sound_id(&self) -> SoundId;
    fn is_prepared(&self) -> bool;
    fn start_prepared(&mut self);
    fn stop(&mut self, fade_frames: u32);
    fn pause(&mut self, flag: bool, fade_frames: u32);
    fn mute(&mut self, flag: bool, fade_frames: u32);
    fn player_state(&self) -> PlayerState;
    fn pause_state(&self) -> PauseState;
    fn mute_state(&self) -> MuteState;
    fn remaining_fade_frames(&self) -> u32;
    fn remaining_pause_fade_frames(&self) -> u32;
    fn remaining_mute_fade_frames(&self) -> u32;
    fn handle_param_mut(&mut self) -> &mut SoundParam;
    fn set_handle_volume(&mut self, volume: f32, fade_frames: u32);
    fn set_player_priority(&mut self, priority: i32);
    fn set_stop_callback(&mut self, callback: SoundStopCallback);
    fn set_track_volume(&mut self, mask: u32, volume: f32, fade_frames: u32) -> bool;
    fn set_auto_stop(&mut self, counter: u32, fade_frames: u32);
    fn calculation_values(&self) -> SoundParamCalculationValues;
    fn user_data(&self) -> u32;
}

impl HandleTarget for BasicSound {
    fn holds_handle(&self, slot: HandleSlot, token: u64) -> bool {
        BasicSound::holds_handle(self, slot, token)
    }

    fn release_handle(&mut self, slot: HandleSlot, token: u64) {
        BasicSound::release_handle(self, slot, token)
    }

    fn instance_id(&self) -> SoundInstanceId {
        self.id()
    }

    fn sound_id(&self) -> SoundId {
        BasicSound::sound_id(self)
    }

    fn is_prepared(&self) -> bool {
        BasicSound::is_prepared(self)
    }

    fn start_prepared(&mut self) {
        BasicSound::start_prepared(self)
    }

    fn stop(&mut self, fade_frames: u32) {
        BasicSound::stop(self, fade_frames)
    }

    fn pause(&mut self, flag: bool, fade_frames: u32) {
        BasicSound::pause(self, flag, fade_frames)
    }

    fn mute(&mut self, flag: bool, fade_frames: u32) {
        BasicSound::mute(self, flag, fade_frames)
    }

    fn player_state(&self) -> PlayerState {
        BasicSound::player_state(self)
    }

    fn pause_state(&self) -> PauseState {
        BasicSound::pause_state(self)
    }

    fn mute_state(&self) -> MuteState {
        BasicSound::mute_state(self)
    }

    fn remaining_fade_frames(&self) -> u32 {
        BasicSound::remaining_fade_frames(self)
    }

    fn remaining_pause_fade_frames(&self) -> u32 {
        BasicSound::remaining_pause_fade_frames(self)
    }

    fn remaining_mute_fade_frames(&self) -> u32 {
        BasicSound::remaining_mute_fade_frames(self)
    }

    fn handle_param_mut(&mut self) -> &mut SoundParam {
        BasicSound::handle_param_mut(self)
    }

    fn set_handle_volume(&mut self, volume: f32, fade_frames: u32) {
        BasicSound::set_handle_volume(self, volume, fade_frames)
    }

    fn set_player_priority(&mut self, priority: i32) {
        BasicSound::set_player_priority(self, priority)
    }

    fn set_stop_callback(&mut self, callback: SoundStopCallback) {
        BasicSound::set_stop_callback(self, callback)
    }

    fn set_track_volume(&mut self, mask: u32, volume: f32, fade_frames: u32) -> bool {
        BasicSound::set_track_volume(self, mask, volume, fade_frames)
    }

    fn set_auto_stop(&mut self, counter: u32, fade_frames: u32) {
        BasicSound::set_auto_stop(self, counter, fade_frames)
    }

    fn calculation_values(&self) -> SoundParamCalculationValues {
        *BasicSound::calculation_values(self)
    }

    fn user_data(&self) -> u32 {
        BasicSound::user_data(self)
    }
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

pub struct SoundHandle {
    target: Option<Weak<Mutex<dyn HandleTarget>>>,
    slot: HandleSlot,
    token: u64,
}

impl Default for SoundHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundHandle {
    pub fn new() -> Self {
        Self {
            target: None,
            slot: HandleSlot::General,
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Point this handle at `sound` through `slot`, detaching it from any
    /// previous sound first.
    pub(crate) fn attach(&mut self, sound: &SharedSound, slot: HandleSlot) {
        self.detach();
        sound.lock().attach_handle(slot, self.token);
        let target: Arc<Mutex<dyn HandleTarget>> = sound.clone();
        self.target = Some(Arc::downgrade(&target));
        self.slot = slot;
    }

    /// Run `f` on the sound if this handle still holds its slot.
    fn with<R>(&self, f: impl FnOnce(&mut dyn HandleTarget) -> R) -> Option<R> {
        let target = self.target.as_ref()?.upgrade()?;
        let mut guard = target.lock();
        if !guard.holds_handle(self.slot, self.token) {
            return None;
        }
        Some(f(&mut *guard))
    }

    pub fn is_attached(&self) -> bool {
        self.with(|_| ()).is_some()
    }

    /// Let go of the sound. The sound keeps playing.
    pub fn detach(&mut self) {
        if let Some(target) = self.target.take().and_then(|w| w.upgrade()) {
            target.lock().release_handle(self.slot, self.token);
        }
    }

    pub fn id(&self) -> Option<SoundInstanceId> {
        self.with(|s| s.instance_id())
    }

    pub fn sound_id(&self) -> Option<SoundId> {
        self.with(|s| s.sound_id())
    }

    pub fn is_prepared(&self) -> bool {
        self.with(|s| s.is_prepared()).unwrap_or(false)
    }

    pub fn start_prepared(&self) {
        self.with(|s| s.start_prepared());
    }

    pub fn stop(&self, fade_frames: u32) {
        self.with(|s| s.stop(fade_frames));
    }

    pub fn pause(&self, flag: bool, fade_frames: u32) {
        self.with(|s| s.pause(flag, fade_frames));
    }

    pub fn mute(&self, flag: bool, fade_frames: u32) {
        self.with(|s| s.mute(flag, fade_frames));
    }

    pub fn player_state(&self) -> Option<PlayerState> {
        self.with(|s| s.player_state())
    }

    pub fn pause_state(&self) -> Option<PauseState> {
        self.with(|s| s.pause_state())
    }

    pub fn mute_state(&self) -> Option<MuteState> {
        self.with(|s| s.mute_state())
    }

    pub fn remaining_fade_frames(&self) -> u32 {
        self.with(|s| s.remaining_fade_frames()).unwrap_or(0)
    }

    pub fn remaining_pause_fade_frames(&self) -> u32 {
        self.with(|s| s.remaining_pause_fade_frames()).unwrap_or(0)
    }

    pub fn remaining_mute_fade_frames(&self) -> u32 {
        self.with(|s| s.remaining_mute_fade_frames()).unwrap_or(0)
    }

    // Handle layer. Values are picked up on the next frame.

    fn edit(&self, f: impl FnOnce(&mut SoundParam)) {
        self.with(|s| f(s.handle_param_mut()));
    }

    pub fn set_volume(&self, volume: f32, fade_frames: u32) {
        self.with(|s| s.set_handle_volume(volume, fade_frames));
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.edit(|p| p.pitch = pitch.max(0.0));
    }

    pub fn set_lpf_freq(&self, lpf: f32) {
        self.edit(|p| p.lpf = lpf);
    }

    pub fn set_biquad_filter(&self, filter_type: BiquadFilterType, value: f32) {
        self.edit(|p| p.biquad = BiquadFilter::new(filter_type, value));
    }

    pub fn set_pan(&self, pan: f32) {
        self.edit(|p| p.pan = pan);
    }

    pub fn set_surround_pan(&self, pan: f32) {
        self.edit(|p| p.surround_pan = pan);
    }

    pub fn set_main_send(&self, send: f32) {
        self.edit(|p| p.main_send = send);
    }

    pub fn set_effect_send(&self, bus: AuxBus, send: f32) {
        self.edit(|p| p.set_effect_send(bus, send));
    }

    pub fn set_output_line(&self, lines: u32) {
        self.edit(|p| p.set_output_line(lines));
    }

    pub fn reset_output_line(&self) {
        self.edit(|p| p.reset_output_line());
    }

    pub fn set_output_volume(&self, device: OutputDevice, volume: f32) {
        self.edit(|p| p.output_mut(device).volume = volume.max(0.0));
    }

    pub fn set_output_pan(&self, device: OutputDevice, pan: f32) {
        self.edit(|p| p.output_mut(device).pan = pan);
    }

    pub fn set_output_surround_pan(&self, device: OutputDevice, pan: f32) {
        self.edit(|p| p.output_mut(device).surround_pan = pan);
    }

    pub fn set_output_main_send(&self, device: OutputDevice, send: f32) {
        self.edit(|p| p.output_mut(device).main_send = send);
    }

    pub fn set_output_effect_send(&self, device: OutputDevice, bus: AuxBus, send: f32) {
        self.edit(|p| p.output_mut(device).set_effect_send(bus, send));
    }

    pub fn set_player_priority(&self, priority: i32) {
        self.with(|s| s.set_player_priority(priority));
    }

    pub fn set_user_data(&self, data: u32) {
        self.edit(|p| p.user_data = data);
    }

    pub fn user_data(&self) -> Option<u32> {
        self.with(|s| s.user_data())
    }

    pub fn set_stop_callback(&self, callback: impl FnOnce(SoundInstanceId) + Send + 'static) {
        self.with(|s| s.set_stop_callback(Box::new(callback)));
    }

    /// Ramp stream track volumes. False if not attached to a stream sound.
    pub fn set_track_volume(&self, mask: u32, volume: f32, fade_frames: u32) -> bool {
        self.with(|s| s.set_track_volume(mask, volume, fade_frames))
            .unwrap_or(false)
    }

    pub(crate) fn renew_auto_stop(&self, counter: u32, fade_frames: u32) -> bool {
        self.with(|s| s.set_auto_stop(counter, fade_frames)).is_some()
    }

    pub fn calculation_values(&self) -> Option<SoundParamCalculationValues> {
        self.with(|s| s.calculation_values())
    }
}

impl Drop for SoundHandle {
    fn drop(&mut self) {
        self.detach();
    }
}
