//! One live sound instance.
//!
//! `BasicSound` owns the per-instance layers (archive base, handle layer,
//! ambient layer, three fade channels) and the play / pause / mute / stop
//! state machines. Once per audio frame `update` folds the layers into the
//! resolved parameters that the sound system commits to the voices.

use std::sync::{Arc, Weak};

use atk_core::constants::{PLAYER_PRIORITY_MAX, PLAYER_PRIORITY_MIN};
use atk_core::{
    FadeVolumeParam, MoveValue, ParamLayers, ResolvedParam, SoundActorParam, SoundArchiveParam,
    SoundParam, SoundParamCalculationValues,
};
use atk_hardware::{HardwareManager, OutputReceiver, VoiceId, VoiceParam};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::actor::ActorShared;
use crate::ambient::{AmbientInfo, AmbientSoundInfo, AmbientState};
use crate::id::{PlayerId, SoundId, SoundInstanceId};
use crate::kind::SoundKind;
use crate::player::PlayerHeap;
use crate::state::{FadeSwitch, Lifecycle, MuteState, PauseState, PlayerState};

/// Runs once when the sound is finalized.
pub type SoundStopCallback = Box<dyn FnOnce(SoundInstanceId) + Send>;

pub(crate) type SharedSound = Arc<Mutex<BasicSound>>;

pub(crate) type VoiceList = SmallVec<[VoiceId; 8]>;

/// Which handle slot of a sound a handle occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleSlot {
    General,
    TempGeneral,
}

#[derive(Debug, Clone, Copy)]
struct AutoStop {
    counter: u32,
    fade_frames: u32,
}

/// Outcome of one frame of `BasicSound::update`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameResult {
    pub priority_changed: bool,
}

/// Resources handed back by `finalize`.
pub(crate) struct Released {
    pub id: SoundInstanceId,
    pub voices: VoiceList,
    pub heap: Option<PlayerHeap>,
    pub receiver: Option<OutputReceiver>,
    pub callback: Option<SoundStopCallback>,
}

pub struct BasicSound {
    id: SoundInstanceId,
    sound_id: SoundId,
    player_id: PlayerId,
    kind: SoundKind,
    lifecycle: Lifecycle,
    player_state: PlayerState,
    start_requested: bool,

    pause: FadeSwitch,
    mute: FadeSwitch,
    stop_fade: MoveValue,
    is_stopping: bool,

    archive: SoundArchiveParam,
    handle_param: SoundParam,
    handle_volume: MoveValue,
    ambient: AmbientState,
    calc: SoundParamCalculationValues,
    priority: i32,

    actor: Option<Weak<ActorShared>>,
    general_handle: Option<u64>,
    temp_handle: Option<u64>,

    voices: VoiceList,
    heap: Option<PlayerHeap>,
    receiver: Option<OutputReceiver>,
    auto_stop: Option<AutoStop>,
    stop_callback: Option<SoundStopCallback>,
    update_frames: u64,
}

impl BasicSound {
    pub fn new(sound_id: SoundId, player_id: PlayerId, archive: SoundArchiveParam, kind: SoundKind) -> Self {
        let priority = archive
            .player_priority
            .clamp(PLAYER_PRIORITY_MIN, PLAYER_PRIORITY_MAX);
        let mut sound = Self {
            id: SoundInstanceId::new(),
            sound_id,
            player_id,
            kind,
            lifecycle: Lifecycle::Constructed,
            player_state: PlayerState::Init,
            start_requested: false,
            pause: FadeSwitch::default(),
            mute: FadeSwitch::default(),
            stop_fade: MoveValue::new(1.0),
            is_stopping: false,
            archive,
            handle_param: SoundParam::default(),
            handle_volume: MoveValue::new(1.0),
            ambient: AmbientState::new(AmbientInfo::default()),
            calc: SoundParamCalculationValues::default(),
            priority,
            actor: None,
            general_handle: None,
            temp_handle: None,
            voices: VoiceList::new(),
            heap: None,
            receiver: None,
            auto_stop: None,
            stop_callback: None,
            update_frames: 0,
        };
        sound.kind.on_update_player_priority(priority);
        sound.calc = SoundParamCalculationValues::compute(&sound.layers(&SoundParam::default()));
        sound
    }

    /// Bind the output receiver. On failure the sound stays `Constructed`
    /// and must be neither updated nor played.
    pub fn initialize(&mut self, receiver: OutputReceiver, hardware: &HardwareManager) -> bool {
        if self.lifecycle != Lifecycle::Constructed {
            warn!(sound = %self.id, lifecycle = ?self.lifecycle, "initialize on a used sound");
            return false;
        }
        if !hardware.bind_receiver(receiver) {
            debug!(sound = %self.id, ?receiver, "Output receiver could not be bound");
            return false;
        }
        self.receiver = Some(receiver);
        self.handle_param.user_data = 0;
        self.lifecycle = Lifecycle::Initialized;
        true
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn id(&self) -> SoundInstanceId {
        self.id
    }

    pub fn sound_id(&self) -> SoundId {
        self.sound_id
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn kind(&self) -> &SoundKind {
        &self.kind
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn player_state(&self) -> PlayerState {
        self.player_state
    }

    pub fn pause_state(&self) -> PauseState {
        self.pause.phase().into()
    }

    pub fn mute_state(&self) -> MuteState {
        self.mute.phase().into()
    }

    pub fn is_stopping(&self) -> bool {
        self.is_stopping
    }

    pub fn is_playing(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized && self.player_state != PlayerState::Stop
    }

    /// Resolved player priority of the last frame.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn calculation_values(&self) -> &SoundParamCalculationValues {
        &self.calc
    }

    pub fn result(&self) -> &ResolvedParam {
        &self.calc.result
    }

    pub fn receiver(&self) -> Option<OutputReceiver> {
        self.receiver
    }

    pub fn voices(&self) -> &[VoiceId] {
        &self.voices
    }

    pub fn has_player_heap(&self) -> bool {
        self.heap.is_some()
    }

    pub fn user_data(&self) -> u32 {
        self.handle_param.user_data
    }

    pub fn remaining_fade_frames(&self) -> u32 {
        self.stop_fade.remaining_frames()
    }

    pub fn remaining_pause_fade_frames(&self) -> u32 {
        self.pause.remaining_frames()
    }

    pub fn remaining_mute_fade_frames(&self) -> u32 {
        self.mute.remaining_frames()
    }

    /// Frames this sound has been updated for.
    pub fn update_frames(&self) -> u64 {
        self.update_frames
    }

    pub fn is_prepared(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
            && self.kind.is_prepared()
            && (!self.kind.needs_player_heap() || self.heap.is_some())
    }

    // ── Attachments ─────────────────────────────────────────────

    pub(crate) fn attach_actor(&mut self, actor: &Arc<ActorShared>) {
        self.actor = Some(Arc::downgrade(actor));
    }

    pub(crate) fn detach_actor(&mut self) {
        self.actor = None;
    }

    pub(crate) fn is_attached_to_actor(&self, actor: &Arc<ActorShared>) -> bool {
        self.actor
            .as_ref()
            .is_some_and(|a| std::ptr::eq(a.as_ptr(), Arc::as_ptr(actor)))
    }

    pub(crate) fn set_ambient_info(&mut self, info: AmbientInfo) {
        self.ambient = AmbientState::new(info);
    }

    pub(crate) fn attach_player_heap(&mut self, heap: PlayerHeap) {
        self.heap = Some(heap);
    }

    pub(crate) fn set_voices(&mut self, voices: VoiceList) {
        self.voices = voices;
    }

    pub(crate) fn take_voices(&mut self) -> VoiceList {
        std::mem::take(&mut self.voices)
    }

    fn handle_slot_mut(&mut self, slot: HandleSlot) -> &mut Option<u64> {
        match slot {
            HandleSlot::General => &mut self.general_handle,
            HandleSlot::TempGeneral => &mut self.temp_handle,
        }
    }

    /// Occupy `slot` with `token`, displacing any previous handle.
    pub(crate) fn attach_handle(&mut self, slot: HandleSlot, token: u64) {
        *self.handle_slot_mut(slot) = Some(token);
    }

    pub(crate) fn holds_handle(&self, slot: HandleSlot, token: u64) -> bool {
        let held = match slot {
            HandleSlot::General => self.general_handle,
            HandleSlot::TempGeneral => self.temp_handle,
        };
        held == Some(token) && self.lifecycle == Lifecycle::Initialized
    }

    /// Release `slot` if `token` still holds it.
    pub(crate) fn release_handle(&mut self, slot: HandleSlot, token: u64) {
        let held = self.handle_slot_mut(slot);
        if *held == Some(token) {
            *held = None;
        }
    }

    // ── Handle layer ────────────────────────────────────────────

    pub(crate) fn handle_param_mut(&mut self) -> &mut SoundParam {
        &mut self.handle_param
    }

    pub(crate) fn set_handle_volume(&mut self, volume: f32, fade_frames: u32) {
        self.handle_volume.set_target(volume.max(0.0), fade_frames);
    }

    pub(crate) fn set_player_priority(&mut self, priority: i32) {
        self.archive.player_priority = priority.clamp(PLAYER_PRIORITY_MIN, PLAYER_PRIORITY_MAX);
    }

    pub(crate) fn set_stop_callback(&mut self, callback: SoundStopCallback) {
        self.stop_callback = Some(callback);
    }

    pub(crate) fn set_track_volume(&mut self, mask: u32, volume: f32, fade_frames: u32) -> bool {
        match self.kind.as_stream_mut() {
            Some(stream) => {
                stream.set_track_volume(mask, volume, fade_frames);
                true
            }
            None => false,
        }
    }

    /// Stop with `fade_frames` unless renewed before the counter runs out.
    pub(crate) fn set_auto_stop(&mut self, counter: u32, fade_frames: u32) {
        self.auto_stop = Some(AutoStop {
            counter,
            fade_frames,
        });
    }

    // ── Playback control ────────────────────────────────────────

    /// Settle the starting player priority: archive priority plus the
    /// ambient delta, clamped. Admission and the first frame then agree.
    pub(crate) fn init_player_priority(&mut self, position: Option<glam::Vec3>) -> i32 {
        let delta = self.ambient.initial_priority(&AmbientSoundInfo {
            instance: self.id,
            sound: self.sound_id,
            position,
        });
        let priority = self
            .archive
            .player_priority
            .saturating_add(delta)
            .clamp(PLAYER_PRIORITY_MIN, PLAYER_PRIORITY_MAX);
        if priority != self.priority {
            self.priority = priority;
            self.kind.on_update_player_priority(priority);
        }
        priority
    }

    /// Start the stop-fade channel at silence and ramp it in.
    pub fn fade_in(&mut self, fade_frames: u32) {
        if self.is_stopping || fade_frames == 0 {
            return;
        }
        self.stop_fade.set(0.0);
        self.stop_fade.set_target(1.0, fade_frames);
    }

    /// Start playing as soon as the sound is prepared.
    pub fn start_prepared(&mut self) {
        if self.lifecycle != Lifecycle::Initialized || self.player_state != PlayerState::Init {
            return;
        }
        self.start_requested = true;
        if self.is_prepared() {
            self.player_state = PlayerState::Play;
            debug!(sound = %self.id, kind = self.kind.name(), "Sound started");
        }
    }

    /// Ramp to silence over `fade_frames`, then stop.
    ///
    /// Zero frames, a sound that never started and a fully paused sound stop
    /// immediately. A second call only shortens a fade already in progress.
    pub fn stop(&mut self, fade_frames: u32) {
        if self.player_state == PlayerState::Stop {
            return;
        }
        if fade_frames == 0 || self.player_state == PlayerState::Init || self.pause.is_engaged() {
            self.force_stop();
            return;
        }
        if self.is_stopping {
            if fade_frames < self.stop_fade.remaining_frames() {
                self.stop_fade.set_target(0.0, fade_frames);
            }
            return;
        }
        self.stop_fade.set_target(0.0, fade_frames);
        self.is_stopping = true;
        trace!(sound = %self.id, fade_frames, "Stop fade started");
    }

    /// Stop immediately, bypassing any fade.
    pub fn force_stop(&mut self) {
        if self.player_state == PlayerState::Stop {
            return;
        }
        self.stop_fade.set(0.0);
        self.player_state = PlayerState::Stop;
        self.is_stopping = false;
        debug!(sound = %self.id, "Sound stopped");
    }

    pub fn pause(&mut self, flag: bool, fade_frames: u32) {
        self.pause.set(flag, fade_frames);
    }

    pub fn mute(&mut self, flag: bool, fade_frames: u32) {
        self.mute.set(flag, fade_frames);
    }

    // ── Frame update ────────────────────────────────────────────

    fn actor_state(&self) -> (SoundActorParam, Option<glam::Vec3>) {
        match self.actor.as_ref().and_then(Weak::upgrade) {
            Some(actor) => (actor.param(), actor.position()),
            None => (SoundActorParam::default(), None),
        }
    }

    fn layers(&self, player: &SoundParam) -> ParamLayers {
        let (actor, _) = self.actor_state();
        let mut handle = self.handle_param;
        handle.volume *= self.handle_volume.value();
        ParamLayers {
            archive: self.archive,
            sound_3d: *self.ambient.param(),
            player: *player,
            actor,
            handle,
            fade: FadeVolumeParam {
                stop_fade_volume: self.stop_fade.value(),
                pause_fade_volume: self.pause.volume(),
                mute_fade_volume: self.mute.volume(),
                is_muted: self.mute.is_on(),
                is_stopping: self.is_stopping,
            },
        }
    }

    /// Advance one audio frame with the owning player's overlay.
    pub(crate) fn update(&mut self, player: &SoundParam) -> FrameResult {
        let mut result = FrameResult::default();
        if self.lifecycle != Lifecycle::Initialized || self.player_state == PlayerState::Stop {
            return result;
        }
        self.update_frames += 1;

        if self.player_state == PlayerState::Init {
            if !self.kind.is_prepared() {
                self.kind.prepare_step();
            }
            if self.start_requested && self.is_prepared() {
                self.player_state = PlayerState::Play;
                debug!(sound = %self.id, kind = self.kind.name(), "Prepared sound started");
            }
        }

        // Fade ramps. The stop fade holds while fully paused.
        self.pause.update();
        self.mute.update();
        if !self.pause.is_engaged() {
            self.stop_fade.update();
        }
        self.handle_volume.update();
        self.kind.update_move_value();

        // Ambient layer.
        let (_, position) = self.actor_state();
        let info = AmbientSoundInfo {
            instance: self.id,
            sound: self.sound_id,
            position,
        };
        self.ambient.update(&info);

        // Merge.
        self.calc = SoundParamCalculationValues::compute(&self.layers(player));
        self.kind.on_update_param(&self.calc.result);
        if self.calc.result.priority != self.priority {
            self.priority = self.calc.result.priority;
            self.kind.on_update_player_priority(self.priority);
            result.priority_changed = true;
        }

        // State transitions.
        self.pause.settle();
        self.mute.settle();
        if self.player_state == PlayerState::Play && !self.pause.is_engaged() && !self.kind.advance() {
            trace!(sound = %self.id, "Natural end");
            self.force_stop();
        }
        if self.is_stopping && self.stop_fade.is_finished() {
            self.player_state = PlayerState::Stop;
            self.is_stopping = false;
            debug!(sound = %self.id, "Stop fade finished");
        }

        // Auto-stop.
        if let Some(auto) = self.auto_stop.as_mut() {
            if auto.counter == 0 {
                let fade = auto.fade_frames;
                self.auto_stop = None;
                trace!(sound = %self.id, "Auto-stop");
                self.stop(fade);
            } else {
                auto.counter -= 1;
            }
        }

        result
    }

    /// Parameters for each voice, in voice order.
    pub(crate) fn voice_params(&self) -> impl Iterator<Item = (VoiceId, VoiceParam)> + '_ {
        let paused = self.player_state != PlayerState::Play || self.pause.is_engaged();
        let receiver = self.receiver.unwrap_or(OutputReceiver::FinalMix);
        let voice_priority = self.kind.voice_priority(self.priority);
        self.voices
            .iter()
            .zip(self.kind.voice_volume())
            .map(move |(&id, volume)| {
                let mut param = self.calc.result.scaled_volume(volume);
                param.priority = voice_priority;
                (
                    id,
                    VoiceParam {
                        param,
                        paused,
                        receiver,
                    },
                )
            })
    }

    /// Detach everything and hand back the resources to release.
    ///
    /// Returns `None` if the sound was never initialized or is already
    /// finalized.
    pub(crate) fn finalize(&mut self) -> Option<Released> {
        if self.lifecycle != Lifecycle::Initialized {
            return None;
        }
        if self.player_state != PlayerState::Stop {
            self.force_stop();
        }
        let (_, position) = self.actor_state();
        self.ambient.free(&AmbientSoundInfo {
            instance: self.id,
            sound: self.sound_id,
            position,
        });
        self.actor = None;
        self.general_handle = None;
        self.temp_handle = None;
        self.auto_stop = None;
        self.lifecycle = Lifecycle::Finalized;
        Some(Released {
            id: self.id,
            voices: self.take_voices(),
            heap: self.heap.take(),
            receiver: self.receiver.take(),
            callback: self.stop_callback.take(),
        })
    }
}

impl Drop for BasicSound {
    fn drop(&mut self) {
        if self.lifecycle == Lifecycle::Initialized {
            warn!(sound = %self.id, "Sound dropped without finalize");
        }
        self.lifecycle = Lifecycle::Destructed;
    }
}
