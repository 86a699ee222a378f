//! Sound kinds.
//!
//! Every sound is one of a closed set of kinds. The resolver calls into the
//! kind at fixed points of the frame (`prepare_step`, `update_move_value`,
//! `on_update_param`, `on_update_player_priority`, `advance`) and asks it how
//! many voices it needs and how loud each one is.

use atk_core::constants::{PLAYER_PRIORITY_MAX, PLAYER_PRIORITY_MIN};
use atk_core::{MoveValue, ResolvedParam};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Per-voice volume factors.
pub type VoiceVolumes = SmallVec<[f32; 8]>;

/// Kind description as authored in the sound archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SoundKindInfo {
    Sequence {
        voice_count: u8,
        /// Length in frames; `None` loops.
        #[serde(default)]
        length_frames: Option<u64>,
        #[serde(default)]
        priority_offset: i32,
    },
    Wave {
        channel_count: u8,
        #[serde(default)]
        length_frames: Option<u64>,
    },
    Stream {
        track_count: u8,
        channel_count: u8,
        prefetch_frames: u32,
        #[serde(default)]
        length_frames: Option<u64>,
    },
}

impl Default for SoundKindInfo {
    fn default() -> Self {
        SoundKindInfo::Wave {
            channel_count: 1,
            length_frames: None,
        }
    }
}

/// Playback cursor shared by every kind.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cursor {
    position: f64,
    length: Option<u64>,
    rate: f64,
}

impl Cursor {
    fn new(length: Option<u64>) -> Self {
        Self {
            position: 0.0,
            length,
            rate: 1.0,
        }
    }

    /// Step one frame. False once the end is reached.
    fn advance(&mut self) -> bool {
        self.position += self.rate;
        match self.length {
            Some(len) => self.position < len as f64,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSound {
    voice_count: u8,
    priority_offset: i32,
    voice_priority: i32,
    cursor: Cursor,
}

impl SequenceSound {
    pub fn voice_priority(&self) -> i32 {
        self.voice_priority
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveSound {
    channel_count: u8,
    cursor: Cursor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSound {
    channel_count: u8,
    prefetch_frames: u32,
    prefetched: u32,
    track_volumes: SmallVec<[MoveValue; 8]>,
    cursor: Cursor,
}

impl StreamSound {
    pub fn track_count(&self) -> usize {
        self.track_volumes.len()
    }

    pub fn track_volume(&self, track: usize) -> Option<f32> {
        self.track_volumes.get(track).map(MoveValue::value)
    }

    /// Ramp the volume of every track whose bit is set in `mask`.
    pub fn set_track_volume(&mut self, mask: u32, volume: f32, fade_frames: u32) {
        for (i, track) in self.track_volumes.iter_mut().enumerate().take(32) {
            if mask & (1 << i) != 0 {
                track.set_target(volume.max(0.0), fade_frames);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoundKind {
    Sequence(SequenceSound),
    Wave(WaveSound),
    Stream(StreamSound),
}

impl SoundKind {
    pub fn from_info(info: &SoundKindInfo) -> Self {
        match *info {
            SoundKindInfo::Sequence {
                voice_count,
                length_frames,
                priority_offset,
            } => SoundKind::Sequence(SequenceSound {
                voice_count,
                priority_offset,
                voice_priority: priority_offset,
                cursor: Cursor::new(length_frames),
            }),
            SoundKindInfo::Wave {
                channel_count,
                length_frames,
            } => SoundKind::Wave(WaveSound {
                channel_count,
                cursor: Cursor::new(length_frames),
            }),
            SoundKindInfo::Stream {
                track_count,
                channel_count,
                prefetch_frames,
                length_frames,
            } => SoundKind::Stream(StreamSound {
                channel_count,
                prefetch_frames,
                prefetched: 0,
                track_volumes: (0..track_count).map(|_| MoveValue::new(1.0)).collect(),
                cursor: Cursor::new(length_frames),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SoundKind::Sequence(_) => "sequence",
            SoundKind::Wave(_) => "wave",
            SoundKind::Stream(_) => "stream",
        }
    }

    /// Ready to start playing. Streams need their prefetch first.
    pub fn is_prepared(&self) -> bool {
        match self {
            SoundKind::Stream(s) => s.prefetched >= s.prefetch_frames,
            SoundKind::Sequence(_) | SoundKind::Wave(_) => true,
        }
    }

    /// One frame of preparation work while not yet prepared.
    pub fn prepare_step(&mut self) {
        if let SoundKind::Stream(s) = self {
            s.prefetched = (s.prefetched + 1).min(s.prefetch_frames);
        }
    }

    /// Advance kind-specific ramps.
    pub fn update_move_value(&mut self) {
        if let SoundKind::Stream(s) = self {
            s.track_volumes.iter_mut().for_each(MoveValue::update);
        }
    }

    /// Called after every resolution with the merged parameters.
    pub fn on_update_param(&mut self, param: &ResolvedParam) {
        let rate = f64::from(param.pitch);
        match self {
            SoundKind::Sequence(s) => s.cursor.rate = rate,
            SoundKind::Wave(s) => s.cursor.rate = rate,
            SoundKind::Stream(s) => s.cursor.rate = rate,
        }
    }

    /// Called when the resolved player priority changes.
    pub fn on_update_player_priority(&mut self, priority: i32) {
        if let SoundKind::Sequence(s) = self {
            s.voice_priority =
                (priority + s.priority_offset).clamp(PLAYER_PRIORITY_MIN, PLAYER_PRIORITY_MAX);
        }
    }

    /// Step playback one frame. False at the natural end.
    pub fn advance(&mut self) -> bool {
        match self {
            SoundKind::Sequence(s) => s.cursor.advance(),
            SoundKind::Wave(s) => s.cursor.advance(),
            SoundKind::Stream(s) => s.cursor.advance(),
        }
    }

    /// Frames played so far, pitch-scaled.
    pub fn position(&self) -> f64 {
        match self {
            SoundKind::Sequence(s) => s.cursor.position,
            SoundKind::Wave(s) => s.cursor.position,
            SoundKind::Stream(s) => s.cursor.position,
        }
    }

    pub fn voice_count(&self) -> usize {
        match self {
            SoundKind::Sequence(s) => usize::from(s.voice_count),
            SoundKind::Wave(s) => usize::from(s.channel_count),
            SoundKind::Stream(s) => s.track_volumes.len() * usize::from(s.channel_count),
        }
    }

    pub fn needs_player_heap(&self) -> bool {
        matches!(self, SoundKind::Sequence(_))
    }

    /// Priority to allocate and keep voices at.
    pub fn voice_priority(&self, player_priority: i32) -> i32 {
        match self {
            SoundKind::Sequence(s) => {
                (player_priority + s.priority_offset).clamp(PLAYER_PRIORITY_MIN, PLAYER_PRIORITY_MAX)
            }
            SoundKind::Wave(_) | SoundKind::Stream(_) => player_priority,
        }
    }

    /// Volume factor of each voice, in voice order.
    pub fn voice_volume(&self) -> VoiceVolumes {
        match self {
            SoundKind::Stream(s) => s
                .track_volumes
                .iter()
                .flat_map(|t| std::iter::repeat(t.value()).take(usize::from(s.channel_count)))
                .collect(),
            _ => std::iter::repeat(1.0).take(self.voice_count()).collect(),
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut StreamSound> {
        match self {
            SoundKind::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamSound> {
        match self {
            SoundKind::Stream(s) => Some(s),
            _ => None,
        }
    }
}
