//! Low-level voice allocation.
//!
//! Voices live in a fixed slab sized to the soft ceiling. Ids carry a
//! generation so a handle to a freed or dropped voice is detected instead of
//! silently writing into someone else's slot.

use atk_core::constants::ATK_VOICE_COUNT_MAX;
use atk_core::ResolvedParam;
use tracing::debug;

use crate::submix::OutputReceiver;

/// Generational handle to a low-level voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId {
    index: u32,
    generation: u32,
}

impl VoiceId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Parameters the renderer reads for one voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParam {
    pub param: ResolvedParam,
    pub paused: bool,
    pub receiver: OutputReceiver,
}

impl Default for VoiceParam {
    fn default() -> Self {
        Self {
            param: ResolvedParam::default(),
            paused: false,
            receiver: OutputReceiver::FinalMix,
        }
    }
}

#[derive(Debug)]
struct ActiveVoice {
    serial: u64,
    param: VoiceParam,
}

#[derive(Debug)]
struct VoiceSlot {
    generation: u32,
    voice: Option<ActiveVoice>,
}

/// Fixed-capacity voice pool.
#[derive(Debug)]
pub struct VoiceAllocator {
    slots: Vec<VoiceSlot>,
    free: Vec<u32>,
    drop_enabled: bool,
    serial: u64,
    dropped_count: u64,
}

impl VoiceAllocator {
    /// Create a pool of `capacity` voices. Capacity is capped at the hard ceiling.
    pub fn new(capacity: usize, drop_enabled: bool) -> Self {
        debug_assert!(capacity <= ATK_VOICE_COUNT_MAX);
        let capacity = capacity.min(ATK_VOICE_COUNT_MAX);
        Self {
            slots: (0..capacity)
                .map(|_| VoiceSlot {
                    generation: 0,
                    voice: None,
                })
                .collect(),
            free: (0..capacity as u32).rev().collect(),
            drop_enabled,
            serial: 0,
            dropped_count: 0,
        }
    }

    /// Allocate a voice at `priority`.
    ///
    /// When the pool is full and voice drop is enabled, the lowest-priority
    /// voice (oldest first on ties) is dropped if its priority does not exceed
    /// the request. Otherwise allocation fails.
    pub fn alloc(&mut self, priority: i32) -> Option<VoiceId> {
        self.serial += 1;
        let mut param = VoiceParam::default();
        param.param.priority = priority;
        let voice = ActiveVoice {
            serial: self.serial,
            param,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.voice = Some(voice);
            return Some(VoiceId {
                index,
                generation: slot.generation,
            });
        }

        if !self.drop_enabled {
            return None;
        }

        let (index, victim_priority) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.voice.as_ref().map(|v| (i, v.param.param.priority, v.serial)))
            .min_by_key(|&(_, p, serial)| (p, serial))
            .map(|(i, p, _)| (i, p))?;

        if victim_priority > priority {
            return None;
        }

        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        slot.voice = Some(voice);
        self.dropped_count += 1;
        debug!(
            voice = index,
            victim_priority, priority, "Dropped lowest-priority voice"
        );
        Some(VoiceId {
            index: index as u32,
            generation: slot.generation,
        })
    }

    /// Release a voice. Stale ids are ignored.
    pub fn free(&mut self, id: VoiceId) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.voice = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                true
            }
            None => false,
        }
    }

    fn slot_mut(&mut self, id: VoiceId) -> Option<&mut VoiceSlot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation && s.voice.is_some())
    }

    fn active(&self, id: VoiceId) -> Option<&ActiveVoice> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.voice.as_ref())
    }

    /// Whether `id` still refers to a live voice (not freed, not dropped).
    pub fn is_valid(&self, id: VoiceId) -> bool {
        self.active(id).is_some()
    }

    /// Store parameters for the next render. Returns false for stale ids.
    pub fn set_param(&mut self, id: VoiceId, param: VoiceParam) -> bool {
        match self.slot_mut(id).and_then(|s| s.voice.as_mut()) {
            Some(voice) => {
                voice.param = param;
                true
            }
            None => false,
        }
    }

    pub fn param(&self, id: VoiceId) -> Option<&VoiceParam> {
        self.active(id).map(|v| &v.param)
    }

    pub fn active_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total voices dropped to make room since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Live voices and their parameters.
    pub fn iter(&self) -> impl Iterator<Item = (VoiceId, &VoiceParam)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.voice.as_ref().map(|v| {
                (
                    VoiceId {
                        index: i as u32,
                        generation: s.generation,
                    },
                    &v.param,
                )
            })
        })
    }

    /// Release every voice.
    pub fn clear(&mut self) {
        let ids: Vec<VoiceId> = self.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.free(id);
        }
    }
}
