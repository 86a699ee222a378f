//! Sound players.
//!
//! A player caps how many sounds of a category play at once. Admission
//! past the cap evicts the lowest-priority sound, but only for a strictly
//! higher-priority newcomer. Ties are broken by age: by default the oldest
//! sound is evicted first, a first-come-based player evicts the newest.

use std::cmp::{Ordering, Reverse};

use atk_core::{AuxBus, BiquadFilter, BiquadFilterType, Bus, SoundParam};
use tracing::{debug, trace};

use crate::basic_sound::SharedSound;
use crate::error::StartError;
use crate::id::{PlayerId, SoundInstanceId};

/// A fixed-size work buffer lent to one sound at a time.
#[derive(Debug)]
pub struct PlayerHeap {
    id: usize,
    buffer: Box<[u8]>,
}

impl PlayerHeap {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }
}

/// Free list of player heaps.
#[derive(Debug, Default)]
pub struct PlayerHeapList {
    free: Vec<PlayerHeap>,
    total: usize,
}

impl PlayerHeapList {
    pub fn create(count: usize, size: usize) -> Self {
        let free = (0..count)
            .map(|id| PlayerHeap {
                id,
                buffer: vec![0u8; size].into_boxed_slice(),
            })
            .collect();
        Self { free, total: count }
    }

    pub fn alloc(&mut self) -> Option<PlayerHeap> {
        self.free.pop()
    }

    pub fn free(&mut self, mut heap: PlayerHeap) {
        heap.buffer.fill(0);
        self.free.push(heap);
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn total_count(&self) -> usize {
        self.total
    }
}

#[derive(Debug, Clone, Copy)]
struct PriorityEntry {
    id: SoundInstanceId,
    priority: i32,
    serial: u64,
}

struct PlayerEntry {
    id: SoundInstanceId,
    sound: SharedSound,
}

pub struct SoundPlayer {
    id: PlayerId,
    name: String,
    playable_sound_count: usize,
    first_come_based: bool,
    param: SoundParam,

    /// Insertion order.
    sounds: Vec<PlayerEntry>,
    /// Ascending: index 0 is the next eviction victim.
    priority_list: Vec<PriorityEntry>,
    next_serial: u64,

    heaps: PlayerHeapList,
}

impl SoundPlayer {
    pub fn new(id: PlayerId, name: impl Into<String>, playable_sound_count: usize) -> Self {
        Self {
            id,
            name: name.into(),
            playable_sound_count,
            first_come_based: false,
            param: SoundParam::default(),
            sounds: Vec::new(),
            priority_list: Vec::new(),
            next_serial: 0,
            heaps: PlayerHeapList::default(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn order(&self, a: &PriorityEntry, b: &PriorityEntry) -> Ordering {
        if self.first_come_based {
            (a.priority, Reverse(a.serial)).cmp(&(b.priority, Reverse(b.serial)))
        } else {
            (a.priority, a.serial).cmp(&(b.priority, b.serial))
        }
    }

    // ── Admission ───────────────────────────────────────────────

    pub fn playable_sound_count(&self) -> usize {
        self.playable_sound_count
    }

    /// Change the cap. Returns the sounds stopped to fit the new cap,
    /// lowest priority first; the caller finalizes them.
    pub fn set_playable_sound_count(&mut self, count: usize) -> Vec<SharedSound> {
        self.playable_sound_count = count;
        let mut removed = Vec::new();
        while self.sounds.len() > count {
            let victim = self.priority_list[0].id;
            if let Some(sound) = self.remove_sound(victim) {
                sound.lock().force_stop();
                removed.push(sound);
            }
        }
        if !removed.is_empty() {
            debug!(player = %self.name, count, stopped = removed.len(), "Playable count reduced");
        }
        removed
    }

    pub fn is_first_come_based(&self) -> bool {
        self.first_come_based
    }

    pub fn set_first_come_based(&mut self, flag: bool) {
        self.first_come_based = flag;
        self.sort_priority_list();
    }

    pub fn playing_sound_count(&self) -> usize {
        self.sounds.len()
    }

    pub fn lowest_priority(&self) -> Option<i32> {
        self.priority_list.first().map(|e| e.priority)
    }

    /// Whether a sound of `priority` would be admitted right now.
    pub fn can_play_sound(&self, priority: i32) -> bool {
        if self.playable_sound_count == 0 {
            return false;
        }
        if self.sounds.len() < self.playable_sound_count {
            return true;
        }
        self.lowest_priority().is_some_and(|lowest| priority > lowest)
    }

    /// Admit `sound`. Returns the sound evicted to make room, already
    /// force-stopped, for the caller to finalize.
    pub(crate) fn append_sound(&mut self, sound: SharedSound) -> Result<Option<SharedSound>, StartError> {
        let (id, priority) = {
            let s = sound.lock();
            (s.id(), s.priority())
        };
        if !self.can_play_sound(priority) {
            trace!(player = %self.name, priority, "Sound refused");
            return Err(StartError::LowPriority);
        }

        let evicted = if self.sounds.len() >= self.playable_sound_count {
            let victim = self.priority_list[0].id;
            let evicted = self.remove_sound(victim);
            if let Some(s) = &evicted {
                let mut s = s.lock();
                debug!(player = %self.name, evicted = %s.id(), by = %id, "Sound evicted");
                s.force_stop();
            }
            evicted
        } else {
            None
        };

        let entry = PriorityEntry {
            id,
            priority,
            serial: self.next_serial,
        };
        self.next_serial += 1;
        let at = self
            .priority_list
            .partition_point(|e| self.order(e, &entry) == Ordering::Less);
        self.priority_list.insert(at, entry);
        self.sounds.push(PlayerEntry { id, sound });
        Ok(evicted)
    }

    pub(crate) fn remove_sound(&mut self, id: SoundInstanceId) -> Option<SharedSound> {
        self.priority_list.retain(|e| e.id != id);
        let at = self.sounds.iter().position(|e| e.id == id)?;
        Some(self.sounds.remove(at).sound)
    }

    /// Drop every sound that is no longer playing from the lists.
    pub(crate) fn take_stopped(&mut self) -> Vec<SharedSound> {
        let stopped: Vec<SoundInstanceId> = self
            .sounds
            .iter()
            .filter(|e| !e.sound.lock().is_playing())
            .map(|e| e.id)
            .collect();
        stopped
            .into_iter()
            .filter_map(|id| self.remove_sound(id))
            .collect()
    }

    pub(crate) fn sounds(&self) -> impl Iterator<Item = &SharedSound> {
        self.sounds.iter().map(|e| &e.sound)
    }

    /// Refresh cached priorities and restore the eviction order.
    pub(crate) fn sort_priority_list(&mut self) {
        for entry in &mut self.priority_list {
            if let Some(e) = self.sounds.iter().find(|s| s.id == entry.id) {
                entry.priority = e.sound.lock().priority();
            }
        }
        let mut list = std::mem::take(&mut self.priority_list);
        list.sort_by(|a, b| self.order(a, b));
        self.priority_list = list;
    }

    pub fn stop_all_sound(&self, fade_frames: u32) {
        for sound in self.sounds() {
            sound.lock().stop(fade_frames);
        }
    }

    pub fn pause_all_sound(&self, flag: bool, fade_frames: u32) {
        for sound in self.sounds() {
            sound.lock().pause(flag, fade_frames);
        }
    }

    // ── Player layer ────────────────────────────────────────────

    pub fn param(&self) -> &SoundParam {
        &self.param
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.param.volume = volume.max(0.0);
    }

    pub fn volume(&self) -> f32 {
        self.param.volume
    }

    pub fn set_low_pass_filter_frequency(&mut self, lpf: f32) {
        self.param.lpf = lpf;
    }

    pub fn set_biquad_filter(&mut self, filter_type: BiquadFilterType, value: f32) {
        self.param.biquad = BiquadFilter::new(filter_type, value);
    }

    pub fn set_main_send(&mut self, send: f32) {
        self.param.main_send = send;
    }

    pub fn set_effect_send(&mut self, bus: AuxBus, send: f32) {
        self.param.set_effect_send(bus, send);
    }

    pub fn set_send(&mut self, bus: Bus, send: f32) {
        self.param.set_send(bus, send);
    }

    pub fn set_output_line(&mut self, lines: u32) {
        self.param.set_output_line(lines);
    }

    pub fn reset_output_line(&mut self) {
        self.param.reset_output_line();
    }

    // ── Player heaps ────────────────────────────────────────────

    /// Replace the heap pool with `count` buffers of `size` bytes.
    pub fn create_player_heaps(&mut self, count: usize, size: usize) {
        self.heaps = PlayerHeapList::create(count, size);
    }

    pub(crate) fn alloc_player_heap(&mut self) -> Option<PlayerHeap> {
        self.heaps.alloc()
    }

    pub(crate) fn free_player_heap(&mut self, heap: PlayerHeap) {
        self.heaps.free(heap);
    }

    pub fn free_player_heap_count(&self) -> usize {
        self.heaps.free_count()
    }

    pub fn player_heap_count(&self) -> usize {
        self.heaps.total_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_sound::BasicSound;
    use crate::id::SoundId;
    use crate::kind::{SoundKind, SoundKindInfo};
    use atk_core::SoundArchiveParam;
    use atk_hardware::{HardwareManager, HardwareManagerParameter, OutputReceiver, SoftwareRenderer};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn sound(priority: i32) -> SharedSound {
        let archive = SoundArchiveParam {
            player_priority: priority,
            ..Default::default()
        };
        Arc::new(Mutex::new(BasicSound::new(
            SoundId(0),
            PlayerId(0),
            archive,
            SoundKind::from_info(&SoundKindInfo::default()),
        )))
    }

    fn id_of(s: &SharedSound) -> SoundInstanceId {
        s.lock().id()
    }

    #[test]
    fn test_evicts_lowest_for_strictly_higher() {
        let mut player = SoundPlayer::new(PlayerId(0), "se", 2);
        let a = sound(0);
        let b = sound(5);
        player.append_sound(a.clone()).unwrap();
        player.append_sound(b.clone()).unwrap();

        let c = sound(3);
        let evicted = player.append_sound(c.clone()).unwrap().unwrap();
        assert_eq!(id_of(&evicted), id_of(&a));
        assert_eq!(player.playing_sound_count(), 2);
        assert_eq!(player.lowest_priority(), Some(3));
    }

    #[test]
    fn test_equal_priority_is_refused() {
        let mut player = SoundPlayer::new(PlayerId(0), "se", 1);
        player.append_sound(sound(10)).unwrap();
        assert!(!player.can_play_sound(10));
        assert_eq!(player.append_sound(sound(10)).err(), Some(StartError::LowPriority));
        assert!(player.can_play_sound(11));
    }

    #[test]
    fn test_zero_cap_never_plays() {
        let mut player = SoundPlayer::new(PlayerId(0), "muted", 0);
        assert!(!player.can_play_sound(127));
        assert!(player.append_sound(sound(127)).is_err());
    }

    #[test]
    fn test_tie_order_follows_first_come_flag() {
        let mut player = SoundPlayer::new(PlayerId(0), "bgm", 2);
        let old = sound(5);
        let new = sound(5);
        player.append_sound(old.clone()).unwrap();
        player.append_sound(new.clone()).unwrap();
        let evicted = player.append_sound(sound(6)).unwrap().unwrap();
        assert_eq!(id_of(&evicted), id_of(&old));

        let mut player = SoundPlayer::new(PlayerId(1), "voice", 2);
        player.set_first_come_based(true);
        let old = sound(5);
        let new = sound(5);
        player.append_sound(old.clone()).unwrap();
        player.append_sound(new.clone()).unwrap();
        let evicted = player.append_sound(sound(6)).unwrap().unwrap();
        assert_eq!(id_of(&evicted), id_of(&new));
    }

    #[test]
    fn test_shrinking_cap_stops_lowest() {
        let mut player = SoundPlayer::new(PlayerId(0), "se", 3);
        let low = sound(1);
        player.append_sound(sound(9)).unwrap();
        player.append_sound(low.clone()).unwrap();
        player.append_sound(sound(4)).unwrap();

        let removed = player.set_playable_sound_count(2);
        assert_eq!(removed.len(), 1);
        assert_eq!(id_of(&removed[0]), id_of(&low));
        assert_eq!(player.playing_sound_count(), 2);
    }

    #[test]
    fn test_sort_after_priority_change() {
        let mut player = SoundPlayer::new(PlayerId(0), "se", 2);
        let a = sound(2);
        let b = sound(8);
        let hw = HardwareManager::initialize(
            HardwareManagerParameter::default().with_sound_thread(false),
            Box::new(SoftwareRenderer::new()),
        )
        .unwrap();
        assert!(b.lock().initialize(OutputReceiver::FinalMix, &hw));
        player.append_sound(a.clone()).unwrap();
        player.append_sound(b.clone()).unwrap();
        assert_eq!(player.lowest_priority(), Some(2));

        b.lock().set_player_priority(1);
        assert!(b.lock().update(&SoundParam::default()).priority_changed);
        player.sort_priority_list();
        assert_eq!(player.lowest_priority(), Some(1));
        b.lock().finalize();
    }

    #[test]
    fn test_player_heap_pool() {
        let mut player = SoundPlayer::new(PlayerId(0), "seq", 1);
        player.create_player_heaps(2, 64);
        let mut heap = player.alloc_player_heap().unwrap();
        assert_eq!(heap.size(), 64);
        heap.as_mut_slice()[0] = 0xAA;
        assert_eq!(player.free_player_heap_count(), 1);
        player.alloc_player_heap().unwrap();
        assert!(player.alloc_player_heap().is_none());
        player.free_player_heap(heap);
        let mut heap = player.alloc_player_heap().unwrap();
        assert_eq!(heap.as_mut_slice()[0], 0);
    }
}
