//! Sub-mix topology.
//!
//! Voices render into an output receiver: either the final mix or a
//! sub-mix. Sub-mixes carry per-bus volume ramps and route into the final mix
//! or into another sub-mix. The preset topology is fixed at initialization;
//! user sub-mixes may be added and removed afterwards.

use atk_core::constants::{BUS_COUNT, SUB_MIX_COUNT_MAX};
use atk_core::{AtkError, MoveValue, Result};
use smallvec::SmallVec;
use tracing::debug;

use crate::parameter::HardwareManagerParameter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubMixId(u32);

/// Where a voice or sub-mix sends its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputReceiver {
    FinalMix,
    SubMix(SubMixId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubMixKind {
    /// Main bus plus aux buses.
    PresetMain,
    /// Extra preset sub-mix for the additional effect bus.
    PresetAdditional,
    /// Caller-shaped sub-mix from custom sub-mix mode.
    Custom,
    /// Added at runtime with `add_sub_mix`.
    User,
}

impl SubMixKind {
    fn is_removable(self) -> bool {
        self == SubMixKind::User
    }
}

type BusVolumes = SmallVec<[MoveValue; BUS_COUNT]>;

#[derive(Debug, Clone)]
pub struct FinalMix {
    channel_count: u32,
    volume: MoveValue,
    bus_volumes: BusVolumes,
}

impl FinalMix {
    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }
}

#[derive(Debug, Clone)]
pub struct SubMix {
    id: SubMixId,
    kind: SubMixKind,
    channel_count: u32,
    volume: MoveValue,
    bus_volumes: BusVolumes,
    destination: OutputReceiver,
    bound_receivers: usize,
}

impl SubMix {
    pub fn id(&self) -> SubMixId {
        self.id
    }

    pub fn kind(&self) -> SubMixKind {
        self.kind
    }

    pub fn bus_count(&self) -> usize {
        self.bus_volumes.len()
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    pub fn destination(&self) -> OutputReceiver {
        self.destination
    }

    pub fn bus_volume(&self, bus: usize) -> Option<f32> {
        self.bus_volumes.get(bus).map(MoveValue::value)
    }
}

/// Frozen view of one mix stage handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct MixState {
    pub receiver: OutputReceiver,
    pub channel_count: u32,
    pub volume: f32,
    pub bus_volumes: SmallVec<[f32; BUS_COUNT]>,
    pub destination: Option<OutputReceiver>,
}

/// The final mix plus every sub-mix.
#[derive(Debug)]
pub struct SubMixList {
    final_mix: FinalMix,
    sub_mixes: Vec<SubMix>,
    next_id: u32,
    user_count_max: usize,
}

fn bus_volumes(count: usize) -> BusVolumes {
    (0..count).map(|_| MoveValue::new(1.0)).collect()
}

impl SubMixList {
    /// Build the topology described by `parameter`.
    pub fn new(parameter: &HardwareManagerParameter) -> Self {
        let channel_count = parameter
            .output_modes
            .iter()
            .map(|m| m.channel_count())
            .max()
            .unwrap_or(2);

        let mut list = Self {
            final_mix: FinalMix {
                channel_count,
                volume: MoveValue::new(1.0),
                bus_volumes: bus_volumes(BUS_COUNT),
            },
            sub_mixes: Vec::new(),
            next_id: 0,
            user_count_max: parameter.user_sub_mix_count_max,
        };

        if !parameter.is_sub_mix_enabled {
            return list;
        }

        if parameter.is_custom_sub_mix_enabled {
            for _ in 0..parameter.custom_sub_mix_count {
                list.push(
                    SubMixKind::Custom,
                    parameter.custom_bus_count,
                    parameter.custom_channel_count,
                    OutputReceiver::FinalMix,
                );
            }
        } else {
            list.push(SubMixKind::PresetMain, BUS_COUNT, channel_count, OutputReceiver::FinalMix);
            if parameter.is_additional_sub_mix_enabled {
                let buses = if parameter.is_additional_effect_bus_enabled {
                    BUS_COUNT
                } else {
                    1
                };
                list.push(SubMixKind::PresetAdditional, buses, channel_count, OutputReceiver::FinalMix);
            }
            debug_assert!(list.sub_mixes.len() <= SUB_MIX_COUNT_MAX);
        }
        list
    }

    fn push(
        &mut self,
        kind: SubMixKind,
        bus_count: usize,
        channel_count: u32,
        destination: OutputReceiver,
    ) -> SubMixId {
        let id = SubMixId(self.next_id);
        self.next_id += 1;
        self.sub_mixes.push(SubMix {
            id,
            kind,
            channel_count,
            volume: MoveValue::new(1.0),
            bus_volumes: bus_volumes(bus_count),
            destination,
            bound_receivers: 0,
        });
        id
    }

    pub fn final_mix(&self) -> &FinalMix {
        &self.final_mix
    }

    pub fn get(&self, id: SubMixId) -> Option<&SubMix> {
        self.sub_mixes.iter().find(|s| s.id == id)
    }

    fn get_mut(&mut self, id: SubMixId) -> Option<&mut SubMix> {
        self.sub_mixes.iter_mut().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubMix> {
        self.sub_mixes.iter()
    }

    pub fn len(&self) -> usize {
        self.sub_mixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_mixes.is_empty()
    }

    /// The sub-mix sounds render into by default, if sub-mixes are enabled.
    pub fn main_sub_mix(&self) -> Option<SubMixId> {
        self.sub_mixes
            .iter()
            .find(|s| matches!(s.kind, SubMixKind::PresetMain | SubMixKind::Custom))
            .map(|s| s.id)
    }

    /// The additional-effect preset sub-mix, if configured.
    pub fn additional_sub_mix(&self) -> Option<SubMixId> {
        self.sub_mixes
            .iter()
            .find(|s| s.kind == SubMixKind::PresetAdditional)
            .map(|s| s.id)
    }

    fn receiver_exists(&self, receiver: OutputReceiver) -> bool {
        match receiver {
            OutputReceiver::FinalMix => true,
            OutputReceiver::SubMix(id) => self.get(id).is_some(),
        }
    }

    /// Add a user sub-mix routed to `destination`.
    pub fn add(&mut self, bus_count: usize, channel_count: u32, destination: OutputReceiver) -> Result<SubMixId> {
        if bus_count == 0 || bus_count > BUS_COUNT || channel_count == 0 {
            return Err(AtkError::InvalidParameter(format!(
                "sub-mix shape {} buses x {} channels",
                bus_count, channel_count
            )));
        }
        if !self.receiver_exists(destination) {
            return Err(AtkError::InvalidParameter(format!(
                "unknown sub-mix destination {:?}",
                destination
            )));
        }
        let user_count = self.sub_mixes.iter().filter(|s| s.kind == SubMixKind::User).count();
        if user_count >= self.user_count_max {
            return Err(AtkError::ResourceExhausted(format!(
                "user sub-mix limit {} reached",
                self.user_count_max
            )));
        }
        let id = self.push(SubMixKind::User, bus_count, channel_count, destination);
        if let OutputReceiver::SubMix(dest) = destination {
            if let Some(d) = self.get_mut(dest) {
                d.bound_receivers += 1;
            }
        }
        debug!(?id, bus_count, channel_count, "Added sub-mix");
        Ok(id)
    }

    /// Remove a user sub-mix. Refused while anything still renders into it.
    pub fn remove(&mut self, id: SubMixId) -> Result<()> {
        let sub = self
            .get(id)
            .ok_or_else(|| AtkError::InvalidParameter(format!("unknown sub-mix {:?}", id)))?;
        if !sub.kind.is_removable() {
            return Err(AtkError::InvalidParameter(format!(
                "preset sub-mix {:?} cannot be removed",
                id
            )));
        }
        if sub.bound_receivers > 0 {
            return Err(AtkError::InUse(format!(
                "sub-mix {:?} has {} bound receivers",
                id, sub.bound_receivers
            )));
        }
        let destination = sub.destination;
        self.sub_mixes.retain(|s| s.id != id);
        self.unbind(destination);
        debug!(?id, "Removed sub-mix");
        Ok(())
    }

    /// Register a voice source against `receiver`. False if it does not exist.
    pub fn bind(&mut self, receiver: OutputReceiver) -> bool {
        match receiver {
            OutputReceiver::FinalMix => true,
            OutputReceiver::SubMix(id) => match self.get_mut(id) {
                Some(s) => {
                    s.bound_receivers += 1;
                    true
                }
                None => false,
            },
        }
    }

    pub fn unbind(&mut self, receiver: OutputReceiver) {
        if let OutputReceiver::SubMix(id) = receiver {
            if let Some(s) = self.get_mut(id) {
                s.bound_receivers = s.bound_receivers.saturating_sub(1);
            }
        }
    }

    pub fn bound_receivers(&self, id: SubMixId) -> usize {
        self.get(id).map(|s| s.bound_receivers).unwrap_or(0)
    }

    fn bus_volumes_mut(&mut self, receiver: OutputReceiver) -> Option<&mut BusVolumes> {
        match receiver {
            OutputReceiver::FinalMix => Some(&mut self.final_mix.bus_volumes),
            OutputReceiver::SubMix(id) => self.get_mut(id).map(|s| &mut s.bus_volumes),
        }
    }

    /// Ramp one bus volume of `receiver`.
    pub fn set_bus_volume(&mut self, receiver: OutputReceiver, bus: usize, volume: f32, frames: u32) -> bool {
        match self.bus_volumes_mut(receiver).and_then(|b| b.get_mut(bus)) {
            Some(v) => {
                v.set_target(volume.max(0.0), frames);
                true
            }
            None => false,
        }
    }

    pub fn bus_volume(&self, receiver: OutputReceiver, bus: usize) -> Option<f32> {
        match receiver {
            OutputReceiver::FinalMix => self.final_mix.bus_volumes.get(bus).map(MoveValue::value),
            OutputReceiver::SubMix(id) => self.get(id).and_then(|s| s.bus_volume(bus)),
        }
    }

    /// Ramp the overall volume of `receiver`.
    pub fn set_volume(&mut self, receiver: OutputReceiver, volume: f32, frames: u32) -> bool {
        let ramp = match receiver {
            OutputReceiver::FinalMix => Some(&mut self.final_mix.volume),
            OutputReceiver::SubMix(id) => self.get_mut(id).map(|s| &mut s.volume),
        };
        match ramp {
            Some(v) => {
                v.set_target(volume.max(0.0), frames);
                true
            }
            None => false,
        }
    }

    /// Advance every volume ramp one frame.
    pub fn update(&mut self) {
        self.final_mix.volume.update();
        self.final_mix.bus_volumes.iter_mut().for_each(MoveValue::update);
        for s in &mut self.sub_mixes {
            s.volume.update();
            s.bus_volumes.iter_mut().for_each(MoveValue::update);
        }
    }

    /// Current state of every stage, final mix first.
    pub fn snapshot(&self) -> Vec<MixState> {
        let mut out = Vec::with_capacity(self.sub_mixes.len() + 1);
        out.push(MixState {
            receiver: OutputReceiver::FinalMix,
            channel_count: self.final_mix.channel_count,
            volume: self.final_mix.volume.value(),
            bus_volumes: self.final_mix.bus_volumes.iter().map(MoveValue::value).collect(),
            destination: None,
        });
        out.extend(self.sub_mixes.iter().map(|s| MixState {
            receiver: OutputReceiver::SubMix(s.id),
            channel_count: s.channel_count,
            volume: s.volume.value(),
            bus_volumes: s.bus_volumes.iter().map(MoveValue::value).collect(),
            destination: Some(s.destination),
        }));
        out
    }
}
