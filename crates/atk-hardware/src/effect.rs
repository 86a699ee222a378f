//! Effect aux lists.
//!
//! User effects are registered per aux bus on one of three lists: the
//! default (main sub-mix) list, the final-mix list and the additional
//! sub-mix list. The hardware manager guards each list with its own lock.

use atk_core::constants::AUX_BUS_COUNT;
use atk_core::{AtkError, AuxBus, Result};
use tracing::{debug, trace};

/// Which effect aux list an effect belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectTarget {
    Default,
    FinalMix,
    AdditionalSubMix,
}

/// Information handed to an effect each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectContext {
    pub frame_index: u64,
    pub sample_rate: u32,
    pub bus: AuxBus,
    pub target: EffectTarget,
}

/// A user effect attached to an aux bus.
pub trait AuxEffect: Send {
    fn name(&self) -> &str;

    /// Called once when the effect is appended. An error rejects the append.
    fn initialize(&mut self, _ctx: &EffectContext) -> Result<()> {
        Ok(())
    }

    /// Called once per audio frame.
    fn update(&mut self, ctx: &EffectContext);

    /// Called when the effect is removed or the list is cleared.
    fn finalize(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

type EffectEntry = (EffectId, Box<dyn AuxEffect>);

/// Effects registered per aux bus for one target.
pub struct EffectAuxList {
    target: EffectTarget,
    buses: [Vec<EffectEntry>; AUX_BUS_COUNT],
    capacity: usize,
    next_id: u64,
}

impl std::fmt::Debug for EffectAuxList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectAuxList")
            .field("target", &self.target)
            .field("counts", &self.buses.iter().map(Vec::len).collect::<Vec<_>>())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl EffectAuxList {
    /// Create an empty list holding at most `capacity` effects per bus.
    pub fn new(target: EffectTarget, capacity: usize) -> Self {
        Self {
            target,
            buses: Default::default(),
            capacity,
            next_id: 0,
        }
    }

    pub fn target(&self) -> EffectTarget {
        self.target
    }

    fn context(&self, bus: AuxBus, frame_index: u64, sample_rate: u32) -> EffectContext {
        EffectContext {
            frame_index,
            sample_rate,
            bus,
            target: self.target,
        }
    }

    /// Initialize and register `effect` on `bus`.
    pub fn append(
        &mut self,
        bus: AuxBus,
        mut effect: Box<dyn AuxEffect>,
        frame_index: u64,
        sample_rate: u32,
    ) -> Result<EffectId> {
        if self.buses[bus.index()].len() >= self.capacity {
            return Err(AtkError::ResourceExhausted(format!(
                "effect list {:?}/{:?} full ({} effects)",
                self.target, bus, self.capacity
            )));
        }
        let ctx = self.context(bus, frame_index, sample_rate);
        effect.initialize(&ctx)?;
        let id = EffectId(self.next_id);
        self.next_id += 1;
        debug!(target_list = ?self.target, ?bus, name = effect.name(), "Appended effect");
        self.buses[bus.index()].push((id, effect));
        Ok(id)
    }

    /// Unregister an effect. Unknown ids are a no-op.
    pub fn remove(&mut self, bus: AuxBus, id: EffectId) -> Option<Box<dyn AuxEffect>> {
        let list = &mut self.buses[bus.index()];
        let pos = list.iter().position(|(i, _)| *i == id)?;
        let (_, mut effect) = list.remove(pos);
        effect.finalize();
        Some(effect)
    }

    /// Remove every effect on `bus`.
    pub fn clear(&mut self, bus: AuxBus) {
        for (_, mut effect) in self.buses[bus.index()].drain(..) {
            effect.finalize();
        }
    }

    pub fn clear_all(&mut self) {
        for bus in AuxBus::ALL {
            self.clear(bus);
        }
    }

    pub fn len(&self, bus: AuxBus) -> usize {
        self.buses[bus.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.iter().all(Vec::is_empty)
    }

    /// Run one frame of every effect, bus by bus in registration order.
    pub fn update(&mut self, frame_index: u64, sample_rate: u32) {
        for bus in AuxBus::ALL {
            let ctx = self.context(bus, frame_index, sample_rate);
            for (_, effect) in self.buses[bus.index()].iter_mut() {
                trace!(name = effect.name(), frame_index, "Effect update");
                effect.update(&ctx);
            }
        }
    }
}
