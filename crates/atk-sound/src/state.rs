//! Sound state machines.
//!
//! Pause and mute share one shape: a switch that fades out when engaged and
//! back in when released, with the fade completion as a third event.
//!
//! | phase \ event | engage   | release   | fade finished |
//! |---------------|----------|-----------|---------------|
//! | Normal        | Engaging | -         | -             |
//! | Engaging      | Engaging | Releasing | Engaged       |
//! | Engaged       | -        | Releasing | -             |
//! | Releasing     | Engaging | Releasing | Normal        |

use atk_core::MoveValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerState {
    #[default]
    Init,
    Play,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PauseState {
    #[default]
    Normal,
    Pausing,
    Paused,
    Unpausing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MuteState {
    #[default]
    Normal,
    Muting,
    Muted,
    Unmuting,
}

/// Object lifecycle of a sound instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Constructed,
    Initialized,
    Finalized,
    Destructed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SwitchPhase {
    #[default]
    Normal,
    Engaging,
    Engaged,
    Releasing,
}

/// Fading on/off switch behind pause and mute.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FadeSwitch {
    phase: SwitchPhase,
    volume: MoveValue,
}

impl FadeSwitch {
    pub fn phase(&self) -> SwitchPhase {
        self.phase
    }

    /// Fade factor contributed this frame.
    pub fn volume(&self) -> f32 {
        self.volume.value()
    }

    pub fn remaining_frames(&self) -> u32 {
        self.volume.remaining_frames()
    }

    /// Fully engaged: faded out and holding.
    pub fn is_engaged(&self) -> bool {
        self.phase == SwitchPhase::Engaged
    }

    /// Engaging or engaged.
    pub fn is_on(&self) -> bool {
        matches!(self.phase, SwitchPhase::Engaging | SwitchPhase::Engaged)
    }

    pub fn set(&mut self, on: bool, fade_frames: u32) {
        if on {
            self.engage(fade_frames)
        } else {
            self.release(fade_frames)
        }
    }

    pub fn engage(&mut self, fade_frames: u32) {
        match self.phase {
            SwitchPhase::Normal | SwitchPhase::Releasing => {
                self.volume.set_target(0.0, fade_frames);
                self.phase = SwitchPhase::Engaging;
            }
            SwitchPhase::Engaging | SwitchPhase::Engaged => {}
        }
        if fade_frames == 0 {
            self.settle();
        }
    }

    pub fn release(&mut self, fade_frames: u32) {
        match self.phase {
            SwitchPhase::Engaging | SwitchPhase::Engaged => {
                self.volume.set_target(1.0, fade_frames);
                self.phase = SwitchPhase::Releasing;
            }
            SwitchPhase::Normal | SwitchPhase::Releasing => {}
        }
        if fade_frames == 0 {
            self.settle();
        }
    }

    /// Advance the fade one frame.
    pub fn update(&mut self) {
        self.volume.update();
    }

    /// Apply the fade-finished event if the ramp has reached its target.
    pub fn settle(&mut self) {
        if !self.volume.is_finished() {
            return;
        }
        self.phase = match self.phase {
            SwitchPhase::Engaging => SwitchPhase::Engaged,
            SwitchPhase::Releasing => SwitchPhase::Normal,
            other => other,
        };
    }
}

impl From<SwitchPhase> for PauseState {
    fn from(phase: SwitchPhase) -> Self {
        match phase {
            SwitchPhase::Normal => PauseState::Normal,
            SwitchPhase::Engaging => PauseState::Pausing,
            SwitchPhase::Engaged => PauseState::Paused,
            SwitchPhase::Releasing => PauseState::Unpausing,
        }
    }
}

impl From<SwitchPhase> for MuteState {
    fn from(phase: SwitchPhase) -> Self {
        match phase {
            SwitchPhase::Normal => MuteState::Normal,
            SwitchPhase::Engaging => MuteState::Muting,
            SwitchPhase::Engaged => MuteState::Muted,
            SwitchPhase::Releasing => MuteState::Unmuting,
        }
    }
}
