//! Frame-stepped linear ramps.
//!
//! A `MoveValue` interpolates from the value it held when `set_target` was
//! called towards a target over a number of audio frames. `update` advances
//! it by exactly one frame, so the ramp is tied to the frame tick rather than
//! wall-clock time.

use serde::{Deserialize, Serialize};

/// Linear ramp advanced once per audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveValue {
    origin: f32,
    target: f32,
    frame: u32,
    frame_count: u32,
}

impl MoveValue {
    /// Create a ramp resting at `value`.
    pub const fn new(value: f32) -> Self {
        Self {
            origin: value,
            target: value,
            frame: 0,
            frame_count: 0,
        }
    }

    /// Start ramping from the current value to `target` over `frames` frames.
    /// Zero frames jumps immediately.
    pub fn set_target(&mut self, target: f32, frames: u32) {
        self.origin = self.value();
        self.target = target;
        self.frame = 0;
        self.frame_count = frames;
    }

    /// Jump to `value` and cancel any ramp in progress.
    pub fn set(&mut self, value: f32) {
        *self = Self::new(value);
    }

    /// Advance one frame.
    pub fn update(&mut self) {
        if self.frame < self.frame_count {
            self.frame += 1;
        }
    }

    /// Current interpolated value.
    pub fn value(&self) -> f32 {
        if self.frame >= self.frame_count {
            return self.target;
        }
        let t = self.frame as f32 / self.frame_count as f32;
        self.origin + (self.target - self.origin) * t
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the ramp has reached its target.
    pub fn is_finished(&self) -> bool {
        self.frame >= self.frame_count
    }

    /// Frames left until the target is reached.
    pub fn remaining_frames(&self) -> u32 {
        self.frame_count - self.frame
    }
}

impl Default for MoveValue {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_target() {
        let mut v = MoveValue::new(1.0);
        v.set_target(0.0, 0);
        assert!(v.is_finished());
        assert_eq!(v.value(), 0.0);
    }

    #[test]
    fn test_linear_ramp() {
        let mut v = MoveValue::new(1.0);
        v.set_target(0.0, 4);
        assert_eq!(v.value(), 1.0);
        v.update();
        assert!((v.value() - 0.75).abs() < 1e-6);
        v.update();
        v.update();
        assert!(!v.is_finished());
        assert_eq!(v.remaining_frames(), 1);
        v.update();
        assert!(v.is_finished());
        assert_eq!(v.value(), 0.0);
        // Further updates stay at the target
        v.update();
        assert_eq!(v.value(), 0.0);
    }

    #[test]
    fn test_retarget_mid_ramp_starts_from_current_value() {
        let mut v = MoveValue::new(0.0);
        v.set_target(1.0, 2);
        v.update();
        assert!((v.value() - 0.5).abs() < 1e-6);
        v.set_target(0.0, 5);
        assert!((v.value() - 0.5).abs() < 1e-6);
        v.update();
        assert!((v.value() - 0.4).abs() < 1e-6);
    }
}
