//! Hardware manager configuration.
//!
//! Consumed once by `HardwareManager::initialize`. Changing any field
//! requires a full finalize / initialize cycle.

use atk_core::constants::{ATK_VOICE_COUNT_MAX, DEFAULT_RENDERER_VOICE_COUNT_MAX, OUTPUT_DEVICE_COUNT};
use atk_core::{AtkError, OutputMode, Result};
use serde::{Deserialize, Serialize};

/// Sample rates the renderer supports.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [32000, 48000];

/// Upper bound on user-added sub-mixes.
pub const USER_SUB_MIX_COUNT_MAX: usize = 16;

/// Builder-style hardware configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareManagerParameter {
    pub sample_rate: u32,
    /// Soft voice ceiling. Never above `ATK_VOICE_COUNT_MAX`.
    pub voice_count_max: usize,
    pub is_sound_thread_enabled: bool,
    pub is_effect_enabled: bool,
    /// Capacity of each effect aux list, per bus.
    pub effect_count_max: usize,
    pub is_sub_mix_enabled: bool,
    pub is_additional_effect_bus_enabled: bool,
    pub is_additional_sub_mix_enabled: bool,
    pub is_custom_sub_mix_enabled: bool,
    pub custom_sub_mix_count: usize,
    pub custom_bus_count: usize,
    pub custom_channel_count: u32,
    pub user_sub_mix_count_max: usize,
    pub is_voice_drop_enabled: bool,
    pub is_memory_pool_attach_check_enabled: bool,
    /// Linear pan law instead of constant power (older SDK behavior).
    pub is_compatible_pan_curve_enabled: bool,
    /// Fold rear channels at unity gain when downmixing (older SDK behavior).
    pub is_compatible_downmix_enabled: bool,
    pub output_modes: [OutputMode; OUTPUT_DEVICE_COUNT],
    /// Frames used to fade the master volume out during reset.
    pub reset_fade_frames: u32,
}

impl Default for HardwareManagerParameter {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            voice_count_max: DEFAULT_RENDERER_VOICE_COUNT_MAX,
            is_sound_thread_enabled: true,
            is_effect_enabled: true,
            effect_count_max: 4,
            is_sub_mix_enabled: true,
            is_additional_effect_bus_enabled: false,
            is_additional_sub_mix_enabled: false,
            is_custom_sub_mix_enabled: false,
            custom_sub_mix_count: 0,
            custom_bus_count: 0,
            custom_channel_count: 0,
            user_sub_mix_count_max: 4,
            is_voice_drop_enabled: false,
            is_memory_pool_attach_check_enabled: false,
            is_compatible_pan_curve_enabled: false,
            is_compatible_downmix_enabled: false,
            output_modes: [OutputMode::Stereo; OUTPUT_DEVICE_COUNT],
            reset_fade_frames: 3,
        }
    }
}

impl HardwareManagerParameter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_voice_count_max(mut self, count: usize) -> Self {
        self.voice_count_max = count;
        self
    }

    pub fn with_sound_thread(mut self, enabled: bool) -> Self {
        self.is_sound_thread_enabled = enabled;
        self
    }

    pub fn with_effect(mut self, enabled: bool) -> Self {
        self.is_effect_enabled = enabled;
        self
    }

    pub fn with_effect_count_max(mut self, count: usize) -> Self {
        self.effect_count_max = count;
        self
    }

    pub fn with_sub_mix(mut self, enabled: bool) -> Self {
        self.is_sub_mix_enabled = enabled;
        self
    }

    pub fn with_additional_sub_mix(mut self, enabled: bool) -> Self {
        self.is_additional_sub_mix_enabled = enabled;
        self
    }

    pub fn with_additional_effect_bus(mut self, enabled: bool) -> Self {
        self.is_additional_effect_bus_enabled = enabled;
        self
    }

    /// Replace the preset topology with `sub_mix_count` caller-shaped sub-mixes.
    pub fn with_custom_sub_mix(mut self, sub_mix_count: usize, bus_count: usize, channel_count: u32) -> Self {
        self.is_custom_sub_mix_enabled = true;
        self.custom_sub_mix_count = sub_mix_count;
        self.custom_bus_count = bus_count;
        self.custom_channel_count = channel_count;
        self
    }

    pub fn with_user_sub_mix_count_max(mut self, count: usize) -> Self {
        self.user_sub_mix_count_max = count;
        self
    }

    pub fn with_voice_drop(mut self, enabled: bool) -> Self {
        self.is_voice_drop_enabled = enabled;
        self
    }

    pub fn with_memory_pool_attach_check(mut self, enabled: bool) -> Self {
        self.is_memory_pool_attach_check_enabled = enabled;
        self
    }

    pub fn with_compatible_pan_curve(mut self, enabled: bool) -> Self {
        self.is_compatible_pan_curve_enabled = enabled;
        self
    }

    pub fn with_compatible_downmix(mut self, enabled: bool) -> Self {
        self.is_compatible_downmix_enabled = enabled;
        self
    }

    pub fn with_output_mode(mut self, device: atk_core::OutputDevice, mode: OutputMode) -> Self {
        self.output_modes[device.index()] = mode;
        self
    }

    pub fn with_reset_fade_frames(mut self, frames: u32) -> Self {
        self.reset_fade_frames = frames;
        self
    }

    /// Check every field against the hardware limits.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(AtkError::InvalidParameter(format!(
                "unsupported sample rate {}",
                self.sample_rate
            )));
        }
        if self.voice_count_max == 0 || self.voice_count_max > ATK_VOICE_COUNT_MAX {
            return Err(AtkError::InvalidParameter(format!(
                "voice count {} outside 1..={}",
                self.voice_count_max, ATK_VOICE_COUNT_MAX
            )));
        }
        if self.is_custom_sub_mix_enabled {
            if !self.is_sub_mix_enabled {
                return Err(AtkError::InvalidParameter(
                    "custom sub-mix requires sub-mix support".into(),
                ));
            }
            if self.custom_sub_mix_count == 0
                || self.custom_bus_count == 0
                || self.custom_channel_count == 0
            {
                return Err(AtkError::InvalidParameter(
                    "custom sub-mix needs non-zero sub-mix, bus and channel counts".into(),
                ));
            }
        }
        if self.user_sub_mix_count_max > USER_SUB_MIX_COUNT_MAX {
            return Err(AtkError::InvalidParameter(format!(
                "user sub-mix count {} above {}",
                self.user_sub_mix_count_max, USER_SUB_MIX_COUNT_MAX
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| {
            AtkError::Serialization(format!("Failed to serialize hardware parameter: {}", e))
        })
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| AtkError::Serialization(format!("Invalid hardware parameter: {}", e)))
    }

    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let p = HardwareManagerParameter::default();
        assert!(p.validate().is_ok());
        assert_eq!(p.voice_count_max, DEFAULT_RENDERER_VOICE_COUNT_MAX);
    }

    #[test]
    fn test_voice_count_above_hard_ceiling_rejected() {
        let p = HardwareManagerParameter::new().with_voice_count_max(ATK_VOICE_COUNT_MAX + 1);
        assert!(matches!(p.validate(), Err(AtkError::InvalidParameter(_))));
        let p = HardwareManagerParameter::new().with_voice_count_max(ATK_VOICE_COUNT_MAX);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_bad_sample_rate_rejected() {
        let p = HardwareManagerParameter::new().with_sample_rate(44100);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_custom_sub_mix_needs_shape() {
        let mut p = HardwareManagerParameter::new();
        p.is_custom_sub_mix_enabled = true;
        assert!(p.validate().is_err());
        let p = HardwareManagerParameter::new().with_custom_sub_mix(2, 4, 2);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_json_partial_fields_fill_defaults() {
        let p = HardwareManagerParameter::from_json(br#"{ "voice_count_max": 32, "is_voice_drop_enabled": true }"#)
            .unwrap();
        assert_eq!(p.voice_count_max, 32);
        assert!(p.is_voice_drop_enabled);
        assert_eq!(p.sample_rate, 48000);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hardware.json");
        let p = HardwareManagerParameter::new()
            .with_voice_count_max(64)
            .with_output_mode(atk_core::OutputDevice::Sub, OutputMode::Monaural);
        std::fs::write(&path, p.to_json().unwrap()).unwrap();
        let loaded = HardwareManagerParameter::load_from_file(&path).unwrap();
        assert_eq!(loaded, p);
    }
}
