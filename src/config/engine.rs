//! Engine-level configuration: scheduler, interop and frame timing.

use serde::{Deserialize, Serialize};

use super::scheduler::SchedulerConfig;
use crate::core::interop::{RasterApi, RegisterFlags};

/// Interop resource defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteropConfig {
    /// Graphics API raster backends are expected to drive.
    pub raster_api: RasterApi,
    /// Registration hint for new interop buffers.
    pub register_flags: RegisterFlags,
}

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool settings.
    pub scheduler: SchedulerConfig,
    /// Interop settings.
    pub interop: InteropConfig,
    /// Fixed simulation step in seconds.
    pub delta_time_secs: f64,
    /// Render budget per frame in seconds.
    pub alloted_render_time_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            interop: InteropConfig::default(),
            delta_time_secs: 1.0 / 60.0,
            alloted_render_time_secs: 0.01,
        }
    }
}

impl EngineConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        if !(self.delta_time_secs.is_finite() && self.delta_time_secs > 0.0) {
            return Err("delta_time_secs must be a positive number".into());
        }
        if !(self.alloted_render_time_secs.is_finite() && self.alloted_render_time_secs >= 0.0) {
            return Err("alloted_render_time_secs must not be negative".into());
        }
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert!((cfg.delta_time_secs - 1.0 / 60.0).abs() < f64::EPSILON);
        assert_eq!(cfg.interop.register_flags, RegisterFlags::WriteDiscard);
    }

    #[test]
    fn test_rejects_zero_step() {
        let err = EngineConfig::from_json_str(r#"{"delta_time_secs": 0.0}"#).unwrap_err();
        assert!(err.contains("delta_time_secs"));
    }

    #[test]
    fn test_nested_json() {
        let json = r#"{
            "scheduler": {"worker_count": 2, "thread_name_prefix": "engine"},
            "interop": {"raster_api": "vulkan", "register_flags": "read_only"}
        }"#;
        let cfg = EngineConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.scheduler.worker_count, Some(2));
        assert_eq!(cfg.interop.raster_api, RasterApi::Vulkan);
        assert_eq!(cfg.interop.register_flags, RegisterFlags::ReadOnly);
    }
}
