//! Broadcast Settings Ingestion
//!
//! Parses the `_plugin__<name>__<major>_<minor>_<patch>__<short-key>`
//! broadcast map (`spec.md` §6) into strongly typed per-extruder parameters,
//! the way `PrinterConfig::load` turns an ini file into typed structs for
//! the rest of the host to consume.

use crate::errors::LimiterError;
use crate::wire::ExtruderSettingsWire;

/// The plugin identity baked into every broadcast key, matching
/// `original_source/include/plugin/cmdline.h`'s `NAME`/`VERSION`.
pub const PLUGIN_NAME: &str = "gradualflow";
pub const PLUGIN_VERSION: (u32, u32, u32) = (0, 1, 0);

/// Per-extruder parameters for one layer's worth of limiting.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtruderSettings {
    pub enabled: bool,
    /// µm³/s²
    pub max_flow_acceleration: f64,
    /// µm³/s²
    pub layer_0_max_flow_acceleration: f64,
    /// s
    pub discretized_duration: f64,
    /// s — travel duration (or any retract) above which flow history resets.
    pub reset_flow_duration: f64,
    /// Whether `current_flow` carries from the previous request's last
    /// non-zero emitted flow, or restarts from this request's first target.
    pub continuity_enabled: bool,
}

fn settings_key(short_key: &str) -> String {
    let (major, minor, patch) = PLUGIN_VERSION;
    format!("_plugin__{PLUGIN_NAME}__{major}_{minor}_{patch}__{short_key}")
}

fn required<'a>(
    map: &'a ExtruderSettingsWire,
    short_key: &str,
    extruder: usize,
) -> Result<&'a str, LimiterError> {
    map.get(&settings_key(short_key))
        .map(|s| s.as_str())
        .ok_or_else(|| LimiterError::ConfigIncomplete {
            extruder,
            detail: format!("missing required setting '{short_key}'"),
        })
}

fn parse_bool(value: &str, short_key: &str, extruder: usize) -> Result<bool, LimiterError> {
    match value {
        "true" | "True" => Ok(true),
        "false" | "False" => Ok(false),
        other => Err(LimiterError::ConfigIncomplete {
            extruder,
            detail: format!("setting '{short_key}' is not a boolean: {other:?}"),
        }),
    }
}

fn parse_float(value: &str, short_key: &str, extruder: usize) -> Result<f64, LimiterError> {
    value.parse::<f64>().map_err(|_| LimiterError::ConfigIncomplete {
        extruder,
        detail: format!("setting '{short_key}' is not a number: {value:?}"),
    })
}

impl ExtruderSettings {
    /// Parses one extruder's broadcast settings map.
    ///
    /// `gradual_flow_enabled`, `max_flow_acceleration`,
    /// `layer_0_max_flow_acceleration`, and
    /// `gradual_flow_discretisation_step_size` are required; a missing or
    /// unparseable value is a fatal `ConfigIncomplete` for this extruder.
    /// `reset_flow_duration` and `continuity_enabled` are optional.
    pub fn from_broadcast(
        map: &ExtruderSettingsWire,
        extruder: usize,
    ) -> Result<Self, LimiterError> {
        let enabled = parse_bool(
            required(map, "gradual_flow_enabled", extruder)?,
            "gradual_flow_enabled",
            extruder,
        )?;
        let max_flow_acceleration = parse_float(
            required(map, "max_flow_acceleration", extruder)?,
            "max_flow_acceleration",
            extruder,
        )? * 1e9;
        let layer_0_max_flow_acceleration = parse_float(
            required(map, "layer_0_max_flow_acceleration", extruder)?,
            "layer_0_max_flow_acceleration",
            extruder,
        )? * 1e9;
        let discretized_duration = parse_float(
            required(map, "gradual_flow_discretisation_step_size", extruder)?,
            "gradual_flow_discretisation_step_size",
            extruder,
        )?;

        // Optional: default to discretized_duration, matching the fixed
        // `total_duration > discretized_duration` check in the original
        // plugin when this key isn't present (`SPEC_FULL.md` §4.3).
        let reset_flow_duration = match map.get(&settings_key("reset_flow_duration")) {
            Some(value) => parse_float(value, "reset_flow_duration", extruder)?,
            None => discretized_duration,
        };

        // Optional: defaults to `false` (no cross-request memory), matching
        // the original plugin's stateless-per-request behavior.
        let continuity_enabled = match map.get(&settings_key("continuity_enabled")) {
            Some(value) => parse_bool(value, "continuity_enabled", extruder)?,
            None => false,
        };

        Ok(Self {
            enabled,
            max_flow_acceleration,
            layer_0_max_flow_acceleration,
            discretized_duration,
            reset_flow_duration,
            continuity_enabled,
        })
    }
}

/// Parses every extruder's settings from a broadcast request. Any single
/// extruder's `ConfigIncomplete` error fails the whole broadcast, leaving
/// the previously held settings table untouched (`spec.md` §7).
pub fn parse_all(maps: &[ExtruderSettingsWire]) -> Result<Vec<ExtruderSettings>, LimiterError> {
    maps.iter()
        .enumerate()
        .map(|(i, map)| ExtruderSettings::from_broadcast(map, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete_map() -> ExtruderSettingsWire {
        let mut map = HashMap::new();
        map.insert(settings_key("gradual_flow_enabled"), "true".to_string());
        map.insert(settings_key("max_flow_acceleration"), "1.5".to_string());
        map.insert(settings_key("layer_0_max_flow_acceleration"), "0.5".to_string());
        map.insert(
            settings_key("gradual_flow_discretisation_step_size"),
            "0.05".to_string(),
        );
        map
    }

    #[test]
    fn parses_complete_settings_and_scales_accelerations() {
        let settings = ExtruderSettings::from_broadcast(&complete_map(), 0).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.max_flow_acceleration, 1.5e9);
        assert_eq!(settings.layer_0_max_flow_acceleration, 0.5e9);
        assert_eq!(settings.discretized_duration, 0.05);
        // defaults when absent.
        assert_eq!(settings.reset_flow_duration, 0.05);
        assert!(!settings.continuity_enabled);
    }

    #[test]
    fn missing_key_is_fatal() {
        let mut map = complete_map();
        map.remove(&settings_key("max_flow_acceleration"));
        let err = ExtruderSettings::from_broadcast(&map, 2).unwrap_err();
        match err {
            LimiterError::ConfigIncomplete { extruder, .. } => assert_eq!(extruder, 2),
            other => panic!("expected ConfigIncomplete, got {other:?}"),
        }
    }

    #[test]
    fn reset_flow_duration_overrides_default_when_present() {
        let mut map = complete_map();
        map.insert(settings_key("reset_flow_duration"), "3.0".to_string());
        let settings = ExtruderSettings::from_broadcast(&map, 0).unwrap();
        assert_eq!(settings.reset_flow_duration, 3.0);
    }
}
