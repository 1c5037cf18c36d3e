use std::{fs, io::ErrorKind};

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    display_types::DisplayTypeSpec,
    systems::{action::ActionSpec, area::AreaSpec, criteria::Criteria, trigger::TriggerKindSpec},
};

/// A configured object and the id it is registered under
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Named<T> {
    pub id: String,
    #[serde(flatten)]
    pub spec: T,
}

impl<T> Named<T> {
    pub fn new(id: &str, spec: T) -> Self {
        Named {
            id: String::from(id),
            spec,
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: TriggerKindSpec,
    #[serde(flatten)]
    pub criteria: Criteria,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub interval: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub areas: Vec<String>,
    /// Invoked in this order for every occurrence
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub accumulator: Option<String>,
}

impl TriggerConfig {
    pub fn new(id: &str, kind: TriggerKindSpec) -> Self {
        TriggerConfig {
            id: String::from(id),
            kind,
            criteria: Criteria::default(),
            limit: None,
            interval: 0,
            enabled: true,
            areas: Vec::new(),
            actions: Vec::new(),
            accumulator: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatorConfig {
    pub id: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HandlerConfig {
    pub id: String,
    /// Evaluated in this order within each phase
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Everything needed to build an engine. Entries are lists rather than maps
/// so that a repeated id is reported instead of silently replacing another.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub display_types: Vec<Named<DisplayTypeSpec>>,
    #[serde(default)]
    pub areas: Vec<Named<AreaSpec>>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub actions: Vec<Named<ActionSpec>>,
    #[serde(default)]
    pub accumulators: Vec<AccumulatorConfig>,
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

impl EngineConfig {
    pub fn parse(text: &str) -> Result<EngineConfig> {
        serde_json::from_str::<EngineConfig>(text).map_err(|e| anyhow!("Failed to parse config data: {}", e))
    }

    pub fn write_config_to_file(&self, config_file_path: &str) -> Result<()> {
        debug!("Current state of config: {:?}", self);
        let text = serde_json::to_string_pretty(self)?;
        fs::write(config_file_path, text)
            .map_err(|e| anyhow!("Failed to write config to {}: {}", config_file_path, e))?;
        info!("Wrote config to file: {:?}", config_file_path);
        Ok(())
    }
}

pub fn load_config_from_file(config_file_path: &str) -> Result<EngineConfig> {
    match fs::read_to_string(config_file_path) {
        Err(e) => {
            if e.kind() == ErrorKind::NotFound {
                warn!(
                    "Engine config file not found at {}; starting with an empty engine",
                    &config_file_path
                );
                Ok(EngineConfig::default())
            } else {
                Err(anyhow!("Failed to load engine config from disk; error: {:?}", e))
            }
        }
        Ok(s) => {
            info!("Loaded engine config OK from \"{}\"", config_file_path);
            let loaded_config = EngineConfig::parse(&s)?;
            debug!("Config parsed data from file: {:?}", &loaded_config);
            Ok(loaded_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::trigger::WaterMarkReset;

    const SAMPLE: &str = r#"{
        "displayTypes": [
            { "id": "white", "type": "predefinedColor", "color": "white", "alpha": 1.0 },
            { "id": "arial", "type": "font", "font": "arial", "size": 14, "color": "white" }
        ],
        "triggers": [
            { "id": "people", "type": "occurrence", "classId": 2, "minConfidence": 0.4,
              "limit": 10, "actions": ["print"] },
            { "id": "most-people", "type": "newHigh", "preset": 2 }
        ],
        "actions": [
            { "id": "print", "type": "print", "forceFlush": true },
            { "id": "stop", "type": "control", "command": "triggerDisable", "trigger": "people" }
        ],
        "handlers": [ { "id": "ode", "triggers": ["people", "most-people"] } ]
    }"#;

    #[test]
    fn test_parse_flattened_entries() {
        let config = EngineConfig::parse(SAMPLE).unwrap();
        let people = &config.triggers[0];
        assert!(matches!(people.kind, TriggerKindSpec::Occurrence));
        assert_eq!(people.criteria.class_id, Some(2));
        assert_eq!(people.criteria.min_confidence, Some(0.4));
        assert_eq!(people.limit, Some(10));
        assert!(people.enabled);
        assert!(matches!(
            config.triggers[1].kind,
            TriggerKindSpec::NewHigh {
                preset: 2,
                reset_policy: WaterMarkReset::Preserve
            }
        ));
        assert!(matches!(
            config.actions[0].spec,
            ActionSpec::Print { force_flush: true }
        ));
        assert!(matches!(config.actions[1].spec, ActionSpec::Control(_)));
        assert_eq!(config.handlers[0].triggers.len(), 2);
    }

    #[test]
    fn test_missing_file_gives_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing-here.json");
        let config = load_config_from_file(path.to_str().unwrap()).unwrap();
        assert!(config.triggers.is_empty());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let path = path.to_str().unwrap();
        EngineConfig::parse(SAMPLE).unwrap().write_config_to_file(path).unwrap();
        let loaded = load_config_from_file(path).unwrap();
        assert_eq!(loaded.triggers.len(), 2);
        assert_eq!(loaded.display_types.len(), 2);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(EngineConfig::parse("{ \"triggers\": [ { \"id\": 3 } ] }").is_err());
    }
}
