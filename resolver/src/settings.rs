use anyhow::{Context, Result};
use resolver_game::{Capacity, GameData, ResourceCollection, ResourceInfo, ResourceType};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum VictoryMode {
    // The game's victory condition
    #[default]
    Requirement,
    // Every pickup of the local player collected
    AllPickups,
    RequirementAndAllPickups,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct TrickSetting {
    pub name: String,
    pub level: Capacity,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ResolverSettings {
    // Forward steps before giving up
    #[serde(default)]
    pub max_attempts: Option<usize>,
    #[serde(default)]
    pub time_limit_seconds: Option<f32>,
    #[serde(default)]
    pub victory: VictoryMode,
    #[serde(default)]
    pub trick_levels: Vec<TrickSetting>,
    #[serde(default = "default_true")]
    pub prioritize_events: bool,
    #[serde(default = "default_true")]
    pub derive_event_pickup_nodes: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            max_attempts: None,
            time_limit_seconds: None,
            victory: VictoryMode::Requirement,
            trick_levels: vec![],
            prioritize_events: true,
            derive_event_pickup_nodes: true,
        }
    }
}

impl ResolverSettings {
    pub fn load(path: &Path) -> Result<ResolverSettings> {
        let settings_str = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to load resolver settings at {}", path.display()))?;
        parse_resolver_settings(&settings_str)
            .with_context(|| format!("Unable to parse resolver settings at {}", path.display()))
    }

    /// Trick levels as resources of the game.
    pub fn trick_resources(&self, game_data: &GameData) -> Result<ResourceCollection> {
        let mut out = ResourceCollection::new();
        for trick in &self.trick_levels {
            let resource: ResourceInfo = game_data
                .resource_database
                .resource_by_name(ResourceType::Trick, &trick.name)
                .context("in trick levels")?;
            out.set(resource, trick.level);
        }
        Ok(out)
    }
}

pub fn parse_resolver_settings(settings_json: &str) -> Result<ResolverSettings> {
    let settings: ResolverSettings = serde_json::from_str(settings_json)?;
    Ok(settings)
}
