use anyhow::{Context, Result};
use resolver_game::{Capacity, GameData};
use resolver_logic::{State, helpers::path_names};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SpoilerResource {
    pub name: String,
    pub amount: Capacity,
}

/// One collection step of a solution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ActionEntry {
    pub node: String,
    // Nodes walked from the previous action, ending at `node`
    pub path: Vec<String>,
    pub resources_gained: Vec<SpoilerResource>,
    pub energy: Capacity,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ActionPath {
    pub actions: Vec<ActionEntry>,
}

impl ActionPath {
    /// Rebuilds the actions leading to `state`, oldest first. The initial
    /// state is not an action.
    pub fn from_state(state: &Arc<State>, game_data: &GameData) -> ActionPath {
        let actions = state
            .history()
            .iter()
            .skip(1)
            .map(|s| ActionEntry {
                node: game_data.node_name(s.node),
                path: path_names(&s.path_from_previous_state, game_data),
                resources_gained: s
                    .resources_gained()
                    .into_iter()
                    .map(|(resource, amount)| SpoilerResource {
                        name: game_data.resource_name(resource),
                        amount,
                    })
                    .collect(),
                energy: s.damage_state.energy,
            })
            .collect();
        ActionPath { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Unable to write spoiler log at {}", path.display()))?;
        Ok(())
    }
}
