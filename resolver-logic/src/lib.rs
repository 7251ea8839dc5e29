pub mod helpers;

use resolver_game::{
    Capacity, GameData, GamePatches, Node, NodeContext, NodeIndex, Requirement,
    ResourceCollection, ResourceDatabase, ResourceGain,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::helpers::validate_energy;

/// Energy of the player at some point of the search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageState {
    pub energy: Capacity,
}

impl DamageState {
    /// Full energy for the given inventory.
    pub fn new(resources: &ResourceCollection, db: &ResourceDatabase) -> Self {
        DamageState {
            energy: Self::maximum_energy(resources, db),
        }
    }

    pub fn maximum_energy(resources: &ResourceCollection, db: &ResourceDatabase) -> Capacity {
        db.energy.maximum_energy(resources)
    }

    pub fn health_for_damage_requirements(&self) -> Capacity {
        self.energy
    }

    /// Energy left after satisfying `requirement`, or None if the player
    /// would not survive it.
    #[must_use]
    pub fn apply_damage(
        &self,
        requirement: &Requirement,
        resources: &ResourceCollection,
        db: &ResourceDatabase,
    ) -> Option<DamageState> {
        let damage = requirement.damage(resources, db);
        let energy = validate_energy(self.energy.saturating_sub(damage))?;
        Some(DamageState { energy })
    }

    pub fn apply_node_heal(&self, node: &Node, resources: &ResourceCollection, db: &ResourceDatabase) -> DamageState {
        if node.heal {
            DamageState::new(resources, db)
        } else {
            *self
        }
    }

    /// New energy tanks come full.
    pub fn apply_collected_resource_difference(
        &self,
        new_resources: &ResourceCollection,
        old_resources: &ResourceCollection,
        db: &ResourceDatabase,
    ) -> DamageState {
        let gained = Self::maximum_energy(new_resources, db) - Self::maximum_energy(old_resources, db);
        DamageState {
            energy: self.energy + gained.max(0),
        }
    }

    pub fn is_better_than(&self, other: &DamageState) -> bool {
        self.energy > other.energy
    }

    pub fn debug_string(&self, resources: &ResourceCollection, db: &ResourceDatabase) -> String {
        format!("{}/{} Energy", self.energy, Self::maximum_energy(resources, db))
    }
}

/// A point of the search: where the player is, what they hold and how they got there.
/// States are never modified once built; collecting something creates a new one.
#[derive(Clone, Debug)]
pub struct State<'a> {
    pub node: NodeIndex,
    pub resources: ResourceCollection,
    pub damage_state: DamageState,
    pub patches: &'a GamePatches,
    // Nodes walked since the previous state, ending at `node`
    pub path_from_previous_state: Vec<NodeIndex>,
    pub previous_state: Option<Arc<State<'a>>>,
}

impl<'a> State<'a> {
    pub fn new(
        node: NodeIndex,
        resources: ResourceCollection,
        damage_state: DamageState,
        patches: &'a GamePatches,
    ) -> Self {
        State {
            node,
            resources,
            damage_state,
            patches,
            path_from_previous_state: vec![],
            previous_state: None,
        }
    }

    pub fn node_context<'b>(&'b self, game_data: &'b GameData) -> NodeContext<'b> {
        NodeContext::new(game_data, self.patches, &self.resources)
    }

    /// Collects `node`, arriving there along `path` with `damage_state`.
    pub fn act_on_node(
        self: &Arc<Self>,
        node: &Node,
        game_data: &GameData,
        path: Vec<NodeIndex>,
        damage_state: DamageState,
    ) -> State<'a> {
        let db = &game_data.resource_database;
        let gain = node.resource_gain_on_collect(&self.node_context(game_data));
        let resources = self.resources.with_resource_gain(&gain);
        let damage_state = damage_state
            .apply_collected_resource_difference(&resources, &self.resources, db)
            .apply_node_heal(node, &resources, db);
        State {
            node: node.node_index,
            resources,
            damage_state,
            patches: self.patches,
            path_from_previous_state: path,
            previous_state: Some(Arc::clone(self)),
        }
    }

    pub fn resources_gained(&self) -> ResourceGain {
        match &self.previous_state {
            Some(previous) => self.resources.difference_from(&previous.resources),
            None => vec![],
        }
    }

    /// States from the initial one up to this one.
    pub fn history(self: &Arc<Self>) -> Vec<Arc<State<'a>>> {
        let mut out = vec![Arc::clone(self)];
        let mut current = self.previous_state.clone();
        while let Some(state) = current {
            current = state.previous_state.clone();
            out.push(state);
        }
        out.reverse();
        out
    }

    pub fn debug_string(&self, game_data: &GameData) -> String {
        format!(
            "{} [{}]",
            game_data.node_name(self.node),
            self.damage_state
                .debug_string(&self.resources, &game_data.resource_database)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resolver_game::{ResourceInfo, world_reader::parse_world};

    const WORLD: &str = r#"{
        "items": ["Energy Tank", "Suit"],
        "damage": {"Heat": {"reductions": [{"item": "Suit", "multiplier": 0.5}]}},
        "energy": {"starting_energy": 99, "energy_per_tank": 100, "energy_tank": "Energy Tank"},
        "pickups": {"Energy Tank": {"resources": {"Energy Tank": 1}}},
        "victory_condition": {"type": "trivial"},
        "starting_location": "W/A/Start",
        "regions": [{"name": "W", "areas": [{"name": "A", "nodes": [
            {"name": "Start", "node_type": "generic", "connections": {"Item": {"type": "trivial"}}},
            {"name": "Item", "node_type": "pickup", "pickup_index": 0, "heal": true}
        ]}]}]
    }"#;

    #[test]
    fn test_apply_damage() {
        let db = ResourceDatabase::default();
        let empty = ResourceCollection::new();
        let full = DamageState::new(&empty, &db);
        assert_eq!(full.energy, 99);
        let heat = Requirement::damage_of(0, 40);
        let mut db = db;
        db.add_damage("Heat");
        let after = full.apply_damage(&heat, &empty, &db).unwrap();
        assert_eq!(after.energy, 59);
        assert!(full.is_better_than(&after));
        let lethal = Requirement::damage_of(0, 59);
        assert!(after.apply_damage(&lethal, &empty, &db).is_none());
    }

    #[test]
    fn test_collecting_tank_adds_energy() {
        let mut db = ResourceDatabase::default();
        let tank = db.add_item("Energy Tank");
        db.energy.energy_tank = Some(tank);
        let old = ResourceCollection::new();
        let new = old.with_resource_gain(&[(ResourceInfo::Item(tank), 1)]);
        let state = DamageState { energy: 10 };
        assert_eq!(
            state.apply_collected_resource_difference(&new, &old, &db).energy,
            110
        );
    }

    #[test]
    fn test_act_on_node() -> anyhow::Result<()> {
        let game = parse_world(WORLD)?;
        let mut patches = GamePatches::new(&game, 0)?;
        patches.assign_pickup(0, 0, game.pickup_database["Energy Tank"].clone());
        let start = Arc::new(State::new(
            0,
            ResourceCollection::new(),
            DamageState { energy: 50 },
            &patches,
        ));
        let item_node = game.region_list.node(1);
        let next = start.act_on_node(item_node, &game, vec![1], start.damage_state);
        assert_eq!(next.node, 1);
        assert_eq!(next.resources.get(ResourceInfo::Item(0)), 1);
        // Heal node: back to the new maximum
        assert_eq!(next.damage_state.energy, 199);
        assert!(next.resources.is_superset_of(&start.resources));
        assert_eq!(
            next.resources_gained(),
            vec![(ResourceInfo::Item(0), 1), (ResourceInfo::PickupIndex(0), 1)]
        );
        let history = Arc::new(next).history();
        assert_eq!(history.len(), 2);
        Ok(())
    }
}
