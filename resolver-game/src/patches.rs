use anyhow::{Result, bail, ensure};
use hashbrown::HashMap;

use crate::{
    DockWeaknessIdx, GameData, NodeIndex, NodeKind, PickupEntry, PickupIndex, PlayerIdx,
    Requirement, ResourceCollection,
};

#[derive(Clone, Debug, PartialEq)]
pub struct PickupTarget {
    pub pickup: PickupEntry,
    pub player: PlayerIdx,
}

/// Everything that makes one seed differ from the base game.
#[derive(Clone, Debug)]
pub struct GamePatches {
    pub player_index: PlayerIdx,
    pub pickup_assignment: HashMap<PickupIndex, PickupTarget>,
    // None removes the dock's connection
    pub dock_connection: HashMap<NodeIndex, Option<NodeIndex>>,
    pub dock_weakness: HashMap<NodeIndex, DockWeaknessIdx>,
    pub configurable_nodes: HashMap<NodeIndex, Requirement>,
    pub starting_location: NodeIndex,
    pub starting_resources: ResourceCollection,
}

impl GamePatches {
    pub fn new(game_data: &GameData, player_index: PlayerIdx) -> Result<Self> {
        Ok(GamePatches {
            player_index,
            pickup_assignment: HashMap::new(),
            dock_connection: HashMap::new(),
            dock_weakness: HashMap::new(),
            configurable_nodes: HashMap::new(),
            starting_location: game_data.default_starting_location()?,
            starting_resources: ResourceCollection::new(),
        })
    }

    pub fn assign_pickup(&mut self, pickup_index: PickupIndex, player: PlayerIdx, pickup: PickupEntry) {
        self.pickup_assignment
            .insert(pickup_index, PickupTarget { pickup, player });
    }

    /// Connects two docks to each other, in both directions.
    pub fn connect_docks(&mut self, a: NodeIndex, b: NodeIndex) {
        self.dock_connection.insert(a, Some(b));
        self.dock_connection.insert(b, Some(a));
    }

    pub fn set_dock_weakness(&mut self, dock: NodeIndex, weakness: DockWeaknessIdx) {
        self.dock_weakness.insert(dock, weakness);
    }

    pub fn set_configurable_node(&mut self, node: NodeIndex, requirement: Requirement) {
        self.configurable_nodes.insert(node, requirement);
    }

    pub fn target_for(&self, pickup_index: PickupIndex) -> Option<&PickupTarget> {
        self.pickup_assignment.get(&pickup_index)
    }

    /// Indices holding a pickup for the player being resolved, sorted.
    pub fn local_pickup_indices(&self) -> Vec<PickupIndex> {
        let mut out: Vec<PickupIndex> = self
            .pickup_assignment
            .iter()
            .filter(|(_, target)| target.player == self.player_index)
            .map(|(&idx, _)| idx)
            .collect();
        out.sort();
        out
    }

    pub fn validate(&self, game_data: &GameData) -> Result<()> {
        let graph = &game_data.region_list;
        ensure!(
            graph.get_node(self.starting_location).is_some(),
            "starting location {} is not part of the world graph",
            self.starting_location
        );
        for &pickup_index in self.pickup_assignment.keys() {
            ensure!(
                graph.pickup_node(pickup_index).is_some(),
                "pickup index {pickup_index} is assigned but has no pickup node"
            );
        }
        for (&dock, &target) in &self.dock_connection {
            let dock_node = graph.get_node(dock);
            ensure!(
                matches!(dock_node.map(|n| &n.kind), Some(NodeKind::Dock(_))),
                "dock connection patch for {}, which is not a dock",
                game_data.node_name(dock)
            );
            if let Some(target) = target {
                ensure!(
                    matches!(graph.get_node(target).map(|n| &n.kind), Some(NodeKind::Dock(_))),
                    "dock {} is connected to {}, which is not a dock",
                    game_data.node_name(dock),
                    game_data.node_name(target)
                );
            }
        }
        for (&dock, &weakness) in &self.dock_weakness {
            let Some(node) = graph.get_node(dock) else {
                bail!("dock weakness patch for unknown node {dock}");
            };
            let NodeKind::Dock(dock_node) = &node.kind else {
                bail!("dock weakness patch for {}, which is not a dock", node.identifier);
            };
            ensure!(
                weakness < game_data.dock_weakness_database.len(),
                "unknown dock weakness {} for {}",
                weakness,
                node.identifier
            );
            let new_type = &game_data.dock_weakness_database.get(weakness).dock_type;
            ensure!(
                *new_type == dock_node.dock_type,
                "weakness {} of type {} cannot be used on {} dock {}",
                game_data.dock_weakness_database.get(weakness).name,
                new_type,
                dock_node.dock_type,
                node.identifier
            );
        }
        for node in graph.all_nodes() {
            match node.kind {
                NodeKind::Configurable => ensure!(
                    self.configurable_nodes.contains_key(&node.node_index),
                    "configurable node {} has no requirement assigned",
                    node.identifier
                ),
                _ => {
                    ensure!(
                        !self.configurable_nodes.contains_key(&node.node_index),
                        "requirement assigned to {}, which is not configurable",
                        node.identifier
                    );
                }
            }
        }
        Ok(())
    }
}
