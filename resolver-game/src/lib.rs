// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod database;
pub mod graph;
pub mod node;
pub mod node_context;
pub mod patches;
pub mod pickup;
pub mod requirement;
pub mod requirement_set;
pub mod resources;
pub mod world_reader;

use anyhow::{Context, Result, bail, ensure};
use hashbrown::HashMap;
use std::borrow::ToOwned;
use std::collections::BTreeSet;
use std::hash::Hash;

pub use database::{DamageReduction, EnergyConfig, ResourceDatabase};
pub use graph::{Area, GraphError, Region, RegionList};
pub use node::{
    DockLock, DockLockNode, DockLockType, DockNode, DockWeakness, DockWeaknessDatabase,
    EventNode, EventPickupNode, HintNode, LocationCategory, Node, NodeIdentifier, NodeKind,
    NodeLocation, PickupNode, RemoteActivationNode, RemoteCollectionNode, TeleporterNetworkNode,
};
pub use node_context::NodeContext;
pub use patches::{GamePatches, PickupTarget};
pub use pickup::{PickupEntry, ResourceLock};
pub use requirement::{MAX_DAMAGE, Requirement, ResourceRequirement};
pub use requirement_set::{RequirementList, RequirementSet};
pub use resources::{ResourceCollection, ResourceGain, ResourceInfo, ResourceType};

pub type Capacity = i32; // Data type used to represent resource amounts, energy and damage
pub type NodeIndex = usize; // Index into the node arena: unique across the whole world graph
pub type PickupIndex = usize; // Stable identity of a pickup location
pub type ItemIdx = usize; // Index into ResourceDatabase.item_isv.keys
pub type EventIdx = usize; // Index into ResourceDatabase.event_isv.keys
pub type TrickIdx = usize; // Index into ResourceDatabase.trick_isv.keys
pub type DamageIdx = usize; // Index into ResourceDatabase.damage_isv.keys
pub type TemplateIdx = usize; // Index into ResourceDatabase.template_isv.keys
pub type DockWeaknessIdx = usize; // Index into DockWeaknessDatabase.weakness_isv.keys
pub type PlayerIdx = usize; // Player number in a multiworld session

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq + Clone> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        let key = name.to_owned();
        if let Some(&idx) = self.index_by_key.get(&key) {
            idx
        } else {
            let idx = self.keys.len();
            self.index_by_key.insert(key.clone(), idx);
            self.keys.push(key);
            idx
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<usize>
    where
        T: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index_by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A complete game description: the world graph plus everything needed to
/// evaluate requirements over it.
#[derive(Clone, Debug)]
pub struct GameData {
    pub resource_database: ResourceDatabase,
    pub dock_weakness_database: DockWeaknessDatabase,
    pub region_list: RegionList,
    pub pickup_database: HashMap<String, PickupEntry>,
    pub victory_condition: Requirement,
    pub starting_location: Option<NodeIdentifier>,
    // Resources that some requirement wants to be absent. Collecting them out of
    // order can lock the player out of a branch.
    pub dangerous_resources: BTreeSet<ResourceInfo>,
}

impl GameData {
    pub fn new(
        resource_database: ResourceDatabase,
        dock_weakness_database: DockWeaknessDatabase,
        region_list: RegionList,
        victory_condition: Requirement,
    ) -> Result<Self> {
        let mut game_data = GameData {
            resource_database,
            dock_weakness_database,
            region_list,
            pickup_database: HashMap::new(),
            victory_condition,
            starting_location: None,
            dangerous_resources: BTreeSet::new(),
        };
        game_data.validate()?;
        game_data.compute_dangerous_resources();
        Ok(game_data)
    }

    /// Checks the invariants that the search relies on. Failures here are
    /// data bugs, never properties of a seed.
    pub fn validate(&self) -> Result<()> {
        self.resource_database
            .validate_templates()
            .context("invalid requirement templates")?;
        self.region_list
            .validate()
            .context("invalid world graph")?;
        for node in self.region_list.all_nodes() {
            match &node.kind {
                NodeKind::Dock(dock) => {
                    ensure!(
                        dock.default_dock_weakness < self.dock_weakness_database.len(),
                        "dock {} refers to unknown weakness {}",
                        node.identifier,
                        dock.default_dock_weakness
                    );
                    self.region_list
                        .identifier_to_index(&dock.default_connection)
                        .with_context(|| format!("dock {} has no valid target", node.identifier))?;
                }
                NodeKind::RemoteCollection(remote) => {
                    let target = self.region_list.get_node(remote.remote).with_context(|| {
                        format!("remote node {} has an unknown target", node.identifier)
                    })?;
                    if let NodeKind::RemoteCollection(_) = target.kind {
                        bail!(
                            "remote collection node {} points to another remote collection node",
                            node.identifier
                        );
                    }
                    ensure!(
                        target.kind.is_resource_node(),
                        "remote collection node {} points to {}, which is not a resource node",
                        node.identifier,
                        target.identifier
                    );
                }
                NodeKind::RemoteActivation(remote) => {
                    ensure!(
                        self.region_list.get_node(remote.remote).is_some(),
                        "remote activation node {} has an unknown target",
                        node.identifier
                    );
                }
                NodeKind::EventPickup(fused) => {
                    let event = self.region_list.get_node(fused.event_node);
                    let pickup = self.region_list.get_node(fused.pickup_node);
                    ensure!(
                        matches!(event.map(|n| &n.kind), Some(NodeKind::Event(_)))
                            && matches!(pickup.map(|n| &n.kind), Some(NodeKind::Pickup(_))),
                        "event pickup node {} does not fuse an event and a pickup",
                        node.identifier
                    );
                }
                _ => {}
            }
        }
        if let Some(start) = &self.starting_location {
            self.region_list
                .identifier_to_index(start)
                .context("invalid starting location")?;
        }
        Ok(())
    }

    fn all_requirements(&self) -> Vec<&Requirement> {
        let mut out: Vec<&Requirement> = vec![&self.victory_condition];
        out.extend(self.region_list.all_requirements());
        out.extend(
            self.dock_weakness_database
                .weaknesses
                .iter()
                .flat_map(|w| w.requirements()),
        );
        out
    }

    pub fn compute_dangerous_resources(&mut self) {
        let db = &self.resource_database;
        let mut dangerous = BTreeSet::new();
        for req in self.all_requirements() {
            dangerous.extend(req.as_set(db).dangerous_resources());
        }
        self.dangerous_resources = dangerous;
    }

    /// Folds resources that cannot change during a resolve (e.g. trick levels)
    /// into every requirement of the game, then simplifies.
    pub fn patch_requirements(
        &mut self,
        static_resources: &ResourceCollection,
        is_static: impl Fn(ResourceInfo) -> bool,
    ) {
        let db_snapshot = self.resource_database.clone();
        let patch = |req: &Requirement| -> Requirement {
            req.patch_requirements(static_resources, &is_static, &db_snapshot)
        };
        self.resource_database.patch_templates(&patch);
        self.victory_condition = patch(&self.victory_condition);
        for weakness in self.dock_weakness_database.weaknesses.iter_mut() {
            weakness.requirement = patch(&weakness.requirement);
            if let Some(lock) = &mut weakness.lock {
                lock.requirement = patch(&lock.requirement);
            }
        }
        self.region_list.patch_requirements(&patch);
    }

    pub fn node_name(&self, node_index: NodeIndex) -> String {
        match self.region_list.get_node(node_index) {
            Some(node) => node.identifier.to_string(),
            None => format!("<node {node_index}>"),
        }
    }

    pub fn resource_name(&self, resource: ResourceInfo) -> String {
        match resource {
            ResourceInfo::Node(node_index) => self.node_name(node_index),
            ResourceInfo::PickupIndex(pickup_index) => {
                match self.region_list.pickup_node(pickup_index) {
                    Some(node) => format!("Pickup {} ({})", pickup_index, node.identifier),
                    None => format!("Pickup {pickup_index}"),
                }
            }
            other => self.resource_database.resource_name(other),
        }
    }

    pub fn default_starting_location(&self) -> Result<NodeIndex> {
        if let Some(start) = &self.starting_location {
            return Ok(self.region_list.identifier_to_index(start)?);
        }
        match self
            .region_list
            .all_nodes()
            .find(|n| n.valid_starting_location)
        {
            Some(node) => Ok(node.node_index),
            None => bail!("game has no starting location"),
        }
    }
}
