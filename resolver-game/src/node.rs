use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

use crate::{DockWeaknessIdx, EventIdx, IndexedVec, NodeIndex, PickupIndex, Requirement};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdentifier {
    pub region: String,
    pub area: String,
    pub node: String,
}

impl NodeIdentifier {
    pub fn new(region: &str, area: &str, node: &str) -> Self {
        NodeIdentifier {
            region: region.to_string(),
            area: area.to_string(),
            node: node.to_string(),
        }
    }

    /// Parses the "Region/Area/Node" form.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split('/').collect();
        ensure!(
            parts.len() == 3 && parts.iter().all(|p| !p.is_empty()),
            "invalid node identifier '{text}', expected Region/Area/Node"
        );
        Ok(NodeIdentifier::new(parts[0], parts[1], parts[2]))
    }

    pub fn with_node(&self, node: &str) -> Self {
        NodeIdentifier::new(&self.region, &self.area, node)
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.region, self.area, self.node)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeLocation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DockLockType {
    // Lock requirement is checked on every pass from the front; the back is open.
    FrontAlwaysBackFree,
    // One-time lock; passing from the back opens it for free.
    FrontBlastBackFreeUnlock,
    // One-time lock that can be opened from either side.
    FrontBlastBackBlast,
    // One-time lock that cannot be opened from the back.
    FrontBlastBackImpossible,
}

impl DockLockType {
    pub fn is_one_time(self) -> bool {
        self != DockLockType::FrontAlwaysBackFree
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DockLock {
    pub lock_type: DockLockType,
    pub requirement: Requirement,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DockWeakness {
    pub name: String,
    pub dock_type: String,
    pub requirement: Requirement,
    pub lock: Option<DockLock>,
}

impl DockWeakness {
    pub fn requirements(&self) -> Vec<&Requirement> {
        let mut out = vec![&self.requirement];
        if let Some(lock) = &self.lock {
            out.push(&lock.requirement);
        }
        out
    }
}

#[derive(Clone, Debug, Default)]
pub struct DockWeaknessDatabase {
    pub weakness_isv: IndexedVec<String>,
    pub weaknesses: Vec<DockWeakness>,
}

impl DockWeaknessDatabase {
    pub fn add(&mut self, weakness: DockWeakness) -> DockWeaknessIdx {
        let idx = self.weakness_isv.add(&weakness.name);
        if idx == self.weaknesses.len() {
            self.weaknesses.push(weakness);
        } else {
            self.weaknesses[idx] = weakness;
        }
        idx
    }

    pub fn get(&self, idx: DockWeaknessIdx) -> &DockWeakness {
        &self.weaknesses[idx]
    }

    pub fn len(&self) -> usize {
        self.weaknesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weaknesses.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DockNode {
    pub dock_type: String,
    pub default_connection: NodeIdentifier,
    pub default_dock_weakness: DockWeaknessIdx,
    // Only used while the dock has its default weakness
    pub override_default_open_requirement: Option<Requirement>,
    pub override_default_lock_requirement: Option<Requirement>,
    pub lock_node: Option<NodeIndex>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DockLockNode {
    pub dock: NodeIndex,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventNode {
    pub event: EventIdx,
    pub leave_requires_event: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LocationCategory {
    Major,
    Minor,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PickupNode {
    pub pickup_index: PickupIndex,
    pub location_category: LocationCategory,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventPickupNode {
    pub event_node: NodeIndex,
    pub pickup_node: NodeIndex,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HintNode {
    pub requirement_to_collect: Requirement,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RemoteActivationNode {
    pub remote: NodeIndex,
    pub requirement_to_activate: Requirement,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RemoteCollectionNode {
    pub remote: NodeIndex,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TeleporterNetworkNode {
    pub network: String,
    pub is_unlocked: Requirement,
    pub requirement_to_activate: Requirement,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Generic,
    Dock(DockNode),
    DockLock(DockLockNode),
    Event(EventNode),
    EventPickup(EventPickupNode),
    Pickup(PickupNode),
    Configurable,
    Hint(HintNode),
    RemoteActivation(RemoteActivationNode),
    RemoteCollection(RemoteCollectionNode),
    TeleporterNetwork(TeleporterNetworkNode),
}

impl NodeKind {
    pub fn is_resource_node(&self) -> bool {
        match self {
            NodeKind::Generic | NodeKind::Dock(_) | NodeKind::Configurable => false,
            NodeKind::DockLock(_)
            | NodeKind::Event(_)
            | NodeKind::EventPickup(_)
            | NodeKind::Pickup(_)
            | NodeKind::Hint(_)
            | NodeKind::RemoteActivation(_)
            | NodeKind::RemoteCollection(_)
            | NodeKind::TeleporterNetwork(_) => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Generic => "generic",
            NodeKind::Dock(_) => "dock",
            NodeKind::DockLock(_) => "dock_lock",
            NodeKind::Event(_) => "event",
            NodeKind::EventPickup(_) => "event_pickup",
            NodeKind::Pickup(_) => "pickup",
            NodeKind::Configurable => "configurable",
            NodeKind::Hint(_) => "hint",
            NodeKind::RemoteActivation(_) => "remote_activation",
            NodeKind::RemoteCollection(_) => "remote_collection",
            NodeKind::TeleporterNetwork(_) => "teleporter_network",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub identifier: NodeIdentifier,
    pub node_index: NodeIndex,
    pub heal: bool,
    pub location: Option<NodeLocation>,
    pub description: String,
    pub layers: Vec<String>,
    pub valid_starting_location: bool,
    pub is_derived: bool,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(identifier: NodeIdentifier, node_index: NodeIndex, kind: NodeKind) -> Self {
        Node {
            identifier,
            node_index,
            heal: false,
            location: None,
            description: String::new(),
            layers: vec!["default".to_string()],
            valid_starting_location: false,
            is_derived: false,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.identifier.node
    }

    pub fn requirements(&self) -> Vec<&Requirement> {
        match &self.kind {
            NodeKind::Dock(dock) => dock
                .override_default_open_requirement
                .iter()
                .chain(dock.override_default_lock_requirement.iter())
                .collect(),
            NodeKind::Hint(hint) => vec![&hint.requirement_to_collect],
            NodeKind::RemoteActivation(remote) => vec![&remote.requirement_to_activate],
            NodeKind::TeleporterNetwork(tele) => {
                vec![&tele.is_unlocked, &tele.requirement_to_activate]
            }
            _ => vec![],
        }
    }

    pub fn requirements_mut(&mut self) -> Vec<&mut Requirement> {
        match &mut self.kind {
            NodeKind::Dock(dock) => dock
                .override_default_open_requirement
                .iter_mut()
                .chain(dock.override_default_lock_requirement.iter_mut())
                .collect(),
            NodeKind::Hint(hint) => vec![&mut hint.requirement_to_collect],
            NodeKind::RemoteActivation(remote) => vec![&mut remote.requirement_to_activate],
            NodeKind::TeleporterNetwork(tele) => {
                vec![&mut tele.is_unlocked, &mut tele.requirement_to_activate]
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_parse() {
        let id = NodeIdentifier::parse("Crateria/Landing Site/Ship").unwrap();
        assert_eq!(id, NodeIdentifier::new("Crateria", "Landing Site", "Ship"));
        assert_eq!(id.to_string(), "Crateria/Landing Site/Ship");
        assert!(NodeIdentifier::parse("Crateria/Ship").is_err());
        assert!(NodeIdentifier::parse("A//B").is_err());
    }

    #[test]
    fn test_lock_type_names() {
        let lock: DockLockType = "front_blast_back_free_unlock".parse().unwrap();
        assert_eq!(lock, DockLockType::FrontBlastBackFreeUnlock);
        assert!(lock.is_one_time());
        assert!(!DockLockType::FrontAlwaysBackFree.is_one_time());
    }
}
