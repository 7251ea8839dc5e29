use anyhow::{Result, bail};
use hashbrown::HashMap;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

use crate::{
    DockLockNode, EventPickupNode, Node, NodeContext, NodeIdentifier, NodeIndex, NodeKind,
    PickupIndex, Requirement,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NotFound(NodeIdentifier),
}

#[derive(Clone, Debug, Default)]
pub struct Area {
    pub name: String,
    pub nodes: Vec<Node>,
    // source -> target -> requirement; both ends are nodes of this area
    pub connections: BTreeMap<NodeIndex, BTreeMap<NodeIndex, Requirement>>,
    pub default_node: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

impl Area {
    pub fn new(name: &str) -> Self {
        Area {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn node_by_index(&self, node_index: NodeIndex) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_index == node_index)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn connect(&mut self, source: NodeIndex, target: NodeIndex, requirement: Requirement) {
        self.connections
            .entry(source)
            .or_default()
            .insert(target, requirement);
    }
}

#[derive(Clone, Debug, Default)]
pub struct Region {
    pub name: String,
    pub areas: Vec<Area>,
    pub extra: BTreeMap<String, Value>,
}

impl Region {
    pub fn new(name: &str) -> Self {
        Region {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct NodePosition {
    region: usize,
    area: usize,
    node: usize,
}

#[derive(Clone, Debug, Default)]
struct GraphCaches {
    positions: Vec<Option<NodePosition>>,
    index_by_identifier: HashMap<NodeIdentifier, NodeIndex>,
    pickup_nodes: HashMap<PickupIndex, NodeIndex>,
    networks: HashMap<String, Vec<NodeIndex>>,
    lock_by_dock: HashMap<NodeIndex, NodeIndex>,
}

impl GraphCaches {
    fn build(regions: &[Region]) -> Result<GraphCaches> {
        let mut caches = GraphCaches::default();
        for (region_idx, region) in regions.iter().enumerate() {
            for (area_idx, area) in region.areas.iter().enumerate() {
                for (pos, node) in area.nodes.iter().enumerate() {
                    let idx = node.node_index;
                    if caches.positions.len() <= idx {
                        caches.positions.resize(idx + 1, None);
                    }
                    if let Some(other) = caches.positions[idx] {
                        let other_node = &regions[other.region].areas[other.area].nodes[other.node];
                        bail!(
                            "duplicate node index {}: {} and {}",
                            idx,
                            other_node.identifier,
                            node.identifier
                        );
                    }
                    caches.positions[idx] = Some(NodePosition {
                        region: region_idx,
                        area: area_idx,
                        node: pos,
                    });
                    if caches
                        .index_by_identifier
                        .insert(node.identifier.clone(), idx)
                        .is_some()
                    {
                        bail!("duplicate node identifier {}", node.identifier);
                    }
                    match &node.kind {
                        NodeKind::Pickup(pickup) => {
                            if caches.pickup_nodes.insert(pickup.pickup_index, idx).is_some() {
                                bail!("duplicate pickup index {}", pickup.pickup_index);
                            }
                        }
                        NodeKind::TeleporterNetwork(tele) => {
                            caches
                                .networks
                                .entry(tele.network.clone())
                                .or_default()
                                .push(idx);
                        }
                        NodeKind::DockLock(lock) => {
                            caches.lock_by_dock.insert(lock.dock, idx);
                        }
                        _ => {}
                    }
                }
                for (&source, targets) in &area.connections {
                    for &target in targets.keys() {
                        if area.node_by_index(source).is_none() || area.node_by_index(target).is_none() {
                            bail!(
                                "connection {} -> {} in area {}/{} leaves the area",
                                source,
                                target,
                                region.name,
                                area.name
                            );
                        }
                    }
                }
            }
        }
        Ok(caches)
    }
}

/// Owns every region of the world and the lookup caches derived from them.
#[derive(Clone, Debug, Default)]
pub struct RegionList {
    pub regions: Vec<Region>,
    caches: OnceLock<GraphCaches>,
}

impl RegionList {
    pub fn new(regions: Vec<Region>) -> Self {
        RegionList {
            regions,
            caches: OnceLock::new(),
        }
    }

    fn caches(&self) -> &GraphCaches {
        self.caches.get_or_init(|| match GraphCaches::build(&self.regions) {
            Ok(caches) => caches,
            Err(e) => panic!("invalid world graph: {e:#}"),
        })
    }

    pub fn invalidate_cache(&mut self) {
        self.caches.take();
    }

    pub fn validate(&self) -> Result<()> {
        GraphCaches::build(&self.regions).map(|_| ())
    }

    pub fn next_node_index(&self) -> NodeIndex {
        self.all_nodes()
            .map(|n| n.node_index + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.regions
            .iter()
            .flat_map(|r| r.areas.iter())
            .flat_map(|a| a.nodes.iter())
    }

    pub fn all_areas(&self) -> impl Iterator<Item = &Area> {
        self.regions.iter().flat_map(|r| r.areas.iter())
    }

    pub fn get_node(&self, node_index: NodeIndex) -> Option<&Node> {
        let pos = (*self.caches().positions.get(node_index)?)?;
        Some(&self.regions[pos.region].areas[pos.area].nodes[pos.node])
    }

    pub fn node(&self, node_index: NodeIndex) -> &Node {
        match self.get_node(node_index) {
            Some(node) => node,
            None => panic!("node index {node_index} is not part of the world graph"),
        }
    }

    fn position(&self, node_index: NodeIndex) -> NodePosition {
        match self.caches().positions.get(node_index).copied().flatten() {
            Some(pos) => pos,
            None => panic!("node index {node_index} is not part of the world graph"),
        }
    }

    pub fn area_of(&self, node_index: NodeIndex) -> &Area {
        let pos = self.position(node_index);
        &self.regions[pos.region].areas[pos.area]
    }

    pub fn region_of(&self, node_index: NodeIndex) -> &Region {
        &self.regions[self.position(node_index).region]
    }

    pub fn identifier_to_index(&self, identifier: &NodeIdentifier) -> Result<NodeIndex, GraphError> {
        match self.caches().index_by_identifier.get(identifier) {
            Some(&idx) => Ok(idx),
            None => Err(GraphError::NotFound(identifier.clone())),
        }
    }

    pub fn node_by_identifier(&self, identifier: &NodeIdentifier) -> Result<&Node, GraphError> {
        Ok(self.node(self.identifier_to_index(identifier)?))
    }

    pub fn pickup_node(&self, pickup_index: PickupIndex) -> Option<&Node> {
        let idx = *self.caches().pickup_nodes.get(&pickup_index)?;
        self.get_node(idx)
    }

    pub fn nodes_in_network(&self, network: &str) -> &[NodeIndex] {
        match self.caches().networks.get(network) {
            Some(members) => members,
            None => &[],
        }
    }

    pub fn lock_node_for(&self, dock: NodeIndex) -> Option<NodeIndex> {
        self.caches().lock_by_dock.get(&dock).copied()
    }

    pub fn area_connections_from(&self, node_index: NodeIndex) -> impl Iterator<Item = (NodeIndex, &Requirement)> {
        self.area_of(node_index)
            .connections
            .get(&node_index)
            .into_iter()
            .flat_map(|targets| targets.iter().map(|(&t, r)| (t, r)))
    }

    /// Special connections of the node followed by the plain edges of its area.
    pub fn potential_nodes_from<'a>(
        &'a self,
        node_index: NodeIndex,
        ctx: &NodeContext<'a>,
    ) -> Vec<(NodeIndex, Cow<'a, Requirement>)> {
        let node = self.node(node_index);
        let mut out: Vec<(NodeIndex, Cow<'a, Requirement>)> = node
            .connections_from(ctx)
            .into_iter()
            .map(|(t, r)| (t, Cow::Owned(r)))
            .collect();
        out.extend(
            self.area_connections_from(node_index)
                .map(|(t, r)| (t, Cow::Borrowed(r))),
        );
        out
    }

    pub fn add_node(&mut self, region: usize, area: usize, mut node: Node) -> NodeIndex {
        let idx = self.next_node_index();
        node.node_index = idx;
        self.regions[region].areas[area].nodes.push(node);
        self.invalidate_cache();
        idx
    }

    pub fn add_connection(&mut self, source: NodeIndex, target: NodeIndex, requirement: Requirement) {
        let pos = self.position(source);
        self.regions[pos.region].areas[pos.area].connect(source, target, requirement);
    }

    fn node_mut(&mut self, node_index: NodeIndex) -> &mut Node {
        let pos = self.position(node_index);
        &mut self.regions[pos.region].areas[pos.area].nodes[pos.node]
    }

    /// Synthesizes the lock node of every dock that does not have one yet.
    pub fn add_dock_lock_nodes(&mut self) -> usize {
        let docks: Vec<NodeIndex> = self
            .all_nodes()
            .filter(|n| matches!(n.kind, NodeKind::Dock(_)))
            .map(|n| n.node_index)
            .filter(|&idx| self.lock_node_for(idx).is_none())
            .collect();
        for &dock_index in &docks {
            let pos = self.position(dock_index);
            let dock = self.node(dock_index);
            let mut lock = Node::new(
                dock.identifier.with_node(&format!("Lock - {}", dock.name())),
                0,
                NodeKind::DockLock(DockLockNode { dock: dock_index }),
            );
            lock.layers = dock.layers.clone();
            lock.location = dock.location;
            lock.is_derived = true;
            let lock_index = self.add_node(pos.region, pos.area, lock);
            self.add_connection(lock_index, dock_index, Requirement::Trivial);
            if let NodeKind::Dock(dock) = &mut self.node_mut(dock_index).kind {
                dock.lock_node = Some(lock_index);
            }
        }
        docks.len()
    }

    fn event_pickup_pairs(area: &Area) -> Vec<(NodeIndex, NodeIndex)> {
        let mut out = vec![];
        for event in &area.nodes {
            if event.is_derived || !matches!(event.kind, NodeKind::Event(_)) {
                continue;
            }
            let Some(targets) = area.connections.get(&event.node_index) else {
                continue;
            };
            if targets.len() != 1 {
                continue;
            }
            let Some((&pickup_index, requirement)) = targets.iter().next() else {
                continue;
            };
            let is_pickup = matches!(
                area.node_by_index(pickup_index).map(|n| &n.kind),
                Some(NodeKind::Pickup(_))
            );
            let exclusive = area
                .connections
                .iter()
                .all(|(&source, t)| source == event.node_index || !t.contains_key(&pickup_index));
            if is_pickup && exclusive && *requirement == Requirement::Trivial {
                out.push((event.node_index, pickup_index));
            }
        }
        out
    }

    /// Fuses every Event node whose only exit is a free edge into a Pickup node
    /// reachable from nowhere else. Edges into the event are redirected to the
    /// fused node, which leaves through the pickup's edges.
    pub fn add_event_pickup_nodes(&mut self) -> usize {
        let mut created = 0;
        for region_idx in 0..self.regions.len() {
            for area_idx in 0..self.regions[region_idx].areas.len() {
                let pairs = Self::event_pickup_pairs(&self.regions[region_idx].areas[area_idx]);
                for (event_index, pickup_index) in pairs {
                    let area = &self.regions[region_idx].areas[area_idx];
                    let (Some(event), Some(pickup)) =
                        (area.node_by_index(event_index), area.node_by_index(pickup_index))
                    else {
                        continue;
                    };
                    let mut fused = Node::new(
                        event
                            .identifier
                            .with_node(&format!("EventPickup - {} + {}", event.name(), pickup.name())),
                        0,
                        NodeKind::EventPickup(EventPickupNode {
                            event_node: event_index,
                            pickup_node: pickup_index,
                        }),
                    );
                    fused.layers = event.layers.clone();
                    fused.location = pickup.location;
                    fused.is_derived = true;
                    let incoming: Vec<(NodeIndex, Requirement)> = area
                        .connections
                        .iter()
                        .filter_map(|(&source, t)| t.get(&event_index).map(|r| (source, r.clone())))
                        .collect();
                    let outgoing: Vec<(NodeIndex, Requirement)> = area
                        .connections
                        .get(&pickup_index)
                        .map(|t| {
                            t.iter()
                                .filter(|(target, _)| **target != event_index)
                                .map(|(&target, r)| (target, r.clone()))
                                .collect()
                        })
                        .unwrap_or_default();

                    let fused_index = self.add_node(region_idx, area_idx, fused);
                    let area = &mut self.regions[region_idx].areas[area_idx];
                    for (source, requirement) in incoming {
                        if let Some(targets) = area.connections.get_mut(&source) {
                            targets.remove(&event_index);
                        }
                        area.connect(source, fused_index, requirement);
                    }
                    for (target, requirement) in outgoing {
                        area.connect(fused_index, target, requirement);
                    }
                    created += 1;
                }
            }
        }
        created
    }

    pub fn all_requirements(&self) -> Vec<&Requirement> {
        let mut out = vec![];
        for area in self.all_areas() {
            for targets in area.connections.values() {
                out.extend(targets.values());
            }
            for node in &area.nodes {
                out.extend(node.requirements());
            }
        }
        out
    }

    pub fn patch_requirements(&mut self, patch: &dyn Fn(&Requirement) -> Requirement) {
        for region in self.regions.iter_mut() {
            for area in region.areas.iter_mut() {
                for targets in area.connections.values_mut() {
                    for requirement in targets.values_mut() {
                        *requirement = patch(requirement);
                    }
                }
                for node in area.nodes.iter_mut() {
                    for requirement in node.requirements_mut() {
                        *requirement = patch(requirement);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventNode, LocationCategory, PickupNode};

    fn node(area: &str, name: &str, idx: NodeIndex, kind: NodeKind) -> Node {
        Node::new(NodeIdentifier::new("World", area, name), idx, kind)
    }

    fn sample() -> RegionList {
        let mut area = Area::new("Room");
        area.nodes.push(node("Room", "Door", 0, NodeKind::Generic));
        area.nodes.push(node(
            "Room",
            "Boss",
            1,
            NodeKind::Event(EventNode {
                event: 0,
                leave_requires_event: false,
            }),
        ));
        area.nodes.push(node(
            "Room",
            "Item",
            2,
            NodeKind::Pickup(PickupNode {
                pickup_index: 7,
                location_category: LocationCategory::Major,
            }),
        ));
        area.connect(0, 1, Requirement::simple(crate::ResourceInfo::Item(0)));
        area.connect(1, 2, Requirement::Trivial);
        area.connect(2, 0, Requirement::Trivial);
        let mut region = Region::new("World");
        region.areas.push(area);
        RegionList::new(vec![region])
    }

    #[test]
    fn test_lookups() {
        let list = sample();
        let id = NodeIdentifier::new("World", "Room", "Item");
        assert_eq!(list.identifier_to_index(&id), Ok(2));
        assert_eq!(list.pickup_node(7).map(|n| n.node_index), Some(2));
        assert_eq!(list.area_of(1).name, "Room");
        assert_eq!(list.region_of(1).name, "World");
        let missing = NodeIdentifier::new("World", "Room", "Nowhere");
        assert_eq!(
            list.node_by_identifier(&missing),
            Err(GraphError::NotFound(missing.clone()))
        );
        assert_eq!(list.area_connections_from(1).count(), 1);
    }

    #[test]
    fn test_duplicate_node_index_rejected() {
        let mut list = sample();
        list.regions[0].areas[0]
            .nodes
            .push(node("Room", "Copy", 1, NodeKind::Generic));
        list.invalidate_cache();
        let err = list.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate node index 1"), "{err}");
    }

    #[test]
    #[should_panic(expected = "duplicate node index")]
    fn test_duplicate_node_index_aborts_cache() {
        let mut list = sample();
        list.regions[0].areas[0]
            .nodes
            .push(node("Room", "Copy", 0, NodeKind::Generic));
        list.get_node(0);
    }

    #[test]
    fn test_add_node_invalidates_cache() {
        let mut list = sample();
        assert!(list.get_node(3).is_none());
        let idx = list.add_node(0, 0, node("Room", "New", 0, NodeKind::Generic));
        assert_eq!(idx, 3);
        assert_eq!(list.node(3).name(), "New");
    }

    #[test]
    fn test_event_pickup_fusion() {
        let mut list = sample();
        assert_eq!(list.add_event_pickup_nodes(), 1);
        let fused = list
            .node_by_identifier(&NodeIdentifier::new("World", "Room", "EventPickup - Boss + Item"))
            .unwrap()
            .node_index;
        let from_door: Vec<NodeIndex> = list.area_connections_from(0).map(|(t, _)| t).collect();
        assert_eq!(from_door, vec![fused]);
        let from_fused: Vec<NodeIndex> = list.area_connections_from(fused).map(|(t, _)| t).collect();
        assert_eq!(from_fused, vec![0]);
        assert!(list.node(fused).is_derived);
    }
}
