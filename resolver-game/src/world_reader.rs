//! Reads a world graph and per-seed patches from a generic JSON format.

use anyhow::{Context, Result, bail, ensure};
use hashbrown::HashMap;
use log::info;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::{
    Area, Capacity, DamageReduction, DockLock, DockLockType, DockNode, DockWeakness,
    DockWeaknessDatabase, EventNode, GameData, GamePatches, HintNode, LocationCategory, Node,
    NodeIdentifier, NodeIndex, NodeKind, NodeLocation, PickupEntry, PickupIndex, PickupNode,
    PlayerIdx, Region, RegionList, RemoteActivationNode, RemoteCollectionNode, Requirement,
    ResourceCollection, ResourceDatabase, ResourceInfo, ResourceLock, ResourceRequirement,
    ResourceType, TeleporterNetworkNode,
};

#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum RequirementJson {
    Trivial,
    Impossible,
    And(Vec<RequirementJson>),
    Or(Vec<RequirementJson>),
    Resource(ResourceRequirementJson),
    Template(String),
}

fn default_amount() -> Capacity {
    1
}

#[derive(Deserialize, Clone, Debug)]
struct ResourceRequirementJson {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default = "default_amount")]
    amount: Capacity,
    #[serde(default)]
    negate: bool,
}

#[derive(Deserialize, Clone, Debug)]
struct ResourceAmountJson {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default = "default_amount")]
    amount: Capacity,
}

#[derive(Deserialize, Default)]
struct DamageJson {
    #[serde(default)]
    reductions: Vec<DamageReductionJson>,
}

#[derive(Deserialize)]
struct DamageReductionJson {
    item: Option<String>,
    multiplier: f32,
}

#[derive(Deserialize)]
struct EnergyJson {
    starting_energy: Capacity,
    energy_per_tank: Capacity,
    energy_tank: Option<String>,
}

#[derive(Deserialize)]
struct DockLockJson {
    lock_type: DockLockType,
    requirement: RequirementJson,
}

#[derive(Deserialize)]
struct DockWeaknessJson {
    dock_type: String,
    requirement: RequirementJson,
    lock: Option<DockLockJson>,
}

#[derive(Deserialize)]
struct ResourceLockJson {
    locked_by: String,
    item_to_lock: String,
    temporary_item: String,
}

#[derive(Deserialize)]
struct PickupJson {
    // Item name -> amount
    #[serde(default)]
    resources: BTreeMap<String, Capacity>,
    #[serde(default)]
    progression: Vec<String>,
    lock: Option<ResourceLockJson>,
    #[serde(default)]
    respects_lock: bool,
    #[serde(default)]
    unlocks_resource: bool,
    #[serde(default)]
    major: bool,
    #[serde(default)]
    key: bool,
}

#[derive(Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
enum NodeKindJson {
    Generic,
    Dock {
        dock_type: String,
        target: String,
        weakness: String,
        #[serde(default)]
        override_open_requirement: Option<RequirementJson>,
        #[serde(default)]
        override_lock_requirement: Option<RequirementJson>,
    },
    Event {
        event: String,
        #[serde(default)]
        leave_requires_event: bool,
    },
    Pickup {
        pickup_index: PickupIndex,
        #[serde(default)]
        major: bool,
    },
    Configurable,
    Hint {
        requirement: RequirementJson,
    },
    RemoteActivation {
        remote: String,
        requirement: RequirementJson,
    },
    RemoteCollection {
        remote: String,
    },
    TeleporterNetwork {
        network: String,
        is_unlocked: RequirementJson,
        requirement_to_activate: RequirementJson,
    },
}

#[derive(Deserialize)]
struct NodeJson {
    name: String,
    #[serde(default)]
    heal: bool,
    #[serde(default)]
    valid_starting_location: bool,
    #[serde(default)]
    location: Option<NodeLocation>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    layers: Vec<String>,
    // Target node name (same area) -> requirement
    #[serde(default)]
    connections: BTreeMap<String, RequirementJson>,
    #[serde(flatten)]
    kind: NodeKindJson,
}

#[derive(Deserialize)]
struct AreaJson {
    name: String,
    #[serde(default)]
    default_node: Option<String>,
    #[serde(default)]
    extra: BTreeMap<String, Value>,
    nodes: Vec<NodeJson>,
}

#[derive(Deserialize)]
struct RegionJson {
    name: String,
    #[serde(default)]
    extra: BTreeMap<String, Value>,
    areas: Vec<AreaJson>,
}

#[derive(Deserialize)]
struct WorldJson {
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    tricks: Vec<String>,
    #[serde(default)]
    damage: BTreeMap<String, DamageJson>,
    energy: Option<EnergyJson>,
    #[serde(default)]
    templates: BTreeMap<String, RequirementJson>,
    #[serde(default)]
    dock_weaknesses: BTreeMap<String, DockWeaknessJson>,
    #[serde(default)]
    pickups: BTreeMap<String, PickupJson>,
    victory_condition: RequirementJson,
    starting_location: Option<String>,
    regions: Vec<RegionJson>,
}

#[derive(Deserialize)]
struct PickupAssignmentJson {
    pickup: String,
    player: Option<PlayerIdx>,
}

#[derive(Deserialize)]
struct PatchesJson {
    #[serde(default)]
    player_index: PlayerIdx,
    starting_location: Option<String>,
    // Item name -> amount
    #[serde(default)]
    starting_items: BTreeMap<String, Capacity>,
    #[serde(default)]
    starting_resources: Vec<ResourceAmountJson>,
    #[serde(default)]
    pickups: BTreeMap<PickupIndex, PickupAssignmentJson>,
    // Dock identifier -> target dock identifier, or null to remove the connection
    #[serde(default)]
    dock_connections: BTreeMap<String, Option<String>>,
    #[serde(default)]
    dock_weaknesses: BTreeMap<String, String>,
    #[serde(default)]
    configurable_nodes: BTreeMap<String, RequirementJson>,
}

struct RequirementReader<'a> {
    db: &'a ResourceDatabase,
    node_lookup: &'a dyn Fn(&NodeIdentifier) -> Option<NodeIndex>,
}

impl RequirementReader<'_> {
    fn node(&self, name: &str) -> Result<NodeIndex> {
        let identifier = NodeIdentifier::parse(name)?;
        match (self.node_lookup)(&identifier) {
            Some(idx) => Ok(idx),
            None => bail!("unknown node {identifier}"),
        }
    }

    fn resource(&self, resource_type: &str, name: &str) -> Result<ResourceInfo> {
        let resource_type: ResourceType = resource_type
            .parse()
            .with_context(|| format!("unknown resource type '{resource_type}'"))?;
        if resource_type == ResourceType::Node {
            return Ok(ResourceInfo::Node(self.node(name)?));
        }
        self.db.resource_by_name(resource_type, name)
    }

    fn read(&self, json: &RequirementJson) -> Result<Requirement> {
        Ok(match json {
            RequirementJson::Trivial => Requirement::Trivial,
            RequirementJson::Impossible => Requirement::Impossible,
            RequirementJson::And(items) => Requirement::And(
                items.iter().map(|x| self.read(x)).collect::<Result<Vec<_>>>()?,
            ),
            RequirementJson::Or(items) => Requirement::Or(
                items.iter().map(|x| self.read(x)).collect::<Result<Vec<_>>>()?,
            ),
            RequirementJson::Resource(leaf) => {
                ensure!(leaf.amount >= 0, "negative amount for resource {}", leaf.name);
                Requirement::Resource(ResourceRequirement::new(
                    self.resource(&leaf.resource_type, &leaf.name)?,
                    leaf.amount,
                    leaf.negate,
                ))
            }
            RequirementJson::Template(name) => Requirement::Template(self.db.template_by_name(name)?),
        })
    }
}

fn read_json_file<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let json_str = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to load {} at {}", what, path.display()))?;
    serde_json::from_str(&json_str)
        .with_context(|| format!("Unable to parse {} at {}", what, path.display()))
}

pub fn read_world(path: &Path) -> Result<GameData> {
    info!("Loading world at {}", path.display());
    let world: WorldJson = read_json_file(path, "world")?;
    let game_data =
        build_world(world).with_context(|| format!("Invalid world at {}", path.display()))?;
    info!(
        "Loaded {} nodes, {} pickups",
        game_data.region_list.all_nodes().count(),
        game_data.pickup_database.len()
    );
    Ok(game_data)
}

pub fn parse_world(json_str: &str) -> Result<GameData> {
    let world: WorldJson = serde_json::from_str(json_str).context("Unable to parse world")?;
    build_world(world)
}

pub fn read_patches(path: &Path, game_data: &GameData) -> Result<GamePatches> {
    let patches: PatchesJson = read_json_file(path, "patches")?;
    build_patches(patches, game_data).with_context(|| format!("Invalid patches at {}", path.display()))
}

pub fn parse_patches(json_str: &str, game_data: &GameData) -> Result<GamePatches> {
    let patches: PatchesJson = serde_json::from_str(json_str).context("Unable to parse patches")?;
    build_patches(patches, game_data)
}

fn load_resources(world: &WorldJson) -> Result<ResourceDatabase> {
    let mut db = ResourceDatabase::default();
    for name in &world.items {
        db.add_item(name);
    }
    for name in &world.events {
        db.add_event(name);
    }
    for name in &world.tricks {
        db.add_trick(name);
    }
    for name in world.damage.keys() {
        db.add_damage(name);
    }
    for (name, damage) in &world.damage {
        let damage_idx = db.resource_by_name(ResourceType::Damage, name)?;
        let ResourceInfo::Damage(damage_idx) = damage_idx else {
            bail!("damage class {name} did not resolve to a damage resource");
        };
        for reduction in &damage.reductions {
            let item = match &reduction.item {
                Some(item) => Some(db.resource_by_name(ResourceType::Item, item)?),
                None => None,
            };
            db.add_damage_reduction(damage_idx, DamageReduction::new(item, reduction.multiplier));
        }
    }
    if let Some(energy) = &world.energy {
        db.energy.starting_energy = energy.starting_energy;
        db.energy.energy_per_tank = energy.energy_per_tank;
        db.energy.energy_tank = match &energy.energy_tank {
            Some(name) => match db.resource_by_name(ResourceType::Item, name)? {
                ResourceInfo::Item(idx) => Some(idx),
                _ => None,
            },
            None => None,
        };
    }
    for name in world.templates.keys() {
        db.declare_template(name);
    }
    Ok(db)
}

fn read_pickup(name: &str, json: &PickupJson, db: &ResourceDatabase) -> Result<PickupEntry> {
    let item = |name: &str| db.resource_by_name(ResourceType::Item, name);
    let mut pickup = PickupEntry::new(name, vec![]);
    for (item_name, &amount) in &json.resources {
        ensure!(amount >= 0, "negative amount of {item_name} in pickup {name}");
        pickup.resources.push((item(item_name)?, amount));
    }
    for stage in &json.progression {
        pickup.progression.push((item(stage)?, 1));
    }
    if let Some(lock) = &json.lock {
        pickup.resource_lock = Some(ResourceLock {
            locked_by: item(&lock.locked_by)?,
            item_to_lock: item(&lock.item_to_lock)?,
            temporary_item: item(&lock.temporary_item)?,
        });
    }
    pickup.respects_lock = json.respects_lock;
    pickup.unlocks_resource = json.unlocks_resource;
    pickup.is_major = json.major;
    pickup.is_key = json.key;
    Ok(pickup)
}

fn read_node_kind(kind: &NodeKindJson, reader: &RequirementReader, weakness_db: &DockWeaknessDatabase) -> Result<NodeKind> {
    Ok(match kind {
        NodeKindJson::Generic => NodeKind::Generic,
        NodeKindJson::Dock {
            dock_type,
            target,
            weakness,
            override_open_requirement,
            override_lock_requirement,
        } => {
            let Some(weakness_idx) = weakness_db.weakness_isv.get(weakness.as_str()) else {
                bail!("unknown dock weakness '{weakness}'");
            };
            NodeKind::Dock(DockNode {
                dock_type: dock_type.clone(),
                default_connection: NodeIdentifier::parse(target)?,
                default_dock_weakness: weakness_idx,
                override_default_open_requirement: override_open_requirement
                    .as_ref()
                    .map(|r| reader.read(r))
                    .transpose()?,
                override_default_lock_requirement: override_lock_requirement
                    .as_ref()
                    .map(|r| reader.read(r))
                    .transpose()?,
                lock_node: None,
            })
        }
        NodeKindJson::Event {
            event,
            leave_requires_event,
        } => match reader.db.resource_by_name(ResourceType::Event, event)? {
            ResourceInfo::Event(event) => NodeKind::Event(EventNode {
                event,
                leave_requires_event: *leave_requires_event,
            }),
            _ => bail!("event '{event}' did not resolve to an event"),
        },
        NodeKindJson::Pickup {
            pickup_index,
            major,
        } => NodeKind::Pickup(PickupNode {
            pickup_index: *pickup_index,
            location_category: if *major {
                LocationCategory::Major
            } else {
                LocationCategory::Minor
            },
        }),
        NodeKindJson::Configurable => NodeKind::Configurable,
        NodeKindJson::Hint { requirement } => NodeKind::Hint(HintNode {
            requirement_to_collect: reader.read(requirement)?,
        }),
        NodeKindJson::RemoteActivation {
            remote,
            requirement,
        } => NodeKind::RemoteActivation(RemoteActivationNode {
            remote: reader.node(remote)?,
            requirement_to_activate: reader.read(requirement)?,
        }),
        NodeKindJson::RemoteCollection { remote } => NodeKind::RemoteCollection(RemoteCollectionNode {
            remote: reader.node(remote)?,
        }),
        NodeKindJson::TeleporterNetwork {
            network,
            is_unlocked,
            requirement_to_activate,
        } => NodeKind::TeleporterNetwork(TeleporterNetworkNode {
            network: network.clone(),
            is_unlocked: reader.read(is_unlocked)?,
            requirement_to_activate: reader.read(requirement_to_activate)?,
        }),
    })
}

fn build_world(world: WorldJson) -> Result<GameData> {
    let mut db = load_resources(&world)?;

    // Node indices follow reading order, so requirements on node markers can
    // be resolved before the graph exists.
    let mut node_ids: HashMap<NodeIdentifier, NodeIndex> = HashMap::new();
    for region in &world.regions {
        for area in &region.areas {
            for node in &area.nodes {
                let identifier = NodeIdentifier::new(&region.name, &area.name, &node.name);
                let idx = node_ids.len();
                if node_ids.insert(identifier.clone(), idx).is_some() {
                    bail!("duplicate node {identifier}");
                }
            }
        }
    }
    let node_lookup = |id: &NodeIdentifier| node_ids.get(id).copied();

    let templates: Vec<(String, Requirement)> = {
        let reader = RequirementReader {
            db: &db,
            node_lookup: &node_lookup,
        };
        world
            .templates
            .iter()
            .map(|(name, json)| {
                let req = reader
                    .read(json)
                    .with_context(|| format!("in template {name}"))?;
                Ok((name.clone(), req))
            })
            .collect::<Result<_>>()?
    };
    for (name, req) in templates {
        let idx = db.template_by_name(&name)?;
        db.set_template(idx, req);
    }

    let reader = RequirementReader {
        db: &db,
        node_lookup: &node_lookup,
    };
    let mut weakness_db = DockWeaknessDatabase::default();
    for (name, json) in &world.dock_weaknesses {
        let lock = match &json.lock {
            Some(lock) => Some(DockLock {
                lock_type: lock.lock_type,
                requirement: reader
                    .read(&lock.requirement)
                    .with_context(|| format!("in lock of dock weakness {name}"))?,
            }),
            None => None,
        };
        weakness_db.add(DockWeakness {
            name: name.clone(),
            dock_type: json.dock_type.clone(),
            requirement: reader
                .read(&json.requirement)
                .with_context(|| format!("in dock weakness {name}"))?,
            lock,
        });
    }

    let mut pickup_database = HashMap::new();
    for (name, json) in &world.pickups {
        let pickup = read_pickup(name, json, &db).with_context(|| format!("in pickup {name}"))?;
        pickup_database.insert(name.clone(), pickup);
    }

    let mut regions = vec![];
    let mut next_index: NodeIndex = 0;
    for region_json in &world.regions {
        let mut region = Region::new(&region_json.name);
        region.extra = region_json.extra.clone();
        for area_json in &region_json.areas {
            let mut area = Area::new(&area_json.name);
            area.extra = area_json.extra.clone();
            area.default_node = area_json.default_node.clone();
            for node_json in &area_json.nodes {
                let identifier = NodeIdentifier::new(&region.name, &area.name, &node_json.name);
                let kind = read_node_kind(&node_json.kind, &reader, &weakness_db)
                    .with_context(|| format!("in node {identifier}"))?;
                let mut node = Node::new(identifier, next_index, kind);
                node.heal = node_json.heal;
                node.valid_starting_location = node_json.valid_starting_location;
                node.location = node_json.location;
                node.description = node_json.description.clone();
                if !node_json.layers.is_empty() {
                    node.layers = node_json.layers.clone();
                }
                area.nodes.push(node);
                next_index += 1;
            }
            for node_json in &area_json.nodes {
                let source = NodeIdentifier::new(&region.name, &area.name, &node_json.name);
                let source_idx = node_lookup(&source).with_context(|| format!("unknown node {source}"))?;
                for (target_name, json) in &node_json.connections {
                    let target = source.with_node(target_name);
                    let target_idx = node_lookup(&target)
                        .with_context(|| format!("connection from {source} to unknown node {target}"))?;
                    let requirement = reader
                        .read(json)
                        .with_context(|| format!("in connection {source} -> {target}"))?;
                    area.connect(source_idx, target_idx, requirement);
                }
            }
            if let Some(default_node) = &area.default_node {
                ensure!(
                    area.node_by_name(default_node).is_some(),
                    "default node {} of area {}/{} does not exist",
                    default_node,
                    region.name,
                    area.name
                );
            }
            region.areas.push(area);
        }
        regions.push(region);
    }
    let victory_condition = reader
        .read(&world.victory_condition)
        .context("in victory condition")?;
    let starting_location = world
        .starting_location
        .as_deref()
        .map(NodeIdentifier::parse)
        .transpose()?;

    let mut region_list = RegionList::new(regions);
    region_list.add_dock_lock_nodes();

    let mut game_data = GameData {
        resource_database: db,
        dock_weakness_database: weakness_db,
        region_list,
        pickup_database,
        victory_condition,
        starting_location,
        dangerous_resources: Default::default(),
    };
    game_data.validate()?;
    game_data.compute_dangerous_resources();
    Ok(game_data)
}

fn build_patches(json: PatchesJson, game_data: &GameData) -> Result<GamePatches> {
    let graph = &game_data.region_list;
    let db = &game_data.resource_database;
    let node_lookup = |id: &NodeIdentifier| graph.identifier_to_index(id).ok();
    let reader = RequirementReader {
        db,
        node_lookup: &node_lookup,
    };

    let mut patches = GamePatches::new(game_data, json.player_index)?;
    if let Some(start) = &json.starting_location {
        patches.starting_location = reader.node(start).context("in starting location")?;
    }

    let mut starting = ResourceCollection::new();
    for (name, &amount) in &json.starting_items {
        starting.add(db.resource_by_name(ResourceType::Item, name)?, amount);
    }
    for entry in &json.starting_resources {
        ensure!(entry.amount >= 0, "negative starting amount of {}", entry.name);
        starting.add(reader.resource(&entry.resource_type, &entry.name)?, entry.amount);
    }
    patches.starting_resources = starting;

    for (&pickup_index, assignment) in &json.pickups {
        let pickup = match game_data.pickup_database.get(&assignment.pickup) {
            Some(pickup) => pickup.clone(),
            None if assignment.pickup == "Nothing" => PickupEntry::nothing(),
            None => bail!("unknown pickup '{}' at index {}", assignment.pickup, pickup_index),
        };
        let player = assignment.player.unwrap_or(json.player_index);
        patches.assign_pickup(pickup_index, player, pickup);
    }

    for (dock, target) in &json.dock_connections {
        let dock_idx = reader.node(dock)?;
        let target_idx = match target {
            Some(target) => Some(reader.node(target)?),
            None => None,
        };
        patches.dock_connection.insert(dock_idx, target_idx);
    }

    for (dock, weakness) in &json.dock_weaknesses {
        let dock_idx = reader.node(dock)?;
        let Some(weakness_idx) = game_data
            .dock_weakness_database
            .weakness_isv
            .get(weakness.as_str())
        else {
            bail!("unknown dock weakness '{weakness}' for {dock}");
        };
        patches.set_dock_weakness(dock_idx, weakness_idx);
    }

    for (node, json) in &json.configurable_nodes {
        let node_idx = reader.node(node)?;
        let requirement = reader
            .read(json)
            .with_context(|| format!("in configurable node {node}"))?;
        patches.set_configurable_node(node_idx, requirement);
    }

    patches.validate(game_data)?;
    Ok(patches)
}
