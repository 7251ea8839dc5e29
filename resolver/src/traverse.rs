use hashbrown::{HashMap, HashSet};
use resolver_game::{
    Capacity, GameData, NodeContext, NodeIndex, NodeKind, Requirement, RequirementList,
    RequirementSet, ResourceInfo,
};
use resolver_logic::{DamageState, State};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::observer::ResolverObserver;

/// Requirements learned by backtracking, keyed by the node they apply to.
pub type AdditionalRequirements = HashMap<NodeIndex, RequirementSet>;

pub fn additional_requirements_for(additional: &AdditionalRequirements, node: NodeIndex) -> RequirementSet {
    additional
        .get(&node)
        .cloned()
        .unwrap_or_else(RequirementSet::trivial)
}

/// Every node reachable from `origin` with the resources of `ctx`. Energy is
/// not tracked: damage only has to be survivable at all.
pub fn calculate_reach(ctx: &NodeContext, origin: NodeIndex) -> BTreeSet<NodeIndex> {
    let region_list = &ctx.game_data.region_list;
    let mut reached: BTreeSet<NodeIndex> = BTreeSet::new();
    reached.insert(origin);
    let mut modified_nodes: HashSet<NodeIndex> = HashSet::new();
    modified_nodes.insert(origin);

    while !modified_nodes.is_empty() {
        let mut new_modified_nodes: HashSet<NodeIndex> = HashSet::new();
        let modified_nodes_vec = {
            // Process the nodes in sorted order, to make the traversal deterministic.
            let mut m: Vec<NodeIndex> = modified_nodes.into_iter().collect();
            m.sort();
            m
        };
        for &src in &modified_nodes_vec {
            let node = ctx.node(src);
            if !ctx.satisfiable(&node.requirement_to_leave(ctx)) {
                continue;
            }
            for (dst, requirement) in region_list.potential_nodes_from(src, ctx) {
                if reached.contains(&dst) {
                    continue;
                }
                if ctx.satisfiable(&requirement) {
                    reached.insert(dst);
                    new_modified_nodes.insert(dst);
                }
            }
        }
        modified_nodes = new_modified_nodes;
    }
    reached
}

/// Resources granted by the reachable pickups of the local player, with the
/// locations that grant them.
pub fn accessible_items(ctx: &NodeContext, reach: &BTreeSet<NodeIndex>) -> BTreeMap<ResourceInfo, BTreeSet<NodeIndex>> {
    let mut out: BTreeMap<ResourceInfo, BTreeSet<NodeIndex>> = BTreeMap::new();
    for &node_index in reach {
        let NodeKind::Pickup(pickup) = &ctx.node(node_index).kind else {
            continue;
        };
        let Some(target) = ctx.patches.target_for(pickup.pickup_index) else {
            continue;
        };
        if target.player != ctx.patches.player_index {
            continue;
        }
        for (resource, _) in target.pickup.resource_gain(ctx.resources, true) {
            out.entry(resource).or_default().insert(node_index);
        }
    }
    out
}

/// Resources worth collecting: those missing from some unsatisfied
/// alternative, plus anything that reduces damage those alternatives need.
pub fn calculate_interesting_resources(
    satisfiable_requirements: &RequirementSet,
    ctx: &NodeContext,
    energy: Capacity,
) -> HashSet<ResourceInfo> {
    let db = ctx.db();
    let mut out = HashSet::new();
    for list in satisfiable_requirements.alternatives() {
        if list.satisfied(ctx.resources, energy, db) {
            continue;
        }
        for individual in list.items() {
            if let ResourceInfo::Damage(damage_idx) = individual.resource {
                if let Some(reductions) = db.damage_reductions.get(&damage_idx) {
                    out.extend(reductions.iter().filter_map(|r| r.inventory_item));
                }
                if let Some(tank) = db.energy.energy_tank {
                    out.insert(ResourceInfo::Item(tank));
                }
            } else if !individual.negate && !individual.satisfied(ctx.resources, energy, db) {
                out.insert(individual.resource);
            }
        }
    }
    out
}

/// Reach of a search state, exploring the best remaining energy first.
pub struct ResolverReach {
    // Reachable nodes other than the origin, with the energy left there
    pub nodes: BTreeMap<NodeIndex, DamageState>,
    path_to_node: HashMap<NodeIndex, Vec<NodeIndex>>,
    pub satisfiable_requirements_for_additionals: RequirementSet,
}

impl ResolverReach {
    pub fn calculate(state: &State, game_data: &GameData, additional: &AdditionalRequirements) -> ResolverReach {
        let ctx = state.node_context(game_data);
        let db = ctx.db();
        let region_list = &game_data.region_list;
        let origin = state.node;

        let mut best_arrival: HashMap<NodeIndex, DamageState> = HashMap::new();
        let mut checked: HashMap<NodeIndex, DamageState> = HashMap::new();
        let mut path_to_node: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        let mut requirements_by_node: BTreeMap<NodeIndex, Vec<RequirementList>> = BTreeMap::new();
        let mut heap: BinaryHeap<(Capacity, Reverse<NodeIndex>)> = BinaryHeap::new();

        best_arrival.insert(origin, state.damage_state);
        path_to_node.insert(origin, vec![]);
        heap.push((state.damage_state.health_for_damage_requirements(), Reverse(origin)));

        while let Some((_, Reverse(node_index))) = heap.pop() {
            let Some(&arrival) = best_arrival.get(&node_index) else {
                continue;
            };
            let node = ctx.node(node_index);
            let damage_state = arrival.apply_node_heal(node, &state.resources, db);
            if checked
                .get(&node_index)
                .is_some_and(|known| !damage_state.is_better_than(known))
            {
                continue;
            }
            checked.insert(node_index, damage_state);
            let health = damage_state.health_for_damage_requirements();

            let requirement_to_leave = node.requirement_to_leave(&ctx);
            let node_additional = additional.get(&node_index);
            for (target, requirement) in region_list.potential_nodes_from(node_index, &ctx) {
                let requirement = if *requirement_to_leave == Requirement::Trivial {
                    requirement.into_owned()
                } else {
                    Requirement::make_and(vec![requirement.into_owned(), requirement_to_leave.clone().into_owned()])
                };
                let mut satisfied = requirement.satisfied(&state.resources, health, db);
                if satisfied {
                    if let Some(extra) = node_additional {
                        satisfied = extra.satisfied(&state.resources, health, db);
                    }
                }
                let next = if satisfied {
                    damage_state.apply_damage(&requirement, &state.resources, db)
                } else {
                    None
                };
                match next {
                    Some(next) => {
                        let improves = |known: Option<&DamageState>| known.map_or(true, |h| next.is_better_than(h));
                        if improves(best_arrival.get(&target)) && improves(checked.get(&target)) {
                            best_arrival.insert(target, next);
                            let mut path = path_to_node.get(&node_index).cloned().unwrap_or_default();
                            path.push(target);
                            path_to_node.insert(target, path);
                            heap.push((next.health_for_damage_requirements(), Reverse(target)));
                        }
                    }
                    None => {
                        // Remember why the node could not be entered. Additional requirements
                        // of the source are added back by the rollback.
                        let unmet = requirement.unmet_part(&state.resources, db);
                        requirements_by_node
                            .entry(target)
                            .or_default()
                            .extend(unmet.as_set(db).alternatives().cloned());
                    }
                }
            }
        }

        let nodes: BTreeMap<NodeIndex, DamageState> = checked
            .into_iter()
            .filter(|&(idx, _)| idx != origin)
            .collect();

        let mut satisfiable = RequirementSet::impossible();
        for (node_index, requirements) in requirements_by_node {
            if nodes.contains_key(&node_index) || node_index == origin {
                continue;
            }
            let set = RequirementSet::new(requirements)
                .union(&additional_requirements_for(additional, node_index));
            satisfiable = satisfiable.union(&set);
        }

        ResolverReach {
            nodes,
            path_to_node,
            satisfiable_requirements_for_additionals: satisfiable,
        }
    }

    pub fn contains(&self, node_index: NodeIndex) -> bool {
        self.nodes.contains_key(&node_index)
    }

    pub fn path_to_node(&self, node_index: NodeIndex) -> Vec<NodeIndex> {
        self.path_to_node.get(&node_index).cloned().unwrap_or_default()
    }

    pub fn damage_state_at(&self, node_index: NodeIndex) -> DamageState {
        self.nodes
            .get(&node_index)
            .copied()
            .unwrap_or(DamageState { energy: 0 })
    }

    pub fn uncollected_resource_nodes(&self, ctx: &NodeContext) -> Vec<NodeIndex> {
        self.nodes
            .keys()
            .copied()
            .filter(|&idx| {
                let node = ctx.node(idx);
                node.kind.is_resource_node() && node.should_collect(ctx)
            })
            .collect()
    }

    pub fn collectable_resource_nodes(&self, ctx: &NodeContext) -> Vec<NodeIndex> {
        self.uncollected_resource_nodes(ctx)
            .into_iter()
            .filter(|&idx| ctx.node(idx).can_collect(ctx))
            .collect()
    }

    /// Collectable nodes whose additional requirements hold with the energy
    /// available there.
    pub fn possible_actions(
        &self,
        ctx: &NodeContext,
        additional: &AdditionalRequirements,
        observer: &mut dyn ResolverObserver,
    ) -> Vec<(NodeIndex, DamageState)> {
        let mut out = vec![];
        for node_index in self.collectable_resource_nodes(ctx) {
            let damage_state = self.damage_state_at(node_index);
            let satisfied = match additional.get(&node_index) {
                Some(extra) => extra.satisfied(ctx.resources, damage_state.energy, ctx.db()),
                None => true,
            };
            if satisfied {
                out.push((node_index, damage_state));
            } else {
                observer.log_skip(node_index, ctx.game_data);
            }
        }
        out
    }

    /// The actions among `possible_actions` that grant something the victory
    /// condition or a blocked edge still needs.
    pub fn satisfiable_actions(
        &self,
        ctx: &NodeContext,
        victory_condition: &Requirement,
        energy: Capacity,
        possible_actions: &[(NodeIndex, DamageState)],
    ) -> Vec<(NodeIndex, DamageState)> {
        let wanted = self
            .satisfiable_requirements_for_additionals
            .union(&victory_condition.as_set(ctx.db()));
        let interesting = calculate_interesting_resources(&wanted, ctx, energy);
        possible_actions
            .iter()
            .copied()
            .filter(|&(node_index, _)| {
                ctx.node(node_index)
                    .resource_gain_on_collect(ctx)
                    .iter()
                    .any(|(resource, _)| interesting.contains(resource))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use anyhow::Result;
    use resolver_game::world_reader::{parse_patches, parse_world};
    use resolver_game::{GamePatches, ResourceCollection};
    use std::sync::Arc;

    const WORLD: &str = r#"{
        "items": ["Bombs", "Suit"],
        "damage": {"Heat": {"reductions": [{"item": "Suit", "multiplier": 0.5}]}},
        "energy": {"starting_energy": 99, "energy_per_tank": 100},
        "pickups": {"Bombs": {"resources": {"Bombs": 1}, "major": true}},
        "victory_condition": {"type": "trivial"},
        "starting_location": "W/A/Start",
        "regions": [{"name": "W", "areas": [{"name": "A", "nodes": [
            {"name": "Start", "node_type": "generic", "connections": {
                "Hall": {"type": "trivial"}}},
            {"name": "Hall", "node_type": "generic", "connections": {
                "Start": {"type": "trivial"},
                "Item": {"type": "resource", "data": {"type": "items", "name": "Bombs"}},
                "Hot": {"type": "resource", "data": {"type": "damage", "name": "Heat", "amount": 60}}}},
            {"name": "Item", "node_type": "pickup", "pickup_index": 0, "connections": {
                "Hall": {"type": "trivial"}}},
            {"name": "Hot", "node_type": "pickup", "pickup_index": 1, "connections": {
                "Hot2": {"type": "resource", "data": {"type": "damage", "name": "Heat", "amount": 60}}}},
            {"name": "Hot2", "node_type": "generic"}
        ]}]}]
    }"#;

    fn setup() -> Result<(resolver_game::GameData, GamePatches)> {
        let game = parse_world(WORLD)?;
        let patches = parse_patches(
            r#"{"pickups": {"0": {"pickup": "Bombs"}, "1": {"pickup": "Bombs"}}}"#,
            &game,
        )?;
        Ok((game, patches))
    }

    #[test]
    fn test_reach_contains_origin_and_grows() -> Result<()> {
        let (game, patches) = setup()?;
        let empty = ResourceCollection::new();
        let ctx = NodeContext::new(&game, &patches, &empty);
        let reach = calculate_reach(&ctx, 0);
        assert!(reach.contains(&0));
        // Damage is only checked for survivability, so both heat edges can be crossed
        assert_eq!(reach, BTreeSet::from([0, 1, 3, 4]));

        let bombs = ResourceCollection::from_gain(&[(ResourceInfo::Item(0), 1)]);
        let ctx = NodeContext::new(&game, &patches, &bombs);
        let bigger = calculate_reach(&ctx, 0);
        assert!(bigger.is_superset(&reach));
        assert!(bigger.contains(&2));

        let items = accessible_items(&ctx, &bigger);
        assert_eq!(items[&ResourceInfo::Item(0)], BTreeSet::from([2, 3]));
        Ok(())
    }

    #[test]
    fn test_resolver_reach_tracks_energy() -> Result<()> {
        let (game, patches) = setup()?;
        let resources = ResourceCollection::new();
        let state = State::new(0, resources, DamageState { energy: 99 }, &patches);
        let reach = ResolverReach::calculate(&state, &game, &AdditionalRequirements::new());
        assert!(!reach.contains(0));
        assert_eq!(reach.nodes.get(&3), Some(&DamageState { energy: 39 }));
        // Second heat edge needs 60 more energy
        assert!(!reach.contains(4));
        assert!(!reach.contains(2));
        assert_eq!(reach.path_to_node(3), vec![1, 3]);

        let ctx = state.node_context(&game);
        let actions = reach.possible_actions(&ctx, &AdditionalRequirements::new(), &mut NoopObserver);
        assert_eq!(actions, vec![(3, DamageState { energy: 39 })]);
        assert!(!reach.satisfiable_requirements_for_additionals.is_impossible());
        Ok(())
    }

    #[test]
    fn test_additional_requirements_block_edges() -> Result<()> {
        let (game, patches) = setup()?;
        let state = Arc::new(State::new(
            0,
            ResourceCollection::new(),
            DamageState { energy: 99 },
            &patches,
        ));
        let mut additional = AdditionalRequirements::new();
        additional.insert(
            1,
            RequirementSet::new([RequirementList::new([
                resolver_game::ResourceRequirement::simple(ResourceInfo::Item(1)),
            ])]),
        );
        let reach = ResolverReach::calculate(&state, &game, &additional);
        assert_eq!(reach.nodes.keys().copied().collect::<Vec<_>>(), vec![1]);
        Ok(())
    }
}
