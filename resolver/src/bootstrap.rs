use anyhow::{Context, Result};
use log::info;
use resolver_game::{GameData, GamePatches, NodeContext, NodeKind, ResourceInfo};
use resolver_logic::{DamageState, State};

use crate::settings::ResolverSettings;

/// Compiles a copy of `game_data` for one resolve and builds the initial state.
/// Trick levels cannot change during the search, so they are folded into the
/// requirements up front.
pub fn bootstrap<'a>(
    game_data: &GameData,
    patches: &'a GamePatches,
    settings: &ResolverSettings,
) -> Result<(GameData, State<'a>)> {
    patches
        .validate(game_data)
        .context("patches do not match the game")?;
    let mut game = game_data.clone();

    let mut resources = patches.starting_resources.clone();
    resources.add_collection(&settings.trick_resources(&game)?);
    let static_resources = resources.clone();
    game.patch_requirements(&static_resources, |resource| {
        matches!(resource, ResourceInfo::Trick(_))
    });

    if settings.derive_event_pickup_nodes {
        let num_fused = game.region_list.add_event_pickup_nodes();
        if num_fused > 0 {
            info!("Derived {} event/pickup nodes", num_fused);
        }
    }
    game.validate().context("invalid game after bootstrap")?;
    game.compute_dangerous_resources();

    // Starting on a teleporter activates it, and with it every unlocked member
    // of its network.
    let start = patches.starting_location;
    let start_node = game.region_list.node(start);
    if let NodeKind::TeleporterNetwork(tele) = &start_node.kind {
        let ctx = NodeContext::new(&game, patches, &resources);
        let gain = if ctx.satisfiable(&tele.is_unlocked) {
            start_node.resource_gain_on_collect(&ctx)
        } else {
            vec![(ResourceInfo::Node(start), 1)]
        };
        resources = resources.with_resource_gain(&gain);
    }
    let damage_state = DamageState::new(&resources, &game.resource_database);
    let state = State::new(start, resources, damage_state, patches);
    Ok((game, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use resolver_game::world_reader::{parse_patches, parse_world};
    use resolver_game::Requirement;

    const WORLD: &str = r#"{
        "items": ["Energy Tank"],
        "tricks": ["Wall Jump", "Bomb Jump"],
        "energy": {"starting_energy": 99, "energy_per_tank": 100, "energy_tank": "Energy Tank"},
        "victory_condition": {"type": "trivial"},
        "starting_location": "W/A/Start",
        "regions": [{"name": "W", "areas": [{"name": "A", "nodes": [
            {"name": "Start", "node_type": "generic", "connections": {
                "Ledge": {"type": "resource", "data": {"type": "tricks", "name": "Wall Jump", "amount": 2}},
                "Pit": {"type": "resource", "data": {"type": "tricks", "name": "Bomb Jump"}}}},
            {"name": "Ledge", "node_type": "generic"},
            {"name": "Pit", "node_type": "generic"}
        ]}]}]
    }"#;

    #[test]
    fn test_tricks_are_folded() -> Result<()> {
        let game = parse_world(WORLD)?;
        let patches = parse_patches(r#"{"starting_items": {"Energy Tank": 2}}"#, &game)?;
        let settings = crate::settings::parse_resolver_settings(
            r#"{"trick_levels": [{"name": "Wall Jump", "level": 3}]}"#,
        )?;
        let (compiled, state) = bootstrap(&game, &patches, &settings)?;
        let connections: Vec<&Requirement> = compiled
            .region_list
            .area_connections_from(0)
            .map(|(_, req)| req)
            .collect();
        assert_eq!(connections, vec![&Requirement::Trivial, &Requirement::Impossible]);
        assert_eq!(state.resources.get(ResourceInfo::Trick(0)), 3);
        assert_eq!(state.damage_state.energy, 299);
        assert_eq!(state.node, 0);
        Ok(())
    }
}
