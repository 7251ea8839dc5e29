use rand::{Rng, seq::SliceRandom};
use resolver_game::{NodeContext, NodeIndex, NodeKind, PickupIndex};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("a random generator is required to choose a placement location")]
    MissingRng,
    #[error("no reachable pickup location is open")]
    NoLocation,
}

/// Reachable pickup locations that have nothing assigned yet, in index order.
pub fn open_pickup_locations(ctx: &NodeContext, reach: &BTreeSet<NodeIndex>) -> Vec<PickupIndex> {
    let mut out: Vec<PickupIndex> = reach
        .iter()
        .filter_map(|&idx| match &ctx.node(idx).kind {
            NodeKind::Pickup(pickup) => Some(pickup.pickup_index),
            _ => None,
        })
        .filter(|&pickup_index| ctx.patches.target_for(pickup_index).is_none())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Picks one open location in `reach` uniformly at random.
pub fn choose_placement_location<R: Rng>(
    ctx: &NodeContext,
    reach: &BTreeSet<NodeIndex>,
    rng: Option<&mut R>,
) -> Result<PickupIndex, PlacementError> {
    let rng = rng.ok_or(PlacementError::MissingRng)?;
    let locations = open_pickup_locations(ctx, reach);
    locations
        .choose(rng)
        .copied()
        .ok_or(PlacementError::NoLocation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverse::calculate_reach;
    use anyhow::Result;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use resolver_game::world_reader::{parse_patches, parse_world};
    use resolver_game::ResourceCollection;

    const WORLD: &str = r#"{
        "items": ["Bombs"],
        "pickups": {"Bombs": {"resources": {"Bombs": 1}}},
        "victory_condition": {"type": "trivial"},
        "starting_location": "W/A/Start",
        "regions": [{"name": "W", "areas": [{"name": "A", "nodes": [
            {"name": "Start", "node_type": "generic", "connections": {
                "P0": {"type": "trivial"}, "P1": {"type": "trivial"},
                "P2": {"type": "resource", "data": {"type": "items", "name": "Bombs"}}}},
            {"name": "P0", "node_type": "pickup", "pickup_index": 0},
            {"name": "P1", "node_type": "pickup", "pickup_index": 1},
            {"name": "P2", "node_type": "pickup", "pickup_index": 2}
        ]}]}]
    }"#;

    #[test]
    fn test_choose_placement_location() -> Result<()> {
        let game = parse_world(WORLD)?;
        let patches = parse_patches(r#"{"pickups": {"0": {"pickup": "Bombs"}}}"#, &game)?;
        let resources = ResourceCollection::new();
        let ctx = NodeContext::new(&game, &patches, &resources);
        let reach = calculate_reach(&ctx, 0);
        assert_eq!(open_pickup_locations(&ctx, &reach), vec![1]);

        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(choose_placement_location(&ctx, &reach, Some(&mut rng)), Ok(1));
        assert_eq!(
            choose_placement_location::<StdRng>(&ctx, &reach, None),
            Err(PlacementError::MissingRng)
        );

        let nowhere = BTreeSet::from([0]);
        assert_eq!(
            choose_placement_location(&ctx, &nowhere, Some(&mut rng)),
            Err(PlacementError::NoLocation)
        );
        Ok(())
    }
}
