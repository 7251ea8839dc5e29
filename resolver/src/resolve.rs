use hashbrown::{HashMap, HashSet};
use log::{debug, info};
use resolver_game::{
    GameData, GamePatches, LocationCategory, NodeContext, NodeIndex, NodeKind, Requirement,
    RequirementSet, ResourceInfo,
};
use resolver_logic::State;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::{
    bootstrap::bootstrap,
    observer::{ResolverObserver, RollbackLogEntry},
    settings::{ResolverSettings, VictoryMode},
    spoiler_log::ActionPath,
    traverse::{AdditionalRequirements, ResolverReach, additional_requirements_for},
};

#[derive(Debug, Error)]
pub enum ResolveFailure {
    #[error("no way to victory from {start}")]
    Unsatisfiable {
        start: String,
        // What the start node was found to be missing
        additional_requirements: RequirementSet,
    },
    #[error("gave up after {attempts} attempts")]
    Timeout { attempts: usize },
    #[error(transparent)]
    InvalidInput(#[from] anyhow::Error),
}

/// Order in which actions are tried, highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionPriority {
    Dangerous,
    EverythingElse,
    EventOrMajor,
    Prioritized,
}

/// Search-wide state shared by every depth of the resolver.
pub struct Logic<'g> {
    pub game: &'g GameData,
    pub victory_condition: Requirement,
    pub additional_requirements: AdditionalRequirements,
    last_printed_additional: HashMap<NodeIndex, RequirementSet>,
    // Resources the victory condition asks for directly
    victory_resources: HashSet<ResourceInfo>,
    prioritize_events: bool,
    max_attempts: Option<usize>,
    time_limit: Option<Duration>,
    start_time: Instant,
    attempts: usize,
}

impl<'g> Logic<'g> {
    pub fn new(game: &'g GameData, patches: &GamePatches, settings: &ResolverSettings) -> Self {
        let victory_condition = victory_requirement(game, patches, settings.victory);
        let victory_resources = victory_condition
            .iterate_resource_requirements(&game.resource_database)
            .filter(|leaf| !leaf.negate && !matches!(leaf.resource, ResourceInfo::PickupIndex(_)))
            .map(|leaf| leaf.resource)
            .collect();
        Logic {
            game,
            victory_condition,
            additional_requirements: AdditionalRequirements::new(),
            last_printed_additional: HashMap::new(),
            victory_resources,
            prioritize_events: settings.prioritize_events,
            max_attempts: settings.max_attempts,
            time_limit: settings
                .time_limit_seconds
                .and_then(|secs| Duration::try_from_secs_f32(secs).ok()),
            start_time: Instant::now(),
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn get_additional_requirements(&self, node: NodeIndex) -> RequirementSet {
        additional_requirements_for(&self.additional_requirements, node)
    }

    pub fn set_additional_requirements(&mut self, node: NodeIndex, requirements: RequirementSet) {
        self.additional_requirements.insert(node, requirements);
    }

    fn victory_satisfied(&self, state: &State) -> bool {
        self.victory_condition.satisfied(
            &state.resources,
            state.damage_state.health_for_damage_requirements(),
            &self.game.resource_database,
        )
    }

    /// Counts one forward step and fails once the budget is spent.
    fn check_budget(&mut self) -> Result<(), ResolveFailure> {
        self.attempts += 1;
        let over_attempts = self.max_attempts.is_some_and(|max| self.attempts > max);
        let over_time = self
            .time_limit
            .is_some_and(|limit| self.start_time.elapsed() > limit);
        if over_attempts || over_time {
            return Err(ResolveFailure::Timeout {
                attempts: self.attempts,
            });
        }
        Ok(())
    }

    pub fn action_priority(&self, ctx: &NodeContext, node: NodeIndex) -> ActionPriority {
        let gain = ctx.node(node).resource_gain_on_collect(ctx);
        if gain
            .iter()
            .any(|(resource, _)| self.game.dangerous_resources.contains(resource))
        {
            ActionPriority::Dangerous
        } else if gain
            .iter()
            .any(|(resource, _)| self.victory_resources.contains(resource))
        {
            ActionPriority::Prioritized
        } else if self.prioritize_events && is_event_or_major(ctx, node) {
            ActionPriority::EventOrMajor
        } else {
            ActionPriority::EverythingElse
        }
    }

    fn log_rollback(
        &mut self,
        state: &State,
        has_action: bool,
        possible_action: bool,
        observer: &mut dyn ResolverObserver,
    ) {
        let current = self.get_additional_requirements(state.node);
        let changed = self.last_printed_additional.get(&state.node) != Some(&current);
        let additional_requirements = if changed {
            self.last_printed_additional
                .insert(state.node, current.clone());
            Some(current)
        } else {
            None
        };
        let entry = RollbackLogEntry {
            node: state.node,
            has_action,
            possible_action,
            additional_requirements,
        };
        observer.log_rollback(&entry, self.game);
    }
}

/// The game's victory condition, extended with every location holding a
/// pickup of the resolved player when configured.
pub fn victory_requirement(game: &GameData, patches: &GamePatches, mode: VictoryMode) -> Requirement {
    let all_pickups = || {
        Requirement::make_and(
            patches
                .local_pickup_indices()
                .into_iter()
                .map(|idx| Requirement::simple(ResourceInfo::PickupIndex(idx)))
                .collect(),
        )
    };
    match mode {
        VictoryMode::Requirement => game.victory_condition.clone(),
        VictoryMode::AllPickups => all_pickups(),
        VictoryMode::RequirementAndAllPickups => {
            Requirement::make_and(vec![game.victory_condition.clone(), all_pickups()])
        }
    }
}

fn is_event_or_major(ctx: &NodeContext, node: NodeIndex) -> bool {
    match &ctx.node(node).kind {
        NodeKind::Event(_) | NodeKind::EventPickup(_) => true,
        NodeKind::Pickup(pickup) => {
            pickup.location_category == LocationCategory::Major
                || ctx
                    .patches
                    .target_for(pickup.pickup_index)
                    .is_some_and(|target| target.pickup.is_major || target.pickup.is_key)
        }
        _ => false,
    }
}

/// An action can be taken without branching if it cannot lock anything and
/// is worth having anyway.
fn should_check_if_action_is_safe(ctx: &NodeContext, node: NodeIndex, game: &GameData) -> bool {
    let gain = ctx.node(node).resource_gain_on_collect(ctx);
    if gain
        .iter()
        .any(|(resource, _)| game.dangerous_resources.contains(resource))
    {
        return false;
    }
    is_event_or_major(ctx, node)
}

type AdvanceResult<'a> = Result<(Option<Arc<State<'a>>>, bool), ResolveFailure>;

fn advance_depth<'a>(
    state: Arc<State<'a>>,
    logic: &mut Logic,
    observer: &mut dyn ResolverObserver,
    reach: Option<ResolverReach>,
) -> AdvanceResult<'a> {
    if logic.victory_satisfied(&state) {
        return Ok((Some(state), true));
    }
    logic.check_budget()?;

    let game = logic.game;
    let reach = match reach {
        Some(reach) => reach,
        None => ResolverReach::calculate(&state, game, &logic.additional_requirements),
    };
    observer.log_new_advance(&state, &reach, game);
    let ctx = state.node_context(game);

    let mut actions = reach.possible_actions(&ctx, &logic.additional_requirements, observer);
    // Stable, so equal priorities keep node order
    actions.sort_by_key(|&(node, _)| Reverse(logic.action_priority(&ctx, node)));

    for &(action, damage_state) in &actions {
        if !should_check_if_action_is_safe(&ctx, action, game) {
            continue;
        }
        let potential_state = Arc::new(state.act_on_node(
            ctx.node(action),
            game,
            reach.path_to_node(action),
            damage_state,
        ));
        let potential_reach =
            ResolverReach::calculate(&potential_state, game, &logic.additional_requirements);

        // If we can go back to where we were, it's a simple safe node
        if potential_reach.contains(state.node) {
            observer.log_action(&potential_state, game);
            let (result, child_has_action) =
                advance_depth(potential_state, logic, observer, Some(potential_reach))?;
            if !child_has_action {
                logic.log_rollback(&state, true, true, observer);
            }
            // A safe node that was a dead end makes this one a dead end too
            return Ok((result, true));
        }
    }

    let energy = state.damage_state.health_for_damage_requirements();
    let satisfiable = reach.satisfiable_actions(&ctx, &logic.victory_condition, energy, &actions);
    observer.log_checking_satisfiable_actions(&state, &satisfiable, game);

    let mut has_action = false;
    for (action, damage_state) in satisfiable {
        let next_state = Arc::new(state.act_on_node(
            ctx.node(action),
            game,
            reach.path_to_node(action),
            damage_state,
        ));
        observer.log_action(&next_state, game);
        let (result, _) = advance_depth(next_state, logic, observer, None)?;
        if result.is_some() {
            return Ok((result, true));
        }
        has_action = true;
    }

    logic.log_rollback(&state, has_action, false, observer);
    let mut additional = reach.satisfiable_requirements_for_additionals.clone();
    if has_action {
        for node in reach.collectable_resource_nodes(&ctx) {
            additional = additional.union(&logic.get_additional_requirements(node));
        }
    }
    logic.set_additional_requirements(state.node, additional);
    Ok((None, has_action))
}

/// Searches a bootstrapped game from `initial_state` for a sequence of
/// collections that reaches victory. Returns the final state.
pub fn resolve_from_state<'a>(
    game: &GameData,
    initial_state: State<'a>,
    settings: &ResolverSettings,
    observer: &mut dyn ResolverObserver,
) -> Result<Arc<State<'a>>, ResolveFailure> {
    let mut logic = Logic::new(game, initial_state.patches, settings);
    let start = initial_state.node;
    observer.log_resolve_start(game);
    info!("Resolving from {}", game.node_name(start));
    debug!("Victory condition: {}", logic.victory_condition.pretty_text(game));

    let result = advance_depth(Arc::new(initial_state), &mut logic, observer, None);
    let attempts = logic.attempts();
    match result {
        Ok((Some(state), _)) => {
            observer.log_complete(true, attempts);
            info!("Completable after {} attempts", attempts);
            Ok(state)
        }
        Ok((None, _)) => {
            observer.log_complete(false, attempts);
            info!("Not completable after {} attempts", attempts);
            Err(ResolveFailure::Unsatisfiable {
                start: game.node_name(start),
                additional_requirements: logic.get_additional_requirements(start),
            })
        }
        Err(err) => {
            observer.log_complete(false, attempts);
            info!("Resolve stopped after {} attempts: {}", attempts, err);
            Err(err)
        }
    }
}

/// Decides whether `patches` can be completed, returning the collection order
/// found.
pub fn resolve(
    game: &GameData,
    patches: &GamePatches,
    settings: &ResolverSettings,
    observer: &mut dyn ResolverObserver,
) -> Result<ActionPath, ResolveFailure> {
    let (compiled, initial_state) = bootstrap(game, patches, settings)?;
    let final_state = resolve_from_state(&compiled, initial_state, settings, observer)?;
    Ok(ActionPath::from_state(&final_state, &compiled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use anyhow::Result;
    use resolver_game::world_reader::{parse_patches, parse_world};

    const WORLD: &str = r#"{
        "items": ["Key", "Curse"],
        "events": ["Gate"],
        "pickups": {
            "Key": {"resources": {"Key": 1}, "major": true},
            "Curse": {"resources": {"Curse": 1}}
        },
        "victory_condition": {"type": "resource", "data": {"type": "events", "name": "Gate"}},
        "starting_location": "W/A/Start",
        "regions": [{"name": "W", "areas": [{"name": "A", "nodes": [
            {"name": "Start", "node_type": "generic", "connections": {
                "Item": {"type": "trivial"},
                "Other": {"type": "trivial"},
                "Gate": {"type": "and", "data": [
                    {"type": "resource", "data": {"type": "items", "name": "Key"}},
                    {"type": "resource", "data": {"type": "items", "name": "Curse", "negate": true}}
                ]}}},
            {"name": "Item", "node_type": "pickup", "pickup_index": 0, "connections": {
                "Start": {"type": "trivial"}}},
            {"name": "Other", "node_type": "pickup", "pickup_index": 1, "connections": {
                "Start": {"type": "trivial"}}},
            {"name": "Gate", "node_type": "event", "event": "Gate"}
        ]}]}]
    }"#;

    #[test]
    fn test_priorities() -> Result<()> {
        let game = parse_world(WORLD)?;
        let patches = parse_patches(
            r#"{"pickups": {"0": {"pickup": "Key"}, "1": {"pickup": "Curse"}}}"#,
            &game,
        )?;
        let settings = ResolverSettings::default();
        let (compiled, state) = bootstrap(&game, &patches, &settings)?;
        let logic = Logic::new(&compiled, &patches, &settings);
        let ctx = state.node_context(&compiled);
        assert_eq!(logic.action_priority(&ctx, 1), ActionPriority::EventOrMajor);
        assert_eq!(logic.action_priority(&ctx, 2), ActionPriority::Dangerous);
        assert_eq!(logic.action_priority(&ctx, 3), ActionPriority::Prioritized);
        Ok(())
    }

    #[test]
    fn test_dangerous_item_is_avoided() -> Result<()> {
        let game = parse_world(WORLD)?;
        let patches = parse_patches(
            r#"{"pickups": {"0": {"pickup": "Key"}, "1": {"pickup": "Curse"}}}"#,
            &game,
        )?;
        let path = resolve(&game, &patches, &ResolverSettings::default(), &mut NoopObserver)?;
        let nodes: Vec<&str> = path.actions.iter().map(|a| a.node.as_str()).collect();
        assert_eq!(nodes, vec!["W/A/Item", "W/A/Gate"]);
        Ok(())
    }

    #[test]
    fn test_all_pickups_victory() -> Result<()> {
        let game = parse_world(WORLD)?;
        let patches = parse_patches(
            r#"{"pickups": {"0": {"pickup": "Key"}, "1": {"pickup": "Curse"}}}"#,
            &game,
        )?;
        let settings = ResolverSettings {
            victory: VictoryMode::RequirementAndAllPickups,
            ..ResolverSettings::default()
        };
        // Gate closes once the curse is held
        let result = resolve(&game, &patches, &settings, &mut NoopObserver);
        assert!(matches!(result, Err(ResolveFailure::Unsatisfiable { .. })));

        let settings = ResolverSettings {
            victory: VictoryMode::AllPickups,
            ..ResolverSettings::default()
        };
        let path = resolve(&game, &patches, &settings, &mut NoopObserver)?;
        assert_eq!(path.actions.len(), 2);
        Ok(())
    }

    #[test]
    fn test_attempt_budget() -> Result<()> {
        let game = parse_world(WORLD)?;
        let patches = parse_patches(
            r#"{"pickups": {"0": {"pickup": "Key"}, "1": {"pickup": "Curse"}}}"#,
            &game,
        )?;
        let settings = ResolverSettings {
            max_attempts: Some(1),
            ..ResolverSettings::default()
        };
        let result = resolve(&game, &patches, &settings, &mut NoopObserver);
        assert!(matches!(result, Err(ResolveFailure::Timeout { attempts: 2 })));
        Ok(())
    }

    // Key is safe to take; Junk only ever gives half of what the gate needs
    const ROLLBACK_WORLD: &str = r#"{
        "items": ["Key", "Half", "Missing"],
        "events": ["Gate"],
        "pickups": {
            "Key": {"resources": {"Key": 1}, "major": true},
            "Half": {"resources": {"Half": 1}}
        },
        "victory_condition": {"type": "resource", "data": {"type": "events", "name": "Gate"}},
        "starting_location": "W/A/Start",
        "regions": [{"name": "W", "areas": [{"name": "A", "nodes": [
            {"name": "Start", "node_type": "generic", "connections": {
                "Key": {"type": "trivial"},
                "Junk": {"type": "trivial"},
                "Gate": {"type": "and", "data": [
                    {"type": "resource", "data": {"type": "items", "name": "Half"}},
                    {"type": "resource", "data": {"type": "items", "name": "Missing"}}
                ]}}},
            {"name": "Key", "node_type": "pickup", "pickup_index": 0, "connections": {
                "Start": {"type": "trivial"}}},
            {"name": "Junk", "node_type": "pickup", "pickup_index": 1, "connections": {
                "Start": {"type": "trivial"}}},
            {"name": "Gate", "node_type": "event", "event": "Gate"}
        ]}]}]
    }"#;

    #[derive(Default)]
    struct RollbackRecorder {
        entries: Vec<(NodeIndex, bool, bool)>,
    }

    impl ResolverObserver for RollbackRecorder {
        fn log_rollback(&mut self, entry: &RollbackLogEntry, _game_data: &GameData) {
            self.entries
                .push((entry.node, entry.has_action, entry.possible_action));
        }
    }

    fn rollbacks(junk: &str) -> Result<Vec<(NodeIndex, bool, bool)>> {
        let game = parse_world(ROLLBACK_WORLD)?;
        let patches = parse_patches(
            &format!(r#"{{"pickups": {{"0": {{"pickup": "Key"}}, "1": {{"pickup": "{junk}"}}}}}}"#),
            &game,
        )?;
        let mut recorder = RollbackRecorder::default();
        let result = resolve(&game, &patches, &ResolverSettings::default(), &mut recorder);
        assert!(matches!(result, Err(ResolveFailure::Unsatisfiable { .. })));
        Ok(recorder.entries)
    }

    #[test]
    fn test_safe_action_rollback_follows_child_actions() -> Result<()> {
        // After the safe Key, nothing is left to try
        assert_eq!(rollbacks("Nothing")?, vec![(1, false, false), (0, true, true)]);
        // After the safe Key, Junk is tried and fails; the start is not reported again
        assert_eq!(rollbacks("Half")?, vec![(2, false, false), (1, true, false)]);
        Ok(())
    }

    #[test]
    fn test_major_location_is_prioritized() -> Result<()> {
        let world = ROLLBACK_WORLD.replace(
            r#""pickup_index": 1,"#,
            r#""pickup_index": 1, "major": true,"#,
        );
        let game = parse_world(&world)?;
        let patches = parse_patches(
            r#"{"pickups": {"0": {"pickup": "Key"}, "1": {"pickup": "Half"}}}"#,
            &game,
        )?;
        let settings = ResolverSettings::default();
        let (compiled, state) = bootstrap(&game, &patches, &settings)?;
        let logic = Logic::new(&compiled, &patches, &settings);
        let ctx = state.node_context(&compiled);
        assert_eq!(logic.action_priority(&ctx, 2), ActionPriority::EventOrMajor);

        let settings = ResolverSettings {
            prioritize_events: false,
            ..ResolverSettings::default()
        };
        let logic = Logic::new(&compiled, &patches, &settings);
        assert_eq!(logic.action_priority(&ctx, 2), ActionPriority::EverythingElse);
        Ok(())
    }
}
