use log::{debug, info};
use resolver_game::{GameData, NodeIndex, RequirementSet};
use resolver_logic::{DamageState, State};

use crate::traverse::ResolverReach;

/// A dead end of the search at `node`.
#[derive(Clone, Debug)]
pub struct RollbackLogEntry {
    pub node: NodeIndex,
    // Some action was tried from this state
    pub has_action: bool,
    // The rollback comes from a safe action taken without branching
    pub possible_action: bool,
    // Only present when it changed since last reported for this node
    pub additional_requirements: Option<RequirementSet>,
}

/// Receives progress events from the resolver. Every method does nothing by
/// default.
pub trait ResolverObserver {
    fn log_resolve_start(&mut self, _game_data: &GameData) {}

    fn log_new_advance(&mut self, _state: &State, _reach: &ResolverReach, _game_data: &GameData) {}

    fn log_action(&mut self, _state: &State, _game_data: &GameData) {}

    fn log_checking_satisfiable_actions(
        &mut self,
        _state: &State,
        _actions: &[(NodeIndex, DamageState)],
        _game_data: &GameData,
    ) {
    }

    fn log_skip(&mut self, _node: NodeIndex, _game_data: &GameData) {}

    fn log_rollback(&mut self, _entry: &RollbackLogEntry, _game_data: &GameData) {}

    fn log_complete(&mut self, _completable: bool, _attempts: usize) {}
}

pub struct NoopObserver;

impl ResolverObserver for NoopObserver {}

/// Forwards resolver events to the `log` facade.
#[derive(Default)]
pub struct LogObserver {
    depth: usize,
}

impl LogObserver {
    pub fn new() -> Self {
        LogObserver::default()
    }

    fn indent(&self) -> String {
        " ".repeat(self.depth)
    }
}

impl ResolverObserver for LogObserver {
    fn log_resolve_start(&mut self, game_data: &GameData) {
        let node_count = game_data.region_list.all_nodes().count();
        info!("Resolving over {} nodes", node_count);
    }

    fn log_new_advance(&mut self, state: &State, reach: &ResolverReach, game_data: &GameData) {
        self.depth += 1;
        debug!(
            "{}> {} with {} nodes in reach",
            self.indent(),
            state.debug_string(game_data),
            reach.nodes.len()
        );
    }

    fn log_action(&mut self, state: &State, game_data: &GameData) {
        let gained: Vec<String> = state
            .resources_gained()
            .into_iter()
            .map(|(resource, amount)| format!("{} x{}", game_data.resource_name(resource), amount))
            .collect();
        debug!(
            "{}* {} for {}",
            self.indent(),
            game_data.node_name(state.node),
            gained.join(", ")
        );
    }

    fn log_checking_satisfiable_actions(
        &mut self,
        _state: &State,
        actions: &[(NodeIndex, DamageState)],
        game_data: &GameData,
    ) {
        let names: Vec<String> = actions
            .iter()
            .map(|&(node, _)| game_data.node_name(node))
            .collect();
        debug!("{}# Satisfiable actions: [{}]", self.indent(), names.join(", "));
    }

    fn log_skip(&mut self, node: NodeIndex, game_data: &GameData) {
        debug!(
            "{}| Skipping {}, missing additional requirements",
            self.indent(),
            game_data.node_name(node)
        );
    }

    fn log_rollback(&mut self, entry: &RollbackLogEntry, game_data: &GameData) {
        debug!(
            "{}< Rollback on {} (had action: {}, safe action: {})",
            self.indent(),
            game_data.node_name(entry.node),
            entry.has_action,
            entry.possible_action
        );
        if let Some(additional) = &entry.additional_requirements {
            debug!(
                "{}  Additional requirements:\n{}",
                self.indent(),
                additional.pretty_print(&self.indent(), game_data)
            );
        }
        self.depth = self.depth.saturating_sub(1);
    }

    fn log_complete(&mut self, completable: bool, attempts: usize) {
        info!("Resolve finished after {} attempts: completable={}", attempts, completable);
    }
}
