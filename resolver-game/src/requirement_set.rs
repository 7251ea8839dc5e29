use std::collections::BTreeSet;

use crate::{Capacity, GameData, ResourceCollection, ResourceDatabase, ResourceInfo, ResourceRequirement};

/// One alternative: every threshold in it must hold.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequirementList {
    items: BTreeSet<ResourceRequirement>,
}

impl RequirementList {
    pub fn new(items: impl IntoIterator<Item = ResourceRequirement>) -> Self {
        let mut list = RequirementList::default();
        for item in items {
            list.insert(item);
        }
        list
    }

    // Damage of the same kind adds up, so it is kept as a single summed threshold.
    fn insert(&mut self, item: ResourceRequirement) {
        if item.is_damage() && !item.negate {
            let existing = self
                .items
                .iter()
                .find(|x| x.resource == item.resource && !x.negate)
                .cloned();
            if let Some(existing) = existing {
                self.items.remove(&existing);
                let amount = existing.amount.saturating_add(item.amount);
                self.items
                    .insert(ResourceRequirement::new(item.resource, amount, false));
                return;
            }
        }
        self.items.insert(item);
    }

    pub fn items(&self) -> impl Iterator<Item = &ResourceRequirement> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Both lists at once.
    pub fn union(&self, other: &RequirementList) -> RequirementList {
        let mut out = self.clone();
        for item in &other.items {
            out.insert(item.clone());
        }
        out
    }

    pub fn is_subset_of(&self, other: &RequirementList) -> bool {
        self.items.is_subset(&other.items)
    }

    pub fn damage(&self, resources: &ResourceCollection, db: &ResourceDatabase) -> Capacity {
        self.items
            .iter()
            .fold(0, |acc: Capacity, item| acc.saturating_add(item.damage(resources, db)))
    }

    pub fn satisfied(&self, resources: &ResourceCollection, current_energy: Capacity, db: &ResourceDatabase) -> bool {
        let mut energy = current_energy;
        for item in &self.items {
            if !item.satisfied(resources, energy, db) {
                return false;
            }
            energy -= item.damage(resources, db);
        }
        true
    }

    pub fn dangerous_resources(&self) -> impl Iterator<Item = ResourceInfo> + '_ {
        self.items.iter().filter(|x| x.negate).map(|x| x.resource)
    }

    pub fn pretty_text(&self, game_data: &GameData) -> String {
        if self.items.is_empty() {
            return "Trivial".to_string();
        }
        let parts: Vec<String> = self.items.iter().map(|x| x.pretty_text(game_data)).collect();
        parts.join(", ")
    }
}

/// Disjunction of alternatives. No alternative is a proper superset of another.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RequirementSet {
    alternatives: BTreeSet<RequirementList>,
}

impl RequirementSet {
    pub fn new(alternatives: impl IntoIterator<Item = RequirementList>) -> Self {
        let all: BTreeSet<RequirementList> = alternatives.into_iter().collect();
        let kept = all
            .iter()
            .filter(|candidate| {
                !all.iter()
                    .any(|other| other != *candidate && other.is_subset_of(candidate))
            })
            .cloned()
            .collect();
        RequirementSet { alternatives: kept }
    }

    pub fn trivial() -> Self {
        RequirementSet {
            alternatives: BTreeSet::from([RequirementList::default()]),
        }
    }

    pub fn impossible() -> Self {
        RequirementSet {
            alternatives: BTreeSet::new(),
        }
    }

    pub fn is_trivial(&self) -> bool {
        self.alternatives.iter().any(|x| x.is_empty())
    }

    pub fn is_impossible(&self) -> bool {
        self.alternatives.is_empty()
    }

    pub fn alternatives(&self) -> impl Iterator<Item = &RequirementList> {
        self.alternatives.iter()
    }

    pub fn union(&self, other: &RequirementSet) -> RequirementSet {
        RequirementSet::new(
            self.alternatives
                .iter()
                .chain(other.alternatives.iter())
                .cloned(),
        )
    }

    /// Conjunction: every alternative of `self` combined with every alternative of `other`.
    pub fn expand_alternatives(&self, other: &RequirementSet) -> RequirementSet {
        let mut combined = vec![];
        for a in &self.alternatives {
            for b in &other.alternatives {
                combined.push(a.union(b));
            }
        }
        RequirementSet::new(combined)
    }

    pub fn satisfied(&self, resources: &ResourceCollection, current_energy: Capacity, db: &ResourceDatabase) -> bool {
        self.alternatives
            .iter()
            .any(|x| x.satisfied(resources, current_energy, db))
    }

    pub fn dangerous_resources(&self) -> BTreeSet<ResourceInfo> {
        self.alternatives
            .iter()
            .flat_map(|x| x.dangerous_resources())
            .collect()
    }

    pub fn pretty_print(&self, indent: &str, game_data: &GameData) -> String {
        if self.is_impossible() {
            return format!("{indent}Impossible");
        }
        let lines: Vec<String> = self
            .alternatives
            .iter()
            .map(|x| format!("{}{}", indent, x.pretty_text(game_data)))
            .collect();
        lines.join("\n")
    }
}
