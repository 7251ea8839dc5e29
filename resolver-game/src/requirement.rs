use serde::{Deserialize, Serialize};

use crate::requirement_set::{RequirementList, RequirementSet};
use crate::{Capacity, DamageIdx, GameData, ResourceCollection, ResourceDatabase, ResourceInfo, TemplateIdx};

/// Damage value that stands for "cannot be survived"; also used as the energy
/// budget when only satisfiability matters.
pub const MAX_DAMAGE: Capacity = 9_999_999;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub resource: ResourceInfo,
    pub amount: Capacity,
    pub negate: bool,
}

impl ResourceRequirement {
    pub fn new(resource: ResourceInfo, amount: Capacity, negate: bool) -> Self {
        ResourceRequirement {
            resource,
            amount,
            negate,
        }
    }

    pub fn simple(resource: ResourceInfo) -> Self {
        Self::new(resource, 1, false)
    }

    pub fn is_damage(&self) -> bool {
        self.resource.is_damage()
    }

    pub fn satisfied(
        &self,
        resources: &ResourceCollection,
        current_energy: Capacity,
        db: &ResourceDatabase,
    ) -> bool {
        if self.is_damage() {
            return self.negate || self.damage(resources, db) < current_energy;
        }
        let has = resources.get(self.resource) >= self.amount;
        has != self.negate
    }

    pub fn damage(&self, resources: &ResourceCollection, db: &ResourceDatabase) -> Capacity {
        match self.resource {
            ResourceInfo::Damage(damage_idx) if !self.negate => {
                db.damage_for(damage_idx, self.amount, resources).min(MAX_DAMAGE)
            }
            _ => 0,
        }
    }

    pub fn pretty_text(&self, game_data: &GameData) -> String {
        let name = game_data.resource_name(self.resource);
        if self.is_damage() {
            format!("{} damage {}", self.amount, name)
        } else if self.negate {
            format!("< {} {}", self.amount, name)
        } else if self.amount == 1 {
            name
        } else {
            format!("{} {}", self.amount, name)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requirement {
    Trivial,
    Impossible,
    Resource(ResourceRequirement),
    And(Vec<Requirement>),
    Or(Vec<Requirement>),
    Template(TemplateIdx),
}

impl Requirement {
    pub fn resource(resource: ResourceInfo, amount: Capacity) -> Requirement {
        Requirement::Resource(ResourceRequirement::new(resource, amount, false))
    }

    pub fn simple(resource: ResourceInfo) -> Requirement {
        Requirement::Resource(ResourceRequirement::simple(resource))
    }

    pub fn negated(resource: ResourceInfo, amount: Capacity) -> Requirement {
        Requirement::Resource(ResourceRequirement::new(resource, amount, true))
    }

    pub fn damage_of(damage: DamageIdx, amount: Capacity) -> Requirement {
        Requirement::resource(ResourceInfo::Damage(damage), amount)
    }

    pub fn make_and(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            match req {
                Requirement::Impossible => return Requirement::Impossible,
                Requirement::Trivial => {}
                Requirement::And(inner) => out_reqs.extend(inner),
                other => out_reqs.push(other),
            }
        }
        match out_reqs.len() {
            0 => Requirement::Trivial,
            1 => out_reqs.pop().unwrap_or(Requirement::Trivial),
            _ => Requirement::And(out_reqs),
        }
    }

    pub fn make_or(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            match req {
                Requirement::Trivial => return Requirement::Trivial,
                Requirement::Impossible => {}
                Requirement::Or(inner) => out_reqs.extend(inner),
                other => out_reqs.push(other),
            }
        }
        match out_reqs.len() {
            0 => Requirement::Impossible,
            1 => out_reqs.pop().unwrap_or(Requirement::Impossible),
            _ => Requirement::Or(out_reqs),
        }
    }

    /// Evaluates the requirement against `resources`. Inside an `And`, each
    /// child sees the energy left over after the damage of the children
    /// before it.
    pub fn satisfied(
        &self,
        resources: &ResourceCollection,
        current_energy: Capacity,
        db: &ResourceDatabase,
    ) -> bool {
        match self {
            Requirement::Trivial => true,
            Requirement::Impossible => false,
            Requirement::Resource(req) => req.satisfied(resources, current_energy, db),
            Requirement::And(items) => {
                let mut energy = current_energy;
                for item in items {
                    if !item.satisfied(resources, energy, db) {
                        return false;
                    }
                    energy -= item.damage(resources, db);
                }
                true
            }
            Requirement::Or(items) => items
                .iter()
                .any(|item| item.satisfied(resources, current_energy, db)),
            Requirement::Template(idx) => db.template(*idx).satisfied(resources, current_energy, db),
        }
    }

    /// Minimum energy lost by satisfying this requirement.
    pub fn damage(&self, resources: &ResourceCollection, db: &ResourceDatabase) -> Capacity {
        match self {
            Requirement::Trivial => 0,
            Requirement::Impossible => MAX_DAMAGE,
            Requirement::Resource(req) => req.damage(resources, db),
            Requirement::And(items) => {
                let mut total: Capacity = 0;
                for item in items {
                    if !item.satisfied(resources, MAX_DAMAGE, db) {
                        return MAX_DAMAGE;
                    }
                    total = total.saturating_add(item.damage(resources, db));
                }
                total.min(MAX_DAMAGE)
            }
            Requirement::Or(items) => items
                .iter()
                .filter(|item| item.satisfied(resources, MAX_DAMAGE, db))
                .map(|item| item.damage(resources, db))
                .min()
                .unwrap_or(MAX_DAMAGE),
            Requirement::Template(idx) => db.template(*idx).damage(resources, db),
        }
    }

    pub fn as_set(&self, db: &ResourceDatabase) -> RequirementSet {
        match self {
            Requirement::Trivial => RequirementSet::trivial(),
            Requirement::Impossible => RequirementSet::impossible(),
            Requirement::Resource(req) => {
                RequirementSet::new([RequirementList::new([req.clone()])])
            }
            Requirement::And(items) => items
                .iter()
                .fold(RequirementSet::trivial(), |acc, item| {
                    acc.expand_alternatives(&item.as_set(db))
                }),
            Requirement::Or(items) => items
                .iter()
                .fold(RequirementSet::impossible(), |acc, item| {
                    acc.union(&item.as_set(db))
                }),
            Requirement::Template(idx) => db.template(*idx).as_set(db),
        }
    }

    fn is_damage_leaf(&self) -> bool {
        matches!(self, Requirement::Resource(req) if req.is_damage())
    }

    /// Structural simplification. Templates are left as references.
    pub fn simplify(&self) -> Requirement {
        match self {
            Requirement::And(items) => {
                let mut out: Vec<Requirement> = vec![];
                for item in items {
                    let parts = match item.simplify() {
                        Requirement::Impossible => return Requirement::Impossible,
                        Requirement::Trivial => continue,
                        Requirement::And(inner) => inner,
                        other => vec![other],
                    };
                    for part in parts {
                        // Repeated damage adds up, so it is kept.
                        if part.is_damage_leaf() || !out.contains(&part) {
                            out.push(part);
                        }
                    }
                }
                match out.len() {
                    0 => Requirement::Trivial,
                    1 => out.pop().unwrap_or(Requirement::Trivial),
                    _ => Requirement::And(out),
                }
            }
            Requirement::Or(items) => {
                let mut out: Vec<Requirement> = vec![];
                for item in items {
                    let parts = match item.simplify() {
                        Requirement::Trivial => return Requirement::Trivial,
                        Requirement::Impossible => continue,
                        Requirement::Or(inner) => inner,
                        other => vec![other],
                    };
                    for part in parts {
                        if !out.contains(&part) {
                            out.push(part);
                        }
                    }
                }
                match out.len() {
                    0 => Requirement::Impossible,
                    1 => out.pop().unwrap_or(Requirement::Impossible),
                    _ => Requirement::Or(out),
                }
            }
            other => other.clone(),
        }
    }

    /// All leaf thresholds, with templates expanded.
    pub fn iterate_resource_requirements<'a>(
        &'a self,
        db: &'a ResourceDatabase,
    ) -> impl Iterator<Item = &'a ResourceRequirement> {
        let mut out: Vec<&'a ResourceRequirement> = vec![];
        let mut stack: Vec<&'a Requirement> = vec![self];
        while let Some(req) = stack.pop() {
            match req {
                Requirement::Resource(leaf) => out.push(leaf),
                Requirement::And(items) | Requirement::Or(items) => {
                    stack.extend(items.iter().rev());
                }
                Requirement::Template(idx) => stack.push(db.template(*idx)),
                Requirement::Trivial | Requirement::Impossible => {}
            }
        }
        out.into_iter()
    }

    pub fn map_leaves(
        &self,
        db: &ResourceDatabase,
        expand_templates: bool,
        f: &dyn Fn(&ResourceRequirement) -> Option<Requirement>,
    ) -> Requirement {
        match self {
            Requirement::Resource(leaf) => f(leaf).unwrap_or_else(|| self.clone()),
            Requirement::And(items) => Requirement::And(
                items
                    .iter()
                    .map(|x| x.map_leaves(db, expand_templates, f))
                    .collect(),
            ),
            Requirement::Or(items) => Requirement::Or(
                items
                    .iter()
                    .map(|x| x.map_leaves(db, expand_templates, f))
                    .collect(),
            ),
            Requirement::Template(idx) if expand_templates => {
                db.template(*idx).map_leaves(db, expand_templates, f)
            }
            other => other.clone(),
        }
    }

    /// Replaces every leaf on a static resource by Trivial or Impossible,
    /// according to `static_resources`, then simplifies. Template bodies are
    /// patched separately by the database.
    pub fn patch_requirements(
        &self,
        static_resources: &ResourceCollection,
        is_static: &dyn Fn(ResourceInfo) -> bool,
        db: &ResourceDatabase,
    ) -> Requirement {
        self.map_leaves(db, false, &|leaf| {
            if leaf.is_damage() || !is_static(leaf.resource) {
                return None;
            }
            if leaf.satisfied(static_resources, MAX_DAMAGE, db) {
                Some(Requirement::Trivial)
            } else {
                Some(Requirement::Impossible)
            }
        })
        .simplify()
    }

    /// The part of the requirement that `resources` does not already cover.
    pub fn unmet_part(&self, resources: &ResourceCollection, db: &ResourceDatabase) -> Requirement {
        self.map_leaves(db, true, &|leaf| {
            if !leaf.is_damage() && leaf.satisfied(resources, MAX_DAMAGE, db) {
                Some(Requirement::Trivial)
            } else {
                None
            }
        })
        .simplify()
    }

    pub fn pretty_text(&self, game_data: &GameData) -> String {
        match self {
            Requirement::Trivial => "Trivial".to_string(),
            Requirement::Impossible => "Impossible".to_string(),
            Requirement::Resource(req) => req.pretty_text(game_data),
            Requirement::And(items) => {
                let parts: Vec<String> = items.iter().map(|x| x.pretty_text(game_data)).collect();
                format!("({})", parts.join(" and "))
            }
            Requirement::Or(items) => {
                let parts: Vec<String> = items.iter().map(|x| x.pretty_text(game_data)).collect();
                format!("({})", parts.join(" or "))
            }
            Requirement::Template(idx) => {
                format!("[{}]", game_data.resource_database.template_isv.keys[*idx])
            }
        }
    }
}
