use anyhow::{Result, bail};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    Capacity, DamageIdx, EventIdx, IndexedVec, ItemIdx, Requirement, ResourceCollection,
    ResourceInfo, ResourceType, TemplateIdx, TrickIdx,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DamageReduction {
    // None means the reduction always applies
    pub inventory_item: Option<ResourceInfo>,
    pub damage_multiplier: f32,
}

impl DamageReduction {
    pub fn new(inventory_item: Option<ResourceInfo>, damage_multiplier: f32) -> Self {
        DamageReduction {
            inventory_item,
            damage_multiplier,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnergyConfig {
    pub starting_energy: Capacity,
    pub energy_per_tank: Capacity,
    pub energy_tank: Option<ItemIdx>,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        EnergyConfig {
            starting_energy: 99,
            energy_per_tank: 100,
            energy_tank: None,
        }
    }
}

impl EnergyConfig {
    pub fn maximum_energy(&self, resources: &ResourceCollection) -> Capacity {
        let tanks = match self.energy_tank {
            Some(idx) => resources.get(ResourceInfo::Item(idx)),
            None => 0,
        };
        self.starting_energy
            .saturating_add(self.energy_per_tank.saturating_mul(tanks))
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResourceDatabase {
    pub item_isv: IndexedVec<String>,
    pub event_isv: IndexedVec<String>,
    pub trick_isv: IndexedVec<String>,
    pub damage_isv: IndexedVec<String>,
    pub template_isv: IndexedVec<String>,
    templates: Vec<Requirement>,
    pub damage_reductions: HashMap<DamageIdx, Vec<DamageReduction>>,
    pub energy: EnergyConfig,
}

impl ResourceDatabase {
    pub fn add_item(&mut self, name: &str) -> ItemIdx {
        self.item_isv.add(name)
    }

    pub fn add_event(&mut self, name: &str) -> EventIdx {
        self.event_isv.add(name)
    }

    pub fn add_trick(&mut self, name: &str) -> TrickIdx {
        self.trick_isv.add(name)
    }

    pub fn add_damage(&mut self, name: &str) -> DamageIdx {
        self.damage_isv.add(name)
    }

    pub fn add_damage_reduction(&mut self, damage: DamageIdx, reduction: DamageReduction) {
        self.damage_reductions
            .entry(damage)
            .or_default()
            .push(reduction);
    }

    /// Registers a template name so that requirements can refer to it before
    /// its body is known. The body starts out Impossible.
    pub fn declare_template(&mut self, name: &str) -> TemplateIdx {
        let idx = self.template_isv.add(name);
        if idx == self.templates.len() {
            self.templates.push(Requirement::Impossible);
        }
        idx
    }

    pub fn set_template(&mut self, idx: TemplateIdx, requirement: Requirement) {
        self.templates[idx] = requirement;
    }

    pub fn add_template(&mut self, name: &str, requirement: Requirement) -> TemplateIdx {
        let idx = self.declare_template(name);
        self.set_template(idx, requirement);
        idx
    }

    pub fn template(&self, idx: TemplateIdx) -> &Requirement {
        match self.templates.get(idx) {
            Some(req) => req,
            None => panic!("unknown requirement template index {idx}"),
        }
    }

    pub fn template_by_name(&self, name: &str) -> Result<TemplateIdx> {
        match self.template_isv.get(name) {
            Some(idx) => Ok(idx),
            None => bail!("undefined requirement template '{name}'"),
        }
    }

    pub fn patch_templates(&mut self, patch: &dyn Fn(&Requirement) -> Requirement) {
        for template in self.templates.iter_mut() {
            *template = patch(template);
        }
    }

    fn template_references(req: &Requirement, out: &mut Vec<TemplateIdx>) {
        match req {
            Requirement::Template(idx) => out.push(*idx),
            Requirement::And(items) | Requirement::Or(items) => {
                for item in items {
                    Self::template_references(item, out);
                }
            }
            _ => {}
        }
    }

    /// Fails if a template refers to itself, directly or through other templates.
    pub fn validate_templates(&self) -> Result<()> {
        // 0 = unvisited, 1 = on the current path, 2 = done
        let mut color = vec![0u8; self.templates.len()];
        for root in 0..self.templates.len() {
            if color[root] != 0 {
                continue;
            }
            let mut path: Vec<TemplateIdx> = vec![root];
            let mut pending: Vec<Vec<TemplateIdx>> = vec![vec![]];
            Self::template_references(&self.templates[root], &mut pending[0]);
            color[root] = 1;
            while let Some(children) = pending.last_mut() {
                match children.pop() {
                    Some(child) => {
                        if child >= self.templates.len() {
                            bail!("unknown requirement template index {child}");
                        }
                        if color[child] == 1 {
                            let start = path.iter().position(|&x| x == child).unwrap_or(0);
                            let names: Vec<&str> = path[start..]
                                .iter()
                                .chain(std::iter::once(&child))
                                .map(|&x| self.template_isv.keys[x].as_str())
                                .collect();
                            bail!("requirement template cycle: {}", names.join(" -> "));
                        }
                        if color[child] == 0 {
                            color[child] = 1;
                            let mut refs = vec![];
                            Self::template_references(&self.templates[child], &mut refs);
                            path.push(child);
                            pending.push(refs);
                        }
                    }
                    None => {
                        pending.pop();
                        if let Some(done) = path.pop() {
                            color[done] = 2;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn resource_by_name(&self, resource_type: ResourceType, name: &str) -> Result<ResourceInfo> {
        let found = match resource_type {
            ResourceType::Item => self.item_isv.get(name).map(ResourceInfo::Item),
            ResourceType::Event => self.event_isv.get(name).map(ResourceInfo::Event),
            ResourceType::Trick => self.trick_isv.get(name).map(ResourceInfo::Trick),
            ResourceType::Damage => self.damage_isv.get(name).map(ResourceInfo::Damage),
            ResourceType::PickupIndex => name.parse().ok().map(ResourceInfo::PickupIndex),
            ResourceType::Node => {
                bail!("node resources are looked up through the region list, not the database")
            }
        };
        match found {
            Some(resource) => Ok(resource),
            None => bail!("unknown {resource_type} resource '{name}'"),
        }
    }

    pub fn resource_name(&self, resource: ResourceInfo) -> String {
        match resource {
            ResourceInfo::Item(idx) => self.item_isv.keys[idx].clone(),
            ResourceInfo::Event(idx) => self.event_isv.keys[idx].clone(),
            ResourceInfo::Trick(idx) => self.trick_isv.keys[idx].clone(),
            ResourceInfo::Damage(idx) => self.damage_isv.keys[idx].clone(),
            ResourceInfo::PickupIndex(idx) => format!("Pickup {idx}"),
            ResourceInfo::Node(idx) => format!("Node {idx}"),
        }
    }

    pub fn damage_multiplier(&self, damage: DamageIdx, resources: &ResourceCollection) -> f32 {
        let mut multiplier = 1.0;
        if let Some(reductions) = self.damage_reductions.get(&damage) {
            for reduction in reductions {
                let applies = match reduction.inventory_item {
                    Some(item) => resources.has_resource(item),
                    None => true,
                };
                if applies {
                    multiplier *= reduction.damage_multiplier;
                }
            }
        }
        multiplier
    }

    pub fn damage_for(&self, damage: DamageIdx, amount: Capacity, resources: &ResourceCollection) -> Capacity {
        let reduced = (amount as f32) * self.damage_multiplier(damage, resources);
        reduced.ceil() as Capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_cycle_detected() {
        let mut db = ResourceDatabase::default();
        let a = db.declare_template("A");
        let b = db.declare_template("B");
        let c = db.add_template("C", Requirement::Trivial);
        db.set_template(a, Requirement::Or(vec![Requirement::Template(b), Requirement::Template(c)]));
        db.set_template(b, Requirement::And(vec![Requirement::Template(a)]));
        let err = db.validate_templates().unwrap_err();
        assert!(err.to_string().contains("cycle"), "{err}");

        db.set_template(b, Requirement::Template(c));
        assert!(db.validate_templates().is_ok());
    }

    #[test]
    fn test_undefined_template() {
        let db = ResourceDatabase::default();
        assert!(db.template_by_name("Missing").is_err());
    }

    #[test]
    fn test_stacked_reductions() {
        let mut db = ResourceDatabase::default();
        let varia = db.add_item("Varia");
        let gravity = db.add_item("Gravity");
        let lava = db.add_damage("Lava");
        db.add_damage_reduction(lava, DamageReduction::new(Some(ResourceInfo::Item(varia)), 0.5));
        db.add_damage_reduction(lava, DamageReduction::new(Some(ResourceInfo::Item(gravity)), 0.5));
        let both = ResourceCollection::from_gain(&[
            (ResourceInfo::Item(varia), 1),
            (ResourceInfo::Item(gravity), 1),
        ]);
        assert_eq!(db.damage_for(lava, 90, &ResourceCollection::new()), 90);
        assert_eq!(db.damage_for(lava, 90, &both), 23);
    }

    #[test]
    fn test_maximum_energy() {
        let mut db = ResourceDatabase::default();
        let tank = db.add_item("Energy Tank");
        db.energy.energy_tank = Some(tank);
        let two = ResourceCollection::from_gain(&[(ResourceInfo::Item(tank), 2)]);
        assert_eq!(db.energy.maximum_energy(&two), 299);
    }
}
