use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

use crate::{Capacity, DamageIdx, EventIdx, ItemIdx, NodeIndex, PickupIndex, TrickIdx};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    #[strum(serialize = "items", serialize = "item")]
    Item,
    #[strum(serialize = "events", serialize = "event")]
    Event,
    #[strum(serialize = "tricks", serialize = "trick")]
    Trick,
    Damage,
    PickupIndex,
    Node,
}

/// Identity of something that can be held in nonnegative quantity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceInfo {
    Item(ItemIdx),
    Event(EventIdx),
    Trick(TrickIdx),
    Damage(DamageIdx),
    PickupIndex(PickupIndex),
    // Marker recording that a node was visited/unlocked (dock locks, hints, teleporters)
    Node(NodeIndex),
}

impl ResourceInfo {
    pub fn resource_type(self) -> ResourceType {
        match self {
            ResourceInfo::Item(_) => ResourceType::Item,
            ResourceInfo::Event(_) => ResourceType::Event,
            ResourceInfo::Trick(_) => ResourceType::Trick,
            ResourceInfo::Damage(_) => ResourceType::Damage,
            ResourceInfo::PickupIndex(_) => ResourceType::PickupIndex,
            ResourceInfo::Node(_) => ResourceType::Node,
        }
    }

    pub fn is_damage(self) -> bool {
        matches!(self, ResourceInfo::Damage(_))
    }
}

pub type ResourceGain = Vec<(ResourceInfo, Capacity)>;

/// Amounts of every resource currently held. Cloning shares the underlying
/// map; the first mutation of a shared collection copies it.
#[derive(Clone, Debug, Default)]
pub struct ResourceCollection {
    amounts: Arc<HashMap<ResourceInfo, Capacity>>,
}

impl PartialEq for ResourceCollection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.amounts, &other.amounts) || self.amounts == other.amounts
    }
}

impl Eq for ResourceCollection {}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_gain(gain: &[(ResourceInfo, Capacity)]) -> Self {
        let mut out = Self::new();
        out.add_resource_gain(gain);
        out
    }

    pub fn get(&self, resource: ResourceInfo) -> Capacity {
        self.amounts.get(&resource).copied().unwrap_or(0)
    }

    pub fn has_resource(&self, resource: ResourceInfo) -> bool {
        self.get(resource) > 0
    }

    pub fn set(&mut self, resource: ResourceInfo, amount: Capacity) {
        let amounts = Arc::make_mut(&mut self.amounts);
        if amount <= 0 {
            amounts.remove(&resource);
        } else {
            amounts.insert(resource, amount);
        }
    }

    pub fn add(&mut self, resource: ResourceInfo, amount: Capacity) {
        if amount == 0 {
            return;
        }
        let new_amount = self.get(resource).saturating_add(amount);
        self.set(resource, new_amount);
    }

    pub fn add_resource_gain(&mut self, gain: &[(ResourceInfo, Capacity)]) {
        for &(resource, amount) in gain {
            self.add(resource, amount);
        }
    }

    pub fn with_resource_gain(&self, gain: &[(ResourceInfo, Capacity)]) -> ResourceCollection {
        let mut out = self.clone();
        out.add_resource_gain(gain);
        out
    }

    pub fn add_collection(&mut self, other: &ResourceCollection) {
        for (&resource, &amount) in other.amounts.iter() {
            self.add(resource, amount);
        }
    }

    /// True if every amount in `other` is matched or exceeded here.
    pub fn is_superset_of(&self, other: &ResourceCollection) -> bool {
        other
            .amounts
            .iter()
            .all(|(&resource, &amount)| self.get(resource) >= amount)
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceInfo, Capacity)> + '_ {
        self.amounts.iter().map(|(&r, &a)| (r, a))
    }

    /// Entries in a stable order, for output and hashing.
    pub fn sorted(&self) -> Vec<(ResourceInfo, Capacity)> {
        let mut out: Vec<_> = self.iter().collect();
        out.sort();
        out
    }

    /// Resources whose amount increased compared to `previous`, with the increase.
    pub fn difference_from(&self, previous: &ResourceCollection) -> ResourceGain {
        let mut out: ResourceGain = self
            .iter()
            .filter_map(|(resource, amount)| {
                let diff = amount - previous.get(resource);
                if diff > 0 { Some((resource, diff)) } else { None }
            })
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_copy_on_write() {
        let mut a = ResourceCollection::new();
        a.add(ResourceInfo::Item(0), 2);
        let mut b = a.clone();
        b.add(ResourceInfo::Item(0), 1);
        b.add(ResourceInfo::Event(3), 1);
        assert_eq!(a.get(ResourceInfo::Item(0)), 2);
        assert!(!a.has_resource(ResourceInfo::Event(3)));
        assert_eq!(b.get(ResourceInfo::Item(0)), 3);
        assert!(b.is_superset_of(&a));
        assert!(!a.is_superset_of(&b));
    }

    #[test]
    fn test_zero_amounts_are_not_stored() {
        let mut a = ResourceCollection::new();
        a.set(ResourceInfo::Trick(1), 0);
        a.add(ResourceInfo::Item(1), 0);
        assert!(a.is_empty());
        assert_eq!(a, ResourceCollection::new());
    }

    #[test]
    fn test_difference_from() {
        let base = ResourceCollection::from_gain(&[(ResourceInfo::Item(0), 1)]);
        let next = base.with_resource_gain(&[
            (ResourceInfo::Item(0), 2),
            (ResourceInfo::PickupIndex(4), 1),
        ]);
        assert_eq!(
            next.difference_from(&base),
            vec![
                (ResourceInfo::Item(0), 2),
                (ResourceInfo::PickupIndex(4), 1)
            ]
        );
    }

    #[test]
    fn test_resource_type_names() {
        assert_eq!("items".parse::<ResourceType>().ok(), Some(ResourceType::Item));
        assert_eq!("damage".parse::<ResourceType>().ok(), Some(ResourceType::Damage));
        assert_eq!(
            "pickup_index".parse::<ResourceType>().ok(),
            Some(ResourceType::PickupIndex)
        );
    }
}
