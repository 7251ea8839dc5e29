use serde::{Deserialize, Serialize};

use crate::{ResourceCollection, ResourceGain, ResourceInfo};

/// While `locked_by` is not held, gains of `item_to_lock` are redirected to
/// `temporary_item`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLock {
    pub locked_by: ResourceInfo,
    pub item_to_lock: ResourceInfo,
    pub temporary_item: ResourceInfo,
}

impl ResourceLock {
    pub fn is_locked(&self, current: &ResourceCollection) -> bool {
        !current.has_resource(self.locked_by)
    }

    fn apply(&self, gain: ResourceGain) -> ResourceGain {
        gain.into_iter()
            .map(|(resource, amount)| {
                if resource == self.item_to_lock {
                    (self.temporary_item, amount)
                } else {
                    (resource, amount)
                }
            })
            .collect()
    }

    // Converts the temporaries collected so far into the real item.
    fn unlock(&self, current: &ResourceCollection) -> ResourceGain {
        let held = current.get(self.temporary_item);
        if held > 0 {
            vec![(self.item_to_lock, held)]
        } else {
            vec![]
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PickupEntry {
    pub name: String,
    pub resources: ResourceGain,
    // Progressive stages: the first stage whose resource is not yet held is granted.
    pub progression: ResourceGain,
    pub resource_lock: Option<ResourceLock>,
    pub respects_lock: bool,
    pub unlocks_resource: bool,
    pub is_major: bool,
    pub is_key: bool,
}

impl PickupEntry {
    pub fn new(name: &str, resources: ResourceGain) -> Self {
        PickupEntry {
            name: name.to_string(),
            resources,
            progression: vec![],
            resource_lock: None,
            respects_lock: false,
            unlocks_resource: false,
            is_major: false,
            is_key: false,
        }
    }

    pub fn nothing() -> Self {
        Self::new("Nothing", vec![])
    }

    pub fn is_nothing(&self) -> bool {
        self.resources.is_empty() && self.progression.is_empty()
    }

    fn conditional_resources(&self, current: &ResourceCollection) -> ResourceGain {
        let mut gain: ResourceGain = vec![];
        if let Some(stage) = self
            .progression
            .iter()
            .find(|(resource, amount)| current.get(*resource) < *amount)
            .or(self.progression.last())
        {
            gain.push(*stage);
        }
        gain.extend(self.resources.iter().copied());
        gain
    }

    /// Resources granted when collecting this pickup with `current` held.
    /// With `force_lock`, the lock applies even if the pickup does not respect it.
    pub fn resource_gain(&self, current: &ResourceCollection, force_lock: bool) -> ResourceGain {
        let mut gain = self.conditional_resources(current);
        if let Some(lock) = &self.resource_lock {
            if (force_lock || self.respects_lock) && lock.is_locked(current) {
                gain = lock.apply(gain);
            }
            if self.unlocks_resource {
                let after = current.with_resource_gain(&gain);
                gain.extend(lock.unlock(&after));
            }
        }
        gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSILE: ResourceInfo = ResourceInfo::Item(0);
    const TEMP_MISSILE: ResourceInfo = ResourceInfo::Item(1);
    const LAUNCHER: ResourceInfo = ResourceInfo::Item(2);

    fn lock() -> ResourceLock {
        ResourceLock {
            locked_by: LAUNCHER,
            item_to_lock: MISSILE,
            temporary_item: TEMP_MISSILE,
        }
    }

    #[test]
    fn test_locked_expansion_is_temporary() {
        let mut expansion = PickupEntry::new("Missile Expansion", vec![(MISSILE, 5)]);
        expansion.resource_lock = Some(lock());
        expansion.respects_lock = true;
        let gain = expansion.resource_gain(&ResourceCollection::new(), true);
        assert_eq!(gain, vec![(TEMP_MISSILE, 5)]);

        let with_launcher = ResourceCollection::from_gain(&[(LAUNCHER, 1)]);
        assert_eq!(expansion.resource_gain(&with_launcher, true), vec![(MISSILE, 5)]);
    }

    #[test]
    fn test_launcher_unlocks_temporaries() {
        let mut launcher = PickupEntry::new("Missile Launcher", vec![(LAUNCHER, 1), (MISSILE, 5)]);
        launcher.resource_lock = Some(lock());
        launcher.unlocks_resource = true;
        let current = ResourceCollection::from_gain(&[(TEMP_MISSILE, 10)]);
        let after = current.with_resource_gain(&launcher.resource_gain(&current, true));
        assert_eq!(after.get(MISSILE), 15);
        assert_eq!(after.get(LAUNCHER), 1);
    }

    #[test]
    fn test_progression() {
        let mut progressive = PickupEntry::new("Progressive Suit", vec![]);
        progressive.progression = vec![(ResourceInfo::Item(5), 1), (ResourceInfo::Item(6), 1)];
        let none = ResourceCollection::new();
        assert_eq!(progressive.resource_gain(&none, true), vec![(ResourceInfo::Item(5), 1)]);
        let first = none.with_resource_gain(&[(ResourceInfo::Item(5), 1)]);
        assert_eq!(progressive.resource_gain(&first, true), vec![(ResourceInfo::Item(6), 1)]);
        assert!(PickupEntry::nothing().is_nothing());
    }
}
