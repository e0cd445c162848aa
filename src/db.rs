//! Entity cache, the single source of truth for fetched records.
//!
//! One cache per resource type (`type → (id → entity)` is realised as one
//! typed [`EntityCache`] inside each resource slice of the store).

use std::collections::{BTreeMap, HashMap};

use crate::types::{EntityId, Resource};

/// Id → entity mapping returned by fetches and accepted by [`EntityCache::merge`].
pub type Entities<R> = BTreeMap<EntityId, R>;

/// Build an [`Entities`] mapping from parsed records.
pub fn to_entities<R: Resource>(items: impl IntoIterator<Item = R>) -> Entities<R> {
    items
        .into_iter()
        .map(|item| (item.id().to_string(), item))
        .collect()
}

#[derive(Debug, Clone)]
pub struct EntityCache<R> {
    entities: HashMap<EntityId, R>,
}

impl<R> Default for EntityCache<R> {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }
}

impl<R: Resource> EntityCache<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace (not deep-merge) each given entry; leave all others untouched.
    pub fn merge(&mut self, new: &Entities<R>) {
        for (id, entity) in new {
            self.entities.insert(id.clone(), entity.clone());
        }
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Explicit removal after a successful server-side delete.
    pub fn remove(&mut self, id: &str) -> Option<R> {
        self.entities.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Robot;

    fn robot(id: &str, name: &str) -> Robot {
        Robot {
            id: id.into(),
            name: name.into(),
            manufacturer: Some("MomCorp".into()),
            assembly_date: None,
        }
    }

    #[test]
    fn merge_replaces_and_keeps_others() {
        let mut cache = EntityCache::new();
        cache.merge(&to_entities([robot("a", "X"), robot("b", "Y")]));

        let mut replacement = robot("a", "X2");
        replacement.manufacturer = None;
        cache.merge(&to_entities([replacement]));

        assert_eq!(cache.len(), 2);
        // Replaced wholesale: the old manufacturer does not survive.
        assert_eq!(cache.get("a").unwrap().manufacturer, None);
        assert_eq!(cache.get("a").unwrap().name, "X2");
        assert_eq!(cache.get("b").unwrap().name, "Y");
    }

    #[test]
    fn merge_empty_is_noop() {
        let mut cache: EntityCache<Robot> = EntityCache::new();
        cache.merge(&Entities::new());
        assert!(cache.is_empty());
    }
}
