//! Behaviour shared by nodes and relationships
//!
//! Durable entities live in the repositories and are never mutated in place by
//! a transaction. The first write to an existing entity inside a transaction
//! captures a [`Shadow`]: a full copy of the entity's properties and labels.
//! Writes land in the shadow only. On commit the shadow is merged back with
//! null-as-delete semantics; on rollback it is simply dropped.

use super::property::{PropertyMap, PropertyValue};
use super::types::{Identity, Label};
use std::collections::HashSet;

/// Common interface of [`Node`](super::Node) and
/// [`Relationship`](super::Relationship)
pub trait Entity: Clone + Send + Sync + 'static {
    fn identity(&self) -> &Identity;

    fn properties(&self) -> &PropertyMap;

    fn properties_mut(&mut self) -> &mut PropertyMap;

    fn labels(&self) -> &HashSet<Label>;

    fn labels_mut(&mut self) -> &mut HashSet<Label>;

    /// Single-valued type used by the type index
    fn entity_type(&self) -> &str;

    /// Source and target, for relationships only
    fn endpoints(&self) -> Option<(&Identity, &Identity)> {
        None
    }

    fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties().get(key)
    }

    /// Write straight into the entity. `Null` removes the key.
    fn put_property(&mut self, key: impl Into<String>, value: PropertyValue) {
        let key = key.into();
        if value.is_null() {
            self.properties_mut().remove(&key);
        } else {
            self.properties_mut().insert(key, value);
        }
    }

    fn has_label(&self, label: &Label) -> bool {
        self.labels().contains(label)
    }

    /// Copy of this entity as seen through an optional shadow
    fn materialize(&self, shadow: Option<&Shadow>) -> Self {
        let mut view = self.clone();
        if let Some(shadow) = shadow {
            shadow.clone().merge_into(&mut view);
        }
        view
    }
}

/// Per-transaction overlay of one entity's pending writes
#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    properties: PropertyMap,
    labels: HashSet<Label>,
}

impl Shadow {
    /// Full copy of the entity's current durable state
    pub fn capture<E: Entity>(entity: &E) -> Self {
        Shadow {
            properties: entity.properties().clone(),
            labels: entity.labels().clone(),
        }
    }

    /// Read through the shadow. A pending delete reads as absent.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key).filter(|v| !v.is_null())
    }

    /// Stage a write. `Null` is kept as a delete marker until merge.
    pub fn set(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        self.set(key, PropertyValue::Null);
    }

    pub fn labels(&self) -> &HashSet<Label> {
        &self.labels
    }

    pub fn add_label(&mut self, label: Label) -> bool {
        self.labels.insert(label)
    }

    pub fn remove_label(&mut self, label: &Label) -> bool {
        self.labels.remove(label)
    }

    /// Merge into durable state: null entries delete the key, everything else
    /// overwrites. Labels are replaced wholesale.
    pub fn merge_into<E: Entity>(self, entity: &mut E) {
        for (key, value) in self.properties {
            entity.put_property(key, value);
        }
        *entity.labels_mut() = self.labels;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn person() -> Node {
        let mut node = Node::new(Identity::new("Person"), vec![Label::new("Person")]);
        node.put_property("name", "Alice".into());
        node.put_property("age", 30i64.into());
        node
    }

    #[test]
    fn test_shadow_reads_own_writes() {
        let node = person();
        let mut shadow = Shadow::capture(&node);

        shadow.set("age", 31i64.into());
        assert_eq!(shadow.get("age").unwrap().as_integer(), Some(31));
        // durable copy untouched
        assert_eq!(node.get_property("age").unwrap().as_integer(), Some(30));
    }

    #[test]
    fn test_null_reads_as_absent() {
        let node = person();
        let mut shadow = Shadow::capture(&node);
        shadow.remove("name");
        assert!(shadow.get("name").is_none());
    }

    #[test]
    fn test_merge_deletes_null_keys() {
        let mut node = person();
        let mut shadow = Shadow::capture(&node);
        shadow.remove("name");
        shadow.set("city", "Berlin".into());
        shadow.merge_into(&mut node);

        assert!(!node.properties().contains_key("name"));
        assert_eq!(node.get_property("city").unwrap().as_string(), Some("Berlin"));
        assert_eq!(node.get_property("age").unwrap().as_integer(), Some(30));
    }

    #[test]
    fn test_materialize_applies_labels() {
        let node = person();
        let mut shadow = Shadow::capture(&node);
        shadow.add_label(Label::new("Employee"));
        shadow.remove_label(&Label::new("Person"));

        let view = node.materialize(Some(&shadow));
        assert!(view.has_label(&Label::new("Employee")));
        assert!(!view.has_label(&Label::new("Person")));
        assert!(node.has_label(&Label::new("Person")));
    }

    #[test]
    fn test_put_property_null_removes() {
        let mut node = person();
        node.put_property("age", PropertyValue::Null);
        assert!(node.get_property("age").is_none());
    }
}
