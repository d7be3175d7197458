//! Query filters
//!
//! A [`Filter`] names which index a repository should answer from. The index
//! choice only affects cost: every filter also has a plain predicate
//! ([`Filter::matches`]) that gives the same answer over a full scan.

use super::entity::Entity;
use super::types::{Identity, Label};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    /// No restriction; full scan
    #[default]
    All,
    /// Entities carrying any of these labels
    Labels(Vec<Label>),
    /// Entities of this type (node type or relationship type)
    Type(String),
    /// Relationships starting at this node
    Source(Identity),
    /// Relationships ending at this node
    Target(Identity),
}

impl Filter {
    pub fn label(label: impl Into<Label>) -> Self {
        Filter::Labels(vec![label.into()])
    }

    pub fn of_type(entity_type: impl Into<String>) -> Self {
        Filter::Type(entity_type.into())
    }

    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        match self {
            Filter::All => true,
            Filter::Labels(labels) => labels.iter().any(|l| entity.has_label(l)),
            Filter::Type(t) => entity.entity_type() == t,
            Filter::Source(node) => entity.endpoints().is_some_and(|(s, _)| s == node),
            Filter::Target(node) => entity.endpoints().is_some_and(|(_, t)| t == node),
        }
    }
}
