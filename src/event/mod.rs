//! Inbound change events and the resource registry.
//!
//! Every resource kind the processor understands is registered exactly once
//! in [`RESOURCES`]. The registry decides whether a kind lives as a root
//! document or is additionally embedded inside a parent document.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Operation carried by the channel an event arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Closed set of resource kinds.
///
/// Discriminants index into [`RESOURCES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Submission = 0,
    Review = 1,
    ReviewType = 2,
    ReviewSummation = 3,
}

/// Where documents of a resource kind live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Standalone top-level document.
    Root,
    /// Top-level document that is also copied into a list field of its parent.
    Embedded {
        /// Kind of the owning document.
        parent: ResourceKind,
        /// List field on the parent holding the embedded copies.
        field: &'static str,
        /// Payload field referencing the parent id.
        foreign_key: &'static str,
    },
}

/// Registry entry for a resource kind.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    /// Value of `payload.resource` on the wire.
    pub tag: &'static str,
    pub placement: Placement,
}

/// The resource registry. Order must follow the `ResourceKind` discriminants.
pub const RESOURCES: [ResourceSpec; 4] = [
    ResourceSpec {
        kind: ResourceKind::Submission,
        tag: "submission",
        placement: Placement::Root,
    },
    ResourceSpec {
        kind: ResourceKind::Review,
        tag: "review",
        placement: Placement::Embedded {
            parent: ResourceKind::Submission,
            field: "review",
            foreign_key: "submissionId",
        },
    },
    ResourceSpec {
        kind: ResourceKind::ReviewType,
        tag: "reviewType",
        placement: Placement::Root,
    },
    ResourceSpec {
        kind: ResourceKind::ReviewSummation,
        tag: "reviewSummation",
        placement: Placement::Embedded {
            parent: ResourceKind::Submission,
            field: "reviewSummation",
            foreign_key: "submissionId",
        },
    },
];

impl ResourceKind {
    /// Registry entry for this kind.
    pub fn spec(self) -> &'static ResourceSpec {
        &RESOURCES[self as usize]
    }

    /// Look up a kind by its wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        RESOURCES.iter().find(|s| s.tag == tag).map(|s| s.kind)
    }

    pub fn tag(self) -> &'static str {
        self.spec().tag
    }

    pub fn placement(self) -> Placement {
        self.spec().placement
    }

    /// All registered wire tags, in registry order.
    pub fn tags() -> impl Iterator<Item = &'static str> {
        RESOURCES.iter().map(|s| s.tag)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Field name of the resource tag inside a payload.
pub const RESOURCE_FIELD: &str = "resource";
/// Field name of the document id inside a payload.
pub const ID_FIELD: &str = "id";

/// A structurally valid change event.
///
/// Produced only by [`crate::validation::validate`]. `payload` keeps every
/// field of the inbound payload, including `resource` and `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: String,
    pub originator: String,
    pub timestamp: DateTime<Utc>,
    pub mime_type: String,
    pub resource: ResourceKind,
    pub id: String,
    pub payload: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_matches_discriminants() {
        for (i, spec) in RESOURCES.iter().enumerate() {
            assert_eq!(spec.kind as usize, i, "registry out of order at {}", spec.tag);
        }
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(ResourceKind::from_tag("review"), Some(ResourceKind::Review));
        assert_eq!(
            ResourceKind::from_tag("reviewSummation"),
            Some(ResourceKind::ReviewSummation)
        );
        assert_eq!(ResourceKind::from_tag("Review"), None);
        assert_eq!(ResourceKind::from_tag("challenge"), None);
    }

    #[test]
    fn test_placement() {
        assert_eq!(ResourceKind::Submission.placement(), Placement::Root);
        assert_eq!(ResourceKind::ReviewType.placement(), Placement::Root);
        match ResourceKind::ReviewSummation.placement() {
            Placement::Embedded {
                parent,
                field,
                foreign_key,
            } => {
                assert_eq!(parent, ResourceKind::Submission);
                assert_eq!(field, "reviewSummation");
                assert_eq!(foreign_key, "submissionId");
            }
            Placement::Root => panic!("reviewSummation should be embedded"),
        }
    }

    #[test]
    fn test_display_uses_wire_tag() {
        assert_eq!(ResourceKind::ReviewType.to_string(), "reviewType");
        assert_eq!(OperationKind::Delete.to_string(), "delete");
    }
}
