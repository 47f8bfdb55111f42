//! In-memory request model produced by the adapters.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::WriteOperationKind;

/// Reference to a resource by server ID, client local ID, or both once the
/// local ID has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceIdentity {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
}

impl ResourceIdentity {
    pub fn with_id(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: Some(id.into()),
            lid: None,
        }
    }

    pub fn with_lid(type_name: impl Into<String>, lid: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: None,
            lid: Some(lid.into()),
        }
    }

    /// Local ID that still awaits a server-generated value.
    pub fn unresolved_lid(&self) -> Option<&str> {
        match (&self.id, &self.lid) {
            (None, Some(lid)) => Some(lid),
            _ => None,
        }
    }
}

/// Assigned value of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RelationshipValue {
    ToOne(Option<ResourceIdentity>),
    ToMany(Vec<ResourceIdentity>),
}

impl RelationshipValue {
    /// All identities referenced by this value.
    pub fn identities(&self) -> Vec<&ResourceIdentity> {
        match self {
            RelationshipValue::ToOne(one) => one.iter().collect(),
            RelationshipValue::ToMany(many) => many.iter().collect(),
        }
    }

    pub fn identities_mut(&mut self) -> Vec<&mut ResourceIdentity> {
        match self {
            RelationshipValue::ToOne(one) => one.iter_mut().collect(),
            RelationshipValue::ToMany(many) => many.iter_mut().collect(),
        }
    }
}

/// A resource with only the fields the client assigned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
    pub attributes: Map<String, Value>,
    pub relationships: BTreeMap<String, RelationshipValue>,
}

impl Resource {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: None,
            lid: None,
            attributes: Map::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, value: RelationshipValue) -> Self {
        self.relationships.insert(name.into(), value);
        self
    }

    pub fn identity(&self) -> ResourceIdentity {
        ResourceIdentity {
            type_name: self.type_name.clone(),
            id: self.id.clone(),
            lid: self.lid.clone(),
        }
    }
}

/// One write to perform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationIntent {
    /// Position in the atomic operations array; unset for single requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub kind: WriteOperationKind,
    /// Primary resource. For relationship operations, carries the new
    /// relationship value under `relationship`.
    pub resource: Resource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

impl OperationIntent {
    /// Value of the targeted relationship, for relationship operations.
    pub fn relationship_value(&self) -> Option<&RelationshipValue> {
        self.resource.relationships.get(self.relationship.as_deref()?)
    }
}

/// Validated, strongly-typed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "intent", rename_all = "camelCase")]
pub enum RequestModel {
    Resource(OperationIntent),
    Relationship(OperationIntent),
    Operations(Vec<OperationIntent>),
}

impl RequestModel {
    /// The intents in execution order.
    pub fn into_intents(self) -> Vec<OperationIntent> {
        match self {
            RequestModel::Resource(intent) | RequestModel::Relationship(intent) => vec![intent],
            RequestModel::Operations(intents) => intents,
        }
    }
}
