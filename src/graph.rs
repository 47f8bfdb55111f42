//! Resource graph - the registry of exposed resource types.
//!
//! Every adapter looks up attribute and relationship metadata here. The graph
//! is built once, either through [`ResourceGraphBuilder`] or from a JSON
//! definition file, and is immutable afterwards.
//!
//! # Definition Format
//!
//! ```json
//! {
//!   "resources": [
//!     {
//!       "type": "people",
//!       "idType": "integer",
//!       "attributes": [
//!         { "name": "firstName", "type": "string", "nullable": true },
//!         { "name": "status", "type": { "enum": ["active", "retired"] } }
//!       ],
//!       "relationships": [
//!         { "name": "ownedTodoItems", "kind": "toMany", "target": "todoItems" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{DefinitionError, GraphError};

/// Declared type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttrType {
    String,
    Integer,
    Number,
    Boolean,
    Uuid,
    DateTime,
    Enum(Vec<String>),
    Object,
    Array,
    Any,
}

impl AttrType {
    /// Name used in conversion error details.
    pub fn display_name(&self) -> &'static str {
        match self {
            AttrType::String => "String",
            AttrType::Integer => "Integer",
            AttrType::Number => "Number",
            AttrType::Boolean => "Boolean",
            AttrType::Uuid => "Uuid",
            AttrType::DateTime => "DateTime",
            AttrType::Enum(_) => "Enum",
            AttrType::Object => "Object",
            AttrType::Array => "Array",
            AttrType::Any => "Any",
        }
    }

    /// Deserialize raw JSON text into this type.
    ///
    /// Returns the value as written by the client when the text converts, so
    /// that writing it back reproduces the input.
    pub fn convert(&self, raw: &str) -> Option<Value> {
        let accepted = match self {
            AttrType::String => serde_json::from_str::<String>(raw).is_ok(),
            AttrType::Integer => serde_json::from_str::<i64>(raw).is_ok(),
            AttrType::Number => serde_json::from_str::<f64>(raw).is_ok(),
            AttrType::Boolean => serde_json::from_str::<bool>(raw).is_ok(),
            AttrType::Uuid => serde_json::from_str::<uuid::Uuid>(raw).is_ok(),
            AttrType::DateTime => {
                serde_json::from_str::<chrono::DateTime<chrono::FixedOffset>>(raw).is_ok()
            }
            AttrType::Enum(values) => serde_json::from_str::<String>(raw)
                .map(|s| values.contains(&s))
                .unwrap_or(false),
            AttrType::Object => serde_json::from_str::<serde_json::Map<String, Value>>(raw).is_ok(),
            AttrType::Array => serde_json::from_str::<Vec<Value>>(raw).is_ok(),
            AttrType::Any => true,
        };
        if !accepted {
            return None;
        }
        serde_json::from_str(raw).ok()
    }
}

/// Identifier type of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdType {
    #[default]
    String,
    Integer,
    Uuid,
}

impl IdType {
    /// Whether an `id` string parses as this type.
    pub fn accepts(&self, id: &str) -> bool {
        match self {
            IdType::String => !id.is_empty(),
            IdType::Integer => id.parse::<i64>().is_ok(),
            IdType::Uuid => uuid::Uuid::parse_str(id).is_ok(),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            IdType::String => "String",
            IdType::Integer => "Integer",
            IdType::Uuid => "Uuid",
        }
    }
}

/// What clients may do with an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttrCapabilities {
    pub view: bool,
    pub create: bool,
    pub change: bool,
    pub filter: bool,
    pub sort: bool,
}

impl Default for AttrCapabilities {
    fn default() -> Self {
        Self {
            view: true,
            create: true,
            change: true,
            filter: true,
            sort: true,
        }
    }
}

/// An exposed attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttrDef {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: AttrType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub capabilities: AttrCapabilities,
}

impl AttrDef {
    pub fn new(name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            nullable: false,
            required: false,
            capabilities: AttrCapabilities::default(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn capabilities(mut self, capabilities: AttrCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Convert raw JSON text, honoring nullability.
    pub fn convert(&self, raw: &str) -> Option<Value> {
        if raw.trim() == "null" {
            return self.nullable.then_some(Value::Null);
        }
        self.attr_type.convert(raw)
    }

    /// Target type name for error details, e.g. `Integer?` for nullable.
    pub fn target_name(&self) -> String {
        if self.nullable {
            format!("{}?", self.attr_type.display_name())
        } else {
            self.attr_type.display_name().to_string()
        }
    }
}

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// An exposed relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDef {
    pub name: String,
    pub kind: Cardinality,
    /// Public name of the right-side resource type.
    pub target: String,
    /// Join type of a many-to-many relationship.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<String>,
    #[serde(default = "default_true")]
    pub can_include: bool,
}

fn default_true() -> bool {
    true
}

impl RelationshipDef {
    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Cardinality::ToOne,
            target: target.into(),
            through: None,
            can_include: true,
        }
    }

    pub fn to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Cardinality::ToMany,
            target: target.into(),
            through: None,
            can_include: true,
        }
    }

    pub fn through(mut self, join_type: impl Into<String>) -> Self {
        self.through = Some(join_type.into());
        self
    }

    pub fn is_to_many(&self) -> bool {
        self.kind == Cardinality::ToMany
    }
}

/// Metadata of one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    #[serde(rename = "type")]
    pub name: String,
    #[serde(default)]
    pub id_type: IdType,
    #[serde(default)]
    pub attributes: Vec<AttrDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_type: IdType::default(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn id_type(mut self, id_type: IdType) -> Self {
        self.id_type = id_type;
        self
    }

    pub fn attribute(mut self, attr: AttrDef) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn find_attribute(&self, name: &str) -> Option<&AttrDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn find_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

/// Registry from public type name to resource metadata.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    types: Vec<ResourceType>,
    index: HashMap<String, usize>,
}

impl ResourceGraph {
    pub fn builder() -> ResourceGraphBuilder {
        ResourceGraphBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ResourceType> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    pub fn types(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.iter()
    }

    /// Look up a relationship on a type.
    pub fn relationship(&self, type_name: &str, name: &str) -> Option<&RelationshipDef> {
        self.get(type_name)?.find_relationship(name)
    }

    /// Load a graph from a definition file.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::FileNotFound` or `GraphError::ReadFailed` for IO
    /// failures, otherwise the errors of [`ResourceGraph::from_definition`].
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        if !path.exists() {
            return Err(GraphError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| GraphError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Load a graph from definition text.
    pub fn from_json(content: &str) -> Result<Self, GraphError> {
        let definition: Value =
            serde_json::from_str(content).map_err(|source| GraphError::InvalidJson { source })?;
        Self::from_definition(&definition)
    }

    /// Validate a parsed definition against the definition schema, then build.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InvalidDefinition` listing every schema violation,
    /// or the builder's consistency errors.
    pub fn from_definition(definition: &Value) -> Result<Self, GraphError> {
        validate_definition(definition)?;

        let resources = definition
            .get("resources")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let types: Vec<ResourceType> =
            serde_json::from_value(resources).map_err(|source| GraphError::InvalidJson { source })?;

        types
            .into_iter()
            .fold(ResourceGraph::builder(), ResourceGraphBuilder::resource)
            .build()
    }
}

/// Collects resource types and checks cross-references on `build`.
#[derive(Debug, Default)]
pub struct ResourceGraphBuilder {
    types: Vec<ResourceType>,
}

impl ResourceGraphBuilder {
    pub fn resource(mut self, resource_type: ResourceType) -> Self {
        self.types.push(resource_type);
        self
    }

    /// # Errors
    ///
    /// Fails on duplicate type names, duplicate field names within a type, or
    /// relationships pointing at unregistered types.
    pub fn build(self) -> Result<ResourceGraph, GraphError> {
        let mut index = HashMap::new();
        for (i, resource_type) in self.types.iter().enumerate() {
            if index.insert(resource_type.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateType {
                    type_name: resource_type.name.clone(),
                });
            }

            let mut seen = std::collections::HashSet::new();
            let fields = resource_type
                .attributes
                .iter()
                .map(|a| &a.name)
                .chain(resource_type.relationships.iter().map(|r| &r.name));
            for field in fields {
                // `id` and `type` share the fields namespace in JSON:API
                if !seen.insert(field.as_str()) || field == "id" || field == "type" {
                    return Err(GraphError::DuplicateField {
                        type_name: resource_type.name.clone(),
                        field: field.clone(),
                    });
                }
            }
        }

        for resource_type in &self.types {
            for relationship in &resource_type.relationships {
                if !index.contains_key(&relationship.target) {
                    return Err(GraphError::UnknownTarget {
                        type_name: resource_type.name.clone(),
                        relationship: relationship.name.clone(),
                        target: relationship.target.clone(),
                    });
                }
            }
        }

        Ok(ResourceGraph {
            types: self.types,
            index,
        })
    }
}

fn definition_schema() -> Value {
    json!({
        "type": "object",
        "required": ["resources"],
        "properties": {
            "resources": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["type"],
                    "additionalProperties": false,
                    "properties": {
                        "type": { "type": "string", "minLength": 1 },
                        "idType": { "enum": ["string", "integer", "uuid"] },
                        "attributes": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["name", "type"],
                                "additionalProperties": false,
                                "properties": {
                                    "name": { "type": "string", "minLength": 1 },
                                    "type": {
                                        "oneOf": [
                                            {
                                                "enum": [
                                                    "string", "integer", "number", "boolean",
                                                    "uuid", "dateTime", "object", "array", "any"
                                                ]
                                            },
                                            {
                                                "type": "object",
                                                "required": ["enum"],
                                                "additionalProperties": false,
                                                "properties": {
                                                    "enum": {
                                                        "type": "array",
                                                        "items": { "type": "string" },
                                                        "minItems": 1
                                                    }
                                                }
                                            }
                                        ]
                                    },
                                    "nullable": { "type": "boolean" },
                                    "required": { "type": "boolean" },
                                    "capabilities": {
                                        "type": "object",
                                        "additionalProperties": false,
                                        "properties": {
                                            "view": { "type": "boolean" },
                                            "create": { "type": "boolean" },
                                            "change": { "type": "boolean" },
                                            "filter": { "type": "boolean" },
                                            "sort": { "type": "boolean" }
                                        }
                                    }
                                }
                            }
                        },
                        "relationships": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["name", "kind", "target"],
                                "additionalProperties": false,
                                "properties": {
                                    "name": { "type": "string", "minLength": 1 },
                                    "kind": { "enum": ["toOne", "toMany"] },
                                    "target": { "type": "string", "minLength": 1 },
                                    "through": { "type": "string" },
                                    "canInclude": { "type": "boolean" }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

/// Check a graph definition against the definition schema.
///
/// # Errors
///
/// Returns `GraphError::InvalidDefinition` with one entry per violation.
pub fn validate_definition(definition: &Value) -> Result<(), GraphError> {
    let schema = definition_schema();
    let validator = jsonschema::validator_for(&schema).map_err(|e| GraphError::InvalidDefinition {
        errors: vec![DefinitionError {
            path: String::new(),
            message: e.to_string(),
        }],
    })?;

    let errors: Vec<DefinitionError> = validator
        .iter_errors(definition)
        .map(|e| DefinitionError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(GraphError::InvalidDefinition { errors })
    }
}
