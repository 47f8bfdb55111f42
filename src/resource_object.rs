//! Resource object adapter.
//!
//! Reading happens in two phases. [`ResourceObjectAdapter::read`] turns raw
//! JSON into a [`ResourceObject`], converting each attribute to the type
//! declared for the resolved resource type. Values that do not convert are
//! stored as [`JsonInvalidAttributeInfo`] instead of failing the read.
//! [`ResourceObjectAdapter::to_resource`] then validates the object in the
//! context it appeared in and reports those markers with full pointers.

use serde_json::value::RawValue;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{ApiError, ErrorKind, ReadError};
use crate::graph::{ResourceGraph, ResourceType};
use crate::model::{Resource, ResourceIdentity};
use crate::objects::{
    AttributeValue, JsonInvalidAttributeInfo, Member, RelationshipObject,
    ResourceIdentifierObject, ResourceObject,
};
use crate::reader::{pointer_segment, read_string, to_value, JsonValueKind, TokenReader};
use crate::relationship::RelationshipDataAdapter;
use crate::single_or_many;
use crate::types::{Options, WriteOperationKind};

/// Whether an `id` must, may, or must not be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPresence {
    Required,
    Optional,
    Forbidden,
}

/// Identity constraints that depend on where an object appears.
#[derive(Debug, Clone)]
pub struct IdentityRules {
    pub expected_type: Option<String>,
    /// Set when checking a relationship element, for error details.
    pub relationship: Option<String>,
    /// Names the two places compared in mismatch errors.
    pub context: String,
    pub id: IdPresence,
    pub allow_lid: bool,
    pub expected_id: Option<String>,
}

impl IdentityRules {
    pub fn new(id: IdPresence, allow_lid: bool) -> Self {
        Self {
            expected_type: None,
            relationship: None,
            context: "request body and endpoint URL".to_string(),
            id,
            allow_lid,
            expected_id: None,
        }
    }

    pub fn expect_type(mut self, type_name: impl Into<String>) -> Self {
        self.expected_type = Some(type_name.into());
        self
    }

    pub fn expect_id(mut self, id: Option<String>) -> Self {
        self.expected_id = id;
        self
    }

    pub fn in_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// Validate `type`/`id`/`lid` of an object located at `base`.
pub(crate) fn check_identity<'g>(
    graph: &'g ResourceGraph,
    type_name: Option<&str>,
    id: Option<&str>,
    lid: Option<&str>,
    base: &str,
    rules: &IdentityRules,
) -> Result<&'g ResourceType, ApiError> {
    let Some(type_name) = type_name else {
        return Err(ErrorKind::MissingElement {
            element: "type".into(),
        }
        .at(base));
    };
    let Some(resource_type) = graph.get(type_name) else {
        return Err(ErrorKind::UnknownResourceType {
            type_name: type_name.into(),
        }
        .at(format!("{}/type", base)));
    };

    if let Some(expected) = &rules.expected_type {
        if expected != type_name {
            let kind = match &rules.relationship {
                Some(relationship) => ErrorKind::IncompatibleResourceType {
                    relationship: relationship.clone(),
                    expected: expected.clone(),
                    actual: type_name.into(),
                },
                None => ErrorKind::ResourceTypeMismatch {
                    context: rules.context.clone(),
                    expected: expected.clone(),
                    actual: type_name.into(),
                },
            };
            return Err(kind.at(format!("{}/type", base)));
        }
    }

    if id.is_some() && lid.is_some() {
        return Err(ErrorKind::InvalidElement {
            message: "The 'id' and 'lid' element are mutually exclusive.".into(),
            detail: "Only one of 'id' or 'lid' may be present.".into(),
        }
        .at(base));
    }
    if lid.is_some() && !rules.allow_lid {
        return Err(ErrorKind::ForbiddenElement {
            element: "lid".into(),
        }
        .at(format!("{}/lid", base)));
    }

    match (rules.id, id) {
        (IdPresence::Forbidden, Some(_)) => {
            return Err(ErrorKind::ClientGeneratedId.at(format!("{}/id", base)));
        }
        (IdPresence::Required, None) if lid.is_none() => {
            let element = if rules.allow_lid { "id' or 'lid" } else { "id" };
            return Err(ErrorKind::MissingElement {
                element: element.into(),
            }
            .at(base));
        }
        _ => {}
    }

    if let Some(id) = id {
        if !resource_type.id_type.accepts(id) {
            return Err(ErrorKind::IncompatibleIdentifier {
                element: "id".into(),
                raw: id.into(),
                actual: "String".into(),
                target: resource_type.id_type.display_name().into(),
            }
            .at(format!("{}/id", base)));
        }
        if let Some(expected) = &rules.expected_id {
            if expected != id {
                return Err(ErrorKind::ResourceIdMismatch {
                    context: rules.context.clone(),
                    expected: expected.clone(),
                    actual: id.into(),
                }
                .at(format!("{}/id", base)));
            }
        }
    }

    Ok(resource_type)
}

/// Converts between resource objects, their JSON form and [`Resource`].
#[derive(Debug, Clone, Copy)]
pub struct ResourceObjectAdapter<'g> {
    graph: &'g ResourceGraph,
    options: &'g Options,
}

impl<'g> ResourceObjectAdapter<'g> {
    pub fn new(graph: &'g ResourceGraph, options: &'g Options) -> Self {
        Self { graph, options }
    }

    /// Read a resource object located at `path`.
    ///
    /// `type` is located first with a non-consuming look-ahead, so it may
    /// appear after `attributes`. Unknown fields are skipped unless the
    /// options forbid them.
    ///
    /// # Errors
    ///
    /// Returns `ReadError` for malformed structure or non-string identifiers,
    /// never for attribute values of the wrong kind.
    pub fn read<'a>(&self, raw: &'a RawValue, path: &str) -> Result<ResourceObject, ReadError> {
        let mut reader = TokenReader::begin_object(raw, path)?;

        let type_name = match reader.peek_member("type") {
            Some(raw_type) => read_string(raw_type, "type", &reader.member_path("type"))?,
            None => None,
        };
        let resource_type = type_name.as_deref().and_then(|t| self.graph.get(t));

        let mut object = ResourceObject {
            type_name,
            ..ResourceObject::default()
        };

        while let Some((name, value)) = reader.next_member() {
            let member_path = reader.member_path(&name);
            match name.as_str() {
                "type" => {}
                "id" => object.id = Member::present(read_string(value, "id", &member_path)?),
                "lid" => object.lid = Member::present(read_string(value, "lid", &member_path)?),
                "attributes" => {
                    object.attributes = Member::present(self.read_attributes(
                        value,
                        resource_type,
                        &member_path,
                    )?)
                }
                "relationships" => {
                    object.relationships = Member::present(self.read_relationships(
                        value,
                        resource_type,
                        &member_path,
                    )?)
                }
                "links" => object.links = Some(to_value(value)?),
                "meta" => object.meta = Some(to_value(value)?),
                _ => {}
            }
        }

        Ok(object)
    }

    fn read_attributes(
        &self,
        raw: &RawValue,
        resource_type: Option<&ResourceType>,
        path: &str,
    ) -> Result<Option<Vec<(String, AttributeValue)>>, ReadError> {
        if JsonValueKind::of(raw) == JsonValueKind::Null {
            return Ok(None);
        }
        let mut reader = TokenReader::begin_object(raw, path)?;
        let mut attributes = Vec::new();

        while let Some((name, value)) = reader.next_member() {
            let Some(resource_type) = resource_type else {
                attributes.push((name, AttributeValue::Value(to_value(value)?)));
                continue;
            };
            let Some(attr) = resource_type.find_attribute(&name) else {
                if !self.options.allow_unknown_fields {
                    attributes.push((name, AttributeValue::Value(to_value(value)?)));
                }
                continue;
            };

            let slot = match attr.convert(value.get()) {
                Some(converted) => AttributeValue::Value(converted),
                None => {
                    trace!(attribute = %name, path, "deferring attribute conversion failure");
                    AttributeValue::Invalid(JsonInvalidAttributeInfo {
                        attribute: name.clone(),
                        raw: value.get().trim().to_string(),
                        target_type: attr.target_name(),
                        kind: JsonValueKind::of(value),
                    })
                }
            };
            attributes.push((name, slot));
        }

        Ok(Some(attributes))
    }

    fn read_relationships(
        &self,
        raw: &RawValue,
        resource_type: Option<&ResourceType>,
        path: &str,
    ) -> Result<Option<Vec<(String, RelationshipObject)>>, ReadError> {
        if JsonValueKind::of(raw) == JsonValueKind::Null {
            return Ok(None);
        }
        let mut reader = TokenReader::begin_object(raw, path)?;
        let mut relationships = Vec::new();

        while let Some((name, value)) = reader.next_member() {
            let known = resource_type
                .map(|t| t.find_relationship(&name).is_some())
                .unwrap_or(true);
            if !known && self.options.allow_unknown_fields {
                continue;
            }
            let relationship = read_relationship(value, &reader.member_path(&name))?;
            relationships.push((name, relationship));
        }

        Ok(Some(relationships))
    }

    /// Write a resource object, omitting every unset member.
    pub fn write(&self, object: &ResourceObject) -> Value {
        write_resource_object(object)
    }

    /// Validate a resource object and convert it to a [`Resource`].
    ///
    /// Structural problems return `Err` immediately. Model-state problems
    /// (values that failed conversion, missing required attributes) are
    /// pushed onto `model_errors` so callers can report them together.
    ///
    /// # Errors
    ///
    /// Returns the first structural `ApiError`, with its pointer rooted at
    /// `base`.
    pub fn to_resource(
        &self,
        object: &ResourceObject,
        base: &str,
        rules: &IdentityRules,
        operation: WriteOperationKind,
        model_errors: &mut Vec<ApiError>,
    ) -> Result<Resource, ApiError> {
        let resource_type = check_identity(
            self.graph,
            object.type_name.as_deref(),
            object.id.as_deref(),
            object.lid.as_deref(),
            base,
            rules,
        )?;

        let mut resource = Resource::new(resource_type.name.clone());
        resource.id = object.id.get().cloned();
        resource.lid = object.lid.get().cloned();

        for (name, value) in object.attributes.get().into_iter().flatten() {
            let pointer = format!("{}/attributes/{}", base, pointer_segment(name));
            let Some(attr) = resource_type.find_attribute(name) else {
                return Err(ErrorKind::UnknownAttribute {
                    type_name: resource_type.name.clone(),
                    name: name.clone(),
                }
                .at(pointer));
            };
            if operation == WriteOperationKind::CreateResource && !attr.capabilities.create {
                return Err(ErrorKind::AttributeNotCreatable { name: name.clone() }.at(pointer));
            }
            if operation == WriteOperationKind::UpdateResource && !attr.capabilities.change {
                return Err(ErrorKind::AttributeReadOnly { name: name.clone() }.at(pointer));
            }

            match value {
                AttributeValue::Value(v) => {
                    resource.attributes.insert(name.clone(), v.clone());
                }
                AttributeValue::Invalid(info) => model_errors.push(
                    ErrorKind::IncompatibleAttributeValue {
                        name: info.attribute.clone(),
                        raw: info.raw.clone(),
                        actual: info.kind.to_string(),
                        target: info.target_type.clone(),
                    }
                    .at(pointer),
                ),
            }
        }

        if operation == WriteOperationKind::CreateResource && self.options.validate_model_state {
            for attr in resource_type.attributes.iter().filter(|a| a.required) {
                let missing = match object.attribute(&attr.name) {
                    None => true,
                    Some(AttributeValue::Value(Value::Null)) => true,
                    Some(_) => false,
                };
                if missing {
                    model_errors.push(
                        ErrorKind::RequiredAttributeMissing {
                            name: attr.name.clone(),
                        }
                        .at(format!(
                            "{}/attributes/{}",
                            base,
                            pointer_segment(&attr.name)
                        )),
                    );
                }
            }
        }

        let relationships = RelationshipDataAdapter::new(self.graph);
        for (name, relationship) in object.relationships.get().into_iter().flatten() {
            let pointer = format!("{}/relationships/{}", base, pointer_segment(name));
            let Some(def) = resource_type.find_relationship(name) else {
                return Err(ErrorKind::UnknownRelationship {
                    type_name: resource_type.name.clone(),
                    name: name.clone(),
                }
                .at(pointer));
            };
            let value = relationships.convert(def, &relationship.data, &pointer, rules.allow_lid)?;
            resource.relationships.insert(name.clone(), value);
        }

        Ok(resource)
    }

    /// Build the response form of a resource.
    ///
    /// Attributes without the view capability are left out and
    /// `links.self` is added when a base URL is configured.
    pub fn from_resource(&self, resource: &Resource) -> ResourceObject {
        let resource_type = self.graph.get(&resource.type_name);

        let attributes: Vec<(String, AttributeValue)> = match resource_type {
            Some(resource_type) => resource_type
                .attributes
                .iter()
                .filter(|attr| attr.capabilities.view)
                .filter_map(|attr| {
                    let value = resource.attributes.get(&attr.name)?;
                    Some((attr.name.clone(), AttributeValue::Value(value.clone())))
                })
                .collect(),
            None => resource
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), AttributeValue::Value(value.clone())))
                .collect(),
        };

        let relationships: Vec<(String, RelationshipObject)> = resource
            .relationships
            .iter()
            .map(|(name, value)| (name.clone(), RelationshipDataAdapter::to_object(value)))
            .collect();

        let links = match (&self.options.base_url, &resource.id) {
            (Some(base_url), Some(id)) => Some(serde_json::json!({
                "self": format!("{}/{}/{}", base_url.trim_end_matches('/'), resource.type_name, id)
            })),
            _ => None,
        };

        ResourceObject {
            type_name: Some(resource.type_name.clone()),
            id: resource.id.clone().into(),
            lid: resource.lid.clone().filter(|_| resource.id.is_none()).into(),
            attributes: (!attributes.is_empty()).then_some(attributes).into(),
            relationships: (!relationships.is_empty()).then_some(relationships).into(),
            links,
            meta: None,
        }
    }
}

/// Read a relationship object located at `path`.
pub fn read_relationship(raw: &RawValue, path: &str) -> Result<RelationshipObject, ReadError> {
    let mut reader = TokenReader::begin_object(raw, path)?;
    let data_path = reader.member_path("data");
    let data = single_or_many::read(reader.peek_member("data"), &data_path, read_identifier)?;

    let mut relationship = RelationshipObject {
        data,
        ..RelationshipObject::default()
    };
    while let Some((name, value)) = reader.next_member() {
        match name.as_str() {
            "links" => relationship.links = Some(to_value(value)?),
            "meta" => relationship.meta = Some(to_value(value)?),
            _ => {}
        }
    }
    Ok(relationship)
}

/// Read a resource identifier object located at `path`.
pub fn read_identifier(raw: &RawValue, path: &str) -> Result<ResourceIdentifierObject, ReadError> {
    let mut reader = TokenReader::begin_object(raw, path)?;
    let mut identifier = ResourceIdentifierObject::default();
    while let Some((name, value)) = reader.next_member() {
        let member_path = reader.member_path(&name);
        match name.as_str() {
            "type" => identifier.type_name = read_string(value, "type", &member_path)?,
            "id" => identifier.id = Member::present(read_string(value, "id", &member_path)?),
            "lid" => identifier.lid = Member::present(read_string(value, "lid", &member_path)?),
            "meta" => identifier.meta = Some(to_value(value)?),
            _ => {}
        }
    }
    Ok(identifier)
}

pub fn write_resource_object(object: &ResourceObject) -> Value {
    let mut map = Map::new();
    if let Some(type_name) = &object.type_name {
        map.insert("type".into(), Value::String(type_name.clone()));
    }
    insert_member(&mut map, "id", &object.id, |id| Value::String(id.clone()));
    insert_member(&mut map, "lid", &object.lid, |lid| Value::String(lid.clone()));
    insert_member(&mut map, "attributes", &object.attributes, |attributes| {
        attributes
            .iter()
            .map(|(name, value)| (name.clone(), write_attribute(value)))
            .collect::<Map<String, Value>>()
            .into()
    });
    insert_member(&mut map, "relationships", &object.relationships, |relationships| {
        relationships
            .iter()
            .map(|(name, rel)| (name.clone(), write_relationship(rel)))
            .collect::<Map<String, Value>>()
            .into()
    });
    if let Some(links) = &object.links {
        map.insert("links".into(), links.clone());
    }
    if let Some(meta) = &object.meta {
        map.insert("meta".into(), meta.clone());
    }
    Value::Object(map)
}

fn write_attribute(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Value(v) => v.clone(),
        // Raw text came from a successfully parsed body, so it reparses.
        AttributeValue::Invalid(info) => {
            serde_json::from_str(&info.raw).unwrap_or_else(|_| Value::String(info.raw.clone()))
        }
    }
}

pub fn write_relationship(relationship: &RelationshipObject) -> Value {
    let mut map = Map::new();
    if let Some(links) = &relationship.links {
        map.insert("links".into(), links.clone());
    }
    if let Some(data) = single_or_many::write(&relationship.data, write_identifier) {
        map.insert("data".into(), data);
    }
    if let Some(meta) = &relationship.meta {
        map.insert("meta".into(), meta.clone());
    }
    Value::Object(map)
}

pub fn write_identifier(identifier: &ResourceIdentifierObject) -> Value {
    let mut map = Map::new();
    if let Some(type_name) = &identifier.type_name {
        map.insert("type".into(), Value::String(type_name.clone()));
    }
    insert_member(&mut map, "id", &identifier.id, |id| Value::String(id.clone()));
    insert_member(&mut map, "lid", &identifier.lid, |lid| Value::String(lid.clone()));
    if let Some(meta) = &identifier.meta {
        map.insert("meta".into(), meta.clone());
    }
    Value::Object(map)
}

/// Write `key` unless the member was omitted.
fn insert_member<T>(
    map: &mut Map<String, Value>,
    key: &str,
    member: &Member<T>,
    write: impl FnOnce(&T) -> Value,
) {
    match member {
        Member::Omitted => {}
        Member::Null => {
            map.insert(key.into(), Value::Null);
        }
        Member::Set(value) => {
            map.insert(key.into(), write(value));
        }
    }
}

impl From<&ResourceIdentity> for ResourceIdentifierObject {
    fn from(identity: &ResourceIdentity) -> Self {
        Self {
            type_name: Some(identity.type_name.clone()),
            id: identity.id.clone().into(),
            lid: identity.lid.clone().filter(|_| identity.id.is_none()).into(),
            meta: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttrCapabilities, AttrDef, AttrType, IdType, RelationshipDef};
    use crate::model::RelationshipValue;
    use crate::reader::parse_root;
    use serde_json::json;

    fn graph() -> ResourceGraph {
        ResourceGraph::builder()
            .resource(
                ResourceType::new("people")
                    .id_type(IdType::Integer)
                    .attribute(AttrDef::new("firstName", AttrType::String).nullable())
                    .attribute(AttrDef::new("lastName", AttrType::String).required())
                    .attribute(AttrDef::new("age", AttrType::Integer))
                    .attribute(AttrDef::new("password", AttrType::String).capabilities(
                        AttrCapabilities {
                            view: false,
                            ..AttrCapabilities::default()
                        },
                    ))
                    .attribute(AttrDef::new("createdAt", AttrType::DateTime).capabilities(
                        AttrCapabilities {
                            create: false,
                            change: false,
                            ..AttrCapabilities::default()
                        },
                    ))
                    .relationship(RelationshipDef::to_one("spouse", "people"))
                    .relationship(RelationshipDef::to_many("friends", "people")),
            )
            .build()
            .unwrap()
    }

    fn read(graph: &ResourceGraph, options: &Options, json: &str) -> ResourceObject {
        let root = parse_root(json).unwrap();
        ResourceObjectAdapter::new(graph, options)
            .read(root, "/data")
            .unwrap()
    }

    #[test]
    fn type_after_attributes_is_resolved_first() {
        let graph = graph();
        let options = Options::default();
        let late = read(
            &graph,
            &options,
            r#"{"attributes": {"age": "old"}, "type": "people"}"#,
        );
        let early = read(
            &graph,
            &options,
            r#"{"type": "people", "attributes": {"age": "old"}}"#,
        );
        assert_eq!(late, early);
        assert!(matches!(
            late.attribute("age"),
            Some(AttributeValue::Invalid(_))
        ));
    }

    #[test]
    fn wrong_kind_becomes_sentinel() {
        let graph = graph();
        let options = Options::default();
        let object = read(
            &graph,
            &options,
            r#"{"type": "people", "attributes": {"age": "42"}}"#,
        );
        match object.attribute("age") {
            Some(AttributeValue::Invalid(info)) => {
                assert_eq!(info.raw, "\"42\"");
                assert_eq!(info.kind, JsonValueKind::String);
                assert_eq!(info.target_type, "Integer");
            }
            other => panic!("expected sentinel, got {:?}", other),
        }
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let graph = graph();
        let options = Options::default();
        let object = read(
            &graph,
            &options,
            r#"{"type": "people", "attributes": {"nickname": "x"}, "relationships": {"pets": {"data": []}}}"#,
        );
        assert_eq!(object.attributes, Member::Set(Vec::new()));
        assert_eq!(object.relationships, Member::Set(Vec::new()));
    }

    #[test]
    fn unknown_fields_are_kept_when_disallowed() {
        let graph = graph();
        let options = Options::default().allow_unknown_fields(false);
        let object = read(
            &graph,
            &options,
            r#"{"type": "people", "attributes": {"nickname": "x"}}"#,
        );
        let adapter = ResourceObjectAdapter::new(&graph, &options);
        let err = adapter
            .to_resource(
                &object,
                "/data",
                &IdentityRules::new(IdPresence::Forbidden, false),
                WriteOperationKind::CreateResource,
                &mut Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownAttribute { .. }));
        assert_eq!(err.pointer.as_deref(), Some("/data/attributes/nickname"));
    }

    #[test]
    fn numeric_id_is_rejected_while_reading() {
        let graph = graph();
        let options = Options::default();
        let root = parse_root(r#"{"type": "people", "id": 1}"#).unwrap();
        let err = ResourceObjectAdapter::new(&graph, &options)
            .read(root, "/data")
            .unwrap_err();
        assert_eq!(err.path(), "/data/id");
        let api = err.into_api_error("");
        assert_eq!(api.status(), 422);
        assert_eq!(
            api.kind.detail().unwrap(),
            "Failed to convert ID '1' of type 'Number' to type 'String'."
        );
    }

    #[test]
    fn sentinel_reported_with_attribute_pointer() {
        let graph = graph();
        let options = Options::default();
        let object = read(
            &graph,
            &options,
            r#"{"type": "people", "attributes": {"lastName": "Doe", "age": true}}"#,
        );
        let mut model_errors = Vec::new();
        ResourceObjectAdapter::new(&graph, &options)
            .to_resource(
                &object,
                "/data",
                &IdentityRules::new(IdPresence::Forbidden, false),
                WriteOperationKind::CreateResource,
                &mut model_errors,
            )
            .unwrap();
        assert_eq!(model_errors.len(), 1);
        assert_eq!(model_errors[0].pointer.as_deref(), Some("/data/attributes/age"));
        assert_eq!(
            model_errors[0].kind.detail().unwrap(),
            "Failed to convert attribute 'age' with value 'true' of type 'True' to type 'Integer'."
        );
    }

    #[test]
    fn required_attribute_missing_on_create() {
        let graph = graph();
        let options = Options::default();
        let object = read(&graph, &options, r#"{"type": "people"}"#);
        let mut model_errors = Vec::new();
        ResourceObjectAdapter::new(&graph, &options)
            .to_resource(
                &object,
                "/data",
                &IdentityRules::new(IdPresence::Forbidden, false),
                WriteOperationKind::CreateResource,
                &mut model_errors,
            )
            .unwrap();
        assert!(matches!(
            &model_errors[0].kind,
            ErrorKind::RequiredAttributeMissing { name } if name == "lastName"
        ));
    }

    #[test]
    fn capabilities_are_enforced() {
        let graph = graph();
        let options = Options::default();
        let adapter = ResourceObjectAdapter::new(&graph, &options);
        let object = read(
            &graph,
            &options,
            r#"{"type": "people", "id": "1", "attributes": {"createdAt": "2024-01-01T00:00:00Z"}}"#,
        );
        let err = adapter
            .to_resource(
                &object,
                "/data",
                &IdentityRules::new(IdPresence::Required, false),
                WriteOperationKind::UpdateResource,
                &mut Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::AttributeReadOnly { .. }));
    }

    #[test]
    fn identity_rules() {
        let graph = graph();
        let options = Options::default();
        let adapter = ResourceObjectAdapter::new(&graph, &options);

        let object = read(&graph, &options, r#"{"type": "people", "id": "1"}"#);
        let err = adapter
            .to_resource(
                &object,
                "/data",
                &IdentityRules::new(IdPresence::Forbidden, false),
                WriteOperationKind::CreateResource,
                &mut Vec::new(),
            )
            .unwrap_err();
        assert_eq!(err.status(), 403);
        assert_eq!(err.pointer.as_deref(), Some("/data/id"));

        let object = read(&graph, &options, r#"{"type": "people", "id": "abc"}"#);
        let err = adapter
            .to_resource(
                &object,
                "/data",
                &IdentityRules::new(IdPresence::Required, false),
                WriteOperationKind::UpdateResource,
                &mut Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::IncompatibleIdentifier { ref target, .. } if target == "Integer"
        ));

        let object = read(&graph, &options, r#"{"type": "people", "id": "2"}"#);
        let err = adapter
            .to_resource(
                &object,
                "/data",
                &IdentityRules::new(IdPresence::Required, false).expect_id(Some("1".into())),
                WriteOperationKind::UpdateResource,
                &mut Vec::new(),
            )
            .unwrap_err();
        assert_eq!(err.status(), 409);

        let object = read(&graph, &options, r#"{"type": "tags"}"#);
        let err = adapter
            .to_resource(
                &object,
                "/data",
                &IdentityRules::new(IdPresence::Optional, false),
                WriteOperationKind::CreateResource,
                &mut Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownResourceType { .. }));
        assert_eq!(err.pointer.as_deref(), Some("/data/type"));
    }

    #[test]
    fn relationships_convert() {
        let graph = graph();
        let options = Options::default();
        let object = read(
            &graph,
            &options,
            r#"{
                "type": "people",
                "attributes": {"lastName": "Doe"},
                "relationships": {
                    "spouse": {"data": {"type": "people", "id": "7"}},
                    "friends": {"data": [{"type": "people", "lid": "f1"}]}
                }
            }"#,
        );
        let resource = ResourceObjectAdapter::new(&graph, &options)
            .to_resource(
                &object,
                "/data",
                &IdentityRules::new(IdPresence::Forbidden, true),
                WriteOperationKind::CreateResource,
                &mut Vec::new(),
            )
            .unwrap();
        assert_eq!(
            resource.relationships["spouse"],
            RelationshipValue::ToOne(Some(ResourceIdentity::with_id("people", "7")))
        );
        assert_eq!(
            resource.relationships["friends"],
            RelationshipValue::ToMany(vec![ResourceIdentity::with_lid("people", "f1")])
        );
    }

    #[test]
    fn write_round_trips_key_presence() {
        let graph = graph();
        let options = Options::default();
        let json = json!({
            "type": "people",
            "lid": "p1",
            "attributes": { "firstName": null, "age": 30 },
            "relationships": {
                "spouse": { "data": null },
                "friends": { "data": [], "meta": { "total": 0 } }
            },
            "meta": { "source": "import" }
        });
        let text = json.to_string();
        let object = read(&graph, &options, &text);
        assert_eq!(write_resource_object(&object), json);
    }

    #[test]
    fn write_keeps_explicit_null_members() {
        let graph = graph();
        let options = Options::default();
        let json = json!({
            "type": "people",
            "id": null,
            "lid": null,
            "attributes": null,
            "relationships": {
                "spouse": { "data": { "type": "people", "id": null } }
            }
        });
        let text = json.to_string();
        let object = read(&graph, &options, &text);
        assert_eq!(object.id, Member::Null);
        assert_eq!(object.attributes, Member::Null);
        assert_eq!(write_resource_object(&object), json);

        let object = read(&graph, &options, r#"{"type": "people", "relationships": null}"#);
        assert_eq!(
            write_resource_object(&object),
            json!({ "type": "people", "relationships": null })
        );
    }

    #[test]
    fn response_hides_unviewable_attributes() {
        let graph = graph();
        let options = Options::default().base_url("https://api.example.com/");
        let resource = Resource::new("people")
            .with_id("1")
            .with_attribute("firstName", json!("Jane"))
            .with_attribute("password", json!("secret"));
        let object = ResourceObjectAdapter::new(&graph, &options).from_resource(&resource);
        let json = write_resource_object(&object);
        assert_eq!(
            json,
            json!({
                "type": "people",
                "id": "1",
                "attributes": { "firstName": "Jane" },
                "links": { "self": "https://api.example.com/people/1" }
            })
        );
    }
}
