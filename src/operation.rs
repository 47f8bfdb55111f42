//! Atomic operation adapter.
//!
//! Reads entries of `atomic:operations` and converts each into an
//! [`OperationIntent`]. The combination of `op`, `ref` and `data` decides the
//! kind of write:
//!
//! | `op`     | `ref`                     | result                  |
//! |----------|---------------------------|-------------------------|
//! | `add`    | absent                    | create resource         |
//! | `add`    | with `relationship`       | add to relationship     |
//! | `update` | absent or without `relationship` | update resource  |
//! | `update` | with `relationship`       | set relationship        |
//! | `remove` | without `relationship`    | delete resource         |
//! | `remove` | with `relationship`       | remove from relationship|

use serde_json::value::RawValue;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ApiError, ErrorKind, ReadError};
use crate::graph::ResourceGraph;
use crate::model::{OperationIntent, Resource};
use crate::objects::{
    AtomicOperationCode, AtomicOperationObject, AtomicReference, ResourceObject, SingleOrManyData,
};
use crate::reader::{read_string, to_value, JsonValueKind, TokenReader};
use crate::relationship::RelationshipDataAdapter;
use crate::resource_object::{
    check_identity, write_resource_object, IdPresence, IdentityRules, ResourceObjectAdapter,
};
use crate::single_or_many;
use crate::types::{Options, WriteOperationKind};

#[derive(Debug, Clone, Copy)]
pub struct OperationAdapter<'g> {
    graph: &'g ResourceGraph,
    options: &'g Options,
}

impl<'g> OperationAdapter<'g> {
    pub fn new(graph: &'g ResourceGraph, options: &'g Options) -> Self {
        Self { graph, options }
    }

    /// Read one operation object located at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ReadError` for malformed structure.
    pub fn read(&self, raw: &RawValue, path: &str) -> Result<AtomicOperationObject, ReadError> {
        let mut reader = TokenReader::begin_object(raw, path)?;
        let resources = ResourceObjectAdapter::new(self.graph, self.options);
        let mut operation = AtomicOperationObject::default();

        while let Some((name, value)) = reader.next_member() {
            let member_path = reader.member_path(&name);
            match name.as_str() {
                "op" => operation.op = read_string(value, "op", &member_path)?,
                "ref" => operation.reference = read_reference(value, &member_path)?,
                "href" => operation.href = read_string(value, "href", &member_path)?,
                "data" => {
                    operation.data = single_or_many::read(Some(value), &member_path, |raw, path| {
                        resources.read(raw, path)
                    })?
                }
                "meta" => operation.meta = Some(to_value(value)?),
                _ => {}
            }
        }

        Ok(operation)
    }

    /// Convert an operation located at index `index` of the batch.
    ///
    /// Model-state failures go to `model_errors`; everything else is
    /// returned. Pointers are rooted at `/atomic:operations[index]`.
    ///
    /// # Errors
    ///
    /// Returns the first structural failure of the operation.
    pub fn convert(
        &self,
        operation: &AtomicOperationObject,
        index: usize,
        model_errors: &mut Vec<ApiError>,
    ) -> Result<OperationIntent, ApiError> {
        let mut local_errors = Vec::new();
        let intent = self
            .convert_at(operation, index, &mut local_errors)
            .map_err(|e| e.in_operation(index))?;
        model_errors.extend(local_errors.into_iter().map(|e| e.in_operation(index)));
        debug!(
            index,
            kind = ?intent.kind,
            type_name = %intent.resource.type_name,
            "adapted operation"
        );
        Ok(intent)
    }

    fn convert_at(
        &self,
        operation: &AtomicOperationObject,
        index: usize,
        model_errors: &mut Vec<ApiError>,
    ) -> Result<OperationIntent, ApiError> {
        if operation.href.is_some() {
            return Err(ErrorKind::InvalidElement {
                message: "Usage of the 'href' element is not supported.".into(),
                detail: "Use the 'ref' element to target a resource or relationship.".into(),
            }
            .at("/href"));
        }

        let Some(op) = operation.op.as_deref() else {
            return Err(ErrorKind::MissingElement {
                element: "op".into(),
            }
            .at(""));
        };
        let Some(code) = AtomicOperationCode::parse(op) else {
            return Err(ErrorKind::InvalidElement {
                message: "Unknown operation code.".into(),
                detail: format!("Expected 'add', 'update' or 'remove', instead of '{}'.", op),
            }
            .at("/op"));
        };

        let reference = operation.reference.as_ref();
        let targets_relationship = reference.is_some_and(|r| r.relationship.is_some());

        let kind = match code {
            AtomicOperationCode::Add if reference.is_none() => WriteOperationKind::CreateResource,
            AtomicOperationCode::Add if targets_relationship => {
                WriteOperationKind::AddToRelationship
            }
            AtomicOperationCode::Add => {
                return Err(ErrorKind::MissingElement {
                    element: "relationship".into(),
                }
                .at("/ref"));
            }
            AtomicOperationCode::Update if targets_relationship => {
                WriteOperationKind::SetRelationship
            }
            AtomicOperationCode::Update => WriteOperationKind::UpdateResource,
            AtomicOperationCode::Remove if reference.is_none() => {
                return Err(ErrorKind::MissingElement {
                    element: "ref".into(),
                }
                .at(""));
            }
            AtomicOperationCode::Remove if targets_relationship => {
                WriteOperationKind::RemoveFromRelationship
            }
            AtomicOperationCode::Remove => WriteOperationKind::DeleteResource,
        };

        let resource = match kind {
            WriteOperationKind::CreateResource => self.create(operation, model_errors)?,
            WriteOperationKind::UpdateResource => self.update(operation, model_errors)?,
            WriteOperationKind::DeleteResource => self.delete(operation)?,
            _ => self.relationship(operation, kind)?,
        };

        Ok(OperationIntent {
            index: Some(index),
            kind,
            relationship: reference.and_then(|r| r.relationship.clone()),
            resource,
        })
    }

    fn create(
        &self,
        operation: &AtomicOperationObject,
        model_errors: &mut Vec<ApiError>,
    ) -> Result<Resource, ApiError> {
        let object = single_resource(&operation.data)?;
        let id = if self.options.allow_client_generated_ids {
            IdPresence::Optional
        } else {
            IdPresence::Forbidden
        };
        ResourceObjectAdapter::new(self.graph, self.options).to_resource(
            object,
            "/data",
            &IdentityRules::new(id, true),
            WriteOperationKind::CreateResource,
            model_errors,
        )
    }

    fn update(
        &self,
        operation: &AtomicOperationObject,
        model_errors: &mut Vec<ApiError>,
    ) -> Result<Resource, ApiError> {
        let object = single_resource(&operation.data)?;
        let mut rules = IdentityRules::new(IdPresence::Required, true);

        if let Some(reference) = &operation.reference {
            self.check_reference(reference)?;
            rules = rules.context("'ref' and 'data' element");
            if let Some(type_name) = &reference.type_name {
                rules = rules.expect_type(type_name.clone());
            }
            rules = rules.expect_id(reference.id.clone());

            if reference.lid.is_some()
                && object.lid.is_set()
                && reference.lid.as_deref() != object.lid.as_deref()
            {
                return Err(ErrorKind::ResourceIdMismatch {
                    context: "'ref' and 'data' element".into(),
                    expected: reference.lid.clone().unwrap_or_default(),
                    actual: object.lid.as_deref().unwrap_or_default().to_string(),
                }
                .at("/data/lid"));
            }
            if !object.id.is_set() && !object.lid.is_set() {
                let element = if reference.lid.is_some() { "lid" } else { "id" };
                return Err(ErrorKind::MissingElement {
                    element: element.into(),
                }
                .at("/data"));
            }
            if reference.id.is_some() != object.id.is_set() {
                let element = if object.id.is_set() { "id" } else { "lid" };
                return Err(ErrorKind::InvalidElement {
                    message: "Resource identity mismatch between 'ref' and 'data' element."
                        .into(),
                    detail: "Both elements must use 'id', or both must use 'lid'.".into(),
                }
                .at(format!("/data/{}", element)));
            }
        }

        ResourceObjectAdapter::new(self.graph, self.options).to_resource(
            object,
            "/data",
            &rules,
            WriteOperationKind::UpdateResource,
            model_errors,
        )
    }

    fn delete(&self, operation: &AtomicOperationObject) -> Result<Resource, ApiError> {
        if operation.data.is_assigned() {
            return Err(ErrorKind::ForbiddenElement {
                element: "data".into(),
            }
            .at("/data"));
        }
        let reference = operation.reference.as_ref().ok_or_else(|| {
            ErrorKind::MissingElement {
                element: "ref".into(),
            }
            .at("")
        })?;
        self.check_reference(reference)
    }

    fn relationship(
        &self,
        operation: &AtomicOperationObject,
        kind: WriteOperationKind,
    ) -> Result<Resource, ApiError> {
        let reference = operation.reference.as_ref().ok_or_else(|| {
            ErrorKind::MissingElement {
                element: "ref".into(),
            }
            .at("")
        })?;
        let mut resource = self.check_reference(reference)?;
        let name = reference.relationship.as_deref().unwrap_or_default();

        let Some(def) = self.graph.relationship(&resource.type_name, name) else {
            return Err(ErrorKind::UnknownRelationship {
                type_name: resource.type_name.clone(),
                name: name.into(),
            }
            .at("/ref/relationship"));
        };
        if kind != WriteOperationKind::SetRelationship && !def.is_to_many() {
            return Err(ErrorKind::InvalidElement {
                message: "Only to-many relationships can be targeted through this operation."
                    .into(),
                detail: format!("Relationship '{}' is not a to-many relationship.", name),
            }
            .at("/ref/relationship"));
        }

        let identifiers = operation.data.clone().map(|object| object.to_identifier());
        let value = RelationshipDataAdapter::new(self.graph).convert(def, &identifiers, "", true)?;
        resource.relationships.insert(name.to_string(), value);
        Ok(resource)
    }

    /// Validate a `ref` and turn it into the targeted resource.
    fn check_reference(&self, reference: &AtomicReference) -> Result<Resource, ApiError> {
        let resource_type = check_identity(
            self.graph,
            reference.type_name.as_deref(),
            reference.id.as_deref(),
            reference.lid.as_deref(),
            "/ref",
            &IdentityRules::new(IdPresence::Required, true),
        )?;
        let mut resource = Resource::new(resource_type.name.clone());
        resource.id = reference.id.clone();
        resource.lid = reference.lid.clone();
        Ok(resource)
    }
}

fn single_resource(data: &SingleOrManyData<ResourceObject>) -> Result<&ResourceObject, ApiError> {
    match data {
        SingleOrManyData::One(object) => Ok(object),
        SingleOrManyData::Unassigned => Err(ErrorKind::MissingElement {
            element: "data".into(),
        }
        .at("")),
        other => Err(ErrorKind::InvalidElement {
            message: "Expected an object.".into(),
            detail: format!("Expected an object, instead of '{}'.", other.kind_name()),
        }
        .at("/data")),
    }
}

fn read_reference(raw: &RawValue, path: &str) -> Result<Option<AtomicReference>, ReadError> {
    if JsonValueKind::of(raw) == JsonValueKind::Null {
        return Ok(None);
    }
    let mut reader = TokenReader::begin_object(raw, path)?;
    let mut reference = AtomicReference::default();
    while let Some((name, value)) = reader.next_member() {
        let member_path = reader.member_path(&name);
        match name.as_str() {
            "type" => reference.type_name = read_string(value, "type", &member_path)?,
            "id" => reference.id = read_string(value, "id", &member_path)?,
            "lid" => reference.lid = read_string(value, "lid", &member_path)?,
            "relationship" => {
                reference.relationship = read_string(value, "relationship", &member_path)?
            }
            _ => {}
        }
    }
    Ok(Some(reference))
}

/// Write an operation object, omitting unset members.
pub fn write_operation(operation: &AtomicOperationObject) -> Value {
    let mut map = Map::new();
    if let Some(op) = &operation.op {
        map.insert("op".into(), Value::String(op.clone()));
    }
    if let Some(reference) = &operation.reference {
        let mut r = Map::new();
        let members = [
            ("type", &reference.type_name),
            ("id", &reference.id),
            ("lid", &reference.lid),
            ("relationship", &reference.relationship),
        ];
        for (name, value) in members {
            if let Some(value) = value {
                r.insert(name.into(), Value::String(value.clone()));
            }
        }
        map.insert("ref".into(), Value::Object(r));
    }
    if let Some(href) = &operation.href {
        map.insert("href".into(), Value::String(href.clone()));
    }
    if let Some(data) = single_or_many::write(&operation.data, write_resource_object) {
        map.insert("data".into(), data);
    }
    if let Some(meta) = &operation.meta {
        map.insert("meta".into(), meta.clone());
    }
    Value::Object(map)
}
