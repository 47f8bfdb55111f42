//! Document adapter: request bodies to [`RequestModel`], and response
//! documents back out.

use serde_json::value::RawValue;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{ApiError, ErrorDocument, ErrorKind, ErrorObject, ReadError, RequestError};
use crate::graph::ResourceGraph;
use crate::local_ids::LocalIdValidator;
use crate::model::{OperationIntent, RequestModel, Resource};
use crate::objects::{
    AtomicOperationObject, AtomicResultObject, Document, ResourceObject, SingleOrManyData,
};
use crate::operation::{write_operation, OperationAdapter};
use crate::reader::{begin_array, parse_root, to_value, TokenReader};
use crate::relationship::RelationshipDataAdapter;
use crate::resource_object::{
    write_resource_object, IdPresence, IdentityRules, ResourceObjectAdapter,
};
use crate::single_or_many;
use crate::types::{
    Endpoint, Options, RequestContext, WriteOperationKind, ATOMIC_EXTENSION, JSONAPI_VERSION,
    OPERATIONS_MEMBER, RESULTS_MEMBER,
};

/// Converts request documents for one resource graph and configuration.
#[derive(Debug, Clone, Copy)]
pub struct DocumentAdapter<'g> {
    graph: &'g ResourceGraph,
    options: &'g Options,
}

impl<'g> DocumentAdapter<'g> {
    pub fn new(graph: &'g ResourceGraph, options: &'g Options) -> Self {
        Self { graph, options }
    }

    /// Read a request body into a [`Document`].
    ///
    /// # Errors
    ///
    /// Returns `ReadError` for malformed JSON or document structure.
    pub fn read(&self, body: &str) -> Result<Document, ReadError> {
        let root = parse_root(body)?;
        let mut reader = TokenReader::begin_object(root, "")?;
        let resources = ResourceObjectAdapter::new(self.graph, self.options);
        let operations = OperationAdapter::new(self.graph, self.options);
        let mut document = Document::default();

        while let Some((name, value)) = reader.next_member() {
            let path = reader.member_path(&name);
            match name.as_str() {
                "data" => {
                    document.data = single_or_many::read(Some(value), &path, |raw, path| {
                        resources.read(raw, path)
                    })?
                }
                OPERATIONS_MEMBER => {
                    let mut list = Vec::new();
                    for (i, element) in begin_array(value, &path)?.into_iter().enumerate() {
                        list.push(operations.read(element, &format!("{}[{}]", path, i))?);
                    }
                    document.operations = Some(list);
                }
                RESULTS_MEMBER => {
                    let mut list = Vec::new();
                    for (i, element) in begin_array(value, &path)?.into_iter().enumerate() {
                        list.push(read_result(&resources, element, &format!("{}[{}]", path, i))?);
                    }
                    document.results = Some(list);
                }
                "errors" => {
                    let errors = to_value(value)?;
                    document.errors = Some(
                        serde_json::from_value(errors)
                            .map_err(|source| ReadError::InvalidJson { source })?,
                    );
                }
                "jsonapi" => document.jsonapi = Some(to_value(value)?),
                "links" => document.links = Some(to_value(value)?),
                "meta" => document.meta = Some(to_value(value)?),
                _ => {}
            }
        }

        Ok(document)
    }

    /// Parse and convert a request body.
    ///
    /// A delete request carries no body; its text is not inspected.
    ///
    /// # Errors
    ///
    /// Returns a `RequestError` ready to be written as an error document.
    pub fn convert_body(
        &self,
        body: &str,
        ctx: &RequestContext,
    ) -> Result<RequestModel, RequestError> {
        if ctx.endpoint == Endpoint::Primary
            && ctx.write_operation == Some(WriteOperationKind::DeleteResource)
        {
            return self.convert(&Document::default(), ctx);
        }
        let document = self.read(body).map_err(|e| e.into_api_error(""))?;
        self.convert(&document, ctx)
    }

    /// Convert a document in the context of the endpoint it was sent to.
    ///
    /// # Errors
    ///
    /// With model-state validation on, all conversion failures of the
    /// request are returned together; otherwise the first one is.
    pub fn convert(
        &self,
        document: &Document,
        ctx: &RequestContext,
    ) -> Result<RequestModel, RequestError> {
        let has_data = document.data.is_assigned();
        let has_operations = document.operations.is_some();

        if has_data && has_operations {
            return Err(ErrorKind::InvalidElement {
                message: "The 'data' and 'atomic:operations' element are mutually exclusive."
                    .into(),
                detail: "A document contains either primary data or operations.".into(),
            }
            .without_pointer()
            .into());
        }

        let mut model_errors = Vec::new();
        let model = match &ctx.endpoint {
            Endpoint::Operations => {
                if has_data {
                    return Err(ErrorKind::ForbiddenElement {
                        element: "data".into(),
                    }
                    .at("/data")
                    .into());
                }
                let operations = document.operations.as_deref().ok_or_else(|| {
                    ErrorKind::MissingElement {
                        element: OPERATIONS_MEMBER.into(),
                    }
                    .without_pointer()
                })?;
                RequestModel::Operations(self.convert_operations(operations, &mut model_errors)?)
            }
            _ if has_operations => {
                return Err(ErrorKind::ForbiddenElement {
                    element: OPERATIONS_MEMBER.into(),
                }
                .at(format!("/{}", OPERATIONS_MEMBER))
                .into());
            }
            Endpoint::Primary => RequestModel::Resource(self.convert_primary(
                &document.data,
                ctx,
                &mut model_errors,
            )?),
            Endpoint::Relationship { relationship } => {
                RequestModel::Relationship(self.convert_relationship(
                    &document.data,
                    relationship,
                    ctx,
                )?)
            }
        };

        if !model_errors.is_empty() {
            return Err(RequestError::Invalid {
                errors: model_errors,
            });
        }
        Ok(model)
    }

    fn convert_operations(
        &self,
        operations: &[AtomicOperationObject],
        model_errors: &mut Vec<ApiError>,
    ) -> Result<Vec<OperationIntent>, ApiError> {
        if operations.is_empty() {
            return Err(ErrorKind::InvalidElement {
                message: "No operations found.".into(),
                detail: "The 'atomic:operations' element must contain at least one operation."
                    .into(),
            }
            .at(format!("/{}", OPERATIONS_MEMBER)));
        }
        if let Some(max) = self.options.max_operations_per_request {
            if operations.len() > max {
                return Err(ErrorKind::TooManyOperations {
                    count: operations.len(),
                    max,
                }
                .at(format!("/{}", OPERATIONS_MEMBER)));
            }
        }

        let adapter = OperationAdapter::new(self.graph, self.options);
        let mut validator = LocalIdValidator::new();
        let mut intents = Vec::with_capacity(operations.len());

        // With model-state validation on, every operation is checked and
        // its failures join the others. Local IDs are only tracked up to the
        // first operation that could not be converted, since the ones it
        // declares are unknown.
        let collect = self.options.validate_model_state;
        let mut lids_tracked = true;
        for (index, operation) in operations.iter().enumerate() {
            let before = model_errors.len();
            let intent = match adapter.convert(operation, index, model_errors) {
                Ok(intent) => intent,
                Err(err) if collect => {
                    model_errors.push(err);
                    lids_tracked = false;
                    continue;
                }
                Err(err) => return Err(err),
            };
            if !collect && model_errors.len() > before {
                return Err(model_errors.remove(before));
            }
            if lids_tracked {
                if let Err(err) = validator.validate(&intent) {
                    if !collect {
                        return Err(err);
                    }
                    model_errors.push(err);
                }
            }
            intents.push(intent);
        }

        debug!(count = intents.len(), "adapted atomic operations");
        Ok(intents)
    }

    fn convert_primary(
        &self,
        data: &SingleOrManyData<ResourceObject>,
        ctx: &RequestContext,
        model_errors: &mut Vec<ApiError>,
    ) -> Result<OperationIntent, ApiError> {
        let primary_type = self.primary_type(ctx)?;
        let kind = ctx.write_operation.unwrap_or(WriteOperationKind::CreateResource);

        if kind == WriteOperationKind::DeleteResource {
            let mut resource = Resource::new(primary_type);
            resource.id = ctx.primary_id.clone();
            return Ok(single_intent(kind, resource, None));
        }

        let object = match data {
            SingleOrManyData::One(object) => object,
            SingleOrManyData::Unassigned => {
                return Err(ErrorKind::MissingElement {
                    element: "data".into(),
                }
                .without_pointer());
            }
            other => {
                return Err(ErrorKind::InvalidElement {
                    message: "Expected an object for the 'data' element.".into(),
                    detail: format!("Expected an object, instead of '{}'.", other.kind_name()),
                }
                .at("/data"));
            }
        };

        let context = format!("request body and endpoint URL '{}'", ctx.path());
        let rules = match kind {
            WriteOperationKind::CreateResource => IdentityRules::new(
                if self.options.allow_client_generated_ids {
                    IdPresence::Optional
                } else {
                    IdPresence::Forbidden
                },
                false,
            ),
            _ => IdentityRules::new(IdPresence::Required, false).expect_id(ctx.primary_id.clone()),
        }
        .expect_type(primary_type)
        .context(context);

        let mut local_errors = Vec::new();
        let resource = ResourceObjectAdapter::new(self.graph, self.options).to_resource(
            object,
            "/data",
            &rules,
            kind,
            &mut local_errors,
        )?;
        if !self.options.validate_model_state {
            if let Some(first) = local_errors.into_iter().next() {
                return Err(first);
            }
        } else {
            model_errors.extend(local_errors);
        }

        Ok(single_intent(kind, resource, None))
    }

    fn convert_relationship(
        &self,
        data: &SingleOrManyData<ResourceObject>,
        relationship: &str,
        ctx: &RequestContext,
    ) -> Result<OperationIntent, ApiError> {
        let primary_type = self.primary_type(ctx)?;
        let kind = ctx
            .write_operation
            .unwrap_or(WriteOperationKind::SetRelationship);

        let Some(def) = self.graph.relationship(primary_type, relationship) else {
            return Err(ErrorKind::UnknownRelationship {
                type_name: primary_type.into(),
                name: relationship.into(),
            }
            .without_pointer());
        };
        if kind != WriteOperationKind::SetRelationship && !def.is_to_many() {
            return Err(ErrorKind::InvalidElement {
                message: "Only to-many relationships can be updated through this endpoint."
                    .into(),
                detail: format!("Relationship '{}' is not a to-many relationship.", relationship),
            }
            .without_pointer());
        }

        let identifiers = data.clone().map(|object| object.to_identifier());
        let value = RelationshipDataAdapter::new(self.graph).convert(def, &identifiers, "", false)?;

        let mut resource = Resource::new(primary_type);
        resource.id = ctx.primary_id.clone();
        resource.relationships.insert(relationship.to_string(), value);
        Ok(single_intent(kind, resource, Some(relationship.to_string())))
    }

    fn primary_type<'c>(&self, ctx: &'c RequestContext) -> Result<&'c str, ApiError> {
        let primary_type = ctx.primary_type.as_deref().ok_or_else(|| {
            ErrorKind::Fatal {
                detail: "The endpoint does not name a resource type.".into(),
            }
            .without_pointer()
        })?;
        if self.graph.get(primary_type).is_none() {
            return Err(ErrorKind::Fatal {
                detail: format!("Resource type '{}' is not registered.", primary_type),
            }
            .without_pointer());
        }
        Ok(primary_type)
    }
}

fn single_intent(
    kind: WriteOperationKind,
    resource: Resource,
    relationship: Option<String>,
) -> OperationIntent {
    OperationIntent {
        index: None,
        kind,
        resource,
        relationship,
    }
}

fn read_result(
    resources: &ResourceObjectAdapter<'_>,
    raw: &RawValue,
    path: &str,
) -> Result<AtomicResultObject, ReadError> {
    let mut reader = TokenReader::begin_object(raw, path)?;
    let mut result = AtomicResultObject::default();
    while let Some((name, value)) = reader.next_member() {
        let member_path = reader.member_path(&name);
        match name.as_str() {
            "data" => {
                result.data = single_or_many::read(Some(value), &member_path, |raw, path| {
                    resources.read(raw, path)
                })?
            }
            "meta" => result.meta = Some(to_value(value)?),
            _ => {}
        }
    }
    Ok(result)
}

/// Write a document, omitting every unset member.
pub fn write_document(document: &Document) -> Value {
    let mut map = Map::new();
    if let Some(jsonapi) = &document.jsonapi {
        map.insert("jsonapi".into(), jsonapi.clone());
    }
    if let Some(links) = &document.links {
        map.insert("links".into(), links.clone());
    }
    if let Some(data) = single_or_many::write(&document.data, write_resource_object) {
        map.insert("data".into(), data);
    }
    if let Some(operations) = &document.operations {
        map.insert(
            OPERATIONS_MEMBER.into(),
            Value::Array(operations.iter().map(write_operation).collect()),
        );
    }
    if let Some(results) = &document.results {
        let results = results
            .iter()
            .map(|result| {
                let mut entry = Map::new();
                if let Some(data) = single_or_many::write(&result.data, write_resource_object) {
                    entry.insert("data".into(), data);
                }
                if let Some(meta) = &result.meta {
                    entry.insert("meta".into(), meta.clone());
                }
                Value::Object(entry)
            })
            .collect();
        map.insert(RESULTS_MEMBER.into(), Value::Array(results));
    }
    if let Some(errors) = &document.errors {
        map.insert("errors".into(), json!(errors));
    }
    if let Some(meta) = &document.meta {
        map.insert("meta".into(), meta.clone());
    }
    Value::Object(map)
}

/// Builds response documents.
#[derive(Debug, Clone, Copy)]
pub struct ResponseBuilder<'g> {
    resources: ResourceObjectAdapter<'g>,
}

impl<'g> ResponseBuilder<'g> {
    pub fn new(graph: &'g ResourceGraph, options: &'g Options) -> Self {
        Self {
            resources: ResourceObjectAdapter::new(graph, options),
        }
    }

    /// `{"data": {...}}` for one resource, or `{"data": null}`.
    pub fn primary(&self, resource: Option<&Resource>) -> Value {
        let data = match resource {
            Some(resource) => SingleOrManyData::One(self.resources.from_resource(resource)),
            None => SingleOrManyData::Null,
        };
        write_document(&Document {
            jsonapi: Some(json!({ "version": JSONAPI_VERSION })),
            data,
            ..Document::default()
        })
    }

    /// `{"data": [...]}`.
    pub fn collection(&self, resources: &[Resource]) -> Value {
        let data = SingleOrManyData::Many(
            resources
                .iter()
                .map(|resource| Some(self.resources.from_resource(resource)))
                .collect(),
        );
        write_document(&Document {
            jsonapi: Some(json!({ "version": JSONAPI_VERSION })),
            data,
            ..Document::default()
        })
    }

    /// `{"atomic:results": [...]}`; `None` entries are written as `{}`.
    pub fn atomic_results(&self, results: &[Option<Resource>]) -> Value {
        let results = results
            .iter()
            .map(|result| AtomicResultObject {
                data: match result {
                    Some(resource) => SingleOrManyData::One(self.resources.from_resource(resource)),
                    None => SingleOrManyData::Unassigned,
                },
                meta: None,
            })
            .collect();
        write_document(&Document {
            jsonapi: Some(json!({
                "version": JSONAPI_VERSION,
                "ext": [ATOMIC_EXTENSION]
            })),
            results: Some(results),
            ..Document::default()
        })
    }

    /// `{"errors": [...]}`.
    pub fn errors(&self, error: &RequestError) -> Value {
        let ErrorDocument { errors } = error.to_document();
        error_document(errors)
    }
}

fn error_document(errors: Vec<ErrorObject>) -> Value {
    write_document(&Document {
        jsonapi: Some(json!({ "version": JSONAPI_VERSION })),
        errors: Some(errors),
        ..Document::default()
    })
}
