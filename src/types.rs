//! Core types shared by the adapters: request context, options and media types.

use serde::{Deserialize, Serialize};

/// JSON:API media type.
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// URI of the atomic operations extension.
pub const ATOMIC_EXTENSION: &str = "https://jsonapi.org/ext/atomic";

/// JSON:API version written into response documents.
pub const JSONAPI_VERSION: &str = "1.1";

/// Top-level member holding an atomic operations batch.
pub const OPERATIONS_MEMBER: &str = "atomic:operations";

/// Top-level member holding atomic operation results.
pub const RESULTS_MEMBER: &str = "atomic:results";

/// Returns true when a `Content-Type` value selects the atomic extension.
///
/// Parameters other than `ext` are ignored; `ext` may list several URIs.
pub fn is_atomic_media_type(content_type: &str) -> bool {
    let mut parts = content_type.split(';');
    let Some(essence) = parts.next() else {
        return false;
    };
    if !essence.trim().eq_ignore_ascii_case(MEDIA_TYPE) {
        return false;
    }
    parts.any(|param| {
        let Some((name, value)) = param.split_once('=') else {
            return false;
        };
        name.trim().eq_ignore_ascii_case("ext")
            && value
                .trim()
                .trim_matches('"')
                .split_whitespace()
                .any(|uri| uri == ATOMIC_EXTENSION)
    })
}

/// Kind of write a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteOperationKind {
    CreateResource,
    UpdateResource,
    DeleteResource,
    SetRelationship,
    AddToRelationship,
    RemoveFromRelationship,
}

/// Endpoint shape, as resolved by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `/{type}` or `/{type}/{id}`
    Primary,
    /// `/{type}/{id}/relationships/{relationship}`
    Relationship { relationship: String },
    /// `/operations`
    Operations,
}

/// Ambient per-request information supplied by the routing layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub endpoint: Endpoint,
    /// Public name of the resource type in the URL. Unset for `/operations`.
    pub primary_type: Option<String>,
    /// Resource ID in the URL, if any.
    pub primary_id: Option<String>,
    pub write_operation: Option<WriteOperationKind>,
}

impl RequestContext {
    /// `POST /{type}`
    pub fn create(primary_type: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::Primary,
            primary_type: Some(primary_type.into()),
            primary_id: None,
            write_operation: Some(WriteOperationKind::CreateResource),
        }
    }

    /// `PATCH /{type}/{id}`
    pub fn update(primary_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::Primary,
            primary_type: Some(primary_type.into()),
            primary_id: Some(id.into()),
            write_operation: Some(WriteOperationKind::UpdateResource),
        }
    }

    /// `POST|PATCH|DELETE /{type}/{id}/relationships/{relationship}`
    pub fn relationship(
        primary_type: impl Into<String>,
        id: impl Into<String>,
        relationship: impl Into<String>,
        kind: WriteOperationKind,
    ) -> Self {
        Self {
            endpoint: Endpoint::Relationship {
                relationship: relationship.into(),
            },
            primary_type: Some(primary_type.into()),
            primary_id: Some(id.into()),
            write_operation: Some(kind),
        }
    }

    /// `POST /operations`
    pub fn operations() -> Self {
        Self {
            endpoint: Endpoint::Operations,
            primary_type: None,
            primary_id: None,
            write_operation: None,
        }
    }

    /// Endpoint path for error details, e.g. `/people/1`.
    pub fn path(&self) -> String {
        let mut path = String::new();
        if let Some(primary_type) = &self.primary_type {
            path.push('/');
            path.push_str(primary_type);
        }
        if let Some(id) = &self.primary_id {
            path.push('/');
            path.push_str(id);
        }
        match &self.endpoint {
            Endpoint::Relationship { relationship } => {
                path.push_str("/relationships/");
                path.push_str(relationship);
            }
            Endpoint::Operations => path.push_str("/operations"),
            Endpoint::Primary => {}
        }
        path
    }

    /// HTTP method implied by the write operation.
    pub fn method(&self) -> &'static str {
        match self.write_operation {
            Some(WriteOperationKind::CreateResource)
            | Some(WriteOperationKind::AddToRelationship) => "POST",
            Some(WriteOperationKind::UpdateResource)
            | Some(WriteOperationKind::SetRelationship) => "PATCH",
            Some(WriteOperationKind::DeleteResource)
            | Some(WriteOperationKind::RemoveFromRelationship) => "DELETE",
            None => "POST",
        }
    }
}

/// Behavior switches for request conversion and processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Allow clients to send `id` when creating resources.
    pub allow_client_generated_ids: bool,
    /// Skip attributes and relationships that do not exist on a type.
    pub allow_unknown_fields: bool,
    /// Collect type conversion and required-attribute failures across the
    /// whole request before reporting them.
    pub validate_model_state: bool,
    /// Upper bound on operations in one batch; `None` disables the check.
    pub max_operations_per_request: Option<usize>,
    /// Prefix for `links.self` in response documents.
    pub base_url: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            allow_client_generated_ids: false,
            allow_unknown_fields: true,
            validate_model_state: true,
            max_operations_per_request: Some(10),
            base_url: None,
        }
    }
}

impl Options {
    pub fn allow_client_generated_ids(mut self, allow: bool) -> Self {
        self.allow_client_generated_ids = allow;
        self
    }

    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.allow_unknown_fields = allow;
        self
    }

    pub fn validate_model_state(mut self, validate: bool) -> Self {
        self.validate_model_state = validate;
        self
    }

    pub fn max_operations_per_request(mut self, max: Option<usize>) -> Self {
        self.max_operations_per_request = max;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}
