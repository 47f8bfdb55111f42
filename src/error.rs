//! Error types for JSON:API document conversion and operation processing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the low-level token reader.
///
/// Only malformed JSON and identifier elements of the wrong JSON kind are
/// reported here. Attribute values of the wrong kind never fail the reader.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("expected an object at {path}, instead of {actual}")]
    ExpectedObject { path: String, actual: String },

    #[error("expected an array at {path}, instead of {actual}")]
    ExpectedArray { path: String, actual: String },

    #[error("expected a JSON string for '{element}' at {path}, instead of {actual}")]
    ExpectedString {
        element: String,
        path: String,
        actual: String,
        raw: String,
    },
}

impl ReadError {
    /// Relative JSON Pointer of the offending element.
    pub fn path(&self) -> &str {
        match self {
            ReadError::InvalidJson { .. } => "",
            ReadError::ExpectedObject { path, .. }
            | ReadError::ExpectedArray { path, .. }
            | ReadError::ExpectedString { path, .. } => path,
        }
    }

    /// Convert into a client-facing error rooted at `base`.
    pub fn into_api_error(self, base: &str) -> ApiError {
        let pointer = format!("{}{}", base, self.path());
        match self {
            ReadError::InvalidJson { source } => ErrorKind::MalformedBody {
                detail: source.to_string(),
            }
            .without_pointer(),
            ReadError::ExpectedObject { actual, .. } => ErrorKind::InvalidElement {
                message: "Expected an object.".to_string(),
                detail: format!("Expected an object, instead of '{}'.", actual),
            }
            .at(pointer),
            ReadError::ExpectedArray { actual, .. } => ErrorKind::InvalidElement {
                message: "Expected an array.".to_string(),
                detail: format!("Expected an array, instead of '{}'.", actual),
            }
            .at(pointer),
            ReadError::ExpectedString {
                element, actual, ..
            } if element != "id" && element != "lid" => ErrorKind::InvalidElement {
                message: format!("Incompatible '{}' value found.", element),
                detail: format!("Expected a JSON string, instead of '{}'.", actual),
            }
            .at(pointer),
            ReadError::ExpectedString {
                element,
                actual,
                raw,
                ..
            } => ErrorKind::IncompatibleIdentifier {
                element,
                raw,
                actual,
                target: "String".to_string(),
            }
            .at(pointer),
        }
    }
}

/// Errors while building or loading a resource graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("graph definition failed validation with {} error(s)", errors.len())]
    InvalidDefinition { errors: Vec<DefinitionError> },

    #[error("resource type '{type_name}' is registered more than once")]
    DuplicateType { type_name: String },

    #[error("field '{field}' is declared more than once on resource type '{type_name}'")]
    DuplicateField { type_name: String, field: String },

    #[error("relationship '{relationship}' on '{type_name}' targets unknown type '{target}'")]
    UnknownTarget {
        type_name: String,
        relationship: String,
        target: String,
    },
}

impl GraphError {
    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            GraphError::FileNotFound { .. } | GraphError::ReadFailed { .. } => 3,
            _ => 2,
        }
    }
}

/// Single graph definition violation with path context.
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionError {
    /// JSON Pointer (RFC 6901) into the definition file.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Classified client-facing failure. `Display` yields the error title.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Failed to deserialize request body.")]
    MalformedBody { detail: String },

    #[error("The '{element}' element is required.")]
    MissingElement { element: String },

    #[error("The '{element}' element is not allowed.")]
    ForbiddenElement { element: String },

    #[error("{message}")]
    InvalidElement { message: String, detail: String },

    #[error("Incompatible '{element}' value found.")]
    IncompatibleIdentifier {
        element: String,
        raw: String,
        actual: String,
        target: String,
    },

    #[error("Unknown resource type found.")]
    UnknownResourceType { type_name: String },

    #[error("Unknown attribute found.")]
    UnknownAttribute { type_name: String, name: String },

    #[error("Unknown relationship found.")]
    UnknownRelationship { type_name: String, name: String },

    #[error("Incompatible attribute value found.")]
    IncompatibleAttributeValue {
        name: String,
        raw: String,
        actual: String,
        target: String,
    },

    #[error("Setting the initial value of the requested attribute is not allowed.")]
    AttributeNotCreatable { name: String },

    #[error("Changing the value of the requested attribute is not allowed.")]
    AttributeReadOnly { name: String },

    #[error("Input validation failed.")]
    RequiredAttributeMissing { name: String },

    #[error("Resource type mismatch between {context}.")]
    ResourceTypeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Resource ID mismatch between {context}.")]
    ResourceIdMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Incompatible resource type found.")]
    IncompatibleResourceType {
        relationship: String,
        expected: String,
        actual: String,
    },

    #[error("Specifying the resource ID in POST requests is not allowed.")]
    ClientGeneratedId,

    #[error("Too many operations in request.")]
    TooManyOperations { count: usize, max: usize },

    #[error("Another local ID with the same name is already defined at this point.")]
    DuplicateLocalId { lid: String },

    #[error("Server-generated value for local ID is not available at this point.")]
    UnknownLocalId { lid: String },

    #[error("Local ID cannot be both defined and used within the same operation.")]
    LocalIdSingleOperation { lid: String },

    #[error("Incompatible type in Local ID usage.")]
    IncompatibleLocalIdType {
        lid: String,
        declared: String,
        actual: String,
    },

    #[error("The requested resource does not exist.")]
    ResourceNotFound { type_name: String, id: String },

    #[error("A related resource does not exist.")]
    RelatedResourceNotFound {
        type_name: String,
        id: String,
        relationship: String,
    },

    #[error("{title}")]
    HookRejected {
        status: u16,
        title: String,
        detail: Option<String>,
    },

    #[error("An unhandled error occurred while processing this request.")]
    Fatal { detail: String },
}

impl ErrorKind {
    /// Attach a JSON Pointer to the offending element.
    pub fn at(self, pointer: impl Into<String>) -> ApiError {
        ApiError {
            kind: self,
            pointer: Some(pointer.into()),
        }
    }

    /// Wrap without a source pointer.
    pub fn without_pointer(self) -> ApiError {
        ApiError {
            kind: self,
            pointer: None,
        }
    }

    /// HTTP status code for this kind of failure.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::MalformedBody { .. }
            | ErrorKind::DuplicateLocalId { .. }
            | ErrorKind::UnknownLocalId { .. }
            | ErrorKind::LocalIdSingleOperation { .. }
            | ErrorKind::IncompatibleLocalIdType { .. } => 400,
            ErrorKind::ClientGeneratedId => 403,
            ErrorKind::ResourceNotFound { .. } | ErrorKind::RelatedResourceNotFound { .. } => 404,
            ErrorKind::ResourceTypeMismatch { .. }
            | ErrorKind::ResourceIdMismatch { .. }
            | ErrorKind::IncompatibleResourceType { .. } => 409,
            ErrorKind::TooManyOperations { .. } => 413,
            ErrorKind::HookRejected { status, .. } => *status,
            ErrorKind::Fatal { .. } => 500,
            _ => 422,
        }
    }

    /// Instance-specific explanation, when one exists.
    pub fn detail(&self) -> Option<String> {
        let detail = match self {
            ErrorKind::MalformedBody { detail } => detail.clone(),
            ErrorKind::MissingElement { .. } | ErrorKind::ForbiddenElement { .. } => return None,
            ErrorKind::InvalidElement { detail, .. } => detail.clone(),
            ErrorKind::IncompatibleIdentifier {
                element,
                raw,
                actual,
                target,
            } => format!(
                "Failed to convert {} '{}' of type '{}' to type '{}'.",
                if element == "lid" { "local ID" } else { "ID" },
                raw,
                actual,
                target
            ),
            ErrorKind::UnknownResourceType { type_name } => {
                format!("Resource type '{}' does not exist.", type_name)
            }
            ErrorKind::UnknownAttribute { type_name, name } => format!(
                "Attribute '{}' does not exist on resource type '{}'.",
                name, type_name
            ),
            ErrorKind::UnknownRelationship { type_name, name } => format!(
                "Relationship '{}' does not exist on resource type '{}'.",
                name, type_name
            ),
            ErrorKind::IncompatibleAttributeValue {
                name,
                raw,
                actual,
                target,
            } => format!(
                "Failed to convert attribute '{}' with value '{}' of type '{}' to type '{}'.",
                name, raw, actual, target
            ),
            ErrorKind::AttributeNotCreatable { name } => {
                format!("The attribute '{}' cannot be set when creating a resource.", name)
            }
            ErrorKind::AttributeReadOnly { name } => {
                format!("The attribute '{}' cannot be changed.", name)
            }
            ErrorKind::RequiredAttributeMissing { name } => {
                format!("The {} field is required.", name)
            }
            ErrorKind::ResourceTypeMismatch {
                context: _,
                expected,
                actual,
            } => format!(
                "Expected resource of type '{}', instead of '{}'.",
                expected, actual
            ),
            ErrorKind::ResourceIdMismatch {
                context: _,
                expected,
                actual,
            } => format!(
                "Expected resource ID '{}', instead of '{}'.",
                expected, actual
            ),
            ErrorKind::IncompatibleResourceType {
                relationship,
                expected,
                actual,
            } => format!(
                "Type '{}' is incompatible with type '{}' of relationship '{}'.",
                actual, expected, relationship
            ),
            ErrorKind::ClientGeneratedId => return None,
            ErrorKind::TooManyOperations { count, max } => format!(
                "The number of operations in this request ({}) is higher than {}.",
                count, max
            ),
            ErrorKind::DuplicateLocalId { lid } => format!(
                "Another local ID with name '{}' is already defined at this point.",
                lid
            ),
            ErrorKind::UnknownLocalId { lid } => format!(
                "Server-generated value for local ID '{}' is not available at this point.",
                lid
            ),
            ErrorKind::LocalIdSingleOperation { lid } => format!(
                "Local ID '{}' cannot be both defined and used within the same operation.",
                lid
            ),
            ErrorKind::IncompatibleLocalIdType {
                lid,
                declared,
                actual,
            } => format!(
                "Local ID '{}' belongs to resource type '{}' instead of '{}'.",
                lid, declared, actual
            ),
            ErrorKind::ResourceNotFound { type_name, id } => format!(
                "Resource of type '{}' with ID '{}' does not exist.",
                type_name, id
            ),
            ErrorKind::RelatedResourceNotFound {
                type_name,
                id,
                relationship,
            } => format!(
                "Related resource of type '{}' with ID '{}' in relationship '{}' does not exist.",
                type_name, id, relationship
            ),
            ErrorKind::HookRejected { detail, .. } => return detail.clone(),
            ErrorKind::Fatal { detail } => detail.clone(),
        };
        Some(detail)
    }
}

/// A client-facing failure with the location of the offending element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct ApiError {
    pub kind: ErrorKind,
    /// JSON Pointer into the request body, if the failure has a location.
    pub pointer: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    /// Root the pointer at the atomic operation with the given index.
    pub fn in_operation(mut self, index: usize) -> Self {
        let prefix = format!("/atomic:operations[{}]", index);
        self.pointer = Some(match self.pointer.take() {
            Some(pointer) if pointer.starts_with("/atomic:operations[") => pointer,
            Some(pointer) => format!("{}{}", prefix, pointer),
            None => prefix,
        });
        self
    }

    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            status: self.status().to_string(),
            title: self.kind.to_string(),
            detail: self.kind.detail(),
            source: self.pointer.clone().map(|pointer| ErrorSource {
                pointer: Some(pointer),
            }),
        }
    }
}

/// Top-level failure of a request, in the shape returned to clients.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("request contains {} error(s)", errors.len())]
    Invalid { errors: Vec<ApiError> },

    #[error("request was cancelled")]
    Cancelled,
}

impl RequestError {
    /// Flatten into the individual failures.
    pub fn errors(&self) -> Vec<ApiError> {
        match self {
            RequestError::Api(e) => vec![e.clone()],
            RequestError::Invalid { errors } => errors.clone(),
            RequestError::Cancelled => Vec::new(),
        }
    }

    /// Overall HTTP status: the shared status, or the most general class.
    pub fn status(&self) -> u16 {
        match self {
            RequestError::Api(e) => e.status(),
            RequestError::Invalid { errors } => overall_status(errors),
            RequestError::Cancelled => 499,
        }
    }

    pub fn to_document(&self) -> ErrorDocument {
        ErrorDocument {
            errors: self.errors().iter().map(ApiError::to_error_object).collect(),
        }
    }
}

fn overall_status(errors: &[ApiError]) -> u16 {
    let Some(first) = errors.first() else {
        return 500;
    };
    if errors.iter().all(|e| e.status() == first.status()) {
        first.status()
    } else if errors.iter().any(|e| e.status() >= 500) {
        500
    } else {
        400
    }
}

/// JSON:API error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub status: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

/// `{"errors": [...]}` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

/// Failure raised by a resource hook.
#[derive(Debug, Clone, Error)]
pub enum HookError {
    #[error("{title}")]
    Rejected {
        status: u16,
        title: String,
        detail: Option<String>,
    },

    #[error("hook execution was cancelled")]
    Cancelled,
}

impl HookError {
    /// Convenience for a 403 rejection, the usual outcome of a guard hook.
    pub fn forbidden(title: impl Into<String>, detail: impl Into<String>) -> Self {
        HookError::Rejected {
            status: 403,
            title: title.into(),
            detail: Some(detail.into()),
        }
    }
}

/// Failure reported by a [`crate::store::ResourceStore`].
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("resource of type '{type_name}' with ID '{id}' does not exist")]
    NotFound { type_name: String, id: String },

    #[error("related resource '{type_name}/{id}' in '{relationship}' does not exist")]
    RelatedNotFound {
        type_name: String,
        id: String,
        relationship: String,
    },

    #[error("resource of type '{type_name}' with ID '{id}' already exists")]
    Conflict { type_name: String, id: String },

    #[error("no transaction is active")]
    NoTransaction,

    #[error("a transaction is already active")]
    TransactionInProgress,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { type_name, id } => {
                ErrorKind::ResourceNotFound { type_name, id }.without_pointer()
            }
            StoreError::RelatedNotFound {
                type_name,
                id,
                relationship,
            } => ErrorKind::RelatedResourceNotFound {
                type_name,
                id,
                relationship,
            }
            .without_pointer(),
            StoreError::Conflict { type_name, id } => ErrorKind::HookRejected {
                status: 409,
                title: "Another resource with the specified ID already exists.".to_string(),
                detail: Some(format!(
                    "Another resource of type '{}' with ID '{}' already exists.",
                    type_name, id
                )),
            }
            .without_pointer(),
            StoreError::NoTransaction | StoreError::TransactionInProgress => ErrorKind::Fatal {
                detail: err.to_string(),
            }
            .without_pointer(),
        }
    }
}

impl From<HookError> for RequestError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::Rejected {
                status,
                title,
                detail,
            } => RequestError::Api(
                ErrorKind::HookRejected {
                    status,
                    title,
                    detail,
                }
                .without_pointer(),
            ),
            HookError::Cancelled => RequestError::Cancelled,
        }
    }
}
