//! JSON:API document conversion
//!
//! Converts JSON:API request documents, including atomic-operations batches,
//! into a validated in-memory request model, executes write operations with
//! local-ID resolution, and runs resource hooks over loaded resource graphs.
//!
//! # Example
//!
//! ```
//! use jsonapi_core::{
//!     AttrDef, AttrType, DocumentAdapter, Options, RequestContext, RequestModel, ResourceGraph,
//!     ResourceType,
//! };
//!
//! let graph = ResourceGraph::builder()
//!     .resource(ResourceType::new("people").attribute(AttrDef::new("name", AttrType::String)))
//!     .build()
//!     .unwrap();
//! let options = Options::default();
//!
//! let body = r#"{"data": {"type": "people", "attributes": {"name": "Ada"}}}"#;
//! let model = DocumentAdapter::new(&graph, &options)
//!     .convert_body(body, &RequestContext::create("people"))
//!     .unwrap();
//!
//! let RequestModel::Resource(intent) = model else {
//!     panic!("expected a single resource");
//! };
//! assert_eq!(intent.resource.attributes["name"], "Ada");
//! ```
//!
//! # Pipeline
//!
//! | Stage | Type |
//! |-------|------|
//! | Read raw JSON | [`TokenReader`] |
//! | Wire objects | [`Document`], [`ResourceObject`], [`AtomicOperationObject`] |
//! | Convert and validate | [`DocumentAdapter`], [`OperationAdapter`], [`ResourceObjectAdapter`] |
//! | Execute | [`OperationsProcessor`] against a [`ResourceStore`] |
//! | Respond | [`ResponseBuilder`] |
//!
//! Attribute values that fail to convert do not abort reading. They are
//! carried as [`AttributeValue::Invalid`] and reported by the conversion
//! pass, with the pointer of the offending attribute.

mod document;
mod error;
mod graph;
mod hooks;
mod local_ids;
mod model;
mod objects;
mod operation;
mod processor;
mod reader;
mod relationship;
mod resource_object;
mod single_or_many;
mod store;
mod types;

pub use document::{write_document, DocumentAdapter, ResponseBuilder};
pub use error::{
    ApiError, DefinitionError, ErrorDocument, ErrorKind, ErrorObject, ErrorSource, GraphError,
    HookError, ReadError, RequestError, StoreError,
};
pub use graph::{
    validate_definition, AttrCapabilities, AttrDef, AttrType, Cardinality, IdType,
    RelationshipDef, ResourceGraph, ResourceGraphBuilder, ResourceType,
};
pub use hooks::{
    Cancellation, CancellationSource, HookContext, HookExecutor, HookRegistry, HookReport,
    HookSet, NodeId, Pipeline, ResourceArena, ResourceBucket, ResourceHook, ResourceHooks,
};
pub use local_ids::{LocalIdTracker, LocalIdValidator};
pub use model::{OperationIntent, RelationshipValue, RequestModel, Resource, ResourceIdentity};
pub use objects::{
    AtomicOperationCode, AtomicOperationObject, AtomicReference, AtomicResultObject,
    AttributeValue, Document, JsonInvalidAttributeInfo, Member, RelationshipObject,
    ResourceIdentifierObject, ResourceObject, SingleOrManyData,
};
pub use operation::{write_operation, OperationAdapter};
pub use processor::OperationsProcessor;
pub use reader::{JsonValueKind, TokenReader};
pub use relationship::RelationshipDataAdapter;
pub use resource_object::{IdPresence, IdentityRules, ResourceObjectAdapter};
pub use store::{MemoryStore, ResourceStore};
pub use types::{
    is_atomic_media_type, Endpoint, Options, RequestContext, WriteOperationKind,
    ATOMIC_EXTENSION, JSONAPI_VERSION, MEDIA_TYPE,
};
