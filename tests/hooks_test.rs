//! Integration tests for resource hooks over stored resource graphs.

use async_trait::async_trait;
use jsonapi_core::{
    Cancellation, CancellationSource, DocumentAdapter, HookContext, HookError, HookExecutor,
    HookRegistry, HookSet, MemoryStore, NodeId, Options, OperationsProcessor, Pipeline,
    RelationshipValue, RequestContext, RequestError, Resource, ResourceArena, ResourceBucket,
    ResourceGraph, ResourceHook, ResourceHooks, ResourceIdentity, ResourceStore,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn graph() -> ResourceGraph {
    ResourceGraph::from_definition(&json!({
        "resources": [
            {
                "type": "people",
                "idType": "integer",
                "attributes": [{ "name": "lastName", "type": "string" }],
                "relationships": [
                    { "name": "ownedTodoItems", "kind": "toMany", "target": "todoItems" }
                ]
            },
            {
                "type": "todoItems",
                "idType": "integer",
                "attributes": [{ "name": "isLocked", "type": "boolean" }],
                "relationships": [
                    { "name": "owner", "kind": "toOne", "target": "people" },
                    { "name": "assignee", "kind": "toOne", "target": "people" }
                ]
            },
            {
                "type": "tags",
                "idType": "integer",
                "attributes": [{ "name": "name", "type": "string" }]
            }
        ]
    }))
    .unwrap()
}

fn person(id: &str) -> ResourceIdentity {
    ResourceIdentity::with_id("people", id)
}

fn item(id: &str) -> ResourceIdentity {
    ResourceIdentity::with_id("todoItems", id)
}

async fn seeded_store(graph: &ResourceGraph) -> MemoryStore {
    let store = MemoryStore::new(graph.clone());
    store
        .seed(vec![
            Resource::new("people")
                .with_id("1")
                .with_relationship("ownedTodoItems", RelationshipValue::ToMany(vec![item("10")])),
            Resource::new("people")
                .with_id("2")
                .with_relationship("ownedTodoItems", RelationshipValue::ToMany(vec![item("11")])),
            Resource::new("todoItems")
                .with_id("10")
                .with_attribute("isLocked", json!(false))
                .with_relationship("owner", RelationshipValue::ToOne(Some(person("1"))))
                .with_relationship("assignee", RelationshipValue::ToOne(Some(person("2")))),
            Resource::new("todoItems")
                .with_id("11")
                .with_attribute("isLocked", json!(true))
                .with_relationship("owner", RelationshipValue::ToOne(Some(person("2")))),
        ])
        .await
        .unwrap();
    store
}

/// Hides locked todo items from responses.
struct HideLocked;

#[async_trait]
impl ResourceHooks for HideLocked {
    fn implemented(&self) -> HookSet {
        HookSet::empty().with(ResourceHook::OnReturn)
    }

    async fn on_return(
        &self,
        bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<Vec<NodeId>, HookError> {
        Ok(bucket
            .entries()
            .iter()
            .filter(|(_, r)| r.attributes.get("isLocked") != Some(&Value::Bool(true)))
            .map(|(id, _)| *id)
            .collect())
    }
}

/// Keeps everything; only registered so traversal enters people.
struct KeepAll;

#[async_trait]
impl ResourceHooks for KeepAll {
    fn implemented(&self) -> HookSet {
        HookSet::empty().with(ResourceHook::OnReturn)
    }
}

#[tokio::test]
async fn on_return_runs_once_per_type_over_cycles() {
    let graph = graph();
    let store = seeded_store(&graph).await;
    let registry = HookRegistry::new()
        .register("todoItems", HideLocked)
        .register("people", KeepAll);

    let roots = vec![
        store.get("todoItems", "10").await.unwrap().unwrap(),
        store.get("todoItems", "11").await.unwrap().unwrap(),
    ];
    let mut arena = ResourceArena::load(roots, &store).await.unwrap();
    assert_eq!(arena.len(), 4);

    let ctx = HookContext::new(Pipeline::Get, Cancellation::none());
    let report = HookExecutor::new(&graph, &registry)
        .execute(ResourceHook::OnReturn, &mut arena, &ctx)
        .await
        .unwrap();

    assert_eq!(report.invoked("todoItems"), 1);
    assert_eq!(report.invoked("people"), 1);
    assert_eq!(
        report.invocations,
        vec![("people".to_string(), 2), ("todoItems".to_string(), 2)]
    );
    assert_eq!(report.removed, 1);

    let kept: Vec<Option<&str>> = arena
        .root_resources()
        .iter()
        .map(|r| r.id.as_deref())
        .collect();
    assert_eq!(kept, vec![Some("10")]);

    let root = arena.roots()[0];
    let assignee = arena
        .edges(root)
        .find(|(name, _)| *name == "assignee")
        .map(|(_, targets)| targets[0])
        .unwrap();
    assert_eq!(
        arena.resource(assignee).relationships["ownedTodoItems"],
        RelationshipValue::ToMany(Vec::new())
    );
}

#[tokio::test]
async fn types_without_the_hook_are_not_entered() {
    let graph = graph();
    let store = seeded_store(&graph).await;
    let registry = HookRegistry::new().register("todoItems", HideLocked);

    let roots = vec![store.get("todoItems", "10").await.unwrap().unwrap()];
    let mut arena = ResourceArena::load(roots, &store).await.unwrap();

    let ctx = HookContext::new(Pipeline::GetSingle, Cancellation::none());
    let report = HookExecutor::new(&graph, &registry)
        .execute(ResourceHook::OnReturn, &mut arena, &ctx)
        .await
        .unwrap();

    // Item 11 is only reachable through people, which has no hooks.
    assert_eq!(report.invocations, vec![("todoItems".to_string(), 1)]);
    assert_eq!(report.removed, 0);
}

/// Refuses to delete person 1.
struct ProtectFirstPerson;

#[async_trait]
impl ResourceHooks for ProtectFirstPerson {
    fn implemented(&self) -> HookSet {
        HookSet::empty().with(ResourceHook::BeforeDelete)
    }

    async fn before_delete(
        &self,
        bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        if bucket.resources().any(|r| r.id.as_deref() == Some("1")) {
            return Err(HookError::forbidden(
                "You are not allowed to delete this person.",
                "Person '1' is protected.",
            ));
        }
        Ok(())
    }
}

async fn apply(
    graph: &ResourceGraph,
    registry: &HookRegistry,
    store: &MemoryStore,
    cancellation: Cancellation,
    operations: Value,
) -> Result<Vec<Option<Resource>>, RequestError> {
    let options = Options::default();
    let body = json!({ "atomic:operations": operations }).to_string();
    let model = DocumentAdapter::new(graph, &options)
        .convert_body(&body, &RequestContext::operations())?;
    OperationsProcessor::new(graph, registry)
        .process(model.into_intents(), store, cancellation)
        .await
}

#[tokio::test]
async fn rejecting_hook_aborts_the_batch() {
    let graph = graph();
    let store = seeded_store(&graph).await;
    let registry = HookRegistry::new().register("people", ProtectFirstPerson);

    let err = apply(
        &graph,
        &registry,
        &store,
        Cancellation::none(),
        json!([
            { "op": "add", "data": { "type": "tags", "attributes": { "name": "x" } } },
            { "op": "remove", "ref": { "type": "people", "id": "1" } }
        ]),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), 403);
    let error = err.errors()[0].to_error_object();
    assert_eq!(error.title, "You are not allowed to delete this person.");
    assert_eq!(
        error.source.unwrap().pointer.as_deref(),
        Some("/atomic:operations[1]")
    );
    assert!(store.all("tags").await.is_empty());
    assert_eq!(store.all("people").await.len(), 2);
}

/// Cancels the request from inside the first hook call.
struct CancelOnCreate {
    source: CancellationSource,
}

#[async_trait]
impl ResourceHooks for CancelOnCreate {
    fn implemented(&self) -> HookSet {
        HookSet::empty().with(ResourceHook::BeforeCreate)
    }

    async fn before_create(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        self.source.cancel();
        Ok(())
    }
}

#[tokio::test]
async fn cancellation_stops_remaining_operations() {
    let graph = graph();
    let store = MemoryStore::new(graph.clone());
    let source = CancellationSource::new();
    let token = source.token();
    let registry = HookRegistry::new().register("tags", CancelOnCreate { source });

    let err = apply(
        &graph,
        &registry,
        &store,
        token,
        json!([
            { "op": "add", "data": { "type": "tags", "attributes": { "name": "a" } } },
            { "op": "add", "data": { "type": "tags", "attributes": { "name": "b" } } }
        ]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RequestError::Cancelled));
    assert!(store.all("tags").await.is_empty());
}

/// Records write hook calls as `"<hook> <type> <bucket size>"`.
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn record(&self, hook: ResourceHook, bucket: &ResourceBucket) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {} {}", hook, bucket.type_name(), bucket.len()));
    }
}

#[async_trait]
impl ResourceHooks for Recorder {
    fn implemented(&self) -> HookSet {
        HookSet::all()
    }

    async fn before_create(
        &self,
        bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        self.record(ResourceHook::BeforeCreate, bucket);
        Ok(())
    }

    async fn after_create(
        &self,
        bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        self.record(ResourceHook::AfterCreate, bucket);
        Ok(())
    }

    async fn before_update_relationship(
        &self,
        bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        self.record(ResourceHook::BeforeUpdateRelationship, bucket);
        Ok(())
    }

    async fn after_update_relationship(
        &self,
        bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        self.record(ResourceHook::AfterUpdateRelationship, bucket);
        Ok(())
    }
}

#[tokio::test]
async fn writes_notify_related_types_once() {
    let graph = graph();
    let store = MemoryStore::new(graph.clone());
    store
        .seed(vec![Resource::new("people").with_id("5")])
        .await
        .unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = HookRegistry::new()
        .register("people", Recorder { calls: calls.clone() })
        .register("todoItems", Recorder { calls: calls.clone() });

    apply(
        &graph,
        &registry,
        &store,
        Cancellation::none(),
        json!([
            {
                "op": "add",
                "data": {
                    "type": "todoItems",
                    "lid": "t",
                    "relationships": {
                        "owner": { "data": { "type": "people", "id": "5" } },
                        "assignee": { "data": { "type": "people", "id": "5" } }
                    }
                }
            },
            {
                "op": "update",
                "ref": { "type": "todoItems", "lid": "t", "relationship": "assignee" },
                "data": { "type": "people", "id": "5" }
            }
        ]),
    )
    .await
    .unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "BeforeCreate todoItems 1",
            "BeforeUpdateRelationship people 1",
            "AfterUpdateRelationship people 1",
            "AfterCreate todoItems 1",
            "BeforeUpdateRelationship todoItems 1",
            "BeforeUpdateRelationship people 1",
            "AfterUpdateRelationship people 1",
            "AfterUpdateRelationship todoItems 1",
        ]
    );
}

#[tokio::test]
async fn deleting_notifies_formerly_related_types() {
    let graph = graph();
    let store = seeded_store(&graph).await;
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = HookRegistry::new().register("people", Recorder { calls: calls.clone() });

    apply(
        &graph,
        &registry,
        &store,
        Cancellation::none(),
        json!([{ "op": "remove", "ref": { "type": "todoItems", "id": "10" } }]),
    )
    .await
    .unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "BeforeUpdateRelationship people 2",
            "AfterUpdateRelationship people 2",
        ]
    );
}
