//! Sequential execution of write operations inside one store transaction.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{ApiError, ErrorKind, RequestError};
use crate::graph::ResourceGraph;
use crate::hooks::{
    Cancellation, HookContext, HookExecutor, HookRegistry, NodeId, Pipeline, ResourceArena,
    ResourceHook,
};
use crate::local_ids::{LocalIdTracker, LocalIdValidator};
use crate::model::{OperationIntent, RelationshipValue, Resource};
use crate::store::ResourceStore;
use crate::types::WriteOperationKind;

/// Runs operations in order, resolving local IDs as they become known.
///
/// Operations never run concurrently: each one may depend on IDs assigned
/// by the ones before it.
#[derive(Debug, Clone, Copy)]
pub struct OperationsProcessor<'a> {
    graph: &'a ResourceGraph,
    hooks: &'a HookRegistry,
}

impl<'a> OperationsProcessor<'a> {
    pub fn new(graph: &'a ResourceGraph, hooks: &'a HookRegistry) -> Self {
        Self { graph, hooks }
    }

    /// Execute all operations, or none of them.
    ///
    /// Returns one entry per operation: the resulting resource for creates
    /// and resource updates, `None` for everything else.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first failing operation, with its pointer
    /// rooted at the operation for batches. The transaction is rolled back.
    pub async fn process(
        &self,
        intents: Vec<OperationIntent>,
        store: &dyn ResourceStore,
        cancellation: Cancellation,
    ) -> Result<Vec<Option<Resource>>, RequestError> {
        LocalIdValidator::validate_all(&intents)?;

        store.begin().await.map_err(ApiError::from)?;
        let mut tracker = LocalIdTracker::new();
        let mut results = Vec::with_capacity(intents.len());

        for intent in intents {
            let index = intent.index;
            match self.process_one(intent, &mut tracker, store, &cancellation).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!(index = ?index, error = %err, "operation failed, rolling back");
                    if let Err(rollback) = store.rollback().await {
                        warn!(error = %rollback, "rollback failed");
                    }
                    return Err(match (err, index) {
                        (RequestError::Api(e), Some(i)) => RequestError::Api(e.in_operation(i)),
                        (err, _) => err,
                    });
                }
            }
        }

        store.commit().await.map_err(ApiError::from)?;
        Ok(results)
    }

    async fn process_one(
        &self,
        mut intent: OperationIntent,
        tracker: &mut LocalIdTracker,
        store: &dyn ResourceStore,
        cancellation: &Cancellation,
    ) -> Result<Option<Resource>, RequestError> {
        cancellation.check()?;
        let kind = intent.kind;
        let ctx = HookContext::new(pipeline(kind), cancellation.clone());

        let declared_lid = match (kind, &intent.resource.id, &intent.resource.lid) {
            (WriteOperationKind::CreateResource, None, Some(lid)) => {
                tracker
                    .declare(lid, &intent.resource.type_name)
                    .map_err(ErrorKind::without_pointer)?;
                Some(lid.clone())
            }
            _ => None,
        };
        tracker
            .resolve_intent(&mut intent)
            .map_err(ErrorKind::without_pointer)?;

        let (before, after) = hooks_for(kind);
        let related = self.related_resources(&intent, store).await?;
        self.run_before(before, intent.resource.clone(), &related, &ctx).await?;

        let resource = intent.resource;
        let target = resource.identity();
        let result = match kind {
            WriteOperationKind::CreateResource => {
                let created = store.create(resource).await.map_err(ApiError::from)?;
                if let (Some(lid), Some(id)) = (&declared_lid, &created.id) {
                    tracker
                        .assign(lid, &created.type_name, id)
                        .map_err(ErrorKind::without_pointer)?;
                }
                Some(created)
            }
            WriteOperationKind::UpdateResource => {
                Some(store.update(resource).await.map_err(ApiError::from)?)
            }
            WriteOperationKind::DeleteResource => {
                let id = target
                    .id
                    .as_deref()
                    .ok_or_else(|| missing_id(&target.type_name))?;
                store
                    .delete(&target.type_name, id)
                    .await
                    .map_err(ApiError::from)?;
                None
            }
            _ => {
                let name = intent.relationship.as_deref().unwrap_or_default();
                let value = resource
                    .relationships
                    .get(name)
                    .cloned()
                    .ok_or_else(|| {
                        ErrorKind::Fatal {
                            detail: format!("No value for relationship '{}'.", name),
                        }
                        .without_pointer()
                    })?;
                let outcome = match (kind, value) {
                    (WriteOperationKind::SetRelationship, value) => {
                        store.set_relationship(&target, name, value).await
                    }
                    (WriteOperationKind::AddToRelationship, RelationshipValue::ToMany(many)) => {
                        store.add_to_relationship(&target, name, many).await
                    }
                    (_, RelationshipValue::ToMany(many)) => {
                        store.remove_from_relationship(&target, name, many).await
                    }
                    (_, RelationshipValue::ToOne(_)) => {
                        return Err(ErrorKind::Fatal {
                            detail: format!(
                                "Relationship '{}' is not a to-many relationship.",
                                name
                            ),
                        }
                        .without_pointer()
                        .into());
                    }
                };
                outcome.map_err(ApiError::from)?;
                None
            }
        };

        let returned = result.clone().unwrap_or_else(|| Resource {
            id: target.id.clone(),
            lid: target.lid.clone(),
            ..Resource::new(target.type_name.clone())
        });
        self.run_after(after, returned, &related, &ctx).await?;

        debug!(
            index = ?intent.index,
            kind = ?kind,
            type_name = %target.type_name,
            id = ?result.as_ref().and_then(|r| r.id.as_deref()).or(target.id.as_deref()),
            related = related.len(),
            "executed operation"
        );
        Ok(result)
    }

    /// Stored resources on the other side of the relationships an operation
    /// writes, paired with the relationship name.
    ///
    /// Deletes affect everything the stored resource links to. References to
    /// missing resources are skipped; the store reports them.
    async fn related_resources(
        &self,
        intent: &OperationIntent,
        store: &dyn ResourceStore,
    ) -> Result<Vec<(String, Resource)>, RequestError> {
        if !self.hooks.any_implements(ResourceHook::BeforeUpdateRelationship)
            && !self.hooks.any_implements(ResourceHook::AfterUpdateRelationship)
        {
            return Ok(Vec::new());
        }

        let stored;
        let source = match intent.kind {
            WriteOperationKind::DeleteResource => {
                let Some(id) = intent.resource.id.as_deref() else {
                    return Ok(Vec::new());
                };
                stored = store
                    .get(&intent.resource.type_name, id)
                    .await
                    .map_err(ApiError::from)?;
                match &stored {
                    Some(resource) => resource,
                    None => return Ok(Vec::new()),
                }
            }
            _ => &intent.resource,
        };

        let mut related = Vec::new();
        for (name, value) in &source.relationships {
            if intent
                .relationship
                .as_deref()
                .is_some_and(|targeted| targeted != name)
            {
                continue;
            }
            for identity in value.identities() {
                let Some(id) = identity.id.as_deref() else {
                    continue;
                };
                if let Some(resource) = store
                    .get(&identity.type_name, id)
                    .await
                    .map_err(ApiError::from)?
                {
                    related.push((name.clone(), resource));
                }
            }
        }
        Ok(related)
    }

    /// `hook` on the written resource, then `BeforeUpdateRelationship` on
    /// the resources it links to or unlinks from.
    async fn run_before(
        &self,
        hook: ResourceHook,
        root: Resource,
        related: &[(String, Resource)],
        ctx: &HookContext,
    ) -> Result<(), RequestError> {
        let executor = HookExecutor::new(self.graph, self.hooks);
        if hook == ResourceHook::BeforeUpdateRelationship {
            let mut arena = affected_arena(Some(root), related);
            executor.execute(hook, &mut arena, ctx).await?;
            return Ok(());
        }
        executor.execute(hook, &mut single_root(root), ctx).await?;
        if !related.is_empty() {
            let mut arena = affected_arena(None, related);
            executor
                .execute(ResourceHook::BeforeUpdateRelationship, &mut arena, ctx)
                .await?;
        }
        Ok(())
    }

    /// Mirror of [`Self::run_before`]: related resources first.
    async fn run_after(
        &self,
        hook: ResourceHook,
        root: Resource,
        related: &[(String, Resource)],
        ctx: &HookContext,
    ) -> Result<(), RequestError> {
        let executor = HookExecutor::new(self.graph, self.hooks);
        if hook == ResourceHook::AfterUpdateRelationship {
            let mut arena = affected_arena(Some(root), related);
            executor.execute(hook, &mut arena, ctx).await?;
            return Ok(());
        }
        if !related.is_empty() {
            let mut arena = affected_arena(None, related);
            executor
                .execute(ResourceHook::AfterUpdateRelationship, &mut arena, ctx)
                .await?;
        }
        executor.execute(hook, &mut single_root(root), ctx).await?;
        Ok(())
    }
}

fn pipeline(kind: WriteOperationKind) -> Pipeline {
    match kind {
        WriteOperationKind::CreateResource => Pipeline::Post,
        WriteOperationKind::UpdateResource => Pipeline::Patch,
        WriteOperationKind::DeleteResource => Pipeline::Delete,
        _ => Pipeline::PatchRelationship,
    }
}

fn hooks_for(kind: WriteOperationKind) -> (ResourceHook, ResourceHook) {
    match kind {
        WriteOperationKind::CreateResource => {
            (ResourceHook::BeforeCreate, ResourceHook::AfterCreate)
        }
        WriteOperationKind::UpdateResource => {
            (ResourceHook::BeforeUpdate, ResourceHook::AfterUpdate)
        }
        WriteOperationKind::DeleteResource => {
            (ResourceHook::BeforeDelete, ResourceHook::AfterDelete)
        }
        _ => (
            ResourceHook::BeforeUpdateRelationship,
            ResourceHook::AfterUpdateRelationship,
        ),
    }
}

fn single_root(resource: Resource) -> ResourceArena {
    affected_arena(Some(resource), &[])
}

/// Arena of the related resources, linked from `root` when given and
/// rooted themselves otherwise. Each stored resource becomes one node.
fn affected_arena(root: Option<Resource>, related: &[(String, Resource)]) -> ResourceArena {
    let mut arena = ResourceArena::new();
    let root = root.map(|resource| {
        let node = arena.insert(resource);
        arena.add_root(node);
        node
    });

    let mut known: HashMap<(String, Option<String>), NodeId> = HashMap::new();
    for (relationship, resource) in related {
        let key = (resource.type_name.clone(), resource.id.clone());
        let node = match known.get(&key) {
            Some(&node) => node,
            None => {
                let node = arena.insert(resource.clone());
                known.insert(key, node);
                node
            }
        };
        match root {
            Some(root) => arena.link(root, relationship, node),
            None => arena.add_root(node),
        }
    }
    arena
}

fn missing_id(type_name: &str) -> ApiError {
    ErrorKind::Fatal {
        detail: format!(
            "Resource of type '{}' has no ID after local ID resolution.",
            type_name
        ),
    }
    .without_pointer()
}
