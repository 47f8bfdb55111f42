use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{HookContext, HookRegistry, NodeId, ResourceArena, ResourceBucket, ResourceHook};
use crate::error::HookError;
use crate::graph::ResourceGraph;

/// What one traversal invoked, in invocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookReport {
    /// Resource type and bucket size of each invocation.
    pub invocations: Vec<(String, usize)>,
    /// Instances removed by `OnReturn`.
    pub removed: usize,
}

impl HookReport {
    pub fn invoked(&self, type_name: &str) -> usize {
        self.invocations
            .iter()
            .filter(|(name, _)| name == type_name)
            .count()
    }
}

/// Walks a [`ResourceArena`] and invokes one hook per resource type.
#[derive(Debug, Clone, Copy)]
pub struct HookExecutor<'r> {
    graph: &'r ResourceGraph,
    registry: &'r HookRegistry,
}

impl<'r> HookExecutor<'r> {
    pub fn new(graph: &'r ResourceGraph, registry: &'r HookRegistry) -> Self {
        Self { graph, registry }
    }

    /// Run `hook` over everything reachable from the arena roots.
    ///
    /// Relationships are only followed into types that implement `hook`.
    /// Every instance lands in exactly one bucket however many paths reach
    /// it, and each type's hook is called once with its whole bucket.
    ///
    /// # Errors
    ///
    /// Returns the first hook failure, or `HookError::Cancelled` when the
    /// context is cancelled before a call.
    pub async fn execute(
        &self,
        hook: ResourceHook,
        arena: &mut ResourceArena,
        ctx: &HookContext,
    ) -> Result<HookReport, HookError> {
        let mut buckets = self.collect(hook, arena);
        if !hook.runs_first_to_last() {
            buckets.reverse();
        }

        let mut report = HookReport::default();
        let mut removed = HashSet::new();

        for bucket in &buckets {
            let Some(hooks) = self.registry.get(bucket.type_name()) else {
                continue;
            };
            if !self.registry.implements(bucket.type_name(), hook) {
                continue;
            }
            ctx.cancellation.check()?;
            debug!(
                %hook,
                type_name = bucket.type_name(),
                count = bucket.len(),
                "invoking resource hook"
            );

            match hook {
                ResourceHook::BeforeRead => hooks.before_read(bucket, ctx).await?,
                ResourceHook::AfterRead => hooks.after_read(bucket, ctx).await?,
                ResourceHook::OnReturn => {
                    let kept: HashSet<NodeId> =
                        hooks.on_return(bucket, ctx).await?.into_iter().collect();
                    removed.extend(bucket.node_ids().into_iter().filter(|id| !kept.contains(id)));
                }
                ResourceHook::BeforeCreate => hooks.before_create(bucket, ctx).await?,
                ResourceHook::AfterCreate => hooks.after_create(bucket, ctx).await?,
                ResourceHook::BeforeUpdate => hooks.before_update(bucket, ctx).await?,
                ResourceHook::AfterUpdate => hooks.after_update(bucket, ctx).await?,
                ResourceHook::BeforeDelete => hooks.before_delete(bucket, ctx).await?,
                ResourceHook::AfterDelete => hooks.after_delete(bucket, ctx).await?,
                ResourceHook::BeforeUpdateRelationship => {
                    hooks.before_update_relationship(bucket, ctx).await?
                }
                ResourceHook::AfterUpdateRelationship => {
                    hooks.after_update_relationship(bucket, ctx).await?
                }
            }
            report
                .invocations
                .push((bucket.type_name().to_string(), bucket.len()));
        }

        report.removed = removed.len();
        arena.detach(&removed);
        Ok(report)
    }

    /// Depth-first walk with an explicit stack, grouping instances into
    /// per-type buckets in discovery order.
    fn collect(&self, hook: ResourceHook, arena: &ResourceArena) -> Vec<ResourceBucket> {
        let mut buckets: Vec<ResourceBucket> = Vec::new();
        let mut bucket_index: HashMap<String, usize> = HashMap::new();
        let mut visited: HashMap<String, HashSet<NodeId>> = HashMap::new();

        let mut stack: Vec<(NodeId, String)> = arena
            .roots()
            .iter()
            .rev()
            .map(|&node| (node, String::new()))
            .collect();

        while let Some((node, path)) = stack.pop() {
            let resource = arena.resource(node);
            let type_name = resource.type_name.as_str();
            if !visited.entry(type_name.to_string()).or_default().insert(node) {
                continue;
            }

            let index = *bucket_index.entry(type_name.to_string()).or_insert_with(|| {
                buckets.push(ResourceBucket::new(type_name));
                buckets.len() - 1
            });
            buckets[index].push(node, resource.clone(), &path);

            let mut children = Vec::new();
            for (relationship, targets) in arena.edges(node) {
                let Some(def) = self.graph.relationship(type_name, relationship) else {
                    continue;
                };
                if !self.registry.implements(&def.target, hook) {
                    continue;
                }
                let child_path = if path.is_empty() {
                    relationship.to_string()
                } else {
                    format!("{}.{}", path, relationship)
                };
                for &target in targets {
                    let seen = visited
                        .get(&arena.resource(target).type_name)
                        .is_some_and(|set| set.contains(&target));
                    if !seen {
                        children.push((target, child_path.clone()));
                    }
                }
            }
            stack.extend(children.into_iter().rev());
        }

        buckets
    }
}
