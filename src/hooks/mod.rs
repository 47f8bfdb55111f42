//! Resource hooks: lifecycle callbacks that resource definitions implement
//! to observe or veto what the pipeline does with their resources.
//!
//! Each implementation declares the hooks it provides through
//! [`ResourceHooks::implemented`]. The [`HookRegistry`] records that set once
//! at registration so the [`HookExecutor`] can skip types and relationships
//! without calling into them.

mod arena;
mod executor;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::HookError;
use crate::model::Resource;

pub use arena::{NodeId, ResourceArena};
pub use executor::{HookExecutor, HookReport};

/// A lifecycle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceHook {
    BeforeRead,
    AfterRead,
    OnReturn,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    BeforeUpdateRelationship,
    AfterUpdateRelationship,
}

impl ResourceHook {
    pub const ALL: [ResourceHook; 11] = [
        ResourceHook::BeforeRead,
        ResourceHook::AfterRead,
        ResourceHook::OnReturn,
        ResourceHook::BeforeCreate,
        ResourceHook::AfterCreate,
        ResourceHook::BeforeUpdate,
        ResourceHook::AfterUpdate,
        ResourceHook::BeforeDelete,
        ResourceHook::AfterDelete,
        ResourceHook::BeforeUpdateRelationship,
        ResourceHook::AfterUpdateRelationship,
    ];

    /// Whether buckets are processed in discovery order. `After*` and
    /// `OnReturn` run in reverse.
    pub fn runs_first_to_last(&self) -> bool {
        matches!(
            self,
            ResourceHook::BeforeRead
                | ResourceHook::BeforeCreate
                | ResourceHook::BeforeUpdate
                | ResourceHook::BeforeDelete
                | ResourceHook::BeforeUpdateRelationship
        )
    }

    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

impl fmt::Display for ResourceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Set of hooks a resource definition implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookSet(u16);

impl HookSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        ResourceHook::ALL.into_iter().collect()
    }

    pub fn with(mut self, hook: ResourceHook) -> Self {
        self.0 |= hook.bit();
        self
    }

    pub fn contains(&self, hook: ResourceHook) -> bool {
        self.0 & hook.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<ResourceHook> for HookSet {
    fn from_iter<I: IntoIterator<Item = ResourceHook>>(iter: I) -> Self {
        iter.into_iter().fold(HookSet::empty(), HookSet::with)
    }
}

/// The request pipeline a hook fires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    Get,
    GetSingle,
    GetRelationship,
    Post,
    Patch,
    PatchRelationship,
    Delete,
}

/// Sending half of a cancellation signal.
#[derive(Debug)]
pub struct CancellationSource {
    sender: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn token(&self) -> Cancellation {
        Cancellation {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a cancellation signal, checked between hook calls.
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    /// A signal that never fires.
    pub fn none() -> Self {
        CancellationSource::new().token()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fail with `HookError::Cancelled` once cancelled.
    pub fn check(&self) -> Result<(), HookError> {
        if self.is_cancelled() {
            Err(HookError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Ambient information passed to every hook.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub pipeline: Pipeline,
    pub cancellation: Cancellation,
}

impl HookContext {
    pub fn new(pipeline: Pipeline, cancellation: Cancellation) -> Self {
        Self {
            pipeline,
            cancellation,
        }
    }
}

/// The distinct instances of one resource type reached in a traversal.
#[derive(Debug, Clone)]
pub struct ResourceBucket {
    type_name: String,
    entries: Vec<(NodeId, Resource)>,
    /// Relationship path from the roots (`""` for roots, `owner`,
    /// `owner.tags`, ...) to the instances first reached through it.
    paths: BTreeMap<String, Vec<NodeId>>,
}

impl ResourceBucket {
    pub(crate) fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            entries: Vec::new(),
            paths: BTreeMap::new(),
        }
    }

    pub(crate) fn push(&mut self, node: NodeId, resource: Resource, path: &str) {
        self.entries.push((node, resource));
        self.paths.entry(path.to_string()).or_default().push(node);
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.entries.iter().map(|(_, r)| r)
    }

    pub fn entries(&self) -> &[(NodeId, Resource)] {
        &self.entries
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    /// Instances reached through one relationship path.
    pub fn by_path(&self, path: &str) -> Vec<&Resource> {
        let Some(nodes) = self.paths.get(path) else {
            return Vec::new();
        };
        self.entries
            .iter()
            .filter(|(id, _)| nodes.contains(id))
            .map(|(_, r)| r)
            .collect()
    }
}

/// Hook implementation for one resource type.
///
/// Every method has a no-op default; [`ResourceHooks::implemented`] decides
/// which ones are called.
#[async_trait]
pub trait ResourceHooks: Send + Sync {
    fn implemented(&self) -> HookSet;

    async fn before_read(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_read(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Returns the instances to keep in the response.
    async fn on_return(
        &self,
        bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<Vec<NodeId>, HookError> {
        Ok(bucket.node_ids())
    }

    async fn before_create(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_create(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_update(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_update(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_delete(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_delete(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_update_relationship(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_update_relationship(
        &self,
        _bucket: &ResourceBucket,
        _ctx: &HookContext,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

struct Registration {
    hooks: Arc<dyn ResourceHooks>,
    implemented: HookSet,
}

/// Hook implementations keyed by resource type, with their capability sets.
#[derive(Default)]
pub struct HookRegistry {
    entries: HashMap<String, Registration>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        type_name: impl Into<String>,
        hooks: impl ResourceHooks + 'static,
    ) -> Self {
        let implemented = hooks.implemented();
        self.entries.insert(
            type_name.into(),
            Registration {
                hooks: Arc::new(hooks),
                implemented,
            },
        );
        self
    }

    pub fn implements(&self, type_name: &str, hook: ResourceHook) -> bool {
        self.entries
            .get(type_name)
            .is_some_and(|r| r.implemented.contains(hook))
    }

    /// Whether any registered type implements `hook`.
    pub fn any_implements(&self, hook: ResourceHook) -> bool {
        self.entries.values().any(|r| r.implemented.contains(hook))
    }

    pub fn implemented(&self, type_name: &str) -> HookSet {
        self.entries
            .get(type_name)
            .map(|r| r.implemented)
            .unwrap_or_default()
    }

    pub(crate) fn get(&self, type_name: &str) -> Option<&Arc<dyn ResourceHooks>> {
        self.entries.get(type_name).map(|r| &r.hooks)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, registration) in &self.entries {
            map.entry(name, &registration.implemented);
        }
        map.finish()
    }
}
