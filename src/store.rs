//! Persistence contract used by the operations processor, and an in-memory
//! implementation of it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::StoreError;
use crate::graph::{IdType, ResourceGraph};
use crate::model::{RelationshipValue, Resource, ResourceIdentity};

/// Transactional resource persistence.
///
/// Implementations receive resources whose local IDs are already resolved:
/// every identity carries an `id`.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn begin(&self) -> Result<(), StoreError>;
    async fn commit(&self) -> Result<(), StoreError>;
    async fn rollback(&self) -> Result<(), StoreError>;

    async fn get(&self, type_name: &str, id: &str) -> Result<Option<Resource>, StoreError>;

    /// Persist a new resource and return it with its server ID.
    async fn create(&self, resource: Resource) -> Result<Resource, StoreError>;

    /// Apply the assigned fields of `resource` and return the stored result.
    async fn update(&self, resource: Resource) -> Result<Resource, StoreError>;

    async fn delete(&self, type_name: &str, id: &str) -> Result<(), StoreError>;

    async fn set_relationship(
        &self,
        target: &ResourceIdentity,
        relationship: &str,
        value: RelationshipValue,
    ) -> Result<(), StoreError>;

    async fn add_to_relationship(
        &self,
        target: &ResourceIdentity,
        relationship: &str,
        identities: Vec<ResourceIdentity>,
    ) -> Result<(), StoreError>;

    async fn remove_from_relationship(
        &self,
        target: &ResourceIdentity,
        relationship: &str,
        identities: Vec<ResourceIdentity>,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: BTreeMap<String, Vec<Resource>>,
}

impl Tables {
    fn find(&self, type_name: &str, id: &str) -> Option<&Resource> {
        self.rows
            .get(type_name)?
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
    }

    fn find_mut(&mut self, type_name: &str, id: &str) -> Option<&mut Resource> {
        self.rows
            .get_mut(type_name)?
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(id))
    }

    fn require_mut(&mut self, target: &ResourceIdentity) -> Result<&mut Resource, StoreError> {
        let id = target.id.as_deref().unwrap_or_default();
        self.find_mut(&target.type_name, id)
            .ok_or_else(|| StoreError::NotFound {
                type_name: target.type_name.clone(),
                id: id.to_string(),
            })
    }

    fn check_related(
        &self,
        relationship: &str,
        value: &RelationshipValue,
    ) -> Result<(), StoreError> {
        for identity in value.identities() {
            let id = identity.id.as_deref().unwrap_or_default();
            if self.find(&identity.type_name, id).is_none() {
                return Err(StoreError::RelatedNotFound {
                    type_name: identity.type_name.clone(),
                    id: id.to_string(),
                    relationship: relationship.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Drop every reference to a deleted resource.
    fn detach(&mut self, type_name: &str, id: &str) {
        let matches = |identity: &ResourceIdentity| {
            identity.type_name == type_name && identity.id.as_deref() == Some(id)
        };
        for resource in self.rows.values_mut().flatten() {
            for value in resource.relationships.values_mut() {
                match value {
                    RelationshipValue::ToOne(one) => {
                        if one.as_ref().is_some_and(matches) {
                            *one = None;
                        }
                    }
                    RelationshipValue::ToMany(many) => many.retain(|i| !matches(i)),
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    tables: Tables,
    snapshot: Option<Tables>,
    next_id: u64,
}

/// In-memory [`ResourceStore`] with snapshot transactions.
///
/// A store runs one transaction at a time: `begin` fails with
/// [`StoreError::TransactionInProgress`] until the open one is committed or
/// rolled back.
#[derive(Debug)]
pub struct MemoryStore {
    graph: ResourceGraph,
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new(graph: ResourceGraph) -> Self {
        Self {
            graph,
            state: Mutex::new(StoreState {
                next_id: 1,
                ..StoreState::default()
            }),
        }
    }

    /// Insert resources with their IDs as given, outside any transaction.
    ///
    /// # Errors
    ///
    /// Fails when a resource has no ID or the ID is taken.
    pub async fn seed(&self, resources: Vec<Resource>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for resource in resources {
            let Some(id) = resource.id.clone() else {
                return Err(StoreError::NotFound {
                    type_name: resource.type_name.clone(),
                    id: String::new(),
                });
            };
            if state.tables.find(&resource.type_name, &id).is_some() {
                return Err(StoreError::Conflict {
                    type_name: resource.type_name.clone(),
                    id,
                });
            }
            if let Ok(n) = id.parse::<u64>() {
                state.next_id = state.next_id.max(n + 1);
            }
            let resource = self.with_defaults(resource);
            state
                .tables
                .rows
                .entry(resource.type_name.clone())
                .or_default()
                .push(resource);
        }
        Ok(())
    }

    /// All stored resources of a type, in insertion order.
    pub async fn all(&self, type_name: &str) -> Vec<Resource> {
        let state = self.state.lock().await;
        state
            .tables
            .rows
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Fill unassigned relationships with their empty value.
    fn with_defaults(&self, mut resource: Resource) -> Resource {
        if let Some(resource_type) = self.graph.get(&resource.type_name) {
            for def in &resource_type.relationships {
                resource
                    .relationships
                    .entry(def.name.clone())
                    .or_insert_with(|| {
                        if def.is_to_many() {
                            RelationshipValue::ToMany(Vec::new())
                        } else {
                            RelationshipValue::ToOne(None)
                        }
                    });
            }
        }
        without_lids(resource)
    }

    fn generate_id(&self, type_name: &str, state: &mut StoreState) -> String {
        let id_type = self
            .graph
            .get(type_name)
            .map(|t| t.id_type)
            .unwrap_or_default();
        match id_type {
            IdType::Uuid => uuid::Uuid::new_v4().to_string(),
            IdType::Integer | IdType::String => {
                let id = state.next_id;
                state.next_id += 1;
                id.to_string()
            }
        }
    }
}

/// Stored references only keep server IDs.
fn without_lids(mut resource: Resource) -> Resource {
    for value in resource.relationships.values_mut() {
        for identity in value.identities_mut() {
            identity.lid = None;
        }
    }
    resource
}

fn strip_lids(identities: Vec<ResourceIdentity>) -> Vec<ResourceIdentity> {
    identities
        .into_iter()
        .map(|identity| ResourceIdentity {
            lid: None,
            ..identity
        })
        .collect()
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn begin(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.snapshot.is_some() {
            return Err(StoreError::TransactionInProgress);
        }
        state.snapshot = Some(state.tables.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.snapshot.take().ok_or(StoreError::NoTransaction)?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let snapshot = state.snapshot.take().ok_or(StoreError::NoTransaction)?;
        state.tables = snapshot;
        Ok(())
    }

    async fn get(&self, type_name: &str, id: &str) -> Result<Option<Resource>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tables.find(type_name, id).cloned())
    }

    async fn create(&self, resource: Resource) -> Result<Resource, StoreError> {
        let mut state = self.state.lock().await;
        for (name, value) in &resource.relationships {
            state.tables.check_related(name, value)?;
        }

        let id = match resource.id.clone() {
            Some(id) => {
                if state.tables.find(&resource.type_name, &id).is_some() {
                    return Err(StoreError::Conflict {
                        type_name: resource.type_name.clone(),
                        id,
                    });
                }
                id
            }
            None => self.generate_id(&resource.type_name, &mut state),
        };

        let mut stored = self.with_defaults(resource);
        stored.id = Some(id);
        trace!(type_name = %stored.type_name, id = ?stored.id, "created resource");
        state
            .tables
            .rows
            .entry(stored.type_name.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, resource: Resource) -> Result<Resource, StoreError> {
        let mut state = self.state.lock().await;
        for (name, value) in &resource.relationships {
            state.tables.check_related(name, value)?;
        }
        let changes = without_lids(resource);
        let stored = state.tables.require_mut(&changes.identity())?;
        for (name, value) in changes.attributes {
            stored.attributes.insert(name, value);
        }
        for (name, value) in changes.relationships {
            stored.relationships.insert(name, value);
        }
        Ok(stored.clone())
    }

    async fn delete(&self, type_name: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let not_found = || StoreError::NotFound {
            type_name: type_name.to_string(),
            id: id.to_string(),
        };
        let rows = state.tables.rows.get_mut(type_name).ok_or_else(not_found)?;
        let position = rows
            .iter()
            .position(|r| r.id.as_deref() == Some(id))
            .ok_or_else(not_found)?;
        rows.remove(position);
        state.tables.detach(type_name, id);
        trace!(type_name, id, "deleted resource");
        Ok(())
    }

    async fn set_relationship(
        &self,
        target: &ResourceIdentity,
        relationship: &str,
        value: RelationshipValue,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.tables.check_related(relationship, &value)?;
        let value = match value {
            RelationshipValue::ToOne(one) => {
                RelationshipValue::ToOne(one.map(|i| ResourceIdentity { lid: None, ..i }))
            }
            RelationshipValue::ToMany(many) => RelationshipValue::ToMany(strip_lids(many)),
        };
        let stored = state.tables.require_mut(target)?;
        stored.relationships.insert(relationship.to_string(), value);
        Ok(())
    }

    async fn add_to_relationship(
        &self,
        target: &ResourceIdentity,
        relationship: &str,
        identities: Vec<ResourceIdentity>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let identities = strip_lids(identities);
        state
            .tables
            .check_related(relationship, &RelationshipValue::ToMany(identities.clone()))?;
        let stored = state.tables.require_mut(target)?;
        let entry = stored
            .relationships
            .entry(relationship.to_string())
            .or_insert_with(|| RelationshipValue::ToMany(Vec::new()));
        if let RelationshipValue::ToMany(many) = entry {
            for identity in identities {
                if !many.contains(&identity) {
                    many.push(identity);
                }
            }
        }
        Ok(())
    }

    async fn remove_from_relationship(
        &self,
        target: &ResourceIdentity,
        relationship: &str,
        identities: Vec<ResourceIdentity>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let identities = strip_lids(identities);
        let stored = state.tables.require_mut(target)?;
        if let Some(RelationshipValue::ToMany(many)) = stored.relationships.get_mut(relationship) {
            many.retain(|identity| !identities.contains(identity));
        }
        Ok(())
    }
}
