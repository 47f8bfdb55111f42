use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::error::StoreError;
use crate::model::{RelationshipValue, Resource, ResourceIdentity};
use crate::store::ResourceStore;

/// Handle of a resource instance inside a [`ResourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    resource: Resource,
    edges: BTreeMap<String, Vec<NodeId>>,
}

/// Loaded resource instances and the relationship edges between them.
///
/// Instances are identified by their node, not by type and ID, so a graph
/// may hold shared instances and cycles.
#[derive(Debug, Clone, Default)]
pub struct ResourceArena {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: Resource) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            resource,
            edges: BTreeMap::new(),
        });
        id
    }

    pub fn add_root(&mut self, node: NodeId) {
        if !self.roots.contains(&node) {
            self.roots.push(node);
        }
    }

    /// Record that `from` references `to` through `relationship`.
    pub fn link(&mut self, from: NodeId, relationship: &str, to: NodeId) {
        let targets = self.nodes[from.0]
            .edges
            .entry(relationship.to_string())
            .or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn resource(&self, node: NodeId) -> &Resource {
        &self.nodes[node.0].resource
    }

    pub fn resource_mut(&mut self, node: NodeId) -> &mut Resource {
        &mut self.nodes[node.0].resource
    }

    /// Outgoing edges, by relationship name.
    pub fn edges(&self, node: NodeId) -> impl Iterator<Item = (&str, &[NodeId])> {
        self.nodes[node.0]
            .edges
            .iter()
            .map(|(name, targets)| (name.as_str(), targets.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root resources still attached.
    pub fn root_resources(&self) -> Vec<&Resource> {
        self.roots.iter().map(|&id| self.resource(id)).collect()
    }

    /// Remove instances from the roots and from every relationship edge.
    ///
    /// The relationship values of the owning resources are updated as well,
    /// so a detached instance no longer shows up in their data.
    pub fn detach(&mut self, removed: &HashSet<NodeId>) {
        if removed.is_empty() {
            return;
        }
        self.roots.retain(|id| !removed.contains(id));

        let removed_identities: Vec<ResourceIdentity> = removed
            .iter()
            .map(|&id| self.resource(id).identity())
            .collect();

        for node in &mut self.nodes {
            let mut touched = Vec::new();
            for (name, targets) in node.edges.iter_mut() {
                let before = targets.len();
                targets.retain(|id| !removed.contains(id));
                if targets.len() != before {
                    touched.push(name.clone());
                }
            }
            for name in touched {
                if let Some(value) = node.resource.relationships.get_mut(&name) {
                    match value {
                        RelationshipValue::ToOne(one) => {
                            if one.as_ref().is_some_and(|i| removed_identities.contains(i)) {
                                *one = None;
                            }
                        }
                        RelationshipValue::ToMany(many) => {
                            many.retain(|i| !removed_identities.contains(i))
                        }
                    }
                }
            }
        }
    }

    /// Load `roots` and everything reachable from them through stored
    /// relationships. Each stored resource becomes exactly one node.
    ///
    /// # Errors
    ///
    /// Propagates store failures. References to missing resources are
    /// skipped.
    pub async fn load(
        roots: Vec<Resource>,
        store: &dyn ResourceStore,
    ) -> Result<Self, StoreError> {
        let mut arena = ResourceArena::new();
        let mut known: HashMap<(String, String), NodeId> = HashMap::new();
        let mut queue = VecDeque::new();

        for resource in roots {
            let key = resource
                .id
                .clone()
                .map(|id| (resource.type_name.clone(), id));
            let existing = key.as_ref().and_then(|k| known.get(k).copied());
            let node = match existing {
                Some(node) => node,
                None => {
                    let node = arena.insert(resource);
                    if let Some(key) = key {
                        known.insert(key, node);
                    }
                    queue.push_back(node);
                    node
                }
            };
            arena.add_root(node);
        }

        while let Some(node) = queue.pop_front() {
            let references: Vec<(String, ResourceIdentity)> = arena
                .resource(node)
                .relationships
                .iter()
                .flat_map(|(name, value)| {
                    value
                        .identities()
                        .into_iter()
                        .map(move |identity| (name.clone(), identity.clone()))
                })
                .collect();

            for (relationship, identity) in references {
                let Some(id) = identity.id.clone() else {
                    continue;
                };
                let key = (identity.type_name.clone(), id.clone());
                let target = match known.get(&key) {
                    Some(&target) => target,
                    None => {
                        let Some(resource) = store.get(&identity.type_name, &id).await? else {
                            continue;
                        };
                        let target = arena.insert(resource);
                        known.insert(key, target);
                        queue.push_back(target);
                        target
                    }
                };
                arena.link(node, &relationship, target);
            }
        }

        Ok(arena)
    }
}
