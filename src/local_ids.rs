//! Local ID resolution for one atomic operations request.
//!
//! A local ID is declared by the `add` operation that creates its resource,
//! assigned once that resource has a server ID, and may then be resolved by
//! any later operation. A tracker is created per request and dropped with it.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{ApiError, ErrorKind};
use crate::model::{OperationIntent, ResourceIdentity};
use crate::types::WriteOperationKind;

#[derive(Debug, Clone)]
struct LocalIdEntry {
    type_name: String,
    server_id: Option<String>,
}

/// Maps local IDs to the resource type that declared them and, once known,
/// the server-assigned ID.
#[derive(Debug, Default)]
pub struct LocalIdTracker {
    entries: HashMap<String, LocalIdEntry>,
}

impl LocalIdTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local ID without a value.
    ///
    /// # Errors
    ///
    /// Fails when the same local ID was declared earlier in the request.
    pub fn declare(&mut self, lid: &str, type_name: &str) -> Result<(), ErrorKind> {
        if self.entries.contains_key(lid) {
            return Err(ErrorKind::DuplicateLocalId { lid: lid.into() });
        }
        trace!(lid, type_name, "declared local ID");
        self.entries.insert(
            lid.to_string(),
            LocalIdEntry {
                type_name: type_name.to_string(),
                server_id: None,
            },
        );
        Ok(())
    }

    /// Store the server-generated ID for a declared local ID.
    ///
    /// # Errors
    ///
    /// Fails on a type mismatch. Assigning an undeclared or already assigned
    /// local ID is an internal error.
    pub fn assign(&mut self, lid: &str, type_name: &str, id: &str) -> Result<(), ErrorKind> {
        let Some(entry) = self.entries.get_mut(lid) else {
            return Err(ErrorKind::Fatal {
                detail: format!("Local ID '{}' was assigned without being declared.", lid),
            });
        };
        if entry.type_name != type_name {
            return Err(ErrorKind::IncompatibleLocalIdType {
                lid: lid.into(),
                declared: entry.type_name.clone(),
                actual: type_name.into(),
            });
        }
        if entry.server_id.is_some() {
            return Err(ErrorKind::Fatal {
                detail: format!("Local ID '{}' was already assigned.", lid),
            });
        }
        trace!(lid, type_name, id, "assigned local ID");
        entry.server_id = Some(id.to_string());
        Ok(())
    }

    /// Look up the server ID behind a local ID.
    ///
    /// # Errors
    ///
    /// Fails when the local ID is unknown at this point (including forward
    /// references), belongs to another type, or is declared but not yet
    /// assigned because it is used by its own defining operation.
    pub fn resolve(&self, lid: &str, type_name: &str) -> Result<&str, ErrorKind> {
        let Some(entry) = self.entries.get(lid) else {
            return Err(ErrorKind::UnknownLocalId { lid: lid.into() });
        };
        if entry.type_name != type_name {
            return Err(ErrorKind::IncompatibleLocalIdType {
                lid: lid.into(),
                declared: entry.type_name.clone(),
                actual: type_name.into(),
            });
        }
        entry
            .server_id
            .as_deref()
            .ok_or_else(|| ErrorKind::LocalIdSingleOperation { lid: lid.into() })
    }

    /// Fill in the server ID of an identity that only carries a local ID.
    pub fn resolve_identity(&self, identity: &mut ResourceIdentity) -> Result<(), ErrorKind> {
        if let Some(lid) = identity.unresolved_lid() {
            let id = self.resolve(lid, &identity.type_name)?.to_string();
            identity.id = Some(id);
        }
        Ok(())
    }

    /// Resolve every local ID an operation reads.
    ///
    /// The primary resource of a create is the declaring side and is left
    /// alone; everything else, including relationship data, is resolved.
    pub fn resolve_intent(&self, intent: &mut OperationIntent) -> Result<(), ErrorKind> {
        if intent.kind != WriteOperationKind::CreateResource {
            let mut identity = intent.resource.identity();
            self.resolve_identity(&mut identity)?;
            intent.resource.id = identity.id;
        }
        for value in intent.resource.relationships.values_mut() {
            for identity in value.identities_mut() {
                self.resolve_identity(identity)?;
            }
        }
        Ok(())
    }
}

/// Checks local ID usage across a batch before anything executes.
///
/// Operations are fed in array order. Declared IDs receive a placeholder
/// value so that later operations resolve them, while uses inside the
/// declaring operation still fail.
#[derive(Debug, Default)]
pub struct LocalIdValidator {
    tracker: LocalIdTracker,
}

impl LocalIdValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate one operation.
    ///
    /// # Errors
    ///
    /// Returns the local ID failure, pointing at the operation when it is
    /// part of a batch.
    pub fn validate(&mut self, intent: &OperationIntent) -> Result<(), ApiError> {
        self.check(intent).map_err(|kind| {
            let error = kind.without_pointer();
            match intent.index {
                Some(index) => error.in_operation(index),
                None => error,
            }
        })
    }

    fn check(&mut self, intent: &OperationIntent) -> Result<(), ErrorKind> {
        let resource = &intent.resource;
        let declared = match (&intent.kind, &resource.lid) {
            (WriteOperationKind::CreateResource, Some(lid)) => {
                self.tracker.declare(lid, &resource.type_name)?;
                Some(lid)
            }
            _ => None,
        };

        let mut staged = intent.clone();
        self.tracker.resolve_intent(&mut staged)?;

        if let Some(lid) = declared {
            self.tracker
                .assign(lid, &resource.type_name, &placeholder_id(lid))?;
        }
        Ok(())
    }

    /// Validate a whole batch, stopping at the first failure.
    pub fn validate_all(intents: &[OperationIntent]) -> Result<(), ApiError> {
        let mut validator = Self::new();
        intents.iter().try_for_each(|intent| validator.validate(intent))
    }
}

fn placeholder_id(lid: &str) -> String {
    format!("(lid:{})", lid)
}
