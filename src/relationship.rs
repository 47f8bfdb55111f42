//! Relationship data adapter: checks a `data` member against a relationship
//! declaration and converts it to a [`RelationshipValue`].

use crate::error::{ApiError, ErrorKind};
use crate::graph::{RelationshipDef, ResourceGraph};
use crate::model::{RelationshipValue, ResourceIdentity};
use crate::objects::{RelationshipObject, ResourceIdentifierObject, SingleOrManyData};
use crate::resource_object::{check_identity, IdPresence, IdentityRules};

#[derive(Debug, Clone, Copy)]
pub struct RelationshipDataAdapter<'g> {
    graph: &'g ResourceGraph,
}

impl<'g> RelationshipDataAdapter<'g> {
    pub fn new(graph: &'g ResourceGraph) -> Self {
        Self { graph }
    }

    /// Convert relationship data found in the relationship object at `path`.
    ///
    /// Errors point at `{path}/data` or at the offending array element.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` when `data` is missing, has the wrong
    /// cardinality, holds `null` array elements, or references an identity
    /// that does not fit the relationship.
    pub fn convert(
        &self,
        def: &RelationshipDef,
        data: &SingleOrManyData<ResourceIdentifierObject>,
        path: &str,
        allow_lid: bool,
    ) -> Result<RelationshipValue, ApiError> {
        let data_path = format!("{}/data", path);
        let rules = IdentityRules::new(IdPresence::Required, allow_lid)
            .expect_type(def.target.clone())
            .in_relationship(def.name.clone());

        match (def.is_to_many(), data) {
            (_, SingleOrManyData::Unassigned) => Err(ErrorKind::MissingElement {
                element: "data".into(),
            }
            .at(path)),
            (false, SingleOrManyData::Null) => Ok(RelationshipValue::ToOne(None)),
            (false, SingleOrManyData::One(identifier)) => {
                let identity = self.identity(identifier, &data_path, &rules)?;
                Ok(RelationshipValue::ToOne(Some(identity)))
            }
            (false, SingleOrManyData::Many(_)) => Err(ErrorKind::InvalidElement {
                message: "Expected single data element for to-one relationship.".into(),
                detail: format!("Expected single data element for '{}' relationship.", def.name),
            }
            .at(data_path)),
            (true, SingleOrManyData::Many(items)) => {
                let mut identities = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", data_path, i);
                    let Some(identifier) = item else {
                        return Err(ErrorKind::InvalidElement {
                            message: "Expected an object in 'data' array.".into(),
                            detail: "Expected an object, instead of 'null'.".into(),
                        }
                        .at(item_path));
                    };
                    identities.push(self.identity(identifier, &item_path, &rules)?);
                }
                Ok(RelationshipValue::ToMany(identities))
            }
            (true, _) => Err(ErrorKind::InvalidElement {
                message: "Expected data[] element for to-many relationship.".into(),
                detail: format!("Expected data[] element for '{}' relationship.", def.name),
            }
            .at(data_path)),
        }
    }

    fn identity(
        &self,
        identifier: &ResourceIdentifierObject,
        path: &str,
        rules: &IdentityRules,
    ) -> Result<ResourceIdentity, ApiError> {
        let resource_type = check_identity(
            self.graph,
            identifier.type_name.as_deref(),
            identifier.id.as_deref(),
            identifier.lid.as_deref(),
            path,
            rules,
        )?;
        Ok(ResourceIdentity {
            type_name: resource_type.name.clone(),
            id: identifier.id.get().cloned(),
            lid: identifier.lid.get().cloned(),
        })
    }

    /// Response form of a relationship value.
    pub fn to_object(value: &RelationshipValue) -> RelationshipObject {
        let data = match value {
            RelationshipValue::ToOne(None) => SingleOrManyData::Null,
            RelationshipValue::ToOne(Some(identity)) => SingleOrManyData::One(identity.into()),
            RelationshipValue::ToMany(identities) => {
                SingleOrManyData::Many(identities.iter().map(|i| Some(i.into())).collect())
            }
        };
        RelationshipObject {
            data,
            ..RelationshipObject::default()
        }
    }
}
