//! Wire-level JSON:API objects, as read from or written to documents.
//!
//! These mirror the document structure one-to-one. Members whose omission
//! and explicit `null` mean different things are a [`Member`] (or
//! [`SingleOrManyData`] for `data`), so both survive a read and write.

use serde_json::Value;

use crate::error::ErrorObject;
use crate::reader::JsonValueKind;

/// An object member that was omitted, sent as `null`, or set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Member<T> {
    #[default]
    Omitted,
    Null,
    Set(T),
}

impl<T> Member<T> {
    /// A member that appeared in the input; `None` is its `null`.
    pub fn present(value: Option<T>) -> Self {
        match value {
            Some(value) => Member::Set(value),
            None => Member::Null,
        }
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Member::Set(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Member::Set(_))
    }
}

impl Member<String> {
    pub fn as_deref(&self) -> Option<&str> {
        self.get().map(String::as_str)
    }
}

/// `None` is an omitted member.
impl<T> From<Option<T>> for Member<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Member::Omitted, Member::Set)
    }
}

/// A `data` member: absent, `null`, one item, or an array of items.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SingleOrManyData<T> {
    /// Member omitted. Leaves the target untouched.
    #[default]
    Unassigned,
    /// Explicit `null`. Clears the target.
    Null,
    One(T),
    /// Array form. `null` elements are kept as `None`.
    Many(Vec<Option<T>>),
}

impl<T> SingleOrManyData<T> {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, SingleOrManyData::Unassigned)
    }

    /// JSON kind of the member, for error details.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SingleOrManyData::Unassigned => "undefined",
            SingleOrManyData::Null => "null",
            SingleOrManyData::One(_) => "object",
            SingleOrManyData::Many(_) => "array",
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> SingleOrManyData<U> {
        match self {
            SingleOrManyData::Unassigned => SingleOrManyData::Unassigned,
            SingleOrManyData::Null => SingleOrManyData::Null,
            SingleOrManyData::One(item) => SingleOrManyData::One(f(item)),
            SingleOrManyData::Many(items) => {
                SingleOrManyData::Many(items.into_iter().map(|i| i.map(&mut f)).collect())
            }
        }
    }
}

/// Marker for an attribute value that did not convert to its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonInvalidAttributeInfo {
    pub attribute: String,
    /// JSON text exactly as sent.
    pub raw: String,
    /// Declared type name, e.g. `Integer?`.
    pub target_type: String,
    pub kind: JsonValueKind,
}

/// Slot of an attribute in a resource object.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Value(Value),
    Invalid(JsonInvalidAttributeInfo),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceIdentifierObject {
    pub type_name: Option<String>,
    pub id: Member<String>,
    pub lid: Member<String>,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationshipObject {
    pub data: SingleOrManyData<ResourceIdentifierObject>,
    pub links: Option<Value>,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceObject {
    pub type_name: Option<String>,
    pub id: Member<String>,
    pub lid: Member<String>,
    pub attributes: Member<Vec<(String, AttributeValue)>>,
    pub relationships: Member<Vec<(String, RelationshipObject)>>,
    pub links: Option<Value>,
    pub meta: Option<Value>,
}

impl ResourceObject {
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .get()?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipObject> {
        self.relationships
            .get()?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    /// Identity-only projection, used where a full resource object was
    /// accepted in place of an identifier.
    pub fn to_identifier(&self) -> ResourceIdentifierObject {
        ResourceIdentifierObject {
            type_name: self.type_name.clone(),
            id: self.id.clone(),
            lid: self.lid.clone(),
            meta: self.meta.clone(),
        }
    }
}

/// Operation code of an atomic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicOperationCode {
    Add,
    Update,
    Remove,
}

impl AtomicOperationCode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(AtomicOperationCode::Add),
            "update" => Some(AtomicOperationCode::Update),
            "remove" => Some(AtomicOperationCode::Remove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AtomicOperationCode::Add => "add",
            AtomicOperationCode::Update => "update",
            AtomicOperationCode::Remove => "remove",
        }
    }
}

/// `ref` member of an atomic operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AtomicReference {
    pub type_name: Option<String>,
    pub id: Option<String>,
    pub lid: Option<String>,
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AtomicOperationObject {
    /// Raw `op` value; checked by the operation adapter.
    pub op: Option<String>,
    pub reference: Option<AtomicReference>,
    pub href: Option<String>,
    pub data: SingleOrManyData<ResourceObject>,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AtomicResultObject {
    pub data: SingleOrManyData<ResourceObject>,
    pub meta: Option<Value>,
}

/// Top-level document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub jsonapi: Option<Value>,
    pub links: Option<Value>,
    pub data: SingleOrManyData<ResourceObject>,
    pub operations: Option<Vec<AtomicOperationObject>>,
    pub results: Option<Vec<AtomicResultObject>>,
    pub errors: Option<Vec<ErrorObject>>,
    pub meta: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_is_default() {
        let data: SingleOrManyData<ResourceObject> = SingleOrManyData::default();
        assert!(!data.is_assigned());
        assert!(SingleOrManyData::<ResourceObject>::Null.is_assigned());
    }

    #[test]
    fn map_preserves_null_elements() {
        let data = SingleOrManyData::Many(vec![Some(1), None, Some(3)]);
        assert_eq!(
            data.map(|n| n * 2),
            SingleOrManyData::Many(vec![Some(2), None, Some(6)])
        );
    }

    #[test]
    fn member_presence() {
        assert_eq!(Member::<String>::default(), Member::Omitted);
        assert_eq!(Member::present(None::<String>), Member::Null);
        assert_eq!(Member::from(None::<String>), Member::Omitted);
        let id = Member::from(Some("1".to_string()));
        assert!(id.is_set());
        assert_eq!(id.as_deref(), Some("1"));
        assert_eq!(Member::<String>::Null.get(), None);
    }

    #[test]
    fn operation_codes() {
        assert_eq!(AtomicOperationCode::parse("add"), Some(AtomicOperationCode::Add));
        assert_eq!(AtomicOperationCode::parse("ADD"), None);
        assert_eq!(AtomicOperationCode::Remove.as_str(), "remove");
    }
}
