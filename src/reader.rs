//! Low-level token reading over borrowed JSON text.
//!
//! A [`TokenReader`] walks the members of one JSON object in document order.
//! Member values stay unparsed (`&RawValue` slices of the request body) until
//! a caller decides how to interpret them, which lets the resource object
//! adapter look ahead for `type` before touching `attributes`.
//!
//! The reader never fails on data-shape problems of attribute values. Its
//! only errors are malformed JSON, a container of the wrong kind where the
//! document structure demands one, and identifiers that are not strings.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::ReadError;

/// Kind of a JSON value, named the way error details present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonValueKind {
    Object,
    Array,
    String,
    Number,
    True,
    False,
    Null,
}

impl JsonValueKind {
    pub fn of(raw: &RawValue) -> Self {
        match raw.get().trim_start().as_bytes().first() {
            Some(b'{') => JsonValueKind::Object,
            Some(b'[') => JsonValueKind::Array,
            Some(b'"') => JsonValueKind::String,
            Some(b't') => JsonValueKind::True,
            Some(b'f') => JsonValueKind::False,
            Some(b'n') => JsonValueKind::Null,
            _ => JsonValueKind::Number,
        }
    }
}

impl fmt::Display for JsonValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonValueKind::Object => "Object",
            JsonValueKind::Array => "Array",
            JsonValueKind::String => "String",
            JsonValueKind::Number => "Number",
            JsonValueKind::True => "True",
            JsonValueKind::False => "False",
            JsonValueKind::Null => "Null",
        };
        f.write_str(name)
    }
}

/// Escape a member name for use as a JSON Pointer segment.
pub fn pointer_segment(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

/// Parse a request body into its root value without materializing it.
///
/// # Errors
///
/// Returns `ReadError::InvalidJson` if the text isn't valid JSON.
pub fn parse_root(json: &str) -> Result<&RawValue, ReadError> {
    serde_json::from_str(json).map_err(|source| ReadError::InvalidJson { source })
}

struct Members<'a>(Vec<(String, &'a RawValue)>);

impl<'de: 'a, 'a> Deserialize<'de> for Members<'a> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MembersVisitor<'a>(PhantomData<&'a ()>);

        impl<'de: 'a, 'a> Visitor<'de> for MembersVisitor<'a> {
            type Value = Members<'a>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut members = Vec::new();
                while let Some(name) = map.next_key::<String>()? {
                    let value: &'a RawValue = map.next_value()?;
                    members.push((name, value));
                }
                Ok(Members(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor(PhantomData))
    }
}

/// Forward-only cursor over the members of one JSON object.
///
/// Cloning is cheap and yields an independent position, which is how
/// [`TokenReader::peek_member`] looks ahead without consuming anything.
#[derive(Debug, Clone)]
pub struct TokenReader<'a> {
    members: Rc<[(String, &'a RawValue)]>,
    position: usize,
    path: Rc<str>,
}

impl<'a> TokenReader<'a> {
    /// Start reading an object located at `path` (relative JSON Pointer).
    ///
    /// # Errors
    ///
    /// Returns `ReadError::ExpectedObject` when the value is not an object.
    pub fn begin_object(raw: &'a RawValue, path: &str) -> Result<Self, ReadError> {
        let kind = JsonValueKind::of(raw);
        if kind != JsonValueKind::Object {
            return Err(ReadError::ExpectedObject {
                path: path.to_string(),
                actual: kind.to_string(),
            });
        }
        let Members(members) =
            serde_json::from_str(raw.get()).map_err(|source| ReadError::InvalidJson { source })?;
        Ok(Self {
            members: members.into(),
            position: 0,
            path: path.into(),
        })
    }

    /// Pointer of the object being read.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Pointer of a member of the object being read.
    pub fn member_path(&self, name: &str) -> String {
        format!("{}/{}", self.path, pointer_segment(name))
    }

    /// Advance to the next member.
    pub fn next_member(&mut self) -> Option<(String, &'a RawValue)> {
        let (name, value) = self.members.get(self.position)?;
        self.position += 1;
        Some((name.clone(), *value))
    }

    /// Find a member at or after the current position without advancing.
    pub fn peek_member(&self, name: &str) -> Option<&'a RawValue> {
        let mut probe = self.clone();
        while let Some((member, value)) = probe.next_member() {
            if member == name {
                return Some(value);
            }
        }
        None
    }
}

/// Split a JSON array into its raw elements.
///
/// # Errors
///
/// Returns `ReadError::ExpectedArray` when the value is not an array.
pub fn begin_array<'a>(raw: &'a RawValue, path: &str) -> Result<Vec<&'a RawValue>, ReadError> {
    let kind = JsonValueKind::of(raw);
    if kind != JsonValueKind::Array {
        return Err(ReadError::ExpectedArray {
            path: path.to_string(),
            actual: kind.to_string(),
        });
    }
    serde_json::from_str(raw.get()).map_err(|source| ReadError::InvalidJson { source })
}

/// Read a string member; `null` reads as `None`.
///
/// # Errors
///
/// Returns `ReadError::ExpectedString` for any other JSON kind. Numbers are
/// not coerced: `"id": 1` is rejected rather than silently read as `"1"`.
pub fn read_string(raw: &RawValue, element: &str, path: &str) -> Result<Option<String>, ReadError> {
    match JsonValueKind::of(raw) {
        JsonValueKind::Null => Ok(None),
        JsonValueKind::String => serde_json::from_str(raw.get())
            .map(Some)
            .map_err(|source| ReadError::InvalidJson { source }),
        other => Err(ReadError::ExpectedString {
            element: element.to_string(),
            path: path.to_string(),
            actual: other.to_string(),
            raw: raw.get().trim().to_string(),
        }),
    }
}

/// Materialize a raw value.
pub fn to_value(raw: &RawValue) -> Result<Value, ReadError> {
    serde_json::from_str(raw.get()).map_err(|source| ReadError::InvalidJson { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_in_document_order() {
        let root = parse_root(r#"{"b": 1, "a": [true], "c": {"x": null}}"#).unwrap();
        let mut reader = TokenReader::begin_object(root, "").unwrap();
        let names: Vec<String> = std::iter::from_fn(|| reader.next_member())
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn peek_does_not_consume() {
        let root = parse_root(r#"{"attributes": {"x": 1}, "type": "people"}"#).unwrap();
        let mut reader = TokenReader::begin_object(root, "/data").unwrap();

        let type_value = reader.peek_member("type").unwrap();
        assert_eq!(type_value.get(), r#""people""#);

        let (first, value) = reader.next_member().unwrap();
        assert_eq!(first, "attributes");
        assert_eq!(JsonValueKind::of(value), JsonValueKind::Object);
    }

    #[test]
    fn peek_only_looks_forward() {
        let root = parse_root(r#"{"type": "people", "id": "1"}"#).unwrap();
        let mut reader = TokenReader::begin_object(root, "").unwrap();
        reader.next_member();
        assert!(reader.peek_member("type").is_none());
        assert!(reader.peek_member("id").is_some());
    }

    #[test]
    fn begin_object_rejects_arrays() {
        let root = parse_root("[1, 2]").unwrap();
        let err = TokenReader::begin_object(root, "/data").unwrap_err();
        assert!(matches!(err, ReadError::ExpectedObject { ref actual, .. } if actual == "Array"));
        assert_eq!(err.path(), "/data");
    }

    #[test]
    fn read_string_rejects_numbers() {
        let root = parse_root(r#"{"id": 12}"#).unwrap();
        let reader = TokenReader::begin_object(root, "/data").unwrap();
        let raw = reader.peek_member("id").unwrap();
        let err = read_string(raw, "id", "/data/id").unwrap_err();
        match err {
            ReadError::ExpectedString { actual, raw, .. } => {
                assert_eq!(actual, "Number");
                assert_eq!(raw, "12");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn read_string_null_is_none() {
        let root = parse_root(r#"{"id": null}"#).unwrap();
        let reader = TokenReader::begin_object(root, "").unwrap();
        assert_eq!(
            read_string(reader.peek_member("id").unwrap(), "id", "/id").unwrap(),
            None
        );
    }

    #[test]
    fn array_elements_stay_raw() {
        let root = parse_root(r#"[{"a": 1}, null, "x"]"#).unwrap();
        let items = begin_array(root, "/data").unwrap();
        let kinds: Vec<JsonValueKind> = items.iter().map(|r| JsonValueKind::of(r)).collect();
        assert_eq!(
            kinds,
            vec![
                JsonValueKind::Object,
                JsonValueKind::Null,
                JsonValueKind::String
            ]
        );
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            parse_root(r#"{"data": "#),
            Err(ReadError::InvalidJson { .. })
        ));
    }

    #[test]
    fn pointer_segments_are_escaped() {
        assert_eq!(pointer_segment("a/b~c"), "a~1b~0c");
    }
}
