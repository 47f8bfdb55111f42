//! Reading and writing of `data` members that hold one item or many.
//!
//! Reading is tolerant: `null` elements inside an array are kept as `None`
//! so the relationship adapter can report them with a precise pointer.
//! Writing only emits what was assigned.

use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::ReadError;
use crate::objects::SingleOrManyData;
use crate::reader::{begin_array, JsonValueKind};

/// Read an optional `data` member located at `path`.
///
/// # Errors
///
/// Returns `ReadError::ExpectedObject` when the member is a primitive, or any
/// error returned by `read_item`.
pub fn read<'a, T>(
    raw: Option<&'a RawValue>,
    path: &str,
    mut read_item: impl FnMut(&'a RawValue, &str) -> Result<T, ReadError>,
) -> Result<SingleOrManyData<T>, ReadError> {
    let Some(raw) = raw else {
        return Ok(SingleOrManyData::Unassigned);
    };

    match JsonValueKind::of(raw) {
        JsonValueKind::Null => Ok(SingleOrManyData::Null),
        JsonValueKind::Object => read_item(raw, path).map(SingleOrManyData::One),
        JsonValueKind::Array => {
            let elements = begin_array(raw, path)?;
            let mut items = Vec::with_capacity(elements.len());
            for (i, element) in elements.into_iter().enumerate() {
                if JsonValueKind::of(element) == JsonValueKind::Null {
                    items.push(None);
                } else {
                    items.push(Some(read_item(element, &format!("{}[{}]", path, i))?));
                }
            }
            Ok(SingleOrManyData::Many(items))
        }
        other => Err(ReadError::ExpectedObject {
            path: path.to_string(),
            actual: other.to_string(),
        }),
    }
}

/// Write a `data` member. Returns `None` when it must be omitted.
pub fn write<T>(data: &SingleOrManyData<T>, write_item: impl Fn(&T) -> Value) -> Option<Value> {
    match data {
        SingleOrManyData::Unassigned => None,
        SingleOrManyData::Null => Some(Value::Null),
        SingleOrManyData::One(item) => Some(write_item(item)),
        SingleOrManyData::Many(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| item.as_ref().map(&write_item).unwrap_or(Value::Null))
                .collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{parse_root, to_value, TokenReader};
    use serde_json::json;

    fn read_data(json: &str) -> Result<SingleOrManyData<Value>, ReadError> {
        let root = parse_root(json).unwrap();
        let reader = TokenReader::begin_object(root, "").unwrap();
        read(reader.peek_member("data"), "/data", |raw, _| to_value(raw))
    }

    #[test]
    fn absent_member_is_unassigned() {
        assert_eq!(read_data("{}").unwrap(), SingleOrManyData::Unassigned);
    }

    #[test]
    fn explicit_null_is_assigned() {
        let data = read_data(r#"{"data": null}"#).unwrap();
        assert_eq!(data, SingleOrManyData::Null);
        assert!(data.is_assigned());
    }

    #[test]
    fn single_object() {
        assert_eq!(
            read_data(r#"{"data": {"type": "people"}}"#).unwrap(),
            SingleOrManyData::One(json!({"type": "people"}))
        );
    }

    #[test]
    fn null_elements_are_preserved() {
        assert_eq!(
            read_data(r#"{"data": [{"id": "1"}, null]}"#).unwrap(),
            SingleOrManyData::Many(vec![Some(json!({"id": "1"})), None])
        );
    }

    #[test]
    fn element_paths_are_indexed() {
        let root = parse_root(r#"{"data": [{}, {}]}"#).unwrap();
        let reader = TokenReader::begin_object(root, "").unwrap();
        let mut paths = Vec::new();
        read(reader.peek_member("data"), "/data", |_, path| {
            paths.push(path.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(paths, vec!["/data[0]", "/data[1]"]);
    }

    #[test]
    fn primitive_is_rejected() {
        let err = read_data(r#"{"data": 42}"#).unwrap_err();
        assert!(matches!(err, ReadError::ExpectedObject { ref actual, .. } if actual == "Number"));
    }

    #[test]
    fn write_omits_unassigned() {
        let data: SingleOrManyData<Value> = SingleOrManyData::Unassigned;
        assert_eq!(write(&data, Clone::clone), None);
        let data: SingleOrManyData<Value> = SingleOrManyData::Null;
        assert_eq!(write(&data, Clone::clone), Some(Value::Null));
        let data = SingleOrManyData::Many(vec![Some(json!(1)), None]);
        assert_eq!(write(&data, Clone::clone), Some(json!([1, null])));
    }
}
