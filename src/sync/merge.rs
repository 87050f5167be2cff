//! Schema-driven deep merge of a stored document with an incoming update.
//!
//! Subform lists are merged entry by entry so that an update touching one
//! entry neither duplicates it nor drops the entries it does not mention.

use serde_json::{Map, Value};

use super::schema::{FieldKind, KeyedList, Schema, DEFAULT_ITEM_KEY};

/// Merge `incoming` onto `target` using `schema` for field classification.
///
/// Both values are usually mappings; any other combination resolves to
/// `incoming`.
#[must_use]
pub fn merge(target: Value, incoming: Value, schema: &Schema) -> Value {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            Value::Object(merge_object(target, incoming, schema))
        },
        (_, incoming) => incoming,
    }
}

fn merge_object(
    mut target: Map<String, Value>,
    incoming: Map<String, Value>,
    schema: &Schema,
) -> Map<String, Value> {
    for (name, value) in incoming {
        let merged = match target.remove(&name) {
            Some(prev) => merge_field(prev, value, schema.kind_of(&name)),
            None => value,
        };
        target.insert(name, merged);
    }
    target
}

fn merge_field(target: Value, incoming: Value, kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Scalar => incoming,
        FieldKind::Deep => deep_merge(target, incoming),
        FieldKind::Mapping(schema) => merge(target, incoming, schema),
        FieldKind::PlainList => match (target, incoming) {
            (Value::Array(target), Value::Array(incoming)) => concat(target, incoming),
            (_, incoming) => incoming,
        },
        FieldKind::KeyedList(list) => match (target, incoming) {
            (Value::Array(target), Value::Array(incoming)) => {
                Value::Array(merge_keyed(target, incoming, list))
            },
            (_, incoming) => incoming,
        },
    }
}

/// Merge with no declared schema: mappings recurse, subform lists merge by
/// `unique_id`, other lists append.
fn deep_merge(target: Value, incoming: Value) -> Value {
    match (target, incoming) {
        (Value::Object(mut target), Value::Object(incoming)) => {
            for (name, value) in incoming {
                let merged = match target.remove(&name) {
                    Some(prev) => deep_merge(prev, value),
                    None => value,
                };
                target.insert(name, merged);
            }
            Value::Object(target)
        },
        (Value::Array(target), Value::Array(incoming)) if is_subform_list(&incoming) => {
            Value::Array(merge_keyed(target, incoming, &KeyedList::default()))
        },
        (Value::Array(target), Value::Array(incoming)) => concat(target, incoming),
        (_, incoming) => incoming,
    }
}

/// A non-empty list whose entries are all mappings carrying a `unique_id`.
fn is_subform_list(items: &[Value]) -> bool {
    !items.is_empty()
        && items
            .iter()
            .all(|item| item.is_object() && item_key(item, DEFAULT_ITEM_KEY).is_some())
}

fn concat(mut target: Vec<Value>, incoming: Vec<Value>) -> Value {
    target.extend(incoming);
    Value::Array(target)
}

fn merge_keyed(mut target: Vec<Value>, incoming: Vec<Value>, list: &KeyedList) -> Vec<Value> {
    for item in incoming {
        let position = item_key(&item, &list.key)
            .and_then(|key| target.iter().position(|t| item_key(t, &list.key) == Some(key)));

        match position {
            Some(index) => {
                let prev = std::mem::take(&mut target[index]);
                target[index] = merge(prev, item, &list.item);
            },
            None => target.push(item),
        }
    }
    target
}

fn item_key<'a>(item: &'a Value, key: &str) -> Option<&'a Value> {
    item.get(key).filter(|k| !k.is_null())
}
