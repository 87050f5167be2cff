//! Field schemas that drive the merge.
//!
//! Declared fields are classified statically. Undeclared fields fall back to
//! `deep`, which still recognises subform lists by their `unique_id` entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default key identifying a subform entry.
pub const DEFAULT_ITEM_KEY: &str = "unique_id";

/// How a single field is merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Incoming value replaces the stored one.
    Scalar,
    /// Incoming entries are appended after stored entries.
    PlainList,
    /// Mappings recurse, lists of `unique_id` entries merge by key, other
    /// lists concatenate, anything else is replaced.
    Deep,
    /// Nested mapping merged field by field with its own schema.
    Mapping(Schema),
    /// Subform list merged by entry key.
    KeyedList(KeyedList),
}

/// Shape of a subform list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedList {
    /// Field identifying an entry.
    #[serde(default = "default_item_key")]
    pub key: String,
    /// Schema applied when two entries share a key.
    #[serde(default)]
    pub item: Schema,
}

impl Default for KeyedList {
    fn default() -> Self {
        Self {
            key: default_item_key(),
            item: Schema::default(),
        }
    }
}

fn default_item_key() -> String {
    DEFAULT_ITEM_KEY.to_string()
}

fn default_rest() -> Box<FieldKind> {
    Box::new(FieldKind::Deep)
}

/// Field classification for one document shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Declared fields.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldKind>,
    /// Kind used for every undeclared field.
    #[serde(default = "default_rest")]
    pub rest: Box<FieldKind>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            rest: default_rest(),
        }
    }
}

impl Schema {
    /// A schema with no declared fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    /// Declare a subform list keyed by `unique_id`.
    #[must_use]
    pub fn keyed_list(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::KeyedList(KeyedList::default()))
    }

    /// Set the kind of undeclared fields.
    #[must_use]
    pub fn rest(mut self, kind: FieldKind) -> Self {
        self.rest = Box::new(kind);
        self
    }

    /// Kind of the named field.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> &FieldKind {
        self.fields.get(name).unwrap_or(&self.rest)
    }

    /// Derive per-record-type schemas from form definitions.
    ///
    /// Every field of type `subform` becomes a keyed list, both at the top
    /// level of the record and inside its `data` envelope. Forms are grouped
    /// by `parent_form`.
    #[must_use]
    pub fn from_forms(forms: &[Value]) -> BTreeMap<String, Self> {
        let mut subforms: BTreeMap<String, Self> = BTreeMap::new();

        for form in forms {
            let Some(record_type) = form.get("parent_form").and_then(Value::as_str) else {
                continue;
            };
            let Some(fields) = form.get("fields").and_then(Value::as_array) else {
                continue;
            };

            let entry = subforms.entry(record_type.to_string()).or_default();
            for field in fields {
                let is_subform = field.get("type").and_then(Value::as_str) == Some("subform");
                if let (true, Some(name)) = (is_subform, field.get("name").and_then(Value::as_str)) {
                    entry
                        .fields
                        .insert(name.to_string(), FieldKind::KeyedList(KeyedList::default()));
                }
            }
        }

        subforms
            .into_iter()
            .map(|(record_type, subform_fields)| {
                let record = subform_fields
                    .clone()
                    .field("data", FieldKind::Mapping(subform_fields));
                (record_type, record)
            })
            .collect()
    }
}

/// Merge schemas for every collection and record type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    collections: BTreeMap<String, Schema>,
    record_types: BTreeMap<String, Schema>,
    fallback: Schema,
}

impl SchemaRegistry {
    /// Set the schema for a collection.
    pub fn set_collection(&mut self, collection: impl Into<String>, schema: Schema) {
        self.collections.insert(collection.into(), schema);
    }

    /// Set the schema for a record type.
    pub fn set_record_type(&mut self, record_type: impl Into<String>, schema: Schema) {
        self.record_types.insert(record_type.into(), schema);
    }

    /// Add record-type schemas derived from form definitions.
    ///
    /// Fields already declared for a record type keep their declaration.
    pub fn extend_from_forms(&mut self, forms: &[Value]) {
        for (record_type, derived) in Schema::from_forms(forms) {
            let schema = self.record_types.entry(record_type).or_default();
            for (name, kind) in derived.fields {
                schema.fields.entry(name).or_insert(kind);
            }
        }
    }

    /// Schema to merge a document with.
    ///
    /// Record-type schemas win over collection schemas.
    #[must_use]
    pub fn schema_for(&self, collection: &str, record_type: Option<&str>) -> &Schema {
        record_type
            .and_then(|t| self.record_types.get(t))
            .or_else(|| self.collections.get(collection))
            .unwrap_or(&self.fallback)
    }

    /// Names of record types with a declared schema.
    pub fn record_types(&self) -> impl Iterator<Item = &str> {
        self.record_types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_undeclared_fields_use_rest() {
        let schema = Schema::new().field("name", FieldKind::Scalar);
        assert_eq!(schema.kind_of("name"), &FieldKind::Scalar);
        assert_eq!(schema.kind_of("other"), &FieldKind::Deep);

        let strict = Schema::new().rest(FieldKind::Scalar);
        assert_eq!(strict.kind_of("other"), &FieldKind::Scalar);
    }

    #[test]
    fn test_schema_from_yaml() {
        let yaml = r"
fields:
  services_section:
    kind: keyed_list
  tags:
    kind: plain_list
  location:
    kind: mapping
    rest:
      kind: scalar
";
        let schema: Schema = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(
            schema.kind_of("services_section"),
            &FieldKind::KeyedList(KeyedList::default())
        );
        assert_eq!(schema.kind_of("tags"), &FieldKind::PlainList);
        match schema.kind_of("location") {
            FieldKind::Mapping(inner) => assert_eq!(inner.kind_of("x"), &FieldKind::Scalar),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_from_forms() {
        let forms = vec![
            json!({
                "unique_id": "family_details",
                "parent_form": "case",
                "fields": [
                    {"name": "family_details_section", "type": "subform"},
                    {"name": "family_notes", "type": "textarea"}
                ]
            }),
            json!({
                "unique_id": "incident_details",
                "parent_form": "incident",
                "fields": [{"name": "perpetrator_subform_section", "type": "subform"}]
            }),
            json!({"unique_id": "orphan"}),
        ];

        let schemas = Schema::from_forms(&forms);
        assert_eq!(schemas.len(), 2);

        let case = &schemas["case"];
        assert!(matches!(
            case.kind_of("family_details_section"),
            FieldKind::KeyedList(_)
        ));
        assert_eq!(case.kind_of("family_notes"), &FieldKind::Deep);
        match case.kind_of("data") {
            FieldKind::Mapping(data) => assert!(matches!(
                data.kind_of("family_details_section"),
                FieldKind::KeyedList(_)
            )),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_registry_lookup_order() {
        let mut registry = SchemaRegistry::default();
        registry.set_collection("records", Schema::new().rest(FieldKind::Scalar));
        registry.set_record_type("case", Schema::new().keyed_list("services_section"));

        let case = registry.schema_for("records", Some("case"));
        assert!(matches!(case.kind_of("services_section"), FieldKind::KeyedList(_)));

        let incident = registry.schema_for("records", Some("incident"));
        assert_eq!(incident.kind_of("anything"), &FieldKind::Scalar);

        let forms = registry.schema_for("forms", None);
        assert_eq!(forms, &Schema::default());
    }

    #[test]
    fn test_extend_from_forms_keeps_declarations() {
        let mut registry = SchemaRegistry::default();
        registry.set_record_type("case", Schema::new().field("notes_section", FieldKind::PlainList));

        registry.extend_from_forms(&[json!({
            "parent_form": "case",
            "fields": [
                {"name": "notes_section", "type": "subform"},
                {"name": "services_section", "type": "subform"}
            ]
        })]);

        let case = registry.schema_for("records", Some("case"));
        assert_eq!(case.kind_of("notes_section"), &FieldKind::PlainList);
        assert!(matches!(case.kind_of("services_section"), FieldKind::KeyedList(_)));
        assert_eq!(registry.record_types().collect::<Vec<_>>(), vec!["case"]);
    }
}
