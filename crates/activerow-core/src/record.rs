//! The materialized row: a schema-described attribute map.
//!
//! A `Record` tracks current attribute state against the snapshot taken at
//! materialization (or the last successful save), so updates can be
//! restricted to what actually changed. Loaded relations are cached on the
//! record; pivot columns from many-to-many loads are detached into a
//! separate sub-object.

use crate::cipher::AttributeCipher;
use crate::entity::EntityMeta;
use crate::error::Result;
use crate::row::{FromValue, Row};
use crate::value::Value;
use std::collections::BTreeMap;

/// A cached relation slot on a record.
#[derive(Debug, Clone)]
pub enum RelationValue {
    /// Single-record relation (has-one / belongs-to); `None` when absent.
    One(Option<Box<Record>>),
    /// Collection relation (has-many / many-to-many).
    Many(Vec<Record>),
}

/// A materialized row of one entity.
#[derive(Debug, Clone)]
pub struct Record {
    meta: &'static EntityMeta,
    attributes: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    relations: BTreeMap<String, RelationValue>,
    pivot: Option<BTreeMap<String, Value>>,
    exists: bool,
}

impl Record {
    /// Create an unsaved, empty record.
    #[must_use]
    pub fn new(meta: &'static EntityMeta) -> Self {
        Self {
            meta,
            attributes: BTreeMap::new(),
            original: BTreeMap::new(),
            relations: BTreeMap::new(),
            pivot: None,
            exists: false,
        }
    }

    /// Materialize a record from a database row.
    ///
    /// Columns aliased with the `pivot_` prefix are detached into the
    /// record's pivot sub-object. Encrypted columns are decrypted when a
    /// cipher is supplied; without one they pass through untouched.
    pub fn from_row(
        meta: &'static EntityMeta,
        row: &Row,
        cipher: Option<&dyn AttributeCipher>,
    ) -> Result<Self> {
        let mut attributes = BTreeMap::new();
        let mut pivot = BTreeMap::new();

        for (name, value) in row.iter() {
            if let Some(stripped) = name.strip_prefix("pivot_") {
                pivot.insert(stripped.to_string(), value.clone());
                continue;
            }
            let value = match (cipher, value) {
                (Some(cipher), Value::Text(ciphertext)) if meta.is_encrypted(name) => {
                    Value::Text(cipher.decrypt(ciphertext)?)
                }
                _ => value.clone(),
            };
            attributes.insert(name.to_string(), value);
        }

        // The snapshot holds decrypted values so dirty-diffing stays
        // plaintext-level.
        Ok(Self {
            meta,
            original: attributes.clone(),
            attributes,
            relations: BTreeMap::new(),
            pivot: if pivot.is_empty() { None } else { Some(pivot) },
            exists: true,
        })
    }

    /// The entity metadata this record is mapped through.
    #[must_use]
    pub const fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    /// Whether this record is backed by a database row.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.exists
    }

    /// Mark this record as persisted (after a successful insert).
    pub fn mark_persisted(&mut self) {
        self.exists = true;
    }

    /// Mark this record as deleted. Terminal.
    pub fn mark_deleted(&mut self) {
        self.exists = false;
    }

    /// Get an attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Get an attribute converted to a concrete type.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<T> {
        let value = self.attributes.get(key).unwrap_or(&Value::Null);
        T::from_value(value)
    }

    /// Set an attribute value directly, bypassing the whitelist.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Iterate over current attributes.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Mass-assign attributes through the whitelist.
    ///
    /// Each value is sanitized before storage: strings are trimmed and an
    /// empty string coerces to NULL. Keys missing from the whitelist are
    /// skipped. On the first touch of a key its pre-fill value, if any, is
    /// preserved in the original snapshot so dirty-diffing compares
    /// against what the record held before the fill.
    pub fn fill(&mut self, attrs: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in attrs {
            if !self.meta.is_fillable(&key) {
                tracing::trace!(table = self.meta.table, key = %key, "skipping non-fillable attribute");
                continue;
            }
            if !self.original.contains_key(&key) {
                if let Some(existing) = self.attributes.get(&key) {
                    self.original.insert(key.clone(), existing.clone());
                }
            }
            self.attributes.insert(key, sanitize(value));
        }
    }

    /// The primary key value, or `None` when unset or NULL.
    #[must_use]
    pub fn key(&self) -> Option<&Value> {
        self.attributes
            .get(self.meta.primary_key)
            .filter(|v| !v.is_null())
    }

    /// Set the primary key value.
    pub fn set_key(&mut self, value: impl Into<Value>) {
        self.attributes
            .insert(self.meta.primary_key.to_string(), value.into());
    }

    /// The attributes that differ from the original snapshot.
    #[must_use]
    pub fn dirty(&self) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter(|(key, value)| self.original.get(*key) != Some(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Whether any attribute differs from the original snapshot.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.attributes
            .iter()
            .any(|(key, value)| self.original.get(key) != Some(value))
    }

    /// Re-sync the original snapshot to the current attributes.
    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Get a cached relation, if loaded.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    /// Store a loaded relation in the cache.
    pub fn set_relation(&mut self, name: impl Into<String>, value: RelationValue) {
        self.relations.insert(name.into(), value);
    }

    /// Whether a relation has been loaded into the cache.
    #[must_use]
    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// The pivot sub-object attached by a many-to-many load.
    #[must_use]
    pub fn pivot(&self) -> Option<&BTreeMap<String, Value>> {
        self.pivot.as_ref()
    }

    /// Serialize to JSON, omitting hidden columns and including loaded
    /// relations and the pivot sub-object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.attributes {
            if self.meta.is_hidden(key) {
                continue;
            }
            map.insert(key.clone(), value.to_json());
        }
        if let Some(pivot) = &self.pivot {
            let pivot_map: serde_json::Map<String, serde_json::Value> = pivot
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            map.insert("pivot".to_string(), serde_json::Value::Object(pivot_map));
        }
        for (name, relation) in &self.relations {
            let rendered = match relation {
                RelationValue::One(Some(record)) => record.to_json(),
                RelationValue::One(None) => serde_json::Value::Null,
                RelationValue::Many(records) => {
                    serde_json::Value::Array(records.iter().map(Record::to_json).collect())
                }
            };
            map.insert(name.clone(), rendered);
        }
        serde_json::Value::Object(map)
    }
}

/// Sanitize a caller-supplied attribute value before storage.
fn sanitize(value: Value) -> Value {
    match value {
        Value::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else if trimmed.len() == s.len() {
                Value::Text(s)
            } else {
                Value::Text(trimmed.to_string())
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static HEROES: EntityMeta =
        EntityMeta::new("heroes", "id", &["id", "name", "age", "secret_name"])
            .fillable(&["name", "age"])
            .hidden(&["secret_name"]);

    fn record() -> Record {
        Record::new(&HEROES)
    }

    #[test]
    fn test_new_record_is_unsaved_and_clean() {
        let record = record();
        assert!(!record.exists());
        assert!(!record.is_dirty());
        assert!(record.key().is_none());
    }

    #[test]
    fn test_fill_honors_whitelist() {
        let mut record = record();
        record.fill([
            ("name".to_string(), Value::Text("Ada".into())),
            ("id".to_string(), Value::Int(99)),
            ("secret_name".to_string(), Value::Text("nope".into())),
        ]);
        assert_eq!(record.get("name"), Some(&Value::Text("Ada".into())));
        assert_eq!(record.get("id"), None);
        assert_eq!(record.get("secret_name"), None);
    }

    #[test]
    fn test_fill_sanitizes_strings() {
        let mut record = record();
        record.fill([
            ("name".to_string(), Value::Text("  Ada  ".into())),
            ("age".to_string(), Value::Text("   ".into())),
        ]);
        assert_eq!(record.get("name"), Some(&Value::Text("Ada".into())));
        assert_eq!(record.get("age"), Some(&Value::Null));
    }

    #[test]
    fn test_fill_preserves_prefill_value_in_snapshot() {
        let mut record = record();
        record.set("name", "Original");
        record.fill([("name".to_string(), Value::Text("Changed".into()))]);
        let dirty = record.dirty();
        assert_eq!(dirty.get("name"), Some(&Value::Text("Changed".into())));
        // The snapshot kept the pre-fill value, not the filled one.
        assert_eq!(record.original.get("name"), Some(&Value::Text("Original".into())));
    }

    #[test]
    fn test_dirty_tracks_changes_and_additions() {
        let row = Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Int(1), Value::Text("Ada".into())],
        );
        let mut record = Record::from_row(&HEROES, &row, None).unwrap();
        assert!(!record.is_dirty());

        record.set("name", "Grace");
        record.set("age", 36_i64);
        let dirty = record.dirty();
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty.get("name"), Some(&Value::Text("Grace".into())));
        assert_eq!(dirty.get("age"), Some(&Value::Int(36)));

        record.sync_original();
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_key_treats_null_as_unset() {
        let mut record = record();
        record.set("id", Value::Null);
        assert!(record.key().is_none());
        record.set_key(5_i64);
        assert_eq!(record.key(), Some(&Value::Int(5)));
    }

    #[test]
    fn test_from_row_detaches_pivot_columns() {
        let row = Row::new(
            vec![
                "id".to_string(),
                "name".to_string(),
                "pivot_hero_id".to_string(),
                "pivot_power_id".to_string(),
            ],
            vec![
                Value::Int(3),
                Value::Text("Flight".into()),
                Value::Int(1),
                Value::Int(3),
            ],
        );
        let record = Record::from_row(&HEROES, &row, None).unwrap();
        assert_eq!(record.get("pivot_hero_id"), None);
        let pivot = record.pivot().unwrap();
        assert_eq!(pivot.get("hero_id"), Some(&Value::Int(1)));
        assert_eq!(pivot.get("power_id"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_to_json_hides_hidden_and_includes_relations() {
        let row = Row::new(
            vec![
                "id".to_string(),
                "name".to_string(),
                "secret_name".to_string(),
            ],
            vec![
                Value::Int(1),
                Value::Text("Ada".into()),
                Value::Text("classified".into()),
            ],
        );
        let mut record = Record::from_row(&HEROES, &row, None).unwrap();
        let mut related = Record::new(&HEROES);
        related.set("id", 2_i64);
        record.set_relation("sidekick", RelationValue::One(Some(Box::new(related))));

        let json = record.to_json();
        assert!(json.get("secret_name").is_none());
        assert_eq!(json["name"], serde_json::json!("Ada"));
        assert_eq!(json["sidekick"]["id"], serde_json::json!(2));
    }

    struct ShiftCipher;

    impl AttributeCipher for ShiftCipher {
        fn encrypt(&self, plaintext: &str) -> String {
            format!("enc:{plaintext}")
        }

        fn decrypt(&self, ciphertext: &str) -> Result<String> {
            ciphertext
                .strip_prefix("enc:")
                .map(str::to_string)
                .ok_or_else(|| crate::error::Error::Custom("bad ciphertext".into()))
        }
    }

    #[test]
    fn test_from_row_decrypts_declared_columns() {
        static VAULT: EntityMeta =
            EntityMeta::new("vault", "id", &["id", "secret"]).encrypted(&["secret"]);
        let row = Row::new(
            vec!["id".to_string(), "secret".to_string()],
            vec![Value::Int(1), Value::Text("enc:plain".into())],
        );
        let record = Record::from_row(&VAULT, &row, Some(&ShiftCipher)).unwrap();
        assert_eq!(record.get("secret"), Some(&Value::Text("plain".into())));
        assert!(!record.is_dirty());
    }
}
