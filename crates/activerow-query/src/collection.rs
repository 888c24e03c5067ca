//! Ordered record collections.

use activerow_core::{Error, Record, RelationValue, Result, Value};
use std::collections::{BTreeMap, HashMap};

/// An ordered sequence of records sharing one entity type.
///
/// Transformations never mutate the builder that produced the collection.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    records: Vec<Record>,
}

impl Collection {
    /// Wrap a vector of records.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The first record, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Record at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Iterate over records.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Iterate mutably over records.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Record> {
        self.records.iter_mut()
    }

    /// Consume into the underlying vector.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Map each record to a derived value.
    pub fn map<T>(&self, f: impl FnMut(&Record) -> T) -> Vec<T> {
        self.records.iter().map(f).collect()
    }

    /// Keep the records matching a predicate.
    #[must_use]
    pub fn filter(&self, mut predicate: impl FnMut(&Record) -> bool) -> Collection {
        Collection::new(
            self.records
                .iter()
                .filter(|r| predicate(r))
                .cloned()
                .collect(),
        )
    }

    /// Collect one attribute across all records (NULL for absent keys).
    #[must_use]
    pub fn pluck(&self, attribute: &str) -> Vec<Value> {
        self.records
            .iter()
            .map(|r| r.get(attribute).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Group records by the rendered value of one attribute.
    #[must_use]
    pub fn group_by(&self, attribute: &str) -> BTreeMap<String, Collection> {
        let mut groups: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for record in &self.records {
            let key = record
                .get(attribute)
                .map_or_else(|| "NULL".to_string(), ToString::to_string);
            groups.entry(key).or_default().push(record.clone());
        }
        groups
            .into_iter()
            .map(|(k, v)| (k, Collection::new(v)))
            .collect()
    }

    /// Serialize every record (hidden fields omitted).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.records.iter().map(Record::to_json).collect())
    }

    /// Assemble a self-referential tree.
    ///
    /// `parent_key` names the attribute pointing at a record's parent.
    /// Roots (NULL parent, or parent absent from the collection) come back
    /// in input order with descendants attached under a `children`
    /// relation. A cycle aborts with a `CircularReference` failure instead
    /// of recursing indefinitely.
    pub fn to_tree(&self, parent_key: &str) -> Result<Collection> {
        let table = self
            .records
            .first()
            .map(|r| r.meta().table)
            .unwrap_or_default();

        // Index records by primary key representation.
        let mut by_key: HashMap<String, usize> = HashMap::new();
        for (i, record) in self.records.iter().enumerate() {
            if let Some(key) = record.key() {
                by_key.insert(key.to_string(), i);
            }
        }

        let mut children_of: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut roots: Vec<usize> = Vec::new();
        for (i, record) in self.records.iter().enumerate() {
            let parent = record
                .get(parent_key)
                .filter(|v| !v.is_null())
                .and_then(|v| by_key.get(&v.to_string()).copied());
            match parent {
                Some(parent_index) => children_of.entry(parent_index).or_default().push(i),
                None => roots.push(i),
            }
        }

        // Every record must be reachable from a root; anything left over
        // sits on a cycle.
        let mut visited = vec![false; self.records.len()];
        let mut stack: Vec<usize> = roots.clone();
        while let Some(index) = stack.pop() {
            if visited[index] {
                continue;
            }
            visited[index] = true;
            if let Some(children) = children_of.get(&index) {
                stack.extend(children.iter().copied());
            }
        }
        if let Some(stranded) = visited.iter().position(|v| !v) {
            let key = self.records[stranded]
                .key()
                .map_or_else(|| "?".to_string(), ToString::to_string);
            return Err(Error::circular(table, key));
        }

        fn build(index: usize, records: &[Record], children_of: &HashMap<usize, Vec<usize>>) -> Record {
            let mut node = records[index].clone();
            let children = children_of
                .get(&index)
                .map(|indices| {
                    indices
                        .iter()
                        .map(|&child| build(child, records, children_of))
                        .collect()
                })
                .unwrap_or_default();
            node.set_relation("children", RelationValue::Many(children));
            node
        }

        Ok(Collection::new(
            roots
                .into_iter()
                .map(|root| build(root, &self.records, &children_of))
                .collect(),
        ))
    }
}

impl IntoIterator for Collection {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl FromIterator<Record> for Collection {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Collection::new(iter.into_iter().collect())
    }
}
