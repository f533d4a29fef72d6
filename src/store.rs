//! Persistence seam for import runs.
//!
//! The importer never talks to a database directly; it drives a
//! [`RecordStore`], which the host application implements on top of its
//! ORM/spatial store. Reprojection, attachment download and natural-key
//! resolution of related reference records all live behind this trait.
//!
//! [`MemoryStore`] is a complete in-memory implementation used by the
//! crate's own tests and handy for dry-run imports.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::{FieldKey, LogicalRecord};

/// Primary key assigned by the persistence layer.
pub type EntityPk = i64;

/// Whether an upsert created a new entity or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Persistence collaborator for an import run.
pub trait RecordStore {
    /// Upsert a merged record, keyed by its external id
    /// ([`LogicalRecord::external_id`]). Returns the entity's pk.
    fn upsert(&mut self, record: &LogicalRecord) -> Result<(EntityPk, UpsertOutcome)>;

    /// Idempotent, directional circuit-step link between two entities.
    /// Returns `true` when the link was newly created.
    fn link_circuit_step(&mut self, source: EntityPk, target: EntityPk) -> Result<bool>;

    /// Whether a reference record of the given kind exists, by name.
    /// Used by start-phase validation before any row is processed.
    fn has_reference(&self, kind: &str, name: &str) -> bool;
}

/// In-memory [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    by_external_id: HashMap<FieldKey, EntityPk>,
    records: HashMap<EntityPk, LogicalRecord>,
    links: HashSet<(EntityPk, EntityPk)>,
    references: HashSet<(String, String)>,
    next_pk: EntityPk,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a reference record (category, practice, desk type, ...).
    pub fn add_reference(&mut self, kind: &str, name: &str) {
        self.references.insert((kind.to_string(), name.to_string()));
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stored record for an external id, if any.
    pub fn get(&self, external_id: &FieldKey) -> Option<&LogicalRecord> {
        self.by_external_id
            .get(external_id)
            .and_then(|pk| self.records.get(pk))
    }

    /// Pk for an external id, if the entity exists.
    pub fn pk_of(&self, external_id: &FieldKey) -> Option<EntityPk> {
        self.by_external_id.get(external_id).copied()
    }

    /// All circuit-step links, in no particular order.
    pub fn links(&self) -> Vec<(EntityPk, EntityPk)> {
        self.links.iter().copied().collect()
    }
}

impl RecordStore for MemoryStore {
    fn upsert(&mut self, record: &LogicalRecord) -> Result<(EntityPk, UpsertOutcome)> {
        let external_id = record.external_id();
        match self.by_external_id.get(&external_id) {
            Some(&pk) => {
                self.records.insert(pk, record.clone());
                Ok((pk, UpsertOutcome::Updated))
            }
            None => {
                self.next_pk += 1;
                let pk = self.next_pk;
                self.by_external_id.insert(external_id, pk);
                self.records.insert(pk, record.clone());
                Ok((pk, UpsertOutcome::Created))
            }
        }
    }

    fn link_circuit_step(&mut self, source: EntityPk, target: EntityPk) -> Result<bool> {
        Ok(self.links.insert((source, target)))
    }

    fn has_reference(&self, kind: &str, name: &str) -> bool {
        self.references
            .contains(&(kind.to_string(), name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;
    use serde_json::json;

    fn record(eid: i64) -> LogicalRecord {
        LogicalRecord {
            eid: FieldKey::Int(eid),
            geom: LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
            fields: [("eid".to_string(), json!(format!("P-{}", eid)))].into(),
        }
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let mut store = MemoryStore::new();
        let (pk1, outcome) = store.upsert(&record(1)).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let (pk2, outcome) = store.upsert(&record(1)).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(pk1, pk2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_link_is_idempotent_and_directional() {
        let mut store = MemoryStore::new();
        assert!(store.link_circuit_step(1, 2).unwrap());
        assert!(!store.link_circuit_step(1, 2).unwrap());
        assert!(store.link_circuit_step(2, 1).unwrap());
        assert_eq!(store.links().len(), 2);
    }

    #[test]
    fn test_reference_lookup() {
        let mut store = MemoryStore::new();
        store.add_reference("practice", "Hiking");
        assert!(store.has_reference("practice", "Hiking"));
        assert!(!store.has_reference("practice", "Cycling"));
    }
}
