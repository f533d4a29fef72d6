//! Deferred trek relationship resolution.
//!
//! Rows reference sibling treks before those siblings exist: by name
//! ("links with" columns listing trek names) or by itinerary position
//! (an itinerary id plus a step ordinal). Both resolvers collect pending
//! references during streaming and resolve them exactly once, after the
//! whole stream has been consumed and every entity is known.

use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::store::{EntityPk, RecordStore};
use crate::FieldKey;

/// Pending by-name relationships: (source pk, target trek name).
///
/// Resolution walks a run-scoped name→pk table built by the row-processing
/// step. Unknown names warn and are skipped; known names become an
/// idempotent circuit-step link.
#[derive(Debug, Default)]
pub struct NameRelations {
    pending: Vec<(EntityPk, String)>,
}

impl NameRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one pending reference.
    pub fn record(&mut self, source: EntityPk, target_name: &str) {
        self.pending.push((source, target_name.to_string()));
    }

    /// Record every name in a multi-valued field, split on `separator`.
    pub fn record_multi(&mut self, source: EntityPk, raw: &str, separator: char) {
        for name in raw.split(separator) {
            let name = name.trim();
            if !name.is_empty() {
                self.record(source, name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Resolve every pending reference. Consumes the resolver: references
    /// are resolved (or skipped with a warning) exactly once per run.
    ///
    /// Returns the number of links newly created.
    pub fn resolve_all<S>(
        self,
        names: &HashMap<String, EntityPk>,
        store: &mut S,
        separator: char,
        warnings: &mut Vec<String>,
    ) -> Result<usize>
    where
        S: RecordStore + ?Sized,
    {
        let mut created = 0usize;
        for (source, target_name) in self.pending {
            match names.get(&target_name) {
                Some(&target) => {
                    if store.link_circuit_step(source, target)? {
                        created += 1;
                    }
                }
                None => {
                    let message = format!(
                        "Bad value '{}' for related treks field (separated by '{}'). \
                         No trek with this name in data to import.",
                        target_name, separator
                    );
                    log::warn!("[TrekImport] {}", message);
                    warnings.push(message);
                }
            }
        }
        Ok(created)
    }
}

/// Pending by-itinerary relationships: each itinerary is an ordered chain
/// of step ordinals, and step N links to step N+1.
///
/// Steps with ordinal 0 or without an itinerary id are not part of a chain
/// and are ignored at record time. A missing successor simply produces no
/// link; there is no unresolved case.
#[derive(Debug, Default)]
pub struct ItineraryRelations {
    pending: BTreeMap<FieldKey, BTreeMap<i64, EntityPk>>,
}

impl ItineraryRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one step. A later record for the same (itinerary, step)
    /// overwrites the earlier one.
    pub fn record(&mut self, itinerary: Option<FieldKey>, step: i64, source: EntityPk) {
        let Some(itinerary) = itinerary else { return };
        if step == 0 {
            return;
        }
        self.pending.entry(itinerary).or_default().insert(step, source);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Link step N to step N+1 within each itinerary, via idempotent
    /// upserts. Consumes the resolver. Returns the number of links newly
    /// created.
    pub fn resolve_all<S>(self, store: &mut S) -> Result<usize>
    where
        S: RecordStore + ?Sized,
    {
        let mut created = 0usize;
        for (_, steps) in self.pending {
            for (&step, &source) in &steps {
                // Successor must be exactly step + 1; sparse ordinals do
                // not chain across the hole.
                if let Some(&target) = steps.get(&(step + 1)) {
                    if store.link_circuit_step(source, target)? {
                        created += 1;
                    }
                }
            }
        }
        Ok(created)
    }
}
