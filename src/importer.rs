//! Import run orchestration.
//!
//! One [`Importer::run`] call is one import run:
//!
//! 1. start phase — required reference records are checked; a missing one
//!    aborts the run before anything is persisted
//! 2. streaming phase — rows are grouped and stitched, each merged record
//!    is field-mapped and upserted, the run-scoped name→pk table is built
//!    and relationship references are captured
//! 3. end phase — pending relationships are resolved exactly once, after
//!    every entity of the run is known
//!
//! All run state (name table, pending relations, report) is owned by the
//! run and discarded afterwards; runs are independent.

use std::collections::HashMap;

use log::info;
use serde_json::Value;

use crate::error::{ImportError, Result};
use crate::grouping::group_rows;
use crate::mapping::apply_mappings;
use crate::relations::{ItineraryRelations, NameRelations};
use crate::report::ImportReport;
use crate::store::{EntityPk, RecordStore, UpsertOutcome};
use crate::{FieldKey, ImportConfig, LogicalRecord, RelationMode, Row};

/// Drives one import run against a persistence collaborator.
pub struct Importer<'a, S: RecordStore> {
    config: ImportConfig,
    store: &'a mut S,
}

impl<'a, S: RecordStore> Importer<'a, S> {
    pub fn new(config: ImportConfig, store: &'a mut S) -> Self {
        Importer { config, store }
    }

    /// Run the full import over a finite row stream.
    ///
    /// Fatal configuration problems return an error with nothing
    /// persisted; row-level problems and stitching gaps accumulate in the
    /// returned [`ImportReport`].
    pub fn run(&mut self, rows: Vec<Row>) -> Result<ImportReport> {
        self.check_required_references()?;

        info!("[TrekImport] Importing {} rows", rows.len());
        let mut report = ImportReport::new();
        let mut names: HashMap<String, EntityPk> = HashMap::new();
        let mut by_name = NameRelations::new();
        let mut by_itinerary = ItineraryRelations::new();

        let mut grouped = group_rows(rows, &self.config);
        report.entities = grouped.entity_count();

        while let Some(record) = grouped.next() {
            let mut mapping_warnings = Vec::new();
            let mapped = match apply_mappings(
                &self.config.mappings,
                &self.config.constants,
                &record.fields,
                self.config.separator,
                &mut mapping_warnings,
            ) {
                Ok(mapped) => mapped,
                Err(ImportError::Row { message }) => {
                    report.absorb(mapping_warnings);
                    report.warn(message);
                    report.rejected_rows += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };
            report.absorb(mapping_warnings);

            let raw_fields = record.fields;
            let record = LogicalRecord {
                eid: record.eid,
                geom: record.geom,
                fields: mapped,
            };
            let (pk, outcome) = self.store.upsert(&record)?;
            match outcome {
                UpsertOutcome::Created => report.created += 1,
                UpsertOutcome::Updated => report.updated += 1,
            }

            if let Some(name_field) = &self.config.name_field {
                if let Some(Value::String(name)) = raw_fields.get(name_field) {
                    names.insert(name.clone(), pk);
                }
            }

            match &self.config.relations {
                RelationMode::None => {}
                RelationMode::ByName { column } => {
                    if let Some(Value::String(raw)) = raw_fields.get(column) {
                        by_name.record_multi(pk, raw, self.config.separator);
                    }
                }
                RelationMode::ByItinerary {
                    itinerary_column,
                    step_column,
                } => {
                    let itinerary = raw_fields
                        .get(itinerary_column)
                        .and_then(FieldKey::from_value);
                    let step = raw_fields
                        .get(step_column)
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    by_itinerary.record(itinerary, step, pk);
                }
            }
        }

        report.rejected_rows += grouped.rejected_rows();
        report.absorb(grouped.take_warnings());

        report.links_created += by_name.resolve_all(
            &names,
            self.store,
            self.config.separator,
            &mut report.warnings,
        )?;
        report.links_created += by_itinerary.resolve_all(self.store)?;

        info!(
            "[TrekImport] Done: {} entities ({} created, {} updated), {} links, {} warnings",
            report.entities,
            report.created,
            report.updated,
            report.links_created,
            report.warnings.len()
        );
        Ok(report)
    }

    fn check_required_references(&self) -> Result<()> {
        for reference in &self.config.required_references {
            if !self.store.has_reference(&reference.kind, &reference.name) {
                return Err(ImportError::global(format!(
                    "{} '{}' does not exist. Please add it before importing.",
                    reference.kind, reference.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::ReferenceSpec;
    use geo::LineString;
    use serde_json::json;

    fn row(eid: i64, order: i64, name: &str, coords: &[(f64, f64)]) -> Row {
        Row::new()
            .set("eid", json!(eid))
            .set("order", json!(order))
            .set("ALIAS", json!(name))
            .with_geom(LineString::from(coords.to_vec()))
    }

    #[test]
    fn test_missing_required_reference_aborts_before_persisting() {
        let config = ImportConfig {
            required_references: vec![ReferenceSpec {
                kind: "practice".to_string(),
                name: "Hiking".to_string(),
            }],
            ..ImportConfig::default()
        };
        let mut store = MemoryStore::new();
        let mut importer = Importer::new(config, &mut store);

        let err = importer
            .run(vec![row(1, 1, "Alpha", &[(0.0, 0.0), (1.0, 0.0)])])
            .unwrap_err();
        assert!(matches!(err, ImportError::Global { .. }));
        assert!(err.to_string().contains("Hiking"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_run_upserts_one_record_per_entity() {
        let config = ImportConfig::default();
        let mut store = MemoryStore::new();
        let mut importer = Importer::new(config, &mut store);

        let report = importer
            .run(vec![
                row(1, 1, "Alpha", &[(0.0, 0.0), (1.0, 0.0)]),
                row(1, 2, "Alpha", &[(1.0, 0.0), (2.0, 0.0)]),
                row(2, 1, "Beta", &[(9.0, 0.0), (9.0, 1.0)]),
            ])
            .unwrap();

        assert_eq!(report.entities, 2);
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_second_run_updates_instead_of_creating() {
        let mut store = MemoryStore::new();
        for _ in 0..2 {
            let mut importer = Importer::new(ImportConfig::default(), &mut store);
            importer
                .run(vec![row(1, 1, "Alpha", &[(0.0, 0.0), (1.0, 0.0)])])
                .unwrap();
        }
        assert_eq!(store.len(), 1);
    }
}
