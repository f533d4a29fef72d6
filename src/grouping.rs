//! Row grouping: one merged record per logical trek.
//!
//! Source feeds deliver a trek as several rows, each carrying one geometry
//! segment plus the same attribute columns. [`group_rows`] sorts the row
//! stream by (entity id, order key), stitches each group's segments into a
//! single polyline and emits one [`LogicalRecord`] per entity id. Attribute
//! fields are taken from the first row of each group.

use geo::LineString;
use serde_json::Value;

use crate::stitching::merge;
use crate::{FieldKey, ImportConfig, LogicalRecord, Row};

/// Group a row stream into merged records.
///
/// Rows without geometry are discarded before grouping; rows without an
/// entity id are rejected with a warning. The returned iterator is lazy,
/// finite and single-pass: consuming it exhausts the underlying rows.
///
/// # Example
/// ```
/// use geo::LineString;
/// use serde_json::json;
/// use trek_import::{group_rows, ImportConfig, Row};
///
/// let config = ImportConfig::default();
/// let rows = vec![
///     Row::new()
///         .set("eid", json!(1))
///         .set("order", json!(2))
///         .with_geom(LineString::from(vec![(1.0, 0.0), (2.0, 0.0)])),
///     Row::new()
///         .set("eid", json!(1))
///         .set("order", json!(1))
///         .with_geom(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)])),
/// ];
///
/// let records: Vec<_> = group_rows(rows, &config).collect();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].geom.0.len(), 4);
/// ```
pub fn group_rows(rows: Vec<Row>, config: &ImportConfig) -> GroupedRecords {
    let mut warnings = Vec::new();
    let mut rejected = 0usize;

    // Null-geometry rows are dropped silently; rows without an entity id
    // cannot be grouped and are rejected with a warning.
    let mut keyed: Vec<(FieldKey, Option<FieldKey>, Row)> = Vec::with_capacity(rows.len());
    for row in rows {
        if row.geom.is_none() {
            continue;
        }
        let eid = row
            .fields
            .get(&config.eid_field)
            .and_then(FieldKey::from_value);
        match eid {
            Some(eid) => {
                let order = row
                    .fields
                    .get(&config.order_field)
                    .and_then(FieldKey::from_value);
                keyed.push((eid, order, row));
            }
            None => {
                let message = format!(
                    "Missing value for field '{}', row rejected",
                    config.eid_field
                );
                log::warn!("[TrekImport] {}", message);
                warnings.push(message);
                rejected += 1;
            }
        }
    }

    keyed.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    let mut entity_count = 0usize;
    let mut previous: Option<&FieldKey> = None;
    for (eid, _, _) in &keyed {
        if previous != Some(eid) {
            entity_count += 1;
            previous = Some(eid);
        }
    }

    GroupedRecords {
        rows: keyed.into_iter(),
        accumulator: None,
        join_tolerance: config.join_tolerance,
        entity_count,
        rejected_rows: rejected,
        warnings,
    }
}

/// Lazy iterator over merged records, produced by [`group_rows`].
#[derive(Debug)]
pub struct GroupedRecords {
    rows: std::vec::IntoIter<(FieldKey, Option<FieldKey>, Row)>,
    accumulator: Option<Accumulator>,
    join_tolerance: f64,
    entity_count: usize,
    rejected_rows: usize,
    warnings: Vec<String>,
}

#[derive(Debug)]
struct Accumulator {
    eid: FieldKey,
    fields: std::collections::HashMap<String, Value>,
    line: LineString<f64>,
    first_merge: bool,
}

impl Accumulator {
    fn seed(eid: FieldKey, row: Row, tolerance: f64, warnings: &mut Vec<String>) -> Self {
        let geom = row.geom.expect("null-geometry rows filtered before grouping");
        Accumulator {
            eid,
            fields: row.fields,
            line: merge(None, geom, false, tolerance, warnings),
            first_merge: true,
        }
    }

    fn absorb(&mut self, row: Row, tolerance: f64, warnings: &mut Vec<String>) {
        let geom = row.geom.expect("null-geometry rows filtered before grouping");
        let line = std::mem::replace(&mut self.line, LineString::new(vec![]));
        self.line = merge(Some(line), geom, self.first_merge, tolerance, warnings);
        self.first_merge = false;
    }

    fn flush(self) -> LogicalRecord {
        LogicalRecord {
            eid: self.eid,
            geom: self.line,
            fields: self.fields,
        }
    }
}

impl GroupedRecords {
    /// Number of distinct entity ids seen in the (filtered) input.
    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Number of rows rejected by row-level validation.
    pub fn rejected_rows(&self) -> usize {
        self.rejected_rows
    }

    /// Drain the warnings accumulated so far.
    ///
    /// Call after the iterator is exhausted to collect stitching warnings
    /// for the whole stream.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

impl Iterator for GroupedRecords {
    type Item = LogicalRecord;

    fn next(&mut self) -> Option<LogicalRecord> {
        while let Some((eid, _, row)) = self.rows.next() {
            match &mut self.accumulator {
                None => {
                    self.accumulator = Some(Accumulator::seed(
                        eid,
                        row,
                        self.join_tolerance,
                        &mut self.warnings,
                    ));
                }
                Some(acc) if acc.eid == eid => {
                    acc.absorb(row, self.join_tolerance, &mut self.warnings);
                }
                Some(_) => {
                    let done = self.accumulator.take().expect("accumulator present");
                    self.accumulator = Some(Accumulator::seed(
                        eid,
                        row,
                        self.join_tolerance,
                        &mut self.warnings,
                    ));
                    return Some(done.flush());
                }
            }
        }
        // Input exhausted: the last group still has to be emitted.
        self.accumulator.take().map(Accumulator::flush)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(eid: i64, order: i64, coords: &[(f64, f64)]) -> Row {
        Row::new()
            .set("eid", json!(eid))
            .set("order", json!(order))
            .with_geom(LineString::from(coords.to_vec()))
    }

    #[test]
    fn test_single_segment_group_passes_through_unchanged() {
        let config = ImportConfig::default();
        let rows = vec![row(1, 1, &[(0.0, 0.0), (5.0, 5.0)])];

        let mut grouped = group_rows(rows, &config);
        let record = grouped.next().unwrap();
        assert_eq!(record.geom, LineString::from(vec![(0.0, 0.0), (5.0, 5.0)]));
        assert!(grouped.next().is_none());
        assert!(grouped.take_warnings().is_empty());
    }

    #[test]
    fn test_null_geometry_rows_are_dropped() {
        let config = ImportConfig::default();
        let rows = vec![
            Row::new().set("eid", json!(1)).set("order", json!(1)),
            row(1, 2, &[(0.0, 0.0), (1.0, 0.0)]),
        ];

        let records: Vec<_> = group_rows(rows, &config).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].geom.0.len(), 2);
    }

    #[test]
    fn test_missing_entity_id_rejects_row_with_warning() {
        let config = ImportConfig::default();
        let rows = vec![
            Row::new()
                .set("order", json!(1))
                .with_geom(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)])),
            row(2, 1, &[(0.0, 0.0), (1.0, 0.0)]),
        ];

        let mut grouped = group_rows(rows, &config);
        assert_eq!(grouped.rejected_rows(), 1);
        let records: Vec<_> = grouped.by_ref().collect();
        assert_eq!(records.len(), 1);
        let warnings = grouped.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("eid"));
    }

    #[test]
    fn test_row_conservation_and_emission_order() {
        let config = ImportConfig::default();
        // Deliberately shuffled input across three entities.
        let rows = vec![
            row(3, 1, &[(0.0, 0.0), (1.0, 0.0)]),
            row(1, 2, &[(1.0, 0.0), (2.0, 0.0)]),
            row(2, 1, &[(0.0, 0.0), (1.0, 0.0)]),
            row(1, 1, &[(0.0, 0.0), (1.0, 0.0)]),
            row(2, 2, &[(1.0, 0.0), (2.0, 0.0)]),
        ];

        let mut grouped = group_rows(rows, &config);
        assert_eq!(grouped.entity_count(), 3);
        let records: Vec<_> = grouped.collect();

        let eids: Vec<_> = records.iter().map(|r| r.eid.clone()).collect();
        assert_eq!(
            eids,
            vec![FieldKey::Int(1), FieldKey::Int(2), FieldKey::Int(3)]
        );

        // Every segment accounted for: 2 + 2 + 1 segments of 2 points each.
        let total_points: usize = records.iter().map(|r| r.geom.0.len()).sum();
        assert_eq!(total_points, 10);

        // Intra-group merge follows ascending order key.
        assert_eq!(records[0].geom.0.first().unwrap().x, 0.0);
        assert_eq!(records[0].geom.0.last().unwrap().x, 2.0);
    }

    #[test]
    fn test_first_row_fields_win() {
        let config = ImportConfig::default();
        let rows = vec![
            row(1, 2, &[(1.0, 0.0), (2.0, 0.0)]).set("name", json!("second")),
            row(1, 1, &[(0.0, 0.0), (1.0, 0.0)]).set("name", json!("first")),
        ];

        let records: Vec<_> = group_rows(rows, &config).collect();
        assert_eq!(records[0].fields.get("name"), Some(&json!("first")));
    }

    #[test]
    fn test_final_group_is_not_dropped() {
        let config = ImportConfig::default();
        let rows = vec![
            row(1, 1, &[(0.0, 0.0), (1.0, 0.0)]),
            row(2, 1, &[(9.0, 9.0), (9.0, 10.0)]),
        ];

        let records: Vec<_> = group_rows(rows, &config).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].eid, FieldKey::Int(2));
    }

    #[test]
    fn test_reversed_segment_is_flipped_during_merge() {
        let config = ImportConfig::default();
        let rows = vec![
            row(1, 1, &[(0.0, 0.0), (1.0, 0.0)]),
            row(1, 2, &[(2.0, 0.0), (1.0, 0.0)]),
        ];

        let records: Vec<_> = group_rows(rows, &config).collect();
        let xs: Vec<f64> = records[0].geom.0.iter().map(|c| c.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 1.0, 2.0]);
    }
}
