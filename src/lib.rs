//! # Trek Import
//!
//! Row-stream core for trail/trek data imports: geometry stitching,
//! row grouping and deferred relationship resolution.
//!
//! Source feeds split a single logical trek across multiple ordered
//! geometry segments, and rows reference sibling treks (by name or by
//! itinerary position) before those siblings exist. This library provides:
//! - polyline stitching with automatic direction correction
//! - grouping of a raw row stream into one merged record per trek
//! - two-phase relationship resolution (collect while streaming, resolve
//!   once at end-of-run)
//! - a declarative field-mapping pipeline and a persistence seam, so a
//!   feed is described by configuration rather than code
//!
//! All geometry is planar: rows must arrive in a projected (metric)
//! coordinate system. Reprojection, attachment handling and the actual
//! database live behind the [`RecordStore`] trait.
//!
//! ## Quick Start
//!
//! ```rust
//! use geo::LineString;
//! use serde_json::json;
//! use trek_import::{group_rows, ImportConfig, Row};
//!
//! let config = ImportConfig::default();
//! let rows = vec![
//!     Row::new()
//!         .set("eid", json!(1))
//!         .set("order", json!(1))
//!         .with_geom(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)])),
//!     Row::new()
//!         .set("eid", json!(1))
//!         .set("order", json!(2))
//!         // Digitised backwards; the stitcher flips it.
//!         .with_geom(LineString::from(vec![(2.0, 0.0), (1.0, 0.0)])),
//! ];
//!
//! let records: Vec<_> = group_rows(rows, &config).collect();
//! assert_eq!(records.len(), 1);
//! let xs: Vec<f64> = records[0].geom.0.iter().map(|c| c.x).collect();
//! assert_eq!(xs, vec![0.0, 1.0, 1.0, 2.0]);
//! ```

use std::collections::HashMap;
use std::fmt;

use geo::LineString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Unified error handling
pub mod error;
pub use error::{ImportError, Result};

// Planar geometry utilities
pub mod geo_utils;

// Polyline stitching (segment direction correction + concatenation)
pub mod stitching;
pub use stitching::{merge, DEFAULT_JOIN_TOLERANCE};

// Row grouping (one merged record per entity id)
pub mod grouping;
pub use grouping::{group_rows, GroupedRecords};

// Declarative field mapping
pub mod mapping;
pub use mapping::{apply_mappings, FieldMapping, FieldSource, Transform};

// Deferred relationship resolution
pub mod relations;
pub use relations::{ItineraryRelations, NameRelations};

// Persistence seam
pub mod store;
pub use store::{EntityPk, MemoryStore, RecordStore, UpsertOutcome};

// End-of-run reporting
pub mod report;
pub use report::ImportReport;

// Run orchestration
pub mod importer;
pub use importer::Importer;

// ============================================================================
// Core Types
// ============================================================================

/// Canonical key for entity ids, order keys and itinerary ids.
///
/// Ordering is stable and consistent (integers sort before text) but not
/// semantically meaningful; it only has to keep segments of one entity
/// adjacent after sorting. Non-integer scalars canonicalise to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKey {
    Int(i64),
    Text(String),
}

impl FieldKey {
    /// Build a key from a raw field value. Null yields `None`.
    pub fn from_value(value: &Value) -> Option<FieldKey> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(
                n.as_i64()
                    .map(FieldKey::Int)
                    .unwrap_or_else(|| FieldKey::Text(n.to_string())),
            ),
            Value::String(text) => Some(FieldKey::Text(text.clone())),
            other => Some(FieldKey::Text(other.to_string())),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Int(n) => write!(f, "{}", n),
            FieldKey::Text(text) => write!(f, "{}", text),
        }
    }
}

/// One raw input row: an optional geometry segment plus named fields.
///
/// The geometry is already parsed and already projected; a row without
/// geometry is dropped by the grouper before any grouping happens.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub geom: Option<LineString<f64>>,
    pub fields: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value (builder style).
    pub fn set(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Attach a geometry segment (builder style).
    pub fn with_geom(mut self, geom: LineString<f64>) -> Self {
        self.geom = Some(geom);
        self
    }
}

/// The merged result for one entity id: its stitched polyline plus the
/// non-geometry fields of the first row seen for that entity.
///
/// Created transiently per group and handed to the persistence layer;
/// not retained by the importer afterwards.
#[derive(Debug, Clone)]
pub struct LogicalRecord {
    pub eid: FieldKey,
    pub geom: LineString<f64>,
    pub fields: HashMap<String, Value>,
}

impl LogicalRecord {
    /// External (natural) identifier this record is upserted under: the
    /// mapped `eid` field when present, the grouping key otherwise.
    pub fn external_id(&self) -> FieldKey {
        self.fields
            .get("eid")
            .and_then(FieldKey::from_value)
            .unwrap_or_else(|| self.eid.clone())
    }
}

/// How cross-trek relationships are captured during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum RelationMode {
    /// No relationship capture.
    #[default]
    None,
    /// A multi-valued column listing target trek names.
    ByName { column: String },
    /// An itinerary id column plus a step ordinal column.
    ByItinerary {
        itinerary_column: String,
        step_column: String,
    },
}

/// A reference record that must exist before the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSpec {
    pub kind: String,
    pub name: String,
}

/// Configuration for one import run.
///
/// Everything a feed needs is data: column names, the join tolerance, the
/// multi-value separator, the field-mapping table and the relation mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Column holding the entity id shared by all segments of one trek.
    pub eid_field: String,

    /// Column establishing intra-trek segment order.
    pub order_field: String,

    /// Join-distance tolerance in projected units.
    /// Joins with a larger gap warn but are still performed. Default: 5.0
    pub join_tolerance: f64,

    /// Separator for multi-valued fields. Default: ','
    pub separator: char,

    /// Declarative field-mapping table applied to each merged record.
    pub mappings: Vec<FieldMapping>,

    /// Constant fields overlaid on every mapped record.
    pub constants: HashMap<String, Value>,

    /// Relationship capture mode.
    pub relations: RelationMode,

    /// Column registering each record in the run-scoped name→pk table
    /// used by by-name resolution.
    pub name_field: Option<String>,

    /// Reference records that must exist before any row is processed.
    pub required_references: Vec<ReferenceSpec>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            eid_field: "eid".to_string(),
            order_field: "order".to_string(),
            join_tolerance: DEFAULT_JOIN_TOLERANCE,
            separator: ',',
            mappings: Vec::new(),
            constants: HashMap::new(),
            relations: RelationMode::None,
            name_field: None,
            required_references: Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_key_from_value() {
        assert_eq!(FieldKey::from_value(&json!(12)), Some(FieldKey::Int(12)));
        assert_eq!(
            FieldKey::from_value(&json!("P-12")),
            Some(FieldKey::Text("P-12".to_string()))
        );
        assert_eq!(FieldKey::from_value(&Value::Null), None);
        // Non-integer numbers canonicalise to text.
        assert_eq!(
            FieldKey::from_value(&json!(1.5)),
            Some(FieldKey::Text("1.5".to_string()))
        );
    }

    #[test]
    fn test_field_key_ordering_is_stable() {
        let mut keys = vec![
            FieldKey::Text("B".to_string()),
            FieldKey::Int(2),
            FieldKey::Text("A".to_string()),
            FieldKey::Int(1),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                FieldKey::Int(1),
                FieldKey::Int(2),
                FieldKey::Text("A".to_string()),
                FieldKey::Text("B".to_string()),
            ]
        );
    }

    #[test]
    fn test_external_id_prefers_mapped_eid() {
        let record = LogicalRecord {
            eid: FieldKey::Int(12),
            geom: LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
            fields: [("eid".to_string(), json!("P-12"))].into(),
        };
        assert_eq!(record.external_id(), FieldKey::Text("P-12".to_string()));

        let record = LogicalRecord {
            eid: FieldKey::Int(12),
            geom: LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
            fields: HashMap::new(),
        };
        assert_eq!(record.external_id(), FieldKey::Int(12));
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = ImportConfig {
            eid_field: "NUM_OBJ".to_string(),
            order_field: "NUM_ORDRE".to_string(),
            relations: RelationMode::ByName {
                column: "LIAISONS".to_string(),
            },
            ..ImportConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ImportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.eid_field, "NUM_OBJ");
        assert!(matches!(back.relations, RelationMode::ByName { .. }));
    }
}
