//! Dataset registry
//!
//! Every dataset the pipeline can ingest is declared up front in a YAML file:
//! its source, typed columns, business key, tracked columns and the mapping
//! into the master index. Nothing about a dataset's shape is read back from
//! the database at run time.

use crate::error::{IngestError, Result};
use odp_common::naming::{humanize, slugify, validate_identifier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

use super::tables::DatasetTables;

/// Longest allowed dataset name, so that derived table and constraint names fit in 63 bytes.
pub const MAX_DATASET_NAME_LEN: usize = 40;

/// Columns the pipeline adds to its own tables; declared columns cannot use them.
pub const RESERVED_COLUMNS: &[&str] =
    &["ingestion_id", "row_id", "start_date", "end_date", "current_flag"];

/// Declared SQL type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Date => "DATE",
        }
    }

    /// Name reported by `information_schema.columns.data_type`
    pub fn information_schema_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "bigint",
            ColumnType::Float => "double precision",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp without time zone",
            ColumnType::Date => "date",
        }
    }

    /// Lenient text conversion installed by migration; `None` for text columns
    pub fn cast_function(&self) -> Option<&'static str> {
        match self {
            ColumnType::Text => None,
            ColumnType::Integer => Some("odp_try_bigint"),
            ColumnType::Float => Some("odp_try_double"),
            ColumnType::Boolean => Some("odp_try_boolean"),
            ColumnType::Timestamp => Some("odp_try_timestamp"),
            ColumnType::Date => Some("odp_try_date"),
        }
    }
}

/// One declared column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub ty: ColumnType,

    /// Header in the source file; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            source: None,
        }
    }

    pub fn with_source(mut self, header: impl Into<String>) -> Self {
        self.source = Some(header.into());
        self
    }

    /// Slugified header this column is matched against
    pub fn source_header(&self) -> String {
        slugify(self.source.as_deref().unwrap_or(&self.name))
    }
}

/// How a dataset row is placed on the map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeometryMapping {
    /// A single column holding `POINT(lon lat)` or `(lat, lon)`
    Column { column: String },
    /// Separate latitude and longitude columns
    Coordinates { latitude: String, longitude: String },
}

impl GeometryMapping {
    fn referenced_columns(&self) -> Vec<&str> {
        match self {
            GeometryMapping::Column { column } => vec![column.as_str()],
            GeometryMapping::Coordinates {
                latitude,
                longitude,
            } => vec![latitude.as_str(), longitude.as_str()],
        }
    }
}

/// Static description of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_name: Option<String>,

    /// URL, `file://` URL or local path of the CSV snapshot
    pub source: String,

    pub business_key: Vec<String>,

    pub columns: Vec<ColumnSpec>,

    /// Columns compared between snapshots; all non-key columns when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracked: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryMapping>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geotags: Vec<String>,
}

impl DatasetSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.business_key.iter().any(|k| k == name)
    }

    /// Business key columns in declared key order
    pub fn key_columns(&self) -> Vec<&ColumnSpec> {
        self.business_key
            .iter()
            .filter_map(|k| self.column(k))
            .collect()
    }

    /// Columns whose change opens a new version
    pub fn tracked_columns(&self) -> Vec<&ColumnSpec> {
        match &self.tracked {
            Some(names) => names.iter().filter_map(|n| self.column(n)).collect(),
            None => self
                .columns
                .iter()
                .filter(|c| !self.is_key_column(&c.name))
                .collect(),
        }
    }

    pub fn display_name(&self) -> String {
        self.human_name
            .clone()
            .unwrap_or_else(|| humanize(&self.name))
    }

    pub fn tables(&self) -> DatasetTables {
        DatasetTables::new(&self.name)
    }

    /// Resolve a mapping column, treating undeclared names as absent
    pub fn mapped_column(&self, name: Option<&str>) -> Option<&ColumnSpec> {
        name.and_then(|n| self.column(n))
    }

    /// Check the declaration; index mapping problems only produce warnings
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(IngestError::Configuration(format!("{}: {}", self.name, msg)));

        validate_identifier(&self.name)?;
        if self.name.len() > MAX_DATASET_NAME_LEN {
            return fail(format!(
                "dataset name exceeds {} characters",
                MAX_DATASET_NAME_LEN
            ));
        }
        if self.name.starts_with('_') {
            return fail("dataset name must start with a letter".to_string());
        }
        if self.source.trim().is_empty() {
            return fail("source cannot be empty".to_string());
        }
        if self.columns.is_empty() {
            return fail("at least one column must be declared".to_string());
        }

        let mut seen = HashSet::new();
        let mut headers = HashSet::new();
        for column in &self.columns {
            validate_identifier(&column.name)?;
            if RESERVED_COLUMNS.contains(&column.name.as_str()) {
                return fail(format!("column name '{}' is reserved", column.name));
            }
            if !seen.insert(column.name.as_str()) {
                return fail(format!("column '{}' declared twice", column.name));
            }
            let header = column.source_header();
            if header.is_empty() {
                return fail(format!("column '{}' has an empty source header", column.name));
            }
            if !headers.insert(header.clone()) {
                return fail(format!("source header '{}' mapped twice", header));
            }
        }

        if self.business_key.is_empty() {
            return fail("business_key cannot be empty".to_string());
        }
        let mut key_seen = HashSet::new();
        for key in &self.business_key {
            if self.column(key).is_none() {
                return fail(format!("business key column '{}' is not declared", key));
            }
            if !key_seen.insert(key.as_str()) {
                return fail(format!("business key column '{}' listed twice", key));
            }
        }

        if let Some(tracked) = &self.tracked {
            let mut tracked_seen = HashSet::new();
            for name in tracked {
                if self.column(name).is_none() {
                    return fail(format!("tracked column '{}' is not declared", name));
                }
                if self.is_key_column(name) {
                    return fail(format!(
                        "tracked column '{}' is part of the business key",
                        name
                    ));
                }
                if !tracked_seen.insert(name.as_str()) {
                    return fail(format!("tracked column '{}' listed twice", name));
                }
            }
        }

        if self.tracked_columns().is_empty() {
            return fail(
                "no tracked columns: declare at least one non-key column to compare".to_string(),
            );
        }

        if self.geotags.len() > 3 {
            return fail(format!("at most 3 geotags allowed, got {}", self.geotags.len()));
        }

        self.warn_unresolved_mappings();
        Ok(())
    }

    fn warn_unresolved_mappings(&self) {
        let mut mapped: Vec<(&str, &str)> = Vec::new();
        if let Some(obs) = &self.observation_date {
            mapped.push(("observation_date", obs));
        }
        if let Some(geometry) = &self.geometry {
            for column in geometry.referenced_columns() {
                mapped.push(("geometry", column));
            }
        }
        for tag in &self.geotags {
            mapped.push(("geotags", tag));
        }

        for (field, column) in mapped {
            if self.column(column).is_none() {
                warn!(
                    dataset = %self.name,
                    field,
                    column,
                    "Index mapping names an undeclared column; the field will be left empty"
                );
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    datasets: Vec<DatasetSpec>,
}

/// Validated set of dataset declarations
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: Vec<DatasetSpec>,
}

impl DatasetRegistry {
    pub fn new(datasets: Vec<DatasetSpec>) -> Result<Self> {
        let mut names = HashSet::new();
        for dataset in &datasets {
            dataset.validate()?;
            if !names.insert(dataset.name.as_str()) {
                return Err(IngestError::Configuration(format!(
                    "dataset '{}' declared twice",
                    dataset.name
                )));
            }
        }
        Ok(Self { datasets })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| IngestError::Configuration(format!("invalid dataset registry: {}", e)))?;
        Self::new(file.datasets)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Configuration(format!(
                "cannot read dataset registry {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn datasets(&self) -> &[DatasetSpec] {
        &self.datasets
    }

    pub fn get(&self, name: &str) -> Result<&DatasetSpec> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| IngestError::Configuration(format!("unknown dataset '{}'", name)))
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
