//! Schema Snapshot Model
//!
//! The immutable in-memory representation of one database's structural schema.
//! A snapshot is built once by the collector and consumed read-only by the
//! synthesizer, the structured formatter, and the diff pipeline; none of them
//! mutate it.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::error::{SchemaError, SchemaResult};

/// Version of the snapshot/document layout, bumped on breaking shape changes.
pub const SCHEMA_FORMAT_VERSION: u32 = 1;

/// Objects whose name starts with this prefix belong to the database engine.
pub const SYSTEM_PREFIX: &str = "sqlite_";

static VIRTUAL_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*CREATE\s+VIRTUAL\s+TABLE").expect("valid regex"));

/// Snapshot provenance carried alongside the schema objects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub id: Uuid,
    /// Identifier of the database the snapshot was taken from
    pub source: String,
    pub captured_at: DateTime<Utc>,
    pub format_version: u32,
    pub checksum: String,
}

/// Complete schema snapshot at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub metadata: SnapshotMetadata,
    pub tables: Vec<Table>,
    pub views: Vec<View>,
    pub triggers: Vec<Trigger>,
}

impl SchemaSnapshot {
    /// Build a snapshot, stamping capture time, id and content checksum.
    pub fn new(
        source: impl Into<String>,
        tables: Vec<Table>,
        views: Vec<View>,
        triggers: Vec<Trigger>,
    ) -> Self {
        let checksum = Self::compute_checksum(&tables, &views, &triggers);
        Self {
            metadata: SnapshotMetadata {
                id: Uuid::new_v4(),
                source: source.into(),
                captured_at: Utc::now(),
                format_version: SCHEMA_FORMAT_VERSION,
                checksum,
            },
            tables,
            views,
            triggers,
        }
    }

    /// Compute checksum from schema content
    pub fn compute_checksum(tables: &[Table], views: &[View], triggers: &[Trigger]) -> String {
        let mut hasher = Sha256::new();

        for table in tables {
            hasher.update(table.name.as_bytes());
            hasher.update(table.sql.as_bytes());
            for col in &table.columns {
                hasher.update(
                    format!("{}.{}:{}", table.name, col.name, col.declared_type).as_bytes(),
                );
            }
            for fk in &table.foreign_keys {
                hasher.update(
                    format!("FK:{}:{}->{}", fk.group_id, fk.local_column, fk.referenced_table)
                        .as_bytes(),
                );
            }
        }
        for view in views {
            hasher.update(view.sql.as_bytes());
        }
        for trigger in triggers {
            hasher.update(trigger.sql.as_bytes());
        }

        let result = hasher.finalize();
        format!("{:x}", result)
    }

    /// Check the precondition every downstream component relies on: table
    /// names are unique within the snapshot.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(SchemaError::DuplicateTable(table.name.clone()));
            }
        }
        Ok(())
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Table representation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    /// Verbatim `CREATE TABLE` text from the source catalog
    pub sql: String,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<Index>,
}

impl Table {
    /// True for `CREATE VIRTUAL TABLE` declarations (fts5, rtree, ...).
    /// Virtual tables are never emitted as executable DDL because the
    /// backing module may not exist on the target engine.
    pub fn is_virtual(&self) -> bool {
        VIRTUAL_TABLE_RE.is_match(&self.sql)
    }

    /// Foreign key rows re-grouped into constraints: rows sharing a
    /// `group_id` form one (possibly composite) constraint, ordered by
    /// their sequence within the group.
    pub fn foreign_key_groups(&self) -> Vec<Vec<&ForeignKey>> {
        let mut groups: BTreeMap<i64, Vec<&ForeignKey>> = BTreeMap::new();
        for fk in &self.foreign_keys {
            groups.entry(fk.group_id).or_default().push(fk);
        }
        groups
            .into_values()
            .map(|mut rows| {
                rows.sort_by_key(|fk| fk.seq);
                rows
            })
            .collect()
    }
}

/// Column representation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub ordinal: i64,
    pub name: String,
    /// Declared type text, free-form (SQLite does not normalize it)
    pub declared_type: String,
    pub not_null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_expr: Option<String>,
    pub primary_key: bool,
}

/// One row of a foreign key constraint. Rows sharing `group_id` belong to
/// the same constraint; `seq` orders the column pairs inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub group_id: i64,
    pub seq: i64,
    pub referenced_table: String,
    pub local_column: String,
    /// Absent when the constraint references the parent's implicit primary key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_column: Option<String>,
    pub on_update: String,
    pub on_delete: String,
    pub match_mode: String,
}

/// How an index came into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    /// Created by an explicit `CREATE INDEX` statement
    Explicit,
    /// Implied by a UNIQUE column constraint
    UniqueConstraint,
    /// Implied by the PRIMARY KEY
    PrimaryKey,
}

impl IndexOrigin {
    /// Map the catalog's one-letter origin code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "u" => IndexOrigin::UniqueConstraint,
            "pk" => IndexOrigin::PrimaryKey,
            _ => IndexOrigin::Explicit,
        }
    }
}

/// Index representation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    pub unique: bool,
    pub origin: IndexOrigin,
    pub partial: bool,
    pub columns: Vec<String>,
    /// Verbatim `CREATE INDEX` text; absent for implied indexes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

/// View, rendered verbatim from its catalog text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub name: String,
    pub sql: String,
}

/// Trigger, rendered verbatim from its catalog text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub name: String,
    pub sql: String,
}
