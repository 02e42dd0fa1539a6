//! Schema Collector
//!
//! Reads a live SQLite database's catalog and materializes it as a
//! [`SchemaSnapshot`]. This is the only component that touches the database;
//! everything downstream works on the snapshot alone. Each metadata fetch is
//! wrapped in the retry decorator, since the database may sit on flaky
//! storage (network mounts, litestream replicas).

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{SchemaError, SchemaResult};
use crate::retry::{with_retry, RetryPolicy};
use crate::snapshot::{
    Column, ForeignKey, Index, IndexOrigin, SchemaSnapshot, Table, Trigger, View, SYSTEM_PREFIX,
};
use crate::synthesize::quote_identifier;

/// What the collector should include and how hard it should try
#[derive(Debug, Clone, Default)]
pub struct CollectorOptions {
    /// Include `sqlite_*` objects, which are excluded by default
    pub include_system: bool,
    /// When non-empty, only these tables are collected
    pub include_tables: Vec<String>,
    /// Tables dropped from the snapshot after the include filter
    pub exclude_tables: Vec<String>,
    pub retry: RetryPolicy,
}

/// One `sqlite_master` row
#[derive(Debug)]
struct CatalogRow {
    kind: String,
    name: String,
    sql: String,
}

/// Schema collector for SQLite databases
pub struct SqliteCollector {
    conn: tokio_rusqlite::Connection,
    source: String,
    options: CollectorOptions,
}

impl SqliteCollector {
    /// Open a collector over the database file at `path`.
    pub async fn open(path: impl AsRef<Path>, options: CollectorOptions) -> SchemaResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            // rusqlite would silently create an empty database here.
            return Err(SchemaError::InvalidSource(format!(
                "database file not found: {}",
                path.display()
            )));
        }
        let conn = tokio_rusqlite::Connection::open(path.to_path_buf()).await?;
        Ok(Self {
            conn,
            source: path.display().to_string(),
            options,
        })
    }

    /// Open a collector over a fresh in-memory database — useful for testing.
    #[allow(dead_code)]
    pub async fn open_in_memory(
        source: impl Into<String>,
        options: CollectorOptions,
    ) -> SchemaResult<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Ok(Self {
            conn,
            source: source.into(),
            options,
        })
    }

    /// Introspect the complete schema into a snapshot.
    pub async fn collect(&self) -> SchemaResult<SchemaSnapshot> {
        let catalog = with_retry(&self.options.retry, || self.catalog_objects()).await?;
        let index_sql = with_retry(&self.options.retry, || self.index_catalog_sql()).await?;

        let mut tables = Vec::new();
        let mut views = Vec::new();
        let mut triggers = Vec::new();

        for row in catalog {
            match row.kind.as_str() {
                "table" if self.keep_table(&row.name) => {
                    let name = row.name.clone();
                    let (columns, foreign_keys, mut indexes) =
                        with_retry(&self.options.retry, || self.table_detail(name.clone()))
                            .await?;
                    for index in &mut indexes {
                        index.sql = index_sql.get(&index.name).cloned();
                    }
                    tables.push(Table {
                        name: row.name,
                        sql: row.sql,
                        columns,
                        foreign_keys,
                        indexes,
                    });
                }
                "view" if self.keep_object(&row.name) => {
                    views.push(View {
                        name: row.name,
                        sql: row.sql,
                    });
                }
                "trigger" if self.keep_object(&row.name) => {
                    triggers.push(Trigger {
                        name: row.name,
                        sql: row.sql,
                    });
                }
                _ => {}
            }
        }

        debug!(
            "collected schema from {}: {} tables, {} views, {} triggers",
            self.source,
            tables.len(),
            views.len(),
            triggers.len()
        );

        let snapshot = SchemaSnapshot::new(self.source.clone(), tables, views, triggers);
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn keep_table(&self, name: &str) -> bool {
        if !self.keep_object(name) {
            return false;
        }
        if !self.options.include_tables.is_empty()
            && !self.options.include_tables.iter().any(|t| t.as_str() == name)
        {
            return false;
        }
        !self.options.exclude_tables.iter().any(|t| t.as_str() == name)
    }

    fn keep_object(&self, name: &str) -> bool {
        self.options.include_system || !name.starts_with(SYSTEM_PREFIX)
    }

    /// Tables, views and triggers in declaration (rowid) order.
    async fn catalog_objects(&self) -> SchemaResult<Vec<CatalogRow>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT type, name, COALESCE(sql, '') FROM sqlite_master \
                     WHERE type IN ('table', 'view', 'trigger') ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(CatalogRow {
                            kind: row.get(0)?,
                            name: row.get(1)?,
                            sql: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Original `CREATE INDEX` text by index name. Implied indexes have no
    /// catalog text and simply do not appear here.
    async fn index_catalog_sql(&self) -> SchemaResult<HashMap<String, String>> {
        let map = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, sql FROM sqlite_master \
                     WHERE type = 'index' AND sql IS NOT NULL",
                )?;
                let map = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<HashMap<String, String>, _>>()?;
                Ok(map)
            })
            .await?;
        Ok(map)
    }

    /// Columns, foreign key rows and index list for one table.
    async fn table_detail(
        &self,
        table: String,
    ) -> SchemaResult<(Vec<Column>, Vec<ForeignKey>, Vec<Index>)> {
        let detail = self
            .conn
            .call(move |conn| {
                let quoted = quote_identifier(&table);

                let mut stmt = conn.prepare(&format!("PRAGMA table_info({quoted})"))?;
                let columns = stmt
                    .query_map([], |row| {
                        Ok(Column {
                            ordinal: row.get(0)?,
                            name: row.get(1)?,
                            declared_type: row.get(2)?,
                            not_null: row.get(3)?,
                            default_expr: row.get(4)?,
                            primary_key: row.get::<_, i64>(5)? > 0,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({quoted})"))?;
                let foreign_keys = stmt
                    .query_map([], |row| {
                        Ok(ForeignKey {
                            group_id: row.get(0)?,
                            seq: row.get(1)?,
                            referenced_table: row.get(2)?,
                            local_column: row.get(3)?,
                            referenced_column: row.get(4)?,
                            on_update: row.get(5)?,
                            on_delete: row.get(6)?,
                            match_mode: row.get(7)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut stmt = conn.prepare(&format!("PRAGMA index_list({quoted})"))?;
                let listed = stmt
                    .query_map([], |row| {
                        let name: String = row.get(1)?;
                        let unique: bool = row.get(2)?;
                        let origin: String = row.get(3)?;
                        let partial: bool = row.get(4)?;
                        Ok((name, unique, origin, partial))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut indexes = Vec::with_capacity(listed.len());
                for (name, unique, origin, partial) in listed {
                    let mut stmt =
                        conn.prepare(&format!("PRAGMA index_info({})", quote_identifier(&name)))?;
                    let columns = stmt
                        .query_map([], |row| {
                            // Expression index members have no column name.
                            let column: Option<String> = row.get(2)?;
                            Ok(column.unwrap_or_else(|| "<expr>".to_string()))
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    indexes.push(Index {
                        name,
                        unique,
                        origin: IndexOrigin::from_code(&origin),
                        partial,
                        columns,
                        sql: None,
                    });
                }

                Ok((columns, foreign_keys, indexes))
            })
            .await?;
        Ok(detail)
    }

    #[cfg(test)]
    async fn execute_batch(&self, sql: &str) -> SchemaResult<()> {
        let sql = sql.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
