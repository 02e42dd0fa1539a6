//! SQL Synthesizer
//!
//! Renders a snapshot into one executable script. Table bodies come verbatim
//! from the source catalog (re-deriving them column by column would lose
//! dialect-specific syntax); the synthesizer's job is ordering, filtering and
//! the deferred foreign key statements:
//!
//! - tables are emitted in dependency order (see `graph`),
//! - only explicitly created indexes get standalone statements — indexes
//!   implied by a primary key or unique constraint are already part of the
//!   table body and re-emitting them would fail with duplicate constraints,
//! - every foreign key group becomes one `ALTER TABLE ... ADD FOREIGN KEY`
//!   after all tables exist, so the script stays valid even when a reference
//!   cycle forced an imperfect table order,
//! - virtual tables are preserved as comment blocks since their backing
//!   module may be missing on the target engine.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::error::SchemaResult;
use crate::graph;
use crate::snapshot::{ForeignKey, Index, IndexOrigin, SchemaSnapshot, Table};

/// Prefix of the header line carrying the capture timestamp. The diff engine
/// strips lines with this prefix before comparing two scripts.
pub const GENERATED_PREFIX: &str = "-- Generated: ";

/// SQLite keyword list; identifiers colliding with these are quoted.
static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ALWAYS", "ANALYZE", "AND", "AS",
        "ASC", "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE",
        "CAST", "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE",
        "CROSS", "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE",
        "DEFAULT", "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH", "DISTINCT", "DO",
        "DROP", "EACH", "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUDE", "EXCLUSIVE", "EXISTS",
        "EXPLAIN", "FAIL", "FILTER", "FIRST", "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL",
        "GENERATED", "GLOB", "GROUP", "GROUPS", "HAVING", "IF", "IGNORE", "IMMEDIATE", "IN",
        "INDEX", "INDEXED", "INITIALLY", "INNER", "INSERT", "INSTEAD", "INTERSECT", "INTO",
        "IS", "ISNULL", "JOIN", "KEY", "LAST", "LEFT", "LIKE", "LIMIT", "MATCH", "MATERIALIZED",
        "NATURAL", "NO", "NOT", "NOTHING", "NOTNULL", "NULL", "NULLS", "OF", "OFFSET", "ON",
        "OR", "ORDER", "OTHERS", "OUTER", "OVER", "PARTITION", "PLAN", "PRAGMA", "PRECEDING",
        "PRIMARY", "QUERY", "RAISE", "RANGE", "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX",
        "RELEASE", "RENAME", "REPLACE", "RESTRICT", "RETURNING", "RIGHT", "ROLLBACK", "ROW",
        "ROWS", "SAVEPOINT", "SELECT", "SET", "TABLE", "TEMP", "TEMPORARY", "THEN", "TIES",
        "TO", "TRANSACTION", "TRIGGER", "UNBOUNDED", "UNION", "UNIQUE", "UPDATE", "USING",
        "VACUUM", "VALUES", "VIEW", "VIRTUAL", "WHEN", "WHERE", "WINDOW", "WITH", "WITHOUT",
    ]
    .into_iter()
    .collect()
});

/// Quote an identifier when it needs it: characters outside `[A-Za-z0-9_]`,
/// a leading digit, or a reserved-word collision. Embedded quotes are
/// escaped by doubling.
pub fn quote_identifier(name: &str) -> String {
    let starts_with_digit = name.chars().next().is_some_and(|c| c.is_ascii_digit());
    let plain = !name.is_empty()
        && !starts_with_digit
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED_WORDS.contains(name.to_ascii_uppercase().as_str());

    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// The script renderer
pub struct SqlSynthesizer;

impl SqlSynthesizer {
    /// Render the snapshot into one executable script. Pure text production;
    /// an empty snapshot yields a header-only script.
    pub fn render(snapshot: &SchemaSnapshot) -> SchemaResult<String> {
        let order = graph::creation_order(snapshot)?;

        let mut out = String::new();
        out.push_str("-- Schema dump produced by schemascribe\n");
        out.push_str(&format!("-- Source: {}\n", snapshot.metadata.source));
        out.push_str(&format!(
            "{}{}\n\n",
            GENERATED_PREFIX,
            snapshot.metadata.captured_at.to_rfc3339()
        ));

        for name in &order {
            let Some(table) = snapshot.table(name) else {
                continue;
            };
            if table.is_virtual() {
                Self::render_virtual_table(&mut out, table);
            } else {
                Self::push_statement(&mut out, &table.sql);
            }
            for index in &table.indexes {
                if index.origin == IndexOrigin::Explicit {
                    Self::render_index(&mut out, table, index);
                }
            }
        }

        // Constraints last: every referenced table exists by now, whatever
        // the creation order was.
        for name in &order {
            let Some(table) = snapshot.table(name) else {
                continue;
            };
            for group in table.foreign_key_groups() {
                out.push_str(&Self::render_foreign_key(&table.name, &group));
                out.push_str("\n\n");
            }
        }

        for view in &snapshot.views {
            Self::push_statement(&mut out, &view.sql);
        }
        for trigger in &snapshot.triggers {
            Self::push_statement(&mut out, &trigger.sql);
        }

        Ok(out)
    }

    /// Append one verbatim statement, normalizing the trailing terminator.
    fn push_statement(out: &mut String, sql: &str) {
        out.push_str(sql.trim().trim_end_matches(';').trim_end());
        out.push_str(";\n\n");
    }

    fn render_virtual_table(out: &mut String, table: &Table) {
        out.push_str(&format!(
            "-- Virtual table {} skipped: its module may not exist on the target engine\n",
            table.name
        ));
        for line in table.sql.trim().trim_end_matches(';').lines() {
            out.push_str("-- ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }

    fn render_index(out: &mut String, table: &Table, index: &Index) {
        match &index.sql {
            Some(sql) => Self::push_statement(out, sql),
            None => {
                let unique = if index.unique { "UNIQUE " } else { "" };
                let columns: Vec<String> =
                    index.columns.iter().map(|c| quote_identifier(c)).collect();
                Self::push_statement(
                    out,
                    &format!(
                        "CREATE {}INDEX {} ON {} ({})",
                        unique,
                        quote_identifier(&index.name),
                        quote_identifier(&table.name),
                        columns.join(", ")
                    ),
                );
            }
        }
    }

    /// One deferred constraint per foreign key group. The referenced column
    /// list is omitted when any row targets the parent's implicit primary
    /// key; default referential actions are left implicit.
    fn render_foreign_key(table: &str, group: &[&ForeignKey]) -> String {
        let locals: Vec<String> = group
            .iter()
            .map(|fk| quote_identifier(&fk.local_column))
            .collect();
        let referenced: Option<Vec<String>> = group
            .iter()
            .map(|fk| fk.referenced_column.as_deref().map(quote_identifier))
            .collect();

        let first = group[0];
        let mut stmt = format!(
            "ALTER TABLE {} ADD FOREIGN KEY ({}) REFERENCES {}",
            quote_identifier(table),
            locals.join(", "),
            quote_identifier(&first.referenced_table)
        );
        if let Some(columns) = referenced {
            stmt.push_str(&format!(" ({})", columns.join(", ")));
        }
        if !first.on_update.eq_ignore_ascii_case("NO ACTION") {
            stmt.push_str(&format!(" ON UPDATE {}", first.on_update));
        }
        if !first.on_delete.eq_ignore_ascii_case("NO ACTION") {
            stmt.push_str(&format!(" ON DELETE {}", first.on_delete));
        }
        stmt.push(';');
        stmt
    }
}
