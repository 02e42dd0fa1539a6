//! Structured Formatter
//!
//! Renders a snapshot as a stable JSON document for machine consumption:
//! metadata, then tables (each with columns, ungrouped foreign key rows and
//! indexes), then views, then triggers. Everything stays in snapshot
//! declaration order — dependency order only matters for executable SQL, and
//! reordering here would make the document harder to eyeball against the
//! source database.

use crate::error::SchemaResult;
use crate::snapshot::SchemaSnapshot;

pub struct StructuredFormatter;

impl StructuredFormatter {
    /// Serialize the snapshot as pretty-printed JSON.
    pub fn render(snapshot: &SchemaSnapshot) -> SchemaResult<String> {
        snapshot.validate()?;
        let mut text = serde_json::to_string_pretty(snapshot)?;
        text.push('\n');
        Ok(text)
    }
}
