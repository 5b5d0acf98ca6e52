//! Escaping of field names for use as stage keys.
//!
//! The aggregation engine rejects group-key names containing `.`, so nested
//! document paths are flattened behind an escape scheme before the first
//! projection stage and folded back when results are post-processed:
//!
//! - the path separator `.` becomes `___`
//! - a bucketed column carries a `~~~<unit>` suffix naming its unit
//!
//! The round trip `unescape(escape(path)) == path` holds for every path that
//! contains neither marker.

use crate::error::{CompileError, CompileResult};
use crate::metadata::FieldResolver;
use crate::model::{FieldId, TemporalUnit};

/// Path separator in escaped names.
pub const PATH_MARKER: &str = "___";

/// Separator between an escaped name and its bucketing unit.
pub const UNIT_MARKER: &str = "~~~";

/// Longest parent chain we are willing to follow before assuming the
/// metadata contains a cycle.
const MAX_PATH_DEPTH: usize = 64;

/// Join path segments into a flat, group-key-safe identifier.
pub fn escape_path(segments: &[String]) -> String {
    segments.join(PATH_MARKER)
}

/// Append a unit suffix to an escaped name.
pub fn with_unit(name: &str, unit: TemporalUnit) -> String {
    format!("{name}{UNIT_MARKER}{unit}")
}

/// Invert the escape scheme: strip any unit suffix and restore `.`
/// separators.
pub fn unescape(name: &str) -> String {
    let base = match name.find(UNIT_MARKER) {
        Some(idx) => &name[..idx],
        None => name,
    };
    base.replace(PATH_MARKER, ".")
}

/// Whether a result key needs renaming during post-processing.
pub fn is_escaped(name: &str) -> bool {
    name.contains(PATH_MARKER) || name.contains(UNIT_MARKER)
}

/// Resolve a field id to its full path, outermost segment first.
pub fn field_path(resolver: &dyn FieldResolver, id: FieldId) -> CompileResult<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = Some(id);
    while let Some(id) = current {
        if segments.len() >= MAX_PATH_DEPTH {
            return Err(CompileError::FieldResolution(id));
        }
        let record = resolver
            .field(id)
            .ok_or(CompileError::FieldResolution(id))?;
        segments.push(record.name);
        current = record.parent_id;
    }
    segments.reverse();
    Ok(segments)
}
