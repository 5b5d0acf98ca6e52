//! Result post-processing.
//!
//! The driver hands back rows keyed by the escaped names the pipeline
//! computed with. Post-processing inverts the compile-time transforms:
//! escaped keys are renamed to their dotted source paths, `{___date: ...}`
//! envelopes are rehydrated into real timestamps, and - for structured
//! queries - the row keys are checked against the predicted projections.
//! A failed check means the compiler emitted something it did not predict,
//! which is a bug in the compiler rather than in the query.

use bson::{Bson, Document};
use tracing::warn;

use crate::compile::CompileOutput;
use crate::error::{CompileError, CompileResult};
use crate::pipeline::datetime::parse_timestamp;
use crate::pipeline::names;
use crate::pipeline::DATE_MARKER;

/// Post-process executed rows back into the caller's schema.
pub fn process_results(
    output: &CompileOutput,
    rows: Vec<Document>,
) -> CompileResult<Vec<Document>> {
    if !output.structured {
        return Ok(rows);
    }

    let expected: Vec<String> = output
        .projections
        .iter()
        .map(|name| names::unescape(name))
        .collect();

    let mut processed = Vec::with_capacity(rows.len());
    for row in rows {
        let row = rehydrate_document(rename_keys(row))?;
        // A query with no projection stages returns raw documents; there
        // is no predicted column set to hold the rows against.
        if !expected.is_empty() {
            check_columns(&row, &expected)?;
        }
        processed.push(row);
    }
    Ok(processed)
}

/// Rename every escaped key in a row to its dotted, unit-free form.
fn rename_keys(row: Document) -> Document {
    row.into_iter()
        .map(|(key, value)| {
            if names::is_escaped(&key) {
                (names::unescape(&key), value)
            } else {
                (key, value)
            }
        })
        .collect()
}

/// Replace every `{___date: "<string>"}` envelope, at any depth, with the
/// timestamp it encodes.
fn rehydrate_value(value: Bson) -> CompileResult<Bson> {
    match value {
        Bson::Document(doc) => {
            if doc.len() == 1 {
                if let Some(Bson::String(encoded)) = doc.get(DATE_MARKER) {
                    let at = parse_timestamp(encoded).ok_or_else(|| {
                        CompileError::PipelineSchema(format!(
                            "unparsable date envelope `{encoded}`"
                        ))
                    })?;
                    return Ok(Bson::DateTime(bson::DateTime::from_chrono(at)));
                }
            }
            Ok(Bson::Document(rehydrate_document(doc)?))
        }
        Bson::Array(items) => Ok(Bson::Array(
            items
                .into_iter()
                .map(rehydrate_value)
                .collect::<CompileResult<Vec<_>>>()?,
        )),
        other => Ok(other),
    }
}

fn rehydrate_document(doc: Document) -> CompileResult<Document> {
    doc.into_iter()
        .map(|(key, value)| Ok((key, rehydrate_value(value)?)))
        .collect()
}

/// Structured queries must not surface columns the compile did not
/// predict. Logged before raising, since this fires only after a
/// successful execution.
fn check_columns(row: &Document, expected: &[String]) -> CompileResult<()> {
    let mut unexpected: Vec<String> = row
        .keys()
        .filter(|key| !expected.iter().any(|name| name == *key))
        .cloned()
        .collect();
    if unexpected.is_empty() {
        return Ok(());
    }
    unexpected.sort();
    warn!(
        columns = ?unexpected,
        "query results contained columns the compiler did not predict"
    );
    Err(CompileError::UnexpectedColumns(unexpected))
}
