//! End-to-end compilation from a logical query to an aggregation pipeline.
//!
//! This module provides the high-level API:
//!
//! ```text
//! Query → resolve collection → build context → fold stage handlers → Pipeline
//! ```
//!
//! # Example
//!
//! ```
//! use mangrove::compile::{compile, CompileOptions};
//! use mangrove::metadata::{FieldRecord, StaticMetadata};
//! use mangrove::model::{Aggregation, AggregationClause, BaseType, FieldRef, Query};
//!
//! let metadata = StaticMetadata::new()
//!     .with_table(1, "orders")
//!     .with_field(FieldRecord {
//!         id: 10,
//!         name: "status".into(),
//!         parent_id: None,
//!         base_type: BaseType::Text,
//!         special_type: None,
//!     });
//!
//! let mut query = Query::new(1);
//! query.breakouts = vec![FieldRef::id(10)];
//! query.aggregations = vec![AggregationClause::new(Aggregation::Count)];
//!
//! let output = compile(&query, &metadata, CompileOptions::default())?;
//! assert_eq!(output.collection, "orders");
//! assert_eq!(output.projections, vec!["status", "count"]);
//! # Ok::<(), mangrove::error::CompileError>(())
//! ```

use bson::Document;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::metadata::FieldResolver;
use crate::model::Query;
use crate::native;
use crate::pipeline::Compiler;

// ============================================================================
// Options
// ============================================================================

/// Options for compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// The instant relative datetimes are anchored to. Defaults to the
    /// moment `compile` is called; fix it for reproducible output.
    pub now: Option<DateTime<Utc>>,
}

impl CompileOptions {
    /// Anchor relative datetimes to a fixed instant.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// A compiled query, ready to hand to the document-store driver.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Collection to run the pipeline against.
    pub collection: String,
    /// Terminal column order, escaped names. Empty for native queries.
    pub projections: Vec<String>,
    /// The stage sequence.
    pub pipeline: Vec<Document>,
    /// Whether this compile came from a structured query. Structured
    /// results go through post-processing and the column check; native
    /// results pass through untouched.
    pub structured: bool,
}

// ============================================================================
// Compilation Functions
// ============================================================================

/// Compile a structured query into an aggregation pipeline.
pub fn compile(
    query: &Query,
    resolver: &dyn FieldResolver,
    options: CompileOptions,
) -> CompileResult<CompileOutput> {
    let collection = resolver
        .table(query.source_table)
        .ok_or(CompileError::TableResolution(query.source_table))?
        .name;

    let now = options.now.unwrap_or_else(Utc::now);
    let compiler = Compiler::new(query, resolver, now);
    let ctx = compiler.compile_pipeline()?;

    debug!(
        collection = %collection,
        stages = ctx.stages.len(),
        columns = ctx.projections.len(),
        "compiled structured query"
    );

    Ok(CompileOutput {
        collection,
        projections: ctx.projections,
        pipeline: ctx.stages,
        structured: true,
    })
}

/// Pass a native (raw text) query through the constructor codec.
///
/// Native queries are the caller's own pipeline; no stages are added or
/// reordered, and results skip post-processing.
pub fn compile_native(text: &str, collection: impl Into<String>) -> CompileResult<CompileOutput> {
    let pipeline = native::parse_pipeline(text)?;
    let collection = collection.into();

    debug!(
        collection = %collection,
        stages = pipeline.len(),
        "decoded native query"
    );

    Ok(CompileOutput {
        collection,
        projections: vec![],
        pipeline,
        structured: false,
    })
}
