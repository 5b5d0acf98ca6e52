//! # Mangrove
//!
//! A query compiler that translates structured tabular queries into MongoDB
//! aggregation pipelines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           Logical Query (clauses, Rust types)            │
//! │  (filters, aggregations, breakouts, order, pagination)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [field resolver]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Resolved names + escaped flat identifiers         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [stage handlers, fixed order]
//! ┌─────────────────────────────────────────────────────────┐
//! │      Aggregation Pipeline (ordered single-key stages)    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [driver, out of scope] ... results
//! ┌─────────────────────────────────────────────────────────┐
//! │   Post-processing (unescape keys, rehydrate dates,       │
//! │   verify columns)                                        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The target engine refuses several natural constructions - `$not` at the
//! top of a match stage, dots in group keys, post-arithmetic inside
//! `$group`, first-class date bucketing - so the compiler reshapes queries
//! instead: negations are pushed inward, nested paths are escaped behind a
//! universal first projection, aggregations split into group and
//! add-fields halves, and calendar units are synthesized from arithmetic
//! stage operators.
//!
//! Compilation is pure and synchronous: the only external call is the
//! field lookup behind [`metadata::FieldResolver`], and nothing is shared
//! between compiles, so the compiler may be called from many threads at
//! once. Executing the pipeline is the caller's business.

pub mod compile;
pub mod error;
pub mod metadata;
pub mod model;
pub mod native;
pub mod pipeline;
pub mod results;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{compile, compile_native, CompileOptions, CompileOutput};
    pub use crate::error::{CompileError, CompileResult};
    pub use crate::metadata::{FieldRecord, FieldResolver, StaticMetadata, TableRecord};
    pub use crate::model::{
        Aggregation, AggregationClause, BaseType, CompareOp, FieldRef, Filter, MatchOp, OrderBy,
        OrderTarget, Page, Query, SortDirection, SpecialType, TemporalUnit, Value,
    };
    pub use crate::results::process_results;
}

// Also export the main entry points at crate root for convenience
pub use compile::{compile, compile_native, CompileOptions, CompileOutput};
pub use error::{CompileError, CompileResult};
pub use results::process_results;
