//! Logical query model types.

pub mod clause;
pub mod query;
pub mod types;

pub use clause::{Aggregation, AggregationClause, CompareOp, FieldRef, Filter, MatchOp, Value};
pub use query::{OrderBy, OrderTarget, Page, Query};
pub use types::{BaseType, FieldId, SortDirection, SpecialType, TableId, TemporalUnit};
