//! The logical query definition.

use serde::{Deserialize, Serialize};

use super::clause::{AggregationClause, FieldRef, Filter};
use super::types::{SortDirection, TableId};

/// A structured tabular query against one source collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Source table, resolved to a collection name at compile time.
    pub source_table: TableId,
    /// Aggregations to compute per group.
    #[serde(default)]
    pub aggregations: Vec<AggregationClause>,
    /// Grouping columns.
    #[serde(default)]
    pub breakouts: Vec<FieldRef>,
    /// Row filter.
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Sort order, applied in sequence.
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    /// Explicit output columns. Overrides the implicit projection order.
    #[serde(default)]
    pub fields: Vec<FieldRef>,
    /// Row limit.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Pagination.
    #[serde(default)]
    pub page: Option<Page>,
}

impl Query {
    pub fn new(source_table: TableId) -> Self {
        Self {
            source_table,
            aggregations: vec![],
            breakouts: vec![],
            filter: None,
            order_by: vec![],
            fields: vec![],
            limit: None,
            page: None,
        }
    }
}

/// An order-by item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub target: OrderTarget,
    pub direction: SortDirection,
}

/// What an order-by item sorts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderTarget {
    Field(FieldRef),
    /// Index into `Query::aggregations`.
    Aggregation(usize),
}

/// One page of `items` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub page: u64,
    /// Rows per page.
    pub items: u64,
}
