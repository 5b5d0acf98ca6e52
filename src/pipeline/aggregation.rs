//! Aggregation expansion.
//!
//! `$group` only accepts plain reducers - no nested post-arithmetic - so
//! each aggregation decomposes into *reduction* bindings (legal in the
//! group stage) and *post* bindings (computed from the reductions in a
//! following `$addFields`). Most aggregations are a single reduction;
//! `distinct` and `share` need the post step.

use bson::{bson, Bson};

use crate::error::CompileResult;
use crate::model::Aggregation;

use super::rvalue::Compiler;

/// The two halves of a compiled aggregation.
pub struct ExpandedAggregation {
    /// Bindings for the `$group` stage.
    pub reductions: Vec<(String, Bson)>,
    /// Bindings for the `$addFields` stage that follows it.
    pub posts: Vec<(String, Bson)>,
}

impl ExpandedAggregation {
    fn reduction(name: String, expr: Bson) -> Self {
        Self {
            reductions: vec![(name, expr)],
            posts: vec![],
        }
    }
}

impl Compiler<'_> {
    /// Expand the aggregation at `index` of the current query.
    pub fn expand_aggregation(&self, index: usize) -> CompileResult<ExpandedAggregation> {
        let clause = &self.query.aggregations[index];
        let name = self.agg_name(index)?.to_string();
        let expanded = match &clause.agg {
            Aggregation::Count => ExpandedAggregation::reduction(name, bson!({ "$sum": 1 })),
            Aggregation::CountOf(field) => ExpandedAggregation::reduction(
                name,
                bson!({
                    "$sum": { "$cond": { "if": self.rvalue_field(field)?, "then": 1, "else": 0 } }
                }),
            ),
            Aggregation::Avg(field) => ExpandedAggregation::reduction(
                name,
                bson!({ "$avg": self.rvalue_field(field)? }),
            ),
            Aggregation::Sum(field) => ExpandedAggregation::reduction(
                name,
                bson!({ "$sum": self.rvalue_field(field)? }),
            ),
            Aggregation::Min(field) => ExpandedAggregation::reduction(
                name,
                bson!({ "$min": self.rvalue_field(field)? }),
            ),
            Aggregation::Max(field) => ExpandedAggregation::reduction(
                name,
                bson!({ "$max": self.rvalue_field(field)? }),
            ),
            Aggregation::Distinct(field) => {
                // $addToSet collects the values; the visible column is the
                // set's size, computed in the post step.
                let set_name = format!("{name}_set");
                ExpandedAggregation {
                    reductions: vec![(
                        set_name.clone(),
                        bson!({ "$addToSet": self.rvalue_field(field)? }),
                    )],
                    posts: vec![(name, bson!({ "$size": format!("${set_name}") }))],
                }
            }
            Aggregation::SumWhere { field, predicate } => ExpandedAggregation::reduction(
                name,
                bson!({
                    "$sum": {
                        "$cond": {
                            "if": self.condition_expr(predicate)?,
                            "then": self.rvalue_field(field)?,
                            "else": 0,
                        }
                    }
                }),
            ),
            Aggregation::CountWhere(predicate) => ExpandedAggregation::reduction(
                name,
                bson!({
                    "$sum": {
                        "$cond": { "if": self.condition_expr(predicate)?, "then": 1, "else": 0 }
                    }
                }),
            ),
            Aggregation::Share(predicate) => {
                let matched = format!("{name}_count_where");
                let total = format!("{name}_count");
                ExpandedAggregation {
                    reductions: vec![
                        (
                            matched.clone(),
                            bson!({
                                "$sum": {
                                    "$cond": {
                                        "if": self.condition_expr(predicate)?,
                                        "then": 1,
                                        "else": 0,
                                    }
                                }
                            }),
                        ),
                        (total.clone(), bson!({ "$sum": 1 })),
                    ],
                    posts: vec![(
                        name,
                        bson!({ "$divide": [format!("${matched}"), format!("${total}")] }),
                    )],
                }
            }
        };
        Ok(expanded)
    }
}
