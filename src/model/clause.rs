//! Clause AST - the tagged nodes of the logical query tree.
//!
//! Every clause kind the compiler understands is a variant here, so each
//! translator can match exhaustively and the compiler enforces coverage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{FieldId, TemporalUnit};

// =============================================================================
// Field references
// =============================================================================

/// A reference to a column of the source collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldRef {
    /// Reference by metadata id, resolved through the field resolver.
    Id(FieldId),
    /// Reference by verbatim name, bypassing the resolver.
    Literal(String),
    /// A field bucketed by a calendar unit.
    Datetime {
        field: Box<FieldRef>,
        unit: TemporalUnit,
    },
}

impl FieldRef {
    pub fn id(id: FieldId) -> Self {
        FieldRef::Id(id)
    }

    pub fn literal(name: impl Into<String>) -> Self {
        FieldRef::Literal(name.into())
    }

    pub fn datetime(field: FieldRef, unit: TemporalUnit) -> Self {
        FieldRef::Datetime {
            field: Box::new(field),
            unit,
        }
    }

    /// The underlying field with any bucketing wrapper stripped.
    pub fn base(&self) -> &FieldRef {
        match self {
            FieldRef::Datetime { field, .. } => field.base(),
            other => other,
        }
    }

    /// The bucketing unit, `Default` when the reference is unbucketed.
    pub fn unit(&self) -> TemporalUnit {
        match self {
            FieldRef::Datetime { unit, .. } => *unit,
            _ => TemporalUnit::Default,
        }
    }
}

// =============================================================================
// Values
// =============================================================================

/// A literal value appearing on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Null,
    /// A point in time, bucketed by `unit` at compile time so that it is
    /// comparable with a field bucketed by the same unit.
    AbsoluteDatetime { at: DateTime<Utc>, unit: TemporalUnit },
    /// `amount` units away from the instant of compilation. Normalized to an
    /// absolute datetime before emission.
    RelativeDatetime { amount: i64, unit: TemporalUnit },
}

// =============================================================================
// Filters
// =============================================================================

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    /// The complementary operator: `not (a op b)` is `a op.negate() b`.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Ge => CompareOp::Lt,
        }
    }

    /// The aggregation-stage operator name.
    pub fn mongo_op(self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Lt => "$lt",
            CompareOp::Gt => "$gt",
            CompareOp::Le => "$lte",
            CompareOp::Ge => "$gte",
        }
    }
}

/// Substring match operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchOp {
    Contains,
    StartsWith,
    EndsWith,
}

/// A filter clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Compare {
        op: CompareOp,
        field: FieldRef,
        value: Value,
    },
    Between {
        field: FieldRef,
        lower: Value,
        upper: Value,
    },
    /// Substring match. `case_sensitive` defaults to true.
    Matches {
        op: MatchOp,
        field: FieldRef,
        needle: String,
        #[serde(default = "default_case_sensitive")]
        case_sensitive: bool,
    },
}

fn default_case_sensitive() -> bool {
    true
}

impl Filter {
    /// Rewrite to negation normal form.
    ///
    /// The target engine rejects `$not` as a match-stage operator, so
    /// negation is pushed inward: De Morgan over the connectives, operator
    /// flipping over comparisons, `not between` into a disjunction of strict
    /// comparisons, and double negation eliminated. Substring matches are
    /// the one place negation survives - the emitters render those with the
    /// value-position `$not` that the engine does accept over a regex.
    pub fn normalize(self) -> Filter {
        match self {
            Filter::And(fs) => Filter::And(fs.into_iter().map(Filter::normalize).collect()),
            Filter::Or(fs) => Filter::Or(fs.into_iter().map(Filter::normalize).collect()),
            Filter::Not(f) => f.negate(),
            leaf => leaf,
        }
    }

    /// The normalized negation of `self`.
    fn negate(self) -> Filter {
        match self {
            Filter::And(fs) => Filter::Or(fs.into_iter().map(Filter::negate).collect()),
            Filter::Or(fs) => Filter::And(fs.into_iter().map(Filter::negate).collect()),
            Filter::Not(f) => f.normalize(),
            Filter::Compare { op, field, value } => Filter::Compare {
                op: op.negate(),
                field,
                value,
            },
            Filter::Between {
                field,
                lower,
                upper,
            } => Filter::Or(vec![
                Filter::Compare {
                    op: CompareOp::Lt,
                    field: field.clone(),
                    value: lower,
                },
                Filter::Compare {
                    op: CompareOp::Gt,
                    field,
                    value: upper,
                },
            ]),
            matches @ Filter::Matches { .. } => Filter::Not(Box::new(matches)),
        }
    }

    /// Append every field reference in this filter to `out`, in clause order.
    pub(crate) fn collect_fields(&self, out: &mut Vec<FieldRef>) {
        match self {
            Filter::And(fs) | Filter::Or(fs) => {
                for f in fs {
                    f.collect_fields(out);
                }
            }
            Filter::Not(f) => f.collect_fields(out),
            Filter::Compare { field, .. }
            | Filter::Between { field, .. }
            | Filter::Matches { field, .. } => out.push(field.clone()),
        }
    }
}

// =============================================================================
// Aggregations
// =============================================================================

/// An aggregation over the rows of each group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregation {
    /// Row count.
    Count,
    /// Count of rows where the column is truthy.
    CountOf(FieldRef),
    Avg(FieldRef),
    Sum(FieldRef),
    Min(FieldRef),
    Max(FieldRef),
    /// Number of distinct values of the column.
    Distinct(FieldRef),
    /// Sum of the column over rows satisfying the predicate.
    SumWhere { field: FieldRef, predicate: Filter },
    /// Count of rows satisfying the predicate.
    CountWhere(Filter),
    /// Fraction of rows satisfying the predicate.
    Share(Filter),
}

impl Aggregation {
    /// Base name used when the clause carries no explicit name.
    pub fn default_name(&self) -> &'static str {
        match self {
            Aggregation::Count | Aggregation::CountOf(_) => "count",
            Aggregation::Avg(_) => "avg",
            Aggregation::Sum(_) => "sum",
            Aggregation::Min(_) => "min",
            Aggregation::Max(_) => "max",
            Aggregation::Distinct(_) => "distinct",
            Aggregation::SumWhere { .. } => "sum_where",
            Aggregation::CountWhere(_) => "count_where",
            Aggregation::Share(_) => "share",
        }
    }

    /// Append every field reference the aggregation reads to `out`.
    pub(crate) fn collect_fields(&self, out: &mut Vec<FieldRef>) {
        match self {
            Aggregation::Count => {}
            Aggregation::CountOf(f)
            | Aggregation::Avg(f)
            | Aggregation::Sum(f)
            | Aggregation::Min(f)
            | Aggregation::Max(f)
            | Aggregation::Distinct(f) => out.push(f.clone()),
            Aggregation::SumWhere { field, predicate } => {
                out.push(field.clone());
                predicate.collect_fields(out);
            }
            Aggregation::CountWhere(p) | Aggregation::Share(p) => p.collect_fields(out),
        }
    }
}

/// An aggregation clause with its optional caller-assigned name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationClause {
    pub agg: Aggregation,
    /// Display name carried by an aggregation-options wrapper, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AggregationClause {
    pub fn new(agg: Aggregation) -> Self {
        Self { agg, name: None }
    }

    pub fn named(agg: Aggregation, name: impl Into<String>) -> Self {
        Self {
            agg,
            name: Some(name.into()),
        }
    }
}
