//! The compile context and clause-to-expression dispatch.
//!
//! Every clause that can name a column has three renderings:
//!
//! - its **lvalue**, the escaped flat name used as a stage key;
//! - its **initial rvalue**, the expression that defines it in the first
//!   projection stage, addressing the source document;
//! - its **rvalue**, the `"$name"` reference later stages use.
//!
//! Forcing everything through one initial projection means every later
//! stage addresses flat names only, which side-steps the group-key dot
//! restriction and computes each datetime bucket exactly once.

use bson::Bson;
use chrono::{DateTime, Utc};

use crate::error::{CompileError, CompileResult};
use crate::metadata::FieldResolver;
use crate::model::{FieldRef, OrderTarget, Query, SpecialType, Value};

use super::datetime;
use super::names;

/// Context for one compile: the query, the resolver, the instant "now", and
/// the pre-assigned aggregation names.
///
/// The context is built once per compile and only read afterwards, so a
/// resolver that is safe for concurrent reads makes the whole compiler safe
/// to call from many threads.
pub struct Compiler<'a> {
    pub(crate) query: &'a Query,
    resolver: &'a dyn FieldResolver,
    now: DateTime<Utc>,
    agg_names: Vec<String>,
}

impl<'a> Compiler<'a> {
    pub fn new(query: &'a Query, resolver: &'a dyn FieldResolver, now: DateTime<Utc>) -> Self {
        let agg_names = aggregation_names(query);
        Self {
            query,
            resolver,
            now,
            agg_names,
        }
    }

    /// The name assigned to the aggregation at `index`.
    pub fn agg_name(&self, index: usize) -> CompileResult<&str> {
        self.agg_names
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| CompileError::InvalidQuery {
                reason: format!("aggregation index {index} out of range"),
                clause: format!("{:?}", self.query.aggregations),
            })
    }

    /// Escaped flat name for a field reference.
    pub fn lvalue(&self, field: &FieldRef) -> CompileResult<String> {
        match field {
            FieldRef::Id(id) => Ok(names::escape_path(&names::field_path(self.resolver, *id)?)),
            FieldRef::Literal(name) => {
                if name.is_empty() {
                    return Err(CompileError::invalid("blank field name", field));
                }
                Ok(name.clone())
            }
            FieldRef::Datetime { field: base, unit } => {
                Ok(names::with_unit(&self.lvalue(base)?, *unit))
            }
        }
    }

    /// Stage key for an order-by target.
    pub fn order_lvalue(&self, target: &OrderTarget) -> CompileResult<String> {
        match target {
            OrderTarget::Field(f) => self.lvalue(f),
            OrderTarget::Aggregation(i) => Ok(self.agg_name(*i)?.to_string()),
        }
    }

    /// Expression defining a field in the initial projection stage.
    pub fn initial_rvalue(&self, field: &FieldRef) -> CompileResult<Bson> {
        match field {
            FieldRef::Id(_) | FieldRef::Literal(_) => {
                Ok(Bson::String(format!("${}", self.source_path(field)?)))
            }
            FieldRef::Datetime { field: base, unit } => {
                if matches!(base.as_ref(), FieldRef::Datetime { .. }) {
                    return Err(CompileError::invalid("nested datetime bucketing", field));
                }
                let special = self.check_bucketable(base)?;
                let source = Bson::String(format!("${}", self.source_path(base)?));
                Ok(datetime::bucket_expr(source, special, *unit))
            }
        }
    }

    /// Reference to an already-projected column, for use in later stages.
    pub fn rvalue_field(&self, field: &FieldRef) -> CompileResult<Bson> {
        Ok(Bson::String(format!("${}", self.lvalue(field)?)))
    }

    /// Render a literal value, normalizing datetimes to their bucketed form.
    pub fn rvalue_value(&self, value: &Value) -> CompileResult<Bson> {
        let rendered = match value {
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int(i) => Bson::Int64(*i),
            Value::Float(f) => Bson::Double(*f),
            Value::String(s) => Bson::String(s.clone()),
            Value::Null => Bson::Null,
            Value::AbsoluteDatetime { at, unit } => datetime::absolute_value(*at, *unit),
            Value::RelativeDatetime { amount, unit } => {
                let at = datetime::relative_to_absolute(self.now, *amount, *unit)?;
                datetime::absolute_value(at, *unit)
            }
        };
        Ok(rendered)
    }

    /// Dotted path of a field in the source document.
    fn source_path(&self, field: &FieldRef) -> CompileResult<String> {
        match field {
            FieldRef::Id(id) => Ok(names::field_path(self.resolver, *id)?.join(".")),
            FieldRef::Literal(name) => Ok(name.clone()),
            FieldRef::Datetime { field: base, .. } => self.source_path(base),
        }
    }

    /// Bucketing is only legal on fields with a calendar position; returns
    /// the special type so UNIX timestamps can be coerced.
    fn check_bucketable(&self, base: &FieldRef) -> CompileResult<Option<SpecialType>> {
        match base {
            FieldRef::Id(id) => {
                let record = self
                    .resolver
                    .field(*id)
                    .ok_or(CompileError::FieldResolution(*id))?;
                if !record.is_bucketable() {
                    return Err(CompileError::invalid(
                        format!("field `{}` cannot be bucketed by a calendar unit", record.name),
                        base,
                    ));
                }
                Ok(record.special_type)
            }
            // Literal references carry no metadata; trust the caller.
            _ => Ok(None),
        }
    }
}

/// Pre-assign a stable name to every aggregation.
///
/// Explicit names from aggregation-options win; unnamed aggregations get
/// their operator name, disambiguated with their index when that name is
/// already taken. Identical queries always produce identical names.
fn aggregation_names(query: &Query) -> Vec<String> {
    let mut taken: Vec<String> = query
        .aggregations
        .iter()
        .filter_map(|c| c.name.clone())
        .collect();
    let mut out = Vec::with_capacity(query.aggregations.len());
    for (index, clause) in query.aggregations.iter().enumerate() {
        let name = match &clause.name {
            Some(explicit) => explicit.clone(),
            None => {
                let base = clause.agg.default_name().to_string();
                let name = if taken.contains(&base) {
                    format!("{base}_{index}")
                } else {
                    base
                };
                taken.push(name.clone());
                name
            }
        };
        out.push(name);
    }
    out
}
