//! Condition translation: clause tree to expression form.
//!
//! Inside `$cond` (conditional aggregations) comparisons must be written as
//! expressions - `{$eq: [a, b]}` - rather than as match documents. The
//! normalizer is shared with the filter translator; only the emission
//! differs. Substring matches have no regex form here, so they become
//! `$indexOfCP` / `$substrCP` predicates over the projected column.

use bson::{bson, Bson};

use crate::error::{CompileError, CompileResult};
use crate::model::{Filter, MatchOp};

use super::rvalue::Compiler;

impl Compiler<'_> {
    /// Translate a predicate into an expression usable as `$cond.if`.
    pub fn condition_expr(&self, filter: &Filter) -> CompileResult<Bson> {
        self.cond_normalized(filter.clone().normalize())
    }

    fn cond_normalized(&self, filter: Filter) -> CompileResult<Bson> {
        let expr = match filter {
            Filter::And(fs) => {
                let parts = fs
                    .into_iter()
                    .map(|f| self.cond_normalized(f))
                    .collect::<CompileResult<Vec<_>>>()?;
                bson!({ "$and": parts })
            }
            Filter::Or(fs) => {
                let parts = fs
                    .into_iter()
                    .map(|f| self.cond_normalized(f))
                    .collect::<CompileResult<Vec<_>>>()?;
                bson!({ "$or": parts })
            }
            Filter::Compare { op, field, value } => {
                let mut doc = bson::Document::new();
                doc.insert(
                    op.mongo_op(),
                    vec![self.rvalue_field(&field)?, self.rvalue_value(&value)?],
                );
                Bson::Document(doc)
            }
            Filter::Between {
                field,
                lower,
                upper,
            } => {
                let column = self.rvalue_field(&field)?;
                bson!({
                    "$and": [
                        { "$gte": [column.clone(), self.rvalue_value(&lower)?] },
                        { "$lte": [column, self.rvalue_value(&upper)?] },
                    ]
                })
            }
            Filter::Matches {
                op,
                field,
                needle,
                case_sensitive,
            } => self.string_predicate(op, &field, &needle, case_sensitive)?,
            Filter::Not(inner) => match *inner {
                matches @ Filter::Matches { .. } => {
                    bson!({ "$not": [self.cond_normalized(matches)?] })
                }
                other => {
                    return Err(CompileError::UnknownClause(format!("not {other:?}")));
                }
            },
        };
        Ok(expr)
    }

    fn string_predicate(
        &self,
        op: MatchOp,
        field: &crate::model::FieldRef,
        needle: &str,
        case_sensitive: bool,
    ) -> CompileResult<Bson> {
        let column = self.rvalue_field(field)?;
        let (haystack, needle) = if case_sensitive {
            (column, needle.to_string())
        } else {
            (bson!({ "$toLower": column }), needle.to_lowercase())
        };
        let len = needle.chars().count() as i32;
        let needle = Bson::String(needle);
        let expr = match op {
            MatchOp::Contains => {
                bson!({ "$gte": [{ "$indexOfCP": [haystack, needle] }, 0] })
            }
            MatchOp::StartsWith => {
                bson!({ "$eq": [{ "$indexOfCP": [haystack, needle] }, 0] })
            }
            MatchOp::EndsWith => {
                bson!({
                    "$eq": [
                        {
                            "$substrCP": [
                                haystack.clone(),
                                { "$subtract": [{ "$strLenCP": haystack }, len] },
                                len,
                            ]
                        },
                        needle,
                    ]
                })
            }
        };
        Ok(expr)
    }
}
