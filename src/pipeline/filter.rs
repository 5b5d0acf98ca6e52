//! Filter translation: clause tree to `$match` document.
//!
//! Comparisons are emitted in document form (`{field: {$op: value}}`), not
//! expression form - see [`super::condition`] for the latter. Filters are
//! rewritten to negation normal form first, because the engine rejects
//! `$not` as a top-level match operator; after normalization the only
//! surviving negations sit directly over substring matches, where `$not`
//! is legal as a value-position operator against a regex.

use bson::{Bson, Document};

use crate::error::{CompileError, CompileResult};
use crate::model::{Filter, MatchOp};

use super::rvalue::Compiler;

impl Compiler<'_> {
    /// Translate a filter clause into the body of a `$match` stage.
    pub fn match_document(&self, filter: &Filter) -> CompileResult<Document> {
        self.match_normalized(filter.clone().normalize())
    }

    fn match_normalized(&self, filter: Filter) -> CompileResult<Document> {
        let mut doc = Document::new();
        match filter {
            Filter::And(fs) => {
                let parts = fs
                    .into_iter()
                    .map(|f| self.match_normalized(f).map(Bson::Document))
                    .collect::<CompileResult<Vec<_>>>()?;
                doc.insert("$and", parts);
            }
            Filter::Or(fs) => {
                let parts = fs
                    .into_iter()
                    .map(|f| self.match_normalized(f).map(Bson::Document))
                    .collect::<CompileResult<Vec<_>>>()?;
                doc.insert("$or", parts);
            }
            Filter::Compare { op, field, value } => {
                let mut cmp = Document::new();
                cmp.insert(op.mongo_op(), self.rvalue_value(&value)?);
                doc.insert(self.lvalue(&field)?, cmp);
            }
            Filter::Between {
                field,
                lower,
                upper,
            } => {
                let mut range = Document::new();
                range.insert("$gte", self.rvalue_value(&lower)?);
                range.insert("$lte", self.rvalue_value(&upper)?);
                doc.insert(self.lvalue(&field)?, range);
            }
            Filter::Matches {
                op,
                field,
                needle,
                case_sensitive,
            } => {
                doc.insert(self.lvalue(&field)?, match_regex(op, &needle, case_sensitive));
            }
            Filter::Not(inner) => match *inner {
                Filter::Matches {
                    op,
                    field,
                    needle,
                    case_sensitive,
                } => {
                    let mut negated = Document::new();
                    negated.insert("$not", match_regex(op, &needle, case_sensitive));
                    doc.insert(self.lvalue(&field)?, negated);
                }
                other => {
                    // Normalization guarantees negation only wraps matches.
                    return Err(CompileError::UnknownClause(format!("not {other:?}")));
                }
            },
        }
        Ok(doc)
    }
}

/// Build the regex value for a substring match.
///
/// The needle is escaped so metacharacters match literally; case
/// insensitivity rides in the pattern as `(?i)` rather than in the regex
/// options.
fn match_regex(op: MatchOp, needle: &str, case_sensitive: bool) -> Bson {
    let mut pattern = String::new();
    if !case_sensitive {
        pattern.push_str("(?i)");
    }
    if op == MatchOp::StartsWith {
        pattern.push('^');
    }
    pattern.push_str(&regex::escape(needle));
    if op == MatchOp::EndsWith {
        pattern.push('$');
    }
    Bson::RegularExpression(bson::Regex {
        pattern,
        options: String::new(),
    })
}
