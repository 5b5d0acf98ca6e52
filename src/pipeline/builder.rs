//! Pipeline assembly.
//!
//! Stages are appended in a fixed order - initial projection, filter,
//! breakout+aggregation, order, fields, limit, page - each handler reading
//! its slice of the query and either appending stages or leaving the
//! pipeline untouched. The `projections` list tracks the terminal column
//! order throughout and is returned alongside the stages.

use bson::{Bson, Document};

use crate::error::{CompileError, CompileResult};
use crate::model::{FieldRef, OrderTarget, SortDirection};

use super::rvalue::Compiler;

/// Name of the synthetic document `$group` keys on.
pub(crate) const GROUP_KEY: &str = "___group";

/// The built pipeline and the column names it terminates with.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    /// Terminal column order, escaped names.
    pub projections: Vec<String>,
    /// The stage sequence.
    pub stages: Vec<Document>,
}

impl Compiler<'_> {
    /// Assemble the full pipeline for the current query.
    pub fn compile_pipeline(&self) -> CompileResult<PipelineContext> {
        let mut ctx = PipelineContext::default();
        self.add_initial_projection(&mut ctx)?;
        self.add_filter(&mut ctx)?;
        self.add_group(&mut ctx)?;
        self.add_order(&mut ctx)?;
        self.add_fields(&mut ctx)?;
        self.add_limit(&mut ctx)?;
        self.add_page(&mut ctx)?;
        Ok(ctx)
    }

    /// Every distinct field reference reachable in the query, in clause
    /// order: breakouts, aggregations, filter, order-by, fields.
    fn collected_fields(&self) -> Vec<FieldRef> {
        let mut all = Vec::new();
        all.extend(self.query.breakouts.iter().cloned());
        for clause in &self.query.aggregations {
            clause.agg.collect_fields(&mut all);
        }
        if let Some(filter) = &self.query.filter {
            filter.collect_fields(&mut all);
        }
        for item in &self.query.order_by {
            if let OrderTarget::Field(f) = &item.target {
                all.push(f.clone());
            }
        }
        all.extend(self.query.fields.iter().cloned());

        let mut distinct = Vec::new();
        for field in all {
            if !distinct.contains(&field) {
                distinct.push(field);
            }
        }
        distinct
    }

    /// One `$project` binding every reachable field to its initial rvalue,
    /// so every later stage addresses flat escaped names only.
    fn add_initial_projection(&self, ctx: &mut PipelineContext) -> CompileResult<()> {
        let fields = self.collected_fields();
        if fields.is_empty() {
            return Ok(());
        }
        let mut projection = Document::new();
        for field in &fields {
            let lvalue = self.lvalue(field)?;
            if !projection.contains_key(&lvalue) {
                projection.insert(lvalue, self.initial_rvalue(field)?);
            }
        }
        ctx.projections = projection.keys().cloned().collect();
        let mut stage = Document::new();
        stage.insert("$project", projection);
        push_stage(ctx, stage)
    }

    fn add_filter(&self, ctx: &mut PipelineContext) -> CompileResult<()> {
        let Some(filter) = &self.query.filter else {
            return Ok(());
        };
        let mut stage = Document::new();
        stage.insert("$match", self.match_document(filter)?);
        push_stage(ctx, stage)
    }

    /// Breakouts and aggregations compile to a stage run: a projection that
    /// builds the synthetic group document, the `$group` itself, an
    /// `$addFields` for post bindings when any exist, a stable `$sort` on
    /// the group key, and a terminal `$project` naming the output columns.
    fn add_group(&self, ctx: &mut PipelineContext) -> CompileResult<()> {
        let breakouts = &self.query.breakouts;
        let aggregations = &self.query.aggregations;
        if breakouts.is_empty() && aggregations.is_empty() {
            return Ok(());
        }

        let mut pre = Document::new();
        if !breakouts.is_empty() {
            let mut group_fields = Document::new();
            for breakout in breakouts {
                let lvalue = self.lvalue(breakout)?;
                group_fields.insert(lvalue.clone(), Bson::String(format!("${lvalue}")));
            }
            pre.insert(GROUP_KEY, group_fields);
        }
        let mut read_by_aggregations = Vec::new();
        for clause in aggregations {
            clause.agg.collect_fields(&mut read_by_aggregations);
        }
        for field in read_by_aggregations {
            let lvalue = self.lvalue(&field)?;
            if !pre.contains_key(&lvalue) {
                pre.insert(lvalue.clone(), Bson::String(format!("${lvalue}")));
            }
        }
        if !pre.is_empty() {
            let mut stage = Document::new();
            stage.insert("$project", pre);
            push_stage(ctx, stage)?;
        }

        let mut group = Document::new();
        group.insert(
            "_id",
            if breakouts.is_empty() {
                Bson::Null
            } else {
                Bson::String(format!("${GROUP_KEY}"))
            },
        );
        let mut posts = Vec::new();
        for index in 0..aggregations.len() {
            let expanded = self.expand_aggregation(index)?;
            for (name, reducer) in expanded.reductions {
                if group.contains_key(&name) {
                    return Err(CompileError::InvalidQuery {
                        reason: format!("duplicate aggregation name `{name}`"),
                        clause: format!("{:?}", aggregations[index]),
                    });
                }
                group.insert(name, reducer);
            }
            posts.extend(expanded.posts);
        }
        let mut stage = Document::new();
        stage.insert("$group", group);
        push_stage(ctx, stage)?;

        if !posts.is_empty() {
            let mut added = Document::new();
            for (name, expr) in posts {
                added.insert(name, expr);
            }
            let mut stage = Document::new();
            stage.insert("$addFields", added);
            push_stage(ctx, stage)?;
        }

        let mut stable_sort = Document::new();
        stable_sort.insert("_id", Bson::Int32(1));
        let mut stage = Document::new();
        stage.insert("$sort", stable_sort);
        push_stage(ctx, stage)?;

        let mut terminal = Document::new();
        terminal.insert("_id", Bson::Boolean(false));
        let mut projections = Vec::new();
        for breakout in breakouts {
            let lvalue = self.lvalue(breakout)?;
            terminal.insert(lvalue.clone(), Bson::String(format!("$_id.{lvalue}")));
            projections.push(lvalue);
        }
        for index in 0..aggregations.len() {
            let name = self.agg_name(index)?.to_string();
            terminal.insert(name.clone(), Bson::Boolean(true));
            projections.push(name);
        }
        let mut stage = Document::new();
        stage.insert("$project", terminal);
        push_stage(ctx, stage)?;
        ctx.projections = projections;
        Ok(())
    }

    fn add_order(&self, ctx: &mut PipelineContext) -> CompileResult<()> {
        if self.query.order_by.is_empty() {
            return Ok(());
        }
        let mut sort = Document::new();
        for item in &self.query.order_by {
            let direction = match item.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            sort.insert(self.order_lvalue(&item.target)?, Bson::Int32(direction));
        }
        let mut stage = Document::new();
        stage.insert("$sort", sort);
        push_stage(ctx, stage)
    }

    /// The explicit fields clause, or - for unaggregated queries without
    /// one - the collected field set. Either way the projection suppresses
    /// `_id`, which inclusion projections would otherwise keep, and resets
    /// the terminal column order.
    fn add_fields(&self, ctx: &mut PipelineContext) -> CompileResult<()> {
        let unaggregated =
            self.query.aggregations.is_empty() && self.query.breakouts.is_empty();
        let refs: Vec<FieldRef> = if !self.query.fields.is_empty() {
            self.query.fields.clone()
        } else if unaggregated {
            self.collected_fields()
        } else {
            return Ok(());
        };
        if refs.is_empty() {
            return Ok(());
        }
        let mut projection = Document::new();
        projection.insert("_id", Bson::Boolean(false));
        let mut projections = Vec::new();
        for field in &refs {
            let lvalue = self.lvalue(field)?;
            if !projection.contains_key(&lvalue) {
                projection.insert(lvalue.clone(), Bson::String(format!("${lvalue}")));
                projections.push(lvalue);
            }
        }
        let mut stage = Document::new();
        stage.insert("$project", projection);
        push_stage(ctx, stage)?;
        ctx.projections = projections;
        Ok(())
    }

    fn add_limit(&self, ctx: &mut PipelineContext) -> CompileResult<()> {
        let Some(limit) = self.query.limit else {
            return Ok(());
        };
        if limit == 0 {
            return Err(CompileError::invalid("limit must be positive", &self.query.limit));
        }
        let mut stage = Document::new();
        stage.insert("$limit", Bson::Int64(limit as i64));
        push_stage(ctx, stage)
    }

    fn add_page(&self, ctx: &mut PipelineContext) -> CompileResult<()> {
        let Some(page) = self.query.page else {
            return Ok(());
        };
        if page.page == 0 || page.items == 0 {
            return Err(CompileError::invalid(
                "page numbers start at 1 and pages must be non-empty",
                &page,
            ));
        }
        let skip = page.items * (page.page - 1);
        if skip > 0 {
            let mut stage = Document::new();
            stage.insert("$skip", Bson::Int64(skip as i64));
            push_stage(ctx, stage)?;
        }
        let mut stage = Document::new();
        stage.insert("$limit", Bson::Int64(page.items as i64));
        push_stage(ctx, stage)
    }
}

/// Append a stage after checking it against the stage schema.
fn push_stage(ctx: &mut PipelineContext, stage: Document) -> CompileResult<()> {
    verify_stage(&stage)?;
    ctx.stages.push(stage);
    Ok(())
}

/// Internal schema check for emitted stages. A failure here is a compiler
/// bug, not a user error.
pub fn verify_stage(stage: &Document) -> CompileResult<()> {
    if stage.len() != 1 {
        return Err(CompileError::PipelineSchema(format!(
            "expected exactly one key, got {}: {stage:?}",
            stage.len()
        )));
    }
    let (operator, body) = stage.iter().next().expect("len checked above");
    if !operator.starts_with('$') {
        return Err(CompileError::PipelineSchema(format!(
            "stage operator `{operator}` must start with `$`"
        )));
    }
    match operator.as_str() {
        "$limit" | "$skip" => {
            let n = match body {
                Bson::Int32(n) => i64::from(*n),
                Bson::Int64(n) => *n,
                other => {
                    return Err(CompileError::PipelineSchema(format!(
                        "{operator} takes an integer, got {other:?}"
                    )))
                }
            };
            if n <= 0 {
                return Err(CompileError::PipelineSchema(format!(
                    "{operator} must be positive, got {n}"
                )));
            }
        }
        "$sort" => {
            let doc = expect_document(operator, body)?;
            for (key, value) in doc {
                let ok = matches!(*value, Bson::Int32(1) | Bson::Int32(-1))
                    || matches!(*value, Bson::Int64(1) | Bson::Int64(-1));
                if !ok {
                    return Err(CompileError::PipelineSchema(format!(
                        "$sort direction for `{key}` must be 1 or -1, got {value:?}"
                    )));
                }
            }
        }
        "$match" => verify_match_keys(expect_document(operator, body)?)?,
        "$project" | "$group" | "$addFields" => {
            let doc = expect_document(operator, body)?;
            if doc.is_empty() {
                return Err(CompileError::PipelineSchema(format!(
                    "{operator} body must not be empty"
                )));
            }
        }
        _ => {}
    }
    Ok(())
}

fn expect_document<'b>(operator: &str, body: &'b Bson) -> CompileResult<&'b Document> {
    body.as_document().ok_or_else(|| {
        CompileError::PipelineSchema(format!("{operator} takes a document, got {body:?}"))
    })
}

/// Match keys must be non-empty, and `$not` is never legal as a key.
fn verify_match_keys(doc: &Document) -> CompileResult<()> {
    for (key, value) in doc {
        if key.is_empty() {
            return Err(CompileError::PipelineSchema(
                "$match contains an empty key".into(),
            ));
        }
        if key == "$not" {
            return Err(CompileError::PipelineSchema(
                "$not is not a legal match operator".into(),
            ));
        }
        if key == "$and" || key == "$or" {
            let Some(items) = value.as_array() else {
                return Err(CompileError::PipelineSchema(format!(
                    "{key} takes an array, got {value:?}"
                )));
            };
            for item in items {
                if let Some(nested) = item.as_document() {
                    verify_match_keys(nested)?;
                }
            }
        }
    }
    Ok(())
}
