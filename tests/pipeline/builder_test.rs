use bson::doc;
use chrono::Utc;
use mangrove::metadata::{FieldRecord, StaticMetadata};
use mangrove::model::{
    Aggregation, AggregationClause, BaseType, CompareOp, FieldRef, Filter, OrderBy, OrderTarget,
    Page, Query, SortDirection, TemporalUnit, Value,
};
use mangrove::pipeline::Compiler;

fn metadata() -> StaticMetadata {
    StaticMetadata::new()
        .with_table(1, "orders")
        .with_field(FieldRecord {
            id: 1,
            name: "price".into(),
            parent_id: None,
            base_type: BaseType::Float,
            special_type: None,
        })
        .with_field(FieldRecord {
            id: 2,
            name: "status".into(),
            parent_id: None,
            base_type: BaseType::Text,
            special_type: None,
        })
        .with_field(FieldRecord {
            id: 3,
            name: "created_at".into(),
            parent_id: None,
            base_type: BaseType::DateTime,
            special_type: None,
        })
}

fn build(query: &Query) -> mangrove::pipeline::PipelineContext {
    let meta = metadata();
    let compiler = Compiler::new(query, &meta, Utc::now());
    compiler.compile_pipeline().unwrap()
}

fn stage_operators(ctx: &mangrove::pipeline::PipelineContext) -> Vec<String> {
    ctx.stages
        .iter()
        .map(|stage| stage.keys().next().unwrap().clone())
        .collect()
}

#[test]
fn test_full_query_stage_order() {
    let mut query = Query::new(1);
    query.breakouts = vec![FieldRef::id(2)];
    query.aggregations = vec![AggregationClause::new(Aggregation::Sum(FieldRef::id(1)))];
    query.filter = Some(Filter::Compare {
        op: CompareOp::Gt,
        field: FieldRef::id(1),
        value: Value::Int(0),
    });
    query.order_by = vec![OrderBy {
        target: OrderTarget::Aggregation(0),
        direction: SortDirection::Desc,
    }];
    query.limit = Some(10);
    query.page = Some(Page { page: 2, items: 5 });

    let ctx = build(&query);
    assert_eq!(
        stage_operators(&ctx),
        vec![
            "$project", // initial
            "$match",   // filter
            "$project", // group document
            "$group",
            "$sort",    // stable sort on _id
            "$project", // terminal group projection
            "$sort",    // order-by
            "$limit",
            "$skip",    // page
            "$limit",
        ]
    );
}

#[test]
fn test_filter_only_query() {
    let mut query = Query::new(1);
    query.filter = Some(Filter::Compare {
        op: CompareOp::Eq,
        field: FieldRef::id(2),
        value: Value::String("open".into()),
    });

    let ctx = build(&query);
    assert_eq!(stage_operators(&ctx), vec!["$project", "$match", "$project"]);
    assert_eq!(ctx.projections, vec!["status"]);
}

#[test]
fn test_no_fields_means_no_projection_stage() {
    let mut query = Query::new(1);
    query.limit = Some(3);

    let ctx = build(&query);
    assert_eq!(stage_operators(&ctx), vec!["$limit"]);
    assert!(ctx.projections.is_empty());
}

#[test]
fn test_group_without_breakouts_groups_on_null() {
    let mut query = Query::new(1);
    query.aggregations = vec![AggregationClause::new(Aggregation::Count)];

    let ctx = build(&query);
    // No fields are read, so there is no initial projection and no
    // pre-group projection either.
    assert_eq!(stage_operators(&ctx), vec!["$group", "$sort", "$project"]);
    let group = ctx.stages[0].get_document("$group").unwrap();
    assert_eq!(group.get("_id"), Some(&bson::Bson::Null));
}

#[test]
fn test_datetime_breakout_key_carries_unit() {
    let mut query = Query::new(1);
    query.breakouts = vec![FieldRef::datetime(FieldRef::id(3), TemporalUnit::Month)];
    query.aggregations = vec![AggregationClause::new(Aggregation::Count)];

    let ctx = build(&query);
    let pre = ctx.stages[1].get_document("$project").unwrap();
    assert_eq!(
        pre.get_document("___group").unwrap(),
        &doc! { "created_at~~~month": "$created_at~~~month" }
    );
    assert_eq!(ctx.projections, vec!["created_at~~~month", "count"]);
}

#[test]
fn test_duplicate_aggregation_names_rejected() {
    let mut query = Query::new(1);
    query.aggregations = vec![
        AggregationClause::named(Aggregation::Count, "n"),
        AggregationClause::named(Aggregation::Sum(FieldRef::id(1)), "n"),
    ];

    let meta = metadata();
    let compiler = Compiler::new(&query, &meta, Utc::now());
    let err = compiler.compile_pipeline().unwrap_err();
    assert_eq!(err.code(), "invalid-query");
}

#[test]
fn test_zero_limit_rejected() {
    let mut query = Query::new(1);
    query.limit = Some(0);

    let meta = metadata();
    let compiler = Compiler::new(&query, &meta, Utc::now());
    assert_eq!(
        compiler.compile_pipeline().unwrap_err().code(),
        "invalid-query"
    );
}

#[test]
fn test_zero_page_rejected() {
    let mut query = Query::new(1);
    query.page = Some(Page { page: 0, items: 10 });

    let meta = metadata();
    let compiler = Compiler::new(&query, &meta, Utc::now());
    assert_eq!(
        compiler.compile_pipeline().unwrap_err().code(),
        "invalid-query"
    );
}

#[test]
fn test_projections_track_terminal_stage_across_overrides() {
    // fields overrides the implicit projection of collected fields
    let mut query = Query::new(1);
    query.filter = Some(Filter::Compare {
        op: CompareOp::Gt,
        field: FieldRef::id(1),
        value: Value::Int(10),
    });
    query.fields = vec![FieldRef::id(2)];

    let ctx = build(&query);
    assert_eq!(ctx.projections, vec!["status"]);
    let terminal = ctx.stages.last().unwrap().get_document("$project").unwrap();
    assert_eq!(terminal, &doc! { "_id": false, "status": "$status" });
}

#[test]
fn test_repeated_field_projected_once() {
    let mut query = Query::new(1);
    query.filter = Some(Filter::And(vec![
        Filter::Compare {
            op: CompareOp::Gt,
            field: FieldRef::id(1),
            value: Value::Int(0),
        },
        Filter::Compare {
            op: CompareOp::Lt,
            field: FieldRef::id(1),
            value: Value::Int(100),
        },
    ]));

    let ctx = build(&query);
    let initial = ctx.stages[0].get_document("$project").unwrap();
    assert_eq!(initial, &doc! { "price": "$price" });
}
