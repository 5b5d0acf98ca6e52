use bson::bson;
use chrono::Utc;
use mangrove::metadata::{FieldRecord, StaticMetadata};
use mangrove::model::{
    Aggregation, AggregationClause, BaseType, CompareOp, FieldRef, Filter, MatchOp, Query, Value,
};
use mangrove::pipeline::aggregation::ExpandedAggregation;
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
}

fn expand(clause: AggregationClause) -> ExpandedAggregation {
    let mut query = Query::new(1);
    query.aggregations = vec![clause];
    let meta = metadata();
    let compiler = Compiler::new(&query, &meta, Utc::now());
    compiler.expand_aggregation(0).unwrap()
}

#[test]
fn test_count_is_sum_of_ones() {
    let expanded = expand(AggregationClause::new(Aggregation::Count));
    assert_eq!(expanded.reductions.len(), 1);
    assert_eq!(expanded.reductions[0].0, "count");
    assert_eq!(expanded.reductions[0].1, bson!({ "$sum": 1 }));
    assert!(expanded.posts.is_empty());
}

#[test]
fn test_count_of_column_counts_truthy_values() {
    let expanded = expand(AggregationClause::new(Aggregation::CountOf(FieldRef::id(1))));
    assert_eq!(
        expanded.reductions[0].1,
        bson!({ "$sum": { "$cond": { "if": "$price", "then": 1, "else": 0 } } })
    );
}

#[test]
fn test_plain_reducers() {
    let cases = [
        (Aggregation::Avg(FieldRef::id(1)), bson!({ "$avg": "$price" })),
        (Aggregation::Sum(FieldRef::id(1)), bson!({ "$sum": "$price" })),
        (Aggregation::Min(FieldRef::id(1)), bson!({ "$min": "$price" })),
        (Aggregation::Max(FieldRef::id(1)), bson!({ "$max": "$price" })),
    ];
    for (agg, expected) in cases {
        let expanded = expand(AggregationClause::new(agg));
        assert_eq!(expanded.reductions[0].1, expected);
        assert!(expanded.posts.is_empty());
    }
}

#[test]
fn test_distinct_post_references_its_own_reduction() {
    let expanded = expand(AggregationClause::new(Aggregation::Distinct(FieldRef::id(2))));
    assert_eq!(expanded.reductions.len(), 1);
    let (reduction_name, reducer) = &expanded.reductions[0];
    assert_eq!(reduction_name, "distinct_set");
    assert_eq!(reducer, &bson!({ "$addToSet": "$status" }));

    assert_eq!(expanded.posts.len(), 1);
    let (post_name, post) = &expanded.posts[0];
    assert_eq!(post_name, "distinct");
    // The size is taken from the reduction this aggregation owns, not from
    // some other aggregation's column.
    assert_eq!(post, &bson!({ "$size": "$distinct_set" }));
}

#[test]
fn test_sum_where_wraps_condition() {
    let predicate = Filter::Compare {
        op: CompareOp::Eq,
        field: FieldRef::id(2),
        value: Value::String("shipped".into()),
    };
    let expanded = expand(AggregationClause::new(Aggregation::SumWhere {
        field: FieldRef::id(1),
        predicate,
    }));
    assert_eq!(
        expanded.reductions[0].1,
        bson!({ "$sum": { "$cond": {
            "if": { "$eq": ["$status", "shipped"] },
            "then": "$price",
            "else": 0,
        } } })
    );
}

#[test]
fn test_count_where_is_sum_where_of_one() {
    let predicate = Filter::Compare {
        op: CompareOp::Gt,
        field: FieldRef::id(1),
        value: Value::Int(100),
    };
    let expanded = expand(AggregationClause::new(Aggregation::CountWhere(predicate)));
    assert_eq!(
        expanded.reductions[0].1,
        bson!({ "$sum": { "$cond": {
            "if": { "$gt": ["$price", 100_i64] },
            "then": 1,
            "else": 0,
        } } })
    );
}

#[test]
fn test_share_reductions_and_post() {
    let predicate = Filter::Compare {
        op: CompareOp::Eq,
        field: FieldRef::id(1),
        value: Value::Int(5),
    };
    let expanded = expand(AggregationClause::new(Aggregation::Share(predicate)));
    let names: Vec<_> = expanded.reductions.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["share_count_where", "share_count"]);
    assert_eq!(expanded.reductions[1].1, bson!({ "$sum": 1 }));
    assert_eq!(
        expanded.posts[0],
        (
            "share".to_string(),
            bson!({ "$divide": ["$share_count_where", "$share_count"] })
        )
    );
}

#[test]
fn test_condition_string_predicates_in_aggregation() {
    let predicate = Filter::Matches {
        op: MatchOp::Contains,
        field: FieldRef::id(2),
        needle: "pend".into(),
        case_sensitive: false,
    };
    let expanded = expand(AggregationClause::new(Aggregation::CountWhere(predicate)));
    assert_eq!(
        expanded.reductions[0].1,
        bson!({ "$sum": { "$cond": {
            "if": { "$gte": [{ "$indexOfCP": [{ "$toLower": "$status" }, "pend"] }, 0] },
            "then": 1,
            "else": 0,
        } } })
    );
}

#[test]
fn test_reduction_and_post_names_disjoint() {
    let aggregations = vec![
        AggregationClause::new(Aggregation::Count),
        AggregationClause::new(Aggregation::Distinct(FieldRef::id(2))),
        AggregationClause::new(Aggregation::Share(Filter::Compare {
            op: CompareOp::Gt,
            field: FieldRef::id(1),
            value: Value::Int(0),
        })),
    ];
    let mut query = Query::new(1);
    query.aggregations = aggregations;
    let meta = metadata();
    let compiler = Compiler::new(&query, &meta, Utc::now());

    let mut reduction_names = Vec::new();
    let mut post_names = Vec::new();
    for index in 0..query.aggregations.len() {
        let expanded = compiler.expand_aggregation(index).unwrap();
        reduction_names.extend(expanded.reductions.into_iter().map(|(n, _)| n));
        post_names.extend(expanded.posts.into_iter().map(|(n, _)| n));
    }
    for name in &reduction_names {
        assert!(!post_names.contains(name), "name `{name}` used in both halves");
        assert_ne!(name, "_id");
        assert_ne!(name, "___group");
    }
    for name in &post_names {
        assert_ne!(name, "_id");
        assert_ne!(name, "___group");
    }
}

#[test]
fn test_ends_with_predicate_positions_substring() {
    let predicate = Filter::Matches {
        op: MatchOp::EndsWith,
        field: FieldRef::id(2),
        needle: "ed".into(),
        case_sensitive: true,
    };
    let expanded = expand(AggregationClause::new(Aggregation::CountWhere(predicate)));
    assert_eq!(
        expanded.reductions[0].1,
        bson!({ "$sum": { "$cond": {
            "if": { "$eq": [
                { "$substrCP": [
                    "$status",
                    { "$subtract": [{ "$strLenCP": "$status" }, 2] },
                    2,
                ] },
                "ed",
            ] },
            "then": 1,
            "else": 0,
        } } })
    );
}
