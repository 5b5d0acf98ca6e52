use bson::{bson, doc, Bson};
use chrono::{DateTime, Utc};
use mangrove::model::{SpecialType, TemporalUnit};
use mangrove::pipeline::datetime::{absolute_value, bucket_expr, relative_to_absolute};

fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn source() -> Bson {
    Bson::String("$created_at".into())
}

fn let_body(expr: Bson) -> Bson {
    let Bson::Document(outer) = expr else {
        panic!("expected a $let document");
    };
    outer
        .get_document("$let")
        .expect("bucketing must bind the column")
        .get("in")
        .expect("$let has a body")
        .clone()
}

#[test]
fn test_truncation_units_use_date_to_string() {
    let cases = [
        (TemporalUnit::Minute, "%Y-%m-%dT%H:%M:00"),
        (TemporalUnit::Hour, "%Y-%m-%dT%H:00:00"),
        (TemporalUnit::Day, "%Y-%m-%d"),
        (TemporalUnit::Month, "%Y-%m"),
    ];
    for (unit, format) in cases {
        let body = let_body(bucket_expr(source(), None, unit));
        let expected = bson!({
            "___date": { "$dateToString": { "format": format, "date": "$$column" } }
        });
        assert_eq!(body, expected, "unit {unit}");
    }
}

#[test]
fn test_extraction_units_map_to_operators() {
    let cases = [
        (TemporalUnit::MinuteOfHour, "$minute"),
        (TemporalUnit::HourOfDay, "$hour"),
        (TemporalUnit::DayOfWeek, "$dayOfWeek"),
        (TemporalUnit::DayOfMonth, "$dayOfMonth"),
        (TemporalUnit::DayOfYear, "$dayOfYear"),
        (TemporalUnit::MonthOfYear, "$month"),
        (TemporalUnit::Year, "$year"),
    ];
    for (unit, operator) in cases {
        let body = let_body(bucket_expr(source(), None, unit));
        let Bson::Document(doc) = body else {
            panic!("expected operator document for {unit}");
        };
        assert!(doc.contains_key(operator), "unit {unit} should use {operator}");
    }
}

#[test]
fn test_week_of_year_adds_one() {
    let body = let_body(bucket_expr(source(), None, TemporalUnit::WeekOfYear));
    assert_eq!(body, bson!({ "$add": [{ "$week": "$$column" }, 1] }));
}

#[test]
fn test_week_truncation_subtracts_days_since_sunday() {
    let body = let_body(bucket_expr(source(), None, TemporalUnit::Week));
    let expected = bson!({
        "___date": {
            "$dateToString": {
                "format": "%Y-%m-%d",
                "date": {
                    "$subtract": [
                        "$$column",
                        { "$multiply": [
                            { "$subtract": [{ "$dayOfWeek": "$$column" }, 1] },
                            86_400_000_i64,
                        ] },
                    ]
                },
            }
        }
    });
    assert_eq!(body, expected);
}

#[test]
fn test_quarter_of_year_arithmetic() {
    let body = let_body(bucket_expr(source(), None, TemporalUnit::QuarterOfYear));
    let shifted = bson!({ "$add": [{ "$month": "$$column" }, 2] });
    assert_eq!(
        body,
        bson!({ "$divide": [
            { "$subtract": [shifted.clone(), { "$mod": [shifted, 3] }] },
            3,
        ] })
    );
}

#[test]
fn test_unix_millisecond_coercion() {
    let expr = bucket_expr(
        Bson::String("$ts".into()),
        Some(SpecialType::UnixTimestampMilliseconds),
        TemporalUnit::Default,
    );
    assert_eq!(
        expr,
        bson!({ "$add": [Bson::DateTime(bson::DateTime::from_millis(0)), "$ts"] })
    );
}

#[test]
fn test_unix_coercion_composes_with_bucketing() {
    let expr = bucket_expr(
        Bson::String("$ts".into()),
        Some(SpecialType::UnixTimestampSeconds),
        TemporalUnit::Year,
    );
    let Bson::Document(outer) = expr else {
        panic!("expected $let");
    };
    let vars = outer
        .get_document("$let")
        .unwrap()
        .get_document("vars")
        .unwrap();
    assert_eq!(
        vars.get("column").unwrap(),
        &bson!({ "$add": [
            Bson::DateTime(bson::DateTime::from_millis(0)),
            { "$multiply": ["$ts", 1000] },
        ] })
    );
}

#[test]
fn test_literal_and_field_buckets_agree_on_format() {
    // A day-bucketed literal must compare equal to what the pipeline
    // computes for a day-bucketed field: both are {___date: "%Y-%m-%d"}.
    let literal = absolute_value(at("2024-03-09T17:30:00Z"), TemporalUnit::Day);
    assert_eq!(literal, Bson::Document(doc! { "___date": "2024-03-09" }));

    let month = absolute_value(at("2024-03-09T17:30:00Z"), TemporalUnit::Month);
    assert_eq!(month, Bson::Document(doc! { "___date": "2024-03" }));

    let minute = absolute_value(at("2024-03-09T17:30:45Z"), TemporalUnit::Minute);
    assert_eq!(minute, Bson::Document(doc! { "___date": "2024-03-09T17:30:00" }));
}

#[test]
fn test_absolute_default_is_raw_datetime() {
    let v = absolute_value(at("2024-03-09T17:30:00Z"), TemporalUnit::Default);
    assert!(matches!(v, Bson::DateTime(_)));
}

#[test]
fn test_absolute_week_of_year_matches_sunday_based_weeks() {
    // 2024-01-01 is a Monday; $week counts Sunday-started weeks from 0,
    // and the compiler adds one.
    assert_eq!(
        absolute_value(at("2024-01-01T00:00:00Z"), TemporalUnit::WeekOfYear),
        Bson::Int32(1)
    );
    assert_eq!(
        absolute_value(at("2024-01-07T00:00:00Z"), TemporalUnit::WeekOfYear),
        Bson::Int32(2)
    );
}

#[test]
fn test_relative_quarter_and_year() {
    let now = at("2024-05-10T00:00:00Z");
    assert_eq!(
        relative_to_absolute(now, 2, TemporalUnit::Quarter).unwrap(),
        at("2024-11-10T00:00:00Z")
    );
    assert_eq!(
        relative_to_absolute(now, -2, TemporalUnit::Year).unwrap(),
        at("2022-05-10T00:00:00Z")
    );
}

#[test]
fn test_relative_month_clamps_to_month_end() {
    let now = at("2024-03-31T00:00:00Z");
    assert_eq!(
        relative_to_absolute(now, -1, TemporalUnit::Month).unwrap(),
        at("2024-02-29T00:00:00Z")
    );
}
