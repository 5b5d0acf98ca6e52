use mangrove::pipeline::names::{escape_path, is_escaped, unescape, with_unit};
use mangrove::model::TemporalUnit;

#[test]
fn test_round_trip_is_identity_on_marker_free_paths() {
    for path in [
        vec!["total".to_string()],
        vec!["source".to_string(), "username".to_string()],
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
        vec!["weird name".to_string(), "with spaces".to_string()],
    ] {
        let escaped = escape_path(&path);
        assert_eq!(unescape(&escaped), path.join("."));
    }
}

#[test]
fn test_deep_nesting() {
    let path: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
    assert_eq!(escape_path(&path), "a___b___c");
}

#[test]
fn test_unit_suffix_for_every_unit() {
    for unit in [
        TemporalUnit::Default,
        TemporalUnit::Minute,
        TemporalUnit::MinuteOfHour,
        TemporalUnit::Hour,
        TemporalUnit::HourOfDay,
        TemporalUnit::Day,
        TemporalUnit::DayOfWeek,
        TemporalUnit::DayOfMonth,
        TemporalUnit::DayOfYear,
        TemporalUnit::Week,
        TemporalUnit::WeekOfYear,
        TemporalUnit::Month,
        TemporalUnit::MonthOfYear,
        TemporalUnit::Quarter,
        TemporalUnit::QuarterOfYear,
        TemporalUnit::Year,
    ] {
        let name = with_unit("created_at", unit);
        assert!(is_escaped(&name));
        assert_eq!(unescape(&name), "created_at");
    }
}

#[test]
fn test_nested_path_with_unit_suffix() {
    let name = with_unit(&escape_path(&["meta".into(), "seen_at".into()]), TemporalUnit::Week);
    assert_eq!(name, "meta___seen_at~~~week");
    assert_eq!(unescape(&name), "meta.seen_at");
}
