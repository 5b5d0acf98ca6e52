//! Temporal bucketing expressions.
//!
//! The aggregation engine has no first-class date bucketing, so each unit is
//! synthesized from arithmetic and `$dateToString` stage operators. Units
//! that truncate to a calendar boundary produce a formatted string wrapped
//! in the `{___date: ...}` envelope (so the post-processor can tell dates
//! from ordinary strings); units that extract a component produce a bare
//! integer.
//!
//! Literal datetimes go through the same unit semantics at compile time, in
//! the host calendar, which is what makes a bucketed field comparable with
//! a bucketed literal.

use bson::{bson, Bson, Document};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::error::{CompileError, CompileResult};
use crate::model::{SpecialType, TemporalUnit};

/// Key of the envelope that carries a formatted date through the pipeline.
pub const DATE_MARKER: &str = "___date";

/// The `$let` binding every bucketing expression reads its column from.
const COLUMN: &str = "$$column";

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Wrap a formatted-date expression in the marker envelope.
pub(crate) fn mark_date(expr: Bson) -> Bson {
    let mut doc = Document::new();
    doc.insert(DATE_MARKER, expr);
    Bson::Document(doc)
}

/// Bucketing expression for a field, given its source expression.
///
/// Binds the (possibly coerced) source to a local so the unit arithmetic
/// can reference it repeatedly without re-evaluating the path.
pub fn bucket_expr(source: Bson, special: Option<SpecialType>, unit: TemporalUnit) -> Bson {
    let column = coerce_to_date(source, special);
    if unit == TemporalUnit::Default {
        return column;
    }
    bson!({
        "$let": {
            "vars": { "column": column },
            "in": unit_body(unit),
        }
    })
}

/// Numeric UNIX timestamps become real dates before any bucketing.
fn coerce_to_date(source: Bson, special: Option<SpecialType>) -> Bson {
    match special {
        Some(SpecialType::UnixTimestampSeconds) => {
            bson!({ "$add": [epoch(), { "$multiply": [source, 1000] }] })
        }
        Some(SpecialType::UnixTimestampMilliseconds) => {
            bson!({ "$add": [epoch(), source] })
        }
        _ => source,
    }
}

fn epoch() -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(0))
}

fn column() -> Bson {
    Bson::String(COLUMN.to_string())
}

fn date_to_string(format: &str, date: Bson) -> Bson {
    bson!({ "$dateToString": { "format": format, "date": date } })
}

fn unit_body(unit: TemporalUnit) -> Bson {
    match unit {
        // Handled by the caller; a bare column needs no let binding.
        TemporalUnit::Default => column(),
        TemporalUnit::Minute => mark_date(date_to_string("%Y-%m-%dT%H:%M:00", column())),
        TemporalUnit::MinuteOfHour => bson!({ "$minute": column() }),
        TemporalUnit::Hour => mark_date(date_to_string("%Y-%m-%dT%H:00:00", column())),
        TemporalUnit::HourOfDay => bson!({ "$hour": column() }),
        TemporalUnit::Day => mark_date(date_to_string("%Y-%m-%d", column())),
        TemporalUnit::DayOfWeek => bson!({ "$dayOfWeek": column() }),
        TemporalUnit::DayOfMonth => bson!({ "$dayOfMonth": column() }),
        TemporalUnit::DayOfYear => bson!({ "$dayOfYear": column() }),
        TemporalUnit::Week => mark_date(date_to_string("%Y-%m-%d", start_of_week())),
        TemporalUnit::WeekOfYear => bson!({ "$add": [{ "$week": column() }, 1] }),
        TemporalUnit::Month => mark_date(date_to_string("%Y-%m", column())),
        TemporalUnit::MonthOfYear => bson!({ "$month": column() }),
        TemporalUnit::Quarter => mark_date(date_to_string("%Y-%m", start_of_quarter())),
        TemporalUnit::QuarterOfYear => quarter_of_year(),
        TemporalUnit::Year => bson!({ "$year": column() }),
    }
}

/// Roll the column back to the preceding Sunday.
fn start_of_week() -> Bson {
    bson!({
        "$subtract": [
            column(),
            { "$multiply": [{ "$subtract": [{ "$dayOfWeek": column() }, 1] }, MILLIS_PER_DAY] },
        ]
    })
}

/// Roll the column back into the first month of its quarter.
///
/// `dayOfYear mod 91` counts days into the quarter (91 = ceil(366/4)); the
/// 3-day slack keeps the result inside the right month at quarter edges.
fn start_of_quarter() -> Bson {
    bson!({
        "$subtract": [
            column(),
            {
                "$multiply": [
                    { "$subtract": [{ "$mod": [{ "$dayOfYear": column() }, 91] }, 3] },
                    MILLIS_PER_DAY,
                ]
            },
        ]
    })
}

/// `((month + 2) - ((month + 2) mod 3)) / 3` maps months 1-12 onto 1-4.
fn quarter_of_year() -> Bson {
    let shifted = bson!({ "$add": [{ "$month": column() }, 2] });
    bson!({
        "$divide": [
            { "$subtract": [shifted.clone(), { "$mod": [shifted, 3] }] },
            3,
        ]
    })
}

// =============================================================================
// Compile-time counterparts for literals
// =============================================================================

/// Apply a unit to a literal instant, producing the value the pipeline
/// would compute for a field bucketed by the same unit.
pub fn absolute_value(at: DateTime<Utc>, unit: TemporalUnit) -> Bson {
    match unit {
        TemporalUnit::Default => Bson::DateTime(bson::DateTime::from_chrono(at)),
        TemporalUnit::Minute => mark_str(at.format("%Y-%m-%dT%H:%M:00").to_string()),
        TemporalUnit::MinuteOfHour => Bson::Int32(at.minute() as i32),
        TemporalUnit::Hour => mark_str(at.format("%Y-%m-%dT%H:00:00").to_string()),
        TemporalUnit::HourOfDay => Bson::Int32(at.hour() as i32),
        TemporalUnit::Day => mark_str(at.format("%Y-%m-%d").to_string()),
        TemporalUnit::DayOfWeek => {
            Bson::Int32(at.weekday().num_days_from_sunday() as i32 + 1)
        }
        TemporalUnit::DayOfMonth => Bson::Int32(at.day() as i32),
        TemporalUnit::DayOfYear => Bson::Int32(at.ordinal() as i32),
        TemporalUnit::Week => {
            let sunday = at - Duration::days(at.weekday().num_days_from_sunday() as i64);
            mark_str(sunday.format("%Y-%m-%d").to_string())
        }
        TemporalUnit::WeekOfYear => {
            // %U is the Sunday-based week number, matching $week.
            let week: i32 = at.format("%U").to_string().parse().unwrap_or(0);
            Bson::Int32(week + 1)
        }
        TemporalUnit::Month => mark_str(at.format("%Y-%m").to_string()),
        TemporalUnit::MonthOfYear => Bson::Int32(at.month() as i32),
        TemporalUnit::Quarter => {
            let back = (at.ordinal() as i64 % 91) - 3;
            let start = at - Duration::days(back);
            mark_str(start.format("%Y-%m").to_string())
        }
        TemporalUnit::QuarterOfYear => {
            let shifted = at.month() as i32 + 2;
            Bson::Int32((shifted - shifted % 3) / 3)
        }
        TemporalUnit::Year => Bson::Int32(at.year()),
    }
}

fn mark_str(s: String) -> Bson {
    mark_date(Bson::String(s))
}

/// Normalize `amount` units relative to `now` into an absolute instant.
///
/// Extraction units have no "now + n units" meaning and are rejected.
pub fn relative_to_absolute(
    now: DateTime<Utc>,
    amount: i64,
    unit: TemporalUnit,
) -> CompileResult<DateTime<Utc>> {
    let shifted = match unit {
        TemporalUnit::Default | TemporalUnit::Day => now + Duration::days(amount),
        TemporalUnit::Minute => now + Duration::minutes(amount),
        TemporalUnit::Hour => now + Duration::hours(amount),
        TemporalUnit::Week => now + Duration::weeks(amount),
        TemporalUnit::Month => shift_months(now, amount),
        TemporalUnit::Quarter => shift_months(now, amount * 3),
        TemporalUnit::Year => shift_months(now, amount * 12),
        other => {
            return Err(CompileError::UnsupportedUnit {
                unit: other.to_string(),
                context: "a relative datetime".into(),
            })
        }
    };
    Ok(shifted)
}

fn shift_months(at: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    if months >= 0 {
        at + Months::new(months as u32)
    } else {
        at - Months::new(months.unsigned_abs() as u32)
    }
}

/// Parse the timestamp strings this crate itself produces or accepts:
/// RFC 3339, `%Y-%m-%dT%H:%M:%S`, `%Y-%m-%d`, and `%Y-%m`. Times without an
/// offset are read in the default (UTC) time zone.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}
