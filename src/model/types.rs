//! Core types for the logical query model.

use serde::{Deserialize, Serialize};

/// Identifier of a field in the caller's metadata store.
pub type FieldId = i64;

/// Identifier of a table (collection) in the caller's metadata store.
pub type TableId = i64;

/// Storage-level type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaseType {
    Text,
    Integer,
    Float,
    Decimal,
    Boolean,
    /// Date without a time component
    Date,
    DateTime,
    /// Time of day without a date component. Temporal, but carries no
    /// calendar position, so it cannot be bucketed.
    Time,
    /// Embedded document
    Dictionary,
    Array,
    ObjectId,
    Unknown,
}

impl BaseType {
    /// Whether values of this type carry temporal information.
    pub fn is_temporal(self) -> bool {
        matches!(self, BaseType::Date | BaseType::DateTime | BaseType::Time)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, BaseType::Integer | BaseType::Float | BaseType::Decimal)
    }

    /// Parse a type string like "date-time" or "text".
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "string" => Some(BaseType::Text),
            "integer" | "int" => Some(BaseType::Integer),
            "float" | "double" => Some(BaseType::Float),
            "decimal" => Some(BaseType::Decimal),
            "boolean" | "bool" => Some(BaseType::Boolean),
            "date" => Some(BaseType::Date),
            "datetime" | "date-time" | "timestamp" => Some(BaseType::DateTime),
            "time" => Some(BaseType::Time),
            "dictionary" | "object" => Some(BaseType::Dictionary),
            "array" => Some(BaseType::Array),
            "objectid" | "object-id" => Some(BaseType::ObjectId),
            _ => None,
        }
    }
}

/// Semantic refinement of a field's base type.
///
/// A special type can widen the temporal taxonomy: a field whose base type is
/// `Integer` but whose special type is a UNIX timestamp is still bucketable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecialType {
    /// Primary key
    Pk,
    /// Foreign key
    Fk,
    Category,
    Name,
    /// Seconds since the UNIX epoch, stored as a number
    UnixTimestampSeconds,
    /// Milliseconds since the UNIX epoch, stored as a number
    UnixTimestampMilliseconds,
}

impl SpecialType {
    /// Whether this special type marks an identifier column.
    pub fn is_identifier(self) -> bool {
        matches!(self, SpecialType::Pk | SpecialType::Fk)
    }

    /// Whether this special type encodes a point in time.
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            SpecialType::UnixTimestampSeconds | SpecialType::UnixTimestampMilliseconds
        )
    }
}

/// Calendar unit used for temporal bucketing.
///
/// The `*Of*` variants are extractions (they produce an integer such as the
/// hour of day); the remaining variants are truncations (they produce a date
/// value aligned to the start of the unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemporalUnit {
    Default,
    Minute,
    MinuteOfHour,
    Hour,
    HourOfDay,
    Day,
    DayOfWeek,
    DayOfMonth,
    DayOfYear,
    Week,
    WeekOfYear,
    Month,
    MonthOfYear,
    Quarter,
    QuarterOfYear,
    Year,
}

impl TemporalUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            TemporalUnit::Default => "default",
            TemporalUnit::Minute => "minute",
            TemporalUnit::MinuteOfHour => "minute-of-hour",
            TemporalUnit::Hour => "hour",
            TemporalUnit::HourOfDay => "hour-of-day",
            TemporalUnit::Day => "day",
            TemporalUnit::DayOfWeek => "day-of-week",
            TemporalUnit::DayOfMonth => "day-of-month",
            TemporalUnit::DayOfYear => "day-of-year",
            TemporalUnit::Week => "week",
            TemporalUnit::WeekOfYear => "week-of-year",
            TemporalUnit::Month => "month",
            TemporalUnit::MonthOfYear => "month-of-year",
            TemporalUnit::Quarter => "quarter",
            TemporalUnit::QuarterOfYear => "quarter-of-year",
            TemporalUnit::Year => "year",
        }
    }

    /// Parse a unit string like "day-of-week".
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "default" => Some(TemporalUnit::Default),
            "minute" => Some(TemporalUnit::Minute),
            "minute-of-hour" => Some(TemporalUnit::MinuteOfHour),
            "hour" => Some(TemporalUnit::Hour),
            "hour-of-day" => Some(TemporalUnit::HourOfDay),
            "day" => Some(TemporalUnit::Day),
            "day-of-week" => Some(TemporalUnit::DayOfWeek),
            "day-of-month" => Some(TemporalUnit::DayOfMonth),
            "day-of-year" => Some(TemporalUnit::DayOfYear),
            "week" => Some(TemporalUnit::Week),
            "week-of-year" => Some(TemporalUnit::WeekOfYear),
            "month" => Some(TemporalUnit::Month),
            "month-of-year" => Some(TemporalUnit::MonthOfYear),
            "quarter" => Some(TemporalUnit::Quarter),
            "quarter-of-year" => Some(TemporalUnit::QuarterOfYear),
            "year" => Some(TemporalUnit::Year),
            _ => None,
        }
    }

    /// Whether the unit extracts an integer component (hour of day, day of
    /// week, ...) rather than truncating to a calendar boundary.
    pub fn is_extraction(self) -> bool {
        matches!(
            self,
            TemporalUnit::MinuteOfHour
                | TemporalUnit::HourOfDay
                | TemporalUnit::DayOfWeek
                | TemporalUnit::DayOfMonth
                | TemporalUnit::DayOfYear
                | TemporalUnit::WeekOfYear
                | TemporalUnit::MonthOfYear
                | TemporalUnit::QuarterOfYear
                | TemporalUnit::Year
        )
    }
}

impl std::fmt::Display for TemporalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for an order-by item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    Asc,
    Desc,
}
