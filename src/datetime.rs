// Date and time built-ins
// strftime-style layouts (`%Y-%m-%d`), IANA zone names, Unix timestamps

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{
    DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Timelike,
    Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

use crate::error::EngineError;
use crate::native;
use crate::registry::Registry;
use crate::value::Token;

/// DateTime errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DateTimeError {
    #[error("invalid layout {0:?}")]
    InvalidLayout(String),

    #[error("cannot parse {date:?} with layout {layout:?}")]
    ParseError { layout: String, date: String },

    #[error("unknown time zone {0:?}")]
    UnknownZone(String),

    #[error("unsupported unit {0:?}, supported units are s, ms, us, ns")]
    UnknownUnit(String),

    #[error("timestamp out of range")]
    OutOfRange,

    #[error("cannot format with layout {0:?}")]
    FormatError(String),
}

impl From<DateTimeError> for EngineError {
    fn from(e: DateTimeError) -> Self {
        EngineError::InvalidOperation(e.to_string())
    }
}

/// Parse a layout up front so bad specifiers fail instead of printing
/// garbage.
fn layout_items(layout: &str) -> Result<Vec<Item<'_>>, DateTimeError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(layout).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return Err(DateTimeError::InvalidLayout(layout.to_string()));
    }
    Ok(items)
}

fn zone(name: &str) -> Result<Tz, DateTimeError> {
    if name.is_empty() {
        return Ok(Tz::UTC);
    }
    name.parse::<Tz>()
        .map_err(|_| DateTimeError::UnknownZone(name.to_string()))
}

fn format<T: TimeZone>(dt: &DateTime<T>, layout: &str) -> Result<String, DateTimeError>
where
    T::Offset: std::fmt::Display,
{
    let items = layout_items(layout)?;
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.iter()))
        .map_err(|_| DateTimeError::FormatError(layout.to_string()))?;
    Ok(out)
}

/// Parse `date` with `layout`. Without an offset in the layout the value is
/// taken as UTC; date-only and time-only layouts fill in midnight and
/// 0000-01-01 respectively.
pub fn parse(layout: &str, date: &str) -> Result<DateTime<Utc>, DateTimeError> {
    layout_items(layout)?;
    if let Ok(dt) = DateTime::parse_from_str(date, layout) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(date, layout) {
        return Ok(naive.and_utc());
    }
    if let Some(midnight) = NaiveDate::parse_from_str(date, layout)
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    if let Ok(time) = NaiveTime::parse_from_str(date, layout) {
        if let Some(day) = NaiveDate::from_ymd_opt(0, 1, 1) {
            return Ok(day.and_time(time).and_utc());
        }
    }
    Err(DateTimeError::ParseError {
        layout: layout.to_string(),
        date: date.to_string(),
    })
}

/// $CurrentTime(layout, tz)
pub fn current_time(layout: &str, tz: &str, default_layout: &str) -> Result<String, DateTimeError> {
    let layout = if layout.is_empty() { default_layout } else { layout };
    let now = Utc::now().with_timezone(&zone(tz)?);
    format(&now, layout)
}

/// $ParseTime(layout, date) - RFC 3339 in UTC; `""` for an empty date
pub fn parse_time(layout: &str, date: &str) -> Result<String, DateTimeError> {
    if date.is_empty() {
        return Ok(String::new());
    }
    Ok(parse(layout, date)?.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// $ReformatTime(inLayout, date, outLayout) - `""` for an empty date
pub fn reformat_time(in_layout: &str, date: &str, out_layout: &str) -> Result<String, DateTimeError> {
    if date.is_empty() {
        return Ok(String::new());
    }
    format(&parse(in_layout, date)?, out_layout)
}

/// $SplitTime(layout, date)
///
/// `[year, month, day, hour, minute, second, nanosecond]` as strings; empty
/// for an empty date.
pub fn split_time(layout: &str, date: &str) -> Result<Vec<Token>, DateTimeError> {
    if date.is_empty() {
        return Ok(Vec::new());
    }
    let dt = parse(layout, date)?;
    Ok([
        dt.year() as i64,
        dt.month() as i64,
        dt.day() as i64,
        dt.hour() as i64,
        dt.minute() as i64,
        dt.second() as i64,
        dt.nanosecond() as i64,
    ]
    .iter()
    .map(|c| Token::from(c.to_string()))
    .collect())
}

/// $ParseUnixTime(unit, ts, layout, tz)
///
/// `ts` is truncated to an integer count of `unit` (`s`, `ms`, `us` or `ns`,
/// any case). An empty layout renders RFC 3339.
pub fn parse_unix_time(unit: &str, ts: f64, layout: &str, tz: &str) -> Result<String, DateTimeError> {
    let per_unit: i128 = match unit.to_lowercase().as_str() {
        "s" => 1_000_000_000,
        "ms" => 1_000_000,
        "us" => 1_000,
        "ns" => 1,
        _ => return Err(DateTimeError::UnknownUnit(unit.to_string())),
    };
    let nanos = (ts.trunc() as i64) as i128 * per_unit;
    let secs = i64::try_from(nanos.div_euclid(1_000_000_000)).map_err(|_| DateTimeError::OutOfRange)?;
    let subsec = nanos.rem_euclid(1_000_000_000) as u32;
    let dt = DateTime::from_timestamp(secs, subsec)
        .ok_or(DateTimeError::OutOfRange)?
        .with_timezone(&zone(tz)?);
    if layout.is_empty() {
        return Ok(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }
    format(&dt, layout)
}

/// Bind the time built-ins. `default_layout` is what `$CurrentTime` uses for
/// an empty layout argument.
pub fn register_all(registry: &mut Registry, default_layout: &str) -> Result<(), EngineError> {
    let default_layout = default_layout.to_string();
    let natives = [
        native!("$CurrentTime", (layout: String, tz: String) =>
            current_time(&layout, &tz, &default_layout).map_err(EngineError::from)),
        native!("$ParseTime", (layout: String, date: String) =>
            parse_time(&layout, &date).map_err(EngineError::from)),
        native!("$ParseUnixTime", (unit: String, ts: f64, layout: String, tz: String) =>
            parse_unix_time(&unit, ts, &layout, &tz).map_err(EngineError::from)),
        native!("$ReformatTime", (in_layout: String, date: String, out_layout: String) =>
            reformat_time(&in_layout, &date, &out_layout).map_err(EngineError::from)),
        native!("$SplitTime", (layout: String, date: String) =>
            split_time(&layout, &date).map_err(EngineError::from)),
    ];
    for projector in natives {
        registry.register_native(projector)?;
    }
    Ok(())
}
