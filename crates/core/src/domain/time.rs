// Time syntax spoken by at(1)

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};

/// Layout accepted by `at` on the command line: `HH:MM YYYY-MM-DD`
pub const AT_TIME_FORMAT: &str = "%H:%M %Y-%m-%d";

/// Layouts found in listings across at implementations (tried in order)
///
/// The submission layout comes last so a listing can always be read back
/// from what this crate submitted.
const LISTING_LAYOUTS: &[&str] = &[
    "%a %b %d %H:%M:%S %Y",
    "%a %b %d %H:%M %Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    AT_TIME_FORMAT,
];

/// Render a naive timestamp as-is
pub fn format_naive(time: &NaiveDateTime) -> String {
    time.format(AT_TIME_FORMAT).to_string()
}

/// Convert to `zone` first, then render
pub fn format_in_zone<Tz: TimeZone, Z: TimeZone>(time: &DateTime<Tz>, zone: &Z) -> String {
    format_naive(&time.with_timezone(zone).naive_local())
}

/// Convert a zoned timestamp to local time and render it for `at`
pub fn format_at_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String {
    format_in_zone(time, &Local)
}

/// Parse the timestamp text of a listing line
///
/// Runs of whitespace are collapsed first (`Tue Jun  5 ...` pads the day).
/// Zone abbreviations such as `CEST` are dropped: listings show local time.
pub fn parse_at_time(text: &str) -> Option<NaiveDateTime> {
    let normalized = text
        .split_whitespace()
        .filter(|word| !is_zone_abbreviation(word))
        .collect::<Vec<_>>()
        .join(" ");
    LISTING_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(&normalized, layout).ok())
}

/// `UTC`, `CEST`, `PST`... Day and month names are never all capitals.
fn is_zone_abbreviation(word: &str) -> bool {
    (2..=5).contains(&word.len()) && word.bytes().all(|b| b.is_ascii_uppercase())
}

/// When a submitted job should run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleTime {
    /// Local wall-clock time
    Naive(NaiveDateTime),
    /// Absolute time in some zone, converted to local before submission
    Zoned(DateTime<FixedOffset>),
    /// Free-form `at` expression such as `now + 1 minute`, passed verbatim
    Relative(String),
}

impl ScheduleTime {
    /// The single argument given to `at` when submitting
    pub fn to_at_argument(&self) -> String {
        match self {
            ScheduleTime::Naive(time) => format_naive(time),
            ScheduleTime::Zoned(time) => format_at_time(time),
            ScheduleTime::Relative(text) => text.clone(),
        }
    }
}

impl From<NaiveDateTime> for ScheduleTime {
    fn from(time: NaiveDateTime) -> Self {
        ScheduleTime::Naive(time)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for ScheduleTime {
    fn from(time: DateTime<Tz>) -> Self {
        ScheduleTime::Zoned(time.fixed_offset())
    }
}

impl From<&str> for ScheduleTime {
    fn from(text: &str) -> Self {
        ScheduleTime::Relative(text.to_string())
    }
}

impl From<String> for ScheduleTime {
    fn from(text: String) -> Self {
        ScheduleTime::Relative(text)
    }
}
