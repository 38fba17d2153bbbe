use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::Regex;
use serde::Serialize;

use crate::models::{Priority, Timestamp};

/// Fields extracted from a one-line task description such as
/// `"pay rent tomorrow 9am #home !high"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedTask {
    pub title: String,
    pub due_date: Option<Timestamp>,
    pub tags: Vec<String>,
    pub priority: Priority,
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?(am|pm)?$").expect("valid quick add time regex")
    })
}

/// Parses quick-add input relative to `today`.
///
/// Recognised tokens are removed from the title; the last date and the last time
/// win. A time without a date lands on `today`, a date without a time at midnight.
pub fn parse(input: &str, today: NaiveDate) -> ParsedTask {
    let mut title = Vec::new();
    let mut tags = Vec::new();
    let mut priority = Priority::Medium;
    let mut date = None;
    let mut time = None;

    for token in input.split_whitespace() {
        if let Some(tag) = token.strip_prefix('#') {
            if !tag.is_empty() {
                tags.push(tag.to_string());
            }
            continue;
        }
        if let Some(level) = token.strip_prefix('!') {
            priority = match level.to_lowercase().as_str() {
                "high" | "h" => Priority::High,
                "low" | "l" => Priority::Low,
                _ => Priority::Medium,
            };
            continue;
        }
        if let Some(day) = relative_date(&token.to_lowercase(), today) {
            date = Some(day);
            continue;
        }
        if let Some(at) = parse_time(token) {
            time = Some(at);
            continue;
        }
        if let Some(day) = explicit_date(token) {
            date = Some(day);
            continue;
        }
        title.push(token);
    }

    let due_date = match (date, time) {
        (Some(day), Some(at)) => Some(day.and_time(at)),
        (Some(day), None) => Some(day.and_time(NaiveTime::MIN)),
        (None, Some(at)) => Some(today.and_time(at)),
        (None, None) => None,
    };

    ParsedTask {
        title: title.join(" "),
        due_date,
        tags,
        priority,
    }
}

fn relative_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let weekday = match token {
        "today" => return Some(today),
        "tomorrow" | "tmr" => return today.succ_opt(),
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(next_weekday(today, weekday))
}

/// The next `weekday` strictly after `today`.
fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    today + Duration::days(i64::from(ahead))
}

fn parse_time(token: &str) -> Option<NaiveTime> {
    let caps = time_pattern().captures(token)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    match caps.get(3).map(|m| m.as_str().to_lowercase()).as_deref() {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn explicit_date(token: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
}
