use chrono::{Datelike, Duration, Months, Weekday};

use crate::models::{RecurrenceKind, RecurrenceRule, Timestamp};

/// Computes the raw next due date for `rule`, counted from `reference`.
///
/// The rule's end date is deliberately not applied here; callers compare the result
/// with [`RecurrenceRule::allows`] to decide whether the series has ended.
///
/// Monthly rules add calendar months and clamp to the last day of the target month
/// when the day does not exist there (Jan 31 + 1 month is Feb 29 in a leap year).
pub fn next_occurrence(rule: &RecurrenceRule, reference: Timestamp) -> Option<Timestamp> {
    let interval = rule.interval.max(1);
    match rule.kind {
        RecurrenceKind::None => None,
        RecurrenceKind::Daily => reference.checked_add_signed(Duration::days(i64::from(interval))),
        RecurrenceKind::Weekly => {
            reference.checked_add_signed(Duration::days(7 * i64::from(interval)))
        }
        RecurrenceKind::Monthly => reference.checked_add_months(Months::new(interval)),
        RecurrenceKind::Custom if rule.days_of_week.is_empty() => None,
        RecurrenceKind::Custom => next_weekday(reference, &rule.days_of_week),
    }
}

fn next_weekday(from: Timestamp, days: &[Weekday]) -> Option<Timestamp> {
    (1..=7)
        .filter_map(|offset| from.checked_add_signed(Duration::days(offset)))
        .find(|candidate| days.contains(&candidate.weekday()))
        .or_else(|| from.checked_add_signed(Duration::days(1)))
}

impl RecurrenceRule {
    pub fn every(kind: RecurrenceKind, interval: u32) -> Self {
        Self {
            kind,
            interval: interval.max(1),
            ..Self::default()
        }
    }

    pub fn on_weekdays(days: Vec<Weekday>) -> Self {
        Self {
            kind: RecurrenceKind::Custom,
            days_of_week: days,
            ..Self::default()
        }
    }

    pub fn until(mut self, end_date: chrono::NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// False once `next` falls on a calendar day after the end date.
    pub fn allows(&self, next: Timestamp) -> bool {
        match self.end_date {
            Some(end) => next.date() <= end,
            None => true,
        }
    }

    pub fn describe(&self) -> String {
        let every = |one: &str, many: &str| {
            if self.interval <= 1 {
                format!("Every {one}")
            } else {
                format!("Every {} {many}", self.interval)
            }
        };
        match self.kind {
            RecurrenceKind::Daily => every("day", "days"),
            RecurrenceKind::Weekly => every("week", "weeks"),
            RecurrenceKind::Monthly => every("month", "months"),
            RecurrenceKind::Custom if !self.days_of_week.is_empty() => {
                let days: Vec<String> = self.days_of_week.iter().map(|d| d.to_string()).collect();
                format!("Custom: {}", days.join(", "))
            }
            _ => "None".to_string(),
        }
    }
}
