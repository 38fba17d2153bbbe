use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::models::{Priority, Task, TaskHistoryEntry, Timestamp, STATUS_TAGS};

const TOP_TAGS: usize = 10;
const TREND_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountShare {
    pub label: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub completion_rate: f64,
    /// Mean time from creation to completion across history, in days.
    pub average_days_to_complete: Option<f64>,
    pub priorities: Vec<CountShare>,
    pub statuses: Vec<CountShare>,
    pub top_tags: Vec<CountShare>,
    pub overdue: usize,
    pub due_today: usize,
    pub due_this_week: usize,
    pub recurring: usize,
    pub with_dependencies: usize,
    /// Completions for the last seven days, oldest first, ending today.
    pub completions_per_day: Vec<DailyCount>,
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

fn share(label: impl Into<String>, count: usize, total: usize) -> CountShare {
    CountShare {
        label: label.into(),
        count,
        percentage: percent(count, total),
    }
}

impl Statistics {
    pub fn compute(tasks: &[Task], history: &[TaskHistoryEntry], now: Timestamp) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();

        let durations: Vec<f64> = history
            .iter()
            .filter_map(TaskHistoryEntry::time_to_complete)
            .map(|d| d.num_seconds() as f64 / 86_400.0)
            .collect();
        let average_days_to_complete = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        let priorities = [Priority::High, Priority::Medium, Priority::Low]
            .into_iter()
            .map(|p| {
                let count = tasks.iter().filter(|t| t.priority == p).count();
                share(p.label(), count, total)
            })
            .collect();

        let statuses = STATUS_TAGS
            .iter()
            .map(|status| {
                let count = tasks.iter().filter(|t| t.status() == *status).count();
                share(*status, count, total)
            })
            .collect();

        let today = now.date();
        let week_end = today + Duration::days(TREND_DAYS);
        let open_due: Vec<Timestamp> = tasks
            .iter()
            .filter(|t| !t.completed)
            .filter_map(|t| t.due_date)
            .collect();

        let completions_per_day = (0..TREND_DAYS)
            .rev()
            .map(|back| {
                let day = today - Duration::days(back);
                let count = history
                    .iter()
                    .filter(|h| h.completed_at.is_some_and(|at| at.date() == day))
                    .count();
                DailyCount { day, count }
            })
            .collect();

        Self {
            total,
            completed,
            pending: total - completed,
            completion_rate: percent(completed, total),
            average_days_to_complete,
            priorities,
            statuses,
            top_tags: top_tags(tasks, total),
            overdue: open_due.iter().filter(|due| **due < now).count(),
            due_today: open_due.iter().filter(|due| due.date() == today).count(),
            due_this_week: open_due
                .iter()
                .filter(|due| due.date() >= today && due.date() <= week_end)
                .count(),
            recurring: tasks.iter().filter(|t| t.is_recurring()).count(),
            with_dependencies: tasks.iter().filter(|t| !t.depends_on.is_empty()).count(),
            completions_per_day,
        }
    }
}

/// Most used tags, ties broken alphabetically.
fn top_tags(tasks: &[Task], total: usize) -> Vec<CountShare> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for tag in tasks.iter().flat_map(|t| t.tags.iter()) {
        match counts.iter_mut().find(|(name, _)| name == tag) {
            Some((_, count)) => *count += 1,
            None => counts.push((tag.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
        .into_iter()
        .take(TOP_TAGS)
        .map(|(tag, count)| share(tag, count, total))
        .collect()
}
