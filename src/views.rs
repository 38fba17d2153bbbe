use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{HistoryStatus, KanbanColumn, Priority, Task, TaskHistoryEntry, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Completed,
}

/// The list view's filter bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "snake_case")]
pub struct TaskFilter {
    pub status: StatusFilter,
    pub tag: Option<String>,
    pub search: String,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Pending => !task.completed,
            StatusFilter::Completed => task.completed,
        };
        if !status_ok {
            return false;
        }

        if let Some(tag) = self.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if !task.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }

        let search = self.search.trim().to_lowercase();
        if search.is_empty() {
            return true;
        }
        task.title.to_lowercase().contains(&search)
            || task.description.to_lowercase().contains(&search)
            || task.tags.iter().any(|t| t.to_lowercase().contains(&search))
    }

    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        tasks.iter().filter(|t| self.matches(t)).cloned().collect()
    }

    pub fn rows(&self, tasks: &[Task]) -> Vec<TaskRow> {
        self.apply(tasks).into_iter().map(TaskRow::new).collect()
    }
}

/// A list row: the task plus its recurrence display text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRow {
    #[serde(flatten)]
    pub task: Task,
    pub recurrence_label: Option<String>,
}

impl TaskRow {
    pub fn new(task: Task) -> Self {
        let recurrence_label = task
            .recurrence
            .as_ref()
            .filter(|_| task.is_recurring())
            .map(|rule| rule.describe());
        Self {
            task,
            recurrence_label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    #[serde(flatten)]
    pub entry: TaskHistoryEntry,
    pub status: HistoryStatus,
    pub days_to_complete: Option<f64>,
}

/// History entries with their derived status, newest first.
pub fn history_rows(history: &[TaskHistoryEntry]) -> Vec<HistoryRow> {
    let mut rows: Vec<HistoryRow> = history
        .iter()
        .map(|entry| HistoryRow {
            status: entry.status(),
            days_to_complete: entry
                .time_to_complete()
                .map(|d| d.num_seconds() as f64 / 86_400.0),
            entry: entry.clone(),
        })
        .collect();
    rows.sort_by(|a, b| b.entry.created_at.cmp(&a.entry.created_at));
    rows
}

/// A task or subtask shown on a calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEntry {
    pub task_id: String,
    pub subtask_index: Option<usize>,
    pub title: String,
    pub due_date: Timestamp,
    pub completed: bool,
    pub priority: Priority,
}

pub fn calendar_entries(tasks: &[Task], day: NaiveDate) -> Vec<CalendarEntry> {
    let mut entries = Vec::new();
    for task in tasks {
        if let Some(due) = task.due_date.filter(|d| d.date() == day) {
            entries.push(CalendarEntry {
                task_id: task.id.clone(),
                subtask_index: None,
                title: task.title.clone(),
                due_date: due,
                completed: task.completed,
                priority: task.priority,
            });
        }
        for (index, sub) in task.subtasks.iter().enumerate() {
            if let Some(due) = sub.due_date.filter(|d| d.date() == day) {
                entries.push(CalendarEntry {
                    task_id: task.id.clone(),
                    subtask_index: Some(index),
                    title: format!("{} • {}", task.title, sub.title),
                    due_date: due,
                    completed: sub.completed,
                    priority: sub.priority,
                });
            }
        }
    }
    entries
}

/// Days of the given month that have at least one task or subtask due.
pub fn busy_days(tasks: &[Task], year: i32, month: u32) -> Vec<NaiveDate> {
    let days: BTreeSet<NaiveDate> = tasks
        .iter()
        .flat_map(|task| {
            task.due_date
                .into_iter()
                .chain(task.subtasks.iter().filter_map(|sub| sub.due_date))
        })
        .map(|due| due.date())
        .filter(|day| day.year() == year && day.month() == month)
        .collect();
    days.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanLane {
    pub column: KanbanColumn,
    pub tasks: Vec<Task>,
}

/// Groups tasks into one lane per column by status tag, each lane ordered by
/// `sort_order`. Tasks without a status tag are treated as "New".
pub fn kanban_board(tasks: &[Task], columns: &[KanbanColumn]) -> Vec<KanbanLane> {
    let mut columns = columns.to_vec();
    columns.sort_by_key(|c| c.display_order);
    columns
        .into_iter()
        .map(|column| {
            let mut lane: Vec<Task> = tasks
                .iter()
                .filter(|t| t.status().eq_ignore_ascii_case(&column.name))
                .cloned()
                .collect();
            lane.sort_by_key(|t| t.sort_order);
            KanbanLane { column, tasks: lane }
        })
        .collect()
}

/// Distinct non-blank tags, compared and sorted case-insensitively; the first
/// spelling seen wins.
pub fn tag_options(tasks: &[Task]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut tags = Vec::new();
    for tag in tasks.iter().flat_map(|t| t.tags.iter()) {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.to_lowercase()) {
            tags.push(tag.to_string());
        }
    }
    tags.sort_by_key(|t| t.to_lowercase());
    tags
}
