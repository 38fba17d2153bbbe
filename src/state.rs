use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{
    GeneralNote, KanbanColumn, NotificationRecord, Settings, Task, TaskData, TaskHistoryEntry,
    Timestamp, COMPLETE_STATUS, SCHEMA_VERSION, STATUS_TAGS,
};
use crate::notifications::{NotificationCenter, NotificationOutcome};
use crate::recurrence::next_occurrence;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task not found")]
    NotFound,
    #[error("task is already completed")]
    AlreadyCompleted,
    #[error("all subtasks must be completed before completing the parent task")]
    IncompleteSubtasks,
    #[error("blocked by incomplete dependencies: {}", .0.join(", "))]
    BlockedByDependencies(Vec<String>),
    #[error("subtask index {0} out of range")]
    SubtaskOutOfRange(usize),
    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub completed: Task,
    /// The spawned next instance of a recurring task.
    pub next: Option<Task>,
    /// True when the next occurrence fell after the rule's end date.
    pub series_ended: bool,
}

#[derive(Debug, Clone)]
pub struct RemovedTask {
    pub task: Task,
    /// Attachment names no remaining task refers to.
    pub orphaned_attachments: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<AppData>>,
}

impl AppState {
    pub fn new(data: TaskData, settings: Settings, notifications: Vec<NotificationRecord>) -> Self {
        let mut data = data;
        if data.kanban_columns.is_empty() {
            data.kanban_columns = KanbanColumn::status_columns();
        }
        Self {
            inner: Arc::new(Mutex::new(AppData {
                data,
                settings,
                notifications: NotificationCenter::new(notifications),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AppData> {
        self.inner.lock().expect("state poisoned")
    }

    pub fn task_data(&self) -> TaskData {
        let guard = self.lock();
        TaskData {
            schema_version: SCHEMA_VERSION,
            ..guard.data.clone()
        }
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().data.tasks.clone()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.lock()
            .data
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
    }

    pub fn history(&self) -> Vec<TaskHistoryEntry> {
        self.lock().data.history.clone()
    }

    pub fn kanban_columns(&self) -> Vec<KanbanColumn> {
        self.lock().data.kanban_columns.clone()
    }

    pub fn notes(&self) -> Vec<GeneralNote> {
        self.lock().data.general_notes.clone()
    }

    /// Swaps in data restored from a backup.
    pub fn replace_data(&self, data: TaskData) {
        let mut data = data;
        if data.kanban_columns.is_empty() {
            data.kanban_columns = KanbanColumn::status_columns();
        }
        self.lock().data = data;
    }

    /// Appends the task at the end of the list.
    pub fn add_task(&self, task: Task) -> Task {
        let mut guard = self.lock();
        let mut task = task;
        if task.id.is_empty() {
            task.id = crate::models::new_id();
        }
        task.sort_order = guard.data.next_sort_order();
        guard.data.ensure_history(&task);
        guard.data.tasks.push(task.clone());
        task
    }

    /// Replaces the task with the edited copy.
    ///
    /// A change of the completed flag goes through the same checks and history
    /// bookkeeping as [`AppState::complete_task`] and [`AppState::reopen_task`];
    /// `completed_at` from the edit is ignored.
    pub fn update_task(&self, task: Task, now: Timestamp) -> Result<Task, TaskError> {
        let mut guard = self.lock();
        let data = &mut guard.data;
        let index = data
            .tasks
            .iter()
            .position(|t| t.id == task.id)
            .ok_or(TaskError::NotFound)?;

        let mut task = task;
        let was_completed = data.tasks[index].completed;
        let wants_completed = task.completed;
        if wants_completed && !was_completed {
            data.check_completable(&task)?;
        }
        task.completed = was_completed;
        task.completed_at = data.tasks[index].completed_at;
        data.tasks[index] = task;
        let current = data.tasks[index].clone();
        data.ensure_history(&current);

        match (was_completed, wants_completed) {
            (false, true) => Ok(data.complete_at(index, now)?.completed),
            (true, false) => Ok(data.reopen_at(index)),
            _ => Ok(current),
        }
    }

    pub fn remove_task(&self, task_id: &str, now: Timestamp) -> Result<RemovedTask, TaskError> {
        let mut guard = self.lock();
        let index = guard
            .data
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or(TaskError::NotFound)?;
        let task = guard.data.tasks.remove(index);

        let entry = guard.data.ensure_history(&task);
        if entry.completed_at.is_none() {
            entry.completed_at = task.completed_at;
        }
        entry.deleted_at = Some(now);

        let still_used: HashSet<&String> = guard
            .data
            .tasks
            .iter()
            .flat_map(|t| t.all_attachments())
            .collect();
        let mut orphaned = Vec::new();
        for name in task.all_attachments() {
            if !still_used.contains(name) && !orphaned.contains(name) {
                orphaned.push(name.clone());
            }
        }
        Ok(RemovedTask {
            task,
            orphaned_attachments: orphaned,
        })
    }

    /// Marks a task complete and spawns the next instance of a recurring task.
    ///
    /// The next due date is counted from `now`, the moment of completion.
    pub fn complete_task(&self, task_id: &str, now: Timestamp) -> Result<CompletionOutcome, TaskError> {
        let mut guard = self.lock();
        let data = &mut guard.data;
        let index = data
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or(TaskError::NotFound)?;
        data.complete_at(index, now)
    }

    pub fn reopen_task(&self, task_id: &str) -> Result<Task, TaskError> {
        let mut guard = self.lock();
        let data = &mut guard.data;
        let index = data
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or(TaskError::NotFound)?;
        Ok(data.reopen_at(index))
    }

    /// Unchecking a subtask of a completed task reopens the parent.
    pub fn set_subtask_completed(
        &self,
        task_id: &str,
        index: usize,
        completed: bool,
    ) -> Result<Task, TaskError> {
        let mut guard = self.lock();
        let data = &mut guard.data;
        let task = data
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(TaskError::NotFound)?;
        let subtask = task
            .subtasks
            .get_mut(index)
            .ok_or(TaskError::SubtaskOutOfRange(index))?;
        subtask.completed = completed;

        let reopened = task.completed && task.subtasks.iter().any(|sub| !sub.completed);
        if reopened {
            task.completed = false;
            task.completed_at = None;
        }
        let task = task.clone();
        if reopened {
            data.ensure_history(&task).completed_at = None;
        }
        Ok(task)
    }

    /// Moves `dragged_id` to the position of `target_id` and renumbers the list.
    pub fn move_task(&self, dragged_id: &str, target_id: &str) -> Result<(), TaskError> {
        let mut guard = self.lock();
        let tasks = &mut guard.data.tasks;
        let from = tasks
            .iter()
            .position(|t| t.id == dragged_id)
            .ok_or(TaskError::NotFound)?;
        let to = tasks
            .iter()
            .position(|t| t.id == target_id)
            .ok_or(TaskError::NotFound)?;
        if from != to {
            let task = tasks.remove(from);
            tasks.insert(to, task);
        }
        for (order, task) in tasks.iter_mut().enumerate() {
            task.sort_order = order as i64;
        }
        Ok(())
    }

    /// Kanban drop: the status column decides the status tag and completion.
    pub fn set_status(&self, task_id: &str, status: &str, now: Timestamp) -> Result<Task, TaskError> {
        let status = STATUS_TAGS
            .iter()
            .find(|s| s.eq_ignore_ascii_case(status))
            .copied()
            .ok_or_else(|| TaskError::UnknownStatus(status.to_string()))?;

        let mut guard = self.lock();
        let data = &mut guard.data;
        let column_id = data
            .kanban_columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(status))
            .map(|c| c.id.clone());
        let task = data
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(TaskError::NotFound)?;

        let done = status == COMPLETE_STATUS;
        task.set_status_tag(status);
        task.completed = done;
        task.completed_at = done.then_some(now);
        task.column_id = column_id;
        let task = task.clone();
        data.ensure_history(&task).completed_at = task.completed_at;
        Ok(task)
    }

    /// Calendar drop: the task becomes due at the start of `day`.
    pub fn reschedule(&self, task_id: &str, day: NaiveDate) -> Result<Task, TaskError> {
        let mut guard = self.lock();
        let task = guard
            .data
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(TaskError::NotFound)?;
        task.due_date = Some(day.and_time(chrono::NaiveTime::MIN));
        Ok(task.clone())
    }

    pub fn add_attachment(&self, task_id: &str, name: String) -> Result<Task, TaskError> {
        let mut guard = self.lock();
        let task = guard
            .data
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(TaskError::NotFound)?;
        task.attachments.push(name);
        Ok(task.clone())
    }

    /// Adds a new note or updates the one with the same id.
    pub fn save_note(&self, note: GeneralNote, now: Timestamp) -> GeneralNote {
        let mut guard = self.lock();
        let notes = &mut guard.data.general_notes;
        let mut note = note;
        note.modified_at = now;
        match notes.iter_mut().find(|n| !note.id.is_empty() && n.id == note.id) {
            Some(existing) => {
                note.created_at = existing.created_at;
                *existing = note.clone();
            }
            None => {
                if note.id.is_empty() {
                    note.id = crate::models::new_id();
                }
                note.created_at = now;
                notes.push(note.clone());
            }
        }
        note
    }

    pub fn remove_note(&self, note_id: &str) -> bool {
        let mut guard = self.lock();
        let notes = &mut guard.data.general_notes;
        let before = notes.len();
        notes.retain(|n| n.id != note_id);
        notes.len() != before
    }

    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    pub fn reminder_settings(&self) -> crate::models::ReminderSettings {
        self.lock().settings.reminders()
    }

    pub fn update_settings(&self, settings: Settings) {
        self.lock().settings = settings;
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.lock().notifications.records().to_vec()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().notifications.unread_count()
    }

    pub fn record_notification(&self, task: &Task, now: Timestamp) -> NotificationOutcome {
        self.lock().notifications.record_due(task, now)
    }

    /// Runs `f` against the notification center under the state lock.
    pub fn with_notifications<R>(&self, f: impl FnOnce(&mut NotificationCenter) -> R) -> R {
        f(&mut self.lock().notifications)
    }
}

#[derive(Debug)]
struct AppData {
    data: TaskData,
    settings: Settings,
    notifications: NotificationCenter,
}

impl TaskData {
    fn next_sort_order(&self) -> i64 {
        self.tasks
            .iter()
            .map(|t| t.sort_order + 1)
            .max()
            .unwrap_or(0)
    }

    /// Rejects completing `task` while a subtask or a dependency is still open.
    fn check_completable(&self, task: &Task) -> Result<(), TaskError> {
        if task.subtasks.iter().any(|sub| !sub.completed) {
            return Err(TaskError::IncompleteSubtasks);
        }
        let blockers: Vec<String> = task
            .depends_on
            .iter()
            .filter_map(|dep| self.tasks.iter().find(|t| &t.id == dep))
            .filter(|dep| !dep.completed)
            .map(|dep| dep.title.clone())
            .collect();
        if !blockers.is_empty() {
            return Err(TaskError::BlockedByDependencies(blockers));
        }
        Ok(())
    }

    /// Marks the task at `index` complete and spawns the next instance of a
    /// recurring task. The next due date is counted from `now`.
    fn complete_at(&mut self, index: usize, now: Timestamp) -> Result<CompletionOutcome, TaskError> {
        if self.tasks[index].completed {
            return Err(TaskError::AlreadyCompleted);
        }
        self.check_completable(&self.tasks[index])?;

        let task = &mut self.tasks[index];
        task.completed = true;
        task.completed_at = Some(now);
        let completed = task.clone();
        self.ensure_history(&completed).completed_at = completed.completed_at;

        let mut outcome = CompletionOutcome {
            completed: completed.clone(),
            next: None,
            series_ended: false,
        };
        let Some(rule) = completed.recurrence.as_ref().filter(|_| completed.is_recurring()) else {
            return Ok(outcome);
        };
        let Some(next_due) = next_occurrence(rule, now) else {
            return Ok(outcome);
        };
        if !rule.allows(next_due) {
            log::info!(
                "task: recurring series ended task_id={} next_due={next_due}",
                completed.id
            );
            outcome.series_ended = true;
            return Ok(outcome);
        }

        let mut next = Task::new(completed.title.clone(), now);
        next.description = completed.description.clone();
        next.description_is_markdown = completed.description_is_markdown;
        next.priority = completed.priority;
        next.tags = completed.tags.clone();
        next.recurrence = completed.recurrence.clone();
        next.due_date = Some(next_due);
        next.sort_order = self.next_sort_order();
        self.ensure_history(&next);
        self.tasks.push(next.clone());
        log::info!(
            "task: spawned next occurrence task_id={} next_id={} due={next_due}",
            completed.id,
            next.id
        );
        outcome.next = Some(next);
        Ok(outcome)
    }

    /// Clears completion on the task at `index` and on its history entry.
    fn reopen_at(&mut self, index: usize) -> Task {
        let task = &mut self.tasks[index];
        task.completed = false;
        task.completed_at = None;
        let task = task.clone();
        self.ensure_history(&task).completed_at = None;
        task
    }

    /// Returns the history entry for `task`, creating it or syncing its text.
    pub(crate) fn ensure_history(&mut self, task: &Task) -> &mut TaskHistoryEntry {
        match self.history.iter().position(|h| h.task_id == task.id) {
            Some(index) => {
                let entry = &mut self.history[index];
                entry.title = task.title.clone();
                entry.description = task.description.clone();
                if entry.completed_at.is_none() {
                    entry.completed_at = task.completed_at;
                }
                entry
            }
            None => {
                self.history.push(TaskHistoryEntry::from_task(task));
                let last = self.history.len() - 1;
                &mut self.history[last]
            }
        }
    }
}
