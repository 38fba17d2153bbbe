use serde::Serialize;

use crate::models::{new_id, NotificationRecord, Task, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    Created,
    Rearmed,
    /// Already unread, snoozed, or the task has no due date.
    Suppressed,
}

impl NotificationOutcome {
    pub fn is_new(self) -> bool {
        !matches!(self, NotificationOutcome::Suppressed)
    }
}

pub fn reminder_message(task: &Task, due: Timestamp) -> String {
    format!("'{}' is due by {}.", task.title, due.format("%Y-%m-%d %H:%M"))
}

/// The notification list behind the notification center.
#[derive(Debug, Clone, Default)]
pub struct NotificationCenter {
    records: Vec<NotificationRecord>,
}

impl NotificationCenter {
    pub fn new(records: Vec<NotificationRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn unread_count(&self) -> usize {
        self.records.iter().filter(|r| !r.read).count()
    }

    /// Creates or re-arms the record for the task's current due date.
    ///
    /// A record is keyed by (task id, due date): moving the due date produces a new
    /// record, while the same due date re-arms a read record unless it is snoozed
    /// past `now`.
    pub fn record_due(&mut self, task: &Task, now: Timestamp) -> NotificationOutcome {
        let Some(due) = task.due_date else {
            return NotificationOutcome::Suppressed;
        };

        let existing = self
            .records
            .iter_mut()
            .find(|r| r.task_id == task.id && r.due_date == Some(due));

        match existing {
            Some(record) => {
                if record.snoozed_until.is_some_and(|until| until > now) || !record.read {
                    return NotificationOutcome::Suppressed;
                }
                record.task_title = task.title.clone();
                record.message = reminder_message(task, due);
                record.created_at = now;
                record.read = false;
                record.snoozed_until = None;
                NotificationOutcome::Rearmed
            }
            None => {
                self.records.push(NotificationRecord {
                    id: new_id(),
                    task_id: task.id.clone(),
                    task_title: task.title.clone(),
                    message: reminder_message(task, due),
                    due_date: Some(due),
                    created_at: now,
                    read: false,
                    snoozed_until: None,
                });
                NotificationOutcome::Created
            }
        }
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut NotificationRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    pub fn mark_read(&mut self, id: &str, read: bool) -> bool {
        match self.find_mut(id) {
            Some(record) => {
                record.read = read;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for record in self.records.iter_mut().filter(|r| !r.read) {
            record.read = true;
            changed += 1;
        }
        changed
    }

    /// Hides the record until `until`; a snoozed record counts as read.
    pub fn snooze(&mut self, id: &str, until: Timestamp) -> bool {
        match self.find_mut(id) {
            Some(record) => {
                record.snoozed_until = Some(until);
                record.read = true;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        self.records.len() != before
    }

    pub fn clear_read(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !r.read);
        before - self.records.len()
    }

    pub fn remove_for_task(&mut self, task_id: &str) {
        self.records.retain(|r| r.task_id != task_id);
    }
}
