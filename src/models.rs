use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

/// Local wall-clock time. The app is single-user and stores times the way the user
/// entered them, so no offset is carried.
pub type Timestamp = NaiveDateTime;

pub const SCHEMA_VERSION: u32 = 1;

/// Status tags used by the Kanban board, in column order.
pub const STATUS_TAGS: [&str; 4] = ["New", "In Progress", "On Hold", "Complete"];
pub const DEFAULT_STATUS: &str = "New";
pub const COMPLETE_STATUS: &str = "Complete";

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    /// Repeats on a set of weekdays.
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RecurrenceRule {
    #[serde(default)]
    pub kind: RecurrenceKind,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            kind: RecurrenceKind::None,
            interval: default_interval(),
            end_date: None,
            days_of_week: Vec::new(),
        }
    }
}

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "snake_case")]
pub struct SubTask {
    pub title: String,
    pub completed: bool,
    pub description: String,
    pub due_date: Option<Timestamp>,
    pub priority: Priority,
    pub attachments: Vec<String>,
    pub is_markdown: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "snake_case")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub description_is_markdown: bool,
    pub due_date: Option<Timestamp>,
    pub priority: Priority,
    pub completed: bool,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub sort_order: i64,
    /// File names relative to the attachments directory.
    pub attachments: Vec<String>,
    pub subtasks: Vec<SubTask>,
    pub tags: Vec<String>,
    pub recurrence: Option<RecurrenceRule>,
    pub depends_on: Vec<String>,
    pub column_id: Option<String>,
    pub note: String,
    pub note_is_markdown: bool,
}

impl Task {
    pub fn new(title: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            created_at,
            ..Self::default()
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence
            .as_ref()
            .is_some_and(|rule| rule.kind != RecurrenceKind::None)
    }

    /// The Kanban status tag carried in `tags`, if any.
    pub fn status_tag(&self) -> Option<&'static str> {
        self.tags.iter().find_map(|tag| {
            STATUS_TAGS
                .iter()
                .find(|status| status.eq_ignore_ascii_case(tag))
                .copied()
        })
    }

    pub fn status(&self) -> &'static str {
        self.status_tag().unwrap_or(DEFAULT_STATUS)
    }

    pub fn set_status_tag(&mut self, status: &str) {
        self.tags
            .retain(|tag| !STATUS_TAGS.iter().any(|s| s.eq_ignore_ascii_case(tag)));
        self.tags.push(status.to_string());
    }

    pub fn all_attachments(&self) -> impl Iterator<Item = &String> {
        self.attachments
            .iter()
            .chain(self.subtasks.iter().flat_map(|sub| sub.attachments.iter()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Active,
    Completed,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "snake_case")]
pub struct TaskHistoryEntry {
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub deleted_at: Option<Timestamp>,
}

impl TaskHistoryEntry {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            created_at: task.created_at,
            completed_at: task.completed_at,
            deleted_at: None,
        }
    }

    pub fn status(&self) -> HistoryStatus {
        if self.deleted_at.is_some() {
            HistoryStatus::Deleted
        } else if self.completed_at.is_some() {
            HistoryStatus::Completed
        } else {
            HistoryStatus::Active
        }
    }

    pub fn time_to_complete(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct KanbanColumn {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_order: u32,
    #[serde(default = "default_column_color")]
    pub color: String,
}

impl KanbanColumn {
    fn status(name: &str, display_order: u32, color: &str) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            display_order,
            color: color.to_string(),
        }
    }

    /// The four status columns the board is built from.
    pub fn status_columns() -> Vec<Self> {
        vec![
            Self::status("New", 0, "#95a5a6"),
            Self::status("In Progress", 1, "#f39c12"),
            Self::status("On Hold", 2, "#8e44ad"),
            Self::status("Complete", 3, "#27ae60"),
        ]
    }

    pub fn is_complete_column(&self) -> bool {
        self.name.eq_ignore_ascii_case(COMPLETE_STATUS)
    }
}

fn default_column_color() -> String {
    "#3498db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "snake_case")]
pub struct GeneralNote {
    pub id: String,
    pub title: String,
    pub content: String,
    pub content_is_markdown: bool,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct NotificationRecord {
    #[serde(default = "new_id")]
    pub id: String,
    pub task_id: String,
    #[serde(default)]
    pub task_title: String,
    pub message: String,
    pub due_date: Option<Timestamp>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub snoozed_until: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CloseBehavior {
    HideToTray,
    Exit,
}

impl Default for CloseBehavior {
    fn default() -> Self {
        Self::HideToTray
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub reminders_enabled: bool,
    #[serde(default = "default_lead_time_hours")]
    pub lead_time_hours: i64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub close_behavior: CloseBehavior,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub last_backup_at: Option<Timestamp>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reminders_enabled: true,
            lead_time_hours: default_lead_time_hours(),
            poll_interval_secs: default_poll_interval_secs(),
            close_behavior: CloseBehavior::HideToTray,
            theme: default_theme(),
            last_backup_at: None,
        }
    }
}

impl Settings {
    /// Replaces out-of-range values with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.lead_time_hours <= 0 {
            self.lead_time_hours = default_lead_time_hours();
        }
        if self.poll_interval_secs == 0 {
            self.poll_interval_secs = default_poll_interval_secs();
        }
        self
    }

    pub fn reminders(&self) -> ReminderSettings {
        ReminderSettings {
            enabled: self.reminders_enabled,
            lead_time_hours: self.lead_time_hours,
        }
    }
}

pub const DEFAULT_LEAD_TIME_HOURS: i64 = 24;

fn default_true() -> bool {
    true
}

fn default_lead_time_hours() -> i64 {
    DEFAULT_LEAD_TIME_HOURS
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_theme() -> String {
    "light".to_string()
}

/// What the reminder scheduler reads on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSettings {
    pub enabled: bool,
    pub lead_time_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "snake_case")]
pub struct TaskData {
    pub schema_version: u32,
    pub tasks: Vec<Task>,
    pub history: Vec<TaskHistoryEntry>,
    pub kanban_columns: Vec<KanbanColumn>,
    pub general_notes: Vec<GeneralNote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Settings,
}
