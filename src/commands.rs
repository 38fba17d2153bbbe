use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::events::{NotificationsPayload, StatePayload};
#[cfg(all(feature = "app", not(test)))]
use crate::events::{EVENT_NOTIFICATIONS_UPDATED, EVENT_STATE_UPDATED};
use crate::models::{GeneralNote, Settings, Task, Timestamp};
use crate::notifications::reminder_message;
use crate::quick_add;
use crate::scheduler::SinkError;
use crate::state::{AppState, CompletionOutcome};
use crate::stats::Statistics;
use crate::storage::{Storage, StorageError};
use crate::tray::{pending_count_at, tray_tooltip};
use crate::views::{self, CalendarEntry, HistoryRow, KanbanLane, TaskFilter, TaskRow};

#[cfg(all(feature = "app", not(test)))]
use crate::scheduler::{ReminderSink, TickReport};
#[cfg(all(feature = "app", not(test)))]
use crate::tray::update_tray;
#[cfg(all(feature = "app", not(test)))]
use tauri::{AppHandle, Emitter, Manager, Runtime, State};

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

pub(crate) trait CommandCtx {
    fn app_data_dir(&self) -> Result<PathBuf, StorageError>;
    fn now(&self) -> Timestamp;
    fn emit_state_updated(&self, payload: StatePayload);
    fn emit_notifications_updated(&self, payload: NotificationsPayload);
    fn update_tray(&self, tooltip: &str);
    fn notify_os(&self, title: &str, body: &str) -> Result<(), String>;
    fn open_path(&self, path: &Path) -> Result<(), String>;
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn open_storage(ctx: &impl CommandCtx) -> Result<Storage, StorageError> {
    let storage = Storage::new(ctx.app_data_dir()?);
    storage.ensure_dirs()?;
    Ok(storage)
}

fn state_payload(state: &AppState) -> StatePayload {
    StatePayload {
        data: state.task_data(),
        settings: state.settings(),
        unread_count: state.unread_count(),
    }
}

fn notifications_payload(state: &AppState) -> NotificationsPayload {
    NotificationsPayload {
        notifications: state.notifications(),
        unread_count: state.unread_count(),
    }
}

fn refresh_tray(ctx: &impl CommandCtx, state: &AppState) {
    let pending = pending_count_at(&state.tasks(), ctx.now());
    ctx.update_tray(&tray_tooltip(pending, state.unread_count()));
}

/// Saves tasks and settings, taking the first backup of each day.
fn persist(ctx: &impl CommandCtx, state: &AppState) -> Result<(), StorageError> {
    let storage = open_storage(ctx)?;
    let now = ctx.now();
    let mut settings = state.settings();
    let should_backup = is_new_day(settings.last_backup_at, now);
    if should_backup {
        settings.last_backup_at = Some(now);
        state.update_settings(settings.clone());
    }
    storage.save_data(&state.task_data(), should_backup)?;
    storage.save_settings(&settings)?;
    refresh_tray(ctx, state);
    ctx.emit_state_updated(state_payload(state));
    Ok(())
}

fn persist_notifications(ctx: &impl CommandCtx, state: &AppState) -> Result<(), StorageError> {
    let storage = open_storage(ctx)?;
    storage.save_notifications(&state.notifications())?;
    refresh_tray(ctx, state);
    ctx.emit_notifications_updated(notifications_payload(state));
    Ok(())
}

fn is_new_day(last: Option<Timestamp>, now: Timestamp) -> bool {
    match last {
        None => true,
        Some(last) => last.date() != now.date(),
    }
}

/// Records a due-soon reminder in memory and raises the OS notification for it.
///
/// A reminder the notification center suppresses (still unread, or snoozed) is
/// delivered silently. Saving happens later in [`flush_reminders_impl`].
pub(crate) fn deliver_reminder_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task: &Task,
) -> Result<(), SinkError> {
    let outcome = state.record_notification(task, ctx.now());
    if !outcome.is_new() {
        log::debug!("reminder: suppressed task_id={}", task.id);
        return Ok(());
    }
    let body = match task.due_date {
        Some(due) => reminder_message(task, due),
        None => task.title.clone(),
    };
    ctx.notify_os("Task Reminder", &body).map_err(SinkError)
}

/// Saves the notifications recorded during a tick and refreshes tray and UI.
pub(crate) fn flush_reminders_impl(ctx: &impl CommandCtx, state: &AppState) {
    if let Err(error) = persist_notifications(ctx, state) {
        log::warn!("reminder: failed to save notifications: {error}");
    }
}

#[cfg(all(feature = "app", not(test)))]
struct TauriCommandCtx<'a, R: Runtime> {
    app: &'a AppHandle<R>,
}

#[cfg(all(feature = "app", not(test)))]
impl<R: Runtime> CommandCtx for TauriCommandCtx<'_, R> {
    fn app_data_dir(&self) -> Result<PathBuf, StorageError> {
        self.app
            .path()
            .app_data_dir()
            .map_err(|err| StorageError::Io(std::io::Error::other(err.to_string())))
    }

    fn now(&self) -> Timestamp {
        chrono::Local::now().naive_local()
    }

    fn emit_state_updated(&self, payload: StatePayload) {
        let _ = self.app.emit(EVENT_STATE_UPDATED, payload);
    }

    fn emit_notifications_updated(&self, payload: NotificationsPayload) {
        let _ = self.app.emit(EVENT_NOTIFICATIONS_UPDATED, payload);
    }

    fn update_tray(&self, tooltip: &str) {
        update_tray(self.app, tooltip);
    }

    fn notify_os(&self, title: &str, body: &str) -> Result<(), String> {
        use tauri_plugin_notification::NotificationExt;
        self.app
            .notification()
            .builder()
            .title(title)
            .body(body)
            .show()
            .map_err(|e| e.to_string())
    }

    fn open_path(&self, path: &Path) -> Result<(), String> {
        use tauri_plugin_opener::OpenerExt;
        self.app
            .opener()
            .open_path(path.to_string_lossy(), None::<&str>)
            .map_err(|e| e.to_string())
    }
}

/// The scheduler's delivery callback, bound to the running app.
#[cfg(all(feature = "app", not(test)))]
pub fn reminder_sink(app: AppHandle, state: AppState) -> ReminderSink {
    Box::new(move |task: &Task| {
        let ctx = TauriCommandCtx { app: &app };
        deliver_reminder_impl(&ctx, &state, task)
    })
}

/// Follow-up after a tick that delivered reminders.
#[cfg(all(feature = "app", not(test)))]
pub fn reminder_flush(app: AppHandle, state: AppState) -> impl Fn(&TickReport) + Send + Sync {
    move |_report: &TickReport| {
        let ctx = TauriCommandCtx { app: &app };
        flush_reminders_impl(&ctx, &state);
    }
}

fn load_state_impl(state: &AppState) -> CommandResult<StatePayload> {
    ok(state_payload(state))
}

fn quick_add_impl(ctx: &impl CommandCtx, state: &AppState, input: String) -> CommandResult<Task> {
    let now = ctx.now();
    let parsed = quick_add::parse(&input, now.date());
    if parsed.title.trim().is_empty() {
        return err("task title is required");
    }
    let task = Task {
        due_date: parsed.due_date,
        priority: parsed.priority,
        tags: parsed.tags,
        ..Task::new(parsed.title, now)
    };
    let task = state.add_task(task);
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(task)
}

fn create_task_impl(ctx: &impl CommandCtx, state: &AppState, task: Task) -> CommandResult<Task> {
    if task.title.trim().is_empty() {
        return err("task title is required");
    }
    let mut task = task;
    if task.created_at == Timestamp::default() {
        task.created_at = ctx.now();
    }
    let task = state.add_task(task);
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(task)
}

fn update_task_impl(ctx: &impl CommandCtx, state: &AppState, task: Task) -> CommandResult<Task> {
    if task.title.trim().is_empty() {
        return err("task title is required");
    }
    let task = match state.update_task(task, ctx.now()) {
        Ok(task) => task,
        Err(error) => return err(&error.to_string()),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(task)
}

fn delete_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
) -> CommandResult<bool> {
    let removed = match state.remove_task(&task_id, ctx.now()) {
        Ok(removed) => removed,
        Err(error) => return err(&error.to_string()),
    };
    state.with_notifications(|center| center.remove_for_task(&task_id));
    match open_storage(ctx) {
        Ok(storage) => {
            let count = storage.remove_attachments(&removed.orphaned_attachments);
            log::info!("task: deleted task_id={task_id} attachments_removed={count}");
        }
        Err(error) => log::warn!("task: attachment cleanup skipped: {error}"),
    }
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    if let Err(error) = persist_notifications(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(true)
}

fn complete_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
) -> CommandResult<CompletionOutcome> {
    let outcome = match state.complete_task(&task_id, ctx.now()) {
        Ok(outcome) => outcome,
        Err(error) => return err(&error.to_string()),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(outcome)
}

fn reopen_task_impl(ctx: &impl CommandCtx, state: &AppState, task_id: String) -> CommandResult<Task> {
    let task = match state.reopen_task(&task_id) {
        Ok(task) => task,
        Err(error) => return err(&error.to_string()),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(task)
}

fn set_subtask_completed_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    index: usize,
    completed: bool,
) -> CommandResult<Task> {
    let task = match state.set_subtask_completed(&task_id, index, completed) {
        Ok(task) => task,
        Err(error) => return err(&error.to_string()),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(task)
}

fn move_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    dragged_id: String,
    target_id: String,
) -> CommandResult<bool> {
    if let Err(error) = state.move_task(&dragged_id, &target_id) {
        return err(&error.to_string());
    }
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(true)
}

fn set_task_status_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    status: String,
) -> CommandResult<Task> {
    let task = match state.set_status(&task_id, &status, ctx.now()) {
        Ok(task) => task,
        Err(error) => return err(&error.to_string()),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(task)
}

fn reschedule_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    day: NaiveDate,
) -> CommandResult<Task> {
    let task = match state.reschedule(&task_id, day) {
        Ok(task) => task,
        Err(error) => return err(&error.to_string()),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(task)
}

fn import_attachment_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    source: PathBuf,
) -> CommandResult<Task> {
    if state.task(&task_id).is_none() {
        return err("task not found");
    }
    let storage = match open_storage(ctx) {
        Ok(storage) => storage,
        Err(error) => return err(&format!("storage error: {error}")),
    };
    let name = match storage.import_attachment(&source) {
        Ok(name) => name,
        Err(error) => return err(&format!("failed to import attachment: {error}")),
    };
    let task = match state.add_attachment(&task_id, name) {
        Ok(task) => task,
        Err(error) => return err(&error.to_string()),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(task)
}

fn open_attachment_impl(ctx: &impl CommandCtx, name: String) -> CommandResult<bool> {
    let storage = match open_storage(ctx) {
        Ok(storage) => storage,
        Err(error) => return err(&format!("storage error: {error}")),
    };
    let path = match storage.attachment_path(&name) {
        Ok(path) => path,
        Err(error) => return err(&error.to_string()),
    };
    if !path.is_file() {
        return err("attachment not found");
    }
    match ctx.open_path(&path) {
        Ok(()) => ok(true),
        Err(error) => err(&format!("failed to open attachment: {error}")),
    }
}

fn list_tasks_impl(state: &AppState, filter: TaskFilter) -> CommandResult<Vec<TaskRow>> {
    ok(filter.rows(&state.tasks()))
}

fn calendar_day_impl(state: &AppState, day: NaiveDate) -> CommandResult<Vec<CalendarEntry>> {
    ok(views::calendar_entries(&state.tasks(), day))
}

fn calendar_busy_days_impl(
    state: &AppState,
    year: i32,
    month: u32,
) -> CommandResult<Vec<NaiveDate>> {
    if !(1..=12).contains(&month) {
        return err("month must be between 1 and 12");
    }
    ok(views::busy_days(&state.tasks(), year, month))
}

fn kanban_board_impl(state: &AppState) -> CommandResult<Vec<KanbanLane>> {
    ok(views::kanban_board(&state.tasks(), &state.kanban_columns()))
}

fn tag_options_impl(state: &AppState) -> CommandResult<Vec<String>> {
    ok(views::tag_options(&state.tasks()))
}

fn statistics_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<Statistics> {
    ok(Statistics::compute(&state.tasks(), &state.history(), ctx.now()))
}

fn task_history_impl(state: &AppState) -> CommandResult<Vec<HistoryRow>> {
    ok(views::history_rows(&state.history()))
}

fn save_note_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    note: GeneralNote,
) -> CommandResult<GeneralNote> {
    if note.title.trim().is_empty() {
        return err("note title is required");
    }
    let note = state.save_note(note, ctx.now());
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(note)
}

fn delete_note_impl(ctx: &impl CommandCtx, state: &AppState, note_id: String) -> CommandResult<bool> {
    if !state.remove_note(&note_id) {
        return err("note not found");
    }
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(true)
}

fn update_settings_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    settings: Settings,
) -> CommandResult<Settings> {
    let previous = state.settings();
    let mut settings = settings.normalized();
    // The backup stamp is owned by persist, not the settings form.
    settings.last_backup_at = previous.last_backup_at;

    state.update_settings(settings.clone());
    if let Err(error) = persist(ctx, state) {
        state.update_settings(previous);
        return err(&format!("storage error: {error}"));
    }
    log::info!(
        "settings: updated reminders_enabled={} lead_time_hours={}",
        settings.reminders_enabled,
        settings.lead_time_hours
    );
    ok(state.settings())
}

fn list_notifications_impl(state: &AppState) -> CommandResult<NotificationsPayload> {
    ok(notifications_payload(state))
}

fn mark_notification_read_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    notification_id: String,
    read: bool,
) -> CommandResult<bool> {
    if !state.with_notifications(|center| center.mark_read(&notification_id, read)) {
        return err("notification not found");
    }
    if let Err(error) = persist_notifications(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(true)
}

fn mark_all_notifications_read_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<usize> {
    let changed = state.with_notifications(|center| center.mark_all_read());
    if let Err(error) = persist_notifications(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(changed)
}

fn snooze_notification_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    notification_id: String,
    until: Timestamp,
) -> CommandResult<bool> {
    if until <= ctx.now() {
        return err("snooze time must be in the future");
    }
    if !state.with_notifications(|center| center.snooze(&notification_id, until)) {
        return err("notification not found");
    }
    if let Err(error) = persist_notifications(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(true)
}

fn delete_notification_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    notification_id: String,
) -> CommandResult<bool> {
    if !state.with_notifications(|center| center.remove(&notification_id)) {
        return err("notification not found");
    }
    if let Err(error) = persist_notifications(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(true)
}

fn clear_read_notifications_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<usize> {
    let removed = state.with_notifications(|center| center.clear_read());
    if let Err(error) = persist_notifications(ctx, state) {
        return err(&format!("storage error: {error}"));
    }
    ok(removed)
}

fn list_backups_impl(ctx: &impl CommandCtx) -> CommandResult<Vec<String>> {
    let storage = match open_storage(ctx) {
        Ok(storage) => storage,
        Err(error) => return err(&format!("storage error: {error}")),
    };
    match storage.list_backups() {
        Ok(backups) => ok(backups),
        Err(error) => err(&format!("storage error: {error}")),
    }
}

fn create_backup_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<bool> {
    let storage = match open_storage(ctx) {
        Ok(storage) => storage,
        Err(error) => return err(&format!("storage error: {error}")),
    };
    if let Err(error) = storage.save_data(&state.task_data(), true) {
        return err(&format!("storage error: {error}"));
    }
    ok(true)
}

fn restore_backup_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    filename: String,
) -> CommandResult<StatePayload> {
    let storage = match open_storage(ctx) {
        Ok(storage) => storage,
        Err(error) => return err(&format!("storage error: {error}")),
    };
    let data = match storage.restore_backup(&filename) {
        Ok(data) => data,
        Err(error) => return err(&format!("failed to restore backup: {error}")),
    };
    state.replace_data(data);
    log::info!("storage: restored backup {filename}");
    refresh_tray(ctx, state);
    let payload = state_payload(state);
    ctx.emit_state_updated(payload.clone());
    ok(payload)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn load_state(state: State<AppState>) -> CommandResult<StatePayload> {
    load_state_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn quick_add_task(app: AppHandle, state: State<AppState>, input: String) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    quick_add_impl(&ctx, state.inner(), input)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn create_task(app: AppHandle, state: State<AppState>, task: Task) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    create_task_impl(&ctx, state.inner(), task)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn update_task(app: AppHandle, state: State<AppState>, task: Task) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    update_task_impl(&ctx, state.inner(), task)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn delete_task(app: AppHandle, state: State<AppState>, task_id: String) -> CommandResult<bool> {
    let ctx = TauriCommandCtx { app: &app };
    delete_task_impl(&ctx, state.inner(), task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn complete_task(
    app: AppHandle,
    state: State<AppState>,
    task_id: String,
) -> CommandResult<CompletionOutcome> {
    let ctx = TauriCommandCtx { app: &app };
    complete_task_impl(&ctx, state.inner(), task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn reopen_task(app: AppHandle, state: State<AppState>, task_id: String) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    reopen_task_impl(&ctx, state.inner(), task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_subtask_completed(
    app: AppHandle,
    state: State<AppState>,
    task_id: String,
    index: usize,
    completed: bool,
) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    set_subtask_completed_impl(&ctx, state.inner(), task_id, index, completed)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn move_task(
    app: AppHandle,
    state: State<AppState>,
    dragged_id: String,
    target_id: String,
) -> CommandResult<bool> {
    let ctx = TauriCommandCtx { app: &app };
    move_task_impl(&ctx, state.inner(), dragged_id, target_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_task_status(
    app: AppHandle,
    state: State<AppState>,
    task_id: String,
    status: String,
) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    set_task_status_impl(&ctx, state.inner(), task_id, status)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn reschedule_task(
    app: AppHandle,
    state: State<AppState>,
    task_id: String,
    day: NaiveDate,
) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    reschedule_task_impl(&ctx, state.inner(), task_id, day)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn import_attachment(
    app: AppHandle,
    state: State<AppState>,
    task_id: String,
    source: PathBuf,
) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    import_attachment_impl(&ctx, state.inner(), task_id, source)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn open_attachment(app: AppHandle, name: String) -> CommandResult<bool> {
    let ctx = TauriCommandCtx { app: &app };
    open_attachment_impl(&ctx, name)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn list_tasks(state: State<AppState>, filter: TaskFilter) -> CommandResult<Vec<TaskRow>> {
    list_tasks_impl(state.inner(), filter)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn calendar_day(state: State<AppState>, day: NaiveDate) -> CommandResult<Vec<CalendarEntry>> {
    calendar_day_impl(state.inner(), day)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn calendar_busy_days(
    state: State<AppState>,
    year: i32,
    month: u32,
) -> CommandResult<Vec<NaiveDate>> {
    calendar_busy_days_impl(state.inner(), year, month)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn kanban_board(state: State<AppState>) -> CommandResult<Vec<KanbanLane>> {
    kanban_board_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn tag_options(state: State<AppState>) -> CommandResult<Vec<String>> {
    tag_options_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn statistics(app: AppHandle, state: State<AppState>) -> CommandResult<Statistics> {
    let ctx = TauriCommandCtx { app: &app };
    statistics_impl(&ctx, state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn task_history(state: State<AppState>) -> CommandResult<Vec<HistoryRow>> {
    task_history_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn save_note(
    app: AppHandle,
    state: State<AppState>,
    note: GeneralNote,
) -> CommandResult<GeneralNote> {
    let ctx = TauriCommandCtx { app: &app };
    save_note_impl(&ctx, state.inner(), note)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn delete_note(app: AppHandle, state: State<AppState>, note_id: String) -> CommandResult<bool> {
    let ctx = TauriCommandCtx { app: &app };
    delete_note_impl(&ctx, state.inner(), note_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn update_settings(
    app: AppHandle,
    state: State<AppState>,
    settings: Settings,
) -> CommandResult<Settings> {
    let ctx = TauriCommandCtx { app: &app };
    update_settings_impl(&ctx, state.inner(), settings)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn list_notifications(state: State<AppState>) -> CommandResult<NotificationsPayload> {
    list_notifications_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn mark_notification_read(
    app: AppHandle,
    state: State<AppState>,
    notification_id: String,
    read: bool,
) -> CommandResult<bool> {
    let ctx = TauriCommandCtx { app: &app };
    mark_notification_read_impl(&ctx, state.inner(), notification_id, read)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn mark_all_notifications_read(app: AppHandle, state: State<AppState>) -> CommandResult<usize> {
    let ctx = TauriCommandCtx { app: &app };
    mark_all_notifications_read_impl(&ctx, state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn snooze_notification(
    app: AppHandle,
    state: State<AppState>,
    notification_id: String,
    until: Timestamp,
) -> CommandResult<bool> {
    let ctx = TauriCommandCtx { app: &app };
    snooze_notification_impl(&ctx, state.inner(), notification_id, until)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn delete_notification(
    app: AppHandle,
    state: State<AppState>,
    notification_id: String,
) -> CommandResult<bool> {
    let ctx = TauriCommandCtx { app: &app };
    delete_notification_impl(&ctx, state.inner(), notification_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn clear_read_notifications(app: AppHandle, state: State<AppState>) -> CommandResult<usize> {
    let ctx = TauriCommandCtx { app: &app };
    clear_read_notifications_impl(&ctx, state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn list_backups(app: AppHandle) -> CommandResult<Vec<String>> {
    let ctx = TauriCommandCtx { app: &app };
    list_backups_impl(&ctx)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn create_backup(app: AppHandle, state: State<AppState>) -> CommandResult<bool> {
    let ctx = TauriCommandCtx { app: &app };
    create_backup_impl(&ctx, state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn restore_backup(
    app: AppHandle,
    state: State<AppState>,
    filename: String,
) -> CommandResult<StatePayload> {
    let ctx = TauriCommandCtx { app: &app };
    restore_backup_impl(&ctx, state.inner(), filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    use crate::models::{HistoryStatus, Priority, SubTask, TaskData};
    use crate::state::TaskError;
    use crate::views::StatusFilter;

    struct TestCtx {
        root: tempfile::TempDir,
        now: Timestamp,
        app_data_dir_error: Option<String>,
        notify_error: Option<String>,
        emitted: Mutex<Vec<StatePayload>>,
        notification_events: Mutex<Vec<NotificationsPayload>>,
        tooltips: Mutex<Vec<String>>,
        os_notifications: Mutex<Vec<(String, String)>>,
        opened: Mutex<Vec<PathBuf>>,
    }

    impl TestCtx {
        fn new() -> Self {
            Self {
                root: tempfile::tempdir().unwrap(),
                now: at(10, 12, 0),
                app_data_dir_error: None,
                notify_error: None,
                emitted: Mutex::new(Vec::new()),
                notification_events: Mutex::new(Vec::new()),
                tooltips: Mutex::new(Vec::new()),
                os_notifications: Mutex::new(Vec::new()),
                opened: Mutex::new(Vec::new()),
            }
        }

        fn with_app_data_dir_error(message: &str) -> Self {
            let mut ctx = Self::new();
            ctx.app_data_dir_error = Some(message.to_string());
            ctx
        }

        fn root_path(&self) -> &Path {
            self.root.path()
        }
    }

    impl CommandCtx for TestCtx {
        fn app_data_dir(&self) -> Result<PathBuf, StorageError> {
            if let Some(message) = &self.app_data_dir_error {
                return Err(StorageError::Io(std::io::Error::other(message.clone())));
            }
            Ok(self.root.path().to_path_buf())
        }

        fn now(&self) -> Timestamp {
            self.now
        }

        fn emit_state_updated(&self, payload: StatePayload) {
            self.emitted.lock().unwrap().push(payload);
        }

        fn emit_notifications_updated(&self, payload: NotificationsPayload) {
            self.notification_events.lock().unwrap().push(payload);
        }

        fn update_tray(&self, tooltip: &str) {
            self.tooltips.lock().unwrap().push(tooltip.to_string());
        }

        fn notify_os(&self, title: &str, body: &str) -> Result<(), String> {
            if let Some(message) = &self.notify_error {
                return Err(message.clone());
            }
            self.os_notifications
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }

        fn open_path(&self, path: &Path) -> Result<(), String> {
            self.opened.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn at(d: u32, h: u32, m: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn make_task(id: &str, due_date: Option<Timestamp>) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task-{id}"),
            due_date,
            created_at: at(1, 8, 0),
            ..Task::default()
        }
    }

    fn make_state(tasks: Vec<Task>) -> AppState {
        let data = TaskData {
            tasks,
            ..TaskData::default()
        };
        AppState::new(data, Settings::default(), Vec::new())
    }

    #[test]
    fn ok_and_err_helpers_construct_expected_shape() {
        let r = ok(123);
        assert!(r.ok);
        assert_eq!(r.data, Some(123));
        assert_eq!(r.error, None);

        let r: CommandResult<i32> = err("nope");
        assert!(!r.ok);
        assert_eq!(r.data, None);
        assert_eq!(r.error, Some("nope".to_string()));
    }

    #[test]
    fn backups_are_taken_once_per_day() {
        assert!(is_new_day(None, at(10, 12, 0)));
        assert!(is_new_day(Some(at(9, 23, 59)), at(10, 0, 1)));
        assert!(!is_new_day(Some(at(10, 0, 1)), at(10, 23, 0)));
    }

    #[test]
    fn persist_success_and_error_paths() {
        let ctx = TestCtx::new();
        let state = make_state(vec![make_task("a", Some(at(10, 9, 0)))]);

        persist(&ctx, &state).unwrap();
        assert!(ctx.root_path().join("backups").is_dir());
        assert!(ctx.root_path().join("todo_data.json").is_file());
        assert!(ctx.root_path().join("user_settings.json").is_file());
        assert_eq!(ctx.emitted.lock().unwrap().len(), 1);
        assert_eq!(
            ctx.tooltips.lock().unwrap().as_slice(),
            ["TaskDesk - Pending: 1".to_string()]
        );
        assert_eq!(state.settings().last_backup_at, Some(ctx.now));

        // Same day: no backup, and the first save had no file to copy.
        persist(&ctx, &state).unwrap();
        let storage = Storage::new(ctx.root_path().to_path_buf());
        assert!(storage.list_backups().unwrap().is_empty());

        let bad_ctx = TestCtx::with_app_data_dir_error("nope");
        assert!(persist(&bad_ctx, &state).is_err());

        let ctx2 = TestCtx::new();
        fs::write(ctx2.root_path().join("backups"), b"x").unwrap();
        assert!(persist(&ctx2, &state).is_err());

        let ctx3 = TestCtx::new();
        fs::create_dir_all(ctx3.root_path().join("todo_data.json")).unwrap();
        assert!(persist(&ctx3, &state).is_err());
    }

    #[test]
    fn quick_add_creates_parsed_task() {
        let ctx = TestCtx::new();
        let state = make_state(Vec::new());

        let res = quick_add_impl(&ctx, &state, "Pay rent tomorrow 9am #home !h".to_string());
        assert!(res.ok);
        let task = res.data.unwrap();
        assert_eq!(task.title, "Pay rent");
        assert_eq!(task.due_date, Some(at(11, 9, 0)));
        assert_eq!(task.tags, vec!["home".to_string()]);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.created_at, ctx.now);
        assert_eq!(state.tasks().len(), 1);
        assert_eq!(state.history().len(), 1);

        let res = quick_add_impl(&ctx, &state, "#only !low".to_string());
        assert!(!res.ok);
        assert_eq!(res.error.as_deref(), Some("task title is required"));
    }

    #[test]
    fn task_mutation_commands_cover_success_and_error_paths() {
        let ctx = TestCtx::new();
        let state = make_state(Vec::new());

        let res = create_task_impl(&ctx, &state, Task::default());
        assert!(!res.ok);

        let res = create_task_impl(
            &ctx,
            &state,
            Task {
                title: "draft".to_string(),
                ..Task::default()
            },
        );
        let created = res.data.unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.created_at, ctx.now);

        let mut edited = created.clone();
        edited.title = "final".to_string();
        let res = update_task_impl(&ctx, &state, edited);
        assert_eq!(res.data.unwrap().title, "final");
        assert_eq!(state.history()[0].title, "final");

        let res = update_task_impl(&ctx, &state, make_task("missing", None));
        assert_eq!(res.error, Some(TaskError::NotFound.to_string()));

        let mut checked = state.task(&created.id).unwrap();
        checked.completed = true;
        let res = update_task_impl(&ctx, &state, checked);
        assert_eq!(res.data.unwrap().completed_at, Some(ctx.now));
        assert_eq!(state.history()[0].completed_at, Some(ctx.now));
        let mut unchecked = state.task(&created.id).unwrap();
        unchecked.completed = false;
        assert!(update_task_impl(&ctx, &state, unchecked).ok);
        assert_eq!(state.history()[0].completed_at, None);

        let second = create_task_impl(&ctx, &state, make_task("b", None)).data.unwrap();
        assert!(move_task_impl(&ctx, &state, second.id.clone(), created.id.clone()).ok);
        assert_eq!(state.tasks()[0].id, "b");
        assert!(!move_task_impl(&ctx, &state, "x".to_string(), created.id.clone()).ok);

        let res = set_task_status_impl(&ctx, &state, "b".to_string(), "complete".to_string());
        let task = res.data.unwrap();
        assert!(task.completed);
        assert_eq!(task.status(), "Complete");
        let res = set_task_status_impl(&ctx, &state, "b".to_string(), "Archived".to_string());
        assert!(!res.ok);

        let day = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        let res = reschedule_task_impl(&ctx, &state, created.id.clone(), day);
        assert_eq!(res.data.unwrap().due_date, Some(at(20, 0, 0)));

        let bad_ctx = TestCtx::with_app_data_dir_error("nope");
        let res = reopen_task_impl(&bad_ctx, &state, "b".to_string());
        assert!(res.error.unwrap().starts_with("storage error"));
    }

    #[test]
    fn complete_and_subtask_commands_follow_task_rules() {
        let ctx = TestCtx::new();
        let mut parent = make_task("p", Some(at(10, 9, 0)));
        parent.subtasks = vec![SubTask {
            title: "step".to_string(),
            ..SubTask::default()
        }];
        let state = make_state(vec![parent]);

        let res = complete_task_impl(&ctx, &state, "p".to_string());
        assert_eq!(res.error, Some(TaskError::IncompleteSubtasks.to_string()));

        assert!(set_subtask_completed_impl(&ctx, &state, "p".to_string(), 0, true).ok);
        let res = complete_task_impl(&ctx, &state, "p".to_string());
        let outcome = res.data.unwrap();
        assert!(outcome.completed.completed);
        assert!(outcome.next.is_none());

        // Unchecking the subtask reopens the parent.
        let res = set_subtask_completed_impl(&ctx, &state, "p".to_string(), 0, false);
        assert!(!res.data.unwrap().completed);

        let res = set_subtask_completed_impl(&ctx, &state, "p".to_string(), 4, true);
        assert_eq!(res.error, Some(TaskError::SubtaskOutOfRange(4).to_string()));
    }

    #[test]
    fn delete_task_drops_notifications_and_orphaned_attachments() {
        let ctx = TestCtx::new();
        let state = make_state(vec![make_task("a", Some(at(10, 18, 0)))]);

        let source = ctx.root_path().join("notes.txt");
        fs::write(&source, b"hello").unwrap();
        let res = import_attachment_impl(&ctx, &state, "a".to_string(), source.clone());
        let name = res.data.unwrap().attachments[0].clone();
        let stored = ctx.root_path().join("attachments").join(&name);
        assert!(stored.is_file());

        assert!(open_attachment_impl(&ctx, name.clone()).ok);
        assert_eq!(ctx.opened.lock().unwrap().as_slice(), [stored.clone()]);
        assert!(!open_attachment_impl(&ctx, "gone.txt".to_string()).ok);
        assert!(!open_attachment_impl(&ctx, "../notes.txt".to_string()).ok);

        let res = import_attachment_impl(&ctx, &state, "missing".to_string(), source);
        assert_eq!(res.error.as_deref(), Some("task not found"));

        deliver_reminder_impl(&ctx, &state, &state.task("a").unwrap()).unwrap();
        assert_eq!(state.notifications().len(), 1);

        assert!(delete_task_impl(&ctx, &state, "a".to_string()).ok);
        assert!(state.tasks().is_empty());
        assert!(state.notifications().is_empty());
        assert!(!stored.exists());
        assert!(state.history()[0].deleted_at.is_some());

        assert!(!delete_task_impl(&ctx, &state, "a".to_string()).ok);
    }

    #[test]
    fn reminder_delivery_records_once_and_raises_os_notification() {
        let ctx = TestCtx::new();
        let task = make_task("a", Some(at(10, 18, 30)));
        let state = make_state(vec![task.clone()]);

        deliver_reminder_impl(&ctx, &state, &task).unwrap();
        assert_eq!(
            ctx.os_notifications.lock().unwrap().as_slice(),
            [(
                "Task Reminder".to_string(),
                "'task-a' is due by 2024-06-10 18:30.".to_string()
            )]
        );
        assert_eq!(state.unread_count(), 1);
        // Delivery stays in memory; the flush after the tick writes and notifies.
        assert!(!ctx.root_path().join("notifications.json").exists());
        assert!(ctx.notification_events.lock().unwrap().is_empty());

        flush_reminders_impl(&ctx, &state);
        assert!(ctx.root_path().join("notifications.json").is_file());
        assert_eq!(ctx.notification_events.lock().unwrap().len(), 1);
        assert_eq!(
            ctx.tooltips.lock().unwrap().last().map(String::as_str),
            Some("TaskDesk - Pending: 1, Unread: 1")
        );

        // Still unread: recorded silently.
        deliver_reminder_impl(&ctx, &state, &task).unwrap();
        assert_eq!(ctx.os_notifications.lock().unwrap().len(), 1);

        let mut failing = TestCtx::new();
        failing.notify_error = Some("no notification daemon".to_string());
        let other = make_task("b", Some(at(10, 19, 0)));
        let res = deliver_reminder_impl(&failing, &state, &other);
        assert_eq!(res, Err(SinkError("no notification daemon".to_string())));
    }

    #[test]
    fn notification_commands_update_the_center() {
        let ctx = TestCtx::new();
        let state = make_state(vec![
            make_task("a", Some(at(10, 18, 0))),
            make_task("b", Some(at(10, 19, 0))),
        ]);
        for task in state.tasks() {
            deliver_reminder_impl(&ctx, &state, &task).unwrap();
        }
        let ids: Vec<String> = list_notifications_impl(&state)
            .data
            .unwrap()
            .notifications
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids.len(), 2);

        assert!(mark_notification_read_impl(&ctx, &state, ids[0].clone(), true).ok);
        assert_eq!(state.unread_count(), 1);
        assert!(!mark_notification_read_impl(&ctx, &state, "nope".to_string(), true).ok);

        let res = snooze_notification_impl(&ctx, &state, ids[1].clone(), at(10, 11, 0));
        assert!(!res.ok);
        assert!(snooze_notification_impl(&ctx, &state, ids[1].clone(), at(10, 13, 0)).ok);
        assert_eq!(state.unread_count(), 0);

        assert!(mark_notification_read_impl(&ctx, &state, ids[0].clone(), false).ok);
        assert_eq!(mark_all_notifications_read_impl(&ctx, &state).data, Some(1));
        assert!(delete_notification_impl(&ctx, &state, ids[0].clone()).ok);
        assert_eq!(clear_read_notifications_impl(&ctx, &state).data, Some(1));
        assert!(state.notifications().is_empty());

        let storage = Storage::new(ctx.root_path().to_path_buf());
        assert!(storage.load_notifications().unwrap().is_empty());
    }

    #[test]
    fn view_and_statistics_commands_read_current_state() {
        let ctx = TestCtx::new();
        let mut done = make_task("done", Some(at(10, 8, 0)));
        done.completed = true;
        done.completed_at = Some(at(10, 9, 0));
        done.tags = vec!["Work".to_string()];
        let mut open = make_task("open", Some(at(10, 18, 0)));
        open.tags = vec!["home".to_string(), "In Progress".to_string()];
        let state = make_state(vec![done, open]);

        let filter = TaskFilter {
            status: StatusFilter::Pending,
            ..TaskFilter::default()
        };
        let listed = list_tasks_impl(&state, filter).data.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task.id, "open");

        let day = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(calendar_day_impl(&state, day).data.unwrap().len(), 2);
        assert_eq!(calendar_busy_days_impl(&state, 2024, 6).data, Some(vec![day]));
        assert!(!calendar_busy_days_impl(&state, 2024, 13).ok);

        let board = kanban_board_impl(&state).data.unwrap();
        assert_eq!(board[1].tasks[0].id, "open");

        assert_eq!(
            tag_options_impl(&state).data.unwrap(),
            ["home", "In Progress", "Work"]
        );

        let stats = statistics_impl(&ctx, &state).data.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.due_today, 1);

        assert!(task_history_impl(&state).data.unwrap().is_empty());
        assert!(complete_task_impl(&ctx, &state, "open".to_string()).ok);
        let history = task_history_impl(&state).data.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].entry.completed_at, Some(ctx.now));
        assert_eq!(history[0].status, HistoryStatus::Completed);
    }

    #[test]
    fn note_commands_add_update_and_delete() {
        let ctx = TestCtx::new();
        let state = make_state(Vec::new());

        assert!(!save_note_impl(&ctx, &state, GeneralNote::default()).ok);
        let note = save_note_impl(
            &ctx,
            &state,
            GeneralNote {
                title: "ideas".to_string(),
                ..GeneralNote::default()
            },
        )
        .data
        .unwrap();
        assert_eq!(note.created_at, ctx.now);

        let updated = save_note_impl(
            &ctx,
            &state,
            GeneralNote {
                content: "more".to_string(),
                ..note.clone()
            },
        )
        .data
        .unwrap();
        assert_eq!(updated.id, note.id);
        assert_eq!(state.notes().len(), 1);

        assert!(delete_note_impl(&ctx, &state, note.id.clone()).ok);
        assert!(!delete_note_impl(&ctx, &state, note.id).ok);
    }

    #[test]
    fn update_settings_normalizes_and_rolls_back_on_failure() {
        let ctx = TestCtx::new();
        let state = make_state(Vec::new());

        let res = update_settings_impl(
            &ctx,
            &state,
            Settings {
                lead_time_hours: -3,
                reminders_enabled: false,
                ..Settings::default()
            },
        );
        let saved = res.data.unwrap();
        assert_eq!(saved.lead_time_hours, 24);
        assert!(!saved.reminders_enabled);
        assert!(!state.reminder_settings().enabled);

        let storage = Storage::new(ctx.root_path().to_path_buf());
        assert!(!storage.load_settings().unwrap().reminders_enabled);

        let bad_ctx = TestCtx::with_app_data_dir_error("nope");
        let res = update_settings_impl(
            &bad_ctx,
            &state,
            Settings {
                lead_time_hours: 2,
                ..Settings::default()
            },
        );
        assert!(!res.ok);
        assert_eq!(state.settings().lead_time_hours, 24);
    }

    #[test]
    fn backup_commands_list_create_and_restore() {
        let ctx = TestCtx::new();
        let state = make_state(vec![make_task("a", None)]);
        persist(&ctx, &state).unwrap();
        assert!(list_backups_impl(&ctx).data.unwrap().is_empty());

        assert!(create_backup_impl(&ctx, &state).ok);
        let backups = list_backups_impl(&ctx).data.unwrap();
        assert_eq!(backups.len(), 1);

        assert!(delete_task_impl(&ctx, &state, "a".to_string()).ok);
        assert!(state.tasks().is_empty());

        let payload = restore_backup_impl(&ctx, &state, backups[0].clone())
            .data
            .unwrap();
        assert_eq!(payload.data.tasks.len(), 1);
        assert_eq!(state.tasks()[0].id, "a");

        assert!(!restore_backup_impl(&ctx, &state, "missing.json".to_string()).ok);
        assert!(!list_backups_impl(&TestCtx::with_app_data_dir_error("nope")).ok);
    }

    #[test]
    fn load_state_returns_snapshot() {
        let state = make_state(vec![make_task("a", None)]);
        let payload = load_state_impl(&state).data.unwrap();
        assert_eq!(payload.data.tasks.len(), 1);
        assert_eq!(payload.data.kanban_columns.len(), 4);
        assert_eq!(payload.unread_count, 0);
    }
}
