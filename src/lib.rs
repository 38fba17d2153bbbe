pub mod commands;
pub mod events;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod quick_add;
pub mod recurrence;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod storage;
pub mod tray;
pub mod views;

#[cfg(all(feature = "app", not(test)))]
use std::sync::Mutex;
#[cfg(all(feature = "app", not(test)))]
use std::time::Duration;

#[cfg(all(feature = "app", not(test)))]
use tauri::{Manager, RunEvent, WindowEvent};

#[cfg(all(feature = "app", not(test)))]
use crate::commands::*;
#[cfg(all(feature = "app", not(test)))]
use crate::models::CloseBehavior;
#[cfg(all(feature = "app", not(test)))]
use crate::scheduler::{ReminderEngine, ReminderScheduler};
#[cfg(all(feature = "app", not(test)))]
use crate::state::AppState;
#[cfg(all(feature = "app", not(test)))]
use crate::storage::Storage;
#[cfg(all(feature = "app", not(test)))]
use crate::tray::{init_tray, pending_count_at, tray_tooltip};

/// Holds the running scheduler so it can be stopped on exit.
#[cfg(all(feature = "app", not(test)))]
struct SchedulerSlot(Mutex<Option<ReminderScheduler>>);

#[cfg_attr(mobile, tauri::mobile_entry_point)]
#[cfg(all(feature = "app", not(test)))]
pub fn run() {
    let app = tauri::Builder::default()
        .plugin(tauri_plugin_notification::init())
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let root = app.path().app_data_dir()?;
            if let Err(err) = logging::init_logging(&root) {
                eprintln!("failed to initialize logging: {err}");
            }

            let storage = Storage::new(root);
            storage.ensure_dirs()?;

            let data = storage.load_data().unwrap_or_else(|err| {
                log::error!("storage: failed to load task data: {err}");
                match storage.set_aside_data_file() {
                    Ok(Some(path)) => {
                        log::warn!("storage: moved unreadable data file to {}", path.display())
                    }
                    Ok(None) => {}
                    Err(err) => log::error!("storage: failed to set aside data file: {err}"),
                }
                Default::default()
            });
            let settings = storage.load_settings().unwrap_or_else(|err| {
                log::warn!("storage: failed to load settings, using defaults: {err}");
                Default::default()
            });
            let notifications = storage.load_notifications().unwrap_or_else(|err| {
                log::warn!("storage: failed to load notifications: {err}");
                Vec::new()
            });
            log::info!(
                "storage: loaded tasks={} notifications={} dir={}",
                data.tasks.len(),
                notifications.len(),
                storage.root().display()
            );

            let poll_interval = Duration::from_secs(settings.poll_interval_secs);
            let state = AppState::new(data, settings, notifications);
            app.manage(state.clone());

            let now = chrono::Local::now().naive_local();
            let tooltip = tray_tooltip(pending_count_at(&state.tasks(), now), state.unread_count());
            init_tray(app, &tooltip)?;

            let tasks_state = state.clone();
            let settings_state = state.clone();
            let engine = ReminderEngine::new(
                Box::new(move || tasks_state.tasks()),
                Box::new(move || settings_state.reminder_settings()),
                reminder_sink(app.handle().clone(), state.clone()),
            );
            let mut scheduler = ReminderScheduler::new(engine, poll_interval)
                .on_tick(reminder_flush(app.handle().clone(), state.clone()));
            let runtime =
                tauri::async_runtime::block_on(async { tokio::runtime::Handle::current() });
            scheduler.start(&runtime);
            app.manage(SchedulerSlot(Mutex::new(Some(scheduler))));

            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::CloseRequested { api, .. } = event {
                if window.label() != "main" {
                    return;
                }
                let state = window.app_handle().state::<AppState>();
                match state.settings().close_behavior {
                    CloseBehavior::Exit => window.app_handle().exit(0),
                    CloseBehavior::HideToTray => {
                        if let Err(err) = window.hide() {
                            log::warn!("window: failed to hide main window: {err}");
                        }
                        api.prevent_close();
                    }
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            load_state,
            quick_add_task,
            create_task,
            update_task,
            delete_task,
            complete_task,
            reopen_task,
            set_subtask_completed,
            move_task,
            set_task_status,
            reschedule_task,
            import_attachment,
            open_attachment,
            list_tasks,
            calendar_day,
            calendar_busy_days,
            kanban_board,
            tag_options,
            statistics,
            task_history,
            save_note,
            delete_note,
            update_settings,
            list_notifications,
            mark_notification_read,
            mark_all_notifications_read,
            snooze_notification,
            delete_notification,
            clear_read_notifications,
            list_backups,
            create_backup,
            restore_backup,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            if let Some(slot) = handle.try_state::<SchedulerSlot>() {
                if let Some(mut scheduler) = slot.0.lock().expect("state poisoned").take() {
                    scheduler.stop();
                }
            }
            log::info!("app: exit");
        }
    });
}
