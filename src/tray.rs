use crate::models::{Task, Timestamp};

#[cfg(all(feature = "app", not(test)))]
use tauri::{
    menu::{Menu, MenuItem},
    tray::{MouseButton, MouseButtonState, TrayIconBuilder, TrayIconEvent},
    App, AppHandle, Manager, Runtime,
};

#[cfg(all(feature = "app", not(test)))]
const TRAY_ID: &str = "main";

#[cfg(all(feature = "app", not(test)))]
fn show_main_window<R: Runtime>(app: &AppHandle<R>) {
    if let Some(window) = app.get_webview_window("main") {
        if let Err(err) = window.unminimize() {
            log::warn!("tray: failed to unminimize main window: {err}");
        }
        if let Err(err) = window.show() {
            log::warn!("tray: failed to show main window: {err}");
        }
        if let Err(err) = window.set_focus() {
            log::warn!("tray: failed to focus main window: {err}");
        }
    } else {
        log::warn!("tray: main window missing");
    }
}

#[cfg(all(feature = "app", not(test)))]
pub fn init_tray(app: &mut App, tooltip: &str) -> Result<(), Box<dyn std::error::Error>> {
    let icon = app.default_window_icon().cloned().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "default window icon is missing",
        )
    })?;

    let show_main = MenuItem::with_id(app, "show_main", "Open TaskDesk", true, None::<&str>)?;
    let quit = MenuItem::with_id(app, "quit", "Exit", true, None::<&str>)?;
    let menu = Menu::with_items(app, &[&show_main, &quit])?;

    let _tray = TrayIconBuilder::with_id(TRAY_ID)
        .icon(icon)
        .tooltip(tooltip)
        .menu(&menu)
        .show_menu_on_left_click(false)
        .on_menu_event(|app, event| {
            let id = event.id.as_ref();
            log::info!("tray: menu_event id={id}");
            match id {
                "quit" => app.exit(0),
                "show_main" => show_main_window(app),
                _ => {}
            }
        })
        .on_tray_icon_event(|tray, event| {
            if let TrayIconEvent::Click {
                button: MouseButton::Left,
                button_state: MouseButtonState::Up,
                ..
            } = event
            {
                log::info!("tray: left_click");
                show_main_window(tray.app_handle());
            }
        })
        .build(app)?;

    Ok(())
}

#[cfg(all(feature = "app", not(test)))]
pub fn update_tray<R: Runtime>(app: &AppHandle<R>, tooltip: &str) {
    if let Some(tray) = app.tray_by_id(TRAY_ID) {
        if let Err(err) = tray.set_tooltip(Some(tooltip)) {
            log::warn!("tray: failed to update tooltip: {err}");
        }
    }
}

/// Open tasks that are overdue or due later today.
pub fn pending_count_at(tasks: &[Task], now: Timestamp) -> usize {
    let today = now.date();
    tasks
        .iter()
        .filter(|task| !task.completed)
        .filter_map(|task| task.due_date)
        .filter(|due| *due < now || due.date() == today)
        .count()
}

pub fn tray_tooltip(pending: usize, unread: usize) -> String {
    if unread == 0 {
        format!("TaskDesk - Pending: {pending}")
    } else {
        format!("TaskDesk - Pending: {pending}, Unread: {unread}")
    }
}
