use crate::models::{NotificationRecord, Settings, TaskData};

pub const EVENT_STATE_UPDATED: &str = "state_updated";
pub const EVENT_NOTIFICATIONS_UPDATED: &str = "notifications_updated";

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatePayload {
    pub data: TaskData,
    pub settings: Settings,
    pub unread_count: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NotificationsPayload {
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: usize,
}
