use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{
    NotificationRecord, Settings, SettingsFile, Task, TaskData, SCHEMA_VERSION,
};

const DATA_FILE: &str = "todo_data.json";
const SETTINGS_FILE: &str = "user_settings.json";
const NOTIFICATIONS_FILE: &str = "notifications.json";
const ATTACHMENTS_DIR: &str = "attachments";
const BACKUP_DIR: &str = "backups";
const BACKUP_LIMIT: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid file name: {0}")]
    InvalidName(String),
}

/// Older data files are a bare array of tasks.
#[derive(Deserialize)]
#[serde(untagged)]
enum DataFileFormat {
    Legacy(Vec<Task>),
    Current(TaskData),
}

pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join(ATTACHMENTS_DIR)
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.join(BACKUP_DIR))?;
        fs::create_dir_all(self.attachments_dir())?;
        Ok(())
    }

    /// Loads the task data, accepting the legacy array layout. A missing or blank file
    /// is an empty data set.
    pub fn load_data(&self) -> Result<TaskData, StorageError> {
        let path = self.root.join(DATA_FILE);
        if !path.exists() || fs::read_to_string(&path)?.trim().is_empty() {
            return Ok(TaskData::default());
        }
        let data = match self.load_json::<DataFileFormat>(path)? {
            DataFileFormat::Legacy(tasks) => TaskData {
                tasks,
                ..TaskData::default()
            },
            DataFileFormat::Current(data) => data,
        };
        Ok(normalize_data(data))
    }

    /// Loads settings; non-positive lead times are replaced with the default.
    pub fn load_settings(&self) -> Result<Settings, StorageError> {
        let path = self.root.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Settings::default());
        }
        let file: SettingsFile = self.load_json(path)?;
        Ok(file.settings.normalized())
    }

    pub fn load_notifications(&self) -> Result<Vec<NotificationRecord>, StorageError> {
        let path = self.root.join(NOTIFICATIONS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        self.load_json(path)
    }

    /// Renames an unreadable data file to `todo_data.corrupt-<stamp>.json` so later
    /// saves cannot overwrite it. Returns the new path, or `None` without a data file.
    pub fn set_aside_data_file(&self) -> Result<Option<PathBuf>, StorageError> {
        let path = self.root.join(DATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let mut target = self.root.join(format!("todo_data.corrupt-{stamp}.json"));
        let mut n = 1;
        while target.exists() {
            target = self.root.join(format!("todo_data.corrupt-{stamp}-{n}.json"));
            n += 1;
        }
        fs::rename(&path, &target)?;
        Ok(Some(target))
    }

    pub fn save_data(&self, data: &TaskData, with_backup: bool) -> Result<(), StorageError> {
        if with_backup {
            return self.write_with_backup(DATA_FILE, data);
        }
        self.write_atomic(self.root.join(DATA_FILE), data)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        let file = SettingsFile {
            schema_version: SCHEMA_VERSION,
            settings: settings.clone(),
        };
        self.write_atomic(self.root.join(SETTINGS_FILE), &file)
    }

    pub fn save_notifications(&self, records: &[NotificationRecord]) -> Result<(), StorageError> {
        self.write_atomic(self.root.join(NOTIFICATIONS_FILE), &records)
    }

    fn load_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, StorageError> {
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    fn write_with_backup<T: Serialize>(
        &self,
        filename: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        let path = self.root.join(filename);
        if path.exists() {
            self.create_backup(&path)?;
        }
        self.write_atomic(path, data)
    }

    fn write_atomic<T: Serialize>(&self, path: PathBuf, data: &T) -> Result<(), StorageError> {
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(data)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }

    pub fn create_backup(&self, path: &Path) -> Result<(), StorageError> {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let backup_name = format!("todo_data-{timestamp}.json");
        let backup_path = self.root.join(BACKUP_DIR).join(backup_name);
        fs::copy(path, backup_path)?;
        self.trim_backups()?;
        Ok(())
    }

    /// Backup file names, oldest first.
    pub fn list_backups(&self) -> Result<Vec<String>, StorageError> {
        let mut entries: Vec<_> = fs::read_dir(self.root.join(BACKUP_DIR))?
            .filter_map(|entry| entry.ok())
            .collect();
        entries.sort_by_key(|entry| entry.metadata().and_then(|m| m.modified()).ok());
        Ok(entries
            .into_iter()
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect())
    }

    pub fn restore_backup(&self, filename: &str) -> Result<TaskData, StorageError> {
        let name = plain_file_name(filename)?;
        let path = self.root.join(BACKUP_DIR).join(name);
        let data = match self.load_json::<DataFileFormat>(path)? {
            DataFileFormat::Legacy(tasks) => TaskData {
                tasks,
                ..TaskData::default()
            },
            DataFileFormat::Current(data) => data,
        };
        let data = normalize_data(data);
        self.write_atomic(self.root.join(DATA_FILE), &data)?;
        Ok(data)
    }

    fn trim_backups(&self) -> Result<(), StorageError> {
        let mut entries: Vec<_> = fs::read_dir(self.root.join(BACKUP_DIR))?
            .filter_map(|entry| entry.ok())
            .collect();
        entries.sort_by_key(|entry| entry.metadata().and_then(|m| m.modified()).ok());
        let to_remove = entries.len().saturating_sub(BACKUP_LIMIT);
        for entry in entries.into_iter().take(to_remove) {
            let _ = fs::remove_file(entry.path());
        }
        Ok(())
    }

    /// Copies `source` into the attachments directory under a unique name and returns
    /// that name.
    pub fn import_attachment(&self, source: &Path) -> Result<String, StorageError> {
        let base = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StorageError::InvalidName(source.display().to_string()))?;
        let unique = format!("{}_{base}", uuid::Uuid::new_v4());
        fs::create_dir_all(self.attachments_dir())?;
        fs::copy(source, self.attachments_dir().join(&unique))?;
        Ok(unique)
    }

    pub fn attachment_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.attachments_dir().join(plain_file_name(name)?))
    }

    /// Deletes attachment files by relative name. Rooted paths are never touched and
    /// missing files are skipped.
    pub fn remove_attachments(&self, names: &[String]) -> usize {
        let mut removed = 0;
        for name in names {
            if Path::new(name).is_absolute() {
                continue;
            }
            let Ok(path) = self.attachment_path(name) else {
                continue;
            };
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => log::warn!("storage: failed to remove attachment {name}: {err}"),
            }
        }
        removed
    }
}

fn plain_file_name(name: &str) -> Result<&str, StorageError> {
    let path = Path::new(name);
    match path.file_name().and_then(|n| n.to_str()) {
        Some(file) if file == name => Ok(file),
        _ => Err(StorageError::InvalidName(name.to_string())),
    }
}

/// Repairs data written by older versions: ids, completion timestamps and history.
fn normalize_data(mut data: TaskData) -> TaskData {
    let tasks = std::mem::take(&mut data.tasks);
    data.tasks = tasks
        .into_iter()
        .map(|mut task| {
            if task.id.is_empty() {
                task.id = crate::models::new_id();
            }
            if task.completed && task.completed_at.is_none() {
                task.completed_at = Some(task.created_at);
            }
            if !task.completed {
                task.completed_at = None;
            }
            task
        })
        .collect();
    let tasks = data.tasks.clone();
    for task in &tasks {
        data.ensure_history(task);
    }
    data
}
