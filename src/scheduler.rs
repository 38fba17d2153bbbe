use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::{ReminderSettings, Task, Timestamp};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("reminder delivery failed: {0}")]
pub struct SinkError(pub String);

pub type TaskSource = Box<dyn Fn() -> Vec<Task> + Send>;
pub type SettingsProvider = Box<dyn Fn() -> ReminderSettings + Send>;
pub type ReminderSink = Box<dyn FnMut(&Task) -> Result<(), SinkError> + Send>;
/// Runs after a tick that delivered something, once the engine lock is released.
pub type TickHook = Arc<dyn Fn(&TickReport) + Send + Sync>;

/// What a single tick did, by task id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fired: Vec<String>,
    pub failed: Vec<String>,
    pub rearmed: Vec<String>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty() && self.failed.is_empty() && self.rearmed.is_empty()
    }

    pub fn delivered_any(&self) -> bool {
        !self.fired.is_empty() || !self.failed.is_empty()
    }
}

/// Due-soon detection with at-most-once delivery per due date.
///
/// A task id sits in the notified set from the tick that delivered its reminder until
/// the task is completed, deleted, loses its due date, or is pushed past the lookahead
/// window. Only then can it fire again.
pub struct ReminderEngine {
    tasks: TaskSource,
    settings: SettingsProvider,
    sink: ReminderSink,
    notified: HashSet<String>,
}

impl ReminderEngine {
    pub fn new(tasks: TaskSource, settings: SettingsProvider, sink: ReminderSink) -> Self {
        Self {
            tasks,
            settings,
            sink,
            notified: HashSet::new(),
        }
    }

    pub fn is_notified(&self, task_id: &str) -> bool {
        self.notified.contains(task_id)
    }

    pub fn tick_at(&mut self, now: Timestamp) -> TickReport {
        let mut report = TickReport::default();
        let settings = (self.settings)();
        if !settings.enabled {
            return report;
        }

        let lead = chrono::Duration::try_hours(settings.lead_time_hours.max(0))
            .unwrap_or(chrono::Duration::MAX);
        let window_end = now.checked_add_signed(lead).unwrap_or(NaiveDateTime::MAX);
        let tasks = (self.tasks)();

        self.notified.retain(|id| {
            let keep = tasks.iter().find(|task| &task.id == id).is_some_and(|task| {
                !task.completed && task.due_date.is_some_and(|due| due <= window_end)
            });
            if !keep {
                report.rearmed.push(id.clone());
            }
            keep
        });

        let mut due_soon: Vec<&Task> = tasks
            .iter()
            .filter(|task| !task.completed)
            .filter(|task| {
                task.due_date
                    .is_some_and(|due| due >= now && due <= window_end)
            })
            .filter(|task| !self.notified.contains(&task.id))
            .collect();
        // Equal due dates fire in id order so a tick is reproducible.
        due_soon.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));

        for task in due_soon {
            self.notified.insert(task.id.clone());
            match (self.sink)(task) {
                Ok(()) => report.fired.push(task.id.clone()),
                Err(err) => {
                    log::warn!("reminder: sink failed task_id={} err={err}", task.id);
                    report.failed.push(task.id.clone());
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for ReminderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderEngine")
            .field("notified", &self.notified)
            .finish_non_exhaustive()
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns a [`ReminderEngine`] and polls it on a fixed period.
pub struct ReminderScheduler {
    period: Duration,
    engine: Arc<Mutex<ReminderEngine>>,
    after_tick: Option<TickHook>,
    running: Option<Running>,
}

impl ReminderScheduler {
    pub fn new(engine: ReminderEngine, period: Duration) -> Self {
        let period = if period.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            period
        };
        Self {
            period,
            engine: Arc::new(Mutex::new(engine)),
            after_tick: None,
            running: None,
        }
    }

    /// Sets the hook for follow-up work (saving, UI refresh) that must stay out of
    /// the tick itself.
    pub fn on_tick(mut self, hook: impl Fn(&TickReport) + Send + Sync + 'static) -> Self {
        self.after_tick = Some(Arc::new(hook));
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawns the polling loop on `runtime`. The first tick happens one period after
    /// start. Starting a running scheduler does nothing.
    pub fn start(&mut self, runtime: &Handle) {
        if self.running.is_some() {
            log::debug!("reminder: start ignored, already running");
            return;
        }

        let cancel = CancellationToken::new();
        let stopped = cancel.clone();
        let engine = Arc::clone(&self.engine);
        let after_tick = self.after_tick.clone();
        let period = self.period;
        let handle = runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = Local::now().naive_local();
                        let report = engine.lock().expect("reminder engine poisoned").tick_at(now);
                        run_hook(after_tick.as_ref(), &report);
                        if !report.is_empty() {
                            log::info!(
                                "reminder: tick fired={} failed={} rearmed={}",
                                report.fired.len(),
                                report.failed.len(),
                                report.rearmed.len()
                            );
                        }
                    }
                    _ = stopped.cancelled() => break,
                }
            }
            log::debug!("reminder: polling loop exited");
        });

        log::info!("reminder: scheduler started period_secs={}", period.as_secs());
        self.running = Some(Running { cancel, handle });
    }

    /// Signals the loop to exit. A tick already in progress runs to completion.
    /// Stopping a stopped scheduler does nothing.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        drop(running.handle);
        log::info!("reminder: scheduler stopped");
    }

    /// Runs one tick immediately against the local clock.
    pub fn tick(&self) -> TickReport {
        self.tick_at(Local::now().naive_local())
    }

    pub fn tick_at(&self, now: Timestamp) -> TickReport {
        let report = self
            .engine
            .lock()
            .expect("reminder engine poisoned")
            .tick_at(now);
        run_hook(self.after_tick.as_ref(), &report);
        report
    }
}

fn run_hook(hook: Option<&TickHook>, report: &TickReport) {
    if let Some(hook) = hook.filter(|_| report.delivered_any()) {
        hook(report);
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    type Shared<T> = Arc<Mutex<T>>;

    struct Harness {
        tasks: Shared<Vec<Task>>,
        settings: Shared<ReminderSettings>,
        delivered: Shared<Vec<String>>,
        failing: Shared<HashSet<String>>,
    }

    impl Harness {
        fn new(tasks: Vec<Task>) -> Self {
            Self {
                tasks: Arc::new(Mutex::new(tasks)),
                settings: Arc::new(Mutex::new(ReminderSettings {
                    enabled: true,
                    lead_time_hours: 24,
                })),
                delivered: Arc::new(Mutex::new(Vec::new())),
                failing: Arc::new(Mutex::new(HashSet::new())),
            }
        }

        fn engine(&self) -> ReminderEngine {
            let tasks = Arc::clone(&self.tasks);
            let settings = Arc::clone(&self.settings);
            let delivered = Arc::clone(&self.delivered);
            let failing = Arc::clone(&self.failing);
            ReminderEngine::new(
                Box::new(move || tasks.lock().unwrap().clone()),
                Box::new(move || *settings.lock().unwrap()),
                Box::new(move |task: &Task| {
                    if failing.lock().unwrap().contains(&task.id) {
                        return Err(SinkError("toast unavailable".to_string()));
                    }
                    delivered.lock().unwrap().push(task.id.clone());
                    Ok(())
                }),
            )
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }

        fn edit(&self, id: &str, f: impl FnOnce(&mut Task)) {
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks.iter_mut().find(|t| t.id == id).unwrap();
            f(task);
        }
    }

    fn at(h: u32, m: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn task_due(id: &str, due: Option<Timestamp>) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task-{id}"),
            due_date: due,
            ..Task::default()
        }
    }

    #[test]
    fn fires_once_across_many_ticks() {
        let harness = Harness::new(vec![task_due("a", Some(at(15, 0)))]);
        let mut engine = harness.engine();

        for minute in 0..30 {
            engine.tick_at(at(9, minute));
        }

        assert_eq!(harness.delivered(), vec!["a".to_string()]);
        assert!(engine.is_notified("a"));
    }

    #[test]
    fn rearms_after_due_date_leaves_and_reenters_window() {
        let harness = Harness::new(vec![task_due("a", Some(at(12, 0)))]);
        {
            let mut settings = harness.settings.lock().unwrap();
            settings.lead_time_hours = 4;
        }
        let mut engine = harness.engine();

        let report = engine.tick_at(at(9, 0));
        assert_eq!(report.fired, vec!["a".to_string()]);

        // Snoozed out of the window: the id is dropped and nothing fires.
        harness.edit("a", |t| t.due_date = Some(at(20, 0)));
        let report = engine.tick_at(at(9, 1));
        assert_eq!(report.rearmed, vec!["a".to_string()]);
        assert!(report.fired.is_empty());
        assert!(!engine.is_notified("a"));

        // Back inside the window: exactly one more delivery.
        harness.edit("a", |t| t.due_date = Some(at(11, 0)));
        engine.tick_at(at(9, 2));
        engine.tick_at(at(9, 3));
        assert_eq!(harness.delivered(), vec!["a".to_string(), "a".to_string()]);
    }

    #[test]
    fn completion_suppresses_and_clears_notified_entry() {
        let harness = Harness::new(vec![task_due("a", Some(at(12, 0)))]);
        let mut engine = harness.engine();
        engine.tick_at(at(9, 0));

        harness.edit("a", |t| {
            t.completed = true;
            t.completed_at = Some(at(9, 5));
        });
        let report = engine.tick_at(at(9, 6));
        assert_eq!(report.rearmed, vec!["a".to_string()]);
        assert!(!engine.is_notified("a"));

        engine.tick_at(at(9, 7));
        assert_eq!(harness.delivered().len(), 1);

        // Reopening lets it fire once more.
        harness.edit("a", |t| {
            t.completed = false;
            t.completed_at = None;
        });
        engine.tick_at(at(9, 8));
        engine.tick_at(at(9, 9));
        assert_eq!(harness.delivered().len(), 2);
    }

    #[test]
    fn missing_or_undated_tasks_are_rearmed_silently() {
        let harness = Harness::new(vec![
            task_due("gone", Some(at(10, 0))),
            task_due("undated", Some(at(10, 0))),
        ]);
        let mut engine = harness.engine();
        engine.tick_at(at(9, 0));
        assert_eq!(harness.delivered().len(), 2);

        harness.tasks.lock().unwrap().retain(|t| t.id != "gone");
        harness.edit("undated", |t| t.due_date = None);
        let mut report = engine.tick_at(at(9, 1));
        report.rearmed.sort();
        assert_eq!(report.rearmed, vec!["gone".to_string(), "undated".to_string()]);
        assert!(report.fired.is_empty());
    }

    #[test]
    fn disabled_reminders_never_deliver() {
        let harness = Harness::new(vec![task_due("a", Some(at(9, 30)))]);
        harness.settings.lock().unwrap().enabled = false;
        let mut engine = harness.engine();

        for minute in 0..10 {
            assert!(engine.tick_at(at(9, minute)).is_empty());
        }
        assert!(harness.delivered().is_empty());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let now = at(9, 0);
        let window_end = at(11, 0);
        let harness = Harness::new(vec![
            task_due("at-now", Some(now)),
            task_due("at-end", Some(window_end)),
            task_due("past-end", Some(window_end + chrono::Duration::seconds(1))),
            task_due("overdue", Some(now - chrono::Duration::minutes(1))),
        ]);
        harness.settings.lock().unwrap().lead_time_hours = 2;
        let mut engine = harness.engine();

        let report = engine.tick_at(now);
        assert_eq!(report.fired, vec!["at-now".to_string(), "at-end".to_string()]);
    }

    #[test]
    fn negative_lead_time_only_matches_tasks_due_now() {
        let harness = Harness::new(vec![
            task_due("now", Some(at(9, 0))),
            task_due("later", Some(at(9, 1))),
        ]);
        harness.settings.lock().unwrap().lead_time_hours = -5;
        let mut engine = harness.engine();

        let report = engine.tick_at(at(9, 0));
        assert_eq!(report.fired, vec!["now".to_string()]);
    }

    #[test]
    fn lead_time_shrink_rearms_tasks_beyond_new_window() {
        let harness = Harness::new(vec![task_due("a", Some(at(18, 0)))]);
        let mut engine = harness.engine();
        engine.tick_at(at(9, 0));
        assert!(engine.is_notified("a"));

        harness.settings.lock().unwrap().lead_time_hours = 1;
        let report = engine.tick_at(at(9, 1));
        assert_eq!(report.rearmed, vec!["a".to_string()]);
    }

    #[test]
    fn candidates_fire_by_due_date_then_id() {
        let harness = Harness::new(vec![
            task_due("c", Some(at(10, 0))),
            task_due("b", Some(at(11, 0))),
            task_due("a", Some(at(11, 0))),
            task_due("done", Some(at(10, 0))),
        ]);
        harness.edit("done", |t| t.completed = true);
        let mut engine = harness.engine();

        engine.tick_at(at(9, 0));
        assert_eq!(
            harness.delivered(),
            vec!["c".to_string(), "a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn sink_failure_does_not_stop_other_candidates() {
        let harness = Harness::new(vec![
            task_due("a", Some(at(10, 0))),
            task_due("b", Some(at(10, 30))),
        ]);
        harness.failing.lock().unwrap().insert("a".to_string());
        let mut engine = harness.engine();

        let report = engine.tick_at(at(9, 0));
        assert_eq!(report.failed, vec!["a".to_string()]);
        assert_eq!(report.fired, vec!["b".to_string()]);
        assert_eq!(harness.delivered(), vec!["b".to_string()]);

        // The failed delivery is not retried while the due date stays put.
        harness.failing.lock().unwrap().clear();
        let report = engine.tick_at(at(9, 1));
        assert!(report.fired.is_empty());
    }

    #[test]
    fn tick_hook_runs_after_the_engine_is_released() {
        let harness = Harness::new(vec![task_due("a", Some(at(10, 0)))]);
        let scheduler = ReminderScheduler::new(harness.engine(), Duration::from_secs(60));
        let engine = Arc::clone(&scheduler.engine);
        let seen: Shared<Vec<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let scheduler = scheduler.on_tick(move |report| {
            assert!(engine.try_lock().is_ok());
            sink.lock().unwrap().push(report.fired.clone());
        });

        scheduler.tick_at(at(9, 0));
        // Nothing delivered: no follow-up work.
        scheduler.tick_at(at(9, 1));
        assert_eq!(seen.lock().unwrap().clone(), vec![vec!["a".to_string()]]);
    }

    #[test]
    fn zero_period_falls_back_to_default() {
        let harness = Harness::new(Vec::new());
        let scheduler = ReminderScheduler::new(harness.engine(), Duration::ZERO);
        assert_eq!(scheduler.period(), DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_loop_ticks_each_period_until_stopped() {
        let due = Local::now().naive_local() + chrono::Duration::hours(1);
        let harness = Harness::new(vec![task_due("a", Some(due))]);
        let mut scheduler = ReminderScheduler::new(harness.engine(), Duration::from_secs(60));
        let runtime = Handle::current();

        scheduler.start(&runtime);
        scheduler.start(&runtime);
        assert!(scheduler.is_running());

        // Nothing before the first period elapses.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(harness.delivered().is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(harness.delivered(), vec!["a".to_string()]);

        // More ticks, still one delivery.
        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(harness.delivered().len(), 1);

        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        // A new task after stop is never picked up by the loop.
        harness.tasks.lock().unwrap().push(task_due("b", Some(due)));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(harness.delivered(), vec!["a".to_string()]);

        // Manual ticks still work on a stopped scheduler.
        let report = scheduler.tick();
        assert_eq!(report.fired, vec!["b".to_string()]);
    }
}
