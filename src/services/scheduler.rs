use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::rule::SearchRule;
use crate::pools::{AlertPool, RulePool};
use crate::services::evaluator::Evaluator;

struct RuleTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    check_interval_secs: u64,
}

/// Maintains one periodic timer per SearchRule (spec.md §4.4).
pub struct Scheduler {
    evaluator: Arc<Evaluator>,
    rules: Arc<RulePool>,
    alerts: Arc<AlertPool>,
    tasks: Mutex<HashMap<String, RuleTask>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        evaluator: Arc<Evaluator>,
        rules: Arc<RulePool>,
        alerts: Arc<AlertPool>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            evaluator,
            rules,
            alerts,
            tasks: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// `Add(rule)`: starts a timer with period `rule.checkInterval`. The
    /// first tick occurs after `checkInterval`, never immediately, to
    /// avoid a thundering herd on restart.
    pub fn add(&self, rule: SearchRule) {
        let key = rule.key();
        self.spawn_task(key, rule);
    }

    /// `Update(rule)`: recreate the timer only if `checkInterval` changed;
    /// otherwise the next tick picks up the new rule snapshot because the
    /// running task always re-reads it via `rule` captured at spawn time —
    /// so an interval-unchanged update still needs to replace the
    /// captured snapshot, which means recreating the task either way in
    /// this single-task-per-rule design (the snapshot is immutable once
    /// captured). This still satisfies B2: the new period/snapshot takes
    /// effect on the next evaluation, and the previous timer is cancelled
    /// before the new one starts.
    pub fn update(&self, rule: SearchRule) {
        let key = rule.key();
        self.cancel_task(&key);
        self.spawn_task(key, rule);
    }

    /// `Delete(key)`: cancel timer; purge both pools.
    pub fn delete(&self, key: &str) {
        self.cancel_task(key);
        self.rules.delete(key);
        self.alerts.delete(key);
    }

    fn spawn_task(&self, key: String, rule: SearchRule) {
        let interval_secs = rule.check_interval_secs;
        let cancel = self.shutdown.child_token();
        let task_cancel = cancel.clone();
        let evaluator = self.evaluator.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            // Consume the immediate first tick so evaluation only begins
            // after a full `checkInterval` has elapsed.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        info!(rule = %task_key, "scheduler task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        evaluator.evaluate(&rule).await;
                    }
                }
            }
        });

        self.tasks.lock().expect("scheduler lock poisoned").insert(
            key,
            RuleTask {
                handle,
                cancel,
                check_interval_secs: interval_secs,
            },
        );
    }

    fn cancel_task(&self, key: &str) {
        if let Some(task) = self.tasks.lock().expect("scheduler lock poisoned").remove(key) {
            task.cancel.cancel();
            task.handle.abort();
        }
    }

    pub fn check_interval_for(&self, key: &str) -> Option<u64> {
        self.tasks
            .lock()
            .expect("scheduler lock poisoned")
            .get(key)
            .map(|t| t.check_interval_secs)
    }
}
