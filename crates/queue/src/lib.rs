//! The persistent multi-priority work queue.
//!
//! Storage follows the same `redb`-as-durable-table idiom the cost tracker
//! uses: one table keyed by a monotonic sequence number (so iteration order
//! is insertion order, giving FIFO for free within a priority band), full
//! record serialized as JSON in the value. A single in-process `Mutex`
//! around dequeue enforces the at-most-one-consumer-per-task discipline;
//! since this is a single-process queue there is no distributed lease to
//! hold, just a critical section around "pick the task, mark it running".

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corvus_types::{QueuePriority, QueueStatus, QueueTask};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

const TASKS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("queue_tasks");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("queue_meta");
const SEQUENCE_KEY: &str = "__next_seq";

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_SECS: u64 = 10;
const BACKOFF_CAP_SECS: u64 = 3_600;

/// Implemented by whatever executes one dequeued task by its `task_type`.
/// The broker/skill registry provides the real dispatch; tests use a
/// scripted double.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    async fn handle(&self, task: &QueueTask) -> Result<(), String>;
}

pub struct PriorityQueue {
    db: Database,
    /// Serializes dequeue-and-mark-running so two consumer loops never pick
    /// up the same task.
    dequeue_lock: Mutex<()>,
}

impl PriorityQueue {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)
            .with_context(|| format!("opening queue redb database at {}", path.display()))?;
        {
            let tx = db.begin_write()?;
            tx.open_table(TASKS_TABLE)?;
            tx.open_table(META_TABLE)?;
            tx.commit()?;
        }
        Ok(Self {
            db,
            dequeue_lock: Mutex::new(()),
        })
    }

    fn next_sequence(&self, tx: &redb::WriteTransaction) -> Result<u64> {
        let mut meta = tx.open_table(META_TABLE)?;
        let next = meta.get(SEQUENCE_KEY)?.map(|v| v.value()).unwrap_or(0);
        meta.insert(SEQUENCE_KEY, next + 1)?;
        Ok(next)
    }

    pub fn enqueue(
        &self,
        task_type: impl Into<String>,
        user_id: impl Into<String>,
        payload: serde_json::Value,
        priority: QueuePriority,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<Uuid> {
        let tx = self.db.begin_write()?;
        let sequence = self.next_sequence(&tx)?;
        let task = QueueTask {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            user_id: user_id.into(),
            payload,
            priority,
            scheduled_for,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            status: QueueStatus::Pending,
            last_error: None,
            created_at: Utc::now(),
            sequence,
        };
        let id = task.id;
        {
            let mut tbl = tx.open_table(TASKS_TABLE)?;
            tbl.insert(sequence, serde_json::to_vec(&task)?.as_slice())?;
        }
        tx.commit()?;
        tracing::debug!(task_id = %id, task_type = %task.task_type, priority = ?task.priority, "task_enqueued");
        Ok(id)
    }

    fn all_tasks(&self) -> Result<Vec<(u64, QueueTask)>> {
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(TASKS_TABLE)?;
        let mut out = Vec::new();
        for entry in tbl.iter()? {
            let (seq, value) = entry?;
            out.push((seq.value(), serde_json::from_slice(value.value())?));
        }
        Ok(out)
    }

    fn save(&self, sequence: u64, task: &QueueTask) -> Result<()> {
        let tx = self.db.begin_write()?;
        {
            let mut tbl = tx.open_table(TASKS_TABLE)?;
            tbl.insert(sequence, serde_json::to_vec(task)?.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Picks the highest-priority `Pending` task whose `scheduled_for` is
    /// due (or unset), ties broken FIFO by insertion sequence, marks it
    /// `Running`, and returns it. Returns `None` if nothing is ready.
    pub fn dequeue_next(&self) -> Result<Option<QueueTask>> {
        let _guard = self.dequeue_lock.lock().unwrap();
        let now = Utc::now();
        let mut candidates: Vec<(u64, QueueTask)> = self
            .all_tasks()?
            .into_iter()
            .filter(|(_, t)| t.status == QueueStatus::Pending && t.is_due(now))
            .collect();

        candidates.sort_by(|(seq_a, a), (seq_b, b)| {
            b.priority.cmp(&a.priority).then(seq_a.cmp(seq_b))
        });

        let Some((sequence, mut task)) = candidates.into_iter().next() else {
            return Ok(None);
        };
        task.status = QueueStatus::Running;
        self.save(sequence, &task)?;
        Ok(Some(task))
    }

    fn find_sequence(&self, id: Uuid) -> Result<Option<(u64, QueueTask)>> {
        Ok(self.all_tasks()?.into_iter().find(|(_, t)| t.id == id))
    }

    pub fn mark_done(&self, id: Uuid) -> Result<()> {
        if let Some((seq, mut task)) = self.find_sequence(id)? {
            task.status = QueueStatus::Done;
            self.save(seq, &task)?;
        }
        Ok(())
    }

    /// Records a failure. If attempts remain, the task goes back to
    /// `Pending` with `scheduled_for` pushed out by the exponential backoff
    /// delay; otherwise it's marked permanently `Failed`.
    pub fn mark_failed(&self, id: Uuid, error: impl Into<String>) -> Result<()> {
        if let Some((seq, mut task)) = self.find_sequence(id)? {
            task.attempts += 1;
            task.last_error = Some(error.into());
            if task.attempts >= task.max_attempts {
                task.status = QueueStatus::Failed;
            } else {
                let delay = task.next_backoff_delay(BACKOFF_BASE_SECS, BACKOFF_CAP_SECS);
                task.status = QueueStatus::Pending;
                task.scheduled_for = Some(Utc::now() + chrono::Duration::seconds(delay as i64));
            }
            self.save(seq, &task)?;
        }
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<QueueTask>> {
        Ok(self.find_sequence(id)?.map(|(_, t)| t))
    }

    pub fn stats(&self) -> Result<HashMap<String, u64>> {
        let mut out = HashMap::new();
        for (_, task) in self.all_tasks()? {
            let key = format!("{:?}", task.status);
            *out.entry(key).or_insert(0) += 1;
        }
        Ok(out)
    }

    /// Runs one dequeue-execute-settle cycle against `handler`. Returns
    /// `false` when the queue had nothing ready, so callers can back off
    /// their poll interval.
    pub async fn run_once(&self, handler: &dyn QueueHandler) -> Result<bool> {
        let Some(task) = self.dequeue_next()? else {
            return Ok(false);
        };
        match handler.handle(&task).await {
            Ok(()) => self.mark_done(task.id)?,
            Err(err) => {
                tracing::warn!(task_id = %task.id, error = %err, "queue_task_failed");
                self.mark_failed(task.id, err)?;
            }
        }
        Ok(true)
    }
}

/// Runs `queue.run_once` in a loop until `shutdown` fires, sleeping
/// `idle_poll` between cycles that found nothing to do. Matches the
/// workspace's `tokio::select!`-driven long-lived task shape.
pub async fn run_consumer_loop(
    queue: std::sync::Arc<PriorityQueue>,
    handler: std::sync::Arc<dyn QueueHandler>,
    idle_poll: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            result = queue.run_once(handler.as_ref()) => {
                match result {
                    Ok(true) => continue,
                    Ok(false) => tokio::time::sleep(idle_poll).await,
                    Err(err) => {
                        tracing::error!(%err, "queue_consumer_error");
                        tokio::time::sleep(idle_poll).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn open_temp() -> (tempfile::TempDir, PriorityQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = PriorityQueue::open(dir.path().join("queue.redb")).unwrap();
        (dir, queue)
    }

    #[test]
    fn dequeues_strictly_by_descending_priority() {
        let (_dir, queue) = open_temp();
        queue
            .enqueue("t", "u1", serde_json::json!({}), QueuePriority::Normal, None)
            .unwrap();
        queue
            .enqueue("t", "u1", serde_json::json!({}), QueuePriority::Critical, None)
            .unwrap();
        queue
            .enqueue("t", "u1", serde_json::json!({}), QueuePriority::Scheduled, None)
            .unwrap();
        queue
            .enqueue("t", "u1", serde_json::json!({}), QueuePriority::High, None)
            .unwrap();

        let order: Vec<QueuePriority> = (0..4)
            .map(|_| queue.dequeue_next().unwrap().unwrap().priority)
            .collect();
        assert_eq!(
            order,
            vec![
                QueuePriority::Critical,
                QueuePriority::High,
                QueuePriority::Normal,
                QueuePriority::Scheduled
            ]
        );
    }

    #[test]
    fn fifo_within_the_same_band() {
        let (_dir, queue) = open_temp();
        let first = queue
            .enqueue("t", "u1", serde_json::json!({"n": 1}), QueuePriority::Normal, None)
            .unwrap();
        let second = queue
            .enqueue("t", "u1", serde_json::json!({"n": 2}), QueuePriority::Normal, None)
            .unwrap();

        let a = queue.dequeue_next().unwrap().unwrap();
        let b = queue.dequeue_next().unwrap().unwrap();
        assert_eq!(a.id, first);
        assert_eq!(b.id, second);
    }

    #[test]
    fn deferred_tasks_are_not_dequeued_until_due() {
        let (_dir, queue) = open_temp();
        let future = Utc::now() + chrono::Duration::seconds(3600);
        queue
            .enqueue("t", "u1", serde_json::json!({}), QueuePriority::Critical, Some(future))
            .unwrap();
        queue
            .enqueue("t", "u1", serde_json::json!({}), QueuePriority::Normal, None)
            .unwrap();

        let next = queue.dequeue_next().unwrap().unwrap();
        assert_eq!(next.priority, QueuePriority::Normal);
        assert!(queue.dequeue_next().unwrap().is_none());
    }

    #[test]
    fn failed_task_retries_then_gives_up_after_max_attempts() {
        let (_dir, queue) = open_temp();
        let id = queue
            .enqueue("t", "u1", serde_json::json!({}), QueuePriority::Normal, None)
            .unwrap();
        for _ in 0..4 {
            queue.mark_failed(id, "boom").unwrap();
            let task = queue.get(id).unwrap().unwrap();
            assert_eq!(task.status, QueueStatus::Pending);
        }
        queue.mark_failed(id, "boom").unwrap();
        let task = queue.get(id).unwrap().unwrap();
        assert_eq!(task.status, QueueStatus::Failed);
        assert_eq!(task.attempts, 5);
    }

    struct CountingHandler {
        calls: AtomicU32,
        fail_first: bool,
    }

    #[async_trait]
    impl QueueHandler for CountingHandler {
        async fn handle(&self, _task: &QueueTask) -> Result<(), String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err("transient".to_string());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_once_marks_success_done() {
        let (_dir, queue) = open_temp();
        queue
            .enqueue("t", "u1", serde_json::json!({}), QueuePriority::Normal, None)
            .unwrap();
        let handler = Arc::new(CountingHandler { calls: AtomicU32::new(0), fail_first: false });
        assert!(queue.run_once(handler.as_ref()).await.unwrap());
        let (_, task) = queue.all_tasks().unwrap().into_iter().next().unwrap();
        assert_eq!(task.status, QueueStatus::Done);
    }

    #[tokio::test]
    async fn run_once_returns_false_when_queue_empty() {
        let (_dir, queue) = open_temp();
        let handler = Arc::new(CountingHandler { calls: AtomicU32::new(0), fail_first: false });
        assert!(!queue.run_once(handler.as_ref()).await.unwrap());
    }
}
