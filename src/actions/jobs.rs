//! Background job tracker
//!
//! Records are only ever moved forward (`queued → running → succeeded|failed`).
//! Terminal records are evicted once they outlive the retention window, or
//! oldest-first when the record cap is reached.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::types::{Job, JobStatus};

/// Bounds on job concurrency and retention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLimits {
    /// Jobs allowed to run at the same time
    pub max_concurrent: usize,
    /// How long finished records stay queryable
    pub retention: Duration,
    /// Upper bound on retained records
    pub max_records: usize,
}

impl Default for JobLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            retention: Duration::from_secs(3600),
            max_records: 10_000,
        }
    }
}

#[derive(Debug)]
struct JobRecord {
    job: Job,
    finished: Option<Instant>,
}

/// Shared map of job records, keyed by job id
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<String, JobRecord>>,
    limits: JobLimits,
}

impl JobTracker {
    #[must_use]
    pub fn new(limits: JobLimits) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            limits,
        }
    }

    #[must_use]
    pub const fn limits(&self) -> &JobLimits {
        &self.limits
    }

    /// Insert a fresh `queued` job for an action
    pub async fn create(&self, action_id: &str) -> Job {
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            action_id: action_id.to_string(),
            status: JobStatus::Queued,
            result: None,
            error: None,
            started_at: None,
            ended_at: None,
            retries: 0,
        };

        let mut jobs = self.jobs.write().await;
        self.evict(&mut jobs);
        jobs.insert(
            job.id.clone(),
            JobRecord {
                job: job.clone(),
                finished: None,
            },
        );
        drop(jobs);

        tracing::debug!(job_id = %job.id, action_id, "job queued");
        job
    }

    pub async fn mark_running(&self, job_id: &str) -> bool {
        self.advance(job_id, JobStatus::Running, |job| {
            job.started_at = Some(Utc::now());
        })
        .await
    }

    pub async fn mark_succeeded(&self, job_id: &str, result: Value) -> bool {
        self.advance(job_id, JobStatus::Succeeded, |job| {
            job.result = Some(result);
            job.ended_at = Some(Utc::now());
        })
        .await
    }

    pub async fn mark_failed(&self, job_id: &str, error: String) -> bool {
        self.advance(job_id, JobStatus::Failed, |job| {
            job.error = Some(error);
            job.ended_at = Some(Utc::now());
        })
        .await
    }

    /// Latest known record, `None` if never issued or already evicted
    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).map(|r| r.job.clone())
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Number of jobs currently in `status`
    pub async fn count(&self, status: JobStatus) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|r| r.job.status == status)
            .count()
    }

    async fn advance(&self, job_id: &str, next: JobStatus, update: impl FnOnce(&mut Job)) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(record) = jobs.get_mut(job_id) else {
            tracing::debug!(job_id, status = ?next, "update for unknown job");
            return false;
        };

        if !record.job.status.can_advance_to(next) {
            tracing::warn!(
                job_id,
                from = ?record.job.status,
                to = ?next,
                "refusing non-monotonic job update"
            );
            return false;
        }

        record.job.status = next;
        update(&mut record.job);
        if next.is_terminal() {
            record.finished = Some(Instant::now());
        }

        tracing::debug!(job_id, status = ?next, "job updated");
        true
    }

    fn evict(&self, jobs: &mut HashMap<String, JobRecord>) {
        let now = Instant::now();
        let before = jobs.len();
        jobs.retain(|_, r| {
            r.finished
                .is_none_or(|at| now.saturating_duration_since(at) < self.limits.retention)
        });

        if jobs.len() >= self.limits.max_records {
            let mut finished: Vec<(Instant, String)> = jobs
                .iter()
                .filter_map(|(id, r)| r.finished.map(|at| (at, id.clone())))
                .collect();
            finished.sort();

            let excess = jobs.len() + 1 - self.limits.max_records;
            for (_, id) in finished.into_iter().take(excess) {
                jobs.remove(&id);
            }
        }

        let evicted = before - jobs.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = jobs.len(), "evicted finished jobs");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn lifecycle_moves_forward_only() {
        let tracker = JobTracker::default();
        let job = tracker.create("a1").await;
        assert_eq!(job.status, JobStatus::Queued);

        assert!(tracker.mark_running(&job.id).await);
        assert!(tracker.mark_succeeded(&job.id, json!({"ok": true})).await);
        assert!(!tracker.mark_running(&job.id).await);
        assert!(!tracker.mark_failed(&job.id, "late".to_string()).await);

        let stored = tracker.get(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Succeeded);
        assert_eq!(stored.result, Some(json!({"ok": true})));
        assert!(stored.error.is_none());
        assert!(stored.started_at.is_some());
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn unknown_job_is_none() {
        let tracker = JobTracker::default();
        assert!(tracker.get("missing").await.is_none());
        assert!(!tracker.mark_running("missing").await);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_jobs_expire_after_retention() {
        let tracker = JobTracker::new(JobLimits {
            retention: Duration::from_secs(60),
            ..JobLimits::default()
        });
        let done = tracker.create("a1").await;
        tracker.mark_failed(&done.id, "boom".to_string()).await;
        let pending = tracker.create("a2").await;

        tokio::time::advance(Duration::from_secs(61)).await;
        tracker.create("a3").await;

        assert!(tracker.get(&done.id).await.is_none());
        assert!(tracker.get(&pending.id).await.is_some());
        assert_eq!(tracker.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn record_cap_evicts_oldest_finished_first() {
        let tracker = JobTracker::new(JobLimits {
            max_records: 2,
            ..JobLimits::default()
        });
        let first = tracker.create("a1").await;
        tracker.mark_succeeded(&first.id, Value::Null).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        let second = tracker.create("a2").await;
        tracker.mark_succeeded(&second.id, Value::Null).await;

        let third = tracker.create("a3").await;

        assert!(tracker.get(&first.id).await.is_none());
        assert!(tracker.get(&second.id).await.is_some());
        assert!(tracker.get(&third.id).await.is_some());
    }

    #[tokio::test]
    async fn running_jobs_are_never_evicted() {
        let tracker = JobTracker::new(JobLimits {
            max_records: 1,
            ..JobLimits::default()
        });
        let first = tracker.create("a1").await;
        tracker.mark_running(&first.id).await;
        tracker.create("a2").await;

        assert_eq!(tracker.count(JobStatus::Running).await, 1);
        assert_eq!(tracker.len().await, 2);
    }
}
