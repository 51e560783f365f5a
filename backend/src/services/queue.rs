//! In-process queue of pending and failed sync jobs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::SyncTarget;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    pub target: SyncTarget,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<(SyncTarget, u32)>,
    failed: Vec<FailedJob>,
}

#[derive(Clone, Default)]
pub struct SyncQueue {
    state: Arc<Mutex<QueueState>>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a sync; a target already pending is not queued twice
    pub fn enqueue(&self, target: SyncTarget) -> bool {
        let mut state = self.lock();
        if state.pending.iter().any(|(t, _)| *t == target) {
            return false;
        }
        state.pending.push_back((target, 0));
        true
    }

    pub fn take_next(&self) -> Option<(SyncTarget, u32)> {
        self.lock().pending.pop_front()
    }

    pub fn mark_failed(&self, target: SyncTarget, attempts: u32, error: impl Into<String>) {
        let mut state = self.lock();
        state.failed.retain(|f| f.target != target);
        state.failed.push(FailedJob {
            target,
            error: error.into(),
            attempts,
            failed_at: Utc::now(),
        });
    }

    /// Move every failed job back to pending; returns how many moved
    pub fn requeue_failed(&self) -> usize {
        let mut state = self.lock();
        let failed = std::mem::take(&mut state.failed);
        let mut moved = 0;
        for job in failed {
            if !state.pending.iter().any(|(t, _)| *t == job.target) {
                state.pending.push_back((job.target, job.attempts));
                moved += 1;
            }
        }
        if moved > 0 {
            info!(requeued = moved, "failed sync jobs requeued");
        }
        moved
    }

    /// Jobs waiting to run plus jobs waiting for a retry
    pub fn backlog(&self) -> usize {
        let state = self.lock();
        state.pending.len() + state.failed.len()
    }

    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.lock().failed.clone()
    }
}
