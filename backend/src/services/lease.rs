//! Per-target leases guarding writes to bin and agent mapping records
//!
//! A lease is exclusive for its key and expires after a timeout, so a
//! crashed holder never blocks a target forever. Different keys never
//! contend with each other.

use shared::SyncTarget;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug)]
struct Held {
    token: Uuid,
    acquired_at: Instant,
}

#[derive(Clone)]
pub struct LeaseRegistry {
    ttl: Duration,
    held: Arc<Mutex<HashMap<String, Held>>>,
}

/// Releases its lease when dropped
#[derive(Debug)]
pub struct LeaseGuard {
    key: String,
    token: Uuid,
    held: Arc<Mutex<HashMap<String, Held>>>,
}

impl LeaseRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            held: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Take the lease for `target` or fail with `LockContention`
    pub fn acquire(&self, target: &SyncTarget) -> AppResult<LeaseGuard> {
        let key = target.key();
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = held.get(&key) {
            if existing.acquired_at.elapsed() < self.ttl {
                return Err(AppError::LockContention(key));
            }
            warn!(lease = %key, held_for = ?existing.acquired_at.elapsed(), "taking over expired lease");
        }

        let token = Uuid::new_v4();
        held.insert(
            key.clone(),
            Held {
                token,
                acquired_at: Instant::now(),
            },
        );
        debug!(lease = %key, "lease acquired");

        Ok(LeaseGuard {
            key,
            token,
            held: Arc::clone(&self.held),
        })
    }
}

impl LeaseGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        // An expired lease may have been taken over; only release our own
        if held.get(&self.key).map(|h| h.token) == Some(self.token) {
            held.remove(&self.key);
            debug!(lease = %self.key, "lease released");
        }
    }
}
