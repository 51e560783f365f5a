//! Archival of old, approved ledger entries
//!
//! Archiving only flips the `archived` flag. Rows are never deleted and the
//! ledger row count before and after each run is reported for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::LedgerCounts;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::store::SharedStore;

#[derive(Clone)]
pub struct ArchivalService {
    store: SharedStore,
    batch_size: i64,
}

/// Audit trail of one archival run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchivalReport {
    pub cutoff: DateTime<Utc>,
    pub dry_run: bool,
    /// Rows matching the eligibility rule when the run started
    pub eligible: i64,
    /// Rows flagged by this run; always zero for dry runs
    pub archived: u64,
    pub batches: u32,
    pub before: LedgerCounts,
    pub after: LedgerCounts,
}

impl ArchivalService {
    pub fn new(store: SharedStore, batch_size: i64) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Flag approved movements whose approval predates `cutoff`
    ///
    /// Dry runs and live runs count with the same eligibility rule.
    pub async fn archive_older_than(
        &self,
        cutoff: DateTime<Utc>,
        dry_run: bool,
    ) -> AppResult<ArchivalReport> {
        let before = self.store.ledger_counts().await?;
        let eligible = self.store.count_archival_eligible(cutoff).await?;

        let mut archived = 0u64;
        let mut batches = 0u32;
        if !dry_run {
            loop {
                let flagged = self
                    .store
                    .archive_batch(cutoff, self.batch_size, Utc::now())
                    .await?;
                if flagged == 0 {
                    break;
                }
                batches += 1;
                archived += flagged;
                info!(batch = batches, flagged, total = archived, "archival batch committed");
                if (flagged as i64) < self.batch_size {
                    break;
                }
            }
        }

        let after = self.store.ledger_counts().await?;
        if after.total < before.total {
            return Err(AppError::Internal(format!(
                "Ledger shrank during archival: {} -> {} rows",
                before.total, after.total
            )));
        }

        info!(
            cutoff = %cutoff,
            dry_run,
            eligible,
            archived,
            rows_before = before.total,
            rows_after = after.total,
            archived_before = before.archived,
            archived_after = after.archived,
            "archival run finished"
        );

        Ok(ArchivalReport {
            cutoff,
            dry_run,
            eligible,
            archived,
            batches,
            before,
            after,
        })
    }
}
