//! Engine services: ledger, sync, conflicts, health and archival

pub mod archival;
pub mod conflict;
pub mod health;
pub mod lease;
pub mod ledger;
pub mod linking;
pub mod mapper;
pub mod queue;
pub mod resolver;
pub mod sync;

pub use archival::{ArchivalReport, ArchivalService};
pub use conflict::{ConflictDetector, ConflictReport};
pub use health::{HealthMetrics, HealthMonitor};
pub use lease::{LeaseGuard, LeaseRegistry};
pub use ledger::{LedgerService, RecordMovementInput, RecordedMovement};
pub use linking::{AgentLinker, ManualAgentLinker};
pub use mapper::{BinMapper, PlannedChange};
pub use queue::{FailedJob, SyncQueue};
pub use resolver::{ConflictResolver, ResolutionSummary, ReviewQueue};
pub use sync::{SyncOrchestrator, SyncOutcome, SyncRequest};
