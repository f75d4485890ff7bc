//! Job domain model.
//!
//! - **Job**: the aggregate holding a schedule, a configuration, lifecycle status and
//!   rolling run statistics
//! - **Configuration**: what to run and how (timeout, retries, concurrency, notifications)
//! - **Execution**: one attempt at running a job, with its own state machine
//! - **Retry**: retry eligibility and deterministic backoff
//!
//! # Lifecycles
//!
//! ```text
//! Job:        Draft ─▶ Active ⇄ Paused ─▶ Inactive / Error ─▶ Deleted
//!
//! Execution:  Pending ─▶ Running ─▶ Completed | Failed | Cancelled | Timeout
//!                │
//!                └─────▶ Skipped | Cancelled | Timeout
//! ```
//!
//! Nothing in this module reads the wall clock: every time-dependent operation takes
//! `now` from the caller.

/// Declares a `Uuid` newtype identifier.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

pub mod configuration;
pub mod execution;
pub mod job;
pub mod retry;

pub use configuration::{JobConfiguration, JobKind, JobType, NotificationPolicy};
pub use execution::{ExecutionId, ExecutionOrigin, ExecutionStatus, JobExecution, Metadata};
pub use job::{
    CategoryId, HealthPolicy, Job, JobHealth, JobId, JobStatistics, JobStatus, TeamId, UserId,
};
pub use retry::{BackoffStrategy, RetryPolicy};
