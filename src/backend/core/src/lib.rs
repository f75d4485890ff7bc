#![allow(clippy::result_large_err)]
//! # Cadence Core
//!
//! Cron scheduling and execution engine.
//!
//! ## Architecture
//!
//! - **Schedule**: cron expression parsing and next-occurrence evaluation
//! - **Jobs**: the `Job` aggregate, its configuration and the `JobExecution` state machine
//! - **Coordinator**: per-job admission, dispatch, timeouts, cancellation and retries
//! - **Scheduler**: the polling loop that hands due jobs to the coordinator
//! - **Runners**: process and HTTP runners behind the `JobRunner` trait
//! - **Store**: persistence trait with an in-memory backend
//! - **Service**: the job management operations exposed to an API layer
//! - **Telemetry**: structured logging and metrics

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod jobs;
pub mod notify;
pub mod pagination;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod validation;

pub use error::{CadenceError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::coordinator::{Admission, CoordinatorStats, ExecutionCoordinator};
    pub use crate::error::{CadenceError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};
    pub use crate::events::{DomainEvent, EventBus, EventEnvelope};
    pub use crate::jobs::{
        BackoffStrategy, ExecutionId, ExecutionOrigin, ExecutionStatus, HealthPolicy, Job,
        JobConfiguration, JobExecution, JobHealth, JobId, JobKind, JobStatistics, JobStatus, JobType,
        RetryPolicy, UserId,
    };
    pub use crate::notify::{LogNotifier, Notifier};
    pub use crate::pagination::{OffsetPagination, Page, PageMetadata};
    pub use crate::runner::{DispatchRunner, JobRunner, RunOutcome, RunRequest};
    pub use crate::schedule::CronExpression;
    pub use crate::scheduler::{SchedulerHandle, SchedulerLoop, TickReport};
    pub use crate::service::{JobService, NewJob};
    pub use crate::store::{InMemoryJobStore, JobFilter, JobStore};
}
