//! Domain events emitted by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::{ExecutionId, ExecutionOrigin, ExecutionStatus, JobExecution, Job, JobId, JobType};

// =============================================================================
// Event IDs
// =============================================================================

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Domain Events
// =============================================================================

/// Event: a job was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCreated {
    pub job_id: JobId,
    pub name: String,
    pub schedule: String,
    pub job_type: JobType,
}

impl JobCreated {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id(),
            name: job.name().to_string(),
            schedule: job.schedule().to_text(),
            job_type: job.configuration().job_type(),
        }
    }
}

/// Event: an execution reached a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCompleted {
    pub job_id: JobId,
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub origin: ExecutionOrigin,
    pub retry_count: u32,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl ExecutionCompleted {
    pub fn from_execution(execution: &JobExecution) -> Self {
        Self {
            job_id: execution.job_id(),
            execution_id: execution.id(),
            status: execution.status(),
            origin: execution.origin(),
            retry_count: execution.retry_count(),
            duration_ms: execution.duration_ms(),
            error_message: execution.error_message().map(str::to_string),
        }
    }
}

/// All domain events in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    JobCreated(JobCreated),
    ExecutionCompleted(ExecutionCompleted),
}

impl DomainEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::JobCreated(_) => "JobCreated",
            DomainEvent::ExecutionCompleted(_) => "ExecutionCompleted",
        }
    }

    /// The job this event concerns.
    pub fn job_id(&self) -> JobId {
        match self {
            DomainEvent::JobCreated(e) => e.job_id,
            DomainEvent::ExecutionCompleted(e) => e.job_id,
        }
    }
}

impl From<JobCreated> for DomainEvent {
    fn from(event: JobCreated) -> Self {
        DomainEvent::JobCreated(event)
    }
}

impl From<ExecutionCompleted> for DomainEvent {
    fn from(event: ExecutionCompleted) -> Self {
        DomainEvent::ExecutionCompleted(event)
    }
}

// =============================================================================
// Event Envelope
// =============================================================================

/// An event stamped with its identity and occurrence time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub occurred_at: DateTime<Utc>,
    pub event: DomainEvent,
}

impl EventEnvelope {
    pub fn new(event: impl Into<DomainEvent>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: EventId::new(),
            occurred_at,
            event: event.into(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}
