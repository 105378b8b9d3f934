//! Domain model (ids, job record, states, outcomes, decisions).
//!
//! Nothing in here does I/O. Stores, executors and the worker pool live in
//! `ports`, `impls` and `app`.

pub mod decision;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod state;

pub use decision::{Decision, OutcomePolicy, RetryPolicy, backoff_delay};
pub use ids::JobId;
pub use job::{Job, JobDefinition};
pub use outcome::{ExecutionOutcome, OutcomeKind};
pub use state::{JobState, ParseJobStateError};
