//! spotgrid-scheduler — the reconciliation loop that turns cost, scaling and
//! hibernation proposals into actions for the executor.
//!
//! The scheduler is the only component that writes deployment state. Each
//! tick it freezes the metrics and prices into a `TickContext`, asks the
//! decision components for proposals in precedence order, and emits at most
//! one action per deployment.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── DeploymentStore (read (deployment, version), compare_and_swap)
//!   ├── Planner
//!   │   ├── HibernationManager   (suspend / resume)
//!   │   ├── Autoscaler           (resize)
//!   │   ├── RightSizer           (reshape)
//!   │   └── ArbitrageEngine      (migrate)
//!   └── ExecutorLink ──▶ ActionExecutor ──▶ Backend (per BackendKind)
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod reconcile;
pub mod scheduler;

pub use backend::{Backend, SimulatedBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ControllerConfig, RetryConfig};
pub use context::TickContext;
pub use error::{ControlError, SchedulerError, SchedulerResult};
pub use executor::{
    ActionExecutor, ActionOutcome, ExecutorEndpoint, ExecutorEvent, ExecutorLink, ObservedState,
    SubmitReply, Submission, executor_channel,
};
pub use scheduler::{Scheduler, TickReport, WakeStatus};
