//! spotgrid-state — durable deployment records for the SpotGrid controller.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for deployments and the action journal, plus the deployment
//! lifecycle state machine.
//!
//! # Architecture
//!
//! Every deployment is stored together with a monotonically increasing
//! version. Writers read `(deployment, version)` and commit with
//! `compare_and_swap`, which fails if anyone wrote in between. This is the
//! single synchronization point that keeps at most one action in flight per
//! deployment.
//!
//! The `DeploymentStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod action;
pub mod duration;
pub mod error;
pub mod lifecycle;
pub mod pricing;
pub mod store;
pub mod tables;
pub mod types;

pub use action::*;
pub use duration::{epoch_secs, parse_duration_secs};
pub use error::{StateError, StateResult};
pub use lifecycle::DeploymentState;
pub use pricing::*;
pub use store::DeploymentStore;
pub use types::*;
