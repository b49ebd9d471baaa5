//! SpotGrid arbitrage — move deployments to cheaper capacity.
//!
//! Compares what a deployment costs where it runs with every offering in the
//! frozen pricing snapshot that can hold its resource shape, including the
//! same instance class on spot capacity. A migration is proposed only after
//! the same candidate has undercut the current placement by more than the
//! configured margin on consecutive evaluations.
//!
//! # Components
//!
//! - **`config`** — Margin, debounce and migration deadline
//! - **`engine`** — Per-deployment candidate streaks and proposals

pub mod config;
pub mod engine;

pub use config::ArbitrageConfig;
pub use engine::{ArbitrageDecision, ArbitrageEngine, MigrationProposal};
