//! spotgrid-hibernation — suspend idle deployments, wake them on demand.
//!
//! A deployment whose scaling policy allows zero instances and whose cost
//! policy enables hibernation is suspended once it has seen no traffic for
//! longer than its idle timeout. Placement is retained while hibernated, so
//! a resume brings capacity back where it was.
//!
//! # Decision Flow
//!
//! ```text
//! Active:
//!   hibernation_enabled && min_instances == 0
//!     && now - last_activity > idle_timeout     → Suspend
//!
//! Hibernated:
//!   wake_requested || wake_at <= now
//!     || traffic since suspension               → Resume(max(1, min))
//! ```

pub mod config;
pub mod manager;

pub use config::HibernationConfig;
pub use manager::{HibernationDecision, HibernationManager, WakeReason, resume_instances};
