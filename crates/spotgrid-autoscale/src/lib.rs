//! spotgrid-autoscale — utilization-driven instance sizing.
//!
//! Reads the frozen `MetricsWindow` of an Active deployment, compares its
//! binding utilization against `ScalingPolicy.target_utilization`, and
//! proposes a new instance count. The scheduler decides whether to act on it.
//!
//! # Scaling Algorithm
//!
//! ```text
//! util     = max(cpu_util, mem_util) of the newest sample
//! reactive = ceil(current * util / target)
//!
//! if the last N utilizations strictly increase:
//!     next      = last + (last - first) / (N - 1)
//!     predicted = ceil(current * next / target)
//!     desired   = max(reactive, predicted)      // never lowers
//!
//! if current == 0 and request_rate > 0:
//!     desired = max(desired, 1)                 // scale from zero
//!
//! desired = clamp(desired, min, max)
//! desired > current  → ScaleTo(desired) now
//! desired < current  → ScaleTo(desired) once below target for `scale_down_dwell`
//! ```
//!
//! When the count is left alone, `RightSizer` shrinks the per-replica shape
//! (CPU or memory by `shrink_factor`) once every sample has stayed below
//! `right_size.threshold` for `right_size.dwell`.

pub mod config;
pub mod rightsize;
pub mod scaler;

pub use config::{AutoscaleConfig, RightSizeConfig};
pub use rightsize::RightSizer;
pub use scaler::{Autoscaler, ScaleDecision};
