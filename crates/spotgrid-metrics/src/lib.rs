//! spotgrid-metrics — the inputs and outputs of the control loop's
//! observability.
//!
//! Holds recent utilization samples per deployment and the current price of
//! every instance offering, and hands both to the scheduler as frozen values
//! once per tick. Also renders controller state in Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! MetricsCollector (implements MetricsFeed)
//!   ├── record_sample() ← fed by the serving layer
//!   ├── record_price()  ← fed by provider price polling
//!   ├── get_window()    → MetricsWindow for one deployment
//!   └── pricing_snapshot() → PricingSnapshot frozen for one tick
//!
//! Prometheus exposition
//!   └── render_prometheus() → deployments by state, actions by kind, spend
//! ```

pub mod collector;
pub mod feed;
pub mod prometheus;

pub use collector::MetricsCollector;
pub use feed::MetricsFeed;
pub use prometheus::render_prometheus;
