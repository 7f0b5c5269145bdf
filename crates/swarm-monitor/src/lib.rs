//! Performance Monitor (C7, §4.7): metric recording, threshold-rule
//! alerting, and system health/optimisation scoring, decoupled from the
//! engine behind [`swarm_runtime::MetricsSink`].

pub mod alert;
pub mod health;
pub mod metric;
pub mod monitor;
pub mod threshold;

pub use alert::{Alert, AlertSeverity};
pub use health::{Recommendation, RecommendationKind};
pub use metric::{MetricSample, MetricStore, MetricType, RING_BUFFER_SIZE};
pub use monitor::{HistogramStats, Monitor, MonitorConfig};
pub use threshold::{Comparison, ThresholdRule};
