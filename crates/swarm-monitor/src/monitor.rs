//! Performance Monitor (C7, §4.7): records metrics, evaluates threshold
//! rules into alerts, and scores overall system health. Wired into the
//! engine via [`swarm_runtime::MetricsSink`] (`swarmctl` holds the `Arc`).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use swarm_runtime::MetricsSink;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::alert::{Alert, AlertSeverity};
use crate::health::{health_score, recommend, Recommendation, RecommendationKind};
use crate::metric::{MetricSample, MetricStore, MetricType};
use crate::threshold::{Evaluation, RuleState, ThresholdRule};

const ALERT_HISTORY_SIZE: usize = 1000;

pub struct MonitorConfig {
    pub retention_hours: i64,
    pub alert_history_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            retention_hours: 24,
            alert_history_size: ALERT_HISTORY_SIZE,
        }
    }
}

struct Rule {
    rule: ThresholdRule,
    state: RuleState,
}

pub struct Monitor {
    metrics: MetricStore,
    rules: DashMap<String, Mutex<Rule>>,
    alerts: Mutex<VecDeque<Alert>>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            metrics: MetricStore::new(),
            rules: DashMap::new(),
            alerts: Mutex::new(VecDeque::with_capacity(config.alert_history_size)),
            config,
        }
    }

    pub fn add_rule(&self, rule: ThresholdRule) -> String {
        let id = Uuid::new_v4().to_string();
        self.rules.insert(
            id.clone(),
            Mutex::new(Rule {
                rule,
                state: RuleState::default(),
            }),
        );
        id
    }

    pub fn remove_rule(&self, rule_id: &str) {
        self.rules.remove(rule_id);
    }

    pub fn samples(&self, metric_name: &str) -> Vec<MetricSample> {
        self.metrics.samples(metric_name)
    }

    /// Evaluates every registered rule against its metric's latest sample,
    /// firing and recording alerts as the consecutive-violations/cooldown
    /// gates allow (§4.7). Callers (typically `swarmctl serve`'s monitoring
    /// loop, on `monitoring_interval_s`) drive this periodically; the
    /// monitor doesn't run its own timer.
    pub fn evaluate_rules(&self) -> Vec<Alert> {
        let now = Utc::now();
        let mut fired = Vec::new();

        for entry in self.rules.iter() {
            let mut guard = entry.value().lock();
            let Some(latest) = self.metrics.latest(&guard.rule.metric_name) else {
                continue;
            };
            let evaluation = guard.state.evaluate(&guard.rule, latest.value, now);
            if let Evaluation::Fire { value } = evaluation {
                let alert = Alert::new(
                    guard.rule.metric_name.clone(),
                    guard.rule.severity,
                    value,
                    guard.rule.threshold,
                    guard.rule.cooldown_minutes,
                );
                warn!(metric = %alert.metric_name, severity = ?alert.severity, value, "threshold alert fired");
                fired.push(alert);
            }
        }

        if !fired.is_empty() {
            let mut history = self.alerts.lock();
            for alert in &fired {
                if history.len() >= self.config.alert_history_size {
                    history.pop_front();
                }
                history.push_back(alert.clone());
            }
        }
        fired
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        let now = Utc::now();
        self.alerts.lock().iter().filter(|a| a.is_active(now)).cloned().collect()
    }

    pub fn alert_history(&self) -> Vec<Alert> {
        self.alerts.lock().iter().cloned().collect()
    }

    /// 0..=100 (§4.7). `resource_utilization` is the caller-supplied
    /// fraction (e.g. mean `current_load / max_concurrent` across the
    /// registry) since the monitor doesn't own the agent pool.
    pub fn health_score(&self, resource_utilization: f64) -> u8 {
        health_score(&self.active_alerts(), resource_utilization)
    }

    /// Derived Histogram view over a Timer/Gauge metric's retained samples:
    /// min, max, mean, and p50/p95/p99 (§4.7 "Histogram" metric shape).
    pub fn histogram(&self, metric_name: &str) -> Option<HistogramStats> {
        let mut values: Vec<f64> = self.metrics.samples(metric_name).into_iter().map(|s| s.value).collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let percentile = |p: f64| -> f64 {
            let idx = ((values.len() as f64 - 1.0) * p).round() as usize;
            values[idx.min(values.len() - 1)]
        };
        Some(HistogramStats {
            count: values.len(),
            min: values[0],
            max: values[values.len() - 1],
            mean: values.iter().sum::<f64>() / values.len() as f64,
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
        })
    }

    /// Derived Rate view: count of Counter samples recorded for
    /// `metric_name` within the trailing `window_secs`, expressed per
    /// second (§4.7 "Rate" metric shape).
    pub fn rate(&self, metric_name: &str, window_secs: i64) -> f64 {
        let cutoff = Utc::now() - chrono::Duration::seconds(window_secs.max(1));
        let count = self
            .metrics
            .samples(metric_name)
            .into_iter()
            .filter(|s| s.metric_type == MetricType::Counter && s.timestamp >= cutoff)
            .count();
        count as f64 / window_secs.max(1) as f64
    }

    /// Scans every retained metric for a moving-average trend worth
    /// surfacing as a recommendation (§4.7 "optimisation recommendations").
    pub fn recommendations(&self, window: usize, rise_threshold: f64) -> Vec<Recommendation> {
        self.metrics
            .metric_names()
            .into_iter()
            .filter_map(|name| {
                let values: Vec<f64> = self.metrics.samples(&name).into_iter().map(|s| s.value).collect();
                let kind = if name.contains("load") || name.contains("cpu") || name.contains("memory") {
                    RecommendationKind::ResourceOptimization
                } else {
                    RecommendationKind::WorkflowOptimization
                };
                recommend(&name, kind, &values, window, rise_threshold)
            })
            .collect()
    }

    /// Drops samples older than the retention window (§4.7). Callers run
    /// this on the same periodic cadence as `evaluate_rules`.
    pub fn sweep_retention(&self) {
        let cutoff = Utc::now() - chrono::Duration::hours(self.config.retention_hours);
        self.metrics.evict_retired(cutoff);
        debug!(cutoff = %cutoff, "metric retention sweep complete");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl MetricsSink for Monitor {
    fn record_counter(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.metrics.record(name, MetricType::Counter, value, tags);
    }

    fn record_gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.metrics.record(name, MetricType::Gauge, value, tags);
    }

    fn record_timer(&self, name: &str, millis: f64, tags: &[(&str, &str)]) {
        self.metrics.record(name, MetricType::Timer, millis, tags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::Comparison;

    #[test]
    fn record_counter_then_evaluate_rules_fires_alert() {
        let monitor = Monitor::new(MonitorConfig::default());
        monitor.add_rule(
            ThresholdRule::new("failed_steps_total", 5.0, Comparison::GreaterThan, AlertSeverity::Error)
                .with_consecutive_violations(1)
                .with_cooldown_minutes(1),
        );
        monitor.record_counter("failed_steps_total", 10.0, &[]);

        let fired = monitor.evaluate_rules();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].severity, AlertSeverity::Error);
        assert_eq!(monitor.active_alerts().len(), 1);
    }

    #[test]
    fn health_score_drops_with_active_alerts() {
        let monitor = Monitor::new(MonitorConfig::default());
        monitor.add_rule(ThresholdRule::new("cpu", 0.8, Comparison::GreaterThan, AlertSeverity::Critical).with_consecutive_violations(1));
        monitor.record_gauge("cpu", 0.95, &[]);
        monitor.evaluate_rules();

        assert!(monitor.health_score(0.5) < 100);
    }

    #[test]
    fn histogram_reports_percentiles_over_timer_samples() {
        let monitor = Monitor::new(MonitorConfig::default());
        for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
            monitor.record_timer("step_duration_ms", v, &[]);
        }
        let stats = monitor.histogram("step_duration_ms").unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 50.0);
    }

    #[test]
    fn rate_counts_only_counter_samples_within_window() {
        let monitor = Monitor::new(MonitorConfig::default());
        for _ in 0..5 {
            monitor.record_counter("dispatches_total", 1.0, &[]);
        }
        assert_eq!(monitor.rate("dispatches_total", 10), 0.5);
    }

    #[test]
    fn sweep_retention_drops_samples_older_than_window() {
        let monitor = Monitor::new(MonitorConfig {
            retention_hours: 0,
            ..MonitorConfig::default()
        });
        monitor.record_gauge("cpu", 0.5, &[]);
        monitor.sweep_retention();
        assert!(monitor.samples("cpu").is_empty());
    }
}
