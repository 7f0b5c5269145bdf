//! Alerts fired by threshold rules (§4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    /// Health-score deduction per active alert at this severity (§4.7
    /// "deducting for active alerts").
    pub fn health_penalty(self) -> u32 {
        match self {
            AlertSeverity::Info => 1,
            AlertSeverity::Warning => 5,
            AlertSeverity::Error => 15,
            AlertSeverity::Critical => 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub metric_name: String,
    pub severity: AlertSeverity,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub fired_at: DateTime<Utc>,
    pub cooldown_minutes: i64,
}

impl Alert {
    pub fn new(metric_name: impl Into<String>, severity: AlertSeverity, value: f64, threshold: f64, cooldown_minutes: i64) -> Self {
        let metric_name = metric_name.into();
        let message = format!("{metric_name} is {value} (threshold {threshold})");
        Self {
            id: Uuid::new_v4().to_string(),
            metric_name,
            severity,
            value,
            threshold,
            message,
            fired_at: Utc::now(),
            cooldown_minutes,
        }
    }

    /// An alert stays "active" for the span of its own cooldown window,
    /// after which it's considered stale unless the rule fires again.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now - self.fired_at < chrono::Duration::minutes(self.cooldown_minutes.max(1))
    }
}
