//! System health score and optimisation recommendations (§4.7).

use serde::{Deserialize, Serialize};

use crate::alert::Alert;

/// 0..=100, deducting for active alerts and high resource utilisation.
pub fn health_score(active_alerts: &[Alert], resource_utilization: f64) -> u8 {
    let alert_penalty: u32 = active_alerts.iter().map(|a| a.severity.health_penalty()).sum();

    let utilization_penalty = if resource_utilization > 0.8 {
        ((resource_utilization - 0.8) * 100.0).round() as u32
    } else {
        0
    };

    100u32.saturating_sub(alert_penalty).saturating_sub(utilization_penalty).min(100) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    ResourceOptimization,
    WorkflowOptimization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub metric_name: String,
    pub message: String,
    pub recent_average: f64,
    pub prior_average: f64,
}

fn moving_average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Compares the trailing `window` samples against the `window` before them
/// and proposes a recommendation if the trend crosses an actionable
/// threshold (§4.7 "derived from moving averages").
pub fn recommend(metric_name: &str, kind: RecommendationKind, samples: &[f64], window: usize, rise_threshold: f64) -> Option<Recommendation> {
    if samples.len() < window * 2 {
        return None;
    }
    let split = samples.len() - window;
    let prior = moving_average(&samples[split - window..split])?;
    let recent = moving_average(&samples[split..])?;

    if prior <= 0.0 {
        return None;
    }
    let change = (recent - prior) / prior;
    if change < rise_threshold {
        return None;
    }

    let message = match kind {
        RecommendationKind::ResourceOptimization => {
            format!("{metric_name} rose {:.0}% over the last {window} samples; consider scaling agent capacity", change * 100.0)
        }
        RecommendationKind::WorkflowOptimization => {
            format!("{metric_name} rose {:.0}% over the last {window} samples; consider splitting or re-tuning affected steps", change * 100.0)
        }
    };

    Some(Recommendation {
        kind,
        metric_name: metric_name.to_string(),
        message,
        recent_average: recent,
        prior_average: prior,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSeverity;

    #[test]
    fn perfect_health_with_no_alerts_and_low_utilization() {
        assert_eq!(health_score(&[], 0.3), 100);
    }

    #[test]
    fn critical_alert_and_saturation_both_deduct() {
        let alerts = vec![Alert::new("cpu", AlertSeverity::Critical, 0.99, 0.8, 5)];
        let score = health_score(&alerts, 0.95);
        assert!(score < 100 - 30);
    }

    #[test]
    fn recommend_fires_when_recent_average_rises_sharply() {
        let mut samples = vec![10.0; 10];
        samples.extend(vec![20.0; 10]);
        let rec = recommend("step_duration_ms", RecommendationKind::WorkflowOptimization, &samples, 10, 0.2);
        assert!(rec.is_some());
    }

    #[test]
    fn recommend_stays_quiet_on_flat_trend() {
        let samples = vec![10.0; 20];
        let rec = recommend("step_duration_ms", RecommendationKind::WorkflowOptimization, &samples, 10, 0.2);
        assert!(rec.is_none());
    }
}
