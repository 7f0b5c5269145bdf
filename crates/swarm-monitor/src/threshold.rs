//! Threshold rules and violation tracking (§4.7). A rule fires an alert
//! only once both its consecutive-violations count and cooldown have been
//! satisfied (resolved open question, see SPEC_FULL.md §D.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::AlertSeverity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
}

impl Comparison {
    fn violated_by(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::GreaterThan => value > threshold,
            Comparison::LessThan => value < threshold,
            Comparison::GreaterOrEqual => value >= threshold,
            Comparison::LessOrEqual => value <= threshold,
            Comparison::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub metric_name: String,
    pub threshold: f64,
    pub comparison: Comparison,
    pub severity: AlertSeverity,
    pub consecutive_violations_required: u32,
    pub cooldown_minutes: i64,
}

impl ThresholdRule {
    pub fn new(
        metric_name: impl Into<String>,
        threshold: f64,
        comparison: Comparison,
        severity: AlertSeverity,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            threshold,
            comparison,
            severity,
            consecutive_violations_required: 1,
            cooldown_minutes: 5,
        }
    }

    pub fn with_consecutive_violations(mut self, count: u32) -> Self {
        self.consecutive_violations_required = count.max(1);
        self
    }

    pub fn with_cooldown_minutes(mut self, minutes: i64) -> Self {
        self.cooldown_minutes = minutes.max(0);
        self
    }
}

/// Per-rule violation-streak bookkeeping, kept alongside the rule itself.
#[derive(Debug, Clone, Default)]
pub struct RuleState {
    pub consecutive: u32,
    pub last_fired_at: Option<DateTime<Utc>>,
}

/// The outcome of evaluating one rule against the latest sample for its
/// metric.
pub enum Evaluation {
    /// The metric hasn't violated the threshold on this tick; streak reset.
    Clear,
    /// Violated, but not enough consecutive ticks or still in cooldown.
    Suppressed,
    /// Violated, consecutive-violations met, cooldown elapsed: fire.
    Fire { value: f64 },
}

impl RuleState {
    /// Advances the streak against `value` and decides whether to fire,
    /// per the rule's consecutive-violations and cooldown gates. Resets the
    /// streak on any non-violating tick (§D.4); cooldown is measured from
    /// the tick that actually fired, not from the start of the streak.
    pub fn evaluate(&mut self, rule: &ThresholdRule, value: f64, now: DateTime<Utc>) -> Evaluation {
        if !rule.comparison.violated_by(value, rule.threshold) {
            self.consecutive = 0;
            return Evaluation::Clear;
        }

        self.consecutive += 1;
        if self.consecutive < rule.consecutive_violations_required {
            return Evaluation::Suppressed;
        }

        if let Some(last) = self.last_fired_at {
            let elapsed = now - last;
            if elapsed < chrono::Duration::minutes(rule.cooldown_minutes) {
                return Evaluation::Suppressed;
            }
        }

        self.last_fired_at = Some(now);
        Evaluation::Fire { value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> ThresholdRule {
        ThresholdRule::new("queue_depth", 100.0, Comparison::GreaterThan, AlertSeverity::Warning)
            .with_consecutive_violations(3)
            .with_cooldown_minutes(10)
    }

    #[test]
    fn does_not_fire_before_consecutive_violations_met() {
        let rule = rule();
        let mut state = RuleState::default();
        let now = Utc::now();
        assert!(matches!(state.evaluate(&rule, 150.0, now), Evaluation::Suppressed));
        assert!(matches!(state.evaluate(&rule, 150.0, now), Evaluation::Suppressed));
        assert!(matches!(state.evaluate(&rule, 150.0, now), Evaluation::Fire { .. }));
    }

    #[test]
    fn non_violating_tick_resets_the_streak() {
        let rule = rule();
        let mut state = RuleState::default();
        let now = Utc::now();
        state.evaluate(&rule, 150.0, now);
        state.evaluate(&rule, 150.0, now);
        assert!(matches!(state.evaluate(&rule, 10.0, now), Evaluation::Clear));
        assert_eq!(state.consecutive, 0);
        assert!(matches!(state.evaluate(&rule, 150.0, now), Evaluation::Suppressed));
    }

    #[test]
    fn cooldown_suppresses_refiring_until_it_elapses() {
        let rule = rule();
        let mut state = RuleState::default();
        let t0 = Utc::now();
        state.evaluate(&rule, 150.0, t0);
        state.evaluate(&rule, 150.0, t0);
        assert!(matches!(state.evaluate(&rule, 150.0, t0), Evaluation::Fire { .. }));

        let still_cooling = t0 + chrono::Duration::minutes(5);
        assert!(matches!(state.evaluate(&rule, 150.0, still_cooling), Evaluation::Suppressed));

        let after_cooldown = t0 + chrono::Duration::minutes(11);
        assert!(matches!(state.evaluate(&rule, 150.0, after_cooldown), Evaluation::Fire { .. }));
    }
}
