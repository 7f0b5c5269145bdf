//! Capability Matcher (C2): scores and ranks agent snapshots against a
//! [`CapabilityFilter`] under a selected algorithm (§4.2).

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::agent::AgentPoolEntry;
use crate::capability::{CapabilityFilter, MatchResult, SubScores};
use crate::SwarmResult;

/// Selectable scoring algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    WeightedScore,
    PerformanceOptimized,
    LoadBalanced,
    CostOptimized,
    MultiObjective,
    FuzzyMatch,
    HistoricalPredictor,
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::WeightedScore
    }
}

/// Matching context: request-scoped hints that tilt scoring (§4.2).
#[derive(Debug, Clone, Default)]
pub struct MatchingContext {
    pub step_count: usize,
    pub estimated_duration_secs: f64,
    pub priority: u8,
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub budget: Option<f64>,
    pub prefer_reliable: bool,
    pub allow_parallel: bool,
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Weights {
    cap: f64,
    tool: f64,
    wf: f64,
    perf: f64,
    avail: f64,
    cost: f64,
}

impl Weights {
    fn normalize(mut self) -> Self {
        let sum = self.cap + self.tool + self.wf + self.perf + self.avail + self.cost;
        if sum > 0.0 {
            self.cap /= sum;
            self.tool /= sum;
            self.wf /= sum;
            self.perf /= sum;
            self.avail /= sum;
            self.cost /= sum;
        }
        self
    }
}

fn weights_for(algorithm: Algorithm) -> Weights {
    match algorithm {
        Algorithm::WeightedScore => Weights {
            cap: 0.30,
            tool: 0.25,
            wf: 0.15,
            perf: 0.15,
            avail: 0.10,
            cost: 0.05,
        },
        Algorithm::PerformanceOptimized => Weights {
            cap: 0.25,
            tool: 0.20,
            wf: 0.0,
            perf: 0.30,
            avail: 0.0,
            cost: 0.0,
        },
        Algorithm::LoadBalanced => Weights {
            cap: 0.30,
            tool: 0.25,
            wf: 0.0,
            perf: 0.0,
            avail: 0.10,
            cost: 0.0,
        },
        Algorithm::CostOptimized => Weights {
            cap: 0.25,
            tool: 0.20,
            wf: 0.0,
            perf: 0.0,
            avail: 0.15,
            cost: 0.40,
        },
        Algorithm::MultiObjective => Weights {
            cap: 1.0 / 6.0,
            tool: 1.0 / 6.0,
            wf: 0.0,
            perf: 1.0 / 6.0,
            avail: 1.0 / 6.0,
            cost: 1.0 / 6.0,
        },
        Algorithm::FuzzyMatch => Weights {
            cap: 0.40,
            tool: 0.30,
            wf: 0.0,
            perf: 0.10,
            avail: 0.20,
            cost: 0.0,
        },
        Algorithm::HistoricalPredictor => Weights {
            cap: 0.20,
            tool: 0.15,
            wf: 0.0,
            perf: 0.50,
            avail: 0.15,
            cost: 0.0,
        },
    }
}

/// Applies WeightedScore's context modulation (§4.2), then normalises.
fn modulate_weighted_score(mut w: Weights, ctx: &MatchingContext) -> Weights {
    if ctx.prefer_reliable {
        w.perf += 0.10;
        w.avail += 0.05;
        w.cap -= 0.05;
    }
    if ctx.priority >= 8 {
        w.avail += 0.10;
        w.perf += 0.10;
        w.cost -= 0.20;
    }
    if ctx.budget.is_some() {
        w.cost += 0.15;
        w.cap -= 0.075;
        w.perf -= 0.075;
    }
    w.normalize()
}

fn ratio_or_empty_default(matched: usize, required_len: usize, filter_is_empty: bool) -> f64 {
    if required_len == 0 {
        if filter_is_empty {
            1.0
        } else {
            0.0
        }
    } else {
        matched as f64 / required_len as f64
    }
}

fn capability_score(agent: &AgentPoolEntry, filter: &CapabilityFilter) -> f64 {
    if filter.required_step_types.is_empty() {
        return ratio_or_empty_default(0, 0, filter.is_empty());
    }
    let agent_step_types: HashSet<&str> = agent
        .capabilities
        .iter()
        .flat_map(|c| c.step_types.iter().map(|s| s.as_str()))
        .collect();
    let matched = filter
        .required_step_types
        .iter()
        .filter(|t| agent_step_types.contains(t.as_str()))
        .count();
    ratio_or_empty_default(matched, filter.required_step_types.len(), filter.is_empty())
}

fn tool_score(agent: &AgentPoolEntry, filter: &CapabilityFilter) -> f64 {
    if filter.required_tools.is_empty() {
        return ratio_or_empty_default(0, 0, filter.is_empty());
    }
    let matched = filter
        .required_tools
        .iter()
        .filter(|t| agent.has_tool(t))
        .count();
    ratio_or_empty_default(matched, filter.required_tools.len(), filter.is_empty())
}

fn workflow_score(agent: &AgentPoolEntry, filter: &CapabilityFilter) -> f64 {
    if filter.required_strategies.is_empty() {
        return ratio_or_empty_default(0, 0, filter.is_empty());
    }
    let matched = filter
        .required_strategies
        .iter()
        .filter(|s| agent.supported_strategies.iter().any(|a| a == *s))
        .count();
    ratio_or_empty_default(matched, filter.required_strategies.len(), filter.is_empty())
}

fn performance_score(agent: &AgentPoolEntry, ctx: &MatchingContext) -> f64 {
    if agent.per_capability_metrics.is_empty() {
        return 0.8;
    }
    let scores: Vec<f64> = agent
        .per_capability_metrics
        .values()
        .map(|m| {
            let speed_score = if m.avg_exec_time_secs > 0.0 {
                (ctx.estimated_duration_secs / m.avg_exec_time_secs).min(1.0)
            } else {
                1.0
            };
            (m.success_rate + speed_score) / 2.0
        })
        .collect();
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn availability_score(agent: &AgentPoolEntry) -> f64 {
    let health_weight = agent.health.weight();
    (health_weight + (1.0 - agent.load_fraction())) / 2.0
}

fn cost_score(agent: &AgentPoolEntry, budget: Option<f64>) -> f64 {
    let cost = agent.scheduling.cost_per_execution;
    match budget {
        Some(b) if b > 0.0 => {
            if cost > b {
                0.0
            } else {
                1.0 - cost / b
            }
        }
        _ => 1.0 - cost / 10.0,
    }
}

fn base_cost_default(agent_type: &str, declared: f64) -> f64 {
    if declared > 0.0 {
        return declared;
    }
    let t = agent_type.to_lowercase();
    if t.contains("super") || t.contains("expert") {
        0.2
    } else if t.contains("specialist") || t.contains("advanced") {
        0.15
    } else {
        0.1
    }
}

fn estimated_execution_time(agent: &AgentPoolEntry, ctx: &MatchingContext) -> f64 {
    let base_time = if agent.per_capability_metrics.is_empty() {
        ctx.estimated_duration_secs
    } else {
        agent
            .per_capability_metrics
            .values()
            .map(|m| m.avg_exec_time_secs)
            .sum::<f64>()
            / agent.per_capability_metrics.len() as f64
    };
    base_time * (1.0 + 0.5 * agent.load_fraction())
}

fn estimated_cost(agent: &AgentPoolEntry, time_secs: f64) -> f64 {
    let base_cost = base_cost_default(&agent.agent_type, agent.scheduling.cost_per_execution);
    base_cost * (time_secs / 300.0)
}

/// Pre-filter (§4.2): applies identically regardless of algorithm.
fn passes_prefilter(agent: &AgentPoolEntry, filter: &CapabilityFilter) -> bool {
    if !filter.health_statuses.is_empty() && !filter.health_statuses.contains(&agent.health) {
        return false;
    }
    if let Some(max_load) = filter.max_current_load_pct {
        if agent.load_fraction() * 100.0 > max_load {
            return false;
        }
    }
    if agent.available_capacity() < filter.min_available_capacity {
        return false;
    }
    if filter.exclude_agents.iter().any(|id| id == &agent.id) {
        return false;
    }
    if !filter.include_agents.is_empty() && !filter.include_agents.contains(&agent.id) {
        return false;
    }
    true
}

fn missing_requirements(agent: &AgentPoolEntry, filter: &CapabilityFilter) -> Vec<String> {
    let mut missing = Vec::new();
    for tool in &filter.required_tools {
        if !agent.has_tool(tool) {
            missing.push(format!("tool:{tool}"));
        }
    }
    if let Some(max_cost) = filter.max_cost {
        if agent.scheduling.cost_per_execution > max_cost {
            missing.push("cost:over_budget".to_string());
        }
    }
    missing
}

fn token_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        1.0
    } else if a.contains(&b) || b.contains(&a) {
        0.6
    } else {
        0.0
    }
}

fn fuzzy_capability_score(agent: &AgentPoolEntry, filter: &CapabilityFilter) -> f64 {
    if filter.required_step_types.is_empty() {
        return ratio_or_empty_default(0, 0, filter.is_empty());
    }
    let agent_types: Vec<&str> = agent
        .capabilities
        .iter()
        .flat_map(|c| c.step_types.iter().map(|s| s.as_str()))
        .collect();
    let total: f64 = filter
        .required_step_types
        .iter()
        .map(|req| {
            agent_types
                .iter()
                .map(|got| token_similarity(req, got))
                .fold(0.0_f64, f64::max)
        })
        .sum();
    total / filter.required_step_types.len() as f64
}

fn fuzzy_tool_score(agent: &AgentPoolEntry, filter: &CapabilityFilter) -> f64 {
    if filter.required_tools.is_empty() {
        return ratio_or_empty_default(0, 0, filter.is_empty());
    }
    let total: f64 = filter
        .required_tools
        .iter()
        .map(|req| {
            agent
                .tools
                .iter()
                .map(|got| token_similarity(req, got))
                .fold(0.0_f64, f64::max)
        })
        .sum();
    total / filter.required_tools.len() as f64
}

/// Dominates in the Pareto sense: at least as good on every sub-score and
/// strictly better on at least one.
fn dominates(a: &SubScores, b: &SubScores) -> bool {
    let fields = [
        (a.capability, b.capability),
        (a.tool, b.tool),
        (a.performance, b.performance),
        (a.availability, b.availability),
        (a.cost, b.cost),
    ];
    fields.iter().all(|(x, y)| x >= y) && fields.iter().any(|(x, y)| x > y)
}

/// A recorded matching query, retained for simple frequency-based learning
/// (SPEC_FULL.md §C).
#[derive(Debug, Clone)]
pub struct MatchHistoryEntry {
    pub algorithm: Algorithm,
    pub candidate_count: usize,
    pub viable_count: usize,
}

const MATCH_HISTORY_CAPACITY: usize = 1000;

/// Ranks candidate agents against a filter+context under an algorithm.
pub struct CapabilityMatcher {
    history: parking_lot::Mutex<VecDeque<MatchHistoryEntry>>,
}

impl Default for CapabilityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityMatcher {
    pub fn new() -> Self {
        Self {
            history: parking_lot::Mutex::new(VecDeque::with_capacity(MATCH_HISTORY_CAPACITY)),
        }
    }

    pub fn rank(
        &self,
        agents: &[AgentPoolEntry],
        filter: &CapabilityFilter,
        ctx: &MatchingContext,
        algorithm: Algorithm,
        max_results: usize,
    ) -> SwarmResult<Vec<MatchResult>> {
        let candidates: Vec<&AgentPoolEntry> = agents
            .iter()
            .filter(|a| passes_prefilter(a, filter))
            .collect();

        let mean_load_pct = if candidates.is_empty() {
            0.0
        } else {
            candidates.iter().map(|a| a.load_fraction()).sum::<f64>() / candidates.len() as f64
        };

        let mut results: Vec<MatchResult> = candidates
            .iter()
            .map(|agent| self.score_one(agent, filter, ctx, algorithm, mean_load_pct))
            .collect();

        if algorithm == Algorithm::FuzzyMatch {
            results.retain(|r| r.total_score >= 0.7);
        }
        if algorithm == Algorithm::CostOptimized {
            if let Some(max_cost) = filter.max_cost {
                results.retain(|r| {
                    candidates
                        .iter()
                        .find(|a| a.id == r.agent_id)
                        .map(|a| a.scheduling.cost_per_execution <= max_cost)
                        .unwrap_or(true)
                });
            }
        }
        if algorithm == Algorithm::MultiObjective {
            let sub_scores: Vec<SubScores> = results.iter().map(|r| r.sub_scores).collect();
            for (idx, result) in results.iter_mut().enumerate() {
                let is_dominated = sub_scores
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != idx && dominates(other, &sub_scores[idx]));
                if is_dominated {
                    result.total_score *= 0.5;
                }
            }
        }

        results.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| {
                    a.estimated_execution_time_secs
                        .partial_cmp(&b.estimated_execution_time_secs)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    a.estimated_cost
                        .partial_cmp(&b.estimated_cost)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        results.truncate(max_results);

        let viable_count = results.iter().filter(|r| r.is_viable()).count();
        let mut history = self.history.lock();
        if history.len() == MATCH_HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(MatchHistoryEntry {
            algorithm,
            candidate_count: candidates.len(),
            viable_count,
        });

        Ok(results)
    }

    fn score_one(
        &self,
        agent: &AgentPoolEntry,
        filter: &CapabilityFilter,
        ctx: &MatchingContext,
        algorithm: Algorithm,
        mean_load_pct: f64,
    ) -> MatchResult {
        let (cap, tool) = if algorithm == Algorithm::FuzzyMatch {
            (fuzzy_capability_score(agent, filter), fuzzy_tool_score(agent, filter))
        } else {
            (capability_score(agent, filter), tool_score(agent, filter))
        };
        let wf = workflow_score(agent, filter);
        let perf = performance_score(agent, ctx);
        let avail = availability_score(agent);
        let health = agent.health.weight();
        let cost = cost_score(agent, ctx.budget.or(filter.max_cost));

        let weights = match algorithm {
            Algorithm::WeightedScore => modulate_weighted_score(weights_for(algorithm), ctx),
            _ => weights_for(algorithm).normalize(),
        };

        let mut total = weights.cap * cap
            + weights.tool * tool
            + weights.wf * wf
            + weights.perf * perf
            + weights.avail * avail
            + weights.cost * cost;

        if algorithm == Algorithm::PerformanceOptimized {
            let reliability = if agent.per_capability_metrics.is_empty() {
                0.8
            } else {
                agent
                    .per_capability_metrics
                    .values()
                    .map(|m| m.success_rate)
                    .sum::<f64>()
                    / agent.per_capability_metrics.len() as f64
            };
            let speed = if agent.per_capability_metrics.is_empty() {
                0.8
            } else {
                agent
                    .per_capability_metrics
                    .values()
                    .map(|m| {
                        if m.avg_exec_time_secs > 0.0 {
                            (ctx.estimated_duration_secs / m.avg_exec_time_secs).min(1.0)
                        } else {
                            1.0
                        }
                    })
                    .sum::<f64>()
                    / agent.per_capability_metrics.len() as f64
            };
            total += 0.15 * reliability + 0.10 * speed;
        }

        if algorithm == Algorithm::LoadBalanced {
            let load_pct = agent.load_fraction();
            let load_balance_score = (1.0 - load_pct) * (1.0 - (load_pct - mean_load_pct).abs());
            total += 0.35 * load_balance_score;
        }

        let total = total.clamp(0.0, 1.0);

        let time = estimated_execution_time(agent, ctx);
        let cost_estimate = estimated_cost(agent, time);

        MatchResult {
            agent_id: agent.id.clone(),
            total_score: total,
            sub_scores: SubScores {
                capability: cap,
                tool,
                workflow: wf,
                performance: perf,
                availability: avail,
                health,
                cost,
            },
            estimated_execution_time_secs: time,
            estimated_cost: cost_estimate,
            confidence: (cap + tool + avail) / 3.0,
            missing_requirements: missing_requirements(agent, filter),
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Health;

    fn agent(id: &str, tools: &[&str], cost: f64, load: u32, max_concurrent: u32) -> AgentPoolEntry {
        let mut a = AgentPoolEntry::new(id, "code", id);
        a.tools = tools.iter().map(|s| s.to_string()).collect();
        a.scheduling.cost_per_execution = cost;
        a.limits.max_concurrent = max_concurrent;
        a.current_load = load;
        a
    }

    #[test]
    fn empty_pool_yields_empty_results() {
        let matcher = CapabilityMatcher::new();
        let filter = CapabilityFilter::default();
        let ctx = MatchingContext::default();
        let results = matcher
            .rank(&[], &filter, &ctx, Algorithm::WeightedScore, 10)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn empty_filter_admits_every_prefilter_passing_agent() {
        let matcher = CapabilityMatcher::new();
        let agents = vec![agent("a1", &["t1"], 0.05, 0, 5), agent("a2", &[], 0.05, 0, 5)];
        let filter = CapabilityFilter::default();
        let ctx = MatchingContext::default();
        let results = matcher
            .rank(&agents, &filter, &ctx, Algorithm::WeightedScore, 10)
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn scores_stay_within_unit_interval() {
        let matcher = CapabilityMatcher::new();
        let agents = vec![agent("a1", &["t1", "t2"], 0.05, 1, 5)];
        let mut filter = CapabilityFilter::default();
        filter.required_tools = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
        let ctx = MatchingContext::default();
        let results = matcher
            .rank(&agents, &filter, &ctx, Algorithm::WeightedScore, 10)
            .unwrap();
        let r = &results[0];
        assert!((0.0..=1.0).contains(&r.total_score));
        assert!((0.0..=1.0).contains(&r.sub_scores.capability));
        assert!((0.0..=1.0).contains(&r.sub_scores.tool));
    }

    #[test]
    fn cost_optimized_excludes_over_budget_agents() {
        let matcher = CapabilityMatcher::new();
        let agents = vec![agent("cheap", &[], 0.04, 0, 5), agent("pricey", &[], 0.12, 0, 5)];
        let mut filter = CapabilityFilter::default();
        filter.max_cost = Some(0.10);
        let ctx = MatchingContext::default();
        let results = matcher
            .rank(&agents, &filter, &ctx, Algorithm::CostOptimized, 10)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent_id, "cheap");
    }

    #[test]
    fn ranking_is_deterministic_given_fixed_inputs() {
        let matcher = CapabilityMatcher::new();
        let agents = vec![agent("a1", &["t1"], 0.05, 0, 5), agent("a2", &["t1"], 0.08, 2, 5)];
        let filter = CapabilityFilter::default();
        let ctx = MatchingContext::default();
        let first = matcher
            .rank(&agents, &filter, &ctx, Algorithm::WeightedScore, 10)
            .unwrap();
        let second = matcher
            .rank(&agents, &filter, &ctx, Algorithm::WeightedScore, 10)
            .unwrap();
        let first_ids: Vec<_> = first.iter().map(|r| r.agent_id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|r| r.agent_id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn result_set_is_subset_of_candidates() {
        let matcher = CapabilityMatcher::new();
        let agents = vec![agent("a1", &[], 0.05, 0, 5), agent("a2", &[], 0.05, 0, 5)];
        let filter = CapabilityFilter::default();
        let ctx = MatchingContext::default();
        let results = matcher
            .rank(&agents, &filter, &ctx, Algorithm::WeightedScore, 10)
            .unwrap();
        let candidate_ids: HashSet<&str> = agents.iter().map(|a| a.id.as_str()).collect();
        assert!(results.iter().all(|r| candidate_ids.contains(r.agent_id.as_str())));
    }

    #[test]
    fn health_offline_is_prefiltered_out_by_default() {
        let matcher = CapabilityMatcher::new();
        let mut offline = agent("offline", &[], 0.05, 0, 5);
        offline.health = Health::Offline;
        let filter = CapabilityFilter::default();
        let ctx = MatchingContext::default();
        let results = matcher
            .rank(&[offline], &filter, &ctx, Algorithm::WeightedScore, 10)
            .unwrap();
        assert!(results.is_empty());
    }
}
