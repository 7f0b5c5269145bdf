//! Coordination Group data model (§3 "Coordination Group", §4.4): the
//! in-flight multi-agent dispatch a step drives under a strategy. The
//! dispatch logic lives in the runtime's coordinator (C4); this module holds
//! the shared shape both the coordinator and the state manager need.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStrategy {
    Parallel,
    Sequential,
    Pipeline,
    ScatterGather,
    Consensus,
    Hierarchical,
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TaskStatus {
    Assigned,
    Executing,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// One assigned agent's task within a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub agent_id: String,
    pub status: TaskStatus,
    pub attempt_count: u32,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Set when the task is cancelled, used for structured post-mortems.
    pub cancellation_reason: Option<String>,
}

impl TaskRecord {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: TaskStatus::Assigned,
            attempt_count: 0,
            output: None,
            error: None,
            cancellation_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupState {
    Active,
    Cancelled,
    Done,
}

/// An in-flight multi-agent dispatch driving one step under a strategy.
#[derive(Debug, Clone)]
pub struct CoordinationGroup {
    pub id: String,
    pub strategy: CoordinationStrategy,
    pub member_agent_ids: Vec<String>,
    pub tasks: HashMap<String, TaskRecord>,
    pub shared_context: HashMap<String, Value>,
    pub leader_agent_id: Option<String>,
    pub state: GroupState,
    /// Bounded, at-most-once, per-publisher-ordered message log visible to
    /// every member for the group's lifetime (§4.4 "Inter-agent messaging").
    message_queue: VecDeque<GroupMessage>,
}

impl CoordinationGroup {
    pub fn new(strategy: CoordinationStrategy, member_agent_ids: Vec<String>) -> Self {
        let tasks = member_agent_ids
            .iter()
            .map(|id| (id.clone(), TaskRecord::new(id.clone())))
            .collect();
        let leader_agent_id = if strategy == CoordinationStrategy::Hierarchical {
            member_agent_ids.first().cloned()
        } else {
            None
        };
        Self {
            id: Uuid::new_v4().to_string(),
            strategy,
            member_agent_ids,
            tasks,
            shared_context: HashMap::new(),
            leader_agent_id,
            state: GroupState::Active,
            message_queue: VecDeque::with_capacity(GROUP_MESSAGE_QUEUE_CAPACITY.min(64)),
        }
    }

    /// Publishes a named message visible to every other member for the rest
    /// of the group's lifetime. Ordered within `from_agent_id`'s own
    /// publications; the oldest message is dropped once the queue is at
    /// capacity (§4.4 "Inter-agent messaging" — capacity 256 by default).
    pub fn publish(&mut self, from_agent_id: impl Into<String>, name: impl Into<String>, payload: Value) {
        if self.message_queue.len() == GROUP_MESSAGE_QUEUE_CAPACITY {
            self.message_queue.pop_front();
        }
        self.message_queue.push_back(GroupMessage {
            from_agent_id: from_agent_id.into(),
            name: name.into(),
            payload,
            published_at: Utc::now(),
        });
    }

    /// All messages published so far, oldest first. Delivery is at-most-once
    /// per reader in the sense that nothing is re-delivered across groups;
    /// within this group every member sees the same ordered log.
    pub fn messages(&self) -> &VecDeque<GroupMessage> {
        &self.message_queue
    }

    /// Messages published by members other than `agent_id`, oldest first —
    /// the view one member sees of the rest of the group.
    pub fn messages_for(&self, agent_id: &str) -> Vec<&GroupMessage> {
        self.message_queue.iter().filter(|m| m.from_agent_id != agent_id).collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.is_terminal())
    }

    /// Marks every non-terminal member task Cancelled and the group inactive
    /// (§5 "Cancellation").
    pub fn cancel(&mut self, reason: &str) {
        for task in self.tasks.values_mut() {
            if !task.is_terminal() {
                task.status = TaskStatus::Cancelled;
                task.cancellation_reason = Some(reason.to_string());
            }
        }
        self.state = GroupState::Cancelled;
    }
}

/// A bounded, at-most-once, per-publisher-ordered message published within
/// a group's lifetime (§4.4 "Inter-agent messaging").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub from_agent_id: String,
    pub name: String,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

pub const GROUP_MESSAGE_QUEUE_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchical_group_picks_first_member_as_leader() {
        let group = CoordinationGroup::new(
            CoordinationStrategy::Hierarchical,
            vec!["leader".to_string(), "worker1".to_string()],
        );
        assert_eq!(group.leader_agent_id.as_deref(), Some("leader"));
    }

    #[test]
    fn cancel_marks_non_terminal_tasks_cancelled() {
        let mut group = CoordinationGroup::new(
            CoordinationStrategy::Parallel,
            vec!["a1".to_string(), "a2".to_string()],
        );
        group.tasks.get_mut("a1").unwrap().status = TaskStatus::Completed;
        group.cancel("user requested");
        assert_eq!(group.tasks["a1"].status, TaskStatus::Completed);
        assert_eq!(group.tasks["a2"].status, TaskStatus::Cancelled);
        assert_eq!(group.state, GroupState::Cancelled);
    }

    #[test]
    fn published_messages_are_visible_to_other_members_in_order() {
        let mut group = CoordinationGroup::new(
            CoordinationStrategy::Parallel,
            vec!["a1".to_string(), "a2".to_string()],
        );
        group.publish("a1", "progress", serde_json::json!({"pct": 10}));
        group.publish("a1", "progress", serde_json::json!({"pct": 50}));
        group.publish("a2", "progress", serde_json::json!({"pct": 5}));

        let seen_by_a2 = group.messages_for("a2");
        assert_eq!(seen_by_a2.len(), 2);
        assert_eq!(seen_by_a2[0].payload, serde_json::json!({"pct": 10}));
        assert_eq!(seen_by_a2[1].payload, serde_json::json!({"pct": 50}));

        let seen_by_a1 = group.messages_for("a1");
        assert_eq!(seen_by_a1.len(), 1);
        assert_eq!(seen_by_a1[0].from_agent_id, "a2");
    }

    #[test]
    fn all_terminal_detects_completion() {
        let mut group = CoordinationGroup::new(CoordinationStrategy::Parallel, vec!["a1".to_string()]);
        assert!(!group.all_terminal());
        group.tasks.get_mut("a1").unwrap().status = TaskStatus::Completed;
        assert!(group.all_terminal());
    }
}
