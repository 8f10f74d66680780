use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rule::SearchRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleLifecycleState {
    Normal,
    PendingFiring,
    Firing,
    PendingResolving,
}

impl Default for RuleLifecycleState {
    fn default() -> Self {
        RuleLifecycleState::Normal
    }
}

impl RuleLifecycleState {
    pub const ALL: [RuleLifecycleState; 4] = [
        RuleLifecycleState::Normal,
        RuleLifecycleState::PendingFiring,
        RuleLifecycleState::Firing,
        RuleLifecycleState::PendingResolving,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleLifecycleState::Normal => "Normal",
            RuleLifecycleState::PendingFiring => "PendingFiring",
            RuleLifecycleState::Firing => "Firing",
            RuleLifecycleState::PendingResolving => "PendingResolving",
        }
    }
}

/// RulePool entry. `firing_time`/`resolving_time` are monotonic instants;
/// `None` means "unset" (the spec's zero value).
#[derive(Debug, Clone)]
pub struct RuleState {
    pub rule: SearchRule,
    pub state: RuleLifecycleState,
    pub firing_time: Option<std::time::Instant>,
    pub resolving_time: Option<std::time::Instant>,
    pub value: f64,
    pub aggregations: Option<Value>,
}

impl RuleState {
    pub fn new(rule: SearchRule) -> Self {
        Self {
            rule,
            state: RuleLifecycleState::Normal,
            firing_time: None,
            resolving_time: None,
            value: 0.0,
            aggregations: None,
        }
    }

    /// Invariant I3: a rule back in Normal has both times unset.
    pub fn reset_times(&mut self) {
        self.firing_time = None;
        self.resolving_time = None;
    }
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub ruler_action_name: String,
    pub search_rule: SearchRule,
    pub value: f64,
    pub aggregations: Option<Value>,
}
