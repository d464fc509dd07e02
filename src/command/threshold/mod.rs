pub mod expression;
pub mod goal;

pub use expression::{ExpressionEngine, ExpressionResult};
pub use goal::ThresholdGoal;

use super::context::{CommandSettings, TimerId, TimerOwner, TimerQueue};
use super::GoalInfo;
use crate::node::{NodeStore, NodeUpdateDistributor};
use std::time::Duration;
use tracing::debug;

/// Goal watcher armed when a command with goal info completes.
///
/// Goals sharing a `group_id` form a group. The threshold is clear when
/// every group has a clear complete-clear member, or every member clear.
#[derive(Debug, Clone)]
pub struct ThresholdStorage {
    goals: Vec<ThresholdGoal>,
    groups: Vec<Vec<usize>>,
    timer: Option<TimerId>,
    limit_time_sec: Option<f64>,
}

impl ThresholdStorage {
    pub fn new(info: &GoalInfo, expressions: &ExpressionEngine) -> Self {
        let goals: Vec<ThresholdGoal> = info
            .goal_data_list
            .iter()
            .map(|data| ThresholdGoal::new(data, expressions))
            .collect();

        let mut groups: Vec<(Option<String>, Vec<usize>)> = Vec::new();
        for (idx, goal) in goals.iter().enumerate() {
            match groups.iter_mut().find(|(id, _)| *id == goal.group_id) {
                Some((_, members)) => members.push(idx),
                None => groups.push((goal.group_id.clone(), vec![idx])),
            }
        }

        Self {
            goals,
            groups: groups.into_iter().map(|(_, members)| members).collect(),
            timer: None,
            limit_time_sec: info.limit_time_sec,
        }
    }

    /// True when the goals are satisfied before anything is armed: a
    /// complete-clear goal is met, or every goal is met.
    pub fn is_reached_at_start(&self, nodes: &NodeStore, expressions: &ExpressionEngine) -> bool {
        if self.goals.is_empty() {
            return false;
        }
        let clear: Vec<bool> = self
            .goals
            .iter()
            .map(|goal| goal.is_clear(nodes, expressions))
            .collect();

        self.goals
            .iter()
            .zip(&clear)
            .any(|(goal, &c)| c && goal.is_complete_clear)
            || clear.iter().all(|&c| c)
    }

    /// Subscribe every goal at the head of its nodes and start the time limit.
    pub fn arm(
        &mut self,
        storage_uuid: &str,
        distributor: &mut NodeUpdateDistributor,
        timers: &mut TimerQueue,
        settings: &CommandSettings,
    ) {
        if let Some(limit) = self.limit_time_sec {
            let secs = settings.limit_time_unit.as_secs_f64() * limit.max(0.0);
            let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
            self.timer = Some(timers.schedule(
                delay,
                TimerOwner::Threshold {
                    storage_uuid: storage_uuid.to_string(),
                },
            ));
        }

        for (idx, goal) in self.goals.iter_mut().enumerate() {
            goal.attach(storage_uuid, idx, distributor);
        }
        debug!(storage_uuid = %storage_uuid, goals = self.goals.len(), "Threshold armed");
    }

    pub fn is_threshold_clear(&self, nodes: &NodeStore, expressions: &ExpressionEngine) -> bool {
        self.groups.iter().all(|members| {
            let has_complete = members.iter().any(|&idx| {
                let goal = &self.goals[idx];
                goal.is_complete_clear && goal.is_clear(nodes, expressions)
            });
            has_complete
                || members
                    .iter()
                    .all(|&idx| self.goals[idx].is_clear(nodes, expressions))
        })
    }

    pub fn is_goal_clear(
        &self,
        goal_index: usize,
        nodes: &NodeStore,
        expressions: &ExpressionEngine,
    ) -> bool {
        self.goals
            .get(goal_index)
            .map_or(false, |goal| goal.is_clear(nodes, expressions))
    }

    /// Cancel the time limit and drop every node subscription.
    pub fn reset(&mut self, distributor: &mut NodeUpdateDistributor, timers: &mut TimerQueue) {
        if let Some(timer) = self.timer.take() {
            timers.cancel(timer);
        }
        for goal in &mut self.goals {
            goal.detach(distributor);
        }
    }

    pub fn goals(&self) -> &[ThresholdGoal] {
        &self.goals
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }
}
