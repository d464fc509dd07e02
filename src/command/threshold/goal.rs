use super::expression::{ExpressionEngine, ExpressionResult};
use crate::command::{GoalData, GoalRange};
use crate::node::{NodeObserver, NodeStore, NodeUpdateDistributor, NodeValue, ObserverHandle};
use rhai::AST;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone)]
struct CompiledExpression {
    node_list: Vec<String>,
    ast: Option<Arc<AST>>,
}

/// One target a threshold watches.
#[derive(Debug, Clone)]
pub struct ThresholdGoal {
    pub node_id: Option<String>,
    pub goal_value: Option<NodeValue>,
    pub goal_range: GoalRange,
    pub group_id: Option<String>,
    pub is_inclusion_goal: bool,
    pub is_complete_clear: bool,
    expression: Option<CompiledExpression>,
    handles: Vec<ObserverHandle>,
}

impl ThresholdGoal {
    pub fn new(data: &GoalData, expressions: &ExpressionEngine) -> Self {
        let expression = data.expression.as_ref().map(|info| {
            let ast = match expressions.compile(&info.expression) {
                Ok(ast) => Some(ast),
                Err(e) => {
                    error!(expression = %info.expression, error = %e, "Goal expression does not compile");
                    None
                }
            };
            CompiledExpression {
                node_list: info.node_list.clone(),
                ast,
            }
        });

        Self {
            node_id: data.node_id.clone(),
            goal_value: data.goal_value.clone(),
            goal_range: data.goal_range,
            group_id: data.group_id.clone(),
            is_inclusion_goal: data.is_inclusion_goal,
            is_complete_clear: data.is_complete_clear,
            expression,
            handles: Vec::new(),
        }
    }

    /// Nodes whose updates re-evaluate this goal.
    pub fn observed_nodes(&self) -> Vec<String> {
        match &self.expression {
            Some(expr) if !expr.node_list.is_empty() => expr.node_list.clone(),
            _ => self.node_id.iter().cloned().collect(),
        }
    }

    pub fn is_clear(&self, nodes: &NodeStore, expressions: &ExpressionEngine) -> bool {
        if let Some(expr) = &self.expression {
            let Some(ast) = &expr.ast else {
                return false;
            };
            return match expressions.evaluate(ast, &expr.node_list, nodes) {
                ExpressionResult::Bool(b) => b,
                ExpressionResult::Number(n) => self.is_reached(Some(&NodeValue::Number(n))),
                ExpressionResult::Unsupported => false,
            };
        }

        let value = self.node_id.as_deref().and_then(|id| nodes.value(id));
        self.is_reached(value)
    }

    /// Compare a reading against the goal value and range.
    pub fn is_reached(&self, value: Option<&NodeValue>) -> bool {
        match value {
            None => self.goal_value.is_none() && self.goal_range == GoalRange::Equal,
            Some(NodeValue::Number(data)) => {
                let Some(goal) = self.goal_value.as_ref().and_then(NodeValue::as_number) else {
                    return false;
                };
                match self.goal_range {
                    GoalRange::Equal => *data == goal,
                    GoalRange::Lower if self.is_inclusion_goal => *data <= goal,
                    GoalRange::Lower => *data < goal,
                    GoalRange::Upper if self.is_inclusion_goal => *data >= goal,
                    GoalRange::Upper => *data > goal,
                }
            }
            Some(NodeValue::Text(data)) => match (&self.goal_value, self.goal_range) {
                (Some(NodeValue::Text(goal)), GoalRange::Equal) => data.eq_ignore_ascii_case(goal),
                _ => false,
            },
        }
    }

    pub(crate) fn attach(
        &mut self,
        storage_uuid: &str,
        goal_index: usize,
        distributor: &mut NodeUpdateDistributor,
    ) {
        for node_id in self.observed_nodes() {
            let observer = NodeObserver::Goal {
                storage_uuid: storage_uuid.to_string(),
                goal_index,
            };
            if let Some(handle) = distributor.attach(&node_id, observer, true) {
                self.handles.push(handle);
            }
        }
    }

    pub(crate) fn detach(&mut self, distributor: &mut NodeUpdateDistributor) {
        for handle in self.handles.drain(..) {
            distributor.detach(handle);
        }
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }
}
