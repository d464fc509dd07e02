use crate::node::{NodeStore, NodeValue};
use rhai::{Dynamic, Engine, Scope, AST};
use std::sync::Arc;

/// Outcome of a goal expression
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionResult {
    Bool(bool),
    Number(f64),
    /// Any other type, or an evaluation error
    Unsupported,
}

/// Sandboxed evaluator for goal expressions over node values.
pub struct ExpressionEngine {
    engine: Engine,
}

impl ExpressionEngine {
    pub fn new(max_operations: u64) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(max_operations);
        Self { engine }
    }

    pub fn compile(&self, expression: &str) -> Result<Arc<AST>, String> {
        self.engine
            .compile_expression(expression)
            .map(Arc::new)
            .map_err(|e| e.to_string())
    }

    /// Evaluate with every node in `node_list` bound by id. Unknown values
    /// are bound as `()`.
    pub fn evaluate(&self, ast: &AST, node_list: &[String], nodes: &NodeStore) -> ExpressionResult {
        let mut scope = Scope::new();
        for node_id in node_list {
            let value = match nodes.value(node_id) {
                Some(NodeValue::Number(n)) => Dynamic::from(*n),
                Some(NodeValue::Text(s)) => Dynamic::from(s.clone()),
                None => Dynamic::UNIT,
            };
            scope.push_dynamic(node_id.as_str(), value);
        }

        let result = match self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, ast) {
            Ok(result) => result,
            Err(_) => return ExpressionResult::Unsupported,
        };

        if let Ok(b) = result.as_bool() {
            ExpressionResult::Bool(b)
        } else if let Ok(f) = result.as_float() {
            ExpressionResult::Number(f)
        } else if let Ok(i) = result.as_int() {
            ExpressionResult::Number(i as f64)
        } else {
            ExpressionResult::Unsupported
        }
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new(10_000)
    }
}
