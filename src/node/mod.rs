pub mod distributor;
pub use distributor::{Delivery, NodeObserver, NodeUpdateDistributor, ObserverHandle};

use crate::site::NodeInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Current value of a sensor or actuator.
///
/// Absence (`Option::None`) represents an unknown reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeValue {
    Number(f64),
    Text(String),
}

impl NodeValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            NodeValue::Number(n) => Some(*n),
            NodeValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            NodeValue::Text(s) => Some(s),
            NodeValue::Number(_) => None,
        }
    }

    /// Case-insensitive comparison against a named state.
    pub fn matches_name(&self, name: &str) -> bool {
        match self {
            NodeValue::Text(s) => !name.is_empty() && s.eq_ignore_ascii_case(name),
            NodeValue::Number(_) => false,
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Number(n) => write!(f, "{}", n),
            NodeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for NodeValue {
    fn from(n: f64) -> Self {
        NodeValue::Number(n)
    }
}

impl From<&str> for NodeValue {
    fn from(s: &str) -> Self {
        NodeValue::Text(s.to_string())
    }
}

impl From<String> for NodeValue {
    fn from(s: String) -> Self {
        NodeValue::Text(s)
    }
}

/// Inbound reading from the device layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_id: String,
    pub value: Option<NodeValue>,
}

impl NodeUpdate {
    pub fn new(node_id: impl Into<String>, value: Option<NodeValue>) -> Self {
        Self {
            node_id: node_id.into(),
            value,
        }
    }
}

/// A node write with its previous value
#[derive(Debug, Clone, Serialize)]
pub struct NodeChange {
    pub node_id: String,
    pub old_value: Option<NodeValue>,
    pub new_value: Option<NodeValue>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub info: NodeInfo,
    pub value: Option<NodeValue>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Node table holding the latest value per node
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: HashMap<String, NodeRecord>,
}

impl NodeStore {
    pub fn new(infos: &[NodeInfo]) -> Self {
        let nodes = infos
            .iter()
            .map(|info| {
                let record = NodeRecord {
                    info: info.clone(),
                    value: info.data.clone(),
                    updated_at: None,
                };
                (info.node_id.clone(), record)
            })
            .collect();
        Self { nodes }
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeRecord> {
        self.nodes.get(node_id)
    }

    pub fn value(&self, node_id: &str) -> Option<&NodeValue> {
        self.nodes.get(node_id).and_then(|record| record.value.as_ref())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Writes happen only through the distributor.
    pub(crate) fn write(
        &mut self,
        node_id: &str,
        value: Option<NodeValue>,
        timestamp: DateTime<Utc>,
    ) -> Option<NodeChange> {
        let record = self.nodes.get_mut(node_id)?;
        let old_value = std::mem::replace(&mut record.value, value.clone());
        record.updated_at = Some(timestamp);

        Some(NodeChange {
            node_id: node_id.to_string(),
            old_value,
            new_value: value,
            timestamp,
        })
    }
}
