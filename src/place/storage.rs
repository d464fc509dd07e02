use super::node::PlaceNode;
use crate::node::NodeValue;
use crate::site::{PlaceInfo, PlaceSize};

/// A physical place and the nodes installed in it, unique by node definition.
#[derive(Debug, Clone)]
pub struct PlaceStorage {
    pub place_id: String,
    pub place_name: String,
    place_size: Option<PlaceSize>,
    nodes: Vec<PlaceNode>,
}

impl PlaceStorage {
    pub fn new(info: &PlaceInfo) -> Self {
        Self {
            place_id: info.place_id.clone(),
            place_name: info.place_name.clone(),
            place_size: info.place_size,
            nodes: Vec::new(),
        }
    }

    /// Returns false when a node of the same definition is already present.
    pub fn add_place_node(&mut self, node: PlaceNode) -> bool {
        if self.get_place_node(&node.node_def_id).is_some() {
            return false;
        }
        self.nodes.push(node);
        true
    }

    pub fn get_place_node(&self, node_def_id: &str) -> Option<&PlaceNode> {
        self.nodes.iter().find(|node| node.node_def_id == node_def_id)
    }

    pub(crate) fn get_place_node_mut(&mut self, node_def_id: &str) -> Option<&mut PlaceNode> {
        self.nodes
            .iter_mut()
            .find(|node| node.node_def_id == node_def_id)
    }

    pub fn place_nodes(&self) -> &[PlaceNode] {
        &self.nodes
    }

    pub fn get_node_value(&self, node_def_id: &str) -> Option<&NodeValue> {
        self.get_place_node(node_def_id).and_then(PlaceNode::value)
    }

    /// Area in square meters, rounded to one decimal.
    pub fn square_meter(&self) -> Option<f64> {
        self.place_size
            .map(|size| (size.width * size.height / 10_000.0 * 10.0).round() / 10.0)
    }
}
