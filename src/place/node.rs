use crate::node::{NodeRecord, NodeValue, ObserverHandle};
use crate::site::{PlaceRank, ThresholdBand, ThresholdConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Threshold status of a place node, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaceNodeStatus {
    Unknown,
    Normal,
    MaxOver,
    UpperLimitOver,
    MinUnder,
    LowerLimitUnder,
}

/// A node as seen from one place, with that place's thresholds.
#[derive(Debug, Clone)]
pub struct PlaceNode {
    pub place_id: String,
    pub node_id: String,
    pub node_name: String,
    pub node_def_id: String,
    pub node_class_id: String,
    value: Option<NodeValue>,
    updated_at: Option<DateTime<Utc>>,
    status: PlaceNodeStatus,
    max_value: Option<ThresholdBand>,
    upper_limit_value: Option<ThresholdBand>,
    set_value: Option<ThresholdBand>,
    lower_limit_value: Option<ThresholdBand>,
    min_value: Option<ThresholdBand>,
    call_place_rank_list: Vec<PlaceRank>,
    put_place_rank_list: Vec<PlaceRank>,
    group_place_list: Vec<String>,
    pub(crate) handle: Option<ObserverHandle>,
}

impl PlaceNode {
    pub fn new(place_id: &str, record: &NodeRecord, config: Option<&ThresholdConfig>) -> Self {
        let config = config.cloned().unwrap_or_default();
        let mut node = Self {
            place_id: place_id.to_string(),
            node_id: record.info.node_id.clone(),
            node_name: record.info.node_name.clone(),
            node_def_id: record.info.node_def_id.clone(),
            node_class_id: record.info.node_class_id.clone(),
            value: None,
            updated_at: None,
            status: PlaceNodeStatus::Unknown,
            max_value: config.max_value,
            upper_limit_value: config.upper_limit_value,
            set_value: config.set_value,
            lower_limit_value: config.lower_limit_value,
            min_value: config.min_value,
            call_place_rank_list: config.call_place_rank_list,
            put_place_rank_list: config.put_place_rank_list,
            group_place_list: config.group_place_list,
            handle: None,
        };
        node.update(record.value.clone(), record.updated_at);
        node
    }

    /// Take a new reading and recompute the status.
    pub fn update(
        &mut self,
        value: Option<NodeValue>,
        at: Option<DateTime<Utc>>,
    ) -> PlaceNodeStatus {
        self.status = match value.as_ref().and_then(NodeValue::as_number) {
            Some(n) => self.classify(n),
            None => PlaceNodeStatus::Unknown,
        };
        self.value = value;
        self.updated_at = at;
        self.status
    }

    fn classify(&self, data: f64) -> PlaceNodeStatus {
        if above(self.max_value, data) {
            PlaceNodeStatus::MaxOver
        } else if above(self.upper_limit_value, data) {
            PlaceNodeStatus::UpperLimitOver
        } else if below(self.min_value, data) {
            PlaceNodeStatus::MinUnder
        } else if below(self.lower_limit_value, data) {
            PlaceNodeStatus::LowerLimitUnder
        } else {
            PlaceNodeStatus::Normal
        }
    }

    pub fn value(&self) -> Option<&NodeValue> {
        self.value.as_ref()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn status(&self) -> PlaceNodeStatus {
        self.status
    }

    pub fn max_value(&self) -> Option<f64> {
        self.max_value.map(|band| band.value)
    }

    pub fn upper_limit_value(&self) -> Option<f64> {
        self.upper_limit_value.map(|band| band.value)
    }

    pub fn set_value(&self) -> Option<f64> {
        self.set_value.map(|band| band.value)
    }

    pub fn lower_limit_value(&self) -> Option<f64> {
        self.lower_limit_value.map(|band| band.value)
    }

    pub fn min_value(&self) -> Option<f64> {
        self.min_value.map(|band| band.value)
    }

    pub fn call_place_rank_list(&self) -> &[PlaceRank] {
        &self.call_place_rank_list
    }

    pub fn put_place_rank_list(&self) -> &[PlaceRank] {
        &self.put_place_rank_list
    }

    /// Places managed together with this node's place. Defaults to the
    /// node's own place.
    pub fn group_place_list(&self) -> Vec<String> {
        if self.group_place_list.is_empty() {
            vec![self.place_id.clone()]
        } else {
            self.group_place_list.clone()
        }
    }
}

fn above(band: Option<ThresholdBand>, data: f64) -> bool {
    match band {
        Some(ThresholdBand { value, is_inclusion_goal: true }) => data >= value,
        Some(ThresholdBand { value, is_inclusion_goal: false }) => data > value,
        None => false,
    }
}

fn below(band: Option<ThresholdBand>, data: f64) -> bool {
    match band {
        Some(ThresholdBand { value, is_inclusion_goal: true }) => data <= value,
        Some(ThresholdBand { value, is_inclusion_goal: false }) => data < value,
        None => false,
    }
}
