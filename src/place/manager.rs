use super::node::{PlaceNode, PlaceNodeStatus};
use super::storage::PlaceStorage;
use crate::node::{NodeObserver, NodeStore, NodeUpdateDistributor, NodeValue};
use crate::site::{PlaceRank, SiteMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Published whenever a place node takes a new reading
#[derive(Debug, Clone, Serialize)]
pub struct PlaceNodeUpdate {
    pub place_id: String,
    pub node_id: String,
    pub node_def_id: String,
    pub value: Option<NodeValue>,
    pub status: PlaceNodeStatus,
    pub timestamp: DateTime<Utc>,
}

/// Registry of place storages keyed by place id.
#[derive(Debug, Default)]
pub struct PlaceManager {
    storages: Vec<PlaceStorage>,
    index: HashMap<String, usize>,
}

impl PlaceManager {
    /// Build the place graph from the site relations and subscribe every
    /// place node to its sensor.
    pub fn build(
        site: &SiteMap,
        nodes: &NodeStore,
        distributor: &mut NodeUpdateDistributor,
    ) -> Self {
        let mut manager = Self::default();

        for relation in &site.place_relations {
            let Some(place_info) = site.places.iter().find(|p| p.place_id == relation.place_id)
            else {
                warn!(place_id = %relation.place_id, "Skipping relation: unknown place");
                continue;
            };
            let Some(record) = nodes.get(&relation.node_id) else {
                warn!(node_id = %relation.node_id, "Skipping relation: unknown node");
                continue;
            };

            let idx = match manager.index.get(&relation.place_id) {
                Some(&idx) => idx,
                None => {
                    manager.storages.push(PlaceStorage::new(place_info));
                    let idx = manager.storages.len() - 1;
                    manager.index.insert(relation.place_id.clone(), idx);
                    idx
                }
            };

            let config = place_info
                .threshold_configs
                .iter()
                .find(|cfg| cfg.node_def_id == record.info.node_def_id);
            let node = PlaceNode::new(&relation.place_id, record, config);
            let node_def_id = node.node_def_id.clone();

            let storage = &mut manager.storages[idx];
            if !storage.add_place_node(node) {
                continue;
            }

            let handle = distributor.attach(
                &relation.node_id,
                NodeObserver::Place {
                    place_id: relation.place_id.clone(),
                    node_def_id: node_def_id.clone(),
                },
                false,
            );
            if let Some(place_node) = storage.get_place_node_mut(&node_def_id) {
                place_node.handle = handle;
            }
        }

        info!(places = manager.storages.len(), "Place graph built");
        manager
    }

    pub fn find_place(&self, place_id: &str) -> Option<&PlaceStorage> {
        self.index.get(place_id).map(|&idx| &self.storages[idx])
    }

    pub fn place_storages(&self) -> &[PlaceStorage] {
        &self.storages
    }

    pub fn get_place_node(&self, place_id: &str, node_def_id: &str) -> Option<&PlaceNode> {
        self.find_place(place_id)?.get_place_node(node_def_id)
    }

    /// Places that contain the given node.
    pub fn places_for_node(&self, node_id: &str) -> Vec<&PlaceStorage> {
        self.storages
            .iter()
            .filter(|storage| storage.place_nodes().iter().any(|n| n.node_id == node_id))
            .collect()
    }

    /// Pull the latest value for one place node from the node table.
    pub fn handle_node_update(
        &mut self,
        place_id: &str,
        node_def_id: &str,
        nodes: &NodeStore,
    ) -> Option<PlaceNodeUpdate> {
        let idx = *self.index.get(place_id)?;
        let place_node = self.storages[idx].get_place_node_mut(node_def_id)?;
        let record = nodes.get(&place_node.node_id)?;

        let status = place_node.update(record.value.clone(), record.updated_at);
        Some(PlaceNodeUpdate {
            place_id: place_id.to_string(),
            node_id: place_node.node_id.clone(),
            node_def_id: node_def_id.to_string(),
            value: record.value.clone(),
            status,
            timestamp: record.updated_at.unwrap_or_else(Utc::now),
        })
    }

    /// Force recomputation of one place node, or every node of the place.
    pub fn reload_place(
        &mut self,
        place_id: &str,
        node_def_id: Option<&str>,
        nodes: &NodeStore,
    ) -> Vec<PlaceNodeUpdate> {
        let defs: Vec<String> = match (node_def_id, self.find_place(place_id)) {
            (Some(def), Some(_)) => vec![def.to_string()],
            (None, Some(storage)) => storage
                .place_nodes()
                .iter()
                .map(|n| n.node_def_id.clone())
                .collect(),
            (_, None) => return Vec::new(),
        };

        defs.iter()
            .filter_map(|def| self.handle_node_update(place_id, def, nodes))
            .collect()
    }

    /// Candidate source places for a place node, resolved in rank order.
    pub fn call_place_ranks(&self, place_id: &str, node_def_id: &str) -> Vec<Vec<&PlaceStorage>> {
        self.get_place_node(place_id, node_def_id)
            .map(|node| self.resolve_ranks(node.call_place_rank_list()))
            .unwrap_or_default()
    }

    /// Candidate destination places for a place node, resolved in rank order.
    pub fn put_place_ranks(&self, place_id: &str, node_def_id: &str) -> Vec<Vec<&PlaceStorage>> {
        self.get_place_node(place_id, node_def_id)
            .map(|node| self.resolve_ranks(node.put_place_rank_list()))
            .unwrap_or_default()
    }

    pub fn group_places(&self, place_id: &str, node_def_id: &str) -> Vec<&PlaceStorage> {
        self.get_place_node(place_id, node_def_id)
            .map(|node| {
                node.group_place_list()
                    .iter()
                    .filter_map(|id| self.find_place(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn resolve_ranks(&self, ranks: &[PlaceRank]) -> Vec<Vec<&PlaceStorage>> {
        ranks
            .iter()
            .map(|rank| {
                rank.place_ids()
                    .into_iter()
                    .filter_map(|id| self.find_place(id))
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect()
    }
}
