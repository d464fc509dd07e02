use super::{NodeChange, NodeStore, NodeUpdate};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Token returned by `attach`, used to detach exactly that registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverHandle(u64);

/// Who gets told when a node changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeObserver {
    Place {
        place_id: String,
        node_def_id: String,
    },
    Goal {
        storage_uuid: String,
        goal_index: usize,
    },
}

#[derive(Debug, Clone)]
struct Registration {
    handle: ObserverHandle,
    observer: NodeObserver,
}

/// A pending notification produced by `notify`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub node_id: String,
    pub observer: NodeObserver,
}

/// Per-node observer lists. One updator exists per node id.
#[derive(Debug, Default)]
pub struct NodeUpdateDistributor {
    updators: HashMap<String, Vec<Registration>>,
    handles: HashMap<ObserverHandle, String>,
    next_handle: u64,
}

impl NodeUpdateDistributor {
    pub fn new(nodes: &NodeStore) -> Self {
        let mut distributor = Self::default();
        for record in nodes.nodes.values() {
            distributor.register_node(&record.info.node_id);
        }
        distributor
    }

    pub fn register_node(&mut self, node_id: &str) {
        self.updators.entry(node_id.to_string()).or_default();
    }

    /// Attach an observer. Attaching an observer that is already registered
    /// for the node returns the existing handle. `at_head` puts the observer
    /// in front of everything already attached.
    ///
    /// Returns `None` when the node has no updator.
    pub fn attach(
        &mut self,
        node_id: &str,
        observer: NodeObserver,
        at_head: bool,
    ) -> Option<ObserverHandle> {
        let Some(list) = self.updators.get_mut(node_id) else {
            warn!(node_id = %node_id, "Cannot attach observer: unknown node");
            return None;
        };

        if let Some(existing) = list.iter().find(|reg| reg.observer == observer) {
            return Some(existing.handle);
        }

        let handle = ObserverHandle(self.next_handle);
        self.next_handle += 1;

        let registration = Registration { handle, observer };
        if at_head {
            list.insert(0, registration);
        } else {
            list.push(registration);
        }
        self.handles.insert(handle, node_id.to_string());

        Some(handle)
    }

    pub fn detach(&mut self, handle: ObserverHandle) -> bool {
        let Some(node_id) = self.handles.remove(&handle) else {
            return false;
        };
        match self.updators.get_mut(&node_id) {
            Some(list) => {
                let before = list.len();
                list.retain(|reg| reg.handle != handle);
                list.len() != before
            }
            None => false,
        }
    }

    pub fn observer_count(&self, node_id: &str) -> usize {
        self.updators.get(node_id).map(Vec::len).unwrap_or(0)
    }

    pub fn observers(&self, node_id: &str) -> Vec<NodeObserver> {
        self.updators
            .get(node_id)
            .map(|list| list.iter().map(|reg| reg.observer.clone()).collect())
            .unwrap_or_default()
    }

    /// Total registrations matching a predicate, across all nodes.
    pub fn count_where(&self, predicate: impl Fn(&NodeObserver) -> bool) -> usize {
        self.updators
            .values()
            .flat_map(|list| list.iter())
            .filter(|reg| predicate(&reg.observer))
            .count()
    }

    /// Write each update into the node table and collect the deliveries in
    /// node order, then observer order. The observer list is snapshotted per
    /// node before delivery, so detaching during handling is safe.
    pub fn notify(
        &self,
        nodes: &mut NodeStore,
        updates: Vec<NodeUpdate>,
    ) -> (Vec<NodeChange>, Vec<Delivery>) {
        let now = Utc::now();
        let mut changes = Vec::with_capacity(updates.len());
        let mut deliveries = Vec::new();

        for update in updates {
            let Some(change) = nodes.write(&update.node_id, update.value, now) else {
                debug!(node_id = %update.node_id, "Ignoring update for unknown node");
                continue;
            };
            changes.push(change);

            let Some(list) = self.updators.get(&update.node_id) else {
                continue;
            };
            deliveries.extend(list.iter().map(|reg| Delivery {
                node_id: update.node_id.clone(),
                observer: reg.observer.clone(),
            }));
        }

        (changes, deliveries)
    }
}
