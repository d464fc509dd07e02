use super::threshold::ExpressionEngine;
use super::{CommandStepUpdate, StepObserver};
use crate::device::DeviceBoundary;
use crate::node::{NodeStore, NodeUpdateDistributor};
use crate::site::{ControlIdentityTable, SiteMap};
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

/// Command knobs resolved from configuration
#[derive(Debug, Clone)]
pub struct CommandSettings {
    /// Mark devices already in the requested state as ignored
    pub skip_same_state: bool,
    /// Real duration of one `limit_time_sec` unit
    pub limit_time_unit: Duration,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            skip_same_state: true,
            limit_time_unit: Duration::from_millis(1000),
        }
    }
}

/// A step transition waiting to be routed. The observer list is captured at
/// emission time so observers still hear about storages evicted meanwhile.
#[derive(Debug, Clone)]
pub struct StepNotice {
    pub update: CommandStepUpdate,
    pub observers: Vec<StepObserver>,
}

/// Work that must run after the current operation returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTask {
    /// First dispatch of a freshly registered storage
    Dispatch(String),
    /// Completion check for a storage with nothing to dispatch
    Clear(String),
    /// Rebuild and dispatch a storage's restore list
    Restore(String),
}

/// Explicit event queue. Notices drain before deferred tasks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    notices: VecDeque<StepNotice>,
    deferred: VecDeque<DeferredTask>,
}

impl TaskQueue {
    pub fn notify(&mut self, notice: StepNotice) {
        self.notices.push_back(notice);
    }

    pub fn defer(&mut self, task: DeferredTask) {
        self.deferred.push_back(task);
    }

    pub fn pop_notice(&mut self) -> Option<StepNotice> {
        self.notices.pop_front()
    }

    pub fn pop_deferred(&mut self) -> Option<DeferredTask> {
        self.deferred.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty() && self.deferred.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerOwner {
    Threshold { storage_uuid: String },
}

/// Deadlines for goal time limits. The engine fires them from `advance_timers`.
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: BTreeMap<TimerId, (Instant, TimerOwner)>,
    next_id: u64,
}

impl TimerQueue {
    pub fn schedule(&mut self, delay: Duration, owner: TimerOwner) -> TimerId {
        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64));
        self.schedule_at(deadline, owner)
    }

    pub fn schedule_at(&mut self, deadline: Instant, owner: TimerOwner) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, (deadline, owner));
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|(deadline, _)| *deadline).min()
    }

    /// Remove and return every owner whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerOwner> {
        let mut due: Vec<(Instant, TimerId)> = self
            .entries
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(id, (deadline, _))| (*deadline, *id))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, id)| self.entries.remove(&id).map(|(_, owner)| owner))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a command storage touches outside itself.
pub struct CommandContext {
    pub device: Box<dyn DeviceBoundary>,
    pub nodes: NodeStore,
    pub distributor: NodeUpdateDistributor,
    pub timers: TimerQueue,
    pub tasks: TaskQueue,
    pub expressions: ExpressionEngine,
    pub identities: ControlIdentityTable,
    pub settings: CommandSettings,
}

impl CommandContext {
    pub fn new(
        site: &SiteMap,
        device: Box<dyn DeviceBoundary>,
        settings: CommandSettings,
        expressions: ExpressionEngine,
    ) -> Self {
        let nodes = NodeStore::new(&site.nodes);
        let distributor = NodeUpdateDistributor::new(&nodes);
        Self {
            device,
            nodes,
            distributor,
            timers: TimerQueue::default(),
            tasks: TaskQueue::default(),
            expressions,
            identities: ControlIdentityTable::from_site(site),
            settings,
        }
    }
}
