use super::{LeafId, ScenarioAction};
use crate::site::{ScenarioCmdInfo, ScenarioStep};
use serde::Serialize;

/// Resumable cursor over a synchronous container's children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepTracker {
    next: usize,
    current: Option<usize>,
    done: bool,
}

impl StepTracker {
    /// Advance to the next child index, or `None` once `len` is exhausted.
    pub fn next(&mut self, len: usize) -> Option<usize> {
        if self.next >= len {
            self.done = true;
            return None;
        }
        let idx = self.next;
        self.current = Some(idx);
        self.next += 1;
        Some(idx)
    }

    pub fn current(&self) -> Option<usize> {
        if self.done {
            None
        } else {
            self.current
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Leaf: one command dispatch.
#[derive(Debug, Clone)]
pub struct ScenarioCommand {
    leaf: LeafId,
    info: ScenarioCmdInfo,
    storage_uuid: Option<String>,
    cmd_id: Option<String>,
    dispatched: bool,
    is_clear: bool,
}

impl ScenarioCommand {
    pub fn new(leaf: LeafId, info: ScenarioCmdInfo) -> Self {
        Self {
            leaf,
            info,
            storage_uuid: None,
            cmd_id: None,
            dispatched: false,
            is_clear: false,
        }
    }

    pub fn leaf(&self) -> LeafId {
        self.leaf
    }

    pub fn info(&self) -> &ScenarioCmdInfo {
        &self.info
    }

    pub fn storage_uuid(&self) -> Option<&str> {
        self.storage_uuid.as_deref()
    }

    pub fn cmd_id(&self) -> Option<&str> {
        self.cmd_id.as_deref()
    }

    pub fn is_scenario_clear(&self) -> bool {
        self.is_clear
    }

    /// Dispatched, bound to a storage and not yet cleared.
    pub fn is_running(&self) -> bool {
        self.dispatched && !self.is_clear
    }
}

/// Container: a synchronous sequence or an asynchronous set.
#[derive(Debug, Clone)]
pub struct ScenarioStorage {
    is_sync: bool,
    children: Vec<ScenarioNode>,
    tracker: StepTracker,
    started: bool,
}

#[derive(Debug, Clone)]
pub enum ScenarioNode {
    Command(ScenarioCommand),
    Storage(ScenarioStorage),
}

/// What `running_scenario` reports for a container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunningView {
    /// Synchronous container: the index of the child in flight
    Step { index: usize, leaves: Vec<LeafId> },
    /// Asynchronous container: every child is in play
    All { leaves: Vec<LeafId> },
}

impl ScenarioStorage {
    pub fn new(is_sync: bool, children: Vec<ScenarioNode>) -> Self {
        Self {
            is_sync,
            children,
            tracker: StepTracker::default(),
            started: false,
        }
    }

    /// Build a tree from catalog entries. Leaves are numbered from
    /// `next_leaf` in declaration order; nested lists flip sync/async.
    pub fn build(steps: &[ScenarioStep], is_sync: bool, next_leaf: &mut u32) -> Self {
        let children = steps
            .iter()
            .map(|step| match step {
                ScenarioStep::Command(info) => {
                    let leaf = LeafId(*next_leaf);
                    *next_leaf += 1;
                    ScenarioNode::Command(ScenarioCommand::new(leaf, info.clone()))
                }
                ScenarioStep::Group(group) => {
                    ScenarioNode::Storage(ScenarioStorage::build(group, !is_sync, next_leaf))
                }
            })
            .collect();
        Self::new(is_sync, children)
    }

    pub fn is_sync(&self) -> bool {
        self.is_sync
    }

    pub fn children(&self) -> &[ScenarioNode] {
        &self.children
    }

    /// Start this container. Returns true when it is clear right away
    /// (nothing to run).
    pub fn execute(&mut self, scenario_uuid: &str, actions: &mut Vec<ScenarioAction>) -> bool {
        self.started = true;
        if self.is_sync {
            return self.run_next(scenario_uuid, actions);
        }

        let mut all_clear = true;
        for child in &mut self.children {
            if !child.execute(scenario_uuid, actions) {
                all_clear = false;
            }
        }
        all_clear
    }

    /// Dispatch the next synchronous step, skipping children that are clear
    /// on start. Returns true once the sequence is exhausted.
    fn run_next(&mut self, scenario_uuid: &str, actions: &mut Vec<ScenarioAction>) -> bool {
        while let Some(idx) = self.tracker.next(self.children.len()) {
            if !self.children[idx].execute(scenario_uuid, actions) {
                return false;
            }
        }
        true
    }

    pub fn is_scenario_clear(&self) -> bool {
        if !self.started {
            return false;
        }
        if self.is_sync {
            self.tracker.is_done()
        } else {
            self.children.iter().all(ScenarioNode::is_scenario_clear)
        }
    }

    /// A leaf's command finished. `None` when the leaf is not in flight in
    /// this subtree, otherwise whether this container is now clear.
    pub fn handle_leaf_clear(
        &mut self,
        leaf: LeafId,
        scenario_uuid: &str,
        actions: &mut Vec<ScenarioAction>,
    ) -> Option<bool> {
        if self.is_sync {
            let idx = self.tracker.current()?;
            let child_clear = self.children[idx].handle_leaf_clear(leaf, scenario_uuid, actions)?;
            if !child_clear {
                return Some(false);
            }
            return Some(self.run_next(scenario_uuid, actions));
        }

        let found = self
            .children
            .iter_mut()
            .find_map(|child| child.handle_leaf_clear(leaf, scenario_uuid, actions));
        found.map(|_| self.is_scenario_clear())
    }

    /// Remove the failing leaf from its parent. Returns the removed leaf.
    pub fn remove_leaf(&mut self, leaf: LeafId) -> Option<ScenarioCommand> {
        if let Some(pos) = self
            .children
            .iter()
            .position(|child| matches!(child, ScenarioNode::Command(cmd) if cmd.leaf == leaf))
        {
            if let ScenarioNode::Command(cmd) = self.children.remove(pos) {
                return Some(cmd);
            }
            return None;
        }
        self.children.iter_mut().find_map(|child| match child {
            ScenarioNode::Storage(storage) => storage.remove_leaf(leaf),
            ScenarioNode::Command(_) => None,
        })
    }

    pub fn bind_leaf(&mut self, leaf: LeafId, storage_uuid: &str, cmd_id: &str) -> bool {
        match self.leaf_mut(leaf) {
            Some(cmd) => {
                cmd.storage_uuid = Some(storage_uuid.to_string());
                cmd.cmd_id = Some(cmd_id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn leaf(&self, leaf: LeafId) -> Option<&ScenarioCommand> {
        self.children.iter().find_map(|child| match child {
            ScenarioNode::Command(cmd) if cmd.leaf == leaf => Some(cmd),
            ScenarioNode::Command(_) => None,
            ScenarioNode::Storage(storage) => storage.leaf(leaf),
        })
    }

    fn leaf_mut(&mut self, leaf: LeafId) -> Option<&mut ScenarioCommand> {
        self.children.iter_mut().find_map(|child| match child {
            ScenarioNode::Command(cmd) if cmd.leaf == leaf => Some(cmd),
            ScenarioNode::Command(_) => None,
            ScenarioNode::Storage(storage) => storage.leaf_mut(leaf),
        })
    }

    /// The running leaf whose command carries `cmd_id`.
    pub fn find_leaf_by_cmd_id(&self, cmd_id: &str) -> Option<LeafId> {
        self.collect_running()
            .into_iter()
            .find(|cmd| cmd.cmd_id.as_deref() == Some(cmd_id))
            .map(|cmd| cmd.leaf)
    }

    /// Every dispatched leaf still waiting on its command.
    pub fn collect_running(&self) -> Vec<&ScenarioCommand> {
        let mut running = Vec::new();
        self.collect_into(&mut running);
        running
    }

    fn collect_into<'a>(&'a self, out: &mut Vec<&'a ScenarioCommand>) {
        for child in &self.children {
            match child {
                ScenarioNode::Command(cmd) if cmd.is_running() => out.push(cmd),
                ScenarioNode::Command(_) => {}
                ScenarioNode::Storage(storage) => storage.collect_into(out),
            }
        }
    }

    pub fn running_scenario(&self) -> RunningView {
        if self.is_sync {
            let index = self.tracker.current().unwrap_or(self.children.len());
            let leaves = self
                .children
                .get(index)
                .map(ScenarioNode::leaves)
                .unwrap_or_default();
            RunningView::Step { index, leaves }
        } else {
            RunningView::All {
                leaves: self.children.iter().flat_map(ScenarioNode::leaves).collect(),
            }
        }
    }
}

impl ScenarioNode {
    fn execute(&mut self, scenario_uuid: &str, actions: &mut Vec<ScenarioAction>) -> bool {
        match self {
            ScenarioNode::Command(cmd) => {
                if cmd.dispatched {
                    return cmd.is_clear;
                }
                cmd.dispatched = true;
                actions.push(ScenarioAction::Dispatch {
                    scenario_uuid: scenario_uuid.to_string(),
                    leaf: cmd.leaf,
                    info: cmd.info.clone(),
                });
                false
            }
            ScenarioNode::Storage(storage) => storage.execute(scenario_uuid, actions),
        }
    }

    pub fn is_scenario_clear(&self) -> bool {
        match self {
            ScenarioNode::Command(cmd) => cmd.is_clear,
            ScenarioNode::Storage(storage) => storage.is_scenario_clear(),
        }
    }

    fn handle_leaf_clear(
        &mut self,
        leaf: LeafId,
        scenario_uuid: &str,
        actions: &mut Vec<ScenarioAction>,
    ) -> Option<bool> {
        match self {
            ScenarioNode::Command(cmd) if cmd.leaf == leaf && cmd.is_running() => {
                cmd.is_clear = true;
                Some(true)
            }
            ScenarioNode::Command(_) => None,
            ScenarioNode::Storage(storage) => storage.handle_leaf_clear(leaf, scenario_uuid, actions),
        }
    }

    fn leaves(&self) -> Vec<LeafId> {
        match self {
            ScenarioNode::Command(cmd) => vec![cmd.leaf],
            ScenarioNode::Storage(storage) => {
                storage.children.iter().flat_map(ScenarioNode::leaves).collect()
            }
        }
    }
}
