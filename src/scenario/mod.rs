pub mod storage;

pub use storage::{RunningView, ScenarioCommand, ScenarioNode, ScenarioStorage, StepTracker};

use crate::error::CommandError;
use crate::site::{ScenarioCmdInfo, ScenarioInfo, ScenarioStep};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Identifies one leaf inside a running scenario tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LeafId(pub u32);

/// Side effects the engine carries out on behalf of the scenario tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioAction {
    /// Issue the leaf's command
    Dispatch {
        scenario_uuid: String,
        leaf: LeafId,
        info: ScenarioCmdInfo,
    },
    /// Withdraw a leaf's command with nothing to restore
    Cancel {
        scenario_uuid: String,
        storage_uuid: String,
        leaf: LeafId,
    },
    /// Every step cleared
    Finished { scenario_uuid: String, cmd_id: String },
    /// Stopped by a failure or a cancel request
    Aborted { scenario_uuid: String, cmd_id: String },
}

#[derive(Debug)]
pub struct RunningScenario {
    pub uuid: String,
    pub cmd_id: String,
    pub cmd_name: String,
    pub root: ScenarioStorage,
}

/// Runs at most one scenario at a time.
#[derive(Debug, Default)]
pub struct ScenarioManager {
    running: Option<RunningScenario>,
}

/// Repeat the step list `count` times. A zero count runs it once.
fn repeat_steps(info: &ScenarioInfo) -> Vec<ScenarioStep> {
    let count = info.scenario_count.max(1) as usize;
    let mut steps = Vec::with_capacity(info.scenario_list.len() * count);
    for _ in 0..count {
        steps.extend(info.scenario_list.iter().cloned());
    }
    steps
}

impl ScenarioManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> Option<&RunningScenario> {
        self.running.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Build the tree for `info` and dispatch its first steps.
    pub fn start(&mut self, info: &ScenarioInfo) -> Result<(String, Vec<ScenarioAction>), CommandError> {
        if let Some(running) = &self.running {
            return Err(CommandError::ScenarioRunning {
                cmd_id: running.cmd_id.clone(),
            });
        }

        let uuid = Uuid::now_v7().to_string();
        let mut next_leaf = 0;
        let mut root = ScenarioStorage::build(&repeat_steps(info), true, &mut next_leaf);
        info!(cmd_id = %info.cmd_id, uuid = %uuid, leaves = next_leaf, "Scenario started");

        let mut actions = Vec::new();
        if root.execute(&uuid, &mut actions) {
            actions.push(ScenarioAction::Finished {
                scenario_uuid: uuid.clone(),
                cmd_id: info.cmd_id.clone(),
            });
            return Ok((uuid, actions));
        }

        self.running = Some(RunningScenario {
            uuid: uuid.clone(),
            cmd_id: info.cmd_id.clone(),
            cmd_name: info.cmd_name.clone(),
            root,
        });
        Ok((uuid, actions))
    }

    /// Stop the running scenario. Every leaf still in flight is withdrawn.
    pub fn cancel(&mut self, cmd_id: &str) -> Result<Vec<ScenarioAction>, CommandError> {
        match &self.running {
            Some(running) if running.cmd_id == cmd_id => {}
            _ => {
                return Err(CommandError::ScenarioNotRunning {
                    cmd_id: cmd_id.to_string(),
                })
            }
        }
        let mut actions = Vec::new();
        self.abort(&mut actions);
        Ok(actions)
    }

    fn abort(&mut self, actions: &mut Vec<ScenarioAction>) {
        let Some(running) = self.running.take() else {
            return;
        };
        for cmd in running.root.collect_running() {
            if let Some(storage_uuid) = cmd.storage_uuid() {
                actions.push(ScenarioAction::Cancel {
                    scenario_uuid: running.uuid.clone(),
                    storage_uuid: storage_uuid.to_string(),
                    leaf: cmd.leaf(),
                });
            }
        }
        info!(cmd_id = %running.cmd_id, uuid = %running.uuid, "Scenario aborted");
        actions.push(ScenarioAction::Aborted {
            scenario_uuid: running.uuid,
            cmd_id: running.cmd_id,
        });
    }

    fn current_mut(&mut self, scenario_uuid: &str) -> Option<&mut RunningScenario> {
        self.running.as_mut().filter(|running| running.uuid == scenario_uuid)
    }

    pub fn bind_leaf(&mut self, scenario_uuid: &str, leaf: LeafId, storage_uuid: &str, cmd_id: &str) -> bool {
        self.current_mut(scenario_uuid)
            .map_or(false, |running| running.root.bind_leaf(leaf, storage_uuid, cmd_id))
    }

    /// A leaf's command reached COMPLETE or END.
    pub fn on_leaf_clear(&mut self, scenario_uuid: &str, leaf: LeafId) -> Vec<ScenarioAction> {
        let mut actions = Vec::new();
        let Some(running) = self.current_mut(scenario_uuid) else {
            return actions;
        };

        let uuid = running.uuid.clone();
        match running.root.handle_leaf_clear(leaf, &uuid, &mut actions) {
            Some(true) => {
                if let Some(running) = self.running.take() {
                    info!(cmd_id = %running.cmd_id, uuid = %running.uuid, "Scenario finished");
                    actions.push(ScenarioAction::Finished {
                        scenario_uuid: running.uuid,
                        cmd_id: running.cmd_id,
                    });
                }
            }
            Some(false) => {}
            None => warn!(uuid = %uuid, leaf = ?leaf, "Clear for a leaf that is not in flight"),
        }
        actions
    }

    /// A leaf's command could not be issued. The leaf is dropped and the whole
    /// scenario stops, withdrawing siblings already in flight.
    pub fn on_leaf_fail(&mut self, scenario_uuid: &str, leaf: LeafId, reason: &CommandError) -> Vec<ScenarioAction> {
        let mut actions = Vec::new();
        let Some(running) = self.current_mut(scenario_uuid) else {
            return actions;
        };

        warn!(cmd_id = %running.cmd_id, leaf = ?leaf, error = %reason, "Scenario step failed");
        running.root.remove_leaf(leaf);
        self.abort(&mut actions);
        actions
    }

    /// Mark the running leaf that issued `cmd_id` as cleared.
    pub fn update_scenario_clear(&mut self, cmd_id: &str) -> Vec<ScenarioAction> {
        let Some(running) = &self.running else {
            return Vec::new();
        };
        let Some(leaf) = running.root.find_leaf_by_cmd_id(cmd_id) else {
            return Vec::new();
        };
        let uuid = running.uuid.clone();
        self.on_leaf_clear(&uuid, leaf)
    }

    pub fn running_scenario(&self) -> Option<RunningView> {
        self.running.as_ref().map(|running| running.root.running_scenario())
    }
}
