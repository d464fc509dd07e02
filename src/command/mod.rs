pub mod context;
pub mod element;
pub mod storage;
pub mod threshold;

pub use context::{CommandContext, CommandSettings, DeferredTask, StepNotice, TaskQueue, TimerId, TimerOwner, TimerQueue};
pub use element::{CommandElement, ElementStep, ExecuteCmdInfo};
pub use storage::{CancelOutcome, CommandStorage, CommandSummary, ElementSummary};
pub use threshold::{ExpressionEngine, ThresholdGoal, ThresholdStorage};

use crate::node::NodeValue;
use crate::scenario::LeafId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command priorities. Lower wins.
pub mod rank {
    pub const EMERGENCY: u32 = 0;
    pub const FIRST: u32 = 1;
    pub const SECOND: u32 = 2;
    pub const THIRD: u32 = 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandFormat {
    Measure,
    Single,
    Set,
    Flow,
    Scenario,
}

impl CommandFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandFormat::Measure => "MEASURE",
            CommandFormat::Single => "SINGLE",
            CommandFormat::Set => "SET",
            CommandFormat::Flow => "FLOW",
            CommandFormat::Scenario => "SCENARIO",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    #[default]
    Control,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlType {
    False,
    True,
    Measure,
    Set,
}

impl ControlType {
    /// TRUE and FALSE oppose each other; other controls have no opposite.
    pub fn opposite(self) -> Option<ControlType> {
        match self {
            ControlType::True => Some(ControlType::False),
            ControlType::False => Some(ControlType::True),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlType::False => "FALSE",
            ControlType::True => "TRUE",
            ControlType::Measure => "MEASURE",
            ControlType::Set => "SET",
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a command storage:
/// `WAIT -> PROCEED -> COMPLETE -> [RUNNING] -> [CANCELING -> RESTORE] -> END`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStep {
    Wait,
    Proceed,
    Complete,
    Running,
    Canceling,
    Restore,
    End,
}

impl CommandStep {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStep::Wait => "WAIT",
            CommandStep::Proceed => "PROCEED",
            CommandStep::Complete => "COMPLETE",
            CommandStep::Running => "RUNNING",
            CommandStep::Canceling => "CANCELING",
            CommandStep::Restore => "RESTORE",
            CommandStep::End => "END",
        }
    }
}

impl fmt::Display for CommandStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalRange {
    Lower,
    Equal,
    Upper,
}

/// Goal expression over several nodes. Every node in `node_list` is bound by
/// its id inside the expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionInfo {
    pub expression: String,
    pub node_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalData {
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub goal_value: Option<NodeValue>,
    pub goal_range: GoalRange,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub is_inclusion_goal: bool,
    /// Reaching this goal alone clears the whole threshold.
    #[serde(default)]
    pub is_complete_clear: bool,
    #[serde(default)]
    pub expression: Option<ExpressionInfo>,
}

/// Goal constraints attached to a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalInfo {
    #[serde(default)]
    pub goal_data_list: Vec<GoalData>,
    /// Time limit in units of `limit_time_unit_ms`.
    #[serde(default)]
    pub limit_time_sec: Option<f64>,
}

impl GoalInfo {
    pub fn is_empty(&self) -> bool {
        self.goal_data_list.is_empty() && self.limit_time_sec.is_none()
    }
}

/// One group of devices in a request, all driven to the same control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReqCmdEle {
    pub control_type: ControlType,
    #[serde(default)]
    pub set_value: Option<NodeValue>,
    pub search_ids: Vec<String>,
}

/// An operator request before refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReqCommandInfo {
    pub format: CommandFormat,
    #[serde(default)]
    pub cmd_type: CommandType,
    pub cmd_id: String,
    #[serde(default)]
    pub cmd_name: String,
    #[serde(default = "default_rank")]
    pub rank: u32,
    #[serde(default)]
    pub src_place_id: Option<String>,
    #[serde(default)]
    pub dest_place_id: Option<String>,
    #[serde(default)]
    pub elements: Vec<ReqCmdEle>,
    #[serde(default)]
    pub goal: Option<GoalInfo>,
}

fn default_rank() -> u32 {
    rank::SECOND
}

impl ReqCommandInfo {
    pub fn new(format: CommandFormat, cmd_id: impl Into<String>, cmd_name: impl Into<String>) -> Self {
        Self {
            format,
            cmd_type: CommandType::Control,
            cmd_id: cmd_id.into(),
            cmd_name: cmd_name.into(),
            rank: rank::SECOND,
            src_place_id: None,
            dest_place_id: None,
            elements: Vec::new(),
            goal: None,
        }
    }

    pub fn with_element(mut self, control_type: ControlType, search_ids: &[&str]) -> Self {
        self.elements.push(ReqCmdEle {
            control_type,
            set_value: None,
            search_ids: search_ids.iter().map(|id| id.to_string()).collect(),
        });
        self
    }

    pub fn with_type(mut self, cmd_type: CommandType) -> Self {
        self.cmd_type = cmd_type;
        self
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_goal(mut self, goal: GoalInfo) -> Self {
        self.goal = Some(goal);
        self
    }
}

/// A single device target after refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerCmd {
    pub node_id: String,
    pub control_type: ControlType,
    pub set_value: Option<NodeValue>,
    /// Kept in the command but never dispatched.
    pub ignore: bool,
}

impl ContainerCmd {
    pub fn new(node_id: impl Into<String>, control_type: ControlType) -> Self {
        Self {
            node_id: node_id.into(),
            control_type,
            set_value: None,
            ignore: false,
        }
    }
}

/// A refined request: one container per device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandWrapInfo {
    pub format: CommandFormat,
    pub cmd_type: CommandType,
    pub cmd_id: String,
    pub cmd_name: String,
    pub rank: u32,
    pub src_place_id: Option<String>,
    pub dest_place_id: Option<String>,
    pub goal: Option<GoalInfo>,
    pub containers: Vec<ContainerCmd>,
}

impl CommandWrapInfo {
    pub fn from_request(req: &ReqCommandInfo, containers: Vec<ContainerCmd>) -> Self {
        Self {
            format: req.format,
            cmd_type: req.cmd_type,
            cmd_id: req.cmd_id.clone(),
            cmd_name: req.cmd_name.clone(),
            rank: req.rank,
            src_place_id: req.src_place_id.clone(),
            dest_place_id: req.dest_place_id.clone(),
            goal: req.goal.clone(),
            containers,
        }
    }

    /// Rebuild the originating request, keeping the elements.
    pub fn to_request(&self) -> ReqCommandInfo {
        ReqCommandInfo {
            format: self.format,
            cmd_type: self.cmd_type,
            cmd_id: self.cmd_id.clone(),
            cmd_name: self.cmd_name.clone(),
            rank: self.rank,
            src_place_id: self.src_place_id.clone(),
            dest_place_id: self.dest_place_id.clone(),
            elements: self
                .containers
                .iter()
                .map(|c| ReqCmdEle {
                    control_type: c.control_type,
                    set_value: c.set_value.clone(),
                    search_ids: vec![c.node_id.clone()],
                })
                .collect(),
            goal: self.goal.clone(),
        }
    }
}

/// Who hears about a storage's step transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepObserver {
    /// The command manager itself (MEASURE commands)
    Manager,
    /// The active command strategy
    Strategy,
    /// A scenario leaf waiting on this command
    ScenarioLeaf { scenario_uuid: String, leaf: LeafId },
}

/// Broadcast on every command step transition
#[derive(Debug, Clone, Serialize)]
pub struct CommandStepUpdate {
    pub uuid: String,
    pub cmd_id: String,
    pub cmd_name: String,
    pub format: CommandFormat,
    pub cmd_type: CommandType,
    pub step: CommandStep,
    pub timestamp: DateTime<Utc>,
}

/// Storage selector. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct StorageFilter {
    pub uuid: Option<String>,
    pub cmd_id: Option<String>,
    pub format: Option<CommandFormat>,
    pub cmd_type: Option<CommandType>,
    pub step: Option<CommandStep>,
    pub src_place_id: Option<String>,
    pub dest_place_id: Option<String>,
}

impl StorageFilter {
    pub fn by_cmd_id(cmd_id: impl Into<String>) -> Self {
        Self {
            cmd_id: Some(cmd_id.into()),
            ..Default::default()
        }
    }

    pub fn by_uuid(uuid: impl Into<String>) -> Self {
        Self {
            uuid: Some(uuid.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, storage: &CommandStorage) -> bool {
        let wrap = storage.wrap_info();
        self.uuid.as_deref().map_or(true, |u| u == storage.uuid())
            && self.cmd_id.as_deref().map_or(true, |id| id == wrap.cmd_id)
            && self.format.map_or(true, |f| f == wrap.format)
            && self.cmd_type.map_or(true, |t| t == wrap.cmd_type)
            && self.step.map_or(true, |s| Some(s) == storage.step())
            && self
                .src_place_id
                .as_deref()
                .map_or(true, |p| wrap.src_place_id.as_deref() == Some(p))
            && self
                .dest_place_id
                .as_deref()
                .map_or(true, |p| wrap.dest_place_id.as_deref() == Some(p))
    }
}

/// Element selector. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct ElementFilter {
    pub uuid: Option<String>,
    pub node_id: Option<String>,
    pub control_type: Option<ControlType>,
    pub is_live: Option<bool>,
    pub is_ignore: Option<bool>,
}

impl ElementFilter {
    pub fn live_on(node_id: impl Into<String>, control_type: ControlType) -> Self {
        Self {
            node_id: Some(node_id.into()),
            control_type: Some(control_type),
            is_live: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, element: &CommandElement) -> bool {
        self.uuid.as_deref().map_or(true, |u| u == element.uuid)
            && self.node_id.as_deref().map_or(true, |n| n == element.node_id)
            && self.control_type.map_or(true, |c| c == element.control_type)
            && self.is_live.map_or(true, |l| l == element.is_live)
            && self.is_ignore.map_or(true, |i| i == element.is_ignore)
    }
}

#[cfg(test)]
mod tests;
