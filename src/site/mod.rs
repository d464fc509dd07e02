pub mod validation;
pub use validation::{validate_site_map, SiteError};

use crate::command::{rank, CommandFormat, CommandType, ControlType, GoalInfo};
use crate::node::NodeValue;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Static description of a controllable site: devices, places, and the
/// command catalogs operators can invoke by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteMap {
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    #[serde(default)]
    pub places: Vec<PlaceInfo>,
    #[serde(default)]
    pub place_relations: Vec<PlaceRelation>,
    #[serde(default)]
    pub control_identities: Vec<ControlIdentity>,
    #[serde(default)]
    pub set_commands: Vec<SetCommandInfo>,
    #[serde(default)]
    pub flow_commands: Vec<FlowCommandInfo>,
    #[serde(default)]
    pub scenario_commands: Vec<ScenarioInfo>,
}

/// A sensor or actuator known to the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    #[serde(default)]
    pub node_name: String,
    /// Node definition (kind of reading), unique per place.
    pub node_def_id: String,
    /// Node class, used to resolve control names.
    #[serde(default)]
    pub node_class_id: String,
    /// Initial value, if known at load time.
    #[serde(default)]
    pub data: Option<NodeValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceInfo {
    pub place_id: String,
    #[serde(default)]
    pub place_name: String,
    #[serde(default)]
    pub place_size: Option<PlaceSize>,
    #[serde(default)]
    pub threshold_configs: Vec<ThresholdConfig>,
}

/// Place footprint in centimeters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlaceSize {
    pub width: f64,
    pub height: f64,
}

/// Per-place thresholds for one node definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub node_def_id: String,
    #[serde(default)]
    pub max_value: Option<ThresholdBand>,
    #[serde(default)]
    pub upper_limit_value: Option<ThresholdBand>,
    #[serde(default)]
    pub set_value: Option<ThresholdBand>,
    #[serde(default)]
    pub lower_limit_value: Option<ThresholdBand>,
    #[serde(default)]
    pub min_value: Option<ThresholdBand>,
    #[serde(default)]
    pub call_place_rank_list: Vec<PlaceRank>,
    #[serde(default)]
    pub put_place_rank_list: Vec<PlaceRank>,
    #[serde(default)]
    pub group_place_list: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub value: f64,
    #[serde(default)]
    pub is_inclusion_goal: bool,
}

/// One rank entry: a single place, or a group of equally ranked places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaceRank {
    Single(String),
    Group(Vec<String>),
}

impl PlaceRank {
    pub fn place_ids(&self) -> Vec<&str> {
        match self {
            PlaceRank::Single(id) => vec![id.as_str()],
            PlaceRank::Group(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRelation {
    pub place_id: String,
    pub node_id: String,
}

/// Control names for one node class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlIdentity {
    pub node_class_id: String,
    pub controls: Vec<ControlName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlName {
    pub control_type: ControlType,
    pub en_name: String,
    #[serde(default)]
    pub display_name: String,
    /// Whether the control carries a set value instead of a named state.
    #[serde(default)]
    pub is_set_value: bool,
}

/// Lookup of control names by `(node_class_id, control_type)`.
#[derive(Debug, Clone, Default)]
pub struct ControlIdentityTable {
    entries: HashMap<(String, ControlType), ControlName>,
}

impl ControlIdentityTable {
    pub fn from_site(site: &SiteMap) -> Self {
        let mut entries = HashMap::new();
        for identity in &site.control_identities {
            for control in &identity.controls {
                entries.insert(
                    (identity.node_class_id.clone(), control.control_type),
                    control.clone(),
                );
            }
        }
        Self { entries }
    }

    pub fn lookup(&self, node_class_id: &str, control_type: ControlType) -> Option<&ControlName> {
        self.entries
            .get(&(node_class_id.to_string(), control_type))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCommandInfo {
    pub cmd_id: String,
    #[serde(default)]
    pub cmd_name: String,
    #[serde(default)]
    pub true_node_list: Vec<String>,
    #[serde(default)]
    pub false_node_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCommandInfo {
    pub src_place_id: String,
    #[serde(default)]
    pub src_place_name: String,
    pub dest_list: Vec<FlowDestInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDestInfo {
    pub dest_place_id: String,
    #[serde(default)]
    pub dest_place_name: String,
    /// Defaults to `{src}_TO_{dest}`.
    #[serde(default)]
    pub cmd_id: Option<String>,
    #[serde(default)]
    pub cmd_name: Option<String>,
    #[serde(default)]
    pub true_node_list: Vec<String>,
    #[serde(default)]
    pub false_node_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInfo {
    pub cmd_id: String,
    #[serde(default)]
    pub cmd_name: String,
    /// The step list runs this many times in a row.
    #[serde(default = "default_scenario_count")]
    pub scenario_count: u32,
    pub scenario_list: Vec<ScenarioStep>,
}

fn default_scenario_count() -> u32 {
    1
}

/// A scenario entry. A nested list flips sync/async relative to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioStep {
    Group(Vec<ScenarioStep>),
    Command(ScenarioCmdInfo),
}

/// Leaf command inside a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCmdInfo {
    pub wrap_cmd_format: CommandFormat,
    #[serde(default)]
    pub wrap_cmd_type: CommandType,
    #[serde(default)]
    pub goal: Option<GoalInfo>,
    #[serde(default)]
    pub single_node_id: Vec<String>,
    #[serde(default)]
    pub single_control_type: Option<ControlType>,
    #[serde(default)]
    pub single_control_set_value: Option<NodeValue>,
    #[serde(default)]
    pub set_cmd_id: Option<String>,
    #[serde(default)]
    pub flow_src_place_id: Option<String>,
    #[serde(default)]
    pub flow_dest_place_id: Option<String>,
    #[serde(default = "default_rank")]
    pub rank: u32,
}

fn default_rank() -> u32 {
    rank::SECOND
}

impl SiteMap {
    /// Load a site map from a `.json` or `.toml` file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read site map {}", path.display()))?;

        let site: SiteMap = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse site map {}", path.display()))?,
            _ => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse site map {}", path.display()))?,
        };

        validate_site_map(&site).context("Site map validation failed")?;
        Ok(site)
    }

    pub fn find_node(&self, node_id: &str) -> Option<&NodeInfo> {
        self.nodes.iter().find(|node| node.node_id == node_id)
    }

    pub fn find_set_command(&self, cmd_id: &str) -> Option<&SetCommandInfo> {
        self.set_commands.iter().find(|cmd| cmd.cmd_id == cmd_id)
    }

    pub fn find_flow_command(
        &self,
        src_place_id: &str,
        dest_place_id: &str,
    ) -> Option<(&FlowCommandInfo, &FlowDestInfo)> {
        let flow = self
            .flow_commands
            .iter()
            .find(|flow| flow.src_place_id == src_place_id)?;
        let dest = flow
            .dest_list
            .iter()
            .find(|dest| dest.dest_place_id == dest_place_id)?;
        Some((flow, dest))
    }

    pub fn find_scenario(&self, cmd_id: &str) -> Option<&ScenarioInfo> {
        self.scenario_commands.iter().find(|sc| sc.cmd_id == cmd_id)
    }
}
