use crate::command::{
    rank, CommandContext, CommandFormat, CommandType, ControlType, GoalInfo, ReqCmdEle,
    ReqCommandInfo,
};
use crate::device::ControllerState;
use crate::error::CommandError;
use crate::node::NodeValue;
use crate::site::{ScenarioCmdInfo, ScenarioInfo, SiteMap};

/// Options shared by every control request
#[derive(Debug, Clone)]
pub struct ControlOptions {
    pub cmd_type: CommandType,
    pub rank: u32,
    pub goal: Option<GoalInfo>,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            cmd_type: CommandType::Control,
            rank: rank::SECOND,
            goal: None,
        }
    }
}

impl ControlOptions {
    pub fn cancel() -> Self {
        Self {
            cmd_type: CommandType::Cancel,
            ..Default::default()
        }
    }

    pub fn with_goal(mut self, goal: GoalInfo) -> Self {
        self.goal = Some(goal);
        self
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }
}

/// Turns catalog lookups and operator shortcuts into command requests.
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    site: SiteMap,
}

impl CommandCatalog {
    pub fn new(site: SiteMap) -> Self {
        Self { site }
    }

    pub fn site(&self) -> &SiteMap {
        &self.site
    }

    pub fn measure_request(
        &self,
        cmd_id: &str,
        cmd_name: &str,
        search_ids: &[String],
        rank: u32,
    ) -> ReqCommandInfo {
        let mut req = ReqCommandInfo::new(CommandFormat::Measure, cmd_id, cmd_name).with_rank(rank);
        req.elements.push(ReqCmdEle {
            control_type: ControlType::Measure,
            set_value: None,
            search_ids: search_ids.to_vec(),
        });
        req
    }

    /// One node gets a readable id from its control identity; several nodes
    /// get `{ids}_{CONTROL}`.
    pub fn single_request(
        &self,
        node_ids: &[String],
        control_type: ControlType,
        set_value: Option<NodeValue>,
        options: ControlOptions,
        ctx: &CommandContext,
    ) -> Result<ReqCommandInfo, CommandError> {
        let (cmd_id, cmd_name) = match node_ids {
            [node_id] => {
                let node = self.site.find_node(node_id).ok_or_else(|| CommandError::UnknownDevice {
                    cmd_id: format!("{}_{}", node_id, control_type),
                    node_id: node_id.clone(),
                })?;
                let identity = ctx
                    .identities
                    .lookup(&node.node_class_id, control_type)
                    .ok_or_else(|| CommandError::UnknownControl {
                        node_id: node_id.clone(),
                        control: control_type.to_string(),
                    })?;
                let cmd_id = match &set_value {
                    Some(value) => format!("{}_{}_{}", node_id, identity.en_name, value),
                    None => format!("{}_{}", node_id, identity.en_name),
                };
                (cmd_id, format!("{} {}", node.node_name, identity.display_name))
            }
            _ => {
                let cmd_id = format!("{}_{}", node_ids.join(","), control_type);
                (cmd_id.clone(), cmd_id)
            }
        };

        let mut req = ReqCommandInfo::new(CommandFormat::Single, cmd_id, cmd_name);
        req.elements.push(ReqCmdEle {
            control_type,
            set_value,
            search_ids: node_ids.to_vec(),
        });
        Ok(apply_options(req, options))
    }

    pub fn set_request(&self, cmd_id: &str, options: ControlOptions) -> Result<ReqCommandInfo, CommandError> {
        let set = self
            .site
            .find_set_command(cmd_id)
            .ok_or_else(|| CommandError::SetCommandNotFound(cmd_id.to_string()))?;

        let mut req = ReqCommandInfo::new(CommandFormat::Set, &set.cmd_id, &set.cmd_name);
        req.elements = true_false_elements(&set.true_node_list, &set.false_node_list);
        Ok(apply_options(req, options))
    }

    pub fn flow_request(
        &self,
        src_place_id: &str,
        dest_place_id: &str,
        options: ControlOptions,
    ) -> Result<ReqCommandInfo, CommandError> {
        let (flow, dest) = self
            .site
            .find_flow_command(src_place_id, dest_place_id)
            .ok_or_else(|| CommandError::FlowCommandNotFound {
                src_place_id: src_place_id.to_string(),
                dest_place_id: dest_place_id.to_string(),
            })?;

        let cmd_id = dest
            .cmd_id
            .clone()
            .unwrap_or_else(|| format!("{}_TO_{}", src_place_id, dest_place_id));
        let cmd_name = dest
            .cmd_name
            .clone()
            .unwrap_or_else(|| format!("{} to {}", flow.src_place_name, dest.dest_place_name));

        let mut req = ReqCommandInfo::new(CommandFormat::Flow, cmd_id, cmd_name);
        req.src_place_id = Some(src_place_id.to_string());
        req.dest_place_id = Some(dest_place_id.to_string());
        req.elements = true_false_elements(&dest.true_node_list, &dest.false_node_list);
        Ok(apply_options(req, options))
    }

    pub fn scenario(&self, cmd_id: &str) -> Result<&ScenarioInfo, CommandError> {
        self.site
            .find_scenario(cmd_id)
            .ok_or_else(|| CommandError::ScenarioNotFound(cmd_id.to_string()))
    }

    pub fn scenario_request(&self, cmd_id: &str, options: ControlOptions) -> Result<ReqCommandInfo, CommandError> {
        let scenario = self.scenario(cmd_id)?;
        let req = ReqCommandInfo::new(CommandFormat::Scenario, &scenario.cmd_id, &scenario.cmd_name);
        Ok(apply_options(req, options))
    }

    /// Request for one scenario leaf. Only SINGLE, SET and FLOW can run
    /// inside a scenario.
    pub fn scenario_leaf_request(
        &self,
        info: &ScenarioCmdInfo,
        ctx: &CommandContext,
    ) -> Result<ReqCommandInfo, CommandError> {
        let options = ControlOptions {
            cmd_type: info.wrap_cmd_type,
            rank: info.rank,
            goal: info.goal.clone(),
        };
        let missing = |what: &str| CommandError::InvalidScenarioStep {
            reason: format!("{} step is missing {}", info.wrap_cmd_format.as_str(), what),
        };

        match info.wrap_cmd_format {
            CommandFormat::Single => {
                let control_type = info
                    .single_control_type
                    .ok_or_else(|| missing("single_control_type"))?;
                self.single_request(
                    &info.single_node_id,
                    control_type,
                    info.single_control_set_value.clone(),
                    options,
                    ctx,
                )
            }
            CommandFormat::Set => {
                let cmd_id = info.set_cmd_id.as_deref().ok_or_else(|| missing("set_cmd_id"))?;
                self.set_request(cmd_id, options)
            }
            CommandFormat::Flow => {
                let src = info
                    .flow_src_place_id
                    .as_deref()
                    .ok_or_else(|| missing("flow_src_place_id"))?;
                let dest = info
                    .flow_dest_place_id
                    .as_deref()
                    .ok_or_else(|| missing("flow_dest_place_id"))?;
                self.flow_request(src, dest, options)
            }
            CommandFormat::Measure | CommandFormat::Scenario => Err(CommandError::InvalidScenarioStep {
                reason: format!("{} cannot run inside a scenario", info.wrap_cmd_format.as_str()),
            }),
        }
    }
}

fn apply_options(mut req: ReqCommandInfo, options: ControlOptions) -> ReqCommandInfo {
    req.cmd_type = options.cmd_type;
    req.rank = options.rank;
    req.goal = options.goal;
    req
}

fn true_false_elements(true_nodes: &[String], false_nodes: &[String]) -> Vec<ReqCmdEle> {
    let mut elements = Vec::new();
    if !true_nodes.is_empty() {
        elements.push(ReqCmdEle {
            control_type: ControlType::True,
            set_value: None,
            search_ids: true_nodes.to_vec(),
        });
    }
    if !false_nodes.is_empty() {
        elements.push(ReqCmdEle {
            control_type: ControlType::False,
            set_value: None,
            search_ids: false_nodes.to_vec(),
        });
    }
    elements
}

/// Control requests need every target device reachable. MEASURE requests
/// are let through and pruned later.
pub fn check_devices(req: &ReqCommandInfo, ctx: &CommandContext) -> Result<(), CommandError> {
    if req.format == CommandFormat::Measure || req.cmd_type == CommandType::Cancel {
        return Ok(());
    }
    for node_id in req.elements.iter().flat_map(|ele| ele.search_ids.iter()) {
        let state = if ctx.nodes.contains(node_id) {
            ctx.device.controller_state(node_id)
        } else {
            ControllerState::Unknown
        };
        match state {
            ControllerState::Unknown => {
                return Err(CommandError::UnknownDevice {
                    cmd_id: req.cmd_id.clone(),
                    node_id: node_id.clone(),
                })
            }
            ControllerState::Disconnected => {
                return Err(CommandError::DeviceUnreachable {
                    cmd_id: req.cmd_id.clone(),
                    node_id: node_id.clone(),
                })
            }
            ControllerState::Alive => {}
        }
    }
    Ok(())
}
