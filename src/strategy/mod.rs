pub mod manual;
pub mod overlap;

pub use manual::ManualCmdStrategy;
pub use overlap::OverlapCountCmdStrategy;

use crate::command::{CommandContext, CommandFormat, CommandStep, ReqCommandInfo};
use crate::error::CommandError;
use crate::manager::CommandRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating mode, selecting how overlapping commands are arbitrated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyMode {
    #[default]
    Manual,
    OverlapCount,
}

impl StrategyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyMode::Manual => "MANUAL",
            StrategyMode::OverlapCount => "OVERLAP_COUNT",
        }
    }

    pub fn build(self) -> Box<dyn CmdStrategy> {
        match self {
            StrategyMode::Manual => Box::new(ManualCmdStrategy),
            StrategyMode::OverlapCount => Box::new(OverlapCountCmdStrategy),
        }
    }
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a strategy did with a request
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// A storage was registered or re-purposed
    Command(String),
    /// The request belongs to the scenario manager
    Scenario(ReqCommandInfo),
    /// Nothing to do
    Noop,
}

/// Per-format request handling and step reactions for one operating mode.
/// Formats a mode does not support are rejected.
pub trait CmdStrategy: Send {
    fn mode(&self) -> StrategyMode;

    fn execute_command(
        &self,
        registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        match req.format {
            CommandFormat::Single => self.execute_single_control(registry, req, ctx),
            CommandFormat::Set => self.execute_set_control(registry, req, ctx),
            CommandFormat::Flow => self.execute_flow_control(registry, req, ctx),
            CommandFormat::Scenario => self.execute_scenario_control(registry, req, ctx),
            CommandFormat::Measure => Err(not_available(self.mode(), req)),
        }
    }

    fn execute_single_control(
        &self,
        _registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        _ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        Err(not_available(self.mode(), req))
    }

    fn execute_set_control(
        &self,
        _registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        _ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        Err(not_available(self.mode(), req))
    }

    fn execute_flow_control(
        &self,
        _registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        _ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        Err(not_available(self.mode(), req))
    }

    fn execute_scenario_control(
        &self,
        _registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        _ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        Err(not_available(self.mode(), req))
    }

    /// React to a step transition of a storage this strategy registered.
    /// Stale notices, whose step the storage has already left, are skipped.
    fn update_command_step(
        &self,
        registry: &mut CommandRegistry,
        uuid: &str,
        step: CommandStep,
        ctx: &mut CommandContext,
    );
}

pub(crate) fn not_available(mode: StrategyMode, req: &ReqCommandInfo) -> CommandError {
    CommandError::NotAvailableInMode {
        cmd_id: req.cmd_id.clone(),
        mode: mode.to_string(),
    }
}
