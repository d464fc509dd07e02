use super::{CmdStrategy, StrategyMode, StrategyOutcome};
use crate::command::{
    CommandContext, CommandStep, CommandType, CommandWrapInfo, ContainerCmd, ControlType,
    ReqCommandInfo, StepObserver, StorageFilter,
};
use crate::error::CommandError;
use crate::manager::CommandRegistry;
use tracing::{info, warn};

/// Operator-driven mode. Finished commands are forgotten at once, and a
/// cancel closes every device the command opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualCmdStrategy;

impl ManualCmdStrategy {
    fn execute_default_control(
        &self,
        registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        if req.cmd_type == CommandType::Cancel {
            return self.cancel_command(registry, req, ctx);
        }

        if let Some(existing) = registry.get_cmd_storage(&StorageFilter::by_cmd_id(&req.cmd_id)) {
            return Err(CommandError::CommandExists {
                cmd_id: req.cmd_id.clone(),
                cmd_name: existing.wrap_info().cmd_name.clone(),
            });
        }

        let mut wrap = registry.refine_req_command(req, false, ctx)?;
        registry.calc_default_real_container_cmd(&mut wrap, ctx);

        if wrap.containers.iter().all(|c| c.ignore) {
            return Err(CommandError::NoOpCommand {
                cmd_id: req.cmd_id.clone(),
            });
        }

        let uuid = registry.execute_real_command(wrap, StepObserver::Strategy, ctx);
        Ok(StrategyOutcome::Command(uuid))
    }

    fn cancel_command(
        &self,
        registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        let Some(storage) = registry.get_cmd_storage(&StorageFilter::by_cmd_id(&req.cmd_id)) else {
            info!(cmd_id = %req.cmd_id, "Nothing to cancel");
            return Ok(StrategyOutcome::Noop);
        };
        let uuid = storage.uuid().to_string();
        let restore_list = restore_list(storage.wrap_info());

        if let Some(storage) = registry.storage_mut(&uuid) {
            let outcome = storage.cancel_command(restore_list, ctx);
            info!(cmd_id = %req.cmd_id, outcome = ?outcome, "Command cancel requested");
        }
        Ok(StrategyOutcome::Command(uuid))
    }
}

/// Every device the command drove TRUE goes back to FALSE.
fn restore_list(wrap: &CommandWrapInfo) -> Vec<ContainerCmd> {
    wrap.containers
        .iter()
        .filter(|c| c.control_type == ControlType::True)
        .map(|c| ContainerCmd::new(&c.node_id, ControlType::False))
        .collect()
}

impl CmdStrategy for ManualCmdStrategy {
    fn mode(&self) -> StrategyMode {
        StrategyMode::Manual
    }

    fn execute_single_control(
        &self,
        registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        self.execute_default_control(registry, req, ctx)
    }

    fn execute_set_control(
        &self,
        registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        self.execute_default_control(registry, req, ctx)
    }

    fn execute_flow_control(
        &self,
        registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        self.execute_default_control(registry, req, ctx)
    }

    fn execute_scenario_control(
        &self,
        _registry: &mut CommandRegistry,
        req: &ReqCommandInfo,
        _ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        Ok(StrategyOutcome::Scenario(req.clone()))
    }

    fn update_command_step(
        &self,
        registry: &mut CommandRegistry,
        uuid: &str,
        step: CommandStep,
        ctx: &mut CommandContext,
    ) {
        let Some(storage) = registry.storage(uuid).filter(|s| s.step() == Some(step)) else {
            return;
        };

        match (step, storage.wrap_info().cmd_type) {
            (CommandStep::Complete, _) | (CommandStep::End, CommandType::Cancel) => {
                registry.remove_command_storage(uuid, ctx);
            }
            (CommandStep::End, CommandType::Control) => {
                // Goal reached or timed out: put the devices back
                let restore = restore_list(storage.wrap_info());
                if restore.is_empty() {
                    registry.remove_command_storage(uuid, ctx);
                } else if let Some(storage) = registry.storage_mut(uuid) {
                    let outcome = storage.cancel_command(restore, ctx);
                    if outcome == crate::command::CancelOutcome::AlreadyCanceling {
                        warn!(uuid = %uuid, "Restore requested twice");
                    }
                }
            }
            _ => {}
        }
    }
}
