use super::{CmdStrategy, StrategyMode, StrategyOutcome};
use crate::command::{
    CommandContext, CommandStep, CommandType, CommandWrapInfo, ContainerCmd, ControlType,
    ElementFilter, ReqCommandInfo, StepObserver, StorageFilter,
};
use crate::error::CommandError;
use crate::manager::CommandRegistry;
use tracing::{debug, info};

/// Automatic mode. Commands stay registered after completion as claims on
/// their devices; a device is only restored when its last claim goes away.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlapCountCmdStrategy;

impl OverlapCountCmdStrategy {
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

        let mut wrap = registry.refine_req_command(req, true, ctx)?;
        registry.calc_default_real_container_cmd(&mut wrap, ctx);

        if wrap.containers.iter().all(|c| c.ignore) {
            return Err(CommandError::NoOpCommand {
                cmd_id: req.cmd_id.clone(),
            });
        }
        is_conflict(registry, &wrap)?;

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
            return Err(CommandError::CommandNotFound {
                cmd_id: req.cmd_id.clone(),
            });
        };
        let uuid = storage.uuid().to_string();
        let restore = restore_list(registry, storage.wrap_info());

        if let Some(storage) = registry.storage_mut(&uuid) {
            let outcome = storage.cancel_command(restore, ctx);
            info!(cmd_id = %req.cmd_id, outcome = ?outcome, "Command cancel requested");
        }
        Ok(StrategyOutcome::Command(uuid))
    }
}

/// TRUE devices with no other live claim go back to FALSE, in reverse
/// acquisition order.
fn restore_list(registry: &CommandRegistry, wrap: &CommandWrapInfo) -> Vec<ContainerCmd> {
    let mut restore: Vec<ContainerCmd> = wrap
        .containers
        .iter()
        .filter(|c| c.control_type == ControlType::True)
        .filter(|c| {
            let claims = registry
                .get_cmd_ele_list(&ElementFilter::live_on(&c.node_id, ControlType::True))
                .len();
            if claims > 1 {
                debug!(node_id = %c.node_id, claims, "Device still claimed, not restoring");
            }
            claims <= 1
        })
        .map(|c| ContainerCmd::new(&c.node_id, ControlType::False))
        .collect();
    restore.reverse();
    restore
}

/// A device may not be driven TRUE while another live command holds it
/// FALSE, or the reverse.
fn is_conflict(registry: &CommandRegistry, wrap: &CommandWrapInfo) -> Result<(), CommandError> {
    for container in &wrap.containers {
        let Some(opposite) = container.control_type.opposite() else {
            continue;
        };
        if let Some((holder, _)) =
            registry.get_cmd_ele(&ElementFilter::live_on(&container.node_id, opposite))
        {
            return Err(CommandError::StateConflict {
                cmd_id: wrap.cmd_id.clone(),
                node_id: container.node_id.clone(),
                holder_cmd_id: holder.cmd_id().to_string(),
            });
        }
    }
    Ok(())
}

impl CmdStrategy for OverlapCountCmdStrategy {
    fn mode(&self) -> StrategyMode {
        StrategyMode::OverlapCount
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
            (CommandStep::End, CommandType::Control) => {
                let restore = restore_list(registry, storage.wrap_info());
                if restore.is_empty() {
                    registry.remove_command_storage(uuid, ctx);
                } else if let Some(storage) = registry.storage_mut(uuid) {
                    storage.cancel_command(restore, ctx);
                }
            }
            (CommandStep::End, CommandType::Cancel) => {
                registry.remove_command_storage(uuid, ctx);
            }
            _ => {}
        }
    }
}
