pub mod board;
pub mod registry;

pub use board::CommandBoard;
pub use registry::CommandRegistry;

use crate::command::{
    CommandContext, CommandElement, CommandFormat, CommandStep, CommandType, CommandStepUpdate, CommandStorage,
    ContainerCmd, DeferredTask, ElementFilter, GoalInfo, ReqCommandInfo, StepNotice, StepObserver,
    StorageFilter,
};
use crate::device::DeviceMessage;
use crate::error::CommandError;
use crate::strategy::{CmdStrategy, StrategyMode, StrategyOutcome};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Owns the command registry and the active strategy, and publishes every
/// step transition.
pub struct CommandManager {
    registry: CommandRegistry,
    strategy: Box<dyn CmdStrategy>,
    board: CommandBoard,
    step_tx: broadcast::Sender<CommandStepUpdate>,
}

impl CommandManager {
    pub fn new(mode: StrategyMode, step_capacity: usize) -> Self {
        let (step_tx, _) = broadcast::channel(step_capacity.max(1));
        Self {
            registry: CommandRegistry::new(),
            strategy: mode.build(),
            board: CommandBoard::new(),
            step_tx,
        }
    }

    pub fn mode(&self) -> StrategyMode {
        self.strategy.mode()
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn board(&self) -> CommandBoard {
        self.board.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommandStepUpdate> {
        self.step_tx.subscribe()
    }

    pub(crate) fn step_sender(&self) -> broadcast::Sender<CommandStepUpdate> {
        self.step_tx.clone()
    }

    /// Swap the operating mode. Returns false when the mode is unchanged;
    /// otherwise every tracked command is dropped and an END update goes out
    /// for each, leaving subscribers with an empty command list.
    pub fn change_cmd_strategy(&mut self, mode: StrategyMode, ctx: &mut CommandContext) -> bool {
        if self.strategy.mode() == mode {
            return false;
        }

        let ended: Vec<CommandStepUpdate> = self
            .registry
            .iter()
            .map(|storage| storage.step_update(CommandStep::End))
            .collect();
        let dropped = self.registry.clear(ctx);
        self.board.clear();
        for update in ended {
            let _ = self.step_tx.send(update);
        }
        self.strategy = mode.build();
        info!(mode = %mode, dropped = dropped.len(), "Command strategy changed");
        true
    }

    /// MEASURE bypasses the strategy; everything else goes through it.
    pub(crate) fn execute_command(
        &mut self,
        req: &ReqCommandInfo,
        ctx: &mut CommandContext,
    ) -> Result<StrategyOutcome, CommandError> {
        if let Some(goal) = &req.goal {
            validate_goal(&req.cmd_id, goal, ctx)?;
        }

        if req.format != CommandFormat::Measure {
            return self.strategy.execute_command(&mut self.registry, req, ctx);
        }

        let existing = self
            .registry
            .get_cmd_storage(&StorageFilter::by_cmd_id(&req.cmd_id));
        if req.cmd_type == CommandType::Cancel {
            let Some(uuid) = existing.map(|s| s.uuid().to_string()) else {
                return Ok(StrategyOutcome::Noop);
            };
            self.cancel_storage(&uuid, Vec::new(), ctx);
            return Ok(StrategyOutcome::Command(uuid));
        }
        if let Some(existing) = existing {
            return Err(CommandError::CommandExists {
                cmd_id: req.cmd_id.clone(),
                cmd_name: existing.wrap_info().cmd_name.clone(),
            });
        }
        let wrap = self.registry.refine_req_command(req, false, ctx)?;
        let uuid = self
            .registry
            .execute_real_command(wrap, StepObserver::Manager, ctx);
        Ok(StrategyOutcome::Command(uuid))
    }

    /// Route a notice to the manager and strategy observers, then publish it.
    /// Scenario observers are handled by the caller.
    pub(crate) fn handle_notice(&mut self, notice: &StepNotice, ctx: &mut CommandContext) {
        let uuid = notice.update.uuid.as_str();
        let step = notice.update.step;
        for observer in &notice.observers {
            match observer {
                StepObserver::Manager => self.update_command_step(uuid, step, ctx),
                StepObserver::Strategy => {
                    self.strategy
                        .update_command_step(&mut self.registry, uuid, step, ctx)
                }
                StepObserver::ScenarioLeaf { .. } => {}
            }
        }
        self.publish(&notice.update);
    }

    /// Default reaction for storages the manager observes itself.
    fn update_command_step(&mut self, uuid: &str, step: CommandStep, ctx: &mut CommandContext) {
        let current = self.registry.storage(uuid).and_then(CommandStorage::step);
        if current == Some(step) && matches!(step, CommandStep::Complete | CommandStep::End) {
            self.registry.remove_command_storage(uuid, ctx);
        }
    }

    fn publish(&self, update: &CommandStepUpdate) {
        match self.registry.storage(&update.uuid) {
            Some(storage) => self.board.upsert(storage),
            None => {
                self.board.remove(&update.uuid);
            }
        }
        let _ = self.step_tx.send(update.clone());
    }

    /// Refresh the board entry of one storage after an in-place change.
    pub(crate) fn sync_board(&self, uuid: &str) {
        match self.registry.storage(uuid) {
            Some(storage) => self.board.upsert(storage),
            None => {
                self.board.remove(uuid);
            }
        }
    }

    pub(crate) fn run_deferred(&mut self, task: DeferredTask, ctx: &mut CommandContext) {
        match task {
            DeferredTask::Dispatch(uuid) => {
                if let Some(storage) = self.registry.storage_mut(&uuid) {
                    if storage.step() == Some(CommandStep::Wait) {
                        storage.execute_command_from_dlc(ctx);
                    }
                }
                self.sync_board(&uuid);
            }
            DeferredTask::Clear(uuid) => {
                if let Some(storage) = self.registry.storage_mut(&uuid) {
                    storage.handle_command_clear(None, ctx);
                }
            }
            DeferredTask::Restore(uuid) => {
                if let Some(storage) = self.registry.storage_mut(&uuid) {
                    storage.run_restore(ctx);
                }
            }
        }
    }

    /// Route a device acknowledgement. Unknown targets are logged and dropped.
    pub(crate) fn update_command_message(&mut self, message: &DeviceMessage, ctx: &mut CommandContext) {
        let Some(storage) = self.registry.storage_mut(&message.wrap_cmd_uuid) else {
            warn!(wrap_cmd_uuid = %message.wrap_cmd_uuid, "Device message for unknown command");
            return;
        };
        if !storage.handle_element_message(&message.element_uuid, message.code, ctx) {
            warn!(
                wrap_cmd_uuid = %message.wrap_cmd_uuid,
                element_uuid = %message.element_uuid,
                "Device message for unknown element"
            );
            return;
        }
        self.sync_board(&message.wrap_cmd_uuid);
    }

    pub(crate) fn handle_goal_update(&mut self, storage_uuid: &str, goal_index: usize, ctx: &mut CommandContext) {
        if let Some(storage) = self.registry.storage_mut(storage_uuid) {
            storage.handle_goal_update(goal_index, ctx);
        }
    }

    pub(crate) fn handle_threshold_timeout(&mut self, storage_uuid: &str, ctx: &mut CommandContext) {
        if let Some(storage) = self.registry.storage_mut(storage_uuid) {
            info!(cmd_id = %storage.cmd_id(), "Goal time limit reached");
            storage.handle_threshold_clear(ctx);
        }
    }

    /// Cancel a storage directly, bypassing the strategy's restore rules.
    pub(crate) fn cancel_storage(
        &mut self,
        uuid: &str,
        restore_list: Vec<ContainerCmd>,
        ctx: &mut CommandContext,
    ) -> bool {
        match self.registry.storage_mut(uuid) {
            Some(storage) => {
                storage.cancel_command(restore_list, ctx);
                true
            }
            None => false,
        }
    }

    pub(crate) fn attach_observer(&mut self, uuid: &str, observer: StepObserver) -> bool {
        match self.registry.storage_mut(uuid) {
            Some(storage) => {
                storage.attach_observer(observer);
                true
            }
            None => false,
        }
    }

    pub(crate) fn detach_observer(&mut self, uuid: &str, observer: &StepObserver) {
        if let Some(storage) = self.registry.storage_mut(uuid) {
            storage.detach_observer(observer);
        }
    }

    pub fn get_cmd_storage(&self, filter: &StorageFilter) -> Option<&CommandStorage> {
        self.registry.get_cmd_storage(filter)
    }

    pub fn get_cmd_storage_list(&self, filter: &StorageFilter) -> Vec<&CommandStorage> {
        self.registry.get_cmd_storage_list(filter)
    }

    pub fn get_cmd_ele(&self, filter: &ElementFilter) -> Option<&CommandElement> {
        self.registry.get_cmd_ele(filter).map(|(_, el)| el)
    }

    pub fn get_cmd_ele_list(&self, filter: &ElementFilter) -> Vec<&CommandElement> {
        self.registry.get_cmd_ele_list(filter)
    }

    pub fn get_last_cmd_ele(&self, filter: &ElementFilter) -> Option<&CommandElement> {
        self.registry.get_last_cmd_ele(filter)
    }
}

fn validate_goal(cmd_id: &str, goal: &GoalInfo, ctx: &CommandContext) -> Result<(), CommandError> {
    let invalid = |reason: String| CommandError::InvalidGoal {
        cmd_id: cmd_id.to_string(),
        reason,
    };

    if let Some(limit) = goal.limit_time_sec {
        if !limit.is_finite() || limit < 0.0 {
            return Err(invalid(format!("limit_time_sec {} is not a valid duration", limit)));
        }
    }

    for data in &goal.goal_data_list {
        match (&data.expression, &data.node_id) {
            (Some(expr), _) => {
                ctx.expressions
                    .compile(&expr.expression)
                    .map_err(|e| invalid(format!("expression '{}': {}", expr.expression, e)))?;
                if let Some(missing) = expr.node_list.iter().find(|id| !ctx.nodes.contains(id)) {
                    return Err(invalid(format!("unknown node {}", missing)));
                }
            }
            (None, Some(node_id)) if !ctx.nodes.contains(node_id) => {
                return Err(invalid(format!("unknown node {}", node_id)));
            }
            (None, Some(_)) => {}
            (None, None) => return Err(invalid("goal has neither a node nor an expression".to_string())),
        }
    }
    Ok(())
}
