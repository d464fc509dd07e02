use super::context::{CommandContext, DeferredTask, StepNotice};
use super::element::{CommandElement, ElementStep};
use super::threshold::ThresholdStorage;
use super::{
    CommandFormat, CommandStep, CommandStepUpdate, CommandType, CommandWrapInfo, ContainerCmd,
    ControlType, StepObserver,
};
use crate::device::DeviceMessageCode;
use crate::node::NodeValue;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Result of a cancellation request on a storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Waiting for outstanding elements to be withdrawn
    Canceling,
    /// Restore list scheduled for dispatch
    Restoring,
    /// Nothing left to do, storage is at END
    Ended,
    /// A cancellation is already under way
    AlreadyCanceling,
}

enum ThresholdArm {
    Armed,
    Reached,
    NoGoal,
}

/// One executing command: its elements, step, restore list and threshold.
#[derive(Debug)]
pub struct CommandStorage {
    uuid: String,
    wrap: CommandWrapInfo,
    step: Option<CommandStep>,
    history: Vec<CommandStep>,
    elements: Vec<CommandElement>,
    restore_list: Vec<ContainerCmd>,
    threshold: Option<ThresholdStorage>,
    observers: Vec<StepObserver>,
}

/// Serializable view of a storage for the status board
#[derive(Debug, Clone, Serialize)]
pub struct CommandSummary {
    pub uuid: String,
    pub cmd_id: String,
    pub cmd_name: String,
    pub format: CommandFormat,
    pub cmd_type: CommandType,
    pub step: Option<CommandStep>,
    pub rank: u32,
    pub src_place_id: Option<String>,
    pub dest_place_id: Option<String>,
    pub elements: Vec<ElementSummary>,
    pub has_threshold: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElementSummary {
    pub uuid: String,
    pub node_id: String,
    pub control_type: ControlType,
    pub set_value: Option<NodeValue>,
    pub is_live: bool,
    pub is_ignore: bool,
    pub step: ElementStep,
}

impl CommandStorage {
    pub fn new(wrap: CommandWrapInfo) -> Self {
        let elements = wrap.containers.iter().map(CommandElement::new).collect();
        Self {
            uuid: Uuid::now_v7().to_string(),
            wrap,
            step: None,
            history: Vec::new(),
            elements,
            restore_list: Vec::new(),
            threshold: None,
            observers: Vec::new(),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn wrap_info(&self) -> &CommandWrapInfo {
        &self.wrap
    }

    pub fn cmd_id(&self) -> &str {
        &self.wrap.cmd_id
    }

    pub fn step(&self) -> Option<CommandStep> {
        self.step
    }

    /// Every step this storage has passed through, in order.
    pub fn history(&self) -> &[CommandStep] {
        &self.history
    }

    pub fn elements(&self) -> &[CommandElement] {
        &self.elements
    }

    pub fn element(&self, element_uuid: &str) -> Option<&CommandElement> {
        self.elements.iter().find(|el| el.uuid == element_uuid)
    }

    pub fn restore_list(&self) -> &[ContainerCmd] {
        &self.restore_list
    }

    pub fn threshold(&self) -> Option<&ThresholdStorage> {
        self.threshold.as_ref()
    }

    pub fn observers(&self) -> &[StepObserver] {
        &self.observers
    }

    pub fn is_command_clear(&self) -> bool {
        self.elements.iter().all(CommandElement::is_clear)
    }

    pub fn attach_observer(&mut self, observer: StepObserver) {
        if !self.observers.contains(&observer) {
            self.observers.push(observer);
        }
    }

    pub fn detach_observer(&mut self, observer: &StepObserver) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o != observer);
        self.observers.len() != before
    }

    pub fn step_update(&self, step: CommandStep) -> CommandStepUpdate {
        CommandStepUpdate {
            uuid: self.uuid.clone(),
            cmd_id: self.wrap.cmd_id.clone(),
            cmd_name: self.wrap.cmd_name.clone(),
            format: self.wrap.format,
            cmd_type: self.wrap.cmd_type,
            step,
            timestamp: Utc::now(),
        }
    }

    /// Move to `next` and queue a notice for the observers. Repeated or
    /// backward transitions are refused.
    pub(crate) fn update_command_step(&mut self, next: CommandStep, ctx: &mut CommandContext) -> bool {
        if self.step == Some(next) {
            return false;
        }
        if !is_allowed(self.step, next, self.wrap.cmd_type) {
            warn!(cmd_id = %self.wrap.cmd_id, from = ?self.step, to = %next, "Refusing step transition");
            return false;
        }

        debug!(cmd_id = %self.wrap.cmd_id, from = ?self.step, to = %next, "Command step");
        self.step = Some(next);
        self.history.push(next);
        ctx.tasks.notify(StepNotice {
            update: self.step_update(next),
            observers: self.observers.clone(),
        });
        true
    }

    /// Dispatch every element to the device layer.
    pub(crate) fn execute_command_from_dlc(&mut self, ctx: &mut CommandContext) {
        if self.is_command_clear() {
            ctx.tasks.defer(DeferredTask::Clear(self.uuid.clone()));
            return;
        }

        for idx in 0..self.elements.len() {
            let info = self.elements[idx].execute_info(&self.uuid, &self.wrap);
            match self.elements[idx].execute(&info, ctx.device.as_mut()) {
                Ok(true) => self.handle_command_clear(Some(idx), ctx),
                Ok(false) => {}
                Err(e) if self.wrap.cmd_type == CommandType::Cancel => {
                    // A failed restore is abandoned rather than cancelled again
                    error!(cmd_id = %self.wrap.cmd_id, node_id = %info.node_id, error = %e, "Restore dispatch failed");
                    self.elements[idx].abandon();
                    self.handle_command_clear(Some(idx), ctx);
                }
                Err(e) => {
                    error!(cmd_id = %self.wrap.cmd_id, node_id = %info.node_id, error = %e, "Dispatch failed, cancelling command");
                    self.cancel_command(Vec::new(), ctx);
                    return;
                }
            }
        }
    }

    /// Route a device acknowledgement to its element. Returns false when the
    /// element is not part of this storage.
    pub(crate) fn handle_element_message(
        &mut self,
        element_uuid: &str,
        code: DeviceMessageCode,
        ctx: &mut CommandContext,
    ) -> bool {
        let Some(idx) = self.elements.iter().position(|el| el.uuid == element_uuid) else {
            return false;
        };
        if self.elements[idx].update_command(code) {
            self.handle_command_clear(Some(idx), ctx);
        }
        true
    }

    pub(crate) fn handle_command_clear(&mut self, trigger: Option<usize>, ctx: &mut CommandContext) {
        if self.is_command_clear() {
            match self.step {
                Some(CommandStep::Canceling) => {
                    self.restore_command(ctx);
                }
                Some(CommandStep::Restore) => {
                    self.update_command_step(CommandStep::End, ctx);
                }
                Some(CommandStep::Wait) | Some(CommandStep::Proceed) => {
                    let arm = self.set_threshold(ctx);
                    self.update_command_step(CommandStep::Complete, ctx);
                    match arm {
                        ThresholdArm::Armed => {
                            self.update_command_step(CommandStep::Running, ctx);
                        }
                        ThresholdArm::Reached => {
                            self.update_command_step(CommandStep::End, ctx);
                        }
                        ThresholdArm::NoGoal => {}
                    }
                }
                _ => {}
            }
            return;
        }

        let proceeding = trigger
            .and_then(|idx| self.elements.get(idx))
            .map_or(false, |el| el.step() == ElementStep::Proceed);
        if self.step == Some(CommandStep::Wait) && proceeding {
            self.update_command_step(CommandStep::Proceed, ctx);
        }
    }

    /// Turn this storage into a cancellation. Outstanding elements are
    /// withdrawn; once all are clear the restore list is dispatched.
    pub(crate) fn cancel_command(
        &mut self,
        restore_list: Vec<ContainerCmd>,
        ctx: &mut CommandContext,
    ) -> CancelOutcome {
        match self.step {
            Some(CommandStep::Canceling) | Some(CommandStep::Restore) => {
                return CancelOutcome::AlreadyCanceling;
            }
            Some(CommandStep::End) if self.wrap.cmd_type == CommandType::Cancel => {
                return CancelOutcome::Ended;
            }
            _ => {}
        }

        self.wrap.cmd_type = CommandType::Cancel;
        self.restore_list = restore_list;
        self.remove_threshold(ctx);
        for el in &mut self.elements {
            el.is_live = false;
        }

        if self.is_command_clear() {
            return self.restore_command(ctx);
        }

        self.update_command_step(CommandStep::Canceling, ctx);
        for el in &mut self.elements {
            el.cancel(&self.uuid, ctx.device.as_mut());
        }

        if self.is_command_clear() {
            return self.restore_command(ctx);
        }
        CancelOutcome::Canceling
    }

    fn restore_command(&mut self, ctx: &mut CommandContext) -> CancelOutcome {
        if self.restore_list.is_empty() {
            self.update_command_step(CommandStep::End, ctx);
            return CancelOutcome::Ended;
        }
        ctx.tasks.defer(DeferredTask::Restore(self.uuid.clone()));
        CancelOutcome::Restoring
    }

    /// Deferred half of `restore_command`.
    pub(crate) fn run_restore(&mut self, ctx: &mut CommandContext) {
        if self.step == Some(CommandStep::Restore) {
            return;
        }
        self.elements = self.restore_list.iter().map(CommandElement::new).collect();
        self.update_command_step(CommandStep::Restore, ctx);
        self.execute_command_from_dlc(ctx);
    }

    fn set_threshold(&mut self, ctx: &mut CommandContext) -> ThresholdArm {
        let Some(goal) = self.wrap.goal.as_ref().filter(|goal| !goal.is_empty()) else {
            return ThresholdArm::NoGoal;
        };

        let mut threshold = ThresholdStorage::new(goal, &ctx.expressions);
        if threshold.is_reached_at_start(&ctx.nodes, &ctx.expressions) {
            return ThresholdArm::Reached;
        }

        threshold.arm(&self.uuid, &mut ctx.distributor, &mut ctx.timers, &ctx.settings);
        self.threshold = Some(threshold);
        ThresholdArm::Armed
    }

    /// A watched node changed for one of the goals.
    pub(crate) fn handle_goal_update(&mut self, goal_index: usize, ctx: &mut CommandContext) {
        let Some(threshold) = &self.threshold else {
            return;
        };
        if !threshold.is_goal_clear(goal_index, &ctx.nodes, &ctx.expressions) {
            return;
        }
        if threshold.is_threshold_clear(&ctx.nodes, &ctx.expressions) {
            self.handle_threshold_clear(ctx);
        }
    }

    /// Goals met or time limit expired.
    pub(crate) fn handle_threshold_clear(&mut self, ctx: &mut CommandContext) {
        if self.step != Some(CommandStep::Running) {
            return;
        }
        self.remove_threshold(ctx);
        self.update_command_step(CommandStep::End, ctx);
    }

    fn remove_threshold(&mut self, ctx: &mut CommandContext) {
        if let Some(mut threshold) = self.threshold.take() {
            threshold.reset(&mut ctx.distributor, &mut ctx.timers);
        }
    }

    /// Release everything this storage holds outside itself.
    pub(crate) fn teardown(&mut self, ctx: &mut CommandContext) {
        self.remove_threshold(ctx);
    }

    pub fn summary(&self) -> CommandSummary {
        CommandSummary {
            uuid: self.uuid.clone(),
            cmd_id: self.wrap.cmd_id.clone(),
            cmd_name: self.wrap.cmd_name.clone(),
            format: self.wrap.format,
            cmd_type: self.wrap.cmd_type,
            step: self.step,
            rank: self.wrap.rank,
            src_place_id: self.wrap.src_place_id.clone(),
            dest_place_id: self.wrap.dest_place_id.clone(),
            elements: self
                .elements
                .iter()
                .map(|el| ElementSummary {
                    uuid: el.uuid.clone(),
                    node_id: el.node_id.clone(),
                    control_type: el.control_type,
                    set_value: el.set_value.clone(),
                    is_live: el.is_live,
                    is_ignore: el.is_ignore,
                    step: el.step(),
                })
                .collect(),
            has_threshold: self.threshold.is_some(),
        }
    }
}

/// Forward-only transitions. END is terminal except when a reached goal is
/// turned into a restore.
fn is_allowed(from: Option<CommandStep>, to: CommandStep, cmd_type: CommandType) -> bool {
    use CommandStep::*;
    match (from, to) {
        (None, Wait) => true,
        (Some(Wait), Proceed | Complete | Running | Canceling | Restore | End) => true,
        (Some(Proceed), Complete | Running | Canceling | Restore | End) => true,
        (Some(Complete), Running | Canceling | Restore | End) => true,
        (Some(Running), Canceling | Restore | End) => true,
        (Some(Canceling), Restore | End) => true,
        (Some(Restore), End) => true,
        (Some(End), Restore) => cmd_type == CommandType::Cancel,
        _ => false,
    }
}
