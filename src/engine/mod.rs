pub mod metrics;
pub mod runtime;

pub use metrics::{MetricsSnapshot, MetricsTracker};
pub use runtime::{channel, spawn, EngineHandle, EngineRequest};

use crate::command::{
    CommandContext, CommandFormat, CommandStep, CommandStepUpdate, CommandStorage, CommandType,
    ControlType, ExpressionEngine, ReqCommandInfo, StepNotice, StepObserver, StorageFilter,
};
use crate::config::FloodgateConfig;
use crate::device::{DeviceBoundary, DeviceErrorReport, DeviceEvent, DeviceMessage};
use crate::error::CommandError;
use crate::exec::{check_devices, CommandCatalog, ControlOptions};
use crate::manager::{CommandBoard, CommandManager};
use crate::node::{NodeChange, NodeObserver, NodeStore, NodeUpdate, NodeValue};
use crate::place::{PlaceManager, PlaceNodeUpdate};
use crate::scenario::{RunningView, ScenarioAction, ScenarioManager};
use crate::site::{validate_site_map, SiteMap};
use crate::strategy::{StrategyMode, StrategyOutcome};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// What an accepted request turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Storage uuid of the command
    Command(String),
    /// Uuid of the started scenario
    Scenario(String),
    /// Accepted, nothing to do
    Noop,
}

impl Dispatched {
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Dispatched::Command(uuid) | Dispatched::Scenario(uuid) => Some(uuid),
            Dispatched::Noop => None,
        }
    }
}

/// Operator-level requests, each resolved against the site catalog.
#[derive(Debug, Clone)]
pub enum ControlRequest {
    Measure {
        cmd_id: String,
        cmd_name: String,
        search_ids: Vec<String>,
        rank: u32,
    },
    Single {
        node_ids: Vec<String>,
        control_type: ControlType,
        set_value: Option<NodeValue>,
        options: ControlOptions,
    },
    Set {
        cmd_id: String,
        options: ControlOptions,
    },
    Flow {
        src_place_id: String,
        dest_place_id: String,
        options: ControlOptions,
    },
    Scenario {
        cmd_id: String,
        options: ControlOptions,
    },
    Cancel {
        cmd_id: String,
    },
    /// A fully formed request
    Raw(ReqCommandInfo),
}

/// The command lifecycle engine.
///
/// Single-threaded: every entry point runs to completion, then pumps the
/// step notices, deferred work and scenario effects it caused until nothing
/// is left.
pub struct ControlEngine {
    ctx: CommandContext,
    manager: CommandManager,
    scenarios: ScenarioManager,
    places: PlaceManager,
    catalog: CommandCatalog,
    metrics: MetricsTracker,
    place_tx: broadcast::Sender<PlaceNodeUpdate>,
}

impl ControlEngine {
    pub fn new(site: SiteMap, config: &FloodgateConfig, device: Box<dyn DeviceBoundary>) -> Result<Self> {
        validate_site_map(&site).context("Site map validation failed")?;

        let expressions = ExpressionEngine::new(config.expression.max_operations);
        let mut ctx = CommandContext::new(&site, device, config.command.settings(), expressions);
        let places = PlaceManager::build(&site, &ctx.nodes, &mut ctx.distributor);
        let manager = CommandManager::new(config.command.strategy, config.runtime.step_broadcast_capacity);
        let (place_tx, _) = broadcast::channel(config.runtime.place_broadcast_capacity.max(1));

        info!(
            nodes = site.nodes.len(),
            places = places.place_storages().len(),
            mode = %config.command.strategy,
            "Control engine ready"
        );

        Ok(Self {
            ctx,
            manager,
            scenarios: ScenarioManager::new(),
            places,
            catalog: CommandCatalog::new(site),
            metrics: MetricsTracker::new(),
            place_tx,
        })
    }

    pub fn handle(&mut self, request: ControlRequest) -> Result<Dispatched, CommandError> {
        match request {
            ControlRequest::Measure {
                cmd_id,
                cmd_name,
                search_ids,
                rank,
            } => self.execute_measure(&cmd_id, &cmd_name, &search_ids, rank),
            ControlRequest::Single {
                node_ids,
                control_type,
                set_value,
                options,
            } => self.execute_single_control(&node_ids, control_type, set_value, options),
            ControlRequest::Set { cmd_id, options } => self.execute_set_control(&cmd_id, options),
            ControlRequest::Flow {
                src_place_id,
                dest_place_id,
                options,
            } => self.execute_flow_control(&src_place_id, &dest_place_id, options),
            ControlRequest::Scenario { cmd_id, options } => {
                self.execute_scenario_control(&cmd_id, options)
            }
            ControlRequest::Cancel { cmd_id } => self.cancel_command(&cmd_id),
            ControlRequest::Raw(req) => self.execute_command(req),
        }
    }

    pub fn execute_measure(
        &mut self,
        cmd_id: &str,
        cmd_name: &str,
        search_ids: &[String],
        rank: u32,
    ) -> Result<Dispatched, CommandError> {
        let req = self.catalog.measure_request(cmd_id, cmd_name, search_ids, rank);
        self.execute_command(req)
    }

    pub fn execute_single_control(
        &mut self,
        node_ids: &[String],
        control_type: ControlType,
        set_value: Option<NodeValue>,
        options: ControlOptions,
    ) -> Result<Dispatched, CommandError> {
        let req = self
            .catalog
            .single_request(node_ids, control_type, set_value, options, &self.ctx)
            .map_err(|e| self.reject(e))?;
        self.execute_command(req)
    }

    pub fn execute_set_control(&mut self, cmd_id: &str, options: ControlOptions) -> Result<Dispatched, CommandError> {
        let req = self
            .catalog
            .set_request(cmd_id, options)
            .map_err(|e| self.reject(e))?;
        self.execute_command(req)
    }

    pub fn execute_flow_control(
        &mut self,
        src_place_id: &str,
        dest_place_id: &str,
        options: ControlOptions,
    ) -> Result<Dispatched, CommandError> {
        let req = self
            .catalog
            .flow_request(src_place_id, dest_place_id, options)
            .map_err(|e| self.reject(e))?;
        self.execute_command(req)
    }

    pub fn execute_scenario_control(
        &mut self,
        cmd_id: &str,
        options: ControlOptions,
    ) -> Result<Dispatched, CommandError> {
        let req = self
            .catalog
            .scenario_request(cmd_id, options)
            .map_err(|e| self.reject(e))?;
        self.execute_command(req)
    }

    /// Reissue an active command as CANCEL. A running scenario with the id is
    /// cancelled instead.
    pub fn cancel_command(&mut self, cmd_id: &str) -> Result<Dispatched, CommandError> {
        if self.scenarios.running().map_or(false, |running| running.cmd_id == cmd_id) {
            return self.cancel_scenario(cmd_id);
        }

        let req = match self.manager.get_cmd_storage(&StorageFilter::by_cmd_id(cmd_id)) {
            Some(storage) => storage.wrap_info().to_request().with_type(CommandType::Cancel),
            None => ReqCommandInfo::new(CommandFormat::Single, cmd_id, cmd_id).with_type(CommandType::Cancel),
        };
        self.execute_command(req)
    }

    /// Run a request through the command manager.
    pub fn execute_command(&mut self, req: ReqCommandInfo) -> Result<Dispatched, CommandError> {
        self.metrics.record_requested();

        if req.format == CommandFormat::Scenario && req.cmd_type == CommandType::Cancel {
            return self.cancel_scenario(&req.cmd_id);
        }

        check_devices(&req, &self.ctx).map_err(|e| self.reject(e))?;
        let outcome = self
            .manager
            .execute_command(&req, &mut self.ctx)
            .map_err(|e| self.reject(e))?;

        let dispatched = match outcome {
            StrategyOutcome::Command(uuid) => {
                self.manager.sync_board(&uuid);
                Dispatched::Command(uuid)
            }
            StrategyOutcome::Noop => Dispatched::Noop,
            StrategyOutcome::Scenario(req) => {
                let info = self.catalog.scenario(&req.cmd_id).map_err(|e| self.reject(e))?;
                let (uuid, actions) = self.scenarios.start(info).map_err(|e| self.reject(e))?;
                self.drain(actions.into());
                return Ok(Dispatched::Scenario(uuid));
            }
        };

        self.drain(VecDeque::new());
        Ok(dispatched)
    }

    pub fn cancel_scenario(&mut self, cmd_id: &str) -> Result<Dispatched, CommandError> {
        let actions = self.scenarios.cancel(cmd_id).map_err(|e| self.reject(e))?;
        self.drain(actions.into());
        Ok(Dispatched::Noop)
    }

    /// Mark the running scenario leaf that issued `cmd_id` as cleared.
    pub fn update_scenario_clear(&mut self, cmd_id: &str) {
        let target = self.scenarios.running().and_then(|running| {
            let leaf = running.root.find_leaf_by_cmd_id(cmd_id)?;
            let storage_uuid = running.root.leaf(leaf)?.storage_uuid()?.to_string();
            Some((running.uuid.clone(), leaf, storage_uuid))
        });
        if let Some((scenario_uuid, leaf, storage_uuid)) = target {
            self.manager
                .detach_observer(&storage_uuid, &StepObserver::ScenarioLeaf { scenario_uuid, leaf });
        }
        let actions = self.scenarios.update_scenario_clear(cmd_id);
        self.drain(actions.into());
    }

    /// Swap the operating mode. Changing the mode drops every tracked
    /// command and stops a running scenario.
    pub fn change_cmd_strategy(&mut self, mode: StrategyMode) -> bool {
        if !self.manager.change_cmd_strategy(mode, &mut self.ctx) {
            return false;
        }
        if let Some(cmd_id) = self.scenarios.running().map(|running| running.cmd_id.clone()) {
            if let Ok(actions) = self.scenarios.cancel(&cmd_id) {
                self.drain(actions.into());
            }
        }
        true
    }

    /// Apply sensor readings and fan them out to places and goals.
    pub fn notify_device_data(&mut self, updates: Vec<NodeUpdate>) -> Vec<NodeChange> {
        let (changes, deliveries) = self.ctx.distributor.notify(&mut self.ctx.nodes, updates);

        for delivery in deliveries {
            match delivery.observer {
                NodeObserver::Place {
                    place_id,
                    node_def_id,
                } => {
                    if let Some(update) = self
                        .places
                        .handle_node_update(&place_id, &node_def_id, &self.ctx.nodes)
                    {
                        let _ = self.place_tx.send(update);
                    }
                }
                NodeObserver::Goal {
                    storage_uuid,
                    goal_index,
                } => {
                    self.manager
                        .handle_goal_update(&storage_uuid, goal_index, &mut self.ctx);
                }
            }
        }

        self.drain(VecDeque::new());
        changes
    }

    pub fn notify_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connect { controller_id } => {
                info!(controller_id = %controller_id, "Device controller connected")
            }
            DeviceEvent::Disconnect { controller_id } => {
                warn!(controller_id = %controller_id, "Device controller disconnected")
            }
        }
    }

    pub fn notify_device_message(&mut self, message: DeviceMessage) {
        self.manager.update_command_message(&message, &mut self.ctx);
        self.drain(VecDeque::new());
    }

    /// The device layer failed a command mid-flight. The command cancels
    /// itself with nothing to restore.
    pub fn notify_device_error(&mut self, report: DeviceErrorReport) {
        error!(
            wrap_cmd_uuid = %report.wrap_cmd_uuid,
            element_uuid = ?report.element_uuid,
            message = %report.message,
            "Device error"
        );
        if !self.manager.cancel_storage(&report.wrap_cmd_uuid, Vec::new(), &mut self.ctx) {
            warn!(wrap_cmd_uuid = %report.wrap_cmd_uuid, "Device error for unknown command");
        }
        self.drain(VecDeque::new());
    }

    /// Fire every goal time limit due at `now`.
    pub fn advance_timers(&mut self, now: Instant) {
        for owner in self.ctx.timers.take_due(now) {
            match owner {
                crate::command::TimerOwner::Threshold { storage_uuid } => {
                    self.manager.handle_threshold_timeout(&storage_uuid, &mut self.ctx);
                }
            }
        }
        self.drain(VecDeque::new());
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.ctx.timers.next_deadline()
    }

    /// Recompute place node statuses and publish them.
    pub fn reload_place(&mut self, place_id: &str, node_def_id: Option<&str>) -> Vec<PlaceNodeUpdate> {
        let updates = self.places.reload_place(place_id, node_def_id, &self.ctx.nodes);
        for update in &updates {
            let _ = self.place_tx.send(update.clone());
        }
        updates
    }

    fn reject(&self, error: CommandError) -> CommandError {
        self.metrics.record_rejected();
        warn!(error = %error, "Command request rejected");
        error
    }

    /// Pump until the event queue and the scenario effects are exhausted.
    fn drain(&mut self, mut pending: VecDeque<ScenarioAction>) {
        loop {
            if let Some(action) = pending.pop_front() {
                self.run_scenario_action(action, &mut pending);
            } else if let Some(notice) = self.ctx.tasks.pop_notice() {
                self.route_notice(notice, &mut pending);
            } else if let Some(task) = self.ctx.tasks.pop_deferred() {
                self.manager.run_deferred(task, &mut self.ctx);
            } else {
                break;
            }
        }
    }

    fn route_notice(&mut self, notice: StepNotice, pending: &mut VecDeque<ScenarioAction>) {
        let uuid = notice.update.uuid.clone();
        let step = notice.update.step;
        self.manager.handle_notice(&notice, &mut self.ctx);

        if step == CommandStep::Canceling {
            self.metrics.record_canceled();
        }
        if !matches!(step, CommandStep::Complete | CommandStep::End) {
            return;
        }
        // A COMPLETE that already moved on to RUNNING is not the end yet
        let current = self.manager.registry().storage(&uuid).map(CommandStorage::step);
        match current {
            None => self.metrics.record_ended(),
            Some(current) if current != Some(step) => return,
            Some(_) => {}
        }

        for observer in notice.observers {
            if let StepObserver::ScenarioLeaf { scenario_uuid, leaf } = &observer {
                self.manager.detach_observer(&uuid, &observer);
                pending.extend(self.scenarios.on_leaf_clear(scenario_uuid, *leaf));
            }
        }
    }

    fn run_scenario_action(&mut self, action: ScenarioAction, pending: &mut VecDeque<ScenarioAction>) {
        match action {
            ScenarioAction::Dispatch {
                scenario_uuid,
                leaf,
                info,
            } => {
                // Async siblings queued before an abort must not start
                if self.scenarios.running().map_or(true, |running| running.uuid != scenario_uuid) {
                    debug!(uuid = %scenario_uuid, format = ?info.wrap_cmd_format, "Scenario gone; step dropped");
                    return;
                }
                self.metrics.record_requested();
                let result = self
                    .catalog
                    .scenario_leaf_request(&info, &self.ctx)
                    .and_then(|req| check_devices(&req, &self.ctx).map(|_| req))
                    .and_then(|req| {
                        let outcome = self.manager.execute_command(&req, &mut self.ctx)?;
                        Ok((req, outcome))
                    });

                match result {
                    Ok((req, StrategyOutcome::Command(uuid))) => {
                        self.scenarios.bind_leaf(&scenario_uuid, leaf, &uuid, &req.cmd_id);
                        let observer = StepObserver::ScenarioLeaf {
                            scenario_uuid: scenario_uuid.clone(),
                            leaf,
                        };
                        let finished = self
                            .manager
                            .registry()
                            .storage(&uuid)
                            .and_then(CommandStorage::step)
                            .map_or(true, |step| matches!(step, CommandStep::Complete | CommandStep::End));
                        if finished {
                            pending.extend(self.scenarios.on_leaf_clear(&scenario_uuid, leaf));
                        } else {
                            self.manager.attach_observer(&uuid, observer);
                        }
                    }
                    Ok((_, StrategyOutcome::Noop)) => {
                        pending.extend(self.scenarios.on_leaf_clear(&scenario_uuid, leaf));
                    }
                    Ok((req, StrategyOutcome::Scenario(_))) => {
                        let e = self.reject(CommandError::InvalidScenarioStep {
                            reason: format!("{} cannot nest a scenario", req.cmd_id),
                        });
                        pending.extend(self.scenarios.on_leaf_fail(&scenario_uuid, leaf, &e));
                    }
                    Err(e) => {
                        let e = self.reject(e);
                        pending.extend(self.scenarios.on_leaf_fail(&scenario_uuid, leaf, &e));
                    }
                }
            }
            ScenarioAction::Cancel {
                scenario_uuid,
                storage_uuid,
                leaf,
            } => {
                self.manager
                    .detach_observer(&storage_uuid, &StepObserver::ScenarioLeaf { scenario_uuid, leaf });
                self.manager.cancel_storage(&storage_uuid, Vec::new(), &mut self.ctx);
            }
            ScenarioAction::Finished { scenario_uuid, cmd_id } => {
                info!(cmd_id = %cmd_id, uuid = %scenario_uuid, "Scenario complete");
            }
            ScenarioAction::Aborted { scenario_uuid, cmd_id } => {
                warn!(cmd_id = %cmd_id, uuid = %scenario_uuid, "Scenario stopped before completion");
            }
        }
    }

    pub fn subscribe_steps(&self) -> broadcast::Receiver<CommandStepUpdate> {
        self.manager.subscribe()
    }

    pub fn subscribe_places(&self) -> broadcast::Receiver<PlaceNodeUpdate> {
        self.place_tx.subscribe()
    }

    pub(crate) fn step_sender(&self) -> broadcast::Sender<CommandStepUpdate> {
        self.manager.step_sender()
    }

    pub(crate) fn place_sender(&self) -> broadcast::Sender<PlaceNodeUpdate> {
        self.place_tx.clone()
    }

    pub fn board(&self) -> CommandBoard {
        self.manager.board()
    }

    pub fn metrics(&self) -> MetricsTracker {
        self.metrics.clone()
    }

    pub fn mode(&self) -> StrategyMode {
        self.manager.mode()
    }

    pub fn manager(&self) -> &CommandManager {
        &self.manager
    }

    pub fn places(&self) -> &PlaceManager {
        &self.places
    }

    pub fn nodes(&self) -> &NodeStore {
        &self.ctx.nodes
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn scenarios(&self) -> &ScenarioManager {
        &self.scenarios
    }

    pub fn running_scenario(&self) -> Option<RunningView> {
        self.scenarios.running_scenario()
    }

    /// Goal subscriptions currently held on the sensor graph.
    pub fn goal_observer_count(&self) -> usize {
        self.ctx
            .distributor
            .count_where(|observer| matches!(observer, NodeObserver::Goal { .. }))
    }

    pub fn pending_timers(&self) -> usize {
        self.ctx.timers.len()
    }
}
