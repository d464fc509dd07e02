use crate::command::{
    CommandContext, CommandElement, CommandFormat, CommandStep, CommandStorage, CommandWrapInfo,
    ContainerCmd, DeferredTask, ElementFilter, ReqCommandInfo, StepObserver, StorageFilter,
};
use crate::device::ControllerState;
use crate::error::CommandError;
use tracing::{debug, info, warn};

/// Every command storage currently tracked, in registration order.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    storages: Vec<CommandStorage>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.storages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandStorage> {
        self.storages.iter()
    }

    pub fn storage(&self, uuid: &str) -> Option<&CommandStorage> {
        self.storages.iter().find(|s| s.uuid() == uuid)
    }

    pub fn storage_mut(&mut self, uuid: &str) -> Option<&mut CommandStorage> {
        self.storages.iter_mut().find(|s| s.uuid() == uuid)
    }

    pub fn get_cmd_storage(&self, filter: &StorageFilter) -> Option<&CommandStorage> {
        self.storages.iter().find(|s| filter.matches(s))
    }

    pub fn get_cmd_storage_list(&self, filter: &StorageFilter) -> Vec<&CommandStorage> {
        self.storages.iter().filter(|s| filter.matches(s)).collect()
    }

    pub fn get_cmd_ele(&self, filter: &ElementFilter) -> Option<(&CommandStorage, &CommandElement)> {
        self.storages.iter().find_map(|storage| {
            storage
                .elements()
                .iter()
                .find(|el| filter.matches(el))
                .map(|el| (storage, el))
        })
    }

    pub fn get_cmd_ele_list(&self, filter: &ElementFilter) -> Vec<&CommandElement> {
        self.storages
            .iter()
            .flat_map(|storage| storage.elements().iter())
            .filter(|el| filter.matches(el))
            .collect()
    }

    /// The element that currently decides the device: lowest rank wins,
    /// earliest registration breaks ties.
    pub fn get_last_cmd_ele(&self, filter: &ElementFilter) -> Option<&CommandElement> {
        self.storages
            .iter()
            .flat_map(|storage| {
                let rank = storage.wrap_info().rank;
                storage.elements().iter().map(move |el| (rank, el))
            })
            .filter(|(_, el)| filter.matches(el))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, el)| el)
    }

    /// Expand each request element into one container per device.
    ///
    /// With `immediate_fail`, a device without a controller, a disconnected
    /// device or a device without a reading rejects the request. Otherwise
    /// such devices are kept but ignored. MEASURE drops unreachable devices.
    pub fn refine_req_command(
        &self,
        req: &ReqCommandInfo,
        immediate_fail: bool,
        ctx: &CommandContext,
    ) -> Result<CommandWrapInfo, CommandError> {
        let mut containers: Vec<ContainerCmd> = Vec::new();

        for ele in &req.elements {
            for node_id in &ele.search_ids {
                if containers.iter().any(|c| &c.node_id == node_id) {
                    continue;
                }
                let mut container = ContainerCmd {
                    node_id: node_id.clone(),
                    control_type: ele.control_type,
                    set_value: ele.set_value.clone(),
                    ignore: false,
                };

                let state = if ctx.nodes.contains(node_id) {
                    ctx.device.controller_state(node_id)
                } else {
                    ControllerState::Unknown
                };

                if req.format == CommandFormat::Measure {
                    if state == ControllerState::Alive {
                        containers.push(container);
                    }
                    continue;
                }

                let rejection = match state {
                    ControllerState::Unknown => Some(CommandError::UnknownDevice {
                        cmd_id: req.cmd_id.clone(),
                        node_id: node_id.clone(),
                    }),
                    ControllerState::Disconnected => Some(CommandError::DeviceUnreachable {
                        cmd_id: req.cmd_id.clone(),
                        node_id: node_id.clone(),
                    }),
                    ControllerState::Alive if ctx.nodes.value(node_id).is_none() => {
                        Some(CommandError::UnidentifiedDevice {
                            cmd_id: req.cmd_id.clone(),
                            node_id: node_id.clone(),
                        })
                    }
                    ControllerState::Alive => None,
                };

                if let Some(err) = rejection {
                    if immediate_fail {
                        return Err(err);
                    }
                    warn!(cmd_id = %req.cmd_id, node_id = %node_id, reason = %err, "Ignoring device");
                    container.ignore = true;
                }
                containers.push(container);
            }
        }

        Ok(CommandWrapInfo::from_request(req, containers))
    }

    /// Ignore containers whose device another live command is still driving
    /// to the same control. A claim that already finished is dispatched
    /// again; with no claim at all the device is skipped when it already
    /// reads the requested state.
    pub fn calc_default_real_container_cmd(&self, wrap: &mut CommandWrapInfo, ctx: &CommandContext) {
        for container in wrap.containers.iter_mut().filter(|c| !c.ignore) {
            let filter = ElementFilter::live_on(&container.node_id, container.control_type);
            container.ignore = match self.get_last_cmd_ele(&filter) {
                Some(found) if !found.is_clear() => {
                    debug!(node_id = %container.node_id, claimed_by = %found.uuid, "Device claim still in flight");
                    true
                }
                Some(_) => false,
                None => ctx.settings.skip_same_state && Self::is_equal_curr_node_data(container, ctx),
            };
        }
    }

    /// Whether the device's current reading already matches the container.
    pub fn is_equal_curr_node_data(container: &ContainerCmd, ctx: &CommandContext) -> bool {
        let Some(record) = ctx.nodes.get(&container.node_id) else {
            return false;
        };
        let Some(value) = record.value.as_ref() else {
            return false;
        };
        let Some(identity) = ctx
            .identities
            .lookup(&record.info.node_class_id, container.control_type)
        else {
            return false;
        };

        if identity.is_set_value {
            container.set_value.as_ref() == Some(value)
        } else {
            value.matches_name(&identity.en_name) || value.matches_name(&identity.display_name)
        }
    }

    /// Create, register and schedule a storage. The storage is returned to
    /// the caller before anything reaches the device layer.
    pub fn execute_real_command(
        &mut self,
        wrap: CommandWrapInfo,
        observer: StepObserver,
        ctx: &mut CommandContext,
    ) -> String {
        let mut storage = CommandStorage::new(wrap);
        storage.attach_observer(observer);
        storage.update_command_step(CommandStep::Wait, ctx);

        let uuid = storage.uuid().to_string();
        info!(cmd_id = %storage.cmd_id(), uuid = %uuid, "Command registered");
        self.storages.push(storage);
        ctx.tasks.defer(DeferredTask::Dispatch(uuid.clone()));
        uuid
    }

    pub fn remove_command_storage(&mut self, uuid: &str, ctx: &mut CommandContext) -> Option<CommandStorage> {
        let idx = self.storages.iter().position(|s| s.uuid() == uuid)?;
        let mut storage = self.storages.remove(idx);
        storage.teardown(ctx);
        info!(cmd_id = %storage.cmd_id(), uuid = %uuid, step = ?storage.step(), "Command removed");
        Some(storage)
    }

    /// Drop everything, releasing thresholds and timers.
    pub fn clear(&mut self, ctx: &mut CommandContext) -> Vec<String> {
        self.storages
            .drain(..)
            .map(|mut storage| {
                storage.teardown(ctx);
                storage.uuid().to_string()
            })
            .collect()
    }
}
