use super::{CommandFormat, CommandType, CommandWrapInfo, ContainerCmd, ControlType};
use crate::device::{CommandSetSelector, DeviceBoundary, DeviceError, DeviceMessageCode};
use crate::node::NodeValue;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementStep {
    Wait,
    Proceed,
    Complete,
}

/// What the device layer receives for one element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteCmdInfo {
    pub wrap_cmd_id: String,
    pub wrap_cmd_type: CommandType,
    pub wrap_cmd_format: CommandFormat,
    pub wrap_cmd_name: String,
    pub wrap_cmd_uuid: String,
    pub rank: u32,
    pub node_id: String,
    pub control_type: ControlType,
    pub control_set_value: Option<NodeValue>,
    pub uuid: String,
}

/// One device instruction inside a command storage.
#[derive(Debug, Clone, Serialize)]
pub struct CommandElement {
    pub uuid: String,
    pub node_id: String,
    pub control_type: ControlType,
    pub set_value: Option<NodeValue>,
    /// False once the owning command is being cancelled.
    pub is_live: bool,
    pub is_ignore: bool,
    step: ElementStep,
    dispatched: bool,
}

impl CommandElement {
    pub fn new(container: &ContainerCmd) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            node_id: container.node_id.clone(),
            control_type: container.control_type,
            set_value: container.set_value.clone(),
            is_live: true,
            is_ignore: container.ignore,
            step: ElementStep::Wait,
            dispatched: false,
        }
    }

    pub fn step(&self) -> ElementStep {
        self.step
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched
    }

    pub fn is_clear(&self) -> bool {
        self.is_ignore || self.step == ElementStep::Complete
    }

    pub fn execute_info(&self, wrap_uuid: &str, wrap: &CommandWrapInfo) -> ExecuteCmdInfo {
        ExecuteCmdInfo {
            wrap_cmd_id: wrap.cmd_id.clone(),
            wrap_cmd_type: wrap.cmd_type,
            wrap_cmd_format: wrap.format,
            wrap_cmd_name: wrap.cmd_name.clone(),
            wrap_cmd_uuid: wrap_uuid.to_string(),
            rank: wrap.rank,
            node_id: self.node_id.clone(),
            control_type: self.control_type,
            control_set_value: self.set_value.clone(),
            uuid: self.uuid.clone(),
        }
    }

    /// Submit to the device layer. Once accepted it is never resubmitted.
    /// Returns true when the element cleared immediately.
    pub fn execute(
        &mut self,
        info: &ExecuteCmdInfo,
        device: &mut dyn DeviceBoundary,
    ) -> Result<bool, DeviceError> {
        if self.is_ignore || self.dispatched {
            return Ok(false);
        }
        let satisfied = device.request_command(info)?;
        self.dispatched = true;
        if satisfied {
            self.step = ElementStep::Complete;
        }
        Ok(satisfied)
    }

    /// Withdraw from the device layer. Nothing outstanding (never dispatched,
    /// or the withdrawal failed) completes locally. Returns true when the
    /// element cleared here.
    pub fn cancel(&mut self, wrap_uuid: &str, device: &mut dyn DeviceBoundary) -> bool {
        if self.is_clear() {
            return false;
        }
        if !self.dispatched {
            self.step = ElementStep::Complete;
            return true;
        }

        let selector = CommandSetSelector {
            wrap_cmd_uuid: wrap_uuid.to_string(),
            element_uuid: self.uuid.clone(),
            node_id: self.node_id.clone(),
        };
        match device.delete_command_set(&selector) {
            Ok(()) => false,
            Err(e) => {
                warn!(node_id = %self.node_id, error = %e, "Cancel request failed, completing element locally");
                self.step = ElementStep::Complete;
                true
            }
        }
    }

    /// Give up on the element without hearing back from the device.
    pub(crate) fn abandon(&mut self) {
        self.step = ElementStep::Complete;
    }

    /// Apply a device acknowledgement. Returns true when the step changed.
    pub fn update_command(&mut self, code: DeviceMessageCode) -> bool {
        let next = match code {
            DeviceMessageCode::ExecutionStart if self.step == ElementStep::Wait => ElementStep::Proceed,
            DeviceMessageCode::ExecutionTerminate | DeviceMessageCode::Delete
                if self.step != ElementStep::Complete =>
            {
                ElementStep::Complete
            }
            _ => {
                debug!(node_id = %self.node_id, code = ?code, step = ?self.step, "Ignoring device message");
                return false;
            }
        };
        self.step = next;
        true
    }
}
