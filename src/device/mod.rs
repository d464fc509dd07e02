pub mod mock;
pub use mock::{LoopbackDevice, MockDevice};

use crate::command::ExecuteCmdInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reachability of the controller that owns a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No controller owns the node
    Unknown,
    Disconnected,
    Alive,
}

/// The device control layer the engine drives.
///
/// Acknowledgements come back asynchronously through
/// `ControlEngine::notify_device_message`.
pub trait DeviceBoundary: Send {
    fn controller_state(&self, node_id: &str) -> ControllerState;

    /// Submit one element. `Ok(true)` means the device needs no change and
    /// the element is complete immediately.
    fn request_command(&mut self, info: &ExecuteCmdInfo) -> Result<bool, DeviceError>;

    /// Withdraw a previously submitted element.
    fn delete_command_set(&mut self, selector: &CommandSetSelector) -> Result<(), DeviceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSetSelector {
    pub wrap_cmd_uuid: String,
    pub element_uuid: String,
    pub node_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceMessageCode {
    ExecutionStart,
    ExecutionTerminate,
    Delete,
}

/// Progress report for one dispatched element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMessage {
    pub wrap_cmd_uuid: String,
    pub element_uuid: String,
    pub code: DeviceMessageCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceEvent {
    Connect { controller_id: String },
    Disconnect { controller_id: String },
}

/// Asynchronous failure reported against a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceErrorReport {
    pub wrap_cmd_uuid: String,
    #[serde(default)]
    pub element_uuid: Option<String>,
    pub message: String,
}

/// Synchronous failures from the device boundary
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    Unreachable(String),
    Rejected { node_id: String, reason: String },
    Transport(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Unreachable(node_id) => write!(f, "device {} is unreachable", node_id),
            DeviceError::Rejected { node_id, reason } => {
                write!(f, "device {} rejected the command: {}", node_id, reason)
            }
            DeviceError::Transport(msg) => write!(f, "device transport error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}
