use std::fmt;

/// Why a command request was rejected before dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// A command with the same id is already tracked
    CommandExists { cmd_id: String, cmd_name: String },
    CommandNotFound { cmd_id: String },
    /// No controller owns the device
    UnknownDevice { cmd_id: String, node_id: String },
    DeviceUnreachable { cmd_id: String, node_id: String },
    /// The device has no current reading
    UnidentifiedDevice { cmd_id: String, node_id: String },
    /// Another live command holds the device in the opposite state
    StateConflict {
        cmd_id: String,
        node_id: String,
        holder_cmd_id: String,
    },
    /// Every device is already where the command would put it
    NoOpCommand { cmd_id: String },
    NotAvailableInMode { cmd_id: String, mode: String },
    SetCommandNotFound(String),
    FlowCommandNotFound { src_place_id: String, dest_place_id: String },
    ScenarioNotFound(String),
    ScenarioRunning { cmd_id: String },
    ScenarioNotRunning { cmd_id: String },
    InvalidGoal { cmd_id: String, reason: String },
    /// A scenario leaf is missing what its format needs, or uses a format
    /// that cannot run inside a scenario
    InvalidScenarioStep { reason: String },
    /// Unknown node id or missing control name for a single control
    UnknownControl { node_id: String, control: String },
    /// The engine actor is gone
    EngineUnavailable,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::CommandExists { cmd_id, cmd_name } => {
                write!(f, "{} ({}) already exists", cmd_name, cmd_id)
            }
            CommandError::CommandNotFound { cmd_id } => write!(f, "command {} not found", cmd_id),
            CommandError::UnknownDevice { cmd_id, node_id } => {
                write!(f, "{}: device {} has no controller", cmd_id, node_id)
            }
            CommandError::DeviceUnreachable { cmd_id, node_id } => {
                write!(f, "{}: device {} is not connected", cmd_id, node_id)
            }
            CommandError::UnidentifiedDevice { cmd_id, node_id } => {
                write!(f, "{}: device {} state is unidentified", cmd_id, node_id)
            }
            CommandError::StateConflict {
                cmd_id,
                node_id,
                holder_cmd_id,
            } => write!(
                f,
                "{}: device {} conflicts with command {}",
                cmd_id, node_id, holder_cmd_id
            ),
            CommandError::NoOpCommand { cmd_id } => {
                write!(f, "{}: every device is already in the requested state", cmd_id)
            }
            CommandError::NotAvailableInMode { cmd_id, mode } => {
                write!(f, "{} is not available in {} mode", cmd_id, mode)
            }
            CommandError::SetCommandNotFound(cmd_id) => {
                write!(f, "set command: {} not found", cmd_id)
            }
            CommandError::FlowCommandNotFound {
                src_place_id,
                dest_place_id,
            } => write!(f, "flow command: {}_TO_{} not found", src_place_id, dest_place_id),
            CommandError::ScenarioNotFound(cmd_id) => {
                write!(f, "scenario command: {} not found", cmd_id)
            }
            CommandError::ScenarioRunning { cmd_id } => write!(f, "{} is running", cmd_id),
            CommandError::ScenarioNotRunning { cmd_id } => {
                write!(f, "scenario {} is not running", cmd_id)
            }
            CommandError::InvalidGoal { cmd_id, reason } => {
                write!(f, "{}: invalid goal: {}", cmd_id, reason)
            }
            CommandError::InvalidScenarioStep { reason } => {
                write!(f, "invalid scenario step: {}", reason)
            }
            CommandError::UnknownControl { node_id, control } => {
                write!(f, "device {} has no {} control", node_id, control)
            }
            CommandError::EngineUnavailable => write!(f, "command engine is not running"),
        }
    }
}

impl std::error::Error for CommandError {}
