use super::{
    CommandSetSelector, ControllerState, DeviceBoundary, DeviceError, DeviceMessage,
    DeviceMessageCode,
};
use crate::command::ExecuteCmdInfo;
use crate::engine::runtime::EngineRequest;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Default)]
struct MockState {
    requests: Vec<ExecuteCmdInfo>,
    deletes: Vec<CommandSetSelector>,
    unknown: HashSet<String>,
    disconnected: HashSet<String>,
    satisfied: HashSet<String>,
    failing: HashSet<String>,
}

/// Scriptable in-memory device layer. Clones share state, so a test can keep
/// one clone while the engine owns the other.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// No controller owns the node.
    pub fn mark_unknown(&self, node_id: &str) {
        self.state().unknown.insert(node_id.to_string());
    }

    pub fn mark_disconnected(&self, node_id: &str) {
        self.state().disconnected.insert(node_id.to_string());
    }

    pub fn mark_connected(&self, node_id: &str) {
        self.state().disconnected.remove(node_id);
    }

    /// Requests for the node report "no change needed".
    pub fn mark_satisfied(&self, node_id: &str) {
        self.state().satisfied.insert(node_id.to_string());
    }

    /// Requests for the node fail synchronously.
    pub fn mark_failing(&self, node_id: &str) {
        self.state().failing.insert(node_id.to_string());
    }

    pub fn requests(&self) -> Vec<ExecuteCmdInfo> {
        self.state().requests.clone()
    }

    pub fn deletes(&self) -> Vec<CommandSetSelector> {
        self.state().deletes.clone()
    }

    /// Drain recorded requests.
    pub fn take_requests(&self) -> Vec<ExecuteCmdInfo> {
        std::mem::take(&mut self.state().requests)
    }

    pub fn take_deletes(&self) -> Vec<CommandSetSelector> {
        std::mem::take(&mut self.state().deletes)
    }

    pub fn request_count(&self, node_id: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|req| req.node_id == node_id)
            .count()
    }
}

impl DeviceBoundary for MockDevice {
    fn controller_state(&self, node_id: &str) -> ControllerState {
        let state = self.state();
        if state.unknown.contains(node_id) {
            ControllerState::Unknown
        } else if state.disconnected.contains(node_id) {
            ControllerState::Disconnected
        } else {
            ControllerState::Alive
        }
    }

    fn request_command(&mut self, info: &ExecuteCmdInfo) -> Result<bool, DeviceError> {
        let mut state = self.state();
        if state.failing.contains(&info.node_id) {
            return Err(DeviceError::Rejected {
                node_id: info.node_id.clone(),
                reason: "mock failure".to_string(),
            });
        }
        state.requests.push(info.clone());
        Ok(state.satisfied.contains(&info.node_id))
    }

    fn delete_command_set(&mut self, selector: &CommandSetSelector) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.failing.contains(&selector.node_id) {
            return Err(DeviceError::Transport("mock failure".to_string()));
        }
        state.deletes.push(selector.clone());
        Ok(())
    }
}

/// Device layer that acknowledges every request back into a running engine.
#[derive(Debug, Clone)]
pub struct LoopbackDevice {
    tx: mpsc::Sender<EngineRequest>,
}

impl LoopbackDevice {
    pub fn new(tx: mpsc::Sender<EngineRequest>) -> Self {
        Self { tx }
    }

    fn send(&self, wrap_cmd_uuid: &str, element_uuid: &str, code: DeviceMessageCode) {
        let message = DeviceMessage {
            wrap_cmd_uuid: wrap_cmd_uuid.to_string(),
            element_uuid: element_uuid.to_string(),
            code,
        };
        if let Err(e) = self.tx.try_send(EngineRequest::DeviceMessage(message)) {
            warn!(error = %e, "Loopback device dropped acknowledgement");
        }
    }
}

impl DeviceBoundary for LoopbackDevice {
    fn controller_state(&self, _node_id: &str) -> ControllerState {
        ControllerState::Alive
    }

    fn request_command(&mut self, info: &ExecuteCmdInfo) -> Result<bool, DeviceError> {
        self.send(&info.wrap_cmd_uuid, &info.uuid, DeviceMessageCode::ExecutionStart);
        self.send(&info.wrap_cmd_uuid, &info.uuid, DeviceMessageCode::ExecutionTerminate);
        Ok(false)
    }

    fn delete_command_set(&mut self, selector: &CommandSetSelector) -> Result<(), DeviceError> {
        self.send(
            &selector.wrap_cmd_uuid,
            &selector.element_uuid,
            DeviceMessageCode::Delete,
        );
        Ok(())
    }
}
