use super::{ControlEngine, ControlRequest, Dispatched, MetricsTracker};
use crate::command::CommandStepUpdate;
use crate::device::{DeviceErrorReport, DeviceEvent, DeviceMessage};
use crate::error::CommandError;
use crate::manager::CommandBoard;
use crate::node::NodeUpdate;
use crate::place::PlaceNodeUpdate;
use crate::scenario::RunningView;
use crate::strategy::StrategyMode;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Everything the engine actor accepts.
#[derive(Debug)]
pub enum EngineRequest {
    Command {
        request: ControlRequest,
        reply: oneshot::Sender<Result<Dispatched, CommandError>>,
    },
    ChangeStrategy {
        mode: StrategyMode,
        reply: oneshot::Sender<bool>,
    },
    UpdateScenarioClear {
        cmd_id: String,
    },
    RunningScenario {
        reply: oneshot::Sender<Option<RunningView>>,
    },
    DeviceData(Vec<NodeUpdate>),
    DeviceEvent(DeviceEvent),
    DeviceMessage(DeviceMessage),
    DeviceError(DeviceErrorReport),
    Shutdown,
}

/// Cloneable front door to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    step_tx: broadcast::Sender<CommandStepUpdate>,
    place_tx: broadcast::Sender<PlaceNodeUpdate>,
    board: CommandBoard,
    metrics: MetricsTracker,
}

impl EngineHandle {
    pub async fn command(&self, request: ControlRequest) -> Result<Dispatched, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Command { request, reply }).await?;
        rx.await.map_err(|_| CommandError::EngineUnavailable)?
    }

    pub async fn change_cmd_strategy(&self, mode: StrategyMode) -> Result<bool, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::ChangeStrategy { mode, reply }).await?;
        rx.await.map_err(|_| CommandError::EngineUnavailable)
    }

    pub async fn running_scenario(&self) -> Result<Option<RunningView>, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::RunningScenario { reply }).await?;
        rx.await.map_err(|_| CommandError::EngineUnavailable)
    }

    pub async fn update_scenario_clear(&self, cmd_id: impl Into<String>) -> Result<(), CommandError> {
        self.send(EngineRequest::UpdateScenarioClear { cmd_id: cmd_id.into() })
            .await
    }

    pub async fn notify_device_data(&self, updates: Vec<NodeUpdate>) -> Result<(), CommandError> {
        self.send(EngineRequest::DeviceData(updates)).await
    }

    pub async fn notify_device_event(&self, event: DeviceEvent) -> Result<(), CommandError> {
        self.send(EngineRequest::DeviceEvent(event)).await
    }

    pub async fn notify_device_message(&self, message: DeviceMessage) -> Result<(), CommandError> {
        self.send(EngineRequest::DeviceMessage(message)).await
    }

    pub async fn notify_device_error(&self, report: DeviceErrorReport) -> Result<(), CommandError> {
        self.send(EngineRequest::DeviceError(report)).await
    }

    pub async fn shutdown(&self) -> Result<(), CommandError> {
        self.send(EngineRequest::Shutdown).await
    }

    async fn send(&self, request: EngineRequest) -> Result<(), CommandError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| CommandError::EngineUnavailable)
    }

    pub fn subscribe_steps(&self) -> broadcast::Receiver<CommandStepUpdate> {
        self.step_tx.subscribe()
    }

    pub fn subscribe_places(&self) -> broadcast::Receiver<PlaceNodeUpdate> {
        self.place_tx.subscribe()
    }

    pub fn board(&self) -> &CommandBoard {
        &self.board
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }
}

/// Request channel for an engine. Create it first when the device layer
/// needs to feed acknowledgements back in.
pub fn channel(buffer: usize) -> (mpsc::Sender<EngineRequest>, mpsc::Receiver<EngineRequest>) {
    mpsc::channel(buffer.max(1))
}

/// Move the engine onto its own task. All mutations happen there, in the
/// order requests arrive, interleaved with goal time limits as they fall due.
pub fn spawn(
    engine: ControlEngine,
    tx: mpsc::Sender<EngineRequest>,
    rx: mpsc::Receiver<EngineRequest>,
) -> (EngineHandle, JoinHandle<()>) {
    let handle = EngineHandle {
        tx,
        step_tx: engine.step_sender(),
        place_tx: engine.place_sender(),
        board: engine.board(),
        metrics: engine.metrics(),
    };
    let task = tokio::spawn(run(engine, rx));
    (handle, task)
}

async fn run(mut engine: ControlEngine, mut rx: mpsc::Receiver<EngineRequest>) {
    info!("Engine actor started");

    loop {
        let deadline = engine.next_deadline();
        tokio::select! {
            request = rx.recv() => {
                match request {
                    Some(EngineRequest::Shutdown) | None => break,
                    Some(request) => handle_request(&mut engine, request),
                }
            }
            _ = sleep_until(deadline) => {
                engine.advance_timers(Instant::now());
            }
        }
    }

    info!("Engine actor stopped");
}

fn handle_request(engine: &mut ControlEngine, request: EngineRequest) {
    match request {
        EngineRequest::Command { request, reply } => {
            let result = engine.handle(request);
            if reply.send(result).is_err() {
                debug!("Command caller went away before the reply");
            }
        }
        EngineRequest::ChangeStrategy { mode, reply } => {
            let _ = reply.send(engine.change_cmd_strategy(mode));
        }
        EngineRequest::UpdateScenarioClear { cmd_id } => engine.update_scenario_clear(&cmd_id),
        EngineRequest::RunningScenario { reply } => {
            let _ = reply.send(engine.running_scenario());
        }
        EngineRequest::DeviceData(updates) => {
            engine.notify_device_data(updates);
        }
        EngineRequest::DeviceEvent(event) => engine.notify_device_event(event),
        EngineRequest::DeviceMessage(message) => engine.notify_device_message(message),
        EngineRequest::DeviceError(report) => engine.notify_device_error(report),
        EngineRequest::Shutdown => {}
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending::<()>().await,
    }
}
