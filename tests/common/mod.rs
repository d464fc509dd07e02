#![allow(dead_code)]

use floodgate::command::{CommandStep, CommandStepUpdate, CommandType};
use floodgate::config::FloodgateConfig;
use floodgate::device::LoopbackDevice;
use floodgate::engine::{self, ControlEngine, EngineHandle};
use floodgate::site::SiteMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const SITE_TOML: &str = r#"
[[nodes]]
node_id = "G_1"
node_name = "Gate 1"
node_def_id = "waterDoor"
node_class_id = "gate"
data = "CLOSE"

[[nodes]]
node_id = "G_2"
node_name = "Gate 2"
node_def_id = "waterDoor"
node_class_id = "gate"
data = "CLOSE"

[[nodes]]
node_id = "WL_A"
node_def_id = "waterLevel"
data = 10.0

[[places]]
place_id = "A"
place_name = "Pond A"

[[place_relations]]
place_id = "A"
node_id = "WL_A"

[[control_identities]]
node_class_id = "gate"

[[control_identities.controls]]
control_type = "TRUE"
en_name = "OPEN"
display_name = "Open"

[[control_identities.controls]]
control_type = "FALSE"
en_name = "CLOSE"
display_name = "Close"

[[set_commands]]
cmd_id = "OPEN_12"
cmd_name = "Open gates"
true_node_list = ["G_1", "G_2"]

[[scenario_commands]]
cmd_id = "SC_SEQ"

[[scenario_commands.scenario_list]]
wrap_cmd_format = "SINGLE"
single_node_id = ["G_1"]
single_control_type = "TRUE"

[[scenario_commands.scenario_list]]
wrap_cmd_format = "SINGLE"
single_node_id = ["G_2"]
single_control_type = "TRUE"
"#;

pub fn site() -> SiteMap {
    toml::from_str(SITE_TOML).expect("fixture site parses")
}

/// Engine actor wired to a device layer that acknowledges everything.
pub fn spawn_engine(config: &FloodgateConfig) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = engine::channel(config.runtime.request_buffer);
    let device = LoopbackDevice::new(tx.clone());
    let control = ControlEngine::new(site(), config, Box::new(device)).expect("engine builds");
    engine::spawn(control, tx, rx)
}

/// Collect step updates for one command until `done` accepts one.
pub async fn steps_until(
    rx: &mut broadcast::Receiver<CommandStepUpdate>,
    uuid: &str,
    done: impl Fn(&CommandStepUpdate) -> bool,
) -> Vec<CommandStep> {
    let mut steps = Vec::new();
    let collect = async {
        loop {
            match rx.recv().await {
                Ok(update) if update.uuid == uuid => {
                    steps.push(update.step);
                    if done(&update) {
                        return;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("command settled in time");
    steps
}

pub fn is_final_end(update: &CommandStepUpdate) -> bool {
    update.step == CommandStep::End && update.cmd_type == CommandType::Cancel
}
