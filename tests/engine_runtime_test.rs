// Integration tests for the engine actor over a loopback device layer

mod common;

use common::{is_final_end, spawn_engine, steps_until};
use floodgate::command::{CommandStep, ControlType, GoalInfo};
use floodgate::config::FloodgateConfig;
use floodgate::engine::{ControlRequest, Dispatched};
use floodgate::error::CommandError;
use floodgate::exec::ControlOptions;
use floodgate::node::{NodeUpdate, NodeValue};
use floodgate::strategy::StrategyMode;
use std::time::Duration;

#[tokio::test]
async fn test_set_command_completes_through_actor() {
    let (handle, task) = spawn_engine(&FloodgateConfig::default());
    let mut steps = handle.subscribe_steps();

    let dispatched = handle
        .command(ControlRequest::Set {
            cmd_id: "OPEN_12".to_string(),
            options: ControlOptions::default(),
        })
        .await
        .unwrap();
    let Dispatched::Command(uuid) = dispatched else {
        panic!("expected a command");
    };

    let seen = steps_until(&mut steps, &uuid, |u| u.step == CommandStep::Complete).await;
    assert_eq!(seen.first(), Some(&CommandStep::Wait));
    assert_eq!(seen.last(), Some(&CommandStep::Complete));
    assert!(handle.board().is_empty());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_goal_time_limit_restores_devices() {
    let mut config = FloodgateConfig::default();
    config.command.limit_time_unit_ms = 10;
    let (handle, task) = spawn_engine(&config);
    let mut steps = handle.subscribe_steps();

    let goal = GoalInfo {
        goal_data_list: vec![],
        limit_time_sec: Some(2.0),
    };
    let dispatched = handle
        .command(ControlRequest::Single {
            node_ids: vec!["G_1".to_string()],
            control_type: ControlType::True,
            set_value: None,
            options: ControlOptions::default().with_goal(goal),
        })
        .await
        .unwrap();
    let uuid = dispatched.uuid().unwrap().to_string();

    let seen = steps_until(&mut steps, &uuid, is_final_end).await;
    assert!(seen.contains(&CommandStep::Running));
    assert!(seen.contains(&CommandStep::Restore));
    assert_eq!(seen.last(), Some(&CommandStep::End));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_scenario_runs_to_completion() {
    let (handle, task) = spawn_engine(&FloodgateConfig::default());
    let mut steps = handle.subscribe_steps();

    let dispatched = handle
        .command(ControlRequest::Scenario {
            cmd_id: "SC_SEQ".to_string(),
            options: ControlOptions::default(),
        })
        .await
        .unwrap();
    assert!(matches!(dispatched, Dispatched::Scenario(_)));

    let mut completed = Vec::new();
    let wait = async {
        while completed.len() < 2 {
            if let Ok(update) = steps.recv().await {
                if update.step == CommandStep::Complete {
                    completed.push(update.cmd_id);
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap();
    assert_eq!(completed, vec!["G_1_OPEN".to_string(), "G_2_OPEN".to_string()]);
    assert!(handle.running_scenario().await.unwrap().is_none());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_strategy_change_and_mode_rules() {
    let (handle, task) = spawn_engine(&FloodgateConfig::default());

    assert!(!handle.change_cmd_strategy(StrategyMode::Manual).await.unwrap());
    assert!(handle
        .change_cmd_strategy(StrategyMode::OverlapCount)
        .await
        .unwrap());

    let err = handle
        .command(ControlRequest::Scenario {
            cmd_id: "SC_SEQ".to_string(),
            options: ControlOptions::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotAvailableInMode { .. }));

    let err = handle
        .command(ControlRequest::Cancel {
            cmd_id: "OPEN_12".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CommandError::CommandNotFound {
            cmd_id: "OPEN_12".to_string()
        }
    );
    assert_eq!(handle.metrics().get_snapshot().rejected, 2);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_device_data_is_published_to_places() {
    let (handle, task) = spawn_engine(&FloodgateConfig::default());
    let mut places = handle.subscribe_places();

    handle
        .notify_device_data(vec![NodeUpdate::new("WL_A", Some(NodeValue::Number(3.5)))])
        .await
        .unwrap();

    let update = tokio::time::timeout(Duration::from_secs(5), places.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.place_id, "A");
    assert_eq!(update.node_id, "WL_A");
    assert_eq!(update.value, Some(NodeValue::Number(3.5)));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_handle_fails_after_shutdown() {
    let (handle, task) = spawn_engine(&FloodgateConfig::default());
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let err = handle
        .command(ControlRequest::Set {
            cmd_id: "OPEN_12".to_string(),
            options: ControlOptions::default(),
        })
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::EngineUnavailable);
}
