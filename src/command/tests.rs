use super::*;
use crate::device::{DeviceMessageCode, MockDevice};
use crate::node::{NodeObserver, NodeUpdate};
use crate::site::SiteMap;
use std::time::{Duration, Instant};

const SITE_JSON: &str = r#"{
    "nodes": [
        { "node_id": "G_1", "node_name": "Gate 1", "node_def_id": "waterDoor", "node_class_id": "gate", "data": "CLOSE" },
        { "node_id": "G_2", "node_name": "Gate 2", "node_def_id": "waterDoor", "node_class_id": "gate", "data": "CLOSE" },
        { "node_id": "WL_1", "node_def_id": "waterLevel", "data": 5.0 },
        { "node_id": "WL_2", "node_def_id": "waterLevel", "data": 6.0 }
    ],
    "control_identities": [
        { "node_class_id": "gate", "controls": [
            { "control_type": "TRUE", "en_name": "OPEN", "display_name": "Open" },
            { "control_type": "FALSE", "en_name": "CLOSE", "display_name": "Close" }
        ] }
    ]
}"#;

fn context(device: &MockDevice) -> CommandContext {
    let site: SiteMap = serde_json::from_str(SITE_JSON).unwrap();
    CommandContext::new(
        &site,
        Box::new(device.clone()),
        CommandSettings::default(),
        ExpressionEngine::new(10_000),
    )
}

fn wrap(containers: Vec<ContainerCmd>, goal: Option<GoalInfo>) -> CommandWrapInfo {
    let mut req = ReqCommandInfo::new(CommandFormat::Set, "OPEN_ALL", "Open all");
    req.goal = goal;
    CommandWrapInfo::from_request(&req, containers)
}

fn gates(control_type: ControlType) -> Vec<ContainerCmd> {
    vec![
        ContainerCmd::new("G_1", control_type),
        ContainerCmd::new("G_2", control_type),
    ]
}

fn goal(node_id: &str, value: f64, range: GoalRange) -> GoalData {
    GoalData {
        node_id: Some(node_id.to_string()),
        goal_value: Some(NodeValue::Number(value)),
        goal_range: range,
        group_id: None,
        is_inclusion_goal: false,
        is_complete_clear: false,
        expression: None,
    }
}

fn started(storage: &mut CommandStorage, ctx: &mut CommandContext) {
    storage.update_command_step(CommandStep::Wait, ctx);
    storage.execute_command_from_dlc(ctx);
}

fn ack(storage: &mut CommandStorage, idx: usize, code: DeviceMessageCode, ctx: &mut CommandContext) {
    let element_uuid = storage.elements()[idx].uuid.clone();
    assert!(storage.handle_element_message(&element_uuid, code, ctx));
}

/// Run deferred work addressed to this storage.
fn run_deferred(storage: &mut CommandStorage, ctx: &mut CommandContext) {
    while let Some(task) = ctx.tasks.pop_deferred() {
        match task {
            DeferredTask::Clear(uuid) if uuid == storage.uuid() => storage.handle_command_clear(None, ctx),
            DeferredTask::Restore(uuid) if uuid == storage.uuid() => storage.run_restore(ctx),
            _ => {}
        }
    }
}

fn goal_observers(ctx: &CommandContext) -> usize {
    ctx.distributor
        .count_where(|observer| matches!(observer, NodeObserver::Goal { .. }))
}

#[test]
fn test_element_dispatches_once() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let wrap = wrap(gates(ControlType::True), None);
    let mut element = CommandElement::new(&wrap.containers[0]);
    let info = element.execute_info("wrap-1", &wrap);

    assert_eq!(element.execute(&info, ctx.device.as_mut()), Ok(false));
    assert_eq!(element.execute(&info, ctx.device.as_mut()), Ok(false));
    assert_eq!(device.request_count("G_1"), 1);
    assert_eq!(device.requests()[0].wrap_cmd_uuid, "wrap-1");

    assert!(element.update_command(DeviceMessageCode::ExecutionStart));
    assert_eq!(element.step(), ElementStep::Proceed);
    assert!(!element.update_command(DeviceMessageCode::ExecutionStart));
    assert!(element.update_command(DeviceMessageCode::ExecutionTerminate));
    assert!(element.is_clear());
    assert!(!element.update_command(DeviceMessageCode::Delete));
}

#[test]
fn test_element_cancel_without_dispatch_completes_locally() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut element = CommandElement::new(&ContainerCmd::new("G_1", ControlType::True));

    assert!(element.cancel("wrap-1", ctx.device.as_mut()));
    assert!(element.is_clear());
    assert!(device.deletes().is_empty());
}

#[test]
fn test_element_cancel_after_dispatch_waits_for_delete() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let wrap = wrap(gates(ControlType::True), None);
    let mut element = CommandElement::new(&wrap.containers[0]);
    let info = element.execute_info("wrap-1", &wrap);
    element.execute(&info, ctx.device.as_mut()).unwrap();

    assert!(!element.cancel("wrap-1", ctx.device.as_mut()));
    assert!(!element.is_clear());
    assert_eq!(device.deletes()[0].element_uuid, element.uuid);

    assert!(element.update_command(DeviceMessageCode::Delete));
    assert!(element.is_clear());
}

#[test]
fn test_element_rejected_request_is_not_dispatched() {
    let device = MockDevice::new();
    device.mark_failing("G_1");
    let mut ctx = context(&device);
    let wrap = wrap(gates(ControlType::True), None);
    let mut element = CommandElement::new(&wrap.containers[0]);
    let info = element.execute_info("wrap-1", &wrap);

    assert!(element.execute(&info, ctx.device.as_mut()).is_err());
    assert!(!element.is_dispatched());
    assert!(!element.is_clear());
}

#[test]
fn test_storage_wait_proceed_complete() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    started(&mut storage, &mut ctx);
    assert_eq!(device.requests().len(), 2);
    assert_eq!(storage.step(), Some(CommandStep::Wait));

    ack(&mut storage, 0, DeviceMessageCode::ExecutionStart, &mut ctx);
    assert_eq!(storage.step(), Some(CommandStep::Proceed));
    ack(&mut storage, 0, DeviceMessageCode::ExecutionTerminate, &mut ctx);
    assert_eq!(storage.step(), Some(CommandStep::Proceed));
    ack(&mut storage, 1, DeviceMessageCode::ExecutionTerminate, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::Complete));
    assert_eq!(
        storage.history(),
        &[CommandStep::Wait, CommandStep::Proceed, CommandStep::Complete]
    );

    let mut steps = Vec::new();
    while let Some(notice) = ctx.tasks.pop_notice() {
        assert_eq!(notice.update.uuid, storage.uuid());
        steps.push(notice.update.step);
    }
    assert_eq!(steps, storage.history());
}

#[test]
fn test_storage_refuses_backward_transition() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    started(&mut storage, &mut ctx);

    assert!(!storage.update_command_step(CommandStep::Wait, &mut ctx));
    assert!(storage.update_command_step(CommandStep::Complete, &mut ctx));
    assert!(!storage.update_command_step(CommandStep::Proceed, &mut ctx));
    assert!(storage.update_command_step(CommandStep::End, &mut ctx));
    // END only reopens for a cancellation
    assert!(!storage.update_command_step(CommandStep::Restore, &mut ctx));
}

#[test]
fn test_storage_satisfied_devices_complete_without_acks() {
    let device = MockDevice::new();
    device.mark_satisfied("G_1");
    device.mark_satisfied("G_2");
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    started(&mut storage, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::Complete));
    assert_eq!(storage.history(), &[CommandStep::Wait, CommandStep::Complete]);
}

#[test]
fn test_storage_with_only_ignored_elements_completes_deferred() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut containers = gates(ControlType::True);
    for container in &mut containers {
        container.ignore = true;
    }
    let mut storage = CommandStorage::new(wrap(containers, None));
    started(&mut storage, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::Wait));
    assert!(device.requests().is_empty());

    run_deferred(&mut storage, &mut ctx);
    assert_eq!(storage.step(), Some(CommandStep::Complete));
}

#[test]
fn test_storage_goal_runs_until_reached() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let goal_info = GoalInfo {
        goal_data_list: vec![goal("WL_1", 8.0, GoalRange::Upper)],
        limit_time_sec: None,
    };
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), Some(goal_info)));
    started(&mut storage, &mut ctx);
    ack(&mut storage, 0, DeviceMessageCode::ExecutionTerminate, &mut ctx);
    ack(&mut storage, 1, DeviceMessageCode::ExecutionTerminate, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::Running));
    assert!(storage.threshold().is_some());
    assert_eq!(goal_observers(&ctx), 1);

    ctx.distributor
        .notify(&mut ctx.nodes, vec![NodeUpdate::new("WL_1", Some(NodeValue::Number(7.0)))]);
    storage.handle_goal_update(0, &mut ctx);
    assert_eq!(storage.step(), Some(CommandStep::Running));

    let (_, deliveries) = ctx
        .distributor
        .notify(&mut ctx.nodes, vec![NodeUpdate::new("WL_1", Some(NodeValue::Number(9.0)))]);
    assert_eq!(deliveries.len(), 1);
    storage.handle_goal_update(0, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::End));
    assert!(storage.threshold().is_none());
    assert_eq!(goal_observers(&ctx), 0);
}

#[test]
fn test_storage_goal_already_met_ends_directly() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let goal_info = GoalInfo {
        goal_data_list: vec![goal("WL_1", 6.0, GoalRange::Lower)],
        limit_time_sec: None,
    };
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), Some(goal_info)));
    started(&mut storage, &mut ctx);
    ack(&mut storage, 0, DeviceMessageCode::ExecutionTerminate, &mut ctx);
    ack(&mut storage, 1, DeviceMessageCode::ExecutionTerminate, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::End));
    assert!(storage.threshold().is_none());
    assert_eq!(goal_observers(&ctx), 0);
}

#[test]
fn test_storage_time_limit_ends_goal() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let goal_info = GoalInfo {
        goal_data_list: vec![],
        limit_time_sec: Some(2.0),
    };
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), Some(goal_info)));
    started(&mut storage, &mut ctx);
    ack(&mut storage, 0, DeviceMessageCode::ExecutionTerminate, &mut ctx);
    ack(&mut storage, 1, DeviceMessageCode::ExecutionTerminate, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::Running));
    assert_eq!(ctx.timers.len(), 1);
    assert!(ctx.timers.take_due(Instant::now()).is_empty());

    let due = ctx.timers.take_due(Instant::now() + Duration::from_secs(3));
    assert_eq!(
        due,
        vec![TimerOwner::Threshold {
            storage_uuid: storage.uuid().to_string()
        }]
    );
    storage.handle_threshold_clear(&mut ctx);
    assert_eq!(storage.step(), Some(CommandStep::End));
    assert!(ctx.timers.is_empty());
}

#[test]
fn test_storage_cancel_then_restore() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    started(&mut storage, &mut ctx);
    ack(&mut storage, 0, DeviceMessageCode::ExecutionStart, &mut ctx);

    let restore = vec![ContainerCmd::new("G_1", ControlType::False)];
    assert_eq!(storage.cancel_command(restore, &mut ctx), CancelOutcome::Canceling);
    assert_eq!(storage.step(), Some(CommandStep::Canceling));
    assert_eq!(storage.wrap_info().cmd_type, CommandType::Cancel);
    assert_eq!(device.deletes().len(), 2);
    assert!(storage.elements().iter().all(|el| !el.is_live));
    assert_eq!(
        storage.cancel_command(Vec::new(), &mut ctx),
        CancelOutcome::AlreadyCanceling
    );

    ack(&mut storage, 0, DeviceMessageCode::Delete, &mut ctx);
    ack(&mut storage, 1, DeviceMessageCode::Delete, &mut ctx);
    run_deferred(&mut storage, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::Restore));
    assert_eq!(storage.elements().len(), 1);
    let last = device.requests().pop().unwrap();
    assert_eq!(last.node_id, "G_1");
    assert_eq!(last.control_type, ControlType::False);
    assert_eq!(last.wrap_cmd_type, CommandType::Cancel);

    ack(&mut storage, 0, DeviceMessageCode::ExecutionTerminate, &mut ctx);
    assert_eq!(storage.step(), Some(CommandStep::End));
    assert_eq!(
        storage.history(),
        &[
            CommandStep::Wait,
            CommandStep::Proceed,
            CommandStep::Canceling,
            CommandStep::Restore,
            CommandStep::End
        ]
    );
}

#[test]
fn test_storage_cancel_before_dispatch_ends_at_once() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    storage.update_command_step(CommandStep::Wait, &mut ctx);

    assert_eq!(storage.cancel_command(Vec::new(), &mut ctx), CancelOutcome::Ended);
    assert_eq!(storage.step(), Some(CommandStep::End));
    assert!(device.deletes().is_empty());
    assert_eq!(storage.cancel_command(Vec::new(), &mut ctx), CancelOutcome::Ended);
}

#[test]
fn test_storage_dispatch_failure_cancels_itself() {
    let device = MockDevice::new();
    device.mark_failing("G_2");
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    started(&mut storage, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::Canceling));
    assert_eq!(storage.wrap_info().cmd_type, CommandType::Cancel);
    assert_eq!(device.request_count("G_1"), 1);
    assert_eq!(device.deletes().len(), 1);
    assert!(storage.elements()[1].is_clear());

    ack(&mut storage, 0, DeviceMessageCode::Delete, &mut ctx);
    assert_eq!(storage.step(), Some(CommandStep::End));
}

#[test]
fn test_storage_failed_restore_is_abandoned() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    started(&mut storage, &mut ctx);
    ack(&mut storage, 0, DeviceMessageCode::ExecutionTerminate, &mut ctx);
    ack(&mut storage, 1, DeviceMessageCode::ExecutionTerminate, &mut ctx);
    assert_eq!(storage.step(), Some(CommandStep::Complete));

    device.mark_failing("G_1");
    let restore = vec![ContainerCmd::new("G_1", ControlType::False)];
    assert_eq!(storage.cancel_command(restore, &mut ctx), CancelOutcome::Restoring);
    run_deferred(&mut storage, &mut ctx);

    assert_eq!(storage.step(), Some(CommandStep::End));
    assert_eq!(storage.history().last(), Some(&CommandStep::End));
    assert!(storage.history().contains(&CommandStep::Restore));
}

#[test]
fn test_threshold_groups_honor_complete_clear() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut plain = goal("WL_1", 8.0, GoalRange::Upper);
    plain.group_id = Some("A".to_string());
    let mut decisive = goal("WL_2", 8.0, GoalRange::Upper);
    decisive.group_id = Some("A".to_string());
    decisive.is_complete_clear = true;
    let info = GoalInfo {
        goal_data_list: vec![plain, decisive],
        limit_time_sec: None,
    };
    let threshold = ThresholdStorage::new(&info, &ctx.expressions);
    assert!(!threshold.is_threshold_clear(&ctx.nodes, &ctx.expressions));

    ctx.distributor
        .notify(&mut ctx.nodes, vec![NodeUpdate::new("WL_1", Some(NodeValue::Number(9.0)))]);
    assert!(threshold.is_goal_clear(0, &ctx.nodes, &ctx.expressions));
    assert!(!threshold.is_threshold_clear(&ctx.nodes, &ctx.expressions));

    ctx.distributor.notify(
        &mut ctx.nodes,
        vec![
            NodeUpdate::new("WL_1", Some(NodeValue::Number(1.0))),
            NodeUpdate::new("WL_2", Some(NodeValue::Number(9.0))),
        ],
    );
    assert!(threshold.is_threshold_clear(&ctx.nodes, &ctx.expressions));
    assert!(threshold.is_reached_at_start(&ctx.nodes, &ctx.expressions));
}

#[test]
fn test_threshold_every_group_must_clear() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut first = goal("WL_1", 8.0, GoalRange::Upper);
    first.group_id = Some("A".to_string());
    let mut second = goal("WL_2", 8.0, GoalRange::Upper);
    second.group_id = Some("B".to_string());
    let info = GoalInfo {
        goal_data_list: vec![first, second],
        limit_time_sec: None,
    };
    let threshold = ThresholdStorage::new(&info, &ctx.expressions);

    ctx.distributor
        .notify(&mut ctx.nodes, vec![NodeUpdate::new("WL_1", Some(NodeValue::Number(9.0)))]);
    assert!(!threshold.is_threshold_clear(&ctx.nodes, &ctx.expressions));

    ctx.distributor
        .notify(&mut ctx.nodes, vec![NodeUpdate::new("WL_2", Some(NodeValue::Number(9.0)))]);
    assert!(threshold.is_threshold_clear(&ctx.nodes, &ctx.expressions));
}

#[test]
fn test_goal_is_reached_ranges() {
    let engine = ExpressionEngine::default();
    let mut data = goal("WL_1", 5.0, GoalRange::Lower);
    let lower = ThresholdGoal::new(&data, &engine);
    assert!(lower.is_reached(Some(&NodeValue::Number(4.9))));
    assert!(!lower.is_reached(Some(&NodeValue::Number(5.0))));
    assert!(!lower.is_reached(None));

    data.is_inclusion_goal = true;
    let inclusive = ThresholdGoal::new(&data, &engine);
    assert!(inclusive.is_reached(Some(&NodeValue::Number(5.0))));

    data.goal_range = GoalRange::Upper;
    data.is_inclusion_goal = false;
    let upper = ThresholdGoal::new(&data, &engine);
    assert!(upper.is_reached(Some(&NodeValue::Number(5.1))));
    assert!(!upper.is_reached(Some(&NodeValue::Text("5.1".to_string()))));

    let text = ThresholdGoal::new(
        &GoalData {
            goal_value: Some(NodeValue::Text("OPEN".to_string())),
            goal_range: GoalRange::Equal,
            ..goal("G_1", 0.0, GoalRange::Equal)
        },
        &engine,
    );
    assert!(text.is_reached(Some(&NodeValue::Text("open".to_string()))));
    assert!(!text.is_reached(Some(&NodeValue::Text("CLOSE".to_string()))));
}

#[test]
fn test_expression_goal() {
    let device = MockDevice::new();
    let ctx = context(&device);
    let nodes = vec!["WL_1".to_string(), "WL_2".to_string()];

    let boolean = ThresholdGoal::new(
        &GoalData {
            node_id: None,
            goal_value: None,
            expression: Some(ExpressionInfo {
                expression: "WL_1 + WL_2 > 10.0".to_string(),
                node_list: nodes.clone(),
            }),
            ..goal("WL_1", 0.0, GoalRange::Equal)
        },
        &ctx.expressions,
    );
    assert_eq!(boolean.observed_nodes(), nodes);
    assert!(boolean.is_clear(&ctx.nodes, &ctx.expressions));

    let numeric = ThresholdGoal::new(
        &GoalData {
            node_id: None,
            expression: Some(ExpressionInfo {
                expression: "WL_1 * 2.0".to_string(),
                node_list: vec!["WL_1".to_string()],
            }),
            ..goal("WL_1", 9.0, GoalRange::Upper)
        },
        &ctx.expressions,
    );
    assert!(numeric.is_clear(&ctx.nodes, &ctx.expressions));

    let broken = ThresholdGoal::new(
        &GoalData {
            expression: Some(ExpressionInfo {
                expression: "WL_1 >".to_string(),
                node_list: vec!["WL_1".to_string()],
            }),
            ..goal("WL_1", 0.0, GoalRange::Lower)
        },
        &ctx.expressions,
    );
    assert!(!broken.is_clear(&ctx.nodes, &ctx.expressions));
}

#[test]
fn test_timer_queue_fires_in_deadline_order() {
    let mut timers = TimerQueue::default();
    let now = Instant::now();
    let owner = |id: &str| TimerOwner::Threshold {
        storage_uuid: id.to_string(),
    };

    timers.schedule_at(now + Duration::from_secs(5), owner("late"));
    let cancelled = timers.schedule_at(now + Duration::from_secs(1), owner("cancelled"));
    timers.schedule_at(now + Duration::from_secs(2), owner("early"));
    assert!(timers.cancel(cancelled));
    assert!(!timers.cancel(cancelled));
    assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(2)));

    let due = timers.take_due(now + Duration::from_secs(10));
    assert_eq!(due, vec![owner("early"), owner("late")]);
    assert!(timers.is_empty());
    assert_eq!(timers.next_deadline(), None);
}

#[test]
fn test_task_queue_is_fifo_per_kind() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    storage.update_command_step(CommandStep::Wait, &mut ctx);

    ctx.tasks.defer(DeferredTask::Dispatch("a".to_string()));
    ctx.tasks.defer(DeferredTask::Restore("b".to_string()));
    assert!(!ctx.tasks.is_empty());

    let notice = ctx.tasks.pop_notice().unwrap();
    assert_eq!(notice.update.step, CommandStep::Wait);
    assert!(ctx.tasks.pop_notice().is_none());
    assert_eq!(ctx.tasks.pop_deferred(), Some(DeferredTask::Dispatch("a".to_string())));
    assert_eq!(ctx.tasks.pop_deferred(), Some(DeferredTask::Restore("b".to_string())));
    assert!(ctx.tasks.is_empty());
}

#[test]
fn test_notice_snapshots_observers() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    storage.attach_observer(StepObserver::Strategy);
    storage.attach_observer(StepObserver::Strategy);
    assert_eq!(storage.observers().len(), 1);

    storage.update_command_step(CommandStep::Wait, &mut ctx);
    assert!(storage.detach_observer(&StepObserver::Strategy));

    let notice = ctx.tasks.pop_notice().unwrap();
    assert_eq!(notice.observers, vec![StepObserver::Strategy]);
    assert!(storage.observers().is_empty());
}

#[test]
fn test_filters() {
    let device = MockDevice::new();
    let mut ctx = context(&device);
    let mut storage = CommandStorage::new(wrap(gates(ControlType::True), None));
    storage.update_command_step(CommandStep::Wait, &mut ctx);

    assert!(StorageFilter::by_cmd_id("OPEN_ALL").matches(&storage));
    assert!(StorageFilter::by_uuid(storage.uuid()).matches(&storage));
    let waiting_set = StorageFilter {
        format: Some(CommandFormat::Set),
        step: Some(CommandStep::Wait),
        ..Default::default()
    };
    assert!(waiting_set.matches(&storage));
    let flows = StorageFilter {
        src_place_id: Some("SEB_1".to_string()),
        ..Default::default()
    };
    assert!(!flows.matches(&storage));

    let element = &storage.elements()[0];
    assert!(ElementFilter::live_on("G_1", ControlType::True).matches(element));
    assert!(!ElementFilter::live_on("G_1", ControlType::False).matches(element));
    assert!(!ElementFilter::live_on("G_2", ControlType::True).matches(element));
}

#[test]
fn test_wrap_info_round_trips_to_request() {
    let req = ReqCommandInfo::new(CommandFormat::Single, "G_1_OPEN", "Gate 1 Open")
        .with_element(ControlType::True, &["G_1"])
        .with_rank(rank::FIRST);
    let wrap = CommandWrapInfo::from_request(&req, vec![ContainerCmd::new("G_1", ControlType::True)]);

    assert_eq!(wrap.to_request(), req);
    assert_eq!(ControlType::True.opposite(), Some(ControlType::False));
    assert_eq!(ControlType::Measure.opposite(), None);
}
