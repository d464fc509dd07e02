use super::*;
use crate::node::{NodeObserver, NodeStore, NodeUpdate, NodeUpdateDistributor, NodeValue};
use crate::site::{
    NodeInfo, PlaceInfo, PlaceRank, PlaceRelation, PlaceSize, SiteMap, ThresholdBand,
    ThresholdConfig,
};

fn node(id: &str, def: &str) -> NodeInfo {
    NodeInfo {
        node_id: id.to_string(),
        node_name: id.to_string(),
        node_def_id: def.to_string(),
        node_class_id: String::new(),
        data: None,
    }
}

fn band(value: f64, inclusive: bool) -> Option<ThresholdBand> {
    Some(ThresholdBand {
        value,
        is_inclusion_goal: inclusive,
    })
}

fn site() -> SiteMap {
    let level_config = ThresholdConfig {
        node_def_id: "waterLevel".to_string(),
        max_value: band(10.0, true),
        upper_limit_value: band(7.0, false),
        set_value: band(5.0, false),
        lower_limit_value: band(3.0, false),
        min_value: band(1.0, true),
        call_place_rank_list: vec![
            PlaceRank::Single("RV".to_string()),
            PlaceRank::Group(vec!["SEB_2".to_string(), "MISSING".to_string()]),
        ],
        put_place_rank_list: vec![PlaceRank::Single("SEB_2".to_string())],
        group_place_list: vec![],
    };

    SiteMap {
        nodes: vec![
            node("WL_001", "waterLevel"),
            node("S_001", "salinity"),
            node("WL_002", "waterLevel"),
            node("WL_003", "waterLevel"),
        ],
        places: vec![
            PlaceInfo {
                place_id: "SEB_1".to_string(),
                place_name: "Salt pond 1".to_string(),
                place_size: Some(PlaceSize {
                    width: 3456.0,
                    height: 1000.0,
                }),
                threshold_configs: vec![level_config],
            },
            PlaceInfo {
                place_id: "SEB_2".to_string(),
                place_name: "Salt pond 2".to_string(),
                place_size: None,
                threshold_configs: vec![],
            },
            PlaceInfo {
                place_id: "RV".to_string(),
                place_name: "Reservoir".to_string(),
                place_size: None,
                threshold_configs: vec![],
            },
        ],
        place_relations: vec![
            PlaceRelation { place_id: "SEB_1".to_string(), node_id: "WL_001".to_string() },
            PlaceRelation { place_id: "SEB_1".to_string(), node_id: "S_001".to_string() },
            PlaceRelation { place_id: "SEB_2".to_string(), node_id: "WL_002".to_string() },
            PlaceRelation { place_id: "RV".to_string(), node_id: "WL_003".to_string() },
            // Same node def again in SEB_1: ignored, first one wins
            PlaceRelation { place_id: "SEB_1".to_string(), node_id: "WL_003".to_string() },
        ],
        ..Default::default()
    }
}

fn build() -> (NodeStore, NodeUpdateDistributor, PlaceManager) {
    let site = site();
    let nodes = NodeStore::new(&site.nodes);
    let mut distributor = NodeUpdateDistributor::new(&nodes);
    let places = PlaceManager::build(&site, &nodes, &mut distributor);
    (nodes, distributor, places)
}

fn level(nodes: &mut NodeStore, distributor: &NodeUpdateDistributor, places: &mut PlaceManager, value: f64) -> PlaceNodeStatus {
    let (_, deliveries) = distributor.notify(
        nodes,
        vec![NodeUpdate::new("WL_001", Some(NodeValue::Number(value)))],
    );
    let mut status = PlaceNodeStatus::Unknown;
    for delivery in deliveries {
        if let NodeObserver::Place { place_id, node_def_id } = delivery.observer {
            status = places
                .handle_node_update(&place_id, &node_def_id, nodes)
                .unwrap()
                .status;
        }
    }
    status
}

#[test]
fn test_place_storage_is_keyed_by_place_id() {
    let (_, _, places) = build();

    assert_eq!(places.place_storages().len(), 3);
    let seb1 = places.find_place("SEB_1").unwrap();
    assert_eq!(seb1.place_nodes().len(), 2);
    assert_eq!(seb1.get_place_node("waterLevel").unwrap().node_id, "WL_001");
    assert!(places.find_place("NOPE").is_none());
}

#[test]
fn test_place_nodes_subscribe_to_sensors() {
    let (_, distributor, _) = build();

    assert_eq!(distributor.observer_count("WL_001"), 1);
    assert_eq!(distributor.observer_count("S_001"), 1);
    // WL_003 is only installed in RV
    assert_eq!(distributor.observer_count("WL_003"), 1);
}

#[test]
fn test_status_bands() {
    let (mut nodes, distributor, mut places) = build();

    assert_eq!(level(&mut nodes, &distributor, &mut places, 10.0), PlaceNodeStatus::MaxOver);
    assert_eq!(level(&mut nodes, &distributor, &mut places, 9.0), PlaceNodeStatus::UpperLimitOver);
    // Upper limit is exclusive
    assert_eq!(level(&mut nodes, &distributor, &mut places, 7.0), PlaceNodeStatus::Normal);
    assert_eq!(level(&mut nodes, &distributor, &mut places, 2.5), PlaceNodeStatus::LowerLimitUnder);
    // Min is inclusive
    assert_eq!(level(&mut nodes, &distributor, &mut places, 1.0), PlaceNodeStatus::MinUnder);
}

#[test]
fn test_non_numeric_value_is_unknown() {
    let (mut nodes, distributor, mut places) = build();

    let (_, deliveries) = distributor.notify(
        &mut nodes,
        vec![NodeUpdate::new("WL_001", Some(NodeValue::from("ERROR")))],
    );
    assert_eq!(deliveries.len(), 1);
    let update = places.handle_node_update("SEB_1", "waterLevel", &nodes).unwrap();
    assert_eq!(update.status, PlaceNodeStatus::Unknown);
    assert_eq!(update.value, Some(NodeValue::from("ERROR")));
}

#[test]
fn test_rank_lists_resolve_to_storages() {
    let (_, _, places) = build();

    let calls = places.call_place_ranks("SEB_1", "waterLevel");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0][0].place_id, "RV");
    // Unknown ids inside a group are dropped
    assert_eq!(calls[1].len(), 1);
    assert_eq!(calls[1][0].place_id, "SEB_2");

    let puts = places.put_place_ranks("SEB_1", "waterLevel");
    assert_eq!(puts[0][0].place_id, "SEB_2");

    let group = places.group_places("SEB_1", "waterLevel");
    assert_eq!(group.len(), 1);
    assert_eq!(group[0].place_id, "SEB_1");
}

#[test]
fn test_square_meter() {
    let (_, _, places) = build();
    assert_eq!(places.find_place("SEB_1").unwrap().square_meter(), Some(345.6));
    assert_eq!(places.find_place("SEB_2").unwrap().square_meter(), None);
}

#[test]
fn test_reload_place() {
    let (mut nodes, distributor, mut places) = build();
    distributor.notify(
        &mut nodes,
        vec![
            NodeUpdate::new("WL_001", Some(NodeValue::Number(5.0))),
            NodeUpdate::new("S_001", Some(NodeValue::Number(12.0))),
        ],
    );

    let updates = places.reload_place("SEB_1", None, &nodes);
    assert_eq!(updates.len(), 2);
    assert_eq!(
        places.find_place("SEB_1").unwrap().get_node_value("salinity"),
        Some(&NodeValue::Number(12.0))
    );
    assert!(places.reload_place("NOPE", None, &nodes).is_empty());
}
