// Integration tests for loading site maps and configuration from disk

mod common;

use floodgate::config::{load_config, FloodgateConfig};
use floodgate::device::MockDevice;
use floodgate::engine::ControlEngine;
use floodgate::site::SiteMap;
use floodgate::strategy::StrategyMode;
use std::io::Write;

fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_toml_site_map() {
    let file = write_file(".toml", common::SITE_TOML);
    let site = SiteMap::load(file.path()).unwrap();

    assert_eq!(site.nodes.len(), 3);
    assert_eq!(site.find_node("G_1").unwrap().node_name, "Gate 1");
    assert!(site.find_set_command("OPEN_12").is_some());
    assert_eq!(site.find_scenario("SC_SEQ").unwrap().scenario_count, 1);
}

#[test]
fn test_load_json_site_map_matches_toml() {
    let json = serde_json::to_string(&common::site()).unwrap();
    let file = write_file(".json", &json);
    let site = SiteMap::load(file.path()).unwrap();

    assert_eq!(site.nodes.len(), 3);
    assert_eq!(site.place_relations.len(), 1);
}

#[test]
fn test_invalid_site_map_is_rejected_on_load() {
    let file = write_file(
        ".json",
        r#"{ "set_commands": [ { "cmd_id": "S", "true_node_list": ["NOPE"] } ] }"#,
    );
    let err = SiteMap::load(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("validation"));

    assert!(SiteMap::load("/nonexistent/site.toml").is_err());
}

#[test]
fn test_config_file_drives_engine() {
    let site_file = write_file(".toml", common::SITE_TOML);
    let config_file = write_file(
        ".toml",
        &format!(
            r#"
[site]
map_path = "{}"

[command]
strategy = "OVERLAP_COUNT"
skip_same_state = false
"#,
            site_file.path().display()
        ),
    );

    let config: FloodgateConfig = load_config(config_file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.command.strategy, StrategyMode::OverlapCount);
    assert!(!config.command.skip_same_state);

    let site = SiteMap::load(&config.site.map_path).unwrap();
    let engine = ControlEngine::new(site, &config, Box::new(MockDevice::new())).unwrap();
    assert_eq!(engine.mode(), StrategyMode::OverlapCount);
    assert_eq!(engine.nodes().len(), 3);
    assert_eq!(engine.places().place_storages().len(), 1);
}
