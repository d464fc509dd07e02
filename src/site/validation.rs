use super::SiteMap;
use std::collections::HashSet;
use std::fmt;

/// Structural problems in a site map
#[derive(Debug, Clone, PartialEq)]
pub enum SiteError {
    DuplicateNode(String),
    DuplicatePlace(String),
    UnknownRelationPlace { place_id: String, node_id: String },
    UnknownRelationNode { place_id: String, node_id: String },
    DuplicateNodeDef { place_id: String, node_def_id: String },
    UnknownCatalogNode { cmd_id: String, node_id: String },
    EmptyScenario(String),
}

impl fmt::Display for SiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteError::DuplicateNode(id) => write!(f, "node '{}' is defined more than once", id),
            SiteError::DuplicatePlace(id) => write!(f, "place '{}' is defined more than once", id),
            SiteError::UnknownRelationPlace { place_id, node_id } => {
                write!(f, "relation {} -> {}: unknown place '{}'", place_id, node_id, place_id)
            }
            SiteError::UnknownRelationNode { place_id, node_id } => {
                write!(f, "relation {} -> {}: unknown node '{}'", place_id, node_id, node_id)
            }
            SiteError::DuplicateNodeDef { place_id, node_def_id } => {
                write!(f, "place '{}' holds more than one '{}' node", place_id, node_def_id)
            }
            SiteError::UnknownCatalogNode { cmd_id, node_id } => {
                write!(f, "command '{}' references unknown node '{}'", cmd_id, node_id)
            }
            SiteError::EmptyScenario(id) => write!(f, "scenario '{}' has no steps", id),
        }
    }
}

impl std::error::Error for SiteError {}

/// Validates a site map before the engine is built from it.
///
/// Rules:
/// - Node and place ids are unique
/// - Place relations reference known places and nodes
/// - A node definition appears at most once per place
/// - Set and flow commands reference known nodes
/// - Scenarios have at least one step
pub fn validate_site_map(site: &SiteMap) -> Result<(), SiteError> {
    let mut node_ids = HashSet::new();
    for node in &site.nodes {
        if !node_ids.insert(node.node_id.as_str()) {
            return Err(SiteError::DuplicateNode(node.node_id.clone()));
        }
    }

    let mut place_ids = HashSet::new();
    for place in &site.places {
        if !place_ids.insert(place.place_id.as_str()) {
            return Err(SiteError::DuplicatePlace(place.place_id.clone()));
        }
    }

    let mut place_defs = HashSet::new();
    let mut relations = HashSet::new();
    for relation in &site.place_relations {
        if !place_ids.contains(relation.place_id.as_str()) {
            return Err(SiteError::UnknownRelationPlace {
                place_id: relation.place_id.clone(),
                node_id: relation.node_id.clone(),
            });
        }
        let Some(node) = site.find_node(&relation.node_id) else {
            return Err(SiteError::UnknownRelationNode {
                place_id: relation.place_id.clone(),
                node_id: relation.node_id.clone(),
            });
        };
        // Repeating the same relation is harmless; a second node of the same kind is not
        if !relations.insert((relation.place_id.as_str(), relation.node_id.as_str())) {
            continue;
        }
        if !place_defs.insert((relation.place_id.as_str(), node.node_def_id.as_str())) {
            return Err(SiteError::DuplicateNodeDef {
                place_id: relation.place_id.clone(),
                node_def_id: node.node_def_id.clone(),
            });
        }
    }

    let check_nodes = |cmd_id: &str, lists: [&Vec<String>; 2]| -> Result<(), SiteError> {
        for node_id in lists.iter().flat_map(|list| list.iter()) {
            if !node_ids.contains(node_id.as_str()) {
                return Err(SiteError::UnknownCatalogNode {
                    cmd_id: cmd_id.to_string(),
                    node_id: node_id.clone(),
                });
            }
        }
        Ok(())
    };

    for set in &site.set_commands {
        check_nodes(&set.cmd_id, [&set.true_node_list, &set.false_node_list])?;
    }
    for flow in &site.flow_commands {
        for dest in &flow.dest_list {
            let cmd_id = format!("{}_TO_{}", flow.src_place_id, dest.dest_place_id);
            check_nodes(&cmd_id, [&dest.true_node_list, &dest.false_node_list])?;
        }
    }

    for scenario in &site.scenario_commands {
        if scenario.scenario_list.is_empty() {
            return Err(SiteError::EmptyScenario(scenario.cmd_id.clone()));
        }
    }

    Ok(())
}
