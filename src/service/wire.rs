//! Flow-graph payloads exchanged with the decomposition endpoint.

use serde::{Deserialize, Serialize};

use super::{DrillDownRequest, DrillDownResult, Edge, Node, ServiceError};
use crate::nav::Level;

const ROOT_NODE_ID: &str = "root";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillDownResponse {
    pub document_id: String,
    pub level: Level,
    pub parent_text: String,
    #[serde(default)]
    pub parent_index: Option<usize>,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub data: FlowNodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeData {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub can_drill_down: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
}

impl DrillDownResponse {
    /// Converts the flow payload into navigable nodes; roots get index 0.
    pub fn into_result(self) -> Result<DrillDownResult, ServiceError> {
        let level = self.level;
        let nodes = self
            .nodes
            .into_iter()
            .map(|node| {
                let is_root = node.data.is_root;
                let index = match (node.data.index, is_root) {
                    (Some(index), _) => index,
                    (None, true) => 0,
                    (None, false) => {
                        return Err(ServiceError::ResponseFormat(format!(
                            "node `{}` is missing data.index",
                            node.id
                        )));
                    }
                };

                Ok(Node {
                    id: node.id,
                    label: node.data.label,
                    index,
                    is_root,
                    can_drill_down: !is_root && node.data.can_drill_down,
                    level: node.data.level.unwrap_or(level),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let edges = self
            .edges
            .into_iter()
            .map(|edge| Edge {
                source: edge.source,
                target: edge.target,
            })
            .collect();

        Ok(DrillDownResult { nodes, edges })
    }

    /// Encodes `parts` the way the decomposition endpoint lays them out: one root
    /// node for the parent followed by one child per part.
    pub fn from_parts(request: &DrillDownRequest, parent_text: &str, parts: &[String]) -> Self {
        let mut nodes = Vec::with_capacity(parts.len() + 1);
        let mut edges = Vec::with_capacity(parts.len());

        if !parts.is_empty() {
            nodes.push(FlowNode {
                id: ROOT_NODE_ID.to_owned(),
                kind: Some("input".to_owned()),
                data: FlowNodeData {
                    label: root_label(request.level).to_owned(),
                    index: None,
                    level: None,
                    is_root: true,
                    can_drill_down: false,
                },
            });
        }

        for (index, part) in parts.iter().enumerate() {
            let node_id = format!("n-{index}");
            nodes.push(FlowNode {
                id: node_id.clone(),
                kind: Some("default".to_owned()),
                data: FlowNodeData {
                    label: part.clone(),
                    index: Some(index),
                    level: Some(request.level),
                    is_root: false,
                    can_drill_down: request.level.next().is_some(),
                },
            });
            edges.push(FlowEdge {
                id: format!("e-{index}"),
                source: ROOT_NODE_ID.to_owned(),
                target: node_id,
            });
        }

        Self {
            document_id: request.document_id.clone(),
            level: request.level,
            parent_text: parent_text.to_owned(),
            parent_index: request.parent_index,
            nodes,
            edges,
        }
    }
}

fn root_label(level: Level) -> &'static str {
    match level {
        Level::List | Level::Lines => "Paragraph",
        Level::Words => "Line",
        Level::Characters => "Word",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flow_payload_maps_roots_and_children() {
        let payload = json!({
            "documentId": "doc",
            "level": 2,
            "parentText": "hello world",
            "parentIndex": 1,
            "nodes": [
                {"id": "root", "type": "input", "data": {"label": "Line", "isRoot": true}, "position": {"x": 0.0, "y": 0.0}},
                {"id": "n-0", "type": "default", "data": {"label": "hello", "index": 0, "level": 2, "documentId": "doc", "canDrillDown": true, "nextLevel": 3}, "position": {"x": 50.0, "y": 120.0}},
                {"id": "n-1", "type": "default", "data": {"label": "world", "index": 1, "level": 2, "documentId": "doc", "canDrillDown": true, "nextLevel": 3}, "position": {"x": 50.0, "y": 210.0}}
            ],
            "edges": [
                {"id": "e-0", "source": "root", "target": "n-0", "type": "smoothstep", "animated": true},
                {"id": "e-1", "source": "root", "target": "n-1", "type": "smoothstep", "animated": true}
            ]
        });

        let response: DrillDownResponse =
            serde_json::from_value(payload).expect("payload should deserialize");
        let result = response.into_result().expect("payload should convert");

        assert_eq!(result.nodes.len(), 3);
        assert!(result.nodes[0].is_root);
        assert!(!result.nodes[0].can_drill_down);
        assert_eq!(result.nodes[0].level, Level::Words);
        assert_eq!(result.item_at(1).map(|node| node.label.as_str()), Some("world"));
        assert_eq!(result.edges[1].target, "n-1");
    }

    #[test]
    fn child_without_index_is_a_format_error() {
        let response = DrillDownResponse {
            document_id: "doc".to_owned(),
            level: Level::Lines,
            parent_text: String::new(),
            parent_index: None,
            nodes: vec![FlowNode {
                id: "n-0".to_owned(),
                kind: None,
                data: FlowNodeData {
                    label: "A".to_owned(),
                    index: None,
                    level: None,
                    is_root: false,
                    can_drill_down: true,
                },
            }],
            edges: Vec::new(),
        };

        let error = response.into_result().expect_err("conversion should fail");
        assert!(error.to_string().contains("missing data.index"));
    }

    #[test]
    fn character_level_parts_are_not_drillable() {
        let request = DrillDownRequest {
            document_id: "doc".to_owned(),
            level: Level::Characters,
            parent_text: "ab".to_owned(),
            parent_index: Some(0),
            delimiter: None,
        };
        let parts = vec!["a".to_owned(), "b".to_owned()];

        let result = DrillDownResponse::from_parts(&request, "ab", &parts)
            .into_result()
            .expect("encoded payload should convert");

        assert_eq!(result.item_count(), 2);
        assert!(result.items().all(|node| !node.can_drill_down));
    }

    #[test]
    fn empty_parts_produce_no_root() {
        let request = DrillDownRequest {
            document_id: "doc".to_owned(),
            level: Level::Lines,
            parent_text: String::new(),
            parent_index: None,
            delimiter: None,
        };

        let response = DrillDownResponse::from_parts(&request, "", &[]);
        assert!(response.nodes.is_empty());
        assert!(response.edges.is_empty());
    }
}
