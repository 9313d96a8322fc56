use crate::graph::GraphModel;
use crate::ir::Direction;
use crate::layout::{Layout, path_bend_count};
use crate::viewport::ViewportState;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDump {
    pub direction: Direction,
    pub width: f64,
    pub height: f64,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub groups: Vec<GroupDump>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<ViewportState>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDump {
    pub id: String,
    pub group_id: String,
    pub layer: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    pub bends: usize,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDump {
    pub id: String,
    pub expanded: bool,
    pub node_count: usize,
    pub members: Vec<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutDump {
    pub fn from_layout(layout: &Layout, model: &GraphModel, direction: Direction) -> Self {
        let nodes = layout
            .nodes
            .iter()
            .map(|(token, node)| NodeDump {
                id: token.clone(),
                group_id: model
                    .nodes
                    .get(token)
                    .map(|graph_node| graph_node.group_id.clone())
                    .unwrap_or_default(),
                layer: node.layer,
                x: node.bounds.x,
                y: node.bounds.y,
                width: node.bounds.width,
                height: node.bounds.height,
            })
            .collect();

        let edges = layout
            .edges
            .iter()
            .map(|edge| EdgeDump {
                from: edge.from.clone(),
                to: edge.to.clone(),
                bends: path_bend_count(&edge.points),
                points: edge.points.iter().map(|p| [p.x, p.y]).collect(),
            })
            .collect();

        let members = model.groups();
        let groups = layout
            .groups
            .values()
            .map(|group| GroupDump {
                id: group.id.clone(),
                expanded: group.expanded,
                node_count: group.node_count,
                members: members.get(&group.id).cloned().unwrap_or_default(),
                x: group.bounds.x,
                y: group.bounds.y,
                width: group.bounds.width,
                height: group.bounds.height,
            })
            .collect();

        LayoutDump {
            direction,
            width: layout.width,
            height: layout.height,
            nodes,
            edges,
            groups,
            path: None,
            viewport: None,
        }
    }
}

/// Writes the dump as pretty JSON to `path`, or to stdout when `None`.
pub fn write_layout_dump(path: Option<&Path>, dump: &LayoutDump) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)?;
            let writer = BufWriter::new(file);
            serde_json::to_writer_pretty(writer, dump)?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            serde_json::to_writer_pretty(&mut writer, dump)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}
