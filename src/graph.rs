//! Normalized in-memory dependency graph.
//!
//! Nodes are keyed by a token derived from their structured key. Dependencies
//! may point at nodes that are not part of the loaded set; those are kept as
//! external references so their edges can still be drawn as stubs.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::{AssetKey, GraphDefinition, NodeDefinition, RawNode};

/// Group id assigned to nodes that declare no group information.
pub const UNGROUPED_GROUP_ID: &str = "__ungrouped__";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node at index {index} has no structured key")]
    MissingKey { index: usize },
    #[error("node at index {index} has an empty key segment")]
    EmptyKeySegment { index: usize },
    #[error("duplicate node `{token}`")]
    DuplicateNode { token: String },
    #[error("edge references an empty token")]
    UnknownEdgeEndpoint { token: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub definition: NodeDefinition,
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    pub nodes: IndexMap<String, GraphNode>,
    pub downstream: BTreeMap<String, BTreeSet<String>>,
    pub upstream: BTreeMap<String, BTreeSet<String>>,
    /// Tokens referenced by an edge but absent from `nodes`.
    pub external: BTreeSet<String>,
}

/// Backslash-escapes the characters tokens and group ids use as separators,
/// so a node token never contains a bare `@` and never equals a group id.
fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        if matches!(ch, '\\' | '/' | '@') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Canonical token for a structured key.
pub fn token_for_segments(segments: &[String]) -> String {
    segments
        .iter()
        .map(|segment| escape_segment(segment))
        .collect::<Vec<_>>()
        .join("/")
}

pub fn token_for_key(key: &AssetKey) -> String {
    token_for_segments(&key.path)
}

/// Stable group id for a node definition.
pub fn group_id_for(definition: &NodeDefinition) -> String {
    match definition.group_info() {
        Some(info) => format!(
            "{}@{}@{}",
            escape_segment(&info.group_name),
            escape_segment(&info.repository_name),
            escape_segment(&info.repository_location_name)
        ),
        None => UNGROUPED_GROUP_ID.to_string(),
    }
}

fn token_for_definition(definition: &NodeDefinition, index: usize) -> Result<String, GraphError> {
    let segments = definition
        .structured_key()
        .ok_or(GraphError::MissingKey { index })?;
    if segments.is_empty() {
        return Err(GraphError::MissingKey { index });
    }
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(GraphError::EmptyKeySegment { index });
    }
    Ok(token_for_segments(segments))
}

impl GraphModel {
    /// Builds the model from raw records. Dependencies on unloaded nodes are
    /// kept and their tokens recorded in `external`.
    pub fn build(raw_nodes: &[RawNode]) -> Result<Self, GraphError> {
        let mut model = GraphModel::default();
        let mut tokens = Vec::with_capacity(raw_nodes.len());
        for (index, raw) in raw_nodes.iter().enumerate() {
            tokens.push(model.insert_node(&raw.definition, index)?);
        }
        for (raw, token) in raw_nodes.iter().zip(&tokens) {
            for key in &raw.downstream {
                model.add_edge(token, &token_for_key(key));
            }
            for key in &raw.upstream {
                model.add_edge(&token_for_key(key), token);
            }
        }
        model.collect_external();
        tracing::debug!(
            nodes = model.nodes.len(),
            edges = model.edge_count(),
            external = model.external.len(),
            "built graph model"
        );
        Ok(model)
    }

    /// Rebuilds a model from the worker wire format.
    pub fn from_wire(definitions: &[NodeDefinition], edges: &[GraphEdge]) -> Result<Self, GraphError> {
        let mut model = GraphModel::default();
        for (index, definition) in definitions.iter().enumerate() {
            model.insert_node(definition, index)?;
        }
        for edge in edges {
            for token in [&edge.from, &edge.to] {
                if token.is_empty() {
                    return Err(GraphError::UnknownEdgeEndpoint {
                        token: token.clone(),
                    });
                }
            }
            model.add_edge(&edge.from, &edge.to);
        }
        model.collect_external();
        Ok(model)
    }

    pub fn to_wire(&self) -> (Vec<NodeDefinition>, Vec<GraphEdge>) {
        let definitions = self
            .nodes
            .values()
            .map(|node| node.definition.clone())
            .collect();
        (definitions, self.edges())
    }

    fn insert_node(&mut self, definition: &NodeDefinition, index: usize) -> Result<String, GraphError> {
        let token = token_for_definition(definition, index)?;
        if self.nodes.contains_key(&token) {
            return Err(GraphError::DuplicateNode { token });
        }
        self.nodes.insert(
            token.clone(),
            GraphNode {
                id: token.clone(),
                definition: definition.clone(),
                group_id: group_id_for(definition),
            },
        );
        Ok(token)
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.downstream
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.upstream
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    fn collect_external(&mut self) {
        let referenced = self.downstream.keys().chain(self.upstream.keys());
        let external: BTreeSet<String> = referenced
            .filter(|token| !self.nodes.contains_key(*token))
            .cloned()
            .collect();
        self.external = external;
    }

    pub fn contains(&self, token: &str) -> bool {
        self.nodes.contains_key(token)
    }

    pub fn is_external(&self, token: &str) -> bool {
        self.external.contains(token)
    }

    pub fn edge_count(&self) -> usize {
        self.downstream.values().map(BTreeSet::len).sum()
    }

    /// All edges, ordered by source token then target token.
    pub fn edges(&self) -> Vec<GraphEdge> {
        self.downstream
            .iter()
            .flat_map(|(from, targets)| {
                targets.iter().map(move |to| GraphEdge {
                    from: from.clone(),
                    to: to.clone(),
                })
            })
            .collect()
    }

    pub fn downstream_of(&self, token: &str) -> impl Iterator<Item = &String> {
        self.downstream.get(token).into_iter().flatten()
    }

    pub fn upstream_of(&self, token: &str) -> impl Iterator<Item = &String> {
        self.upstream.get(token).into_iter().flatten()
    }

    /// Loaded neighbors in either direction, sorted and deduplicated.
    pub fn neighbors(&self, token: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .downstream_of(token)
            .chain(self.upstream_of(token))
            .filter(|other| self.nodes.contains_key(*other))
            .map(String::as_str)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Group id to member tokens, members in input order.
    pub fn groups(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in self.nodes.values() {
            groups
                .entry(node.group_id.clone())
                .or_default()
                .push(node.id.clone());
        }
        groups
    }

    /// Detects a directed cycle with an iterative three-color DFS.
    pub fn has_cycles(&self) -> bool {
        has_cycles(self)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

pub fn has_cycles(model: &GraphModel) -> bool {
    let mut roots: Vec<&String> = model.nodes.keys().collect();
    roots.extend(model.external.iter());

    let empty: BTreeSet<String> = BTreeSet::new();
    let mut color: BTreeMap<&str, Color> = BTreeMap::new();
    // Each frame holds a node and the iterator over its remaining children.
    let mut stack: Vec<(&str, std::collections::btree_set::Iter<'_, String>)> = Vec::new();

    for root in roots {
        if color.get(root.as_str()).copied().unwrap_or(Color::White) != Color::White {
            continue;
        }
        color.insert(root.as_str(), Color::Gray);
        stack.push((root.as_str(), model.downstream.get(root).unwrap_or(&empty).iter()));

        while let Some((node, children)) = stack.last_mut() {
            match children.next() {
                Some(child) => match color.get(child.as_str()).copied().unwrap_or(Color::White) {
                    Color::Gray => return true,
                    Color::Black => {}
                    Color::White => {
                        color.insert(child.as_str(), Color::Gray);
                        let next = model.downstream.get(child).unwrap_or(&empty).iter();
                        stack.push((child.as_str(), next));
                    }
                },
                None => {
                    color.insert(*node, Color::Black);
                    stack.pop();
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AssetDefinition, RawNode};

    fn chain(edges: &[(&str, &str)], nodes: &[&str]) -> GraphModel {
        let raw: Vec<RawNode> = nodes
            .iter()
            .map(|id| {
                let mut node = RawNode::asset(&[*id]);
                for (from, to) in edges {
                    if from == id {
                        node = node.with_downstream(&[*to]);
                    }
                }
                node
            })
            .collect();
        GraphModel::build(&raw).unwrap()
    }

    #[test]
    fn tokens_are_injective_over_separators() {
        let a = token_for_segments(&["a/b".to_string()]);
        let b = token_for_segments(&["a".to_string(), "b".to_string()]);
        assert_ne!(a, b);
        assert_eq!(b, "a/b");
        assert_eq!(a, "a\\/b");
    }

    #[test]
    fn detects_three_node_cycle() {
        let cyclic = chain(&[("A", "B"), ("B", "C"), ("C", "A")], &["A", "B", "C"]);
        assert!(cyclic.has_cycles());
        let acyclic = chain(&[("A", "B"), ("B", "C")], &["A", "B", "C"]);
        assert!(!acyclic.has_cycles());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let model = chain(
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
            &["a", "b", "c", "d"],
        );
        assert!(!model.has_cycles());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let model = chain(&[("a", "a")], &["a"]);
        assert!(model.has_cycles());
    }

    #[test]
    fn long_chain_does_not_overflow_the_stack() {
        let count = 50_000;
        let raw: Vec<RawNode> = (0..count)
            .map(|idx| {
                let name = format!("n{idx}");
                let node = RawNode::asset(&[name.as_str()]);
                if idx + 1 < count {
                    let next = format!("n{}", idx + 1);
                    node.with_downstream(&[next.as_str()])
                } else {
                    node
                }
            })
            .collect();
        let model = GraphModel::build(&raw).unwrap();
        assert!(!model.has_cycles());
    }

    #[test]
    fn foreign_references_become_external() {
        let raw = vec![RawNode::asset(&["a"])
            .with_upstream(&["elsewhere", "source"])
            .with_downstream(&["b"])];
        let model = GraphModel::build(&raw).unwrap();
        assert_eq!(model.nodes.len(), 1);
        assert!(model.is_external("elsewhere/source"));
        assert!(model.is_external("b"));
        assert!(model.downstream_of("elsewhere/source").any(|t| t == "a"));
        assert!(model.neighbors("a").is_empty());
    }

    #[test]
    fn missing_key_is_rejected() {
        let mut node = RawNode::asset(&["a"]);
        if let NodeDefinition::Asset(AssetDefinition { asset_key, .. }) = &mut node.definition {
            *asset_key = None;
        }
        let err = GraphModel::build(&[RawNode::asset(&["ok"]), node]).unwrap_err();
        assert_eq!(err, GraphError::MissingKey { index: 1 });
    }

    #[test]
    fn duplicate_nodes_are_rejected() {
        let err = GraphModel::build(&[RawNode::asset(&["a"]), RawNode::asset(&["a"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateNode {
                token: "a".to_string()
            }
        );
    }

    #[test]
    fn group_ids_are_stable() {
        let node = RawNode::asset(&["a"]).in_group("ingest", "repo", "loc");
        let first = group_id_for(&node.definition);
        let again = group_id_for(&node.definition.clone());
        assert_eq!(first, "ingest@repo@loc");
        assert_eq!(first, again);
        assert_eq!(group_id_for(&RawNode::asset(&["b"]).definition), UNGROUPED_GROUP_ID);
    }

    #[test]
    fn group_ids_escape_separators() {
        let split_left = RawNode::asset(&["a"]).in_group("a@b", "c", "d");
        let split_right = RawNode::asset(&["b"]).in_group("a", "b@c", "d");
        assert_ne!(group_id_for(&split_left.definition), group_id_for(&split_right.definition));
        assert_eq!(group_id_for(&split_left.definition), "a\\@b@c@d");

        let lookalike = RawNode::asset(&["g@r@l"]);
        let member = RawNode::asset(&["m"]).in_group("g", "r", "l");
        let model = GraphModel::build(&[lookalike, member]).unwrap();
        assert!(!model.contains("g@r@l"));
        assert!(model.groups().contains_key("g@r@l"));
        assert!(model.contains("g\\@r\\@l"));
    }

    #[test]
    fn wire_round_trip_preserves_structure() {
        let model = chain(&[("a", "b"), ("b", "c")], &["a", "b", "c"]);
        let (definitions, edges) = model.to_wire();
        let rebuilt = GraphModel::from_wire(&definitions, &edges).unwrap();
        assert_eq!(rebuilt.edges(), model.edges());
        assert_eq!(
            rebuilt.nodes.keys().collect::<Vec<_>>(),
            model.nodes.keys().collect::<Vec<_>>()
        );
    }
}
