use std::collections::BTreeSet;
use std::path::Path;

use asset_graph_layout::config::LayoutConfig;
use asset_graph_layout::graph::GraphModel;
use asset_graph_layout::ir::{Direction, RawNode};
use asset_graph_layout::layout::{DefaultSizer, Layout, compute_layout};
use asset_graph_layout::selection::path_between;
use asset_graph_layout::worker::{LayoutOutcome, LayoutRequest, LayoutResponse, handle_message};

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Fixture {
    Nodes(Vec<RawNode>),
    Wrapped { nodes: Vec<RawNode> },
}

fn load_fixture(name: &str) -> GraphModel {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let input = std::fs::read_to_string(&path).expect("fixture read failed");
    let raw = match serde_json::from_str::<Fixture>(&input).expect("fixture parse failed") {
        Fixture::Nodes(nodes) | Fixture::Wrapped { nodes } => nodes,
    };
    GraphModel::build(&raw).expect("fixture build failed")
}

fn layout(model: &GraphModel, direction: Direction, expanded: &[&str]) -> Layout {
    let config = LayoutConfig::default();
    let expanded: BTreeSet<String> = expanded.iter().map(|id| id.to_string()).collect();
    compute_layout(
        model,
        direction,
        &expanded,
        &DefaultSizer::new(config.sizer.clone()),
        &config,
    )
}

fn assert_well_formed(model: &GraphModel, layout: &Layout, fixture: &str) {
    let boxes: Vec<(&String, _)> = layout.nodes.iter().map(|(id, n)| (id, n.bounds)).collect();
    for (i, (id, a)) in boxes.iter().enumerate() {
        assert!(a.width > 0.0 && a.height > 0.0, "{fixture}: {id} has an empty box");
        assert!(a.right() <= layout.width && a.bottom() <= layout.height, "{fixture}: {id} out of bounds");
        for (other, b) in boxes.iter().skip(i + 1) {
            assert!(!a.intersects(b), "{fixture}: {id} overlaps {other}");
        }
    }
    for edge in &layout.edges {
        assert!(layout.bounds_of(&edge.from).is_some(), "{fixture}: dangling edge source {}", edge.from);
        assert!(layout.bounds_of(&edge.to).is_some(), "{fixture}: dangling edge target {}", edge.to);
        assert!(edge.points.len() >= 2, "{fixture}: edge without a polyline");
    }
    let members = model.groups();
    for group in layout.groups.values().filter(|group| group.expanded) {
        for (id, node) in &layout.nodes {
            if !members[&group.id].contains(id) {
                assert!(!group.bounds.intersects(&node.bounds), "{fixture}: {id} inside {}", group.id);
            }
        }
        for other in layout.groups.values().filter(|other| other.id != group.id) {
            assert!(!group.bounds.intersects(&other.bounds), "{fixture}: {} overlaps {}", group.id, other.id);
        }
    }
}

#[test]
fn layout_all_fixtures() {
    let cases: [(&str, &[&str]); 3] = [
        ("diamond.json", &[]),
        ("external.json", &[]),
        (
            "grouped.json",
            &["ingest@warehouse@prod", "staging@warehouse@prod", "marts@warehouse@prod"],
        ),
    ];
    for (fixture, expanded) in cases {
        let model = load_fixture(fixture);
        assert!(!model.has_cycles(), "{fixture}: unexpected cycle");
        for direction in [Direction::Down, Direction::Up] {
            let result = layout(&model, direction, expanded);
            assert_well_formed(&model, &result, fixture);
            assert_eq!(result, layout(&model, direction, expanded), "{fixture}: not deterministic");
        }
    }
}

#[test]
fn cycle_fixture_is_detected() {
    assert!(load_fixture("cycle.json").has_cycles());
}

#[test]
fn diamond_layers() {
    let result = layout(&load_fixture("diamond.json"), Direction::Down, &[]);
    let layer = |id: &str| result.nodes[id].layer;
    assert_eq!((layer("a"), layer("b"), layer("c"), layer("d")), (0, 1, 2, 1));
}

#[test]
fn collapsed_groups_carry_the_edge_union() {
    let model = load_fixture("grouped.json");
    let result = layout(&model, Direction::Down, &["ingest@warehouse@prod", "marts@warehouse@prod"]);
    let staging = &result.groups["staging@warehouse@prod"];
    assert!(!staging.expanded);
    assert_eq!(staging.node_count, 2);
    assert!(!result.nodes.contains_key("staging/orders"));

    let into: BTreeSet<&str> = result
        .edges
        .iter()
        .filter(|e| e.to == "staging@warehouse@prod")
        .map(|e| e.from.as_str())
        .collect();
    let out_of: BTreeSet<&str> = result
        .edges
        .iter()
        .filter(|e| e.from == "staging@warehouse@prod")
        .map(|e| e.to.as_str())
        .collect();
    assert_eq!(into, BTreeSet::from(["raw/customers", "raw/orders"]));
    assert_eq!(out_of, BTreeSet::from(["marts/churn", "marts/revenue"]));
}

#[test]
fn expanding_and_collapsing_again_is_a_no_op() {
    let model = load_fixture("grouped.json");
    let all = ["ingest@warehouse@prod", "staging@warehouse@prod", "marts@warehouse@prod"];
    let before = layout(&model, Direction::Down, &all);
    let _ = layout(&model, Direction::Down, &all[..1]);
    let after = layout(&model, Direction::Down, &all);
    assert_eq!(before, after);
}

#[test]
fn selection_paths_are_symmetric() {
    let model = load_fixture("grouped.json");
    let tokens: Vec<&String> = model.nodes.keys().collect();
    for from in &tokens {
        for to in &tokens {
            let forward = path_between(&model, from, to);
            let mut backward = path_between(&model, to, from);
            backward.reverse();
            assert_eq!(forward, backward, "{from} -> {to}");
            if !forward.is_empty() {
                assert_eq!(forward.first(), Some(*from));
                assert_eq!(forward.last(), Some(*to));
            }
        }
    }
    assert_eq!(
        path_between(&model, "raw/orders", "notify_slack"),
        vec!["raw/orders", "dashboards/exec", "notify_slack"]
    );
}

#[test]
fn external_references_stay_out_of_the_layout() {
    let model = load_fixture("external.json");
    assert!(model.is_external("shared/features"));
    assert!(model.is_external("reports/weekly"));
    let result = layout(&model, Direction::Down, &[]);
    assert_eq!(result.nodes.len(), 2);
    assert_eq!(result.edges.len(), 1);
}

#[test]
fn worker_handler_matches_direct_layout() {
    let model = load_fixture("grouped.json");
    let (nodes, edges) = model.to_wire();
    let request = LayoutRequest {
        seq: 11,
        direction: Direction::Up,
        expanded_group_ids: vec!["marts@warehouse@prod".to_string()],
        nodes,
        edges,
    };
    let reply = handle_message(&serde_json::to_string(&request).unwrap());
    let response: LayoutResponse = serde_json::from_str(&reply).unwrap();
    assert_eq!(response.seq, 11);
    let direct = layout(&model, Direction::Up, &["marts@warehouse@prod"]);
    assert_eq!(response.outcome, LayoutOutcome::Layout(direct));
}
